use std::sync::Arc;

use anyhow::{Context, Result};
use storage::Storage;
use tracing::info;

pub mod consent;
pub mod contact;
pub mod error;
pub mod gateway;
pub mod workflow;

pub use consent::{AmbientSignals, ConsentEvent, ConsentOrigin, ConsentPreferenceStore};
pub use contact::{ContactFields, ContactForm};
pub use error::{GatewayError, ValidationError};
pub use gateway::{FunnelBackend, RemoteGateway};
pub use workflow::{
    FunnelEvent, FunnelView, HireFields, IntentKind, IntentOutcome, Step, WorkflowController,
    WorkflowState,
};

/// Everything a front end needs for one visitor: consent, the funnel and the contact form,
/// all sharing one gateway.
pub struct FunnelSession {
    pub storage: Arc<Storage>,
    pub consent: Arc<ConsentPreferenceStore>,
    pub gateway: Arc<RemoteGateway>,
    pub workflow: Arc<WorkflowController>,
    pub contact: ContactForm,
}

impl FunnelSession {
    /// Opens local storage, hydrates consent and wires the controller to the backend.
    pub async fn open(
        database_url: &str,
        api_base_url: &str,
        signals: AmbientSignals,
    ) -> Result<Self> {
        let storage = Arc::new(
            Storage::new(database_url)
                .await
                .with_context(|| format!("failed to open local storage at {database_url}"))?,
        );
        let stored_records = storage.record_count().await?;
        let consent = ConsentPreferenceStore::load(storage.clone(), signals).await;
        let gateway = Arc::new(RemoteGateway::new(api_base_url, consent.clone()));
        let backend: Arc<dyn FunnelBackend> = gateway.clone();
        let workflow = WorkflowController::new(backend.clone());
        let contact = ContactForm::new(backend);

        info!(
            api_base_url = gateway.base_url(),
            stored_records,
            banner_visible = consent.is_banner_visible(),
            "funnel session ready"
        );
        Ok(Self {
            storage,
            consent,
            gateway,
            workflow,
            contact,
        })
    }

    pub async fn close(&self) {
        self.storage.close().await;
    }
}
