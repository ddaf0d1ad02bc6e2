//! Standalone contact form. It talks to the backend through the same gateway as the
//! funnel but keeps its own status fields.

use std::sync::Arc;

use shared::protocol::ContactRequest;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{error::ValidationError, gateway::FunnelBackend, workflow::IntentOutcome};

pub const CONTACT_SENT_MESSAGE: &str = "Thanks! Your message has been sent.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactStatus {
    pub loading: bool,
    pub error: Option<String>,
    pub success: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactFields {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl ContactFields {
    fn validate(&self) -> Result<ContactRequest, ValidationError> {
        let name = self.name.trim();
        let email = self.email.trim();
        let message = self.message.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if email.is_empty() {
            return Err(ValidationError::EmptyEmail);
        }
        if message.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        Ok(ContactRequest {
            name: name.to_string(),
            email: email.to_string(),
            subject: self.subject.trim().to_string(),
            message: message.to_string(),
        })
    }
}

pub struct ContactForm {
    backend: Arc<dyn FunnelBackend>,
    status: Mutex<ContactStatus>,
}

impl ContactForm {
    pub fn new(backend: Arc<dyn FunnelBackend>) -> Self {
        Self {
            backend,
            status: Mutex::new(ContactStatus::default()),
        }
    }

    pub async fn status(&self) -> ContactStatus {
        self.status.lock().await.clone()
    }

    pub async fn submit(&self, fields: ContactFields) -> IntentOutcome {
        let request = {
            let mut status = self.status.lock().await;
            if status.loading {
                return IntentOutcome::Busy;
            }
            status.error = None;
            status.success = None;
            match fields.validate() {
                Ok(request) => {
                    status.loading = true;
                    request
                }
                Err(err) => {
                    status.error = Some(err.to_string());
                    return IntentOutcome::Rejected(err);
                }
            }
        };

        let result = self.backend.submit_contact(&request).await;

        let mut status = self.status.lock().await;
        status.loading = false;
        match result {
            Ok(ack) => {
                info!(subject = %request.subject, "contact: message sent");
                let message = ack.message.trim();
                status.success = Some(if message.is_empty() {
                    CONTACT_SENT_MESSAGE.to_string()
                } else {
                    message.to_string()
                });
                IntentOutcome::Applied
            }
            Err(err) => {
                warn!("contact: submit failed: {err}");
                status.error = Some(err.to_string());
                IntentOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/contact_tests.rs"]
mod tests;
