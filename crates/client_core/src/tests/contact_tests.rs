use super::*;

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use shared::{
    domain::{AnalysisId, DiyStep, StepId},
    protocol::{DetailedReport, HireRequest, MessageResponse, QuickAnalyzeResponse},
};

use crate::error::GatewayError;

/// Only the contact route is exercised here.
struct ContactOnly {
    sent: StdMutex<Vec<ContactRequest>>,
    reply: Result<MessageResponse, GatewayError>,
}

impl ContactOnly {
    fn replying(reply: Result<MessageResponse, GatewayError>) -> Arc<Self> {
        Arc::new(Self {
            sent: StdMutex::new(Vec::new()),
            reply,
        })
    }
}

fn unused() -> GatewayError {
    GatewayError::Decode {
        detail: "not used by the contact form".into(),
    }
}

#[async_trait]
impl FunnelBackend for ContactOnly {
    async fn quick_analyze(&self, _url: &str) -> Result<QuickAnalyzeResponse, GatewayError> {
        Err(unused())
    }
    async fn request_report(
        &self,
        _url: &str,
        _email: &str,
    ) -> Result<MessageResponse, GatewayError> {
        Err(unused())
    }
    async fn verify_email(
        &self,
        _email: &str,
        _code: &str,
    ) -> Result<MessageResponse, GatewayError> {
        Err(unused())
    }
    async fn resend_verification(
        &self,
        _email: &str,
    ) -> Result<MessageResponse, GatewayError> {
        Err(unused())
    }
    async fn fetch_report(
        &self,
        _analysis_id: &AnalysisId,
    ) -> Result<DetailedReport, GatewayError> {
        Err(unused())
    }
    async fn fetch_steps(
        &self,
        _analysis_id: &AnalysisId,
    ) -> Result<Vec<DiyStep>, GatewayError> {
        Err(unused())
    }
    async fn update_step(
        &self,
        _step_id: &StepId,
        _completed: bool,
    ) -> Result<DiyStep, GatewayError> {
        Err(unused())
    }
    async fn submit_hire(
        &self,
        _request: &HireRequest,
    ) -> Result<MessageResponse, GatewayError> {
        Err(unused())
    }
    async fn submit_contact(
        &self,
        request: &ContactRequest,
    ) -> Result<MessageResponse, GatewayError> {
        self.sent.lock().expect("sent").push(request.clone());
        self.reply.clone()
    }
}

fn filled() -> ContactFields {
    ContactFields {
        name: " Ada ".into(),
        email: "ada@example.com".into(),
        subject: "Pricing".into(),
        message: "How much for a full audit?".into(),
    }
}

#[tokio::test]
async fn sends_trimmed_fields_and_shows_server_message() {
    let backend = ContactOnly::replying(Ok(MessageResponse {
        message: "We'll be in touch.".into(),
    }));
    let form = ContactForm::new(backend.clone());

    assert_eq!(form.submit(filled()).await, IntentOutcome::Applied);
    let status = form.status().await;
    assert_eq!(status.success.as_deref(), Some("We'll be in touch."));
    assert!(!status.loading);

    let sent = backend.sent.lock().expect("sent");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].name, "Ada");
    assert_eq!(sent[0].subject, "Pricing");
}

#[tokio::test]
async fn empty_ack_uses_default_confirmation() {
    let form = ContactForm::new(ContactOnly::replying(Ok(MessageResponse::default())));
    form.submit(filled()).await;
    assert_eq!(
        form.status().await.success.as_deref(),
        Some(CONTACT_SENT_MESSAGE)
    );
}

#[tokio::test]
async fn missing_required_fields_never_reach_backend() {
    let backend = ContactOnly::replying(Ok(MessageResponse::default()));
    let form = ContactForm::new(backend.clone());

    let outcome = form
        .submit(ContactFields {
            message: "   ".into(),
            ..filled()
        })
        .await;
    assert_eq!(outcome, IntentOutcome::Rejected(ValidationError::EmptyMessage));
    assert_eq!(
        form.status().await.error.as_deref(),
        Some("Please enter a message")
    );
    assert!(backend.sent.lock().expect("sent").is_empty());
}

#[tokio::test]
async fn server_failure_is_surfaced() {
    let form = ContactForm::new(ContactOnly::replying(Err(GatewayError::Server {
        status: 429,
        message: "Too many requests".into(),
    })));

    assert!(matches!(
        form.submit(filled()).await,
        IntentOutcome::Failed(_)
    ));
    let status = form.status().await;
    assert_eq!(status.error.as_deref(), Some("Too many requests"));
    assert!(status.success.is_none());
    assert!(!status.loading);
}
