//! The one path to the analysis backend. Every request carries the current consent
//! signals and every failure is normalized into a [`GatewayError`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{AnalysisId, DiyStep, StepId},
    error::ApiError,
    protocol::{
        ContactRequest, DetailedReport, HireRequest, MessageResponse, QuickAnalyzeRequest,
        QuickAnalyzeResponse, ReportRequest, ResendVerificationRequest, StepUpdateRequest,
        StepsResponse, VerifyEmailRequest,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{
    consent::ConsentPreferenceStore,
    error::{GatewayError, GENERIC_FAILURE_MESSAGE},
};

/// Backend operations the funnel and the contact form depend on.
#[async_trait]
pub trait FunnelBackend: Send + Sync {
    async fn quick_analyze(&self, url: &str) -> Result<QuickAnalyzeResponse, GatewayError>;
    async fn request_report(&self, url: &str, email: &str)
        -> Result<MessageResponse, GatewayError>;
    async fn verify_email(&self, email: &str, code: &str)
        -> Result<MessageResponse, GatewayError>;
    async fn resend_verification(&self, email: &str) -> Result<MessageResponse, GatewayError>;
    async fn fetch_report(&self, analysis_id: &AnalysisId)
        -> Result<DetailedReport, GatewayError>;
    async fn fetch_steps(&self, analysis_id: &AnalysisId) -> Result<Vec<DiyStep>, GatewayError>;
    async fn update_step(&self, step_id: &StepId, completed: bool)
        -> Result<DiyStep, GatewayError>;
    async fn submit_hire(&self, request: &HireRequest) -> Result<MessageResponse, GatewayError>;
    async fn submit_contact(
        &self,
        request: &ContactRequest,
    ) -> Result<MessageResponse, GatewayError>;
}

pub struct RemoteGateway {
    http: Client,
    base_url: String,
    consent: Arc<ConsentPreferenceStore>,
}

impl RemoteGateway {
    pub fn new(base_url: impl Into<String>, consent: Arc<ConsentPreferenceStore>) -> Self {
        Self::with_client(Client::new(), base_url, consent)
    }

    pub fn with_client(
        http: Client,
        base_url: impl Into<String>,
        consent: Arc<ConsentPreferenceStore>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            consent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::POST, endpoint, Some(body)).await
    }

    pub async fn request<B, T>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(method, format!("{}{}", self.base_url, endpoint), body)
            .await
    }

    /// Backend URL for a path built from raw segments. Each segment is percent-encoded, so an
    /// id containing `/`, `?` or `#` stays inside its own segment.
    pub fn segment_url(&self, segments: &[&str]) -> Result<String, GatewayError> {
        let invalid = || GatewayError::Unreachable {
            detail: format!("invalid backend url {}", self.base_url),
        };
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    async fn send<B, T>(
        &self,
        method: Method,
        url: String,
        body: Option<&B>,
    ) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let endpoint = url.strip_prefix(self.base_url.as_str()).unwrap_or(&url);
        let mut request = self.http.request(method.clone(), &url);
        for (name, value) in self.consent.signal_headers() {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|err| {
            warn!(%method, endpoint, "gateway: backend unreachable: {err}");
            GatewayError::Unreachable {
                detail: err.to_string(),
            }
        })?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| GatewayError::Unreachable {
                detail: err.to_string(),
            })?;
        debug!(%method, endpoint, status = status.as_u16(), "gateway: response received");

        if !status.is_success() {
            let message = serde_json::from_slice::<ApiError>(&bytes)
                .ok()
                .and_then(|body| body.user_message())
                .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string());
            warn!(%method, endpoint, status = status.as_u16(), "gateway: request failed: {message}");
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let payload: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &bytes
        };
        serde_json::from_slice(payload).map_err(|err| {
            warn!(%method, endpoint, "gateway: unexpected response body: {err}");
            GatewayError::Decode {
                detail: err.to_string(),
            }
        })
    }
}

#[async_trait]
impl FunnelBackend for RemoteGateway {
    async fn quick_analyze(&self, url: &str) -> Result<QuickAnalyzeResponse, GatewayError> {
        self.post(
            "/analyze/quick",
            &QuickAnalyzeRequest {
                url: url.to_string(),
            },
        )
        .await
    }

    async fn request_report(
        &self,
        url: &str,
        email: &str,
    ) -> Result<MessageResponse, GatewayError> {
        self.post(
            "/report/request",
            &ReportRequest {
                url: url.to_string(),
                email: email.to_string(),
            },
        )
        .await
    }

    async fn verify_email(
        &self,
        email: &str,
        code: &str,
    ) -> Result<MessageResponse, GatewayError> {
        self.post(
            "/auth/verify-email",
            &VerifyEmailRequest {
                email: email.to_string(),
                code: code.to_string(),
            },
        )
        .await
    }

    async fn resend_verification(&self, email: &str) -> Result<MessageResponse, GatewayError> {
        self.post(
            "/resend-verification",
            &ResendVerificationRequest {
                email: email.to_string(),
            },
        )
        .await
    }

    async fn fetch_report(
        &self,
        analysis_id: &AnalysisId,
    ) -> Result<DetailedReport, GatewayError> {
        let url = self.segment_url(&["report", analysis_id.as_str()])?;
        self.send::<(), _>(Method::GET, url, None).await
    }

    async fn fetch_steps(&self, analysis_id: &AnalysisId) -> Result<Vec<DiyStep>, GatewayError> {
        let url = self.segment_url(&["report", analysis_id.as_str(), "steps"])?;
        let body: StepsResponse = self.send::<(), _>(Method::GET, url, None).await?;
        Ok(body.steps)
    }

    async fn update_step(
        &self,
        step_id: &StepId,
        completed: bool,
    ) -> Result<DiyStep, GatewayError> {
        let url = self.segment_url(&["steps", step_id.as_str()])?;
        self.send(Method::PATCH, url, Some(&StepUpdateRequest { completed }))
            .await
    }

    async fn submit_hire(&self, request: &HireRequest) -> Result<MessageResponse, GatewayError> {
        self.post("/hire/request", request).await
    }

    async fn submit_contact(
        &self,
        request: &ContactRequest,
    ) -> Result<MessageResponse, GatewayError> {
        self.post("/contact", request).await
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
