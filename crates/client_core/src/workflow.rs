//! The analysis funnel: URL → quick grade → email gate → detailed report → DIY or hire.
//!
//! All transitions go through [`Step::permits`]. Every remote intent follows the same
//! protocol: clear messages, mark loading, make the call(s), then apply either the success
//! merge or the error. A second intent while one is in flight is ignored.

use std::{fmt, sync::Arc};

use shared::{
    domain::{AnalysisId, DiyStep, QuickResult, ScoreTier, StepId},
    protocol::{DetailedReport, HireRequest},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};
use url::Url;

use crate::{
    error::{GatewayError, ValidationError},
    gateway::FunnelBackend,
};

pub const REPORT_REQUESTED_MESSAGE: &str = "Verification code sent to your email.";
pub const EMAIL_VERIFIED_MESSAGE: &str = "Email verified! Generating your report...";
pub const CODE_RESENT_MESSAGE: &str = "Verification code sent! Check your email.";
pub const HIRE_SUBMITTED_MESSAGE: &str = "Hire request submitted successfully!";
pub const VERIFICATION_CODE_LEN: usize = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Step {
    #[default]
    UrlInput,
    QuickGrade,
    VerifyEmail,
    DetailedReport,
    HireForm,
}

impl Step {
    /// Position in the five-stage progress indicator.
    pub fn ordinal(self) -> u8 {
        match self {
            Self::UrlInput => 1,
            Self::QuickGrade => 2,
            Self::VerifyEmail => 3,
            Self::DetailedReport => 4,
            Self::HireForm => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::UrlInput => "Analyze",
            Self::QuickGrade => "Grade",
            Self::VerifyEmail => "Verify",
            Self::DetailedReport => "Report",
            Self::HireForm => "Action",
        }
    }

    pub fn all() -> [Step; 5] {
        [
            Self::UrlInput,
            Self::QuickGrade,
            Self::VerifyEmail,
            Self::DetailedReport,
            Self::HireForm,
        ]
    }

    pub fn permits(self, intent: IntentKind) -> bool {
        use IntentKind::*;
        matches!(
            (self, intent),
            (_, ResetToHome)
                | (Step::UrlInput, Analyze)
                | (Step::QuickGrade, RequestReport)
                | (Step::VerifyEmail, Verify | Resend)
                | (
                    Step::DetailedReport,
                    ChooseDiy | ChooseReport | ChooseHire | LoadDiySteps | ToggleStep
                )
                | (Step::HireForm, SubmitHire | BackToReport)
        )
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UrlInput => "url_input",
            Self::QuickGrade => "quick_grade",
            Self::VerifyEmail => "verify_email",
            Self::DetailedReport => "detailed_report",
            Self::HireForm => "hire_form",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKind {
    Analyze,
    RequestReport,
    Verify,
    Resend,
    ChooseDiy,
    ChooseReport,
    ChooseHire,
    BackToReport,
    LoadDiySteps,
    ToggleStep,
    SubmitHire,
    ResetToHome,
}

impl IntentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::RequestReport => "request_report",
            Self::Verify => "verify",
            Self::Resend => "resend",
            Self::ChooseDiy => "choose_diy",
            Self::ChooseReport => "choose_report",
            Self::ChooseHire => "choose_hire",
            Self::BackToReport => "back_to_report",
            Self::LoadDiySteps => "load_diy_steps",
            Self::ToggleStep => "toggle_step",
            Self::SubmitHire => "submit_hire",
            Self::ResetToHome => "reset_to_home",
        }
    }
}

/// Which part of the report screen is showing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportView {
    #[default]
    Summary,
    DiySteps,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowState {
    pub step: Step,
    pub url: Option<String>,
    pub analysis_id: Option<AnalysisId>,
    pub quick_result: Option<QuickResult>,
    pub email: Option<String>,
    pub email_verified: bool,
    pub report: Option<DetailedReport>,
    pub report_view: ReportView,
    pub diy_steps: Vec<DiyStep>,
    pub hire_submitted: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub success: Option<String>,
}

impl WorkflowState {
    fn clear_messages(&mut self) {
        self.error = None;
        self.success = None;
    }
}

/// Result of dispatching an intent. Failures are also recorded on the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentOutcome {
    Applied,
    Failed(GatewayError),
    Rejected(ValidationError),
    /// Another intent is in flight; nothing happened.
    Busy,
    /// The intent is not valid from the current step.
    NotPermitted { step: Step, intent: IntentKind },
    /// The session was reset while the call was in flight and its result was dropped.
    Discarded,
}

impl IntentOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HireFields {
    pub name: String,
    pub company: String,
    pub website: String,
    pub phone: String,
    pub message: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub enum FunnelEvent {
    StateChanged(WorkflowState),
}

/// Status line shared by every screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewStatus {
    pub loading: bool,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// What the current screen needs to render.
#[derive(Debug, Clone, PartialEq)]
pub enum FunnelView {
    UrlInput {
        status: ViewStatus,
    },
    QuickGrade {
        url: String,
        result: QuickResult,
        letter: char,
        tier: ScoreTier,
        status: ViewStatus,
    },
    VerifyEmail {
        email: String,
        /// Whether the verify control is live. A code must still pass
        /// [`FunnelView::can_verify`] before it is sent.
        accepts_code: bool,
        status: ViewStatus,
    },
    DetailedReport {
        report: DetailedReport,
        view: ReportView,
        steps: Vec<DiyStep>,
        status: ViewStatus,
    },
    HireForm {
        url: String,
        email: String,
        submitted: bool,
        status: ViewStatus,
    },
}

impl FunnelView {
    pub fn from_state(state: &WorkflowState) -> Self {
        let status = ViewStatus {
            loading: state.loading,
            error: state.error.clone(),
            success: state.success.clone(),
        };
        let url = state.url.clone().unwrap_or_default();
        let email = state.email.clone().unwrap_or_default();
        match state.step {
            Step::UrlInput => Self::UrlInput { status },
            Step::QuickGrade => {
                let result = state.quick_result.clone().unwrap_or_default();
                Self::QuickGrade {
                    url,
                    letter: result.grade_letter(),
                    tier: ScoreTier::for_overall(result.overall_score),
                    result,
                    status,
                }
            }
            Step::VerifyEmail => Self::VerifyEmail {
                accepts_code: !state.loading && state.email.is_some(),
                email,
                status,
            },
            Step::DetailedReport => Self::DetailedReport {
                report: state.report.clone().unwrap_or_default(),
                view: state.report_view,
                steps: state.diy_steps.clone(),
                status,
            },
            Step::HireForm => Self::HireForm {
                url,
                email,
                submitted: state.hire_submitted,
                status,
            },
        }
    }

    /// Enable predicate for the verify control given the code typed so far.
    pub fn can_verify(&self, code: &str) -> bool {
        matches!(self, Self::VerifyEmail { accepts_code: true, .. })
            && normalize_verification_code(code).is_ok()
    }
}

/// Trims the input and requires an absolute URL with a host.
pub fn validate_url(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }
    let parsed = Url::parse(trimmed).map_err(|_| ValidationError::MalformedUrl)?;
    if parsed.cannot_be_a_base() || parsed.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::MalformedUrl);
    }
    Ok(trimmed.to_string())
}

/// Strips non-digits and requires exactly six remaining.
pub fn normalize_verification_code(raw: &str) -> Result<String, ValidationError> {
    let digits = raw
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>();
    if digits.len() != VERIFICATION_CODE_LEN {
        return Err(ValidationError::InvalidCode);
    }
    Ok(digits)
}

fn required(raw: &str, missing: ValidationError) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(missing)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Inputs captured by `begin` for the call about to be made.
struct InFlight {
    epoch: u64,
    state: WorkflowState,
}

struct Inner {
    state: WorkflowState,
    /// Bumped on every reset so that late results from an abandoned call are dropped.
    epoch: u64,
    /// Set while a backend call is outstanding. Survives a reset, so an abandoned call
    /// still blocks new ones until it returns.
    in_flight: bool,
}

pub struct WorkflowController {
    backend: Arc<dyn FunnelBackend>,
    inner: Mutex<Inner>,
    events: broadcast::Sender<FunnelEvent>,
}

impl WorkflowController {
    pub fn new(backend: Arc<dyn FunnelBackend>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            backend,
            inner: Mutex::new(Inner {
                state: WorkflowState::default(),
                epoch: 0,
                in_flight: false,
            }),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FunnelEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> WorkflowState {
        self.inner.lock().await.state.clone()
    }

    pub async fn view(&self) -> FunnelView {
        FunnelView::from_state(&self.inner.lock().await.state)
    }

    /// Whether the verify control should be enabled for the given input.
    pub async fn can_verify(&self, code: &str) -> bool {
        self.view().await.can_verify(code)
    }

    pub async fn analyze(&self, raw_url: &str) -> IntentOutcome {
        let intent = IntentKind::Analyze;
        let url = match validate_url(raw_url) {
            Ok(url) => url,
            Err(err) => return self.reject(intent, err).await,
        };
        let flight = match self.begin(intent).await {
            Ok(flight) => flight,
            Err(outcome) => return outcome,
        };

        let result = self.backend.quick_analyze(&url).await;
        self.finish(intent, flight.epoch, |state| {
            let response = result?;
            let echoed = response.url.trim();
            state.url = Some(if echoed.is_empty() {
                url
            } else {
                echoed.to_string()
            });
            state.quick_result = Some(response.quick_result());
            state.analysis_id = Some(response.analysis_id);
            state.step = Step::QuickGrade;
            Ok(())
        })
        .await
    }

    pub async fn request_report(&self, raw_email: &str) -> IntentOutcome {
        let intent = IntentKind::RequestReport;
        let email = match required(raw_email, ValidationError::EmptyEmail) {
            Ok(email) => email,
            Err(err) => return self.reject(intent, err).await,
        };
        let flight = match self.begin(intent).await {
            Ok(flight) => flight,
            Err(outcome) => return outcome,
        };
        let Some(url) = flight.state.url.clone() else {
            return self.abandon(intent, flight.epoch).await;
        };

        let result = self.backend.request_report(&url, &email).await;
        self.finish(intent, flight.epoch, |state| {
            result?;
            state.email = Some(email);
            state.email_verified = false;
            state.report = None;
            state.success = Some(REPORT_REQUESTED_MESSAGE.to_string());
            state.step = Step::VerifyEmail;
            Ok(())
        })
        .await
    }

    /// Verifies the code, then fetches the report. If verification already succeeded on an
    /// earlier attempt whose report fetch failed, only the fetch is retried.
    pub async fn verify(&self, raw_code: &str) -> IntentOutcome {
        let intent = IntentKind::Verify;
        let code = match normalize_verification_code(raw_code) {
            Ok(code) => code,
            Err(err) => return self.reject(intent, err).await,
        };
        let flight = match self.begin(intent).await {
            Ok(flight) => flight,
            Err(outcome) => return outcome,
        };
        let (Some(email), Some(analysis_id)) =
            (flight.state.email.clone(), flight.state.analysis_id.clone())
        else {
            return self.abandon(intent, flight.epoch).await;
        };

        if !flight.state.email_verified {
            if let Err(err) = self.backend.verify_email(&email, &code).await {
                return self.finish(intent, flight.epoch, |_| Err(err)).await;
            }
            if !self
                .touch(flight.epoch, |state| {
                    state.email_verified = true;
                    state.success = Some(EMAIL_VERIFIED_MESSAGE.to_string());
                })
                .await
            {
                return IntentOutcome::Discarded;
            }
        }

        let result = self.backend.fetch_report(&analysis_id).await;
        self.finish(intent, flight.epoch, |state| {
            let report = result?;
            state.report = Some(report);
            state.report_view = ReportView::Summary;
            state.step = Step::DetailedReport;
            Ok(())
        })
        .await
    }

    pub async fn resend(&self) -> IntentOutcome {
        let intent = IntentKind::Resend;
        let flight = match self.begin(intent).await {
            Ok(flight) => flight,
            Err(outcome) => return outcome,
        };
        let Some(email) = flight.state.email.clone() else {
            return self.abandon(intent, flight.epoch).await;
        };

        let result = self.backend.resend_verification(&email).await;
        self.finish(intent, flight.epoch, |state| {
            result?;
            state.success = Some(CODE_RESENT_MESSAGE.to_string());
            Ok(())
        })
        .await
    }

    pub async fn choose_diy(&self) -> IntentOutcome {
        self.navigate(IntentKind::ChooseDiy, |state| {
            state.report_view = ReportView::DiySteps;
        })
        .await
    }

    pub async fn choose_report(&self) -> IntentOutcome {
        self.navigate(IntentKind::ChooseReport, |state| {
            state.report_view = ReportView::Summary;
        })
        .await
    }

    pub async fn choose_hire(&self) -> IntentOutcome {
        self.navigate(IntentKind::ChooseHire, |state| {
            state.hire_submitted = false;
            state.step = Step::HireForm;
        })
        .await
    }

    pub async fn back_to_report(&self) -> IntentOutcome {
        self.navigate(IntentKind::BackToReport, |state| {
            state.report_view = ReportView::Summary;
            state.step = Step::DetailedReport;
        })
        .await
    }

    pub async fn load_diy_steps(&self) -> IntentOutcome {
        let intent = IntentKind::LoadDiySteps;
        let flight = match self.begin(intent).await {
            Ok(flight) => flight,
            Err(outcome) => return outcome,
        };
        let Some(analysis_id) = flight.state.analysis_id.clone() else {
            return self.abandon(intent, flight.epoch).await;
        };

        let result = self.backend.fetch_steps(&analysis_id).await;
        self.finish(intent, flight.epoch, |state| {
            state.diy_steps = result?;
            Ok(())
        })
        .await
    }

    pub async fn toggle_step(&self, step_id: &StepId, completed: bool) -> IntentOutcome {
        let intent = IntentKind::ToggleStep;
        let known = self
            .inner
            .lock()
            .await
            .state
            .diy_steps
            .iter()
            .any(|step| &step.id == step_id);
        if !known {
            return self
                .reject(intent, ValidationError::UnknownStep(step_id.clone()))
                .await;
        }
        let flight = match self.begin(intent).await {
            Ok(flight) => flight,
            Err(outcome) => return outcome,
        };

        let result = self.backend.update_step(step_id, completed).await;
        self.finish(intent, flight.epoch, |state| {
            let updated = result?;
            if let Some(step) = state.diy_steps.iter_mut().find(|step| step.id == *step_id) {
                step.completed = updated.completed;
            }
            Ok(())
        })
        .await
    }

    pub async fn submit_hire(&self, fields: HireFields) -> IntentOutcome {
        let intent = IntentKind::SubmitHire;
        let name = match required(&fields.name, ValidationError::EmptyName) {
            Ok(name) => name,
            Err(err) => return self.reject(intent, err).await,
        };
        let flight = match self.begin(intent).await {
            Ok(flight) => flight,
            Err(outcome) => return outcome,
        };
        let Some(site_id) = flight.state.analysis_id.clone() else {
            return self.abandon(intent, flight.epoch).await;
        };

        let or_captured = |value: String, captured: &Option<String>| {
            let value = value.trim().to_string();
            if value.is_empty() {
                captured.clone().unwrap_or_default()
            } else {
                value
            }
        };
        let request = HireRequest {
            name,
            company: fields.company.trim().to_string(),
            website: or_captured(fields.website, &flight.state.url),
            phone: fields.phone.trim().to_string(),
            message: fields.message.trim().to_string(),
            email: or_captured(fields.email, &flight.state.email),
            site_id,
        };

        let result = self.backend.submit_hire(&request).await;
        self.finish(intent, flight.epoch, |state| {
            result?;
            state.hire_submitted = true;
            state.success = Some(HIRE_SUBMITTED_MESSAGE.to_string());
            Ok(())
        })
        .await
    }

    /// Returns to the entry point with every field at its initial value. Any call still in
    /// flight is abandoned; its result will be discarded, and new calls are refused as
    /// `Busy` until it returns.
    pub async fn reset_to_home(&self) -> IntentOutcome {
        let snapshot = {
            let mut guard = self.inner.lock().await;
            guard.epoch += 1;
            guard.state = WorkflowState::default();
            guard.state.clone()
        };
        info!("workflow: reset to home");
        let _ = self.events.send(FunnelEvent::StateChanged(snapshot));
        IntentOutcome::Applied
    }

    async fn navigate(
        &self,
        intent: IntentKind,
        apply: impl FnOnce(&mut WorkflowState),
    ) -> IntentOutcome {
        let snapshot = {
            let mut guard = self.inner.lock().await;
            let state = &mut guard.state;
            if state.loading {
                return IntentOutcome::Busy;
            }
            if !state.step.permits(intent) || state.report.is_none() {
                return not_permitted(state.step, intent);
            }
            state.clear_messages();
            apply(state);
            state.clone()
        };
        info!(intent = intent.as_str(), step = %snapshot.step, "workflow: navigated");
        let _ = self.events.send(FunnelEvent::StateChanged(snapshot));
        IntentOutcome::Applied
    }

    async fn reject(&self, intent: IntentKind, err: ValidationError) -> IntentOutcome {
        let snapshot = {
            let mut guard = self.inner.lock().await;
            let state = &mut guard.state;
            if state.loading {
                return IntentOutcome::Busy;
            }
            if !state.step.permits(intent) {
                return not_permitted(state.step, intent);
            }
            state.success = None;
            state.error = Some(err.to_string());
            state.clone()
        };
        info!(intent = intent.as_str(), "workflow: rejected before dispatch: {err}");
        let _ = self.events.send(FunnelEvent::StateChanged(snapshot));
        IntentOutcome::Rejected(err)
    }

    async fn begin(&self, intent: IntentKind) -> Result<InFlight, IntentOutcome> {
        let flight = {
            let mut guard = self.inner.lock().await;
            if guard.in_flight || guard.state.loading {
                info!(intent = intent.as_str(), "workflow: ignored while loading");
                return Err(IntentOutcome::Busy);
            }
            if !guard.state.step.permits(intent) {
                return Err(not_permitted(guard.state.step, intent));
            }
            guard.in_flight = true;
            let epoch = guard.epoch;
            let state = &mut guard.state;
            state.clear_messages();
            state.loading = true;
            InFlight {
                epoch,
                state: state.clone(),
            }
        };
        info!(intent = intent.as_str(), step = %flight.state.step, "workflow: dispatching");
        let _ = self
            .events
            .send(FunnelEvent::StateChanged(flight.state.clone()));
        Ok(flight)
    }

    /// Applies an intermediate update while the intent is still in flight. Returns false if
    /// the session was reset in the meantime.
    async fn touch(&self, epoch: u64, apply: impl FnOnce(&mut WorkflowState)) -> bool {
        let snapshot = {
            let mut guard = self.inner.lock().await;
            if guard.epoch != epoch {
                guard.in_flight = false;
                return false;
            }
            apply(&mut guard.state);
            guard.state.clone()
        };
        let _ = self.events.send(FunnelEvent::StateChanged(snapshot));
        true
    }

    async fn finish(
        &self,
        intent: IntentKind,
        epoch: u64,
        apply: impl FnOnce(&mut WorkflowState) -> Result<(), GatewayError>,
    ) -> IntentOutcome {
        let (outcome, snapshot) = {
            let mut guard = self.inner.lock().await;
            guard.in_flight = false;
            if guard.epoch != epoch {
                info!(intent = intent.as_str(), "workflow: discarded result after reset");
                return IntentOutcome::Discarded;
            }
            let state = &mut guard.state;
            state.loading = false;

            // Apply to a scratch copy so a failure can never leave a half-merged state.
            let mut next = state.clone();
            let outcome = match apply(&mut next) {
                Ok(()) => {
                    *state = next;
                    IntentOutcome::Applied
                }
                Err(err) => {
                    state.success = None;
                    state.error = Some(err.to_string());
                    IntentOutcome::Failed(err)
                }
            };
            (outcome, state.clone())
        };

        match &outcome {
            IntentOutcome::Failed(err) => {
                warn!(intent = intent.as_str(), step = %snapshot.step, "workflow: call failed: {err}")
            }
            _ => info!(intent = intent.as_str(), step = %snapshot.step, "workflow: applied"),
        }
        let _ = self.events.send(FunnelEvent::StateChanged(snapshot));
        outcome
    }

    /// Clears the loading flag for an intent whose required identifiers are missing.
    async fn abandon(&self, intent: IntentKind, epoch: u64) -> IntentOutcome {
        let snapshot = {
            let mut guard = self.inner.lock().await;
            guard.in_flight = false;
            if guard.epoch == epoch {
                guard.state.loading = false;
            }
            guard.state.clone()
        };
        let _ = self
            .events
            .send(FunnelEvent::StateChanged(snapshot.clone()));
        not_permitted(snapshot.step, intent)
    }
}

fn not_permitted(step: Step, intent: IntentKind) -> IntentOutcome {
    warn!(intent = intent.as_str(), %step, "workflow: intent not permitted from this step");
    IntentOutcome::NotPermitted { step, intent }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
