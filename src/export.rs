//! Export job orchestration: request validation, the state machine, and the
//! downloadable artifact.
//!
//! One job runs at a time: Idle -> Preparing -> Generating -> Complete, with
//! Failed reachable from Preparing or Generating. Simulated progress ticks
//! and the real remote resolution are independent inputs; the job completes
//! only once the progress sequence has reached 100 AND the remote call has
//! resolved, whichever finishes last.

use chrono::Local;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api_client::{ExportOutcome, ServiceError};
use crate::filter_state::FilterState;

/// Simulated progress sequence, one value per tick. Strictly increasing.
const PROGRESS_STEPS: [u8; 10] = [12, 27, 41, 55, 68, 79, 88, 94, 98, 100];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pdf" => Some(ExportFormat::Pdf),
            "xlsx" => Some(ExportFormat::Xlsx),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Csv => "text/csv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportField {
    Title,
    Entity,
    Source,
    Category,
    Status,
    Amount,
    Deadline,
    DaysRemaining,
    Description,
    Link,
}

impl ExportField {
    /// Fields every export carries; callers cannot deselect these.
    pub fn mandatory() -> &'static [ExportField] {
        &[ExportField::Title, ExportField::Entity, ExportField::Deadline]
    }

    pub fn is_mandatory(&self) -> bool {
        Self::mandatory().contains(self)
    }

    pub fn all() -> &'static [ExportField] {
        &[
            ExportField::Title,
            ExportField::Entity,
            ExportField::Source,
            ExportField::Category,
            ExportField::Status,
            ExportField::Amount,
            ExportField::Deadline,
            ExportField::DaysRemaining,
            ExportField::Description,
            ExportField::Link,
        ]
    }
}

/// What set of records the export covers
#[derive(Debug, Clone, PartialEq)]
pub enum ExportScope {
    /// Explicitly selected record ids
    Selection(Vec<String>),
    /// Every record matching the given filter state
    Filter(FilterState),
}

impl ExportScope {
    pub fn is_selection(&self) -> bool {
        matches!(self, ExportScope::Selection(_))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExportValidationError {
    #[error("no fields selected for export")]
    NoFields,
    #[error("selection export requested with an empty selection")]
    EmptySelection,
    #[error("invalid delivery address: {0}")]
    InvalidEmail(String),
    #[error("an export is already running")]
    AlreadyRunning,
}

/// A confirmed export request, as assembled by the confirmation step
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub format: ExportFormat,
    pub fields: Vec<ExportField>,
    pub scope: ExportScope,
    pub delivery_email: Option<String>,
    pub include_filters: bool,
    pub include_stats: bool,
}

impl ExportRequest {
    /// Quick export: the fixed minimal field list, no extras.
    pub fn quick(format: ExportFormat, scope: ExportScope) -> Self {
        Self {
            format,
            fields: ExportField::mandatory().to_vec(),
            scope,
            delivery_email: None,
            include_filters: false,
            include_stats: false,
        }
    }

    pub fn validate(&self) -> Result<(), ExportValidationError> {
        if self.fields.is_empty() {
            return Err(ExportValidationError::NoFields);
        }
        if let ExportScope::Selection(ids) = &self.scope {
            if ids.is_empty() {
                return Err(ExportValidationError::EmptySelection);
            }
        }
        if let Some(email) = &self.delivery_email {
            if !email_looks_valid(email) {
                return Err(ExportValidationError::InvalidEmail(email.clone()));
            }
        }
        Ok(())
    }

    /// Requested fields with the mandatory set folded back in, in canonical
    /// field order without duplicates.
    pub fn resolved_fields(&self) -> Vec<ExportField> {
        ExportField::all()
            .iter()
            .copied()
            .filter(|field| field.is_mandatory() || self.fields.contains(field))
            .collect()
    }
}

fn email_looks_valid(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    let re = EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email pattern")
    });
    re.is_match(email)
}

/// Wire body for the remote export endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub format: ExportFormat,
    pub fields: Vec<ExportField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterState>,
    pub include_filters: bool,
    pub include_stats: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_email: Option<String>,
}

impl ExportPayload {
    pub fn from_request(request: &ExportRequest) -> Self {
        let (ids, filters) = match &request.scope {
            ExportScope::Selection(ids) => (Some(ids.clone()), None),
            ExportScope::Filter(filters) => (None, Some(filters.clone())),
        };
        Self {
            format: request.format,
            fields: request.resolved_fields(),
            ids,
            filters,
            include_filters: request.include_filters,
            include_stats: request.include_stats,
            delivery_email: request.delivery_email.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    Idle,
    Preparing,
    Generating,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
enum RemoteState {
    Idle,
    Pending,
    Resolved(ExportOutcome),
}

/// A downloadable artifact wrapping the remote payload
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    fn build(format: ExportFormat, bytes: Vec<u8>) -> Self {
        let filename = format!(
            "bandi-iss-{}.{}",
            Local::now().format("%Y-%m-%d"),
            format.extension()
        );
        Self {
            filename,
            content_type: format.content_type(),
            bytes,
        }
    }
}

/// How a completed job resolved
#[derive(Debug, Clone, PartialEq)]
pub enum ExportResult {
    Download(ExportArtifact),
    EmailDelivery,
}

pub struct ExportJob {
    status: ExportStatus,
    request: Option<ExportRequest>,
    progress: u8,
    step: usize,
    remote: RemoteState,
    result: Option<ExportResult>,
    error: Option<String>,
    finished_at: Option<Instant>,
    cooldown: Duration,
}

impl ExportJob {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            status: ExportStatus::Idle,
            request: None,
            progress: 0,
            step: 0,
            remote: RemoteState::Idle,
            result: None,
            error: None,
            finished_at: None,
            cooldown,
        }
    }

    pub fn status(&self) -> ExportStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn request(&self) -> Option<&ExportRequest> {
        self.request.as_ref()
    }

    pub fn result(&self) -> Option<&ExportResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_idle(&self) -> bool {
        self.status == ExportStatus::Idle
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ExportStatus::Complete | ExportStatus::Failed)
    }

    /// Accept a confirmed request and enter Preparing.
    ///
    /// A rejected request leaves the job in Idle; the error is the
    /// user-visible validation message.
    pub fn begin(&mut self, request: ExportRequest) -> Result<(), ExportValidationError> {
        if self.status != ExportStatus::Idle {
            return Err(ExportValidationError::AlreadyRunning);
        }
        request.validate()?;

        info!(
            target: "export",
            format = request.format.as_str(),
            selection = request.scope.is_selection(),
            email = request.delivery_email.is_some(),
            "export accepted"
        );
        self.request = Some(request);
        self.status = ExportStatus::Preparing;
        self.progress = 0;
        self.step = 0;
        self.remote = RemoteState::Idle;
        self.result = None;
        self.error = None;
        self.finished_at = None;
        Ok(())
    }

    /// The remote call has been constructed and dispatched.
    pub fn dispatched(&mut self) {
        if self.status != ExportStatus::Preparing {
            warn!(target: "export", status = ?self.status, "dispatched outside Preparing, ignoring");
            return;
        }
        self.status = ExportStatus::Generating;
        self.progress = 0;
        self.remote = RemoteState::Pending;
    }

    /// Advance the simulated progress sequence by one step.
    pub fn tick(&mut self) {
        if self.status != ExportStatus::Generating {
            return;
        }
        if self.step < PROGRESS_STEPS.len() {
            self.progress = PROGRESS_STEPS[self.step];
            self.step += 1;
        }
        self.try_finish();
    }

    /// Record the remote call's resolution.
    pub fn resolve_remote(&mut self, outcome: Result<ExportOutcome, ServiceError>) {
        match self.status {
            ExportStatus::Preparing | ExportStatus::Generating => {}
            _ => {
                debug!(target: "export", status = ?self.status, "late remote resolution, ignoring");
                return;
            }
        }
        match outcome {
            Ok(resolved) => {
                self.remote = RemoteState::Resolved(resolved);
                self.try_finish();
            }
            Err(err) => self.fail(err.to_string()),
        }
    }

    /// Move to Failed from Preparing or Generating. No automatic retry; the
    /// user must re-initiate once the cooldown has returned the job to Idle.
    pub fn fail(&mut self, message: String) {
        match self.status {
            ExportStatus::Preparing | ExportStatus::Generating => {}
            _ => return,
        }
        warn!(target: "export", error = %message, "export failed");
        self.status = ExportStatus::Failed;
        self.error = Some(message);
        self.result = None;
        self.finished_at = Some(Instant::now());
    }

    // Rendezvous: both the progress sequence and the remote call gate
    // completion; whichever finishes last triggers the transition.
    fn try_finish(&mut self) {
        if self.status != ExportStatus::Generating || self.progress < 100 {
            return;
        }
        let outcome = match &self.remote {
            RemoteState::Resolved(outcome) => outcome.clone(),
            _ => return,
        };
        let Some(request) = self.request.as_ref() else {
            return;
        };

        let result = match outcome {
            ExportOutcome::DeliveryAccepted => ExportResult::EmailDelivery,
            ExportOutcome::Payload(bytes) => {
                ExportResult::Download(ExportArtifact::build(request.format, bytes))
            }
        };
        info!(
            target: "export",
            format = request.format.as_str(),
            delivered = matches!(result, ExportResult::EmailDelivery),
            "export complete"
        );
        self.result = Some(result);
        self.status = ExportStatus::Complete;
        self.finished_at = Some(Instant::now());
    }

    /// Return a terminal job to Idle once the display cooldown has elapsed.
    pub fn maybe_reset(&mut self, now: Instant) -> bool {
        if !self.is_terminal() {
            return false;
        }
        let Some(finished_at) = self.finished_at else {
            return false;
        };
        if now.duration_since(finished_at) < self.cooldown {
            return false;
        }
        self.request = None;
        self.status = ExportStatus::Idle;
        self.progress = 0;
        self.step = 0;
        self.remote = RemoteState::Idle;
        self.result = None;
        self.error = None;
        self.finished_at = None;
        true
    }
}
