//! Extraction → summarisation pipeline.
//!
//! One run is strictly sequential: gate check, extraction, model calls, usage
//! update. A second run started while one is in flight is refused rather
//! than queued.

use crate::agent::{AgentError, SummaryClient};
use crate::scraper::{self, Extraction};
use crate::summary::Summary;
use crate::usage::{GateState, UsageError, UsageGate};
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{info, warn};

/// Pages yielding fewer characters than this are not sent to the model.
pub const MIN_SUMMARY_INPUT: usize = 50;

pub const LIMIT_REACHED_MESSAGE: &str =
    "⚠️ Daily limit reached. Upgrade to Pro for unlimited summaries.";
pub const NOT_ENOUGH_TEXT_MESSAGE: &str = "Couldn't find enough readable text on this page.";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("a summary is already in progress")]
    Busy,
    #[error("daily limit reached")]
    LimitReached,
    #[error("not enough readable text ({0} characters)")]
    NotEnoughText(usize),
    #[error(transparent)]
    Summarize(#[from] AgentError),
    #[error(transparent)]
    Usage(#[from] UsageError),
}

impl PipelineError {
    /// Status text shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Busy => "A summary is already in progress. Please wait.".to_string(),
            PipelineError::LimitReached => LIMIT_REACHED_MESSAGE.to_string(),
            PipelineError::NotEnoughText(_) => NOT_ENOUGH_TEXT_MESSAGE.to_string(),
            PipelineError::Summarize(err) => format!("❌ {err}"),
            PipelineError::Usage(err) => format!("❌ Could not read usage data: {err}"),
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub summary: Summary,
    pub extraction: Extraction,
    /// Gate state after the usage update
    pub state: GateState,
}

/// Clears the in-flight flag when a run ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

pub struct Pipeline {
    client: SummaryClient,
    gate: UsageGate,
    in_flight: AtomicBool,
    clock: Clock,
}

impl Pipeline {
    pub fn new(client: SummaryClient, gate: UsageGate) -> Self {
        Self {
            client,
            gate,
            in_flight: AtomicBool::new(false),
            clock: Arc::new(|| Local::now().date_naive()),
        }
    }

    /// Replace the source of the current local date.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn gate(&self) -> &UsageGate {
        &self.gate
    }

    /// Summarise an HTML page.
    pub async fn run(&self, html: &str) -> Result<Outcome, PipelineError> {
        let _guard = self.begin()?;

        let state = self.gate.check_on((self.clock)()).await?;
        if !state.allows_summary() {
            info!("daily limit reached, refusing summary");
            return Err(PipelineError::LimitReached);
        }

        let extraction = scraper::extract_html(html);
        let usable = extraction.text.trim().chars().count();
        if usable < MIN_SUMMARY_INPUT {
            info!(chars = usable, "not enough readable text");
            return Err(PipelineError::NotEnoughText(usable));
        }

        info!(chars = extraction.char_count, "summarising");
        let summary = self.client.summarize(&extraction.text).await.map_err(|err| {
            warn!(error = %err, "summarisation failed");
            err
        })?;

        // The model calls may have run past midnight.
        let today = (self.clock)();
        self.gate.record_success_on(today, state)?;
        let state = if state.is_pro() {
            state
        } else {
            self.gate.free_state_on(today)?
        };

        Ok(Outcome {
            summary,
            extraction,
            state,
        })
    }

    fn begin(&self) -> Result<InFlight<'_>, PipelineError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::Busy)?;
        Ok(InFlight(&self.in_flight))
    }
}
