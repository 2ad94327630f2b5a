//! Daily usage gate.
//!
//! A verified license bypasses the counter. Otherwise the stored count is
//! compared against the daily limit, and a count stamped with any date other
//! than today reads as zero and is reset lazily on the next check.

use crate::license::{LicenseError, LicenseManager, LicenseStatus};
use crate::store::{KvStore, KvStoreExt, StoreError, LAST_USED, USAGE_COUNT};
use chrono::{Local, NaiveDate};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum UsageError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("license error: {0}")]
    License(#[from] LicenseError),
}

/// Persisted daily counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageRecord {
    pub count: u32,
    /// `None` when nothing (or nothing parseable) has been stored yet
    pub last_reset_date: Option<NaiveDate>,
}

impl UsageRecord {
    /// The count as seen on `today`.
    pub fn count_on(&self, today: NaiveDate) -> u32 {
        if self.last_reset_date == Some(today) {
            self.count
        } else {
            0
        }
    }
}

/// Where the gate currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    FreeUnderLimit { remaining: u32 },
    FreeAtLimit,
    ProVerified,
    ProCachedOffline,
}

impl GateState {
    pub fn allows_summary(self) -> bool {
        !matches!(self, GateState::FreeAtLimit)
    }

    pub fn is_pro(self) -> bool {
        matches!(self, GateState::ProVerified | GateState::ProCachedOffline)
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::FreeUnderLimit { remaining: 1 } => write!(f, "1 summary remaining today"),
            GateState::FreeUnderLimit { remaining } => {
                write!(f, "{remaining} summaries remaining today")
            }
            GateState::FreeAtLimit => write!(f, "No summaries left today. Resets tomorrow."),
            GateState::ProVerified => write!(f, "Pro license active: unlimited summaries"),
            GateState::ProCachedOffline => {
                write!(f, "Pro license active (offline): unlimited summaries")
            }
        }
    }
}

/// Decides whether a summary may run and counts the ones that do.
pub struct UsageGate {
    store: Arc<dyn KvStore>,
    license: LicenseManager,
    daily_limit: u32,
}

impl UsageGate {
    pub fn new(store: Arc<dyn KvStore>, license: LicenseManager, daily_limit: u32) -> Self {
        Self {
            store,
            license,
            daily_limit,
        }
    }

    pub fn license(&self) -> &LicenseManager {
        &self.license
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub async fn check(&self) -> Result<GateState, UsageError> {
        self.check_on(today()).await
    }

    /// Determine the gate state, re-verifying any cached license first.
    pub async fn check_on(&self, today: NaiveDate) -> Result<GateState, UsageError> {
        let state = match self.license.status().await? {
            LicenseStatus::Verified => GateState::ProVerified,
            LicenseStatus::CachedOffline => GateState::ProCachedOffline,
            LicenseStatus::Unlicensed => self.free_state_on(today)?,
        };
        debug!(?state, "usage gate checked");
        Ok(state)
    }

    /// Free-tier evaluation, resetting a stale counter.
    pub fn free_state_on(&self, today: NaiveDate) -> Result<GateState, UsageError> {
        let record = self.record()?;
        if record.last_reset_date != Some(today) {
            info!(%today, "new day, resetting usage counter");
            self.save(UsageRecord {
                count: 0,
                last_reset_date: Some(today),
            })?;
            return Ok(GateState::FreeUnderLimit {
                remaining: self.daily_limit,
            });
        }

        Ok(if record.count < self.daily_limit {
            GateState::FreeUnderLimit {
                remaining: self.daily_limit - record.count,
            }
        } else {
            GateState::FreeAtLimit
        })
    }

    pub fn record_success(&self, state: GateState) -> Result<Option<UsageRecord>, UsageError> {
        self.record_success_on(today(), state)
    }

    /// Count a completed summary against the free tier.
    ///
    /// Pro states are not counted. Returns the updated record when one was written.
    pub fn record_success_on(
        &self,
        today: NaiveDate,
        state: GateState,
    ) -> Result<Option<UsageRecord>, UsageError> {
        if state.is_pro() {
            return Ok(None);
        }

        let updated = UsageRecord {
            count: self.record()?.count_on(today) + 1,
            last_reset_date: Some(today),
        };
        self.save(updated)?;
        debug!(count = updated.count, "usage recorded");
        Ok(Some(updated))
    }

    /// Stored counter as-is, without applying rollover.
    pub fn record(&self) -> Result<UsageRecord, UsageError> {
        let count = self.store.get_as::<u32>(USAGE_COUNT)?.unwrap_or(0);
        let last_reset_date = self
            .store
            .get_as::<String>(LAST_USED)?
            .and_then(|date| NaiveDate::parse_from_str(&date, DATE_FORMAT).ok());
        Ok(UsageRecord {
            count,
            last_reset_date,
        })
    }

    fn save(&self, record: UsageRecord) -> Result<(), UsageError> {
        let date = record
            .last_reset_date
            .map(|d| d.format(DATE_FORMAT).to_string());
        self.store
            .set_many(&[(USAGE_COUNT, json!(record.count)), (LAST_USED, json!(date))])?;
        Ok(())
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
