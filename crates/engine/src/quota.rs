//! Per-user quota bookkeeping shared by every run in the process.
//!
//! One mutex guards both the active-run counts and the daily credit ledger,
//! so "check the limit, then reserve" is a single atomic step.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use tracing::debug;

use crate::pricing::PlanQuota;
use crate::EngineError;

#[derive(Debug, Default)]
struct UserUsage {
    active_runs: usize,
    day: Option<NaiveDate>,
    credits_today: f64,
}

impl UserUsage {
    /// Reset the ledger when the UTC date has moved on.
    fn roll_over(&mut self, today: NaiveDate) {
        if self.day != Some(today) {
            self.day = Some(today);
            self.credits_today = 0.0;
        }
    }
}

#[derive(Debug, Default)]
pub struct QuotaTracker {
    users: Mutex<HashMap<String, UserUsage>>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UserUsage>> {
        self.users.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Reserve a concurrent-run slot, failing if the user is at the plan
    /// limit or has already spent the day's credits.
    pub fn acquire(self: &Arc<Self>, user_id: &str, quota: &PlanQuota) -> Result<RunPermit, EngineError> {
        let mut users = self.lock();
        let usage = users.entry(user_id.to_owned()).or_default();
        usage.roll_over(Self::today());

        if usage.active_runs >= quota.max_concurrent_runs {
            return Err(EngineError::ConcurrencyLimit {
                limit: quota.max_concurrent_runs,
            });
        }
        if usage.credits_today >= quota.daily_credits {
            return Err(EngineError::DailyCreditLimit {
                used: usage.credits_today,
                limit: quota.daily_credits,
            });
        }

        usage.active_runs += 1;
        debug!(user_id, active_runs = usage.active_runs, "run slot acquired");

        Ok(RunPermit {
            tracker: Arc::clone(self),
            user_id: user_id.to_owned(),
        })
    }

    /// Fail if the user's spend for today has reached the ceiling.
    pub fn ensure_budget(&self, user_id: &str, quota: &PlanQuota) -> Result<(), EngineError> {
        let used = self.credits_today(user_id);
        if used >= quota.daily_credits {
            return Err(EngineError::DailyCreditLimit {
                used,
                limit: quota.daily_credits,
            });
        }
        Ok(())
    }

    /// Add `credits` to the user's ledger for today.
    pub fn charge(&self, user_id: &str, credits: f64) {
        let mut users = self.lock();
        let usage = users.entry(user_id.to_owned()).or_default();
        usage.roll_over(Self::today());
        usage.credits_today += credits;
    }

    pub fn credits_today(&self, user_id: &str) -> f64 {
        let mut users = self.lock();
        match users.get_mut(user_id) {
            Some(usage) => {
                usage.roll_over(Self::today());
                usage.credits_today
            }
            None => 0.0,
        }
    }

    pub fn active_runs(&self, user_id: &str) -> usize {
        self.lock().get(user_id).map_or(0, |u| u.active_runs)
    }

    /// Preload today's spend, e.g. from the persisted ledger at startup.
    pub fn seed(&self, user_id: &str, credits_today: f64) {
        let mut users = self.lock();
        let usage = users.entry(user_id.to_owned()).or_default();
        usage.day = Some(Self::today());
        usage.credits_today = credits_today;
    }

    fn release(&self, user_id: &str) {
        let mut users = self.lock();
        if let Some(usage) = users.get_mut(user_id) {
            usage.active_runs = usage.active_runs.saturating_sub(1);
            debug!(user_id, active_runs = usage.active_runs, "run slot released");
        }
    }

    #[cfg(test)]
    fn set_day(&self, user_id: &str, day: NaiveDate) {
        if let Some(usage) = self.lock().get_mut(user_id) {
            usage.day = Some(day);
        }
    }
}

/// A held concurrent-run slot. Released on drop.
#[derive(Debug)]
pub struct RunPermit {
    tracker: Arc<QuotaTracker>,
    user_id: String,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.tracker.release(&self.user_id);
    }
}
