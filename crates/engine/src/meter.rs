//! Per-step billing sink.

use std::sync::{Arc, Mutex};

use tracing::debug;

use tools::{BillingSink, Charge};

use crate::models::Usage;
use crate::pricing::PricingTable;
use crate::quota::QuotaTracker;

/// Prices every charge a tool reports, totals it for the step, and posts it
/// to the user's daily ledger as it happens.
pub struct StepMeter {
    user_id: String,
    pricing: Arc<PricingTable>,
    quota: Arc<QuotaTracker>,
    totals: Mutex<Usage>,
}

impl StepMeter {
    pub fn new(user_id: &str, pricing: Arc<PricingTable>, quota: Arc<QuotaTracker>) -> Self {
        Self {
            user_id: user_id.to_owned(),
            pricing,
            quota,
            totals: Mutex::new(Usage::default()),
        }
    }

    pub fn totals(&self) -> Usage {
        *self.totals.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BillingSink for StepMeter {
    fn bill(&self, charge: Charge) -> f64 {
        let credits = self.pricing.credits_for(
            &charge.model,
            &charge.label,
            charge.tokens_in,
            charge.tokens_out,
        );

        self.totals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .add(Usage {
                tokens_in: charge.tokens_in,
                tokens_out: charge.tokens_out,
                credits,
            });
        self.quota.charge(&self.user_id, credits);

        debug!(
            label = %charge.label,
            model = %charge.model,
            tokens_in = charge.tokens_in,
            tokens_out = charge.tokens_out,
            credits,
            "charge recorded"
        );
        credits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::ModelRate;

    fn charge(label: &str, tokens_in: u64, tokens_out: u64) -> Charge {
        Charge {
            tokens_in,
            tokens_out,
            label: label.into(),
            model: "m".into(),
            meta: None,
        }
    }

    #[test]
    fn accumulates_and_posts_to_ledger() {
        let quota = Arc::new(QuotaTracker::new());
        let pricing = Arc::new(PricingTable::uniform(ModelRate::new(1.0, 2.0)));
        let meter = StepMeter::new("u1", pricing, quota.clone());

        assert_eq!(meter.bill(charge("llm", 1000, 1000)), 3.0);
        assert_eq!(meter.bill(charge("llm", 500, 0)), 0.5);

        assert_eq!(
            meter.totals(),
            Usage { tokens_in: 1500, tokens_out: 1000, credits: 3.5 }
        );
        assert_eq!(quota.credits_today("u1"), 3.5);
    }
}
