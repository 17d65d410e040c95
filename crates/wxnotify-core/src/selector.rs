//! Due-subscription selection
//!
//! [`is_due`] is a pure predicate over a supplied `now`; nothing in this
//! module reads the wall clock.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::model::{Frequency, Subscription};
use crate::traits::SubscriptionRepository;

/// Whether a subscriber is owed an update at `now`
///
/// - never notified: always due, whatever the frequency
/// - unrecognized frequency: never due once notified
/// - otherwise: due iff at least one period has elapsed
pub fn is_due(frequency: Frequency, last_sent_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let Some(last) = last_sent_at else {
        return true;
    };
    match frequency.period() {
        Some(period) => now.signed_duration_since(last) >= period,
        None => false,
    }
}

/// Reads candidates from the repository and keeps the due ones
#[derive(Clone)]
pub struct DueSelector {
    repository: Arc<dyn SubscriptionRepository>,
}

impl DueSelector {
    pub fn new(repository: Arc<dyn SubscriptionRepository>) -> Self {
        Self { repository }
    }

    /// Confirmed subscriptions of `frequency` that are due at `now`
    pub async fn get_due(&self, frequency: Frequency, now: DateTime<Utc>) -> Result<Vec<Subscription>> {
        let candidates = self.repository.get_confirmed_by_frequency(frequency).await?;
        let total = candidates.len();

        let due: Vec<Subscription> = candidates
            .into_iter()
            .filter(|s| s.confirmed && is_due(s.frequency, s.last_sent_at, now))
            .collect();

        debug!(frequency = %frequency, candidates = total, due = due.len(), "Selected due subscriptions");
        Ok(due)
    }
}
