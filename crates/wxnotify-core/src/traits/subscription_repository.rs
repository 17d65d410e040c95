// # Subscription Repository Trait
//
// Persistent storage of subscriber records. Storage itself is outside the
// pipeline; the core only reads due candidates and advances `last_sent_at`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{Frequency, Subscription};

/// Trait for subscription storage
///
/// # Invariants
///
/// - `get_confirmed_by_frequency` returns confirmed subscriptions only
/// - `update_last_sent` never moves `last_sent_at` backwards; an older
///   timestamp than the stored one is a no-op
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// All confirmed subscriptions with the given frequency
    async fn get_confirmed_by_frequency(
        &self,
        frequency: Frequency,
    ) -> Result<Vec<Subscription>, crate::Error>;

    /// Record that an update was published for subscription `id` at `at`
    ///
    /// # Returns
    ///
    /// - `Ok(())`: stored (or already newer)
    /// - `Err(Error::Repository)`: unknown id or storage failure
    async fn update_last_sent(&self, id: u64, at: DateTime<Utc>) -> Result<(), crate::Error>;
}
