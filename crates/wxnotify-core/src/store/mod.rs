// # Built-in Collaborators
//
// In-process and file-backed implementations of the collaborator traits.
// Used by tests and by single-process deployments; networked backends live
// in the plugin crates.

pub mod file_repository;
pub mod memory_broker;
pub mod memory_cache;
pub mod memory_repository;

pub use file_repository::FileSubscriptionRepository;
pub use memory_broker::MemoryBroker;
pub use memory_cache::{MemoryCache, MemoryCacheFactory};
pub use memory_repository::MemorySubscriptionRepository;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::Error;
use crate::model::{Frequency, Subscription};

/// Confirmed subscriptions of one frequency, in id order
fn confirmed_by_frequency(
    records: &BTreeMap<u64, Subscription>,
    frequency: Frequency,
) -> Vec<Subscription> {
    records
        .values()
        .filter(|s| s.confirmed && s.frequency == frequency)
        .cloned()
        .collect()
}

/// Advance `last_sent_at`, never backwards
///
/// Returns whether the stored value changed.
fn advance_last_sent(
    records: &mut BTreeMap<u64, Subscription>,
    id: u64,
    at: DateTime<Utc>,
) -> Result<bool, Error> {
    let subscription = records
        .get_mut(&id)
        .ok_or_else(|| Error::repository(format!("Unknown subscription id {}", id)))?;

    match subscription.last_sent_at {
        Some(current) if current >= at => Ok(false),
        _ => {
            subscription.last_sent_at = Some(at);
            Ok(true)
        }
    }
}
