// # Memory Subscription Repository
//
// In-memory implementation of SubscriptionRepository.
//
// Records are lost on restart. Useful for tests and demos.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::{Frequency, Subscription};
use crate::traits::SubscriptionRepository;

/// In-memory subscription repository
///
/// Cloning shares the underlying records.
#[derive(Debug, Clone, Default)]
pub struct MemorySubscriptionRepository {
    records: Arc<RwLock<BTreeMap<u64, Subscription>>>,
}

impl MemorySubscriptionRepository {
    /// Create a repository seeded with `subscriptions`
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        let records = subscriptions.into_iter().map(|s| (s.id, s)).collect();
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Insert or replace a subscription
    pub async fn insert(&self, subscription: Subscription) {
        self.records.write().await.insert(subscription.id, subscription);
    }

    /// Look up a subscription by id
    pub async fn get(&self, id: u64) -> Option<Subscription> {
        self.records.read().await.get(&id).cloned()
    }

    /// Number of stored subscriptions
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// True when empty
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriptionRepository for MemorySubscriptionRepository {
    async fn get_confirmed_by_frequency(
        &self,
        frequency: Frequency,
    ) -> Result<Vec<Subscription>, Error> {
        let records = self.records.read().await;
        Ok(super::confirmed_by_frequency(&records, frequency))
    }

    async fn update_last_sent(&self, id: u64, at: DateTime<Utc>) -> Result<(), Error> {
        let mut records = self.records.write().await;
        super::advance_last_sent(&mut records, id, at)?;
        Ok(())
    }
}
