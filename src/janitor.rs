//! Retention engine: moves stale subscribers to the trash and purges the trash.
//!
//! Both jobs are best-effort. A missing subscriber API, a failed query or a
//! vanished row is logged and skipped; the next scheduled tick picks up
//! whatever was left behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::counters::CounterStore;
use crate::domain::job::{JobKey, JobName, DELETED_COUNTER};
use crate::domain::retention_policy::RetentionPolicy;
use crate::domain::subscriber_status::SubscriberStatus;
use crate::scheduler::JobRunner;
use crate::store::SubscriberStore;
use crate::subscriber_api::SubscriberApi;

pub struct Janitor {
    subscriber_api: Option<Arc<dyn SubscriberApi>>,
    store: Arc<dyn SubscriberStore>,
    counters: Arc<dyn CounterStore>,
    policy: RetentionPolicy,
}

impl Janitor {
    pub fn new(
        subscriber_api: Option<Arc<dyn SubscriberApi>>,
        store: Arc<dyn SubscriberStore>,
        counters: Arc<dyn CounterStore>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            subscriber_api,
            store,
            counters,
            policy,
        }
    }

    /// Soft-deletes every unlinked subscriber in `status` last updated before the
    /// status cutoff. Returns how many subscribers were moved to the trash.
    #[tracing::instrument(
        name = "Moving subscribers to the trash",
        skip(self, status, now),
        fields(status = %status)
    )]
    pub async fn move_to_trash(&self, status: SubscriberStatus, now: DateTime<Utc>) -> u64 {
        let Some(subscriber_api) = self.subscriber_api.as_ref() else {
            tracing::warn!("Subscriber API is not available, skipping run");
            return 0;
        };

        let Some(cutoff) = self.policy.trash_cutoff(status, now) else {
            tracing::warn!("Subscribers with status {} are never moved to the trash", status);
            return 0;
        };

        let subscribers = match subscriber_api.list_subscribers(status).await {
            Ok(subscribers) => subscribers,
            Err(err) => {
                tracing::error!("Failed to list subscribers: {:?}", err);
                return 0;
            }
        };

        if subscribers.is_empty() {
            return 0;
        }

        let mut moved = 0;

        for subscriber in subscribers {
            if subscriber.is_linked_account() || subscriber.is_trashed() {
                continue;
            }

            if subscriber.updated_at >= cutoff {
                continue;
            }

            match self.store.mark_trashed(subscriber.id, now).await {
                Ok(true) => moved += 1,
                Ok(false) => {
                    tracing::debug!("Subscriber {} was already trashed or removed", subscriber.id)
                }
                Err(err) => {
                    tracing::error!("Failed to trash subscriber {}: {:?}", subscriber.id, err)
                }
            }
        }

        self.record(status.as_ref(), moved).await;
        tracing::info!("Moved {} subscribers to the trash", moved);

        moved
    }

    /// Hard-deletes every trashed, unlinked subscriber whose `deleted_at` is older
    /// than the purge cutoff, together with its dependent rows. Returns how many
    /// subscribers were purged.
    #[tracing::instrument(name = "Purging trashed subscribers", skip(self, now))]
    pub async fn purge_trash(&self, now: DateTime<Utc>) -> u64 {
        let Some(subscriber_api) = self.subscriber_api.as_ref() else {
            tracing::warn!("Subscriber API is not available, skipping run");
            return 0;
        };

        let candidates = match self.store.trashed_subscribers().await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::error!("Failed to fetch trashed subscribers: {:?}", err);
                return 0;
            }
        };

        if candidates.is_empty() {
            return 0;
        }

        let cutoff = self.policy.purge_cutoff(now);
        let mut purged = 0;

        for candidate in candidates {
            // The subscriber may have been restored or linked since the trash was listed.
            let subscriber = match subscriber_api.get_subscriber(candidate.id).await {
                Ok(Some(subscriber)) => subscriber,
                Ok(None) => continue,
                Err(err) => {
                    tracing::error!("Failed to fetch subscriber {}: {:?}", candidate.id, err);
                    continue;
                }
            };

            if subscriber.is_linked_account() {
                continue;
            }

            match subscriber.deleted_at {
                Some(deleted_at) if deleted_at < cutoff => {}
                Some(_) => continue,
                None => {
                    tracing::debug!("Subscriber {} left the trash, keeping it", subscriber.id);
                    continue;
                }
            }

            match self.store.delete_cascade(candidate.id).await {
                Ok(true) => purged += 1,
                Ok(false) => {
                    tracing::debug!("Subscriber {} was restored or already removed", candidate.id)
                }
                Err(err) => {
                    tracing::error!("Failed to purge subscriber {}: {:?}", candidate.id, err)
                }
            }
        }

        self.record(DELETED_COUNTER, purged).await;
        tracing::info!("Purged {} subscribers from the trash", purged);

        purged
    }

    /// Read-modify-write of a single counter, not atomic across overlapping runs.
    async fn record(&self, key: &str, affected: u64) {
        let mut counters = match self.counters.load().await {
            Ok(counters) => counters,
            Err(err) => {
                tracing::error!(
                    "Failed to load job counters, dropping {} {}: {:?}",
                    affected,
                    key,
                    err
                );
                return;
            }
        };

        counters.increment(key, affected);

        if let Err(err) = self.counters.save(&counters).await {
            tracing::error!("Failed to store job counters: {:?}", err);
        }
    }
}

#[async_trait]
impl JobRunner for Janitor {
    async fn run(&self, job: &JobKey) {
        let now = Utc::now();

        match (job.name, job.payload) {
            (JobName::MoveToTrash, Some(status)) => {
                self.move_to_trash(status, now).await;
            }
            (JobName::PurgeTrash, _) => {
                self.purge_trash(now).await;
            }
            (JobName::MoveToTrash, None) => {
                tracing::warn!("Job {} was triggered without a status", job);
            }
        }
    }
}
