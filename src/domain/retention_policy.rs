use chrono::{DateTime, Duration, Utc};

use crate::domain::subscriber_status::SubscriberStatus;

/// Age thresholds of the active -> trashed -> purged pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Grace period for inactive and unconfirmed subscribers.
    pub soft_status_grace: Duration,
    /// Grace period for unsubscribed and bounced subscribers.
    pub terminal_status_grace: Duration,
    /// Time a trashed subscriber stays in the trash before it is purged.
    pub purge_after: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            soft_status_grace: Duration::days(7),
            terminal_status_grace: Duration::hours(1),
            purge_after: Duration::hours(1),
        }
    }
}

impl RetentionPolicy {
    /// Subscribers in `status` last updated before the returned instant may be trashed.
    /// `None` means the status is never trashed.
    pub fn trash_cutoff(&self, status: SubscriberStatus, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if status.is_soft() {
            Some(now - self.soft_status_grace)
        } else if status.is_terminal() {
            Some(now - self.terminal_status_grace)
        } else {
            None
        }
    }

    /// Trashed subscribers deleted before the returned instant may be purged.
    pub fn purge_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.purge_after
    }
}
