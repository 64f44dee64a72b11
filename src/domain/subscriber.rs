use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::subscriber_status::SubscriberStatus;

#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: Uuid,
    pub status: SubscriberStatus,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub wp_user_id: Option<i64>,
    pub is_woocommerce_user: bool,
}

impl Subscriber {
    /// Subscribers bound to a site user or an e-commerce customer are never cleaned up.
    pub fn is_linked_account(&self) -> bool {
        self.wp_user_id.map_or(false, |id| id > 0) || self.is_woocommerce_user
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Subscriber as returned by the subscriber-management service.
#[derive(Deserialize, Debug)]
pub struct SubscriberRecord {
    pub id: Uuid,
    pub status: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub wp_user_id: Option<i64>,
    #[serde(default)]
    pub is_woocommerce_user: bool,
}

impl TryFrom<SubscriberRecord> for Subscriber {
    type Error = String;

    fn try_from(record: SubscriberRecord) -> Result<Self, Self::Error> {
        let status = SubscriberStatus::parse(record.status)?;

        Ok(Subscriber {
            id: record.id,
            status,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
            wp_user_id: record.wp_user_id,
            is_woocommerce_user: record.is_woocommerce_user,
        })
    }
}

/// Row of the subscriber table that already carries a soft-delete timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrashedSubscriber {
    pub id: Uuid,
    pub deleted_at: DateTime<Utc>,
}
