#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberStatus {
    Subscribed,
    Unconfirmed,
    Unsubscribed,
    Inactive,
    Bounced,
}

/// Statuses that have their own trash-transition job.
pub const TRASHABLE_STATUSES: [SubscriberStatus; 4] = [
    SubscriberStatus::Inactive,
    SubscriberStatus::Unconfirmed,
    SubscriberStatus::Unsubscribed,
    SubscriberStatus::Bounced,
];

impl SubscriberStatus {
    /// Statuses a subscriber may still leave on its own, so they get a long grace period.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            SubscriberStatus::Inactive | SubscriberStatus::Unconfirmed
        )
    }

    /// Negative statuses that are cleaned up quickly.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriberStatus::Unsubscribed | SubscriberStatus::Bounced
        )
    }

    pub fn parse(status: String) -> Result<SubscriberStatus, String> {
        match status.as_str() {
            "subscribed" => Ok(SubscriberStatus::Subscribed),
            "unconfirmed" => Ok(SubscriberStatus::Unconfirmed),
            "unsubscribed" => Ok(SubscriberStatus::Unsubscribed),
            "inactive" => Ok(SubscriberStatus::Inactive),
            "bounced" => Ok(SubscriberStatus::Bounced),
            _ => Err(format!("{} is not a valid subscriber status", status)),
        }
    }
}

impl AsRef<str> for SubscriberStatus {
    fn as_ref(&self) -> &str {
        match self {
            SubscriberStatus::Subscribed => "subscribed",
            SubscriberStatus::Unconfirmed => "unconfirmed",
            SubscriberStatus::Unsubscribed => "unsubscribed",
            SubscriberStatus::Inactive => "inactive",
            SubscriberStatus::Bounced => "bounced",
        }
    }
}

impl std::fmt::Display for SubscriberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}
