use crate::domain::subscriber_status::{SubscriberStatus, TRASHABLE_STATUSES};

/// Counter entry incremented by the purge job.
pub const DELETED_COUNTER: &str = "deleted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobName {
    MoveToTrash,
    PurgeTrash,
}

impl AsRef<str> for JobName {
    fn as_ref(&self) -> &str {
        match self {
            JobName::MoveToTrash => "move_subscribers_to_trash",
            JobName::PurgeTrash => "delete_subscribers_from_trash",
        }
    }
}

/// Identity of a recurring trigger: a job name plus its optional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub name: JobName,
    pub payload: Option<SubscriberStatus>,
}

impl JobKey {
    pub fn move_to_trash(status: SubscriberStatus) -> Self {
        Self {
            name: JobName::MoveToTrash,
            payload: Some(status),
        }
    }

    pub fn purge_trash() -> Self {
        Self {
            name: JobName::PurgeTrash,
            payload: None,
        }
    }

    /// Every trigger the janitor keeps alive, in install order.
    pub fn all() -> Vec<JobKey> {
        std::iter::once(JobKey::purge_trash())
            .chain(TRASHABLE_STATUSES.into_iter().map(JobKey::move_to_trash))
            .collect()
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.payload {
            Some(status) => write!(f, "{}[{}]", self.name.as_ref(), status),
            None => f.write_str(self.name.as_ref()),
        }
    }
}
