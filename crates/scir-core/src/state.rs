//! Backend-neutral job states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Job state as reported by any backend.
///
/// Every backend maps its own vocabulary onto these values; anything it
/// does not recognize becomes [`JobState::Undetermined`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Unknown to the backend, including jobs that left its listing
    #[default]
    Undetermined,
    /// Queued and eligible to run
    QueuedActive,
    SystemOnHold,
    UserOnHold,
    UserSystemOnHold,
    Running,
    SystemSuspended,
    UserSuspended,
    UserSystemSuspended,
    /// Finished successfully
    Done,
    /// Finished with an error
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 11] = [
        Self::Undetermined,
        Self::QueuedActive,
        Self::SystemOnHold,
        Self::UserOnHold,
        Self::UserSystemOnHold,
        Self::Running,
        Self::SystemSuspended,
        Self::UserSuspended,
        Self::UserSystemSuspended,
        Self::Done,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undetermined => "UNDETERMINED",
            Self::QueuedActive => "QUEUED_ACTIVE",
            Self::SystemOnHold => "SYSTEM_ON_HOLD",
            Self::UserOnHold => "USER_ON_HOLD",
            Self::UserSystemOnHold => "USER_SYSTEM_ON_HOLD",
            Self::Running => "RUNNING",
            Self::SystemSuspended => "SYSTEM_SUSPENDED",
            Self::UserSuspended => "USER_SUSPENDED",
            Self::UserSystemSuspended => "USER_SYSTEM_SUSPENDED",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the job has finished, one way or the other.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn is_on_hold(&self) -> bool {
        matches!(
            self,
            Self::SystemOnHold | Self::UserOnHold | Self::UserSystemOnHold
        )
    }

    pub fn is_suspended(&self) -> bool {
        matches!(
            self,
            Self::SystemSuspended | Self::UserSuspended | Self::UserSystemSuspended
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_are_distinct() {
        let mut names: Vec<&str> = JobState::ALL.iter().map(|s| s.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), JobState::ALL.len());
        assert_eq!(JobState::QueuedActive.to_string(), "QUEUED_ACTIVE");
    }

    #[test]
    fn test_default_is_undetermined() {
        assert_eq!(JobState::default(), JobState::Undetermined);
    }

    #[test]
    fn test_classification() {
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::UserOnHold.is_on_hold());
        assert!(JobState::SystemSuspended.is_suspended());
        assert!(!JobState::QueuedActive.is_suspended());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&JobState::UserSystemOnHold).unwrap();
        assert_eq!(json, "\"USER_SYSTEM_ON_HOLD\"");
    }
}
