//! Best-effort cluster load figures.

use serde::Serialize;
use std::fmt;

/// Cluster or queue occupancy, as far as a backend can tell.
///
/// Load figures only feed monitoring displays, so failures collapse into
/// sentinel variants instead of errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueueLoad {
    /// Tasks (or load) in use against the total capacity
    Known { used: f64, total: f64 },
    /// The backend has no way to report load
    Unknown,
    /// Introspection ran but its output could not be used
    Failed,
}

impl QueueLoad {
    pub fn known(used: impl Into<f64>, total: impl Into<f64>) -> Self {
        Self::Known {
            used: used.into(),
            total: total.into(),
        }
    }

    /// The `(used, total)` pair as display strings.
    pub fn as_strings(&self) -> (String, String) {
        match self {
            Self::Known { used, total } => (used.to_string(), total.to_string()),
            Self::Unknown => ("unknown".to_string(), "unknown".to_string()),
            Self::Failed => ("exception".to_string(), "exception".to_string()),
        }
    }
}

impl fmt::Display for QueueLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (used, total) = self.as_strings();
        write!(f, "{} / {}", used, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_strings() {
        assert_eq!(
            QueueLoad::known(12u32, 64u32).as_strings(),
            ("12".to_string(), "64".to_string())
        );
        assert_eq!(
            QueueLoad::known(0.75, 8u32).as_strings(),
            ("0.75".to_string(), "8".to_string())
        );
        assert_eq!(
            QueueLoad::Unknown.as_strings(),
            ("unknown".to_string(), "unknown".to_string())
        );
        assert_eq!(
            QueueLoad::Failed.as_strings(),
            ("exception".to_string(), "exception".to_string())
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(QueueLoad::known(3u32, 4u32).to_string(), "3 / 4");
    }
}
