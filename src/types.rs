use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Overall state of a DAG run.
///
/// The integer codes are part of the persisted wire format and must never
/// be renumbered:
///
/// | variant   | code |
/// |-----------|------|
/// | `None`    | 0    |
/// | `Running` | 1    |
/// | `Error`   | 2    |
/// | `Success` | 3    |
/// | `Cancel`  | 4    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SchedulerStatus {
    #[default]
    None,
    Running,
    Error,
    Success,
    Cancel,
}

impl SchedulerStatus {
    pub fn code(self) -> i32 {
        match self {
            SchedulerStatus::None => 0,
            SchedulerStatus::Running => 1,
            SchedulerStatus::Error => 2,
            SchedulerStatus::Success => 3,
            SchedulerStatus::Cancel => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(SchedulerStatus::None),
            1 => Some(SchedulerStatus::Running),
            2 => Some(SchedulerStatus::Error),
            3 => Some(SchedulerStatus::Success),
            4 => Some(SchedulerStatus::Cancel),
            _ => None,
        }
    }

    /// `Error`, `Success` and `Cancel` end a run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SchedulerStatus::Error | SchedulerStatus::Success | SchedulerStatus::Cancel
        )
    }

    /// Human readable label stored next to the code as `statusText`.
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerStatus::None => "not started",
            SchedulerStatus::Running => "running",
            SchedulerStatus::Error => "failed",
            SchedulerStatus::Success => "finished",
            SchedulerStatus::Cancel => "canceled",
        }
    }
}

impl fmt::Display for SchedulerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "not started" => Ok(SchedulerStatus::None),
            "running" => Ok(SchedulerStatus::Running),
            "error" | "failed" => Ok(SchedulerStatus::Error),
            "success" | "finished" => Ok(SchedulerStatus::Success),
            "cancel" | "canceled" => Ok(SchedulerStatus::Cancel),
            other => Err(format!("invalid scheduler status: {other}")),
        }
    }
}

impl Serialize for SchedulerStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for SchedulerStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        SchedulerStatus::from_code(code)
            .ok_or_else(|| de::Error::custom(format!("invalid scheduler status code {code}")))
    }
}

/// State of a single step within a run.
///
/// Wire codes: `NotStarted`=0, `Running`=1, `Error`=2, `Success`=3,
/// `Cancel`=4, `Skipped`=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeStatus {
    #[default]
    NotStarted,
    Running,
    Error,
    Success,
    Cancel,
    Skipped,
}

impl NodeStatus {
    pub fn code(self) -> i32 {
        match self {
            NodeStatus::NotStarted => 0,
            NodeStatus::Running => 1,
            NodeStatus::Error => 2,
            NodeStatus::Success => 3,
            NodeStatus::Cancel => 4,
            NodeStatus::Skipped => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(NodeStatus::NotStarted),
            1 => Some(NodeStatus::Running),
            2 => Some(NodeStatus::Error),
            3 => Some(NodeStatus::Success),
            4 => Some(NodeStatus::Cancel),
            5 => Some(NodeStatus::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, NodeStatus::NotStarted | NodeStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::NotStarted => "not started",
            NodeStatus::Running => "running",
            NodeStatus::Error => "failed",
            NodeStatus::Success => "finished",
            NodeStatus::Cancel => "canceled",
            NodeStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for NodeStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        NodeStatus::from_code(code)
            .ok_or_else(|| de::Error::custom(format!("invalid node status code {code}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_status_codes_are_stable() {
        let expected = [
            (SchedulerStatus::None, 0),
            (SchedulerStatus::Running, 1),
            (SchedulerStatus::Error, 2),
            (SchedulerStatus::Success, 3),
            (SchedulerStatus::Cancel, 4),
        ];
        for (status, code) in expected {
            assert_eq!(status.code(), code);
            assert_eq!(serde_json::to_string(&status).unwrap(), code.to_string());
            assert_eq!(SchedulerStatus::from_code(code as i64), Some(status));
        }
        assert_eq!(SchedulerStatus::from_code(5), None);
    }

    #[test]
    fn node_status_codes_are_stable() {
        assert_eq!(serde_json::to_string(&NodeStatus::Skipped).unwrap(), "5");
        assert_eq!(
            serde_json::from_str::<NodeStatus>("0").unwrap(),
            NodeStatus::NotStarted
        );
        assert!(serde_json::from_str::<NodeStatus>("9").is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!SchedulerStatus::None.is_terminal());
        assert!(!SchedulerStatus::Running.is_terminal());
        assert!(SchedulerStatus::Cancel.is_terminal());
        assert!(NodeStatus::Skipped.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
    }

    #[test]
    fn parses_status_labels() {
        assert_eq!("failed".parse::<SchedulerStatus>(), Ok(SchedulerStatus::Error));
        assert_eq!(" Running ".parse::<SchedulerStatus>(), Ok(SchedulerStatus::Running));
        assert!("bogus".parse::<SchedulerStatus>().is_err());
    }
}
