//! Long-running task handles returned by `tasks/create|get|cancel`.

use serde::{Deserialize, Serialize};

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// `completed`, `failed`, or `cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// `pending` or `running`.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// A server-tracked long-running operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub state: TaskState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl Task {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Progress as a percentage in `0.0..=100.0`. Defined only when `total`
    /// is present and greater than zero (spec.md §3).
    #[must_use]
    pub fn percentage(&self) -> Option<f64> {
        match (self.progress, self.total) {
            (Some(progress), Some(total)) if total > 0.0 => Some((progress / total) * 100.0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_active_partition_the_states() {
        for state in
            [TaskState::Pending, TaskState::Running, TaskState::Completed, TaskState::Failed, TaskState::Cancelled]
        {
            assert_ne!(state.is_terminal(), state.is_active());
        }
    }

    #[test]
    fn percentage_undefined_without_positive_total() {
        let mut task = Task {
            id: "t1".into(),
            state: TaskState::Running,
            progress_token: None,
            progress: Some(5.0),
            total: None,
            message: None,
            result: None,
        };
        assert_eq!(task.percentage(), None);

        task.total = Some(0.0);
        assert_eq!(task.percentage(), None);

        task.total = Some(10.0);
        assert_eq!(task.percentage(), Some(50.0));
    }

    #[test]
    fn percentage_monotonic_for_equal_totals() {
        let total = Some(10.0);
        let make = |progress| Task {
            id: "t1".into(),
            state: TaskState::Running,
            progress_token: None,
            progress: Some(progress),
            total,
            message: None,
            result: None,
        };

        let earlier = make(3.0);
        let later = make(7.0);
        assert!(earlier.percentage().unwrap() <= later.percentage().unwrap());
    }
}
