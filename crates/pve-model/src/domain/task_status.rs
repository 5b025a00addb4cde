use serde::{Deserialize, Serialize};

/// Snapshot of a server task, fetched fresh on every poll tick.
///
/// Deserializes both the compact shape `{finished, success, exitStatus}` and
/// the server's native shape `{status: "running" | "stopped", exitstatus: "OK" | ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireTaskStatus")]
pub struct TaskStatus {
    finished: bool,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_status: Option<String>,
}

/// Exit indicator the server reports for a successful task.
const EXIT_OK: &str = "OK";

impl TaskStatus {
    /// Task is still running.
    pub fn running() -> Self {
        Self {
            finished: false,
            success: false,
            exit_status: None,
        }
    }

    /// Task finished with a success indicator.
    pub fn succeeded() -> Self {
        Self {
            finished: true,
            success: true,
            exit_status: Some(EXIT_OK.to_string()),
        }
    }

    /// Task finished unsuccessfully with the given exit indicator.
    pub fn failed(exit_status: impl Into<String>) -> Self {
        Self {
            finished: true,
            success: false,
            exit_status: Some(exit_status.into()),
        }
    }

    /// Returns `true` once the task reached a terminal state.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns `true` if the task finished and reported success.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.finished && self.success
    }

    /// Server-supplied exit indicator, if any.
    #[inline]
    pub fn exit_status(&self) -> Option<&str> {
        self.exit_status.as_deref()
    }
}

#[derive(Deserialize)]
struct WireTaskStatus {
    finished: Option<bool>,
    success: Option<bool>,
    #[serde(alias = "exitStatus")]
    exitstatus: Option<String>,
    status: Option<String>,
}

impl From<WireTaskStatus> for TaskStatus {
    fn from(w: WireTaskStatus) -> Self {
        let finished = w
            .finished
            .unwrap_or_else(|| w.status.as_deref() == Some("stopped"));
        let success = w
            .success
            .unwrap_or_else(|| w.exitstatus.as_deref() == Some(EXIT_OK));

        Self {
            finished,
            success,
            exit_status: w.exitstatus,
        }
    }
}
