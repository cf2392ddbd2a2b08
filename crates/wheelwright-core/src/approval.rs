//! Environment protection for the release stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Granted,
    Rejected,
}

/// Approval state of a protected deployment environment for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentApproval {
    pub environment: String,
    pub status: ApprovalStatus,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl EnvironmentApproval {
    pub fn pending(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            status: ApprovalStatus::Pending,
            decided_by: None,
            decided_at: None,
        }
    }

    /// Record a decision. Only a pending approval can be decided.
    pub fn decide(&mut self, granted: bool, by: impl Into<String>) -> bool {
        if self.status != ApprovalStatus::Pending {
            return false;
        }
        self.status = if granted {
            ApprovalStatus::Granted
        } else {
            ApprovalStatus::Rejected
        };
        self.decided_by = Some(by.into());
        self.decided_at = Some(Utc::now());
        true
    }

    pub fn is_granted(&self) -> bool {
        self.status == ApprovalStatus::Granted
    }
}
