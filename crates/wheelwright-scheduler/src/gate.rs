//! Release gate.
//!
//! ```text
//! disabled --arm()--> armed --eligible--> running --> published
//!                       |                    \-----> failed
//!                       \--not eligible--> armed
//! ```
//!
//! Arming is an operator action (`release.enabled: true` or [`ReleaseGate::arm`]).
//! A trigger alone never arms the gate.

use std::sync::Arc;
use tracing::{info, warn};
use wheelwright_core::approval::ApprovalStatus;
use wheelwright_core::job::JobGroup;
use wheelwright_core::pipeline::{ReleaseConfig, TriggerType};
use wheelwright_core::ports::{
    ArtifactStore, IdentityTokenSource, PublishReport, PublishRequest, PublishTool, TokenExchange,
    WorkspaceProvisioner,
};
use wheelwright_core::run::{GateState, JobReport, ReleaseStatus, TriggerInfo};
use wheelwright_core::{Error, Result};

/// Decides whether a run may publish once the gate is armed.
pub trait ReleasePolicy: Send + Sync {
    /// `Err` carries the reason the run is not eligible.
    fn permits(&self, trigger: &TriggerInfo, approval: ApprovalStatus) -> std::result::Result<(), String>;
}

/// `trigger == release AND approval == granted`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedReleasePolicy;

impl ReleasePolicy for TaggedReleasePolicy {
    fn permits(&self, trigger: &TriggerInfo, approval: ApprovalStatus) -> std::result::Result<(), String> {
        if trigger.trigger_type != TriggerType::Release {
            return Err(format!(
                "trigger {} is not a tagged release",
                trigger.trigger_type
            ));
        }
        if approval != ApprovalStatus::Granted {
            return Err(format!("environment approval is {:?}", approval).to_lowercase());
        }
        Ok(())
    }
}

/// Collaborators the running state talks to.
#[derive(Clone)]
pub struct ReleasePorts {
    pub workspaces: Arc<dyn WorkspaceProvisioner>,
    pub store: Arc<dyn ArtifactStore>,
    pub identity: Arc<dyn IdentityTokenSource>,
    pub exchange: Arc<dyn TokenExchange>,
    pub publisher: Arc<dyn PublishTool>,
}

pub struct ReleaseGate {
    config: ReleaseConfig,
    needs: Vec<JobGroup>,
    policy: Arc<dyn ReleasePolicy>,
    ports: ReleasePorts,
    state: GateState,
    outcome: Option<ReleaseStatus>,
}

impl ReleaseGate {
    /// Armed when `config.enabled`, disabled otherwise.
    pub fn new(config: ReleaseConfig, needs: Vec<JobGroup>, ports: ReleasePorts) -> Self {
        let state = if config.enabled {
            GateState::Armed
        } else {
            GateState::Disabled
        };
        Self {
            config,
            needs,
            policy: Arc::new(TaggedReleasePolicy),
            ports,
            state,
            outcome: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn ReleasePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Operator switch: allow this gate to publish.
    pub fn arm(&mut self) {
        if self.state == GateState::Disabled {
            info!("Release gate armed");
            self.state = GateState::Armed;
        }
    }

    /// Decide and, when eligible, publish. A gate that already reached a
    /// terminal state returns its recorded outcome.
    pub async fn evaluate(
        &mut self,
        trigger: &TriggerInfo,
        approval: ApprovalStatus,
        upstream: &[JobReport],
    ) -> ReleaseStatus {
        match self.state {
            GateState::Disabled => {
                info!(trigger = %trigger.trigger_type, "Release gate disabled, not publishing");
                return ReleaseStatus::Disabled;
            }
            GateState::Armed => {}
            GateState::Running | GateState::Published | GateState::Failed => {
                return self.outcome.clone().unwrap_or(ReleaseStatus::Failed {
                    message: format!("release gate is {}", self.state),
                });
            }
        }

        if let Some(reason) = self.blocked_by(upstream) {
            info!(reason = %reason, "Release not eligible");
            return ReleaseStatus::NotEligible { reason };
        }
        if let Err(reason) = self.policy.permits(trigger, approval) {
            info!(reason = %reason, "Release not eligible");
            return ReleaseStatus::NotEligible { reason };
        }

        self.state = GateState::Running;
        let status = match self.publish().await {
            Ok(report) => {
                self.state = GateState::Published;
                ReleaseStatus::Published {
                    uploaded: report.uploaded,
                    skipped: report.skipped,
                }
            }
            Err(Error::PublishConflict {
                file,
                uploaded,
                remaining,
            }) if remaining.is_empty() => {
                warn!(file = %file, "Version already on index, treating as skipped");
                self.state = GateState::Published;
                ReleaseStatus::Published {
                    uploaded,
                    skipped: vec![file],
                }
            }
            Err(Error::PublishConflict {
                file,
                uploaded,
                remaining,
            }) => {
                warn!(file = %file, remaining = remaining.len(), "Upload stopped at existing file");
                self.state = GateState::Failed;
                ReleaseStatus::Failed {
                    message: format!(
                        "{} already exists on index; uploaded [{}], not uploaded [{}]",
                        file,
                        uploaded.join(", "),
                        remaining.join(", ")
                    ),
                }
            }
            Err(e) => {
                warn!(error = %e, "Release failed");
                self.state = GateState::Failed;
                ReleaseStatus::Failed {
                    message: e.to_string(),
                }
            }
        };
        self.outcome = Some(status.clone());
        status
    }

    /// First upstream group in `needs` that did not fully succeed.
    fn blocked_by(&self, upstream: &[JobReport]) -> Option<String> {
        self.needs.iter().find_map(|group| {
            let failed = upstream
                .iter()
                .filter(|job| job.group == Some(*group) && !job.is_success())
                .count();
            (failed > 0).then(|| format!("{} failed job(s) in {}", failed, group))
        })
    }

    async fn publish(&self) -> Result<PublishReport> {
        let workspace = self.ports.workspaces.acquire("release").await?;
        let result = self.publish_in(&workspace.path(&self.config.download_dir)).await;
        if let Err(e) = self.ports.workspaces.release(&workspace).await {
            warn!(error = %e, "Failed to release workspace");
        }
        result
    }

    async fn publish_in(&self, dist_dir: &std::path::Path) -> Result<PublishReport> {
        tokio::fs::create_dir_all(dist_dir).await?;
        let files = self
            .ports
            .store
            .download(
                &self.config.artifact_pattern,
                dist_dir,
                self.config.merge_multiple,
            )
            .await?;
        info!(
            pattern = %self.config.artifact_pattern,
            files = files.len(),
            "Downloaded release artifacts"
        );

        let identity = self.ports.identity.fetch(&self.config.index.audience).await?;
        let token = self.ports.exchange.exchange(&identity).await?;

        let request = PublishRequest {
            dist_dir: dist_dir.to_path_buf(),
            index: self.config.index.clone(),
            skip_existing: self.config.skip_existing,
        };
        let report = self.ports.publisher.publish(&request, &token).await?;
        info!(
            index = %self.config.index.name,
            uploaded = report.uploaded.len(),
            skipped = report.skipped.len(),
            "Published"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(trigger_type: TriggerType) -> TriggerInfo {
        TriggerInfo::new(trigger_type)
    }

    #[test]
    fn test_tagged_release_policy() {
        let policy = TaggedReleasePolicy;
        assert!(
            policy
                .permits(&trigger(TriggerType::Release), ApprovalStatus::Granted)
                .is_ok()
        );
        assert!(
            policy
                .permits(&trigger(TriggerType::Release), ApprovalStatus::Pending)
                .is_err()
        );
        assert!(
            policy
                .permits(&trigger(TriggerType::Push), ApprovalStatus::Granted)
                .is_err()
        );
        assert_eq!(
            policy
                .permits(&trigger(TriggerType::Release), ApprovalStatus::Rejected)
                .unwrap_err(),
            "environment approval is rejected"
        );
    }
}
