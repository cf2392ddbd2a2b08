//! Trigger matching and evaluation.

use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};
use std::str::FromStr;
use tracing::warn;
use wheelwright_core::ConfigError;
use wheelwright_core::pipeline::{PipelineDefinition, TriggerConfig, TriggerType};
use wheelwright_core::run::TriggerInfo;

/// Event that can start a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    Manual {
        actor: Option<String>,
    },
    PullRequest {
        source_branch: String,
        target_branch: String,
    },
    Push {
        branch: String,
    },
    Schedule {
        cron: String,
    },
    Release {
        tag: String,
    },
}

impl TriggerEvent {
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            TriggerEvent::Manual { .. } => TriggerType::Manual,
            TriggerEvent::PullRequest { .. } => TriggerType::PullRequest,
            TriggerEvent::Push { .. } => TriggerType::Push,
            TriggerEvent::Schedule { .. } => TriggerType::Schedule,
            TriggerEvent::Release { .. } => TriggerType::Release,
        }
    }

    /// Run metadata recorded for this event.
    pub fn info(&self) -> TriggerInfo {
        let info = TriggerInfo::new(self.trigger_type());
        match self {
            TriggerEvent::Manual { actor } => TriggerInfo {
                triggered_by: actor.clone(),
                ..info
            },
            TriggerEvent::PullRequest { source_branch, .. } => {
                info.with_ref(format!("refs/heads/{}", source_branch))
            }
            TriggerEvent::Push { branch } => info.with_ref(format!("refs/heads/{}", branch)),
            TriggerEvent::Schedule { .. } => info,
            TriggerEvent::Release { tag } => info.with_ref(format!("refs/tags/{}", tag)),
        }
    }
}

/// Matcher for determining if a pipeline should be triggered.
pub struct TriggerMatcher;

impl TriggerMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Check if a pipeline should be triggered by an event.
    pub fn matches(&self, pipeline: &PipelineDefinition, event: &TriggerEvent) -> bool {
        if pipeline.triggers.is_empty() {
            // Default: manual dispatch only
            return matches!(event, TriggerEvent::Manual { .. });
        }

        pipeline
            .triggers
            .iter()
            .filter(|trigger| trigger.enabled)
            .any(|trigger| self.trigger_matches(trigger, event))
    }

    fn trigger_matches(&self, trigger: &TriggerConfig, event: &TriggerEvent) -> bool {
        if trigger.trigger_type != event.trigger_type() {
            return false;
        }
        match event {
            TriggerEvent::Manual { .. } => true,
            TriggerEvent::PullRequest { target_branch, .. } => {
                self.branch_matches(&trigger.branches, target_branch)
            }
            TriggerEvent::Push { branch } => self.branch_matches(&trigger.branches, branch),
            TriggerEvent::Schedule { cron } => trigger.cron.as_deref() == Some(cron.as_str()),
            TriggerEvent::Release { tag } => self.branch_matches(&trigger.branches, tag),
        }
    }

    fn branch_matches(&self, patterns: &[String], branch: &str) -> bool {
        if patterns.is_empty() {
            return true; // Match all branches if no patterns specified
        }
        patterns.iter().any(|p| self.glob_match(p, branch))
    }

    /// `*` stays within one path segment; `**` spans segments.
    fn glob_match(&self, pattern: &str, text: &str) -> bool {
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };
        match Pattern::new(pattern) {
            Ok(compiled) => compiled.matches_with(text, options),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Ignoring invalid branch pattern");
                false
            }
        }
    }
}

impl Default for TriggerMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// A five-field cron expression (`minute hour day month weekday`).
#[derive(Debug, Clone)]
pub struct ScheduleSpec {
    expression: String,
    schedule: cron::Schedule,
}

impl ScheduleSpec {
    pub fn parse(expression: &str) -> Result<Self, ConfigError> {
        let expression = expression.trim();
        let invalid = |reason: String| ConfigError::InvalidCron {
            expr: expression.to_string(),
            reason,
        };

        let fields = expression.split_whitespace().count();
        if fields != 5 {
            return Err(invalid(format!("expected 5 fields, found {}", fields)));
        }

        // The cron crate wants a leading seconds field.
        let schedule = cron::Schedule::from_str(&format!("0 {}", expression))
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Whether a fire time falls in `(last, now]`.
    pub fn is_due(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.next_after(last).is_some_and(|next| next <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn definition(triggers: &str) -> PipelineDefinition {
        let yaml = format!(
            "version: \"1\"\nname: demo\npackage:\n  name: demo\ntriggers:\n{}",
            triggers
        );
        PipelineDefinition::from_yaml(&yaml).unwrap()
    }

    #[test]
    fn test_branch_match_exact() {
        let matcher = TriggerMatcher::new();
        assert!(matcher.branch_matches(&["main".to_string()], "main"));
        assert!(!matcher.branch_matches(&["main".to_string()], "develop"));
    }

    #[test]
    fn test_branch_match_glob() {
        let matcher = TriggerMatcher::new();
        assert!(matcher.branch_matches(&["feature/*".to_string()], "feature/foo"));
        assert!(matcher.branch_matches(&["release/**".to_string()], "release/v1/hotfix"));
        assert!(matcher.branch_matches(&["v*".to_string()], "v1.2.0"));
        assert!(!matcher.branch_matches(&["feature/*".to_string()], "feature/a/b"));
    }

    #[test]
    fn test_branch_match_multiple_wildcards() {
        let matcher = TriggerMatcher::new();
        let tags = ["v*.*".to_string()];
        assert!(matcher.branch_matches(&tags, "v1.2"));
        assert!(matcher.branch_matches(&tags, "v10.20.3"));
        assert!(!matcher.branch_matches(&tags, "v1"));
        assert!(matcher.branch_matches(&["*-rc*".to_string()], "v2.0-rc1"));
    }

    #[test]
    fn test_branch_match_overlapping_prefix_and_suffix() {
        let matcher = TriggerMatcher::new();
        assert!(!matcher.branch_matches(&["a*a".to_string()], "a"));
        assert!(matcher.branch_matches(&["a*a".to_string()], "aa"));
        assert!(!matcher.branch_matches(&["[unclosed".to_string()], "[unclosed"));
    }

    #[test]
    fn test_empty_patterns_match_all() {
        let matcher = TriggerMatcher::new();
        assert!(matcher.branch_matches(&[], "any-branch"));
    }

    #[test]
    fn test_push_to_main_only() {
        let def = definition("  - type: push\n    branches: [main]\n  - type: pull_request\n");
        let matcher = TriggerMatcher::new();

        assert!(matcher.matches(&def, &TriggerEvent::Push { branch: "main".into() }));
        assert!(!matcher.matches(&def, &TriggerEvent::Push { branch: "dev".into() }));
        assert!(matcher.matches(
            &def,
            &TriggerEvent::PullRequest {
                source_branch: "fix".into(),
                target_branch: "main".into()
            }
        ));
        assert!(!matcher.matches(&def, &TriggerEvent::Manual { actor: None }));
    }

    #[test]
    fn test_disabled_release_trigger_never_matches() {
        let def = definition("  - type: release\n    enabled: false\n");
        let matcher = TriggerMatcher::new();
        assert!(!matcher.matches(&def, &TriggerEvent::Release { tag: "v1.0.0".into() }));
    }

    #[test]
    fn test_event_info() {
        let info = TriggerEvent::Release { tag: "v1.0.0".into() }.info();
        assert_eq!(info.trigger_type, TriggerType::Release);
        assert_eq!(info.git_ref.as_deref(), Some("refs/tags/v1.0.0"));

        let info = TriggerEvent::Manual {
            actor: Some("octocat".into()),
        }
        .info();
        assert_eq!(info.triggered_by.as_deref(), Some("octocat"));
    }

    #[test]
    fn test_monthly_schedule() {
        let spec = ScheduleSpec::parse("0 0 1 * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        assert_eq!(
            spec.next_after(from),
            Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap())
        );
        assert!(spec.is_due(from, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()));
        assert!(!spec.is_due(from, Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 0).unwrap()));
    }

    #[test]
    fn test_invalid_cron_rejected() {
        assert!(matches!(
            ScheduleSpec::parse("0 0 1 *"),
            Err(ConfigError::InvalidCron { .. })
        ));
        assert!(matches!(
            ScheduleSpec::parse("0 99 1 * *"),
            Err(ConfigError::InvalidCron { .. })
        ));
    }
}
