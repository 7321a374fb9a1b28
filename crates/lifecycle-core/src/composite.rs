use crate::action::{label, AdditionalInfo, SimpleAction};
use crate::cache::EvaluationContext;
use crate::types::ForcedActions;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// CompositePolicy
// ---------------------------------------------------------------------------

/// How a composite folds its sub-action outcomes into a target state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositePolicy {
    /// Every sub-action must succeed (or be forced). Resolves to the
    /// composite's own target state. An empty group resolves.
    #[default]
    AllOf,
    /// The first sub-action that succeeds (or is forced) wins and resolves
    /// to its candidate state, falling back to the composite's target state.
    /// An empty group fails.
    FirstSuccess,
}

impl fmt::Display for CompositePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositePolicy::AllOf => f.write_str("all_of"),
            CompositePolicy::FirstSuccess => f.write_str("first_success"),
        }
    }
}

// ---------------------------------------------------------------------------
// SubAction
// ---------------------------------------------------------------------------

pub struct SubAction<S> {
    pub action: SimpleAction<S>,
    /// Candidate target state when this sub-action decides the composite.
    pub target_state: Option<String>,
}

impl<S> Clone for SubAction<S> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            target_state: self.target_state.clone(),
        }
    }
}

impl<S> fmt::Debug for SubAction<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubAction")
            .field("action", &self.action)
            .field("target_state", &self.target_state)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CompositeEvaluation
// ---------------------------------------------------------------------------

/// What a composite reports back to the transition evaluator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeEvaluation {
    /// Resolved target state, or `None` when the composite failed.
    pub resolved: Option<String>,
    /// Sub-actions that failed and were not forced.
    pub failed: Vec<String>,
    /// Sub-actions that failed but were coerced to success by forcing.
    pub forced: Vec<String>,
}

impl CompositeEvaluation {
    pub fn succeeded(&self) -> bool {
        self.resolved.is_some()
    }
}

// ---------------------------------------------------------------------------
// CompositeAction
// ---------------------------------------------------------------------------

/// An action that evaluates an ordered group of simple actions and resolves
/// straight to a target state.
pub struct CompositeAction<S> {
    id: Option<String>,
    additional_info: AdditionalInfo,
    target_state: String,
    policy: CompositePolicy,
    sub_actions: Vec<SubAction<S>>,
}

impl<S> CompositeAction<S> {
    pub fn new(id: impl Into<String>, target_state: impl Into<String>) -> Self {
        let id: String = id.into();
        Self {
            id: Some(id).filter(|s| !s.is_empty()),
            additional_info: AdditionalInfo::new(),
            target_state: target_state.into(),
            policy: CompositePolicy::default(),
            sub_actions: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: CompositePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_action(mut self, action: SimpleAction<S>) -> Self {
        self.sub_actions.push(SubAction {
            action,
            target_state: None,
        });
        self
    }

    pub fn with_targeted_action(
        mut self,
        action: SimpleAction<S>,
        target_state: impl Into<String>,
    ) -> Self {
        self.sub_actions.push(SubAction {
            action,
            target_state: Some(target_state.into()),
        });
        self
    }

    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_info.insert(key.into(), value.into());
        self
    }

    pub fn with_additional_info(mut self, info: AdditionalInfo) -> Self {
        self.additional_info.extend(info);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn additional_info(&self) -> &AdditionalInfo {
        &self.additional_info
    }

    /// Fallback state, also used when the whole composite is force-skipped.
    pub fn target_state(&self) -> &str {
        &self.target_state
    }

    pub fn policy(&self) -> CompositePolicy {
        self.policy
    }

    pub fn sub_actions(&self) -> &[SubAction<S>] {
        &self.sub_actions
    }

    pub fn evaluate(
        &self,
        subject: &S,
        ctx: &EvaluationContext,
        forced: &ForcedActions,
    ) -> CompositeEvaluation {
        let mut eval = CompositeEvaluation::default();

        for sub in &self.sub_actions {
            let passed = if sub.action.evaluate(subject, ctx).is_success() {
                true
            } else if forced.contains(sub.action.id()) {
                eval.forced.push(label(sub.action.id()).to_string());
                true
            } else {
                eval.failed.push(label(sub.action.id()).to_string());
                false
            };

            if passed && self.policy == CompositePolicy::FirstSuccess {
                let state = sub.target_state.as_deref().unwrap_or(&self.target_state);
                eval.resolved = Some(state.to_string());
                return eval;
            }
        }

        if self.policy == CompositePolicy::AllOf && eval.failed.is_empty() {
            eval.resolved = Some(self.target_state.clone());
        }
        eval
    }
}

impl<S> Clone for CompositeAction<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            additional_info: self.additional_info.clone(),
            target_state: self.target_state.clone(),
            policy: self.policy,
            sub_actions: self.sub_actions.clone(),
        }
    }
}

impl<S> fmt::Debug for CompositeAction<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeAction")
            .field("id", &self.id)
            .field("target_state", &self.target_state)
            .field("policy", &self.policy)
            .field("sub_actions", &self.sub_actions)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Outcome;

    fn pass(id: &str) -> SimpleAction<()> {
        SimpleAction::new(id, |_: &(), _: &EvaluationContext| Outcome::Succeeded)
    }

    fn fail(id: &str) -> SimpleAction<()> {
        SimpleAction::new(id, |_: &(), _: &EvaluationContext| Outcome::Failed)
    }

    fn unsure(id: &str) -> SimpleAction<()> {
        SimpleAction::new(id, |_: &(), _: &EvaluationContext| Outcome::Indeterminate)
    }

    fn run(c: &CompositeAction<()>, forced: &[&str]) -> CompositeEvaluation {
        let forced: ForcedActions = forced.iter().collect();
        c.evaluate(&(), &EvaluationContext::new(), &forced)
    }

    #[test]
    fn all_of_resolves_to_target_when_everything_passes() {
        let c = CompositeAction::new("review", "REVIEWED")
            .with_action(pass("a"))
            .with_action(pass("b"));
        let eval = run(&c, &[]);
        assert_eq!(eval.resolved.as_deref(), Some("REVIEWED"));
        assert!(eval.failed.is_empty());
        assert!(eval.forced.is_empty());
    }

    #[test]
    fn all_of_reports_every_failure() {
        let c = CompositeAction::new("review", "REVIEWED")
            .with_action(fail("a"))
            .with_action(pass("b"))
            .with_action(unsure("c"));
        let eval = run(&c, &[]);
        assert!(!eval.succeeded());
        assert_eq!(eval.failed, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn forced_sub_action_counts_as_success() {
        let c = CompositeAction::new("review", "REVIEWED")
            .with_action(fail("a"))
            .with_action(pass("b"));
        let eval = run(&c, &["A"]);
        assert_eq!(eval.resolved.as_deref(), Some("REVIEWED"));
        assert_eq!(eval.forced, vec!["a".to_string()]);
        assert!(eval.failed.is_empty());
    }

    #[test]
    fn unnamed_sub_action_cannot_be_forced() {
        let anonymous = SimpleAction::anonymous(|_: &(), _: &EvaluationContext| Outcome::Failed);
        let c = CompositeAction::new("review", "REVIEWED").with_action(anonymous);
        let eval = run(&c, &["<unnamed>"]);
        assert!(!eval.succeeded());
        assert_eq!(eval.failed, vec!["<unnamed>".to_string()]);
    }

    #[test]
    fn first_success_uses_candidate_state() {
        let c = CompositeAction::new("route", "MANUAL_REVIEW")
            .with_policy(CompositePolicy::FirstSuccess)
            .with_targeted_action(fail("fast-track"), "APPROVED")
            .with_targeted_action(pass("escalate"), "ESCALATED")
            .with_targeted_action(pass("never-reached"), "OTHER");
        let eval = run(&c, &[]);
        assert_eq!(eval.resolved.as_deref(), Some("ESCALATED"));
        assert_eq!(eval.failed, vec!["fast-track".to_string()]);
    }

    #[test]
    fn first_success_forced_sub_action_wins() {
        let c = CompositeAction::new("route", "MANUAL_REVIEW")
            .with_policy(CompositePolicy::FirstSuccess)
            .with_targeted_action(fail("fast-track"), "APPROVED")
            .with_action(pass("fallback"));
        let eval = run(&c, &["fast-track"]);
        assert_eq!(eval.resolved.as_deref(), Some("APPROVED"));
        assert_eq!(eval.forced, vec!["fast-track".to_string()]);
    }

    #[test]
    fn first_success_without_candidate_uses_composite_target() {
        let c = CompositeAction::new("route", "MANUAL_REVIEW")
            .with_policy(CompositePolicy::FirstSuccess)
            .with_action(pass("anything"));
        assert_eq!(run(&c, &[]).resolved.as_deref(), Some("MANUAL_REVIEW"));
    }

    #[test]
    fn empty_groups() {
        let all_of: CompositeAction<()> = CompositeAction::new("noop", "DONE");
        assert_eq!(run(&all_of, &[]).resolved.as_deref(), Some("DONE"));

        let first: CompositeAction<()> =
            CompositeAction::new("noop", "DONE").with_policy(CompositePolicy::FirstSuccess);
        assert!(!run(&first, &[]).succeeded());
    }

    #[test]
    fn policy_yaml_names() {
        let p: CompositePolicy = serde_yaml::from_str("first_success").unwrap();
        assert_eq!(p, CompositePolicy::FirstSuccess);
        assert_eq!(CompositePolicy::default().to_string(), "all_of");
    }
}
