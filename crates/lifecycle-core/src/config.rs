use crate::action::{Action, AdditionalInfo, Predicate, SimpleAction};
use crate::cache::ActionResultCache;
use crate::composite::{CompositeAction, CompositePolicy};
use crate::error::{LifecycleError, Result};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::transition::{Transition, TRANSITION_TYPE_AUTO, TRANSITION_TYPE_MANUAL};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

static IDENT_RE: OnceLock<Regex> = OnceLock::new();

fn ident_re() -> &'static Regex {
    IDENT_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:\-]*$").expect("identifier pattern is valid")
    })
}

pub fn validate_identifier(id: &str) -> Result<()> {
    if id.len() > 128 || !ident_re().is_match(id) {
        return Err(LifecycleError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// PredicateRegistry
// ---------------------------------------------------------------------------

/// Named predicates that configuration files refer to.
pub struct PredicateRegistry<S> {
    predicates: HashMap<String, Arc<dyn Predicate<S>>>,
}

impl<S> Default for PredicateRegistry<S> {
    fn default() -> Self {
        Self {
            predicates: HashMap::new(),
        }
    }
}

impl<S> PredicateRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, predicate: impl Predicate<S> + 'static) -> Self {
        self.register(name, predicate);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, predicate: impl Predicate<S> + 'static) {
        self.predicates.insert(name.into(), Arc::new(predicate));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Predicate<S>>> {
        self.predicates.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    fn resolve(&self, action: Option<&str>, predicate: &str) -> Result<Arc<dyn Predicate<S>>> {
        self.get(predicate)
            .ok_or_else(|| LifecycleError::UnknownPredicate {
                action: action.unwrap_or(crate::action::UNNAMED_ACTION).to_string(),
                predicate: predicate.to_string(),
            })
    }
}

impl<S> fmt::Debug for PredicateRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.predicates.keys().collect();
        names.sort();
        f.debug_struct("PredicateRegistry")
            .field("predicates", &names)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ActionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubActionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub predicate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_state: Option<String>,
    #[serde(default, skip_serializing_if = "AdditionalInfo::is_empty")]
    pub additional_info: AdditionalInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ActionConfig {
    Simple {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        predicate: String,
        #[serde(default, skip_serializing_if = "AdditionalInfo::is_empty")]
        additional_info: AdditionalInfo,
    },
    Composite {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        target_state: String,
        #[serde(default)]
        policy: CompositePolicy,
        #[serde(default)]
        actions: Vec<SubActionConfig>,
        #[serde(default, skip_serializing_if = "AdditionalInfo::is_empty")]
        additional_info: AdditionalInfo,
    },
}

impl ActionConfig {
    pub fn id(&self) -> Option<&str> {
        match self {
            ActionConfig::Simple { id, .. } | ActionConfig::Composite { id, .. } => {
                id.as_deref().filter(|s| !s.is_empty())
            }
        }
    }

    pub fn build<S>(&self, registry: &PredicateRegistry<S>) -> Result<Action<S>> {
        match self {
            ActionConfig::Simple {
                id,
                predicate,
                additional_info,
            } => {
                let p = registry.resolve(id.as_deref(), predicate)?;
                let action = SimpleAction::from_shared(id.clone(), p)
                    .with_additional_info(additional_info.clone());
                Ok(Action::Simple(action))
            }
            ActionConfig::Composite {
                id,
                target_state,
                policy,
                actions,
                additional_info,
            } => {
                let mut composite =
                    CompositeAction::new(id.clone().unwrap_or_default(), target_state.clone())
                        .with_policy(*policy)
                        .with_additional_info(additional_info.clone());
                for sub in actions {
                    let p = registry.resolve(sub.id.as_deref(), &sub.predicate)?;
                    let action = SimpleAction::from_shared(sub.id.clone(), p)
                        .with_additional_info(sub.additional_info.clone());
                    composite = match &sub.target_state {
                        Some(state) => composite.with_targeted_action(action, state.clone()),
                        None => composite.with_action(action),
                    };
                }
                Ok(Action::Composite(composite))
            }
        }
    }

    fn predicates(&self) -> Vec<(Option<&str>, &str)> {
        match self {
            ActionConfig::Simple { id, predicate, .. } => {
                vec![(id.as_deref(), predicate.as_str())]
            }
            ActionConfig::Composite { actions, .. } => actions
                .iter()
                .map(|a| (a.id.as_deref(), a.predicate.as_str()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// TransitionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionConfig {
    pub id: String,
    #[serde(rename = "type", default = "default_transition_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
    #[serde(default)]
    pub target_states: Vec<String>,
    #[serde(default)]
    pub stop_on_first_failure: bool,
}

fn default_transition_type() -> String {
    TRANSITION_TYPE_AUTO.to_string()
}

impl TransitionConfig {
    pub fn build<S>(
        &self,
        registry: &PredicateRegistry<S>,
        cache: Option<Arc<dyn ActionResultCache<S>>>,
    ) -> Result<Transition<S>> {
        validate_identifier(&self.id)?;
        let mut transition = Transition::new(self.id.clone())
            .with_kind(self.kind.clone())
            .with_target_states(self.target_states.iter().cloned())
            .with_stop_on_first_failure(self.stop_on_first_failure);
        if let Some(description) = &self.description {
            transition = transition.with_description(description.clone());
        }
        if let Some(cache) = cache {
            transition = transition.with_cache(cache);
        }
        for action in &self.actions {
            transition = transition.with_action(action.build(registry)?);
        }
        Ok(transition)
    }
}

// ---------------------------------------------------------------------------
// StateConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub transitions: Vec<TransitionConfig>,
}

// ---------------------------------------------------------------------------
// LifecycleConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub states: Vec<StateConfig>,
}

fn default_version() -> u32 {
    1
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            states: Vec::new(),
        }
    }
}

impl LifecycleConfig {
    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Build the runtime lifecycle. Every transition shares `cache`.
    pub fn build<S>(
        &self,
        registry: &PredicateRegistry<S>,
        cache: Option<Arc<dyn ActionResultCache<S>>>,
    ) -> Result<Lifecycle<S>> {
        let mut lifecycle = Lifecycle::new();
        for state_cfg in &self.states {
            validate_identifier(&state_cfg.id)?;
            let mut state = LifecycleState::new(state_cfg.id.clone());
            if let Some(description) = &state_cfg.description {
                state = state.with_description(description.clone());
            }
            for transition in &state_cfg.transitions {
                state = state.with_transition(transition.build(registry, cache.clone())?);
            }
            lifecycle = lifecycle.with_state(state);
        }
        Ok(lifecycle)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let declared: HashSet<&str> = self.states.iter().map(|s| s.id.as_str()).collect();

        // 1. State ids: well-formed and unique
        let mut seen_states = HashSet::new();
        for state in &self.states {
            check_identifier(&mut warnings, "state", &state.id);
            if !seen_states.insert(state.id.as_str()) {
                warnings.push(error(format!("duplicate state '{}'", state.id)));
            }

            let mut seen_transitions = HashSet::new();
            for t in &state.transitions {
                check_identifier(&mut warnings, "transition", &t.id);
                if !seen_transitions.insert(t.id.as_str()) {
                    warnings.push(error(format!(
                        "duplicate transition '{}' in state '{}'",
                        t.id, state.id
                    )));
                }
                validate_transition(&mut warnings, t, &declared);
            }
        }

        warnings
    }

    /// [`validate`](Self::validate) plus a check that every predicate name
    /// is registered.
    pub fn validate_with<S>(&self, registry: &PredicateRegistry<S>) -> Vec<ConfigWarning> {
        let mut warnings = self.validate();
        let actions = self
            .states
            .iter()
            .flat_map(|s| &s.transitions)
            .flat_map(|t| t.actions.iter().map(move |a| (t, a)));
        for (t, action) in actions {
            for (id, predicate) in action.predicates() {
                if !registry.contains(predicate) {
                    warnings.push(error(format!(
                        "unknown predicate '{}' for action '{}' in transition '{}'",
                        predicate,
                        id.unwrap_or(crate::action::UNNAMED_ACTION),
                        t.id
                    )));
                }
            }
        }
        warnings
    }
}

fn warning(message: String) -> ConfigWarning {
    ConfigWarning {
        level: WarnLevel::Warning,
        message,
    }
}

fn error(message: String) -> ConfigWarning {
    ConfigWarning {
        level: WarnLevel::Error,
        message,
    }
}

fn check_identifier(warnings: &mut Vec<ConfigWarning>, what: &str, id: &str) {
    if validate_identifier(id).is_err() {
        warnings.push(error(format!("invalid {what} id '{id}'")));
    }
}

fn validate_transition(
    warnings: &mut Vec<ConfigWarning>,
    t: &TransitionConfig,
    declared: &HashSet<&str>,
) {
    let kind = t.kind.as_str();
    if !kind.eq_ignore_ascii_case(TRANSITION_TYPE_AUTO)
        && !kind.eq_ignore_ascii_case(TRANSITION_TYPE_MANUAL)
    {
        warnings.push(warning(format!(
            "transition '{}' has type '{}'; only '{}' and '{}' are recognised",
            t.id, kind, TRANSITION_TYPE_AUTO, TRANSITION_TYPE_MANUAL
        )));
    }

    // 2. Target states: non-empty, unique, declared
    if t.target_states.is_empty() {
        warnings.push(warning(format!(
            "transition '{}' has no target states and can never succeed",
            t.id
        )));
    }
    let mut seen_targets = HashSet::new();
    for target in &t.target_states {
        if !seen_targets.insert(target.as_str()) {
            warnings.push(warning(format!(
                "transition '{}' lists target state '{}' more than once",
                t.id, target
            )));
        }
        if !declared.contains(target.as_str()) {
            warnings.push(warning(format!(
                "transition '{}' targets undeclared state '{}'",
                t.id, target
            )));
        }
    }

    // 3. Actions: ids present and unique (forcing matches case-insensitively)
    let mut seen_actions = HashSet::new();
    for action in &t.actions {
        match action.id() {
            Some(id) => {
                if !seen_actions.insert(crate::types::fold_case(id)) {
                    warnings.push(warning(format!(
                        "transition '{}' has more than one action with id '{}'",
                        t.id, id
                    )));
                }
            }
            None => warnings.push(warning(format!(
                "transition '{}' has an action without an id; it cannot be forced",
                t.id
            ))),
        }

        // 4. Composite states must land inside the transition's targets
        if let ActionConfig::Composite {
            target_state,
            actions,
            ..
        } = action
        {
            let label = action.id().unwrap_or(crate::action::UNNAMED_ACTION);
            let candidates = std::iter::once(target_state)
                .chain(actions.iter().filter_map(|a| a.target_state.as_ref()));
            for state in candidates {
                if !t.target_states.contains(state) {
                    warnings.push(warning(format!(
                        "composite '{}' in transition '{}' resolves to '{}', \
                         which is not a target state",
                        label, t.id, state
                    )));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::cache::EvaluationContext;
    use crate::types::{ForcedActions, Outcome, Verdict};
    use tempfile::TempDir;

    const ORDER_LIFECYCLE: &str = r#"
version: 1
states:
  - id: NEW
    description: Order received
    transitions:
      - id: validate
        description: Check the order before fulfilment
        stop_on_first_failure: true
        target_states: [VALIDATED, REJECTED]
        actions:
          - type: simple
            id: in-stock
            predicate: in_stock
            additional_info:
              team: warehouse
          - type: composite
            id: payment
            target_state: VALIDATED
            policy: all_of
            actions:
              - id: card-ok
                predicate: card_ok
              - id: fraud-clear
                predicate: fraud_clear
      - id: cancel
        type: manual
        target_states: [CANCELLED]
  - id: VALIDATED
  - id: REJECTED
  - id: CANCELLED
"#;

    #[derive(Debug)]
    struct Order {
        stock: u32,
        card_ok: bool,
    }

    fn registry() -> PredicateRegistry<Order> {
        PredicateRegistry::new()
            .with("in_stock", |o: &Order, _: &EvaluationContext| {
                Outcome::from(o.stock > 0)
            })
            .with("card_ok", |o: &Order, _: &EvaluationContext| {
                Outcome::from(o.card_ok)
            })
            .with("fraud_clear", |_: &Order, _: &EvaluationContext| {
                Outcome::Succeeded
            })
    }

    #[test]
    fn parse_defaults() {
        let cfg = LifecycleConfig::from_yaml(ORDER_LIFECYCLE).unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.states.len(), 4);
        let validate = &cfg.states[0].transitions[0];
        assert_eq!(validate.kind, "auto");
        assert!(validate.stop_on_first_failure);
        let cancel = &cfg.states[0].transitions[1];
        assert_eq!(cancel.kind, "manual");
        assert!(!cancel.stop_on_first_failure);
        assert!(cancel.actions.is_empty());
    }

    #[test]
    fn composite_policy_defaults_to_all_of() {
        let yaml = "type: composite\nid: c\ntarget_state: DONE\n";
        let action: ActionConfig = serde_yaml::from_str(yaml).unwrap();
        let ActionConfig::Composite {
            policy, actions, ..
        } = action
        else {
            panic!("expected composite")
        };
        assert_eq!(policy, CompositePolicy::AllOf);
        assert!(actions.is_empty());
    }

    #[test]
    fn sub_action_rejects_unknown_fields() {
        let yaml = "id: a\npredicate: p\nbogus: 1\n";
        assert!(serde_yaml::from_str::<SubActionConfig>(yaml).is_err());
    }

    #[test]
    fn misspelled_keys_are_rejected_at_every_level() {
        let transition = "id: t\nstop_on_failure: true\n";
        assert!(serde_yaml::from_str::<TransitionConfig>(transition).is_err());

        let action = "type: simple\nid: a\npredicate: p\nadditional: {}\n";
        assert!(serde_yaml::from_str::<ActionConfig>(action).is_err());

        let composite = "type: composite\nid: c\ntarget_state: DONE\npolicies: all_of\n";
        assert!(serde_yaml::from_str::<ActionConfig>(composite).is_err());

        let state = "id: OPEN\ntransition: []\n";
        assert!(serde_yaml::from_str::<StateConfig>(state).is_err());

        let err = LifecycleConfig::from_yaml("version: 1\nstate: []\n").unwrap_err();
        assert!(matches!(err, LifecycleError::Yaml(_)));
    }

    #[test]
    fn build_and_evaluate() {
        let cfg = LifecycleConfig::from_yaml(ORDER_LIFECYCLE).unwrap();
        let lifecycle = cfg.build(&registry(), None).unwrap();
        let validate = lifecycle.transition("NEW", "validate").unwrap();
        assert_eq!(validate.actions().len(), 2);
        assert_eq!(validate.description(), Some("Check the order before fulfilment"));

        let sink = MemoryAuditSink::new();
        let good = Order {
            stock: 3,
            card_ok: true,
        };
        assert_eq!(
            validate.evaluate(&good, &ForcedActions::new(), &sink),
            Verdict::Target("VALIDATED".to_string())
        );

        let bad_card = Order {
            stock: 3,
            card_ok: false,
        };
        assert_eq!(
            validate.evaluate(&bad_card, &ForcedActions::new(), &sink),
            Verdict::Failure
        );
        let forced: ForcedActions = ["card-ok"].into_iter().collect();
        assert_eq!(
            validate.evaluate(&bad_card, &forced, &sink),
            Verdict::Target("VALIDATED".to_string())
        );
    }

    #[test]
    fn additional_info_flows_into_actions() {
        let cfg = LifecycleConfig::from_yaml(ORDER_LIFECYCLE).unwrap();
        let lifecycle = cfg.build(&registry(), None).unwrap();
        let validate = lifecycle.transition("NEW", "validate").unwrap();
        assert_eq!(
            validate.actions()[0].additional_info().get("team").map(String::as_str),
            Some("warehouse")
        );
    }

    #[test]
    fn unknown_predicate_fails_build() {
        let cfg = LifecycleConfig::from_yaml(ORDER_LIFECYCLE).unwrap();
        let partial: PredicateRegistry<Order> = PredicateRegistry::new()
            .with("in_stock", |_: &Order, _: &EvaluationContext| Outcome::Succeeded);
        let err = cfg.build(&partial, None).unwrap_err();
        let LifecycleError::UnknownPredicate { action, predicate } = err else {
            panic!("expected UnknownPredicate")
        };
        assert_eq!(action, "card-ok");
        assert_eq!(predicate, "card_ok");

        let warnings = cfg.validate_with(&partial);
        assert_eq!(
            warnings
                .iter()
                .filter(|w| w.level == WarnLevel::Error && w.message.contains("unknown predicate"))
                .count(),
            2
        );
    }

    #[test]
    fn invalid_identifier_fails_build() {
        let cfg = LifecycleConfig::from_yaml("states:\n  - id: 'has space'\n").unwrap();
        let err = cfg.build(&registry(), None).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidIdentifier(_)));
    }

    #[test]
    fn valid_config_has_no_warnings() {
        let cfg = LifecycleConfig::from_yaml(ORDER_LIFECYCLE).unwrap();
        let warnings = cfg.validate_with(&registry());
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn validate_flags_common_mistakes() {
        let yaml = r#"
states:
  - id: OPEN
    transitions:
      - id: close
        target_states: [CLOSED, CLOSED]
        actions:
          - type: simple
            predicate: p
          - type: simple
            id: Check
            predicate: p
          - type: simple
            id: check
            predicate: p
          - type: composite
            id: group
            target_state: ELSEWHERE
      - id: close
        type: Manual
      - id: reopen
        type: scheduled
        target_states: [OPEN]
  - id: OPEN
"#;
        let cfg = LifecycleConfig::from_yaml(yaml).unwrap();
        let messages: Vec<String> = cfg.validate().into_iter().map(|w| w.message).collect();
        let has = |needle: &str| messages.iter().any(|m| m.contains(needle));

        assert!(has("duplicate state 'OPEN'"));
        assert!(has("duplicate transition 'close'"));
        assert!(has("lists target state 'CLOSED' more than once"));
        assert!(has("targets undeclared state 'CLOSED'"));
        assert!(has("action without an id"));
        assert!(has("more than one action with id 'check'"));
        assert!(has("resolves to 'ELSEWHERE'"));
        assert!(has("has no target states"));
        assert!(has("transition 'reopen' has type 'scheduled'"));
        assert!(!has("type 'Manual'"));
    }

    #[test]
    fn identifiers() {
        for id in ["APPROVED", "in-stock", "a", "v1.2", "ns:check", "x_y"] {
            validate_identifier(id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
        for id in ["", "-lead", "has space", "_lead", "semi;colon"] {
            assert!(validate_identifier(id).is_err(), "expected invalid: {id}");
        }
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lifecycles/order.yaml");
        let cfg = LifecycleConfig::from_yaml(ORDER_LIFECYCLE).unwrap();
        cfg.save(&path).unwrap();
        let loaded = LifecycleConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = LifecycleConfig::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, LifecycleError::Io(_)));
    }
}
