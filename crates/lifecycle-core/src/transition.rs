use crate::action::Action;
use crate::cache::ActionResultCache;
use std::fmt;
use std::sync::Arc;

pub const TRANSITION_TYPE_AUTO: &str = "auto";
pub const TRANSITION_TYPE_MANUAL: &str = "manual";

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// A configured rule moving a subject out of its current state.
///
/// Built once with the `with_*` methods, then only read. Action order is
/// evaluation order. See [`Transition::evaluate`] for the decision
/// algorithm.
pub struct Transition<S> {
    id: String,
    kind: String,
    description: Option<String>,
    actions: Vec<Action<S>>,
    target_states: Vec<String>,
    stop_on_first_failure: bool,
    cache: Option<Arc<dyn ActionResultCache<S>>>,
}

impl<S> Transition<S> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TRANSITION_TYPE_AUTO.to_string(),
            description: None,
            actions: Vec::new(),
            target_states: Vec::new(),
            stop_on_first_failure: false,
            cache: None,
        }
    }

    /// Free-form type tag, conventionally `auto` or `manual`.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<Action<S>>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Adds a legal target state. Duplicates are ignored.
    pub fn with_target_state(mut self, state: impl Into<String>) -> Self {
        let state = state.into();
        if !self.target_states.contains(&state) {
            self.target_states.push(state);
        }
        self
    }

    pub fn with_target_states<I, T>(self, states: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        states
            .into_iter()
            .fold(self, |t, state| t.with_target_state(state))
    }

    pub fn with_stop_on_first_failure(mut self, stop: bool) -> Self {
        self.stop_on_first_failure = stop;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ActionResultCache<S>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_auto(&self) -> bool {
        self.kind.eq_ignore_ascii_case(TRANSITION_TYPE_AUTO)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn actions(&self) -> &[Action<S>] {
        &self.actions
    }

    pub fn target_states(&self) -> &[String] {
        &self.target_states
    }

    pub fn stops_on_first_failure(&self) -> bool {
        self.stop_on_first_failure
    }

    pub fn cache(&self) -> Option<&dyn ActionResultCache<S>> {
        self.cache.as_deref()
    }

    /// The legal target state when exactly one is declared.
    pub fn single_target_state(&self) -> Option<&str> {
        match self.target_states.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    pub fn is_legal_target(&self, state: &str) -> bool {
        self.target_states.iter().any(|s| s == state)
    }
}

impl<S> Clone for Transition<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            kind: self.kind.clone(),
            description: self.description.clone(),
            actions: self.actions.clone(),
            target_states: self.target_states.clone(),
            stop_on_first_failure: self.stop_on_first_failure,
            cache: self.cache.clone(),
        }
    }
}

impl<S> fmt::Debug for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("description", &self.description)
            .field("actions", &self.actions)
            .field("target_states", &self.target_states)
            .field("stop_on_first_failure", &self.stop_on_first_failure)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
