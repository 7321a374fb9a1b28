use crate::audit::AuditSink;
use crate::cache::ActionResultCache;
use crate::config::{LifecycleConfig, PredicateRegistry};
use crate::error::{LifecycleError, Result};
use crate::transition::Transition;
use crate::types::{ForcedActions, Verdict};
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// LifecycleAdapter
// ---------------------------------------------------------------------------

/// Bridges the lifecycle to the subject's own storage of its state.
pub trait LifecycleAdapter<S>: Send + Sync {
    /// Stable identity used in logs.
    fn subject_id(&self, subject: &S) -> String;

    fn current_state(&self, subject: &S) -> Option<String>;

    fn apply_state(&self, subject: &mut S, state: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

pub struct LifecycleState<S> {
    id: String,
    description: Option<String>,
    transitions: Vec<Transition<S>>,
}

impl<S> LifecycleState<S> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            transitions: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_transition(mut self, transition: Transition<S>) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn transitions(&self) -> &[Transition<S>] {
        &self.transitions
    }

    pub fn transition(&self, id: &str) -> Option<&Transition<S>> {
        self.transitions.iter().find(|t| t.id() == id)
    }
}

impl<S> fmt::Debug for LifecycleState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleState")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("transitions", &self.transitions)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// The state graph of one kind of subject: each state owns the transitions
/// leading out of it.
pub struct Lifecycle<S> {
    states: Vec<LifecycleState<S>>,
}

impl<S> Default for Lifecycle<S> {
    fn default() -> Self {
        Self { states: Vec::new() }
    }
}

impl<S> Lifecycle<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph described by `config`, resolving predicate names
    /// through `registry`.
    pub fn from_config(
        config: &LifecycleConfig,
        registry: &PredicateRegistry<S>,
        cache: Option<Arc<dyn ActionResultCache<S>>>,
    ) -> Result<Self> {
        config.build(registry, cache)
    }

    pub fn with_state(mut self, state: LifecycleState<S>) -> Self {
        self.states.push(state);
        self
    }

    pub fn states(&self) -> &[LifecycleState<S>] {
        &self.states
    }

    pub fn state(&self, id: &str) -> Result<&LifecycleState<S>> {
        self.states
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| LifecycleError::StateNotFound(id.to_string()))
    }

    pub fn transition(&self, state: &str, transition: &str) -> Result<&Transition<S>> {
        self.state(state)?
            .transition(transition)
            .ok_or_else(|| LifecycleError::TransitionNotFound {
                state: state.to_string(),
                transition: transition.to_string(),
            })
    }

    /// Evaluate one named transition out of the subject's current state and,
    /// if it lands on a target state, hand that state to the adapter.
    pub fn run_transition(
        &self,
        subject: &mut S,
        adapter: &dyn LifecycleAdapter<S>,
        transition_id: &str,
        forced: &ForcedActions,
        sink: &dyn AuditSink<S>,
    ) -> Result<Verdict> {
        let current = current_state(subject, adapter)?;
        let transition = self.transition(&current, transition_id)?;
        let verdict = transition.evaluate(subject, forced, sink);
        apply(subject, adapter, &current, transition, &verdict)?;
        Ok(verdict)
    }

    /// Try the current state's `auto` transitions in order; the first one
    /// that lands on a target state is applied.
    pub fn run_auto_transitions(
        &self,
        subject: &mut S,
        adapter: &dyn LifecycleAdapter<S>,
        sink: &dyn AuditSink<S>,
    ) -> Result<Verdict> {
        let current = current_state(subject, adapter)?;
        let state = self.state(&current)?;
        let forced = ForcedActions::new();

        for transition in state.transitions().iter().filter(|t| t.is_auto()) {
            let verdict = transition.evaluate(subject, &forced, sink);
            if !verdict.is_failure() {
                apply(subject, adapter, &current, transition, &verdict)?;
                return Ok(verdict);
            }
        }
        Ok(Verdict::Failure)
    }
}

impl<S> fmt::Debug for Lifecycle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("states", &self.states)
            .finish()
    }
}

fn current_state<S>(subject: &S, adapter: &dyn LifecycleAdapter<S>) -> Result<String> {
    adapter
        .current_state(subject)
        .ok_or_else(|| LifecycleError::UnknownCurrentState(adapter.subject_id(subject)))
}

fn apply<S>(
    subject: &mut S,
    adapter: &dyn LifecycleAdapter<S>,
    from: &str,
    transition: &Transition<S>,
    verdict: &Verdict,
) -> Result<()> {
    let Some(to) = verdict.target() else {
        return Ok(());
    };
    adapter.apply_state(subject, to)?;
    tracing::info!(
        subject = %adapter.subject_id(subject),
        transition = %transition.id(),
        from,
        to,
        "state changed"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
