use crate::cache::EvaluationContext;
use crate::composite::CompositeAction;
use crate::types::Outcome;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Opaque key/value metadata attached to an action and copied into audit
/// events. Never interpreted by the evaluator.
pub type AdditionalInfo = BTreeMap<String, String>;

/// Placeholder used in audit output for actions configured without an id.
pub const UNNAMED_ACTION: &str = "<unnamed>";

pub(crate) fn label(id: Option<&str>) -> &str {
    id.unwrap_or(UNNAMED_ACTION)
}

// ---------------------------------------------------------------------------
// Predicate
// ---------------------------------------------------------------------------

/// A read-only check over a subject.
///
/// Implementations must be pure with respect to `subject` and `ctx`: the
/// evaluator may call them from several threads and expects identical
/// results for identical inputs.
pub trait Predicate<S>: Send + Sync {
    fn evaluate(&self, subject: &S, ctx: &EvaluationContext) -> Outcome;
}

impl<S, F> Predicate<S> for F
where
    F: Fn(&S, &EvaluationContext) -> Outcome + Send + Sync,
{
    fn evaluate(&self, subject: &S, ctx: &EvaluationContext) -> Outcome {
        self(subject, ctx)
    }
}

// ---------------------------------------------------------------------------
// SimpleAction
// ---------------------------------------------------------------------------

pub struct SimpleAction<S> {
    id: Option<String>,
    additional_info: AdditionalInfo,
    predicate: Arc<dyn Predicate<S>>,
}

impl<S> SimpleAction<S> {
    pub fn new(id: impl Into<String>, predicate: impl Predicate<S> + 'static) -> Self {
        Self::from_shared(Some(id.into()), Arc::new(predicate))
    }

    /// An action with no id. It can fail or succeed but can never be forced.
    pub fn anonymous(predicate: impl Predicate<S> + 'static) -> Self {
        Self::from_shared(None, Arc::new(predicate))
    }

    pub fn from_shared(id: Option<String>, predicate: Arc<dyn Predicate<S>>) -> Self {
        Self {
            id: id.filter(|s| !s.is_empty()),
            additional_info: AdditionalInfo::new(),
            predicate,
        }
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

    pub fn evaluate(&self, subject: &S, ctx: &EvaluationContext) -> Outcome {
        self.predicate.evaluate(subject, ctx)
    }
}

impl<S> Clone for SimpleAction<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            additional_info: self.additional_info.clone(),
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<S> fmt::Debug for SimpleAction<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleAction")
            .field("id", &self.id)
            .field("additional_info", &self.additional_info)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One step of a transition's action chain.
pub enum Action<S> {
    Simple(SimpleAction<S>),
    Composite(CompositeAction<S>),
}

impl<S> Action<S> {
    pub fn id(&self) -> Option<&str> {
        match self {
            Action::Simple(a) => a.id(),
            Action::Composite(c) => c.id(),
        }
    }

    pub fn additional_info(&self) -> &AdditionalInfo {
        match self {
            Action::Simple(a) => a.additional_info(),
            Action::Composite(c) => c.additional_info(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Action::Composite(_))
    }

    pub fn label(&self) -> &str {
        label(self.id())
    }
}

impl<S> Clone for Action<S> {
    fn clone(&self) -> Self {
        match self {
            Action::Simple(a) => Action::Simple(a.clone()),
            Action::Composite(c) => Action::Composite(c.clone()),
        }
    }
}

impl<S> fmt::Debug for Action<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Simple(a) => f.debug_tuple("Simple").field(a).finish(),
            Action::Composite(c) => f.debug_tuple("Composite").field(c).finish(),
        }
    }
}

impl<S> From<SimpleAction<S>> for Action<S> {
    fn from(action: SimpleAction<S>) -> Self {
        Action::Simple(action)
    }
}

impl<S> From<CompositeAction<S>> for Action<S> {
    fn from(action: CompositeAction<S>) -> Self {
        Action::Composite(action)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn positive(n: &i32, _: &EvaluationContext) -> Outcome {
        Outcome::from(*n > 0)
    }

    #[test]
    fn simple_action_evaluates_predicate() {
        let action: SimpleAction<i32> = SimpleAction::new("positive", positive);
        let ctx = EvaluationContext::new();
        assert_eq!(action.evaluate(&5, &ctx), Outcome::Succeeded);
        assert_eq!(action.evaluate(&-1, &ctx), Outcome::Failed);
        assert_eq!(action.id(), Some("positive"));
    }

    #[test]
    fn empty_id_is_treated_as_missing() {
        let action: SimpleAction<i32> =
            SimpleAction::from_shared(Some(String::new()), Arc::new(positive));
        assert_eq!(action.id(), None);
        assert_eq!(Action::from(action).label(), UNNAMED_ACTION);
    }

    #[test]
    fn additional_info_is_kept() {
        let action: SimpleAction<i32> = SimpleAction::new("positive", positive)
            .with_info("owner", "billing")
            .with_info("severity", "low");
        let action = Action::from(action);
        assert_eq!(
            action.additional_info().get("owner").map(String::as_str),
            Some("billing")
        );
        assert_eq!(action.additional_info().len(), 2);
        assert!(!action.is_composite());
    }

    #[test]
    fn context_reaches_predicate() {
        let action = SimpleAction::new("has-budget", |_: &i32, ctx: &EvaluationContext| {
            Outcome::from(ctx.get_as::<u32>("budget").unwrap_or(0) > 10)
        });
        let ctx = EvaluationContext::new().with("budget", 50);
        assert!(action.evaluate(&0, &ctx).is_success());
        assert!(!action.evaluate(&0, &EvaluationContext::new()).is_success());
    }
}
