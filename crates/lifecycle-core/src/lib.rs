//! `lifecycle-core`: decides whether a subject may leave its current state.
//!
//! A [`Transition`] holds an ordered chain of actions (simple predicates or
//! composite groups), the legal target states and a stop-on-failure policy.
//! Evaluating it against a subject yields a [`Verdict`]: one legal target
//! state, or failure. Every failed or overridden action is reported to an
//! [`AuditSink`].
//!
//! ```text
//! Lifecycle::run_transition        ← looks up current state via LifecycleAdapter
//!     │
//!     ▼
//! Transition::evaluate             ← ActionResultCache queried once per call
//!     │
//!     ├─ SimpleAction / CompositeAction, in declared order
//!     ├─ decision table per action outcome → AuditSink events
//!     ▼
//! Verdict::Target(state) | Verdict::Failure
//! ```
//!
//! # Quick start
//!
//! ```rust
//! use lifecycle_core::{
//!     EvaluationContext, ForcedActions, MemoryAuditSink, Outcome, SimpleAction, Transition,
//!     Verdict,
//! };
//!
//! let approve: Transition<u32> = Transition::new("approve")
//!     .with_target_state("APPROVED")
//!     .with_action(SimpleAction::new("small-amount", |amount: &u32, _: &EvaluationContext| {
//!         Outcome::from(*amount < 1_000)
//!     }));
//!
//! let sink = MemoryAuditSink::new();
//! assert_eq!(
//!     approve.evaluate(&250, &ForcedActions::new(), &sink),
//!     Verdict::Target("APPROVED".to_string())
//! );
//! assert_eq!(approve.evaluate(&5_000, &ForcedActions::new(), &sink), Verdict::Failure);
//! ```

pub mod action;
pub mod audit;
pub mod cache;
pub mod composite;
pub mod config;
pub mod error;
mod evaluator;
pub mod io;
pub mod lifecycle;
pub mod transition;
pub mod types;

pub use action::{Action, AdditionalInfo, Predicate, SimpleAction};
pub use audit::{
    AuditEvent, AuditEventType, AuditSink, MemoryAuditSink, NullAuditSink, TracingAuditSink,
};
pub use cache::{ActionResultCache, EvaluationContext};
pub use composite::{CompositeAction, CompositeEvaluation, CompositePolicy, SubAction};
pub use config::{LifecycleConfig, PredicateRegistry};
pub use error::{LifecycleError, Result};
pub use lifecycle::{Lifecycle, LifecycleAdapter, LifecycleState};
pub use transition::Transition;
pub use types::{ForcedActions, Outcome, Verdict};
