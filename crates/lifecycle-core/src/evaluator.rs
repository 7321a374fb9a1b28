use crate::action::{Action, AdditionalInfo};
use crate::audit::{AuditEvent, AuditSink, NOTE_NO_TARGET_STATE, NOTE_ONLY_ONE_TARGET_STATE};
use crate::cache::EvaluationContext;
use crate::composite::CompositeAction;
use crate::transition::Transition;
use crate::types::{ForcedActions, Outcome, Verdict};

// ---------------------------------------------------------------------------
// Step (decision input)
// ---------------------------------------------------------------------------

/// Facts about one evaluated action that the decision table branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Step {
    /// The action's id was named in the caller's forced actions.
    pub forced: bool,
    pub composite: bool,
    pub succeeded: bool,
    /// The transition declares exactly one legal target state.
    pub single_target: bool,
    /// An earlier action already failed the run.
    pub failed_so_far: bool,
}

// ---------------------------------------------------------------------------
// Branch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Branch {
    /// Unforced failure: the run fails.
    Fail,
    /// Forced composite failure: land on the composite's fallback state.
    ForceComposite,
    /// Forced simple failure with a single legal state: land on it, keep going.
    ForceSingleTarget,
    /// Forced simple failure with no unambiguous state to land on.
    FailNoTarget,
    /// Successful composite: its resolved state ends the run.
    ResolveComposite,
    /// Simple success while nothing has failed yet.
    CarrySuccess,
    /// Simple success after an earlier failure: the failure stands.
    KeepFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
    StopIfConfigured,
}

impl Branch {
    fn flow(self) -> Flow {
        match self {
            Branch::Fail | Branch::FailNoTarget => Flow::StopIfConfigured,
            Branch::ForceComposite | Branch::ResolveComposite => Flow::Stop,
            Branch::ForceSingleTarget | Branch::CarrySuccess | Branch::KeepFailure => {
                Flow::Continue
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Decision table
// ---------------------------------------------------------------------------

pub(crate) struct BranchRule {
    pub id: &'static str,
    pub condition: fn(&Step) -> bool,
    pub branch: Branch,
}

fn unforced_failure(s: &Step) -> bool {
    !s.succeeded && !s.forced
}

fn forced_composite_failure(s: &Step) -> bool {
    !s.succeeded && s.forced && s.composite
}

fn forced_failure_single_target(s: &Step) -> bool {
    !s.succeeded && s.forced && s.single_target
}

fn forced_failure_no_target(s: &Step) -> bool {
    !s.succeeded && s.forced
}

fn composite_success(s: &Step) -> bool {
    s.succeeded && s.composite
}

fn simple_success(s: &Step) -> bool {
    s.succeeded && !s.failed_so_far
}

/// Catch-all: rules 1 and 4 take every failure and rules 5 and 6 every
/// composite or untainted success, so only a simple success after an
/// earlier failure lands here.
fn simple_success_after_failure(_: &Step) -> bool {
    true
}

/// Ordered rules; the first matching condition decides the branch.
pub(crate) static DECISION_TABLE: &[BranchRule] = &[
    BranchRule {
        id: "unforced-failure",
        condition: unforced_failure,
        branch: Branch::Fail,
    },
    BranchRule {
        id: "forced-composite-failure",
        condition: forced_composite_failure,
        branch: Branch::ForceComposite,
    },
    BranchRule {
        id: "forced-failure-single-target",
        condition: forced_failure_single_target,
        branch: Branch::ForceSingleTarget,
    },
    BranchRule {
        id: "forced-failure-no-target",
        condition: forced_failure_no_target,
        branch: Branch::FailNoTarget,
    },
    BranchRule {
        id: "composite-success",
        condition: composite_success,
        branch: Branch::ResolveComposite,
    },
    BranchRule {
        id: "simple-success",
        condition: simple_success,
        branch: Branch::CarrySuccess,
    },
    BranchRule {
        id: "simple-success-after-failure",
        condition: simple_success_after_failure,
        branch: Branch::KeepFailure,
    },
];

pub(crate) fn decide(step: &Step) -> &'static BranchRule {
    DECISION_TABLE
        .iter()
        .find(|rule| (rule.condition)(step))
        .unwrap_or_else(|| unreachable!("decision table ends with a catch-all rule"))
}

// ---------------------------------------------------------------------------
// Running result
// ---------------------------------------------------------------------------

/// Intermediate result carried across the action loop.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Running {
    /// Nothing has failed and no state has been picked yet.
    Pending,
    Failed,
    State(String),
}

/// What one action produced, simple and composite alike.
struct ActionResult<'a, S> {
    outcome: Outcome,
    composite: Option<&'a CompositeAction<S>>,
    resolved: Option<String>,
    failed_subs: Vec<String>,
    forced_subs: Vec<String>,
}

fn run_action<'a, S>(
    action: &'a Action<S>,
    subject: &S,
    ctx: &EvaluationContext,
    forced: &ForcedActions,
) -> ActionResult<'a, S> {
    match action {
        Action::Simple(simple) => ActionResult {
            outcome: simple.evaluate(subject, ctx),
            composite: None,
            resolved: None,
            failed_subs: Vec::new(),
            forced_subs: Vec::new(),
        },
        Action::Composite(composite) => {
            let eval = composite.evaluate(subject, ctx, forced);
            ActionResult {
                outcome: Outcome::from(eval.succeeded()),
                composite: Some(composite),
                resolved: eval.resolved,
                failed_subs: eval.failed,
                forced_subs: eval.forced,
            }
        }
    }
}

fn event_info<S>(action: &Action<S>, outcome: Outcome) -> AdditionalInfo {
    let mut info = action.additional_info().clone();
    info.entry("outcome".to_string())
        .or_insert_with(|| outcome.as_str().to_string());
    info
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

impl<S> Transition<S> {
    /// Decide which state `subject` should land in.
    ///
    /// Walks the actions in order, applying the decision table to each
    /// outcome, then checks the surviving result against the legal target
    /// states. Failures are returned as [`Verdict::Failure`] and audited
    /// through `sink`; this never errors and never mutates `subject`.
    pub fn evaluate(
        &self,
        subject: &S,
        forced: &ForcedActions,
        sink: &dyn AuditSink<S>,
    ) -> Verdict {
        let ctx = self
            .cache()
            .map(|cache| cache.context_for(subject))
            .unwrap_or_default();
        let single_target = self.single_target_state();

        let mut running = Running::Pending;
        let mut last_info = AdditionalInfo::new();

        for action in self.actions() {
            let is_forced = forced.contains(action.id());
            let result = run_action(action, subject, &ctx, forced);
            let step = Step {
                forced: is_forced,
                composite: result.composite.is_some(),
                succeeded: result.outcome.is_success(),
                single_target: single_target.is_some(),
                failed_so_far: running == Running::Failed,
            };
            let rule = decide(&step);
            last_info = action.additional_info().clone();

            tracing::debug!(
                transition = %self.id(),
                action = action.label(),
                outcome = %result.outcome,
                forced = is_forced,
                rule = rule.id,
                "evaluated action"
            );

            match rule.branch {
                Branch::Fail => {
                    running = Running::Failed;
                    sink.log_event(
                        subject,
                        AuditEvent::failed_action(
                            self.id(),
                            action.label(),
                            None,
                            result.failed_subs,
                            event_info(action, result.outcome),
                        ),
                    );
                }
                Branch::ForceComposite => {
                    let fallback = result
                        .composite
                        .map(|c| c.target_state().to_string())
                        .unwrap_or_default();
                    running = Running::State(fallback);
                    sink.log_event(
                        subject,
                        AuditEvent::forced_action(
                            self.id(),
                            action.label(),
                            None,
                            result.failed_subs,
                            event_info(action, result.outcome),
                        ),
                    );
                }
                Branch::ForceSingleTarget => {
                    running = single_target
                        .map(|s| Running::State(s.to_string()))
                        .unwrap_or(Running::Failed);
                    sink.log_event(
                        subject,
                        AuditEvent::forced_action(
                            self.id(),
                            action.label(),
                            Some(NOTE_ONLY_ONE_TARGET_STATE),
                            result.failed_subs,
                            event_info(action, result.outcome),
                        ),
                    );
                }
                Branch::FailNoTarget => {
                    running = Running::Failed;
                    sink.log_event(
                        subject,
                        AuditEvent::failed_action(
                            self.id(),
                            action.label(),
                            Some(NOTE_NO_TARGET_STATE),
                            result.failed_subs,
                            event_info(action, result.outcome),
                        ),
                    );
                }
                Branch::ResolveComposite => {
                    running = result
                        .resolved
                        .map(Running::State)
                        .unwrap_or(Running::Failed);
                    if !result.forced_subs.is_empty() {
                        sink.log_event(
                            subject,
                            AuditEvent::forced_sub_actions(
                                self.id(),
                                action.label(),
                                result.forced_subs,
                                action.additional_info().clone(),
                            ),
                        );
                    }
                }
                Branch::CarrySuccess => running = Running::Pending,
                Branch::KeepFailure => {}
            }

            match rule.branch.flow() {
                Flow::Stop => break,
                Flow::StopIfConfigured if self.stops_on_first_failure() => break,
                _ => {}
            }
        }

        match self.settle(running) {
            Some(state) => Verdict::Target(state),
            None => {
                tracing::debug!(transition = %self.id(), "transition failed");
                sink.log_event(
                    subject,
                    AuditEvent::failed_transition(
                        self.id(),
                        self.target_states().to_vec(),
                        last_info,
                    ),
                );
                Verdict::Failure
            }
        }
    }

    /// Collapse the loop's result onto a legal target state, or nothing.
    fn settle(&self, running: Running) -> Option<String> {
        match running {
            Running::Pending => self.single_target_state().map(str::to_string),
            Running::State(state) if self.is_legal_target(&state) => Some(state),
            Running::State(_) | Running::Failed => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
