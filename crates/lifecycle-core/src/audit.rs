use crate::action::AdditionalInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// AuditEventType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    FailedAction,
    ForcedAction,
    FailedTransition,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventType::FailedAction => "failed_action",
            AuditEventType::ForcedAction => "forced_action",
            AuditEventType::FailedTransition => "failed_transition",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuditEvent
// ---------------------------------------------------------------------------

pub const NOTE_ONLY_ONE_TARGET_STATE: &str = "only one target state";
pub const NOTE_NO_TARGET_STATE: &str = "no target state";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub kind: AuditEventType,
    pub transition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_failures: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forced_subs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub legal_states: Vec<String>,
    #[serde(default, skip_serializing_if = "AdditionalInfo::is_empty")]
    pub additional_info: AdditionalInfo,
    pub message: String,
}

impl AuditEvent {
    fn new(kind: AuditEventType, transition: &str, additional_info: AdditionalInfo) -> Self {
        Self {
            id: Uuid::new_v4(),
            at: Utc::now(),
            kind,
            transition: transition.to_string(),
            action: None,
            note: None,
            sub_failures: Vec::new(),
            forced_subs: Vec::new(),
            legal_states: Vec::new(),
            additional_info,
            message: String::new(),
        }
    }

    /// An action did not succeed and nothing overrode it.
    pub fn failed_action(
        transition: &str,
        action: &str,
        note: Option<&str>,
        sub_failures: Vec<String>,
        additional_info: AdditionalInfo,
    ) -> Self {
        let mut event = Self::new(AuditEventType::FailedAction, transition, additional_info);
        event.message = format!(
            "Failed action : {action}{}, sub actions : {}",
            note_suffix(note),
            sub_failures.join(",")
        );
        event.action = Some(action.to_string());
        event.note = note.map(str::to_string);
        event.sub_failures = sub_failures;
        event
    }

    /// A failing action was overridden because the caller forced it.
    pub fn forced_action(
        transition: &str,
        action: &str,
        note: Option<&str>,
        sub_failures: Vec<String>,
        additional_info: AdditionalInfo,
    ) -> Self {
        let mut event = Self::new(AuditEventType::ForcedAction, transition, additional_info);
        event.message = format!(
            "Forced action : {action}{}, sub actions : {}",
            note_suffix(note),
            sub_failures.join(",")
        );
        event.action = Some(action.to_string());
        event.note = note.map(str::to_string);
        event.sub_failures = sub_failures;
        event
    }

    /// A composite succeeded only because some of its sub-actions were forced.
    pub fn forced_sub_actions(
        transition: &str,
        action: &str,
        forced_subs: Vec<String>,
        additional_info: AdditionalInfo,
    ) -> Self {
        let mut event = Self::new(AuditEventType::ForcedAction, transition, additional_info);
        event.message = format!(
            "Forced action : {action}, forced sub actions : {}",
            forced_subs.join(",")
        );
        event.action = Some(action.to_string());
        event.forced_subs = forced_subs;
        event
    }

    /// No legal target state came out of the action chain.
    pub fn failed_transition(
        transition: &str,
        legal_states: Vec<String>,
        additional_info: AdditionalInfo,
    ) -> Self {
        let mut event = Self::new(AuditEventType::FailedTransition, transition, additional_info);
        event.message = format!(
            "Failed transition : id={transition}, targetStates = {}",
            legal_states.join(",")
        );
        event.legal_states = legal_states;
        event
    }
}

fn note_suffix(note: Option<&str>) -> String {
    note.map(|n| format!(" ({n})")).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// AuditSink
// ---------------------------------------------------------------------------

/// Receives audit events as a transition is evaluated. Sinks swallow their
/// own failures; nothing flows back into the evaluation.
pub trait AuditSink<S>: Send + Sync {
    fn log_event(&self, subject: &S, event: AuditEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl<S> AuditSink<S> for NullAuditSink {
    fn log_event(&self, _subject: &S, _event: AuditEvent) {}
}

/// Forwards events to `tracing`: failures at `warn`, overrides at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl<S: fmt::Debug> AuditSink<S> for TracingAuditSink {
    fn log_event(&self, subject: &S, event: AuditEvent) {
        let action = event.action.as_deref().unwrap_or("");
        match event.kind {
            AuditEventType::FailedAction | AuditEventType::FailedTransition => {
                tracing::warn!(
                    event_id = %event.id,
                    kind = %event.kind,
                    transition = %event.transition,
                    action,
                    subject = ?subject,
                    "{}",
                    event.message
                );
            }
            AuditEventType::ForcedAction => {
                tracing::info!(
                    event_id = %event.id,
                    kind = %event.kind,
                    transition = %event.transition,
                    action,
                    subject = ?subject,
                    "{}",
                    event.message
                );
            }
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.lock().clone()
    }

    pub fn events_of(&self, kind: AuditEventType) -> Vec<AuditEvent> {
        self.lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<S> AuditSink<S> for MemoryAuditSink {
    fn log_event(&self, _subject: &S, event: AuditEvent) {
        self.lock().push(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_action_message() {
        let e = AuditEvent::failed_action(
            "T1",
            "A1",
            Some(NOTE_NO_TARGET_STATE),
            vec!["x".to_string(), "y".to_string()],
            AdditionalInfo::new(),
        );
        assert_eq!(e.kind, AuditEventType::FailedAction);
        assert_eq!(e.message, "Failed action : A1 (no target state), sub actions : x,y");
        assert_eq!(e.note.as_deref(), Some("no target state"));
    }

    #[test]
    fn forced_messages() {
        let e = AuditEvent::forced_action(
            "T1",
            "A1",
            Some(NOTE_ONLY_ONE_TARGET_STATE),
            Vec::new(),
            AdditionalInfo::new(),
        );
        assert_eq!(
            e.message,
            "Forced action : A1 (only one target state), sub actions : "
        );

        let e = AuditEvent::forced_sub_actions(
            "T1",
            "C1",
            vec!["s1".to_string()],
            AdditionalInfo::new(),
        );
        assert_eq!(e.message, "Forced action : C1, forced sub actions : s1");
        assert_eq!(e.forced_subs, vec!["s1".to_string()]);
    }

    #[test]
    fn failed_transition_message() {
        let e = AuditEvent::failed_transition(
            "T1",
            vec!["APPROVED".to_string(), "REJECTED".to_string()],
            AdditionalInfo::new(),
        );
        assert_eq!(
            e.message,
            "Failed transition : id=T1, targetStates = APPROVED,REJECTED"
        );
        assert!(e.action.is_none());
    }

    #[test]
    fn event_json_skips_empty_fields() {
        let e = AuditEvent::failed_transition("T1", Vec::new(), AdditionalInfo::new());
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "failed_transition");
        assert!(json.get("action").is_none());
        assert!(json.get("legal_states").is_none());
        let parsed: AuditEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, e);
    }

    #[test]
    fn memory_sink_collects_in_order() {
        let sink = MemoryAuditSink::new();
        let info = AdditionalInfo::new();
        AuditSink::<()>::log_event(
            &sink,
            &(),
            AuditEvent::failed_action("T", "a", None, Vec::new(), info.clone()),
        );
        AuditSink::<()>::log_event(
            &sink,
            &(),
            AuditEvent::failed_transition("T", Vec::new(), info),
        );
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events()[0].kind, AuditEventType::FailedAction);
        assert_eq!(sink.events_of(AuditEventType::FailedTransition).len(), 1);
        sink.clear();
        assert!(sink.is_empty());
    }
}
