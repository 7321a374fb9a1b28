use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of evaluating a single predicate against a subject.
///
/// `Failed` and `Indeterminate` are both "not succeeded" as far as the
/// evaluator is concerned; the distinction only reaches audit metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
    Indeterminate,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Succeeded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Failed => "failed",
            Outcome::Indeterminate => "indeterminate",
        }
    }
}

impl From<bool> for Outcome {
    fn from(ok: bool) -> Self {
        if ok {
            Outcome::Succeeded
        } else {
            Outcome::Failed
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Final answer of a transition evaluation.
///
/// A `Target` is always one of the transition's legal target states.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "state", rename_all = "snake_case")]
pub enum Verdict {
    Target(String),
    Failure,
}

impl Verdict {
    pub fn target(&self) -> Option<&str> {
        match self {
            Verdict::Target(s) => Some(s),
            Verdict::Failure => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Verdict::Failure)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Target(s) => f.write_str(s),
            Verdict::Failure => f.write_str("failure"),
        }
    }
}

// ---------------------------------------------------------------------------
// ForcedActions
// ---------------------------------------------------------------------------

/// Caller-supplied action ids whose failure should be overridden.
///
/// Lookups ignore case one character at a time, so ids only match when they
/// have the same number of characters. An action without an id never matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForcedActions {
    ids: HashSet<String>,
}

impl ForcedActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl AsRef<str>) {
        self.ids.insert(fold_case(id.as_ref()));
    }

    pub fn contains(&self, id: Option<&str>) -> bool {
        match id {
            Some(id) if !self.ids.is_empty() => self.ids.contains(&fold_case(id)),
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Maps every character to one canonical character: its single-character
/// uppercase form (or itself), then the first character of that form's
/// lowercase.
pub(crate) fn fold_case(id: &str) -> String {
    id.chars().map(fold_char).collect()
}

fn fold_char(c: char) -> char {
    let mut upper = c.to_uppercase();
    let up = match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => c,
    };
    up.to_lowercase().next().unwrap_or(up)
}

impl<T: AsRef<str>> FromIterator<T> for ForcedActions {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut forced = ForcedActions::new();
        for id in iter {
            forced.insert(id);
        }
        forced
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
