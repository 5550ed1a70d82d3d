//! Per-date build state machine

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

/// `Pending → Selecting → Differing → Computing → Committing → Done`,
/// with `Failed` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Pending,
    Selecting,
    Differing,
    Computing,
    Committing,
    Done,
    Failed,
}

impl BuildState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildState::Pending => "pending",
            BuildState::Selecting => "selecting",
            BuildState::Differing => "differing",
            BuildState::Computing => "computing",
            BuildState::Committing => "committing",
            BuildState::Done => "done",
            BuildState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Done | BuildState::Failed)
    }

    /// The next state on the success path
    pub fn next(&self) -> Option<BuildState> {
        match self {
            BuildState::Pending => Some(BuildState::Selecting),
            BuildState::Selecting => Some(BuildState::Differing),
            BuildState::Differing => Some(BuildState::Computing),
            BuildState::Computing => Some(BuildState::Committing),
            BuildState::Committing => Some(BuildState::Done),
            BuildState::Done | BuildState::Failed => None,
        }
    }
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one date through the state machine
#[derive(Debug)]
pub struct DateBuild {
    date: NaiveDate,
    state: BuildState,
}

impl DateBuild {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            state: BuildState::Pending,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Move along the success path. Terminal states stay where they are.
    pub fn advance(&mut self) -> BuildState {
        if let Some(next) = self.state.next() {
            debug!(date = %self.date, from = %self.state, to = %next, "Build state");
            self.state = next;
        }
        self.state
    }

    /// Mark failed, returning the state the failure happened in
    pub fn fail(&mut self) -> BuildState {
        let at = self.state;
        if !at.is_terminal() {
            debug!(date = %self.date, from = %at, "Build state failed");
            self.state = BuildState::Failed;
        }
        at
    }
}
