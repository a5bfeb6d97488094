/*
 * Events emitted by the controller and commands it accepts.
 */

use gol_common::{AliveSet, GolError, Result};
use serde::Serialize;
use std::str::FromStr;

/// Lifecycle state reported through `Event::StateChange`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum State {
    Paused,
    Executing,
    Quitting,
}

/// Something the controller observed or did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Periodic progress from a Tick call.
    AliveCellsCount { turn: u32, alive: u64 },
    StateChange { turn: u32, state: State },
    /// A snapshot was written by the sink.
    SnapshotSaved { turn: u32, location: String },
    /// The job reached its final turn.
    FinalTurnComplete { turn: u32, alive: AliveSet },
}

impl Event {
    /// The turn the event refers to.
    pub fn turn(&self) -> u32 {
        match self {
            Event::AliveCellsCount { turn, .. }
            | Event::StateChange { turn, .. }
            | Event::SnapshotSaved { turn, .. }
            | Event::FinalTurnComplete { turn, .. } => *turn,
        }
    }
}

/// Key commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `p`: pause, or resume if paused
    TogglePause,
    /// `s`: save a snapshot of the current generation
    Snapshot,
    /// `q`: detach, leaving the job running on the broker
    Quit,
    /// `k`: save a snapshot, then shut the broker and workers down
    Kill,
}

impl Command {
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'p' => Some(Command::TogglePause),
            's' => Some(Command::Snapshot),
            'q' => Some(Command::Quit),
            'k' => Some(Command::Kill),
            _ => None,
        }
    }
}

impl FromStr for Command {
    type Err = GolError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(key), None) => Command::from_key(key)
                .ok_or_else(|| GolError::Protocol(format!("unknown command '{}'", key))),
            _ => Err(GolError::Protocol(format!(
                "expected a single key (p, s, q, k), got '{}'",
                s.trim()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_keys() {
        assert_eq!("p".parse::<Command>().unwrap(), Command::TogglePause);
        assert_eq!(" S\n".parse::<Command>().unwrap(), Command::Snapshot);
        assert_eq!(Command::from_key('q'), Some(Command::Quit));
        assert_eq!(Command::from_key('k'), Some(Command::Kill));
        assert!("x".parse::<Command>().is_err());
        assert!("pq".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
    }
}
