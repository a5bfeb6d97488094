/*
 * Domain shapes of the broker's control-plane responses.
 *
 * Both the broker (producer) and the client (consumer) speak these types;
 * the wire messages in gol-proto convert to and from them.
 */

use crate::AliveSet;
use serde::{Deserialize, Serialize};

/// Response to CheckStatus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub working: bool,
    pub turn: u32,
}

/// Response to Tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub turn: u32,
    pub alive_count: u64,
}

/// Response to Pause and Resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlReport {
    pub turn: u32,
    pub working: bool,
}

/// Response to SubmitJob and Interrupt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub completed_turns: u32,
    pub alive: AliveSet,
}

/// Outcome of cascading a shutdown to the worker pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Workers that acknowledged the shutdown.
    pub notified: Vec<String>,
    /// Workers that could not be reached, with the error.
    pub failed: Vec<(String, String)>,
}

impl ShutdownReport {
    pub fn all_notified(&self) -> bool {
        self.failed.is_empty()
    }
}
