/*
 * Control gate for the turn loop.
 *
 * A watch channel carries the whole gate state, so every transition is one
 * atomic update and every waiter wakes on any change:
 *
 *   RUNNING --pause--> PAUSED --resume / pause timeout--> RUNNING
 *   any --close--> CLOSED (terminal)
 *
 * The turn loop enters the gate before each generation and exits after the
 * merge. A pause taken while a generation is in flight only blocks the next
 * generation; `wait_idle` lets the pauser wait for the current one.
 */

use gol_common::{GolError, GolMetrics, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Whether the turn loop may start a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Running,
    Paused,
}

#[derive(Debug, Clone)]
struct GateState {
    control: ControlState,
    /// A generation has entered and not yet exited
    in_flight: bool,
    /// When the current pause began
    paused_at: Option<Instant>,
    /// Terminated; nothing enters again
    closed: bool,
}

/// Gate between the control plane and the turn loop.
pub struct ControlGate {
    tx: watch::Sender<GateState>,
    metrics: Arc<GolMetrics>,
}

impl ControlGate {
    pub fn new(metrics: Arc<GolMetrics>) -> Self {
        let (tx, _) = watch::channel(GateState {
            control: ControlState::Running,
            in_flight: false,
            paused_at: None,
            closed: false,
        });
        Self { tx, metrics }
    }

    pub fn state(&self) -> ControlState {
        self.tx.borrow().control
    }

    pub fn is_paused(&self) -> bool {
        self.state() == ControlState::Paused
    }

    pub fn is_closed(&self) -> bool {
        self.tx.borrow().closed
    }

    pub fn in_flight(&self) -> bool {
        self.tx.borrow().in_flight
    }

    /// RUNNING -> PAUSED. Returns false if already paused.
    pub fn pause(&self) -> bool {
        let changed = self.tx.send_if_modified(|s| {
            if s.control == ControlState::Running {
                s.control = ControlState::Paused;
                s.paused_at = Some(Instant::now());
                true
            } else {
                false
            }
        });
        if changed {
            self.metrics.record_pause();
        }
        changed
    }

    /// PAUSED -> RUNNING. Returns false if not paused.
    pub fn resume(&self) -> bool {
        let changed = self.tx.send_if_modified(|s| {
            if s.control == ControlState::Paused {
                s.control = ControlState::Running;
                s.paused_at = None;
                true
            } else {
                false
            }
        });
        if changed {
            self.metrics.record_resume();
        }
        changed
    }

    /// Closes the gate for good and wakes every waiter.
    pub fn close(&self) {
        self.tx.send_modify(|s| s.closed = true);
    }

    /// Waits until no generation is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so the channel cannot close under us
        let _ = rx.wait_for(|s| !s.in_flight).await;
    }

    /// Blocks while paused, then marks a generation in flight.
    ///
    /// A pause older than `pause_timeout` is lifted with a warning. Fails with
    /// `Terminated` once the gate is closed.
    pub async fn enter(&self, pause_timeout: Option<Duration>) -> Result<()> {
        let mut rx = self.tx.subscribe();

        loop {
            let state = rx.borrow_and_update().clone();
            if state.closed {
                return Err(GolError::Terminated);
            }

            if state.control == ControlState::Running {
                let entered = self.tx.send_if_modified(|s| {
                    if !s.closed && s.control == ControlState::Running {
                        s.in_flight = true;
                        true
                    } else {
                        false
                    }
                });
                if entered {
                    return Ok(());
                }
                continue;
            }

            let deadline = pause_timeout.zip(state.paused_at).map(|(limit, at)| (at + limit, at));
            match deadline {
                Some((deadline, paused_at)) => {
                    match tokio::time::timeout_at(deadline, rx.changed()).await {
                        Ok(changed) => changed.map_err(|_| GolError::Terminated)?,
                        Err(_) => self.expire_pause(paused_at, pause_timeout),
                    }
                }
                None => rx.changed().await.map_err(|_| GolError::Terminated)?,
            }
        }
    }

    /// Marks the in-flight generation as merged.
    pub fn exit(&self) {
        self.tx.send_if_modified(|s| std::mem::replace(&mut s.in_flight, false));
    }

    fn expire_pause(&self, paused_at: Instant, limit: Option<Duration>) {
        let lifted = self.tx.send_if_modified(|s| {
            if s.control == ControlState::Paused && s.paused_at == Some(paused_at) {
                s.control = ControlState::Running;
                s.paused_at = None;
                true
            } else {
                false
            }
        });
        if lifted {
            self.metrics.record_pause_timeout();
            tracing::warn!("Pause exceeded {:?}, resuming turn loop", limit.unwrap_or_default());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> Arc<ControlGate> {
        Arc::new(ControlGate::new(Arc::new(GolMetrics::new())))
    }

    #[test]
    fn test_pause_resume_idempotent() {
        let gate = gate();
        assert!(gate.pause());
        assert!(!gate.pause());
        assert!(gate.is_paused());

        assert!(gate.resume());
        assert!(!gate.resume());
        assert_eq!(gate.state(), ControlState::Running);
    }

    #[tokio::test]
    async fn test_enter_blocks_while_paused() {
        let gate = gate();
        gate.pause();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.enter(None).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        gate.resume();
        waiter.await.unwrap().unwrap();
        assert!(gate.in_flight());

        gate.exit();
        assert!(!gate.in_flight());
    }

    #[tokio::test]
    async fn test_wait_idle_waits_for_exit() {
        let gate = gate();
        gate.enter(None).await.unwrap();
        gate.pause();

        let idle = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_idle().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!idle.is_finished());

        gate.exit();
        idle.await.unwrap();
    }

    #[tokio::test]
    async fn test_pause_timeout_resumes() {
        let metrics = Arc::new(GolMetrics::new());
        let gate = ControlGate::new(metrics.clone());
        gate.pause();

        gate.enter(Some(Duration::from_millis(40))).await.unwrap();
        assert_eq!(gate.state(), ControlState::Running);
        assert_eq!(metrics.snapshot().pause_timeouts, 1);
    }

    #[tokio::test]
    async fn test_close_wakes_paused_loop() {
        let gate = gate();
        gate.pause();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.enter(None).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.close();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(GolError::Terminated)));
        assert!(matches!(gate.enter(None).await, Err(GolError::Terminated)));
    }
}
