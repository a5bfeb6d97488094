/*
 * Health Checks and Graceful Shutdown
 *
 * Health state shared by the gRPC service and the optional HTTP probe
 * endpoint of a worker (the broker reuses it for its own process).
 *
 * Health checks expose:
 * - /health/live - Liveness probe (is the process running?)
 * - /health/ready - Readiness probe (can it accept strips?)
 * - /health/status - Detailed JSON status
 * - /metrics - Prometheus counters
 *
 * Graceful shutdown:
 * - Triggered by SIGINT/SIGTERM or a Shutdown RPC
 * - Stops accepting new strips
 * - Waits for in-flight strips to complete (with timeout)
 */

use gol_common::GolMetrics;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Health state for a worker or broker process.
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Whether the process is alive
    live: Arc<AtomicBool>,
    /// Whether the process is ready to accept work
    ready: Arc<AtomicBool>,
    /// Number of strips currently being computed
    in_flight: Arc<AtomicUsize>,
    /// Maximum concurrent strips allowed
    max_in_flight: usize,
    /// Metrics collector for detailed health info
    metrics: Arc<GolMetrics>,
    /// Shutdown signal sender
    shutdown_tx: Arc<watch::Sender<bool>>,
    /// Shutdown signal receiver
    shutdown_rx: watch::Receiver<bool>,
}

/// Admission for one in-flight strip; releases its slot when dropped.
#[derive(Debug)]
pub struct StripPermit {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for StripPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl HealthState {
    /// Creates a new health state.
    pub fn new(max_in_flight: usize, metrics: Arc<GolMetrics>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            live: Arc::new(AtomicBool::new(true)),
            ready: Arc::new(AtomicBool::new(true)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight,
            metrics,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Ready means live, not shutting down, and not explicitly marked unready.
    pub fn is_ready(&self) -> bool {
        self.is_live() && self.ready.load(Ordering::SeqCst) && !self.is_shutting_down()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
        tracing::info!("Ready state changed to: {}", ready);
    }

    /// Marks the process as unhealthy (not live).
    pub fn mark_unhealthy(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
        tracing::error!("Marked as unhealthy");
    }

    /// Admits one strip, or returns `None` if at capacity or shutting down.
    pub fn try_accept_strip(&self) -> Option<StripPermit> {
        if self.is_shutting_down() {
            tracing::debug!("Rejecting strip: shutting down");
            return None;
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst);
        if current >= self.max_in_flight {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(
                "Rejecting strip: at capacity ({}/{})",
                current,
                self.max_in_flight
            );
            return None;
        }

        Some(StripPermit {
            in_flight: self.in_flight.clone(),
        })
    }

    /// Gets a receiver for shutdown signals.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Resolves once shutdown has been initiated.
    pub async fn shutdown_signal(&self) {
        let mut rx = self.shutdown_receiver();
        // Sender lives in self, so this only ends by observing `true`
        let _ = rx.wait_for(|down| *down).await;
    }

    /// Initiates graceful shutdown.
    pub fn initiate_shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");
        self.ready.store(false, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);
    }

    /// Waits for all in-flight strips to complete; false on timeout.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let start = std::time::Instant::now();

        while self.in_flight_count() > 0 {
            if start.elapsed() > timeout {
                tracing::warn!(
                    "Drain timeout: {} strips still in flight",
                    self.in_flight_count()
                );
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        tracing::info!("All strips drained");
        true
    }

    pub fn metrics(&self) -> Arc<GolMetrics> {
        self.metrics.clone()
    }

    /// Returns detailed health information.
    pub fn detailed_status(&self) -> HealthStatus {
        let metrics = self.metrics.snapshot();

        HealthStatus {
            live: self.is_live(),
            ready: self.is_ready(),
            shutting_down: self.is_shutting_down(),
            in_flight: self.in_flight_count(),
            max_in_flight: self.max_in_flight,
            strips_computed: metrics.strips_computed,
            generations_completed: metrics.generations_completed,
        }
    }
}

/// Detailed health status for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub shutting_down: bool,
    pub in_flight: usize,
    pub max_in_flight: usize,
    pub strips_computed: u64,
    pub generations_completed: u64,
}

/// Minimal HTTP/1.1 health endpoint, compatible with Kubernetes probes.
pub struct HealthServer {
    state: HealthState,
    addr: SocketAddr,
}

impl HealthServer {
    pub fn new(state: HealthState, addr: SocketAddr) -> Self {
        Self { state, addr }
    }

    /// Serves probes until shutdown is initiated.
    pub async fn serve(self) -> std::io::Result<()> {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!("Health server listening on {}", self.addr);
        let mut shutdown = self.state.shutdown_receiver();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let state = self.state.clone();
                            tokio::spawn(async move {
                                let (reader, mut writer) = stream.into_split();
                                let mut reader = BufReader::new(reader);
                                let mut line = String::new();

                                if reader.read_line(&mut line).await.is_err() {
                                    return;
                                }

                                let response = Self::handle_request(&line, &state);
                                let _ = writer.write_all(response.as_bytes()).await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown.wait_for(|down| *down) => {
                    tracing::info!("Health server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    fn handle_request(request_line: &str, state: &HealthState) -> String {
        let path = request_line.split_whitespace().nth(1).unwrap_or("/");

        match path {
            "/health/live" | "/healthz" => {
                if state.is_live() {
                    Self::response(200, "text/plain", "OK")
                } else {
                    Self::response(503, "text/plain", "NOT LIVE")
                }
            }
            "/health/ready" | "/readyz" => {
                if state.is_ready() {
                    Self::response(200, "text/plain", "OK")
                } else {
                    Self::response(503, "text/plain", "NOT READY")
                }
            }
            "/health/status" | "/health" => {
                let status = state.detailed_status();
                let body =
                    serde_json::to_string_pretty(&status).unwrap_or_else(|_| "{}".to_string());
                let code = if status.live && status.ready { 200 } else { 503 };
                Self::response(code, "application/json", &body)
            }
            "/metrics" => Self::response(200, "text/plain; version=0.0.4", &state.metrics.to_prometheus()),
            _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_string(),
        }
    }

    fn response(code: u16, content_type: &str, body: &str) -> String {
        let reason = match code {
            200 => "OK",
            _ => "Service Unavailable",
        };
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n{}",
            code,
            reason,
            content_type,
            body.len(),
            body
        )
    }
}

/// Initiates shutdown on SIGINT or SIGTERM.
pub async fn setup_graceful_shutdown(state: HealthState) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C");
    }

    state.initiate_shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(max: usize) -> HealthState {
        HealthState::new(max, Arc::new(GolMetrics::new()))
    }

    #[test]
    fn test_health_state_creation() {
        let state = state(4);

        assert!(state.is_live());
        assert!(state.is_ready());
        assert!(!state.is_shutting_down());
        assert_eq!(state.in_flight_count(), 0);
    }

    #[test]
    fn test_strip_admission() {
        let state = state(2);

        let first = state.try_accept_strip();
        let second = state.try_accept_strip();
        assert!(first.is_some() && second.is_some());
        assert_eq!(state.in_flight_count(), 2);

        // At capacity
        assert!(state.try_accept_strip().is_none());
        assert_eq!(state.in_flight_count(), 2);

        drop(first);
        assert_eq!(state.in_flight_count(), 1);
        assert!(state.try_accept_strip().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_and_signals() {
        let state = state(4);
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.shutdown_signal().await })
        };

        state.initiate_shutdown();
        waiter.await.unwrap();

        assert!(!state.is_ready());
        assert!(state.is_shutting_down());
        assert!(state.try_accept_strip().is_none());
    }

    #[tokio::test]
    async fn test_drain_waits_for_permits() {
        let state = state(4);
        let permit = state.try_accept_strip().unwrap();

        assert!(!state.wait_for_drain(Duration::from_millis(50)).await);
        drop(permit);
        assert!(state.wait_for_drain(Duration::from_millis(50)).await);
    }

    #[test]
    fn test_probe_routes() {
        let state = state(1);
        assert!(HealthServer::handle_request("GET /health/live HTTP/1.1", &state).starts_with("HTTP/1.1 200"));
        assert!(HealthServer::handle_request("GET /metrics HTTP/1.1", &state).contains("gol_generations_total"));
        assert!(HealthServer::handle_request("GET /nope HTTP/1.1", &state).starts_with("HTTP/1.1 404"));

        state.initiate_shutdown();
        assert!(HealthServer::handle_request("GET /readyz HTTP/1.1", &state).starts_with("HTTP/1.1 503"));
    }
}
