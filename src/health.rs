//! A background health-check thread that verifies the agent credentials and periodically probes
//! the API to keep [`ConnectionStore`] up to date.
use std::{
    sync::{mpsc::RecvTimeoutError, Arc, Mutex},
    thread::JoinHandle,
    time::Duration,
};

use chrono::Utc;
use rand::{thread_rng, Rng};
use serde::Deserialize;

use crate::{
    client::test_connection,
    config::{OnFailed, OnVerified},
    connection_store::ConnectionStore,
    models::TestRequest,
    transport::{Transport, TEST_ENDPOINT},
    Agent, ConnectionTestResult, Error, ErrorCode,
};

/// Configuration for the background health checks.
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Interval between probes.
    ///
    /// Defaults to [`HealthCheckConfig::DEFAULT_INTERVAL`].
    pub interval: Duration,
    /// Delay before the first probe. When auto-verification is enabled, the delay is counted
    /// from the end of verification, so a slow verification also postpones the first probe.
    ///
    /// Defaults to [`HealthCheckConfig::DEFAULT_INITIAL_DELAY`].
    pub initial_delay: Duration,
    /// Randomized duration subtracted from `interval`. Spreads probes of many client instances
    /// that were started at the same time.
    ///
    /// Defaults to zero.
    pub jitter: Duration,
}

impl HealthCheckConfig {
    /// Default value for [`HealthCheckConfig::interval`].
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
    /// Default value for [`HealthCheckConfig::initial_delay`].
    pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

    pub fn new() -> HealthCheckConfig {
        HealthCheckConfig::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> HealthCheckConfig {
        self.interval = interval;
        self
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> HealthCheckConfig {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> HealthCheckConfig {
        self.jitter = jitter;
        self
    }

    /// Wait before the next probe: `interval` shortened by a random part of `jitter`, never
    /// below zero.
    pub(crate) fn next_wait(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.interval;
        }
        let shortening = thread_rng().gen_range(Duration::ZERO..=self.jitter);
        self.interval.saturating_sub(shortening)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> HealthCheckConfig {
        HealthCheckConfig {
            interval: HealthCheckConfig::DEFAULT_INTERVAL,
            initial_delay: HealthCheckConfig::DEFAULT_INITIAL_DELAY,
            jitter: Duration::ZERO,
        }
    }
}

/// Everything the health-check thread needs, moved into the thread on start.
pub(crate) struct HealthCheck {
    pub transport: Transport,
    pub store: Arc<ConnectionStore>,
    pub auto_verify: bool,
    pub config: HealthCheckConfig,
    pub on_verified: Option<OnVerified>,
    pub on_failed: Option<OnFailed>,
}

/// Handle to the running health-check thread.
pub(crate) struct HealthCheckThread {
    join_handle: Mutex<Option<JoinHandle<()>>>,

    /// Used to send a stop command to the thread. Buffer size of 1 is enough: if the buffer is
    /// full, a stop command is already pending.
    stop_sender: std::sync::mpsc::SyncSender<()>,
}

impl HealthCheckThread {
    pub fn start(health_check: HealthCheck) -> std::io::Result<HealthCheckThread> {
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let join_handle = std::thread::Builder::new()
            .name("offerkit-health".to_owned())
            .spawn(move || {
                let store = health_check.store.clone();
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime,
                        Err(err) => {
                            log::warn!(target: "offerkit", "failed to start health-check runtime: {:?}", err);
                            store.set_disconnected(
                                Error::new(
                                    ErrorCode::HealthCheckFailed,
                                    "failed to start health-check runtime",
                                )
                                .with_details(err),
                            );
                            return;
                        }
                    };

                    if health_check.auto_verify {
                        runtime.block_on(health_check.verify_connection());
                    }

                    let mut timeout = health_check.config.initial_delay;
                    loop {
                        match stop_receiver.recv_timeout(timeout) {
                            Err(RecvTimeoutError::Timeout) => {
                                // Timed out. Time for the next probe.
                            }
                            Ok(()) => {
                                log::debug!(target: "offerkit", "health-check thread received stop command");
                                return;
                            }
                            Err(RecvTimeoutError::Disconnected) => {
                                // The client was dropped.
                                log::debug!(target: "offerkit", "health-check thread received disconnected");
                                return;
                            }
                        }

                        runtime.block_on(health_check.probe());

                        timeout = health_check.config.next_wait();
                    }
                }));

                if result.is_err() {
                    log::warn!(target: "offerkit", "health-check thread panicked");
                    store.set_disconnected(Error::new(
                        ErrorCode::HealthCheckFailed,
                        "health-check thread panicked",
                    ));
                }

                // No further checks will be recorded. Waiters for the first check must not block
                // forever when the thread stopped before one completed.
                store.release_waiters();
            })?;

        Ok(HealthCheckThread {
            join_handle: Mutex::new(Some(join_handle)),
            stop_sender,
        })
    }

    /// Stop the thread. Does not wait for it to exit. Safe to call more than once.
    pub fn stop(&self) {
        // Error means that the receiver was dropped (thread exited) or the buffer is full
        // (a stop command is already pending). Either way the thread is stopping.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the thread and block waiting for it to exit.
    pub fn shutdown(&self) {
        self.stop();

        let join_handle = self
            .join_handle
            .lock()
            .ok()
            .and_then(|mut join_handle| join_handle.take());
        if let Some(join_handle) = join_handle {
            // Err means the thread panicked, which has already been recorded in the store.
            let _ = join_handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .lock()
            .map(|join_handle| {
                join_handle
                    .as_ref()
                    .is_some_and(|join_handle| !join_handle.is_finished())
            })
            .unwrap_or(false)
    }
}

/// The part of a probe response we care about. Any 2xx response counts as success.
#[derive(Deserialize)]
struct ProbeResponse {
    #[serde(default)]
    agent: Option<Agent>,
}

impl HealthCheck {
    /// Verify credentials with the test endpoint. Failures are recorded in the store and passed
    /// to the `on_failed` callback; nothing is returned to the caller.
    pub(crate) async fn verify_connection(&self) {
        match test_connection(&self.transport).await {
            Ok(ConnectionTestResult {
                agent: Some(agent), ..
            }) => {
                log::info!(target: "offerkit", agent_id = agent.id.as_str(); "connection verified");
                self.store.set_connected(Some(agent.clone()));
                if let Some(on_verified) = &self.on_verified {
                    on_verified(&agent);
                }
            }
            Ok(result) => {
                self.verification_failed(Error::new(
                    ErrorCode::VerificationFailed,
                    format!(
                        "Connection verification failed: no agent returned ({})",
                        result.message
                    ),
                ));
            }
            Err(err) => {
                self.verification_failed(
                    Error::new(
                        ErrorCode::VerificationFailed,
                        format!("Connection verification failed: {}", err.message()),
                    )
                    .with_details(err),
                );
            }
        }
    }

    fn verification_failed(&self, err: Error) {
        log::warn!(target: "offerkit", "{}", err.message());
        self.store.set_disconnected(err.clone());
        if let Some(on_failed) = &self.on_failed {
            on_failed(&err);
        }
    }

    /// Probe the test endpoint once and record the outcome.
    pub(crate) async fn probe(&self) {
        let request = TestRequest {
            query: "test query",
            context: "health_check",
            session_id: format!("health_check_{}", Utc::now().timestamp_millis()),
        };

        match self
            .transport
            .post::<_, ProbeResponse>(TEST_ENDPOINT, &request)
            .await
        {
            Ok(response) => {
                let was_connected = self.store.set_connected(response.agent);
                if !was_connected {
                    log::info!(target: "offerkit", "connection to offerkit is up");
                }
            }
            Err(failure) => {
                let err = failure.classify("Health check failed");
                let was_connected = self.store.set_disconnected(
                    Error::new(ErrorCode::HealthCheckFailed, err.message().to_owned())
                        .with_details(err),
                );
                if was_connected {
                    log::info!(target: "offerkit", "connection to offerkit is down");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::{HealthCheck, HealthCheckConfig, HealthCheckThread};
    use crate::{
        config::{OnFailed, OnVerified},
        connection_store::ConnectionStore,
        transport::{Transport, TEST_ENDPOINT},
        Agent, ClientConfig, Error, ErrorCode,
    };

    fn agent_json() -> serde_json::Value {
        json!({"id": "agent-1", "name": "Support bot", "type": "chatbot", "status": "active"})
    }

    fn health_check(server: &MockServer) -> HealthCheck {
        let config = ClientConfig::new("agent-1", "secret-1")
            .base_url(server.uri())
            .timeout(Duration::from_millis(500));
        HealthCheck {
            transport: Transport::new(&config).unwrap(),
            store: Arc::new(ConnectionStore::new()),
            auto_verify: true,
            config: HealthCheckConfig::new()
                .with_initial_delay(Duration::from_millis(10))
                .with_interval(Duration::from_millis(50)),
            on_verified: None,
            on_failed: None,
        }
    }

    #[tokio::test]
    async fn successful_probe_marks_connected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TEST_ENDPOINT))
            .and(body_partial_json(json!({"context": "health_check"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "message": "ok", "agent": agent_json()})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let health_check = health_check(&server);
        health_check.probe().await;

        let status = health_check.store.get_status();
        assert!(status.connected);
        assert!(status.last_check.is_some());
        assert_eq!(status.agent.unwrap().name, "Support bot");
    }

    #[tokio::test]
    async fn failed_probe_marks_disconnected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
            .mount(&server)
            .await;

        let health_check = health_check(&server);
        health_check.store.set_connected(None);
        health_check.probe().await;

        let status = health_check.store.get_status();
        assert!(!status.connected);
        let err = status.last_error.unwrap();
        assert_eq!(err.code(), ErrorCode::HealthCheckFailed);
        assert!(err.message().contains("boom"));
    }

    #[tokio::test]
    async fn verification_without_agent_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true, "message": "ok"})),
            )
            .mount(&server)
            .await;

        let failures = Arc::new(AtomicUsize::new(0));
        let mut health_check = health_check(&server);
        let on_failed: OnFailed = {
            let failures = failures.clone();
            Arc::new(move |err: &Error| {
                assert_eq!(err.code(), ErrorCode::VerificationFailed);
                failures.fetch_add(1, Ordering::SeqCst);
            })
        };
        health_check.on_failed = Some(on_failed);
        health_check.verify_connection().await;

        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(!health_check.store.is_connected());
    }

    #[tokio::test]
    async fn verification_with_agent_calls_on_verified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"query": "test query", "context": "test context"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "message": "ok", "agent": agent_json()})),
            )
            .mount(&server)
            .await;

        let verified = Arc::new(AtomicUsize::new(0));
        let mut health_check = health_check(&server);
        let on_verified: OnVerified = {
            let verified = verified.clone();
            Arc::new(move |agent: &Agent| {
                assert_eq!(agent.id, "agent-1");
                verified.fetch_add(1, Ordering::SeqCst);
            })
        };
        health_check.on_verified = Some(on_verified);
        health_check.verify_connection().await;

        assert_eq!(verified.load(Ordering::SeqCst), 1);
        assert!(health_check.store.is_connected());
    }

    #[tokio::test]
    async fn thread_probes_until_stopped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "message": "ok", "agent": agent_json()})),
            )
            .mount(&server)
            .await;

        let health_check = health_check(&server);
        let store = health_check.store.clone();
        let thread = HealthCheckThread::start(health_check).unwrap();

        let status = tokio::task::spawn_blocking({
            let store = store.clone();
            move || store.wait_for_first_check()
        })
        .await
        .unwrap();
        assert!(status.connected);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(server.received_requests().await.unwrap().len() >= 2);

        thread.stop();
        thread.stop();
        tokio::task::spawn_blocking(move || {
            thread.shutdown();
            assert!(!thread.is_running());
            thread.shutdown();
        })
        .await
        .unwrap();
    }

    #[test]
    fn default_schedule_probes_every_thirty_seconds() {
        let config = HealthCheckConfig::default();

        assert_eq!(config.initial_delay, Duration::from_secs(1));
        for _ in 0..10 {
            assert_eq!(config.next_wait(), Duration::from_secs(30));
        }
    }

    #[test]
    fn jitter_only_shortens_the_interval() {
        let config = HealthCheckConfig::new().with_jitter(Duration::from_secs(5));

        for _ in 0..100 {
            let wait = config.next_wait();
            assert!(wait <= Duration::from_secs(30), "{wait:?} must be <= 30s");
            assert!(wait >= Duration::from_secs(25), "{wait:?} must be >= 25s");
        }
    }

    #[test]
    fn jitter_larger_than_interval_clamps_to_zero() {
        let config = HealthCheckConfig::new()
            .with_interval(Duration::ZERO)
            .with_jitter(Duration::from_secs(30));

        assert_eq!(config.next_wait(), Duration::ZERO);
    }
}
