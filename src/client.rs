use std::sync::Arc;

use chrono::Utc;

use crate::{
    connection_store::{ConnectionStatus, ConnectionStore},
    health::{HealthCheck, HealthCheckThread},
    models::TestRequest,
    transport::{Transport, OFFERS_ENDPOINT, TEST_ENDPOINT},
    ClientConfig, ConnectionTestResult, Error, OfferRequest, OfferResponse, Result,
};

/// A client for the OfferKit API.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// Unless health checking is disabled, creating a client starts a background thread that
/// verifies the credentials and probes the API every 30 seconds. Its outcome is available via
/// [`Client::is_ready`] and [`Client::get_connection_status`]. Failures of background checks are
/// never returned from any method.
///
/// # Examples
/// ```no_run
/// # async fn run() -> offerkit::Result<()> {
/// use offerkit::{ClientConfig, OfferRequest};
///
/// let client = ClientConfig::new("agent-id", "agent-secret").to_client()?;
/// let response = client
///     .get_offers(&OfferRequest::new("productivity tools", "session-1"))
///     .await?;
/// for offer in response.offers {
///     println!("{}: {}", offer.title, offer.action_endpoint);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Client {
    transport: Transport,
    connection_store: Arc<ConnectionStore>,
    health_check: Option<HealthCheckThread>,
}

impl Client {
    /// Create a new `Client` using the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns an error with [`ErrorCode::Config`](crate::ErrorCode::Config) if the agent id or
    /// secret is empty, if the base URL cannot be parsed, or if the health-check thread cannot be
    /// started.
    pub fn new(config: ClientConfig) -> Result<Client> {
        config.validate()?;

        let transport = Transport::new(&config)?;
        let connection_store = Arc::new(ConnectionStore::new());

        let health_check = if config.health_check {
            let thread = HealthCheckThread::start(HealthCheck {
                transport: Transport::new(&config)?,
                store: connection_store.clone(),
                auto_verify: config.auto_verify,
                config: config.health_check_config.clone(),
                on_verified: config.on_verified.clone(),
                on_failed: config.on_failed.clone(),
            })
            .map_err(|err| {
                Error::config(format!("failed to start health-check thread: {err}"))
                    .with_details(err)
            })?;
            Some(thread)
        } else {
            None
        };

        log::debug!(target: "offerkit",
                    base_url = transport.base_url().as_str(),
                    health_check = config.health_check;
                    "created client");

        Ok(Client {
            transport,
            connection_store,
            health_check,
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        self.transport.base_url().as_str()
    }

    /// Request offers matching `request.query`.
    ///
    /// Offers are returned in the order chosen by the server.
    pub async fn get_offers(&self, request: &OfferRequest) -> Result<OfferResponse> {
        let response: OfferResponse = self
            .transport
            .post(OFFERS_ENDPOINT, request)
            .await
            .map_err(|failure| failure.classify("Failed to get offers"))
            .inspect_err(|err| {
                log::warn!(target: "offerkit",
                           session_id = request.session_id.as_str(),
                           code = err.code().as_str();
                           "{}", err.message());
            })?;

        log::trace!(target: "offerkit",
                    session_id = response.session_id.as_str(),
                    offers = response.offers.len();
                    "received offers");

        Ok(response)
    }

    /// Check the agent credentials against the test endpoint.
    pub async fn test_connection(&self) -> Result<ConnectionTestResult> {
        test_connection(&self.transport).await
    }

    /// Current connectivity as seen by the background health checks. Never performs I/O.
    pub fn get_connection_status(&self) -> ConnectionStatus {
        self.connection_store.get_status()
    }

    /// Whether the last verification or probe succeeded. Never performs I/O.
    pub fn is_ready(&self) -> bool {
        self.connection_store.is_connected()
    }

    /// Block until the first background check has completed and return the connection status.
    ///
    /// Returns the current status immediately if health checking is disabled or stopped.
    pub fn wait_for_first_check(&self) -> ConnectionStatus {
        match &self.health_check {
            Some(health_check) if health_check.is_running() => {
                self.connection_store.wait_for_first_check()
            }
            _ => self.connection_store.get_status(),
        }
    }

    /// Stop the background health checks. The connection status is no longer updated afterwards.
    ///
    /// Does not wait for the thread to exit and does not cancel requests already in flight. Safe
    /// to call any number of times.
    pub fn stop_health_check(&self) {
        if let Some(health_check) = &self.health_check {
            log::debug!(target: "offerkit", "stopping health checks");
            health_check.stop();
        }
    }

    /// Stop the background health checks and block waiting for the thread to exit.
    pub fn shutdown(&self) {
        if let Some(health_check) = &self.health_check {
            health_check.shutdown();
        }
    }
}

/// POST a synthetic request to the test endpoint.
pub(crate) async fn test_connection(transport: &Transport) -> Result<ConnectionTestResult> {
    let request = TestRequest {
        query: "test query",
        context: "test context",
        session_id: format!("test_{}", Utc::now().timestamp_millis()),
    };

    transport
        .post(TEST_ENDPOINT, &request)
        .await
        .map_err(|failure| failure.classify("Connection test failed"))
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url())
            .field("health_check", &self.health_check.is_some())
            .field("connected", &self.is_ready())
            .finish()
    }
}
