use std::{str::FromStr, sync::Arc, time::Duration};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::{health::HealthCheckConfig, Agent, Client, Error, Result};

/// Callback invoked when connection verification succeeds.
pub type OnVerified = Arc<dyn Fn(&Agent) + Send + Sync>;
/// Callback invoked when connection verification fails.
pub type OnFailed = Arc<dyn Fn(&Error) + Send + Sync>;

/// Named OfferKit deployment, used to pick a base URL when none is set explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Production,
    Development,
    Local,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Production => "https://api.offerkit.dev",
            Environment::Development => "https://dev-api.offerkit.dev",
            Environment::Local => "http://localhost:3001",
        }
    }
}

impl FromStr for Environment {
    type Err = std::convert::Infallible;

    /// Unknown names map to [`Environment::Production`].
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "development" => Environment::Development,
            "local" => Environment::Local,
            _ => Environment::Production,
        })
    }
}

/// Configuration for [`Client`].
///
/// # Examples
/// ```
/// # use offerkit::{ClientConfig, Environment};
/// # use std::time::Duration;
/// let config = ClientConfig::new("agent-id", "agent-secret")
///     .environment(Environment::Development)
///     .timeout(Duration::from_secs(5))
///     .on_failed(|err| eprintln!("offerkit is unreachable: {err}"));
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    pub(crate) agent_id: String,
    pub(crate) agent_secret: String,
    pub(crate) base_url: Option<String>,
    pub(crate) environment: Environment,
    pub(crate) timeout: Duration,
    pub(crate) auto_verify: bool,
    pub(crate) health_check: bool,
    pub(crate) health_check_config: HealthCheckConfig,
    pub(crate) headers: HeaderMap,
    pub(crate) on_verified: Option<OnVerified>,
    pub(crate) on_failed: Option<OnFailed>,
}

impl ClientConfig {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

    /// Create a default configuration using the specified agent credentials.
    pub fn new(agent_id: impl Into<String>, agent_secret: impl Into<String>) -> ClientConfig {
        ClientConfig {
            agent_id: agent_id.into(),
            agent_secret: agent_secret.into(),
            base_url: None,
            environment: Environment::default(),
            timeout: ClientConfig::DEFAULT_TIMEOUT,
            auto_verify: true,
            health_check: true,
            health_check_config: HealthCheckConfig::default(),
            headers: HeaderMap::new(),
            on_verified: None,
            on_failed: None,
        }
    }

    /// Build a configuration from `OFFERKIT_AGENT_ID`, `OFFERKIT_AGENT_SECRET` and the optional
    /// `OFFERKIT_BASE_URL` and `OFFERKIT_ENVIRONMENT` variables.
    ///
    /// Missing credentials are reported when the client is created.
    pub fn from_env() -> ClientConfig {
        let var = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());

        let mut config = ClientConfig::new(
            var("OFFERKIT_AGENT_ID").unwrap_or_default(),
            var("OFFERKIT_AGENT_SECRET").unwrap_or_default(),
        );
        if let Some(environment) = var("OFFERKIT_ENVIRONMENT") {
            config = config.environment(environment.parse::<Environment>().unwrap_or_default());
        }
        if let Some(base_url) = var("OFFERKIT_BASE_URL") {
            config = config.base_url(base_url);
        }
        config
    }

    /// Override base URL for API calls. Takes precedence over [`ClientConfig::environment`].
    pub fn base_url(mut self, base_url: impl Into<String>) -> ClientConfig {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn environment(mut self, environment: Environment) -> ClientConfig {
        self.environment = environment;
        self
    }

    /// Upper bound for each request, including reading the response body.
    pub fn timeout(mut self, timeout: Duration) -> ClientConfig {
        self.timeout = timeout;
        self
    }

    /// Verify credentials in the background as soon as the client is created. Defaults to `true`.
    ///
    /// Has no effect when health checking is disabled.
    pub fn auto_verify(mut self, auto_verify: bool) -> ClientConfig {
        self.auto_verify = auto_verify;
        self
    }

    /// Run the background health-check thread. Defaults to `true`.
    ///
    /// With health checking disabled the client only issues requests on demand and
    /// [`Client::is_ready`] always returns `false`.
    pub fn health_check(mut self, health_check: bool) -> ClientConfig {
        self.health_check = health_check;
        self
    }

    pub fn health_check_config(mut self, health_check_config: HealthCheckConfig) -> ClientConfig {
        self.health_check_config = health_check_config;
        self
    }

    /// Add a header to every request. A header with the same name as one of the SDK headers
    /// (`Content-Type`, `X-Agent-Id`, `X-Agent-Secret-Key`) replaces it.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> ClientConfig {
        self.headers.insert(name, value);
        self
    }

    /// Set a callback to run when connection verification succeeds.
    pub fn on_verified(
        mut self,
        on_verified: impl Fn(&Agent) + Send + Sync + 'static,
    ) -> ClientConfig {
        self.on_verified = Some(Arc::new(on_verified));
        self
    }

    /// Set a callback to run when connection verification fails.
    pub fn on_failed(
        mut self,
        on_failed: impl Fn(&Error) + Send + Sync + 'static,
    ) -> ClientConfig {
        self.on_failed = Some(Arc::new(on_failed));
        self
    }

    /// Base URL requests are sent to: explicit base URL, otherwise the environment's URL.
    pub fn resolved_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.agent_id.is_empty() || self.agent_secret.is_empty() {
            return Err(Error::config("agent_id and agent_secret are required"));
        }
        Ok(())
    }

    /// Create a new [`Client`] using this configuration.
    ///
    /// ```
    /// # use offerkit::ClientConfig;
    /// let client = ClientConfig::new("agent-id", "agent-secret")
    ///     .health_check(false)
    ///     .to_client()
    ///     .unwrap();
    /// ```
    pub fn to_client(self) -> Result<Client> {
        Client::new(self)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("agent_id", &self.agent_id)
            .field("agent_secret", &"<redacted>")
            .field("base_url", &self.resolved_base_url())
            .field("timeout", &self.timeout)
            .field("auto_verify", &self.auto_verify)
            .field("health_check", &self.health_check)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientConfig, Environment};
    use crate::ErrorCode;

    #[test]
    fn explicit_base_url_wins() {
        let config = ClientConfig::new("id", "secret")
            .environment(Environment::Local)
            .base_url("https://proxy.example.com");

        assert_eq!(config.resolved_base_url(), "https://proxy.example.com");
    }

    #[test]
    fn environment_selects_base_url() {
        let config = |environment| ClientConfig::new("id", "secret").environment(environment);

        assert_eq!(
            config(Environment::Local).resolved_base_url(),
            "http://localhost:3001"
        );
        assert_eq!(
            config(Environment::Development).resolved_base_url(),
            "https://dev-api.offerkit.dev"
        );
        assert_eq!(
            config(Environment::Production).resolved_base_url(),
            "https://api.offerkit.dev"
        );
        assert_eq!(
            ClientConfig::new("id", "secret").resolved_base_url(),
            "https://api.offerkit.dev"
        );
    }

    #[test]
    fn unknown_environment_is_production() {
        let parse = |name: &str| name.parse::<Environment>().unwrap();

        assert_eq!(parse("staging"), Environment::Production);
        assert_eq!(parse("LOCAL"), Environment::Local);
        assert_eq!(parse("development"), Environment::Development);
    }

    #[test]
    fn requires_both_credentials() {
        for (id, secret) in [("", "secret"), ("id", ""), ("", "")] {
            let err = ClientConfig::new(id, secret).validate().unwrap_err();
            assert_eq!(err.code(), ErrorCode::Config);
        }
        assert!(ClientConfig::new("id", "secret").validate().is_ok());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let debug = format!("{:?}", ClientConfig::new("id", "super-secret"));

        assert!(!debug.contains("super-secret"));
    }
}
