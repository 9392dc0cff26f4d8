//! Client configuration and per-call fetch policy.

use std::time::Duration;

/// Configuration for [`QueryClient`](crate::QueryClient) and its transport.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL that relative endpoint templates are joined to.
    pub base_url: String,

    /// HTTP request timeout; `None` keeps the transport default.
    pub request_timeout: Option<Duration>,

    /// Bearer token sent with every request.
    pub bearer_token: Option<String>,

    /// Retries after a failed read (default: 2). Mutations never retry.
    pub retry: u32,

    /// Delay before the first retry, doubled on each further attempt (default: 1 second).
    pub retry_base_delay: Duration,

    /// Upper bound for the retry delay (default: 30 seconds).
    pub retry_max_delay: Duration,

    /// Whether reads go stale when the application regains focus (default: true).
    pub refetch_on_focus: bool,

    /// Age after which a cached read is refetched; `None` keeps it until invalidated.
    pub stale_after: Option<Duration>,

    /// Idle time after which `collect_garbage` drops an entry (default: 5 minutes).
    pub gc_after: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout: None,
            bearer_token: None,
            retry: 2,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            refetch_on_focus: true,
            stale_after: None,
            gc_after: Duration::from_secs(300),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for the given base URL with default values.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = base;
        self.retry_max_delay = max;
        self
    }

    #[must_use]
    pub fn with_refetch_on_focus(mut self, enabled: bool) -> Self {
        self.refetch_on_focus = enabled;
        self
    }

    #[must_use]
    pub fn with_stale_after(mut self, age: Duration) -> Self {
        self.stale_after = Some(age);
        self
    }

    #[must_use]
    pub fn with_gc_after(mut self, idle: Duration) -> Self {
        self.gc_after = idle;
        self
    }

    /// Delay before retry number `attempt` (zero based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }

    /// Fetch policy used when a request does not carry its own.
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            enabled: true,
            retry: self.retry,
            refetch_on_focus: self.refetch_on_focus,
            stale_after: self.stale_after,
        }
    }
}

/// Per-call cache and retry behaviour of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// A disabled read never touches the network.
    pub enabled: bool,
    pub retry: u32,
    pub refetch_on_focus: bool,
    pub stale_after: Option<Duration>,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        ClientConfig::default().fetch_policy()
    }
}

impl FetchPolicy {
    /// Policy that blocks the read until its precondition holds.
    #[must_use]
    pub fn enabled_when(mut self, ready: bool) -> Self {
        self.enabled = ready;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_refetch_on_focus(mut self, enabled: bool) -> Self {
        self.refetch_on_focus = enabled;
        self
    }

    #[must_use]
    pub fn with_stale_after(mut self, age: Duration) -> Self {
        self.stale_after = Some(age);
        self
    }
}
