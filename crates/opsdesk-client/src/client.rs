//! Typed, cached read operations.
//!
//! A read is registered once under a cache key (`purchaseOrderIndex`) and a
//! catalog endpoint (`index.purchaseOrder`). Registration returns a
//! [`ReadToken`] that carries the response type, so every later fetch is
//! validated against that type's [`Shape`] and deserialized into it.
//!
//! # Example
//!
//! ```ignore
//! let client = QueryClient::with_reqwest(catalog, ClientConfig::new(base_url))?;
//! let orders = client.register_read::<OrderPage>(
//!     "purchaseOrderIndex",
//!     EndpointRef::new(EndpointGroup::Index, "purchaseOrder"),
//! )?;
//!
//! let request = FetchRequest::new(QueryParams::new().with("page", 2).with_search("vendor", "acme"));
//! let page = client.fetch(&orders, &request).await?;
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use opsdesk_core::{
    CoreError, EndpointCatalog, EndpointRef, OperationDescriptor, QueryParams, Shape, Validated,
    parse,
};
use serde_json::Value;

use crate::cache::{CacheKey, CacheStatsSnapshot, QueryCache};
use crate::config::{ClientConfig, FetchPolicy};
use crate::error::{ClientError, TransportError};
use crate::transport::{HttpRequest, ReqwestTransport, Transport};

/// Registered cache namespace of a read operation.
///
/// Only obtainable from a [`ReadToken`], so a mutation can only name reads
/// that actually exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadKey(Arc<str>);

impl ReadKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a registered read returning `T`.
pub struct ReadToken<T> {
    key: ReadKey,
    descriptor: OperationDescriptor,
    shape: Shape,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ReadToken<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            descriptor: self.descriptor.clone(),
            shape: self.shape.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ReadToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadToken")
            .field("key", &self.key)
            .field("endpoint", &self.descriptor.reference().to_string())
            .finish()
    }
}

impl<T> ReadToken<T> {
    pub fn key(&self) -> &ReadKey {
        &self.key
    }

    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }
}

/// Parameters of one fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub params: QueryParams,
    /// Value for an `:id` placeholder.
    pub id: Option<String>,
    /// Overrides the client's default policy.
    pub policy: Option<FetchPolicy>,
}

impl FetchRequest {
    pub fn new(params: QueryParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// Entry point for reads and writes against the API.
pub struct QueryClient {
    catalog: Arc<EndpointCatalog>,
    transport: Arc<dyn Transport>,
    pub(crate) cache: QueryCache,
    pub(crate) config: ClientConfig,
    read_keys: DashMap<Arc<str>, EndpointRef>,
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("base_url", &self.config.base_url)
            .field("operations", &self.catalog.len())
            .field("reads", &self.read_keys.len())
            .field("cache", &self.cache)
            .finish()
    }
}

impl QueryClient {
    pub fn new(
        catalog: Arc<EndpointCatalog>,
        transport: Arc<dyn Transport>,
        config: ClientConfig,
    ) -> Self {
        Self {
            catalog,
            transport,
            cache: QueryCache::new(),
            config,
            read_keys: DashMap::new(),
        }
    }

    /// Client backed by [`ReqwestTransport`].
    pub fn with_reqwest(catalog: Arc<EndpointCatalog>, config: ClientConfig) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(&config)
            .map_err(|e| ClientError::transport("client setup", e))?;
        Ok(Self::new(catalog, Arc::new(transport), config))
    }

    pub fn catalog(&self) -> &EndpointCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Register a read under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The endpoint is not in the catalog
    /// - The endpoint is not a GET operation
    /// - `key` is empty or already registered
    pub fn register_read<T: Validated>(
        &self,
        key: &str,
        endpoint: EndpointRef,
    ) -> Result<ReadToken<T>, ClientError> {
        if key.trim().is_empty() {
            return Err(ClientError::registration("read key must not be empty"));
        }
        let descriptor = self.catalog.resolve(&endpoint)?.clone();
        if descriptor.method().is_write() {
            return Err(ClientError::registration(format!(
                "{endpoint} is a {} operation and cannot back read '{key}'",
                descriptor.method()
            )));
        }

        let key: Arc<str> = Arc::from(key);
        match self.read_keys.entry(key.clone()) {
            Entry::Occupied(existing) => {
                return Err(ClientError::registration(format!(
                    "read '{key}' is already registered for {}",
                    existing.get()
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(endpoint);
            }
        }

        tracing::debug!(read_key = %key, endpoint = %descriptor.reference(), "Registered read");
        Ok(ReadToken {
            key: ReadKey(key),
            descriptor,
            shape: T::shape(),
            _marker: PhantomData,
        })
    }

    pub(crate) fn is_registered(&self, key: &ReadKey) -> bool {
        self.read_keys.contains_key(&key.0)
    }

    /// Fetch through the cache.
    ///
    /// A fresh cached value is returned without a request. Otherwise the
    /// endpoint is called, the response validated against the token's shape
    /// and stored.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotReady`] if the policy is disabled or a placeholder
    ///   has no value; no request is sent in either case
    /// - [`ClientError::Transport`] after the retries are exhausted
    /// - [`ClientError::Validation`] if the response does not match the shape
    pub async fn fetch<T: Validated>(
        &self,
        token: &ReadToken<T>,
        request: &FetchRequest,
    ) -> Result<T, ClientError> {
        self.load(token, request, false).await
    }

    /// Fetch from the network even if a fresh entry exists.
    pub async fn refetch<T: Validated>(
        &self,
        token: &ReadToken<T>,
        request: &FetchRequest,
    ) -> Result<T, ClientError> {
        self.load(token, request, true).await
    }

    /// Cached value for the request, stale or not, without any request.
    pub fn peek<T: Validated>(
        &self,
        token: &ReadToken<T>,
        request: &FetchRequest,
    ) -> Result<Option<T>, ClientError> {
        let cache_key = CacheKey::new(token.key.as_str(), request.id.as_deref(), &request.params);
        self.cache
            .peek(&cache_key)
            .map(|value| parse(&token.shape, value))
            .transpose()
            .map_err(|e| ClientError::validation(token.key.as_str(), e))
    }

    /// Mark every cached variant of a read stale.
    pub fn invalidate(&self, key: &ReadKey) -> usize {
        self.cache.invalidate_key(key.as_str())
    }

    /// The application regained focus: reads that opted in go stale.
    pub fn notify_focus(&self) -> usize {
        let count = self.cache.mark_focus_stale();
        tracing::debug!(count, "Focus regained, marked reads stale");
        count
    }

    /// Drop cache entries idle longer than the configured gc window.
    pub fn collect_garbage(&self) -> usize {
        self.cache.evict_idle(self.config.gc_after)
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }

    async fn load<T: Validated>(
        &self,
        token: &ReadToken<T>,
        request: &FetchRequest,
        force: bool,
    ) -> Result<T, ClientError> {
        let operation = token.key.as_str();
        let policy = request
            .policy
            .clone()
            .unwrap_or_else(|| self.config.fetch_policy());

        if !policy.enabled {
            return Err(ClientError::not_ready(operation, "query is disabled"));
        }

        let mut params = request.params.clone();
        let path = token
            .descriptor
            .render(request.id.as_deref(), &mut params)
            .map_err(|e| match e {
                CoreError::MissingPlaceholder { .. } => ClientError::not_ready(operation, e.to_string()),
                other => other.into(),
            })?;

        let cache_key = CacheKey::new(operation, request.id.as_deref(), &request.params);
        if !force && let Some(value) = self.cache.get_fresh(&cache_key, policy.stale_after) {
            tracing::trace!(key = %cache_key, "Cache hit");
            return parse(&token.shape, value).map_err(|e| ClientError::validation(operation, e));
        }

        tracing::debug!(key = %cache_key, forced = force, "Cache miss, fetching");
        let generation = self.cache.generation(operation);
        let body = self
            .send_with_retry(operation, HttpRequest::get(path, params.encode()), policy.retry)
            .await?;

        let typed = parse(&token.shape, body.clone()).map_err(|e| ClientError::validation(operation, e))?;

        // Concurrent fetches of one key are not coordinated: the last
        // response to settle overwrites the entry. A response that raced an
        // invalidation is still returned to this caller but stored stale.
        self.cache
            .insert_settled(cache_key, body, policy.refetch_on_focus, generation);
        Ok(typed)
    }

    async fn send_with_retry(
        &self,
        operation: &str,
        request: HttpRequest,
        retries: u32,
    ) -> Result<Value, ClientError> {
        let mut attempt = 0;
        loop {
            match self.transport.send(request.clone()).await {
                Ok(response) => return Ok(response.body),
                Err(err) if attempt < retries && err.is_retryable() => {
                    let delay = self.config.retry_delay(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        ?delay,
                        "Read failed, retrying: {err}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!(operation, url = %request.target(), "Read failed: {err}");
                    return Err(ClientError::transport(operation, err));
                }
            }
        }
    }

    /// Send a write once, without retries.
    pub(crate) async fn send_once(
        &self,
        operation: &str,
        request: HttpRequest,
    ) -> Result<Value, TransportError> {
        self.transport
            .send(request)
            .await
            .map(|response| response.body)
            .inspect_err(|err| tracing::warn!(operation, "Write failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::ScriptedTransport;
    use opsdesk_core::{EndpointGroup, QueryValue};
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Debug, Deserialize, PartialEq)]
    struct OrderPage {
        status: bool,
        data: Vec<Order>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        id: i64,
        vendor: Option<String>,
    }

    impl Validated for OrderPage {
        fn shape() -> Shape {
            Shape::object([
                ("status", Shape::Boolean),
                (
                    "data",
                    Shape::array(Shape::object([
                        ("id", Shape::Integer),
                        ("vendor", Shape::String.nullable()),
                    ])),
                ),
            ])
        }
    }

    fn catalog() -> Arc<EndpointCatalog> {
        Arc::new(
            EndpointCatalog::new()
                .with(EndpointGroup::Index, "purchaseOrder", "/purchase-orders")
                .with(EndpointGroup::Info, "purchaseOrder", "/purchase-orders/:id")
                .with(EndpointGroup::Create, "purchaseOrder", "/purchase-orders"),
        )
    }

    fn client(transport: Arc<ScriptedTransport>) -> QueryClient {
        let config = ClientConfig::default().with_retry_delay(Duration::ZERO, Duration::ZERO);
        QueryClient::new(catalog(), transport, config)
    }

    fn page() -> Value {
        json!({"status": true, "data": [{"id": 1, "vendor": "Acme"}, {"id": 2, "vendor": null}]})
    }

    fn index_ref() -> EndpointRef {
        EndpointRef::new(EndpointGroup::Index, "purchaseOrder")
    }

    #[tokio::test]
    async fn test_second_fetch_is_served_from_cache() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(page());
        let client = client(transport.clone());
        let orders = client.register_read::<OrderPage>("purchaseOrderIndex", index_ref()).unwrap();

        let request = FetchRequest::new(QueryParams::new().with("page", 2).with_search("id", 5));
        let first = client.fetch(&orders, &request).await.unwrap();
        let second = client.fetch(&orders, &request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.data.len(), 2);
        assert_eq!(transport.calls(), 1);

        let sent = &transport.requests()[0];
        assert_eq!(sent.path, "/purchase-orders");
        assert_eq!(sent.query, "page=2&search[id]=5");
        assert_eq!(client.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_distinct_params_are_distinct_entries() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(page());
        transport.push_ok(page());
        let client = client(transport.clone());
        let orders = client.register_read::<OrderPage>("purchaseOrderIndex", index_ref()).unwrap();

        client
            .fetch(&orders, &FetchRequest::new(QueryParams::new().with("page", 1)))
            .await
            .unwrap();
        client
            .fetch(&orders, &FetchRequest::new(QueryParams::new().with("page", 2)))
            .await
            .unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_disabled_policy_sends_nothing() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = client(transport.clone());
        let orders = client.register_read::<OrderPage>("purchaseOrderIndex", index_ref()).unwrap();

        let request = FetchRequest::default().with_policy(FetchPolicy::default().enabled_when(false));
        let err = client.fetch(&orders, &request).await.unwrap_err();
        assert!(err.is_not_ready());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_id_sends_nothing() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = client(transport.clone());
        let info = client
            .register_read::<Value>(
                "purchaseOrderInfo",
                EndpointRef::new(EndpointGroup::Info, "purchaseOrder"),
            )
            .unwrap();

        let err = client
            .fetch(&info, &FetchRequest::new(QueryParams::new().with("id", QueryValue::Null)))
            .await
            .unwrap_err();
        assert!(err.is_not_ready());
        assert!(err.to_string().contains(":id"));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_id_is_substituted() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(json!({"status": true, "data": {"id": 7}}));
        let client = client(transport.clone());
        let info = client
            .register_read::<Value>(
                "purchaseOrderInfo",
                EndpointRef::new(EndpointGroup::Info, "purchaseOrder"),
            )
            .unwrap();

        let value = client.fetch(&info, &FetchRequest::default().with_id("7")).await.unwrap();
        assert_eq!(value["data"]["id"], 7);
        assert_eq!(transport.requests()[0].target(), "/purchase-orders/7");
    }

    #[tokio::test]
    async fn test_retries_transport_failures() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_err(TransportError::Network("connection reset".into()));
        transport.push_err(TransportError::Status {
            status: 503,
            payload: None,
        });
        transport.push_ok(page());
        let client = client(transport.clone());
        let orders = client.register_read::<OrderPage>("purchaseOrderIndex", index_ref()).unwrap();

        let result = client.fetch(&orders, &FetchRequest::default()).await;
        assert!(result.is_ok());
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_budget() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..5 {
            transport.push_err(TransportError::Network("down".into()));
        }
        let client = client(transport.clone());
        let orders = client.register_read::<OrderPage>("purchaseOrderIndex", index_ref()).unwrap();

        let err = client.fetch(&orders, &FetchRequest::default()).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_err(TransportError::Status {
            status: 404,
            payload: Some(json!({"message": "not found"})),
        });
        let client = client(transport.clone());
        let orders = client.register_read::<OrderPage>("purchaseOrderIndex", index_ref()).unwrap();

        let err = client.fetch(&orders, &FetchRequest::default()).await.unwrap_err();
        assert_eq!(err.server_message(), Some("not found"));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_response_is_not_cached() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(json!({"status": "ok", "data": [{"id": "x"}]}));
        let client = client(transport.clone());
        let orders = client.register_read::<OrderPage>("purchaseOrderIndex", index_ref()).unwrap();

        let err = client.fetch(&orders, &FetchRequest::default()).await.unwrap_err();
        let violations = err.validation_error().unwrap();
        assert_eq!(violations.paths(), vec!["$.status", "$.data[0].id", "$.data[0].vendor"]);
        assert!(client.peek(&orders, &FetchRequest::default()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refetch_and_focus() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..3 {
            transport.push_ok(page());
        }
        let client = client(transport.clone());
        let orders = client.register_read::<OrderPage>("purchaseOrderIndex", index_ref()).unwrap();
        let request = FetchRequest::default();

        client.fetch(&orders, &request).await.unwrap();
        client.refetch(&orders, &request).await.unwrap();
        assert_eq!(transport.calls(), 2);

        assert_eq!(client.notify_focus(), 1);
        client.fetch(&orders, &request).await.unwrap();
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_focus_ignores_opted_out_reads() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(page());
        let client = client(transport.clone());
        let orders = client.register_read::<OrderPage>("purchaseOrderIndex", index_ref()).unwrap();
        let request = FetchRequest::default()
            .with_policy(FetchPolicy::default().with_refetch_on_focus(false));

        client.fetch(&orders, &request).await.unwrap();
        assert_eq!(client.notify_focus(), 0);
        client.fetch(&orders, &request).await.unwrap();
        assert_eq!(transport.calls(), 1);
    }

    /// Holds the first response until `release` is called.
    struct GatedTransport {
        inner: ScriptedTransport,
        gate: tokio::sync::Notify,
        hold_next: std::sync::atomic::AtomicBool,
    }

    impl GatedTransport {
        fn new() -> Self {
            Self {
                inner: ScriptedTransport::new(),
                gate: tokio::sync::Notify::new(),
                hold_next: std::sync::atomic::AtomicBool::new(true),
            }
        }

        fn release(&self) {
            self.gate.notify_one();
        }
    }

    #[async_trait::async_trait]
    impl Transport for GatedTransport {
        async fn send(&self, request: HttpRequest) -> Result<crate::transport::HttpResponse, TransportError> {
            let response = self.inner.send(request).await;
            if self.hold_next.swap(false, std::sync::atomic::Ordering::SeqCst) {
                self.gate.notified().await;
            }
            response
        }
    }

    #[tokio::test]
    async fn test_fetch_in_flight_during_write_does_not_undo_invalidation() {
        use crate::mutation::{MutationOutcome, MutationRequest};

        let transport = Arc::new(GatedTransport::new());
        transport.inner.push_ok(json!({"v": "before-write"}));
        transport.inner.push_ok(json!({"status": true, "message": "Created", "id": 1}));
        transport.inner.push_ok(json!({"v": "after-write"}));

        let config = ClientConfig::default().with_retry_delay(Duration::ZERO, Duration::ZERO);
        let client = QueryClient::new(catalog(), transport.clone(), config);
        let orders = client.register_read::<Value>("purchaseOrderIndex", index_ref()).unwrap();
        let create = client
            .register_mutation::<Value>(
                EndpointRef::new(EndpointGroup::Create, "purchaseOrder"),
                &[orders.key().clone()],
            )
            .unwrap();
        let request = FetchRequest::default();

        let (in_flight, outcome) = tokio::join!(client.fetch(&orders, &request), async {
            let outcome = client.mutate(&create, &MutationRequest::new(json!({}))).await;
            transport.release();
            outcome
        });

        // the racing caller still gets its own response
        assert_eq!(in_flight.unwrap(), json!({"v": "before-write"}));
        assert!(matches!(outcome.unwrap(), MutationOutcome::Applied(_)));

        let next = client.fetch(&orders, &request).await.unwrap();
        assert_eq!(next, json!({"v": "after-write"}));
        assert_eq!(transport.inner.calls(), 3);
    }

    #[test]
    fn test_registration_rules() {
        let client = client(Arc::new(ScriptedTransport::new()));

        client.register_read::<Value>("purchaseOrderIndex", index_ref()).unwrap();
        let dup = client.register_read::<Value>("purchaseOrderIndex", index_ref()).unwrap_err();
        assert!(dup.to_string().contains("already registered"));

        let unknown = client
            .register_read::<Value>("vendorList", EndpointRef::new(EndpointGroup::List, "vendor"))
            .unwrap_err();
        assert!(matches!(unknown, ClientError::Core(CoreError::UnknownEndpoint { .. })));

        let write = client
            .register_read::<Value>(
                "createdOrders",
                EndpointRef::new(EndpointGroup::Create, "purchaseOrder"),
            )
            .unwrap_err();
        assert!(matches!(write, ClientError::Registration(_)));

        assert!(client.register_read::<Value>(" ", index_ref()).is_err());
    }
}
