//! Typed write operations.
//!
//! Every write answers with an envelope:
//!
//! ```json
//! { "status": true, "message": "Purchase order created", "id": 42 }
//! ```
//!
//! `status: false` is a logical failure: the HTTP call succeeded but the
//! server refused the write. Only an accepted write invalidates the reads the
//! mutation was registered with.

use std::fmt;
use std::marker::PhantomData;

use opsdesk_core::{EndpointRef, OperationDescriptor, QueryParams, Shape, Validated, parse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{QueryClient, ReadKey};
use crate::error::ClientError;
use crate::transport::HttpRequest;

/// Fields every mutation response carries.
pub fn envelope_shape() -> Shape {
    Shape::object([
        ("status", Shape::Boolean),
        ("message", Shape::String.nullable().optional()),
        (
            "id",
            Shape::one_of([Shape::Integer, Shape::String]).nullable().optional(),
        ),
    ])
}

/// Handle to a registered write whose accepted response carries `R`.
pub struct MutationToken<R> {
    descriptor: OperationDescriptor,
    shape: Shape,
    invalidates: Vec<ReadKey>,
    _marker: PhantomData<fn() -> R>,
}

impl<R> Clone for MutationToken<R> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            shape: self.shape.clone(),
            invalidates: self.invalidates.clone(),
            _marker: PhantomData,
        }
    }
}

impl<R> fmt::Debug for MutationToken<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationToken")
            .field("endpoint", &self.descriptor.reference().to_string())
            .field("invalidates", &self.invalidates)
            .finish()
    }
}

impl<R> MutationToken<R> {
    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    pub fn invalidates(&self) -> &[ReadKey] {
        &self.invalidates
    }
}

/// Body and addressing of one write.
#[derive(Debug, Clone, Default)]
pub struct MutationRequest {
    pub body: Value,
    /// Value for an `:id` placeholder.
    pub id: Option<String>,
    /// Placeholder values and extra query parameters.
    pub params: QueryParams,
}

impl MutationRequest {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }

    pub fn from_body<B: Serialize>(body: &B) -> Result<Self, ClientError> {
        let body = serde_json::to_value(body).map_err(opsdesk_core::CoreError::from)?;
        Ok(Self::new(body))
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }
}

/// An accepted write.
#[derive(Debug, Clone, Deserialize)]
pub struct MutationReply<R> {
    pub status: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub data: R,
}

/// A write the server refused with `status: false`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub message: Option<String>,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub enum MutationOutcome<R> {
    Applied(MutationReply<R>),
    Rejected(Rejection),
}

impl<R> MutationOutcome<R> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// Server message of either outcome.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Applied(reply) => reply.message.as_deref(),
            Self::Rejected(rejection) => rejection.message.as_deref(),
        }
    }
}

/// What the error callback of [`QueryClient::mutate_with`] receives.
#[derive(Debug)]
pub enum MutationFailure<'a> {
    Rejected(&'a Rejection),
    Failed(&'a ClientError),
}

impl MutationFailure<'_> {
    /// Message suitable for a user-facing notification.
    pub fn message(&self) -> String {
        match self {
            Self::Rejected(rejection) => rejection
                .message
                .clone()
                .unwrap_or_else(|| "The request was rejected".to_string()),
            Self::Failed(err) => err
                .server_message()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string()),
        }
    }
}

impl QueryClient {
    /// Register a write that invalidates `invalidates` when accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The endpoint is not in the catalog
    /// - The endpoint is a GET operation
    /// - A read key was registered on a different client
    pub fn register_mutation<R: Validated>(
        &self,
        endpoint: EndpointRef,
        invalidates: &[ReadKey],
    ) -> Result<MutationToken<R>, ClientError> {
        let descriptor = self.catalog().resolve(&endpoint)?.clone();
        if !descriptor.method().is_write() {
            return Err(ClientError::registration(format!(
                "{endpoint} is a GET operation and cannot back a mutation"
            )));
        }
        if let Some(unknown) = invalidates.iter().find(|key| !self.is_registered(key)) {
            return Err(ClientError::registration(format!(
                "{endpoint} invalidates unknown read '{unknown}'"
            )));
        }

        tracing::debug!(
            endpoint = %endpoint,
            invalidates = invalidates.len(),
            "Registered mutation"
        );
        Ok(MutationToken {
            descriptor,
            shape: envelope_shape().merge(R::shape()),
            invalidates: invalidates.to_vec(),
            _marker: PhantomData,
        })
    }

    /// Send a write once.
    ///
    /// Transport and validation failures are errors and leave the cache
    /// untouched. A `status: false` reply is `Ok(MutationOutcome::Rejected)`.
    pub async fn mutate<R: Validated>(
        &self,
        token: &MutationToken<R>,
        request: &MutationRequest,
    ) -> Result<MutationOutcome<R>, ClientError> {
        let reference = token.descriptor.reference().to_string();
        let operation = reference.as_str();

        let mut params = request.params.clone();
        let path = token
            .descriptor
            .render(request.id.as_deref(), &mut params)
            .map_err(|e| ClientError::not_ready(operation, e.to_string()))?;

        let http = HttpRequest::write(
            token.descriptor.method(),
            path,
            params.encode(),
            request.body.clone(),
        );
        let body = self
            .send_once(operation, http)
            .await
            .map_err(|e| ClientError::transport(operation, e))?;

        envelope_shape()
            .validate(&body)
            .map_err(|e| ClientError::validation(operation, e))?;

        if body.get("status").and_then(Value::as_bool) != Some(true) {
            let message = body.get("message").and_then(Value::as_str).map(str::to_string);
            tracing::warn!(operation, message = ?message, "Write rejected by server");
            return Ok(MutationOutcome::Rejected(Rejection {
                message,
                payload: body,
            }));
        }

        let reply: MutationReply<R> =
            parse(&token.shape, body).map_err(|e| ClientError::validation(operation, e))?;

        for key in &token.invalidates {
            self.invalidate(key);
        }
        tracing::debug!(operation, invalidated = token.invalidates.len(), "Write applied");
        Ok(MutationOutcome::Applied(reply))
    }

    /// [`mutate`](Self::mutate) with callbacks.
    ///
    /// `on_success` runs only for an accepted write, after invalidation.
    /// `on_error` runs for rejections and for every error.
    pub async fn mutate_with<R, S, E>(
        &self,
        token: &MutationToken<R>,
        request: &MutationRequest,
        on_success: S,
        on_error: E,
    ) -> Result<MutationOutcome<R>, ClientError>
    where
        R: Validated,
        S: FnOnce(&MutationReply<R>),
        E: FnOnce(MutationFailure<'_>),
    {
        let result = self.mutate(token, request).await;
        match &result {
            Ok(MutationOutcome::Applied(reply)) => on_success(reply),
            Ok(MutationOutcome::Rejected(rejection)) => on_error(MutationFailure::Rejected(rejection)),
            Err(err) => on_error(MutationFailure::Failed(err)),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FetchRequest;
    use crate::config::ClientConfig;
    use crate::error::TransportError;
    use crate::transport::testing::ScriptedTransport;
    use opsdesk_core::{EndpointCatalog, EndpointGroup, HttpMethod};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Created {
        #[serde(rename = "orderNo")]
        order_no: String,
    }

    impl Validated for Created {
        fn shape() -> Shape {
            Shape::object([("orderNo", Shape::String)])
        }
    }

    struct Fixture {
        transport: Arc<ScriptedTransport>,
        client: QueryClient,
    }

    fn fixture() -> Fixture {
        let catalog = EndpointCatalog::new()
            .with(EndpointGroup::Index, "purchaseOrder", "/purchase-orders")
            .with(EndpointGroup::List, "quotation", "/quotations")
            .with(EndpointGroup::List, "vendor", "/vendors")
            .with(EndpointGroup::Create, "purchaseOrder", "/purchase-orders")
            .with(EndpointGroup::Update, "purchaseOrder", "/purchase-orders/:id");
        let transport = Arc::new(ScriptedTransport::new());
        let config = ClientConfig::default().with_retry_delay(Duration::ZERO, Duration::ZERO);
        let client = QueryClient::new(Arc::new(catalog), transport.clone(), config);
        Fixture { transport, client }
    }

    #[tokio::test]
    async fn test_applied_write_invalidates_declared_reads_only() {
        let Fixture { transport, client } = fixture();
        let orders = client
            .register_read::<Value>("purchaseOrderIndex", EndpointRef::new(EndpointGroup::Index, "purchaseOrder"))
            .unwrap();
        let quotations = client
            .register_read::<Value>("quotationList", EndpointRef::new(EndpointGroup::List, "quotation"))
            .unwrap();
        let vendors = client
            .register_read::<Value>("vendorList", EndpointRef::new(EndpointGroup::List, "vendor"))
            .unwrap();
        let create = client
            .register_mutation::<Created>(
                EndpointRef::new(EndpointGroup::Create, "purchaseOrder"),
                &[orders.key().clone(), quotations.key().clone()],
            )
            .unwrap();

        let request = FetchRequest::default();
        transport.push_ok(json!({"status": true, "data": []}));
        transport.push_ok(json!({"status": true, "data": []}));
        transport.push_ok(json!({"status": true, "data": []}));
        client.fetch(&orders, &request).await.unwrap();
        client.fetch(&quotations, &request).await.unwrap();
        client.fetch(&vendors, &request).await.unwrap();

        transport.push_ok(json!({"status": true, "message": "Created", "id": 42, "orderNo": "PO-42"}));
        let mut succeeded = None;
        let mut failed = None;
        let outcome = client
            .mutate_with(
                &create,
                &MutationRequest::new(json!({"vendorId": 3})),
                |reply| succeeded = Some(reply.data.order_no.clone()),
                |failure| failed = Some(failure.message()),
            )
            .await
            .unwrap();

        assert!(outcome.is_applied());
        assert_eq!(outcome.message(), Some("Created"));
        assert_eq!(succeeded.as_deref(), Some("PO-42"));
        assert!(failed.is_none());

        let sent = transport.requests().last().cloned().unwrap();
        assert_eq!(sent.method, HttpMethod::Post);
        assert_eq!(sent.body, Some(json!({"vendorId": 3})));

        transport.push_ok(json!({"status": true, "data": [1]}));
        transport.push_ok(json!({"status": true, "data": [2]}));
        let calls = transport.calls();
        client.fetch(&orders, &request).await.unwrap();
        client.fetch(&quotations, &request).await.unwrap();
        client.fetch(&vendors, &request).await.unwrap();
        assert_eq!(transport.calls(), calls + 2);
    }

    #[tokio::test]
    async fn test_rejected_write_routes_message_and_keeps_cache() {
        let Fixture { transport, client } = fixture();
        let orders = client
            .register_read::<Value>("purchaseOrderIndex", EndpointRef::new(EndpointGroup::Index, "purchaseOrder"))
            .unwrap();
        let create = client
            .register_mutation::<Value>(
                EndpointRef::new(EndpointGroup::Create, "purchaseOrder"),
                &[orders.key().clone()],
            )
            .unwrap();

        transport.push_ok(json!({"status": true, "data": []}));
        client.fetch(&orders, &FetchRequest::default()).await.unwrap();

        transport.push_ok(json!({"status": false, "message": "duplicate"}));
        let mut success_called = false;
        let mut error_message = None;
        let outcome = client
            .mutate_with(
                &create,
                &MutationRequest::new(json!({})),
                |_| success_called = true,
                |failure| error_message = Some(failure.message()),
            )
            .await
            .unwrap();

        assert!(!outcome.is_applied());
        assert!(!success_called);
        assert_eq!(error_message.as_deref(), Some("duplicate"));
        assert_eq!(client.cache_stats().invalidations, 0);

        let calls = transport.calls();
        client.fetch(&orders, &FetchRequest::default()).await.unwrap();
        assert_eq!(transport.calls(), calls);
    }

    #[tokio::test]
    async fn test_http_failure_attaches_payload_and_is_not_retried() {
        let Fixture { transport, client } = fixture();
        let orders = client
            .register_read::<Value>("purchaseOrderIndex", EndpointRef::new(EndpointGroup::Index, "purchaseOrder"))
            .unwrap();
        let update = client
            .register_mutation::<Value>(
                EndpointRef::new(EndpointGroup::Update, "purchaseOrder"),
                &[orders.key().clone()],
            )
            .unwrap();

        transport.push_err(TransportError::Status {
            status: 500,
            payload: Some(json!({"status": false, "message": "Database unavailable"})),
        });
        let mut error_message = None;
        let err = client
            .mutate_with(
                &update,
                &MutationRequest::new(json!({"qty": 2})).with_id("9"),
                |_| panic!("success callback must not run"),
                |failure| error_message = Some(failure.message()),
            )
            .await
            .unwrap_err();

        assert!(err.is_transport());
        assert_eq!(err.transport_error().and_then(TransportError::status), Some(500));
        assert_eq!(error_message.as_deref(), Some("Database unavailable"));
        assert_eq!(transport.calls(), 1);
        assert_eq!(transport.requests()[0].path, "/purchase-orders/9");
        assert_eq!(transport.requests()[0].method, HttpMethod::Put);
        assert_eq!(client.cache_stats().invalidations, 0);
    }

    #[tokio::test]
    async fn test_missing_status_is_a_validation_error() {
        let Fixture { transport, client } = fixture();
        let create = client
            .register_mutation::<Value>(EndpointRef::new(EndpointGroup::Create, "purchaseOrder"), &[])
            .unwrap();

        transport.push_ok(json!({"message": "ok"}));
        let err = client
            .mutate(&create, &MutationRequest::new(json!({})))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.validation_error().unwrap().paths(), vec!["$.status"]);
    }

    #[tokio::test]
    async fn test_update_without_id_sends_nothing() {
        let Fixture { transport, client } = fixture();
        let update = client
            .register_mutation::<Value>(EndpointRef::new(EndpointGroup::Update, "purchaseOrder"), &[])
            .unwrap();

        let err = client
            .mutate(&update, &MutationRequest::new(json!({})))
            .await
            .unwrap_err();
        assert!(err.is_not_ready());
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_registration_checks() {
        let Fixture { client, .. } = fixture();
        let err = client
            .register_mutation::<Value>(EndpointRef::new(EndpointGroup::Index, "purchaseOrder"), &[])
            .unwrap_err();
        assert!(matches!(err, ClientError::Registration(_)));

        let other = fixture().client;
        let foreign = other
            .register_read::<Value>("quotationList", EndpointRef::new(EndpointGroup::List, "quotation"))
            .unwrap();
        let err = client
            .register_mutation::<Value>(
                EndpointRef::new(EndpointGroup::Create, "purchaseOrder"),
                &[foreign.key().clone()],
            )
            .unwrap_err();
        assert!(err.to_string().contains("unknown read 'quotationList'"));
    }

    #[test]
    fn test_from_body() {
        #[derive(Serialize)]
        struct NewVendor<'a> {
            name: &'a str,
        }
        let request = MutationRequest::from_body(&NewVendor { name: "Acme" }).unwrap();
        assert_eq!(request.body, json!({"name": "Acme"}));
    }
}
