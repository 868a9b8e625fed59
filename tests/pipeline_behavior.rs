//! Behavior-driven tests for the request pipeline
//!
//! These tests verify HOW an operation call moves through interceptors,
//! auth, endpoint resolution, retries and deserialization, using a scripted
//! transport in place of the network.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::{stream, StreamExt};
use keel_core::auth::{ApiKeyAuthScheme, BearerAuthScheme, TokenIdentity};
use keel_core::interceptor::{OutputContext, RequestContext};
use keel_core::retry::{Backoff, CircuitBreaker, RetryQuota, RetryToken};
use keel_core::{
    AuthOption, AuthParams, AuthSchemeResolver, Body, BoxError, BoxFuture, Client, ClientConfig,
    ClientTransport, ErrorRetryInfo, Fault, HttpRequest, HttpResponse, Identity, IdentityResolver,
    Interceptor, Plugin, Properties, RetryError, RetryStrategy, ServiceError, ShapeId,
    SimpleRetryStrategy, StandardRetryStrategy, TransportError, Uri,
};
use keel_json::{rest_json, RestJsonClientProtocol};
use support::{
    get_forecast, json_response, GetForecastInput, GetForecastOutput, HookRecorder, NotFound,
    ScriptedTransport, Throttled,
};

type HttpConfig = ClientConfig<HttpRequest, HttpResponse>;

fn base_config() -> HttpConfig {
    ClientConfig::new()
        .with_endpoint_uri(Uri::parse("https://weather.example.com").expect("endpoint"))
        .with_retry_strategy(SimpleRetryStrategy::new(3).with_backoff(no_delay()))
}

fn client(
    transport: &ScriptedTransport,
    config: HttpConfig,
) -> Client<RestJsonClientProtocol, ScriptedTransport> {
    Client::new(rest_json(), transport.clone(), config)
}

fn no_delay() -> Backoff {
    Backoff::Fixed {
        delay: Duration::ZERO,
    }
}

fn forecast_ok() -> HttpResponse {
    json_response(200, r#"{"summary":"sunny"}"#).with_header("x-request-id", "req-1")
}

// =============================================================================
// Successful Calls
// =============================================================================

#[tokio::test]
async fn when_call_succeeds_every_hook_runs_once_in_order() {
    // Given: A client with a recording interceptor and one scripted response
    let transport = ScriptedTransport::new().respond(forecast_ok());
    let recorder = HookRecorder::new();
    let client = client(&transport, base_config().with_interceptor(recorder.clone()));

    // When: The operation is executed
    let output = client
        .execute(GetForecastInput::for_city("Lisbon"), &get_forecast(), &[])
        .await
        .expect("successful call");

    // Then: The output is deserialized and hooks ran in pipeline order
    assert_eq!(output.summary.as_deref(), Some("sunny"));
    assert_eq!(output.request_id.as_deref(), Some("req-1"));
    assert_eq!(
        recorder.hooks(),
        vec![
            "read_before_execution",
            "read_before_serialization",
            "read_after_serialization",
            "read_before_attempt",
            "read_before_signing",
            "read_after_signing",
            "read_before_transmit",
            "read_after_transmit",
            "read_before_deserialization",
            "read_after_deserialization",
            "read_after_attempt",
            "read_after_execution",
        ]
    );
}

#[tokio::test]
async fn when_endpoint_is_configured_the_request_is_sent_there() {
    // Given: A client with a static endpoint
    let transport = ScriptedTransport::new().respond(forecast_ok());
    let client = client(&transport, base_config());

    // When: The operation is executed
    client
        .execute(GetForecastInput::for_city("Lisbon"), &get_forecast(), &[])
        .await
        .expect("successful call");

    // Then: The bound path and query are joined onto the endpoint
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    let destination = &sent[0].request.destination;
    assert_eq!(destination.scheme, "https");
    assert_eq!(destination.host, "weather.example.com");
    assert_eq!(destination.path, "/forecast/Lisbon");
    assert_eq!(destination.query.as_deref(), Some("view=full"));
}

#[tokio::test]
async fn when_operation_uses_bearer_auth_the_request_is_signed() {
    // Given: A bearer scheme and an operation that requires it
    let transport = ScriptedTransport::new().respond(forecast_ok());
    let client = client(
        &transport,
        base_config().with_auth_scheme(BearerAuthScheme::from_token("t0k3n")),
    );
    let bearer = ShapeId::parse("smithy.api#httpBearerAuth").expect("scheme id");
    let operation = get_forecast().with_auth_schemes(vec![bearer]);

    // When: The operation is executed
    client
        .execute(GetForecastInput::for_city("Lisbon"), &operation, &[])
        .await
        .expect("successful call");

    // Then: The transport saw the authorization field
    let sent = transport.sent();
    assert_eq!(
        sent[0].request.fields.first("authorization"),
        Some("Bearer t0k3n")
    );
}

#[tokio::test]
async fn when_no_configured_scheme_matches_the_request_is_sent_unsigned() {
    // Given: An operation requiring bearer auth but a client without it
    let transport = ScriptedTransport::new().respond(forecast_ok());
    let client = client(&transport, base_config());
    let bearer = ShapeId::parse("smithy.api#httpBearerAuth").expect("scheme id");
    let operation = get_forecast().with_auth_schemes(vec![bearer]);

    // When: The operation is executed
    let result = client
        .execute(GetForecastInput::for_city("Lisbon"), &operation, &[])
        .await;

    // Then: The call still goes out without credentials
    assert!(result.is_ok());
    assert!(transport.sent()[0].request.fields.first("authorization").is_none());
}

/// Hands out a token and counts how often it was asked to.
struct CountingResolver {
    token: &'static str,
    calls: Arc<AtomicUsize>,
}

impl CountingResolver {
    fn new(token: &'static str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = Self {
            token,
            calls: Arc::clone(&calls),
        };
        (resolver, calls)
    }
}

impl IdentityResolver for CountingResolver {
    fn get_identity<'a>(
        &'a self,
        _properties: &'a Properties,
    ) -> BoxFuture<'a, Result<Arc<dyn Identity>, ServiceError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let identity: Arc<dyn Identity> = Arc::new(TokenIdentity::new(self.token));
        Box::pin(async move { Ok(identity) })
    }
}

/// Offers auth options in a fixed order regardless of the operation.
struct FixedOrder(Vec<ShapeId>);

impl AuthSchemeResolver for FixedOrder {
    fn resolve_auth_scheme(&self, _params: &AuthParams<'_>) -> Vec<AuthOption> {
        self.0.iter().cloned().map(AuthOption::new).collect()
    }
}

#[tokio::test]
async fn when_several_options_are_offered_only_the_first_configured_one_resolves_an_identity() {
    // Given: Options for an unconfigured scheme, then bearer, then an API key
    let transport = ScriptedTransport::new().respond(forecast_ok());
    let (bearer_resolver, bearer_calls) = CountingResolver::new("b-1");
    let (api_key_resolver, api_key_calls) = CountingResolver::new("k-1");
    let config = base_config()
        .with_auth_scheme_resolver(FixedOrder(vec![
            ShapeId::new(support::NAMESPACE, "stationKey"),
            ShapeId::parse("smithy.api#httpBearerAuth").expect("scheme id"),
            ShapeId::parse("smithy.api#httpApiKeyAuth").expect("scheme id"),
        ]))
        .with_auth_scheme(BearerAuthScheme::new(Arc::new(bearer_resolver)))
        .with_auth_scheme(ApiKeyAuthScheme::header(
            Arc::new(api_key_resolver),
            "x-api-key",
            None,
        ));
    let client = client(&transport, config);

    // When: The operation is executed
    client
        .execute(GetForecastInput::for_city("Lisbon"), &get_forecast(), &[])
        .await
        .expect("successful call");

    // Then: Bearer was selected and the later option was never resolved
    let sent = transport.sent();
    assert_eq!(sent[0].request.fields.first("authorization"), Some("Bearer b-1"));
    assert!(sent[0].request.fields.first("x-api-key").is_none());
    assert_eq!(bearer_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api_key_calls.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Retries
// =============================================================================

#[tokio::test]
async fn when_service_throttles_then_recovers_the_call_is_retried() {
    // Given: A throttling error, an unavailable response, then success
    let transport = ScriptedTransport::new()
        .respond(
            json_response(429, r#"{"message":"slow down"}"#)
                .with_header("x-error-type", "Throttled"),
        )
        .respond(HttpResponse::new(503))
        .respond(forecast_ok());
    let client = client(&transport, base_config());

    // When: The operation is executed
    let output = client
        .execute(GetForecastInput::for_city("Lisbon"), &get_forecast(), &[])
        .await
        .expect("third attempt succeeds");

    // Then: Every attempt resent the same request
    assert_eq!(output.summary.as_deref(), Some("sunny"));
    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|attempt| attempt.body == sent[0].body));
}

#[tokio::test]
async fn when_transport_fails_once_the_call_is_retried() {
    // Given: A connection failure followed by success
    let transport = ScriptedTransport::new()
        .fail(TransportError::new("connection reset"))
        .respond(forecast_ok());
    let client = client(&transport, base_config());

    // When: The operation is executed
    let result = client
        .execute(GetForecastInput::for_city("Lisbon"), &get_forecast(), &[])
        .await;

    // Then: The second attempt succeeds
    assert!(result.is_ok());
    assert_eq!(transport.sent().len(), 2);
}

#[tokio::test]
async fn when_every_attempt_fails_the_last_error_is_the_retry_cause() {
    // Given: More server failures than the strategy allows attempts
    let transport = ScriptedTransport::new()
        .respond(HttpResponse::new(500))
        .respond(HttpResponse::new(500))
        .respond(HttpResponse::new(500))
        .respond(forecast_ok());
    let client = client(&transport, base_config());

    // When: The operation is executed
    let error = client
        .execute(GetForecastInput::for_city("Lisbon"), &get_forecast(), &[])
        .await
        .expect_err("attempts exhausted");

    // Then: The retry error carries the last attempt's failure
    assert_eq!(transport.sent().len(), 3);
    let ServiceError::Retry(retry) = &error else {
        panic!("expected a retry error, got {error:?}");
    };
    let cause = retry.cause().expect("last attempt error");
    assert_eq!(cause.code(), "Http500");
    assert_eq!(error.fault(), Some(Fault::Server));
}

#[tokio::test]
async fn when_service_returns_a_client_error_it_is_not_retried() {
    // Given: A modeled client error
    let transport = ScriptedTransport::new()
        .respond(
            json_response(404, r#"{"message":"no such city"}"#)
                .with_header("x-error-type", "NotFound"),
        )
        .respond(forecast_ok());
    let client = client(&transport, base_config());

    // When: The operation is executed
    let error = client
        .execute(GetForecastInput::for_city("Atlantis"), &get_forecast(), &[])
        .await
        .expect_err("client error");

    // Then: One attempt was made and the modeled error is reachable
    assert_eq!(transport.sent().len(), 1);
    let not_found = error.as_modeled::<NotFound>().expect("NotFound");
    assert_eq!(not_found.message, "no such city");
    assert!(error.as_modeled::<Throttled>().is_none());
}

// =============================================================================
// Interceptors and Plugins
// =============================================================================

struct TraceHeader;

impl Interceptor<HttpRequest, HttpResponse> for TraceHeader {
    fn modify_before_transmit(
        &self,
        context: &RequestContext<HttpRequest>,
    ) -> Result<HttpRequest, BoxError> {
        let mut request = context.request.clone();
        request.fields.set("x-trace-id", "trace-42");
        Ok(request)
    }
}

struct ServeStale;

impl Interceptor<HttpRequest, HttpResponse> for ServeStale {
    fn modify_before_completion(
        &self,
        context: &OutputContext<HttpRequest, HttpResponse>,
    ) -> keel_core::interceptor::Outcome {
        if context.error().is_none() {
            return context.output.clone();
        }
        Ok(Arc::new(GetForecastOutput {
            summary: Some(String::from("stale")),
            ..GetForecastOutput::default()
        }))
    }
}

struct Deny;

impl Interceptor<HttpRequest, HttpResponse> for Deny {
    fn read_before_execution(
        &self,
        _: &keel_core::interceptor::InputContext,
    ) -> Result<(), BoxError> {
        Err("calls are disabled".into())
    }
}

#[tokio::test]
async fn when_interceptor_modifies_the_request_the_transport_sees_the_change() {
    // Given: An interceptor adding a field before transmit
    let transport = ScriptedTransport::new().respond(forecast_ok());
    let client = client(&transport, base_config().with_interceptor(TraceHeader));

    // When: The operation is executed
    client
        .execute(GetForecastInput::for_city("Lisbon"), &get_forecast(), &[])
        .await
        .expect("successful call");

    // Then: The field was sent
    assert_eq!(transport.sent()[0].request.fields.first("x-trace-id"), Some("trace-42"));
}

#[tokio::test]
async fn when_interceptor_replaces_a_failure_the_call_succeeds() {
    // Given: A failing service and an interceptor serving a fallback
    let transport = ScriptedTransport::new()
        .respond(
            json_response(404, r#"{"message":"no such city"}"#)
                .with_header("x-error-type", "NotFound"),
        );
    let client = client(&transport, base_config().with_interceptor(ServeStale));

    // When: The operation is executed
    let output = client
        .execute(GetForecastInput::for_city("Lisbon"), &get_forecast(), &[])
        .await
        .expect("fallback output");

    // Then: The replacement is the result
    assert_eq!(output.summary.as_deref(), Some("stale"));
}

#[tokio::test]
async fn when_interceptor_fails_before_execution_nothing_is_sent_and_completion_hooks_run() {
    // Given: A recorder and an interceptor rejecting every call
    let transport = ScriptedTransport::new().respond(forecast_ok());
    let recorder = HookRecorder::new();
    let config = base_config()
        .with_interceptor(recorder.clone())
        .with_interceptor(Deny);
    let client = client(&transport, config);

    // When: The operation is executed
    let error = client
        .execute(GetForecastInput::for_city("Lisbon"), &get_forecast(), &[])
        .await
        .expect_err("rejected call");

    // Then: The hook error is returned and the request never left
    assert_eq!(error.to_string(), "calls are disabled");
    assert!(transport.sent().is_empty());
    assert_eq!(recorder.hooks(), vec!["read_before_execution", "read_after_execution"]);
}

#[tokio::test]
async fn when_plugin_changes_a_call_the_next_call_uses_the_client_config() {
    // Given: A plugin pointing a single call at another region
    let transport = ScriptedTransport::new()
        .respond(forecast_ok())
        .respond(forecast_ok());
    let client = client(&transport, base_config());
    let europe: Plugin<HttpRequest, HttpResponse> = Arc::new(|config: &mut HttpConfig| {
        config.endpoint_uri = Uri::parse("https://eu.weather.example.com").ok();
    });

    // When: One call uses the plugin and the next does not
    client
        .execute(GetForecastInput::for_city("Lisbon"), &get_forecast(), &[europe])
        .await
        .expect("first call");
    client
        .execute(GetForecastInput::for_city("Lisbon"), &get_forecast(), &[])
        .await
        .expect("second call");

    // Then: The override stayed with its call
    let sent = transport.sent();
    assert_eq!(sent[0].request.destination.host, "eu.weather.example.com");
    assert_eq!(sent[1].request.destination.host, "weather.example.com");
}

// =============================================================================
// Retry Accounting
// =============================================================================

/// Delegates to the simple strategy and records how it was driven.
#[derive(Debug, Clone)]
struct CountingStrategy {
    inner: SimpleRetryStrategy,
    refreshed: Arc<Mutex<Vec<u32>>>,
    successes: Arc<AtomicUsize>,
}

impl CountingStrategy {
    fn new(max_attempts: u32) -> Self {
        Self {
            inner: SimpleRetryStrategy::new(max_attempts).with_backoff(no_delay()),
            refreshed: Arc::default(),
            successes: Arc::default(),
        }
    }

    fn refreshed(&self) -> Vec<u32> {
        self.refreshed.lock().expect("strategy lock").clone()
    }
}

impl RetryStrategy for CountingStrategy {
    fn max_attempts(&self) -> u32 {
        self.inner.max_attempts()
    }

    fn acquire_initial_retry_token(
        &self,
        token_scope: Option<&str>,
    ) -> Result<RetryToken, RetryError> {
        self.inner.acquire_initial_retry_token(token_scope)
    }

    fn refresh_retry_token_for_retry(
        &self,
        token: &RetryToken,
        error_info: &dyn ErrorRetryInfo,
    ) -> Result<RetryToken, RetryError> {
        let next = self.inner.refresh_retry_token_for_retry(token, error_info)?;
        self.refreshed
            .lock()
            .expect("strategy lock")
            .push(next.retry_count());
        Ok(next)
    }

    fn record_success(&self, token: &RetryToken) {
        self.successes.fetch_add(1, Ordering::SeqCst);
        self.inner.record_success(token);
    }
}

#[tokio::test]
async fn when_transient_then_throttled_then_ok_the_strategy_is_driven_once_per_attempt() {
    // Given: A connection failure, a throttling error, then success
    let transport = ScriptedTransport::new()
        .fail(TransportError::new("connection reset"))
        .respond(
            json_response(429, r#"{"message":"slow down"}"#)
                .with_header("x-error-type", "Throttled"),
        )
        .respond(forecast_ok());
    let strategy = CountingStrategy::new(5);
    let client = client(
        &transport,
        base_config().with_retry_strategy(strategy.clone()),
    );

    // When: The operation is executed
    client
        .execute(GetForecastInput::for_city("Lisbon"), &get_forecast(), &[])
        .await
        .expect("third attempt succeeds");

    // Then: Three attempts, two refreshes counting up by one, one success
    assert_eq!(transport.sent().len(), 3);
    assert_eq!(strategy.refreshed(), vec![1, 2]);
    assert_eq!(strategy.successes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn when_client_errors_repeat_the_circuit_stays_closed_for_healthy_calls() {
    // Given: A breaker-guarded strategy and five calls that all get a 404
    let mut transport = ScriptedTransport::new();
    for _ in 0..5 {
        transport = transport.respond(
            json_response(404, r#"{"message":"no such city"}"#)
                .with_header("x-error-type", "NotFound"),
        );
    }
    let transport = transport.respond(forecast_ok());
    let strategy = StandardRetryStrategy::new(3)
        .with_backoff(no_delay())
        .with_circuit_breaker(Arc::new(CircuitBreaker::default()));
    let client = client(&transport, base_config().with_retry_strategy(strategy));

    // When: The client errors come back and a healthy call follows
    for _ in 0..5 {
        client
            .execute(GetForecastInput::for_city("Atlantis"), &get_forecast(), &[])
            .await
            .expect_err("client error");
    }
    let healthy = client
        .execute(GetForecastInput::for_city("Lisbon"), &get_forecast(), &[])
        .await;

    // Then: Client faults did not count against the service
    assert!(healthy.is_ok());
    assert_eq!(transport.sent().len(), 6);
}

/// Installs a one-shot streaming body before the retry loop starts.
struct StreamingUpload;

impl Interceptor<HttpRequest, HttpResponse> for StreamingUpload {
    fn modify_before_retry_loop(
        &self,
        context: &RequestContext<HttpRequest>,
    ) -> Result<HttpRequest, BoxError> {
        let mut request = context.request.clone();
        let chunks: Vec<Result<Bytes, BoxError>> = vec![Ok(Bytes::from_static(b"upload"))];
        request.body = Body::from_stream(stream::iter(chunks));
        Ok(request)
    }
}

/// Drains the request body without buffering it and answers 503.
#[derive(Clone, Default)]
struct DrainingTransport {
    sends: Arc<AtomicUsize>,
}

impl ClientTransport<HttpRequest, HttpResponse> for DrainingTransport {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            self.sends.fetch_add(1, Ordering::SeqCst);
            let mut body = request.body.take_stream().map_err(|error| {
                TransportError::new("request body failed").with_source(error)
            })?;
            while body.next().await.is_some() {}
            Ok(HttpResponse::new(503))
        })
    }
}

#[tokio::test]
async fn when_streamed_body_was_consumed_the_call_stops_without_spending_quota() {
    // Given: A streamed upload, a transport that consumes it, and a retry quota
    let transport = DrainingTransport::default();
    let quota = Arc::new(RetryQuota::new(20));
    let strategy = StandardRetryStrategy::new(3)
        .with_backoff(no_delay())
        .with_quota(Arc::clone(&quota));
    let config = base_config()
        .with_retry_strategy(strategy)
        .with_interceptor(StreamingUpload);
    let client = Client::new(rest_json(), transport.clone(), config);

    // When: The service answers with a retryable failure
    let error = client
        .execute(GetForecastInput::for_city("Lisbon"), &get_forecast(), &[])
        .await
        .expect_err("body cannot be replayed");

    // Then: One attempt, a retry error carrying the failure, and an untouched quota
    assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    let ServiceError::Retry(retry) = &error else {
        panic!("expected a retry error, got {error:?}");
    };
    assert!(retry.message().starts_with("cannot replay request body"));
    assert_eq!(retry.cause().map(ServiceError::code), Some("Http503"));
    assert_eq!(quota.available(), 20);
}
