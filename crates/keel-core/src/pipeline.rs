//! Request execution pipeline.
//!
//! One execution serializes the input once, then runs attempts until the
//! retry strategy stops it. Every step is bracketed by interceptor hooks;
//! hook failures become the result of the attempt or execution and the
//! completion hooks still run.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::auth::{select_auth_option, AuthOption, AuthParams, AuthScheme};
use crate::config::ClientConfig;
use crate::deserializers::DeserializeableShape;
use crate::endpoint::EndpointResolverParams;
use crate::error::{RetryError, ServiceError};
use crate::event_stream::{
    DuplexEventStream, EventDeserializer, EventPublisher, EventReceiver, EventSignerSlot,
    InputEventStream, OutputEventStream, EVENT_SIGNER,
};
use crate::http::Body;
use crate::interceptor::{
    InputContext, Interceptor, Outcome, OutputContext, RequestContext, ResponseContext, ShapeValue,
};
use crate::properties::Properties;
use crate::protocol::{ApiOperation, ClientProtocol, TransportRequest, TransportResponse};
use crate::retry::classify_http_error;
use crate::schema::Schema;
use crate::serializers::SerializeableStruct;
use crate::transport::ClientTransport;

type AuthSelection<Req> = (AuthOption, Arc<dyn AuthScheme<Req>>);

/// Everything one operation invocation needs.
pub struct ClientCall<I, O, Req, Resp> {
    pub input: I,
    pub operation: ApiOperation<I, O>,
    /// Per-call copy; plugins have already been applied.
    pub config: ClientConfig<Req, Resp>,
    pub properties: Properties,
    /// Scope passed to the retry strategy when acquiring a token.
    pub retry_scope: Option<String>,
    event_body: Option<Body>,
}

impl<I, O, Req, Resp> ClientCall<I, O, Req, Resp> {
    pub fn new(input: I, operation: ApiOperation<I, O>, config: ClientConfig<Req, Resp>) -> Self {
        Self {
            input,
            operation,
            config,
            properties: Properties::new(),
            retry_scope: None,
            event_body: None,
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_retry_scope(mut self, scope: impl Into<String>) -> Self {
        self.retry_scope = Some(scope.into());
        self
    }
}

/// Orchestrates a protocol and a transport around the interceptor lifecycle.
pub struct RequestPipeline<P, T> {
    protocol: Arc<P>,
    transport: Arc<T>,
}

impl<P, T> Clone for RequestPipeline<P, T> {
    fn clone(&self) -> Self {
        Self {
            protocol: Arc::clone(&self.protocol),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<P, T> RequestPipeline<P, T>
where
    P: ClientProtocol,
    T: ClientTransport<P::Request, P::Response>,
{
    pub fn new(protocol: P, transport: T) -> Self {
        Self {
            protocol: Arc::new(protocol),
            transport: Arc::new(transport),
        }
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs the call to completion.
    ///
    /// # Errors
    ///
    /// Returns the final error of the execution: the last attempt's error
    /// wrapped in [`ServiceError::Retry`] when retries stopped, or whatever
    /// error an earlier step or interceptor produced.
    pub async fn call<I, O>(
        &self,
        call: ClientCall<I, O, P::Request, P::Response>,
    ) -> Result<O, ServiceError>
    where
        I: SerializeableStruct + Send + Sync + 'static,
        O: DeserializeableShape + Clone + Send + Sync + 'static,
    {
        self.call_with_response(call).await.map(|(output, _)| output)
    }

    /// Like [`call`](Self::call), also returning the final transport response.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call).
    pub async fn call_with_response<I, O>(
        &self,
        call: ClientCall<I, O, P::Request, P::Response>,
    ) -> Result<(O, Option<P::Response>), ServiceError>
    where
        I: SerializeableStruct + Send + Sync + 'static,
        O: DeserializeableShape + Clone + Send + Sync + 'static,
    {
        let context = self.execute(call).await;
        let output = unwrap_output::<O>(context.output)?;
        Ok((output, context.response))
    }

    /// Starts an operation whose input is an event stream.
    ///
    /// The returned publisher accepts events immediately; the execution runs
    /// on a spawned task and its output is available through
    /// [`InputEventStream::await_output`].
    pub fn input_stream<I, E, O>(
        &self,
        call: ClientCall<I, O, P::Request, P::Response>,
    ) -> InputEventStream<E, O>
    where
        I: SerializeableStruct + Send + Sync + 'static,
        E: SerializeableStruct,
        O: DeserializeableShape + Clone + Send + Sync + 'static,
    {
        let (publisher, call) = self.attach_publisher(call);
        let pipeline = self.clone();
        let output = tokio::spawn(async move { pipeline.call(call).await });
        InputEventStream::new(publisher, output)
    }

    /// Runs an operation whose output is an event stream.
    ///
    /// # Errors
    ///
    /// Fails like [`call`](Self::call), or when the operation declares no
    /// output event stream.
    pub async fn output_stream<I, E, O>(
        &self,
        call: ClientCall<I, O, P::Request, P::Response>,
    ) -> Result<OutputEventStream<E, O>, ServiceError>
    where
        I: SerializeableStruct + Send + Sync + 'static,
        E: DeserializeableShape,
        O: DeserializeableShape + Clone + Send + Sync + 'static,
    {
        let (schema, errors) = output_events(&call.operation)?;
        let (output, response) = self.call_with_response(call).await?;
        let output_stream = self.receiver(schema, errors, response)?;
        Ok(OutputEventStream {
            output,
            output_stream,
        })
    }

    /// Starts an operation streaming in both directions.
    pub fn duplex_stream<I, IE, OE, O>(
        &self,
        call: ClientCall<I, O, P::Request, P::Response>,
    ) -> DuplexEventStream<IE, OE, O>
    where
        I: SerializeableStruct + Send + Sync + 'static,
        IE: SerializeableStruct,
        OE: DeserializeableShape + 'static,
        O: DeserializeableShape + Clone + Send + Sync + 'static,
    {
        let events = output_events(&call.operation);
        let (publisher, call) = self.attach_publisher(call);
        let pipeline = self.clone();
        let output = tokio::spawn(async move {
            let (schema, errors) = events?;
            let (output, response) = pipeline.call_with_response(call).await?;
            let receiver = pipeline.receiver(schema, errors, response)?;
            Ok::<_, ServiceError>((output, receiver))
        });
        DuplexEventStream::new(publisher, output)
    }

    fn attach_publisher<I, E, O>(
        &self,
        mut call: ClientCall<I, O, P::Request, P::Response>,
    ) -> (EventPublisher<E>, ClientCall<I, O, P::Request, P::Response>)
    where
        E: SerializeableStruct,
    {
        let slot = EventSignerSlot::default();
        let (publisher, body) =
            EventPublisher::channel(self.protocol.payload_codec(), slot.clone());
        call.properties.insert(&EVENT_SIGNER, slot);
        call.event_body = Some(body);
        (publisher, call)
    }

    fn receiver<E: DeserializeableShape>(
        &self,
        schema: Schema,
        errors: crate::protocol::TypeRegistry,
        response: Option<P::Response>,
    ) -> Result<EventReceiver<E>, ServiceError> {
        let response = response
            .ok_or_else(|| ServiceError::event_stream("no response to read events from"))?;
        let body = response
            .body()
            .take_stream()
            .map_err(|error| ServiceError::event_stream(error.to_string()))?;
        let deserializer = EventDeserializer::new(self.protocol.payload_codec(), errors);
        Ok(EventReceiver::new(body, schema, deserializer))
    }

    async fn execute<I, O>(
        &self,
        call: ClientCall<I, O, P::Request, P::Response>,
    ) -> OutputContext<P::Request, P::Response>
    where
        I: SerializeableStruct + Send + Sync + 'static,
        O: DeserializeableShape + Send + Sync + 'static,
    {
        let ClientCall {
            input,
            operation,
            config,
            properties,
            retry_scope,
            event_body,
        } = call;
        let span = tracing::debug_span!(
            "operation",
            operation = %operation.id(),
            invocation_id = %Uuid::new_v4(),
        );

        async move {
            let mut input_context = InputContext::new(Arc::new(input), properties);
            let prepared =
                self.before_retry_loop(&config, &operation, &mut input_context, event_body);
            let context = match prepared {
                Ok(request_context) => {
                    let scope = retry_scope.as_deref();
                    self.retry_loop(&config, &operation, request_context, scope).await
                }
                Err(error) => OutputContext::new(
                    input_context.input,
                    None,
                    None,
                    Err(Arc::new(error)),
                    input_context.properties,
                ),
            };

            let interceptors = &config.interceptors;
            let output = interceptors.modify_before_completion(&context);
            let context = context.with_output(output);
            let result = interceptors.read_after_execution(&context);
            let context = context.fold_hook(result);
            if let Err(error) = &context.output {
                tracing::debug!(error = %error, "operation failed");
            }
            context
        }
        .instrument(span)
        .await
    }

    fn before_retry_loop<I, O>(
        &self,
        config: &ClientConfig<P::Request, P::Response>,
        operation: &ApiOperation<I, O>,
        context: &mut InputContext,
        event_body: Option<Body>,
    ) -> Result<RequestContext<P::Request>, ServiceError>
    where
        I: SerializeableStruct + 'static,
    {
        let interceptors = &config.interceptors;
        interceptors
            .read_before_execution(context)
            .map_err(ServiceError::wrap)?;
        let input = interceptors
            .modify_before_serialization(context)
            .map_err(ServiceError::wrap)?;
        *context = context.clone().with_input(input);
        interceptors
            .read_before_serialization(context)
            .map_err(ServiceError::wrap)?;

        let input = context.input_as::<I>().ok_or_else(|| {
            ServiceError::wrap(format!(
                "input of '{}' was replaced with a value of another type",
                operation.id()
            ))
        })?;
        let mut request = self
            .protocol
            .serialize_request(operation, input, &context.properties)?;
        if let Some(body) = event_body {
            request.set_body(body);
        }

        let request_context =
            RequestContext::new(Arc::clone(&context.input), request, context.properties.clone());
        interceptors
            .read_after_serialization(&request_context)
            .map_err(ServiceError::wrap)?;
        let request = interceptors
            .modify_before_retry_loop(&request_context)
            .map_err(ServiceError::wrap)?;
        Ok(request_context.with_request(request))
    }

    async fn retry_loop<I, O>(
        &self,
        config: &ClientConfig<P::Request, P::Response>,
        operation: &ApiOperation<I, O>,
        context: RequestContext<P::Request>,
        retry_scope: Option<&str>,
    ) -> OutputContext<P::Request, P::Response>
    where
        I: Send + Sync + 'static,
        O: DeserializeableShape + Send + Sync + 'static,
    {
        let strategy = &config.retry_strategy;
        let mut token = match strategy.acquire_initial_retry_token(retry_scope) {
            Ok(token) => token,
            Err(error) => {
                return OutputContext::new(
                    context.input,
                    Some(context.request),
                    None,
                    Err(Arc::new(error.into())),
                    context.properties,
                )
            }
        };

        let options = config.auth_scheme_resolver.resolve_auth_scheme(&AuthParams {
            protocol_id: self.protocol.id(),
            operation: &operation.schema,
            auth_schemes: &operation.effective_auth_schemes,
            context: &context.properties,
        });
        let auth: Option<AuthSelection<P::Request>> =
            select_auth_option(&options, &config.auth_schemes)
                .map(|(option, scheme)| (option.clone(), scheme));
        match &auth {
            Some((option, _)) => {
                tracing::debug!(scheme = %option.scheme_id, "selected auth scheme");
            }
            None => tracing::debug!("no configured auth scheme matched; sending unsigned"),
        }

        loop {
            tracing::debug!(attempt = token.retry_count() + 1, "starting attempt");
            let attempt = self
                .attempt(config, operation, context.clone(), auth.as_ref())
                .await;

            let interceptors = &config.interceptors;
            let output = interceptors.modify_before_attempt_completion(&attempt);
            let attempt = attempt.with_output(output);
            let result = interceptors.read_after_attempt(&attempt);
            let OutputContext {
                input,
                request,
                response,
                output,
                properties,
            } = attempt.fold_hook(result);

            let error = match output {
                Ok(value) => {
                    strategy.record_success(&token);
                    return OutputContext::new(input, request, response, Ok(value), properties);
                }
                Err(error) => error,
            };

            let info = classify_http_error(
                &error,
                response.as_ref().and_then(TransportResponse::status_code),
                response.as_ref().and_then(TransportResponse::retry_after),
            );
            // An unreplayable body ends the call before the strategy spends quota on it.
            let refreshed = context
                .request
                .rewind_body()
                .map_err(|body_error| {
                    RetryError::new(format!("cannot replay request body: {body_error}"))
                })
                .and_then(|()| strategy.refresh_retry_token_for_retry(&token, &info));

            match refreshed {
                Ok(next) => {
                    tracing::debug!(
                        error = %error,
                        retry_count = next.retry_count(),
                        delay_ms =
                            u64::try_from(next.retry_delay().as_millis()).unwrap_or(u64::MAX),
                        "attempt failed; retrying"
                    );
                    tokio::time::sleep(next.retry_delay()).await;
                    token = next;
                }
                Err(retry_error) => {
                    tracing::debug!(error = %error, reason = retry_error.message(), "not retrying");
                    let error = retry_error.with_cause(ServiceError::from_shared(error));
                    return OutputContext::new(
                        input,
                        request,
                        response,
                        Err(Arc::new(error.into())),
                        properties,
                    );
                }
            }
        }
    }

    async fn attempt<I, O>(
        &self,
        config: &ClientConfig<P::Request, P::Response>,
        operation: &ApiOperation<I, O>,
        mut context: RequestContext<P::Request>,
        auth: Option<&AuthSelection<P::Request>>,
    ) -> OutputContext<P::Request, P::Response>
    where
        I: Send + Sync + 'static,
        O: DeserializeableShape + Send + Sync + 'static,
    {
        let mut response = None;
        let result = self
            .transmit(config, operation, &mut context, &mut response, auth)
            .await;
        if let Err(error) = &result {
            tracing::debug!(error = %error, "attempt failed");
        }

        let attempt = OutputContext::new(
            context.input,
            Some(context.request),
            response,
            result.map_err(Arc::new),
            context.properties,
        );
        let hook = config.interceptors.read_after_deserialization(&attempt);
        attempt.fold_hook(hook)
    }

    /// Auth, endpoint, signing, transmit and deserialize for one attempt.
    ///
    /// `context` and `response` are left holding the latest request and
    /// response even when a step fails.
    async fn transmit<I, O>(
        &self,
        config: &ClientConfig<P::Request, P::Response>,
        operation: &ApiOperation<I, O>,
        context: &mut RequestContext<P::Request>,
        response: &mut Option<P::Response>,
        auth: Option<&AuthSelection<P::Request>>,
    ) -> Result<ShapeValue, ServiceError>
    where
        I: Send + Sync + 'static,
        O: DeserializeableShape + Send + Sync + 'static,
    {
        let interceptors = &config.interceptors;
        interceptors
            .read_before_attempt(context)
            .map_err(ServiceError::wrap)?;

        let identity = match auth {
            Some((option, scheme)) => {
                let properties = scheme
                    .identity_properties(&context.properties)
                    .merged(&option.identity_properties);
                let resolver = scheme.identity_resolver();
                Some(resolver.get_identity(&properties).await?)
            }
            None => None,
        };

        let endpoint = config
            .endpoint_resolver
            .resolve_endpoint(EndpointResolverParams {
                operation: &operation.schema,
                context: &context.properties,
                endpoint_uri: config.endpoint_uri.as_ref(),
            })
            .await?;
        context.request = self
            .protocol
            .set_service_endpoint(context.request.clone(), &endpoint);

        context.request = interceptors
            .modify_before_signing(context)
            .map_err(ServiceError::wrap)?;
        interceptors
            .read_before_signing(context)
            .map_err(ServiceError::wrap)?;
        if let (Some((option, scheme)), Some(identity)) = (auth, identity) {
            let properties = scheme
                .signer_properties(&context.properties)
                .merged(&option.signer_properties);
            let signer = scheme.signer();
            if let Some(slot) = context.properties.get(&EVENT_SIGNER) {
                if let Some(event_signer) = signer.event_signer(&identity, &properties) {
                    slot.set(event_signer);
                }
            }
            context.request = signer
                .sign(context.request.clone(), identity, &properties)
                .await?;
        }
        interceptors
            .read_after_signing(context)
            .map_err(ServiceError::wrap)?;

        context.request = interceptors
            .modify_before_transmit(context)
            .map_err(ServiceError::wrap)?;
        interceptors
            .read_before_transmit(context)
            .map_err(ServiceError::wrap)?;

        let transmitted = self.transport.send(context.request.clone()).await?;
        *response = Some(transmitted.clone());
        let response_context = ResponseContext::new(context.clone(), transmitted);
        interceptors
            .read_after_transmit(&response_context)
            .map_err(ServiceError::wrap)?;
        let replaced = interceptors
            .modify_before_deserialization(&response_context)
            .map_err(ServiceError::wrap)?;
        let response_context = response_context.with_response(replaced);
        *response = Some(response_context.response.clone());
        interceptors
            .read_before_deserialization(&response_context)
            .map_err(ServiceError::wrap)?;

        let output: O = self
            .protocol
            .deserialize_response(
                operation,
                &response_context.request,
                &response_context.response,
                &response_context.properties,
            )
            .await?;
        Ok(Arc::new(output))
    }
}

fn output_events<I, O>(
    operation: &ApiOperation<I, O>,
) -> Result<(Schema, crate::protocol::TypeRegistry), ServiceError> {
    let schema = operation.output_event_schema.clone().ok_or_else(|| {
        ServiceError::event_stream(format!(
            "operation '{}' has no output event stream",
            operation.id()
        ))
    })?;
    Ok((schema, operation.error_registry.clone()))
}

fn unwrap_output<O: Clone + Send + Sync + 'static>(output: Outcome) -> Result<O, ServiceError> {
    let value = output.map_err(ServiceError::from_shared)?;
    let value = value.downcast::<O>().map_err(|_| {
        ServiceError::wrap(String::from(
            "operation output was replaced with a value of another type",
        ))
    })?;
    Ok(Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone()))
}
