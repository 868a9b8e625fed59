//! Generic client that generated service clients wrap.

use crate::config::{ClientConfig, Plugin};
use crate::deserializers::DeserializeableShape;
use crate::error::ServiceError;
use crate::event_stream::{DuplexEventStream, InputEventStream, OutputEventStream};
use crate::pipeline::{ClientCall, RequestPipeline};
use crate::protocol::{ApiOperation, ClientProtocol};
use crate::serializers::SerializeableStruct;
use crate::transport::ClientTransport;

type Plugins<P> =
    [Plugin<<P as ClientProtocol>::Request, <P as ClientProtocol>::Response>];

/// A protocol, a transport and the shared configuration.
///
/// Each call applies its plugins to a private copy of the configuration.
pub struct Client<P: ClientProtocol, T> {
    config: ClientConfig<P::Request, P::Response>,
    pipeline: RequestPipeline<P, T>,
}

impl<P, T> Client<P, T>
where
    P: ClientProtocol,
    T: ClientTransport<P::Request, P::Response>,
{
    pub fn new(protocol: P, transport: T, config: ClientConfig<P::Request, P::Response>) -> Self {
        Self {
            config,
            pipeline: RequestPipeline::new(protocol, transport),
        }
    }

    pub fn config(&self) -> &ClientConfig<P::Request, P::Response> {
        &self.config
    }

    pub fn pipeline(&self) -> &RequestPipeline<P, T> {
        &self.pipeline
    }

    fn prepare<I, O>(
        &self,
        input: I,
        operation: &ApiOperation<I, O>,
        plugins: &Plugins<P>,
    ) -> ClientCall<I, O, P::Request, P::Response> {
        ClientCall::new(input, operation.clone(), self.config.with_plugins(plugins))
    }

    /// # Errors
    ///
    /// Returns the operation's modeled error, or any pipeline failure.
    pub async fn execute<I, O>(
        &self,
        input: I,
        operation: &ApiOperation<I, O>,
        plugins: &Plugins<P>,
    ) -> Result<O, ServiceError>
    where
        I: SerializeableStruct + Send + Sync + 'static,
        O: DeserializeableShape + Clone + Send + Sync + 'static,
    {
        let call = self.prepare(input, operation, plugins);
        self.pipeline.call(call).await
    }

    pub fn input_stream<I, E, O>(
        &self,
        input: I,
        operation: &ApiOperation<I, O>,
        plugins: &Plugins<P>,
    ) -> InputEventStream<E, O>
    where
        I: SerializeableStruct + Send + Sync + 'static,
        E: SerializeableStruct,
        O: DeserializeableShape + Clone + Send + Sync + 'static,
    {
        let call = self.prepare(input, operation, plugins);
        self.pipeline.input_stream(call)
    }

    /// # Errors
    ///
    /// Returns the operation's error, or an event stream error when the
    /// operation has no output stream.
    pub async fn output_stream<I, E, O>(
        &self,
        input: I,
        operation: &ApiOperation<I, O>,
        plugins: &Plugins<P>,
    ) -> Result<OutputEventStream<E, O>, ServiceError>
    where
        I: SerializeableStruct + Send + Sync + 'static,
        E: DeserializeableShape,
        O: DeserializeableShape + Clone + Send + Sync + 'static,
    {
        let call = self.prepare(input, operation, plugins);
        self.pipeline.output_stream(call).await
    }

    pub fn duplex_stream<I, IE, OE, O>(
        &self,
        input: I,
        operation: &ApiOperation<I, O>,
        plugins: &Plugins<P>,
    ) -> DuplexEventStream<IE, OE, O>
    where
        I: SerializeableStruct + Send + Sync + 'static,
        IE: SerializeableStruct,
        OE: DeserializeableShape + 'static,
        O: DeserializeableShape + Clone + Send + Sync + 'static,
    {
        let call = self.prepare(input, operation, plugins);
        self.pipeline.duplex_stream(call)
    }
}
