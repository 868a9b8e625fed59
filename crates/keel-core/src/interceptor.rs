//! Interceptor hooks and the immutable contexts they observe.
//!
//! Contexts are cheap to clone and are replaced, never mutated, as a call
//! moves through the pipeline. `read_*` hooks observe; `modify_*` hooks return
//! the replacement for one field of the context.

use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::error::{BoxError, ServiceError};
use crate::properties::Properties;

/// Type-erased operation input or output.
pub type ShapeValue = Arc<dyn Any + Send + Sync>;

/// Result of an attempt or an execution as seen by interceptors.
pub type Outcome = Result<ShapeValue, Arc<ServiceError>>;

/// Context before serialization.
#[derive(Clone)]
pub struct InputContext {
    pub input: ShapeValue,
    pub properties: Properties,
}

impl InputContext {
    pub fn new(input: ShapeValue, properties: Properties) -> Self {
        Self { input, properties }
    }

    pub fn input_as<T: Any>(&self) -> Option<&T> {
        self.input.downcast_ref::<T>()
    }

    pub fn with_input(self, input: ShapeValue) -> Self {
        Self { input, ..self }
    }

    pub fn with_properties(self, properties: Properties) -> Self {
        Self { properties, ..self }
    }
}

impl Debug for InputContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputContext")
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Context once a transport request exists.
#[derive(Clone)]
pub struct RequestContext<Req> {
    pub input: ShapeValue,
    pub request: Req,
    pub properties: Properties,
}

impl<Req> RequestContext<Req> {
    pub fn new(input: ShapeValue, request: Req, properties: Properties) -> Self {
        Self {
            input,
            request,
            properties,
        }
    }

    pub fn input_as<T: Any>(&self) -> Option<&T> {
        self.input.downcast_ref::<T>()
    }

    pub fn with_request(self, request: Req) -> Self {
        Self { request, ..self }
    }

    pub fn with_properties(self, properties: Properties) -> Self {
        Self { properties, ..self }
    }
}

impl<Req: Debug> Debug for RequestContext<Req> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request", &self.request)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Context once a transport response exists.
#[derive(Clone)]
pub struct ResponseContext<Req, Resp> {
    pub input: ShapeValue,
    pub request: Req,
    pub response: Resp,
    pub properties: Properties,
}

impl<Req, Resp> ResponseContext<Req, Resp> {
    pub fn new(context: RequestContext<Req>, response: Resp) -> Self {
        Self {
            input: context.input,
            request: context.request,
            response,
            properties: context.properties,
        }
    }

    pub fn with_response(self, response: Resp) -> Self {
        Self { response, ..self }
    }
}

impl<Req: Debug, Resp: Debug> Debug for ResponseContext<Req, Resp> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseContext")
            .field("request", &self.request)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

/// Context carrying the result of an attempt or execution.
///
/// `request` and `response` are `None` when the call failed before producing
/// them.
#[derive(Clone)]
pub struct OutputContext<Req, Resp> {
    pub input: ShapeValue,
    pub request: Option<Req>,
    pub response: Option<Resp>,
    pub output: Outcome,
    pub properties: Properties,
}

impl<Req, Resp> OutputContext<Req, Resp> {
    pub fn new(
        input: ShapeValue,
        request: Option<Req>,
        response: Option<Resp>,
        output: Outcome,
        properties: Properties,
    ) -> Self {
        Self {
            input,
            request,
            response,
            output,
            properties,
        }
    }

    pub fn with_output(self, output: Outcome) -> Self {
        Self { output, ..self }
    }

    pub fn with_error(self, error: ServiceError) -> Self {
        self.with_output(Err(Arc::new(error)))
    }

    pub fn output_as<T: Any>(&self) -> Option<&T> {
        self.output.as_ref().ok()?.downcast_ref::<T>()
    }

    pub fn error(&self) -> Option<&ServiceError> {
        self.output.as_ref().err().map(Arc::as_ref)
    }

    /// Folds a failed hook into the output, keeping the output otherwise.
    pub fn fold_hook(self, result: Result<(), BoxError>) -> Self {
        match result {
            Ok(()) => self,
            Err(error) => self.with_error(ServiceError::wrap(error)),
        }
    }
}

impl<Req: Debug, Resp: Debug> Debug for OutputContext<Req, Resp> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputContext")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("error", &self.error())
            .finish_non_exhaustive()
    }
}

/// Hooks into each step of an operation execution.
///
/// All hooks default to no-ops. Errors returned from a hook become the result
/// of the attempt or execution; they never abort the remaining completion
/// hooks.
#[allow(unused_variables)]
pub trait Interceptor<Req, Resp>: Send + Sync {
    fn read_before_execution(&self, context: &InputContext) -> Result<(), BoxError> {
        Ok(())
    }

    fn modify_before_serialization(&self, context: &InputContext) -> Result<ShapeValue, BoxError> {
        Ok(Arc::clone(&context.input))
    }

    fn read_before_serialization(&self, context: &InputContext) -> Result<(), BoxError> {
        Ok(())
    }

    fn read_after_serialization(&self, context: &RequestContext<Req>) -> Result<(), BoxError> {
        Ok(())
    }

    fn modify_before_retry_loop(&self, context: &RequestContext<Req>) -> Result<Req, BoxError>
    where
        Req: Clone,
    {
        Ok(context.request.clone())
    }

    fn read_before_attempt(&self, context: &RequestContext<Req>) -> Result<(), BoxError> {
        Ok(())
    }

    fn modify_before_signing(&self, context: &RequestContext<Req>) -> Result<Req, BoxError>
    where
        Req: Clone,
    {
        Ok(context.request.clone())
    }

    fn read_before_signing(&self, context: &RequestContext<Req>) -> Result<(), BoxError> {
        Ok(())
    }

    fn read_after_signing(&self, context: &RequestContext<Req>) -> Result<(), BoxError> {
        Ok(())
    }

    fn modify_before_transmit(&self, context: &RequestContext<Req>) -> Result<Req, BoxError>
    where
        Req: Clone,
    {
        Ok(context.request.clone())
    }

    fn read_before_transmit(&self, context: &RequestContext<Req>) -> Result<(), BoxError> {
        Ok(())
    }

    fn read_after_transmit(&self, context: &ResponseContext<Req, Resp>) -> Result<(), BoxError> {
        Ok(())
    }

    fn modify_before_deserialization(
        &self,
        context: &ResponseContext<Req, Resp>,
    ) -> Result<Resp, BoxError>
    where
        Resp: Clone,
    {
        Ok(context.response.clone())
    }

    fn read_before_deserialization(
        &self,
        context: &ResponseContext<Req, Resp>,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    fn read_after_deserialization(
        &self,
        context: &OutputContext<Req, Resp>,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// May replace the attempt result, including turning an error into output.
    fn modify_before_attempt_completion(&self, context: &OutputContext<Req, Resp>) -> Outcome {
        context.output.clone()
    }

    fn read_after_attempt(&self, context: &OutputContext<Req, Resp>) -> Result<(), BoxError> {
        Ok(())
    }

    /// May replace the execution result.
    fn modify_before_completion(&self, context: &OutputContext<Req, Resp>) -> Outcome {
        context.output.clone()
    }

    fn read_after_execution(&self, context: &OutputContext<Req, Resp>) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Ordered interceptors run as one.
///
/// Read hooks run every interceptor even after a failure and report the last
/// failure. Modify hooks thread the replaced value through each interceptor
/// in order and stop at the first failure.
pub struct InterceptorChain<Req, Resp> {
    interceptors: Vec<Arc<dyn Interceptor<Req, Resp>>>,
}

impl<Req, Resp> Clone for InterceptorChain<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            interceptors: self.interceptors.clone(),
        }
    }
}

impl<Req, Resp> Default for InterceptorChain<Req, Resp> {
    fn default() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }
}

impl<Req, Resp> Debug for InterceptorChain<Req, Resp> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

impl<Req, Resp> InterceptorChain<Req, Resp> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor<Req, Resp>>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    fn read_all(
        &self,
        hook: &str,
        read: impl Fn(&dyn Interceptor<Req, Resp>) -> Result<(), BoxError>,
    ) -> Result<(), BoxError> {
        let mut failure = None;
        for interceptor in &self.interceptors {
            if let Err(error) = read(interceptor.as_ref()) {
                if let Some(previous) = failure.replace(error) {
                    tracing::debug!(hook, error = %previous, "interceptor failure superseded");
                }
            }
        }
        failure.map_or(Ok(()), Err)
    }
}

impl<Req, Resp> Interceptor<Req, Resp> for InterceptorChain<Req, Resp>
where
    Req: Clone + Send + Sync,
    Resp: Clone + Send + Sync,
{
    fn read_before_execution(&self, context: &InputContext) -> Result<(), BoxError> {
        self.read_all("read_before_execution", |i| i.read_before_execution(context))
    }

    fn modify_before_serialization(&self, context: &InputContext) -> Result<ShapeValue, BoxError> {
        let mut context = context.clone();
        for interceptor in &self.interceptors {
            let input = interceptor.modify_before_serialization(&context)?;
            context = context.with_input(input);
        }
        Ok(context.input)
    }

    fn read_before_serialization(&self, context: &InputContext) -> Result<(), BoxError> {
        self.read_all("read_before_serialization", |i| {
            i.read_before_serialization(context)
        })
    }

    fn read_after_serialization(&self, context: &RequestContext<Req>) -> Result<(), BoxError> {
        self.read_all("read_after_serialization", |i| {
            i.read_after_serialization(context)
        })
    }

    fn modify_before_retry_loop(&self, context: &RequestContext<Req>) -> Result<Req, BoxError> {
        let mut context = context.clone();
        for interceptor in &self.interceptors {
            let request = interceptor.modify_before_retry_loop(&context)?;
            context = context.with_request(request);
        }
        Ok(context.request)
    }

    fn read_before_attempt(&self, context: &RequestContext<Req>) -> Result<(), BoxError> {
        self.read_all("read_before_attempt", |i| i.read_before_attempt(context))
    }

    fn modify_before_signing(&self, context: &RequestContext<Req>) -> Result<Req, BoxError> {
        let mut context = context.clone();
        for interceptor in &self.interceptors {
            let request = interceptor.modify_before_signing(&context)?;
            context = context.with_request(request);
        }
        Ok(context.request)
    }

    fn read_before_signing(&self, context: &RequestContext<Req>) -> Result<(), BoxError> {
        self.read_all("read_before_signing", |i| i.read_before_signing(context))
    }

    fn read_after_signing(&self, context: &RequestContext<Req>) -> Result<(), BoxError> {
        self.read_all("read_after_signing", |i| i.read_after_signing(context))
    }

    fn modify_before_transmit(&self, context: &RequestContext<Req>) -> Result<Req, BoxError> {
        let mut context = context.clone();
        for interceptor in &self.interceptors {
            let request = interceptor.modify_before_transmit(&context)?;
            context = context.with_request(request);
        }
        Ok(context.request)
    }

    fn read_before_transmit(&self, context: &RequestContext<Req>) -> Result<(), BoxError> {
        self.read_all("read_before_transmit", |i| i.read_before_transmit(context))
    }

    fn read_after_transmit(&self, context: &ResponseContext<Req, Resp>) -> Result<(), BoxError> {
        self.read_all("read_after_transmit", |i| i.read_after_transmit(context))
    }

    fn modify_before_deserialization(
        &self,
        context: &ResponseContext<Req, Resp>,
    ) -> Result<Resp, BoxError> {
        let mut context = context.clone();
        for interceptor in &self.interceptors {
            let response = interceptor.modify_before_deserialization(&context)?;
            context = context.with_response(response);
        }
        Ok(context.response)
    }

    fn read_before_deserialization(
        &self,
        context: &ResponseContext<Req, Resp>,
    ) -> Result<(), BoxError> {
        self.read_all("read_before_deserialization", |i| {
            i.read_before_deserialization(context)
        })
    }

    fn read_after_deserialization(
        &self,
        context: &OutputContext<Req, Resp>,
    ) -> Result<(), BoxError> {
        self.read_all("read_after_deserialization", |i| {
            i.read_after_deserialization(context)
        })
    }

    fn modify_before_attempt_completion(&self, context: &OutputContext<Req, Resp>) -> Outcome {
        let mut context = context.clone();
        for interceptor in &self.interceptors {
            let output = interceptor.modify_before_attempt_completion(&context);
            context = context.with_output(output);
        }
        context.output
    }

    fn read_after_attempt(&self, context: &OutputContext<Req, Resp>) -> Result<(), BoxError> {
        self.read_all("read_after_attempt", |i| i.read_after_attempt(context))
    }

    fn modify_before_completion(&self, context: &OutputContext<Req, Resp>) -> Outcome {
        let mut context = context.clone();
        for interceptor in &self.interceptors {
            let output = interceptor.modify_before_completion(&context);
            context = context.with_output(output);
        }
        context.output
    }

    fn read_after_execution(&self, context: &OutputContext<Req, Resp>) -> Result<(), BoxError> {
        self.read_all("read_after_execution", |i| i.read_after_execution(context))
    }
}
