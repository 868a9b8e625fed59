//! Event streams layered on the request pipeline.
//!
//! | Type | Direction |
//! |------|-----------|
//! | [`InputEventStream`] | Client publishes events; output arrives later |
//! | [`OutputEventStream`] | Output and receiver are available together |
//! | [`DuplexEventStream`] | Both; publishing never waits for the response |

mod mapping;
mod message;
mod publisher;
mod receiver;

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

pub use mapping::{
    EventDeserializer, EventSerializer, CONTENT_TYPE, ERROR_CODE, ERROR_MESSAGE, EVENT_TYPE,
    EXCEPTION_TYPE, MESSAGE_TYPE,
};
pub use message::{EventFramer, EventMessage, HeaderValue, MAX_FRAME_LEN};
pub use publisher::EventPublisher;
pub use receiver::EventReceiver;

use crate::auth::EventSigner;
use crate::error::ServiceError;
use crate::properties::PropertyKey;

/// Context property through which the pipeline hands the event signer to a
/// request body created before signing.
pub const EVENT_SIGNER: PropertyKey<EventSignerSlot> = PropertyKey::new("keel.event_signer");

/// Shared, late-bound event signer.
#[derive(Clone, Default)]
pub struct EventSignerSlot {
    signer: Arc<Mutex<Option<Arc<dyn EventSigner>>>>,
}

impl EventSignerSlot {
    pub fn set(&self, signer: Arc<dyn EventSigner>) {
        *self.signer.lock().expect("event signer lock is not poisoned") = Some(signer);
    }

    pub fn get(&self) -> Option<Arc<dyn EventSigner>> {
        self.signer
            .lock()
            .expect("event signer lock is not poisoned")
            .clone()
    }
}

impl Debug for EventSignerSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSignerSlot")
            .field("set", &self.get().is_some())
            .finish()
    }
}

async fn join<T>(handle: Option<JoinHandle<Result<T, ServiceError>>>) -> Result<T, ServiceError> {
    let handle =
        handle.ok_or_else(|| ServiceError::event_stream("operation output was already awaited"))?;
    handle.await.map_err(ServiceError::wrap)?
}

/// Operation with a streaming input.
pub struct InputEventStream<E, O> {
    pub input_stream: EventPublisher<E>,
    output: Option<JoinHandle<Result<O, ServiceError>>>,
}

impl<E, O> InputEventStream<E, O> {
    pub(crate) fn new(
        input_stream: EventPublisher<E>,
        output: JoinHandle<Result<O, ServiceError>>,
    ) -> Self {
        Self {
            input_stream,
            output: Some(output),
        }
    }

    /// Waits for the operation output. Can only be awaited once.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or an event stream error when awaited
    /// twice.
    pub async fn await_output(&mut self) -> Result<O, ServiceError> {
        join(self.output.take()).await
    }
}

/// Operation with a streaming output.
pub struct OutputEventStream<E, O> {
    pub output: O,
    pub output_stream: EventReceiver<E>,
}

/// Operation streaming in both directions.
pub struct DuplexEventStream<I, E, O> {
    pub input_stream: EventPublisher<I>,
    output: Option<JoinHandle<Result<(O, EventReceiver<E>), ServiceError>>>,
}

impl<I, E, O> DuplexEventStream<I, E, O> {
    pub(crate) fn new(
        input_stream: EventPublisher<I>,
        output: JoinHandle<Result<(O, EventReceiver<E>), ServiceError>>,
    ) -> Self {
        Self {
            input_stream,
            output: Some(output),
        }
    }

    /// Waits for the initial response, returning the output and the
    /// receiver for server events. Can only be awaited once.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or an event stream error when awaited
    /// twice.
    pub async fn await_output(&mut self) -> Result<(O, EventReceiver<E>), ServiceError> {
        join(self.output.take()).await
    }
}
