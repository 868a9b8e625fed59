use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use tokio::sync::mpsc;

use super::mapping::EventSerializer;
use super::message::{EventFramer, EventMessage};
use super::EventSignerSlot;
use crate::codec::Codec;
use crate::error::{BoxError, ServiceError};
use crate::http::Body;
use crate::serializers::SerializeableStruct;

/// Events buffered before `send` waits for the transport to catch up.
const CHANNEL_CAPACITY: usize = 32;

/// Sending half of an event stream.
///
/// Events are queued until the transport pulls the request body, so events
/// can be sent before the request is even transmitted. Dropping the
/// publisher closes the stream.
pub struct EventPublisher<E> {
    sender: Option<mpsc::Sender<EventMessage>>,
    serializer: EventSerializer,
    marker: PhantomData<fn(E)>,
}

impl<E: SerializeableStruct> EventPublisher<E> {
    /// Publisher plus the request body that carries its events.
    pub(crate) fn channel(codec: Arc<dyn Codec>, signer: EventSignerSlot) -> (Self, Body) {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let publisher = Self {
            sender: Some(sender),
            serializer: EventSerializer::new(codec),
            marker: PhantomData,
        };
        (publisher, frame_body(receiver, signer))
    }

    /// # Errors
    ///
    /// Fails when the event cannot be serialized or the stream is closed.
    pub async fn send(&self, event: E) -> Result<(), ServiceError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| ServiceError::event_stream("event publisher is closed"))?;
        let message = self.serializer.serialize(&event)?;
        sender
            .send(message)
            .await
            .map_err(|_| ServiceError::event_stream("event stream was closed by the transport"))
    }

    /// Ends the stream; later calls do nothing.
    pub fn close(&mut self) {
        if self.sender.take().is_some() {
            tracing::debug!("event publisher closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.as_ref().map_or(true, mpsc::Sender::is_closed)
    }
}

struct FrameState {
    receiver: mpsc::Receiver<EventMessage>,
    signer: EventSignerSlot,
    failed: bool,
}

fn frame_body(receiver: mpsc::Receiver<EventMessage>, signer: EventSignerSlot) -> Body {
    let state = FrameState {
        receiver,
        signer,
        failed: false,
    };
    Body::from_stream(stream::unfold(state, |mut state| async move {
        if state.failed {
            return None;
        }
        let message = state.receiver.recv().await?;
        match encode(&state.signer, message) {
            Ok(frame) => Some((Ok(frame), state)),
            Err(error) => {
                tracing::warn!(error = %error, "failed to encode outgoing event");
                state.failed = true;
                state.receiver.close();
                Some((Err(BoxError::from(error)), state))
            }
        }
    }))
}

fn encode(signer: &EventSignerSlot, message: EventMessage) -> Result<Bytes, ServiceError> {
    let message = match signer.get() {
        Some(signer) => signer.sign_event(message)?,
        None => message,
    };
    EventFramer.encode(&message)
}
