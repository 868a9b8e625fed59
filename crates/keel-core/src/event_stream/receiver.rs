use std::marker::PhantomData;

use bytes::BytesMut;
use futures::stream::{self, Stream, StreamExt};

use super::mapping::EventDeserializer;
use super::message::EventFramer;
use crate::deserializers::DeserializeableShape;
use crate::error::{ServiceError, TransportError};
use crate::http::ByteStream;
use crate::schema::Schema;

/// Receiving half of an event stream.
///
/// Pull events with [`receive`](Self::receive) or convert into a
/// [`Stream`]. The receiver closes itself at end of stream and on the first
/// error; an event it cannot decode is always an error, never skipped.
pub struct EventReceiver<E> {
    body: Option<ByteStream>,
    buffer: BytesMut,
    schema: Schema,
    deserializer: EventDeserializer,
    marker: PhantomData<fn() -> E>,
}

impl<E: DeserializeableShape> EventReceiver<E> {
    pub fn new(body: ByteStream, schema: Schema, deserializer: EventDeserializer) -> Self {
        Self {
            body: Some(body),
            buffer: BytesMut::new(),
            schema,
            deserializer,
            marker: PhantomData,
        }
    }

    /// Next event, or `None` once the stream has ended.
    ///
    /// # Errors
    ///
    /// Returns the modeled error of an exception event, or an event stream
    /// error for malformed or unknown events. The receiver is closed after
    /// any error.
    pub async fn receive(&mut self) -> Result<Option<E>, ServiceError> {
        loop {
            if self.body.is_none() && self.buffer.is_empty() {
                return Ok(None);
            }
            match EventFramer.decode(&mut self.buffer) {
                Ok(Some(message)) => {
                    return match self.deserializer.deserialize(&self.schema, &message) {
                        Ok(event) => Ok(Some(event)),
                        Err(error) => Err(self.fail(error)),
                    };
                }
                Ok(None) => {}
                Err(error) => return Err(self.fail(error)),
            }

            let Some(body) = self.body.as_mut() else {
                let error = ServiceError::event_stream("event stream ended inside a frame");
                return Err(self.fail(error));
            };
            match body.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(source)) => {
                    let error = TransportError::new("event stream body failed").with_source(source);
                    return Err(self.fail(error.into()));
                }
                None if self.buffer.is_empty() => {
                    self.close();
                    return Ok(None);
                }
                None => self.body = None,
            }
        }
    }

    /// Releases the response body; later receives return `None`.
    pub fn close(&mut self) {
        if self.body.take().is_some() {
            tracing::debug!(shape = %self.schema.id(), "event receiver closed");
        }
        self.buffer.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.body.is_none() && self.buffer.is_empty()
    }

    fn fail(&mut self, error: ServiceError) -> ServiceError {
        tracing::warn!(shape = %self.schema.id(), error = %error, "event stream terminated");
        self.close();
        error
    }

    /// Push-style view of the remaining events.
    pub fn into_stream(self) -> impl Stream<Item = Result<E, ServiceError>>
    where
        E: 'static,
    {
        stream::unfold(self, |mut receiver| async move {
            match receiver.receive().await {
                Ok(Some(event)) => Some((Ok(event), receiver)),
                Ok(None) => None,
                Err(error) => Some((Err(error), receiver)),
            }
        })
    }
}
