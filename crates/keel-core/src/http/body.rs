use std::fmt::{Debug, Formatter};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use thiserror::Error;

use crate::error::BoxError;

/// Async stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("stream body was already consumed and cannot be rewound")]
    NotRewindable,
    #[error("stream body was already consumed")]
    AlreadyConsumed,
    #[error("failed to read body: {0}")]
    Read(#[source] BoxError),
}

enum StreamState {
    Fresh(ByteStream),
    Taken,
    Buffered(Bytes),
}

/// Shared handle to a one-shot stream.
#[derive(Clone)]
pub struct StreamBody {
    state: Arc<Mutex<StreamState>>,
}

impl StreamBody {
    fn lock(&self) -> std::sync::MutexGuard<'_, StreamState> {
        self.state.lock().expect("stream body lock is not poisoned")
    }
}

/// Request or response body.
///
/// Clones share the underlying stream: once any clone consumes it, the
/// others observe it as consumed.
#[derive(Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    Stream(StreamBody),
}

impl Body {
    pub fn from_stream(
        stream: impl Stream<Item = Result<Bytes, BoxError>> + Send + 'static,
    ) -> Self {
        Self::Stream(StreamBody {
            state: Arc::new(Mutex::new(StreamState::Fresh(Box::pin(stream)))),
        })
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Stream(_) => false,
        }
    }

    /// Resets the body so it can be sent again.
    ///
    /// # Errors
    ///
    /// Returns [`BodyError::NotRewindable`] for a stream that has been consumed.
    pub fn rewind(&self) -> Result<(), BodyError> {
        match self {
            Self::Empty | Self::Bytes(_) => Ok(()),
            Self::Stream(stream) => match &*stream.lock() {
                StreamState::Fresh(_) | StreamState::Buffered(_) => Ok(()),
                StreamState::Taken => Err(BodyError::NotRewindable),
            },
        }
    }

    /// Takes the body as a chunk stream.
    ///
    /// # Errors
    ///
    /// Returns [`BodyError::AlreadyConsumed`] when a stream was already taken.
    pub fn take_stream(&self) -> Result<ByteStream, BodyError> {
        match self {
            Self::Empty => Ok(Box::pin(stream::empty())),
            Self::Bytes(bytes) => Ok(Box::pin(stream::once(futures::future::ready(Ok(
                bytes.clone(),
            ))))),
            Self::Stream(stream) => {
                let mut state = stream.lock();
                match std::mem::replace(&mut *state, StreamState::Taken) {
                    StreamState::Fresh(inner) => Ok(inner),
                    StreamState::Buffered(bytes) => {
                        *state = StreamState::Buffered(bytes.clone());
                        Ok(Box::pin(stream::once(futures::future::ready(Ok(bytes)))))
                    }
                    StreamState::Taken => Err(BodyError::AlreadyConsumed),
                }
            }
        }
    }

    /// Reads the whole body into memory.
    ///
    /// A collected stream stays readable: later calls return the buffered bytes.
    ///
    /// # Errors
    ///
    /// Fails when the stream was already taken or yields an error.
    pub async fn collect(&self) -> Result<Bytes, BodyError> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Stream(handle) => {
                let mut inner = self.take_stream()?;
                let mut buffer = BytesMut::new();
                while let Some(chunk) = inner.next().await {
                    buffer.extend_from_slice(&chunk.map_err(BodyError::Read)?);
                }
                let bytes = buffer.freeze();
                *handle.lock() = StreamState::Buffered(bytes.clone());
                Ok(bytes)
            }
        }
    }
}

impl Debug for Body {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Body::Empty"),
            Self::Bytes(bytes) => write!(f, "Body::Bytes({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<&'static str> for Body {
    fn from(value: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&'static str]) -> Body {
        let items: Vec<Result<Bytes, BoxError>> = parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part.as_bytes())))
            .collect();
        Body::from_stream(stream::iter(items))
    }

    #[tokio::test]
    async fn collect_buffers_streams_for_later_reads() {
        let body = chunks(&["hel", "lo"]);

        assert_eq!(body.collect().await.expect("collect"), Bytes::from("hello"));
        assert_eq!(body.collect().await.expect("buffered"), Bytes::from("hello"));
        assert!(body.rewind().is_ok());
    }

    #[test]
    fn taken_streams_cannot_be_rewound() {
        let body = chunks(&["data"]);
        let shared = body.clone();

        assert!(body.rewind().is_ok());
        let _stream = shared.take_stream().expect("first take");
        assert!(matches!(body.rewind(), Err(BodyError::NotRewindable)));
        assert!(matches!(
            body.take_stream(),
            Err(BodyError::AlreadyConsumed)
        ));
    }

    #[test]
    fn byte_bodies_always_rewind() {
        let body = Body::from("payload");
        let _ = body.take_stream().expect("take");
        assert!(body.rewind().is_ok());
    }
}
