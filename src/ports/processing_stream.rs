use async_trait::async_trait;
use thiserror::Error;

use crate::core::model::{IncomingEvent, Reply};

/// Failures on a single processing stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StreamError {
    /// Receiving the next message from the proxy failed
    #[error("receive failed: {0}")]
    Receive(String),

    /// The proxy sent a message this processor cannot interpret
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Sending a reply to the proxy failed
    #[error("send failed: {0}")]
    Send(String),
}

/// Result type alias for processing stream operations
pub type StreamResult<T> = Result<T, StreamError>;

/// ProcessingStream defines the port for one accepted bidirectional stream.
#[async_trait]
pub trait ProcessingStream: Send {
    /// Receive the next event
    ///
    /// # Returns
    /// `Ok(None)` once the proxy has closed its side of the stream
    async fn recv(&mut self) -> StreamResult<Option<IncomingEvent>>;

    /// Send the reply for the most recently received event
    async fn send(&mut self, reply: Reply) -> StreamResult<()>;
}
