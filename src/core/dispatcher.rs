//! Per-stream dispatch loop.
//!
//! The proxy and the processor take strict turns: every received event gets
//! exactly one reply before the next receive. Request headers go through the
//! [`HeaderProcessor`]; every other event kind is answered with an unmodified
//! continue so the proxy never waits on a reply that will not come.
use std::sync::Arc;

use crate::{
    core::model::{IncomingEvent, Outcome, Reply},
    ports::{HeaderProcessor, ProcessingStream, StreamError},
};

/// How a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamClose {
    /// The proxy closed its side; nothing left to answer.
    Clean,
}

/// Running totals for one stream, logged when it ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub events: u64,
    pub continued: u64,
    pub rejected: u64,
}

/// Drives the receive/reply loop of a single stream.
///
/// Cloning is cheap; each accepted stream gets its own copy and nothing
/// mutable is shared between them.
#[derive(Clone)]
pub struct StreamDispatcher {
    processor: Arc<dyn HeaderProcessor>,
}

impl StreamDispatcher {
    pub fn new(processor: Arc<dyn HeaderProcessor>) -> Self {
        Self { processor }
    }

    /// Compute the reply for one event.
    pub fn dispatch(&self, event: IncomingEvent) -> Reply {
        match event {
            IncomingEvent::RequestHeaders(headers) => {
                Reply::RequestHeaders(self.processor.process_request_headers(&headers))
            }
            other @ (IncomingEvent::RequestBody
            | IncomingEvent::RequestTrailers
            | IncomingEvent::ResponseHeaders
            | IncomingEvent::ResponseBody
            | IncomingEvent::ResponseTrailers) => Reply::PassThrough(other.kind()),
        }
    }

    /// Run the stream until the proxy closes it or a transport error occurs.
    ///
    /// Errors are returned to the caller and end only this stream.
    pub async fn run<S>(&self, stream: &mut S) -> Result<StreamClose, StreamError>
    where
        S: ProcessingStream + ?Sized,
    {
        let mut stats = StreamStats::default();

        loop {
            let event = match stream.recv().await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    tracing::debug!(
                        events = stats.events,
                        continued = stats.continued,
                        rejected = stats.rejected,
                        "stream closed by proxy"
                    );
                    return Ok(StreamClose::Clean);
                }
                Err(e) => {
                    tracing::warn!(error = %e, events = stats.events, "stream receive failed");
                    return Err(e);
                }
            };

            stats.events += 1;
            let kind = event.kind();
            let reply = self.dispatch(event);

            match &reply {
                Reply::RequestHeaders(Outcome::Continue(set)) => {
                    stats.continued += 1;
                    tracing::debug!(mutations = set.len(), "continuing request");
                }
                Reply::RequestHeaders(Outcome::Terminal { status, .. }) => {
                    stats.rejected += 1;
                    tracing::debug!(status = status.as_u16(), "sending immediate response");
                }
                Reply::PassThrough(_) => {
                    tracing::trace!(event = kind.as_str(), "passing event through");
                }
            }

            if let Err(e) = stream.send(reply).await {
                tracing::warn!(error = %e, event = kind.as_str(), "stream send failed");
                return Err(e);
            }
        }
    }
}
