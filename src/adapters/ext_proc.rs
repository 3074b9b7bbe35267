//! gRPC adapter for `envoy.service.ext_proc.v3.ExternalProcessor`.
//!
//! Translates protobuf messages to and from the core model and runs one
//! [`StreamDispatcher`] task per accepted `Process` call.
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    core::{
        dispatcher::{StreamClose, StreamDispatcher},
        model::{EventKind, HeaderEntry, IncomingEvent, MutationSet, Outcome, Reply, SetAction},
    },
    ports::{HeaderProcessor, ProcessingStream, StreamError, StreamResult},
    proto::envoy::{
        config::core::v3::{
            HeaderMap, HeaderValue, HeaderValueOption, header_value_option::HeaderAppendAction,
        },
        r#type::v3::HttpStatus,
        service::ext_proc::v3::{
            BodyResponse, CommonResponse, HeaderMutation, HeadersResponse, ImmediateResponse,
            ProcessingRequest, ProcessingResponse, TrailersResponse,
            common_response::ResponseStatus,
            external_processor_server::{ExternalProcessor, ExternalProcessorServer},
            processing_request::Request as RequestKind,
            processing_response::Response as ResponseKind,
        },
    },
    tracing_setup,
};

/// Convert a protobuf request into a core event.
pub fn event_from_request(request: ProcessingRequest) -> StreamResult<IncomingEvent> {
    let kind = request.request.ok_or_else(|| {
        StreamError::InvalidMessage("processing request carries no event".to_string())
    })?;

    Ok(match kind {
        RequestKind::RequestHeaders(headers) => {
            IncomingEvent::RequestHeaders(header_entries(headers.headers))
        }
        RequestKind::RequestBody(_) => IncomingEvent::RequestBody,
        RequestKind::RequestTrailers(_) => IncomingEvent::RequestTrailers,
        RequestKind::ResponseHeaders(_) => IncomingEvent::ResponseHeaders,
        RequestKind::ResponseBody(_) => IncomingEvent::ResponseBody,
        RequestKind::ResponseTrailers(_) => IncomingEvent::ResponseTrailers,
    })
}

fn header_entries(map: Option<HeaderMap>) -> Vec<HeaderEntry> {
    map.map(|m| m.headers)
        .unwrap_or_default()
        .into_iter()
        .map(|h| {
            // Newer proxies send values as raw bytes and leave `value` empty.
            let value = if h.value.is_empty() && !h.raw_value.is_empty() {
                String::from_utf8_lossy(&h.raw_value).into_owned()
            } else {
                h.value
            };
            HeaderEntry::new(h.key, value)
        })
        .collect()
}

/// Convert a core reply into the protobuf response the proxy expects.
pub fn response_from_reply(reply: Reply) -> ProcessingResponse {
    let response = match reply {
        Reply::RequestHeaders(Outcome::Continue(mutations)) => {
            ResponseKind::RequestHeaders(HeadersResponse {
                response: Some(CommonResponse {
                    status: ResponseStatus::Continue as i32,
                    header_mutation: Some(header_mutation(&mutations)),
                    ..CommonResponse::default()
                }),
            })
        }
        Reply::RequestHeaders(Outcome::Terminal {
            status,
            headers,
            body,
        }) => ResponseKind::ImmediateResponse(ImmediateResponse {
            status: Some(HttpStatus {
                code: i32::from(status.as_u16()),
            }),
            headers: Some(HeaderMutation {
                set_headers: headers
                    .into_iter()
                    .map(|h| header_option(h, SetAction::Overwrite))
                    .collect(),
                remove_headers: Vec::new(),
            }),
            body: body.to_vec(),
            ..ImmediateResponse::default()
        }),
        Reply::PassThrough(kind) => pass_through(kind),
    };

    ProcessingResponse {
        response: Some(response),
    }
}

fn pass_through(kind: EventKind) -> ResponseKind {
    let headers = || HeadersResponse {
        response: Some(CommonResponse::default()),
    };
    let body = || BodyResponse {
        response: Some(CommonResponse::default()),
    };

    match kind {
        EventKind::RequestHeaders => ResponseKind::RequestHeaders(headers()),
        EventKind::ResponseHeaders => ResponseKind::ResponseHeaders(headers()),
        EventKind::RequestBody => ResponseKind::RequestBody(body()),
        EventKind::ResponseBody => ResponseKind::ResponseBody(body()),
        EventKind::RequestTrailers => ResponseKind::RequestTrailers(TrailersResponse::default()),
        EventKind::ResponseTrailers => ResponseKind::ResponseTrailers(TrailersResponse::default()),
    }
}

/// Compile a mutation set into Envoy's set/remove lists.
pub fn header_mutation(mutations: &MutationSet) -> HeaderMutation {
    let compiled = mutations.compile();
    HeaderMutation {
        set_headers: compiled
            .set
            .into_iter()
            .map(|(entry, action)| header_option(entry, action))
            .collect(),
        remove_headers: compiled.remove,
    }
}

fn header_option(entry: HeaderEntry, action: SetAction) -> HeaderValueOption {
    let append_action = match action {
        SetAction::Append => HeaderAppendAction::AppendIfExistsOrAdd,
        SetAction::Overwrite => HeaderAppendAction::OverwriteIfExistsOrAdd,
    };
    HeaderValueOption {
        header: Some(HeaderValue {
            key: entry.key,
            value: entry.value,
            raw_value: Vec::new(),
        }),
        append_action: append_action as i32,
        keep_empty_value: true,
    }
}

/// [`ProcessingStream`] over a tonic request stream and a response channel.
pub struct TonicProcessingStream<S> {
    inbound: S,
    outbound: mpsc::Sender<Result<ProcessingResponse, Status>>,
}

impl<S> TonicProcessingStream<S> {
    pub fn new(inbound: S, outbound: mpsc::Sender<Result<ProcessingResponse, Status>>) -> Self {
        Self { inbound, outbound }
    }
}

#[async_trait]
impl<S> ProcessingStream for TonicProcessingStream<S>
where
    S: Stream<Item = Result<ProcessingRequest, Status>> + Unpin + Send,
{
    async fn recv(&mut self) -> StreamResult<Option<IncomingEvent>> {
        match self.inbound.next().await {
            Some(Ok(request)) => event_from_request(request).map(Some),
            Some(Err(status)) => Err(StreamError::Receive(status.to_string())),
            None => Ok(None),
        }
    }

    async fn send(&mut self, reply: Reply) -> StreamResult<()> {
        self.outbound
            .send(Ok(response_from_reply(reply)))
            .await
            .map_err(|_| StreamError::Send("response stream closed by proxy".to_string()))
    }
}

fn status_for(error: &StreamError) -> Status {
    match error {
        StreamError::InvalidMessage(msg) => Status::invalid_argument(msg.clone()),
        other => Status::unavailable(other.to_string()),
    }
}

/// The `ExternalProcessor` gRPC service.
#[derive(Clone)]
pub struct ExtProcService {
    dispatcher: StreamDispatcher,
}

impl ExtProcService {
    pub fn new(processor: Arc<dyn HeaderProcessor>) -> Self {
        Self {
            dispatcher: StreamDispatcher::new(processor),
        }
    }

    pub fn into_server(self) -> ExternalProcessorServer<Self> {
        ExternalProcessorServer::new(self)
    }

    /// Spawn the dispatch task for one stream and return its response stream.
    pub fn spawn_stream<S>(
        &self,
        inbound: S,
        span: tracing::Span,
    ) -> ReceiverStream<Result<ProcessingResponse, Status>>
    where
        S: Stream<Item = Result<ProcessingRequest, Status>> + Unpin + Send + 'static,
    {
        // Capacity 1 keeps the stream in lock-step with the proxy.
        let (tx, rx) = mpsc::channel(1);
        let dispatcher = self.dispatcher.clone();

        tokio::spawn(
            async move {
                let mut stream = TonicProcessingStream::new(inbound, tx.clone());
                match dispatcher.run(&mut stream).await {
                    Ok(StreamClose::Clean) => tracing::debug!("ext_proc stream finished"),
                    Err(e) => {
                        tracing::warn!(error = %e, "ext_proc stream terminated");
                        // The proxy may already be gone; nothing else to do then.
                        let _ = tx.send(Err(status_for(&e))).await;
                    }
                }
            }
            .instrument(span),
        );

        ReceiverStream::new(rx)
    }
}

#[tonic::async_trait]
impl ExternalProcessor for ExtProcService {
    type ProcessStream = ReceiverStream<Result<ProcessingResponse, Status>>;

    async fn process(
        &self,
        request: Request<Streaming<ProcessingRequest>>,
    ) -> Result<Response<Self::ProcessStream>, Status> {
        let peer = request.remote_addr();
        let span = tracing_setup::create_stream_span(&Uuid::new_v4().to_string(), peer);
        span.in_scope(|| tracing::debug!("accepted ext_proc stream"));

        Ok(Response::new(self.spawn_stream(request.into_inner(), span)))
    }
}
