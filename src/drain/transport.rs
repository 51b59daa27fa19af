//! Client transport for the drain protocol.
//!
//! # Responsibilities
//! - Send drain and decommission requests to a node's admin endpoint
//! - Decode the NDJSON response stream into [`DrainResponse`]s
//! - Tell a connection closed by the peer apart from other failures
//!
//! # Design Decisions
//! - A node that stops while answering a shutdown drain simply drops the
//!   connection, so "closed connection" is classified rather than treated
//!   as a generic I/O error

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::io;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use thiserror::Error;
use url::Url;

use crate::drain::protocol::{DrainFrame, DrainRequest, DrainResponse, FrameDecoder, FrameError};

pub type DrainStream = BoxStream<'static, Result<DrainResponse, TransportError>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("connection closed by node: {0}")]
    ClosedConnection(String),
    #[error("node answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("node reported: {0}")]
    Remote(String),
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("invalid drain stream: {0}")]
    Protocol(#[from] FrameError),
    #[error("invalid node url: {0}")]
    Url(#[from] url::ParseError),
}

impl TransportError {
    pub fn is_closed_connection(&self) -> bool {
        matches!(self, TransportError::ClosedConnection(_))
    }
}

/// Request/response channel to one node.
pub trait DrainTransport: Send + Sync {
    /// Send a drain request and return its response stream.
    fn drain(&self, request: DrainRequest) -> BoxFuture<'_, Result<DrainStream, TransportError>>;

    /// Ask the node to leave the cluster membership.
    fn decommission(&self) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Drain transport over the node's HTTP admin endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
    api_key: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, TransportError> {
        Ok(Self {
            client: reqwest::Client::new(),
            base: Url::parse(base_url)?,
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    async fn post(&self, path: &str, request: Option<&DrainRequest>) -> Result<reqwest::Response, TransportError> {
        let url = self.base.join(path)?;
        let mut builder = self.client.post(url.clone()).bearer_auth(&self.api_key);
        if let Some(request) = request {
            builder = builder.json(request);
        }

        let response = builder.send().await.map_err(|e| classify_send_error(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

impl DrainTransport for HttpTransport {
    fn drain(&self, request: DrainRequest) -> BoxFuture<'_, Result<DrainStream, TransportError>> {
        Box::pin(async move {
            let response = self.post("admin/drain", Some(&request)).await?;
            Ok(decode_drain_stream(response.bytes_stream()))
        })
    }

    fn decommission(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.post("admin/decommission", None).await?;
            Ok(())
        })
    }
}

/// Turn an NDJSON byte stream into drain responses.
pub fn decode_drain_stream<S, B>(body: S) -> DrainStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    struct Decoding<S> {
        body: S,
        decoder: FrameDecoder,
        pending: VecDeque<Result<DrainResponse, TransportError>>,
        done: bool,
    }

    let state = Decoding {
        body: Box::pin(body),
        decoder: FrameDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => match state.decoder.push(chunk.as_ref()) {
                    Ok(frames) => state.pending.extend(frames.into_iter().map(frame_to_response)),
                    Err(e) => {
                        state.done = true;
                        state.pending.push_back(Err(e.into()));
                    }
                },
                Some(Err(e)) => {
                    state.done = true;
                    state.pending.push_back(Err(classify_stream_error(e)));
                }
                None => {
                    state.done = true;
                    if let Err(e) = state.decoder.finish() {
                        state.pending.push_back(Err(e.into()));
                    }
                }
            }
        }
    })
    .boxed()
}

fn frame_to_response(frame: DrainFrame) -> Result<DrainResponse, TransportError> {
    match frame {
        DrainFrame::Progress { on } => Ok(DrainResponse { on }),
        DrainFrame::Error { message } => Err(TransportError::Remote(message)),
    }
}

fn classify_send_error(url: &Url, err: reqwest::Error) -> TransportError {
    if is_closed_connection(&err) {
        TransportError::ClosedConnection(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect {
            url: url.to_string(),
            source: Box::new(err),
        }
    } else {
        TransportError::Request(err)
    }
}

fn classify_stream_error(err: reqwest::Error) -> TransportError {
    if is_closed_connection(&err) {
        TransportError::ClosedConnection(err.to_string())
    } else {
        TransportError::Request(err)
    }
}

/// Walk the error chain looking for a connection the peer closed.
pub fn is_closed_connection(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() || hyper_err.is_closed() || hyper_err.is_canceled() {
                return true;
            }
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        current = e.source();
    }
    false
}
