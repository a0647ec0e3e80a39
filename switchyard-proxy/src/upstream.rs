//! Forwarding requests to a target endpoint.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use hyper::body::{Body, Bytes, Frame, Incoming, SizeHint};
use hyper::header::{HeaderValue, HOST};
use hyper::http::uri::InvalidUri;
use hyper::{Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tracing::debug;

use switchyard_core::metrics::SharedCounter;
use switchyard_core::{ForwardPath, Target, Url};

/// Pooled HTTP/1.1 client used as the target transport.
pub type UpstreamClient = Client<HttpConnector, CountingBody<Incoming>>;

/// Body wrapper that adds the length of every data frame to a counter as it
/// streams, so chunked bodies are counted as well as sized ones.
pub struct CountingBody<B> {
    inner: B,
    counter: SharedCounter,
}

impl<B> CountingBody<B> {
    pub fn new(inner: B, counter: SharedCounter) -> Self {
        Self { inner, counter }
    }
}

impl<B> Body for CountingBody<B>
where
    B: Body<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, B::Error>>> {
        let this = &mut *self;
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &polled {
            if let Some(data) = frame.data_ref() {
                this.counter.increment(data.len() as u64);
            }
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Errors raised while forwarding a request.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid upstream uri {uri}: {source}")]
    InvalidUri { uri: String, source: InvalidUri },

    #[error("invalid host header {0:?}")]
    InvalidHost(String),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

/// Creates the client shared by targets that carry no transport of their own.
pub fn build_client() -> UpstreamClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// Joins the adjusted request path onto the endpoint path and combines queries.
pub fn upstream_url(endpoint: &Url, adjusted: &ForwardPath, raw_query: &str) -> Url {
    let raw_path = if endpoint.raw_path.is_empty() && adjusted.raw_path.is_empty() {
        String::new()
    } else {
        join_paths(&endpoint.escaped_path(), &adjusted.escaped_path())
    };
    let raw_query = match (endpoint.raw_query.as_str(), raw_query) {
        ("", query) | (query, "") => query.to_owned(),
        (base, query) => format!("{base}&{query}"),
    };
    Url {
        scheme: endpoint.scheme.clone(),
        host: endpoint.host.clone(),
        path: join_paths(&endpoint.path, &adjusted.path),
        raw_path,
        raw_query,
    }
}

fn join_paths(base: &str, suffix: &str) -> String {
    match (base.ends_with('/'), suffix.starts_with('/')) {
        (true, true) => format!("{base}{}", &suffix[1..]),
        (false, false) => format!("{base}/{suffix}"),
        _ => format!("{base}{suffix}"),
    }
}

/// Sends `req` to `target`, rewriting its URI and Host header.
///
/// Latency lands on the target timer. Request bytes are counted on `tx` as
/// they are sent and response bytes on `rx` as the caller reads them.
pub async fn forward(
    target: &Target,
    client: &UpstreamClient,
    req: Request<Incoming>,
    request_url: &Url,
) -> Result<Response<CountingBody<Incoming>>, ForwardError> {
    let adjusted = target.forward_path(request_url);
    let upstream = upstream_url(target.url(), &adjusted, &request_url.raw_query);
    let uri_string = upstream.to_string();
    let uri: Uri = uri_string.parse().map_err(|source| ForwardError::InvalidUri {
        uri: uri_string.clone(),
        source,
    })?;

    let host = target.outgoing_host(&request_url.host);
    let host_value =
        HeaderValue::from_str(host).map_err(|_| ForwardError::InvalidHost(host.to_owned()))?;
    let mut req = req.map(|body| CountingBody::new(body, target.tx_counter.clone()));
    *req.uri_mut() = uri;
    req.headers_mut().insert(HOST, host_value);

    debug!(service = %target.service, upstream = %uri_string, "forwarding request");
    let started = Instant::now();
    let result = client.request(req).await;
    target.timer.record(started.elapsed());
    let response = result?;
    Ok(response.map(|body| CountingBody::new(body, target.rx_counter.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::collections::VecDeque;
    use std::convert::Infallible;
    use std::sync::Arc;
    use switchyard_core::metrics::AtomicCounter;

    /// Streams its chunks one frame at a time without a known length.
    struct Chunked(VecDeque<Bytes>);

    impl Body for Chunked {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
            Poll::Ready(self.0.pop_front().map(|chunk| Ok(Frame::data(chunk))))
        }
    }

    #[tokio::test]
    async fn counts_bytes_of_unsized_bodies() {
        let chunks = Chunked(VecDeque::from(vec![
            Bytes::from_static(b"hello "),
            Bytes::from_static(b"streamed "),
            Bytes::from_static(b"world"),
        ]));
        assert!(chunks.size_hint().exact().is_none());

        let counter = Arc::new(AtomicCounter::new());
        let body = CountingBody::new(chunks, counter.clone());
        let collected = body.collect().await.unwrap().to_bytes();

        assert_eq!(collected.len(), 20);
        assert_eq!(counter.get(), 20);
    }

    fn endpoint(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn joins_with_a_single_slash() {
        assert_eq!(join_paths("/base/", "/x"), "/base/x");
        assert_eq!(join_paths("/base", "x"), "/base/x");
        assert_eq!(join_paths("/base", "/x"), "/base/x");
        assert_eq!(join_paths("", "/x"), "/x");
    }

    #[test]
    fn appends_adjusted_path_to_endpoint() {
        let adjusted = ForwardPath {
            path: "/v2/users".into(),
            raw_path: String::new(),
        };
        let url = upstream_url(&endpoint("http://10.0.0.1:8080/svc/"), &adjusted, "page=2");
        assert_eq!(url.to_string(), "http://10.0.0.1:8080/svc/v2/users?page=2");
    }

    #[test]
    fn keeps_encoded_characters_and_merges_queries() {
        let adjusted = ForwardPath {
            path: "/a/b".into(),
            raw_path: "/a%2Fb".into(),
        };
        let url = upstream_url(&endpoint("http://backend/?k=v"), &adjusted, "x=1");
        assert_eq!(url.path, "/a/b");
        assert_eq!(url.raw_path, "/a%2Fb");
        assert_eq!(url.to_string(), "http://backend/a%2Fb?k=v&x=1");
    }
}
