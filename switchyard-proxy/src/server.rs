//! Server module for handling incoming connections and applying target rewrites.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE, HOST, LOCATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use switchyard_core::{Redirect, SharedTargetTable, Url};

use crate::upstream::{self, UpstreamClient};

type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// State shared by every connection.
pub struct AppState {
    pub table: SharedTargetTable,
    pub client: UpstreamClient,
}

/// Starts the proxy server on the given address.
pub async fn start_server(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    loop {
        let (stream, remote) = listener.accept().await?;
        let state = Arc::clone(&state);

        tokio::task::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| handle_request(req, Arc::clone(&state)));
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(%remote, error = %err, "error serving connection");
            }
        });
    }
}

/// Answers with a redirect or forwards to the target, depending on its mode.
async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<ProxyBody>, Infallible> {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
        .unwrap_or_default()
        .to_owned();
    let request_target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let request_url = match Url::from_request(&host, request_target) {
        Ok(url) => url,
        Err(err) => {
            debug!(error = %err, "rejecting request path");
            return Ok(text_response(StatusCode::BAD_REQUEST, "invalid request path"));
        }
    };

    // Selection is the route table's job; this front end serves the first target.
    let Some(target) = state.table.first() else {
        return Ok(text_response(StatusCode::BAD_GATEWAY, "no target registered"));
    };

    if let Some(redirect) = target.redirect(&request_url) {
        return Ok(redirect_response(&redirect));
    }

    let client = target.transport::<UpstreamClient>().unwrap_or(&state.client);
    match upstream::forward(&target, client, req, &request_url).await {
        Ok(response) => Ok(response.map(|body| body.boxed())),
        Err(err) => {
            warn!(service = %target.service, url = %target.url(), error = %err, "forwarding failed");
            Ok(text_response(StatusCode::BAD_GATEWAY, "upstream unavailable"))
        }
    }
}

fn redirect_response(redirect: &Redirect) -> Response<ProxyBody> {
    let location = redirect.location.to_string();
    let Ok(value) = HeaderValue::from_str(&location) else {
        warn!(%location, "redirect location is not a valid header value");
        return text_response(StatusCode::BAD_GATEWAY, "invalid redirect location");
    };

    // TargetBuilder only admits 300..=399, so the fallback is never taken.
    debug_assert!((300..=399).contains(&redirect.code));
    let mut response = Response::new(empty());
    *response.status_mut() = StatusCode::from_u16(redirect.code).unwrap_or(StatusCode::FOUND);
    response.headers_mut().insert(LOCATION, value);
    response
}

fn text_response(status: StatusCode, message: &'static str) -> Response<ProxyBody> {
    let mut response = Response::new(full(message));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

fn empty() -> ProxyBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

fn full(message: &'static str) -> ProxyBody {
    Full::new(Bytes::from_static(message.as_bytes()))
        .map_err(|never| match never {})
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::TargetBuilder;

    #[test]
    fn redirect_response_sets_status_and_location() {
        let target = TargetBuilder::new("legacy", "https://$host$path")
            .redirect_code(308)
            .build()
            .unwrap();
        let request = Url::from_request("example.com", "/a/b?x=1").unwrap();
        let redirect = target.redirect(&request).unwrap();

        let response = redirect_response(&redirect);
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(
            response.headers()[LOCATION],
            "https://example.com/a/b?x=1"
        );
    }

    #[test]
    fn text_response_is_plain_text() {
        let response = text_response(StatusCode::BAD_GATEWAY, "no target registered");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
