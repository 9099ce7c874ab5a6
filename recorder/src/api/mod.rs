use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use hyper::{server::conn::Http, Body, Request, Response, StatusCode};
use routerify::ext::RequestExt;
use routerify::{RequestInfo, RequestServiceBuilder, Router};
use serde_json::json;
use tokio::net::TcpSocket;
use tokio::select;

use crate::global::GlobalState;

use self::error::{ApiError, Result};
use self::macros::make_response;

pub mod error;
mod macros;
mod recordings;
mod webhooks;

async fn error_handler(
    err: Box<(dyn std::error::Error + Send + Sync + 'static)>,
    info: RequestInfo,
) -> Response<Body> {
    match err.downcast::<ApiError>() {
        Ok(err) => {
            if err.status().is_server_error() {
                tracing::error!(error = %err, "http error");
            } else {
                tracing::debug!(error = %err, "http error");
            }

            (*err).into()
        }
        Err(err) => {
            tracing::error!(error = %err, info = ?info, "unhandled http error");
            make_response!(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "message": "Internal Server Error", "success": false })
            )
        }
    }
}

/// Fetches the global state a handler runs against.
fn global_state(req: &Request<Body>) -> Result<Arc<GlobalState>> {
    req.data::<Weak<GlobalState>>()
        .and_then(Weak::upgrade)
        .ok_or(ApiError::InternalServer("global state dropped"))
}

async fn welcome(_req: Request<Body>) -> Result<Response<Body>> {
    Ok(Response::new(Body::from("Welcome to CGC")))
}

async fn health_check(_req: Request<Body>) -> Result<Response<Body>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Body::empty())
        .map_err(|_| ApiError::InternalServer("failed to build response"))
}

pub fn routes(global: &Arc<GlobalState>) -> Router<Body, ApiError> {
    // A weak reference, so open keep-alive connections don't block shutdown.
    let weak = Arc::downgrade(global);
    Router::builder()
        .data(weak)
        .err_handler_with_info(error_handler)
        .get("/", welcome)
        .get("/health-check", health_check)
        .post("/recordings/start", recordings::start)
        .post("/recordings/stop", recordings::stop)
        .post("/recordings/webhooks", webhooks::receive)
        .build()
        .expect("failed to build router")
}

pub async fn run(global: Arc<GlobalState>) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], global.config.port));
    tracing::info!("listening on {}", addr);

    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;

    let request_service =
        RequestServiceBuilder::new(routes(&global)).expect("failed to build request service");

    loop {
        select! {
            _ = global.ctx.done() => {
                return Ok(());
            }
            r = listener.accept() => {
                let (socket, addr) = r?;
                tracing::debug!("accepted connection from {}", addr);

                tokio::spawn(Http::new().serve_connection(socket, request_service.build(addr)));
            }
        }
    }
}
