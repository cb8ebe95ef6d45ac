//! HTTP Transport
//!
//! One message per HTTP request: the request body is the encoded request,
//! the response body is the encoded response.

use std::future::IntoFuture;
use std::io::Cursor;
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use bytes::Bytes;

use crate::dispatcher::Dispatcher;
use crate::error::{NetKvError, Result};
use crate::storage::Store;

use super::StopSignal;

/// Router serving `POST /`
pub fn router<S: Store + ?Sized>(dispatcher: Dispatcher<S>) -> Router {
    Router::new()
        .route("/", post(handle_message::<S>))
        .with_state(dispatcher)
}

/// Dispatch one HTTP request
///
/// A dispatcher error becomes a 500 with an empty body.
async fn handle_message<S: Store + ?Sized>(
    State(dispatcher): State<Dispatcher<S>>,
    body: Bytes,
) -> Response {
    let outcome = tokio::task::spawn_blocking(move || {
        let mut output = Vec::new();
        dispatcher
            .serve(&mut Cursor::new(body), &mut output)
            .map(|()| output)
    })
    .await;

    match outcome {
        Ok(Ok(output)) => (StatusCode::OK, output).into_response(),
        Ok(Err(e)) => {
            tracing::warn!("Error serving HTTP request: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            tracing::warn!("HTTP dispatch task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serve HTTP on an already bound listener until `stop` fires
///
/// Returns `NetKvError::Stopped` within one `poll_interval` of the stop,
/// without waiting for requests in flight; those are drained on a
/// detached thread that owns the runtime. Any other error means the
/// runtime or the listener failed.
pub(crate) fn serve<S: Store + ?Sized>(
    listener: TcpListener,
    dispatcher: Dispatcher<S>,
    stop: StopSignal,
    poll_interval: Duration,
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("netkv-http")
        .build()?;

    listener.set_nonblocking(true)?;
    let listener = {
        let _guard = runtime.enter();
        tokio::net::TcpListener::from_std(listener)?
    };

    // Stops accepting on the signal, then drains open connections
    let mut serving = runtime.spawn(
        axum::serve(listener, router(dispatcher))
            .with_graceful_shutdown(wait_for_stop(stop.clone(), poll_interval))
            .into_future(),
    );

    let finished = runtime.block_on(async {
        tokio::select! {
            _ = wait_for_stop(stop, poll_interval) => None,
            result = &mut serving => Some(result),
        }
    });

    match finished {
        Some(Ok(Ok(()))) => {}
        Some(Ok(Err(e))) => return Err(e.into()),
        Some(Err(e)) => {
            return Err(NetKvError::Protocol(format!("HTTP server task failed: {}", e)))
        }
        None => {
            let drain = thread::Builder::new()
                .name("netkv-http-drain".to_string())
                .spawn(move || {
                    if let Ok(Err(e)) = runtime.block_on(serving) {
                        tracing::debug!("HTTP drain ended with error: {}", e);
                    }
                });
            if let Err(e) = drain {
                tracing::warn!("Failed to start HTTP drain thread: {}", e);
            }
        }
    }

    Err(NetKvError::Stopped)
}

/// Resolves once `stop` fires, checking every `poll_interval`
async fn wait_for_stop(stop: StopSignal, poll_interval: Duration) {
    while !stop.is_stopped() {
        tokio::time::sleep(poll_interval).await;
    }
}
