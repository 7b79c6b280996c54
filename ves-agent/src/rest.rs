// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Alert webhook front-end.
//!
//! `POST <path>` receives alert notifications and forwards each alert to
//! the event loop, answering only once the loop has processed it.
//! `GET /stats` exposes replicated-log debug counters. The handoff to the
//! loop never blocks: a full channel is an error, not a stall.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use base64::prelude::{Engine, BASE64_STANDARD};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use ves_common::header;
use ves_common::hyper_migration::Body;
use ves_state::StateStore;

use crate::config::AlertManagerConfig;
use crate::convert::{Alert, AlertData};
use crate::AgentError;

/// One alert on its way to the event loop, with the reply slot the
/// webhook handler waits on.
pub struct AlertMessage {
    pub alert: Alert,
    pub reply: oneshot::Sender<Result<(), AgentError>>,
}

struct ServerContext {
    path: String,
    /// Expected `Authorization` header value; `None` disables auth.
    authorization: Option<String>,
    alert_tx: mpsc::Sender<AlertMessage>,
    state: StateStore,
}

/// The webhook HTTP server, bound but not yet serving.
pub struct RestServer {
    listener: TcpListener,
    context: Arc<ServerContext>,
}

impl RestServer {
    pub async fn bind(
        config: &AlertManagerConfig,
        alert_tx: mpsc::Sender<AlertMessage>,
        state: StateStore,
    ) -> anyhow::Result<RestServer> {
        let listener = TcpListener::bind(&config.bind).await?;
        info!(bind = %config.bind, path = %config.path, "Alert receiver listening");
        let authorization = if config.user.is_empty() {
            None
        } else {
            let token = BASE64_STANDARD.encode(format!("{}:{}", config.user, config.password));
            Some(format!("Basic {token}"))
        };
        Ok(RestServer {
            listener,
            context: Arc::new(ServerContext {
                path: config.path.clone(),
                authorization,
                alert_tx,
                state,
            }),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop; runs until the task is dropped.
    pub async fn run(self) {
        loop {
            let (stream, remote) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Cannot accept connection");
                    continue;
                }
            };
            let context = Arc::clone(&self.context);
            tokio::spawn(async move {
                let served = hyper::server::conn::http1::Builder::new()
                    .serve_connection(
                        TokioIo::new(stream),
                        service_fn(move |request| handle(Arc::clone(&context), request)),
                    )
                    .await;
                if let Err(e) = served {
                    debug!(remote = %remote, error = %e, "Connection error");
                }
            });
        }
    }
}

async fn handle(
    context: Arc<ServerContext>,
    request: Request<Incoming>,
) -> Result<Response<Body>, Infallible> {
    let response = match (request.method(), request.uri().path()) {
        (&Method::POST, path) if path == context.path => handle_alerts(&context, request).await,
        (&Method::GET, "/stats") => handle_stats(&context),
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(response)
}

fn text_response(status: StatusCode, text: &str) -> Response<Body> {
    // Infallible: only a status and a body are set.
    #[allow(clippy::unwrap_used)]
    let response = Response::builder()
        .status(status)
        .body(Body::from(text.to_string()))
        .unwrap();
    response
}

fn handle_stats(context: &ServerContext) -> Response<Body> {
    let stats = serde_json::json!({"raft": context.state.stats()});
    let body = serde_json::to_string_pretty(&stats).unwrap_or_else(|_| "{}".to_string());
    // Infallible: static headers only.
    #[allow(clippy::unwrap_used)]
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONTENT_TYPE, header::APPLICATION_JSON)
        .body(Body::from(body))
        .unwrap();
    response
}

async fn handle_alerts(
    context: &ServerContext,
    request: Request<Incoming>,
) -> Response<Body> {
    if let Some(expected) = &context.authorization {
        let provided = request
            .headers()
            .get(hyper::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected.as_str()) {
            warn!("Rejecting alert notification with bad credentials");
            return text_response(StatusCode::UNAUTHORIZED, "unauthorized");
        }
    }

    let content_type = request
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if !content_type.starts_with(header::APPLICATION_JSON_STR) {
        error!(content_type = %content_type, "Content type not managed");
        return text_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("content-type {content_type} not managed"),
        );
    }

    let bytes = match request.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!(error = %e, "Cannot read request body");
            return text_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };
    let data: AlertData = match serde_json::from_slice(&bytes) {
        Ok(data) => data,
        Err(e) => {
            error!(error = %e, "Bad request");
            return text_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    for alert in data.alerts {
        let alertname = alert
            .labels
            .get("alertname")
            .cloned()
            .unwrap_or_default();
        let (reply_tx, reply_rx) = oneshot::channel();
        let message = AlertMessage {
            alert,
            reply: reply_tx,
        };
        // Non blocking write, to avoid a dead lock situation.
        if context.alert_tx.try_send(message).is_err() {
            warn!(alert = %alertname, "Alert could not be sent to a channel");
            return text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("alert {alertname} could not be sent to a channel"),
            );
        }
        match reply_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "Cannot process alert");
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
            }
            Err(_) => {
                error!("Alert processing aborted");
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, "alert processing aborted");
            }
        }
    }
    text_response(StatusCode::OK, "")
}
