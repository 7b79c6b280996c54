// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Thin aliases and adapters over the hyper 1.x / hyper-util client stack.

use core::fmt;
use std::convert::Infallible;

use http_body_util::BodyExt;
use hyper::body::Body as _;
use hyper::body::{Bytes, Frame, Incoming, SizeHint};
use pin_project::pin_project;

use crate::connector::Connector;

pub type GenericHttpClient<C> = hyper_util::client::legacy::Client<C, Body>;
pub type HttpResponse = hyper::Response<Body>;
pub type HttpRequest = hyper::Request<Body>;
pub type ClientError = hyper_util::client::legacy::Error;

/// Create a hyper client over the given connector. Connections are pooled
/// and reused, which fits the agent's periodic posting cadence.
pub fn new_client(connector: Connector) -> GenericHttpClient<Connector> {
    hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::default())
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .build(connector)
}

pub fn into_response(response: hyper::Response<Incoming>) -> HttpResponse {
    response.map(Body::Incoming)
}

/// Collect the full response body into contiguous bytes.
pub async fn read_body_bytes(body: Body) -> Result<Bytes, Error> {
    Ok(body.collect().await?.to_bytes())
}

#[derive(Debug)]
pub enum Error {
    Hyper(hyper::Error),
    Legacy(hyper_util::client::legacy::Error),
    Infallible(Infallible),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Hyper(e) => write!(f, "hyper error: {e}"),
            Error::Legacy(e) => write!(f, "hyper legacy error: {e}"),
            Error::Infallible(e) => match *e {},
        }
    }
}

impl std::error::Error for Error {}

impl From<hyper_util::client::legacy::Error> for Error {
    fn from(value: hyper_util::client::legacy::Error) -> Self {
        Self::Legacy(value)
    }
}

/// Request/response body: either buffered bytes, nothing, or a streaming
/// body handed over by hyper.
#[pin_project(project = BodyProj)]
#[derive(Debug)]
pub enum Body {
    Single(#[pin] http_body_util::Full<Bytes>),
    Empty(#[pin] http_body_util::Empty<Bytes>),
    Incoming(#[pin] Incoming),
}

impl Body {
    pub fn empty() -> Self {
        Body::Empty(http_body_util::Empty::new())
    }

    pub fn from_bytes(bytes: Bytes) -> Self {
        Body::Single(http_body_util::Full::new(bytes))
    }

    pub fn incoming(incoming: Incoming) -> Self {
        Body::Incoming(incoming)
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::empty()
    }
}

impl From<Vec<u8>> for Body {
    fn from(s: Vec<u8>) -> Self {
        Body::from_bytes(Bytes::from(s))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::from_bytes(Bytes::from(s))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::from_bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl hyper::body::Body for Body {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            BodyProj::Single(pin) => pin.poll_frame(cx).map_err(Error::Infallible),
            BodyProj::Empty(pin) => pin.poll_frame(cx).map_err(Error::Infallible),
            BodyProj::Incoming(pin) => pin.poll_frame(cx).map_err(Error::Hyper),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Body::Single(body) => body.is_end_stream(),
            Body::Empty(body) => body.is_end_stream(),
            Body::Incoming(body) => body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Body::Single(body) => body.size_hint(),
            Body::Empty(body) => body.size_hint(),
            Body::Incoming(body) => body.size_hint(),
        }
    }
}
