// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::borrow::Cow;
use std::sync::{Mutex, MutexGuard};

use base64::prelude::{Engine, BASE64_STANDARD};

pub mod connector;
pub mod hyper_migration;
pub mod time;

pub type HttpClient = hyper_migration::GenericHttpClient<connector::Connector>;
pub type HttpRequestBuilder = hyper::http::request::Builder;
pub type HttpResponse = hyper_migration::HttpResponse;

/// Extension trait for `Mutex` to provide a method that acquires a lock,
/// panicking if the lock is poisoned.
///
/// Avoids scattering `#[allow(clippy::unwrap_used)]` over every lock site.
pub trait MutexExt<T> {
    fn lock_or_panic(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[inline(always)]
    #[track_caller]
    fn lock_or_panic(&self) -> MutexGuard<'_, T> {
        #[allow(clippy::unwrap_used)]
        self.lock().unwrap()
    }
}

pub mod header {
    #![allow(clippy::declare_interior_mutable_const)]
    use hyper::http::HeaderValue;

    pub const APPLICATION_JSON_STR: &str = "application/json";

    pub const APPLICATION_JSON: HeaderValue = HeaderValue::from_static(APPLICATION_JSON_STR);
}

/// One HTTP(S) endpoint plus the credentials and timeout used to reach it.
///
/// The uri carries scheme, authority and base path; credentials are sent as
/// HTTP basic auth when present.
#[derive(Clone, Debug)]
pub struct Endpoint {
    pub url: hyper::Uri,
    pub user: Option<Cow<'static, str>>,
    pub password: Option<Cow<'static, str>>,
    pub timeout_ms: u64,
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint {
            url: hyper::Uri::default(),
            user: None,
            password: None,
            timeout_ms: Self::DEFAULT_TIMEOUT,
        }
    }
}

impl Endpoint {
    /// Default value for the timeout field in milliseconds.
    pub const DEFAULT_TIMEOUT: u64 = 30_000;

    pub fn from_url(url: hyper::Uri) -> Endpoint {
        Endpoint {
            url,
            ..Default::default()
        }
    }

    pub fn with_basic_auth(
        mut self,
        user: impl Into<Cow<'static, str>>,
        password: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Set a custom timeout for this endpoint. Pass 0 to keep the default.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        if timeout_ms > 0 {
            self.timeout_ms = timeout_ms;
        }
        self
    }

    fn authorization(&self) -> Option<String> {
        let user = self.user.as_deref()?;
        let password = self.password.as_deref().unwrap_or_default();
        let token = BASE64_STANDARD.encode(format!("{user}:{password}"));
        Some(format!("Basic {token}"))
    }

    /// Return a request builder targeting this endpoint, with the user agent
    /// and basic auth headers already applied.
    pub fn to_request_builder(&self, user_agent: &str) -> HttpRequestBuilder {
        let mut builder = hyper::Request::builder()
            .uri(self.url.clone())
            .header(hyper::header::USER_AGENT, user_agent);
        if let Some(auth) = self.authorization() {
            builder = builder.header(hyper::header::AUTHORIZATION, auth);
        }
        builder
    }

    /// Same as [`Endpoint::to_request_builder`] but with `path` joined onto
    /// the endpoint's base path.
    pub fn to_request_builder_with_path(
        &self,
        user_agent: &str,
        path: &str,
    ) -> anyhow::Result<HttpRequestBuilder> {
        let mut parts = self.url.clone().into_parts();
        let base = self
            .url
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("");
        let joined = join_path(base, path);
        parts.path_and_query = Some(joined.parse()?);
        let url = hyper::Uri::from_parts(parts)?;
        let mut builder = hyper::Request::builder()
            .uri(url)
            .header(hyper::header::USER_AGENT, user_agent);
        if let Some(auth) = self.authorization() {
            builder = builder.header(hyper::header::AUTHORIZATION, auth);
        }
        Ok(builder)
    }
}

/// Join two uri path segments with exactly one `/` between them.
pub fn join_path(base: &str, tail: &str) -> String {
    let tail = tail.trim_start_matches('/');
    if tail.is_empty() {
        return base.to_string();
    }
    let base = base.trim_end_matches('/');
    format!("{base}/{tail}")
}
