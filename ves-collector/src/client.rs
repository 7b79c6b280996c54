// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use hyper::Method;
use serde::Serialize;
use tracing::{debug, warn};

use ves_common::connector::Connector;
use ves_common::hyper_migration::{self, Body};
use ves_common::{header, Endpoint, HttpClient, HttpResponse};
use ves_event::{EventSchema, VesResponse};

use crate::ClientError;

const USER_AGENT: &str = concat!("ves-agent/", env!("CARGO_PKG_VERSION"));

/// HTTP client used to talk to one VES event listener.
///
/// The endpoint carries the base path (`…/eventListener/v5`) and basic-auth
/// credentials; `post_json` joins the query path onto it. When a schema is
/// provided every outgoing payload is validated before it is sent.
pub struct VesClient {
    endpoint: Endpoint,
    client: HttpClient,
    schema: Option<EventSchema>,
    max_body_size: usize,
}

impl VesClient {
    pub fn new(
        endpoint: Endpoint,
        connector: Connector,
        schema: Option<EventSchema>,
        max_body_size: usize,
    ) -> Self {
        VesClient {
            endpoint,
            client: hyper_migration::new_client(connector),
            schema,
            max_body_size,
        }
    }

    /// Serialise `payload`, validate it, and POST it to `path` (joined onto
    /// the endpoint's base path). Returns the decoded reply envelope.
    pub async fn post_json<T: Serialize>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<VesResponse, ClientError> {
        if let Some(schema) = &self.schema {
            debug!("Validating request payload with schema before sending it");
            schema.validate(payload)?;
        }

        let body = serde_json::to_vec(payload)?;
        if self.max_body_size > 0 && body.len() > self.max_body_size {
            warn!(
                size = body.len(),
                max = self.max_body_size,
                "Request body length exceeds the configured maximum"
            );
            return Err(ClientError::BodyTooLarge {
                size: body.len(),
                max: self.max_body_size,
            });
        }

        let request = self
            .endpoint
            .to_request_builder_with_path(USER_AGENT, path)
            .map_err(ClientError::Build)?
            .method(Method::POST)
            .header(hyper::header::CONTENT_TYPE, header::APPLICATION_JSON)
            .header(hyper::header::ACCEPT, header::APPLICATION_JSON)
            .body(Body::from(body))
            .map_err(|e| ClientError::Build(e.into()))?;

        debug!(url = %request.uri(), "Send POST");
        let timeout = Duration::from_millis(self.endpoint.timeout_ms);
        let response = match tokio::time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => hyper_migration::into_response(response),
            Ok(Err(e)) => return Err(ClientError::Network(e)),
            Err(_) => return Err(ClientError::Timeout),
        };

        decode_response(response).await
    }
}

/// Transform an HTTP response into a [`VesResponse`], or into the error it
/// carries. A malformed JSON body on a success status is tolerated and
/// yields an empty reply envelope.
async fn decode_response(response: HttpResponse) -> Result<VesResponse, ClientError> {
    let status = response.status();
    let is_json = response
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(header::APPLICATION_JSON_STR));

    let mut reply = VesResponse::default();
    if is_json {
        let bytes = hyper_migration::read_body_bytes(response.into_body())
            .await
            .map_err(ClientError::Body)?;
        match serde_json::from_slice(&bytes) {
            Ok(decoded) => reply = decoded,
            Err(e) => warn!(error = %e, "Could not decode JSON response"),
        }
        debug!(commands = reply.command_list.len(), "Got response");
    }

    if !status.is_success() {
        if let Some(error) = reply.first_error() {
            return Err(ClientError::Protocol(error.clone()));
        }
        return Err(ClientError::Http(status));
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;
    use serde_json::json;
    use ves_common::connector::build_connector;

    fn client_for(server: &MockServer, schema: Option<EventSchema>, max_body: usize) -> VesClient {
        let endpoint = Endpoint::from_url(server.url("/eventListener/v5").parse().unwrap())
            .with_basic_auth("user", "pass");
        VesClient::new(endpoint, build_connector(None).unwrap(), schema, max_body)
    }

    #[tokio::test]
    async fn test_post_json_sends_auth_and_content_type() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("POST")
                    .path("/eventListener/v5/eventBatch")
                    .header("content-type", "application/json")
                    .header("accept", "application/json")
                    .header("authorization", "Basic dXNlcjpwYXNz");
                then.status(202);
            })
            .await;

        let client = client_for(&server, None, 0);
        let reply = client
            .post_json("eventBatch", &json!({"eventList": []}))
            .await
            .unwrap();
        assert!(reply.command_list.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_command_list_decoded() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({"commandList": [
                        {"commandType": "heartbeatIntervalChange", "heartbeatInterval": 120}
                    ]}));
            })
            .await;

        let client = client_for(&server, None, 0);
        let reply = client.post_json("", &json!({})).await.unwrap();
        assert_eq!(reply.command_list.len(), 1);
    }

    #[tokio::test]
    async fn test_error_envelope_surfaces_as_protocol_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST");
                then.status(400)
                    .header("content-type", "application/json")
                    .json_body(json!({"requestError": {"serviceException": {
                        "messageId": "SVC0002",
                        "text": "Bad parameter $1",
                        "variables": ["priority"]
                    }}}));
            })
            .await;

        let client = client_for(&server, None, 0);
        let err = client.post_json("", &json!({})).await.unwrap_err();
        match err {
            ClientError::Protocol(e) => {
                assert_eq!(e.to_string(), "SVC0002: Bad parameter priority")
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_status_without_envelope_is_generic() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST");
                then.status(503);
            })
            .await;

        let client = client_for(&server, None, 0);
        let err = client.post_json("", &json!({})).await.unwrap_err();
        assert!(matches!(err, ClientError::Http(status) if status.as_u16() == 503));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_json_reply_is_tolerated() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST");
                then.status(200)
                    .header("content-type", "application/json")
                    .body("{not json");
            })
            .await;

        let client = client_for(&server, None, 0);
        let reply = client.post_json("", &json!({})).await.unwrap();
        assert!(reply.command_list.is_empty());
        assert!(!reply.is_error());
    }

    #[tokio::test]
    async fn test_body_too_large_refused_before_sending() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("POST");
                then.status(200);
            })
            .await;

        let client = client_for(&server, None, 8);
        let err = client
            .post_json("", &json!({"event": "much too large"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::BodyTooLarge { .. }));
        assert!(!err.is_retryable());
        assert_eq!(mock.hits_async().await, 0);
    }

    #[tokio::test]
    async fn test_schema_invalid_refused_before_sending() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("POST");
                then.status(200);
            })
            .await;

        let schema = EventSchema::from_value(json!({
            "type": "object", "required": ["event"]
        }))
        .unwrap();
        let client = client_for(&server, Some(schema), 0);
        let err = client.post_json("", &json!({"other": 1})).await.unwrap_err();
        assert!(matches!(err, ClientError::Schema(_)));
        assert_eq!(mock.hits_async().await, 0);
    }
}
