//! Execute GraphQL operations from an MCP tool

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::errors::ServerError;

/// Upper bound on how long a single GraphQL request may take
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The `data` member of a successful GraphQL response
pub type Data = Map<String, Value>;

/// Why a GraphQL request produced no data
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("GraphQL request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to send GraphQL request: {0}")]
    Transport(reqwest::Error),

    #[error("GraphQL endpoint responded with {0}")]
    Status(StatusCode),

    #[error("Failed to read GraphQL response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("GraphQL errors: {0}")]
    GraphQL(String),
}

/// A single GraphQL operation, built fresh for every call
#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub query: &'a str,
    pub variables: Option<Map<String, Value>>,
    pub headers: HeaderMap,
}

impl<'a> Request<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            variables: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_variables(self, variables: Map<String, Value>) -> Self {
        Self {
            variables: Some(variables),
            ..self
        }
    }

    /// Extra headers for this request only. These win over the client defaults.
    pub fn with_headers(self, headers: HeaderMap) -> Self {
        Self { headers, ..self }
    }
}

#[derive(Serialize)]
struct Body<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<&'a Map<String, Value>>,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    data: Option<Data>,
    #[serde(default)]
    errors: Option<Vec<ResponseError>>,
}

#[derive(Deserialize)]
struct ResponseError {
    message: Option<String>,
}

impl Response {
    fn into_result(self) -> Result<Option<Data>, Error> {
        match self.errors {
            Some(errors) if !errors.is_empty() => Err(Error::GraphQL(
                errors
                    .into_iter()
                    .map(|error| error.message.unwrap_or_else(|| "Unknown error".to_string()))
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
            _ => Ok(self.data),
        }
    }
}

/// Sends GraphQL operations to a single endpoint
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
    timeout: Duration,
}

impl Client {
    pub fn new(endpoint: Url, headers: HeaderMap) -> Result<Self, ServerError> {
        Self::with_timeout(endpoint, headers, REQUEST_TIMEOUT)
    }

    pub(crate) fn with_timeout(
        endpoint: Url,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<Self, ServerError> {
        let headers = {
            let mut defaults = HeaderMap::new();
            defaults.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            defaults.extend(headers);
            defaults
        };
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            endpoint,
            headers,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Execute the request, returning the `data` member of the response.
    ///
    /// `Ok(None)` means the endpoint answered without data. Any `errors` in the response turn the
    /// whole call into a failure, even when `data` is also present.
    pub async fn execute(&self, request: Request<'_>) -> Result<Option<Data>, Error> {
        let Request {
            query,
            variables,
            headers,
        } = request;
        let headers = self.headers_for(headers);
        let body = Body {
            query,
            variables: variables.as_ref().filter(|variables| !variables.is_empty()),
        };

        debug!(endpoint = %self.endpoint, query, "Sending GraphQL request");

        self.send(&body, headers)
            .await
            .inspect_err(|error| warn!(endpoint = %self.endpoint, %error, "GraphQL request failed"))
    }

    /// Client defaults overlaid with the request's own headers
    fn headers_for(&self, extra: HeaderMap) -> HeaderMap {
        let mut headers = self.headers.clone();
        headers.extend(extra);
        headers
    }

    async fn send(&self, body: &Body<'_>, headers: HeaderMap) -> Result<Option<Data>, Error> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|error| self.reqwest_error(error))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(Error::Status(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| self.reqwest_error(error))?;

        serde_json::from_slice::<Response>(&body)?.into_result()
    }

    fn reqwest_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::Timeout(self.timeout)
        } else {
            Error::Transport(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use reqwest::header::AUTHORIZATION;
    use rstest::rstest;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tracing_test::traced_test;

    const QUERY: &str = "query GetCharacter($id: ID!) { character(id: $id) { name } }";

    fn client(server: &mockito::Server) -> Client {
        Client::new(Url::parse(&server.url()).unwrap(), HeaderMap::new()).unwrap()
    }

    fn variables() -> Map<String, Value> {
        let mut variables = Map::new();
        variables.insert("id".to_string(), json!("1"));
        variables
    }

    #[tokio::test]
    async fn returns_data_and_sends_query_with_variables() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "query": QUERY,
                "variables": { "id": "1" },
            })))
            .with_status(200)
            .with_body(r#"{"data":{"character":{"name":"Rick Sanchez"}}}"#)
            .create_async()
            .await;

        let data = client(&server)
            .execute(Request::new(QUERY).with_variables(variables()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            data,
            json!({ "character": { "name": "Rick Sanchez" } })
                .as_object()
                .cloned()
        );
    }

    #[tokio::test]
    async fn omits_empty_variables() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::Json(json!({ "query": QUERY })))
            .with_status(200)
            .with_body(r#"{"data":{}}"#)
            .create_async()
            .await;

        client(&server)
            .execute(Request::new(QUERY).with_variables(Map::new()))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn request_headers_take_precedence() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("authorization", "Bearer request")
            .match_header("x-default", "kept")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(r#"{"data":{}}"#)
            .create_async()
            .await;

        let mut defaults = HeaderMap::new();
        defaults.insert(AUTHORIZATION, HeaderValue::from_static("Bearer default"));
        defaults.insert("x-default", HeaderValue::from_static("kept"));
        let client = Client::new(Url::parse(&server.url()).unwrap(), defaults).unwrap();

        let mut overrides = HeaderMap::new();
        overrides.insert(AUTHORIZATION, HeaderValue::from_static("Bearer request"));

        client
            .execute(Request::new(QUERY).with_headers(overrides))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[test]
    fn request_headers_replace_client_defaults() {
        let mut defaults = HeaderMap::new();
        defaults.insert(AUTHORIZATION, HeaderValue::from_static("Bearer default"));
        let client = Client::new(Url::parse("http://127.0.0.1:1").unwrap(), defaults).unwrap();
        let mut extra = HeaderMap::new();
        extra.insert(AUTHORIZATION, HeaderValue::from_static("Bearer request"));

        let headers = client.headers_for(extra);

        let values: Vec<_> = headers.get_all(AUTHORIZATION).iter().collect();
        assert_eq!(values, vec![&HeaderValue::from_static("Bearer request")]);
        assert_eq!(
            headers.get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
    }

    #[tokio::test]
    async fn null_data_is_not_a_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"data":null}"#)
            .create_async()
            .await;

        let data = client(&server).execute(Request::new(QUERY)).await.unwrap();

        assert_eq!(data, None);
    }

    #[rstest]
    #[case::errors_only(r#"{"errors":[{"message":"boom"}]}"#, "boom")]
    #[case::errors_with_data(
        r#"{"data":{"character":{"name":"Rick"}},"errors":[{"message":"partial"}]}"#,
        "partial"
    )]
    #[case::joined_messages(
        r#"{"errors":[{"message":"first"},{"path":["character"]},{"message":"third"}]}"#,
        "first, Unknown error, third"
    )]
    #[tokio::test]
    async fn graphql_errors_are_failures(#[case] body: &str, #[case] expected: &str) {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let error = client(&server)
            .execute(Request::new(QUERY))
            .await
            .unwrap_err();

        match error {
            Error::GraphQL(messages) => assert_eq!(messages, expected),
            other => panic!("Expected Error::GraphQL, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_errors_list_is_not_a_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"data":{"episode":null},"errors":[]}"#)
            .create_async()
            .await;

        let data = client(&server).execute(Request::new(QUERY)).await.unwrap();

        assert_eq!(data, json!({ "episode": null }).as_object().cloned());
    }

    #[rstest]
    #[case(400)]
    #[case(404)]
    #[case(500)]
    #[case(503)]
    #[tokio::test]
    async fn error_statuses_are_failures(#[case] status: usize) {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(status)
            .with_body(r#"{"data":{"character":null}}"#)
            .create_async()
            .await;

        let error = client(&server)
            .execute(Request::new(QUERY))
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Status(code) if code.as_u16() as usize == status));
    }

    #[tokio::test]
    async fn non_json_body_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let error = client(&server)
            .execute(Request::new(QUERY))
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Decode(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::new(
            Url::parse(&format!("http://{address}/graphql")).unwrap(),
            HeaderMap::new(),
        )
        .unwrap();

        let error = client.execute(Request::new(QUERY)).await.unwrap_err();

        assert!(matches!(error, Error::Transport(_)));
    }

    #[tokio::test]
    #[traced_test]
    async fn slow_endpoint_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let mut connections = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                connections.push(socket);
            }
        });

        let client = Client::with_timeout(
            Url::parse(&format!("http://{address}/graphql")).unwrap(),
            HeaderMap::new(),
            Duration::from_millis(200),
        )
        .unwrap();

        let error = client.execute(Request::new(QUERY)).await.unwrap_err();
        hold.abort();

        assert!(matches!(error, Error::Timeout(timeout) if timeout == Duration::from_millis(200)));
        assert!(logs_contain("GraphQL request failed"));
    }
}
