use log::debug;
use reqwest::Client;

use crate::api::{
    ApiError, ApiFuture, GenerationApi, GenerationRequest, Model, StatusResult, TaskHandle,
};

pub mod wire;

pub const DEFAULT_BASE_URL: &str = "https://api.bfl.ml";

/// Client for the Black Forest Labs generation API.
#[derive(Clone)]
pub struct BflClient {
    client: Client,
    base_url: String,
    model: Model,
}

impl BflClient {
    pub fn new(model: Model) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.into(),
            model,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> Model {
        self.model
    }

    async fn start(&self, request: &GenerationRequest, api_key: &str) -> Result<TaskHandle, ApiError> {
        if api_key.trim().is_empty() {
            return Err(ApiError::Auth {
                message: "no API key provided".into(),
            });
        }

        let url = format!("{}/v1/{}", self.base_url, self.model.endpoint());
        let resp = self
            .client
            .post(&url)
            .header("accept", "application/json")
            .header("x-key", api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        debug!("Submit response from {url}: {status} - {text}");

        if !status.is_success() {
            return Err(ApiError::from_status(status, text));
        }

        wire::parse_start_response(&text)
    }

    async fn poll(&self, handle: &TaskHandle) -> Result<StatusResult, ApiError> {
        let resp = self
            .client
            .get(format!("{}/v1/get_result", self.base_url))
            .header("accept", "application/json")
            .query(&[("id", handle.as_str())])
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        debug!("Poll response for {handle}: {status} - {text}");

        if !status.is_success() {
            return Err(ApiError::from_status(status, text));
        }

        wire::parse_poll_response(&text)
    }
}

impl GenerationApi for BflClient {
    fn submit<'a>(
        &'a self,
        request: &'a GenerationRequest,
        api_key: &'a str,
    ) -> ApiFuture<'a, TaskHandle> {
        Box::pin(self.start(request, api_key))
    }

    fn fetch_status<'a>(&'a self, handle: &'a TaskHandle) -> ApiFuture<'a, StatusResult> {
        Box::pin(self.poll(handle))
    }
}

#[cfg(test)]
mod test {
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };

    use super::*;

    fn client_for(server: &MockServer) -> BflClient {
        BflClient::new(Model::FluxDev).with_base_url(server.url(""))
    }

    #[tokio::test]
    async fn submit_posts_request_with_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/flux-dev")
                    .header("x-key", "secret")
                    .body_includes("\"prompt\":\"a cat\"")
                    .body_includes("\"safety_tolerance\":2");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"id":"abc123"}"#);
            })
            .await;

        let handle = client_for(&server)
            .submit(&GenerationRequest::new("a cat"), "secret")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(handle, TaskHandle::new("abc123"));
    }

    #[tokio::test]
    async fn submit_maps_rejected_key_to_auth_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/flux-dev");
                then.status(403).body(r#"{"detail":"Not authenticated"}"#);
            })
            .await;

        let err = client_for(&server)
            .submit(&GenerationRequest::new("a cat"), "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn submit_with_blank_key_sends_nothing() {
        // Nothing listens here, so any request would surface as a network failure.
        let client = BflClient::new(Model::FluxDev).with_base_url("http://127.0.0.1:1");
        let err = client
            .submit(&GenerationRequest::new("a cat"), "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn submit_other_http_errors_are_service_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/flux-dev");
                then.status(422).body("bad width");
            })
            .await;

        let err = client_for(&server)
            .submit(&GenerationRequest::new("a cat"), "secret")
            .await
            .unwrap_err();
        assert!(
            matches!(&err, ApiError::Service { status: 422, body } if body == "bad width"),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn fetch_status_reads_sample_url() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/get_result")
                    .query_param("id", "abc123");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"id":"abc123","status":"Ready","result":{"sample":"https://x/y.png"}}"#);
            })
            .await;

        let status = client_for(&server)
            .fetch_status(&TaskHandle::new("abc123"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            status,
            StatusResult::Ready {
                image_url: "https://x/y.png".into()
            }
        );
    }

    #[tokio::test]
    async fn unreachable_service_is_network_failure() {
        let client = BflClient::new(Model::FluxDev).with_base_url("http://127.0.0.1:1");
        let err = client
            .fetch_status(&TaskHandle::new("abc123"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_)), "{err:?}");
    }
}
