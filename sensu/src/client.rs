use crate::backend::{Backend, Kind};
use crate::errors::SensuError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde_json::{Value, json};

const API_PREFIX: [&str; 4] = ["api", "core", "v2", "namespaces"];
const MERGE_PATCH: &str = "application/merge-patch+json";

/// Client of the Sensu `core/v2` REST API, authenticated with an API key.
#[derive(Clone)]
pub struct SensuClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl SensuClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        SensuClient {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SensuError> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Key {}", self.token))
    }

    async fn send(&self, method: Method, url: Url, body: Option<(&Value, &str)>) -> Result<Response, SensuError> {
        let mut request = self.request(method.clone(), url.clone());
        if let Some((body, content_type)) = body {
            request = request
                .header(CONTENT_TYPE, content_type)
                .body(serde_json::to_vec(body)?);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(SensuError::Status {
            method,
            url: url.to_string(),
            status,
            body,
        })
    }
}

#[async_trait]
impl Backend for SensuClient {
    async fn namespaces(&self) -> Result<Vec<String>, SensuError> {
        let response = self.send(Method::GET, self.url(&[])?, None).await?;
        let namespaces: Vec<generator::records::Namespace> = response.json().await?;
        Ok(namespaces.into_iter().map(|ns| ns.name).collect())
    }

    async fn create_namespace(&self, name: &str) -> Result<(), SensuError> {
        let body = json!({ "name": name });
        self.send(Method::PUT, self.url(&[name])?, Some((&body, "application/json")))
            .await?;
        Ok(())
    }

    async fn list(&self, namespace: &str, kind: Kind) -> Result<Vec<Value>, SensuError> {
        let response = self
            .send(Method::GET, self.url(&[namespace, kind.path()])?, None)
            .await?;
        // Empty collections come back as `null`.
        let values: Option<Vec<Value>> = response.json().await?;
        Ok(values.unwrap_or_default())
    }

    async fn get(&self, namespace: &str, kind: Kind, name: &str) -> Result<Value, SensuError> {
        let url = self.url(&[namespace, kind.path(), name])?;
        match self.send(Method::GET, url, None).await {
            Ok(response) => Ok(response.json().await?),
            Err(SensuError::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                Err(SensuError::NotFound {
                    kind: kind.to_string(),
                    name: name.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn put(&self, namespace: &str, kind: Kind, name: &str, body: &Value) -> Result<(), SensuError> {
        let url = self.url(&[namespace, kind.path(), name])?;
        self.send(Method::PUT, url, Some((body, "application/json"))).await?;
        Ok(())
    }

    async fn patch(&self, namespace: &str, kind: Kind, name: &str, body: &Value) -> Result<(), SensuError> {
        let url = self.url(&[namespace, kind.path(), name])?;
        self.send(Method::PATCH, url, Some((body, MERGE_PATCH))).await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, kind: Kind, name: &str) -> Result<(), SensuError> {
        let url = self.url(&[namespace, kind.path(), name])?;
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn delete_event(&self, namespace: &str, entity: &str, check: &str) -> Result<(), SensuError> {
        let url = self.url(&[namespace, Kind::Events.path(), entity, check])?;
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn execute(&self, namespace: &str, check: &str) -> Result<(), SensuError> {
        let url = self.url(&[namespace, Kind::Checks.path(), check, "execute"])?;
        let body = json!({ "check": check });
        self.send(Method::POST, url, Some((&body, "application/json"))).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_namespaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/core/v2/namespaces"))
            .and(header("Authorization", "Key t0k3n"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"[{"name": "default"}, {"name": "TENANT1"}]"#),
            )
            .mount(&server)
            .await;

        let client = SensuClient::new(&server.uri(), "t0k3n");
        assert_eq!(client.namespaces().await.unwrap(), vec!["default", "TENANT1"]);
    }

    #[tokio::test]
    async fn test_create_namespace() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/core/v2/namespaces/TENANT2"))
            .and(body_json(json!({"name": "TENANT2"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = SensuClient::new(&format!("{}/", server.uri()), "t0k3n");
        client.create_namespace("TENANT2").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_null_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/core/v2/namespaces/TENANT1/checks"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let client = SensuClient::new(&server.uri(), "t0k3n");
        assert!(client.list("TENANT1", Kind::Checks).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_patch_uses_merge_patch() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/core/v2/namespaces/TENANT1/entities/sensu-agent1"))
            .and(header("content-type", MERGE_PATCH))
            .and(body_json(json!({"subscriptions": ["entity:sensu-agent1", "argo.test"]})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = SensuClient::new(&server.uri(), "t0k3n");
        client
            .patch(
                "TENANT1",
                Kind::Entities,
                "sensu-agent1",
                &json!({"subscriptions": ["entity:sensu-agent1", "argo.test"]}),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_event() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(
                "/api/core/v2/namespaces/TENANT1/events/argo.webui__argo.ni4os.eu/generic.tcp.connect",
            ))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = SensuClient::new(&server.uri(), "t0k3n");
        client
            .delete_event("TENANT1", "argo.webui__argo.ni4os.eu", "generic.tcp.connect")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/core/v2/namespaces/TENANT1/checks/generic.tcp.connect"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"message": "bad"}"#))
            .mount(&server)
            .await;

        let client = SensuClient::new(&server.uri(), "t0k3n");
        let err = client
            .put("TENANT1", Kind::Checks, "generic.tcp.connect", &json!({}))
            .await
            .unwrap_err();

        match err {
            SensuError::Status { method, status, body, .. } => {
                assert_eq!(method, Method::PUT);
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert!(body.contains("bad"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/core/v2/namespaces/TENANT1/entities/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = SensuClient::new(&server.uri(), "t0k3n");
        let err = client.get("TENANT1", Kind::Entities, "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_execute() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/core/v2/namespaces/TENANT1/checks/generic.tcp.connect/execute"))
            .and(body_json(json!({"check": "generic.tcp.connect"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = SensuClient::new(&server.uri(), "t0k3n");
        client.execute("TENANT1", "generic.tcp.connect").await.unwrap();
    }
}
