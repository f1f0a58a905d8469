use std::time::Duration;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use shared::protocol::SERVICES_PATH;
use shared::types::{RegistrySnapshot, ServiceEntry, ServiceId};
use url::Url;
use crate::error::{PollerError, Result};

/// Request/response access to the service registry.
///
/// One network round trip per call, no caching and no retries. Retrying is
/// the caller's business.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn list(&self) -> Result<RegistrySnapshot>;

    /// Returns the created entry when the registry echoes it back.
    async fn create(&self, name: &str, url: &str) -> Result<Option<ServiceEntry>>;

    /// Fails with `NotFound` if `id` is unknown to the registry.
    async fn update(&self, id: ServiceId, name: &str, url: &str) -> Result<Option<ServiceEntry>>;

    /// Fails with `NotFound` if `id` is unknown to the registry.
    async fn delete(&self, id: ServiceId) -> Result<()>;
}

#[derive(Serialize)]
struct CreateBody<'a> {
    name: &'a str,
    url: &'a str,
}

#[derive(Serialize)]
struct UpdateBody<'a> {
    id: ServiceId,
    name: &'a str,
    url: &'a str,
}

/// Error payload of the registry: `{"error": ".."}` or `{"message": ".."}`
#[derive(Deserialize, Default)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// `RegistryApi` over the registry's HTTP interface.
#[derive(Clone)]
pub struct HttpRegistryClient {
    client: Client,
    services_url: Url,
}

impl HttpRegistryClient {
    pub fn new(base_url: &Url, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            services_url: join(base_url, SERVICES_PATH)?,
        })
    }

    fn service_url(&self, id: ServiceId) -> Result<Url> {
        let mut url = self.services_url.clone();
        url.path_segments_mut()
            .map_err(|_| PollerError::Network(format!("Registry URL cannot be a base: {}", self.services_url)))?
            .push(&id.to_string());
        Ok(url)
    }
}

/// Join `path` onto `base`, keeping any path prefix the base already has.
pub(crate) fn join(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
        .map_err(|e| PollerError::Network(format!("Invalid registry URL {base}: {e}")))
}

#[async_trait]
impl RegistryApi for HttpRegistryClient {
    async fn list(&self) -> Result<RegistrySnapshot> {
        let response = self.client.get(self.services_url.clone()).send().await?;
        let response = check_status(response, None).await?;

        let snapshot = response
            .json::<RegistrySnapshot>()
            .await
            .map_err(|e| PollerError::Network(format!("Failed to decode service listing: {e}")))?;

        tracing::debug!("Fetched {} services from registry", snapshot.len());
        Ok(snapshot)
    }

    async fn create(&self, name: &str, url: &str) -> Result<Option<ServiceEntry>> {
        let response = self
            .client
            .post(self.services_url.clone())
            .json(&CreateBody { name, url })
            .send()
            .await?;
        let response = check_status(response, None).await?;

        tracing::info!("Created service {} ({})", name, url);
        entry_body(response).await
    }

    async fn update(&self, id: ServiceId, name: &str, url: &str) -> Result<Option<ServiceEntry>> {
        let response = self
            .client
            .put(self.services_url.clone())
            .json(&UpdateBody { id, name, url })
            .send()
            .await?;
        let response = check_status(response, Some(id)).await?;

        tracing::info!("Updated service {}", id);
        entry_body(response).await
    }

    async fn delete(&self, id: ServiceId) -> Result<()> {
        let response = self.client.delete(self.service_url(id)?).send().await?;
        check_status(response, Some(id)).await?;

        tracing::info!("Deleted service {}", id);
        Ok(())
    }
}

/// Map non-success statuses onto the error taxonomy.
async fn check_status(response: Response, id: Option<ServiceId>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body.error.or(body.message).unwrap_or(text);

    match (status, id) {
        (StatusCode::NOT_FOUND, Some(id)) => Err(PollerError::NotFound(id)),
        (StatusCode::BAD_REQUEST, _) => Err(PollerError::Validation(message)),
        _ => Err(PollerError::Network(format!("Registry answered {status}: {message}"))),
    }
}

/// The registry may answer a mutation with `204 No Content` or with the entry.
async fn entry_body(response: Response) -> Result<Option<ServiceEntry>> {
    if response.status() == StatusCode::NO_CONTENT {
        return Ok(None);
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Ok(None);
    }
    let entry = serde_json::from_slice(&bytes)
        .map_err(|e| PollerError::Network(format!("Failed to decode service entry: {e}")))?;
    Ok(Some(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode as HttpStatus;
    use axum::response::{IntoResponse, Response as HttpResponse};
    use axum::routing::{delete, get};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use shared::types::ServiceStatus;
    use tokio::net::TcpListener;

    const MISSING: ServiceId = 7;

    fn listed_entry() -> Value {
        json!({
            "id": 1,
            "name": "auth",
            "url": "http://auth.local",
            "createdDate": 1_640_995_200_000_i64,
            "currentStatus": "OK"
        })
    }

    async fn list_services() -> Json<Value> {
        Json(json!({ "services": [listed_entry(), {
            "id": 2,
            "name": "billing",
            "url": "http://billing.local",
            "createdDate": 1_640_995_260_000_i64
        }] }))
    }

    async fn create_service(Json(body): Json<Value>) -> HttpResponse {
        match body["name"].as_str() {
            Some("") => (HttpStatus::BAD_REQUEST, Json(json!({ "error": "Service name cannot be empty" })))
                .into_response(),
            Some("teapot") => (HttpStatus::IM_A_TEAPOT, "short and stout").into_response(),
            _ => HttpStatus::NO_CONTENT.into_response(),
        }
    }

    async fn update_service(Json(body): Json<Value>) -> HttpResponse {
        match body["id"].as_i64() {
            Some(MISSING) => HttpStatus::NOT_FOUND.into_response(),
            Some(1) => Json(listed_entry()).into_response(),
            Some(2) => HttpStatus::OK.into_response(),
            _ => (HttpStatus::BAD_REQUEST, Json(json!({ "message": "Invalid service URL" })))
                .into_response(),
        }
    }

    async fn delete_service(Path(id): Path<ServiceId>) -> HttpStatus {
        match id {
            MISSING => HttpStatus::NOT_FOUND,
            1 => HttpStatus::NO_CONTENT,
            _ => HttpStatus::INTERNAL_SERVER_ERROR,
        }
    }

    /// Serve a canned registry under `/api` and return a client for it.
    async fn stub_registry() -> HttpRegistryClient {
        let app = Router::new()
            .route(
                "/api/services",
                get(list_services).post(create_service).put(update_service),
            )
            .route("/api/services/:id", delete(delete_service));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base = Url::parse(&format!("http://{addr}/api")).unwrap();
        HttpRegistryClient::new(&base, Some(Duration::from_secs(5))).unwrap()
    }

    #[tokio::test]
    async fn test_list_decodes_listing() {
        let client = stub_registry().await;

        let snapshot = client.list().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        let auth = snapshot.get(1).unwrap();
        assert_eq!(auth.name, "auth");
        assert_eq!(auth.current_status, ServiceStatus::Ok);
        assert_eq!(auth.created_at.timestamp_millis(), 1_640_995_200_000);
        assert_eq!(snapshot.get(2).unwrap().current_status, ServiceStatus::Unknown);
    }

    #[tokio::test]
    async fn test_mutation_bodies() {
        let client = stub_registry().await;

        // 204
        assert_eq!(client.create("auth", "http://auth.local").await.unwrap(), None);
        // 200 with an entry
        let updated = client.update(1, "auth", "http://auth.local").await.unwrap();
        assert_eq!(updated.map(|e| e.id), Some(1));
        // 200 with an empty body
        assert_eq!(client.update(2, "billing", "http://billing.local").await.unwrap(), None);
        client.delete(1).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let client = stub_registry().await;

        assert!(matches!(
            client.update(MISSING, "gone", "http://gone.local").await,
            Err(PollerError::NotFound(MISSING))
        ));
        assert!(matches!(client.delete(MISSING).await, Err(PollerError::NotFound(MISSING))));
    }

    #[tokio::test]
    async fn test_rejections_carry_registry_message() {
        let client = stub_registry().await;

        match client.create("", "http://auth.local").await {
            Err(PollerError::Validation(message)) => {
                assert_eq!(message, "Service name cannot be empty")
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        match client.update(3, "auth", "ftp://auth.local").await {
            Err(PollerError::Validation(message)) => assert_eq!(message, "Invalid service URL"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_statuses_are_network_errors() {
        let client = stub_registry().await;

        match client.create("teapot", "http://tea.local").await {
            Err(PollerError::Network(message)) => {
                assert!(message.contains("418"), "{message}");
                assert!(message.contains("short and stout"), "{message}");
            }
            other => panic!("expected network error, got {other:?}"),
        }
        assert!(matches!(client.delete(5).await, Err(PollerError::Network(_))));
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = Url::parse(&format!("http://{addr}/")).unwrap();
        let client = HttpRegistryClient::new(&base, None).unwrap();
        assert!(matches!(client.list().await, Err(PollerError::Network(_))));
    }

    #[test]
    fn test_join_keeps_base_path() {
        let base = Url::parse("http://poller.local:8090/api").unwrap();
        assert_eq!(
            join(&base, SERVICES_PATH).unwrap().as_str(),
            "http://poller.local:8090/api/services"
        );

        let root = Url::parse("http://localhost:8090").unwrap();
        assert_eq!(
            join(&root, SERVICES_PATH).unwrap().as_str(),
            "http://localhost:8090/services"
        );
    }

    #[test]
    fn test_service_url_appends_id() {
        let base = Url::parse("http://localhost:8090/").unwrap();
        let client = HttpRegistryClient::new(&base, None).unwrap();
        assert_eq!(
            client.service_url(42).unwrap().as_str(),
            "http://localhost:8090/services/42"
        );
    }
}
