// Request pipeline: gate → resolve → locate → decode body → lookup → execute → respond.
//
// Everything before `execute` is validation and short-circuits with a status; nothing is
// submitted to a collection until the request is known to be well formed.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap},
    response::{IntoResponse, Json, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::AppConfig;
use crate::database::CollectionManager;
use crate::error::ApiError;
use crate::registry::{HandlerRegistry, RegistryError};
use crate::routing::{resolve, CollectionLocator, GateError, PathDescriptor, RequestGate};
use crate::types::{OperationOutput, RequestData};

pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const FORWARDED_FOR: &str = "x-forwarded-for";

pub struct Dispatcher {
    registry: HandlerRegistry,
    gate: RequestGate,
    locator: CollectionLocator,
    collections: Arc<CollectionManager>,
    max_body_bytes: usize,
}

impl Dispatcher {
    pub fn new(
        registry: HandlerRegistry,
        gate: RequestGate,
        locator: CollectionLocator,
        collections: Arc<CollectionManager>,
    ) -> Self {
        Self {
            registry,
            gate,
            locator,
            collections,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Dispatcher with the default handler groups, wired from `config`
    pub fn from_config(
        config: &AppConfig,
        collections: Arc<CollectionManager>,
    ) -> Result<Self, RegistryError> {
        Ok(Self::new(
            HandlerRegistry::with_default_handlers()?,
            RequestGate::new(config.gateway.allowed_hosts.clone()),
            CollectionLocator::new(&config.gateway.data_root),
            collections,
        )
        .with_max_body_bytes(config.server.max_request_size_bytes))
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn collections(&self) -> &Arc<CollectionManager> {
        &self.collections
    }

    /// Handle one HTTP request. Never fails: every error becomes a bare status.
    pub async fn handle(&self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(err) => {
                debug!("Request rejected with {}: {}", err.error_code(), err);
                err.into_response()
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response, ApiError> {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path();

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        self.gate
            .check(&parts.method, forwarded_for(&parts.headers), peer.as_deref())
            .inspect_err(|err| {
                if let GateError::Forbidden { .. } = err {
                    warn!("{}: {}", path, err);
                }
            })?;

        let descriptor = resolve(path)?;
        let collection_path = self.locator.locate(descriptor.collection_id())?;
        let data = self.decode_body(path, body).await?;

        let PathDescriptor {
            resource_type,
            operation,
            ids,
        } = descriptor;
        let entry = self.registry.lookup(resource_type, &operation)?;

        debug!(
            "Dispatching {}/{} on {}",
            resource_type,
            operation,
            collection_path.display()
        );
        let output = self
            .collections
            .execute(&collection_path, entry.invocable.clone(), data, ids)
            .await?;

        Ok(render(output, entry.produces_output))
    }

    async fn decode_body(&self, path: &str, body: Body) -> Result<RequestData, ApiError> {
        let bytes = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| {
                error!("{}: Unable to read request body: {}", path, e);
                ApiError::bad_request(e.to_string())
            })?;

        serde_json::from_slice(&bytes).map_err(|e| {
            error!("{}: Unable to parse JSON: {}", path, e);
            ApiError::invalid_json(e.to_string())
        })
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
}

/// Null and no-output results are an empty plain-text 200
fn render(output: OperationOutput, produces_output: bool) -> Response {
    match output {
        Some(value) if produces_output && !value.is_null() => Json(value).into_response(),
        _ => ([(header::CONTENT_TYPE, "text/plain")], "").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::invocable;
    use crate::routing::{AllowedHosts, ResourceType};
    use crate::server::app;
    use axum::http::{Method, StatusCode};
    use futures::FutureExt;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Harness {
        dir: TempDir,
        dispatcher: Arc<Dispatcher>,
        calls: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new(allowed_hosts: AllowedHosts) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let calls = Arc::new(AtomicUsize::new(0));

            let mut registry = HandlerRegistry::with_default_handlers().unwrap();
            let counter = calls.clone();
            registry
                .register(
                    ResourceType::Collection,
                    "probe",
                    invocable(move |_col, data, ids| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        async move { Ok(Some(json!({ "data": data, "ids": ids }))) }.boxed()
                    }),
                    true,
                )
                .unwrap();
            registry
                .register(
                    ResourceType::Collection,
                    "null",
                    invocable(|_col, _data, _ids| async { Ok(Some(Value::Null)) }.boxed()),
                    true,
                )
                .unwrap();
            registry
                .register(
                    ResourceType::Collection,
                    "silent",
                    invocable(|_col, _data, _ids| async { Ok(Some(json!([1, 2]))) }.boxed()),
                    false,
                )
                .unwrap();

            let dispatcher = Dispatcher::new(
                registry,
                RequestGate::new(allowed_hosts),
                CollectionLocator::new(dir.path()),
                Arc::new(CollectionManager::default()),
            );
            Self {
                dir,
                dispatcher: Arc::new(dispatcher),
                calls,
            }
        }

        async fn send(&self, request: Request) -> (StatusCode, HeaderMap, Vec<u8>) {
            let response = app(self.dispatcher.clone()).oneshot(request).await.unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, headers, body.to_vec())
        }

        async fn post(&self, path: &str, body: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
            self.send(post(path, body)).await
        }
    }

    fn post(path: &str, body: &str) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn method_is_checked_before_the_path() {
        let h = Harness::new(AllowedHosts::Any);
        let request = Request::builder()
            .method(Method::GET)
            .uri("/definitely/not/a/valid/path/at/all")
            .body(Body::empty())
            .unwrap();

        let (status, headers, body) = h.send(request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers.get(header::ALLOW).unwrap(), "POST");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn unresolvable_paths_are_not_found() {
        let h = Harness::new(AllowedHosts::Any);
        for path in ["/", "/deck/1/next_card", "/collection", "/collection/a/b/c"] {
            let (status, _, _) = h.post(path, "{}").await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", path);
        }
    }

    #[tokio::test]
    async fn unknown_operation_is_not_found() {
        let h = Harness::new(AllowedHosts::Any);
        let (status, _, body) = h.post("/collection/alice/nope", "{}").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn escaping_the_data_root_is_a_bad_request() {
        let h = Harness::new(AllowedHosts::Any);
        for path in ["/collection/%2E%2E/probe", "/collection/%2Fetc/probe"] {
            let (status, _, _) = h.post(path, "{}").await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", path);
        }
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_json_is_rejected_before_execution() {
        let h = Harness::new(AllowedHosts::Any);
        for body in ["{not json", "", "[1, 2]", "\"text\""] {
            let (status, _, response) = h.post("/collection/alice/probe", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{:?}", body);
            assert!(response.is_empty());
        }
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.dispatcher.collections().worker_count().await, 0);
    }

    #[tokio::test]
    async fn operation_receives_body_and_ids() {
        let h = Harness::new(AllowedHosts::Any);
        let (status, headers, body) = h
            .post("/collection/alice/probe", r#"{"query": "tag:foo", "n": 1}"#)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");

        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["data"], json!({ "query": "tag:foo", "n": 1 }));
        assert_eq!(value["ids"], json!(["alice"]));
        assert!(h.dir.path().join("alice").join("collection.anki2").exists());
    }

    #[tokio::test]
    async fn null_and_silent_results_are_empty_text() {
        let h = Harness::new(AllowedHosts::Any);
        for op in ["null", "silent"] {
            let (status, headers, body) = h.post(&format!("/collection/alice/{}", op), "{}").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/plain");
            assert!(body.is_empty());
        }
    }

    #[tokio::test]
    async fn failing_operation_is_an_opaque_500() {
        let h = Harness::new(AllowedHosts::Any);
        let (status, _, body) = h
            .post("/collection/alice/add_note", r#"{"fields": {"Front": "x"}}"#)
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.is_empty());

        let (_, _, body) = h.post("/collection/alice/find_notes", "{}").await;
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!([]));
    }

    #[tokio::test]
    async fn origin_check_prefers_forwarded_for() {
        let h = Harness::new(AllowedHosts::Only("10.1.1.1".into()));

        let mut request = post("/collection/alice/probe", "{}");
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 1, 1, 1], 4000))));
        assert_eq!(h.send(request).await.0, StatusCode::OK);

        let mut request = post("/collection/alice/probe", "{}");
        request
            .headers_mut()
            .insert(FORWARDED_FOR, "192.168.0.9".parse().unwrap());
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 1, 1, 1], 4000))));
        let (status, _, body) = h.send(request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.is_empty());

        let mut request = post("/collection/alice/probe", "{}");
        request
            .headers_mut()
            .insert(FORWARDED_FOR, "10.1.1.1".parse().unwrap());
        assert_eq!(h.send(request).await.0, StatusCode::OK);

        // no header and no peer address
        assert_eq!(h.post("/collection/alice/probe", "{}").await.0, StatusCode::FORBIDDEN);
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
    }
}
