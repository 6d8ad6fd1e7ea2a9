//! Application setup and server configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::domains::entityset::EntitySetService;
use crate::kernel::{DisplayResolver, JobRunner};
use crate::server::routes::{
    create_set, create_union_analysis, delete_set, export_set, get_set, get_sets,
    get_union_analysis, health_handler, manifest_set, preview_union, rename_set, union_sets,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EntitySetService>,
    pub resolver: Arc<dyn DisplayResolver>,
    pub runner: Arc<JobRunner>,
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/entityset", post(create_set))
        .route("/v1/entityset/union", post(union_sets))
        .route("/v1/entityset/sets/:ids", get(get_sets))
        .route(
            "/v1/entityset/:id",
            get(get_set).put(rename_set).delete(delete_set),
        )
        .route("/v1/entityset/:id/export", get(export_set))
        .route("/v1/entityset/:id/manifest", get(manifest_set))
        .route("/v1/analysis/union", post(create_union_analysis))
        .route("/v1/analysis/union/preview", post(preview_union))
        .route("/v1/analysis/union/:id", get(get_union_analysis))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::entityset::{
        EntitySetService, EntitySetStore, SetOperationLimits, UnionAnalysisStore,
    };
    use crate::kernel::{InMemorySearchService, JobRunnerConfig, NullResolver};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let runner = Arc::new(JobRunner::start(JobRunnerConfig {
            workers: 1,
            ..Default::default()
        }));
        let service = Arc::new(EntitySetService::new(
            Arc::new(EntitySetStore::new()),
            Arc::new(UnionAnalysisStore::new()),
            Arc::new(InMemorySearchService::new()),
            Arc::clone(&runner),
            SetOperationLimits {
                max_set_size: 100,
                max_preview_size: 10,
                search_timeout: Duration::from_secs(1),
            },
        ));
        AppState {
            service,
            resolver: Arc::new(NullResolver),
            runner,
        }
    }

    #[tokio::test]
    async fn test_health_endpoint_responds_ok() {
        let app = build_app(test_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_set_returns_404() {
        let app = build_app(test_state());
        let uri = format!("/v1/entityset/{}", uuid::Uuid::new_v4());
        let response = app
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_definition_returns_400() {
        let app = build_app(test_state());
        let body = serde_json::json!({
            "sortBy": "",
            "sortOrder": "ASCENDING",
            "name": "bad",
            "type": "DONOR"
        });
        let response = app
            .oneshot(
                Request::post("/v1/entityset")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_tolerant_multi_read_skips_bad_ids() {
        let app = build_app(test_state());
        let uri = format!("/v1/entityset/sets/not-a-uuid,{}", uuid::Uuid::new_v4());
        let response = app
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
