//! Parley host: settings, SQLite persistence, and the `/api` HTTP surface
//! over `parley-core`.

pub mod commands;
pub mod error;
pub mod routes;
pub mod settings;
pub mod state;
pub mod storage;

use anyhow::Result;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", routes::api_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("parley listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use super::create_router;
    use crate::testing::test_state;

    #[tokio::test]
    async fn api_is_nested_under_prefix() {
        let (state, _tmp) = test_state();
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/perf").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/perf").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
