use axum::{extract::State, routing::get, Json, Router};

use crate::commands;
use crate::settings::RuntimeSettings;
use crate::state::{AppState, PerfSnapshot};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/perf", get(perf))
        .route("/settings", get(settings))
}

async fn perf(State(state): State<AppState>) -> Json<PerfSnapshot> {
    Json(commands::get_perf_snapshot(&state))
}

async fn settings(State(state): State<AppState>) -> Json<RuntimeSettings> {
    Json(commands::get_runtime_settings(&state))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use super::router;
    use crate::testing::{read_json, test_state};

    #[tokio::test]
    async fn perf_reports_empty_windows() {
        let (state, _tmp) = test_state();
        let response = router()
            .with_state(state)
            .oneshot(Request::builder().uri("/perf").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["scoreMs"]["count"], 0);
        assert_eq!(json["diagnostics"]["turnsApplied"], 0);
        assert_eq!(json["diagnostics"]["engine"]["generations"], 0);
    }

    #[tokio::test]
    async fn settings_hide_secrets() {
        let (state, _tmp) = test_state();
        let response = router()
            .with_state(state)
            .oneshot(Request::builder().uri("/settings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["acceptanceThreshold"], 70);
        assert_eq!(json["hasGeminiApiKey"], false);
        assert!(json.get("geminiApiKey").is_none());
    }
}
