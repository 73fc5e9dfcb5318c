use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use parley_core::Tier;
use serde::Deserialize;

use crate::commands::{self, ConversationStarted, RoomDetail, TurnReply};
use crate::error::AppError;
use crate::state::AppState;
use crate::storage::Room;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomBody {
    pub user_id: String,
    pub title: Option<String>,
}

#[derive(Deserialize)]
pub struct RoomQuery {
    pub user: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct StartBody {
    pub topic: Option<String>,
    pub tier: Option<Tier>,
}

/// Chat client payload: typed text or a base64 WAV recording.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct SendBody {
    pub message: Option<String>,
    pub audio_data: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_room).get(list_rooms))
        .route("/{id}", get(room_detail).delete(deactivate_room))
        .route("/{id}/conversation", post(start_conversation))
        .route("/{id}/send", post(send_message))
}

async fn create_room(
    State(state): State<AppState>,
    Json(body): Json<CreateRoomBody>,
) -> Result<(StatusCode, Json<Room>), AppError> {
    let room = commands::create_room(&state, &body.user_id, body.title).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

async fn list_rooms(
    State(state): State<AppState>,
    Query(query): Query<RoomQuery>,
) -> Result<Json<Vec<Room>>, AppError> {
    commands::list_rooms(&state, &query.user).await.map(Json)
}

async fn room_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoomDetail>, AppError> {
    commands::room_detail(&state, &id).await.map(Json)
}

async fn deactivate_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    commands::deactivate_room(&state, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StartBody>,
) -> Result<(StatusCode, Json<ConversationStarted>), AppError> {
    let started = commands::start_conversation(&state, &id, body.topic, body.tier).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SendBody>,
) -> Result<Json<TurnReply>, AppError> {
    commands::send_message(&state, &id, body.message, body.audio_data)
        .await
        .map(Json)
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode, Router};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use parley_core::audio::{encode_wav_pcm16, AudioChunk};
    use parley_core::StubModel;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::router;
    use crate::state::AppState;
    use crate::testing::{read_json, test_state, test_state_with};

    fn app(state: &AppState) -> Router {
        router().with_state(state.clone())
    }

    async fn call(state: &AppState, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app(state)
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("build request"),
            )
            .await
            .expect("send request");
        let status = response.status();
        (status, read_json(response).await)
    }

    async fn new_room(state: &AppState) -> String {
        let (status, room) = call(state, "POST", "/", json!({ "userId": "ana" })).await;
        assert_eq!(status, StatusCode::CREATED);
        room["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn create_and_list_rooms() {
        let (state, _tmp) = test_state();
        let (status, room) = call(&state, "POST", "/", json!({ "userId": "ana" })).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(room["title"], "New Chat");

        let (status, _) = call(&state, "POST", "/", json!({ "userId": "  " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, rooms) = call(&state, "GET", "/?user=ana", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rooms.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn typed_conversation_flow() {
        let (state, _tmp) = test_state();
        let room = new_room(&state).await;

        let (status, started) = call(&state, "POST", &format!("/{room}/conversation"), json!({})).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(started["session"]["topic"], "favorite food");
        assert_eq!(started["session"]["exchangeCount"], 5);
        assert!(started["fallbackReason"].is_null());
        let expected = started["session"]["currentPrompt"]["expectedResponse"]
            .as_str()
            .unwrap()
            .to_string();

        let (status, turn) = call(&state, "POST", &format!("/{room}/send"), json!({ "message": expected })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(turn["outcome"], "advanced");
        assert_eq!(turn["turn"]["score"], 100);
        assert_eq!(turn["session"]["index"], 1);
        assert!(turn["transcription"].is_null());

        let (status, turn) = call(&state, "POST", &format!("/{room}/send"), json!({ "message": "banana" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(turn["outcome"], "retry");
        assert_eq!(turn["session"]["index"], 1);

        let (status, _) = call(&state, "POST", &format!("/{room}/send"), json!({ "message": "   " })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(&state, "POST", &format!("/{room}/send"), json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, detail) = call(&state, "GET", &format!("/{room}"), Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        // opening prompt + 2 × (user, assistant)
        assert_eq!(detail["messages"].as_array().unwrap().len(), 5);
        assert_eq!(detail["session"]["index"], 1);

        let perf = state.perf_snapshot();
        assert_eq!(perf.diagnostics.turns_applied, 2);
        assert_eq!(perf.diagnostics.turns_rejected, 1);
        assert_eq!(perf.score_ms.count, 2);
    }

    #[tokio::test]
    async fn restarting_keeps_one_open_session() {
        let (state, _tmp) = test_state();
        let room = new_room(&state).await;
        let (_, first) = call(&state, "POST", &format!("/{room}/conversation"), json!({})).await;
        let (_, second) = call(
            &state,
            "POST",
            &format!("/{room}/conversation"),
            json!({ "topic": "Weather and Seasons" }),
        )
        .await;
        assert_eq!(second["session"]["topic"], "weather and seasons");

        let (_, detail) = call(&state, "GET", &format!("/{room}"), Value::Null).await;
        assert_eq!(detail["session"]["id"], second["session"]["id"]);
        assert_ne!(first["session"]["id"], second["session"]["id"]);

        let sessions = state.store.list_sessions(&room).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions.iter().filter(|s| s.is_open()).count(), 1);
    }

    #[tokio::test]
    async fn locked_tier_and_unknown_room() {
        let (state, _tmp) = test_state();
        let room = new_room(&state).await;

        let (status, body) =
            call(&state, "POST", &format!("/{room}/conversation"), json!({ "tier": "hard" })).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().unwrap().contains("locked"));

        let (status, _) = call(&state, "POST", "/room-missing/conversation", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&state, "POST", &format!("/{room}/send"), json!({ "message": "hi" })).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn spoken_turn_uses_transcript() {
        let (state, _tmp) = test_state_with(StubModel::scripted([
            "I really love pizza! It's my absolute favorite.",
        ]));
        let room = new_room(&state).await;
        call(&state, "POST", &format!("/{room}/conversation"), json!({ "topic": "favorite food" })).await;

        let wav = encode_wav_pcm16(&AudioChunk::new(vec![0.1; 16_000], 16_000)).unwrap();
        let payload = format!("data:audio/wav;base64,{}", BASE64.encode(wav));
        let (status, turn) =
            call(&state, "POST", &format!("/{room}/send"), json!({ "audio_data": payload })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(turn["transcription"]["kind"], "heard");
        assert_eq!(turn["outcome"], "advanced");
    }

    #[tokio::test]
    async fn unintelligible_audio_is_scored_as_sentinel() {
        let (state, _tmp) = test_state();
        let room = new_room(&state).await;
        call(&state, "POST", &format!("/{room}/conversation"), json!({})).await;

        let wav = encode_wav_pcm16(&AudioChunk::new(vec![0.0; 8_000], 8_000)).unwrap();
        let (status, turn) = call(
            &state,
            "POST",
            &format!("/{room}/send"),
            json!({ "audio_data": BASE64.encode(wav) }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(turn["transcription"]["kind"], "fallback");
        assert_eq!(turn["turn"]["candidate"], "could not understand the audio");
        assert_eq!(turn["outcome"], "retry");

        let (status, _) = call(
            &state,
            "POST",
            &format!("/{room}/send"),
            json!({ "audio_data": "%%%" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deactivated_room_disappears() {
        let (state, _tmp) = test_state();
        let room = new_room(&state).await;
        let response = app(&state)
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/{room}"))
                    .body(Body::empty())
                    .expect("build request"),
            )
            .await
            .expect("send request");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let (_, rooms) = call(&state, "GET", "/?user=ana", Value::Null).await;
        assert!(rooms.as_array().unwrap().is_empty());
        let (status, _) = call(&state, "POST", &format!("/{room}/conversation"), json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
