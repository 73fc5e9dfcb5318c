//! Command handlers.
//!
//! Plain async functions over [`AppState`]; the HTTP routes are thin
//! wrappers so every operation can be tested without a server.

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parley_core::generation::NEUTRAL_TOPIC;
use parley_core::topics::{find_topic, recommend_topic, topic_catalog};
use parley_core::{
    Exchange, GenerationRequest, LevelingState, ScriptOutcome, Tier, Topic, Transcription, TurnResult,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::settings::RuntimeSettings;
use crate::state::{AppState, PerfSnapshot};
use crate::storage::{LocalStore, MessageRecord, Room, ScoreStats, SessionRecord, StoreError};

/// How many recent topics to avoid when recommending one.
const RECENT_TOPIC_WINDOW: usize = 5;
const DEFAULT_STATS_RANGE_DAYS: usize = 30;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetail {
    pub room: Room,
    pub session: Option<SessionRecord>,
    pub messages: Vec<MessageRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStarted {
    pub session: SessionRecord,
    /// Why the built-in script was used, when it was.
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReply {
    /// Present when the turn came from an audio upload.
    pub transcription: Option<Transcription>,
    /// `advanced` | `retry` | `completed`
    pub outcome: &'static str,
    pub turn: TurnResult,
    /// e.g. "4/5 correct"
    pub summary: String,
    pub reply: String,
    pub next_prompt: Option<Exchange>,
    pub session: SessionRecord,
    pub progress: ProgressView,
    pub tier_unlocked: Option<Tier>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub user_id: String,
    pub completed_count: u32,
    pub tier: Tier,
    pub available_tiers: Vec<Tier>,
    pub next_exchange_count: usize,
    pub conversations_until_next_tier: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicsView {
    pub available_tiers: Vec<Tier>,
    pub topics: Vec<Topic>,
    pub recommended: Option<Topic>,
}

/// Run a store operation on the blocking pool.
async fn with_store<T, F>(state: &AppState, op: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&LocalStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(&state.store);
    Ok(tokio::task::spawn_blocking(move || op(&store)).await??)
}

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Create a room for `user_id`.
pub async fn create_room(
    state: &AppState,
    user_id: &str,
    title: Option<String>,
) -> Result<Room, AppError> {
    let user_id = required(user_id, "userId")?;
    with_store(state, move |store| store.create_room(&user_id, title.as_deref())).await
}

/// Active rooms of a user, newest first.
pub async fn list_rooms(state: &AppState, user_id: &str) -> Result<Vec<Room>, AppError> {
    let user_id = required(user_id, "userId")?;
    with_store(state, move |store| store.list_rooms(&user_id)).await
}

/// Room with its open session and message log.
pub async fn room_detail(state: &AppState, room_id: &str) -> Result<RoomDetail, AppError> {
    let room_id = room_id.to_string();
    with_store(state, move |store| {
        let room = store
            .get_room(&room_id)?
            .ok_or_else(|| StoreError::RoomNotFound(room_id.clone()))?;
        Ok(RoomDetail {
            session: store.open_session(&room_id)?,
            messages: store.list_messages(&room_id)?,
            room,
        })
    })
    .await
}

/// Close the room; its open session is superseded.
pub async fn deactivate_room(state: &AppState, room_id: &str) -> Result<(), AppError> {
    let id = room_id.to_string();
    let found = with_store(state, move |store| store.deactivate_room(&id)).await?;
    if !found {
        return Err(AppError::NotFound(format!("room {room_id} not found")));
    }
    Ok(())
}

/// Generate a script and open a new session in the room.
///
/// `tier` defaults to the owner's stored tier and must be unlocked. A
/// catalog topic named in any case is stored under its catalog name. When
/// `topic` is omitted one is recommended from the catalog, skipping the
/// owner's recent topics.
pub async fn start_conversation(
    state: &AppState,
    room_id: &str,
    topic: Option<String>,
    tier: Option<Tier>,
) -> Result<ConversationStarted, AppError> {
    let policy = state.engine.config().leveling;
    let lookup_id = room_id.to_string();
    let (room, progress, recent) = with_store(state, move |store| {
        let room = store
            .get_room(&lookup_id)?
            .ok_or_else(|| StoreError::RoomNotFound(lookup_id.clone()))?;
        let progress = store.get_progress(&room.user_id)?;
        let recent = store.recent_topics(&room.user_id, RECENT_TOPIC_WINDOW)?;
        Ok((room, progress, recent))
    })
    .await?;
    if !room.active {
        return Err(StoreError::RoomInactive(room.id).into());
    }

    let available = progress.available_tiers(&policy);
    let tier = tier.unwrap_or(progress.tier);
    if !available.contains(&tier) {
        return Err(AppError::TierLocked {
            requested: tier,
            unlocked: join_tiers(&available),
        });
    }

    let topic = match topic.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
        Some(topic) => find_topic(&topic_catalog(), &topic)
            .map(|t| t.name.clone())
            .unwrap_or(topic),
        None => {
            let seeded =
                with_store(state, move |store| store.list_topics(&BTreeSet::from([tier]))).await?;
            let catalog = if seeded.is_empty() { topic_catalog() } else { seeded };
            recommend_topic(&catalog, tier, &recent)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| NEUTRAL_TOPIC.to_string())
        }
    };

    let request = GenerationRequest::new(topic, tier, policy.next_exchange_count(tier));
    let started = Instant::now();
    let prepared = state.engine.prepare_script(&request).await;
    state.perf_metrics.lock().record_generate(elapsed_ms(started));

    let fallback_reason = match &prepared {
        ScriptOutcome::Fallback { reason, .. } => Some(reason.clone()),
        ScriptOutcome::Generated(_) => None,
    };
    let script = prepared.into_script();

    let room_id = room.id.clone();
    let fallback = fallback_reason.is_some();
    let started = Instant::now();
    let session =
        with_store(state, move |store| store.start_script(&room_id, &script, fallback)).await?;
    state.perf_metrics.lock().record_persist(elapsed_ms(started));
    state.scripts_started.fetch_add(1, Ordering::Relaxed);

    info!(
        room = %room.id,
        session = %session.id,
        topic = %session.topic,
        tier = %session.tier,
        fallback,
        "conversation started"
    );
    Ok(ConversationStarted {
        session,
        fallback_reason,
    })
}

/// Score one learner turn, typed (`message`) or spoken (`audio_data`,
/// base64 WAV, optionally as a `data:` URL). Audio wins when both are set.
pub async fn send_message(
    state: &AppState,
    room_id: &str,
    message: Option<String>,
    audio_data: Option<String>,
) -> Result<TurnReply, AppError> {
    let audio = audio_data.filter(|a| !a.trim().is_empty());
    let (candidate, transcription) = match (audio, message) {
        (Some(encoded), _) => {
            let wav = decode_audio_payload(&encoded)?;
            let started = Instant::now();
            let transcription = state.engine.transcribe_wav(wav).await;
            state
                .perf_metrics
                .lock()
                .record_transcribe(elapsed_ms(started));
            if let Transcription::Fallback { reason, .. } = &transcription {
                warn!(room = %room_id, %reason, "transcription fell back");
            }
            (transcription.text().to_string(), Some(transcription))
        }
        (None, Some(text)) => (text, None),
        (None, None) => {
            return Err(AppError::BadRequest(
                "either message or audio_data is required".into(),
            ))
        }
    };

    let config = state.engine.config().progression;
    let policy = state.engine.config().leveling;
    let id = room_id.to_string();
    let started = Instant::now();
    let applied = with_store(state, move |store| {
        store.apply_turn(&id, &candidate, &config, &policy)
    })
    .await;
    let total_ms = elapsed_ms(started);

    let record = match applied {
        Ok(record) => record,
        Err(err) => {
            state.turns_rejected.fetch_add(1, Ordering::Relaxed);
            info!(room = %room_id, "turn rejected: {err}");
            return Err(err);
        }
    };
    state.turns_applied.fetch_add(1, Ordering::Relaxed);
    {
        let score_ms = record.scored_in.as_secs_f64() * 1000.0;
        let mut metrics = state.perf_metrics.lock();
        metrics.record_score(score_ms);
        metrics.record_persist((total_ms - score_ms).max(0.0));
    }

    let turn = record.outcome.turn().clone();
    info!(
        room = %room_id,
        session = %record.session.id,
        score = turn.score,
        outcome = record.outcome.label(),
        "turn scored"
    );

    Ok(TurnReply {
        transcription,
        outcome: record.outcome.label(),
        summary: turn.alignment.summary(),
        turn,
        reply: record.reply,
        next_prompt: record.outcome.next_prompt().cloned(),
        progress: progress_view(state, record.user_id, record.progress),
        session: record.session,
        tier_unlocked: record.tier_unlocked,
    })
}

/// Leveling counters and unlocked tiers of a user.
pub async fn get_progress(state: &AppState, user_id: &str) -> Result<ProgressView, AppError> {
    let user_id = required(user_id, "userId")?;
    let lookup = user_id.clone();
    let progress = with_store(state, move |store| store.get_progress(&lookup)).await?;
    Ok(progress_view(state, user_id, progress))
}

/// Score history of a user over the last `range_days` (default 30).
pub async fn get_stats(
    state: &AppState,
    user_id: &str,
    range_days: Option<usize>,
) -> Result<ScoreStats, AppError> {
    let user_id = required(user_id, "userId")?;
    let range = range_days.unwrap_or(DEFAULT_STATS_RANGE_DAYS);
    with_store(state, move |store| store.score_stats(&user_id, range)).await
}

/// Topics the user may pick from, plus a recommendation for their tier.
pub async fn list_topics(state: &AppState, user_id: &str) -> Result<TopicsView, AppError> {
    let user_id = required(user_id, "userId")?;
    let policy = state.engine.config().leveling;
    let (progress, recent, topics) = with_store(state, move |store| {
        let progress = store.get_progress(&user_id)?;
        let available = progress.available_tiers(&policy);
        let recent = store.recent_topics(&user_id, RECENT_TOPIC_WINDOW)?;
        let topics = store.list_topics(&available)?;
        Ok((progress, recent, topics))
    })
    .await?;
    let recommended = recommend_topic(&topics, progress.tier, &recent).cloned();
    Ok(TopicsView {
        available_tiers: progress.available_tiers(&policy).into_iter().collect(),
        topics,
        recommended,
    })
}

pub fn get_perf_snapshot(state: &AppState) -> PerfSnapshot {
    state.perf_snapshot()
}

pub fn get_runtime_settings(state: &AppState) -> RuntimeSettings {
    state.settings.runtime_settings()
}

fn progress_view(
    state: &AppState,
    user_id: String,
    progress: LevelingState,
) -> ProgressView {
    let policy = state.engine.config().leveling;
    ProgressView {
        user_id,
        completed_count: progress.completed_count,
        tier: progress.tier,
        available_tiers: progress.available_tiers(&policy).into_iter().collect(),
        next_exchange_count: policy.next_exchange_count(progress.tier),
        conversations_until_next_tier: policy.conversations_until_next_tier(progress.completed_count),
    }
}

fn join_tiers(tiers: &BTreeSet<Tier>) -> String {
    tiers
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn decode_audio_payload(encoded: &str) -> Result<Vec<u8>, AppError> {
    let body = match encoded.split_once(";base64,") {
        Some((_, data)) => data,
        None => encoded,
    };
    BASE64
        .decode(body.trim())
        .map_err(|e| AppError::BadRequest(format!("audio_data is not valid base64: {e}")))
}
