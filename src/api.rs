// src/api.rs
//! HTTP surface over the tagging engine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::tagging::{RuntimeState, ScoredTag, TagKind, TaggingError, TaggingStats, TextMeta};

#[derive(Clone)]
pub struct AppState {
    pub tagger: Arc<RuntimeState>,
}

impl AppState {
    pub fn new(tagger: Arc<RuntimeState>) -> Self {
        Self { tagger }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/tag", post(tag))
        .route("/tag/scored", post(tag_scored))
        .route("/tags/merge", post(merge_tags))
        .route("/admin/reload", post(admin_reload))
        .route("/admin/validate", get(admin_validate))
        .route("/stats", get(stats))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn default_kind() -> TagKind {
    TagKind::Meeting
}

#[derive(Deserialize)]
struct TagReq {
    text: String,
    #[serde(default = "default_kind")]
    kind: TagKind,
    #[serde(default)]
    title: String,
    #[serde(default)]
    attendees: Vec<String>,
}

#[derive(Serialize)]
struct TagResp {
    labels: Vec<String>,
    version: u64,
}

async fn tag(State(state): State<AppState>, Json(body): Json<TagReq>) -> Json<TagResp> {
    let meta = TextMeta {
        title: body.title,
        attendees: body.attendees,
    };
    let labels = state.tagger.tag_text_with_meta(&body.text, body.kind, &meta);
    Json(TagResp {
        labels,
        version: state.tagger.version(),
    })
}

#[derive(Deserialize)]
struct ScoredReq {
    text: String,
    #[serde(default)]
    threshold: Option<f64>,
}

#[derive(Serialize)]
struct ScoredResp {
    tags: Vec<ScoredTag>,
    threshold: f64,
    labels: Vec<String>,
}

async fn tag_scored(State(state): State<AppState>, Json(body): Json<ScoredReq>) -> Json<ScoredResp> {
    let threshold = body
        .threshold
        .filter(|t| t.is_finite())
        .unwrap_or(state.tagger.config().min_score);
    let tags = state.tagger.tag_text_scored(&body.text);
    let labels = crate::tagging::scored::labels_above(&tags, threshold);
    Json(ScoredResp {
        tags,
        threshold,
        labels,
    })
}

#[derive(Deserialize)]
struct MergeReq {
    #[serde(default)]
    meeting: Vec<String>,
    #[serde(default)]
    commit: Vec<String>,
}

#[derive(Serialize)]
struct LabelsResp {
    labels: Vec<String>,
}

async fn merge_tags(State(state): State<AppState>, Json(body): Json<MergeReq>) -> Json<LabelsResp> {
    let labels = state
        .tagger
        .merge_meeting_and_commit_tags(&body.meeting, &body.commit);
    Json(LabelsResp { labels })
}

#[derive(Serialize)]
struct ReloadOk {
    rules_count: usize,
    version: u64,
}

#[derive(Serialize)]
struct ErrorsResp {
    errors: Vec<String>,
}

fn error_response(err: TaggingError) -> Response {
    let status = match &err {
        TaggingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TaggingError::Catalog(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let errors = match err {
        TaggingError::Validation(errs) => errs,
        other => vec![other.to_string()],
    };
    (status, Json(ErrorsResp { errors })).into_response()
}

async fn admin_reload(State(state): State<AppState>) -> Response {
    let tagger = state.tagger.clone();
    let res = tokio::task::spawn_blocking(move || tagger.reload_rules()).await;
    match res {
        Ok(Ok(rules_count)) => Json(ReloadOk {
            rules_count,
            version: state.tagger.version(),
        })
        .into_response(),
        Ok(Err(e)) => {
            warn!(target: "tagging", error = %e, "admin reload failed");
            error_response(e)
        }
        Err(e) => {
            warn!(target: "tagging", error = %e, "admin reload task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorsResp {
                    errors: vec![e.to_string()],
                }),
            )
                .into_response()
        }
    }
}

#[derive(Serialize)]
struct ValidateResp {
    valid: bool,
    messages: Vec<String>,
}

async fn admin_validate(State(state): State<AppState>) -> Json<ValidateResp> {
    let messages = state.tagger.validate_rules();
    let valid = messages.iter().all(|m| m.starts_with("WARNING: "));
    Json(ValidateResp { valid, messages })
}

async fn stats(State(state): State<AppState>) -> Json<TaggingStats> {
    Json(state.tagger.get_rules_stats())
}
