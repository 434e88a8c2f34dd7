//! Route handlers. Each stage route delegates to the [`Orchestrator`].

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use draftsmith_core::{EditRequest, Orchestrator, ResearchMode, TopicOutcome, TopicRequest};
use draftsmith_shared::{ContentItemId, ContentStatus, Stage};
use draftsmith_storage::ContentItemPatch;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{ApiError, ApiResult};

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Build the application router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/topic", post(select_topic))
        .route("/research/:id", post(run_research).get(get_research))
        .route("/write/:id", post(write_draft))
        .route("/edit/:id", post(edit_draft))
        .route("/edit/:id/apply", post(apply_edit))
        .route("/publish/:id", post(publish))
        .route("/blog", get(list_blogs).post(create_blog))
        .route("/blog/:id", get(get_blog).put(update_blog).delete(delete_blog))
}

fn parse_id(raw: &str) -> ApiResult<ContentItemId> {
    raw.parse().map_err(ApiError::from)
}

// ---------------------------------------------------------------------------
// Stage routes
// ---------------------------------------------------------------------------

async fn select_topic(
    State(state): State<AppState>,
    payload: Result<Json<TopicRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let result = state.orchestrator.select_topic(request).await?;
    let next_step = next_route(result.next_stage);

    Ok(Json(match result.payload {
        TopicOutcome::Suggestions(topics) => json!({
            "topics": topics,
            "nextStep": next_step,
        }),
        TopicOutcome::Selected(item) => json!({
            "selectedTopic": item.topic,
            "contentItemId": item.id,
            "nextStep": next_step,
        }),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct ResearchBody {
    #[serde(default)]
    action: ResearchMode,
}

async fn run_research(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ResearchBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let mode = match payload {
        Ok(Json(body)) => body.action,
        Err(JsonRejection::MissingJsonContentType(_)) => ResearchMode::default(),
        Err(rejection) => return Err(rejection.into()),
    };

    let result = state.orchestrator.research(&id, mode).await?;
    Ok(Json(json!({
        "source": result.payload.source,
        "mainTopicSummary": result.payload.main_topic,
        "researchSource": result.payload.related_topics,
        "nextStep": next_route(result.next_stage),
    })))
}

async fn get_research(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let research = state
        .orchestrator
        .storage()
        .get_research(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no research stored for content item {id}")))?;
    Ok(Json(json!({ "research": research })))
}

async fn write_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let result = state.orchestrator.write(&id).await?;
    Ok(Json(json!({
        "contentItemId": result.payload.id,
        "content": result.payload.content,
        "nextStep": next_route(result.next_stage),
    })))
}

async fn edit_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<EditRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let id = parse_id(&id)?;

    let result = state.orchestrator.edit(&id, request).await?;
    Ok(Json(json!({
        "cleanResponse": result.payload,
        "nextStep": next_route(result.next_stage),
    })))
}

#[derive(Debug, Deserialize)]
struct ApplyBody {
    #[serde(default)]
    content: String,
}

async fn apply_edit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ApplyBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = payload?;
    let id = parse_id(&id)?;
    let result = state.orchestrator.apply_edit(&id, &body.content).await?;
    Ok(Json(json!({
        "blog": result.payload,
        "nextStep": next_route(result.next_stage),
    })))
}

async fn publish(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let result = state.orchestrator.publish(&id).await?;
    Ok(Json(json!({ "blog": result.payload })))
}

// ---------------------------------------------------------------------------
// Plain CRUD
// ---------------------------------------------------------------------------

async fn list_blogs(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let blogs = state.orchestrator.storage().list_content_items().await?;
    Ok(Json(json!({ "blogs": blogs })))
}

async fn get_blog(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let storage = state.orchestrator.storage();
    let blog = storage
        .get_content_item(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("content item {id} not found")))?;
    let research = storage.get_research(&id).await?.map(|r| r.content);

    Ok(Json(json!({ "blog": blog, "research": research })))
}

#[derive(Debug, Default, Deserialize)]
struct CreateBody {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    status: Option<ContentStatus>,
}

async fn create_blog(
    State(state): State<AppState>,
    payload: Result<Json<CreateBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = payload?;
    let blog = state
        .orchestrator
        .storage()
        .insert_content_item(
            body.topic.as_deref(),
            body.content.as_deref(),
            body.status.unwrap_or_default(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "blog": blog }))))
}

async fn update_blog(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ContentItemPatch>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(patch) = payload?;
    let id = parse_id(&id)?;
    let blog = state
        .orchestrator
        .storage()
        .update_content_item(&id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("content item {id} not found")))?;
    Ok(Json(json!({ "blog": blog })))
}

async fn delete_blog(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    if !state.orchestrator.storage().delete_content_item(&id).await? {
        return Err(ApiError::not_found(format!("content item {id} not found")));
    }
    Ok(Json(json!({ "success": true, "message": "content item deleted" })))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct HealthQuery {
    #[serde(default)]
    quick: bool,
}

async fn health(
    State(state): State<AppState>,
    query: Result<Query<HealthQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let report = state.orchestrator.health(query.quick).await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(report)))
}

/// Advisory route the client calls next.
fn next_route(stage: Option<Stage>) -> Option<&'static str> {
    stage.map(|s| s.route())
}
