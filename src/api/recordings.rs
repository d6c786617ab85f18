use axum::{
  extract::{rejection::JsonRejection, Path, State},
  http::StatusCode,
  Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::ApiState;
use crate::types::{AuthUser, NewRecording, NoteEvent, PublicRecording, Recording};

const INTERNAL: &str = "Internal server error";

fn invalid_payload() -> ApiError {
  ApiError::bad_request("Invalid payload")
}

fn not_found() -> ApiError {
  ApiError::not_found("Recording not found")
}

// Ids that are not UUIDs cannot name a stored recording.
fn recording_id(raw: &str) -> ApiResult<Uuid> {
  Uuid::parse_str(raw).map_err(|_| not_found())
}

/// `title` must be a non-empty string and `notes` an array of note events.
fn parse_new_recording(body: &Value, user_id: Uuid) -> ApiResult<NewRecording> {
  let title = body
    .get("title")
    .and_then(Value::as_str)
    .filter(|t| !t.is_empty())
    .ok_or_else(invalid_payload)?;
  let notes = body
    .get("notes")
    .filter(|n| n.is_array())
    .cloned()
    .ok_or_else(invalid_payload)?;
  let notes: Vec<NoteEvent> = serde_json::from_value(notes).map_err(|_| invalid_payload())?;
  let is_public = body.get("isPublic").and_then(Value::as_bool).unwrap_or(false);

  Ok(NewRecording {
    title: title.to_string(),
    notes,
    is_public,
    user_id,
  })
}

pub async fn create(
  State(state): State<ApiState>,
  Extension(user): Extension<AuthUser>,
  body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
  let Json(body) = body.map_err(|_| invalid_payload())?;
  let recording = parse_new_recording(&body, user.user_id)?;
  let is_public = recording.is_public;

  let created = state
    .store
    .insert_recording(recording)
    .await
    .map_err(|e| ApiError::internal("Error saving recording", e, INTERNAL))?;

  let owner = user.user_id.to_string();
  state.invalidator.user_recordings_changed(&owner).await;
  if is_public {
    state.invalidator.public_feed_changed().await;
  }

  Ok((StatusCode::CREATED, Json(json!({ "insertedId": created.id }))))
}

pub async fn list_own(
  State(state): State<ApiState>,
  Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Recording>>> {
  let recordings = state
    .store
    .list_recordings_by_owner(user.user_id)
    .await
    .map_err(|e| ApiError::internal("Error fetching recordings", e, INTERNAL))?;
  Ok(Json(recordings))
}

pub async fn public_feed(State(state): State<ApiState>) -> ApiResult<Json<Vec<PublicRecording>>> {
  let feed = state
    .store
    .list_public_feed()
    .await
    .map_err(|e| ApiError::internal("Error fetching public recordings", e, INTERNAL))?;
  Ok(Json(feed))
}

#[derive(Debug, Deserialize)]
pub struct VisibilityUpdate {
  #[serde(rename = "isPublic")]
  is_public: bool,
}

pub async fn update_visibility(
  State(state): State<ApiState>,
  Extension(user): Extension<AuthUser>,
  Path(id): Path<String>,
  body: Result<Json<VisibilityUpdate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
  let id = recording_id(&id)?;
  let Json(update) = body.map_err(|_| invalid_payload())?;

  let existing = state
    .store
    .find_recording(id, user.user_id)
    .await
    .map_err(|e| ApiError::internal("Error updating recording", e, INTERNAL))?
    .ok_or_else(not_found)?;

  let matched = state
    .store
    .set_recording_visibility(id, user.user_id, update.is_public)
    .await
    .map_err(|e| ApiError::internal("Error updating recording", e, INTERNAL))?;
  if !matched {
    return Err(not_found());
  }

  state
    .invalidator
    .user_recordings_changed(&user.user_id.to_string())
    .await;
  if existing.is_public || update.is_public {
    state.invalidator.public_feed_changed().await;
  }

  tracing::info!("Recording {} updated: isPublic={}", id, update.is_public);
  Ok(Json(json!({ "message": "Recording updated successfully" })))
}

pub async fn delete(
  State(state): State<ApiState>,
  Extension(user): Extension<AuthUser>,
  Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
  let id = recording_id(&id)?;

  let existing = state
    .store
    .find_recording(id, user.user_id)
    .await
    .map_err(|e| ApiError::internal("Error deleting recording", e, INTERNAL))?
    .ok_or_else(not_found)?;

  let deleted = state
    .store
    .delete_recording(id, user.user_id)
    .await
    .map_err(|e| ApiError::internal("Error deleting recording", e, INTERNAL))?;
  if !deleted {
    return Err(not_found());
  }

  state
    .invalidator
    .user_recordings_changed(&user.user_id.to_string())
    .await;
  if existing.is_public {
    state.invalidator.public_feed_changed().await;
  }

  tracing::info!("Recording {} deleted successfully", id);
  Ok(Json(json!({ "message": "Recording deleted successfully" })))
}
