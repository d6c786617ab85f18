use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::decode_google_credential;
use super::error::{ApiError, ApiResult};
use super::ApiState;
use crate::types::{AuthUser, NewUser, ProfileUpdate, UserProfile};

#[derive(Debug, Deserialize)]
pub struct GoogleAuthRequest {
  #[serde(default)]
  credential: String,
}

/// Exchange a Google ID token for a session token, creating the user on
/// first sign-in.
pub async fn google_auth(
  State(state): State<ApiState>,
  body: Result<Json<GoogleAuthRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
  let Json(req) = body.map_err(|_| ApiError::bad_request("Invalid credential"))?;
  let identity = decode_google_credential(&req.credential)
    .ok_or_else(|| ApiError::bad_request("Invalid credential"))?;

  let failed = |e: anyhow::Error| ApiError::internal("Google auth error", e, "Authentication failed");

  let user = match state
    .store
    .find_user_by_google_id(&identity.sub)
    .await
    .map_err(failed)?
  {
    Some(user) => user,
    None => {
      let user = state
        .store
        .insert_user(NewUser {
          google_id: identity.sub,
          email: identity.email,
          name: identity.name,
          picture: identity.picture,
          username: format!("user_{}", Utc::now().timestamp_millis()),
        })
        .await
        .map_err(failed)?;
      tracing::info!("Created user {} ({})", user.id, user.username);
      user
    }
  };

  let token = state
    .tokens
    .issue(&user)
    .map_err(|e| ApiError::internal("Google auth error", e, "Authentication failed"))?;

  Ok(Json(json!({ "token": token, "user": user })))
}

pub async fn get_profile(
  State(state): State<ApiState>,
  Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<UserProfile>> {
  let user = state
    .store
    .get_user(auth.user_id)
    .await
    .map_err(|e| ApiError::internal("Get profile error", e, "Failed to get profile"))?
    .ok_or_else(|| ApiError::not_found("User not found"))?;
  Ok(Json(user.profile()))
}

pub async fn update_profile(
  State(state): State<ApiState>,
  Extension(auth): Extension<AuthUser>,
  body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
  let Json(update) = body.map_err(|_| ApiError::bad_request("Invalid payload"))?;
  // Empty strings mean "leave unchanged".
  let update = ProfileUpdate {
    username: update.username.filter(|u| !u.is_empty()),
    name: update.name.filter(|n| !n.is_empty()),
  };
  let failed =
    |e: anyhow::Error| ApiError::internal("Update profile error", e, "Failed to update profile");

  if let Some(username) = &update.username {
    let taken = state
      .store
      .username_taken_by_other(username, auth.user_id)
      .await
      .map_err(failed)?;
    if taken {
      return Err(ApiError::bad_request("Username already taken"));
    }
  }

  let matched = state
    .store
    .update_profile(auth.user_id, update)
    .await
    .map_err(failed)?;
  if !matched {
    return Err(ApiError::not_found("User not found"));
  }

  state
    .invalidator
    .profile_changed(&auth.user_id.to_string())
    .await;

  tracing::info!("Profile updated for user: {}", auth.user_id);
  Ok(Json(json!({ "message": "Profile updated successfully" })))
}
