use axum::{
  extract::{Multipart, State},
  Extension, Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use super::error::{ApiError, ApiResult};
use super::ApiState;
use crate::types::AuthUser;

const IMAGE_FIELD: &str = "image";

struct Image {
  mime: String,
  bytes: Vec<u8>,
}

impl Image {
  fn data_url(&self) -> String {
    format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
  }
}

/// Pull the `image` part out of the form, enforcing type and size while
/// streaming so oversized files are never fully buffered.
async fn read_image(multipart: &mut Multipart, max_bytes: usize) -> ApiResult<Option<Image>> {
  let malformed = |e: axum::extract::multipart::MultipartError| {
    tracing::debug!("Malformed multipart body: {}", e);
    ApiError::bad_request("Invalid multipart body")
  };

  while let Some(mut field) = multipart.next_field().await.map_err(malformed)? {
    if field.name() != Some(IMAGE_FIELD) {
      continue;
    }

    let mime = field.content_type().unwrap_or_default().to_string();
    if !mime.starts_with("image/") {
      return Err(ApiError::bad_request("Only image files are allowed"));
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(malformed)? {
      if bytes.len() + chunk.len() > max_bytes {
        return Err(ApiError::PayloadTooLarge("File too large".into()));
      }
      bytes.extend_from_slice(&chunk);
    }
    return Ok(Some(Image { mime, bytes }));
  }

  Ok(None)
}

pub async fn profile_image(
  State(state): State<ApiState>,
  Extension(auth): Extension<AuthUser>,
  mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
  let image = read_image(&mut multipart, state.max_image_bytes)
    .await?
    .ok_or_else(|| ApiError::bad_request("No image file provided"))?;
  let image_url = image.data_url();

  let matched = state
    .store
    .set_profile_image(auth.user_id, image_url.clone())
    .await
    .map_err(|e| ApiError::internal("Upload error", e, "Failed to upload image"))?;
  if !matched {
    return Err(ApiError::not_found("User not found"));
  }

  state
    .invalidator
    .profile_changed(&auth.user_id.to_string())
    .await;

  tracing::info!("Profile image updated for user: {}", auth.user_id);
  Ok(Json(json!({
    "imageUrl": image_url,
    "message": "Profile image updated successfully"
  })))
}
