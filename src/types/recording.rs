use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One key press, `time` in milliseconds from the start of the take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
  pub key: String,
  pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
  #[serde(rename = "_id")]
  pub id: Uuid,
  pub title: String,
  pub notes: Vec<NoteEvent>,
  pub is_public: bool,
  pub user_id: Uuid,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRecording {
  pub title: String,
  pub notes: Vec<NoteEvent>,
  pub is_public: bool,
  pub user_id: Uuid,
}

/// Owner fields copied into each public feed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAuthor {
  pub username: String,
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub profile_image: Option<String>,
}

/// A public recording as served by the feed. Never carries `isPublic` or
/// the owner's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicRecording {
  #[serde(rename = "_id")]
  pub id: Uuid,
  pub title: String,
  pub notes: Vec<NoteEvent>,
  pub created_at: DateTime<Utc>,
  pub user: PublicAuthor,
}
