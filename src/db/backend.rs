use async_trait::async_trait;
use uuid::Uuid;

use crate::types::{NewRecording, NewUser, ProfileUpdate, PublicRecording, Recording, User};

/// Persistence for users and recordings.
///
/// Mutations report whether a row was affected so callers can skip cache
/// invalidation when nothing changed.
#[async_trait]
pub trait RecordStore: Send + Sync {
  async fn init_schema(&self) -> Result<(), anyhow::Error>;

  // Recordings

  async fn insert_recording(&self, recording: NewRecording) -> Result<Recording, anyhow::Error>;

  /// Recordings owned by `user_id`, in insertion order.
  async fn list_recordings_by_owner(&self, user_id: Uuid) -> Result<Vec<Recording>, anyhow::Error>;

  /// Public recordings joined with their owner's display fields, newest first.
  async fn list_public_feed(&self) -> Result<Vec<PublicRecording>, anyhow::Error>;

  /// A recording, only if it belongs to `user_id`.
  async fn find_recording(
    &self,
    id: Uuid,
    user_id: Uuid,
  ) -> Result<Option<Recording>, anyhow::Error>;

  async fn set_recording_visibility(
    &self,
    id: Uuid,
    user_id: Uuid,
    is_public: bool,
  ) -> Result<bool, anyhow::Error>;

  async fn delete_recording(&self, id: Uuid, user_id: Uuid) -> Result<bool, anyhow::Error>;

  // Users

  async fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>, anyhow::Error>;

  async fn insert_user(&self, user: NewUser) -> Result<User, anyhow::Error>;

  async fn get_user(&self, id: Uuid) -> Result<Option<User>, anyhow::Error>;

  /// True when some user other than `user_id` already holds `username`.
  async fn username_taken_by_other(
    &self,
    username: &str,
    user_id: Uuid,
  ) -> Result<bool, anyhow::Error>;

  async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<bool, anyhow::Error>;

  async fn set_profile_image(&self, id: Uuid, image_url: String) -> Result<bool, anyhow::Error>;
}
