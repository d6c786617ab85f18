use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  #[serde(rename = "_id")]
  pub id: Uuid,
  pub google_id: String,
  pub email: Option<String>,
  pub name: Option<String>,
  pub picture: Option<String>,
  pub username: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub profile_image: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl User {
  pub fn profile(&self) -> UserProfile {
    UserProfile {
      id: self.id,
      email: self.email.clone(),
      name: self.name.clone(),
      picture: self.picture.clone(),
      username: self.username.clone(),
      profile_image: self.profile_image.clone(),
      created_at: self.created_at,
    }
  }
}

/// A user as returned by profile reads: everything but the Google subject id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
  #[serde(rename = "_id")]
  pub id: Uuid,
  pub email: Option<String>,
  pub name: Option<String>,
  pub picture: Option<String>,
  pub username: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub profile_image: Option<String>,
  pub created_at: DateTime<Utc>,
}

/// Claims taken from a Google ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleIdentity {
  pub sub: String,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub picture: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
  pub google_id: String,
  pub email: Option<String>,
  pub name: Option<String>,
  pub picture: Option<String>,
  pub username: String,
}

/// Fields a user may change on their own profile. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
}

/// Identity attached to a request by the bearer-token middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
  pub user_id: Uuid,
  pub email: Option<String>,
}
