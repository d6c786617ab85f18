use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, types::Type, OptionalExtension, Row};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use super::backend::RecordStore;
use crate::types::{
  NewRecording, NewUser, NoteEvent, ProfileUpdate, PublicAuthor, PublicRecording, Recording, User,
};

const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA temp_store = MEMORY;
"#;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    google_id TEXT NOT NULL UNIQUE,
    email TEXT,
    name TEXT,
    picture TEXT,
    username TEXT NOT NULL,
    profile_image TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);

CREATE TABLE IF NOT EXISTS recordings (
    id TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    notes TEXT NOT NULL,
    is_public INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_recordings_user ON recordings(user_id);
CREATE INDEX IF NOT EXISTS idx_recordings_public ON recordings(is_public, created_at);
"#;

const USER_COLUMNS: &str =
  "id, google_id, email, name, picture, username, profile_image, created_at";
const RECORDING_COLUMNS: &str = "id, user_id, title, notes, is_public, created_at";

/// SQLite-backed store. Pass `:memory:` for a throwaway database.
pub struct SqliteStore {
  conn: Connection,
}

impl SqliteStore {
  pub async fn new(path: &str) -> Result<Self, anyhow::Error> {
    let conn = if path == ":memory:" {
      Connection::open_in_memory().await?
    } else {
      Connection::open(path).await?
    };

    conn
      .call(|conn| conn.execute_batch(PRAGMAS).map_err(|e| e.into()))
      .await?;

    Ok(Self { conn })
  }

  pub async fn in_memory() -> Result<Self, anyhow::Error> {
    let store = Self::new(":memory:").await?;
    store.init_schema().await?;
    Ok(store)
  }
}

#[async_trait]
impl RecordStore for SqliteStore {
  async fn init_schema(&self) -> Result<(), anyhow::Error> {
    self
      .conn
      .call(|conn| conn.execute_batch(SCHEMA).map_err(|e| e.into()))
      .await?;
    tracing::info!("SQLite schema initialized");
    Ok(())
  }

  async fn insert_recording(&self, recording: NewRecording) -> Result<Recording, anyhow::Error> {
    let id = Uuid::new_v4();
    let now = Utc::now().trunc_subsecs(6);
    let notes = serde_json::to_string(&recording.notes)?;
    let (id_str, user_str, title, now_str, is_public) = (
      id.to_string(),
      recording.user_id.to_string(),
      recording.title.clone(),
      timestamp(&now),
      recording.is_public,
    );

    self
      .conn
      .call(move |conn| {
        conn
          .execute(
            "INSERT INTO recordings (id, user_id, title, notes, is_public, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id_str, user_str, title, notes, is_public, now_str],
          )
          .map_err(|e| e.into())
      })
      .await?;

    Ok(Recording {
      id,
      title: recording.title,
      notes: recording.notes,
      is_public: recording.is_public,
      user_id: recording.user_id,
      created_at: now,
    })
  }

  async fn list_recordings_by_owner(&self, user_id: Uuid) -> Result<Vec<Recording>, anyhow::Error> {
    let user_str = user_id.to_string();
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(&format!(
          "SELECT {} FROM recordings WHERE user_id = ?1 ORDER BY rowid",
          RECORDING_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_str], row_to_recording)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
      })
      .await
      .map_err(|e| anyhow::anyhow!("{}", e))
  }

  async fn list_public_feed(&self) -> Result<Vec<PublicRecording>, anyhow::Error> {
    self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT r.id, r.title, r.notes, r.created_at, u.username, u.name, u.profile_image
           FROM recordings r JOIN users u ON u.id = r.user_id
           WHERE r.is_public = 1
           ORDER BY r.created_at DESC, r.rowid DESC",
        )?;
        let rows = stmt.query_map([], |row| {
          Ok(PublicRecording {
            id: parse_uuid(row, 0)?,
            title: row.get(1)?,
            notes: parse_notes(row, 2)?,
            created_at: parse_time(row, 3)?,
            user: PublicAuthor {
              username: row.get(4)?,
              name: row.get(5)?,
              profile_image: row.get(6)?,
            },
          })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
      })
      .await
      .map_err(|e| anyhow::anyhow!("{}", e))
  }

  async fn find_recording(
    &self,
    id: Uuid,
    user_id: Uuid,
  ) -> Result<Option<Recording>, anyhow::Error> {
    let (id_str, user_str) = (id.to_string(), user_id.to_string());
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(&format!(
          "SELECT {} FROM recordings WHERE id = ?1 AND user_id = ?2",
          RECORDING_COLUMNS
        ))?;
        Ok(
          stmt
            .query_row(params![id_str, user_str], row_to_recording)
            .optional()?,
        )
      })
      .await
      .map_err(|e| anyhow::anyhow!("{}", e))
  }

  async fn set_recording_visibility(
    &self,
    id: Uuid,
    user_id: Uuid,
    is_public: bool,
  ) -> Result<bool, anyhow::Error> {
    let (id_str, user_str) = (id.to_string(), user_id.to_string());
    let changed = self
      .conn
      .call(move |conn| {
        conn
          .execute(
            "UPDATE recordings SET is_public = ?1 WHERE id = ?2 AND user_id = ?3",
            params![is_public, id_str, user_str],
          )
          .map_err(|e| e.into())
      })
      .await?;
    Ok(changed > 0)
  }

  async fn delete_recording(&self, id: Uuid, user_id: Uuid) -> Result<bool, anyhow::Error> {
    let (id_str, user_str) = (id.to_string(), user_id.to_string());
    let changed = self
      .conn
      .call(move |conn| {
        conn
          .execute(
            "DELETE FROM recordings WHERE id = ?1 AND user_id = ?2",
            params![id_str, user_str],
          )
          .map_err(|e| e.into())
      })
      .await?;
    Ok(changed > 0)
  }

  async fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>, anyhow::Error> {
    let google_id = google_id.to_string();
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(&format!(
          "SELECT {} FROM users WHERE google_id = ?1",
          USER_COLUMNS
        ))?;
        Ok(stmt.query_row(params![google_id], row_to_user).optional()?)
      })
      .await
      .map_err(|e| anyhow::anyhow!("{}", e))
  }

  async fn insert_user(&self, user: NewUser) -> Result<User, anyhow::Error> {
    let created = User {
      id: Uuid::new_v4(),
      google_id: user.google_id,
      email: user.email,
      name: user.name,
      picture: user.picture,
      username: user.username,
      profile_image: None,
      created_at: Utc::now().trunc_subsecs(6),
    };
    let row = created.clone();

    self
      .conn
      .call(move |conn| {
        conn
          .execute(
            "INSERT INTO users (id, google_id, email, name, picture, username, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
              row.id.to_string(),
              row.google_id,
              row.email,
              row.name,
              row.picture,
              row.username,
              timestamp(&row.created_at)
            ],
          )
          .map_err(|e| e.into())
      })
      .await?;

    Ok(created)
  }

  async fn get_user(&self, id: Uuid) -> Result<Option<User>, anyhow::Error> {
    let id_str = id.to_string();
    self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare_cached(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))?;
        Ok(stmt.query_row(params![id_str], row_to_user).optional()?)
      })
      .await
      .map_err(|e| anyhow::anyhow!("{}", e))
  }

  async fn username_taken_by_other(
    &self,
    username: &str,
    user_id: Uuid,
  ) -> Result<bool, anyhow::Error> {
    let (username, id_str) = (username.to_string(), user_id.to_string());
    self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare_cached("SELECT 1 FROM users WHERE username = ?1 AND id != ?2 LIMIT 1")?;
        Ok(stmt.exists(params![username, id_str])?)
      })
      .await
      .map_err(|e| anyhow::anyhow!("{}", e))
  }

  async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<bool, anyhow::Error> {
    let id_str = id.to_string();
    let changed = self
      .conn
      .call(move |conn| {
        conn
          .execute(
            "UPDATE users SET username = COALESCE(?1, username), name = COALESCE(?2, name) WHERE id = ?3",
            params![update.username, update.name, id_str],
          )
          .map_err(|e| e.into())
      })
      .await?;
    Ok(changed > 0)
  }

  async fn set_profile_image(&self, id: Uuid, image_url: String) -> Result<bool, anyhow::Error> {
    let id_str = id.to_string();
    let changed = self
      .conn
      .call(move |conn| {
        conn
          .execute(
            "UPDATE users SET profile_image = ?1 WHERE id = ?2",
            params![image_url, id_str],
          )
          .map_err(|e| e.into())
      })
      .await?;
    Ok(changed > 0)
  }
}

// Fixed-width timestamps so `ORDER BY created_at` sorts chronologically.
fn timestamp(t: &DateTime<Utc>) -> String {
  t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_uuid(row: &Row, idx: usize) -> Result<Uuid, rusqlite::Error> {
  let s: String = row.get(idx)?;
  s.parse().map_err(|e| conversion_error(idx, e))
}

fn parse_time(row: &Row, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
  let s: String = row.get(idx)?;
  DateTime::parse_from_rfc3339(&s)
    .map(|d| d.with_timezone(&Utc))
    .map_err(|e| conversion_error(idx, e))
}

fn parse_notes(row: &Row, idx: usize) -> Result<Vec<NoteEvent>, rusqlite::Error> {
  let s: String = row.get(idx)?;
  serde_json::from_str(&s).map_err(|e| conversion_error(idx, e))
}

fn row_to_recording(row: &Row) -> Result<Recording, rusqlite::Error> {
  Ok(Recording {
    id: parse_uuid(row, 0)?,
    user_id: parse_uuid(row, 1)?,
    title: row.get(2)?,
    notes: parse_notes(row, 3)?,
    is_public: row.get(4)?,
    created_at: parse_time(row, 5)?,
  })
}

fn row_to_user(row: &Row) -> Result<User, rusqlite::Error> {
  Ok(User {
    id: parse_uuid(row, 0)?,
    google_id: row.get(1)?,
    email: row.get(2)?,
    name: row.get(3)?,
    picture: row.get(4)?,
    username: row.get(5)?,
    profile_image: row.get(6)?,
    created_at: parse_time(row, 7)?,
  })
}
