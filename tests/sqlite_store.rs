use steinway::db::{RecordStore, SqliteStore};
use steinway::types::{NewRecording, NewUser, NoteEvent};

#[tokio::test]
async fn test_init_schema_is_idempotent() {
  let store = SqliteStore::in_memory().await.unwrap();
  store.init_schema().await.unwrap();
  store.init_schema().await.unwrap();
}

#[tokio::test]
async fn test_data_survives_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("steinway.db");
  let path = path.to_str().unwrap();

  let (user_id, recording_id) = {
    let store = SqliteStore::new(path).await.unwrap();
    store.init_schema().await.unwrap();
    let user = store
      .insert_user(NewUser {
        google_id: "g-1".into(),
        email: None,
        name: Some("Clara".into()),
        picture: None,
        username: "clara".into(),
      })
      .await
      .unwrap();
    let rec = store
      .insert_recording(NewRecording {
        title: "Romance".into(),
        notes: vec![NoteEvent {
          key: "F#5".into(),
          time: 1234.25,
        }],
        is_public: true,
        user_id: user.id,
      })
      .await
      .unwrap();
    (user.id, rec.id)
  };

  let store = SqliteStore::new(path).await.unwrap();
  store.init_schema().await.unwrap();

  let rec = store
    .find_recording(recording_id, user_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(rec.title, "Romance");
  assert_eq!(rec.notes[0].key, "F#5");
  assert_eq!(rec.notes[0].time, 1234.25);

  let feed = store.list_public_feed().await.unwrap();
  assert_eq!(feed.len(), 1);
  assert_eq!(feed[0].user.name.as_deref(), Some("Clara"));
}
