mod recording;
mod user;

pub use recording::{NewRecording, NoteEvent, PublicAuthor, PublicRecording, Recording};
pub use user::{AuthUser, GoogleIdentity, NewUser, ProfileUpdate, User, UserProfile};
