mod error;
mod paths;
mod schema;
mod store;

pub use error::SessionStoreError;
pub use paths::{default_history_dir, is_valid_session_id, session_file_name, session_path};
pub use schema::{SessionRecord, NO_HUMAN_MESSAGE, PREVIEW_CHARS};
pub use store::{SessionStore, SessionSummary};
