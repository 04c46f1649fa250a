use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod comment;
pub use comment::{Comment, CommentId, CommentTarget, NewComment};

mod content;
pub use content::{ContentId, Page, SortMode};

mod error;
pub use error::Error;

mod reaction;
pub use reaction::{Reaction, ReactionDelta, ReactionKind, ReactionState};

mod store;
pub use store::{CommentStore, Moderator, Verdict};

mod user;
pub use user::{Role, UserId, UserRef, Viewer};
