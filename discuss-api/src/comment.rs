use uuid::Uuid;

use crate::{ContentId, ReactionState, Time, UserId, UserRef, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn stub() -> CommentId {
        CommentId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub content_id: ContentId,
    pub author_id: UserId,
    pub author_name: String,
    pub body: String,

    /// None for a depth-0 comment
    pub parent_id: Option<CommentId>,

    pub created_at: Time,
    pub updated_at: Time,
    pub edited: bool,

    /// Set by moderation, never by the client
    pub hidden: bool,
    pub hidden_reason: Option<String>,

    #[serde(flatten)]
    pub reactions: ReactionState,

    /// Number of direct replies as reported by the server, regardless of how
    /// many of them are currently loaded
    pub direct_child_count: u64,

    pub mentions: Vec<UserRef>,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum CommentTarget {
    Content(ContentId),
    Parent(CommentId),
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub target: CommentTarget,
    pub body: String,
}
