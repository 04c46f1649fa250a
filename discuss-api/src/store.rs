use async_trait::async_trait;

use crate::{
    Comment, CommentId, ContentId, NewComment, Page, ReactionKind, ReactionState, SortMode,
    UserRef,
};

/// Persistence backend for comments, reactions and user lookups
#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn list_root_comments(
        &self,
        content: ContentId,
        page: u32,
        sort: SortMode,
    ) -> anyhow::Result<Page<Comment>>;
    async fn list_replies(&self, parent: CommentId, page: u32) -> anyhow::Result<Page<Comment>>;
    async fn create_comment(&self, c: NewComment) -> anyhow::Result<Comment>;
    async fn update_comment(&self, id: CommentId, body: String) -> anyhow::Result<Comment>;
    async fn delete_comment(&self, id: CommentId) -> anyhow::Result<()>;
    async fn react_to_comment(
        &self,
        id: CommentId,
        kind: ReactionKind,
    ) -> anyhow::Result<ReactionState>;
    async fn search_users(&self, fragment: &str, limit: usize) -> anyhow::Result<Vec<UserRef>>;
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Verdict {
    pub is_allowed: bool,
    pub reason: Option<String>,
}

impl Verdict {
    pub fn allowed() -> Verdict {
        Verdict {
            is_allowed: true,
            reason: None,
        }
    }

    pub fn rejected(reason: Option<String>) -> Verdict {
        Verdict {
            is_allowed: false,
            reason,
        }
    }
}

/// Content filter consulted before every create or edit
#[async_trait]
pub trait Moderator: Send + Sync {
    async fn check_content(&self, body: &str) -> anyhow::Result<Verdict>;
}
