use async_trait::async_trait;

use crate::{
    api::{Comment, CommentId, ReactionState},
    Error,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Interaction {
    Like,
    Dislike,
    Delete,
    Edit(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Reacted(ReactionState),
    Edited(Comment),
    Deleted { parent: Option<CommentId> },
    Replied(Comment),
}

/// A confirmed mutation, as it travels up towards the thread root
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Applied {
    pub target: CommentId,
    pub outcome: Outcome,
}

/// One link of the upward handler chain. Each `ThreadNode` is built with a
/// weak reference to its parent's router and hands its own router to its
/// children; the `ThreadRoot` terminates the chain.
#[async_trait]
pub trait Router: Send + Sync {
    /// Performs `op` on `target` if this link currently holds `target` as a
    /// direct child (or is `target`), and forwards it upwards otherwise
    async fn route(&self, target: CommentId, op: Interaction) -> Result<Applied, Error>;

    /// Informs this link and its ancestors of a mutation already performed
    /// further down
    async fn propagate(&self, applied: &Applied);
}
