use std::sync::Arc;

use crate::{
    api::{Comment, CommentId, CommentStore, NewComment, ReactionKind, ReactionState},
    Error,
};

/// Performs exactly one store call per interaction and hands back the
/// server's authoritative answer. Concurrent calls on the same comment are
/// not deduplicated here.
pub struct Reconciler {
    store: Arc<dyn CommentStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CommentStore>) -> Reconciler {
        Reconciler { store }
    }

    pub async fn like(&self, id: CommentId) -> Result<ReactionState, Error> {
        self.react(id, ReactionKind::Like).await
    }

    pub async fn dislike(&self, id: CommentId) -> Result<ReactionState, Error> {
        self.react(id, ReactionKind::Dislike).await
    }

    pub async fn react(&self, id: CommentId, kind: ReactionKind) -> Result<ReactionState, Error> {
        let res = self
            .store
            .react_to_comment(id, kind)
            .await
            .map_err(Error::from_store)?;
        tracing::debug!(?id, ?kind, ?res, "reaction confirmed");
        Ok(res)
    }

    pub async fn edit(&self, id: CommentId, body: String) -> Result<Comment, Error> {
        let c = self
            .store
            .update_comment(id, body)
            .await
            .map_err(Error::from_store)?;
        tracing::info!(?id, "comment edited");
        Ok(c)
    }

    pub async fn delete(&self, id: CommentId) -> Result<(), Error> {
        self.store
            .delete_comment(id)
            .await
            .map_err(Error::from_store)?;
        tracing::info!(?id, "comment deleted");
        Ok(())
    }

    pub async fn create(&self, new: NewComment) -> Result<Comment, Error> {
        let target = new.target;
        let c = self
            .store
            .create_comment(new)
            .await
            .map_err(Error::from_store)?;
        tracing::info!(id = ?c.id, to = ?target, "comment created");
        Ok(c)
    }
}
