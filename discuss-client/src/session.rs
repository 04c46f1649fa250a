use std::sync::Arc;

use crate::{
    api::{CommentStore, Moderator, Viewer},
    EngineConfig, MentionResolver, Reconciler, SubmissionGate,
};

/// Everything the engine needs from its host, passed explicitly to every
/// thread instead of being read from global state
pub struct Session {
    pub viewer: Viewer,
    pub config: EngineConfig,
    pub reconciler: Reconciler,
    pub gate: SubmissionGate,
    store: Arc<dyn CommentStore>,
}

impl Session {
    pub fn new(
        store: Arc<dyn CommentStore>,
        moderator: Arc<dyn Moderator>,
        viewer: Viewer,
        config: EngineConfig,
    ) -> Arc<Session> {
        Arc::new(Session {
            reconciler: Reconciler::new(store.clone()),
            gate: SubmissionGate::new(moderator, &config),
            store,
            viewer,
            config,
        })
    }

    pub fn store(&self) -> &Arc<dyn CommentStore> {
        &self.store
    }

    /// A fresh autocomplete state, one per text input
    pub fn mention_resolver(&self) -> MentionResolver {
        MentionResolver::new(self.store.clone(), &self.config)
    }
}
