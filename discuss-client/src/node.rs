use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    api::{Comment, CommentId, CommentTarget, NewComment, ReactionDelta, ReactionKind},
    Applied, CacheEntry, Error, GateMode, Interaction, LoadOutcome, Outcome, ReplyCache, Router,
    Session,
};

struct NodeState {
    comment: Comment,
    is_expanded: bool,
    is_editing: bool,
    is_submitting_reply: bool,
    is_reacting: bool,

    /// False once the node left its parent's cache; late responses are dropped
    attached: bool,

    /// Transient, toast-style message about a failed reaction
    notice: Option<String>,

    /// Inline message about a failed reply, edit or delete
    error: Option<String>,
}

/// One displayed comment, with its lazily loaded direct replies.
///
/// Interactions are routed through the `Router` chain: a node handles the
/// ones aimed at itself or at one of its cached replies, and forwards the
/// others to its parent. Confirmed mutations keep travelling up to the
/// `ThreadRoot` via `Router::propagate`.
pub struct ThreadNode {
    session: Arc<Session>,
    id: CommentId,
    depth: usize,
    parent: Weak<dyn Router>,
    this: Weak<ThreadNode>,
    state: Mutex<NodeState>,
    replies: ReplyCache<ThreadNode>,
}

impl std::fmt::Debug for ThreadNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadNode")
            .field("id", &self.id)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl ThreadNode {
    pub fn new(
        session: Arc<Session>,
        comment: Comment,
        depth: usize,
        parent: Weak<dyn Router>,
    ) -> Arc<ThreadNode> {
        Arc::new_cyclic(|this| ThreadNode {
            session,
            id: comment.id,
            depth,
            parent,
            this: this.clone(),
            state: Mutex::new(NodeState {
                comment,
                is_expanded: false,
                is_editing: false,
                is_submitting_reply: false,
                is_reacting: false,
                attached: true,
                notice: None,
                error: None,
            }),
            replies: ReplyCache::new(),
        })
    }

    pub fn id(&self) -> CommentId {
        self.id
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn comment(&self) -> Comment {
        self.state.lock().comment.clone()
    }

    pub fn with_comment<R>(&self, f: impl FnOnce(&Comment) -> R) -> R {
        f(&self.state.lock().comment)
    }

    pub fn is_expanded(&self) -> bool {
        self.state.lock().is_expanded
    }

    pub fn is_editing(&self) -> bool {
        self.state.lock().is_editing
    }

    pub fn set_editing(&self, editing: bool) {
        self.state.lock().is_editing = editing;
    }

    pub fn is_submitting_reply(&self) -> bool {
        self.state.lock().is_submitting_reply
    }

    pub fn is_reacting(&self) -> bool {
        self.state.lock().is_reacting
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    pub fn is_loading_children(&self) -> bool {
        self.replies.is_loading()
    }

    pub fn children_loaded(&self) -> bool {
        self.replies.is_loaded()
    }

    pub fn has_more_children(&self) -> bool {
        self.replies.has_more()
    }

    /// Cached direct replies, in display order
    pub fn children(&self) -> Vec<Arc<ThreadNode>> {
        self.replies.entries()
    }

    /// Set when the last reply fetch failed, cleared by a successful retry
    pub fn load_error(&self) -> Option<String> {
        self.replies.error()
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn take_notice(&self) -> Option<String> {
        self.state.lock().notice.take()
    }

    /// Leaf comments get no expand control
    pub fn can_expand(&self) -> bool {
        self.state.lock().comment.direct_child_count > 0 || !self.replies.is_empty()
    }

    pub fn can_reply(&self) -> bool {
        self.session.viewer.is_signed_in()
            && self.depth < self.session.config.max_reply_depth
            && self.is_attached()
    }

    pub fn can_edit(&self) -> bool {
        self.session
            .viewer
            .can_modify(self.state.lock().comment.author_id)
    }

    pub fn can_delete(&self) -> bool {
        self.can_edit()
    }

    fn should_auto_expand(&self) -> bool {
        self.depth < self.session.config.max_auto_expand_depth
            && self.state.lock().comment.direct_child_count > 0
    }

    /// Locally applies a reaction change, without contacting the store
    pub fn apply_reaction(&self, delta: &ReactionDelta) {
        self.state.lock().comment.reactions.apply(delta);
    }

    fn make_child(&self, c: Comment) -> Arc<ThreadNode> {
        let parent: Weak<dyn Router> = self.this.clone();
        ThreadNode::new(self.session.clone(), c, self.depth + 1, parent)
    }

    fn parent(&self) -> Result<Arc<dyn Router>, Error> {
        self.parent.upgrade().ok_or(Error::Detached)
    }

    async fn propagate_up(&self, applied: &Applied) {
        match self.parent.upgrade() {
            Some(parent) => parent.propagate(applied).await,
            None => tracing::debug!(id = ?self.id, "no parent left to propagate to"),
        }
    }

    /// To be called when the host first displays this node
    pub async fn mount(&self) -> Result<(), Error> {
        if self.should_auto_expand() && !self.replies.is_loaded() {
            self.load_children().await?;
        }
        Ok(())
    }

    /// Fetches the first page of direct replies, once. Failures leave the
    /// node unloaded so that the host can offer a retry.
    pub async fn load_children(&self) -> Result<(), Error> {
        {
            let state = self.state.lock();
            if !state.attached {
                return Err(Error::Detached);
            }
            if state.comment.direct_child_count == 0 {
                return Ok(());
            }
        }
        let store = self.session.store().clone();
        let id = self.id;
        let res = self
            .replies
            .load(
                move |page| async move { store.list_replies(id, page).await },
                |c| self.make_child(c),
            )
            .await;
        match res {
            Ok(LoadOutcome::Loaded { fetched }) => {
                tracing::debug!(?id, fetched, "replies loaded");
                if self.should_auto_expand() {
                    self.state.lock().is_expanded = true;
                }
                Ok(())
            }
            Ok(outcome) => {
                tracing::debug!(?id, ?outcome, "reply load not applied");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(?id, ?err, "failed loading replies");
                Err(err)
            }
        }
    }

    pub async fn load_more_children(&self) -> Result<(), Error> {
        if !self.is_attached() {
            return Err(Error::Detached);
        }
        let store = self.session.store().clone();
        let id = self.id;
        self.replies
            .load_more(
                move |page| async move { store.list_replies(id, page).await },
                |c| self.make_child(c),
            )
            .await
            .map(|_| ())
            .map_err(|err| {
                tracing::warn!(?id, ?err, "failed loading more replies");
                err
            })
    }

    /// Returns whether the node is now expanded. Collapsing keeps the cache;
    /// a detached node can still be collapsed but never expanded again.
    pub async fn toggle_expanded(&self) -> Result<bool, Error> {
        if self.is_expanded() {
            self.state.lock().is_expanded = false;
            return Ok(false);
        }
        if !self.is_attached() {
            return Err(Error::Detached);
        }
        if !self.can_expand() {
            return Ok(false);
        }
        if !self.replies.is_loaded() {
            self.load_children().await?;
        }
        self.state.lock().is_expanded = true;
        Ok(true)
    }

    pub async fn like(&self) -> Result<Applied, Error> {
        self.route(self.id, Interaction::Like).await
    }

    pub async fn dislike(&self) -> Result<Applied, Error> {
        self.route(self.id, Interaction::Dislike).await
    }

    pub async fn delete(&self) -> Result<Applied, Error> {
        self.route(self.id, Interaction::Delete).await
    }

    pub async fn submit_edit(&self, body: &str) -> Result<Applied, Error> {
        self.route(self.id, Interaction::Edit(body.to_string()))
            .await
    }

    /// Posts a reply, then re-fetches the first page of replies so that it
    /// shows up, and expands this node
    pub async fn submit_reply(&self, body: &str) -> Result<Comment, Error> {
        if !self.session.viewer.is_signed_in() {
            return Err(Error::PermissionDenied);
        }
        if self.depth >= self.session.config.max_reply_depth {
            return Err(Error::ReplyDepth(self.depth));
        }
        {
            let mut state = self.state.lock();
            if !state.attached {
                return Err(Error::Detached);
            }
            if state.is_submitting_reply {
                return Err(Error::Busy);
            }
            state.is_submitting_reply = true;
        }
        let res = self.post_reply(body).await;
        let mut state = self.state.lock();
        state.is_submitting_reply = false;
        state.error = res.as_ref().err().map(|e| e.user_message());
        res
    }

    async fn post_reply(&self, body: &str) -> Result<Comment, Error> {
        let body = self.session.gate.check(body, GateMode::Create).await?;
        let res = self
            .session
            .reconciler
            .create(NewComment {
                target: CommentTarget::Parent(self.id),
                body: body.clone(),
            })
            .await;
        let c = match res {
            Ok(c) => {
                self.session.gate.record_created(&body);
                c
            }
            Err(err) => {
                self.session.gate.release(&body);
                return Err(err);
            }
        };
        if !self.is_attached() {
            tracing::warn!(id = ?self.id, reply = ?c.id, "reply confirmed after node was detached");
            return Ok(c);
        }
        self.state.lock().comment.direct_child_count += 1;
        self.replies.invalidate();
        if let Err(err) = self.load_children().await {
            tracing::warn!(id = ?self.id, ?err, "reply posted but replies could not be reloaded");
        }
        if !self.is_attached() {
            tracing::warn!(id = ?self.id, reply = ?c.id, "node detached while reloading replies");
            return Ok(c);
        }
        self.state.lock().is_expanded = true;
        self.propagate_up(&Applied {
            target: c.id,
            outcome: Outcome::Replied(c.clone()),
        })
        .await;
        Ok(c)
    }

    /// Optimistically flips the reaction, then overwrites it with the
    /// server's counts. A failure leaves the optimistic state in place unless
    /// `rollback_failed_reactions` is set.
    pub(crate) async fn react(&self, kind: ReactionKind) -> Result<Outcome, Error> {
        let before = {
            let mut state = self.state.lock();
            if !state.attached {
                return Err(Error::NotFound(self.id));
            }
            if state.is_reacting {
                return Err(Error::Busy);
            }
            state.is_reacting = true;
            let before = state.comment.reactions;
            state
                .comment
                .reactions
                .apply(&ReactionDelta::toggle(before.viewer_reaction, kind));
            before
        };
        let res = self.session.reconciler.react(self.id, kind).await;
        let mut state = self.state.lock();
        state.is_reacting = false;
        if !state.attached {
            tracing::warn!(id = ?self.id, "ignoring reaction response for detached comment");
            return res.map(Outcome::Reacted);
        }
        match res {
            Ok(confirmed) => {
                state.comment.reactions = confirmed;
                Ok(Outcome::Reacted(confirmed))
            }
            Err(err) => {
                tracing::warn!(id = ?self.id, ?kind, ?err, "reaction failed");
                state.notice = Some(err.user_message());
                if self.session.config.rollback_failed_reactions {
                    state.comment.reactions = before;
                }
                Err(err)
            }
        }
    }

    pub(crate) async fn edit(&self, body: String) -> Result<Outcome, Error> {
        let author = {
            let state = self.state.lock();
            if !state.attached {
                return Err(Error::NotFound(self.id));
            }
            state.comment.author_id
        };
        if !self.session.viewer.can_modify(author) {
            return Err(Error::PermissionDenied);
        }
        let res = match self.session.gate.check(&body, GateMode::Edit).await {
            Ok(body) => self.session.reconciler.edit(self.id, body).await,
            Err(err) => Err(err),
        };
        let mut state = self.state.lock();
        match res {
            Ok(c) if !state.attached => {
                tracing::warn!(id = ?self.id, "ignoring edit response for detached comment");
                Ok(Outcome::Edited(c))
            }
            Ok(c) => {
                state.comment = c.clone();
                state.is_editing = false;
                state.error = None;
                Ok(Outcome::Edited(c))
            }
            Err(err) => {
                state.error = Some(err.user_message());
                Err(err)
            }
        }
    }

    async fn delete_child(&self, child: &ThreadNode) -> Result<Outcome, Error> {
        if !child.can_delete() {
            return Err(Error::PermissionDenied);
        }
        if let Err(err) = self.session.reconciler.delete(child.id).await {
            self.state.lock().error = Some(err.user_message());
            return Err(err);
        }
        if let Some(child) = self.replies.remove(child.id) {
            child.detach();
        }
        let mut state = self.state.lock();
        if state.attached {
            // only a confirmed deletion may lower the server's count
            state.comment.direct_child_count = state.comment.direct_child_count.saturating_sub(1);
        }
        Ok(Outcome::Deleted {
            parent: Some(self.id),
        })
    }

    async fn handle(&self, target: &ThreadNode, op: Interaction) -> Result<Outcome, Error> {
        match op {
            Interaction::Like => target.react(ReactionKind::Like).await,
            Interaction::Dislike => target.react(ReactionKind::Dislike).await,
            Interaction::Edit(body) => target.edit(body).await,
            Interaction::Delete => self.delete_child(target).await,
        }
    }
}

impl CacheEntry for ThreadNode {
    fn id(&self) -> CommentId {
        self.id
    }

    fn refresh(&self, c: Comment) {
        self.state.lock().comment = c;
    }

    fn detach(&self) {
        self.state.lock().attached = false;
        self.replies.detach_all();
    }
}

#[async_trait]
impl Router for ThreadNode {
    async fn route(&self, target: CommentId, op: Interaction) -> Result<Applied, Error> {
        if !self.is_attached() {
            if target == self.id {
                return Err(Error::NotFound(target));
            }
            return Err(Error::Detached);
        }
        // deleting this node is the job of whoever caches it
        let (outcome, live) = if target == self.id && op != Interaction::Delete {
            tracing::debug!(id = ?self.id, ?op, "handling interaction on own comment");
            (self.handle(self, op).await?, self.is_attached())
        } else if let Some(child) = self.replies.find(target) {
            tracing::debug!(id = ?self.id, comment = ?target, ?op, "handling interaction as owner");
            let outcome = self.handle(&child, op).await?;
            // a deleted child is detached on purpose, only the owner must still be there
            let live = match outcome {
                Outcome::Deleted { .. } => self.is_attached(),
                _ => child.is_attached(),
            };
            (outcome, live)
        } else {
            tracing::debug!(id = ?self.id, comment = ?target, "forwarding interaction to parent");
            return self.parent()?.route(target, op).await;
        };
        let applied = Applied { target, outcome };
        if live {
            self.propagate_up(&applied).await;
        } else {
            tracing::warn!(id = ?self.id, comment = ?target, "not propagating late response for detached comment");
        }
        Ok(applied)
    }

    async fn propagate(&self, applied: &Applied) {
        self.propagate_up(applied).await
    }
}

#[cfg(test)]
mod tests {
    use discuss_mock_server::Call;

    use super::*;
    use crate::{
        api::{ContentId, Reaction, ReactionState, Viewer},
        testing, Activity, EngineConfig,
    };

    fn reactions(like_count: u64, dislike_count: u64, viewer_reaction: Reaction) -> ReactionState {
        ReactionState {
            like_count,
            dislike_count,
            viewer_reaction,
        }
    }

    #[tokio::test]
    async fn deleting_direct_child() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        let five = server.seed_reply(one.id, &me, "five");
        let six = server.seed_reply(one.id, &me, "six");
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();

        n1.mount().await.unwrap();
        assert!(n1.is_expanded());
        assert_eq!(server.calls(Call::ListReplies), 1);
        let n5 = n1.children()[0].clone();
        assert_eq!(n5.id(), five.id);
        assert_eq!(n5.depth(), 1);

        let applied = n5.delete().await.unwrap();
        assert_eq!(
            applied.outcome,
            Outcome::Deleted {
                parent: Some(one.id)
            }
        );
        assert_eq!(n1.comment().direct_child_count, 1);
        let ids = n1.children().iter().map(|n| n.id()).collect::<Vec<_>>();
        assert_eq!(ids, vec![six.id]);
        assert!(!n5.is_attached());
        assert_eq!(root.activity().deletions, 1);
        assert_eq!(root.total_count(), 1);

        assert!(matches!(
            n1.route(five.id, Interaction::Like).await,
            Err(Error::NotFound(id)) if id == five.id
        ));
        assert!(matches!(n5.like().await, Err(Error::NotFound(_))));
        assert_eq!(server.calls(Call::React), 0);
    }

    #[tokio::test]
    async fn concurrent_loads_fetch_once() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        server.seed_reply(one.id, &me, "a");
        server.seed_reply(one.id, &me, "b");
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();

        let hold = server.hold(Call::ListReplies);
        let loads = futures::future::join_all((0..5).map(|_| n1.load_children()));
        let release = async {
            tokio::task::yield_now().await;
            assert!(n1.is_loading_children());
            hold.notify_one();
        };
        let (res, ()) = futures::join!(loads, release);
        assert!(res.iter().all(|r| r.is_ok()));
        assert_eq!(server.calls(Call::ListReplies), 1);
        assert_eq!(n1.children().len(), 2);
        assert!(n1.children_loaded());
    }

    #[tokio::test]
    async fn reply_reloads_once() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        server.seed_reply(one.id, &me, "a");
        server.seed_reply(one.id, &me, "b");
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();
        n1.mount().await.unwrap();
        let before = n1.children();

        let reply = n1.submit_reply("hello @viewer").await.unwrap();
        assert_eq!(server.calls(Call::Create), 1);
        assert_eq!(server.calls(Call::ListReplies), 2);
        assert_eq!(reply.mentions.len(), 1);
        assert_eq!(n1.comment().direct_child_count, 3);
        assert!(n1.is_expanded());
        assert!(!n1.is_submitting_reply());

        let after = n1.children();
        assert_eq!(after.len(), 3);
        assert_eq!(after[2].id(), reply.id);
        // surviving replies keep their nodes
        assert!(Arc::ptr_eq(&before[0], &after[0]));
        assert!(before.iter().all(|n| n.is_attached()));

        assert_eq!(root.activity().comments, 1);
        assert_eq!(root.total_count(), 1);
    }

    #[tokio::test]
    async fn depth_limits() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let mut chain = vec![server.seed_root(ContentId::stub(), &me, "depth 0")];
        for d in 1..5 {
            let parent = chain[d - 1].id;
            chain.push(server.seed_reply(parent, &me, &format!("depth {d}")));
        }
        let root = testing::loaded_root(&session).await;

        let mut node = root.find(chain[0].id).unwrap();
        for d in 0..3 {
            assert_eq!(node.depth(), d);
            assert!(node.can_reply());
            node.mount().await.unwrap();
            assert!(node.is_expanded());
            node = node.children()[0].clone();
        }
        assert_eq!(server.calls(Call::ListReplies), 3);

        // depth 3: no auto-expansion and no reply control, but expandable
        assert_eq!(node.depth(), 3);
        node.mount().await.unwrap();
        assert!(!node.is_expanded());
        assert_eq!(server.calls(Call::ListReplies), 3);
        assert!(!node.can_reply());
        assert!(matches!(
            node.submit_reply("too deep").await,
            Err(Error::ReplyDepth(3))
        ));
        assert_eq!(server.calls(Call::Create), 0);

        assert!(node.can_expand());
        assert!(node.toggle_expanded().await.unwrap());
        assert_eq!(node.children()[0].depth(), 4);
        assert!(!node.toggle_expanded().await.unwrap());
        assert!(node.children_loaded());
        assert_eq!(server.calls(Call::ListReplies), 4);
    }

    #[tokio::test]
    async fn forwarding_reaches_owner() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let c0 = server.seed_root(ContentId::stub(), &me, "0");
        let c1 = server.seed_reply(c0.id, &me, "1");
        let c2 = server.seed_reply(c1.id, &me, "2");
        server.seed_reply(c2.id, &me, "3");
        let root = testing::loaded_root(&session).await;
        let n0 = root.find(c0.id).unwrap();
        n0.mount().await.unwrap();
        let n1 = n0.children()[0].clone();
        n1.mount().await.unwrap();
        let n2 = n1.children()[0].clone();
        n2.mount().await.unwrap();

        // n1 handles its own reaction when asked from below
        let applied = n2.route(c1.id, Interaction::Like).await.unwrap();
        assert_eq!(
            applied.outcome,
            Outcome::Reacted(reactions(1, 0, Reaction::Liked))
        );
        assert_eq!(n1.comment().reactions.like_count, 1);
        assert_eq!(root.revision(), 1);

        // deleting n1 is done by n0, which caches it
        n2.route(c1.id, Interaction::Delete).await.unwrap();
        assert!(n0.children().is_empty());
        assert_eq!(n0.comment().direct_child_count, 0);
        assert!(!n1.is_attached());
        assert!(!n2.is_attached());
        assert!(server.comment(c2.id).is_none());
        assert!(matches!(
            n2.route(c0.id, Interaction::Like).await,
            Err(Error::Detached)
        ));
    }

    #[tokio::test]
    async fn reactions_follow_server() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        let five = server.seed_reply(one.id, &me, "five");
        server.set_reactions(five.id, reactions(3, 2, Reaction::Disliked));
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();
        n1.mount().await.unwrap();
        let n5 = n1.children()[0].clone();

        n5.like().await.unwrap();
        assert_eq!(n5.comment().reactions, reactions(4, 1, Reaction::Liked));
        n5.like().await.unwrap();
        assert_eq!(n5.comment().reactions, reactions(3, 1, Reaction::None));
        n5.dislike().await.unwrap();
        assert_eq!(n5.comment().reactions, reactions(3, 2, Reaction::Disliked));
        assert_eq!(
            server.comment(five.id).unwrap().reactions,
            n5.comment().reactions
        );
        assert_eq!(root.activity().reactions, 3);
    }

    #[tokio::test]
    async fn failed_reaction_keeps_optimistic_state() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();

        server.fail_next(Call::React);
        let err = n1.like().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(n1.comment().reactions, reactions(1, 0, Reaction::Liked));
        assert_eq!(server.comment(one.id).unwrap().reactions, reactions(0, 0, Reaction::None));
        assert!(n1.take_notice().is_some());
        assert!(n1.take_notice().is_none());
        assert!(!n1.is_reacting());
        assert_eq!(root.revision(), 0);
    }

    #[tokio::test]
    async fn failed_reaction_rolls_back_when_configured() {
        let (server, session) = testing::setup_with(EngineConfig {
            rollback_failed_reactions: true,
            ..EngineConfig::default()
        });
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();

        server.fail_next(Call::React);
        n1.dislike().await.unwrap_err();
        assert_eq!(n1.comment().reactions, ReactionState::default());
        assert!(n1.take_notice().is_some());
    }

    #[tokio::test]
    async fn one_reaction_in_flight() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();

        let hold = server.hold(Call::React);
        let second = async {
            tokio::task::yield_now().await;
            let res = n1.like().await;
            hold.notify_one();
            res
        };
        let (first, second) = futures::join!(n1.like(), second);
        assert!(first.is_ok());
        assert!(matches!(second, Err(Error::Busy)));
        assert_eq!(server.calls(Call::React), 1);
        assert_eq!(n1.comment().reactions, reactions(1, 0, Reaction::Liked));
    }

    #[tokio::test]
    async fn late_reaction_after_detach_is_ignored() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();

        let hold = server.hold(Call::React);
        let detach = async {
            tokio::task::yield_now().await;
            root.remove_root(one.id).unwrap();
            server.set_reactions(one.id, reactions(42, 0, Reaction::None));
            hold.notify_one();
        };
        let (res, ()) = futures::join!(n1.like(), detach);
        let applied = res.unwrap();
        assert_eq!(
            applied.outcome,
            Outcome::Reacted(reactions(43, 0, Reaction::Liked))
        );
        // the optimistic state is left as is, and the thread never hears of it
        assert_eq!(n1.comment().reactions, reactions(1, 0, Reaction::Liked));
        assert!(!n1.is_attached());
        assert_eq!(root.revision(), 0);
        assert_eq!(root.activity(), Activity::default());
    }

    #[tokio::test]
    async fn removed_node_stays_detached() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        server.seed_reply(one.id, &me, "a");
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();

        root.remove_root(one.id).unwrap();
        assert!(matches!(n1.toggle_expanded().await, Err(Error::Detached)));
        assert!(matches!(n1.load_children().await, Err(Error::Detached)));
        assert!(matches!(
            n1.load_more_children().await,
            Err(Error::Detached)
        ));
        assert!(matches!(n1.mount().await, Err(Error::Detached)));
        assert_eq!(server.calls(Call::ListReplies), 0);
        assert!(n1.children().is_empty());
        assert!(!n1.is_expanded());
        assert_eq!(root.revision(), 0);
    }

    #[tokio::test]
    async fn deleted_subtree_cannot_fetch_again() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        let five = server.seed_reply(one.id, &me, "five");
        server.seed_reply(five.id, &me, "under five");
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();
        n1.mount().await.unwrap();
        let n5 = n1.children()[0].clone();
        n5.mount().await.unwrap();
        let fetches = server.calls(Call::ListReplies);

        n5.delete().await.unwrap();
        if n5.is_expanded() {
            assert!(!n5.toggle_expanded().await.unwrap());
        }
        assert!(matches!(n5.toggle_expanded().await, Err(Error::Detached)));
        assert_eq!(server.calls(Call::ListReplies), fetches);
        assert!(n5.children().is_empty());
    }

    #[tokio::test]
    async fn failed_reply_changes_nothing() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        server.seed_reply(one.id, &me, "a");
        server.seed_reply(one.id, &me, "b");
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();
        n1.mount().await.unwrap();

        server.fail_next(Call::Create);
        let err = n1.submit_reply("hello").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(n1.comment().direct_child_count, 2);
        assert_eq!(n1.children().len(), 2);
        assert_eq!(server.calls(Call::ListReplies), 1);
        assert!(n1.error().is_some());
        assert!(!n1.is_submitting_reply());
        assert_eq!(root.revision(), 0);

        // the same body may be retried
        n1.submit_reply("hello").await.unwrap();
        assert_eq!(n1.children().len(), 3);
        assert!(n1.error().is_none());
    }

    #[tokio::test]
    async fn failed_delete_keeps_child() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        let five = server.seed_reply(one.id, &me, "five");
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();
        n1.mount().await.unwrap();
        let n5 = n1.children()[0].clone();

        server.fail_next(Call::Delete);
        assert!(n5.delete().await.unwrap_err().is_retryable());
        assert!(n5.is_attached());
        assert_eq!(n1.children()[0].id(), five.id);
        assert_eq!(n1.comment().direct_child_count, 1);
        assert!(n1.error().is_some());
        assert!(server.comment(five.id).is_some());
        assert_eq!(root.activity().deletions, 0);
    }

    #[tokio::test]
    async fn editing() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let other = server.add_user("other");
        let mine = server.seed_root(ContentId::stub(), &me, "mine");
        let theirs = server.seed_root(ContentId::stub(), &other, "theirs");
        server.ban_word("spam", Some("No spam please."));
        let root = testing::loaded_root(&session).await;
        let n = root.find(mine.id).unwrap();

        n.set_editing(true);
        let applied = n.submit_edit("  fixed typo  ").await.unwrap();
        assert!(matches!(applied.outcome, Outcome::Edited(ref c) if c.body == "fixed typo"));
        assert!(n.comment().edited);
        assert!(!n.is_editing());
        assert_eq!(root.activity().edits, 1);

        n.set_editing(true);
        assert!(matches!(
            n.submit_edit("buy spam").await,
            Err(Error::Rejected(reason)) if reason == "No spam please."
        ));
        assert_eq!(n.error().as_deref(), Some("No spam please."));
        assert_eq!(n.comment().body, "fixed typo");
        assert!(n.is_editing());
        assert_eq!(server.calls(Call::Update), 1);

        let t = root.find(theirs.id).unwrap();
        assert!(!t.can_edit());
        let checks = server.calls(Call::CheckContent);
        assert!(matches!(
            t.submit_edit("hijacked").await,
            Err(Error::PermissionDenied)
        ));
        assert_eq!(server.calls(Call::CheckContent), checks);
    }

    #[tokio::test]
    async fn failed_lazy_load_can_be_retried() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        server.seed_reply(one.id, &me, "a");
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();

        server.fail_next(Call::ListReplies);
        assert!(n1.mount().await.unwrap_err().is_retryable());
        assert!(!n1.children_loaded());
        assert!(!n1.is_expanded());
        assert!(n1.load_error().is_some());

        assert!(n1.toggle_expanded().await.unwrap());
        assert_eq!(n1.children().len(), 1);
        assert!(n1.load_error().is_none());
    }

    #[tokio::test]
    async fn leaves_are_never_fetched() {
        let (server, session) = testing::setup();
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();

        n1.mount().await.unwrap();
        n1.load_children().await.unwrap();
        assert!(!n1.can_expand());
        assert!(!n1.toggle_expanded().await.unwrap());
        assert_eq!(server.calls(Call::ListReplies), 0);
    }

    #[tokio::test]
    async fn paged_replies() {
        let (server, session) = testing::setup();
        server.set_page_size(2);
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        for i in 0..3 {
            server.seed_reply(one.id, &me, &format!("reply {i}"));
        }
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();
        n1.mount().await.unwrap();
        assert_eq!(n1.children().len(), 2);
        assert!(n1.has_more_children());

        n1.load_more_children().await.unwrap();
        assert_eq!(n1.children().len(), 3);
        assert!(!n1.has_more_children());
    }

    #[tokio::test]
    async fn anonymous_viewer_cannot_reply() {
        let (server, _) = testing::setup();
        let session = Session::new(
            server.clone(),
            server.clone(),
            Viewer::anonymous(),
            EngineConfig::default(),
        );
        let me = server.viewer().clone();
        let one = server.seed_root(ContentId::stub(), &me, "one");
        let root = testing::loaded_root(&session).await;
        let n1 = root.find(one.id).unwrap();

        assert!(!n1.can_reply());
        assert!(!n1.can_edit());
        assert!(matches!(
            n1.submit_reply("hi").await,
            Err(Error::PermissionDenied)
        ));
        assert!(matches!(
            root.submit_comment("hi").await,
            Err(Error::PermissionDenied)
        ));
        assert_eq!(server.calls(Call::CheckContent), 0);
    }
}
