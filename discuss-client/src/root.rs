use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    api::{
        Comment, CommentId, CommentTarget, ContentId, NewComment, ReactionDelta, ReactionKind,
        SortMode,
    },
    Applied, CacheEntry, Error, GateMode, Interaction, OrderExt, Outcome, Router, Session,
    ThreadNode,
};

/// Confirmed mutations seen by a thread since it was created
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Activity {
    pub reactions: u64,
    pub edits: u64,
    pub comments: u64,
    pub deletions: u64,
}

struct RootState {
    sort: SortMode,
    roots: Vec<Arc<ThreadNode>>,
    loaded: bool,
    is_loading: bool,
    next_page: Option<u32>,
    error: Option<String>,

    /// Bumped on sort changes, so that pages fetched with the old sort are dropped
    generation: u64,

    total_count: u64,
    revision: u64,
    activity: Activity,
}

/// The depth-0 comments of one content item, and the end of the `Router` chain
pub struct ThreadRoot {
    session: Arc<Session>,
    content_id: ContentId,
    this: Weak<ThreadRoot>,
    state: Mutex<RootState>,
}

impl ThreadRoot {
    pub fn new(session: Arc<Session>, content_id: ContentId, sort: SortMode) -> Arc<ThreadRoot> {
        Arc::new_cyclic(|this| ThreadRoot {
            session,
            content_id,
            this: this.clone(),
            state: Mutex::new(RootState {
                sort,
                roots: Vec::new(),
                loaded: false,
                is_loading: false,
                next_page: None,
                error: None,
                generation: 0,
                total_count: 0,
                revision: 0,
                activity: Activity::default(),
            }),
        })
    }

    pub fn content_id(&self) -> ContentId {
        self.content_id
    }

    pub fn sort(&self) -> SortMode {
        self.state.lock().sort
    }

    pub fn roots(&self) -> Vec<Arc<ThreadNode>> {
        self.state.lock().roots.clone()
    }

    pub fn find(&self, id: CommentId) -> Option<Arc<ThreadNode>> {
        self.state
            .lock()
            .roots
            .iter()
            .find(|n| n.id() == id)
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().loaded
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().is_loading
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().next_page.is_some()
    }

    /// Set when the last page fetch failed; the already loaded roots stay
    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    /// Number of depth-0 comments on the server, as last reported and then
    /// adjusted by confirmed creations and deletions
    pub fn total_count(&self) -> u64 {
        self.state.lock().total_count
    }

    /// Bumped on every confirmed mutation anywhere in the thread
    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    pub fn activity(&self) -> Activity {
        self.state.lock().activity
    }

    fn make_root(&self, c: Comment) -> Arc<ThreadNode> {
        let parent: Weak<dyn Router> = self.this.clone();
        ThreadNode::new(self.session.clone(), c, 0, parent)
    }

    /// Fetches page `page` (1-based) of root comments. The first page
    /// replaces the list, keeping the nodes of comments that are still
    /// there; further pages are appended.
    pub async fn load_page(&self, page: u32) -> Result<(), Error> {
        let (generation, sort) = {
            let mut state = self.state.lock();
            state.is_loading = true;
            (state.generation, state.sort)
        };
        let res = self
            .session
            .store()
            .list_root_comments(self.content_id, page, sort)
            .await;

        let mut detached = Vec::new();
        let res = {
            let mut state = self.state.lock();
            if state.generation != generation {
                tracing::debug!(page, ?sort, "dropping root page fetched with a stale sort");
                return Ok(());
            }
            state.is_loading = false;
            match res {
                Err(err) => {
                    let err = Error::from_store(err);
                    tracing::error!(content = ?self.content_id, page, ?err, "failed loading root comments");
                    state.error = Some(err.user_message());
                    Err(err)
                }
                Ok(p) if page <= 1 => {
                    let mut old = std::mem::take(&mut state.roots);
                    for c in p.items {
                        match old.iter().position(|n| n.id() == c.id) {
                            Some(idx) => {
                                let n = old.swap_remove(idx);
                                n.refresh(c);
                                state.roots.push(n);
                            }
                            None => state.roots.push(self.make_root(c)),
                        }
                    }
                    detached = old;
                    state.next_page = p.next_page;
                    state.total_count = p.total;
                    state.loaded = true;
                    state.error = None;
                    Ok(())
                }
                Ok(p) => {
                    for c in p.items {
                        if !state.roots.iter().any(|n| n.id() == c.id) {
                            let n = self.make_root(c);
                            state.roots.push(n);
                        }
                    }
                    state.next_page = p.next_page;
                    state.total_count = p.total;
                    state.error = None;
                    Ok(())
                }
            }
        };
        for n in detached {
            n.detach();
        }
        res
    }

    pub async fn load_next_page(&self) -> Result<(), Error> {
        let next = self.state.lock().next_page;
        match next {
            Some(page) => self.load_page(page).await,
            None => Ok(()),
        }
    }

    /// Reorders the loaded roots right away, then reloads the first page
    /// with the new order
    pub async fn set_sort(&self, sort: SortMode) -> Result<(), Error> {
        {
            let mut state = self.state.lock();
            if state.sort == sort {
                return Ok(());
            }
            state.sort = sort;
            state.generation += 1;
            sort.sort(&mut state.roots);
        }
        self.load_page(1).await
    }

    /// Inserts `c` at the position the active sort mode gives it. Adding an
    /// already displayed comment refreshes it in place.
    pub fn add_root(&self, c: Comment) -> Arc<ThreadNode> {
        let mut state = self.state.lock();
        if let Some(n) = state.roots.iter().find(|n| n.id() == c.id) {
            n.refresh(c);
            return n.clone();
        }
        let idx = state.sort.insertion_point(&state.roots, &c);
        let n = self.make_root(c);
        state.roots.insert(idx, n.clone());
        n
    }

    /// Drops a root comment from the display, without contacting the store
    pub fn remove_root(&self, id: CommentId) -> Option<Arc<ThreadNode>> {
        let n = {
            let mut state = self.state.lock();
            let idx = state.roots.iter().position(|n| n.id() == id)?;
            state.roots.remove(idx)
        };
        n.detach();
        Some(n)
    }

    /// Locally applies a reaction change to a root comment
    pub fn apply_reaction(&self, id: CommentId, delta: &ReactionDelta) -> Result<(), Error> {
        let n = self.find(id).ok_or(Error::NotFound(id))?;
        n.apply_reaction(delta);
        Ok(())
    }

    /// Posts a new depth-0 comment on this content item
    pub async fn submit_comment(&self, body: &str) -> Result<Arc<ThreadNode>, Error> {
        if !self.session.viewer.is_signed_in() {
            return Err(Error::PermissionDenied);
        }
        let body = self.session.gate.check(body, GateMode::Create).await?;
        let res = self
            .session
            .reconciler
            .create(NewComment {
                target: CommentTarget::Content(self.content_id),
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
        let n = self.add_root(c.clone());
        self.propagate(&Applied {
            target: c.id,
            outcome: Outcome::Replied(c),
        })
        .await;
        Ok(n)
    }

    async fn delete_root(&self, n: &ThreadNode) -> Result<Outcome, Error> {
        if !n.can_delete() {
            return Err(Error::PermissionDenied);
        }
        self.session.reconciler.delete(n.id()).await?;
        self.remove_root(n.id());
        Ok(Outcome::Deleted { parent: None })
    }
}

#[async_trait]
impl Router for ThreadRoot {
    async fn route(&self, target: CommentId, op: Interaction) -> Result<Applied, Error> {
        let n = match self.find(target) {
            Some(n) => n,
            None => {
                tracing::debug!(comment = ?target, "interaction target is not loaded anywhere");
                return Err(Error::NotFound(target));
            }
        };
        let outcome = match op {
            Interaction::Like => n.react(ReactionKind::Like).await?,
            Interaction::Dislike => n.react(ReactionKind::Dislike).await?,
            Interaction::Edit(body) => n.edit(body).await?,
            Interaction::Delete => self.delete_root(&n).await?,
        };
        let applied = Applied { target, outcome };
        let removed = !matches!(applied.outcome, Outcome::Deleted { .. }) && !n.is_attached();
        if removed {
            tracing::warn!(comment = ?target, "not propagating late response for removed comment");
        } else {
            self.propagate(&applied).await;
        }
        Ok(applied)
    }

    async fn propagate(&self, applied: &Applied) {
        let mut state = self.state.lock();
        state.revision += 1;
        match &applied.outcome {
            Outcome::Reacted(_) => state.activity.reactions += 1,
            Outcome::Edited(_) => state.activity.edits += 1,
            Outcome::Replied(c) => {
                state.activity.comments += 1;
                if c.is_root() {
                    state.total_count += 1;
                }
            }
            Outcome::Deleted { parent } => {
                state.activity.deletions += 1;
                if parent.is_none() {
                    state.total_count = state.total_count.saturating_sub(1);
                }
            }
        }
        tracing::info!(
            content = ?self.content_id,
            comment = ?applied.target,
            revision = state.revision,
            "mutation applied"
        );
    }
}

impl Drop for ThreadRoot {
    fn drop(&mut self) {
        for n in self.state.get_mut().roots.drain(..) {
            n.detach();
        }
    }
}
