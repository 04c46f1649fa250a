use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use discuss_api::{
    Comment, CommentId, CommentStore, CommentTarget, ContentId, Error, Moderator, NewComment,
    Page, ReactionKind, ReactionState, SortMode, Time, UserId, UserRef, Uuid, Verdict,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

const DEFAULT_PAGE_SIZE: usize = 20;

/// Kinds of calls the mock server answers, for counting and fault injection
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Call {
    ListRoots,
    ListReplies,
    Create,
    Update,
    Delete,
    React,
    SearchUsers,
    CheckContent,
}

pub struct MockServer {
    viewer: UserRef,
    state: Mutex<State>,
}

struct State {
    comments: HashMap<CommentId, Comment>,
    users: Vec<UserRef>,
    banned: Vec<(String, Option<String>)>,
    calls: HashMap<Call, usize>,
    failing: HashSet<Call>,
    holds: HashMap<Call, Arc<Notify>>,
    clock: Time,
    page_size: usize,
}

impl State {
    fn tick(&mut self) -> Time {
        self.clock = self.clock + Duration::seconds(1);
        self.clock
    }

    fn get_mut(&mut self, id: CommentId) -> anyhow::Result<&mut Comment> {
        self.comments
            .get_mut(&id)
            .ok_or_else(|| anyhow::Error::from(Error::NotFound(id.0)))
    }

    fn paginate(&self, mut items: Vec<Comment>, page: u32) -> Page<Comment> {
        let total = items.len() as u64;
        let page = page.max(1) as usize;
        let start = (page - 1) * self.page_size;
        let end = (start + self.page_size).min(items.len());
        let next_page = (end < items.len()).then_some(page as u32 + 1);
        let items = if start < items.len() {
            items.drain(start..end).collect()
        } else {
            Vec::new()
        };
        Page {
            items,
            next_page,
            total,
        }
    }

    fn resolve_mentions(&self, body: &str) -> Vec<UserRef> {
        let mut res = Vec::new();
        for word in body.split_whitespace() {
            let Some(name) = word.strip_prefix('@') else {
                continue;
            };
            let name = name.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_');
            if let Some(u) = self.users.iter().find(|u| u.name == name) {
                if !res.contains(u) {
                    res.push(u.clone());
                }
            }
        }
        res
    }

    fn insert(
        &mut self,
        content_id: ContentId,
        parent_id: Option<CommentId>,
        author: &UserRef,
        body: String,
    ) -> anyhow::Result<Comment> {
        if let Some(p) = parent_id {
            self.get_mut(p)?.direct_child_count += 1;
        }
        let now = self.tick();
        let c = Comment {
            id: CommentId(Uuid::new_v4()),
            content_id,
            author_id: author.id,
            author_name: author.name.clone(),
            mentions: self.resolve_mentions(&body),
            body,
            parent_id,
            created_at: now,
            updated_at: now,
            edited: false,
            hidden: false,
            hidden_reason: None,
            reactions: ReactionState::default(),
            direct_child_count: 0,
        };
        self.comments.insert(c.id, c.clone());
        Ok(c)
    }

    fn remove_subtree(&mut self, id: CommentId) {
        let children = self
            .comments
            .values()
            .filter(|c| c.parent_id == Some(id))
            .map(|c| c.id)
            .collect::<Vec<_>>();
        for c in children {
            self.remove_subtree(c);
        }
        self.comments.remove(&id);
    }
}

impl MockServer {
    /// A server whose requests are all made on behalf of `viewer_name`
    pub fn new(viewer_name: &str) -> MockServer {
        let viewer = UserRef {
            id: UserId(Uuid::new_v4()),
            name: String::from(viewer_name),
        };
        MockServer {
            state: Mutex::new(State {
                comments: HashMap::new(),
                users: vec![viewer.clone()],
                banned: Vec::new(),
                calls: HashMap::new(),
                failing: HashSet::new(),
                holds: HashMap::new(),
                clock: Utc.timestamp_opt(1_600_000_000, 0).single().unwrap_or_else(Utc::now),
                page_size: DEFAULT_PAGE_SIZE,
            }),
            viewer,
        }
    }

    pub fn viewer(&self) -> &UserRef {
        &self.viewer
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.state.lock().page_size = page_size.max(1);
    }

    pub fn add_user(&self, name: &str) -> UserRef {
        let u = UserRef {
            id: UserId(Uuid::new_v4()),
            name: String::from(name),
        };
        self.state.lock().users.push(u.clone());
        u
    }

    pub fn seed_root(&self, content: ContentId, author: &UserRef, body: &str) -> Comment {
        self.state
            .lock()
            .insert(content, None, author, String::from(body))
            .expect("inserting a root comment cannot fail")
    }

    pub fn seed_reply(&self, parent: CommentId, author: &UserRef, body: &str) -> Comment {
        let mut state = self.state.lock();
        let content = state
            .comments
            .get(&parent)
            .unwrap_or_else(|| panic!("seeding reply to unknown comment {parent:?}"))
            .content_id;
        state
            .insert(content, Some(parent), author, String::from(body))
            .expect("parent was just checked")
    }

    pub fn set_reactions(&self, id: CommentId, reactions: ReactionState) {
        let mut state = self.state.lock();
        let c = state
            .comments
            .get_mut(&id)
            .unwrap_or_else(|| panic!("setting reactions of unknown comment {id:?}"));
        c.reactions = reactions;
    }

    pub fn comment(&self, id: CommentId) -> Option<Comment> {
        self.state.lock().comments.get(&id).cloned()
    }

    /// Reject any body containing `word`, giving `reason` as the filter's explanation
    pub fn ban_word(&self, word: &str, reason: Option<&str>) {
        self.state
            .lock()
            .banned
            .push((word.to_lowercase(), reason.map(String::from)));
    }

    /// Number of calls of kind `call` received so far
    pub fn calls(&self, call: Call) -> usize {
        self.state.lock().calls.get(&call).copied().unwrap_or(0)
    }

    /// Make the next call of kind `call` fail as a network error would
    pub fn fail_next(&self, call: Call) {
        self.state.lock().failing.insert(call);
    }

    /// Make the next call of kind `call` wait until the returned `Notify` is
    /// notified before it is answered
    pub fn hold(&self, call: Call) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.state.lock().holds.insert(call, notify.clone());
        notify
    }

    async fn enter(&self, call: Call) -> anyhow::Result<()> {
        let hold = {
            let mut state = self.state.lock();
            *state.calls.entry(call).or_insert(0) += 1;
            state.holds.remove(&call)
        };
        if let Some(hold) = hold {
            hold.notified().await;
        }
        if self.state.lock().failing.remove(&call) {
            tracing::debug!(?call, "injecting failure");
            return Err(anyhow!("connection reset while serving {call:?}"));
        }
        Ok(())
    }
}

#[async_trait]
impl CommentStore for MockServer {
    async fn list_root_comments(
        &self,
        content: ContentId,
        page: u32,
        sort: SortMode,
    ) -> anyhow::Result<Page<Comment>> {
        self.enter(Call::ListRoots).await?;
        let state = self.state.lock();
        let mut roots = state
            .comments
            .values()
            .filter(|c| c.content_id == content && c.parent_id.is_none())
            .cloned()
            .collect::<Vec<_>>();
        roots.sort_by(|a, b| sort.compare(a, b));
        Ok(state.paginate(roots, page))
    }

    async fn list_replies(&self, parent: CommentId, page: u32) -> anyhow::Result<Page<Comment>> {
        self.enter(Call::ListReplies).await?;
        let state = self.state.lock();
        if !state.comments.contains_key(&parent) {
            return Err(Error::NotFound(parent.0).into());
        }
        let mut replies = state
            .comments
            .values()
            .filter(|c| c.parent_id == Some(parent))
            .cloned()
            .collect::<Vec<_>>();
        replies.sort_by(|a, b| SortMode::Oldest.compare(a, b));
        Ok(state.paginate(replies, page))
    }

    async fn create_comment(&self, c: NewComment) -> anyhow::Result<Comment> {
        self.enter(Call::Create).await?;
        let mut state = self.state.lock();
        match c.target {
            CommentTarget::Content(content) => state.insert(content, None, &self.viewer, c.body),
            CommentTarget::Parent(parent) => {
                let content = state.get_mut(parent)?.content_id;
                state.insert(content, Some(parent), &self.viewer, c.body)
            }
        }
    }

    async fn update_comment(&self, id: CommentId, body: String) -> anyhow::Result<Comment> {
        self.enter(Call::Update).await?;
        let mut state = self.state.lock();
        let now = state.tick();
        let mentions = state.resolve_mentions(&body);
        let c = state.get_mut(id)?;
        if c.author_id != self.viewer.id {
            return Err(Error::PermissionDenied.into());
        }
        c.body = body;
        c.mentions = mentions;
        c.edited = true;
        c.updated_at = now;
        Ok(c.clone())
    }

    async fn delete_comment(&self, id: CommentId) -> anyhow::Result<()> {
        self.enter(Call::Delete).await?;
        let mut state = self.state.lock();
        let parent = state.get_mut(id)?.parent_id;
        if let Some(p) = parent {
            let p = state.get_mut(p)?;
            p.direct_child_count = p.direct_child_count.saturating_sub(1);
        }
        state.remove_subtree(id);
        Ok(())
    }

    async fn react_to_comment(
        &self,
        id: CommentId,
        kind: ReactionKind,
    ) -> anyhow::Result<ReactionState> {
        self.enter(Call::React).await?;
        let mut state = self.state.lock();
        let c = state.get_mut(id)?;
        c.reactions = c.reactions.toggled(kind);
        Ok(c.reactions)
    }

    async fn search_users(&self, fragment: &str, limit: usize) -> anyhow::Result<Vec<UserRef>> {
        self.enter(Call::SearchUsers).await?;
        let fragment = fragment.to_lowercase();
        Ok(self
            .state
            .lock()
            .users
            .iter()
            .filter(|u| u.name.to_lowercase().contains(&fragment))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Moderator for MockServer {
    async fn check_content(&self, body: &str) -> anyhow::Result<Verdict> {
        self.enter(Call::CheckContent).await?;
        let body = body.to_lowercase();
        Ok(match self
            .state
            .lock()
            .banned
            .iter()
            .find(|(w, _)| body.contains(w.as_str()))
        {
            Some((_, reason)) => Verdict::rejected(reason.clone()),
            None => Verdict::allowed(),
        })
    }
}
