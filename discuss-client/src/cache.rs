use std::{future::Future, sync::Arc};

use parking_lot::Mutex;

use crate::{
    api::{Comment, CommentId, Page},
    Error,
};

/// What a `ReplyCache` stores for each loaded reply
pub trait CacheEntry: Send + Sync {
    fn id(&self) -> CommentId;

    /// Overwrite the entry with a fresher copy fetched from the server
    fn refresh(&self, c: Comment);

    /// The entry left the cache and must ignore any late response
    fn detach(&self);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadOutcome {
    Loaded { fetched: usize },

    /// Already loaded, or a fetch of the same generation is in flight
    Skipped,

    /// The cache was invalidated while the fetch was in flight
    Stale,
}

struct CacheState<N> {
    entries: Vec<Arc<N>>,
    loaded: bool,
    generation: u64,
    in_flight: Option<u64>,
    next_page: Option<u32>,
    error: Option<String>,
}

/// Lazily fetched direct replies of a single comment.
///
/// Loads are single-flight per generation: while a fetch is outstanding,
/// further loads are no-ops. `invalidate` starts a new generation, and
/// whatever an older fetch brings back is thrown away.
pub struct ReplyCache<N> {
    state: Mutex<CacheState<N>>,
}

impl<N: CacheEntry> Default for ReplyCache<N> {
    fn default() -> Self {
        ReplyCache::new()
    }
}

impl<N: CacheEntry> ReplyCache<N> {
    pub fn new() -> ReplyCache<N> {
        ReplyCache {
            state: Mutex::new(CacheState {
                entries: Vec::new(),
                loaded: false,
                generation: 0,
                in_flight: None,
                next_page: None,
                error: None,
            }),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().loaded
    }

    pub fn is_loading(&self) -> bool {
        let state = self.state.lock();
        state.in_flight == Some(state.generation)
    }

    pub fn has_more(&self) -> bool {
        let state = self.state.lock();
        state.loaded && state.next_page.is_some()
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<Arc<N>> {
        self.state.lock().entries.clone()
    }

    pub fn contains(&self, id: CommentId) -> bool {
        self.state.lock().entries.iter().any(|e| e.id() == id)
    }

    pub fn find(&self, id: CommentId) -> Option<Arc<N>> {
        self.state
            .lock()
            .entries
            .iter()
            .find(|e| e.id() == id)
            .cloned()
    }

    /// Removes an entry without detaching it
    pub fn remove(&self, id: CommentId) -> Option<Arc<N>> {
        let mut state = self.state.lock();
        let idx = state.entries.iter().position(|e| e.id() == id)?;
        Some(state.entries.remove(idx))
    }

    /// Forces the next `load` to re-fetch the first page
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.loaded = false;
        state.next_page = None;
    }

    /// Invalidates and detaches every entry
    pub fn detach_all(&self) {
        let entries = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.loaded = false;
            state.next_page = None;
            std::mem::take(&mut state.entries)
        };
        for e in entries {
            e.detach();
        }
    }

    fn begin(&self, more: bool) -> Option<(u64, u32)> {
        let mut state = self.state.lock();
        if state.in_flight == Some(state.generation) {
            return None;
        }
        let page = match (more, state.loaded, state.next_page) {
            (false, false, _) => 1,
            (true, true, Some(p)) => p,
            _ => return None,
        };
        state.in_flight = Some(state.generation);
        Some((state.generation, page))
    }

    /// Fetches the first page of replies unless already loaded or loading.
    /// Entries whose id is still present are refreshed and kept, the others
    /// are detached.
    pub async fn load<F, Fut, M>(&self, fetch: F, make: M) -> Result<LoadOutcome, Error>
    where
        F: FnOnce(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<Page<Comment>>>,
        M: FnMut(Comment) -> Arc<N>,
    {
        match self.begin(false) {
            None => Ok(LoadOutcome::Skipped),
            Some((generation, page)) => self.finish(generation, page, fetch(page).await, make),
        }
    }

    /// Fetches the page after the last loaded one, appending replies not
    /// already cached
    pub async fn load_more<F, Fut, M>(&self, fetch: F, make: M) -> Result<LoadOutcome, Error>
    where
        F: FnOnce(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<Page<Comment>>>,
        M: FnMut(Comment) -> Arc<N>,
    {
        match self.begin(true) {
            None => Ok(LoadOutcome::Skipped),
            Some((generation, page)) => self.finish(generation, page, fetch(page).await, make),
        }
    }

    fn finish<M>(
        &self,
        generation: u64,
        page: u32,
        res: anyhow::Result<Page<Comment>>,
        mut make: M,
    ) -> Result<LoadOutcome, Error>
    where
        M: FnMut(Comment) -> Arc<N>,
    {
        let mut detached = Vec::new();
        let res = {
            let mut state = self.state.lock();
            if state.generation != generation {
                tracing::debug!(generation, page, "dropping replies fetched before invalidation");
                return Ok(LoadOutcome::Stale);
            }
            state.in_flight = None;
            match res {
                Err(err) => {
                    let err = Error::from_store(err);
                    state.error = Some(err.user_message());
                    Err(err)
                }
                Ok(p) => {
                    let fetched = p.items.len();
                    let mut entries = Vec::with_capacity(p.items.len());
                    for c in p.items {
                        match state.entries.iter().position(|e| e.id() == c.id) {
                            Some(idx) if page == 1 => {
                                let e = state.entries.swap_remove(idx);
                                e.refresh(c);
                                entries.push(e);
                            }
                            // pages can shift under concurrent inserts
                            Some(_) => (),
                            None => entries.push(make(c)),
                        }
                    }
                    if page == 1 {
                        detached = std::mem::replace(&mut state.entries, entries);
                    } else {
                        state.entries.extend(entries);
                    }
                    state.loaded = true;
                    state.next_page = p.next_page;
                    state.error = None;
                    Ok(LoadOutcome::Loaded { fetched })
                }
            }
        };
        for e in detached {
            e.detach();
        }
        res
    }
}
