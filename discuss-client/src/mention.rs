use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;

use crate::{
    api::{CommentStore, UserRef},
    EngineConfig,
};

lazy_static::lazy_static! {
    static ref MENTION_BEFORE_CARET: Regex =
        Regex::new(r"@(\w*)$").expect("mention pattern is a valid regex");
}

/// An `@fragment` ending right at the caret
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MentionMatch {
    /// Character index of the `@`
    pub start: usize,
    pub fragment: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Insertion {
    pub text: String,
    pub caret: usize,
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Positions are character indices; a caret past the end counts as the end
pub fn mention_at(text: &str, caret: usize) -> Option<MentionMatch> {
    let before = &text[..byte_offset(text, caret)];
    let caps = MENTION_BEFORE_CARET.captures(before)?;
    let at = caps.get(0)?.start();
    Some(MentionMatch {
        start: before[..at].chars().count(),
        fragment: caps[1].to_string(),
    })
}

/// Replaces the `@fragment` before the caret with `@name `. The returned
/// caret sits one character past the inserted trailing space; hosts clamp it
/// to the text length.
pub fn insert_mention(text: &str, caret: usize, name: &str) -> Option<Insertion> {
    let m = mention_at(text, caret)?;
    let start = byte_offset(text, m.start);
    let end = byte_offset(text, caret);
    let mut res = String::with_capacity(text.len() + name.len() + 2);
    res.push_str(&text[..start]);
    res.push('@');
    res.push_str(name);
    res.push(' ');
    res.push_str(&text[end..]);
    Some(Insertion {
        text: res,
        caret: m.start + name.chars().count() + 3,
    })
}

/// Orders candidates by how well their name matches `fragment`: exact, then
/// prefix, then substring, alphabetically within each group
fn rank(fragment: &str, mut users: Vec<UserRef>, limit: usize) -> Vec<UserRef> {
    let fragment = fragment.to_lowercase();
    users.sort_by_cached_key(|u| {
        let name = u.name.to_lowercase();
        let group = if name == fragment {
            0
        } else if name.starts_with(&fragment) {
            1
        } else if name.contains(&fragment) {
            2
        } else {
            3
        };
        (group, name)
    });
    users.dedup_by_key(|u| u.id);
    users.truncate(limit);
    users
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MentionState {
    Closed,

    /// Fragment too short to search, show a hint instead
    Hint { fragment: String },

    Searching { fragment: String },
    Candidates { fragment: String, users: Vec<UserRef> },
    Failed { fragment: String },
}

struct ResolverState {
    /// Bumped on every input, so that only the latest search lands
    generation: u64,
    current: MentionState,
}

/// Autocomplete for `@user` mentions in one text input
pub struct MentionResolver {
    store: Arc<dyn CommentStore>,
    min_chars: usize,
    max_candidates: usize,
    state: Mutex<ResolverState>,
}

impl MentionResolver {
    pub fn new(store: Arc<dyn CommentStore>, config: &EngineConfig) -> MentionResolver {
        MentionResolver {
            store,
            min_chars: config.mention_min_chars,
            max_candidates: config.mention_max_candidates,
            state: Mutex::new(ResolverState {
                generation: 0,
                current: MentionState::Closed,
            }),
        }
    }

    pub fn state(&self) -> MentionState {
        self.state.lock().current.clone()
    }

    fn set(&self, current: MentionState) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        state.current = current;
        state.generation
    }

    pub fn close(&self) {
        self.set(MentionState::Closed);
    }

    /// To be called on every keystroke or caret move
    pub async fn on_input(&self, text: &str, caret: usize) -> MentionState {
        let fragment = match mention_at(text, caret) {
            None => {
                self.close();
                return MentionState::Closed;
            }
            Some(m) => m.fragment,
        };
        if fragment.chars().count() < self.min_chars {
            let hint = MentionState::Hint { fragment };
            self.set(hint.clone());
            return hint;
        }

        let generation = self.set(MentionState::Searching {
            fragment: fragment.clone(),
        });
        let res = self.store.search_users(&fragment, self.max_candidates).await;

        let mut state = self.state.lock();
        if state.generation != generation {
            tracing::debug!(%fragment, "dropping stale mention search results");
            return state.current.clone();
        }
        state.current = match res {
            Ok(users) => MentionState::Candidates {
                users: rank(&fragment, users, self.max_candidates),
                fragment,
            },
            Err(err) => {
                tracing::warn!(?err, %fragment, "user search failed");
                MentionState::Failed { fragment }
            }
        };
        state.current.clone()
    }

    /// Inserts the chosen candidate and closes the list
    pub fn select(&self, text: &str, caret: usize, user: &UserRef) -> Option<Insertion> {
        let res = insert_mention(text, caret, &user.name);
        self.close();
        res
    }
}
