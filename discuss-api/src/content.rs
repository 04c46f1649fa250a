use std::cmp::{Ordering, Reverse};

use uuid::Uuid;

use crate::{Comment, STUB_UUID};

/// The media item a discussion is attached to
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct ContentId(pub Uuid);

impl ContentId {
    pub fn stub() -> ContentId {
        ContentId(STUB_UUID)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum SortMode {
    #[default]
    Newest,
    Oldest,
    MostLiked,
}

impl SortMode {
    /// Ordering of two depth-0 comments under this sort mode, ties broken by
    /// id so that the order is total
    pub fn compare(&self, a: &Comment, b: &Comment) -> Ordering {
        match self {
            SortMode::Newest => {
                (Reverse(a.created_at), a.id).cmp(&(Reverse(b.created_at), b.id))
            }
            SortMode::Oldest => (a.created_at, a.id).cmp(&(b.created_at, b.id)),
            SortMode::MostLiked => (
                Reverse(a.reactions.like_count),
                Reverse(a.created_at),
                a.id,
            )
                .cmp(&(
                    Reverse(b.reactions.like_count),
                    Reverse(b.created_at),
                    b.id,
                )),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Page number to request next, None if this was the last page
    pub next_page: Option<u32>,

    /// Total number of items across all pages
    pub total: u64,
}
