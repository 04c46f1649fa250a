#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum ReactionKind {
    Like,
    Dislike,
}

/// The viewer's own reaction to a comment; liked and disliked are exclusive
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Reaction {
    #[default]
    None,
    Liked,
    Disliked,
}

impl From<ReactionKind> for Reaction {
    fn from(k: ReactionKind) -> Reaction {
        match k {
            ReactionKind::Like => Reaction::Liked,
            ReactionKind::Dislike => Reaction::Disliked,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ReactionState {
    pub like_count: u64,
    pub dislike_count: u64,
    pub viewer_reaction: Reaction,
}

/// Change in counters and viewer reaction produced by one toggle
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ReactionDelta {
    pub likes: i64,
    pub dislikes: i64,
    pub viewer_reaction: Reaction,
}

impl ReactionDelta {
    /// Toggle semantics: reacting with the current reaction clears it,
    /// reacting with the opposite one switches over.
    pub fn toggle(current: Reaction, kind: ReactionKind) -> ReactionDelta {
        let (likes, dislikes, viewer_reaction) = match (current, kind) {
            (Reaction::Liked, ReactionKind::Like) => (-1, 0, Reaction::None),
            (Reaction::Disliked, ReactionKind::Dislike) => (0, -1, Reaction::None),
            (Reaction::None, ReactionKind::Like) => (1, 0, Reaction::Liked),
            (Reaction::None, ReactionKind::Dislike) => (0, 1, Reaction::Disliked),
            (Reaction::Disliked, ReactionKind::Like) => (1, -1, Reaction::Liked),
            (Reaction::Liked, ReactionKind::Dislike) => (-1, 1, Reaction::Disliked),
        };
        ReactionDelta {
            likes,
            dislikes,
            viewer_reaction,
        }
    }
}

impl ReactionState {
    pub fn apply(&mut self, delta: &ReactionDelta) {
        self.like_count = self.like_count.saturating_add_signed(delta.likes);
        self.dislike_count = self.dislike_count.saturating_add_signed(delta.dislikes);
        self.viewer_reaction = delta.viewer_reaction;
    }

    pub fn toggled(mut self, kind: ReactionKind) -> ReactionState {
        self.apply(&ReactionDelta::toggle(self.viewer_reaction, kind));
        self
    }
}
