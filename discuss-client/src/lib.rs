mod cache;
pub use cache::{CacheEntry, LoadOutcome, ReplyCache};

mod config;
pub use config::{EngineConfig, CONFIG_ENV_VAR};

mod error;
pub use error::{Error, ValidationError};

mod gate;
pub use gate::{GateMode, SubmissionGate};

mod mention;
pub use mention::{insert_mention, mention_at, Insertion, MentionMatch, MentionResolver, MentionState};

mod node;
pub use node::ThreadNode;

mod order;
pub use order::OrderExt;

mod reconciler;
pub use reconciler::Reconciler;

mod root;
pub use root::{Activity, ThreadRoot};

mod router;
pub use router::{Applied, Interaction, Outcome, Router};

mod session;
pub use session::Session;

#[cfg(test)]
mod fuzz;

#[cfg(test)]
mod testing;

pub mod api {
    pub use discuss_api::*;
}

pub mod prelude {
    pub use crate::{OrderExt, Router};
}
