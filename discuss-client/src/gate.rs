use std::{collections::HashSet, sync::Arc};

use anyhow::Context;
use parking_lot::Mutex;

use crate::{api::Moderator, EngineConfig, Error, ValidationError};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GateMode {
    /// New comment or reply: content filter plus duplicate detection
    Create,

    /// Edit of an existing comment: content filter only
    Edit,
}

/// Checks a body locally, then asks the content filter, before anything is
/// sent to the store
pub struct SubmissionGate {
    moderator: Arc<dyn Moderator>,
    max_body_chars: usize,
    generic_rejection: String,
    recent: Mutex<Recent>,
}

struct Recent {
    last_created: Option<String>,

    /// Bodies between a passed `check` and the store's answer
    pending: HashSet<String>,
}

impl SubmissionGate {
    pub fn new(moderator: Arc<dyn Moderator>, config: &EngineConfig) -> SubmissionGate {
        SubmissionGate {
            moderator,
            max_body_chars: config.max_body_chars,
            generic_rejection: config.generic_rejection_message.clone(),
            recent: Mutex::new(Recent {
                last_created: None,
                pending: HashSet::new(),
            }),
        }
    }

    pub fn validate(&self, body: &str) -> Result<(), ValidationError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ValidationError::Empty);
        }
        if !validator::validate_length(body, None, Some(self.max_body_chars as u64), None) {
            return Err(ValidationError::TooLong {
                len: body.chars().count(),
                max: self.max_body_chars,
            });
        }
        Ok(())
    }

    /// Returns the trimmed body to submit if every check passes.
    ///
    /// On `GateMode::Create` the body stays reserved until the caller reports
    /// the store's answer with `record_created` or `release`, so that the same
    /// body submitted twice concurrently is only sent once.
    pub async fn check(&self, body: &str, mode: GateMode) -> Result<String, Error> {
        self.validate(body)?;
        let body = body.trim();
        if mode == GateMode::Create {
            let mut recent = self.recent.lock();
            if recent.last_created.as_deref() == Some(body) || recent.pending.contains(body) {
                return Err(Error::Duplicate);
            }
            recent.pending.insert(body.to_string());
        }
        let res = self.moderate(body).await;
        if mode == GateMode::Create && res.is_err() {
            self.release(body);
        }
        res.map(|()| body.to_string())
    }

    async fn moderate(&self, body: &str) -> Result<(), Error> {
        let verdict = self
            .moderator
            .check_content(body)
            .await
            .context("checking content with the moderation service")?;
        if !verdict.is_allowed {
            tracing::info!(reason = ?verdict.reason, "content filter rejected submission");
            return Err(Error::Rejected(
                verdict
                    .reason
                    .unwrap_or_else(|| self.generic_rejection.clone()),
            ));
        }
        Ok(())
    }

    /// Remembers a body the store accepted, for duplicate detection
    pub fn record_created(&self, body: &str) {
        let body = body.trim();
        let mut recent = self.recent.lock();
        recent.pending.remove(body);
        recent.last_created = Some(body.to_string());
    }

    /// Drops the reservation of a body the store did not accept
    pub fn release(&self, body: &str) {
        self.recent.lock().pending.remove(body.trim());
    }
}
