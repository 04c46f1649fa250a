use std::path::Path;

use anyhow::Context;

pub const CONFIG_ENV_VAR: &str = "DISCUSS_CONFIG";

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nodes shallower than this expand themselves once their replies are loaded
    pub max_auto_expand_depth: usize,

    /// Nodes at this depth or deeper offer no reply control
    pub max_reply_depth: usize,

    /// Maximum length of a comment body, in characters
    pub max_body_chars: usize,

    /// Shortest `@fragment` that triggers a user search
    pub mention_min_chars: usize,
    pub mention_max_candidates: usize,

    /// Restore the previous reaction state when the server call fails
    pub rollback_failed_reactions: bool,

    /// Shown when the content filter rejects a body without giving a reason
    pub generic_rejection_message: String,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            max_auto_expand_depth: 3,
            max_reply_depth: 3,
            max_body_chars: 1000,
            mention_min_chars: 2,
            mention_max_candidates: 10,
            rollback_failed_reactions: false,
            generic_rejection_message: String::from(
                "This comment can't be posted because it goes against our community guidelines.",
            ),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> anyhow::Result<EngineConfig> {
        serde_json::from_str(json).context("parsing engine configuration")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<EngineConfig> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine configuration from {path:?}"))?;
        Self::from_json(&json)
    }

    /// Reads the file named by `DISCUSS_CONFIG`, or the defaults if it is unset
    pub fn from_env() -> anyhow::Result<EngineConfig> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            None => Ok(EngineConfig::default()),
            Some(path) => Self::from_file(Path::new(&path))
                .with_context(|| format!("loading configuration named by {CONFIG_ENV_VAR}")),
        }
    }
}
