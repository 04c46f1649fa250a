use uuid::Uuid;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Not found {0}")]
    NotFound(Uuid),

    #[error("Conflicting write on {0}")]
    Conflict(Uuid),
}

impl Error {
    /// Recovers an API error carried somewhere in an anyhow error chain
    pub fn find_in(err: &anyhow::Error) -> Option<&Error> {
        err.chain().find_map(|e| e.downcast_ref::<Error>())
    }
}
