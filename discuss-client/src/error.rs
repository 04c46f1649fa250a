use crate::api::{CommentId, Error as ApiError};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("comment body is empty")]
    Empty,

    #[error("comment body is {len} characters long, the maximum is {max}")]
    TooLong { len: usize, max: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("rejected by content filter: {0}")]
    Rejected(String),

    #[error("same comment was already posted")]
    Duplicate,

    #[error("comment {0:?} is not loaded anywhere in this thread")]
    NotFound(CommentId),

    #[error("thread node is no longer displayed")]
    Detached,

    #[error("replies are disabled at depth {0}")]
    ReplyDepth(usize),

    #[error("viewer is not allowed to do this")]
    PermissionDenied,

    #[error("another request for this comment is still in flight")]
    Busy,
}

impl Error {
    /// Wraps a store failure, surfacing the API error it carries if any
    pub fn from_store(err: anyhow::Error) -> Error {
        match ApiError::find_in(&err) {
            Some(e) => Error::Api(e.clone()),
            None => Error::Anyhow(err),
        }
    }

    /// Network and server failures may succeed when retried, nothing else will
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Anyhow(_) => true,
            Error::Api(ApiError::Unknown(_) | ApiError::Conflict(_)) => true,
            _ => false,
        }
    }

    /// Message to display inline next to the control that failed
    pub fn user_message(&self) -> String {
        match self {
            Error::Anyhow(_) | Error::Api(ApiError::Unknown(_)) => {
                String::from("Something went wrong, please try again.")
            }
            Error::Api(ApiError::Conflict(_)) => {
                String::from("This comment changed in the meantime, please try again.")
            }
            Error::Api(ApiError::NotFound(_)) | Error::NotFound(_) => {
                String::from("This comment no longer exists.")
            }
            Error::Api(ApiError::PermissionDenied) | Error::PermissionDenied => {
                String::from("You are not allowed to do this.")
            }
            Error::Validation(ValidationError::Empty) => String::from("Comment cannot be empty."),
            Error::Validation(ValidationError::TooLong { max, .. }) => {
                format!("Comment cannot be longer than {max} characters.")
            }
            Error::Rejected(reason) => reason.clone(),
            Error::Duplicate => String::from("You already posted this comment."),
            Error::Detached => String::from("This comment is no longer displayed."),
            Error::ReplyDepth(_) => String::from("Replies are disabled this deep in a thread."),
            Error::Busy => String::from("Please wait for the previous action to complete."),
        }
    }
}
