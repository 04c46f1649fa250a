use crate::STUB_UUID;

use uuid::Uuid;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

/// A user as referenced from a comment body or offered for mention completion
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UserRef {
    pub id: UserId,
    pub name: String,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Role {
    #[default]
    Member,
    Moderator,
    Admin,
}

/// Current session's identity, supplied by the host
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Viewer {
    /// None when nobody is signed in
    pub id: Option<UserId>,
    pub role: Role,
}

impl Viewer {
    pub fn anonymous() -> Viewer {
        Viewer::default()
    }

    pub fn member(id: UserId) -> Viewer {
        Viewer {
            id: Some(id),
            role: Role::Member,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.id.is_some()
    }

    /// Whether this viewer may edit or delete content written by `author`
    pub fn can_modify(&self, author: UserId) -> bool {
        match self.id {
            None => false,
            Some(id) if id == author => true,
            Some(_) => matches!(self.role, Role::Moderator | Role::Admin),
        }
    }
}
