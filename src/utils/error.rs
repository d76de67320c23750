//! Error types returned by the chat broker.
//!
//! Every failure of a broker operation is a [`ChatError`]. Its `Display`
//! output is what clients see verbatim in `error` frames, and
//! [`ChatError::kind`] groups variants into the four classes the transport
//! cares about.

use thiserror::Error;

/// Coarse classification of a [`ChatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    AlreadyExists,
    NotFound,
    NotMember,
}

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// A request field failed validation (empty name, self-send, ...).
    #[error("{0}")]
    InvalidArgument(&'static str),

    /// A group operation targeted a personal topic.
    #[error("\"{0}\" is not a group chat")]
    NotAGroup(String),

    /// Connect with a name that is already registered as a topic.
    #[error("this username {0} already exists")]
    UsernameTaken(String),

    /// Group creation with a name that is already registered as a topic.
    #[error("chat name \"{0}\" already taken")]
    NameTaken(String),

    #[error("group chat \"{0}\" does not exist")]
    GroupNotFound(String),

    #[error("chat with name {0} does not exist")]
    TopicNotFound(String),

    /// Send to a group the author has not joined.
    #[error("you are not joined to the group chat: \"{0}\"")]
    NotMember(String),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::InvalidArgument(_) | ChatError::NotAGroup(_) => ErrorKind::InvalidArgument,
            ChatError::UsernameTaken(_) | ChatError::NameTaken(_) => ErrorKind::AlreadyExists,
            ChatError::GroupNotFound(_) | ChatError::TopicNotFound(_) => ErrorKind::NotFound,
            ChatError::NotMember(_) => ErrorKind::NotMember,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ChatError::InvalidArgument(_) => "invalid_argument",
            ChatError::NotAGroup(_) => "not_a_group",
            ChatError::UsernameTaken(_) => "username_taken",
            ChatError::NameTaken(_) => "name_taken",
            ChatError::GroupNotFound(_) => "group_not_found",
            ChatError::TopicNotFound(_) => "topic_not_found",
            ChatError::NotMember(_) => "not_member",
        }
    }
}
