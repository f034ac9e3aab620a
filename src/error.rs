//! Error types
//! Core Principle: Every failure carries enough context to decide whether to retry

use thiserror::Error;

use crate::gpo::{
    GroupPolicyDeleteResult, GroupPolicyUpdateResult, PolicySection, ERROR_SHARING_VIOLATION,
};

pub type Result<T, E = GroupPolicyError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum GroupPolicyError {
    #[error("selected type '{type_name}' is not supported")]
    UnsupportedType { type_name: &'static str },

    #[error("this value is reserved for delete operation")]
    DeleteValueNotStorable,

    #[error("invalid resource expression '{0}'")]
    InvalidExpression(String),

    #[error("this library must be run as an administrator")]
    NotAdministrator,

    #[error("apartment state must be STA")]
    NotStaThread,

    #[error("group policy service is unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("{0} is not supported on this platform")]
    PlatformUnsupported(&'static str),

    #[error("group policy object was already disposed")]
    Disposed,

    #[error("group policy object is not initialized")]
    NotInitialized,

    #[error("group policy object is not opened")]
    NotOpened,

    #[error("group policy object is already opened for {0}")]
    AlreadyOpened(String),

    #[error("{context} (code 0x{code:08X})")]
    Native { context: String, code: i32 },

    #[error("cannot save {section} values after {attempts} attempts (last code 0x{last_code:08X})")]
    SaveFailed {
        section: PolicySection,
        attempts: u32,
        last_code: i32,
    },

    #[error("cannot write '{key}\\{value_name}': {result:?}")]
    WriteFailed {
        key: String,
        value_name: String,
        result: GroupPolicyUpdateResult,
    },

    #[error("cannot delete '{key}\\{value_name}': {result:?}")]
    DeleteFailed {
        key: String,
        value_name: String,
        result: GroupPolicyDeleteResult,
    },

    #[error("the SID '{sid}' is not allowed for a local principal GPO: {reason}")]
    InvalidSid { sid: String, reason: &'static str },

    #[error("element '{0}' not found")]
    ElementNotFound(String),

    #[error("element '{0}' is a list element, please use the list accessor")]
    UseListAccessor(String),

    #[error("element '{0}' is a scalar element, please use the scalar accessor")]
    UseScalarAccessor(String),

    #[error("unsupported definition: {0}")]
    UnsupportedDefinition(String),

    #[error("previous task was not done")]
    PreviousTaskPending,

    #[error("thread does not run correctly: {0}")]
    WorkerFailed(String),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GroupPolicyError {
    pub fn native(context: impl Into<String>, code: i32) -> Self {
        GroupPolicyError::Native {
            context: context.into(),
            code,
        }
    }

    /// OS result code behind this error, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            GroupPolicyError::Native { code, .. } => Some(*code),
            GroupPolicyError::SaveFailed { last_code, .. } => Some(*last_code),
            _ => None,
        }
    }

    /// Another process holds the GPO registry.pol file.
    pub fn is_sharing_violation(&self) -> bool {
        matches!(self, GroupPolicyError::Native { code, .. } if *code == ERROR_SHARING_VIOLATION)
    }
}
