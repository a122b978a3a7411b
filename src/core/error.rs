//! Error taxonomy shared by the evaluator, the executor and the journal.

use std::path::PathBuf;
use thiserror::Error;

use super::types::{Action, ValueKind};

const UNKNOWN_FUNCTION_PREFIX: &str = "unknown function ";

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown function {0}")]
    UnknownFunction(String),

    #[error("param {0} is required")]
    MissingParameter(String),

    #[error("value of expression {declaration} doesn't support expression type {kind}")]
    TypeMismatch { declaration: String, kind: ValueKind },

    #[error("invalid index {index} for value of {declaration}")]
    InvalidIndex { index: i64, declaration: String },

    #[error("cannot decode expression {declaration} as {kind}: {reason}")]
    Decode {
        declaration: String,
        kind: ValueKind,
        reason: String,
    },

    #[error("malformed cache record: {0}")]
    MalformedCacheRecord(String),

    #[error("resource {0} can't be processed for lack of required resources")]
    ResourceNotReady(String),

    #[error("failed to {action} resource {name} of type {resource_type}: {source}")]
    LifecycleFailure {
        name: String,
        resource_type: String,
        action: Action,
        #[source]
        source: Box<Error>,
    },

    #[error("timeout for waiting resource {name} to be {}", .action.past_tense())]
    Timeout { name: String, action: Action },

    #[error("invalid template: {0}")]
    Template(String),

    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("{operation} is not implemented for resource type {resource_type}")]
    NotImplemented {
        resource_type: String,
        operation: &'static str,
    },

    #[error("create resource {0} without token")]
    MissingCredential(String),

    #[error("{message}: {source}")]
    Io {
        message: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("status: {status}, body: {body}")]
    Api { status: u16, body: String },
}

impl Error {
    pub(crate) fn io(message: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            path: path.into(),
            source,
        }
    }

    /// Recover an expression error that crossed a property decoder as text.
    pub(crate) fn from_properties(e: serde_json::Error) -> Self {
        let message = e.to_string();
        match message.strip_prefix(UNKNOWN_FUNCTION_PREFIX) {
            Some(name) if e.is_data() => Self::UnknownFunction(name.to_string()),
            _ => Self::Json(e),
        }
    }

    /// Annotate an error with the resource it surfaced from.
    pub(crate) fn lifecycle(self, name: &str, resource_type: &str, action: Action) -> Self {
        Self::LifecycleFailure {
            name: name.to_string(),
            resource_type: resource_type.to_string(),
            action,
            source: Box::new(self),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
