use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::meta::EntityKind;
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid field path `{path}`")]
    InvalidFieldPath { path: String },
    #[error("malformed value for `{path}`: {reason}")]
    MalformedField { path: String, reason: String },
    #[error("`{path}` is required")]
    MissingField { path: String },
    #[error("`{path}` is not a tracked field")]
    UntrackedField { path: String },
    #[error("unknown {kind} status `{value}`")]
    UnknownStatus { kind: EntityKind, value: String },
    #[error("{kind} cannot move from {from} to {to}")]
    InvalidTransition { kind: EntityKind, from: String, to: String },
    #[error("{kind} in status {status} cannot be approved")]
    IneligibleStatus { kind: EntityKind, status: String },
    #[error("remark is {length} characters; the limit is {max}")]
    RemarkTooLong { length: usize, max: usize },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Another edit is already awaiting a decision.
    ProposalPending,
    /// The record changed since the caller read it.
    StaleWrite,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProposalPending => f.write_str("a proposal is already pending"),
            Self::StaleWrite => f.write_str("the record was modified concurrently"),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("{kind} {id} is already {state}")]
    AlreadyProcessed { kind: EntityKind, id: String, state: String },
    #[error("{kind} {id}: {reason}")]
    Conflict { kind: EntityKind, id: String, reason: ConflictReason },
    #[error("{kind} with {key} `{value}` already exists")]
    DuplicateKey { kind: EntityKind, key: String, value: String },
    #[error("could not generate a unique {kind} id with prefix {prefix} after {attempts} attempts")]
    GenerationExhausted { kind: EntityKind, prefix: String, attempts: u32 },
    #[error("request carries no authenticated actor")]
    Unauthorized,
    #[error("actor {actor} may not {operation} {kind} records")]
    Forbidden { actor: String, operation: String, kind: EntityKind },
    #[error("malformed ids: {}", .0.join(", "))]
    MalformedIds(Vec<String>),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Coarse classification surfaced to operators and batch callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    NotFound,
    AlreadyProcessed,
    Conflict,
    Unauthorized,
    Forbidden,
    Unavailable,
    Internal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::AlreadyProcessed => "already_processed",
            Self::Conflict => "conflict",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

impl ApplicationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Domain(_) | Self::MalformedIds(_) => ErrorClass::Validation,
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::AlreadyProcessed { .. } => ErrorClass::AlreadyProcessed,
            Self::Conflict { .. } | Self::DuplicateKey { .. } => ErrorClass::Conflict,
            Self::Unauthorized => ErrorClass::Unauthorized,
            Self::Forbidden { .. } => ErrorClass::Forbidden,
            Self::Persistence(_) => ErrorClass::Unavailable,
            Self::GenerationExhausted { .. } | Self::Configuration(_) => ErrorClass::Internal,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::DuplicateKey { kind, key, value } => {
                Self::DuplicateKey { kind, key, value }
            }
            StoreError::Backend(message) => Self::Persistence(message),
            StoreError::Decode(message) => Self::Persistence(format!("decode: {message}")),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The record changed or was already processed. Reload it and try again."
            }
            Self::Unauthorized { .. } => "Sign in to continue.",
            Self::Forbidden { .. } => "You do not have permission to perform this action.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::ServiceUnavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        let message = value.to_string();
        match value {
            ApplicationError::Domain(_) | ApplicationError::MalformedIds(_) => {
                Self::BadRequest { message, correlation_id }
            }
            ApplicationError::NotFound { .. } => Self::NotFound { message, correlation_id },
            ApplicationError::AlreadyProcessed { .. }
            | ApplicationError::Conflict { .. }
            | ApplicationError::DuplicateKey { .. } => Self::Conflict { message, correlation_id },
            ApplicationError::Unauthorized => Self::Unauthorized { message, correlation_id },
            ApplicationError::Forbidden { .. } => Self::Forbidden { message, correlation_id },
            ApplicationError::Persistence(_) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::GenerationExhausted { .. } | ApplicationError::Configuration(_) => {
                Self::Internal { message, correlation_id }
            }
        }
    }
}
