// Error taxonomy for the transaction engine.
//
// Recoverable rule violations are collected as `TransactionError`s and folded
// into a `TransactionResponse`. Conditions that mean the engine cannot
// continue at all (missing chain id, malformed key material, corrupt state
// found during undo) are `FatalError`s and abort the caller's batch.

use crate::types::{to_hex, TransactionId};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Structural or format violation.
    Schema,
    /// Missing or invalid signature, key mismatch.
    Auth,
    Nonce,
    /// Insufficient funds, overflow, minimum remaining balance.
    Balance,
    /// Command-specific rule violation.
    Asset,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Schema => write!(f, "SchemaError"),
            ErrorKind::Auth => write!(f, "AuthError"),
            ErrorKind::Nonce => write!(f, "NonceError"),
            ErrorKind::Balance => write!(f, "BalanceError"),
            ErrorKind::Asset => write!(f, "AssetSemanticError"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {path}: {message} (transaction {})", to_hex(.id))]
pub struct TransactionError {
    pub kind: ErrorKind,
    pub id: TransactionId,
    /// JSON pointer into the transaction, e.g. `/params/votes/2/amount`.
    pub path: String,
    pub message: String,
    pub actual: Option<String>,
    pub expected: Option<String>,
}

impl TransactionError {
    pub fn new(
        kind: ErrorKind,
        id: TransactionId,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            id,
            path: path.into(),
            message: message.into(),
            actual: None,
            expected: None,
        }
    }

    pub fn schema(id: TransactionId, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Schema, id, path, message)
    }

    pub fn auth(id: TransactionId, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, id, path, message)
    }

    pub fn nonce(id: TransactionId, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Nonce, id, "/nonce", message)
    }

    pub fn balance(id: TransactionId, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Balance, id, path, message)
    }

    pub fn asset(id: TransactionId, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Asset, id, path, message)
    }

    pub fn with_values(mut self, actual: impl ToString, expected: impl ToString) -> Self {
        self.actual = Some(actual.to_string());
        self.expected = Some(expected.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    /// Multisignature transaction that is valid so far but awaits more co-signers.
    Pending,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResponse {
    pub id: TransactionId,
    pub status: ResponseStatus,
    pub errors: Vec<TransactionError>,
}

impl TransactionResponse {
    /// FAIL iff any error was collected.
    pub fn from_errors(id: TransactionId, errors: Vec<TransactionError>) -> Self {
        let status = if errors.is_empty() {
            ResponseStatus::Ok
        } else {
            ResponseStatus::Fail
        };
        Self { id, status, errors }
    }

    pub fn pending(id: TransactionId) -> Self {
        Self {
            id,
            status: ResponseStatus::Pending,
            errors: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    pub fn has_error_kind(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("account {0} not found")]
    AccountNotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    #[error("chain identifier is not set")]
    MissingChainId,
    #[error("private key must be 32 bytes, got {0}")]
    InvalidPrivateKeyLength(usize),
    #[error("public key {0} is not a signer of this transaction")]
    UnknownSigner(String),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("nonce of account {0} would underflow on undo")]
    NonceUnderflow(String),
    #[error("unlocking entry ({delegate}, {amount}, {unvote_height}) missing on undo")]
    MissingUnlockingEntry {
        delegate: String,
        amount: u64,
        unvote_height: u32,
    },
    #[error("vote entry for delegate {0} missing on undo")]
    MissingVoteEntry(String),
    #[error("delegate {0} has no delegate record on undo")]
    MissingDelegate(String),
    #[error("misbehavior height {height} not recorded for delegate {delegate}")]
    MissingPomHeight { delegate: String, height: u32 },
    #[error("delegate username registry is corrupt: {0}")]
    CorruptRegistry(String),
}
