// Raffle View - Errors
use thiserror::Error;

use crate::gate::InvalidTransition;

/// Errors that may be returned by the raffle client
#[derive(Error, Debug)]
pub enum RaffleClientError {
    /// HTTP-level failure talking to the indexer or the RPC endpoint
    #[error("Transport error: {0}")]
    Transport(String),

    /// The indexer answered but reported query errors
    #[error("Indexer query failed: {0}")]
    IndexerQuery(String),

    /// The JSON-RPC endpoint returned an error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// A request did not finish inside its deadline
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Contract return data could not be decoded
    #[error("ABI decode error: {0}")]
    Decode(String),

    /// A record field was missing or malformed
    #[error("Invalid raffle record {field}: {reason}")]
    InvalidRecord { field: &'static str, reason: String },

    /// User-supplied form input is not acceptable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The user declined the request in their wallet
    #[error("Request rejected in wallet")]
    UserRejected,

    /// No wallet account is connected
    #[error("Wallet not connected")]
    NotConnected,

    /// Balance or allowance cannot cover the action
    #[error("Insufficient {what}: need {required}, have {available}")]
    Insufficient {
        what: &'static str,
        required: u128,
        available: u128,
    },

    /// The contract reverted the transaction
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// Configuration is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted preferences could not be read or written
    #[error("Preference storage error: {0}")]
    Storage(String),

    /// A transaction flow step was requested out of order
    #[error(transparent)]
    Flow(#[from] InvalidTransition),
}

/// Class of failure, used to pick what the user is shown
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or indexer trouble; a fallback path applies
    Transient,
    /// The user declined the wallet prompt
    Rejected,
    /// Not enough balance or allowance
    Insufficient,
    /// Contract revert or anything unexpected
    Reverted,
    /// Misconfiguration detected at startup
    Configuration,
}

impl RaffleClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RaffleClientError::Transport(_)
            | RaffleClientError::IndexerQuery(_)
            | RaffleClientError::Rpc { .. }
            | RaffleClientError::Timeout(_)
            | RaffleClientError::Decode(_)
            | RaffleClientError::InvalidRecord { .. } => ErrorKind::Transient,
            RaffleClientError::UserRejected => ErrorKind::Rejected,
            RaffleClientError::Insufficient { .. }
            | RaffleClientError::NotConnected
            | RaffleClientError::InvalidInput(_) => ErrorKind::Insufficient,
            RaffleClientError::Reverted(_) | RaffleClientError::Flow(_) => ErrorKind::Reverted,
            RaffleClientError::Config(_) | RaffleClientError::Storage(_) => {
                ErrorKind::Configuration
            }
        }
    }

    /// The non-blocking message shown to the user for this error.
    pub fn user_note(&self) -> UserNote {
        let message = match self.kind() {
            ErrorKind::Transient => "Network trouble, try again shortly.".to_string(),
            ErrorKind::Rejected => "Canceled.".to_string(),
            // Inline reasons are specific, so pass them through
            ErrorKind::Insufficient => match self {
                RaffleClientError::Insufficient { what, .. } => format!("Insufficient {}.", what),
                RaffleClientError::NotConnected => "Connect a wallet first.".to_string(),
                other => other.to_string(),
            },
            ErrorKind::Reverted => "Could not complete this action.".to_string(),
            ErrorKind::Configuration => "This app is misconfigured.".to_string(),
        };
        UserNote {
            kind: self.kind(),
            message,
        }
    }
}

/// A short, user-facing note. Never fatal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserNote {
    pub kind: ErrorKind,
    pub message: String,
}

impl UserNote {
    pub fn load_failed() -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: "Could not load raffles right now.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RaffleClientError>;
