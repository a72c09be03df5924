use crate::{instrument::ExchangeId, transport::TransportError};
use smol_str::SmolStr;
use std::time::Duration;
use thiserror::Error;

/// All errors generated in `ticker-data`.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FeedError {
    #[error("MalformedMessage from {exchange}: {reason}")]
    MalformedMessage { exchange: ExchangeId, reason: String },

    #[error(
        "\
        SequenceGap for {symbol}: expected sequence {expected} but received {received} \
    "
    )]
    SequenceGap {
        symbol: SmolStr,
        expected: u64,
        received: u64,
    },

    #[error("{exchange} rejected subscription request {request_id}: {reason}")]
    SubscriptionRejected {
        exchange: ExchangeId,
        request_id: u64,
        reason: String,
    },

    #[error("subscription acknowledgement not received within {0:?}")]
    SubscriptionTimeout(Duration),

    #[error("no message received within {0:?}")]
    IdleTimeout(Duration),

    #[error("TransportFault: {0}")]
    Transport(#[from] TransportError),

    #[error("ConfigurationError: {0}")]
    Configuration(String),

    #[error("failed to load exchange symbol catalog: {0}")]
    Catalog(String),
}

/// What a feed supervisor must do in response to a [`FeedError`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FaultAction {
    /// Log and discard the offending message, keep streaming.
    Drop,
    /// Tear down the connection and reconnect after backoff.
    Reconnect,
    /// Stop this feed permanently.
    Fatal,
}

impl FeedError {
    pub fn action(&self) -> FaultAction {
        match self {
            FeedError::MalformedMessage { .. } => FaultAction::Drop,
            FeedError::SequenceGap { .. }
            | FeedError::SubscriptionTimeout(_)
            | FeedError::IdleTimeout(_)
            | FeedError::Transport(_) => FaultAction::Reconnect,
            FeedError::SubscriptionRejected { .. }
            | FeedError::Configuration(_)
            | FeedError::Catalog(_) => FaultAction::Fatal,
        }
    }

    /// Determine if an error requires the connection to be re-initialised or abandoned.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.action(), FaultAction::Drop)
    }

    pub(crate) fn malformed(exchange: ExchangeId, reason: impl ToString) -> Self {
        Self::MalformedMessage {
            exchange,
            reason: reason.to_string(),
        }
    }
}
