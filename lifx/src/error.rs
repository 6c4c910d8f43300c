use std::io;
use std::time::Duration;

/// Everything that can go wrong talking to a bulb.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A packet couldn't be encoded/decoded, or a caller supplied value was rejected before
    /// anything was sent (see [lifx_core::Error::Validation]).
    #[error(transparent)]
    Codec(#[from] lifx_core::Error),

    /// A socket operation failed.
    #[error("socket {action} error: {err}")]
    Network {
        action: &'static str,
        #[source]
        err: io::Error,
    },

    /// Nothing answered the request within its timeout.
    #[error("no reply to sequence {seq} within {timeout:?}")]
    Timeout { seq: u8, timeout: Duration },

    /// The device answered, but with a message we weren't asking for.
    #[error("expected {expected}, got message type {got}")]
    UnexpectedMessage { expected: &'static str, got: u16 },

    /// Every sequence number already has a request waiting on it.
    #[error("all 256 sequence numbers are waiting for replies")]
    SequenceExhausted,
}

impl Error {
    pub fn network(action: &'static str, err: io::Error) -> Self {
        Error::Network { action, err }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Codec(lifx_core::Error::Validation(_)))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
