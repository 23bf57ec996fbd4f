//! Error types for the node connection.

use std::io;

use crate::crypto::CryptoError;

/// Why a connection ended.
///
/// The display strings are the ones shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DisconnectReason {
    #[strum(serialize = "Connection failed")]
    ConnectionFailed,

    #[strum(serialize = "Connection timeout")]
    ConnectionTimeout,

    #[strum(serialize = "Packet handler error")]
    PacketHandlerError,

    #[strum(serialize = "Packet handler timeout")]
    PacketHandlerTimeout,

    #[strum(serialize = "Login failed")]
    LoginFailed,

    /// The owner asked for the disconnect.
    #[strum(serialize = "None")]
    Requested,
}

/// Network errors.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("connection failed: {0}")]
    Connect(#[source] io::Error),

    #[error("connection timed out")]
    ConnectTimeout,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("framing error: {0}")]
    Framing(String),

    #[error("packet decode failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed by node")]
    ConnectionClosed,

    #[error("login rejected by node")]
    LoginRejected,

    #[error("invalid pool URL: {0}")]
    InvalidUrl(String),
}

impl NetworkError {
    /// Disconnect reason reported when this error ends a connection.
    pub fn reason(&self) -> DisconnectReason {
        match self {
            Self::Connect(_) | Self::InvalidUrl(_) => DisconnectReason::ConnectionFailed,
            Self::ConnectTimeout => DisconnectReason::ConnectionTimeout,
            Self::Timeout => DisconnectReason::PacketHandlerTimeout,
            Self::LoginRejected => DisconnectReason::LoginFailed,
            Self::Io(_) | Self::Framing(_) | Self::Crypto(_) | Self::ConnectionClosed => {
                DisconnectReason::PacketHandlerError
            }
        }
    }
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
