//! Connection to a Xenophyte solo mining node.
//!
//! A [`Network`] owns at most one live connection. Each connection runs a
//! single drain task that executes queued packets strictly one at a time:
//! write the request, then read exactly one reply if the packet expects one.
//! Replies are therefore correlated by order alone.
//!
//! Everything the rest of the miner needs to know arrives as a
//! [`NetworkEvent`] on the channel passed to [`Network::new`].

pub mod constants;
mod connection;
mod error;
mod packet;
mod session;

use std::sync::Arc;
use std::time::Duration;

pub use connection::{generate_certificate, transport_cipher, Endpoint, Network, NetworkSettings};
pub use error::{DisconnectReason, NetworkError, NetworkResult};
pub use packet::{Frame, OutboundPacket, PacketCodec, PacketQueue};

use crate::job::JobTemplate;
use crate::types::JobType;

/// Events emitted by the network side.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// Login accepted; the session is polling for jobs.
    Ready,

    /// The connection ended. Emitted exactly once per connection attempt
    /// that does not stay up.
    Disconnected(DisconnectReason),

    /// A complete job template was received.
    NewJob(Arc<JobTemplate>),

    /// The node answered a share submission.
    ShareResult {
        height: i64,
        job_type: JobType,
        status: ShareStatus,
        round_trip: Duration,
    },
}

/// Node verdict on a submitted share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareStatus {
    Accepted,
    /// `WRONG` or `NOTEXIST`.
    Invalid,
    /// `ALREADY`: another miner found the block first.
    Orphan,
}

impl ShareStatus {
    /// Classify a `SEND-JOB-STATUS|...` reply. Unknown replies yield `None`.
    pub fn from_reply(reply: &[u8]) -> Option<Self> {
        let status = reply
            .strip_prefix(constants::SEND_JOB_STATUS.as_bytes())?
            .strip_prefix(b"|")?;

        if status.starts_with(constants::SHARE_WRONG.as_bytes())
            || status.starts_with(constants::SHARE_NOT_EXIST.as_bytes())
        {
            Some(Self::Invalid)
        } else if status.starts_with(constants::SHARE_UNLOCK.as_bytes()) {
            Some(Self::Accepted)
        } else if status.starts_with(constants::SHARE_ALREADY.as_bytes()) {
            Some(Self::Orphan)
        } else {
            None
        }
    }

    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }

    /// Short rejection reason shown to the user.
    pub fn reason(self) -> Option<&'static str> {
        match self {
            Self::Accepted => None,
            Self::Invalid => Some("Invalid Share"),
            Self::Orphan => Some("Orphan Share"),
        }
    }
}
