//! Protocol constants for the solo mining node.

/// Prefix of the plaintext handshake certificate.
pub const CERTIFICATE_SEED: &str = "XENOPHYTESEED";

/// Number of random characters following [`CERTIFICATE_SEED`].
pub const CERTIFICATE_SIZE: usize = 256;

/// Characters a certificate is drawn from.
pub const CERTIFICATE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789&~#@'(\\)=";

/// Port used when the pool URL does not name one.
pub const SEED_NODE_PORT: u16 = 18000;

/// Marker closing every encrypted frame.
pub const FRAME_END: u8 = b'*';

/// Upper bound on a single inbound frame, marker included.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

pub const MINER_LOGIN: &str = "MINER";

pub const SEND_LOGIN_ACCEPTED: &str = "SEND-LOGIN-ACCEPTED";
pub const SEND_JOB_STATUS: &str = "SEND-JOB-STATUS";
pub const SEND_CURRENT_BLOCK_MINING: &str = "SEND-CURRENT-BLOCK-MINING";
pub const SEND_CONTENT_BLOCK_METHOD: &str = "SEND-CONTENT-BLOCK-METHOD";

pub const RECEIVE_JOB: &str = "RECEIVE-JOB";
pub const RECEIVE_ASK_CURRENT_BLOCK_MINING: &str = "RECEIVE-ASK-CURRENT-BLOCK-MINING";
pub const RECEIVE_ASK_CONTENT_BLOCK_METHOD: &str = "RECEIVE-ASK-CONTENT-BLOCK-METHOD";

// Job status replies.
pub const SHARE_WRONG: &str = "WRONG";
pub const SHARE_UNLOCK: &str = "UNLOCK";
pub const SHARE_ALREADY: &str = "ALREADY";
pub const SHARE_NOT_EXIST: &str = "NOTEXIST";
