//! Cryptographic building blocks for the Xenophyte protocol.
//!
//! Everything here is stateless apart from the [`Pbkdf1`] derivation stream.
//! The wire protocol and the share encoder compose these functions; nothing
//! in this module knows about sockets or jobs.

pub mod cipher;
pub mod digest;
pub mod kdf;
pub mod random;

pub use cipher::{pkcs7_pad, pkcs7_unpad, AesKeySize, TransportCipher};
pub use digest::ShareDigest;
pub use kdf::Pbkdf1;

/// Uppercase base16 alphabet used by every hex transform in the protocol.
pub(crate) const BASE16_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Errors raised by the crypto primitives.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key derivation needs a non-empty password")]
    EmptyPassword,

    #[error("key derivation needs at least one iteration")]
    NoIterations,

    #[error("key derivation stream exhausted")]
    KdfExhausted,

    #[error("key derivation read past the leftover buffer")]
    LeftoverOverrun,

    #[error("invalid key or iv length")]
    InvalidLength,

    #[error("unsupported AES key size: {0} bits")]
    UnsupportedKeySize(usize),

    #[error("invalid PKCS7 padding")]
    InvalidPadding,

    #[error("XOR key is empty")]
    EmptyXorKey,

    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Hex-encode `input` in uppercase into `output`, XOR-ing every produced
/// character with the key byte at the same output position.
///
/// With `dashed` set, bytes are separated by `-` (`AA-BB-CC`), and the
/// separators are XOR-ed too.
pub fn xor_hex_into(input: &[u8], xor_key: &[u8], dashed: bool, output: &mut Vec<u8>) {
    output.clear();
    let stride = if dashed { 3 } else { 2 };
    output.reserve(input.len() * stride);

    for (i, byte) in input.iter().enumerate() {
        if dashed && i > 0 {
            output.push(b'-');
        }
        output.push(BASE16_UPPER[(byte >> 4) as usize]);
        output.push(BASE16_UPPER[(byte & 0x0f) as usize]);
    }

    if !xor_key.is_empty() {
        for (pos, c) in output.iter_mut().enumerate() {
            *c ^= xor_key[pos % xor_key.len()];
        }
    }
}

/// Uppercase hex into `output`, optionally dashed, without XOR.
pub fn hex_into(input: &[u8], dashed: bool, output: &mut Vec<u8>) {
    xor_hex_into(input, &[], dashed, output);
}
