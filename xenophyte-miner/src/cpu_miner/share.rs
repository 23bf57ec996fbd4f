//! Share encryption.
//!
//! A candidate `a op b` is rendered as text, put through the job's XOR/AES
//! rounds and digested. The digest of that digest is what the node compares
//! against the block indication.

use std::io::Write;

use super::math::Candidate;
use crate::crypto::{self, cipher, digest::DIGEST_HEX_LEN, CryptoResult, ShareDigest};
use crate::job::JobTemplate;

/// Capacity of the formatted share text.
pub const SHARE_TEXT_LEN: usize = 64;

/// Render `"{a} {op} {b} {timestamp}"` into `buf`, returning its length.
/// `None` if it does not fit.
pub fn format_share(
    candidate: &Candidate,
    timestamp: i64,
    buf: &mut [u8; SHARE_TEXT_LEN],
) -> Option<usize> {
    let mut cursor: &mut [u8] = &mut buf[..];
    write!(
        cursor,
        "{} {} {} {}",
        candidate.first, candidate.operator, candidate.second, timestamp
    )
    .ok()?;
    Some(SHARE_TEXT_LEN - cursor.len())
}

/// Output of [`ShareEncoder::encrypt`]: two uppercase hex digests.
#[derive(Clone)]
pub struct EncryptedShare {
    pub share: [u8; DIGEST_HEX_LEN],
    pub hash: [u8; DIGEST_HEX_LEN],
}

impl Default for EncryptedShare {
    fn default() -> Self {
        Self {
            share: [0; DIGEST_HEX_LEN],
            hash: [0; DIGEST_HEX_LEN],
        }
    }
}

impl EncryptedShare {
    /// Whether the hash equals `indication` (uppercase hex).
    pub fn matches(&self, indication: &str) -> bool {
        self.hash[..] == *indication.as_bytes()
    }

    pub fn share_str(&self) -> &str {
        std::str::from_utf8(&self.share).unwrap_or_default()
    }

    pub fn hash_str(&self) -> &str {
        std::str::from_utf8(&self.hash).unwrap_or_default()
    }
}

/// Per-worker share encryptor. Scratch buffers grow to the largest round
/// and are reused afterwards.
pub struct ShareEncoder {
    digest: ShareDigest,
    text: [u8; SHARE_TEXT_LEN],
    stage: Vec<u8>,
    cipher_out: Vec<u8>,
}

impl ShareEncoder {
    pub fn new(digest: ShareDigest) -> Self {
        Self {
            digest,
            text: [0; SHARE_TEXT_LEN],
            stage: Vec::new(),
            cipher_out: Vec::new(),
        }
    }

    /// Encrypt `candidate` for `job` into `out`.
    pub fn encrypt(
        &mut self,
        job: &JobTemplate,
        candidate: &Candidate,
        out: &mut EncryptedShare,
    ) -> CryptoResult<()> {
        let len = format_share(candidate, job.timestamp, &mut self.text)
            .ok_or(crypto::CryptoError::InvalidLength)?;

        crypto::xor_hex_into(&self.text[..len], &job.xor_key, false, &mut self.stage);

        for round in (0..=job.aes_round).rev() {
            cipher::cbc_encrypt_into(
                job.aes_key_size,
                &job.aes_key,
                &job.aes_iv,
                &self.stage,
                &mut self.cipher_out,
            )?;
            let xor_key: &[u8] = if round == 1 { &job.xor_key } else { &[] };
            crypto::xor_hex_into(&self.cipher_out, xor_key, true, &mut self.stage);
        }

        self.digest.hex_into(&self.stage, &mut out.share);
        self.digest.hex_into(&out.share, &mut out.hash);
        Ok(())
    }
}
