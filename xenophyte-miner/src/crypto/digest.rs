//! 512-bit digests for share fingerprints.

use serde::Deserialize;
use sha2::Sha512;
use sha3::{Digest, Sha3_512};

use super::BASE16_UPPER;

/// Length of a 512-bit digest rendered as hex.
pub const DIGEST_HEX_LEN: usize = 128;

/// Digest applied to the encrypted share text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ShareDigest {
    #[default]
    #[strum(serialize = "sha3-512")]
    #[serde(rename = "sha3-512")]
    Sha3_512,
    #[strum(serialize = "sha2-512")]
    #[serde(rename = "sha2-512")]
    Sha2_512,
}

impl ShareDigest {
    /// Hash `input` and write the uppercase hex digest into `out`.
    pub fn hex_into(self, input: &[u8], out: &mut [u8; DIGEST_HEX_LEN]) {
        let mut digest = [0u8; 64];
        match self {
            Self::Sha3_512 => digest.copy_from_slice(&Sha3_512::digest(input)),
            Self::Sha2_512 => digest.copy_from_slice(&Sha512::digest(input)),
        }
        for (i, byte) in digest.iter().enumerate() {
            out[2 * i] = BASE16_UPPER[(byte >> 4) as usize];
            out[2 * i + 1] = BASE16_UPPER[(byte & 0x0f) as usize];
        }
    }
}
