//! Job template parsing.
//!
//! A job reaches the miner in two packets. The header packet carries the
//! range, target and key password:
//!
//! ```text
//! SEND-CURRENT-BLOCK-MINING|ID=1050878&METHOD=XENOPHYTE&KEY=Uos4dc09&JOB=2;10107&
//!     DIFFICULTY=10107&TIMESTAMP=1654187614&INDICATION=ECBC42F0...&LIFETIME=360
//! ```
//!
//! The method packet carries the cipher parameters as
//! `SEND-CONTENT-BLOCK-METHOD|round#bits#salt#xorKey`. A [`JobTemplate`] only
//! exists once both have been parsed.

use std::fmt;

use crate::crypto::{AesKeySize, CryptoError, Pbkdf1};
use crate::network::constants::{SEND_CONTENT_BLOCK_METHOD, SEND_CURRENT_BLOCK_MINING};

use super::easy_block;

/// Errors that reject a template update.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("packet does not start with {0}")]
    WrongPrefix(&'static str),

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("key derivation failed: {0}")]
    Crypto(#[from] CryptoError),
}

pub type TemplateResult<T> = Result<T, TemplateError>;

fn invalid(field: &'static str, value: &str) -> TemplateError {
    TemplateError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> TemplateResult<T> {
    value.parse().map_err(|_| invalid(field, value))
}

fn is_key(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphabetic() || b == b'_')
}

/// Leading run of value characters; anything after the first other
/// character is ignored.
fn value_prefix(s: &str) -> &str {
    let end = s
        .bytes()
        .position(|b| !(b.is_ascii_alphanumeric() || b == b'.' || b == b';'))
        .unwrap_or(s.len());
    &s[..end]
}

/// First half of a job: the `SEND-CURRENT-BLOCK-MINING` packet.
#[derive(Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub height: i64,
    pub timestamp: i64,
    pub method: String,
    pub indication: String,
    pub difficulty: i64,
    pub min_range: i64,
    pub max_range: i64,
    password: Vec<u8>,
}

impl BlockHeader {
    /// Parse a decrypted header packet.
    pub fn parse(packet: &[u8]) -> TemplateResult<Self> {
        let text = std::str::from_utf8(packet)
            .map_err(|_| TemplateError::WrongPrefix(SEND_CURRENT_BLOCK_MINING))?;
        let body = text
            .strip_prefix(SEND_CURRENT_BLOCK_MINING)
            .and_then(|rest| rest.strip_prefix('|'))
            .ok_or(TemplateError::WrongPrefix(SEND_CURRENT_BLOCK_MINING))?;

        let mut height = None;
        let mut timestamp = None;
        let mut method = None;
        let mut indication = None;
        let mut difficulty = None;
        let mut range = None;
        let mut password = None;

        for pair in body.trim_end().split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = value_prefix(value);
            if !is_key(key) || value.is_empty() {
                continue;
            }

            match key {
                "ID" => height = Some(parse_number("ID", value)?),
                "TIMESTAMP" => timestamp = Some(parse_number("TIMESTAMP", value)?),
                "METHOD" => method = Some(value.to_string()),
                "INDICATION" => indication = Some(value.to_string()),
                "DIFFICULTY" => difficulty = Some(parse_number("DIFFICULTY", value)?),
                "JOB" => {
                    let (min, max) = value.split_once(';').ok_or_else(|| invalid("JOB", value))?;
                    let min: i64 = parse_number("JOB", min)?;
                    let max: i64 = parse_number("JOB", max)?;
                    if min > max {
                        return Err(invalid("JOB", value));
                    }
                    range = Some((min, max));
                }
                "KEY" => password = Some(value.as_bytes().to_vec()),
                _ => {}
            }
        }

        let (min_range, max_range) = range.ok_or(TemplateError::MissingField("JOB"))?;

        Ok(Self {
            height: height.ok_or(TemplateError::MissingField("ID"))?,
            timestamp: timestamp.unwrap_or_default(),
            method: method.ok_or(TemplateError::MissingField("METHOD"))?,
            indication: indication.ok_or(TemplateError::MissingField("INDICATION"))?,
            difficulty: difficulty.unwrap_or_default(),
            min_range,
            max_range,
            password: password.ok_or(TemplateError::MissingField("KEY"))?,
        })
    }
}

impl fmt::Debug for BlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockHeader")
            .field("height", &self.height)
            .field("method", &self.method)
            .field("difficulty", &self.difficulty)
            .field("range", &(self.min_range..=self.max_range))
            .finish_non_exhaustive()
    }
}

/// Second half of a job: the `SEND-CONTENT-BLOCK-METHOD` packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMethod {
    pub aes_round: u32,
    pub aes_key_size: AesKeySize,
    pub salt: Vec<u8>,
    pub xor_key: Vec<u8>,
}

impl BlockMethod {
    /// Parse a decrypted method packet.
    pub fn parse(packet: &[u8]) -> TemplateResult<Self> {
        let text = std::str::from_utf8(packet)
            .map_err(|_| TemplateError::WrongPrefix(SEND_CONTENT_BLOCK_METHOD))?;
        let body = text
            .strip_prefix(SEND_CONTENT_BLOCK_METHOD)
            .and_then(|rest| rest.strip_prefix('|'))
            .ok_or(TemplateError::WrongPrefix(SEND_CONTENT_BLOCK_METHOD))?;

        let mut fields = body.trim_end().split('#');
        let round = fields.next().ok_or(TemplateError::MissingField("round"))?;
        let bits = fields.next().ok_or(TemplateError::MissingField("size"))?;
        let salt = fields.next().ok_or(TemplateError::MissingField("salt"))?;
        let xor_key = fields.next().ok_or(TemplateError::MissingField("xor key"))?;

        let aes_round = parse_number("round", round)?;
        let bits: usize = parse_number("size", bits)?;
        let aes_key_size = AesKeySize::from_bits(bits)?;

        if xor_key.is_empty() {
            return Err(invalid("xor key", xor_key));
        }

        Ok(Self {
            aes_round,
            aes_key_size,
            salt: salt.as_bytes().to_vec(),
            xor_key: xor_key.as_bytes().to_vec(),
        })
    }
}

/// Immutable snapshot of the current search problem.
#[derive(Clone)]
pub struct JobTemplate {
    pub height: i64,
    pub timestamp: i64,
    pub method: String,
    /// Target fingerprint a winning share hash must equal.
    pub indication: String,
    pub difficulty: i64,
    pub min_range: i64,
    pub max_range: i64,
    pub xor_key: Vec<u8>,
    pub aes_key_size: AesKeySize,
    pub aes_key: Vec<u8>,
    pub aes_iv: [u8; 16],
    pub aes_round: u32,
    /// Sorted easy-block values for this range.
    pub easy_values: Vec<i64>,
}

impl JobTemplate {
    /// Combine both halves, deriving the AES key and IV from the header's
    /// password and the method's salt.
    pub fn build(header: BlockHeader, method: BlockMethod) -> TemplateResult<Self> {
        let mut kdf = Pbkdf1::new(&header.password, &method.salt)?;
        let mut aes_key = vec![0u8; method.aes_key_size.key_len()];
        let mut aes_iv = [0u8; 16];
        kdf.fill_bytes(&mut aes_key)?;
        kdf.fill_bytes(&mut aes_iv)?;

        let easy_values = easy_block::generate(header.min_range, header.max_range);

        Ok(Self {
            height: header.height,
            timestamp: header.timestamp,
            method: header.method,
            indication: header.indication,
            difficulty: header.difficulty,
            min_range: header.min_range,
            max_range: header.max_range,
            xor_key: method.xor_key,
            aes_key_size: method.aes_key_size,
            aes_key,
            aes_iv,
            aes_round: method.aes_round,
            easy_values,
        })
    }

    /// Whether `value` is one of the easy-block values.
    pub fn is_easy_value(&self, value: i64) -> bool {
        self.easy_values.binary_search(&value).is_ok()
    }

    /// Whether the easy-block values already cover the whole range.
    pub fn easy_values_cover_range(&self) -> bool {
        let range = self.max_range as i128 - self.min_range as i128 + 1;
        self.easy_values.len() as i128 >= range
    }
}

impl fmt::Debug for JobTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobTemplate")
            .field("height", &self.height)
            .field("method", &self.method)
            .field("difficulty", &self.difficulty)
            .field("range", &(self.min_range..=self.max_range))
            .field("aes_round", &self.aes_round)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_packets {
    //! Sample packets shared by job, network and miner tests.

    pub const HEADER: &str = "SEND-CURRENT-BLOCK-MINING|ID=1050878&\
        HASH=8D67ED6841B2305E0B23A5D009015F466BCBCEA0B5541263E0682B2E576B0CB9&\
        ALGORITHM=AES&SIZE=256&METHOD=XENOPHYTE&\
        KEY=Uos4dc09b3pgQGnII985eLmfLRKW6gG5FC3J6ctarAnRe2Uhof0a5Rx5vBi0JekuKz1ufEzJmp1Zou&\
        JOB=2;10107&REWARD=10.00000000&DIFFICULTY=10107&TIMESTAMP=1654187614&\
        INDICATION=ECBC42F0E83175E174FA6AB566EBEA88D97C2195BDB6E19483CDAD1FFC8EAF2A\
        657BB8EF53E0D04FAFEF7539F7E9724F820517F560829288C0E04B4C58DD693B&\
        NETWORK_HASHRATE=12128&LIFETIME=360";

    pub const METHOD: &str = "SEND-CONTENT-BLOCK-METHOD|1#256#128#XENOPHYTEXORKEY";
}
