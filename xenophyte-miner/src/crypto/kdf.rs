//! PBKDF1 over SHA-1, compatible with .NET `PasswordDeriveBytes`.
//!
//! The node derives transport and job keys with the legacy .NET derivation,
//! which differs from RFC 8018 PBKDF1 in two ways:
//!
//! - Output longer than one digest is produced by re-hashing the base value
//!   with an ASCII decimal counter prefix (`""`, `"1"`, `"2"`, ... `"999"`).
//! - Successive [`Pbkdf1::fill_bytes`] calls share one stream, and when a call
//!   needs more than the bytes left over from the previous call, the leftover
//!   copy starts at the wrong offset. Keys and IVs on the wire depend on this,
//!   so it is reproduced exactly.

use sha1::{Digest, Sha1};

use super::{CryptoError, CryptoResult};

/// Iteration count used everywhere in the protocol.
pub const DEFAULT_ITERATIONS: u32 = 100;

const DIGEST_LEN: usize = 20;
const MAX_PREFIX: u32 = 999;

/// Stateful PBKDF1-SHA1 byte stream.
pub struct Pbkdf1 {
    password: Vec<u8>,
    salt: Vec<u8>,
    iterations: u32,
    base: Option<[u8; DIGEST_LEN]>,
    extra: Vec<u8>,
    extra_count: usize,
    prefix: u32,
}

impl Pbkdf1 {
    /// Create a derivation stream with the protocol's 100 iterations.
    pub fn new(password: &[u8], salt: &[u8]) -> CryptoResult<Self> {
        Self::with_iterations(password, salt, DEFAULT_ITERATIONS)
    }

    pub fn with_iterations(password: &[u8], salt: &[u8], iterations: u32) -> CryptoResult<Self> {
        if password.is_empty() {
            return Err(CryptoError::EmptyPassword);
        }
        if iterations == 0 {
            return Err(CryptoError::NoIterations);
        }

        Ok(Self {
            password: password.to_vec(),
            salt: salt.to_vec(),
            iterations,
            base: None,
            extra: Vec::new(),
            extra_count: 0,
            prefix: 0,
        })
    }

    /// Fill `out` with the next bytes of the stream.
    pub fn fill_bytes(&mut self, out: &mut [u8]) -> CryptoResult<()> {
        let cb = out.len();
        if cb == 0 {
            return Ok(());
        }

        let mut ib = 0;
        let base = match self.base {
            Some(base) => {
                if !self.extra.is_empty() {
                    ib = self.extra.len() - self.extra_count;

                    if ib >= cb {
                        out.copy_from_slice(&self.extra[self.extra_count..self.extra_count + cb]);
                        if ib > cb {
                            self.extra_count += cb;
                        } else {
                            self.extra.clear();
                        }
                        return Ok(());
                    }

                    // Leftover bytes are taken from offset `ib`, not
                    // `extra_count`. Matches the node.
                    let leftover = self
                        .extra
                        .get(ib..2 * ib)
                        .ok_or(CryptoError::LeftoverOverrun)?;
                    out[..ib].copy_from_slice(leftover);
                    self.extra.clear();
                }
                base
            }
            None => {
                let base = self.compute_base();
                self.base = Some(base);
                base
            }
        };

        let needed = cb - ib;
        let blocks = needed.div_ceil(DIGEST_LEN);
        let mut rgb = Vec::with_capacity(blocks * DIGEST_LEN);
        for _ in 0..blocks {
            let prefix = self.next_prefix()?;
            let mut hasher = Sha1::new();
            if let Some(prefix) = prefix {
                hasher.update(prefix.as_bytes());
            }
            hasher.update(base);
            rgb.extend_from_slice(&hasher.finalize());
        }

        out[ib..].copy_from_slice(&rgb[..needed]);

        if rgb.len() > needed {
            self.extra = rgb;
            self.extra_count = needed;
        }

        Ok(())
    }

    fn compute_base(&self) -> [u8; DIGEST_LEN] {
        let mut hasher = Sha1::new();
        hasher.update(&self.password);
        hasher.update(&self.salt);
        let mut base: [u8; DIGEST_LEN] = hasher.finalize().into();

        // One hash above, then `iterations - 2` more.
        for _ in 1..self.iterations.saturating_sub(1) {
            base = Sha1::digest(base).into();
        }
        base
    }

    fn next_prefix(&mut self) -> CryptoResult<Option<String>> {
        if self.prefix > MAX_PREFIX {
            return Err(CryptoError::KdfExhausted);
        }
        let prefix = self.prefix;
        self.prefix += 1;
        Ok((prefix > 0).then(|| prefix.to_string()))
    }
}
