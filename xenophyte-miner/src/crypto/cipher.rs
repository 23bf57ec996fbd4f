//! AES ciphers used by the protocol.
//!
//! Two modes are in play: AES-256-CFB8 protects every framed packet on the
//! connection, and AES-CBC (128/192/256) drives the share encryption rounds.
//! Both pad with PKCS7, always adding at least one byte.

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use cfb8::cipher::AsyncStreamCipher;

use super::{CryptoError, CryptoResult};

pub const BLOCK_SIZE: usize = 16;
pub const TRANSPORT_KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

/// Number of padding bytes PKCS7 adds to `len` bytes of input.
pub fn padding_len(len: usize) -> usize {
    BLOCK_SIZE - len % BLOCK_SIZE
}

/// Append PKCS7 padding to `buf`.
pub fn pkcs7_pad(buf: &mut Vec<u8>) {
    let pad = padding_len(buf.len());
    buf.resize(buf.len() + pad, pad as u8);
}

/// Strip and validate PKCS7 padding, returning the unpadded length.
pub fn pkcs7_unpad(buf: &[u8]) -> CryptoResult<usize> {
    let pad = *buf.last().ok_or(CryptoError::InvalidPadding)? as usize;
    if pad == 0 || pad > BLOCK_SIZE || pad > buf.len() {
        return Err(CryptoError::InvalidPadding);
    }
    if buf[buf.len() - pad..].iter().any(|&b| b as usize != pad) {
        return Err(CryptoError::InvalidPadding);
    }
    Ok(buf.len() - pad)
}

/// Per-connection AES-256-CFB8 cipher with a fixed key and IV.
///
/// Every packet is encrypted from the same IV; the node does the same.
#[derive(Clone)]
pub struct TransportCipher {
    key: [u8; TRANSPORT_KEY_LEN],
    iv: [u8; IV_LEN],
}

impl TransportCipher {
    pub fn new(key: [u8; TRANSPORT_KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { key, iv }
    }

    /// Pad and encrypt `payload`.
    pub fn encrypt(&self, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(payload.len() + BLOCK_SIZE);
        buf.extend_from_slice(payload);
        pkcs7_pad(&mut buf);
        cfb8::Encryptor::<Aes256>::new(&self.key.into(), &self.iv.into()).encrypt(&mut buf);
        buf
    }

    /// Decrypt `ciphertext` in place and strip the padding.
    pub fn decrypt(&self, mut ciphertext: Vec<u8>) -> CryptoResult<Vec<u8>> {
        cfb8::Decryptor::<Aes256>::new(&self.key.into(), &self.iv.into()).decrypt(&mut ciphertext);
        let len = pkcs7_unpad(&ciphertext)?;
        ciphertext.truncate(len);
        Ok(ciphertext)
    }
}

impl std::fmt::Debug for TransportCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportCipher").finish_non_exhaustive()
    }
}

/// AES key sizes accepted for share encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesKeySize {
    Aes128,
    Aes192,
    Aes256,
}

impl AesKeySize {
    pub fn from_bits(bits: usize) -> CryptoResult<Self> {
        match bits {
            128 => Ok(Self::Aes128),
            192 => Ok(Self::Aes192),
            256 => Ok(Self::Aes256),
            other => Err(CryptoError::UnsupportedKeySize(other)),
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    pub fn bits(self) -> usize {
        self.key_len() * 8
    }
}

/// AES-CBC encrypt `input` with PKCS7 padding into `output`.
///
/// `output` is resized to the ciphertext length.
pub fn cbc_encrypt_into(
    size: AesKeySize,
    key: &[u8],
    iv: &[u8],
    input: &[u8],
    output: &mut Vec<u8>,
) -> CryptoResult<()> {
    output.resize(input.len() + padding_len(input.len()), 0);

    let written = match size {
        AesKeySize::Aes128 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidLength)?
            .encrypt_padded_b2b_mut::<Pkcs7>(input, output)
            .map_err(|_| CryptoError::InvalidPadding)?
            .len(),
        AesKeySize::Aes192 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidLength)?
            .encrypt_padded_b2b_mut::<Pkcs7>(input, output)
            .map_err(|_| CryptoError::InvalidPadding)?
            .len(),
        AesKeySize::Aes256 => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidLength)?
            .encrypt_padded_b2b_mut::<Pkcs7>(input, output)
            .map_err(|_| CryptoError::InvalidPadding)?
            .len(),
    };

    output.truncate(written);
    Ok(())
}
