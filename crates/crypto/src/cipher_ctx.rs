//! Per-file cipher contexts with envelope update/finalize semantics.
//!
//! `update` consumes arbitrary-length input but only emits whole cipher
//! blocks; the trailing partial block is retained inside the context until
//! more input arrives or `finalize` pads and flushes it. The decrypt side
//! mirrors this and additionally withholds the last full block until
//! `finalize`, because that block carries the PKCS#7 padding.

use aes::{Aes128, Aes256};
use cipher::generic_array::GenericArray;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::session::{CipherSpec, SessionKeys};

const BLOCK: usize = 16;

enum Encryptor {
    Aes128(cbc::Encryptor<Aes128>),
    Aes256(cbc::Encryptor<Aes256>),
}

impl Encryptor {
    fn encrypt_in_place(&mut self, data: &mut [u8]) {
        debug_assert_eq!(data.len() % BLOCK, 0);
        for chunk in data.chunks_exact_mut(BLOCK) {
            let block = GenericArray::from_mut_slice(chunk);
            match self {
                Self::Aes128(state) => state.encrypt_block_mut(block),
                Self::Aes256(state) => state.encrypt_block_mut(block),
            }
        }
    }
}

enum Decryptor {
    Aes128(cbc::Decryptor<Aes128>),
    Aes256(cbc::Decryptor<Aes256>),
}

impl Decryptor {
    fn decrypt_in_place(&mut self, data: &mut [u8]) {
        debug_assert_eq!(data.len() % BLOCK, 0);
        for chunk in data.chunks_exact_mut(BLOCK) {
            let block = GenericArray::from_mut_slice(chunk);
            match self {
                Self::Aes128(state) => state.decrypt_block_mut(block),
                Self::Aes256(state) => state.decrypt_block_mut(block),
            }
        }
    }
}

/// Encrypting cipher context for one file's data phase.
pub struct CipherContext {
    state: Encryptor,
    pending: Vec<u8>,
}

impl CipherContext {
    /// Allocates an encrypting context from the session keys.
    pub fn new(keys: &SessionKeys) -> Result<Self, CryptoError> {
        let state = match keys.spec {
            CipherSpec::Aes128Cbc => Encryptor::Aes128(cbc::Encryptor::new_from_slices(
                &keys.key, &keys.iv,
            )
            .map_err(|_| CryptoError::KeyLength {
                got: keys.key.len(),
                want: keys.spec.key_len(),
            })?),
            CipherSpec::Aes256Cbc => Encryptor::Aes256(cbc::Encryptor::new_from_slices(
                &keys.key, &keys.iv,
            )
            .map_err(|_| CryptoError::KeyLength {
                got: keys.key.len(),
                want: keys.spec.key_len(),
            })?),
        };
        Ok(Self {
            state,
            pending: Vec::with_capacity(BLOCK),
        })
    }

    /// Cipher block size in bytes.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        BLOCK
    }

    /// Encrypts `input`, appending whole ciphertext blocks to `out`.
    ///
    /// Bytes short of a block boundary stay buffered; the output appended by
    /// one call may therefore be shorter (or longer) than its input.
    pub fn update(&mut self, input: &[u8], out: &mut Vec<u8>) {
        let mut work = std::mem::take(&mut self.pending);
        work.extend_from_slice(input);

        let keep = work.len() % BLOCK;
        let split = work.len() - keep;
        self.pending.extend_from_slice(&work[split..]);
        work.truncate(split);

        if !work.is_empty() {
            self.state.encrypt_in_place(&mut work);
            out.extend_from_slice(&work);
        }
        work.zeroize();
    }

    /// Pads the buffered tail and appends the final ciphertext block(s).
    pub fn finalize(mut self, out: &mut Vec<u8>) -> Result<(), CryptoError> {
        let pad = BLOCK - (self.pending.len() % BLOCK);
        let mut tail = std::mem::take(&mut self.pending);
        tail.resize(tail.len() + pad, pad as u8);
        self.state.encrypt_in_place(&mut tail);
        out.extend_from_slice(&tail);
        Ok(())
    }
}

/// Decrypting cipher context for one file's data phase.
pub struct DecipherContext {
    state: Decryptor,
    pending: Vec<u8>,
}

impl DecipherContext {
    /// Allocates a decrypting context from the session keys.
    pub fn new(keys: &SessionKeys) -> Result<Self, CryptoError> {
        let state = match keys.spec {
            CipherSpec::Aes128Cbc => Decryptor::Aes128(cbc::Decryptor::new_from_slices(
                &keys.key, &keys.iv,
            )
            .map_err(|_| CryptoError::KeyLength {
                got: keys.key.len(),
                want: keys.spec.key_len(),
            })?),
            CipherSpec::Aes256Cbc => Decryptor::Aes256(cbc::Decryptor::new_from_slices(
                &keys.key, &keys.iv,
            )
            .map_err(|_| CryptoError::KeyLength {
                got: keys.key.len(),
                want: keys.spec.key_len(),
            })?),
        };
        Ok(Self {
            state,
            pending: Vec::with_capacity(2 * BLOCK),
        })
    }

    /// Cipher block size in bytes.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        BLOCK
    }

    /// Decrypts `input`, appending whole plaintext blocks to `out`.
    ///
    /// The final full block is always withheld until [`Self::finalize`]
    /// because it may carry the padding.
    pub fn update(&mut self, input: &[u8], out: &mut Vec<u8>) {
        let mut work = std::mem::take(&mut self.pending);
        work.extend_from_slice(input);

        let full = work.len() / BLOCK;
        let process = if work.len() % BLOCK == 0 {
            full.saturating_sub(1)
        } else {
            full
        };
        let split = process * BLOCK;
        self.pending.extend_from_slice(&work[split..]);
        work.truncate(split);

        if !work.is_empty() {
            self.state.decrypt_in_place(&mut work);
            out.extend_from_slice(&work);
        }
        work.zeroize();
    }

    /// Decrypts the withheld block, strips the padding, and appends the
    /// remaining plaintext to `out`.
    pub fn finalize(mut self, out: &mut Vec<u8>) -> Result<(), CryptoError> {
        if self.pending.len() != BLOCK {
            return Err(CryptoError::Padding);
        }
        let mut tail = std::mem::take(&mut self.pending);
        self.state.decrypt_in_place(&mut tail);
        let unpadded = strip_pkcs7(&tail).ok_or(CryptoError::Padding)?;
        out.extend_from_slice(unpadded);
        tail.zeroize();
        Ok(())
    }
}

fn strip_pkcs7(block: &[u8]) -> Option<&[u8]> {
    let &pad = block.last()?;
    let pad = pad as usize;
    if pad == 0 || pad > block.len() {
        return None;
    }
    let body = block.len() - pad;
    if block[body..].iter().any(|&b| b as usize != pad) {
        return None;
    }
    Some(&block[..body])
}
