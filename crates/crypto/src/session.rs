//! Per-job crypto session and its wire encoding.
//!
//! A session holds the job's randomly generated symmetric key and IV. The
//! key is wrapped once for every recipient public key and the whole session
//! is encoded into a single blob at job start; that blob is replayed
//! verbatim as the crypto-session record of every encrypted file. The
//! restore side decodes the blob with whichever private key matches a
//! recipient fingerprint.
//!
//! Blob layout, all integers big-endian:
//!
//! ```text
//! magic(u32) version(u16) cipher(u16) iv_len(u16) iv
//! recipient_count(u16) { fingerprint(32) wrapped_len(u16) wrapped }*
//! ```

use rand::{CryptoRng, RngCore};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;

const SESSION_MAGIC: u32 = 0x53455331;
const SESSION_VERSION: u16 = 1;
const FINGERPRINT_LEN: usize = 32;

/// Symmetric cipher negotiated for a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherSpec {
    /// AES-128 in CBC mode.
    Aes128Cbc,
    /// AES-256 in CBC mode.
    Aes256Cbc,
}

impl CipherSpec {
    /// Key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::Aes256Cbc => 32,
        }
    }

    /// Cipher block size in bytes.
    #[must_use]
    pub const fn block_size(self) -> usize {
        16
    }

    /// Wire code inside the session blob.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Aes128Cbc => 1,
            Self::Aes256Cbc => 2,
        }
    }
}

impl TryFrom<u16> for CipherSpec {
    type Error = CryptoError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Aes128Cbc),
            2 => Ok(Self::Aes256Cbc),
            other => Err(CryptoError::UnsupportedCipher(other)),
        }
    }
}

/// Computes the fingerprint of a public key.
#[must_use]
pub fn key_fingerprint(public: &RsaPublicKey) -> [u8; FINGERPRINT_LEN] {
    use rsa::traits::PublicKeyParts;

    let mut hasher = Sha256::new();
    hasher.update(public.n().to_bytes_be());
    hasher.update(public.e().to_bytes_be());
    hasher.finalize().into()
}

/// A recipient allowed to decrypt this job's data.
#[derive(Clone, Debug)]
pub struct RecipientKey {
    /// Recipient public key.
    pub public: RsaPublicKey,
}

impl RecipientKey {
    /// The recipient's key fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> [u8; FINGERPRINT_LEN] {
        key_fingerprint(&self.public)
    }
}

/// A private keypair used for session unwrap and record signatures.
#[derive(Clone, Debug)]
pub struct Keypair {
    /// The private half.
    pub private: RsaPrivateKey,
}

impl Keypair {
    /// Generates a fresh keypair of `bits` modulus bits.
    pub fn generate<R>(bits: usize, rng: &mut R) -> Result<Self, CryptoError>
    where
        R: CryptoRng + RngCore,
    {
        let private = RsaPrivateKey::new(rng, bits).map_err(|_| CryptoError::Signing)?;
        Ok(Self { private })
    }

    /// The matching public key.
    #[must_use]
    pub fn public(&self) -> RsaPublicKey {
        self.private.to_public_key()
    }

    /// The keypair's fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> [u8; FINGERPRINT_LEN] {
        key_fingerprint(&self.public())
    }

    /// The keypair viewed as a session recipient.
    #[must_use]
    pub fn as_recipient(&self) -> RecipientKey {
        RecipientKey {
            public: self.public(),
        }
    }
}

/// Decoded session key material.
pub struct SessionKeys {
    /// Cipher the key belongs to.
    pub spec: CipherSpec,
    /// Symmetric key, zeroed on drop.
    pub key: Zeroizing<Vec<u8>>,
    /// Initialisation vector.
    pub iv: Vec<u8>,
}

/// The per-job encryption session.
pub struct CryptoSession {
    keys: SessionKeys,
    encoded: Vec<u8>,
}

impl CryptoSession {
    /// Generates a fresh session for `spec` wrapped to `recipients`.
    pub fn generate<R>(
        spec: CipherSpec,
        recipients: &[RecipientKey],
        rng: &mut R,
    ) -> Result<Self, CryptoError>
    where
        R: CryptoRng + RngCore,
    {
        let mut key = Zeroizing::new(vec![0u8; spec.key_len()]);
        rng.fill_bytes(&mut key);
        let mut iv = vec![0u8; spec.block_size()];
        rng.fill_bytes(&mut iv);

        let mut encoded = Vec::new();
        encoded.extend_from_slice(&SESSION_MAGIC.to_be_bytes());
        encoded.extend_from_slice(&SESSION_VERSION.to_be_bytes());
        encoded.extend_from_slice(&spec.code().to_be_bytes());
        encoded.extend_from_slice(&(iv.len() as u16).to_be_bytes());
        encoded.extend_from_slice(&iv);
        encoded.extend_from_slice(&(recipients.len() as u16).to_be_bytes());
        for recipient in recipients {
            let wrapped = recipient
                .public
                .encrypt(rng, Oaep::new::<Sha256>(), &key)
                .map_err(|_| CryptoError::SessionEncrypt)?;
            encoded.extend_from_slice(&recipient.fingerprint());
            encoded.extend_from_slice(&(wrapped.len() as u16).to_be_bytes());
            encoded.extend_from_slice(&wrapped);
        }

        Ok(Self {
            keys: SessionKeys { spec, key, iv },
            encoded,
        })
    }

    /// The session key material.
    #[must_use]
    pub const fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// The cached session blob, encoded once per job.
    #[must_use]
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    /// Decodes a session blob using the first keypair that matches one of
    /// the session's recipients.
    pub fn decode(blob: &[u8], keypairs: &[Keypair]) -> Result<SessionKeys, CryptoError> {
        let mut cursor = Cursor::new(blob);
        let magic = cursor.take_u32()?;
        if magic != SESSION_MAGIC {
            return Err(CryptoError::BadMagic(magic));
        }
        let version = cursor.take_u16()?;
        if version != SESSION_VERSION {
            return Err(CryptoError::BadVersion(version));
        }
        let spec = CipherSpec::try_from(cursor.take_u16()?)?;
        let iv_len = cursor.take_u16()? as usize;
        if iv_len != spec.block_size() {
            return Err(CryptoError::Malformed("session"));
        }
        let iv = cursor.take_bytes(iv_len)?.to_vec();

        let count = cursor.take_u16()?;
        let mut found: Option<(usize, Vec<u8>)> = None;
        for _ in 0..count {
            let fingerprint = cursor.take_bytes(FINGERPRINT_LEN)?.to_vec();
            let wrapped_len = cursor.take_u16()? as usize;
            let wrapped = cursor.take_bytes(wrapped_len)?;
            if found.is_none() {
                if let Some(index) = keypairs
                    .iter()
                    .position(|kp| kp.fingerprint()[..] == fingerprint[..])
                {
                    found = Some((index, wrapped.to_vec()));
                }
            }
        }

        let (index, wrapped) = found.ok_or(CryptoError::NoRecipient)?;
        let key = keypairs[index]
            .private
            .decrypt(Oaep::new::<Sha256>(), &wrapped)
            .map_err(|_| CryptoError::SessionDecrypt)?;
        if key.len() != spec.key_len() {
            return Err(CryptoError::KeyLength {
                got: key.len(),
                want: spec.key_len(),
            });
        }

        Ok(SessionKeys {
            spec,
            key: Zeroizing::new(key),
            iv,
        })
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8], CryptoError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(CryptoError::Malformed("session"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_u16(&mut self) -> Result<u16, CryptoError> {
        let bytes = self.take_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn take_u32(&mut self) -> Result<u32, CryptoError> {
        let bytes = self.take_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
