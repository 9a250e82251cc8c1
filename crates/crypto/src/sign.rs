//! Signature records.
//!
//! The signing digest runs job-wide over every plaintext block the backup
//! side reads. At the end of a file's record group it is finalised and
//! signed; the record binds the digest algorithm and the signer's key
//! fingerprint to the signature so the restore side knows what to recompute
//! and which trusted key to verify with.
//!
//! Record layout, all integers big-endian:
//!
//! ```text
//! magic(u32) version(u16) digest(u16) fingerprint(32) sig_len(u16) sig
//! ```

use checksums::DigestKind;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;
use crate::session::{key_fingerprint, Keypair};

const SIGNATURE_MAGIC: u32 = 0x53494731;
const SIGNATURE_VERSION: u16 = 1;
const FINGERPRINT_LEN: usize = 32;

/// A detached signature over a finalised signing digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureRecord {
    /// Algorithm of the digest that was signed.
    pub digest_kind: DigestKind,
    /// Fingerprint of the signing key.
    pub signer: [u8; FINGERPRINT_LEN],
    /// The raw signature bytes.
    pub signature: Vec<u8>,
}

impl SignatureRecord {
    /// Signs `digest` (an already-finalised hash) with `keypair`.
    pub fn sign(
        keypair: &Keypair,
        digest_kind: DigestKind,
        digest: &[u8],
    ) -> Result<Self, CryptoError> {
        let signature = keypair
            .private
            .sign(Pkcs1v15Sign::new_unprefixed(), &prehash(digest))
            .map_err(|_| CryptoError::Signing)?;
        Ok(Self {
            digest_kind,
            signer: keypair.fingerprint(),
            signature,
        })
    }

    /// Verifies this record against `digest` using `public`.
    pub fn verify(&self, public: &RsaPublicKey, digest: &[u8]) -> Result<(), CryptoError> {
        public
            .verify(
                Pkcs1v15Sign::new_unprefixed(),
                &prehash(digest),
                &self.signature,
            )
            .map_err(|_| CryptoError::BadSignature)
    }

    /// True when `public` is the key this record claims to be signed with.
    #[must_use]
    pub fn signed_by(&self, public: &RsaPublicKey) -> bool {
        key_fingerprint(public) == self.signer
    }

    /// Encodes the record payload.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(44 + self.signature.len());
        out.extend_from_slice(&SIGNATURE_MAGIC.to_be_bytes());
        out.extend_from_slice(&SIGNATURE_VERSION.to_be_bytes());
        out.extend_from_slice(&self.digest_kind.code().to_be_bytes());
        out.extend_from_slice(&self.signer);
        out.extend_from_slice(&(self.signature.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.signature);
        out
    }

    /// Decodes a record payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CryptoError> {
        let fixed = 4 + 2 + 2 + FINGERPRINT_LEN + 2;
        if payload.len() < fixed {
            return Err(CryptoError::Malformed("signature"));
        }
        let magic = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        if magic != SIGNATURE_MAGIC {
            return Err(CryptoError::BadMagic(magic));
        }
        let version = u16::from_be_bytes([payload[4], payload[5]]);
        if version != SIGNATURE_VERSION {
            return Err(CryptoError::BadVersion(version));
        }
        let digest_kind = DigestKind::try_from(u16::from_be_bytes([payload[6], payload[7]]))
            .map_err(|_| CryptoError::SignatureDigest)?;
        let mut signer = [0u8; FINGERPRINT_LEN];
        signer.copy_from_slice(&payload[8..8 + FINGERPRINT_LEN]);
        let len_at = 8 + FINGERPRINT_LEN;
        let sig_len = u16::from_be_bytes([payload[len_at], payload[len_at + 1]]) as usize;
        let sig_start = len_at + 2;
        if payload.len() != sig_start + sig_len {
            return Err(CryptoError::Malformed("signature"));
        }
        Ok(Self {
            digest_kind,
            signer,
            signature: payload[sig_start..].to_vec(),
        })
    }
}

// PKCS#1 v1.5 without a DigestInfo prefix needs a fixed-width input; fold
// the variable-width digest through SHA-256 to normalise it.
fn prehash(digest: &[u8]) -> [u8; 32] {
    Sha256::digest(digest).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rsa::RsaPrivateKey;

    fn test_keypair() -> Keypair {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        Keypair {
            private: RsaPrivateKey::new(&mut rng, 1024).expect("generate test keypair"),
        }
    }

    #[test]
    fn sign_verify_round_trips() {
        let keypair = test_keypair();
        let digest = checksums::FileDigest::digest(DigestKind::Sha256, b"file contents");
        let record =
            SignatureRecord::sign(&keypair, DigestKind::Sha256, &digest).expect("sign digest");
        record
            .verify(&keypair.public(), &digest)
            .expect("signature verifies");
        assert!(record.signed_by(&keypair.public()));
    }

    #[test]
    fn tampered_digest_fails_verification() {
        let keypair = test_keypair();
        let digest = checksums::FileDigest::digest(DigestKind::Sha256, b"file contents");
        let record =
            SignatureRecord::sign(&keypair, DigestKind::Sha256, &digest).expect("sign digest");

        let other = checksums::FileDigest::digest(DigestKind::Sha256, b"other contents");
        assert!(matches!(
            record.verify(&keypair.public(), &other),
            Err(CryptoError::BadSignature)
        ));
    }

    #[test]
    fn record_encoding_round_trips() {
        let keypair = test_keypair();
        let digest = checksums::FileDigest::digest(DigestKind::Sha512, b"payload");
        let record =
            SignatureRecord::sign(&keypair, DigestKind::Sha512, &digest).expect("sign digest");

        let decoded = SignatureRecord::decode(&record.encode()).expect("decode record");
        assert_eq!(decoded, record);
        decoded
            .verify(&keypair.public(), &digest)
            .expect("decoded record verifies");
    }

    #[test]
    fn truncated_record_is_rejected() {
        let keypair = test_keypair();
        let digest = checksums::FileDigest::digest(DigestKind::Sha256, b"payload");
        let record =
            SignatureRecord::sign(&keypair, DigestKind::Sha256, &digest).expect("sign digest");
        let encoded = record.encode();
        assert!(SignatureRecord::decode(&encoded[..encoded.len() - 1]).is_err());
        assert!(SignatureRecord::decode(&encoded[..10]).is_err());
    }

    #[test]
    fn foreign_magic_is_rejected() {
        let keypair = test_keypair();
        let digest = checksums::FileDigest::digest(DigestKind::Sha256, b"payload");
        let record =
            SignatureRecord::sign(&keypair, DigestKind::Sha256, &digest).expect("sign digest");
        let mut encoded = record.encode();
        encoded[0] ^= 0x80;
        assert!(matches!(
            SignatureRecord::decode(&encoded),
            Err(CryptoError::BadMagic(_))
        ));
    }

    #[test]
    fn signed_by_rejects_other_keys() {
        let keypair = test_keypair();
        let mut rng = rand::rngs::StdRng::seed_from_u64(8);
        let other = RsaPrivateKey::new(&mut rng, 1024).expect("generate test keypair");
        let digest = checksums::FileDigest::digest(DigestKind::Sha256, b"payload");
        let record =
            SignatureRecord::sign(&keypair, DigestKind::Sha256, &digest).expect("sign digest");
        assert!(!record.signed_by(&other.to_public_key()));
    }
}
