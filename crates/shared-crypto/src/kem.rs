//! # Key Encapsulation
//!
//! Ephemeral-static ECDH over secp256k1 with a BLAKE3 key-derivation step.
//!
//! `encapsulate` produces a fresh 33-byte encapsulation plus a 256-bit
//! symmetric key; only the holder of the matching secret key can recover
//! the same symmetric key from the encapsulation. `seal`/`open` wrap this
//! with XChaCha20-Poly1305 for one-shot messages to a single recipient.

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey as CurveSecretKey};

use crate::hashing::blake3_derive_key;
use crate::symmetric::{decrypt, encrypt, Nonce, SecretKey, NONCE_LEN};
use crate::CryptoError;

/// Length of an encapsulation (compressed ephemeral point).
pub const ENCAPSULATION_LEN: usize = 33;

const KDF_CONTEXT: &str = "custody-protocol kem v1 shared secret";

fn compress(point: &PublicKey) -> Result<[u8; ENCAPSULATION_LEN], CryptoError> {
    let encoded = point.to_encoded_point(true);
    encoded
        .as_bytes()
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)
}

fn derive_shared_key(
    shared_x: &[u8],
    encapsulation: &[u8; ENCAPSULATION_LEN],
    recipient: &[u8; ENCAPSULATION_LEN],
) -> SecretKey {
    let mut material = Vec::with_capacity(shared_x.len() + 2 * ENCAPSULATION_LEN);
    material.extend_from_slice(shared_x);
    material.extend_from_slice(encapsulation);
    material.extend_from_slice(recipient);
    SecretKey::from_bytes(blake3_derive_key(KDF_CONTEXT, &material))
}

/// Public half of an encapsulation key pair (compressed point).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncapsulationPublicKey([u8; ENCAPSULATION_LEN]);

impl EncapsulationPublicKey {
    /// Create from compressed bytes, rejecting points not on the curve.
    pub fn from_bytes(bytes: [u8; ENCAPSULATION_LEN]) -> Result<Self, CryptoError> {
        PublicKey::from_sec1_bytes(&bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    /// Get raw compressed bytes.
    pub fn as_bytes(&self) -> &[u8; ENCAPSULATION_LEN] {
        &self.0
    }

    /// Produce a fresh encapsulation and the symmetric key it carries.
    pub fn encapsulate(&self) -> Result<([u8; ENCAPSULATION_LEN], SecretKey), CryptoError> {
        let recipient =
            PublicKey::from_sec1_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        let ephemeral = CurveSecretKey::random(&mut rand::thread_rng());
        let encapsulation = compress(&ephemeral.public_key())?;

        let shared =
            k256::ecdh::diffie_hellman(ephemeral.to_nonzero_scalar(), recipient.as_affine());
        let key = derive_shared_key(shared.raw_secret_bytes().as_slice(), &encapsulation, &self.0);
        Ok((encapsulation, key))
    }

    /// Encrypt `plaintext` so only this key's owner can read it.
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedBox, CryptoError> {
        let (encapsulation, key) = self.encapsulate()?;
        let (ciphertext, nonce) = encrypt(&key, plaintext)?;
        Ok(SealedBox {
            encapsulation,
            nonce: *nonce.as_bytes(),
            ciphertext,
        })
    }
}

/// Encapsulation key pair derived from 32 bytes of key material.
pub struct EncapsulationKeyPair {
    secret: CurveSecretKey,
    public: EncapsulationPublicKey,
}

impl EncapsulationKeyPair {
    /// Build from a 32-byte scalar. Fails for zero or out-of-range scalars.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret =
            CurveSecretKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let public = EncapsulationPublicKey(compress(&secret.public_key())?);
        Ok(Self { secret, public })
    }

    /// Get the public key.
    pub fn public_key(&self) -> EncapsulationPublicKey {
        self.public
    }

    /// Recover the symmetric key carried by `encapsulation`.
    pub fn decapsulate(
        &self,
        encapsulation: &[u8; ENCAPSULATION_LEN],
    ) -> Result<SecretKey, CryptoError> {
        let ephemeral = PublicKey::from_sec1_bytes(encapsulation)
            .map_err(|_| CryptoError::DecryptionFailed("invalid encapsulation".into()))?;
        let shared =
            k256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), ephemeral.as_affine());
        Ok(derive_shared_key(
            shared.raw_secret_bytes().as_slice(),
            encapsulation,
            self.public.as_bytes(),
        ))
    }

    /// Decrypt a box sealed to this key pair.
    pub fn open(&self, sealed: &SealedBox) -> Result<Vec<u8>, CryptoError> {
        let key = self.decapsulate(&sealed.encapsulation)?;
        decrypt(&key, &sealed.ciphertext, &Nonce::from_bytes(sealed.nonce))
    }
}

/// A one-recipient ciphertext: encapsulation, nonce and AEAD output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedBox {
    /// Ephemeral point.
    pub encapsulation: [u8; ENCAPSULATION_LEN],
    /// XChaCha20 nonce.
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with tag.
    pub ciphertext: Vec<u8>,
}

impl SealedBox {
    /// Flatten as `encapsulation || nonce || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENCAPSULATION_LEN + NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.encapsulation);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the flattened form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < ENCAPSULATION_LEN + NONCE_LEN {
            return Err(CryptoError::InvalidInput(format!(
                "sealed box too short: {} bytes",
                bytes.len()
            )));
        }
        let (encapsulation, rest) = bytes.split_at(ENCAPSULATION_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        Ok(Self {
            encapsulation: encapsulation
                .try_into()
                .map_err(|_| CryptoError::InvalidInput("encapsulation".into()))?,
            nonce: nonce
                .try_into()
                .map_err(|_| CryptoError::InvalidInput("nonce".into()))?,
            ciphertext: ciphertext.to_vec(),
        })
    }
}
