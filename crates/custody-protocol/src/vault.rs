//! # Identity Vault
//!
//! Resolves a participant id to its long-term key material.
//!
//! Each participant owns one 32-byte seed, created once and never
//! regenerated. Both key pairs are re-derived from it on every call:
//!
//! - BLS12-381 signing key: `key_gen(blake3_derive_key(SIGNING_CONTEXT, seed))`
//! - encapsulation key: `blake3_derive_key(ENCAPSULATION_CONTEXT, seed)` as a
//!   secp256k1 scalar
//!
//! Public halves are published as a self-signed `IdentityDocument`; the local
//! directory maps `participant id -> document cid`.

use std::sync::Arc;

use shared_crypto::{blake3_derive_key, BlsKeyPair, BlsSignature, EncapsulationKeyPair};
use shared_types::{ContentId, ParticipantId};
use tracing::{debug, info};

use crate::domain::{CustodyError, IdentityDocument, PublishedIdentity, Seed};
use crate::ports::{ContentStore, KeyValueStore, TimeSource};

const SIGNING_CONTEXT: &str = "custody-protocol identity v1 signing key";
const ENCAPSULATION_CONTEXT: &str = "custody-protocol identity v1 encapsulation key";

const SEED_PREFIX: &str = "seed:";
const IDENTITY_PREFIX: &str = "identity:";

/// A participant's seed and the key pairs derived from it.
pub struct IdentitySecrets {
    /// Owner.
    pub participant_id: ParticipantId,
    seed: Seed,
    /// Signs envelopes and redemption tokens.
    pub signing: BlsKeyPair,
    /// Opens envelopes and sealed payloads.
    pub encapsulation: EncapsulationKeyPair,
}

impl IdentitySecrets {
    fn derive(participant_id: ParticipantId, seed: Seed) -> Result<Self, CustodyError> {
        let signing = BlsKeyPair::derive(&blake3_derive_key(SIGNING_CONTEXT, seed.as_bytes()))?;
        let encapsulation = EncapsulationKeyPair::from_bytes(&blake3_derive_key(
            ENCAPSULATION_CONTEXT,
            seed.as_bytes(),
        ))?;
        Ok(Self {
            participant_id,
            seed,
            signing,
            encapsulation,
        })
    }

    /// The raw seed, for plugins deriving per-order material.
    pub fn seed(&self) -> &Seed {
        &self.seed
    }
}

/// Seed storage plus the local identity directory.
pub struct IdentityVault {
    kv: Arc<dyn KeyValueStore>,
    content: Arc<dyn ContentStore>,
    time: Arc<dyn TimeSource>,
}

impl IdentityVault {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        content: Arc<dyn ContentStore>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self { kv, content, time }
    }

    /// Generate and persist a seed for `participant_id`.
    ///
    /// Fails with `AlreadyExists` if one is stored already.
    pub fn create_secrets(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<IdentitySecrets, CustodyError> {
        let seed = Seed::generate();
        if !self.kv.put_if_absent(&seed_key(participant_id), seed.as_bytes())? {
            return Err(CustodyError::AlreadyExists(format!(
                "secrets for {}",
                participant_id
            )));
        }
        info!(participant = %participant_id, "[custody] Created identity secrets");
        IdentitySecrets::derive(participant_id.clone(), seed)
    }

    /// Derive the key pairs for `participant_id` from its stored seed.
    pub fn secrets(&self, participant_id: &ParticipantId) -> Result<IdentitySecrets, CustodyError> {
        let stored = self
            .kv
            .get(&seed_key(participant_id))?
            .ok_or_else(|| CustodyError::NotFound(format!("secrets for {}", participant_id)))?;
        let seed = Seed::from_slice(&stored).ok_or_else(|| {
            CustodyError::IntegrityError(format!("stored seed for {} is malformed", participant_id))
        })?;
        IdentitySecrets::derive(participant_id.clone(), seed)
    }

    pub fn has_secrets(&self, participant_id: &ParticipantId) -> Result<bool, CustodyError> {
        Ok(self.kv.exists(&seed_key(participant_id))?)
    }

    /// Publish the identity document for a local participant and register it.
    ///
    /// Returns the already registered cid when the stored document carries
    /// the same keys.
    pub async fn publish_identity(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<ContentId, CustodyError> {
        let secrets = self.secrets(participant_id)?;
        let signing_public_key = secrets.signing.public_key().to_bytes();
        let encapsulation_public_key = *secrets.encapsulation.public_key().as_bytes();

        if let Some(cid) = self.lookup(participant_id)? {
            let existing = self.load(&cid).await?;
            if existing.signing_public_key == signing_public_key
                && existing.encapsulation_public_key == encapsulation_public_key
            {
                debug!(participant = %participant_id, cid = %cid, "[custody] Identity already published");
                return Ok(cid);
            }
        }

        let document = IdentityDocument {
            participant_id: participant_id.clone(),
            signing_public_key,
            encapsulation_public_key,
            created_at: self.time.now(),
        };
        let document = serde_json::to_vec(&document)?;
        let signature = secrets.signing.sign(&document).to_bytes();
        let published = bincode::serialize(&PublishedIdentity {
            document,
            signature,
        })?;

        let cid = self.content.put(published).await?;
        self.kv
            .put(&identity_key(participant_id), cid.as_str().as_bytes())?;
        info!(participant = %participant_id, cid = %cid, "[custody] Published identity document");
        Ok(cid)
    }

    /// Fetch a counterparty's document by cid, verify it and record it.
    ///
    /// A participant already registered under a different cid is rejected.
    pub async fn register_identity(&self, cid: &ContentId) -> Result<IdentityDocument, CustodyError> {
        let document = self.load(cid).await?;
        match self.lookup(&document.participant_id)? {
            Some(known) if &known == cid => {}
            Some(known) => {
                return Err(CustodyError::IntegrityError(format!(
                    "{} is registered as {}, got {}",
                    document.participant_id, known, cid
                )))
            }
            None => {
                self.kv.put(
                    &identity_key(&document.participant_id),
                    cid.as_str().as_bytes(),
                )?;
                debug!(participant = %document.participant_id, cid = %cid, "[custody] Registered identity");
            }
        }
        Ok(document)
    }

    /// Resolve and fetch a participant's published document.
    pub async fn identity_document(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<IdentityDocument, CustodyError> {
        let cid = self.identity_cid(participant_id)?;
        self.load(&cid).await
    }

    /// Cid of a participant's published document.
    pub fn identity_cid(&self, participant_id: &ParticipantId) -> Result<ContentId, CustodyError> {
        self.lookup(participant_id)?
            .ok_or_else(|| CustodyError::NotFound(format!("identity of {}", participant_id)))
    }

    fn lookup(&self, participant_id: &ParticipantId) -> Result<Option<ContentId>, CustodyError> {
        match self.kv.get(&identity_key(participant_id))? {
            Some(raw) => {
                let cid = String::from_utf8(raw).map_err(|e| {
                    CustodyError::IntegrityError(format!("directory entry: {}", e))
                })?;
                Ok(Some(ContentId::new(cid)))
            }
            None => Ok(None),
        }
    }

    async fn load(&self, cid: &ContentId) -> Result<IdentityDocument, CustodyError> {
        let bytes = self.content.get(cid).await?;
        let published: PublishedIdentity = bincode::deserialize(&bytes)?;
        let document: IdentityDocument = serde_json::from_slice(&published.document)?;

        let signature = BlsSignature::from_bytes(&published.signature)
            .map_err(|_| CustodyError::IntegrityError(format!("identity {} signature", cid)))?;
        document
            .signing_key()?
            .verify_strict(&published.document, &signature)
            .map_err(|_| {
                CustodyError::IntegrityError(format!("identity {} is not self-signed", cid))
            })?;
        Ok(document)
    }
}

fn seed_key(participant_id: &ParticipantId) -> Vec<u8> {
    format!("{}{}", SEED_PREFIX, participant_id).into_bytes()
}

fn identity_key(participant_id: &ParticipantId) -> Vec<u8> {
    format!("{}{}", IDENTITY_PREFIX, participant_id).into_bytes()
}
