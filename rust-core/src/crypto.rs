// Hashing, address derivation and ed25519 signing over domain-separated messages.
// Verification never panics: malformed keys or signatures simply fail to verify.

use crate::error::FatalError;
use crate::types::{Address, Hash, PublicKey, Signature, ADDRESS_LENGTH};
use ed25519_dalek::{
    Keypair, PublicKey as DalekPublicKey, SecretKey, Signature as DalekSignature, Signer, Verifier,
};
use sha2::{Digest, Sha256};

/// Domain tag for transaction signatures.
pub const TAG_TRANSACTION: &[u8] = b"LSK_TX_";
/// Domain tag for block header signatures.
pub const TAG_BLOCK_HEADER: &[u8] = b"LSK_BH_";

pub const SECRET_KEY_LENGTH: usize = 32;

pub fn hash(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    let digest = hash(public_key);
    let mut address = [0u8; ADDRESS_LENGTH];
    address.copy_from_slice(&digest[..ADDRESS_LENGTH]);
    address
}

/// `tag || chain_id || bytes`
pub fn signing_message(tag: &[u8], chain_id: &[u8], bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(tag.len() + chain_id.len() + bytes.len());
    out.extend_from_slice(tag);
    out.extend_from_slice(chain_id);
    out.extend_from_slice(bytes);
    out
}

fn keypair_from_secret(secret: &[u8]) -> Result<Keypair, FatalError> {
    if secret.len() != SECRET_KEY_LENGTH {
        return Err(FatalError::InvalidPrivateKeyLength(secret.len()));
    }
    let secret = SecretKey::from_bytes(secret)
        .map_err(|_| FatalError::InvalidPrivateKeyLength(secret.len()))?;
    let public: DalekPublicKey = (&secret).into();
    Ok(Keypair { secret, public })
}

pub fn public_key_from_secret(secret: &[u8]) -> Result<PublicKey, FatalError> {
    Ok(keypair_from_secret(secret)?.public.to_bytes())
}

pub fn sign(
    tag: &[u8],
    chain_id: &[u8],
    bytes: &[u8],
    secret: &[u8],
) -> Result<Signature, FatalError> {
    if chain_id.is_empty() {
        return Err(FatalError::MissingChainId);
    }
    let kp = keypair_from_secret(secret)?;
    let sig = kp.sign(&signing_message(tag, chain_id, bytes));
    Ok(sig.to_bytes())
}

fn to_verifying_key(pk: &PublicKey) -> Option<DalekPublicKey> {
    DalekPublicKey::from_bytes(pk).ok()
}

fn to_signature(sig: &Signature) -> Option<DalekSignature> {
    DalekSignature::from_bytes(sig).ok()
}

pub fn verify(
    tag: &[u8],
    chain_id: &[u8],
    bytes: &[u8],
    public_key: &PublicKey,
    signature: &Signature,
) -> bool {
    let (Some(vk), Some(sig)) = (to_verifying_key(public_key), to_signature(signature)) else {
        return false;
    };
    vk.verify(&signing_message(tag, chain_id, bytes), &sig).is_ok()
}
