use crate::codec::{CodecError, Reader, Writer};
use crate::crypto::{self, TAG_BLOCK_HEADER};
use crate::error::FatalError;
use crate::types::{Hash, Height, PublicKey, Signature, ZERO_HASH};

/// Block header fields relevant to BFT safety checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub timestamp: u32,
    pub height: Height,
    pub previous_block_id: Hash,
    pub transaction_root: Hash,
    pub generator_public_key: PublicKey,
    pub reward: u64,
    pub max_height_previously_forged: Height,
    pub max_height_prevoted: Height,
    pub signature: Option<Signature>,
}

impl BlockHeader {
    pub fn new(height: Height, generator_public_key: PublicKey) -> Self {
        Self {
            version: 2,
            timestamp: 0,
            height,
            previous_block_id: ZERO_HASH,
            transaction_root: ZERO_HASH,
            generator_public_key,
            reward: 0,
            max_height_previously_forged: 0,
            max_height_prevoted: 0,
            signature: None,
        }
    }

    fn write_unsigned(&self, w: &mut Writer) {
        w.write_u32(1, self.version)
            .write_u32(2, self.timestamp)
            .write_u32(3, self.height)
            .write_bytes(4, &self.previous_block_id)
            .write_bytes(5, &self.transaction_root)
            .write_bytes(6, &self.generator_public_key)
            .write_u64(7, self.reward)
            .write_u32(8, self.max_height_previously_forged)
            .write_u32(9, self.max_height_prevoted);
    }

    /// Bytes covered by the generator signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.write_unsigned(&mut w);
        w.finish()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.write_unsigned(&mut w);
        w.write_bytes(10, self.signature.as_ref().map_or(&[][..], |s| &s[..]));
        w.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let version = r.read_u32(1)?;
        let timestamp = r.read_u32(2)?;
        let height = r.read_u32(3)?;
        let previous_block_id = r.read_fixed::<32>(4)?;
        let transaction_root = r.read_fixed::<32>(5)?;
        let generator_public_key = r.read_fixed::<32>(6)?;
        let reward = r.read_u64(7)?;
        let max_height_previously_forged = r.read_u32(8)?;
        let max_height_prevoted = r.read_u32(9)?;
        let raw_sig = r.read_bytes(10)?;
        let signature = match raw_sig.len() {
            0 => None,
            _ => Some(<[u8; 64]>::try_from(raw_sig).map_err(|_| CodecError::InvalidLength {
                field: 10,
                expected: 64,
                actual: raw_sig.len(),
            })?),
        };
        r.finish()?;
        Ok(Self {
            version,
            timestamp,
            height,
            previous_block_id,
            transaction_root,
            generator_public_key,
            reward,
            max_height_previously_forged,
            max_height_prevoted,
            signature,
        })
    }

    /// sha256 over the full encoding, signature included.
    pub fn id(&self) -> Hash {
        crypto::hash(&self.encode())
    }

    pub fn sign(&mut self, chain_id: &[u8], secret: &[u8]) -> Result<(), FatalError> {
        let signature = crypto::sign(TAG_BLOCK_HEADER, chain_id, &self.signing_bytes(), secret)?;
        self.signature = Some(signature);
        Ok(())
    }

    pub fn verify_signature(&self, chain_id: &[u8]) -> bool {
        match &self.signature {
            Some(sig) => crypto::verify(
                TAG_BLOCK_HEADER,
                chain_id,
                &self.signing_bytes(),
                &self.generator_public_key,
                sig,
            ),
            None => false,
        }
    }
}
