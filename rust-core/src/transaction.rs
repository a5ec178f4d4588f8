// Transaction envelope: canonical encoding, identity, fees, signing and the
// apply/undo lifecycle around a command.
//
// Lifecycle: build -> `validate` -> `sign` (or `sign_multisignature` per
// member) -> `apply`, and `undo` to revert an applied transaction. The id is
// always derived from the current encoding, so re-signing yields a new id.

use crate::account::{Account, MultisignatureKeys};
use crate::auth::{authorize, AuthOutcome, SigningInput};
use crate::codec::{CodecError, Reader, Writer};
use crate::commands::{credit, CommandContext, CommandParams};
use crate::config::ProtocolConfig;
use crate::crypto::{self, address_from_public_key, public_key_from_secret, TAG_TRANSACTION};
use crate::error::{FatalError, TransactionError, TransactionResponse};
use crate::state::{CacheFilter, StateStore};
use crate::types::{to_hex, Address, PublicKey, Signature, TransactionId, SIGNATURE_LENGTH};
use tracing::{debug, warn};

// Varint lengths stabilise long before this.
const MAX_FEE_ITERATIONS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub nonce: u64,
    pub fee: u64,
    pub sender_public_key: PublicKey,
    pub params: CommandParams,
    /// `None` marks an empty slot (encoded as zero-length bytes).
    pub signatures: Vec<Option<Signature>>,
}

impl Transaction {
    pub fn new(
        nonce: u64,
        fee: u64,
        sender_public_key: PublicKey,
        params: impl Into<CommandParams>,
    ) -> Self {
        Self {
            nonce,
            fee,
            sender_public_key,
            params: params.into(),
            signatures: Vec::new(),
        }
    }

    pub fn type_id(&self) -> u32 {
        self.params.type_id()
    }

    pub fn sender_address(&self) -> Address {
        address_from_public_key(&self.sender_public_key)
    }

    fn write(&self, with_signatures: bool) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u32(1, self.type_id())
            .write_u64(2, self.nonce)
            .write_u64(3, self.fee)
            .write_bytes(4, &self.sender_public_key)
            .write_bytes(5, &self.params.encode());
        if with_signatures {
            for sig in &self.signatures {
                w.write_bytes(6, sig.as_ref().map_or(&[][..], |s| &s[..]));
            }
        }
        w.finish()
    }

    /// Encoding with the signature list emptied; this is what gets signed.
    pub fn signing_bytes(&self) -> Vec<u8> {
        self.write(false)
    }

    pub fn encode(&self) -> Vec<u8> {
        self.write(true)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let type_id = r.read_u32(1)?;
        let nonce = r.read_u64(2)?;
        let fee = r.read_u64(3)?;
        let sender_public_key = r.read_fixed::<32>(4)?;
        let params_bytes = r.read_bytes(5)?;
        let raw_signatures = r.read_repeated_bytes(6)?;
        r.finish()?;

        let params = CommandParams::decode(type_id, params_bytes)?;
        let signatures = raw_signatures
            .into_iter()
            .map(|raw| match raw.len() {
                0 => Ok(None),
                SIGNATURE_LENGTH => Ok(<[u8; 64]>::try_from(raw).ok()),
                actual => Err(CodecError::InvalidLength {
                    field: 6,
                    expected: SIGNATURE_LENGTH,
                    actual,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            nonce,
            fee,
            sender_public_key,
            params,
            signatures,
        })
    }

    /// Decode and check the bytes hash to `expected_id`.
    pub fn decode_with_id(
        bytes: &[u8],
        expected_id: &TransactionId,
    ) -> Result<Self, TransactionError> {
        let actual_id = crypto::hash(bytes);
        let tx = Self::decode(bytes)
            .map_err(|e| TransactionError::schema(actual_id, "", e.to_string()))?;
        if &actual_id != expected_id {
            return Err(TransactionError::schema(
                actual_id,
                "/id",
                "Transaction id does not match its content.",
            )
            .with_values(to_hex(&actual_id), to_hex(expected_id)));
        }
        Ok(tx)
    }

    pub fn id(&self) -> TransactionId {
        crypto::hash(&self.encode())
    }

    fn size_based_fee(&self, config: &ProtocolConfig, signatures: Vec<Option<Signature>>) -> u64 {
        let name_fee = self.params.name_fee(config);
        let mut draft = Transaction {
            fee: 0,
            signatures,
            ..self.clone()
        };
        for _ in 0..MAX_FEE_ITERATIONS {
            let size = draft.encode().len() as u64;
            let next = name_fee.saturating_add(config.min_fee_per_byte.saturating_mul(size));
            if next == draft.fee {
                break;
            }
            draft.fee = next;
        }
        draft.fee
    }

    /// Smallest fee that covers the encoded size with that fee in place,
    /// using the signatures currently attached.
    pub fn min_fee(&self, config: &ProtocolConfig) -> u64 {
        self.size_based_fee(config, self.signatures.clone())
    }

    /// Fee for a draft that will carry `signature_slots` full signatures.
    pub fn compute_min_fee(&self, config: &ProtocolConfig, signature_slots: usize) -> u64 {
        self.size_based_fee(config, vec![Some([0u8; SIGNATURE_LENGTH]); signature_slots])
    }

    fn context<'a>(&self, id: TransactionId, config: &'a ProtocolConfig) -> CommandContext<'a> {
        CommandContext {
            id,
            sender_address: self.sender_address(),
            sender_public_key: self.sender_public_key,
            config,
        }
    }

    /// Stateless checks: command params and the fee floor.
    pub fn validate(&self, config: &ProtocolConfig) -> TransactionResponse {
        let id = self.id();
        let mut errors = Vec::new();
        let max_slots = config.max_multisig_keys + 1;
        if self.signatures.len() > max_slots {
            errors.push(
                TransactionError::schema(id, "/signatures", "Too many signatures.")
                    .with_values(self.signatures.len(), max_slots),
            );
        }
        errors.extend(self.params.validate(&self.context(id, config)));
        let min_fee = self.min_fee(config);
        if self.fee < min_fee {
            errors.push(
                TransactionError::schema(id, "/fee", "Insufficient transaction fee.")
                    .with_values(self.fee, min_fee),
            );
        }
        TransactionResponse::from_errors(id, errors)
    }

    /// Replace all signatures with one made by the sender.
    pub fn sign(&mut self, chain_id: &[u8], secret: &[u8]) -> Result<(), FatalError> {
        let public_key = public_key_from_secret(secret)?;
        if public_key != self.sender_public_key {
            return Err(FatalError::UnknownSigner(to_hex(&public_key)));
        }
        let signature = crypto::sign(TAG_TRANSACTION, chain_id, &self.signing_bytes(), secret)?;
        self.signatures = vec![Some(signature)];
        Ok(())
    }

    /// Signature slot order for this transaction given the sender's keys.
    pub fn signature_slots(&self, sender_keys: &MultisignatureKeys) -> Vec<PublicKey> {
        if !sender_keys.is_empty() {
            return sender_keys.ordered_keys();
        }
        match &self.params {
            CommandParams::RegisterMultisignature(reg) => std::iter::once(self.sender_public_key)
                .chain(reg.keys().ordered_keys())
                .collect(),
            _ => vec![self.sender_public_key],
        }
    }

    /// Place one member's signature in its slot, leaving other slots as they are.
    pub fn sign_multisignature(
        &mut self,
        chain_id: &[u8],
        secret: &[u8],
        sender_keys: &MultisignatureKeys,
    ) -> Result<(), FatalError> {
        let public_key = public_key_from_secret(secret)?;
        let slots = self.signature_slots(sender_keys);
        let slot = slots
            .iter()
            .position(|k| *k == public_key)
            .ok_or_else(|| FatalError::UnknownSigner(to_hex(&public_key)))?;
        let signature = crypto::sign(TAG_TRANSACTION, chain_id, &self.signing_bytes(), secret)?;
        self.signatures.resize(slots.len(), None);
        self.signatures[slot] = Some(signature);
        Ok(())
    }

    pub fn cache_filters(&self) -> Vec<CacheFilter> {
        let mut filters = vec![CacheFilter::PublicKey(self.sender_public_key)];
        filters.extend(self.params.cache_filters());
        filters
    }

    /// Apply against `store`. Rule violations come back in the response;
    /// only conditions the engine cannot recover from are `Err`.
    ///
    /// A pending multisignature transaction returns before touching state.
    /// Otherwise state is written through even when errors are reported, so
    /// callers wanting atomicity restore a checkpoint on FAIL.
    pub fn apply(
        &self,
        store: &mut dyn StateStore,
        config: &ProtocolConfig,
    ) -> Result<TransactionResponse, FatalError> {
        let chain_id = store.chain_context().chain_id.clone();
        if chain_id.is_empty() {
            return Err(FatalError::MissingChainId);
        }
        let id = self.id();
        let sender_address = self.sender_address();
        debug!(
            id = %to_hex(&id),
            kind = self.type_id(),
            sender = %to_hex(&sender_address),
            nonce = self.nonce,
            "applying transaction"
        );
        let mut errors = Vec::new();
        let mut sender = store.account_or_default(&sender_address);

        // --- Public key ---
        match sender.public_key {
            Some(pk) if pk != self.sender_public_key => errors.push(
                TransactionError::auth(id, "/senderPublicKey", "Sender public key mismatch.")
                    .with_values(to_hex(&self.sender_public_key), to_hex(&pk)),
            ),
            Some(_) => {}
            None => sender.public_key = Some(self.sender_public_key),
        }

        // --- Nonce ---
        if self.nonce != sender.nonce {
            let err = TransactionError::nonce(id, "Incorrect nonce.");
            errors.push(err.with_values(self.nonce, sender.nonce));
        }

        // --- Signatures ---
        let signing_bytes = self.signing_bytes();
        let input = SigningInput {
            id,
            chain_id: &chain_id,
            bytes: &signing_bytes,
        };
        let registration = match &self.params {
            CommandParams::RegisterMultisignature(reg) => Some(reg.keys()),
            _ => None,
        };
        let outcome = authorize(
            &input,
            &sender,
            &self.sender_public_key,
            registration.as_ref(),
            &self.signatures,
        );
        match outcome {
            AuthOutcome::Complete => {}
            AuthOutcome::Pending { missing } => {
                debug!(id = %to_hex(&id), missing, "transaction awaiting signatures");
                return Ok(if errors.is_empty() {
                    TransactionResponse::pending(id)
                } else {
                    TransactionResponse::from_errors(id, errors)
                });
            }
            AuthOutcome::Failed(auth_errors) => errors.extend(auth_errors),
        }

        // --- Fee and nonce ---
        match sender.balance.checked_sub(self.fee) {
            Some(balance) => sender.balance = balance,
            None => errors.push(
                TransactionError::balance(id, "/fee", "Not enough balance to pay the fee.")
                    .with_values(sender.balance, self.fee),
            ),
        }
        sender.nonce = sender.nonce.saturating_add(1);
        store.set_account(sender);

        // --- Command ---
        let ctx = self.context(id, config);
        errors.extend(self.params.apply(&ctx, store)?);

        let updated = store.account(&sender_address)?;
        errors.extend(check_min_remaining_balance(id, &updated, config));

        let response = TransactionResponse::from_errors(id, errors);
        if response.is_ok() {
            debug!(id = %to_hex(&id), "transaction applied");
        } else {
            warn!(id = %to_hex(&id), errors = response.errors.len(), "transaction failed");
        }
        Ok(response)
    }

    /// Revert a previously applied transaction: refund the fee, step the
    /// nonce back, then undo the command.
    pub fn undo(
        &self,
        store: &mut dyn StateStore,
        config: &ProtocolConfig,
    ) -> Result<TransactionResponse, FatalError> {
        let id = self.id();
        let sender_address = self.sender_address();
        let mut errors = Vec::new();
        let mut sender = store.account(&sender_address)?;

        match credit(sender.balance, self.fee) {
            Some(balance) => sender.balance = balance,
            None => errors.push(
                TransactionError::balance(id, "/fee", "Fee refund exceeds the maximum balance.")
                    .with_values(sender.balance, self.fee),
            ),
        }
        sender.nonce = sender
            .nonce
            .checked_sub(1)
            .ok_or_else(|| FatalError::NonceUnderflow(to_hex(&sender_address)))?;
        store.set_account(sender);

        let ctx = self.context(id, config);
        errors.extend(self.params.undo(&ctx, store)?);
        debug!(id = %to_hex(&id), errors = errors.len(), "transaction undone");
        Ok(TransactionResponse::from_errors(id, errors))
    }
}

fn check_min_remaining_balance(
    id: TransactionId,
    account: &Account,
    config: &ProtocolConfig,
) -> Option<TransactionError> {
    if account.balance != 0 && account.balance < config.min_remaining_balance {
        return Some(
            TransactionError::balance(id, "/fee", "Minimum remaining balance not kept.")
                .with_values(account.balance, config.min_remaining_balance),
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{DelegateRegistration, Transfer};
    use crate::error::{ErrorKind, ResponseStatus};
    use crate::state::{ChainContext, MemoryStore};

    const CHAIN: &[u8] = b"tx-chain";

    fn transfer(nonce: u64, fee: u64, pk: PublicKey) -> Transaction {
        Transaction::new(
            nonce,
            fee,
            pk,
            Transfer {
                amount: 100,
                recipient_address: [3u8; 20],
                data: String::new(),
            },
        )
    }

    fn keypair(seed: u8) -> (Vec<u8>, PublicKey) {
        let secret = vec![seed; 32];
        let pk = public_key_from_secret(&secret).expect("pk");
        (secret, pk)
    }

    #[test]
    fn signing_changes_id_not_signing_bytes() {
        let (secret, pk) = keypair(1);
        let mut tx = transfer(0, 1, pk);
        let unsigned_id = tx.id();
        let bytes = tx.signing_bytes();
        tx.sign(CHAIN, &secret).expect("sign");
        assert_eq!(tx.signing_bytes(), bytes);
        assert_ne!(tx.id(), unsigned_id);

        let decoded = Transaction::decode(&tx.encode()).expect("decode");
        assert_eq!(decoded, tx);
        assert!(Transaction::decode_with_id(&tx.encode(), &tx.id()).is_ok());
        assert!(Transaction::decode_with_id(&tx.encode(), &unsigned_id).is_err());
    }

    #[test]
    fn unknown_type_is_a_decode_error() {
        let (secret, pk) = keypair(1);
        let mut tx = transfer(0, 1, pk);
        tx.sign(CHAIN, &secret).expect("sign");
        let mut bytes = tx.encode();
        assert_eq!(&bytes[..2], &[0x08, 8]);
        bytes[1] = 9;
        assert_eq!(
            Transaction::decode(&bytes),
            Err(CodecError::UnknownTransactionType(9))
        );
        assert_eq!(
            CommandParams::decode(11, &[]),
            Err(CodecError::UnknownTransactionType(11))
        );
    }

    #[test]
    fn sign_rejects_foreign_key() {
        let (_, pk) = keypair(1);
        let (other, _) = keypair(2);
        let mut tx = transfer(0, 1, pk);
        assert!(matches!(tx.sign(CHAIN, &other), Err(FatalError::UnknownSigner(_))));
        assert!(matches!(
            tx.sign(CHAIN, &[1u8; 31]),
            Err(FatalError::InvalidPrivateKeyLength(31))
        ));
    }

    #[test]
    fn min_fee_is_a_fixed_point() {
        let config = ProtocolConfig::default();
        let (secret, pk) = keypair(1);
        let mut tx = transfer(0, 0, pk);
        tx.sign(CHAIN, &secret).expect("sign");
        let fee = tx.min_fee(&config);
        let mut priced = tx.clone();
        priced.fee = fee;
        assert_eq!(fee, config.min_fee_per_byte * priced.encode().len() as u64);
        assert_eq!(tx.compute_min_fee(&config, 1), fee);

        let reg = Transaction::new(0, 0, pk, DelegateRegistration { username: "n".into() });
        assert!(reg.compute_min_fee(&config, 1) > config.delegate_registration_fee);
    }

    #[test]
    fn validate_enforces_fee_floor() {
        let config = ProtocolConfig::default();
        let (secret, pk) = keypair(1);
        let mut tx = transfer(0, 1, pk);
        tx.sign(CHAIN, &secret).expect("sign");
        let response = tx.validate(&config);
        assert_eq!(response.status, ResponseStatus::Fail);
        assert_eq!(response.errors[0].path, "/fee");

        tx.fee = tx.compute_min_fee(&config, 1);
        tx.sign(CHAIN, &secret).expect("sign");
        assert!(tx.validate(&config).is_ok());
    }

    #[test]
    fn apply_requires_chain_id() {
        let config = ProtocolConfig::default();
        let (_, pk) = keypair(1);
        let mut store = MemoryStore::new(ChainContext::default());
        assert_eq!(
            transfer(0, 1, pk).apply(&mut store, &config),
            Err(FatalError::MissingChainId)
        );
    }

    #[test]
    fn key_mismatch_and_wrong_nonce_are_reported_together() {
        let config = ProtocolConfig::default();
        let (secret, pk) = keypair(1);
        let mut store = MemoryStore::new(ChainContext::new(CHAIN.to_vec(), 5));
        let mut acc = Account::new(address_from_public_key(&pk));
        acc.public_key = Some([9u8; 32]);
        acc.balance = 1_000_000_000;
        store.set_account(acc);

        let mut tx = transfer(3, 10, pk);
        tx.sign(CHAIN, &secret).expect("sign");
        let response = tx.apply(&mut store, &config).expect("apply");
        assert!(response.has_error_kind(ErrorKind::Auth));
        assert!(response.has_error_kind(ErrorKind::Nonce));
    }

    #[test]
    fn undo_at_nonce_zero_is_fatal() {
        let config = ProtocolConfig::default();
        let (_, pk) = keypair(1);
        let mut store = MemoryStore::new(ChainContext::new(CHAIN.to_vec(), 5));
        store.set_account(Account::new(address_from_public_key(&pk)));
        assert!(matches!(
            transfer(0, 1, pk).undo(&mut store, &config),
            Err(FatalError::NonceUnderflow(_))
        ));
    }
}
