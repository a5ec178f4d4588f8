// Authorization: decides whether a transaction's signature slots satisfy the
// sender's key policy. Pure; reads only the already-fetched sender account.

use crate::account::{Account, MultisignatureKeys};
use crate::crypto::{self, TAG_TRANSACTION};
use crate::error::TransactionError;
use crate::types::{PublicKey, Signature, TransactionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Complete,
    /// No bad signature, but `missing` more are needed.
    Pending { missing: usize },
    Failed(Vec<TransactionError>),
}

/// What the signatures are checked against.
#[derive(Clone, Copy)]
pub struct SigningInput<'a> {
    pub id: TransactionId,
    pub chain_id: &'a [u8],
    pub bytes: &'a [u8],
}

impl SigningInput<'_> {
    fn verify(&self, public_key: &PublicKey, signature: &Signature) -> bool {
        crypto::verify(TAG_TRANSACTION, self.chain_id, self.bytes, public_key, signature)
    }

    fn slot_count_error(&self, actual: usize, expected: usize) -> AuthOutcome {
        AuthOutcome::Failed(vec![TransactionError::auth(
            self.id,
            "/signatures",
            "Number of signatures does not match the number of signing keys.",
        )
        .with_values(actual, expected)])
    }

    fn invalid_signature(&self, slot: usize) -> TransactionError {
        let path = format!("/signatures/{slot}");
        TransactionError::auth(self.id, path, "Failed to validate signature.")
    }
}

/// Exactly one signature, made by `public_key`.
pub fn verify_single(
    input: &SigningInput<'_>,
    public_key: &PublicKey,
    signatures: &[Option<Signature>],
) -> AuthOutcome {
    if signatures.len() != 1 {
        return input.slot_count_error(signatures.len(), 1);
    }
    match &signatures[0] {
        Some(sig) if input.verify(public_key, sig) => AuthOutcome::Complete,
        Some(_) => AuthOutcome::Failed(vec![input.invalid_signature(0)]),
        None => AuthOutcome::Failed(vec![TransactionError::auth(
            input.id,
            "/signatures/0",
            "Signature is missing.",
        )]),
    }
}

/// Slots line up with `keys.ordered_keys()`. Any present-but-invalid
/// signature fails the transaction; otherwise unfilled slots make it pending.
pub fn verify_multisignature(
    input: &SigningInput<'_>,
    keys: &MultisignatureKeys,
    signatures: &[Option<Signature>],
) -> AuthOutcome {
    let ordered = keys.ordered_keys();
    if signatures.len() != ordered.len() {
        return input.slot_count_error(signatures.len(), ordered.len());
    }
    let mandatory = keys.mandatory_keys.len();
    let mut errors = Vec::new();
    let mut missing_mandatory = 0usize;
    let mut valid_optional = 0usize;
    for (slot, (key, sig)) in ordered.iter().zip(signatures).enumerate() {
        match sig {
            None if slot < mandatory => missing_mandatory += 1,
            None => {}
            Some(sig) if input.verify(key, sig) => {
                if slot >= mandatory {
                    valid_optional += 1;
                }
            }
            Some(_) => errors.push(input.invalid_signature(slot)),
        }
    }
    if !errors.is_empty() {
        return AuthOutcome::Failed(errors);
    }
    let required_optional = (keys.number_of_signatures as usize).saturating_sub(mandatory);
    let missing = missing_mandatory + required_optional.saturating_sub(valid_optional);
    if missing == 0 {
        AuthOutcome::Complete
    } else {
        AuthOutcome::Pending { missing }
    }
}

/// A registration needs the sender plus every listed member, in slot order
/// `[sender, sorted mandatory.., sorted optional..]`.
pub fn verify_registration(
    input: &SigningInput<'_>,
    sender_public_key: &PublicKey,
    keys: &MultisignatureKeys,
    signatures: &[Option<Signature>],
) -> AuthOutcome {
    let signers: Vec<PublicKey> = std::iter::once(*sender_public_key)
        .chain(keys.ordered_keys())
        .collect();
    if signatures.len() != signers.len() {
        return input.slot_count_error(signatures.len(), signers.len());
    }
    let mut errors = Vec::new();
    let mut missing = 0usize;
    for (slot, (key, sig)) in signers.iter().zip(signatures).enumerate() {
        match sig {
            None => missing += 1,
            Some(sig) if input.verify(key, sig) => {}
            Some(_) => errors.push(input.invalid_signature(slot)),
        }
    }
    if !errors.is_empty() {
        AuthOutcome::Failed(errors)
    } else if missing > 0 {
        AuthOutcome::Pending { missing }
    } else {
        AuthOutcome::Complete
    }
}

/// Pick the rule for `sender`. `registration` carries the keys being
/// registered when the transaction is a multisignature registration.
pub fn authorize(
    input: &SigningInput<'_>,
    sender: &Account,
    sender_public_key: &PublicKey,
    registration: Option<&MultisignatureKeys>,
    signatures: &[Option<Signature>],
) -> AuthOutcome {
    if sender.is_multisignature() {
        return verify_multisignature(input, &sender.keys, signatures);
    }
    match registration {
        Some(keys) => verify_registration(input, sender_public_key, keys, signatures),
        None => verify_single(input, sender_public_key, signatures),
    }
}
