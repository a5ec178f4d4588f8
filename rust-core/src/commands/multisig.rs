use super::{Command, CommandContext, CommandResult};
use crate::account::MultisignatureKeys;
use crate::codec::{CodecError, Reader, Writer};
use crate::crypto::address_from_public_key;
use crate::error::TransactionError;
use crate::state::{CacheFilter, StateStore};
use crate::types::{to_hex, PublicKey};
use tracing::debug;

/// Convert the sender into an M-of-N multisignature account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisignatureRegistration {
    pub number_of_signatures: u32,
    pub mandatory_keys: Vec<PublicKey>,
    pub optional_keys: Vec<PublicKey>,
}

impl MultisignatureRegistration {
    pub fn keys(&self) -> MultisignatureKeys {
        MultisignatureKeys {
            number_of_signatures: self.number_of_signatures,
            mandatory_keys: self.mandatory_keys.clone(),
            optional_keys: self.optional_keys.clone(),
        }
    }

    fn check_key_list(
        &self,
        ctx: &CommandContext<'_>,
        field: &str,
        keys: &[PublicKey],
        errors: &mut Vec<TransactionError>,
    ) {
        let path = format!("/params/{field}");
        if keys.len() > ctx.config.max_multisig_keys {
            errors.push(
                TransactionError::schema(ctx.id, path.as_str(), "Too many keys.")
                    .with_values(keys.len(), ctx.config.max_multisig_keys),
            );
        }
        if keys.windows(2).any(|w| w[0] > w[1]) {
            errors.push(TransactionError::asset(
                ctx.id,
                path.as_str(),
                "Keys must be sorted lexicographically.",
            ));
        }
        if keys.windows(2).any(|w| w[0] == w[1]) {
            errors.push(TransactionError::asset(ctx.id, path.as_str(), "Keys must be unique."));
        }
        if keys.contains(&ctx.sender_public_key) {
            errors.push(TransactionError::asset(
                ctx.id,
                path,
                "The sender public key cannot be one of the multisignature keys.",
            ));
        }
    }
}

impl Command for MultisignatureRegistration {
    const TYPE: u32 = 12;

    fn encode(&self) -> Vec<u8> {
        Writer::new()
            .write_u32(1, self.number_of_signatures)
            .write_repeated_bytes(2, &self.mandatory_keys)
            .write_repeated_bytes(3, &self.optional_keys)
            .finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let number_of_signatures = r.read_u32(1)?;
        let mandatory_keys = r.read_repeated_fixed::<32>(2)?;
        let optional_keys = r.read_repeated_fixed::<32>(3)?;
        r.finish()?;
        Ok(Self {
            number_of_signatures,
            mandatory_keys,
            optional_keys,
        })
    }

    fn validate(&self, ctx: &CommandContext<'_>) -> Vec<TransactionError> {
        let mut errors = Vec::new();
        self.check_key_list(ctx, "mandatoryKeys", &self.mandatory_keys, &mut errors);
        self.check_key_list(ctx, "optionalKeys", &self.optional_keys, &mut errors);

        if self.mandatory_keys.iter().any(|k| self.optional_keys.contains(k)) {
            errors.push(TransactionError::asset(
                ctx.id,
                "/params/optionalKeys",
                "Invalid combination of Mandatory and Optional keys. Repeated keys across groups.",
            ));
        }

        let total = self.mandatory_keys.len() + self.optional_keys.len();
        if total == 0 || total > ctx.config.max_multisig_keys {
            errors.push(
                TransactionError::schema(ctx.id, "/params", "Number of keys is out of range.")
                    .with_values(total, ctx.config.max_multisig_keys),
            );
        }

        let n = self.number_of_signatures as usize;
        if n == 0 || n < self.mandatory_keys.len() || n > total {
            errors.push(
                TransactionError::asset(
                    ctx.id,
                    "/params/numberOfSignatures",
                    "Number of signatures must be between mandatory and total key count.",
                )
                .with_values(n, format!("{}..={total}", self.mandatory_keys.len().max(1))),
            );
        }
        errors
    }

    fn apply(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult {
        let mut sender = store.account(&ctx.sender_address)?;
        if sender.is_multisignature() {
            return Ok(vec![TransactionError::asset(
                ctx.id,
                "/params",
                "Register multisignature only allowed once per account.",
            )]);
        }
        sender.keys = self.keys();
        store.set_account(sender);

        // Members may never have transacted; give them an account carrying their key.
        for key in self.mandatory_keys.iter().chain(&self.optional_keys) {
            let mut member = store.account_or_default(&address_from_public_key(key));
            if member.public_key.is_none() {
                member.public_key = Some(*key);
                store.set_account(member);
            }
        }
        debug!(
            account = %to_hex(&ctx.sender_address),
            required = self.number_of_signatures,
            keys = self.mandatory_keys.len() + self.optional_keys.len(),
            "multisignature account registered"
        );
        Ok(Vec::new())
    }

    fn undo(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult {
        let mut sender = store.account(&ctx.sender_address)?;
        sender.keys = MultisignatureKeys::default();
        store.set_account(sender);
        Ok(Vec::new())
    }

    fn cache_filters(&self) -> Vec<CacheFilter> {
        self.mandatory_keys
            .iter()
            .chain(&self.optional_keys)
            .map(|k| CacheFilter::PublicKey(*k))
            .collect()
    }
}
