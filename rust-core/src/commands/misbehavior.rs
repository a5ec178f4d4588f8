use super::{Command, CommandContext, CommandResult};
use crate::bft::slashing::contradiction;
use crate::bft::types::BlockHeader;
use crate::codec::{CodecError, Reader, Writer};
use crate::crypto::address_from_public_key;
use crate::error::{FatalError, TransactionError};
use crate::state::{CacheFilter, StateStore};
use crate::types::{to_hex, Address};
use tracing::warn;

/// Evidence that one generator signed two contradicting block headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofOfMisbehavior {
    pub header1: BlockHeader,
    pub header2: BlockHeader,
}

impl ProofOfMisbehavior {
    pub fn delegate_address(&self) -> Address {
        address_from_public_key(&self.header1.generator_public_key)
    }
}

impl Command for ProofOfMisbehavior {
    const TYPE: u32 = 15;

    fn encode(&self) -> Vec<u8> {
        Writer::new()
            .write_object(1, &self.header1.encode())
            .write_object(2, &self.header2.encode())
            .finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let header1 = BlockHeader::decode(r.read_bytes(1)?)?;
        let header2 = BlockHeader::decode(r.read_bytes(2)?)?;
        r.finish()?;
        Ok(Self { header1, header2 })
    }

    fn validate(&self, ctx: &CommandContext<'_>) -> Vec<TransactionError> {
        if self.header1.generator_public_key != self.header2.generator_public_key {
            return vec![TransactionError::asset(
                ctx.id,
                "/params/header2/generatorPublicKey",
                "Generator public key of both headers must match.",
            )];
        }
        if self.header1.id() == self.header2.id() {
            return vec![TransactionError::asset(
                ctx.id,
                "/params/header2",
                "Block headers are identical. No contradiction detected.",
            )];
        }
        if contradiction(&self.header1, &self.header2).is_none() {
            return vec![TransactionError::asset(
                ctx.id,
                "/params/header2",
                "Block headers are not contradicting as per BFT violation rules.",
            )];
        }
        Vec::new()
    }

    fn apply(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult {
        let chain = store.chain_context().clone();
        let current_height = chain.current_height();
        let max_diff = ctx.config.max_punishable_height_difference;
        let mut errors = Vec::new();

        for (field, header) in [("header1", &self.header1), ("header2", &self.header2)] {
            if current_height.abs_diff(header.height) >= max_diff {
                errors.push(
                    TransactionError::asset(
                        ctx.id,
                        format!("/params/{field}/height"),
                        "Height difference between the header and the current height is too large.",
                    )
                    .with_values(current_height.abs_diff(header.height), max_diff),
                );
            }
            if !header.verify_signature(&chain.chain_id) {
                errors.push(TransactionError::asset(
                    ctx.id,
                    format!("/params/{field}/signature"),
                    "Invalid block header signature.",
                ));
            }
        }

        let address = self.delegate_address();
        let mut delegate = store.account_or_default(&address);
        let Some(info) = delegate.delegate.as_mut() else {
            errors.push(TransactionError::asset(
                ctx.id,
                "/params/header1/generatorPublicKey",
                "Account is not a delegate.",
            ));
            return Ok(errors);
        };
        if info.is_banned {
            errors.push(TransactionError::asset(
                ctx.id,
                "/params/header1/generatorPublicKey",
                "Cannot apply proof-of-misbehavior. Delegate is already banned.",
            ));
        }
        if info.pom_heights.contains(&current_height) {
            errors.push(TransactionError::asset(
                ctx.id,
                "/params",
                "Proof-of-misbehavior for this delegate is already included at this height.",
            ));
        }
        if !errors.is_empty() {
            return Ok(errors);
        }

        info.pom_heights.push(current_height);
        info.is_banned = info.pom_heights.len() >= ctx.config.max_pom_heights;
        warn!(
            delegate = %to_hex(&address),
            username = %info.username,
            height = current_height,
            reports = info.pom_heights.len(),
            banned = info.is_banned,
            rule = ?contradiction(&self.header1, &self.header2),
            "misbehavior proven"
        );
        store.set_account(delegate);
        Ok(errors)
    }

    fn undo(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult {
        let current_height = store.chain_context().current_height();
        let address = self.delegate_address();
        let mut delegate = store.account(&address)?;
        let info = delegate
            .delegate
            .as_mut()
            .ok_or_else(|| FatalError::MissingDelegate(to_hex(&address)))?;
        let pos = info
            .pom_heights
            .iter()
            .rposition(|h| *h == current_height)
            .ok_or_else(|| FatalError::MissingPomHeight {
                delegate: to_hex(&address),
                height: current_height,
            })?;
        info.pom_heights.remove(pos);
        info.is_banned = info.pom_heights.len() >= ctx.config.max_pom_heights;
        store.set_account(delegate);
        Ok(Vec::new())
    }

    fn cache_filters(&self) -> Vec<CacheFilter> {
        vec![CacheFilter::Address(self.delegate_address())]
    }
}
