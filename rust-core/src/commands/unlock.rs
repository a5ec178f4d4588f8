use super::{credit, Command, CommandContext, CommandResult};
use crate::account::UnlockingEntry;
use crate::bft::slashing::{is_punished, remaining_blocks};
use crate::codec::{CodecError, Reader, Writer};
use crate::error::TransactionError;
use crate::state::{CacheFilter, StateStore};
use crate::types::MAX_TRANSACTION_AMOUNT;

/// Release stake whose unvote waiting period has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unlock {
    pub unlock_objects: Vec<UnlockingEntry>,
}

impl Command for Unlock {
    const TYPE: u32 = 14;

    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        for u in &self.unlock_objects {
            let item = Writer::new()
                .write_bytes(1, &u.delegate_address)
                .write_u64(2, u.amount)
                .write_u32(3, u.unvote_height)
                .finish();
            w.write_object(1, &item);
        }
        w.finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let items = r.read_repeated_bytes(1)?;
        r.finish()?;
        let unlock_objects = items
            .into_iter()
            .map(|item| {
                let mut ir = Reader::new(item);
                let delegate_address = ir.read_fixed::<20>(1)?;
                let amount = ir.read_u64(2)?;
                let unvote_height = ir.read_u32(3)?;
                ir.finish()?;
                Ok(UnlockingEntry {
                    delegate_address,
                    unvote_height,
                    amount,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(Self { unlock_objects })
    }

    fn validate(&self, ctx: &CommandContext<'_>) -> Vec<TransactionError> {
        let config = ctx.config;
        let mut errors = Vec::new();
        if self.unlock_objects.is_empty() || self.unlock_objects.len() > config.max_unlock_entries {
            errors.push(
                TransactionError::schema(
                    ctx.id,
                    "/params/unlockObjects",
                    "Number of unlock objects is out of range.",
                )
                .with_values(self.unlock_objects.len(), config.max_unlock_entries),
            );
        }
        for (i, u) in self.unlock_objects.iter().enumerate() {
            let path = format!("/params/unlockObjects/{i}/amount");
            if u.amount == 0 || u.amount > MAX_TRANSACTION_AMOUNT {
                errors.push(TransactionError::schema(ctx.id, path, "Amount is out of range."));
            } else if config.vote_unit == 0 || u.amount % config.vote_unit != 0 {
                errors.push(
                    TransactionError::asset(ctx.id, path, "Amount should be multiple of vote unit.")
                        .with_values(u.amount, config.vote_unit),
                );
            }
        }
        errors
    }

    fn apply(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult {
        let config = ctx.config;
        let current_height = store.chain_context().current_height();
        let mut errors = Vec::new();

        for (i, u) in self.unlock_objects.iter().enumerate() {
            let path = format!("/params/unlockObjects/{i}");
            let delegate = store.account_or_default(&u.delegate_address);
            let Some(info) = delegate.delegate.as_ref() else {
                errors.push(TransactionError::asset(
                    ctx.id,
                    format!("{path}/delegateAddress"),
                    "Unlocking from an account that is not a delegate.",
                ));
                continue;
            };

            let self_vote = u.delegate_address == ctx.sender_address;
            let (wait, punish) = if self_vote {
                (config.self_vote_wait_blocks, config.self_vote_punish_blocks)
            } else {
                (config.vote_wait_blocks, config.voter_punish_blocks)
            };
            let remaining = remaining_blocks(wait, current_height, u.unvote_height);
            if remaining > 0 {
                errors.push(
                    TransactionError::asset(
                        ctx.id,
                        format!("{path}/unvoteHeight"),
                        "Unlocking is not permitted as it is still within the waiting period.",
                    )
                    .with_values(remaining, 0),
                );
                continue;
            }
            if is_punished(info.last_pom_height(), current_height, punish) {
                errors.push(TransactionError::asset(
                    ctx.id,
                    format!("{path}/delegateAddress"),
                    "Unlocking is not permitted as the delegate is currently being punished.",
                ));
                continue;
            }

            let mut sender = store.account(&ctx.sender_address)?;
            let Some(idx) = sender.unlocking_index(u) else {
                errors.push(TransactionError::asset(
                    ctx.id,
                    path,
                    "Corresponding unlocking object not found.",
                ));
                continue;
            };
            let Some(balance) = credit(sender.balance, u.amount) else {
                errors.push(TransactionError::balance(
                    ctx.id,
                    format!("{path}/amount"),
                    "Balance would exceed the maximum amount.",
                ));
                continue;
            };
            sender.unlocking.remove(idx);
            sender.balance = balance;
            store.set_account(sender);
        }
        Ok(errors)
    }

    fn undo(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult {
        let mut errors = Vec::new();
        for (i, u) in self.unlock_objects.iter().enumerate().rev() {
            let mut sender = store.account(&ctx.sender_address)?;
            let Some(balance) = sender.balance.checked_sub(u.amount) else {
                errors.push(
                    TransactionError::balance(
                        ctx.id,
                        format!("/params/unlockObjects/{i}/amount"),
                        "Account does not have enough balance to revert the unlock.",
                    )
                    .with_values(sender.balance, u.amount),
                );
                continue;
            };
            sender.balance = balance;
            sender.unlocking.push(*u);
            sender.sort_unlocking();
            store.set_account(sender);
        }
        Ok(errors)
    }

    fn cache_filters(&self) -> Vec<CacheFilter> {
        self.unlock_objects
            .iter()
            .map(|u| CacheFilter::Address(u.delegate_address))
            .collect()
    }
}
