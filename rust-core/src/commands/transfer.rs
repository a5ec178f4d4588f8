use super::{credit, Command, CommandContext, CommandResult};
use crate::codec::{CodecError, Reader, Writer};
use crate::error::TransactionError;
use crate::state::{CacheFilter, StateStore};
use crate::types::{Address, MAX_TRANSACTION_AMOUNT};

/// Move `amount` beddows from the sender to `recipient_address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub amount: u64,
    pub recipient_address: Address,
    /// Free-form note, at most `max_transfer_data_bytes` UTF-8 bytes.
    pub data: String,
}

impl Command for Transfer {
    const TYPE: u32 = 8;

    fn encode(&self) -> Vec<u8> {
        Writer::new()
            .write_u64(1, self.amount)
            .write_bytes(2, &self.recipient_address)
            .write_str(3, &self.data)
            .finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let amount = r.read_u64(1)?;
        let recipient_address = r.read_fixed::<20>(2)?;
        let data = r.read_str(3)?;
        r.finish()?;
        Ok(Self {
            amount,
            recipient_address,
            data,
        })
    }

    fn validate(&self, ctx: &CommandContext<'_>) -> Vec<TransactionError> {
        let mut errors = Vec::new();
        if self.amount > MAX_TRANSACTION_AMOUNT {
            errors.push(
                TransactionError::schema(ctx.id, "/params/amount", "Amount is out of range.")
                    .with_values(self.amount, MAX_TRANSACTION_AMOUNT),
            );
        }
        if self.data.len() > ctx.config.max_transfer_data_bytes {
            errors.push(
                TransactionError::schema(ctx.id, "/params/data", "Transfer data is too long.")
                    .with_values(self.data.len(), ctx.config.max_transfer_data_bytes),
            );
        }
        if self.data.contains('\0') {
            errors.push(TransactionError::schema(
                ctx.id,
                "/params/data",
                "Transfer data must not contain null characters.",
            ));
        }
        errors
    }

    fn apply(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult {
        let mut sender = store.account(&ctx.sender_address)?;
        let Some(remaining) = sender.balance.checked_sub(self.amount) else {
            return Ok(vec![
                TransactionError::balance(
                    ctx.id,
                    "/params/amount",
                    "Account does not have enough balance.",
                )
                .with_values(sender.balance, self.amount),
            ]);
        };
        sender.balance = remaining;
        store.set_account(sender);

        // Re-read: the recipient may be the sender.
        let mut recipient = store.account_or_default(&self.recipient_address);
        let Some(credited) = credit(recipient.balance, self.amount) else {
            return Ok(vec![TransactionError::balance(
                ctx.id,
                "/params/recipientAddress",
                "Recipient balance would exceed the maximum amount.",
            )
            .with_values(recipient.balance, MAX_TRANSACTION_AMOUNT)]);
        };
        recipient.balance = credited;
        store.set_account(recipient);
        Ok(Vec::new())
    }

    fn undo(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult {
        let mut errors = Vec::new();
        let mut recipient = store.account(&self.recipient_address)?;
        match recipient.balance.checked_sub(self.amount) {
            Some(b) => {
                recipient.balance = b;
                store.set_account(recipient);
            }
            None => errors.push(
                TransactionError::balance(
                    ctx.id,
                    "/params/amount",
                    "Recipient does not have enough balance to revert.",
                )
                .with_values(recipient.balance, self.amount),
            ),
        }

        let mut sender = store.account(&ctx.sender_address)?;
        match credit(sender.balance, self.amount) {
            Some(b) => {
                sender.balance = b;
                store.set_account(sender);
            }
            None => errors.push(TransactionError::balance(
                ctx.id,
                "/params/amount",
                "Sender balance would exceed the maximum amount.",
            )),
        }
        Ok(errors)
    }

    fn cache_filters(&self) -> Vec<CacheFilter> {
        vec![CacheFilter::Address(self.recipient_address)]
    }
}
