// Command set: per-type parameter schemas and their state transitions.
//
// Each command is a plain params struct implementing `Command`. The closed
// `CommandParams` enum maps the numeric transaction type onto a variant, so
// dispatch is a `match` instead of a runtime class lookup.

pub mod delegate;
pub mod misbehavior;
pub mod multisig;
pub mod transfer;
pub mod unlock;
pub mod vote;

use crate::codec::CodecError;
use crate::config::ProtocolConfig;
use crate::error::{FatalError, TransactionError};
use crate::state::{CacheFilter, StateStore};
use crate::types::{Address, PublicKey, TransactionId};

pub use delegate::DelegateRegistration;
pub use misbehavior::ProofOfMisbehavior;
pub use multisig::MultisignatureRegistration;
pub use transfer::Transfer;
pub use unlock::Unlock;
pub use vote::{Vote, VoteItem};

/// Rule violations found by a command, or a fatal engine error.
pub type CommandResult = Result<Vec<TransactionError>, FatalError>;

/// What a command knows about the transaction carrying it.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub id: TransactionId,
    pub sender_address: Address,
    pub sender_public_key: PublicKey,
    pub config: &'a ProtocolConfig,
}

pub trait Command: Sized {
    /// Transaction type discriminator.
    const TYPE: u32;

    fn encode(&self) -> Vec<u8>;

    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;

    /// Fixed part of the minimum fee, on top of the per-byte part.
    fn name_fee(&self, _config: &ProtocolConfig) -> u64 {
        0
    }

    /// Stateless parameter checks.
    fn validate(&self, ctx: &CommandContext<'_>) -> Vec<TransactionError>;

    fn apply(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult;

    /// Exact inverse of `apply`. Missing internal records are fatal.
    fn undo(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult;

    /// Accounts this command touches besides the sender.
    fn cache_filters(&self) -> Vec<CacheFilter> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandParams {
    Transfer(Transfer),
    RegisterDelegate(DelegateRegistration),
    RegisterMultisignature(MultisignatureRegistration),
    Vote(Vote),
    Unlock(Unlock),
    ReportMisbehavior(ProofOfMisbehavior),
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self {
            CommandParams::Transfer($inner) => $body,
            CommandParams::RegisterDelegate($inner) => $body,
            CommandParams::RegisterMultisignature($inner) => $body,
            CommandParams::Vote($inner) => $body,
            CommandParams::Unlock($inner) => $body,
            CommandParams::ReportMisbehavior($inner) => $body,
        }
    };
}

impl CommandParams {
    pub fn type_id(&self) -> u32 {
        match self {
            CommandParams::Transfer(_) => Transfer::TYPE,
            CommandParams::RegisterDelegate(_) => DelegateRegistration::TYPE,
            CommandParams::RegisterMultisignature(_) => MultisignatureRegistration::TYPE,
            CommandParams::Vote(_) => Vote::TYPE,
            CommandParams::Unlock(_) => Unlock::TYPE,
            CommandParams::ReportMisbehavior(_) => ProofOfMisbehavior::TYPE,
        }
    }

    pub fn decode(type_id: u32, bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(match type_id {
            Transfer::TYPE => CommandParams::Transfer(Transfer::decode(bytes)?),
            DelegateRegistration::TYPE => {
                CommandParams::RegisterDelegate(DelegateRegistration::decode(bytes)?)
            }
            MultisignatureRegistration::TYPE => {
                CommandParams::RegisterMultisignature(MultisignatureRegistration::decode(bytes)?)
            }
            Vote::TYPE => CommandParams::Vote(Vote::decode(bytes)?),
            Unlock::TYPE => CommandParams::Unlock(Unlock::decode(bytes)?),
            ProofOfMisbehavior::TYPE => {
                CommandParams::ReportMisbehavior(ProofOfMisbehavior::decode(bytes)?)
            }
            other => return Err(CodecError::UnknownTransactionType(other)),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        dispatch!(self, p => p.encode())
    }

    pub fn name_fee(&self, config: &ProtocolConfig) -> u64 {
        dispatch!(self, p => p.name_fee(config))
    }

    pub fn validate(&self, ctx: &CommandContext<'_>) -> Vec<TransactionError> {
        dispatch!(self, p => p.validate(ctx))
    }

    pub fn apply(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult {
        dispatch!(self, p => p.apply(ctx, store))
    }

    pub fn undo(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult {
        dispatch!(self, p => p.undo(ctx, store))
    }

    pub fn cache_filters(&self) -> Vec<CacheFilter> {
        dispatch!(self, p => p.cache_filters())
    }
}

impl From<Transfer> for CommandParams {
    fn from(p: Transfer) -> Self {
        CommandParams::Transfer(p)
    }
}

impl From<DelegateRegistration> for CommandParams {
    fn from(p: DelegateRegistration) -> Self {
        CommandParams::RegisterDelegate(p)
    }
}

impl From<MultisignatureRegistration> for CommandParams {
    fn from(p: MultisignatureRegistration) -> Self {
        CommandParams::RegisterMultisignature(p)
    }
}

impl From<Vote> for CommandParams {
    fn from(p: Vote) -> Self {
        CommandParams::Vote(p)
    }
}

impl From<Unlock> for CommandParams {
    fn from(p: Unlock) -> Self {
        CommandParams::Unlock(p)
    }
}

impl From<ProofOfMisbehavior> for CommandParams {
    fn from(p: ProofOfMisbehavior) -> Self {
        CommandParams::ReportMisbehavior(p)
    }
}

/// Credit `amount` keeping the balance within the representable range.
pub(crate) fn credit(balance: u64, amount: u64) -> Option<u64> {
    balance
        .checked_add(amount)
        .filter(|b| *b <= crate::types::MAX_TRANSACTION_AMOUNT)
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::account::{Account, DelegateInfo};
    use crate::crypto::{address_from_public_key, public_key_from_secret};
    use crate::state::{ChainContext, MemoryStore};

    pub fn key(seed: u8) -> (Vec<u8>, PublicKey, Address) {
        let secret = vec![seed; 32];
        let pk = public_key_from_secret(&secret).expect("pk");
        (secret, pk, address_from_public_key(&pk))
    }

    pub fn store_at(height: u32) -> MemoryStore {
        MemoryStore::new(ChainContext::new(b"test-chain".to_vec(), height))
    }

    pub fn fund(store: &mut MemoryStore, address: Address, balance: u64) {
        let mut a = store.account_or_default(&address);
        a.balance = balance;
        store.set_account(a);
    }

    pub fn make_delegate(store: &mut MemoryStore, address: Address, name: &str) {
        let mut a = store.account_or_default(&address);
        a.delegate = Some(DelegateInfo::new(name.to_string(), 1));
        store.set_account(a);
    }

    pub fn ctx<'a>(config: &'a ProtocolConfig, pk: PublicKey) -> CommandContext<'a> {
        CommandContext {
            id: [0xEE; 32],
            sender_address: address_from_public_key(&pk),
            sender_public_key: pk,
            config,
        }
    }

    pub fn account(store: &MemoryStore, address: &Address) -> Account {
        store.account(address).expect("account")
    }
}
