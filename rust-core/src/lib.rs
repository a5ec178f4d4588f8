// Account-based DPoS transaction engine: deterministic, in-memory, audit-first.
// Time is injected through the chain context; there is no wall clock access.

pub mod account;
pub mod auth;
pub mod bft;
pub mod codec;
pub mod commands;
pub mod config;
pub mod crypto;
pub mod error;
pub mod processor;
pub mod state;
pub mod storage;
pub mod transaction;
pub mod types;

pub use account::{Account, DelegateInfo, MultisignatureKeys, UnlockingEntry, VoteEntry};
pub use commands::{
    CommandParams, DelegateRegistration, MultisignatureRegistration, ProofOfMisbehavior, Transfer,
    Unlock, Vote, VoteItem,
};
pub use config::{GenesisConfig, ProtocolConfig};
pub use error::{ErrorKind, FatalError, ResponseStatus, TransactionError, TransactionResponse};
pub use processor::{BlockProcessor, ProcessError};
pub use state::{ChainContext, MemoryStore, StateStore};
pub use transaction::Transaction;

/*
Intentionally avoids:
- async
- threads
- global mutable state
- IO outside `storage`
*/
