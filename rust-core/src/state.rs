// Account/chain state interface consumed by the engine, plus an in-memory store.
// get/set are synchronous and by value; callers apply transactions strictly in order.

use crate::account::Account;
use crate::crypto::address_from_public_key;
use crate::error::StateError;
use crate::types::{to_hex, Address, Height, PublicKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContext {
    /// Domain-separation tag mixed into every signature. Must be non-empty.
    pub chain_id: Vec<u8>,
    pub last_block_height: Height,
}

impl ChainContext {
    pub fn new(chain_id: Vec<u8>, last_block_height: Height) -> Self {
        Self {
            chain_id,
            last_block_height,
        }
    }

    /// Height of the block currently being applied.
    pub fn current_height(&self) -> Height {
        self.last_block_height.saturating_add(1)
    }
}

/// Pre-fetch hint passed to [`StateStore::cache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheFilter {
    Address(Address),
    PublicKey(PublicKey),
    Username(String),
}

pub trait StateStore {
    fn account(&self, address: &Address) -> Result<Account, StateError>;

    fn account_or_default(&self, address: &Address) -> Account {
        self.account(address).unwrap_or_else(|_| Account::new(*address))
    }

    fn set_account(&mut self, account: Account);

    fn find_account(&self, predicate: &dyn Fn(&Account) -> bool) -> Option<Account>;

    /// Warm the store before a batch of `apply` calls. No result is required.
    fn cache(&mut self, filters: &[CacheFilter]);

    fn chain_context(&self) -> &ChainContext;

    fn chain_get(&self, key: &str) -> Option<Vec<u8>>;

    fn chain_set(&mut self, key: &str, value: Vec<u8>);
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    accounts: BTreeMap<Address, Account>,
    chain: ChainContext,
    chain_entries: BTreeMap<String, Vec<u8>>,
    warmed: BTreeSet<Address>,
}

// The warm set is a hint, not state.
impl PartialEq for MemoryStore {
    fn eq(&self, other: &Self) -> bool {
        self.accounts == other.accounts
            && self.chain == other.chain
            && self.chain_entries == other.chain_entries
    }
}

impl Eq for MemoryStore {}

impl MemoryStore {
    pub fn new(chain: ChainContext) -> Self {
        Self {
            accounts: BTreeMap::new(),
            chain,
            chain_entries: BTreeMap::new(),
            warmed: BTreeSet::new(),
        }
    }

    pub fn set_chain_context(&mut self, chain: ChainContext) {
        self.chain = chain;
    }

    pub fn set_last_block_height(&mut self, height: Height) {
        self.chain.last_block_height = height;
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn chain_entries(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.chain_entries
    }

    pub fn from_parts(
        chain: ChainContext,
        accounts: impl IntoIterator<Item = Account>,
        chain_entries: BTreeMap<String, Vec<u8>>,
    ) -> Self {
        Self {
            accounts: accounts.into_iter().map(|a| (a.address, a)).collect(),
            chain,
            chain_entries,
            warmed: BTreeSet::new(),
        }
    }

    pub fn is_warmed(&self, address: &Address) -> bool {
        self.warmed.contains(address)
    }
}

impl StateStore for MemoryStore {
    fn account(&self, address: &Address) -> Result<Account, StateError> {
        self.accounts
            .get(address)
            .cloned()
            .ok_or_else(|| StateError::AccountNotFound(to_hex(address)))
    }

    fn set_account(&mut self, account: Account) {
        self.accounts.insert(account.address, account);
    }

    fn find_account(&self, predicate: &dyn Fn(&Account) -> bool) -> Option<Account> {
        self.accounts.values().find(|a| predicate(a)).cloned()
    }

    fn cache(&mut self, filters: &[CacheFilter]) {
        for filter in filters {
            let address = match filter {
                CacheFilter::Address(a) => Some(*a),
                CacheFilter::PublicKey(pk) => Some(address_from_public_key(pk)),
                CacheFilter::Username(name) => self
                    .accounts
                    .values()
                    .find(|a| a.username() == Some(name.as_str()))
                    .map(|a| a.address),
            };
            if let Some(address) = address {
                self.warmed.insert(address);
            }
        }
        trace!(filters = filters.len(), warmed = self.warmed.len(), "cache warmed");
    }

    fn chain_context(&self) -> &ChainContext {
        &self.chain
    }

    fn chain_get(&self, key: &str) -> Option<Vec<u8>> {
        self.chain_entries.get(key).cloned()
    }

    fn chain_set(&mut self, key: &str, value: Vec<u8>) {
        self.chain_entries.insert(key.to_string(), value);
    }
}
