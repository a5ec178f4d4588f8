use crate::account::{Account, DelegateInfo};
use crate::commands::delegate::registry_insert;
use crate::crypto::address_from_public_key;
use crate::state::{ChainContext, MemoryStore, StateStore};
use crate::types::{Address, Height, PublicKey};
use hex::FromHex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid chain id hex")]
    InvalidChainId,
    #[error("invalid public key hex for genesis account {0} (expected 32 bytes)")]
    InvalidPublicKey(usize),
    #[error("duplicate genesis account {0}")]
    DuplicateAccount(String),
    #[error("failed to parse genesis json: {0}")]
    Parse(String),
    #[error("failed to seed delegate registry: {0}")]
    Registry(String),
}

/// Protocol constants. Every field has a default so partial JSON is accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_min_fee_per_byte")]
    pub min_fee_per_byte: u64,
    #[serde(default = "default_delegate_registration_fee")]
    pub delegate_registration_fee: u64,
    #[serde(default = "default_min_remaining_balance")]
    pub min_remaining_balance: u64,
    #[serde(default = "default_vote_unit")]
    pub vote_unit: u64,
    #[serde(default = "default_max_active_votes")]
    pub max_active_votes: usize,
    #[serde(default = "default_max_votes_per_direction")]
    pub max_upvotes_per_tx: usize,
    #[serde(default = "default_max_votes_per_direction")]
    pub max_downvotes_per_tx: usize,
    #[serde(default = "default_max_entries")]
    pub max_vote_entries: usize,
    #[serde(default = "default_max_entries")]
    pub max_unlock_entries: usize,
    #[serde(default = "default_max_unlocking")]
    pub max_unlocking: usize,
    #[serde(default = "default_vote_wait")]
    pub vote_wait_blocks: Height,
    #[serde(default = "default_self_vote_wait")]
    pub self_vote_wait_blocks: Height,
    #[serde(default = "default_voter_punish")]
    pub voter_punish_blocks: Height,
    #[serde(default = "default_self_vote_punish")]
    pub self_vote_punish_blocks: Height,
    #[serde(default = "default_max_pom_heights")]
    pub max_pom_heights: usize,
    #[serde(default = "default_max_punishable_height_difference")]
    pub max_punishable_height_difference: Height,
    #[serde(default = "default_max_multisig_keys")]
    pub max_multisig_keys: usize,
    #[serde(default = "default_max_transfer_data_bytes")]
    pub max_transfer_data_bytes: usize,
    #[serde(default = "default_max_username_length")]
    pub max_username_length: usize,
}

fn default_min_fee_per_byte() -> u64 {
    1_000
}

fn default_delegate_registration_fee() -> u64 {
    1_000_000_000 // 10 LSK
}

fn default_min_remaining_balance() -> u64 {
    5_000_000 // 0.05 LSK
}

fn default_vote_unit() -> u64 {
    1_000_000_000
}

fn default_max_active_votes() -> usize {
    10
}

fn default_max_votes_per_direction() -> usize {
    10
}

fn default_max_entries() -> usize {
    20
}

fn default_max_unlocking() -> usize {
    20
}

fn default_vote_wait() -> Height {
    2_000
}

fn default_self_vote_wait() -> Height {
    260_000
}

fn default_voter_punish() -> Height {
    260_000
}

fn default_self_vote_punish() -> Height {
    780_000
}

fn default_max_pom_heights() -> usize {
    5
}

fn default_max_punishable_height_difference() -> Height {
    260_000
}

fn default_max_multisig_keys() -> usize {
    64
}

fn default_max_transfer_data_bytes() -> usize {
    64
}

fn default_max_username_length() -> usize {
    20
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            min_fee_per_byte: default_min_fee_per_byte(),
            delegate_registration_fee: default_delegate_registration_fee(),
            min_remaining_balance: default_min_remaining_balance(),
            vote_unit: default_vote_unit(),
            max_active_votes: default_max_active_votes(),
            max_upvotes_per_tx: default_max_votes_per_direction(),
            max_downvotes_per_tx: default_max_votes_per_direction(),
            max_vote_entries: default_max_entries(),
            max_unlock_entries: default_max_entries(),
            max_unlocking: default_max_unlocking(),
            vote_wait_blocks: default_vote_wait(),
            self_vote_wait_blocks: default_self_vote_wait(),
            voter_punish_blocks: default_voter_punish(),
            self_vote_punish_blocks: default_self_vote_punish(),
            max_pom_heights: default_max_pom_heights(),
            max_punishable_height_difference: default_max_punishable_height_difference(),
            max_multisig_keys: default_max_multisig_keys(),
            max_transfer_data_bytes: default_max_transfer_data_bytes(),
            max_username_length: default_max_username_length(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub public_key_hex: String,
    #[serde(default)]
    pub balance: u64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub chain_id_hex: String,
    #[serde(default)]
    pub height: Height,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
}

impl GenesisConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn chain_id(&self) -> Result<Vec<u8>, ConfigError> {
        let bytes = hex::decode(&self.chain_id_hex).map_err(|_| ConfigError::InvalidChainId)?;
        if bytes.is_empty() {
            return Err(ConfigError::InvalidChainId);
        }
        Ok(bytes)
    }

    pub fn genesis_accounts(&self) -> Result<Vec<Account>, ConfigError> {
        let mut out: Vec<Account> = Vec::with_capacity(self.accounts.len());
        for (i, g) in self.accounts.iter().enumerate() {
            let public_key =
                parse_public_key(&g.public_key_hex).ok_or(ConfigError::InvalidPublicKey(i))?;
            let address = address_from_public_key(&public_key);
            if out.iter().any(|a| a.address == address) {
                return Err(ConfigError::DuplicateAccount(hex::encode(address)));
            }
            let mut account = Account::new(address);
            account.public_key = Some(public_key);
            account.balance = g.balance;
            account.delegate = g
                .username
                .as_ref()
                .map(|name| DelegateInfo::new(name.clone(), self.height));
            out.push(account);
        }
        Ok(out)
    }

    /// Seed an in-memory store with the genesis accounts and chain context.
    pub fn build_store(&self) -> Result<MemoryStore, ConfigError> {
        let mut store = MemoryStore::new(ChainContext::new(self.chain_id()?, self.height));
        let accounts = self.genesis_accounts()?;
        let delegates: Vec<(Address, String)> = accounts
            .iter()
            .filter_map(|a| Some((a.address, a.username()?.to_string())))
            .collect();
        for account in accounts {
            store.set_account(account);
        }
        for (address, username) in delegates {
            registry_insert(&mut store, address, &username)
                .map_err(|e| ConfigError::Registry(e.to_string()))?;
        }
        Ok(store)
    }
}

fn parse_public_key(hex_str: &str) -> Option<PublicKey> {
    <[u8; 32]>::from_hex(hex_str).ok()
}
