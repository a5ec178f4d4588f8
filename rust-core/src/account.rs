// Account state as seen by the transaction engine.
//
// Accounts are plain values: commands fetch one from the store, change it and
// write it back. Nothing holds a reference into the store across calls.

use crate::types::{Address, Height, PublicKey};
use serde::{Deserialize, Serialize};

/// Multisignature key set. The default (empty) value means an ordinary
/// single-signature account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisignatureKeys {
    pub number_of_signatures: u32,
    pub mandatory_keys: Vec<PublicKey>,
    pub optional_keys: Vec<PublicKey>,
}

impl MultisignatureKeys {
    pub fn is_empty(&self) -> bool {
        self.number_of_signatures == 0
            && self.mandatory_keys.is_empty()
            && self.optional_keys.is_empty()
    }

    /// Signature slot order: sorted mandatory keys followed by sorted optional keys.
    pub fn ordered_keys(&self) -> Vec<PublicKey> {
        let mut mandatory = self.mandatory_keys.clone();
        mandatory.sort();
        let mut optional = self.optional_keys.clone();
        optional.sort();
        mandatory.into_iter().chain(optional).collect()
    }

    pub fn total_keys(&self) -> usize {
        self.mandatory_keys.len() + self.optional_keys.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateInfo {
    pub username: String,
    pub registered_height: Height,
    pub total_votes_received: u64,
    /// Heights at which misbehavior of this delegate was proven.
    pub pom_heights: Vec<Height>,
    pub is_banned: bool,
}

impl DelegateInfo {
    pub fn new(username: String, registered_height: Height) -> Self {
        Self {
            username,
            registered_height,
            total_votes_received: 0,
            pom_heights: Vec::new(),
            is_banned: false,
        }
    }

    pub fn last_pom_height(&self) -> Option<Height> {
        self.pom_heights.iter().copied().max()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEntry {
    pub delegate_address: Address,
    pub amount: u64,
}

/// Field order defines the sort order of `Account::unlocking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnlockingEntry {
    pub delegate_address: Address,
    pub unvote_height: Height,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    /// Adopted on the first transaction sent from this address, immutable afterwards.
    pub public_key: Option<PublicKey>,
    pub balance: u64,
    pub nonce: u64,
    #[serde(default)]
    pub keys: MultisignatureKeys,
    #[serde(default)]
    pub delegate: Option<DelegateInfo>,
    /// Sorted by delegate address, unique addresses.
    #[serde(default)]
    pub votes: Vec<VoteEntry>,
    #[serde(default)]
    pub unlocking: Vec<UnlockingEntry>,
}

impl Account {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            public_key: None,
            balance: 0,
            nonce: 0,
            keys: MultisignatureKeys::default(),
            delegate: None,
            votes: Vec::new(),
            unlocking: Vec::new(),
        }
    }

    pub fn is_multisignature(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn is_delegate(&self) -> bool {
        self.delegate.is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.delegate.as_ref().map(|d| d.username.as_str())
    }

    pub fn vote_index(&self, delegate_address: &Address) -> Option<usize> {
        self.votes.iter().position(|v| &v.delegate_address == delegate_address)
    }

    pub fn sort_votes(&mut self) {
        self.votes.sort_by(|a, b| a.delegate_address.cmp(&b.delegate_address));
    }

    pub fn sort_unlocking(&mut self) {
        self.unlocking.sort();
    }

    pub fn unlocking_index(&self, entry: &UnlockingEntry) -> Option<usize> {
        self.unlocking.iter().position(|u| u == entry)
    }
}
