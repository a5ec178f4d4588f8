#![allow(dead_code)]

use dpos_core::crypto::{address_from_public_key, public_key_from_secret};
use dpos_core::types::{Address, PublicKey};
use dpos_core::{
    Account, ChainContext, CommandParams, MemoryStore, ProtocolConfig, StateStore, Transaction,
};

pub const CHAIN_ID: &[u8] = &[0x00, 0x00, 0x00, 0x01];
pub const LSK: u64 = 100_000_000;

pub struct Signer {
    pub secret: Vec<u8>,
    pub public_key: PublicKey,
    pub address: Address,
}

pub fn signer(seed: u8) -> Signer {
    let secret = vec![seed; 32];
    let public_key = public_key_from_secret(&secret).expect("public key");
    Signer {
        address: address_from_public_key(&public_key),
        secret,
        public_key,
    }
}

pub fn store_at(last_block_height: u32) -> MemoryStore {
    MemoryStore::new(ChainContext::new(CHAIN_ID.to_vec(), last_block_height))
}

/// Account with a known public key, as if it had transacted before.
pub fn fund(store: &mut MemoryStore, who: &Signer, balance: u64) {
    let mut account = store.account_or_default(&who.address);
    account.public_key = Some(who.public_key);
    account.balance = balance;
    store.set_account(account);
}

pub fn account(store: &MemoryStore, address: &Address) -> Account {
    store.account(address).expect("account")
}

/// Transaction paying exactly the minimum fee, signed by `who`.
pub fn signed(
    who: &Signer,
    nonce: u64,
    params: impl Into<CommandParams>,
    config: &ProtocolConfig,
) -> Transaction {
    let mut tx = Transaction::new(nonce, 0, who.public_key, params);
    tx.fee = tx.compute_min_fee(config, 1);
    tx.sign(CHAIN_ID, &who.secret).expect("sign");
    tx
}
