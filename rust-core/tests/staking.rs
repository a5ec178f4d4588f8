mod common;

use common::{account, fund, signed, signer, store_at, Signer, LSK};
use dpos_core::types::Address;
use dpos_core::{
    BlockProcessor, DelegateRegistration, ErrorKind, MemoryStore, ProcessError, ProtocolConfig,
    Unlock, UnlockingEntry, Vote, VoteItem,
};

const UNIT: i64 = 1_000_000_000;

fn vote(delegate: Address, amount: i64) -> VoteItem {
    VoteItem {
        delegate_address: delegate,
        amount,
    }
}

/// Registers `count` delegates (seeds 100..) and funds `voter`.
fn chain_with_delegates(
    count: u8,
    voter: &Signer,
    config: &ProtocolConfig,
) -> (MemoryStore, Vec<Signer>) {
    let mut store = store_at(1_000);
    fund(&mut store, voter, 1_000 * LSK);
    let delegates: Vec<Signer> = (0..count).map(|i| signer(100 + i)).collect();
    for (i, d) in delegates.iter().enumerate() {
        fund(&mut store, d, 100 * LSK);
        let reg = signed(d, 0, DelegateRegistration { username: format!("delegate_{i}") }, config);
        assert!(reg.apply(&mut store, config).expect("register").is_ok());
    }
    (store, delegates)
}

#[test]
fn vote_then_undo_restores_state_exactly() {
    let config = ProtocolConfig::default();
    let voter = signer(1);
    let (mut store, delegates) = chain_with_delegates(2, &voter, &config);

    let up = signed(
        &voter,
        0,
        Vote {
            votes: vec![vote(delegates[0].address, 3 * UNIT), vote(delegates[1].address, UNIT)],
        },
        &config,
    );
    assert!(up.apply(&mut store, &config).expect("apply").is_ok());

    let before = store.clone();
    let mixed = signed(
        &voter,
        1,
        Vote {
            votes: vec![vote(delegates[0].address, -2 * UNIT), vote(delegates[1].address, UNIT)],
        },
        &config,
    );
    assert!(mixed.apply(&mut store, &config).expect("apply").is_ok());
    let acc = account(&store, &voter.address);
    assert_eq!(acc.unlocking.len(), 1);
    let slot = acc.vote_index(&delegates[1].address).expect("vote");
    assert_eq!(acc.votes[slot].amount, 2 * UNIT as u64);

    assert!(mixed.undo(&mut store, &config).expect("undo").is_ok());
    assert_eq!(store, before);
}

#[test]
fn active_vote_cap_and_freeing_a_slot_in_the_same_block() {
    let config = ProtocolConfig::default();
    let voter = signer(1);
    let (mut store, delegates) = chain_with_delegates(12, &voter, &config);
    let processor = BlockProcessor::new(config.clone());

    let ten = signed(
        &voter,
        0,
        Vote {
            votes: delegates[..10].iter().map(|d| vote(d.address, UNIT)).collect(),
        },
        &config,
    );
    processor.apply_batch(&mut store, &[ten]).expect("ten votes");

    let single = |delegate: &Signer, amount: i64| Vote {
        votes: vec![vote(delegate.address, amount)],
    };
    let eleventh = signed(&voter, 1, single(&delegates[10], UNIT), &config);
    match processor.apply_batch(&mut store, &[eleventh]) {
        Err(ProcessError::Rejected { responses, .. }) => {
            assert!(responses[0].has_error_kind(ErrorKind::Asset));
        }
        other => panic!("expected cap violation, got {other:?}"),
    }

    let downvote = signed(&voter, 1, single(&delegates[0], -UNIT), &config);
    let upvote = signed(&voter, 2, single(&delegates[10], UNIT), &config);
    processor.apply_batch(&mut store, &[downvote, upvote]).expect("swap within block");
    let acc = account(&store, &voter.address);
    assert_eq!(acc.votes.len(), 10);
    assert!(acc.vote_index(&delegates[10].address).is_some());
    assert!(acc.vote_index(&delegates[0].address).is_none());
}

#[test]
fn unlock_becomes_available_exactly_after_waiting_period() {
    let config = ProtocolConfig::default();
    let voter = signer(1);
    let (mut store, delegates) = chain_with_delegates(1, &voter, &config);
    let target = delegates[0].address;

    let up = signed(&voter, 0, Vote { votes: vec![vote(target, 2 * UNIT)] }, &config);
    assert!(up.apply(&mut store, &config).expect("apply").is_ok());
    let down = signed(&voter, 1, Vote { votes: vec![vote(target, -2 * UNIT)] }, &config);
    assert!(down.apply(&mut store, &config).expect("apply").is_ok());

    let entry = account(&store, &voter.address).unlocking[0];
    assert_eq!(entry.unvote_height, 1_001);
    let balance_before = account(&store, &voter.address).balance;

    let unlock = signed(&voter, 2, Unlock { unlock_objects: vec![entry] }, &config);

    // Block 1_001 + 1_999: one block early.
    store.set_last_block_height(1_001 + config.vote_wait_blocks - 2);
    let early = unlock.apply(&mut store.clone(), &config).expect("apply");
    assert!(early.has_error_kind(ErrorKind::Asset));

    // Block 1_001 + 2_000: exactly the waiting period.
    store.set_last_block_height(1_001 + config.vote_wait_blocks - 1);
    let response = unlock.apply(&mut store, &config).expect("apply");
    assert!(response.is_ok(), "{:?}", response.errors);
    let acc = account(&store, &voter.address);
    assert!(acc.unlocking.is_empty());
    assert_eq!(acc.balance, balance_before + 2 * UNIT as u64 - unlock.fee);
}

#[test]
fn unlock_of_unknown_entry_fails() {
    let config = ProtocolConfig::default();
    let voter = signer(1);
    let (mut store, delegates) = chain_with_delegates(1, &voter, &config);
    let bogus = UnlockingEntry {
        delegate_address: delegates[0].address,
        unvote_height: 1,
        amount: UNIT as u64,
    };
    let unlock = signed(&voter, 0, Unlock { unlock_objects: vec![bogus] }, &config);
    let response = unlock.apply(&mut store, &config).expect("apply");
    assert!(response.has_error_kind(ErrorKind::Asset));
}

#[test]
fn downvote_beyond_stake_fails() {
    let config = ProtocolConfig::default();
    let voter = signer(1);
    let (mut store, delegates) = chain_with_delegates(1, &voter, &config);
    let target = delegates[0].address;
    let up = signed(&voter, 0, Vote { votes: vec![vote(target, UNIT)] }, &config);
    assert!(up.apply(&mut store, &config).expect("apply").is_ok());
    let down = signed(&voter, 1, Vote { votes: vec![vote(target, -2 * UNIT)] }, &config);
    let response = down.apply(&mut store, &config).expect("apply");
    assert!(response.has_error_kind(ErrorKind::Asset));
}
