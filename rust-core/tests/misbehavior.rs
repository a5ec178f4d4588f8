mod common;

use common::{account, fund, signed, signer, store_at, Signer, CHAIN_ID, LSK};
use dpos_core::bft::types::BlockHeader;
use dpos_core::{
    DelegateRegistration, ErrorKind, ProofOfMisbehavior, ProtocolConfig, ResponseStatus, Unlock,
    Vote, VoteItem,
};

fn signed_header(
    generator: &Signer,
    height: u32,
    prevoted: u32,
    forged: u32,
    timestamp: u32,
) -> BlockHeader {
    let mut header = BlockHeader::new(height, generator.public_key);
    header.max_height_prevoted = prevoted;
    header.max_height_previously_forged = forged;
    header.timestamp = timestamp;
    header.sign(CHAIN_ID, &generator.secret).expect("sign header");
    header
}

#[test]
fn proven_double_forging_punishes_voters_until_window_passes() {
    let config = ProtocolConfig::default();
    let mut store = store_at(5_000);
    let (delegate, voter, reporter) = (signer(10), signer(11), signer(12));
    for who in [&delegate, &voter, &reporter] {
        fund(&mut store, who, 1_000 * LSK);
    }
    let reg = signed(&delegate, 0, DelegateRegistration { username: "forger".into() }, &config);
    assert!(reg.apply(&mut store, &config).expect("register").is_ok());

    let stake: i64 = 1_000_000_000;
    let stake_on = |amount| Vote {
        votes: vec![VoteItem {
            delegate_address: delegate.address,
            amount,
        }],
    };
    let up = signed(&voter, 0, stake_on(stake), &config);
    assert!(up.apply(&mut store, &config).expect("vote").is_ok());
    let down = signed(&voter, 1, stake_on(-stake), &config);
    assert!(down.apply(&mut store, &config).expect("unvote").is_ok());
    let entry = account(&store, &voter.address).unlocking[0];

    let pom = ProofOfMisbehavior {
        header1: signed_header(&delegate, 4_990, 4_980, 4_985, 100),
        header2: signed_header(&delegate, 4_990, 4_980, 4_985, 101),
    };
    let report = signed(&reporter, 0, pom, &config);
    assert!(report.validate(&config).is_ok());
    let response = report.apply(&mut store, &config).expect("report");
    assert_eq!(response.status, ResponseStatus::Ok, "{:?}", response.errors);
    let info = account(&store, &delegate.address).delegate.expect("delegate");
    assert_eq!(info.pom_heights, vec![5_001]);
    assert!(!info.is_banned);

    // The voter's waiting period is over, but the delegate is under punishment.
    store.set_last_block_height(5_001 + config.vote_wait_blocks);
    let unlock = signed(&voter, 2, Unlock { unlock_objects: vec![entry] }, &config);
    let blocked = unlock.apply(&mut store.clone(), &config).expect("unlock");
    assert!(blocked.has_error_kind(ErrorKind::Asset));

    store.set_last_block_height(5_001 + config.voter_punish_blocks);
    let response = unlock.apply(&mut store, &config).expect("unlock");
    assert!(response.is_ok(), "{:?}", response.errors);
}

#[test]
fn non_contradicting_headers_are_rejected() {
    let config = ProtocolConfig::default();
    let mut store = store_at(200);
    let (delegate, reporter) = (signer(10), signer(12));
    fund(&mut store, &delegate, 100 * LSK);
    fund(&mut store, &reporter, 100 * LSK);

    let pom = ProofOfMisbehavior {
        header1: signed_header(&delegate, 100, 50, 200, 1),
        header2: signed_header(&delegate, 120, 50, 200, 2),
    };
    let report = signed(&reporter, 0, pom, &config);
    let response = report.validate(&config);
    assert_eq!(response.status, ResponseStatus::Fail);
    assert!(response.has_error_kind(ErrorKind::Asset));
}

#[test]
fn report_against_non_delegate_fails_and_undo_reverts_punishment() {
    let config = ProtocolConfig::default();
    let mut store = store_at(300);
    let (delegate, reporter) = (signer(10), signer(12));
    fund(&mut store, &delegate, 100 * LSK);
    fund(&mut store, &reporter, 100 * LSK);

    let pom = ProofOfMisbehavior {
        header1: signed_header(&delegate, 290, 280, 285, 1),
        header2: signed_header(&delegate, 290, 280, 285, 2),
    };
    let early = signed(&reporter, 0, pom.clone(), &config);
    let response = early.apply(&mut store.clone(), &config).expect("report");
    assert!(response.has_error_kind(ErrorKind::Asset));

    let reg = signed(&delegate, 0, DelegateRegistration { username: "later".into() }, &config);
    assert!(reg.apply(&mut store, &config).expect("register").is_ok());
    let before = store.clone();
    let report = signed(&reporter, 0, pom, &config);
    assert!(report.apply(&mut store, &config).expect("report").is_ok());
    assert!(report.undo(&mut store, &config).expect("undo").is_ok());
    assert_eq!(store, before);
}
