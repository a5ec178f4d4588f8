// Stake voting: upvotes lock balance behind a delegate, downvotes move stake
// into the sender's unlocking queue.

use super::{credit, Command, CommandContext, CommandResult};
use crate::account::{UnlockingEntry, VoteEntry};
use crate::codec::{CodecError, Reader, Writer};
use crate::error::{FatalError, TransactionError};
use crate::state::{CacheFilter, StateStore};
use crate::types::{to_hex, Address, MAX_TRANSACTION_AMOUNT};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteItem {
    pub delegate_address: Address,
    /// Positive upvotes, negative downvotes.
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub votes: Vec<VoteItem>,
}

impl Vote {
    /// Entries with their original index, ascending by amount so downvotes
    /// free capacity before upvotes consume it. Ties keep transaction order.
    fn processing_order(&self) -> Vec<(usize, VoteItem)> {
        let mut ordered: Vec<(usize, VoteItem)> = self.votes.iter().copied().enumerate().collect();
        ordered.sort_by_key(|(_, v)| v.amount);
        ordered
    }
}

impl Command for Vote {
    const TYPE: u32 = 13;

    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        for vote in &self.votes {
            let item = Writer::new()
                .write_bytes(1, &vote.delegate_address)
                .write_i64(2, vote.amount)
                .finish();
            w.write_object(1, &item);
        }
        w.finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let items = r.read_repeated_bytes(1)?;
        r.finish()?;
        let votes = items
            .into_iter()
            .map(|item| {
                let mut ir = Reader::new(item);
                let delegate_address = ir.read_fixed::<20>(1)?;
                let amount = ir.read_i64(2)?;
                ir.finish()?;
                Ok(VoteItem {
                    delegate_address,
                    amount,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(Self { votes })
    }

    fn validate(&self, ctx: &CommandContext<'_>) -> Vec<TransactionError> {
        let config = ctx.config;
        let mut errors = Vec::new();
        if self.votes.is_empty() || self.votes.len() > config.max_vote_entries {
            errors.push(
                TransactionError::schema(ctx.id, "/params/votes", "Number of votes out of range.")
                    .with_values(self.votes.len(), config.max_vote_entries),
            );
        }

        let mut seen = BTreeSet::new();
        for (i, vote) in self.votes.iter().enumerate() {
            if !seen.insert(vote.delegate_address) {
                errors.push(TransactionError::asset(
                    ctx.id,
                    format!("/params/votes/{i}/delegateAddress"),
                    "Delegate address must be unique.",
                ));
            }
            let magnitude = vote.amount.unsigned_abs();
            let path = format!("/params/votes/{i}/amount");
            if vote.amount == 0 {
                errors.push(TransactionError::asset(ctx.id, path, "Amount cannot be 0."));
            } else if magnitude > MAX_TRANSACTION_AMOUNT {
                errors.push(TransactionError::schema(ctx.id, path, "Amount is out of range."));
            } else if config.vote_unit == 0 || magnitude % config.vote_unit != 0 {
                errors.push(
                    TransactionError::asset(ctx.id, path, "Amount should be multiple of vote unit.")
                        .with_values(vote.amount, config.vote_unit),
                );
            }
        }

        let upvotes = self.votes.iter().filter(|v| v.amount > 0).count();
        let downvotes = self.votes.iter().filter(|v| v.amount < 0).count();
        if upvotes > config.max_upvotes_per_tx {
            errors.push(
                TransactionError::asset(ctx.id, "/params/votes", "Too many upvotes.")
                    .with_values(upvotes, config.max_upvotes_per_tx),
            );
        }
        if downvotes > config.max_downvotes_per_tx {
            errors.push(
                TransactionError::asset(ctx.id, "/params/votes", "Too many downvotes.")
                    .with_values(downvotes, config.max_downvotes_per_tx),
            );
        }
        errors
    }

    fn apply(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult {
        let config = ctx.config;
        let current_height = store.chain_context().current_height();
        let mut errors = Vec::new();

        for (i, vote) in self.processing_order() {
            let path = format!("/params/votes/{i}");
            let delegate = store.account_or_default(&vote.delegate_address);
            let Some(info) = delegate.delegate.as_ref() else {
                errors.push(TransactionError::asset(
                    ctx.id,
                    format!("{path}/delegateAddress"),
                    "Voted account is not a registered delegate.",
                ));
                continue;
            };
            let magnitude = vote.amount.unsigned_abs();
            let new_total = if vote.amount < 0 {
                info.total_votes_received.checked_sub(magnitude)
            } else {
                credit(info.total_votes_received, magnitude)
            };
            let Some(new_total) = new_total else {
                errors.push(TransactionError::asset(
                    ctx.id,
                    format!("{path}/amount"),
                    "Delegate vote total is out of range.",
                ));
                continue;
            };

            let mut sender = store.account(&ctx.sender_address)?;
            if vote.amount < 0 {
                let Some(idx) = sender.vote_index(&vote.delegate_address) else {
                    errors.push(TransactionError::asset(
                        ctx.id,
                        format!("{path}/delegateAddress"),
                        "Cannot cast downvote to delegate who is not upvoted.",
                    ));
                    continue;
                };
                if sender.votes[idx].amount < magnitude {
                    errors.push(
                        TransactionError::asset(
                            ctx.id,
                            format!("{path}/amount"),
                            "The downvote amount cannot be greater than upvoted amount.",
                        )
                        .with_values(magnitude, sender.votes[idx].amount),
                    );
                    continue;
                }
                if sender.unlocking.len() >= config.max_unlocking {
                    errors.push(
                        TransactionError::asset(
                            ctx.id,
                            format!("{path}/amount"),
                            "Too many pending unlocks.",
                        )
                        .with_values(sender.unlocking.len() + 1, config.max_unlocking),
                    );
                    continue;
                }
                sender.votes[idx].amount -= magnitude;
                if sender.votes[idx].amount == 0 {
                    sender.votes.remove(idx);
                }
                sender.unlocking.push(UnlockingEntry {
                    delegate_address: vote.delegate_address,
                    unvote_height: current_height,
                    amount: magnitude,
                });
                sender.sort_unlocking();
            } else {
                match sender.vote_index(&vote.delegate_address) {
                    Some(idx) => match credit(sender.votes[idx].amount, magnitude) {
                        Some(v) => sender.votes[idx].amount = v,
                        None => {
                            errors.push(TransactionError::asset(
                                ctx.id,
                                format!("{path}/amount"),
                                "Voted amount is out of range.",
                            ));
                            continue;
                        }
                    },
                    None => {
                        if sender.votes.len() >= config.max_active_votes {
                            errors.push(
                                TransactionError::asset(
                                    ctx.id,
                                    format!("{path}/delegateAddress"),
                                    "Account can only vote up to the active vote limit.",
                                )
                                .with_values(sender.votes.len() + 1, config.max_active_votes),
                            );
                            continue;
                        }
                        sender.votes.push(VoteEntry {
                            delegate_address: vote.delegate_address,
                            amount: magnitude,
                        });
                        sender.sort_votes();
                    }
                }
                let Some(remaining) = sender.balance.checked_sub(magnitude) else {
                    errors.push(
                        TransactionError::balance(
                            ctx.id,
                            format!("{path}/amount"),
                            "Account does not have enough balance to vote.",
                        )
                        .with_values(sender.balance, magnitude),
                    );
                    continue;
                };
                sender.balance = remaining;
            }
            store.set_account(sender);

            // Re-read: a self-vote just changed the delegate's own account.
            let mut delegate = store.account(&vote.delegate_address)?;
            if let Some(info) = delegate.delegate.as_mut() {
                info.total_votes_received = new_total;
            }
            store.set_account(delegate);
        }
        Ok(errors)
    }

    fn undo(&self, ctx: &CommandContext<'_>, store: &mut dyn StateStore) -> CommandResult {
        let current_height = store.chain_context().current_height();
        let mut errors = Vec::new();

        for (i, vote) in self.processing_order().into_iter().rev() {
            let magnitude = vote.amount.unsigned_abs();
            let mut sender = store.account(&ctx.sender_address)?;
            if vote.amount < 0 {
                let entry = UnlockingEntry {
                    delegate_address: vote.delegate_address,
                    unvote_height: current_height,
                    amount: magnitude,
                };
                let Some(u) = sender.unlocking_index(&entry) else {
                    return Err(FatalError::MissingUnlockingEntry {
                        delegate: to_hex(&vote.delegate_address),
                        amount: magnitude,
                        unvote_height: current_height,
                    });
                };
                sender.unlocking.remove(u);
                match sender.vote_index(&vote.delegate_address) {
                    Some(idx) => {
                        let entry = &mut sender.votes[idx];
                        entry.amount = entry.amount.saturating_add(magnitude);
                    }
                    None => {
                        sender.votes.push(VoteEntry {
                            delegate_address: vote.delegate_address,
                            amount: magnitude,
                        });
                        sender.sort_votes();
                    }
                }
            } else {
                let idx = sender
                    .vote_index(&vote.delegate_address)
                    .filter(|idx| sender.votes[*idx].amount >= magnitude)
                    .ok_or_else(|| FatalError::MissingVoteEntry(to_hex(&vote.delegate_address)))?;
                sender.votes[idx].amount -= magnitude;
                if sender.votes[idx].amount == 0 {
                    sender.votes.remove(idx);
                }
                match credit(sender.balance, magnitude) {
                    Some(b) => sender.balance = b,
                    None => errors.push(TransactionError::balance(
                        ctx.id,
                        format!("/params/votes/{i}/amount"),
                        "Balance would exceed the maximum amount.",
                    )),
                }
            }
            store.set_account(sender);

            let mut delegate = store.account(&vote.delegate_address)?;
            let info = delegate
                .delegate
                .as_mut()
                .ok_or_else(|| FatalError::MissingDelegate(to_hex(&vote.delegate_address)))?;
            info.total_votes_received = if vote.amount < 0 {
                info.total_votes_received.saturating_add(magnitude)
            } else {
                info.total_votes_received.saturating_sub(magnitude)
            };
            store.set_account(delegate);
        }
        Ok(errors)
    }

    fn cache_filters(&self) -> Vec<CacheFilter> {
        self.votes.iter().map(|v| CacheFilter::Address(v.delegate_address)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::{account, ctx, fund, key, make_delegate, store_at};
    use crate::config::ProtocolConfig;
    use crate::error::ErrorKind;

    const UNIT: i64 = 1_000_000_000;

    fn vote(addr: Address, amount: i64) -> VoteItem {
        VoteItem {
            delegate_address: addr,
            amount,
        }
    }

    #[test]
    fn upvote_then_downvote_moves_stake_to_unlocking() {
        let config = ProtocolConfig::default();
        let (_, pk, voter) = key(1);
        let mut store = store_at(50);
        fund(&mut store, voter, 5 * UNIT as u64);
        make_delegate(&mut store, [9u8; 20], "d9");
        let c = ctx(&config, pk);

        let up = Vote {
            votes: vec![vote([9u8; 20], 3 * UNIT)],
        };
        assert!(up.apply(&c, &mut store).expect("apply").is_empty());
        let acc = account(&store, &voter);
        assert_eq!(acc.balance, 2 * UNIT as u64);
        assert_eq!(acc.votes[0].amount, 3 * UNIT as u64);
        let d = account(&store, &[9u8; 20]).delegate.expect("delegate");
        assert_eq!(d.total_votes_received, 3 * UNIT as u64);

        let down = Vote {
            votes: vec![vote([9u8; 20], -UNIT)],
        };
        assert!(down.apply(&c, &mut store).expect("apply").is_empty());
        let acc = account(&store, &voter);
        assert_eq!(acc.votes[0].amount, 2 * UNIT as u64);
        assert_eq!(
            acc.unlocking,
            vec![UnlockingEntry {
                delegate_address: [9u8; 20],
                unvote_height: 51,
                amount: UNIT as u64
            }]
        );

        assert!(down.undo(&c, &mut store).expect("undo").is_empty());
        assert!(up.undo(&c, &mut store).expect("undo").is_empty());
        let acc = account(&store, &voter);
        assert_eq!(acc.balance, 5 * UNIT as u64);
        assert!(acc.votes.is_empty());
        assert!(acc.unlocking.is_empty());
        assert_eq!(
            account(&store, &[9u8; 20]).delegate.expect("delegate").total_votes_received,
            0
        );
    }

    #[test]
    fn self_vote_updates_own_delegate_record() {
        let config = ProtocolConfig::default();
        let (_, pk, addr) = key(2);
        let mut store = store_at(1);
        make_delegate(&mut store, addr, "me");
        fund(&mut store, addr, 2 * UNIT as u64);
        let v = Vote {
            votes: vec![vote(addr, UNIT)],
        };
        assert!(v.apply(&ctx(&config, pk), &mut store).expect("apply").is_empty());
        let acc = account(&store, &addr);
        assert_eq!(acc.balance, UNIT as u64);
        assert_eq!(acc.delegate.expect("delegate").total_votes_received, UNIT as u64);
    }

    #[test]
    fn unregistered_delegate_and_overdraw_are_rejected() {
        let config = ProtocolConfig::default();
        let (_, pk, voter) = key(3);
        let mut store = store_at(1);
        fund(&mut store, voter, UNIT as u64);
        make_delegate(&mut store, [5u8; 20], "d5");
        let v = Vote {
            votes: vec![vote([4u8; 20], UNIT), vote([5u8; 20], 2 * UNIT)],
        };
        let errors = v.apply(&ctx(&config, pk), &mut store).expect("apply");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].path, "/params/votes/0/delegateAddress");
        assert_eq!(errors[1].kind, ErrorKind::Balance);
        assert_eq!(account(&store, &voter).balance, UNIT as u64);
    }

    #[test]
    fn downvote_in_same_transaction_frees_a_slot() {
        let config = ProtocolConfig::default();
        let (_, pk, voter) = key(4);
        let mut store = store_at(1);
        fund(&mut store, voter, 20 * UNIT as u64);
        for d in 0..11u8 {
            make_delegate(&mut store, [d + 100; 20], &format!("d{d}"));
        }
        let c = ctx(&config, pk);
        let ten = Vote {
            votes: (0..10u8).map(|d| vote([d + 100; 20], UNIT)).collect(),
        };
        assert!(ten.apply(&c, &mut store).expect("apply").is_empty());

        let eleventh = Vote {
            votes: vec![vote([110u8; 20], UNIT)],
        };
        let errors = eleventh.apply(&c, &mut store).expect("apply");
        assert_eq!(errors.len(), 1);

        // Listed upvote first: processing order still runs the downvote first.
        let swap = Vote {
            votes: vec![vote([110u8; 20], UNIT), vote([100u8; 20], -UNIT)],
        };
        assert!(swap.apply(&c, &mut store).expect("apply").is_empty());
        assert_eq!(account(&store, &voter).votes.len(), 10);
    }

    #[test]
    fn validate_catches_bad_amounts_and_duplicates() {
        let config = ProtocolConfig::default();
        let (_, pk, _) = key(5);
        let v = Vote {
            votes: vec![vote([1u8; 20], 0), vote([1u8; 20], 5), vote([2u8; 20], i64::MIN)],
        };
        let errors = v.validate(&ctx(&config, pk));
        assert_eq!(errors.len(), 4);
        assert!(Vote { votes: vec![] }.validate(&ctx(&config, pk)).len() == 1);
    }

    #[test]
    fn downvote_beyond_unlocking_cap_is_rejected() {
        let config = ProtocolConfig::default();
        let (_, pk, voter) = key(7);
        let mut store = store_at(100);
        make_delegate(&mut store, [8u8; 20], "d8");
        let mut acc = store.account_or_default(&voter);
        acc.votes = vec![VoteEntry {
            delegate_address: [8u8; 20],
            amount: 5 * UNIT as u64,
        }];
        acc.unlocking = (0..config.max_unlocking as u32)
            .map(|h| UnlockingEntry {
                delegate_address: [8u8; 20],
                unvote_height: h + 1,
                amount: UNIT as u64,
            })
            .collect();
        store.set_account(acc);
        let mut d = account(&store, &[8u8; 20]);
        d.delegate.as_mut().expect("delegate").total_votes_received = 5 * UNIT as u64;
        store.set_account(d);

        let down = Vote {
            votes: vec![vote([8u8; 20], -UNIT)],
        };
        let errors = down.apply(&ctx(&config, pk), &mut store).expect("apply");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Too many pending unlocks.");
        let acc = account(&store, &voter);
        assert_eq!(acc.unlocking.len(), config.max_unlocking);
        assert_eq!(acc.votes[0].amount, 5 * UNIT as u64);
    }

    #[test]
    fn delegate_total_cannot_exceed_max_amount() {
        let config = ProtocolConfig::default();
        let (_, pk, voter) = key(8);
        let mut store = store_at(1);
        fund(&mut store, voter, 2 * UNIT as u64);
        make_delegate(&mut store, [6u8; 20], "d6");
        let mut d = account(&store, &[6u8; 20]);
        d.delegate.as_mut().expect("delegate").total_votes_received =
            MAX_TRANSACTION_AMOUNT - 10;
        store.set_account(d);

        let up = Vote {
            votes: vec![vote([6u8; 20], UNIT)],
        };
        let errors = up.apply(&ctx(&config, pk), &mut store).expect("apply");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Delegate vote total is out of range.");
        let acc = account(&store, &voter);
        assert_eq!(acc.balance, 2 * UNIT as u64);
        assert!(acc.votes.is_empty());
        assert_eq!(
            account(&store, &[6u8; 20]).delegate.expect("delegate").total_votes_received,
            MAX_TRANSACTION_AMOUNT - 10
        );
    }

    #[test]
    fn voted_amount_cannot_exceed_max_amount() {
        let config = ProtocolConfig::default();
        let (_, pk, voter) = key(9);
        let mut store = store_at(1);
        fund(&mut store, voter, 2 * UNIT as u64);
        make_delegate(&mut store, [2u8; 20], "d2");
        let mut acc = account(&store, &voter);
        acc.votes = vec![VoteEntry {
            delegate_address: [2u8; 20],
            amount: MAX_TRANSACTION_AMOUNT - 1,
        }];
        store.set_account(acc);

        let up = Vote {
            votes: vec![vote([2u8; 20], UNIT)],
        };
        let errors = up.apply(&ctx(&config, pk), &mut store).expect("apply");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Voted amount is out of range.");
        let acc = account(&store, &voter);
        assert_eq!(acc.balance, 2 * UNIT as u64);
        assert_eq!(acc.votes[0].amount, MAX_TRANSACTION_AMOUNT - 1);
    }

    #[test]
    fn undo_without_unlocking_entry_is_fatal() {
        let config = ProtocolConfig::default();
        let (_, pk, voter) = key(6);
        let mut store = store_at(1);
        fund(&mut store, voter, 0);
        make_delegate(&mut store, [3u8; 20], "d3");
        let down = Vote {
            votes: vec![vote([3u8; 20], -UNIT)],
        };
        assert!(matches!(
            down.undo(&ctx(&config, pk), &mut store),
            Err(FatalError::MissingUnlockingEntry { .. })
        ));
    }
}
