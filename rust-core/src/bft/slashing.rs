use crate::bft::types::BlockHeader;
use crate::types::Height;

/// Which BFT safety rule a pair of headers from one generator breaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Contradiction {
    /// Same prevote height, the earlier header is not lower.
    DoubleForging,
    /// The earlier header is above everything the later one claims to have forged.
    Disjointedness,
    /// The later header prevoted less than the earlier one.
    BranchSwitch,
}

/// Order a pair so the first one must have been forged first: by
/// `max_height_previously_forged`, then `max_height_prevoted`, then `height`.
pub fn forging_order<'a>(
    a: &'a BlockHeader,
    b: &'a BlockHeader,
) -> (&'a BlockHeader, &'a BlockHeader) {
    let key = |h: &BlockHeader| (h.max_height_previously_forged, h.max_height_prevoted, h.height);
    if key(a) > key(b) { (b, a) } else { (a, b) }
}

/// Returns the violated rule, or `None` when both headers could have been
/// forged legitimately. Identical ids or different generators never contradict.
pub fn contradiction(h1: &BlockHeader, h2: &BlockHeader) -> Option<Contradiction> {
    if h1.generator_public_key != h2.generator_public_key || h1.id() == h2.id() {
        return None;
    }
    let (b1, b2) = forging_order(h1, h2);

    // Order of checks matters.
    if b1.max_height_prevoted == b2.max_height_prevoted && b1.height >= b2.height {
        return Some(Contradiction::DoubleForging);
    }
    if b1.height > b2.max_height_previously_forged {
        return Some(Contradiction::Disjointedness);
    }
    if b1.max_height_prevoted > b2.max_height_prevoted {
        return Some(Contradiction::BranchSwitch);
    }
    None
}

pub fn are_headers_contradicting(h1: &BlockHeader, h2: &BlockHeader) -> bool {
    contradiction(h1, h2).is_some()
}

/// Blocks left before a time lock starting at `start_height` with length
/// `period` expires, seen from the block at `current_height`. Zero or negative
/// means the lock has expired.
pub fn remaining_blocks(period: Height, current_height: Height, start_height: Height) -> i64 {
    i64::from(period) - (i64::from(current_height) - i64::from(start_height))
}

/// True while the latest proven misbehavior still punishes stake behind the delegate.
pub fn is_punished(
    last_pom: Option<Height>,
    current_height: Height,
    punish_blocks: Height,
) -> bool {
    match last_pom {
        Some(last_pom) => remaining_blocks(punish_blocks, current_height, last_pom) > 0,
        None => false,
    }
}
