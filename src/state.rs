use crate::config::OrgRegistry;
use std::collections::BTreeMap;
use web3::types::U256;

/// The round fields reported by `getRoundInfo`, before the eligibility read
/// is folded in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSnapshot {
    pub round_id: u64,
    pub start_time: u64,
    pub min_end_time: u64,
    pub pool_balance: U256,
    pub reward: U256,
}

/// Local mirror of the ledger's round view. Pure data, replaced wholesale on
/// every successful refresh and never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundState {
    pub round_id: u64,
    pub start_time: u64,
    pub min_end_time: u64,
    pub pool_balance: U256,
    pub reward: U256,
    pub can_end: bool,
}

impl RoundState {
    pub fn from_reads(snap: RoundSnapshot, can_end: bool) -> Self {
        Self {
            round_id: snap.round_id,
            start_time: snap.start_time,
            min_end_time: snap.min_end_time,
            pool_balance: snap.pool_balance,
            reward: snap.reward,
            can_end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgStanding {
    pub rank: usize,
    pub id: u64,
    pub name: String,
    pub total_wei: U256,
}

/// Ranks the registry's orgs by donation total. Pure function of the inputs:
/// descending by wei amount, ties broken by ascending org id, amounts missing
/// from the totals map default to zero. Amounts are compared as integers,
/// never as formatted decimals.
pub fn compute_leaderboard(registry: &OrgRegistry, totals: &BTreeMap<u64, U256>) -> Vec<OrgStanding> {
    let mut board: Vec<OrgStanding> = registry
        .iter()
        .map(|(id, name)| OrgStanding {
            rank: 0,
            id,
            name: name.to_owned(),
            total_wei: totals.get(&id).copied().unwrap_or_default(),
        })
        .collect();
    board.sort_by(|a, b| b.total_wei.cmp(&a.total_wei).then(a.id.cmp(&b.id)));
    for (i, org) in board.iter_mut().enumerate() {
        org.rank = i + 1;
    }
    board
}

/// Display-only wei to ETH conversion, four decimals. Happens after all
/// sorting and comparison.
pub fn format_eth(wei: U256) -> String {
    let unit = U256::exp10(18);
    let whole = wei / unit;
    let frac = (wei % unit) / U256::exp10(14);
    format!("{}.{:04} ETH", whole, frac.as_u64())
}
