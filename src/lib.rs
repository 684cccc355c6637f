//! Client for the round-based on-chain donation leaderboard.
//!
//! The ledger (the deployed contract) is the system of record for rounds,
//! donation totals and the reward pool; this crate keeps a local view of it
//! convergent through periodic polling and drives the write operations
//! (donate, fund pool, start round, payout, withdraw) through tracked,
//! confirm-or-fail transactions.

pub mod config;
pub mod contract;
pub mod error;
pub mod state;
pub mod sync;
pub mod tracker;
pub mod utils;
