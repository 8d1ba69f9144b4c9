//! Escrow betting ledger.
//!
//! Two parties stake funds on an outcome and a third party, the judge,
//! decides who collects. The ledger holds both stakes until the bet is
//! adjudicated, declined or reclaimed after its deadline.
//!
//! The state machine, its events and snapshots live in [`ledger`].
//! [`service`] wraps it in a cloneable handle that serializes access and
//! reads time from a [`clock::Clock`]. [`store`] persists snapshots as JSON
//! and [`config`] holds settings for the `bookie` binary.

pub mod clock;
pub mod config;
pub mod ledger;
pub mod service;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::{AccountId, Amount, Bet, BetId, BetState, Decision, LedgerError, LedgerState};
pub use service::{Bookie, Proposal};
