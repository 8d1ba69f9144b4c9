//! Thread-safe front door to the ledger.
//!
//! [`Bookie`] owns a [`LedgerState`] behind a single lock and a [`Clock`]
//! for the operations that need the current time. Each call holds the lock
//! for its whole duration, so callers never observe a half-applied
//! transition.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::ledger::{
    AccountId, Amount, Bet, BetId, BetState, Decision, LedgerError, LedgerSnapshot, LedgerState,
};

#[derive(Clone)]
pub struct Bookie {
    state: Arc<Mutex<LedgerState>>,
    clock: Arc<dyn Clock>,
}

/// Terms of a new bet, as submitted by the proposer.
#[derive(Clone, Debug)]
pub struct Proposal {
    pub counterparty: AccountId,
    pub judge: AccountId,
    pub proposer_stake: Amount,
    pub counterparty_stake: Amount,
    pub description: String,
    pub timeout: u64,
}

impl Bookie {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::from_state(LedgerState::new(), clock)
    }

    pub fn from_state(state: LedgerState, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            clock,
        }
    }

    pub fn mint(&self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let result = self.state.lock().mint(account, amount);
        log_outcome("mint", None, &result);
        result
    }

    pub fn balance(&self, account: &AccountId) -> Amount {
        self.state.lock().balance(account)
    }

    pub fn propose(&self, proposer: &AccountId, proposal: Proposal) -> Result<BetId, LedgerError> {
        let mut state = self.state.lock();
        let now = self.clock.now();
        let result = state.propose(
            proposer,
            &proposal.counterparty,
            &proposal.judge,
            proposal.proposer_stake,
            proposal.counterparty_stake,
            proposal.description,
            proposal.timeout,
            now,
        );
        if let Ok(id) = result {
            info!(bet = id, %proposer, counterparty = %proposal.counterparty, "bet proposed");
        }
        log_outcome("propose", None, &result);
        result
    }

    pub fn accept(&self, id: BetId, caller: &AccountId) -> Result<(), LedgerError> {
        let result = self.state.lock().accept(id, caller);
        log_outcome("accept", Some(id), &result);
        result
    }

    pub fn decline(&self, id: BetId, caller: &AccountId) -> Result<(), LedgerError> {
        let result = self.state.lock().decline(id, caller);
        log_outcome("decline", Some(id), &result);
        result
    }

    pub fn adjudicate(
        &self,
        id: BetId,
        caller: &AccountId,
        decision: impl Into<Decision>,
    ) -> Result<(), LedgerError> {
        let decision = decision.into();
        let result = self.state.lock().adjudicate(id, caller, decision);
        if result.is_ok() {
            info!(bet = id, decision = decision.code(), "bet adjudicated");
        }
        log_outcome("adjudicate", Some(id), &result);
        result
    }

    pub fn reclaim_after_timeout(&self, id: BetId, caller: &AccountId) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        let now = self.clock.now();
        let result = state.reclaim_after_timeout(id, caller, now);
        log_outcome("reclaim", Some(id), &result);
        result
    }

    pub fn bet(&self, id: BetId) -> Result<Bet, LedgerError> {
        self.state.lock().bet(id).cloned()
    }

    pub fn state(&self, id: BetId) -> Result<BetState, LedgerError> {
        self.state.lock().state(id)
    }

    pub fn largest_id(&self) -> BetId {
        self.state.lock().largest_id()
    }

    /// Runs `f` against a consistent view of the whole ledger.
    pub fn with_state<R>(&self, f: impl FnOnce(&LedgerState) -> R) -> R {
        f(&self.state.lock())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.state.lock().snapshot()
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }
}

fn log_outcome<T>(op: &'static str, bet: Option<BetId>, result: &Result<T, LedgerError>) {
    if let Err(err) = result {
        match err {
            LedgerError::ArithmeticOverflow | LedgerError::InvariantViolation(_) => {
                warn!(op, ?bet, error = %err, "ledger operation aborted")
            }
            _ => warn!(op, ?bet, error = %err, "ledger operation rejected"),
        }
    }
}
