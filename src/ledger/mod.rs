use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

mod bet;
mod snapshot;

pub use bet::{Bet, BetState, Decision, Outcome};
pub use snapshot::{LedgerSnapshot, SnapshotMetadata};

pub type Amount = i64;
/// Ledger-wide sums (escrow, minted supply), wide enough that no single
/// account's activity can push them out of range.
pub type Total = i128;
pub type BetId = u64;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Party a guarded transition must be performed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Recipient,
    Judge,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Recipient => f.write_str("recipient"),
            Role::Judge => f.write_str("judge"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("A positive amount is needed to bet!")]
    InvalidAmount,
    #[error("A bet needs two different parties!")]
    SameParty,
    #[error("This bet is not in an accepting state!")]
    NotAcceptingState,
    #[error("This bet is not in a adjudicating state!")]
    NotAdjudicatingState,
    #[error("Only the {role} can {action} the bet!")]
    Unauthorized { role: Role, action: &'static str },
    #[error("It is too early to refund!")]
    TooEarly,
    #[error("bet {0} is already resolved")]
    AlreadyResolved(BetId),
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("unknown bet {0}")]
    NotFound(BetId),
    #[error("ledger invariant violated: {0}")]
    InvariantViolation(&'static str),
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Minted {
        to: AccountId,
        amount: Amount,
    },
    BetProposed {
        bet: BetId,
        proposer: AccountId,
        counterparty: AccountId,
    },
    BetAccepted {
        bet: BetId,
        counterparty: AccountId,
    },
    BetDeclined {
        bet: BetId,
        counterparty: AccountId,
    },
    Adjudicated {
        bet: BetId,
        decision: Decision,
    },
    BetWon {
        bet: BetId,
        winner: AccountId,
        payout: Amount,
    },
    BetRefunded {
        bet: BetId,
        proposer: AccountId,
        counterparty: AccountId,
    },
    AccountOverdrawn {
        account: AccountId,
        balance: Amount,
    },
}

/// The escrow ledger: balance table, bet table and the funds held between them.
///
/// Every operation validates and stages its effects before touching any
/// field, so a returned error leaves the state exactly as it was.
#[derive(Clone, Debug, Default)]
pub struct LedgerState {
    pub(crate) meta: SnapshotMetadata,
    pub(crate) balances: BTreeMap<AccountId, Amount>,
    pub(crate) bets: Vec<Bet>,
    pub(crate) escrowed: Total,
    pub(crate) minted: Total,
    pub(crate) events: Vec<LedgerEvent>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let minted = self
            .minted
            .checked_add(Total::from(amount))
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let staged = self.stage(&[(account, amount)])?;

        self.minted = minted;
        self.apply(staged);
        self.events.push(LedgerEvent::Minted {
            to: account.clone(),
            amount,
        });
        self.meta.height += 1;
        debug!(%account, amount, "minted");
        Ok(())
    }

    pub fn balance(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn propose(
        &mut self,
        proposer: &AccountId,
        counterparty: &AccountId,
        judge: &AccountId,
        proposer_stake: Amount,
        counterparty_stake: Amount,
        description: impl Into<String>,
        timeout: u64,
        now: u64,
    ) -> Result<BetId, LedgerError> {
        if proposer_stake <= 0 || counterparty_stake <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if proposer == counterparty {
            return Err(LedgerError::SameParty);
        }
        let deadline = now
            .checked_add(timeout)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        // Both stakes must fit in escrow together once the bet is accepted.
        proposer_stake
            .checked_add(counterparty_stake)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let escrowed = self
            .escrowed
            .checked_add(Total::from(proposer_stake))
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let staged = self.stage(&[(proposer, -proposer_stake)])?;

        let id = self.largest_id();
        self.bets.push(Bet {
            id,
            proposer: proposer.clone(),
            counterparty: counterparty.clone(),
            judge: judge.clone(),
            proposer_stake,
            counterparty_stake,
            description: description.into(),
            created_at: now,
            deadline,
            state: BetState::Proposed,
            outcome: None,
        });
        self.escrowed = escrowed;
        self.apply(staged);
        self.events.push(LedgerEvent::BetProposed {
            bet: id,
            proposer: proposer.clone(),
            counterparty: counterparty.clone(),
        });
        self.touch(now);
        debug!(bet = id, %proposer, %counterparty, %judge, deadline, "bet proposed");
        Ok(id)
    }

    pub fn accept(&mut self, id: BetId, caller: &AccountId) -> Result<(), LedgerError> {
        let bet = self.open_bet(id, BetState::Proposed, LedgerError::NotAcceptingState)?;
        if &bet.counterparty != caller {
            return Err(LedgerError::Unauthorized {
                role: Role::Recipient,
                action: "accept",
            });
        }
        let stake = bet.counterparty_stake;
        let escrowed = self
            .escrowed
            .checked_add(Total::from(stake))
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let staged = self.stage(&[(caller, -stake)])?;

        self.escrowed = escrowed;
        self.apply(staged);
        if let Some(bet) = self.lookup_mut(id) {
            bet.state = BetState::Accepted;
        }
        self.events.push(LedgerEvent::BetAccepted {
            bet: id,
            counterparty: caller.clone(),
        });
        self.meta.height += 1;
        debug!(bet = id, counterparty = %caller, "bet accepted");
        Ok(())
    }

    pub fn decline(&mut self, id: BetId, caller: &AccountId) -> Result<(), LedgerError> {
        let bet = self.open_bet(id, BetState::Proposed, LedgerError::NotAcceptingState)?;
        if &bet.counterparty != caller {
            return Err(LedgerError::Unauthorized {
                role: Role::Recipient,
                action: "decline",
            });
        }
        let proposer = bet.proposer.clone();
        let stake = bet.proposer_stake;
        let escrowed = self
            .escrowed
            .checked_sub(Total::from(stake))
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let staged = self.stage(&[(&proposer, stake)])?;

        self.escrowed = escrowed;
        self.apply(staged);
        self.resolve(id, Outcome::Declined);
        self.events.push(LedgerEvent::BetDeclined {
            bet: id,
            counterparty: caller.clone(),
        });
        self.meta.height += 1;
        debug!(bet = id, counterparty = %caller, "bet declined");
        Ok(())
    }

    pub fn adjudicate(
        &mut self,
        id: BetId,
        caller: &AccountId,
        decision: Decision,
    ) -> Result<(), LedgerError> {
        let decision = Decision::from_code(decision.code());
        let bet = self.open_bet(id, BetState::Accepted, LedgerError::NotAdjudicatingState)?;
        if &bet.judge != caller {
            return Err(LedgerError::Unauthorized {
                role: Role::Judge,
                action: "adjudicate",
            });
        }
        let proposer = bet.proposer.clone();
        let counterparty = bet.counterparty.clone();
        let (proposer_stake, counterparty_stake) = (bet.proposer_stake, bet.counterparty_stake);
        let pot = proposer_stake
            .checked_add(counterparty_stake)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let escrowed = self
            .escrowed
            .checked_sub(Total::from(pot))
            .ok_or(LedgerError::ArithmeticOverflow)?;

        let (winner, outcome) = match decision {
            Decision::ProposerWins => (Some(&proposer), Outcome::ProposerWon),
            Decision::CounterpartyWins => (Some(&counterparty), Outcome::CounterpartyWon),
            Decision::Undecided | Decision::Other(_) => (None, Outcome::Refunded),
        };
        let staged = match winner {
            Some(winner) => self.stage(&[(winner, pot)])?,
            None => self.stage(&[(&proposer, proposer_stake), (&counterparty, counterparty_stake)])?,
        };

        self.escrowed = escrowed;
        self.apply(staged);
        self.resolve(id, outcome);
        self.events.push(LedgerEvent::Adjudicated { bet: id, decision });
        match winner {
            Some(winner) => self.events.push(LedgerEvent::BetWon {
                bet: id,
                winner: winner.clone(),
                payout: pot,
            }),
            None => self.events.push(LedgerEvent::BetRefunded {
                bet: id,
                proposer: proposer.clone(),
                counterparty: counterparty.clone(),
            }),
        }
        self.meta.height += 1;
        debug!(bet = id, judge = %caller, decision = decision.code(), ?outcome, "bet adjudicated");
        Ok(())
    }

    /// Returns escrowed stakes to their owners once the deadline has passed.
    ///
    /// Anyone may trigger the refund; funds only ever flow back to the party
    /// that staked them.
    pub fn reclaim_after_timeout(
        &mut self,
        id: BetId,
        caller: &AccountId,
        now: u64,
    ) -> Result<(), LedgerError> {
        let bet = self.lookup(id).ok_or(LedgerError::TooEarly)?;
        if !bet.state.is_open() {
            return Err(LedgerError::AlreadyResolved(id));
        }
        if !bet.is_expired(now) {
            return Err(LedgerError::TooEarly);
        }
        let proposer = bet.proposer.clone();
        let counterparty = bet.counterparty.clone();
        let held = bet.escrowed().ok_or(LedgerError::ArithmeticOverflow)?;
        let mut refunds = vec![(&proposer, bet.proposer_stake)];
        if bet.state == BetState::Accepted {
            refunds.push((&counterparty, bet.counterparty_stake));
        }
        let escrowed = self
            .escrowed
            .checked_sub(Total::from(held))
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let staged = self.stage(&refunds)?;

        self.escrowed = escrowed;
        self.apply(staged);
        self.resolve(id, Outcome::TimedOut);
        self.events.push(LedgerEvent::BetRefunded {
            bet: id,
            proposer,
            counterparty,
        });
        self.touch(now);
        debug!(bet = id, %caller, refunded = held, "bet reclaimed after timeout");
        Ok(())
    }

    pub fn bet(&self, id: BetId) -> Result<&Bet, LedgerError> {
        self.lookup(id).ok_or(LedgerError::NotFound(id))
    }

    pub fn state(&self, id: BetId) -> Result<BetState, LedgerError> {
        self.bet(id).map(|bet| bet.state)
    }

    /// Number of bets ever created, which is also the next id to be assigned.
    pub fn largest_id(&self) -> BetId {
        self.bets.len() as BetId
    }

    pub fn bets(&self) -> &[Bet] {
        &self.bets
    }

    pub fn bets_for<'a>(&'a self, account: &'a AccountId) -> impl Iterator<Item = &'a Bet> + 'a {
        self.bets.iter().filter(move |bet| bet.involves(account))
    }

    pub fn open_bets(&self) -> impl Iterator<Item = &Bet> {
        self.bets.iter().filter(|bet| bet.state.is_open())
    }

    pub fn balances(&self) -> &BTreeMap<AccountId, Amount> {
        &self.balances
    }

    pub fn escrowed(&self) -> Total {
        self.escrowed
    }

    pub fn minted(&self) -> Total {
        self.minted
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn meta(&self) -> &SnapshotMetadata {
        &self.meta
    }

    pub fn check_invariants(&self) -> Result<(), LedgerError> {
        let mut held: Total = 0;
        for (idx, bet) in self.bets.iter().enumerate() {
            if bet.id != idx as BetId {
                return Err(LedgerError::InvariantViolation("SequentialIds"));
            }
            if bet.state.is_open() == bet.outcome.is_some() {
                return Err(LedgerError::InvariantViolation("OutcomeIffResolved"));
            }
            let amount = bet
                .escrowed()
                .ok_or(LedgerError::InvariantViolation("EscrowMatchesOpenStakes"))?;
            held = held
                .checked_add(Total::from(amount))
                .ok_or(LedgerError::InvariantViolation("EscrowMatchesOpenStakes"))?;
        }
        if held != self.escrowed {
            return Err(LedgerError::InvariantViolation("EscrowMatchesOpenStakes"));
        }

        let mut supply = self.escrowed;
        for balance in self.balances.values() {
            supply = supply
                .checked_add(Total::from(*balance))
                .ok_or(LedgerError::InvariantViolation("SupplyConserved"))?;
        }
        if supply != self.minted {
            return Err(LedgerError::InvariantViolation("SupplyConserved"));
        }
        Ok(())
    }

    fn open_bet(
        &self,
        id: BetId,
        expected: BetState,
        unavailable: LedgerError,
    ) -> Result<&Bet, LedgerError> {
        match self.lookup(id) {
            Some(bet) if bet.state == expected => Ok(bet),
            _ => Err(unavailable),
        }
    }

    // Ids beyond the platform's usize are unknown, never truncated.
    fn lookup(&self, id: BetId) -> Option<&Bet> {
        usize::try_from(id).ok().and_then(|idx| self.bets.get(idx))
    }

    fn lookup_mut(&mut self, id: BetId) -> Option<&mut Bet> {
        usize::try_from(id).ok().and_then(|idx| self.bets.get_mut(idx))
    }

    /// Computes resulting balances for a set of signed deltas without
    /// mutating anything. The same account may appear more than once.
    fn stage(
        &self,
        deltas: &[(&AccountId, Amount)],
    ) -> Result<Vec<(AccountId, Amount)>, LedgerError> {
        let mut staged: Vec<(AccountId, Amount)> = Vec::with_capacity(deltas.len());
        for (account, delta) in deltas {
            match staged.iter_mut().find(|(staged_account, _)| staged_account == *account) {
                Some((_, balance)) => {
                    *balance = balance
                        .checked_add(*delta)
                        .ok_or(LedgerError::ArithmeticOverflow)?;
                }
                None => {
                    let balance = self
                        .balance(account)
                        .checked_add(*delta)
                        .ok_or(LedgerError::ArithmeticOverflow)?;
                    staged.push(((*account).clone(), balance));
                }
            }
        }
        Ok(staged)
    }

    fn apply(&mut self, staged: Vec<(AccountId, Amount)>) {
        for (account, balance) in staged {
            if balance < 0 && self.balance(&account) >= 0 {
                warn!(%account, balance, "account overdrawn by escrow");
                self.events.push(LedgerEvent::AccountOverdrawn {
                    account: account.clone(),
                    balance,
                });
            }
            self.balances.insert(account, balance);
        }
    }

    fn resolve(&mut self, id: BetId, outcome: Outcome) {
        if let Some(bet) = self.lookup_mut(id) {
            bet.state = BetState::Resolved;
            bet.outcome = Some(outcome);
        }
    }

    fn touch(&mut self, now: u64) {
        self.meta.height += 1;
        self.meta.timestamp = self.meta.timestamp.max(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASELINE: Amount = 50;

    struct Parties {
        bettor1: AccountId,
        bettor2: AccountId,
        judge: AccountId,
        thief: AccountId,
    }

    fn seeded_ledger() -> (LedgerState, Parties) {
        let parties = Parties {
            bettor1: "bettor1".into(),
            bettor2: "bettor2".into(),
            judge: "judge".into(),
            thief: "thief".into(),
        };
        let mut ledger = LedgerState::new();
        for account in [&parties.bettor1, &parties.bettor2, &parties.judge, &parties.thief] {
            ledger.mint(account, BASELINE).unwrap();
        }
        (ledger, parties)
    }

    fn accepted_bet(stakes: (Amount, Amount)) -> (LedgerState, Parties, BetId) {
        let (mut ledger, p) = seeded_ledger();
        let id = ledger
            .propose(&p.bettor1, &p.bettor2, &p.judge, stakes.0, stakes.1, "Desc", 100, 0)
            .unwrap();
        ledger.accept(id, &p.bettor2).unwrap();
        (ledger, p, id)
    }

    #[test]
    fn mint_credits_exactly_the_amount() {
        let mut ledger = LedgerState::new();
        let alice = AccountId::from("alice");
        assert_eq!(ledger.balance(&alice), 0);
        ledger.mint(&alice, 50).unwrap();
        ledger.mint(&alice, 0).unwrap();
        assert_eq!(ledger.balance(&alice), 50);
        assert_eq!(ledger.minted(), 50);
        assert_eq!(ledger.mint(&alice, -1), Err(LedgerError::InvalidAmount));
    }

    #[test]
    fn mint_rejects_overflow_without_mutation() {
        let mut ledger = LedgerState::new();
        let alice = AccountId::from("alice");
        ledger.mint(&alice, Amount::MAX).unwrap();
        assert_eq!(ledger.mint(&alice, 1), Err(LedgerError::ArithmeticOverflow));
        assert_eq!(ledger.balance(&alice), Amount::MAX);
        assert_eq!(ledger.events().len(), 1);
    }

    #[test]
    fn mint_is_not_limited_by_other_accounts() {
        let mut ledger = LedgerState::new();
        let alice = AccountId::from("alice");
        let bob = AccountId::from("bob");
        ledger.mint(&alice, Amount::MAX).unwrap();
        ledger.mint(&bob, 1).unwrap();
        assert_eq!(ledger.balance(&bob), 1);
        assert_eq!(ledger.minted(), Total::from(Amount::MAX) + 1);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn proposer_wins_takes_the_pot() {
        let (mut ledger, p, id) = accepted_bet((50, 5));
        assert_eq!(ledger.state(id).unwrap().code(), 2);
        assert_eq!(ledger.balance(&p.bettor1), BASELINE - 50);
        assert_eq!(ledger.balance(&p.bettor2), BASELINE - 5);

        ledger.adjudicate(id, &p.judge, Decision::ProposerWins).unwrap();
        assert_eq!(ledger.state(id).unwrap().code(), 3);
        assert_eq!(ledger.balance(&p.bettor1), BASELINE + 5);
        assert_eq!(ledger.balance(&p.bettor2), BASELINE - 5);
        assert_eq!(ledger.bet(id).unwrap().outcome, Some(Outcome::ProposerWon));
        assert_eq!(ledger.escrowed(), 0);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn counterparty_wins_takes_the_pot() {
        let (mut ledger, p, id) = accepted_bet((50, 5));
        ledger
            .adjudicate(id, &p.judge, Decision::CounterpartyWins)
            .unwrap();
        assert_eq!(ledger.balance(&p.bettor1), BASELINE - 50);
        assert_eq!(ledger.balance(&p.bettor2), BASELINE + 50);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn undecided_and_unknown_decisions_refund() {
        for decision in [Decision::Undecided, Decision::from_code(42)] {
            let (mut ledger, p, id) = accepted_bet((50, 5));
            ledger.adjudicate(id, &p.judge, decision).unwrap();
            assert_eq!(ledger.state(id), Ok(BetState::Resolved));
            assert_eq!(ledger.bet(id).unwrap().outcome, Some(Outcome::Refunded));
            assert_eq!(ledger.balance(&p.bettor1), BASELINE);
            assert_eq!(ledger.balance(&p.bettor2), BASELINE);
            ledger.check_invariants().unwrap();
        }
    }

    #[test]
    fn coded_winner_pays_like_the_named_one() {
        let (mut ledger, p, id) = accepted_bet((50, 5));
        ledger.adjudicate(id, &p.judge, Decision::Other(1)).unwrap();
        assert_eq!(ledger.bet(id).unwrap().outcome, Some(Outcome::ProposerWon));
        assert_eq!(ledger.balance(&p.bettor1), BASELINE + 5);
        assert_eq!(ledger.balance(&p.bettor2), BASELINE - 5);
        assert!(ledger.events().contains(&LedgerEvent::Adjudicated {
            bet: id,
            decision: Decision::ProposerWins,
        }));
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn zero_stake_creates_no_bet() {
        let (mut ledger, p) = seeded_ledger();
        for stakes in [(0, 5), (5, 0), (-1, 5)] {
            let err = ledger
                .propose(&p.bettor1, &p.bettor2, &p.judge, stakes.0, stakes.1, "Desc", 10, 0)
                .unwrap_err();
            assert_eq!(err, LedgerError::InvalidAmount);
            assert_eq!(err.to_string(), "A positive amount is needed to bet!");
        }
        assert_eq!(ledger.largest_id(), 0);
        assert_eq!(ledger.balance(&p.bettor1), BASELINE);
    }

    #[test]
    fn proposer_cannot_bet_against_themselves() {
        let (mut ledger, p) = seeded_ledger();
        let err = ledger
            .propose(&p.bettor1, &p.bettor1, &p.judge, 5, 5, "Desc", 10, 0)
            .unwrap_err();
        assert_eq!(err, LedgerError::SameParty);
        assert_eq!(ledger.largest_id(), 0);
    }

    #[test]
    fn propose_may_overdraw_and_records_it() {
        let (mut ledger, p) = seeded_ledger();
        ledger
            .propose(&p.bettor1, &p.bettor2, &p.judge, 80, 5, "Desc", 10, 0)
            .unwrap();
        assert_eq!(ledger.balance(&p.bettor1), BASELINE - 80);
        assert!(ledger.events().iter().any(|event| matches!(
            event,
            LedgerEvent::AccountOverdrawn { balance: -30, .. }
        )));
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn thief_cannot_accept() {
        let (mut ledger, p) = seeded_ledger();
        let id = ledger
            .propose(&p.bettor1, &p.bettor2, &p.judge, 50, 50, "Desc", 10, 0)
            .unwrap();
        for caller in [&p.thief, &p.bettor1, &p.judge] {
            let err = ledger.accept(id, caller).unwrap_err();
            assert_eq!(err.to_string(), "Only the recipient can accept the bet!");
        }
        assert_eq!(ledger.state(id), Ok(BetState::Proposed));
        assert_eq!(ledger.balance(&p.bettor2), BASELINE);
    }

    #[test]
    fn thief_cannot_adjudicate() {
        let (mut ledger, p, id) = accepted_bet((50, 50));
        for caller in [&p.thief, &p.bettor1, &p.bettor2] {
            let err = ledger.adjudicate(id, caller, Decision::Undecided).unwrap_err();
            assert_eq!(err.to_string(), "Only the judge can adjudicate the bet!");
        }
        assert_eq!(ledger.state(id), Ok(BetState::Accepted));
        assert_eq!(ledger.balance(&p.bettor1), 0);
        assert_eq!(ledger.balance(&p.bettor2), 0);
    }

    #[test]
    fn adjudication_requires_acceptance() {
        let (mut ledger, p) = seeded_ledger();
        let id = ledger
            .propose(&p.bettor1, &p.bettor2, &p.judge, 50, 50, "Desc", 10, 0)
            .unwrap();
        let err = ledger.adjudicate(id, &p.judge, Decision::Undecided).unwrap_err();
        assert_eq!(err, LedgerError::NotAdjudicatingState);
        assert_eq!(err.to_string(), "This bet is not in a adjudicating state!");
    }

    #[test]
    fn missing_bets_look_like_wrong_state() {
        let (mut ledger, p) = seeded_ledger();
        assert_eq!(
            ledger.adjudicate(100, &p.judge, Decision::Undecided),
            Err(LedgerError::NotAdjudicatingState)
        );
        let err = ledger.accept(100, &p.bettor2).unwrap_err();
        assert_eq!(err.to_string(), "This bet is not in an accepting state!");
        assert_eq!(ledger.decline(100, &p.bettor2), Err(LedgerError::NotAcceptingState));
        assert_eq!(ledger.bet(100).unwrap_err(), LedgerError::NotFound(100));
        assert_eq!(ledger.state(100), Err(LedgerError::NotFound(100)));
    }

    #[test]
    fn ids_past_the_table_never_reach_an_existing_bet() {
        let (mut ledger, p) = seeded_ledger();
        let id = ledger
            .propose(&p.bettor1, &p.bettor2, &p.judge, 20, 10, "Desc", 10, 0)
            .unwrap();
        let before = ledger.state_root();
        for far in [1u64 << 32, (1u64 << 32) + id, u64::MAX] {
            assert_eq!(ledger.accept(far, &p.bettor2), Err(LedgerError::NotAcceptingState));
            assert_eq!(ledger.decline(far, &p.bettor2), Err(LedgerError::NotAcceptingState));
            assert_eq!(
                ledger.adjudicate(far, &p.judge, Decision::ProposerWins),
                Err(LedgerError::NotAdjudicatingState)
            );
            assert_eq!(
                ledger.reclaim_after_timeout(far, &p.bettor1, u64::MAX),
                Err(LedgerError::TooEarly)
            );
            assert_eq!(ledger.state(far), Err(LedgerError::NotFound(far)));
        }
        assert_eq!(ledger.state(id), Ok(BetState::Proposed));
        assert_eq!(ledger.state_root(), before);
    }

    #[test]
    fn decline_refunds_proposer() {
        let (mut ledger, p) = seeded_ledger();
        let id = ledger
            .propose(&p.bettor1, &p.bettor2, &p.judge, 20, 10, "Desc", 10, 0)
            .unwrap();
        assert_eq!(
            ledger.decline(id, &p.thief).unwrap_err().to_string(),
            "Only the recipient can decline the bet!"
        );
        ledger.decline(id, &p.bettor2).unwrap();
        assert_eq!(ledger.state(id), Ok(BetState::Resolved));
        assert_eq!(ledger.bet(id).unwrap().outcome, Some(Outcome::Declined));
        assert_eq!(ledger.balance(&p.bettor1), BASELINE);
        assert_eq!(ledger.balance(&p.bettor2), BASELINE);
        assert_eq!(ledger.escrowed(), 0);
    }

    #[test]
    fn replayed_transitions_never_transfer_twice() {
        let (mut ledger, p, id) = accepted_bet((20, 10));
        ledger.adjudicate(id, &p.judge, Decision::ProposerWins).unwrap();
        let before = ledger.balances().clone();

        assert_eq!(ledger.accept(id, &p.bettor2), Err(LedgerError::NotAcceptingState));
        assert_eq!(ledger.decline(id, &p.bettor2), Err(LedgerError::NotAcceptingState));
        assert_eq!(
            ledger.adjudicate(id, &p.judge, Decision::CounterpartyWins),
            Err(LedgerError::NotAdjudicatingState)
        );
        assert_eq!(
            ledger.reclaim_after_timeout(id, &p.bettor1, u64::MAX),
            Err(LedgerError::AlreadyResolved(id))
        );
        assert_eq!(ledger.balances(), &before);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn reclaim_waits_for_deadline() {
        let (mut ledger, p) = seeded_ledger();
        let id = ledger
            .propose(&p.bettor1, &p.bettor2, &p.judge, 20, 10, "Desc", 100, 1_000)
            .unwrap();
        assert_eq!(ledger.bet(id).unwrap().deadline, 1_100);
        let err = ledger.reclaim_after_timeout(id, &p.bettor1, 1_099).unwrap_err();
        assert_eq!(err.to_string(), "It is too early to refund!");
        assert_eq!(ledger.state(id), Ok(BetState::Proposed));

        ledger.reclaim_after_timeout(id, &p.bettor1, 1_100).unwrap();
        assert_eq!(ledger.bet(id).unwrap().outcome, Some(Outcome::TimedOut));
        assert_eq!(ledger.balance(&p.bettor1), BASELINE);
        assert_eq!(ledger.escrowed(), 0);
    }

    #[test]
    fn accepted_bet_cannot_be_reclaimed_early() {
        let (mut ledger, p, id) = accepted_bet((20, 10));
        let before = ledger.balances().clone();
        assert_eq!(
            ledger.reclaim_after_timeout(id, &p.bettor1, 99),
            Err(LedgerError::TooEarly)
        );
        assert_eq!(ledger.state(id), Ok(BetState::Accepted));
        assert_eq!(ledger.balances(), &before);
        assert_eq!(ledger.escrowed(), 30);
    }

    #[test]
    fn reclaim_refunds_both_stakes_of_accepted_bet() {
        let (mut ledger, p, id) = accepted_bet((20, 10));
        ledger.reclaim_after_timeout(id, &p.thief, 100).unwrap();
        assert_eq!(ledger.balance(&p.bettor1), BASELINE);
        assert_eq!(ledger.balance(&p.bettor2), BASELINE);
        assert_eq!(ledger.balance(&p.thief), BASELINE);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn reclaim_of_unknown_bet_is_too_early() {
        let (mut ledger, p) = seeded_ledger();
        assert_eq!(
            ledger.reclaim_after_timeout(7, &p.bettor1, u64::MAX),
            Err(LedgerError::TooEarly)
        );
    }

    #[test]
    fn deadline_overflow_is_rejected() {
        let (mut ledger, p) = seeded_ledger();
        let err = ledger
            .propose(&p.bettor1, &p.bettor2, &p.judge, 1, 1, "Desc", u64::MAX, 1)
            .unwrap_err();
        assert_eq!(err, LedgerError::ArithmeticOverflow);
        assert_eq!(ledger.largest_id(), 0);
    }

    #[test]
    fn pot_overflow_creates_no_bet() {
        let (mut ledger, p) = seeded_ledger();
        assert_eq!(
            ledger.propose(&p.bettor1, &p.bettor2, &p.judge, Amount::MAX, 1, "Desc", 10, 0),
            Err(LedgerError::ArithmeticOverflow)
        );
        assert_eq!(ledger.largest_id(), 0);
        assert_eq!(ledger.balance(&p.bettor1), BASELINE);
        assert_eq!(ledger.escrowed(), 0);
    }

    #[test]
    fn stake_underflow_leaves_the_ledger_untouched() {
        let (mut ledger, p) = seeded_ledger();
        // Overdraw bettor1 to within 52 of the floor.
        ledger
            .propose(&p.bettor1, &p.thief, &p.judge, Amount::MAX - 1, 1, "deep", 10, 0)
            .unwrap();
        assert_eq!(ledger.balance(&p.bettor1), Amount::MIN + 52);
        let pending = ledger
            .propose(&p.bettor2, &p.bettor1, &p.judge, 5, 100, "Desc", 10, 0)
            .unwrap();
        let before = ledger.state_root();

        assert_eq!(
            ledger.propose(&p.bettor1, &p.bettor2, &p.judge, 100, 1, "Desc", 10, 0),
            Err(LedgerError::ArithmeticOverflow)
        );
        assert_eq!(ledger.largest_id(), 2);

        assert_eq!(ledger.accept(pending, &p.bettor1), Err(LedgerError::ArithmeticOverflow));
        assert_eq!(ledger.state(pending), Ok(BetState::Proposed));

        assert_eq!(ledger.balance(&p.bettor1), Amount::MIN + 52);
        assert_eq!(ledger.state_root(), before);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn independent_bets_do_not_interfere() {
        let (mut ledger, p) = seeded_ledger();
        let first = ledger
            .propose(&p.bettor1, &p.bettor2, &p.judge, 10, 10, "first", 10, 0)
            .unwrap();
        let second = ledger
            .propose(&p.bettor2, &p.thief, &p.judge, 7, 3, "second", 10, 0)
            .unwrap();
        ledger.accept(first, &p.bettor2).unwrap();
        ledger.accept(second, &p.thief).unwrap();
        let second_before = ledger.bet(second).unwrap().clone();
        let thief_before = ledger.balance(&p.thief);

        ledger.adjudicate(first, &p.judge, Decision::ProposerWins).unwrap();
        assert_eq!(ledger.bet(second).unwrap(), &second_before);
        assert_eq!(ledger.balance(&p.thief), thief_before);
        assert_eq!(ledger.escrowed(), 10);
        assert_eq!(ledger.open_bets().count(), 1);
        assert_eq!(ledger.bets_for(&p.thief).count(), 1);
        assert_eq!(ledger.largest_id(), 2);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn events_follow_the_bet_lifecycle() {
        let (mut ledger, p, id) = accepted_bet((20, 10));
        ledger.adjudicate(id, &p.judge, Decision::CounterpartyWins).unwrap();
        let tail: Vec<_> = ledger.events().iter().skip(4).cloned().collect();
        assert_eq!(
            tail,
            vec![
                LedgerEvent::BetProposed {
                    bet: id,
                    proposer: p.bettor1.clone(),
                    counterparty: p.bettor2.clone(),
                },
                LedgerEvent::BetAccepted {
                    bet: id,
                    counterparty: p.bettor2.clone(),
                },
                LedgerEvent::Adjudicated {
                    bet: id,
                    decision: Decision::CounterpartyWins,
                },
                LedgerEvent::BetWon {
                    bet: id,
                    winner: p.bettor2.clone(),
                    payout: 30,
                },
            ]
        );
    }
}
