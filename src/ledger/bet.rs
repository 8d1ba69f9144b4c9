use std::fmt;

use serde::{Deserialize, Serialize};

use super::{AccountId, Amount, BetId};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BetState {
    Proposed,
    Accepted,
    Resolved,
}

impl BetState {
    /// Numeric state code as reported to external callers.
    pub fn code(self) -> u8 {
        match self {
            BetState::Proposed => 1,
            BetState::Accepted => 2,
            BetState::Resolved => 3,
        }
    }

    pub fn is_open(self) -> bool {
        !matches!(self, BetState::Resolved)
    }
}

impl fmt::Display for BetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BetState::Proposed => "proposed",
            BetState::Accepted => "accepted",
            BetState::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

/// A judge's ruling. Anything other than a named winner refunds both stakes.
///
/// On the wire a decision is its numeric code, so a known code always
/// decodes to its named variant.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "u64", into = "u64")]
pub enum Decision {
    Undecided,
    ProposerWins,
    CounterpartyWins,
    Other(u64),
}

impl Decision {
    pub fn from_code(code: u64) -> Self {
        match code {
            0 => Decision::Undecided,
            1 => Decision::ProposerWins,
            2 => Decision::CounterpartyWins,
            other => Decision::Other(other),
        }
    }

    pub fn code(self) -> u64 {
        match self {
            Decision::Undecided => 0,
            Decision::ProposerWins => 1,
            Decision::CounterpartyWins => 2,
            Decision::Other(code) => code,
        }
    }
}

impl From<u64> for Decision {
    fn from(code: u64) -> Self {
        Decision::from_code(code)
    }
}

impl From<Decision> for u64 {
    fn from(decision: Decision) -> Self {
        decision.code()
    }
}

/// How a resolved bet ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Declined,
    ProposerWon,
    CounterpartyWon,
    Refunded,
    TimedOut,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bet {
    pub id: BetId,
    pub proposer: AccountId,
    pub counterparty: AccountId,
    pub judge: AccountId,
    pub proposer_stake: Amount,
    pub counterparty_stake: Amount,
    pub description: String,
    pub created_at: u64,
    pub deadline: u64,
    pub state: BetState,
    #[serde(default)]
    pub outcome: Option<Outcome>,
}

impl Bet {
    /// Amount the ledger currently holds on behalf of this bet.
    pub fn escrowed(&self) -> Option<Amount> {
        match self.state {
            BetState::Proposed => Some(self.proposer_stake),
            BetState::Accepted => self.proposer_stake.checked_add(self.counterparty_stake),
            BetState::Resolved => Some(0),
        }
    }

    pub fn involves(&self, account: &AccountId) -> bool {
        &self.proposer == account || &self.counterparty == account || &self.judge == account
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.deadline
    }
}
