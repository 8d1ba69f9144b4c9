use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{
    AccountId, Amount, Bet, BetId, LedgerError, LedgerEvent, LedgerState, Outcome, Total,
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    /// Number of successful mutating operations applied so far.
    pub height: u64,
    /// Latest caller-supplied time the ledger has observed.
    pub timestamp: u64,
}

/// Complete ledger state as one serializable unit.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: SnapshotMetadata,
    pub balances: BTreeMap<AccountId, Amount>,
    pub bets: Vec<Bet>,
    pub next_id: BetId,
    pub escrowed: Total,
    pub minted: Total,
    #[serde(default)]
    pub events: Vec<LedgerEvent>,
    #[serde(with = "hex_root")]
    pub state_root: [u8; 32],
}

impl LedgerState {
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            meta: self.meta.clone(),
            balances: self.balances.clone(),
            bets: self.bets.clone(),
            next_id: self.largest_id(),
            escrowed: self.escrowed,
            minted: self.minted,
            events: self.events.clone(),
            state_root: self.state_root(),
        }
    }

    pub fn state_root(&self) -> [u8; 32] {
        compute_state_root(&self.balances, &self.bets, self.escrowed, self.minted)
    }

    /// Rebuilds a ledger, rejecting snapshots whose root or accounting
    /// does not check out.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, LedgerError> {
        if BetId::try_from(snapshot.bets.len()).ok() != Some(snapshot.next_id) {
            return Err(LedgerError::CorruptSnapshot(format!(
                "next id {} does not match {} recorded bets",
                snapshot.next_id,
                snapshot.bets.len()
            )));
        }
        if let Some(bet) = snapshot
            .bets
            .iter()
            .find(|bet| bet.proposer == bet.counterparty)
        {
            return Err(LedgerError::CorruptSnapshot(format!(
                "bet {} has the same proposer and counterparty",
                bet.id
            )));
        }
        let state = LedgerState {
            meta: snapshot.meta,
            balances: snapshot.balances,
            bets: snapshot.bets,
            escrowed: snapshot.escrowed,
            minted: snapshot.minted,
            events: snapshot.events,
        };
        if state.state_root() != snapshot.state_root {
            return Err(LedgerError::CorruptSnapshot("state root mismatch".into()));
        }
        state
            .check_invariants()
            .map_err(|err| LedgerError::CorruptSnapshot(err.to_string()))?;
        Ok(state)
    }
}

fn compute_state_root(
    balances: &BTreeMap<AccountId, Amount>,
    bets: &[Bet],
    escrowed: Total,
    minted: Total,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::with_capacity(balances.len() + bets.len() + 1);
    for (account, balance) in balances {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hash_str(&mut hasher, account.as_str());
        hasher.update(balance.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for bet in bets {
        let mut hasher = Sha256::new();
        hasher.update(b"bet");
        hasher.update(bet.id.to_le_bytes());
        hash_str(&mut hasher, bet.proposer.as_str());
        hash_str(&mut hasher, bet.counterparty.as_str());
        hash_str(&mut hasher, bet.judge.as_str());
        hasher.update(bet.proposer_stake.to_le_bytes());
        hasher.update(bet.counterparty_stake.to_le_bytes());
        hash_str(&mut hasher, &bet.description);
        hasher.update(bet.created_at.to_le_bytes());
        hasher.update(bet.deadline.to_le_bytes());
        hasher.update([bet.state.code()]);
        hasher.update([outcome_tag(bet)]);
        leaves.push(hasher.finalize().into());
    }
    if leaves.is_empty() && escrowed == 0 && minted == 0 {
        return Sha256::digest(b"bookie-ledger-empty").into();
    }
    let mut hasher = Sha256::new();
    hasher.update(b"totals");
    hasher.update(escrowed.to_le_bytes());
    hasher.update(minted.to_le_bytes());
    leaves.push(hasher.finalize().into());
    build_merkle(leaves)
}

// Length prefix keeps adjacent variable-length fields unambiguous.
fn hash_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn outcome_tag(bet: &Bet) -> u8 {
    match bet.outcome {
        None => 0,
        Some(Outcome::Declined) => 1,
        Some(Outcome::ProposerWon) => 2,
        Some(Outcome::CounterpartyWon) => 3,
        Some(Outcome::Refunded) => 4,
        Some(Outcome::TimedOut) => 5,
    }
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity(leaves.len().div_ceil(2));
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

mod hex_root {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("state root must be 32 bytes"))
    }
}
