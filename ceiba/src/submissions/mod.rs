//! Pending-transaction submission store.
//!
//! Tracks every locally-submitted transaction through its life as the chain
//! advances: submitted, accepted into the ledger, expired, resurrected by a
//! rollback, and finally pruned once the finality slot passes it. The store
//! is a pure value; all transitions live in [`primitives`] and the
//! higher-level intents in [`operations`].

pub mod operations;
pub mod primitives;

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// A discrete, totally ordered chain time coordinate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Slot(pub u64);

impl Slot {
    /// The slot before anything happened. Fresh stores start here.
    pub const MIN: Slot = Slot(0);
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The unique identifier of a transaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TxId(pub [u8; 32]);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Transaction payloads stored by a [`SubmissionStore`] only need to reveal
/// their identifier.
pub trait HasTxId {
    fn tx_id(&self) -> TxId;
}

/// Where a locally-known transaction currently stands. The status carries
/// its own slot coordinates; the store never duplicates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus<Tx> {
    /// Submitted and not yet observed on-chain. Dropped from this state
    /// only by acceptance, expiry or an explicit forget.
    InSubmission { expiring: Slot, tx: Tx },
    /// Observed in a block at `acceptance`. A rollback below the acceptance
    /// slot puts the transaction back in submission.
    InLedger {
        expiring: Slot,
        acceptance: Slot,
        tx: Tx,
    },
    /// The tip passed the expiry slot before the transaction made it into
    /// the ledger. A rollback below the expiry slot revives it.
    Expired { expiring: Slot, tx: Tx },
}

impl<Tx> TxStatus<Tx> {
    pub fn expiring(&self) -> Slot {
        match self {
            Self::InSubmission { expiring, .. }
            | Self::InLedger { expiring, .. }
            | Self::Expired { expiring, .. } => *expiring,
        }
    }

    pub fn tx(&self) -> &Tx {
        match self {
            Self::InSubmission { tx, .. }
            | Self::InLedger { tx, .. }
            | Self::Expired { tx, .. } => tx,
        }
    }
}

/// A violation found by [`SubmissionStore::check_invariant`]. Always a bug
/// in the caller or the store, never an expected runtime condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreInvariantViolation {
    /// `finality` is past `tip`.
    FinalityBeyondTip,
    /// An in-ledger transaction claims acceptance past the tip.
    AcceptanceBeyondTip(TxId),
    /// An in-ledger transaction claims acceptance past its own expiry.
    AcceptanceAfterExpiry(TxId),
    /// An expired transaction still had time left at the tip.
    ExpiryBeyondTip(TxId),
    /// An in-submission transaction should already have expired.
    ExpiryNotBeyondTip(TxId),
}

impl fmt::Display for StoreInvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::FinalityBeyondTip => write!(f, "finality slot is beyond the tip"),
            Self::AcceptanceBeyondTip(txid) => {
                write!(f, "transaction '{}' was accepted beyond the tip", txid)
            }
            Self::AcceptanceAfterExpiry(txid) => {
                write!(f, "transaction '{}' was accepted after its expiry", txid)
            }
            Self::ExpiryBeyondTip(txid) => {
                write!(f, "transaction '{}' expired before its expiry slot", txid)
            }
            Self::ExpiryNotBeyondTip(txid) => {
                write!(f, "transaction '{}' outlived its expiry slot", txid)
            }
        }
    }
}

/// The slot-indexed set of locally-submitted transactions for one wallet.
///
/// `finality <= tip` always holds. Mutation goes through
/// [`primitives::apply_primitive`] or [`operations::apply_operation`], both
/// of which consume the store and hand back a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionStore<Tx> {
    pub(crate) tip: Slot,
    pub(crate) finality: Slot,
    pub(crate) transactions: BTreeMap<TxId, TxStatus<Tx>>,
}

impl<Tx> Default for SubmissionStore<Tx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tx> SubmissionStore<Tx> {
    /// An empty store with both slot cursors at the minimum.
    pub fn new() -> SubmissionStore<Tx> {
        SubmissionStore {
            tip: Slot::MIN,
            finality: Slot::MIN,
            transactions: BTreeMap::new(),
        }
    }

    /// Rebuild a store from persisted parts. The caller is responsible for
    /// handing back what it previously read; `check_invariant` will catch a
    /// corrupted restore.
    pub fn from_parts(
        tip: Slot,
        finality: Slot,
        transactions: BTreeMap<TxId, TxStatus<Tx>>,
    ) -> SubmissionStore<Tx> {
        SubmissionStore {
            tip,
            finality,
            transactions,
        }
    }

    pub fn tip(&self) -> Slot {
        self.tip
    }

    pub fn finality(&self) -> Slot {
        self.finality
    }

    pub fn transactions(&self) -> &BTreeMap<TxId, TxStatus<Tx>> {
        &self.transactions
    }

    pub fn status(&self, txid: &TxId) -> Option<&TxStatus<Tx>> {
        self.transactions.get(txid)
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Check every store invariant, returning the first violation found.
    pub fn check_invariant(&self) -> Result<(), StoreInvariantViolation> {
        if self.finality > self.tip {
            return Err(StoreInvariantViolation::FinalityBeyondTip);
        }
        for (txid, status) in &self.transactions {
            match status {
                TxStatus::InSubmission { expiring, .. } => {
                    if *expiring <= self.tip {
                        return Err(StoreInvariantViolation::ExpiryNotBeyondTip(*txid));
                    }
                }
                TxStatus::InLedger {
                    expiring,
                    acceptance,
                    ..
                } => {
                    if *acceptance > self.tip {
                        return Err(StoreInvariantViolation::AcceptanceBeyondTip(*txid));
                    }
                    if *acceptance > *expiring {
                        return Err(StoreInvariantViolation::AcceptanceAfterExpiry(*txid));
                    }
                }
                TxStatus::Expired { expiring, .. } => {
                    if *expiring > self.tip {
                        return Err(StoreInvariantViolation::ExpiryBeyondTip(*txid));
                    }
                }
            }
        }
        Ok(())
    }
}
