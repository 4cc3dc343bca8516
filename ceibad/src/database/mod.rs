//! Database interface for the Ceiba daemon.
//!
//! Records wallet metadata, the submission store and the chain checkpoints
//! used to bound rollbacks. Writes batched through `with_submissions` or
//! `rollback_to` happen inside a single journaled transaction: a reader
//! never observes a partially-applied batch.

pub mod sqlite;

use crate::database::sqlite::{SqliteConn, SqliteDb};

use std::sync;

use ceiba::submissions::{HasTxId, Slot, SubmissionStore, TxId};
use serde::{Deserialize, Serialize};

/// The transaction payload as the daemon stores it: the identifier plus the
/// opaque serialized body handed over at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTx {
    pub txid: TxId,
    pub body: Vec<u8>,
}

impl HasTxId for WalletTx {
    fn tx_id(&self) -> TxId {
        self.txid
    }
}

/// An opaque snapshot of wallet state at some slot, used to bound how far a
/// rollback can rewind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub slot: Slot,
    pub payload: Vec<u8>,
}

/// Information about the wallet.
///
/// All timestamps are the number of seconds since the UNIX epoch.
#[derive(Clone, Debug)]
pub struct Wallet {
    /// Timestamp at wallet creation time.
    pub timestamp: u32,
    /// Timestamp at which the last poll of the chain completed, if any.
    pub last_poll_timestamp: Option<u32>,
}

pub trait DatabaseInterface: Send {
    fn connection(&self) -> Box<dyn DatabaseConnection>;
}

impl DatabaseInterface for SqliteDb {
    fn connection(&self) -> Box<dyn DatabaseConnection> {
        Box::new(self.connection().expect("Database must be available"))
    }
}

// FIXME: do we need to repeat the entire trait implementation? Isn't there a nicer way?
impl DatabaseInterface for sync::Arc<sync::Mutex<dyn DatabaseInterface>> {
    fn connection(&self) -> Box<dyn DatabaseConnection> {
        self.lock().unwrap().connection()
    }
}

pub trait DatabaseConnection {
    /// Get the `Wallet`.
    fn wallet(&mut self) -> Wallet;

    /// The timestamp at wallet creation time.
    fn timestamp(&mut self) -> u32;

    /// Set the timestamp at which the last poll of the chain completed.
    fn set_last_poll(&mut self, timestamp: u32);

    /// The tip slot as recorded with the submission store.
    fn tip_slot(&mut self) -> Slot;

    /// Read the whole submission store.
    fn submissions(&mut self) -> SubmissionStore<WalletTx>;

    /// Replace the whole submission store.
    fn update_submissions(&mut self, store: &SubmissionStore<WalletTx>);

    /// Read, transform and write back the submission store within a single
    /// journaled transaction. On failure nothing is applied.
    fn with_submissions(
        &mut self,
        update: &mut dyn FnMut(SubmissionStore<WalletTx>) -> SubmissionStore<WalletTx>,
    );

    /// Record a checkpoint, replacing any existing one at the same slot.
    fn put_checkpoint(&mut self, checkpoint: &Checkpoint);

    /// Get the checkpoint at this exact slot, if any.
    fn checkpoint_at(&mut self, slot: Slot) -> Option<Checkpoint>;

    /// All recorded checkpoint slots, in increasing order.
    fn list_checkpoints(&mut self) -> Vec<Slot>;

    /// Rewind to the latest checkpoint at or before `slot`, dropping later
    /// checkpoints and moving the submission store's tip there. Returns the
    /// slot actually rolled to, which may be earlier than requested.
    fn rollback_to(&mut self, slot: Slot) -> Slot;
}

impl DatabaseConnection for SqliteConn {
    fn wallet(&mut self) -> Wallet {
        let db_wallet = self.db_wallet();
        Wallet {
            timestamp: db_wallet.timestamp,
            last_poll_timestamp: db_wallet.last_poll_timestamp,
        }
    }

    fn timestamp(&mut self) -> u32 {
        self.wallet().timestamp
    }

    fn set_last_poll(&mut self, timestamp: u32) {
        self.set_wallet_last_poll_timestamp(timestamp)
    }

    fn tip_slot(&mut self) -> Slot {
        self.db_wallet().tip_slot
    }

    fn submissions(&mut self) -> SubmissionStore<WalletTx> {
        self.db_submissions()
    }

    fn update_submissions(&mut self, store: &SubmissionStore<WalletTx>) {
        self.db_update_submissions(store)
    }

    fn with_submissions(
        &mut self,
        update: &mut dyn FnMut(SubmissionStore<WalletTx>) -> SubmissionStore<WalletTx>,
    ) {
        self.db_with_submissions(update)
    }

    fn put_checkpoint(&mut self, checkpoint: &Checkpoint) {
        self.db_put_checkpoint(checkpoint)
    }

    fn checkpoint_at(&mut self, slot: Slot) -> Option<Checkpoint> {
        self.db_checkpoint_at(slot)
    }

    fn list_checkpoints(&mut self) -> Vec<Slot> {
        self.db_list_checkpoints()
    }

    fn rollback_to(&mut self, slot: Slot) -> Slot {
        self.db_rollback_to(slot)
    }
}
