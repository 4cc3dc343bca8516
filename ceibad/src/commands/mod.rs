//! # Ceiba commands
//!
//! External interface to the Ceiba daemon.

use crate::{
    database::{Checkpoint, DatabaseInterface, WalletTx},
    DaemonControl, VERSION,
};

use std::{collections::HashSet, fmt};

use ceiba::{
    migration::{self, check_invariant, Selection, SelectionError, SelectionInvariantStatus},
    submissions::{
        operations::{apply_operation, Operation},
        primitives::{apply_primitive, Primitive},
        Slot, TxId, TxStatus,
    },
    value::{Coin, TokenBundle, TxSize},
};
use serde::{Deserialize, Serialize};

/// Reference to a wallet UTxO: the transaction that created it and the
/// output index within it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct UtxoRef {
    pub txid: TxId,
    pub index: u32,
}

impl fmt::Display for UtxoRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// A migration selection over the daemon's concrete input and size types.
pub type MigrationSelection = Selection<UtxoRef, TxSize>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// A migration needs at least one input.
    NoMigrationInputs,
    /// The same UTxO was provided twice.
    DuplicateInput(UtxoRef),
    /// The selection engine could not pack the inputs.
    Selection(SelectionError<TxSize>),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NoMigrationInputs => {
                write!(f, "No inputs provided for migration. Need at least one.")
            }
            Self::DuplicateInput(utxo) => write!(f, "UTxO '{}' was provided twice.", utxo),
            Self::Selection(e) => write!(f, "Creating migration: {}", e),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<SelectionError<TxSize>> for CommandError {
    fn from(e: SelectionError<TxSize>) -> Self {
        CommandError::Selection(e)
    }
}

/// The state a tracked transaction is in, for reporting purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    InSubmission,
    InLedger,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSubmissionsEntry {
    pub txid: TxId,
    pub state: SubmissionState,
    pub expiring: Slot,
    pub acceptance: Option<Slot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSubmissionsResult {
    pub tip: Slot,
    pub finality: Slot,
    pub submissions: Vec<ListSubmissionsEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetInfoResult {
    pub version: String,
    /// Timestamp at wallet creation time.
    pub timestamp: u32,
    /// Timestamp at which the last poll of the chain completed, if any.
    pub last_poll_timestamp: Option<u32>,
    pub tip: Slot,
    pub finality: Slot,
}

impl DaemonControl {
    // Check the provided inputs are a usable migration request.
    fn sanitize_inputs(
        &self,
        inputs: &[(UtxoRef, TokenBundle)],
    ) -> Result<(), CommandError> {
        if inputs.is_empty() {
            return Err(CommandError::NoMigrationInputs);
        }
        let mut seen = HashSet::new();
        for (utxo, _) in inputs {
            if !seen.insert(*utxo) {
                return Err(CommandError::DuplicateInput(*utxo));
            }
        }
        Ok(())
    }

    /// Pack the given wallet UTxOs, along with an optional reward balance,
    /// into a fresh migration selection.
    pub fn create_migration(
        &self,
        inputs: Vec<(UtxoRef, TokenBundle)>,
        reward_withdrawal: Coin,
    ) -> Result<MigrationSelection, CommandError> {
        self.sanitize_inputs(&inputs)?;
        let selection = migration::create(self.params(), reward_withdrawal, inputs)?;
        debug_assert_eq!(
            check_invariant(self.params(), &selection),
            SelectionInvariantStatus::Holds
        );
        Ok(selection)
    }

    /// Merge one more UTxO into an existing output of the selection.
    pub fn add_migration_input_to_existing_output(
        &self,
        selection: &MigrationSelection,
        input: (UtxoRef, TokenBundle),
    ) -> Result<MigrationSelection, CommandError> {
        let selection =
            migration::add_input_to_existing_output(self.params(), selection, input)?;
        debug_assert_eq!(
            check_invariant(self.params(), &selection),
            SelectionInvariantStatus::Holds
        );
        Ok(selection)
    }

    /// Add one more UTxO to the selection as a new output, without taking
    /// ada back from the existing outputs.
    pub fn add_migration_input_to_new_output(
        &self,
        selection: &MigrationSelection,
        input: (UtxoRef, TokenBundle),
    ) -> Result<MigrationSelection, CommandError> {
        let selection = migration::add_input_to_new_output_without_reclaiming_ada(
            self.params(),
            selection,
            input,
        )?;
        debug_assert_eq!(
            check_invariant(self.params(), &selection),
            SelectionInvariantStatus::Holds
        );
        Ok(selection)
    }

    /// Add one more UTxO to the selection wherever it fits: first try the
    /// existing outputs, then a new output, reclaiming ada from the other
    /// outputs if the input cannot pay its own way.
    pub fn add_migration_input(
        &self,
        selection: &MigrationSelection,
        input: (UtxoRef, TokenBundle),
    ) -> Result<MigrationSelection, CommandError> {
        let selection =
            match migration::add_input_to_existing_output(self.params(), selection, input.clone())
            {
                Ok(selection) => selection,
                Err(_) => migration::add_input_to_new_output(self.params(), selection, input)?,
            };
        debug_assert_eq!(
            check_invariant(self.params(), &selection),
            SelectionInvariantStatus::Holds
        );
        Ok(selection)
    }

    /// Start tracking a transaction we just handed to the network. The
    /// `expiring` slot is the transaction's time-to-live bound.
    pub fn submit_transaction(&self, expiring: Slot, tx: WalletTx) {
        self.apply_primitive(Primitive::AddSubmission { expiring, tx })
    }

    /// Apply one primitive to the submission store, atomically.
    pub fn apply_primitive(&self, primitive: Primitive<WalletTx>) {
        let mut db_conn = self.db.connection();
        db_conn.with_submissions(&mut |store| apply_primitive(store, primitive.clone()));
    }

    /// Apply one composite operation to the submission store, atomically.
    pub fn apply_operation(&self, operation: Operation<WalletTx>) {
        let mut db_conn = self.db.connection();
        db_conn.with_submissions(&mut |store| {
            let store = apply_operation(store, operation.clone());
            debug_assert!(store.check_invariant().is_ok());
            store
        });
    }

    /// Stop tracking a transaction, whatever state it is in.
    pub fn forget_transaction(&self, txid: TxId) {
        let mut db_conn = self.db.connection();
        db_conn.with_submissions(&mut |store| {
            let tx = match store.status(&txid) {
                Some(status) => status.tx().clone(),
                None => return store,
            };
            apply_primitive(store, Primitive::Forget { tx })
        });
    }

    /// Record a wallet state snapshot for this slot, replacing any previous
    /// one at the same slot.
    pub fn record_checkpoint(&self, checkpoint: Checkpoint) {
        let mut db_conn = self.db.connection();
        db_conn.put_checkpoint(&checkpoint);
    }

    /// The slots we hold a checkpoint for, in increasing order.
    pub fn list_checkpoints(&self) -> Vec<Slot> {
        let mut db_conn = self.db.connection();
        db_conn.list_checkpoints()
    }

    /// Rewind the wallet to the latest checkpoint at or before the given
    /// slot. Returns the slot actually rolled to.
    pub fn rollback_to(&self, slot: Slot) -> Slot {
        let mut db_conn = self.db.connection();
        let actual = db_conn.rollback_to(slot);
        log::info!("Wallet rolled back to slot '{}'.", actual);
        actual
    }

    /// Record that a poll of the chain completed at this timestamp.
    pub fn record_poll(&self, timestamp: u32) {
        let mut db_conn = self.db.connection();
        db_conn.set_last_poll(timestamp);
    }

    /// The transactions we are tracking, with their current state.
    pub fn list_submissions(&self) -> ListSubmissionsResult {
        let mut db_conn = self.db.connection();
        let store = db_conn.submissions();
        let submissions = store
            .transactions()
            .iter()
            .map(|(txid, status)| {
                let (state, acceptance) = match status {
                    TxStatus::InSubmission { .. } => (SubmissionState::InSubmission, None),
                    TxStatus::InLedger { acceptance, .. } => {
                        (SubmissionState::InLedger, Some(*acceptance))
                    }
                    TxStatus::Expired { .. } => (SubmissionState::Expired, None),
                };
                ListSubmissionsEntry {
                    txid: *txid,
                    state,
                    expiring: status.expiring(),
                    acceptance,
                }
            })
            .collect();
        ListSubmissionsResult {
            tip: store.tip(),
            finality: store.finality(),
            submissions,
        }
    }

    /// General information about the wallet.
    pub fn get_info(&self) -> GetInfoResult {
        let mut db_conn = self.db.connection();
        let wallet = db_conn.wallet();
        let store = db_conn.submissions();
        GetInfoResult {
            version: VERSION.to_string(),
            timestamp: wallet.timestamp,
            last_poll_timestamp: wallet.last_poll_timestamp,
            tip: store.tip(),
            finality: store.finality(),
        }
    }
}
