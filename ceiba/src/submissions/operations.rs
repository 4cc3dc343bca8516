//! Composite operations over the submission store.
//!
//! The host never drives the store one primitive at a time: it reacts to
//! chain events, each of which translates into a short, fixed sequence of
//! primitives. This layer owns those sequences and guarantees that the
//! store invariants hold after every composite step, including the
//! steady-state rule that an accepted transaction's slot never trails
//! beyond the tip.

use super::{
    primitives::{apply_primitive, Primitive},
    HasTxId, Slot, SubmissionStore,
};

/// A chain-event-shaped intent against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation<Tx> {
    /// Track a freshly broadcast transaction.
    Submit { expiring: Slot, tx: Tx },
    /// The chain advanced to `tip`, containing the given transactions at
    /// their acceptance slots.
    RollForward {
        tip: Slot,
        acceptances: Vec<(Slot, Tx)>,
    },
    /// The chain switched to a fork; our state is only valid up to `tip`.
    RollBack { tip: Slot },
    /// Everything at or before `finality` is now irreversible.
    Finalize { finality: Slot },
    /// Drop a transaction the user no longer cares about.
    Forget { tx: Tx },
}

/// Apply one composite operation.
pub fn apply_operation<Tx: HasTxId>(
    store: SubmissionStore<Tx>,
    operation: Operation<Tx>,
) -> SubmissionStore<Tx> {
    match operation {
        Operation::Submit { expiring, tx } => {
            apply_primitive(store, Primitive::AddSubmission { expiring, tx })
        }
        Operation::RollForward { tip, acceptances } => {
            // Acceptances are applied first: `MoveToLedger` is gated on the
            // acceptance being past the current tip, and the subsequent
            // `MoveTip` both catches the tip up with the accepted slots and
            // demotes any acceptance the new tip does not actually cover.
            let mut store = acceptances.into_iter().fold(store, |store, (slot, tx)| {
                apply_primitive(
                    store,
                    Primitive::MoveToLedger {
                        acceptance: slot,
                        tx,
                    },
                )
            });
            store = apply_primitive(store, Primitive::MoveTip { tip });
            debug_assert!(store.check_invariant().is_ok());
            store
        }
        Operation::RollBack { tip } => {
            log::info!("Submission store rolled back to slot '{}'.", tip);
            let store = apply_primitive(store, Primitive::MoveTip { tip });
            debug_assert!(store.check_invariant().is_ok());
            store
        }
        Operation::Finalize { finality } => {
            apply_primitive(store, Primitive::MoveFinality { finality })
        }
        Operation::Forget { tx } => apply_primitive(store, Primitive::Forget { tx }),
    }
}
