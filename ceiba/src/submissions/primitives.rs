//! Primitive transitions of the submission store.
//!
//! Every primitive is total: one that does not apply (a stale submission,
//! an acceptance for a transaction we never submitted) leaves the store
//! unchanged rather than failing. This encodes the policy that stale
//! intents are dropped, not reported.

use super::{HasTxId, Slot, SubmissionStore, TxStatus};

use std::cmp;

/// A single-step change to a [`SubmissionStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive<Tx> {
    /// Start tracking a transaction, valid until `expiring`. A no-op if the
    /// expiry is not in the future of the tip or the transaction is already
    /// tracked.
    AddSubmission { expiring: Slot, tx: Tx },
    /// Mark a tracked, in-submission transaction as accepted on-chain at
    /// `acceptance`. A no-op in any other state, or if the acceptance slot
    /// is not within `(tip, expiring]`.
    MoveToLedger { acceptance: Slot, tx: Tx },
    /// Move the tip, forwards or backwards, and rewrite every status
    /// accordingly.
    MoveTip { tip: Slot },
    /// Advance the finality horizon (clamped to `[finality, tip]`) and
    /// prune everything it has passed.
    MoveFinality { finality: Slot },
    /// Stop tracking a transaction unconditionally.
    Forget { tx: Tx },
}

/// Apply one primitive, consuming the store and returning the next state.
pub fn apply_primitive<Tx: HasTxId>(
    store: SubmissionStore<Tx>,
    primitive: Primitive<Tx>,
) -> SubmissionStore<Tx> {
    match primitive {
        Primitive::AddSubmission { expiring, tx } => add_submission(store, expiring, tx),
        Primitive::MoveToLedger { acceptance, tx } => move_to_ledger(store, acceptance, tx),
        Primitive::MoveTip { tip } => move_tip(store, tip),
        Primitive::MoveFinality { finality } => move_finality(store, finality),
        Primitive::Forget { tx } => forget(store, tx),
    }
}

fn add_submission<Tx: HasTxId>(
    mut store: SubmissionStore<Tx>,
    expiring: Slot,
    tx: Tx,
) -> SubmissionStore<Tx> {
    let txid = tx.tx_id();
    if expiring > store.tip && !store.transactions.contains_key(&txid) {
        store
            .transactions
            .insert(txid, TxStatus::InSubmission { expiring, tx });
    }
    store
}

fn move_to_ledger<Tx: HasTxId>(
    mut store: SubmissionStore<Tx>,
    acceptance: Slot,
    tx: Tx,
) -> SubmissionStore<Tx> {
    let txid = tx.tx_id();
    // Only an in-submission transaction can enter the ledger, and only at a
    // slot the tip has not reached yet and its expiry allows. The stored
    // payload is kept; the primitive's copy only names the transaction.
    let eligible = match store.transactions.get(&txid) {
        Some(TxStatus::InSubmission { expiring, .. })
            if store.tip < acceptance && acceptance <= *expiring =>
        {
            true
        }
        _ => false,
    };
    if eligible {
        if let Some(TxStatus::InSubmission { expiring, tx: stored }) =
            store.transactions.remove(&txid)
        {
            store.transactions.insert(
                txid,
                TxStatus::InLedger {
                    expiring,
                    acceptance,
                    tx: stored,
                },
            );
        }
    }
    store
}

fn move_tip<Tx: HasTxId>(mut store: SubmissionStore<Tx>, tip: Slot) -> SubmissionStore<Tx> {
    store.tip = tip;
    store.finality = cmp::min(store.finality, tip);
    store.transactions = store
        .transactions
        .into_iter()
        .map(|(txid, status)| {
            let status = match status {
                // Rolled back below the acceptance: the ledger no longer
                // contains the transaction, it is pending again. Its expiry
                // is at or past the acceptance, so it is not expired.
                TxStatus::InLedger {
                    expiring,
                    acceptance,
                    tx,
                } if acceptance > tip => TxStatus::InSubmission { expiring, tx },
                // The tip passed the expiry while still pending.
                TxStatus::InSubmission { expiring, tx } if expiring <= tip => {
                    TxStatus::Expired { expiring, tx }
                }
                // Rolled back below the expiry: the transaction gets
                // another chance.
                TxStatus::Expired { expiring, tx } if expiring > tip => {
                    TxStatus::InSubmission { expiring, tx }
                }
                unchanged => unchanged,
            };
            (txid, status)
        })
        .collect();
    store
}

fn move_finality<Tx: HasTxId>(
    mut store: SubmissionStore<Tx>,
    finality: Slot,
) -> SubmissionStore<Tx> {
    // Finality never regresses and never overtakes the tip.
    let finality = cmp::max(store.finality, cmp::min(finality, store.tip));
    store.finality = finality;
    store.transactions.retain(|_, status| match status {
        // Still pending: kept whatever the horizon says, it may yet make it
        // into a block.
        TxStatus::InSubmission { .. } => true,
        TxStatus::InLedger { acceptance, .. } => *acceptance > finality,
        TxStatus::Expired { expiring, .. } => *expiring > finality,
    });
    store
}

fn forget<Tx: HasTxId>(mut store: SubmissionStore<Tx>, tx: Tx) -> SubmissionStore<Tx> {
    store.transactions.remove(&tx.tx_id());
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submissions::TxId;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestTx(u8);

    impl HasTxId for TestTx {
        fn tx_id(&self) -> TxId {
            TxId([self.0; 32])
        }
    }

    fn apply_all(
        store: SubmissionStore<TestTx>,
        primitives: Vec<Primitive<TestTx>>,
    ) -> SubmissionStore<TestTx> {
        primitives
            .into_iter()
            .fold(store, |store, primitive| apply_primitive(store, primitive))
    }

    fn store_at(tip: u64) -> SubmissionStore<TestTx> {
        apply_primitive(SubmissionStore::new(), Primitive::MoveTip { tip: Slot(tip) })
    }

    #[test]
    fn add_submission_tracks_future_expiries_only() {
        let store = store_at(50);
        let store = apply_primitive(
            store,
            Primitive::AddSubmission {
                expiring: Slot(100),
                tx: TestTx(1),
            },
        );
        assert_eq!(
            store.status(&TestTx(1).tx_id()),
            Some(&TxStatus::InSubmission {
                expiring: Slot(100),
                tx: TestTx(1)
            })
        );

        // An expiry at or before the tip is a stale intent, dropped.
        let store = apply_primitive(
            store,
            Primitive::AddSubmission {
                expiring: Slot(50),
                tx: TestTx(2),
            },
        );
        assert_eq!(store.status(&TestTx(2).tx_id()), None);
        assert_eq!(store.check_invariant(), Ok(()));
    }

    #[test]
    fn add_submission_never_replaces_an_existing_entry() {
        let store = apply_all(
            store_at(50),
            vec![
                Primitive::AddSubmission {
                    expiring: Slot(60),
                    tx: TestTx(1),
                },
                // Same txid, different expiry: ignored.
                Primitive::AddSubmission {
                    expiring: Slot(90),
                    tx: TestTx(1),
                },
            ],
        );
        assert_eq!(
            store.status(&TestTx(1).tx_id()).map(|s| s.expiring()),
            Some(Slot(60))
        );

        // Also ignored when the existing entry has expired.
        let store = apply_primitive(store, Primitive::MoveTip { tip: Slot(70) });
        let expired = store.clone();
        let store = apply_primitive(
            store,
            Primitive::AddSubmission {
                expiring: Slot(200),
                tx: TestTx(1),
            },
        );
        assert_eq!(store, expired);
    }

    #[test]
    fn move_to_ledger_gates_on_state_and_slots() {
        let base = apply_primitive(
            store_at(50),
            Primitive::AddSubmission {
                expiring: Slot(100),
                tx: TestTx(1),
            },
        );

        // Acceptance must be past the tip.
        let store = apply_primitive(
            base.clone(),
            Primitive::MoveToLedger {
                acceptance: Slot(50),
                tx: TestTx(1),
            },
        );
        assert_eq!(store, base);

        // Acceptance must not be past the expiry.
        let store = apply_primitive(
            base.clone(),
            Primitive::MoveToLedger {
                acceptance: Slot(101),
                tx: TestTx(1),
            },
        );
        assert_eq!(store, base);

        // An unknown transaction is ignored.
        let store = apply_primitive(
            base.clone(),
            Primitive::MoveToLedger {
                acceptance: Slot(60),
                tx: TestTx(9),
            },
        );
        assert_eq!(store, base);

        // Within the gate, the stored payload transitions.
        let store = apply_primitive(
            base,
            Primitive::MoveToLedger {
                acceptance: Slot(60),
                tx: TestTx(1),
            },
        );
        assert_eq!(
            store.status(&TestTx(1).tx_id()),
            Some(&TxStatus::InLedger {
                expiring: Slot(100),
                acceptance: Slot(60),
                tx: TestTx(1)
            })
        );

        // Already in the ledger: a second acceptance is ignored.
        let again = apply_primitive(
            store.clone(),
            Primitive::MoveToLedger {
                acceptance: Slot(70),
                tx: TestTx(1),
            },
        );
        assert_eq!(again, store);
    }

    #[test]
    fn accepted_transaction_reverts_on_rollback() {
        // Submit at tip 50, accept at 60, then roll back to 30.
        let store = apply_all(
            store_at(50),
            vec![
                Primitive::AddSubmission {
                    expiring: Slot(100),
                    tx: TestTx(1),
                },
                Primitive::MoveToLedger {
                    acceptance: Slot(60),
                    tx: TestTx(1),
                },
                Primitive::MoveTip { tip: Slot(30) },
            ],
        );
        assert_eq!(
            store.status(&TestTx(1).tx_id()),
            Some(&TxStatus::InSubmission {
                expiring: Slot(100),
                tx: TestTx(1)
            })
        );
        assert_eq!(store.tip(), Slot(30));
        assert_eq!(store.check_invariant(), Ok(()));
    }

    #[test]
    fn expiry_and_unexpiry_follow_the_tip() {
        // Pending with expiry 60, the tip moves to 70 then back to 55.
        let store = apply_all(
            store_at(50),
            vec![
                Primitive::AddSubmission {
                    expiring: Slot(60),
                    tx: TestTx(1),
                },
                Primitive::MoveTip { tip: Slot(70) },
            ],
        );
        assert_eq!(
            store.status(&TestTx(1).tx_id()),
            Some(&TxStatus::Expired {
                expiring: Slot(60),
                tx: TestTx(1)
            })
        );

        let store = apply_primitive(store, Primitive::MoveTip { tip: Slot(55) });
        assert_eq!(
            store.status(&TestTx(1).tx_id()),
            Some(&TxStatus::InSubmission {
                expiring: Slot(60),
                tx: TestTx(1)
            })
        );
        assert_eq!(store.check_invariant(), Ok(()));
    }

    #[test]
    fn finality_prunes_ledger_and_expiry_but_not_submissions() {
        // An accepted transaction behind the horizon is pruned, a pending
        // one is kept.
        let store = apply_all(
            store_at(30),
            vec![
                Primitive::AddSubmission {
                    expiring: Slot(90),
                    tx: TestTx(1),
                },
                Primitive::AddSubmission {
                    expiring: Slot(200),
                    tx: TestTx(2),
                },
                Primitive::MoveToLedger {
                    acceptance: Slot(40),
                    tx: TestTx(1),
                },
                Primitive::MoveTip { tip: Slot(100) },
                Primitive::MoveFinality {
                    finality: Slot(50),
                },
            ],
        );
        assert_eq!(store.status(&TestTx(1).tx_id()), None);
        assert!(matches!(
            store.status(&TestTx(2).tx_id()),
            Some(TxStatus::InSubmission { .. })
        ));
        assert_eq!(store.finality(), Slot(50));
        assert_eq!(store.check_invariant(), Ok(()));
    }

    #[test]
    fn finality_is_clamped_and_monotone() {
        let store = apply_all(
            store_at(100),
            vec![Primitive::MoveFinality {
                finality: Slot(60),
            }],
        );
        assert_eq!(store.finality(), Slot(60));

        // Beyond the tip: clamped down to it.
        let store = apply_primitive(
            store,
            Primitive::MoveFinality {
                finality: Slot(150),
            },
        );
        assert_eq!(store.finality(), Slot(100));

        // Backwards: ignored.
        let store = apply_primitive(
            store,
            Primitive::MoveFinality {
                finality: Slot(10),
            },
        );
        assert_eq!(store.finality(), Slot(100));

        // A tip rollback is the only thing that lowers it.
        let store = apply_primitive(store, Primitive::MoveTip { tip: Slot(40) });
        assert_eq!(store.finality(), Slot(40));
        assert_eq!(store.tip(), Slot(40));
    }

    #[test]
    fn forget_removes_any_state() {
        let store = apply_all(
            store_at(50),
            vec![
                Primitive::AddSubmission {
                    expiring: Slot(100),
                    tx: TestTx(1),
                },
                Primitive::MoveToLedger {
                    acceptance: Slot(60),
                    tx: TestTx(1),
                },
                Primitive::MoveTip { tip: Slot(70) },
                Primitive::Forget { tx: TestTx(1) },
            ],
        );
        assert!(store.is_empty());
        // Forgetting an unknown transaction is a no-op.
        let store = apply_primitive(store, Primitive::Forget { tx: TestTx(7) });
        assert!(store.is_empty());
    }

    #[test]
    fn rollback_restores_unpruned_transactions() {
        // Whatever mix of accepted and expired entries the store holds,
        // rolling the tip below their slots turns them all back into
        // submissions, and rolling forward again re-derives the same
        // statuses.
        let build = |tip_b: u64| {
            apply_all(
                store_at(10),
                vec![
                    Primitive::AddSubmission {
                        expiring: Slot(40),
                        tx: TestTx(1),
                    },
                    Primitive::AddSubmission {
                        expiring: Slot(80),
                        tx: TestTx(2),
                    },
                    Primitive::AddSubmission {
                        expiring: Slot(200),
                        tx: TestTx(3),
                    },
                    Primitive::MoveToLedger {
                        acceptance: Slot(35),
                        tx: TestTx(2),
                    },
                    Primitive::MoveTip { tip: Slot(tip_b) },
                ],
            )
        };
        let at_60 = build(60);
        assert!(matches!(
            at_60.status(&TestTx(1).tx_id()),
            Some(TxStatus::Expired { .. })
        ));
        assert!(matches!(
            at_60.status(&TestTx(2).tx_id()),
            Some(TxStatus::InLedger { .. })
        ));
        assert!(matches!(
            at_60.status(&TestTx(3).tx_id()),
            Some(TxStatus::InSubmission { .. })
        ));

        // Rolling back to 20 resurrects everything.
        let rolled = apply_primitive(at_60.clone(), Primitive::MoveTip { tip: Slot(20) });
        for tx in [TestTx(1), TestTx(2), TestTx(3)] {
            assert!(
                matches!(
                    rolled.status(&tx.tx_id()),
                    Some(TxStatus::InSubmission { .. })
                ),
                "{:?} should be back in submission",
                tx
            );
        }
        assert_eq!(rolled.check_invariant(), Ok(()));

        // The acceptance was lost in the rollback, so moving forward again
        // expires the short-lived entries and keeps the rest pending.
        let forward = apply_primitive(rolled, Primitive::MoveTip { tip: Slot(60) });
        assert!(matches!(
            forward.status(&TestTx(1).tx_id()),
            Some(TxStatus::Expired { .. })
        ));
        assert!(matches!(
            forward.status(&TestTx(2).tx_id()),
            Some(TxStatus::Expired { .. })
        ));
        assert!(matches!(
            forward.status(&TestTx(3).tx_id()),
            Some(TxStatus::InSubmission { .. })
        ));
    }

}
