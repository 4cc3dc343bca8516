use crate::{
    config::Config,
    database::{Checkpoint, DatabaseConnection, DatabaseInterface, Wallet, WalletTx},
    params::ProtocolParameters,
    DaemonControl,
};

use std::{collections::BTreeMap, sync};

use ceiba::submissions::{
    primitives::{apply_primitive, Primitive},
    Slot, SubmissionStore, TxId,
};

// An in-memory stand-in for the SQLite database. A single mutex plays the
// role of the journaled transaction: every connection method locks the full
// state, so a batch is never partially visible.
#[derive(Debug)]
struct DummyState {
    timestamp: u32,
    last_poll_timestamp: Option<u32>,
    submissions: SubmissionStore<WalletTx>,
    checkpoints: BTreeMap<Slot, Vec<u8>>,
}

pub struct DummyDatabase {
    state: sync::Arc<sync::Mutex<DummyState>>,
}

impl DummyDatabase {
    pub fn new() -> DummyDatabase {
        DummyDatabase {
            state: sync::Arc::new(sync::Mutex::new(DummyState {
                timestamp: 1_600_000_000,
                last_poll_timestamp: None,
                submissions: SubmissionStore::new(),
                checkpoints: BTreeMap::new(),
            })),
        }
    }
}

impl DatabaseInterface for DummyDatabase {
    fn connection(&self) -> Box<dyn DatabaseConnection> {
        Box::new(DummyConnection {
            state: self.state.clone(),
        })
    }
}

struct DummyConnection {
    state: sync::Arc<sync::Mutex<DummyState>>,
}

impl DatabaseConnection for DummyConnection {
    fn wallet(&mut self) -> Wallet {
        let state = self.state.lock().unwrap();
        Wallet {
            timestamp: state.timestamp,
            last_poll_timestamp: state.last_poll_timestamp,
        }
    }

    fn timestamp(&mut self) -> u32 {
        self.state.lock().unwrap().timestamp
    }

    fn set_last_poll(&mut self, timestamp: u32) {
        self.state.lock().unwrap().last_poll_timestamp = Some(timestamp);
    }

    fn tip_slot(&mut self) -> Slot {
        self.state.lock().unwrap().submissions.tip()
    }

    fn submissions(&mut self) -> SubmissionStore<WalletTx> {
        self.state.lock().unwrap().submissions.clone()
    }

    fn update_submissions(&mut self, store: &SubmissionStore<WalletTx>) {
        self.state.lock().unwrap().submissions = store.clone();
    }

    fn with_submissions(
        &mut self,
        update: &mut dyn FnMut(SubmissionStore<WalletTx>) -> SubmissionStore<WalletTx>,
    ) {
        let mut state = self.state.lock().unwrap();
        let store = state.submissions.clone();
        state.submissions = update(store);
    }

    fn put_checkpoint(&mut self, checkpoint: &Checkpoint) {
        self.state
            .lock()
            .unwrap()
            .checkpoints
            .insert(checkpoint.slot, checkpoint.payload.clone());
    }

    fn checkpoint_at(&mut self, slot: Slot) -> Option<Checkpoint> {
        self.state
            .lock()
            .unwrap()
            .checkpoints
            .get(&slot)
            .map(|payload| Checkpoint {
                slot,
                payload: payload.clone(),
            })
    }

    fn list_checkpoints(&mut self) -> Vec<Slot> {
        self.state.lock().unwrap().checkpoints.keys().copied().collect()
    }

    fn rollback_to(&mut self, slot: Slot) -> Slot {
        let mut state = self.state.lock().unwrap();
        let actual = state
            .checkpoints
            .range(..=slot)
            .next_back()
            .map(|(slot, _)| *slot)
            .unwrap_or(Slot::MIN);
        state.checkpoints.split_off(&Slot(actual.0 + 1));
        let store = state.submissions.clone();
        state.submissions = apply_primitive(store, Primitive::MoveTip { tip: actual });
        actual
    }
}

/// A commands interface over the dummy in-memory database and default
/// protocol parameters.
pub fn dummy_control() -> DaemonControl {
    let db = sync::Arc::new(sync::Mutex::new(DummyDatabase::new()));
    let config = Config {
        data_dir: None,
        log_level: log::LevelFilter::Debug,
        protocol: ProtocolParameters::default(),
    };
    DaemonControl::new(config, db)
}

/// A transaction payload whose txid and body are derived from a marker byte.
pub fn dummy_wallet_tx(marker: u8) -> WalletTx {
    WalletTx {
        txid: TxId([marker; 32]),
        body: vec![marker; 8],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_rollback_matches_checkpoint_semantics() {
        let db = DummyDatabase::new();
        let mut conn = db.connection();
        for slot in [10u64, 20, 30] {
            conn.put_checkpoint(&Checkpoint {
                slot: Slot(slot),
                payload: vec![slot as u8],
            });
        }
        assert_eq!(conn.rollback_to(Slot(25)), Slot(20));
        assert_eq!(conn.list_checkpoints(), vec![Slot(10), Slot(20)]);
        assert_eq!(conn.rollback_to(Slot(5)), Slot::MIN);
        assert!(conn.list_checkpoints().is_empty());
    }
}
