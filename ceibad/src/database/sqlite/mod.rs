//! Implementation of the database interface using SQLite.
//!
//! We use a bundled SQLite that is compiled with SQLITE_THREADSAFE. Sqlite.org states:
//! > Multi-thread. In this mode, SQLite can be safely used by multiple threads provided that
//! > no single database connection is used simultaneously in two or more threads.
//!
//! We leverage SQLite's `unlock_notify` feature to synchronize writes across connection. More
//! about it at https://sqlite.org/unlock_notify.html.

pub mod schema;
mod utils;

use crate::database::{
    sqlite::{
        schema::{
            slot_to_sql, DbSubmission, DbWallet, DB_VERSION, SCHEMA,
        },
        utils::{create_fresh_db, db_exec, db_query, db_tx_query, db_version},
    },
    Checkpoint, WalletTx,
};

use std::{
    convert::{TryFrom, TryInto},
    fmt, io, path,
};

use ceiba::submissions::{
    primitives::{apply_primitive, Primitive},
    Slot, SubmissionStore,
};

#[derive(Debug)]
pub enum SqliteDbError {
    FileCreation(io::Error),
    FileNotFound(path::PathBuf),
    UnsupportedVersion(i64),
    Rusqlite(rusqlite::Error),
}

impl fmt::Display for SqliteDbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SqliteDbError::FileCreation(e) => {
                write!(f, "Error when create SQLite database file: '{}'", e)
            }
            SqliteDbError::FileNotFound(p) => {
                write!(f, "SQLite database file not found at '{}'.", p.display())
            }
            SqliteDbError::UnsupportedVersion(v) => {
                write!(f, "Unsupported database version '{}'.", v)
            }
            SqliteDbError::Rusqlite(e) => write!(f, "SQLite error: '{}'", e),
        }
    }
}

impl std::error::Error for SqliteDbError {}

impl From<io::Error> for SqliteDbError {
    fn from(e: io::Error) -> Self {
        SqliteDbError::FileCreation(e)
    }
}

impl From<rusqlite::Error> for SqliteDbError {
    fn from(e: rusqlite::Error) -> Self {
        SqliteDbError::Rusqlite(e)
    }
}

#[derive(Debug, Clone)]
pub struct FreshDbOptions {
    pub(self) schema: &'static str,
    pub(self) version: i64,
}

impl Default for FreshDbOptions {
    fn default() -> FreshDbOptions {
        FreshDbOptions {
            schema: SCHEMA,
            version: DB_VERSION,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqliteDb {
    db_path: path::PathBuf,
}

impl SqliteDb {
    /// Instantiate an SQLite database either from an existing database file or by creating a fresh
    /// one.
    pub fn new(
        db_path: path::PathBuf,
        fresh_options: Option<FreshDbOptions>,
    ) -> Result<SqliteDb, SqliteDbError> {
        // Create the database if needed, and make sure the db file exists.
        if let Some(options) = fresh_options {
            create_fresh_db(&db_path, options)?;
            log::info!("Created a fresh database at {}.", db_path.display());
        }
        if !db_path.exists() {
            return Err(SqliteDbError::FileNotFound(db_path));
        }

        Ok(SqliteDb { db_path })
    }

    /// Get a new connection to the database.
    pub fn connection(&self) -> Result<SqliteConn, SqliteDbError> {
        let conn = rusqlite::Connection::open(&self.db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(60))?;
        Ok(SqliteConn { conn })
    }

    /// Perform startup sanity checks.
    pub fn sanity_check(&self) -> Result<(), SqliteDbError> {
        let mut conn = self.connection()?;

        let db_version = conn.db_version();
        if db_version != DB_VERSION {
            return Err(SqliteDbError::UnsupportedVersion(db_version));
        }

        Ok(())
    }
}

// Read the whole submission store within an ongoing transaction.
fn read_submissions(db_tx: &rusqlite::Transaction) -> rusqlite::Result<SubmissionStore<WalletTx>> {
    let (tip, finality) = db_tx.query_row(
        "SELECT tip_slot, finality_slot FROM wallets",
        rusqlite::params![],
        |row| {
            Ok((
                schema::slot_from_sql(row.get(0)?),
                schema::slot_from_sql(row.get(1)?),
            ))
        },
    )?;
    let transactions = db_tx_query(
        db_tx,
        "SELECT txid, status, expiring_slot, acceptance_slot, body FROM submissions",
        rusqlite::params![],
        |row| DbSubmission::try_from(row),
    )?
    .into_iter()
    .map(DbSubmission::into_status)
    .collect();
    Ok(SubmissionStore::from_parts(tip, finality, transactions))
}

// Replace the whole submission store within an ongoing transaction. The
// full rewrite is what makes the read-modify-write cycle a snapshot swap.
fn write_submissions(
    db_tx: &rusqlite::Transaction,
    store: &SubmissionStore<WalletTx>,
) -> rusqlite::Result<()> {
    db_tx.execute(
        "UPDATE wallets SET tip_slot = (?1), finality_slot = (?2)",
        rusqlite::params![slot_to_sql(store.tip()), slot_to_sql(store.finality())],
    )?;
    db_tx.execute("DELETE FROM submissions", rusqlite::params![])?;
    for (txid, status) in store.transactions() {
        let row = DbSubmission::from_status(*txid, status);
        db_tx.execute(
            "INSERT INTO submissions (txid, status, expiring_slot, acceptance_slot, body) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                row.txid.0.to_vec(),
                row.status,
                slot_to_sql(row.expiring_slot),
                row.acceptance_slot.map(slot_to_sql),
                row.body,
            ],
        )?;
    }
    Ok(())
}

pub struct SqliteConn {
    conn: rusqlite::Connection,
}

impl SqliteConn {
    pub fn db_version(&mut self) -> i64 {
        db_version(&mut self.conn).expect("db must not fail")
    }

    /// Get the information about the wallet.
    pub fn db_wallet(&mut self) -> DbWallet {
        db_query(
            &mut self.conn,
            "SELECT * FROM wallets",
            rusqlite::params![],
            |row| row.try_into(),
        )
        .expect("Db must not fail")
        .pop()
        .expect("There is always a row in the wallet table")
    }

    pub fn set_wallet_last_poll_timestamp(&mut self, timestamp: u32) {
        db_exec(&mut self.conn, |db_tx| {
            db_tx
                .execute(
                    "UPDATE wallets SET last_poll_timestamp = (?1)",
                    rusqlite::params![timestamp],
                )
                .map(|_| ())
        })
        .expect("Database must be available")
    }

    /// Get the whole submission store.
    pub fn db_submissions(&mut self) -> SubmissionStore<WalletTx> {
        let mut store = None;
        db_exec(&mut self.conn, |db_tx| {
            store = Some(read_submissions(db_tx)?);
            Ok(())
        })
        .expect("Db must not fail");
        store.expect("set within the transaction")
    }

    /// Replace the whole submission store.
    pub fn db_update_submissions(&mut self, store: &SubmissionStore<WalletTx>) {
        db_exec(&mut self.conn, |db_tx| write_submissions(db_tx, store))
            .expect("Database must be available")
    }

    /// Read, transform and write back the submission store, all within one
    /// transaction.
    pub fn db_with_submissions(
        &mut self,
        update: &mut dyn FnMut(SubmissionStore<WalletTx>) -> SubmissionStore<WalletTx>,
    ) {
        db_exec(&mut self.conn, |db_tx| {
            let store = read_submissions(db_tx)?;
            write_submissions(db_tx, &update(store))
        })
        .expect("Database must be available")
    }

    pub fn db_put_checkpoint(&mut self, checkpoint: &Checkpoint) {
        db_exec(&mut self.conn, |db_tx| {
            db_tx
                .execute(
                    "INSERT OR REPLACE INTO checkpoints (slot, payload) VALUES (?1, ?2)",
                    rusqlite::params![slot_to_sql(checkpoint.slot), checkpoint.payload],
                )
                .map(|_| ())
        })
        .expect("Database must be available")
    }

    pub fn db_checkpoint_at(&mut self, slot: Slot) -> Option<Checkpoint> {
        db_query(
            &mut self.conn,
            "SELECT payload FROM checkpoints WHERE slot = (?1)",
            rusqlite::params![slot_to_sql(slot)],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .expect("Db must not fail")
        .pop()
        .map(|payload| Checkpoint { slot, payload })
    }

    pub fn db_list_checkpoints(&mut self) -> Vec<Slot> {
        db_query(
            &mut self.conn,
            "SELECT slot FROM checkpoints ORDER BY slot ASC",
            rusqlite::params![],
            |row| row.get::<_, i64>(0).map(schema::slot_from_sql),
        )
        .expect("Db must not fail")
    }

    /// Rewind to the latest checkpoint at or before the given slot. Later
    /// checkpoints are deleted and the submission store's tip is moved to
    /// the slot actually rolled to, all in one transaction.
    pub fn db_rollback_to(&mut self, slot: Slot) -> Slot {
        let mut actual = Slot::MIN;
        db_exec(&mut self.conn, |db_tx| {
            actual = db_tx
                .query_row(
                    "SELECT MAX(slot) FROM checkpoints WHERE slot <= (?1)",
                    rusqlite::params![slot_to_sql(slot)],
                    |row| row.get::<_, Option<i64>>(0),
                )?
                .map(schema::slot_from_sql)
                .unwrap_or(Slot::MIN);
            db_tx.execute(
                "DELETE FROM checkpoints WHERE slot > (?1)",
                rusqlite::params![slot_to_sql(actual)],
            )?;
            let store = read_submissions(db_tx)?;
            let store = apply_primitive(store, Primitive::MoveTip { tip: actual });
            write_submissions(db_tx, &store)
        })
        .expect("Database must be available");
        log::info!("Rolled the submission store back to slot '{}'.", actual);
        actual
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ceiba::submissions::{HasTxId, TxId, TxStatus};

    use std::{fs, path};

    fn dummy_tx(marker: u8) -> WalletTx {
        WalletTx {
            txid: TxId([marker; 32]),
            body: vec![marker, marker, marker],
        }
    }

    fn new_db(dir: &path::Path) -> SqliteDb {
        let db_path = dir.join("ceibad.sqlite3");
        SqliteDb::new(db_path, Some(FreshDbOptions::default())).unwrap()
    }

    #[test]
    fn fresh_db_creation_and_sanity() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let db = new_db(tmp_dir.path());
        db.sanity_check().unwrap();

        let mut conn = db.connection().unwrap();
        assert_eq!(conn.db_version(), DB_VERSION);
        let wallet = conn.db_wallet();
        assert_eq!(wallet.tip_slot, Slot::MIN);
        assert_eq!(wallet.finality_slot, Slot::MIN);
        assert_eq!(wallet.last_poll_timestamp, None);

        // Creating on top of an existing file fails, opening it again works.
        assert!(SqliteDb::new(
            tmp_dir.path().join("ceibad.sqlite3"),
            Some(FreshDbOptions::default())
        )
        .is_err());
        SqliteDb::new(tmp_dir.path().join("ceibad.sqlite3"), None).unwrap();

        // A missing file is reported as such.
        match SqliteDb::new(tmp_dir.path().join("nothere.sqlite3"), None) {
            Err(SqliteDbError::FileNotFound(_)) => {}
            other => panic!("expected a missing file error, got {:?}", other),
        }

        fs::remove_dir_all(tmp_dir).unwrap();
    }

    #[test]
    fn submissions_round_trip() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let db = new_db(tmp_dir.path());
        let mut conn = db.connection().unwrap();

        assert!(conn.db_submissions().is_empty());

        let store = SubmissionStore::new();
        let store = apply_primitive(store, Primitive::MoveTip { tip: Slot(50) });
        let store = apply_primitive(
            store,
            Primitive::AddSubmission {
                expiring: Slot(100),
                tx: dummy_tx(1),
            },
        );
        let store = apply_primitive(
            store,
            Primitive::AddSubmission {
                expiring: Slot(80),
                tx: dummy_tx(2),
            },
        );
        let store = apply_primitive(
            store,
            Primitive::MoveToLedger {
                acceptance: Slot(60),
                tx: dummy_tx(2),
            },
        );
        let store = apply_primitive(store, Primitive::MoveTip { tip: Slot(65) });
        conn.db_update_submissions(&store);

        // Reading from a second connection observes the same store.
        let mut other_conn = db.connection().unwrap();
        assert_eq!(other_conn.db_submissions(), store);

        fs::remove_dir_all(tmp_dir).unwrap();
    }

    #[test]
    fn with_submissions_is_read_modify_write() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let db = new_db(tmp_dir.path());
        let mut conn = db.connection().unwrap();

        conn.db_with_submissions(&mut |store| {
            apply_primitive(store, Primitive::MoveTip { tip: Slot(10) })
        });
        conn.db_with_submissions(&mut |store| {
            apply_primitive(
                store,
                Primitive::AddSubmission {
                    expiring: Slot(42),
                    tx: dummy_tx(7),
                },
            )
        });
        let store = conn.db_submissions();
        assert_eq!(store.tip(), Slot(10));
        assert!(matches!(
            store.status(&dummy_tx(7).tx_id()),
            Some(TxStatus::InSubmission { .. })
        ));

        fs::remove_dir_all(tmp_dir).unwrap();
    }

    #[test]
    fn checkpoints_and_rollback() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let db = new_db(tmp_dir.path());
        let mut conn = db.connection().unwrap();

        for slot in [10u64, 20, 30] {
            conn.db_put_checkpoint(&Checkpoint {
                slot: Slot(slot),
                payload: vec![slot as u8],
            });
        }
        assert_eq!(
            conn.db_list_checkpoints(),
            vec![Slot(10), Slot(20), Slot(30)]
        );
        assert_eq!(
            conn.db_checkpoint_at(Slot(20)).map(|c| c.payload),
            Some(vec![20])
        );
        assert_eq!(conn.db_checkpoint_at(Slot(25)), None);

        // Some chain state to roll back: accepted at 25, tip at 30.
        conn.db_with_submissions(&mut |store| {
            let store = apply_primitive(store, Primitive::MoveTip { tip: Slot(20) });
            let store = apply_primitive(
                store,
                Primitive::AddSubmission {
                    expiring: Slot(90),
                    tx: dummy_tx(1),
                },
            );
            let store = apply_primitive(
                store,
                Primitive::MoveToLedger {
                    acceptance: Slot(25),
                    tx: dummy_tx(1),
                },
            );
            apply_primitive(store, Primitive::MoveTip { tip: Slot(30) })
        });

        // No checkpoint at 25: we land on the one at 20, and the accepted
        // transaction reverts to pending.
        let actual = conn.db_rollback_to(Slot(25));
        assert_eq!(actual, Slot(20));
        assert_eq!(conn.db_list_checkpoints(), vec![Slot(10), Slot(20)]);
        let store = conn.db_submissions();
        assert_eq!(store.tip(), Slot(20));
        assert!(matches!(
            store.status(&dummy_tx(1).tx_id()),
            Some(TxStatus::InSubmission { .. })
        ));

        // Rolling back before every checkpoint lands on the minimum slot.
        let actual = conn.db_rollback_to(Slot(5));
        assert_eq!(actual, Slot::MIN);
        assert!(conn.db_list_checkpoints().is_empty());

        fs::remove_dir_all(tmp_dir).unwrap();
    }
}
