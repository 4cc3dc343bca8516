use crate::database::WalletTx;

use std::convert::{TryFrom, TryInto};

use ceiba::submissions::{Slot, TxId, TxStatus};

pub const SCHEMA: &str = "\
CREATE TABLE version (
    version INTEGER NOT NULL
);

/* This stores metadata about our wallet. We only support a single wallet for
 * now (and the foreseeable future).
 *
 * The 'timestamp' field is the creation date of the wallet.
 * The 'tip_slot' and 'finality_slot' fields are the slot cursors of the
 * submission store; the per-transaction slots live in the submissions table.
 */
CREATE TABLE wallets (
    id INTEGER PRIMARY KEY NOT NULL,
    timestamp INTEGER NOT NULL,
    tip_slot INTEGER NOT NULL,
    finality_slot INTEGER NOT NULL,
    last_poll_timestamp INTEGER
);

/* The transactions we submitted and still track.
 *
 * The 'status' column tags the state: 0 for in-submission, 1 for in-ledger,
 * 2 for expired. The 'acceptance_slot' column is only set for in-ledger
 * entries.
 */
CREATE TABLE submissions (
    txid BLOB UNIQUE NOT NULL,
    status INTEGER NOT NULL CHECK (status IN (0,1,2)),
    expiring_slot INTEGER NOT NULL,
    acceptance_slot INTEGER,
    body BLOB NOT NULL
);

/* Wallet state snapshots indexed by slot, bounding how far back we can roll.
 * The payload is opaque to the database.
 */
CREATE TABLE checkpoints (
    slot INTEGER PRIMARY KEY NOT NULL,
    payload BLOB NOT NULL
);
";

pub const DB_VERSION: i64 = 0;

pub const STATUS_IN_SUBMISSION: i64 = 0;
pub const STATUS_IN_LEDGER: i64 = 1;
pub const STATUS_EXPIRED: i64 = 2;

pub fn slot_to_sql(slot: Slot) -> i64 {
    slot.0.try_into().expect("slot must fit in an i64")
}

pub fn slot_from_sql(value: i64) -> Slot {
    Slot(value.try_into().expect("slot must be non-negative"))
}

#[derive(Clone, Debug)]
pub struct DbWallet {
    pub timestamp: u32,
    pub tip_slot: Slot,
    pub finality_slot: Slot,
    pub last_poll_timestamp: Option<u32>,
}

impl TryFrom<&rusqlite::Row<'_>> for DbWallet {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, Self::Error> {
        let timestamp = row.get(1)?;
        let tip_slot = slot_from_sql(row.get(2)?);
        let finality_slot = slot_from_sql(row.get(3)?);
        let last_poll_timestamp = row.get(4)?;
        Ok(DbWallet {
            timestamp,
            tip_slot,
            finality_slot,
            last_poll_timestamp,
        })
    }
}

#[derive(Clone, Debug)]
pub struct DbSubmission {
    pub txid: TxId,
    pub status: i64,
    pub expiring_slot: Slot,
    pub acceptance_slot: Option<Slot>,
    pub body: Vec<u8>,
}

impl TryFrom<&rusqlite::Row<'_>> for DbSubmission {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, Self::Error> {
        let txid: Vec<u8> = row.get(0)?;
        let txid = TxId(
            txid.try_into()
                .expect("database txids must be 32 byte long"),
        );
        let status = row.get(1)?;
        let expiring_slot = slot_from_sql(row.get(2)?);
        let acceptance_slot = row.get::<_, Option<i64>>(3)?.map(slot_from_sql);
        let body = row.get(4)?;
        Ok(DbSubmission {
            txid,
            status,
            expiring_slot,
            acceptance_slot,
            body,
        })
    }
}

impl DbSubmission {
    /// The in-memory status this row encodes.
    pub fn into_status(self) -> (TxId, TxStatus<WalletTx>) {
        let tx = WalletTx {
            txid: self.txid,
            body: self.body,
        };
        let status = match self.status {
            STATUS_IN_SUBMISSION => TxStatus::InSubmission {
                expiring: self.expiring_slot,
                tx,
            },
            STATUS_IN_LEDGER => TxStatus::InLedger {
                expiring: self.expiring_slot,
                acceptance: self
                    .acceptance_slot
                    .expect("in-ledger rows always have an acceptance slot"),
                tx,
            },
            STATUS_EXPIRED => TxStatus::Expired {
                expiring: self.expiring_slot,
                tx,
            },
            tag => unreachable!("status tag '{}' is rejected by the schema", tag),
        };
        (self.txid, status)
    }

    /// The row encoding of an in-memory status.
    pub fn from_status(txid: TxId, status: &TxStatus<WalletTx>) -> DbSubmission {
        let (tag, acceptance_slot) = match status {
            TxStatus::InSubmission { .. } => (STATUS_IN_SUBMISSION, None),
            TxStatus::InLedger { acceptance, .. } => (STATUS_IN_LEDGER, Some(*acceptance)),
            TxStatus::Expired { .. } => (STATUS_EXPIRED, None),
        };
        DbSubmission {
            txid,
            status: tag,
            expiring_slot: status.expiring(),
            acceptance_slot,
            body: status.tx().body.clone(),
        }
    }
}
