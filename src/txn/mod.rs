pub mod manager;
pub mod watermark;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::tuple::{Rid, Tuple};

pub type TxnId = u64;
pub type Timestamp = u64;
pub type TableOid = u32;

/// Partitions the timestamp space: below are commit timestamps, at or
/// above are transaction ids standing in for uncommitted writes.
pub const TXN_START_ID: u64 = 1 << 62;
pub const INVALID_TXN_ID: TxnId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    SnapshotIsolation,
    Serializable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Running,
    Tainted,
    Committed,
    Aborted,
}

/// Names one undo log inside its owning transaction. A link whose
/// transaction has been garbage collected terminates the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoLink {
    pub txn_id: TxnId,
    pub log_idx: usize,
}

impl UndoLink {
    pub fn new(txn_id: TxnId, log_idx: usize) -> Self {
        Self { txn_id, log_idx }
    }

    pub fn is_valid(&self) -> bool {
        self.txn_id != INVALID_TXN_ID
    }
}

/// Partial pre-image of one write. `tuple` holds values for exactly the
/// columns flagged in `modified_fields`, in schema order; `ts` is the
/// timestamp of the version this log reconstructs.
#[derive(Debug, Clone)]
pub struct UndoLog {
    pub is_deleted: bool,
    pub modified_fields: Vec<bool>,
    pub tuple: Tuple,
    pub ts: Timestamp,
    pub prev_version: Option<UndoLink>,
}

pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    read_ts: Timestamp,
    commit_ts: AtomicU64,
    state: Mutex<TxnState>,
    undo_logs: Mutex<Vec<UndoLog>>,
    write_set: Mutex<HashMap<TableOid, HashSet<Rid>>>,
}

impl Transaction {
    pub(crate) fn new(id: TxnId, read_ts: Timestamp, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            read_ts,
            commit_ts: AtomicU64::new(0),
            state: Mutex::new(TxnState::Running),
            undo_logs: Mutex::new(Vec::new()),
            write_set: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    /// The timestamp this transaction stamps on its uncommitted writes.
    pub fn temp_ts(&self) -> Timestamp {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn read_ts(&self) -> Timestamp {
        self.read_ts
    }

    pub fn commit_ts(&self) -> Timestamp {
        self.commit_ts.load(Ordering::Acquire)
    }

    pub(crate) fn set_commit_ts(&self, ts: Timestamp) {
        self.commit_ts.store(ts, Ordering::Release);
    }

    pub fn state(&self) -> TxnState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: TxnState) {
        *self.state.lock() = state;
    }

    /// Marks the transaction unusable after a write conflict. The caller
    /// must surface the failure and abort.
    pub fn set_tainted(&self) {
        let mut state = self.state.lock();
        if *state == TxnState::Running {
            *state = TxnState::Tainted;
        }
    }

    pub fn append_undo_log(&self, log: UndoLog) -> UndoLink {
        let mut logs = self.undo_logs.lock();
        logs.push(log);
        UndoLink::new(self.id, logs.len() - 1)
    }

    pub fn modify_undo_log(&self, log_idx: usize, log: UndoLog) {
        self.undo_logs.lock()[log_idx] = log;
    }

    pub fn undo_log(&self, log_idx: usize) -> Option<UndoLog> {
        self.undo_logs.lock().get(log_idx).cloned()
    }

    pub fn undo_log_count(&self) -> usize {
        self.undo_logs.lock().len()
    }

    pub fn append_write_set(&self, table: TableOid, rid: Rid) {
        self.write_set.lock().entry(table).or_default().insert(rid);
    }

    pub fn write_set_snapshot(&self) -> HashMap<TableOid, HashSet<Rid>> {
        self.write_set.lock().clone()
    }
}
