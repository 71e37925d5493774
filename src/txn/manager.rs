use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use parking_lot::{Mutex, RwLock};

use crate::catalog::ArcCatalog;
use crate::errors::Error;
use crate::execution::common::reconstruct_tuple;
use crate::pages::PageId;
use crate::printdbg;
use crate::tuple::{Rid, TupleMeta};

use super::watermark::Watermark;
use super::{
    IsolationLevel, Timestamp, Transaction, TxnId, TxnState, UndoLink, UndoLog, TXN_START_ID,
};

/// The txn map and the live-reads watermark share one lock; readers take
/// the shared side, begin/abort/GC take the exclusive side.
struct TxnMapInner {
    txns: HashMap<TxnId, Arc<Transaction>>,
    running: Watermark,
}

pub struct TransactionManager {
    inner: RwLock<TxnMapInner>,
    next_txn_id: AtomicU64,
    last_commit_ts: AtomicU64,
    /// serialises committers; always taken before the txn-map lock
    commit_mutex: Mutex<()>,
    /// per-page version chain heads, keyed by slot within the page
    version_info: Mutex<HashMap<PageId, HashMap<u16, UndoLink>>>,
    catalog: ArcCatalog,
}

impl TransactionManager {
    pub fn new(catalog: ArcCatalog) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(TxnMapInner {
                txns: HashMap::new(),
                running: Watermark::new(),
            }),
            next_txn_id: AtomicU64::new(TXN_START_ID),
            last_commit_ts: AtomicU64::new(0),
            commit_mutex: Mutex::new(()),
            version_info: Mutex::new(HashMap::new()),
            catalog,
        })
    }

    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let mut inner = self.inner.write();
        let id = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
        let read_ts = self.last_commit_ts.load(Ordering::Acquire);
        let txn = Arc::new(Transaction::new(id, read_ts, isolation_level));
        inner
            .running
            .add_txn(read_ts)
            .expect("fresh read ts below the committed baseline");
        inner.txns.insert(id, txn.clone());

        printdbg!("txn {} began at read ts {read_ts}", id - TXN_START_ID);
        txn
    }

    pub fn get_txn(&self, id: TxnId) -> Option<Arc<Transaction>> {
        self.inner.read().txns.get(&id).cloned()
    }

    pub fn last_commit_ts(&self) -> Timestamp {
        self.last_commit_ts.load(Ordering::Acquire)
    }

    pub fn get_watermark(&self) -> Timestamp {
        self.inner.read().running.watermark()
    }

    /// Serializable validation hook. Declared but unimplemented; a `false`
    /// return routes the commit through abort.
    fn verify_txn(&self, _txn: &Transaction) -> bool {
        true
    }

    /// Stamps the new commit timestamp onto every write-set RID
    /// (preserving tombstones) and publishes it. Returns `false` when
    /// serializable verification rejects the transaction, which is then
    /// aborted.
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<bool> {
        let commit_guard = self.commit_mutex.lock();
        if txn.state() != TxnState::Running {
            bail!(Error::TxnNotRunning(txn.id()));
        }
        if txn.isolation_level() == IsolationLevel::Serializable && !self.verify_txn(txn) {
            drop(commit_guard);
            self.abort(txn)?;
            return Ok(false);
        }

        // resolve the write set to heaps before locking the txn map, so the
        // catalog lock is never nested inside it
        let stamped = {
            let catalog = self.catalog.read();
            let mut stamped = Vec::new();
            for (table_oid, rids) in txn.write_set_snapshot() {
                let table = catalog
                    .get_table_by_oid(table_oid)
                    .ok_or(anyhow!(Error::Internal(format!(
                        "write set names unknown table {table_oid}"
                    ))))?;
                stamped.push((table, rids));
            }
            stamped
        };

        let mut inner = self.inner.write();
        let commit_ts = self.last_commit_ts.load(Ordering::Acquire) + 1;

        for (table, rids) in stamped {
            for rid in rids {
                let meta = table.heap.get_tuple_meta(rid)?;
                table
                    .heap
                    .update_tuple_meta(TupleMeta::new(commit_ts, meta.is_deleted), rid)?;
            }
        }

        self.last_commit_ts.store(commit_ts, Ordering::Release);
        txn.set_commit_ts(commit_ts);
        txn.set_state(TxnState::Committed);
        inner.running.update_commit_ts(commit_ts);
        inner.running.remove_txn(txn.read_ts());

        printdbg!("txn {} committed at ts {commit_ts}", txn.id() - TXN_START_ID);
        Ok(true)
    }

    /// Rolls back every base tuple the transaction still owns: the head
    /// undo log's pre-image is written back and unlinked, a fresh insert
    /// turns into a tombstone.
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<()> {
        let state = txn.state();
        if state != TxnState::Running && state != TxnState::Tainted {
            bail!(Error::TxnNotRunning(txn.id()));
        }

        {
            let catalog = self.catalog.read();
            for (table_oid, rids) in txn.write_set_snapshot() {
                let Some(table) = catalog.get_table_by_oid(table_oid) else {
                    continue;
                };
                for rid in rids {
                    let (base_meta, base_tuple) = table.heap.get_tuple(rid)?;
                    if base_meta.ts != txn.temp_ts() {
                        continue;
                    }
                    match self.get_undo_link(rid) {
                        Some(link) if link.txn_id == txn.id() => {
                            let log = txn.undo_log(link.log_idx).ok_or(anyhow!(
                                Error::Internal("chain head points past the undo logs".into())
                            ))?;
                            let restored = reconstruct_tuple(
                                &table.schema,
                                &base_tuple,
                                &base_meta,
                                std::slice::from_ref(&log),
                            );
                            match restored {
                                Some(tuple) => table.heap.update_tuple_in_place(
                                    TupleMeta::new(log.ts, false),
                                    &tuple,
                                    rid,
                                )?,
                                None => table
                                    .heap
                                    .update_tuple_meta(TupleMeta::new(log.ts, true), rid)?,
                            }
                            self.update_undo_link(rid, log.prev_version);
                        }
                        _ => {
                            // the transaction inserted this tuple itself
                            table.heap.update_tuple_meta(TupleMeta::new(0, true), rid)?;
                        }
                    }
                }
            }
        }

        let mut inner = self.inner.write();
        txn.set_state(TxnState::Aborted);
        inner.running.remove_txn(txn.read_ts());

        printdbg!("txn {} aborted", txn.id() - TXN_START_ID);
        Ok(())
    }

    pub fn get_undo_link(&self, rid: Rid) -> Option<UndoLink> {
        self.version_info
            .lock()
            .get(&rid.page_id)?
            .get(&rid.slot)
            .copied()
    }

    pub fn update_undo_link(&self, rid: Rid, link: Option<UndoLink>) {
        let mut info = self.version_info.lock();
        match link {
            Some(link) => {
                info.entry(rid.page_id).or_default().insert(rid.slot, link);
            }
            None => {
                if let Some(page) = info.get_mut(&rid.page_id) {
                    page.remove(&rid.slot);
                }
            }
        }
    }

    /// Resolves a link against the txn map. `None` terminates a chain:
    /// the owning transaction has been garbage collected.
    pub fn get_undo_log(&self, link: UndoLink) -> Option<UndoLog> {
        self.inner.read().txns.get(&link.txn_id)?.undo_log(link.log_idx)
    }

    /// Reclaims undo logs no reader at or above the watermark can need.
    /// Walks every chain; the first version at or below the watermark is
    /// kept, everything older is collectable. A terminated transaction
    /// whose logs are all collectable is dropped from the map.
    pub fn garbage_collection(&self) -> Result<()> {
        let tables = self.catalog.read().tables();
        let mut inner = self.inner.write();
        let watermark = inner.running.watermark();

        let mut collectable: HashMap<TxnId, usize> = HashMap::new();
        for (id, txn) in inner.txns.iter() {
            if matches!(txn.state(), TxnState::Committed | TxnState::Aborted) {
                collectable.insert(*id, 0);
            }
        }

        {
            for table in &tables {
                for (rid, (meta, _)) in table.heap.iter() {
                    let mut keep_next = meta.ts > watermark;
                    let mut link = self.get_undo_link(rid);
                    while let Some(l) = link.filter(UndoLink::is_valid) {
                        let Some(owner) = inner.txns.get(&l.txn_id) else {
                            break;
                        };
                        let Some(log) = owner.undo_log(l.log_idx) else {
                            break;
                        };
                        if log.ts <= watermark {
                            if keep_next {
                                keep_next = false;
                            } else if let Some(count) = collectable.get_mut(&l.txn_id) {
                                *count += 1;
                            }
                        }
                        link = log.prev_version;
                    }
                }
            }
        }

        for (txn_id, count) in collectable {
            let fully_collectable = inner
                .txns
                .get(&txn_id)
                .map(|t| t.undo_log_count() == count)
                .unwrap_or(false);
            if fully_collectable {
                inner.txns.remove(&txn_id);
                printdbg!("gc dropped txn {}", txn_id - TXN_START_ID);
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn live_txn_count(&self) -> usize {
        self.inner.read().txns.len()
    }
}
