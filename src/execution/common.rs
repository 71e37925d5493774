use anyhow::{bail, Result};

use crate::catalog::{IndexKey, TableInfo};
use crate::errors::Error;
use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple, TupleMeta};
use crate::txn::manager::TransactionManager;
use crate::txn::{Transaction, UndoLog, TXN_START_ID};
use crate::types::Value;

use super::ExecutorContext;

/// Serializes a tuple's key columns into the fixed-width index key. Nulls
/// (which unique columns shouldn't hold) degrade to a zero byte.
pub fn index_key_for(tuple: &Tuple, schema: &Schema, key_attrs: &[usize]) -> IndexKey {
    let mut buf = Vec::new();
    for attr in key_attrs {
        let value = tuple.value_at(*attr, schema);
        if value.is_null() {
            buf.push(0);
        } else {
            value.write_bytes(&mut buf);
        }
    }
    let mut key = IndexKey::default();
    let take = buf.len().min(key.0.len());
    key.0[..take].copy_from_slice(&buf[..take]);
    key
}

/// Replays undo logs (newest first) over a base version and returns the
/// reconstructed tuple, or `None` when that version is a deletion.
pub fn reconstruct_tuple(
    schema: &Schema,
    base_tuple: &Tuple,
    base_meta: &TupleMeta,
    undo_logs: &[UndoLog],
) -> Option<Tuple> {
    let mut result = if base_meta.is_deleted {
        None
    } else {
        Some(base_tuple.clone())
    };
    // last materialized version, the source of unmodified columns
    let mut values = base_tuple.values(schema);

    for log in undo_logs {
        if log.is_deleted {
            result = None;
            continue;
        }
        let modified: Vec<usize> = log
            .modified_fields
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.then_some(i))
            .collect();
        let partial_schema = schema.copy_schema(&modified);
        for (pos, col) in modified.iter().enumerate() {
            values[*col] = log.tuple.value_at(pos, &partial_schema);
        }
        let rebuilt = Tuple::new(values.clone(), schema);
        result = Some(rebuilt);
    }
    result
}

/// Applies the read rule for one heap tuple against the transaction's
/// snapshot: the base when it's committed-visible or self-written, else
/// the chain version at or below the read timestamp. `None` means the
/// tuple doesn't exist for this reader.
pub fn read_tuple_snapshot(
    txn_manager: &TransactionManager,
    txn: &Transaction,
    schema: &Schema,
    rid: Rid,
    meta: &TupleMeta,
    tuple: &Tuple,
) -> Option<Tuple> {
    if meta.ts < TXN_START_ID && meta.ts <= txn.read_ts() {
        return if meta.is_deleted {
            None
        } else {
            Some(tuple.clone())
        };
    }
    if meta.ts == txn.temp_ts() {
        return if meta.is_deleted {
            None
        } else {
            Some(tuple.clone())
        };
    }

    // walk the chain down to the first version this reader may see
    let mut logs = Vec::new();
    let mut link = txn_manager.get_undo_link(rid);
    let mut reachable = false;
    while let Some(l) = link.filter(|l| l.is_valid()) {
        let Some(log) = txn_manager.get_undo_log(l) else {
            break;
        };
        let ts = log.ts;
        let prev = log.prev_version;
        logs.push(log);
        if ts <= txn.read_ts() {
            reachable = true;
            break;
        }
        link = prev;
    }
    if !reachable {
        return None;
    }
    reconstruct_tuple(schema, tuple, meta, &logs)
}

/// The §write-rule for updates (`Some(new)`) and deletes (`None`) of an
/// existing row. Conflicting writes taint the transaction and fail; a
/// repeated write by the owner folds into its head undo log.
pub fn mvcc_overwrite(
    ctx: &ExecutorContext,
    table: &TableInfo,
    rid: Rid,
    new_tuple: Option<&Tuple>,
) -> Result<()> {
    let txn = &ctx.txn;
    let txn_manager = &ctx.txn_manager;
    let (meta, base) = table.heap.get_tuple(rid)?;

    if meta.ts == txn.temp_ts() {
        return overwrite_owned(ctx, table, rid, &base, new_tuple);
    }

    if meta.ts > txn.read_ts() {
        // a committed write this reader can't see, or another live writer
        txn.set_tainted();
        bail!(Error::WriteConflict(txn.id()));
    }

    let undo_log = pre_image(&table.schema, &meta, &base, new_tuple);
    let link = txn.append_undo_log(UndoLog {
        prev_version: txn_manager.get_undo_link(rid),
        ..undo_log
    });
    txn_manager.update_undo_link(rid, Some(link));

    match new_tuple {
        None => table
            .heap
            .update_tuple_meta(TupleMeta::new(txn.temp_ts(), true), rid)?,
        Some(new) => table
            .heap
            .update_tuple_in_place(TupleMeta::new(txn.temp_ts(), false), new, rid)?,
    }
    txn.append_write_set(table.oid, rid);
    Ok(())
}

/// Second (or later) write by the same transaction: no new log. Without a
/// chain head the slot is simply overwritten; with one, the head log's
/// column coverage widens to keep the pre-transaction image intact.
fn overwrite_owned(
    ctx: &ExecutorContext,
    table: &TableInfo,
    rid: Rid,
    base: &Tuple,
    new_tuple: Option<&Tuple>,
) -> Result<()> {
    let txn = &ctx.txn;
    let txn_manager = &ctx.txn_manager;

    if let Some(link) = txn_manager.get_undo_link(rid).filter(|l| l.txn_id == txn.id()) {
        let head = txn
            .undo_log(link.log_idx)
            .expect("chain head points past the undo logs");
        if !head.is_deleted {
            if let Some(new) = new_tuple {
                let merged = merge_into_head(&table.schema, &head, base, new);
                txn.modify_undo_log(link.log_idx, merged);
            } else {
                // delete after update: widen the log to the full pre-image
                let merged = widen_to_full(&table.schema, &head, base);
                txn.modify_undo_log(link.log_idx, merged);
            }
        }
    }

    match new_tuple {
        None => table
            .heap
            .update_tuple_meta(TupleMeta::new(txn.temp_ts(), true), rid)?,
        Some(new) => table
            .heap
            .update_tuple_in_place(TupleMeta::new(txn.temp_ts(), false), new, rid)?,
    }
    txn.append_write_set(table.oid, rid);
    Ok(())
}

/// Undo log capturing the old base for the columns about to change: the
/// diff for updates, every column for deletes, and the bare tombstone
/// state when the base is already deleted.
fn pre_image(
    schema: &Schema,
    meta: &TupleMeta,
    base: &Tuple,
    new_tuple: Option<&Tuple>,
) -> UndoLog {
    if meta.is_deleted {
        return UndoLog {
            is_deleted: true,
            modified_fields: vec![false; schema.len()],
            tuple: Tuple::new(vec![], &Schema::new(vec![])),
            ts: meta.ts,
            prev_version: None,
        };
    }

    let old_values = base.values(schema);
    let (modified_fields, kept): (Vec<bool>, Vec<Option<Value>>) = match new_tuple {
        None => (
            vec![true; schema.len()],
            old_values.iter().cloned().map(Some).collect(),
        ),
        Some(new) => {
            let new_values = new.values(schema);
            old_values
                .iter()
                .zip(new_values.iter())
                .map(|(old, new)| {
                    if old == new {
                        (false, None)
                    } else {
                        (true, Some(old.clone()))
                    }
                })
                .unzip()
        }
    };

    let indices: Vec<usize> = modified_fields
        .iter()
        .enumerate()
        .filter_map(|(i, m)| m.then_some(i))
        .collect();
    let partial_values: Vec<Value> = kept.into_iter().flatten().collect();
    UndoLog {
        is_deleted: false,
        modified_fields,
        tuple: Tuple::new(partial_values, &schema.copy_schema(&indices)),
        ts: meta.ts,
        prev_version: None,
    }
}

/// Expands the head log to also cover columns this new write touches,
/// keeping the older pre-image for columns it already covered.
fn merge_into_head(schema: &Schema, head: &UndoLog, base: &Tuple, new: &Tuple) -> UndoLog {
    let old_indices: Vec<usize> = head
        .modified_fields
        .iter()
        .enumerate()
        .filter_map(|(i, m)| m.then_some(i))
        .collect();
    let old_partial_schema = schema.copy_schema(&old_indices);

    let base_values = base.values(schema);
    let new_values = new.values(schema);

    let mut modified_fields = head.modified_fields.clone();
    let mut merged_values: Vec<Option<Value>> = vec![None; schema.len()];
    for (pos, col) in old_indices.iter().enumerate() {
        merged_values[*col] = Some(head.tuple.value_at(pos, &old_partial_schema));
    }
    for (col, (base_v, new_v)) in base_values.iter().zip(new_values.iter()).enumerate() {
        if !modified_fields[col] && base_v != new_v {
            modified_fields[col] = true;
            merged_values[col] = Some(base_v.clone());
        }
    }

    let indices: Vec<usize> = modified_fields
        .iter()
        .enumerate()
        .filter_map(|(i, m)| m.then_some(i))
        .collect();
    let partial_values: Vec<Value> = merged_values.into_iter().flatten().collect();
    UndoLog {
        is_deleted: head.is_deleted,
        modified_fields,
        tuple: Tuple::new(partial_values, &schema.copy_schema(&indices)),
        ts: head.ts,
        prev_version: head.prev_version,
    }
}

/// Delete after an in-transaction update: the head log must restore every
/// column, not just the ones the update touched.
fn widen_to_full(schema: &Schema, head: &UndoLog, base: &Tuple) -> UndoLog {
    let old_indices: Vec<usize> = head
        .modified_fields
        .iter()
        .enumerate()
        .filter_map(|(i, m)| m.then_some(i))
        .collect();
    let old_partial_schema = schema.copy_schema(&old_indices);

    let mut values = base.values(schema);
    for (pos, col) in old_indices.iter().enumerate() {
        values[*col] = head.tuple.value_at(pos, &old_partial_schema);
    }

    UndoLog {
        is_deleted: head.is_deleted,
        modified_fields: vec![true; schema.len()],
        tuple: Tuple::new(values, schema),
        ts: head.ts,
        prev_version: head.prev_version,
    }
}
