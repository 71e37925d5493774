use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;

use crate::catalog::{IndexInfo, IndexKey, TableInfo};
use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};
use crate::types::Value;

use super::common::read_tuple_snapshot;
use super::expr::Expression;
use super::{Executor, ExecutorContext};

/// Probes the index once per predicate key, then resolves the candidate
/// RIDs (deduplicated in input order) against the snapshot and the
/// residual predicate.
pub struct IndexScanExecutor {
    ctx: ExecutorContext,
    table: Arc<TableInfo>,
    index: Arc<IndexInfo>,
    pred_keys: Vec<Value>,
    predicate: Option<Expression>,
    rids: Vec<Rid>,
    cursor: usize,
}

impl IndexScanExecutor {
    pub fn new(
        ctx: ExecutorContext,
        table: Arc<TableInfo>,
        index: Arc<IndexInfo>,
        pred_keys: Vec<Value>,
        predicate: Option<Expression>,
    ) -> Self {
        Self {
            ctx,
            table,
            index,
            pred_keys,
            predicate,
            rids: Vec::new(),
            cursor: 0,
        }
    }
}

impl Executor for IndexScanExecutor {
    fn init(&mut self) -> Result<()> {
        self.rids.clear();
        self.cursor = 0;
        let mut seen = HashSet::new();
        for value in &self.pred_keys {
            let key = IndexKey::from_value(value);
            for rid in self.index.index.scan_key(&key)? {
                if seen.insert(rid) {
                    self.rids.push(rid);
                }
            }
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        while self.cursor < self.rids.len() {
            let rid = self.rids[self.cursor];
            self.cursor += 1;

            let (meta, tuple) = self.table.heap.get_tuple(rid)?;
            let Some(visible) = read_tuple_snapshot(
                &self.ctx.txn_manager,
                &self.ctx.txn,
                &self.table.schema,
                rid,
                &meta,
                &tuple,
            ) else {
                continue;
            };
            if let Some(predicate) = &self.predicate {
                if predicate.evaluate(&visible, &self.table.schema) != Value::Bool(true) {
                    continue;
                }
            }
            return Ok(Some((visible, rid)));
        }
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        &self.table.schema
    }
}
