use std::sync::Arc;

use anyhow::{bail, Result};

use crate::catalog::TableInfo;
use crate::errors::Error;
use crate::tuple::schema::{Field, Schema};
use crate::tuple::{Rid, Tuple, TupleMeta};
use crate::types::{Types, Value};

use super::common::{index_key_for, mvcc_overwrite};
use super::expr::Expression;
use super::{Executor, ExecutorContext};

/// Rewrites every child row with the target expressions. The child's
/// output is materialised first so the updates can't chase their own
/// writes mid-scan. Primary-key changes run as a full two-phase
/// delete-then-insert over the batch.
pub struct UpdateExecutor {
    ctx: ExecutorContext,
    table: Arc<TableInfo>,
    child: Box<dyn Executor>,
    target_expressions: Vec<Expression>,
    out_schema: Schema,
    rows: Vec<(Tuple, Rid)>,
    done: bool,
}

impl UpdateExecutor {
    pub fn new(
        ctx: ExecutorContext,
        table: Arc<TableInfo>,
        child: Box<dyn Executor>,
        target_expressions: Vec<Expression>,
    ) -> Self {
        Self {
            ctx,
            table,
            child,
            target_expressions,
            out_schema: Schema::new(vec![Field::new("count", Types::Int)]),
            rows: Vec::new(),
            done: false,
        }
    }

    fn rewrite(&self, old: &Tuple) -> Tuple {
        let values: Vec<Value> = self
            .target_expressions
            .iter()
            .map(|e| e.evaluate(old, &self.table.schema))
            .collect();
        Tuple::new(values, &self.table.schema)
    }
}

impl Executor for UpdateExecutor {
    fn init(&mut self) -> Result<()> {
        self.done = false;
        self.rows.clear();
        self.child.init()?;
        while let Some(row) = self.child.next()? {
            self.rows.push(row);
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }

        let schema = &self.table.schema;
        let indexes = self.ctx.catalog.read().table_indexes(&self.table.name);
        let primary = indexes.iter().find(|i| i.is_primary_key);

        let rewritten: Vec<(Rid, Tuple, Tuple)> = self
            .rows
            .iter()
            .map(|(old, rid)| (*rid, old.clone(), self.rewrite(old)))
            .collect();

        let key_changes = primary.is_some_and(|pk| {
            rewritten.iter().any(|(_, old, new)| {
                index_key_for(old, schema, &pk.key_attrs)
                    != index_key_for(new, schema, &pk.key_attrs)
            })
        });

        if !key_changes {
            for (rid, _, new) in &rewritten {
                mvcc_overwrite(&self.ctx, &self.table, *rid, Some(new))?;
            }
        } else {
            let pk = primary.expect("key changes imply a primary index");
            // phase 1: tombstone every old row, keeping full pre-images
            for (rid, _, _) in &rewritten {
                mvcc_overwrite(&self.ctx, &self.table, *rid, None)?;
            }
            // phase 2: place the new rows, reclaiming tombstones on the way
            for (_, _, new) in &rewritten {
                let key = index_key_for(new, schema, &pk.key_attrs);
                match pk.index.get_value(&key)? {
                    Some(existing) => {
                        let meta = self.table.heap.get_tuple_meta(existing)?;
                        if !meta.is_deleted {
                            self.ctx.txn.set_tainted();
                            bail!(Error::DuplicateKey(format!(
                                "{}",
                                new.value_at(pk.key_attrs[0], schema)
                            )));
                        }
                        mvcc_overwrite(&self.ctx, &self.table, existing, Some(new))?;
                    }
                    None => {
                        let rid = self
                            .table
                            .heap
                            .insert_tuple(TupleMeta::new(self.ctx.txn.temp_ts(), false), new)?;
                        for index in &indexes {
                            index
                                .index
                                .insert(index_key_for(new, schema, &index.key_attrs), rid)?;
                        }
                        self.ctx.txn.append_write_set(self.table.oid, rid);
                    }
                }
            }
        }

        self.done = true;
        let out = Tuple::new(vec![Value::Int(rewritten.len() as i64)], &self.out_schema);
        Ok(Some((out, Rid::default())))
    }

    fn output_schema(&self) -> &Schema {
        &self.out_schema
    }
}
