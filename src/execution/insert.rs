use std::sync::Arc;

use anyhow::{bail, Result};

use crate::catalog::TableInfo;
use crate::errors::Error;
use crate::tuple::schema::{Field, Schema};
use crate::tuple::{Rid, Tuple, TupleMeta};
use crate::types::{Types, Value};

use super::common::{index_key_for, mvcc_overwrite};
use super::{Executor, ExecutorContext};

/// Inserts every child tuple. A live primary-key duplicate taints the
/// transaction; a tombstoned one is reclaimed in place. Emits the row
/// count once.
pub struct InsertExecutor {
    ctx: ExecutorContext,
    table: Arc<TableInfo>,
    child: Box<dyn Executor>,
    out_schema: Schema,
    done: bool,
}

impl InsertExecutor {
    pub fn new(ctx: ExecutorContext, table: Arc<TableInfo>, child: Box<dyn Executor>) -> Self {
        Self {
            ctx,
            table,
            child,
            out_schema: Schema::new(vec![Field::new("count", Types::Int)]),
            done: false,
        }
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> Result<()> {
        self.done = false;
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }

        let indexes = self.ctx.catalog.read().table_indexes(&self.table.name);
        let primary = indexes.iter().find(|i| i.is_primary_key);
        let schema = &self.table.schema;
        let mut count = 0i64;

        while let Some((tuple, _)) = self.child.next()? {
            if let Some(pk) = primary {
                let key = index_key_for(&tuple, schema, &pk.key_attrs);
                if let Some(existing) = pk.index.get_value(&key)? {
                    let meta = self.table.heap.get_tuple_meta(existing)?;
                    if meta.is_deleted {
                        // a deleted row under this key: take its slot over
                        mvcc_overwrite(&self.ctx, &self.table, existing, Some(&tuple))?;
                        count += 1;
                        continue;
                    }
                    self.ctx.txn.set_tainted();
                    bail!(Error::DuplicateKey(format!(
                        "{}",
                        tuple.value_at(pk.key_attrs[0], schema)
                    )));
                }
            }

            let rid = self
                .table
                .heap
                .insert_tuple(TupleMeta::new(self.ctx.txn.temp_ts(), false), &tuple)?;
            for index in &indexes {
                let key = index_key_for(&tuple, schema, &index.key_attrs);
                index.index.insert(key, rid)?;
            }
            self.ctx.txn.append_write_set(self.table.oid, rid);
            count += 1;
        }

        self.done = true;
        let out = Tuple::new(vec![Value::Int(count)], &self.out_schema);
        Ok(Some((out, Rid::default())))
    }

    fn output_schema(&self) -> &Schema {
        &self.out_schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::tests::{collect, renew_txn, test_context};
    use crate::execution::values::ValuesExecutor;
    use crate::txn::TxnState;

    fn seed_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", Types::UInt),
            Field::new("v", Types::Int),
        ])
    }

    fn insert_rows(
        ctx: &ExecutorContext,
        table: &Arc<TableInfo>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Vec<(Tuple, Rid)>> {
        let child = Box::new(ValuesExecutor::new(seed_schema(), rows));
        let mut insert = InsertExecutor::new(ctx.clone(), table.clone(), child);
        collect(&mut insert)
    }

    #[test]
    fn test_insert_reports_count() -> Result<()> {
        let ctx = test_context(64);
        let table = ctx.catalog.write().create_table("t", seed_schema())?;
        ctx.catalog.write().create_index("t_pk", "t", vec![0], true)?;

        let out = insert_rows(
            &ctx,
            &table,
            vec![
                vec![Value::UInt(1), Value::Int(10)],
                vec![Value::UInt(2), Value::Int(20)],
            ],
        )?;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0.value_at(0, &Schema::new(vec![Field::new("count", Types::Int)])), Value::Int(2));

        // rows carry the writer's temp ts until commit
        for (_, (meta, _)) in table.heap.iter() {
            assert_eq!(meta.ts, ctx.txn.temp_ts());
        }
        Ok(())
    }

    #[test]
    fn test_live_duplicate_taints() -> Result<()> {
        let ctx = test_context(64);
        let table = ctx.catalog.write().create_table("t", seed_schema())?;
        ctx.catalog.write().create_index("t_pk", "t", vec![0], true)?;

        insert_rows(&ctx, &table, vec![vec![Value::UInt(1), Value::Int(10)]])?;
        ctx.txn_manager.commit(&ctx.txn)?;

        let ctx2 = renew_txn(&ctx);
        let err = insert_rows(&ctx2, &table, vec![vec![Value::UInt(1), Value::Int(99)]]);
        assert!(err.is_err());
        assert_eq!(ctx2.txn.state(), TxnState::Tainted);
        Ok(())
    }

    #[test]
    fn test_tombstone_reclaimed() -> Result<()> {
        let ctx = test_context(64);
        let table = ctx.catalog.write().create_table("t", seed_schema())?;
        let pk = ctx.catalog.write().create_index("t_pk", "t", vec![0], true)?;

        insert_rows(&ctx, &table, vec![vec![Value::UInt(1), Value::Int(10)]])?;
        ctx.txn_manager.commit(&ctx.txn)?;

        // delete the row, commit, then insert the same key again
        let ctx2 = renew_txn(&ctx);
        let rid = pk
            .index
            .get_value(&index_key_for(
                &Tuple::new(vec![Value::UInt(1), Value::Int(0)], &seed_schema()),
                &seed_schema(),
                &[0],
            ))?
            .unwrap();
        mvcc_overwrite(&ctx2, &table, rid, None)?;
        ctx2.txn_manager.commit(&ctx2.txn)?;

        let ctx3 = renew_txn(&ctx);
        insert_rows(&ctx3, &table, vec![vec![Value::UInt(1), Value::Int(77)]])?;
        ctx3.txn_manager.commit(&ctx3.txn)?;

        // the key still maps to the one reclaimed slot
        let (meta, tuple) = table.heap.get_tuple(rid)?;
        assert!(!meta.is_deleted);
        assert_eq!(tuple.value_at(1, &table.schema), Value::Int(77));
        assert_eq!(table.heap.iter().count(), 1);
        Ok(())
    }
}
