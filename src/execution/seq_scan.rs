use std::sync::Arc;

use anyhow::Result;

use crate::catalog::TableInfo;
use crate::table::TableIterator;
use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};
use crate::types::Value;

use super::common::read_tuple_snapshot;
use super::expr::Expression;
use super::{Executor, ExecutorContext};

/// Walks the table heap, resolving every slot against the transaction's
/// snapshot before the predicate sees it.
pub struct SeqScanExecutor {
    ctx: ExecutorContext,
    table: Arc<TableInfo>,
    predicate: Option<Expression>,
    iter: Option<TableIterator>,
}

impl SeqScanExecutor {
    pub fn new(ctx: ExecutorContext, table: Arc<TableInfo>, predicate: Option<Expression>) -> Self {
        Self {
            ctx,
            table,
            predicate,
            iter: None,
        }
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> Result<()> {
        self.iter = Some(self.table.heap.iter());
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        let iter = self.iter.as_mut().expect("executor not initialized");
        for (rid, (meta, tuple)) in iter.by_ref() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::expr::CompareOp;
    use crate::execution::tests::{collect, test_context};
    use crate::tuple::schema::Field;
    use crate::tuple::TupleMeta;
    use crate::types::Types;

    fn seed_table(ctx: &ExecutorContext) -> Result<Arc<TableInfo>> {
        let schema = Schema::new(vec![
            Field::new("id", Types::UInt),
            Field::new("v", Types::Int),
        ]);
        let table = ctx.catalog.write().create_table("t", schema.clone())?;
        for i in 0..5u64 {
            let tuple = Tuple::new(vec![Value::UInt(i), Value::Int(i as i64 * 10)], &schema);
            table.heap.insert_tuple(TupleMeta::new(0, false), &tuple)?;
        }
        Ok(table)
    }

    #[test]
    fn test_scan_all() -> Result<()> {
        let ctx = test_context(32);
        let table = seed_table(&ctx)?;

        let mut scan = SeqScanExecutor::new(ctx.clone(), table, None);
        let rows = collect(&mut scan)?;
        assert_eq!(rows.len(), 5);
        Ok(())
    }

    #[test]
    fn test_predicate_filters() -> Result<()> {
        let ctx = test_context(32);
        let table = seed_table(&ctx)?;

        let predicate = Expression::cmp(
            CompareOp::GtEq,
            Expression::col(1),
            Expression::lit(Value::Int(30)),
        );
        let mut scan = SeqScanExecutor::new(ctx.clone(), table.clone(), Some(predicate));
        let rows = collect(&mut scan)?;
        assert_eq!(rows.len(), 2);
        for (tuple, _) in rows {
            assert!(matches!(tuple.value_at(1, &table.schema), Value::Int(v) if v >= 30));
        }
        Ok(())
    }

    #[test]
    fn test_tombstones_invisible() -> Result<()> {
        let ctx = test_context(32);
        let table = seed_table(&ctx)?;

        let victim = table.heap.iter().next().unwrap().0;
        table.heap.update_tuple_meta(TupleMeta::new(0, true), victim)?;

        let mut scan = SeqScanExecutor::new(ctx.clone(), table, None);
        assert_eq!(collect(&mut scan)?.len(), 4);
        Ok(())
    }
}
