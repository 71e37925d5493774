use std::sync::Arc;

use anyhow::Result;

use crate::catalog::TableInfo;
use crate::tuple::schema::{Field, Schema};
use crate::tuple::{Rid, Tuple};
use crate::types::{Types, Value};

use super::common::mvcc_overwrite;
use super::{Executor, ExecutorContext};

/// Tombstones every child RID through the MVCC write rule. Index entries
/// stay put so older snapshots can still reach the versions behind them.
pub struct DeleteExecutor {
    ctx: ExecutorContext,
    table: Arc<TableInfo>,
    child: Box<dyn Executor>,
    out_schema: Schema,
    done: bool,
}

impl DeleteExecutor {
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

impl Executor for DeleteExecutor {
    fn init(&mut self) -> Result<()> {
        self.done = false;
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }

        let mut count = 0i64;
        while let Some((_, rid)) = self.child.next()? {
            mvcc_overwrite(&self.ctx, &self.table, rid, None)?;
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
