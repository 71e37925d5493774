pub mod aggregation;
pub mod common;
pub mod delete;
pub mod expr;
pub mod hash_join;
pub mod index_scan;
pub mod insert;
pub mod limit;
pub mod nested_loop_join;
pub mod plan;
pub mod seq_scan;
pub mod sort;
pub mod topn;
pub mod update;
pub mod values;
pub mod window;

use std::sync::Arc;

use anyhow::Result;

use crate::buffer_pool::ArcBufferPool;
use crate::catalog::ArcCatalog;
use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};
use crate::txn::manager::TransactionManager;
use crate::txn::Transaction;

/// Everything an operator needs: the pool, the catalog, the transaction
/// manager and the transaction the query runs under.
#[derive(Clone)]
pub struct ExecutorContext {
    pub bpm: ArcBufferPool,
    pub catalog: ArcCatalog,
    pub txn_manager: Arc<TransactionManager>,
    pub txn: Arc<Transaction>,
}

/// Pull-based operator: `init` once, then `next` until it returns `None`.
/// Parents own their children.
pub trait Executor {
    fn init(&mut self) -> Result<()>;
    fn next(&mut self) -> Result<Option<(Tuple, Rid)>>;
    fn output_schema(&self) -> &Schema;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::buffer_pool::tests::test_arc_bpm;
    use crate::catalog::Catalog;
    use crate::txn::IsolationLevel;

    /// A context over a fresh pool and catalog, inside its own transaction.
    pub fn test_context(pool_size: usize) -> ExecutorContext {
        let bpm = test_arc_bpm(pool_size);
        let catalog = Catalog::new_arc(bpm.clone());
        let txn_manager = TransactionManager::new(catalog.clone());
        let txn = txn_manager.begin(IsolationLevel::SnapshotIsolation);
        ExecutorContext {
            bpm,
            catalog,
            txn_manager,
            txn,
        }
    }

    /// Fresh transaction over an existing context.
    pub fn renew_txn(ctx: &ExecutorContext) -> ExecutorContext {
        ExecutorContext {
            bpm: ctx.bpm.clone(),
            catalog: ctx.catalog.clone(),
            txn_manager: ctx.txn_manager.clone(),
            txn: ctx.txn_manager.begin(IsolationLevel::SnapshotIsolation),
        }
    }

    /// Drains an executor after init.
    pub fn collect(executor: &mut dyn Executor) -> Result<Vec<(Tuple, Rid)>> {
        executor.init()?;
        let mut out = vec![];
        while let Some(row) = executor.next()? {
            out.push(row);
        }
        Ok(out)
    }
}
