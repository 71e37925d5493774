use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use anyhow::Result;

use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};
use crate::types::Value;

use super::expr::Expression;
use super::plan::OrderByType;
use super::Executor;

/// Heap entry ordered by the precomputed sort keys; the max-heap keeps the
/// worst of the best N on top, ready to be displaced.
struct HeapEntry {
    sort_keys: Vec<Value>,
    directions: Arc<Vec<OrderByType>>,
    tuple: Tuple,
    rid: Rid,
}

impl HeapEntry {
    fn compare(&self, other: &Self) -> Ordering {
        for ((a, b), direction) in self
            .sort_keys
            .iter()
            .zip(other.sort_keys.iter())
            .zip(self.directions.iter())
        {
            let mut ord = a.compare(b);
            if *direction == OrderByType::Desc {
                ord = ord.reverse();
            }
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

/// Keeps only the first N rows of the sort order in a bounded heap.
pub struct TopNExecutor {
    child: Box<dyn Executor>,
    order_bys: Vec<(OrderByType, Expression)>,
    n: usize,
    sorted: Vec<(Tuple, Rid)>,
    cursor: usize,
}

impl TopNExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        order_bys: Vec<(OrderByType, Expression)>,
        n: usize,
    ) -> Self {
        Self {
            child,
            order_bys,
            n,
            sorted: Vec::new(),
            cursor: 0,
        }
    }
}

impl Executor for TopNExecutor {
    fn init(&mut self) -> Result<()> {
        self.sorted.clear();
        self.cursor = 0;
        self.child.init()?;

        let schema = self.child.output_schema().clone();
        let directions = Arc::new(
            self.order_bys
                .iter()
                .map(|(d, _)| *d)
                .collect::<Vec<_>>(),
        );

        let mut heap = BinaryHeap::with_capacity(self.n + 1);
        while let Some((tuple, rid)) = self.child.next()? {
            let sort_keys = self
                .order_bys
                .iter()
                .map(|(_, e)| e.evaluate(&tuple, &schema))
                .collect();
            heap.push(HeapEntry {
                sort_keys,
                directions: directions.clone(),
                tuple,
                rid,
            });
            if heap.len() > self.n {
                heap.pop();
            }
        }

        self.sorted = heap
            .into_sorted_vec()
            .into_iter()
            .map(|e| (e.tuple, e.rid))
            .collect();
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        if self.cursor >= self.sorted.len() {
            return Ok(None);
        }
        let row = self.sorted[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(row))
    }

    fn output_schema(&self) -> &Schema {
        self.child.output_schema()
    }
}
