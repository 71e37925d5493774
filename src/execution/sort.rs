use std::cmp::Ordering;

use anyhow::Result;

use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};

use super::expr::Expression;
use super::plan::OrderByType;
use super::Executor;

/// Lexicographic tuple ordering over (direction, expression) pairs.
pub(super) fn compare_tuples(
    a: &Tuple,
    b: &Tuple,
    schema: &Schema,
    order_bys: &[(OrderByType, Expression)],
) -> Ordering {
    for (direction, expr) in order_bys {
        let va = expr.evaluate(a, schema);
        let vb = expr.evaluate(b, schema);
        let mut ord = va.compare(&vb);
        if *direction == OrderByType::Desc {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Buffers the whole child output and sorts it.
pub struct SortExecutor {
    child: Box<dyn Executor>,
    order_bys: Vec<(OrderByType, Expression)>,
    rows: Vec<(Tuple, Rid)>,
    cursor: usize,
}

impl SortExecutor {
    pub fn new(child: Box<dyn Executor>, order_bys: Vec<(OrderByType, Expression)>) -> Self {
        Self {
            child,
            order_bys,
            rows: Vec::new(),
            cursor: 0,
        }
    }
}

impl Executor for SortExecutor {
    fn init(&mut self) -> Result<()> {
        self.rows.clear();
        self.cursor = 0;
        self.child.init()?;
        while let Some(row) = self.child.next()? {
            self.rows.push(row);
        }
        let schema = self.child.output_schema().clone();
        let order_bys = self.order_bys.clone();
        self.rows
            .sort_by(|(a, _), (b, _)| compare_tuples(a, b, &schema, &order_bys));
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        if self.cursor >= self.rows.len() {
            return Ok(None);
        }
        let row = self.rows[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(row))
    }

    fn output_schema(&self) -> &Schema {
        self.child.output_schema()
    }
}
