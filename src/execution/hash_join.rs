use std::collections::HashMap;

use anyhow::Result;

use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};
use crate::types::Value;

use super::expr::Expression;
use super::plan::JoinType;
use super::Executor;

/// Builds a hash table over the right child's keys during init, probes
/// with left tuples. LEFT joins emit null-padded rows on a probe miss.
pub struct HashJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    left_keys: Vec<Expression>,
    right_keys: Vec<Expression>,
    join_type: JoinType,
    out_schema: Schema,
    table: HashMap<Vec<Value>, Vec<Tuple>>,
    pending: Vec<Tuple>,
    current_left: Option<Tuple>,
}

impl HashJoinExecutor {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        left_keys: Vec<Expression>,
        right_keys: Vec<Expression>,
        join_type: JoinType,
    ) -> Self {
        let out_schema = left.output_schema().join(right.output_schema());
        Self {
            left,
            right,
            left_keys,
            right_keys,
            join_type,
            out_schema,
            table: HashMap::new(),
            pending: Vec::new(),
            current_left: None,
        }
    }

    fn combine(&self, left: &Tuple, right: Option<&Tuple>) -> Tuple {
        let mut values = left.values(self.left.output_schema());
        match right {
            Some(right) => values.extend(right.values(self.right.output_schema())),
            None => values.extend(
                std::iter::repeat(Value::Null).take(self.right.output_schema().len()),
            ),
        }
        Tuple::new(values, &self.out_schema)
    }
}

impl Executor for HashJoinExecutor {
    fn init(&mut self) -> Result<()> {
        self.table.clear();
        self.pending.clear();
        self.current_left = None;
        self.left.init()?;
        self.right.init()?;

        while let Some((tuple, _)) = self.right.next()? {
            let key: Vec<Value> = self
                .right_keys
                .iter()
                .map(|e| e.evaluate(&tuple, self.right.output_schema()))
                .collect();
            self.table.entry(key).or_default().push(tuple);
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        loop {
            if let Some(right_tuple) = self.pending.pop() {
                let left_tuple = self.current_left.as_ref().unwrap();
                let out = self.combine(left_tuple, Some(&right_tuple));
                return Ok(Some((out, Rid::default())));
            }

            let Some((left_tuple, _)) = self.left.next()? else {
                return Ok(None);
            };
            let key: Vec<Value> = self
                .left_keys
                .iter()
                .map(|e| e.evaluate(&left_tuple, self.left.output_schema()))
                .collect();

            match self.table.get(&key) {
                Some(matches) => {
                    // reversed so pop() walks build order
                    self.pending = matches.iter().rev().cloned().collect();
                    self.current_left = Some(left_tuple);
                }
                None if self.join_type == JoinType::Left => {
                    let out = self.combine(&left_tuple, None);
                    return Ok(Some((out, Rid::default())));
                }
                None => {}
            }
        }
    }

    fn output_schema(&self) -> &Schema {
        &self.out_schema
    }
}
