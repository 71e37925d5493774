use anyhow::Result;

use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};
use crate::types::Value;

use super::expr::Expression;
use super::plan::JoinType;
use super::Executor;

/// Re-initialises the right child for every left tuple. LEFT joins pad
/// with nulls when no right row matches.
pub struct NestedLoopJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    predicate: Option<Expression>,
    join_type: JoinType,
    out_schema: Schema,
    current_left: Option<Tuple>,
    current_matched: bool,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        predicate: Option<Expression>,
        join_type: JoinType,
    ) -> Self {
        let out_schema = left.output_schema().join(right.output_schema());
        Self {
            left,
            right,
            predicate,
            join_type,
            out_schema,
            current_left: None,
            current_matched: false,
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

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> Result<()> {
        self.current_left = None;
        self.current_matched = false;
        self.left.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        loop {
            if self.current_left.is_none() {
                match self.left.next()? {
                    Some((tuple, _)) => {
                        self.current_left = Some(tuple);
                        self.current_matched = false;
                        self.right.init()?;
                    }
                    None => return Ok(None),
                }
            }
            let left_tuple = self.current_left.clone().unwrap();

            while let Some((right_tuple, _)) = self.right.next()? {
                let accept = match &self.predicate {
                    None => true,
                    Some(predicate) => {
                        predicate.evaluate_join(
                            &left_tuple,
                            self.left.output_schema(),
                            Some(&right_tuple),
                            self.right.output_schema(),
                        ) == Value::Bool(true)
                    }
                };
                if accept {
                    self.current_matched = true;
                    let out = self.combine(&left_tuple, Some(&right_tuple));
                    return Ok(Some((out, Rid::default())));
                }
            }

            // right side exhausted for this left tuple
            let unmatched = !self.current_matched && self.join_type == JoinType::Left;
            self.current_left = None;
            if unmatched {
                let out = self.combine(&left_tuple, None);
                return Ok(Some((out, Rid::default())));
            }
        }
    }

    fn output_schema(&self) -> &Schema {
        &self.out_schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::expr::Expression;
    use crate::execution::tests::collect;
    use crate::execution::values::ValuesExecutor;
    use crate::tuple::schema::Field;
    use crate::types::Types;

    fn left_values() -> Box<ValuesExecutor> {
        Box::new(ValuesExecutor::new(
            Schema::new(vec![Field::new("l", Types::Int)]),
            vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(3)]],
        ))
    }

    fn right_values() -> Box<ValuesExecutor> {
        Box::new(ValuesExecutor::new(
            Schema::new(vec![Field::new("r", Types::Int)]),
            vec![vec![Value::Int(2)], vec![Value::Int(3)], vec![Value::Int(3)]],
        ))
    }

    fn join_predicate() -> Expression {
        Expression::eq(Expression::col_of(0, 0), Expression::col_of(1, 0))
    }

    #[test]
    fn test_inner_join() -> Result<()> {
        let mut join = NestedLoopJoinExecutor::new(
            left_values(),
            right_values(),
            Some(join_predicate()),
            JoinType::Inner,
        );
        let rows = collect(&mut join)?;
        // 1 matches nothing, 2 matches once, 3 matches twice
        assert_eq!(rows.len(), 3);
        Ok(())
    }

    #[test]
    fn test_left_join_pads() -> Result<()> {
        let mut join = NestedLoopJoinExecutor::new(
            left_values(),
            right_values(),
            Some(join_predicate()),
            JoinType::Left,
        );
        let rows = collect(&mut join)?;
        assert_eq!(rows.len(), 4);

        let schema = rows[0].0.values(join.output_schema());
        assert_eq!(schema.len(), 2);
        // the unmatched left row (1) pads its right side with null
        let padded = rows
            .iter()
            .find(|(t, _)| t.value_at(0, join.output_schema()) == Value::Int(1))
            .unwrap();
        assert!(padded.0.value_at(1, join.output_schema()).is_null());
        Ok(())
    }

    #[test]
    fn test_cross_join_without_predicate() -> Result<()> {
        let mut join =
            NestedLoopJoinExecutor::new(left_values(), right_values(), None, JoinType::Inner);
        assert_eq!(collect(&mut join)?.len(), 9);
        Ok(())
    }
}
