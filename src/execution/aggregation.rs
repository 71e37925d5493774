use std::collections::HashMap;

use anyhow::Result;

use crate::tuple::schema::{Field, Schema};
use crate::tuple::{Rid, Tuple};
use crate::types::{Types, Value};

use super::expr::Expression;
use super::plan::AggregationType;
use super::Executor;

/// Starting accumulator: `CountStar` at zero, everything else null until
/// the first non-null input arrives.
pub(super) fn initial_aggregate(ty: AggregationType) -> Value {
    match ty {
        AggregationType::CountStar => Value::Int(0),
        _ => Value::Null,
    }
}

pub(super) fn combine_aggregate(ty: AggregationType, acc: &mut Value, input: &Value) {
    match ty {
        AggregationType::CountStar => *acc = acc.add(&Value::Int(1)),
        AggregationType::Count => {
            if !input.is_null() {
                *acc = match acc {
                    Value::Null => Value::Int(1),
                    ref other => other.add(&Value::Int(1)),
                };
            }
        }
        AggregationType::Sum => {
            if !input.is_null() {
                *acc = match acc {
                    Value::Null => input.clone(),
                    ref other => other.add(input),
                };
            }
        }
        AggregationType::Min => {
            if !input.is_null() {
                let replace = match acc {
                    Value::Null => true,
                    ref other => input.compare(other) == std::cmp::Ordering::Less,
                };
                if replace {
                    *acc = input.clone();
                }
            }
        }
        AggregationType::Max => {
            if !input.is_null() {
                let replace = match acc {
                    Value::Null => true,
                    ref other => input.compare(other) == std::cmp::Ordering::Greater,
                };
                if replace {
                    *acc = input.clone();
                }
            }
        }
    }
}

/// Hash aggregation over the group-by keys. Groups come back in first-seen
/// order; an empty input with no group-bys still produces one row.
pub struct AggregationExecutor {
    child: Box<dyn Executor>,
    group_bys: Vec<Expression>,
    aggregates: Vec<(AggregationType, Expression)>,
    out_schema: Schema,
    results: Vec<(Vec<Value>, Vec<Value>)>,
    cursor: usize,
}

impl AggregationExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        group_bys: Vec<Expression>,
        aggregates: Vec<(AggregationType, Expression)>,
    ) -> Self {
        let child_schema = child.output_schema();
        let mut fields = Vec::new();
        for (i, expr) in group_bys.iter().enumerate() {
            fields.push(Field::new(
                &format!("group_{i}"),
                super::plan::expression_type(expr, child_schema),
            ));
        }
        for (i, (ty, expr)) in aggregates.iter().enumerate() {
            let out_ty = match ty {
                AggregationType::CountStar | AggregationType::Count => Types::Int,
                _ => super::plan::expression_type(expr, child_schema),
            };
            fields.push(Field::new(&format!("agg_{i}"), out_ty));
        }
        Self {
            child,
            group_bys,
            aggregates,
            out_schema: Schema::new(fields),
            results: Vec::new(),
            cursor: 0,
        }
    }
}

impl Executor for AggregationExecutor {
    fn init(&mut self) -> Result<()> {
        self.results.clear();
        self.cursor = 0;
        self.child.init()?;

        let schema = self.child.output_schema().clone();
        let mut order: Vec<Vec<Value>> = Vec::new();
        let mut groups: HashMap<Vec<Value>, Vec<Value>> = HashMap::new();

        while let Some((tuple, _)) = self.child.next()? {
            let key: Vec<Value> = self
                .group_bys
                .iter()
                .map(|e| e.evaluate(&tuple, &schema))
                .collect();
            let accs = groups.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                self.aggregates
                    .iter()
                    .map(|(ty, _)| initial_aggregate(*ty))
                    .collect()
            });
            for ((ty, expr), acc) in self.aggregates.iter().zip(accs.iter_mut()) {
                let input = expr.evaluate(&tuple, &schema);
                combine_aggregate(*ty, acc, &input);
            }
        }

        if groups.is_empty() && self.group_bys.is_empty() {
            // empty input still aggregates to one row
            let accs = self
                .aggregates
                .iter()
                .map(|(ty, _)| initial_aggregate(*ty))
                .collect();
            self.results.push((vec![], accs));
        } else {
            for key in order {
                let accs = groups.remove(&key).unwrap();
                self.results.push((key, accs));
            }
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        if self.cursor >= self.results.len() {
            return Ok(None);
        }
        let (key, accs) = &self.results[self.cursor];
        self.cursor += 1;

        let mut values = key.clone();
        values.extend(accs.iter().cloned());
        Ok(Some((Tuple::new(values, &self.out_schema), Rid::default())))
    }

    fn output_schema(&self) -> &Schema {
        &self.out_schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::tests::collect;
    use crate::execution::values::ValuesExecutor;

    fn child(rows: Vec<Vec<Value>>) -> Box<ValuesExecutor> {
        Box::new(ValuesExecutor::new(
            Schema::new(vec![
                Field::new("g", Types::Int),
                Field::new("v", Types::Int),
            ]),
            rows,
        ))
    }

    #[test]
    fn test_group_by_with_sum_and_count() -> Result<()> {
        let mut agg = AggregationExecutor::new(
            child(vec![
                vec![Value::Int(1), Value::Int(10)],
                vec![Value::Int(2), Value::Int(5)],
                vec![Value::Int(1), Value::Int(7)],
                vec![Value::Int(1), Value::Null],
            ]),
            vec![Expression::col(0)],
            vec![
                (AggregationType::CountStar, Expression::lit(Value::Null)),
                (AggregationType::Count, Expression::col(1)),
                (AggregationType::Sum, Expression::col(1)),
            ],
        );
        let rows = collect(&mut agg)?;
        let schema = agg.output_schema().clone();
        assert_eq!(rows.len(), 2);

        // group 1: three rows, two non-null values summing 17
        let g1 = &rows[0].0;
        assert_eq!(g1.value_at(0, &schema), Value::Int(1));
        assert_eq!(g1.value_at(1, &schema), Value::Int(3));
        assert_eq!(g1.value_at(2, &schema), Value::Int(2));
        assert_eq!(g1.value_at(3, &schema), Value::Int(17));

        let g2 = &rows[1].0;
        assert_eq!(g2.value_at(0, &schema), Value::Int(2));
        assert_eq!(g2.value_at(3, &schema), Value::Int(5));
        Ok(())
    }

    #[test]
    fn test_min_max() -> Result<()> {
        let mut agg = AggregationExecutor::new(
            child(vec![
                vec![Value::Int(1), Value::Int(4)],
                vec![Value::Int(1), Value::Int(9)],
                vec![Value::Int(1), Value::Int(2)],
            ]),
            vec![],
            vec![
                (AggregationType::Min, Expression::col(1)),
                (AggregationType::Max, Expression::col(1)),
            ],
        );
        let rows = collect(&mut agg)?;
        let schema = agg.output_schema().clone();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.value_at(0, &schema), Value::Int(2));
        assert_eq!(rows[0].0.value_at(1, &schema), Value::Int(9));
        Ok(())
    }

    #[test]
    fn test_empty_input_no_groups() -> Result<()> {
        let mut agg = AggregationExecutor::new(
            child(vec![]),
            vec![],
            vec![
                (AggregationType::CountStar, Expression::lit(Value::Null)),
                (AggregationType::Sum, Expression::col(1)),
            ],
        );
        let rows = collect(&mut agg)?;
        let schema = agg.output_schema().clone();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.value_at(0, &schema), Value::Int(0));
        assert!(rows[0].0.value_at(1, &schema).is_null());
        Ok(())
    }

    #[test]
    fn test_empty_input_with_groups_is_empty() -> Result<()> {
        let mut agg = AggregationExecutor::new(
            child(vec![]),
            vec![Expression::col(0)],
            vec![(AggregationType::CountStar, Expression::lit(Value::Null))],
        );
        assert!(collect(&mut agg)?.is_empty());
        Ok(())
    }
}
