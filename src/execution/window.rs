use std::collections::HashMap;

use anyhow::Result;

use crate::tuple::schema::{Field, Schema};
use crate::tuple::{Rid, Tuple};
use crate::types::{Types, Value};

use super::aggregation::{combine_aggregate, initial_aggregate};
use super::expr::Expression;
use super::plan::{AggregationType, OrderByType, WindowFunctionType};
use super::sort::compare_tuples;
use super::Executor;

struct RankState {
    last_keys: Option<Vec<Value>>,
    last_rank: i64,
    count: i64,
}

/// Window functions over partitions. With an ORDER BY the aggregates are
/// running (each row sees the fold so far, in sort order); without one,
/// every row of a partition carries the partition total. Rank is
/// competition-style: order-by ties share a rank.
pub struct WindowExecutor {
    child: Box<dyn Executor>,
    partition_by: Vec<Expression>,
    order_by: Vec<(OrderByType, Expression)>,
    functions: Vec<(WindowFunctionType, Expression)>,
    out_schema: Schema,
    results: Vec<Tuple>,
    cursor: usize,
}

impl WindowExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        partition_by: Vec<Expression>,
        order_by: Vec<(OrderByType, Expression)>,
        functions: Vec<(WindowFunctionType, Expression)>,
    ) -> Self {
        let child_schema = child.output_schema();
        let mut fields = child_schema.fields.clone();
        for (i, (ty, expr)) in functions.iter().enumerate() {
            let out_ty = match ty {
                WindowFunctionType::CountStar
                | WindowFunctionType::Count
                | WindowFunctionType::Rank => Types::Int,
                _ => super::plan::expression_type(expr, child_schema),
            };
            fields.push(Field::new(&format!("win_{i}"), out_ty));
        }
        Self {
            child,
            partition_by,
            order_by,
            functions,
            out_schema: Schema::new(fields),
            results: Vec::new(),
            cursor: 0,
        }
    }

    fn partition_key(&self, tuple: &Tuple, schema: &Schema) -> Vec<Value> {
        self.partition_by
            .iter()
            .map(|e| e.evaluate(tuple, schema))
            .collect()
    }

    fn as_aggregate(ty: WindowFunctionType) -> Option<AggregationType> {
        match ty {
            WindowFunctionType::CountStar => Some(AggregationType::CountStar),
            WindowFunctionType::Count => Some(AggregationType::Count),
            WindowFunctionType::Sum => Some(AggregationType::Sum),
            WindowFunctionType::Min => Some(AggregationType::Min),
            WindowFunctionType::Max => Some(AggregationType::Max),
            WindowFunctionType::Rank => None,
        }
    }
}

impl Executor for WindowExecutor {
    fn init(&mut self) -> Result<()> {
        self.results.clear();
        self.cursor = 0;
        self.child.init()?;

        let schema = self.child.output_schema().clone();
        let mut rows: Vec<Tuple> = Vec::new();
        while let Some((tuple, _)) = self.child.next()? {
            rows.push(tuple);
        }

        let ordered = !self.order_by.is_empty();
        if ordered {
            let order_by = self.order_by.clone();
            rows.sort_by(|a, b| compare_tuples(a, b, &schema, &order_by));
        }

        if ordered {
            // one accumulator map per function, folded in sort order
            let mut states: Vec<HashMap<Vec<Value>, Value>> =
                vec![HashMap::new(); self.functions.len()];
            let mut ranks: HashMap<Vec<Value>, RankState> = HashMap::new();

            for row in &rows {
                let key = self.partition_key(row, &schema);
                let mut values = row.values(&schema);
                for (i, (ty, expr)) in self.functions.iter().enumerate() {
                    match Self::as_aggregate(*ty) {
                        Some(agg) => {
                            let acc = states[i]
                                .entry(key.clone())
                                .or_insert_with(|| initial_aggregate(agg));
                            let input = expr.evaluate(row, &schema);
                            combine_aggregate(agg, acc, &input);
                            values.push(acc.clone());
                        }
                        None => {
                            let order_keys: Vec<Value> = self
                                .order_by
                                .iter()
                                .map(|(_, e)| e.evaluate(row, &schema))
                                .collect();
                            let state = ranks.entry(key.clone()).or_insert(RankState {
                                last_keys: None,
                                last_rank: 0,
                                count: 0,
                            });
                            state.count += 1;
                            if state.last_keys.as_ref() != Some(&order_keys) {
                                state.last_rank = state.count;
                                state.last_keys = Some(order_keys);
                            }
                            values.push(Value::Int(state.last_rank));
                        }
                    }
                }
                self.results.push(Tuple::new(values, &self.out_schema));
            }
        } else {
            // totals first, then one output row per input row
            let mut totals: Vec<HashMap<Vec<Value>, Value>> =
                vec![HashMap::new(); self.functions.len()];
            for row in &rows {
                let key = self.partition_key(row, &schema);
                for (i, (ty, expr)) in self.functions.iter().enumerate() {
                    let Some(agg) = Self::as_aggregate(*ty) else {
                        continue;
                    };
                    let acc = totals[i]
                        .entry(key.clone())
                        .or_insert_with(|| initial_aggregate(agg));
                    let input = expr.evaluate(row, &schema);
                    combine_aggregate(agg, acc, &input);
                }
            }
            for row in &rows {
                let key = self.partition_key(row, &schema);
                let mut values = row.values(&schema);
                for (i, (ty, _)) in self.functions.iter().enumerate() {
                    match Self::as_aggregate(*ty) {
                        Some(_) => values.push(totals[i].get(&key).cloned().unwrap_or(Value::Null)),
                        None => values.push(Value::Null),
                    }
                }
                self.results.push(Tuple::new(values, &self.out_schema));
            }
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        if self.cursor >= self.results.len() {
            return Ok(None);
        }
        let tuple = self.results[self.cursor].clone();
        self.cursor += 1;
        Ok(Some((tuple, Rid::default())))
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
                Field::new("p", Types::Int),
                Field::new("v", Types::Int),
            ]),
            rows,
        ))
    }

    fn int_at(tuple: &Tuple, idx: usize, schema: &Schema) -> i64 {
        match tuple.value_at(idx, schema) {
            Value::Int(v) => v,
            other => panic!("expected int, got {other:?}"),
        }
    }

    #[test]
    fn test_running_sum_per_partition() -> Result<()> {
        let mut window = WindowExecutor::new(
            child(vec![
                vec![Value::Int(1), Value::Int(3)],
                vec![Value::Int(2), Value::Int(10)],
                vec![Value::Int(1), Value::Int(1)],
                vec![Value::Int(1), Value::Int(2)],
            ]),
            vec![Expression::col(0)],
            vec![(OrderByType::Asc, Expression::col(1))],
            vec![(WindowFunctionType::Sum, Expression::col(1))],
        );
        let rows = collect(&mut window)?;
        let schema = window.output_schema().clone();

        // sorted by v: (1,1)=1, (1,2)=3, (1,3)=6, (2,10)=10
        let sums: Vec<(i64, i64)> = rows
            .iter()
            .map(|(t, _)| (int_at(t, 1, &schema), int_at(t, 2, &schema)))
            .collect();
        assert_eq!(sums, vec![(1, 1), (2, 3), (3, 6), (10, 10)]);
        Ok(())
    }

    #[test]
    fn test_partition_totals_without_order() -> Result<()> {
        let mut window = WindowExecutor::new(
            child(vec![
                vec![Value::Int(1), Value::Int(3)],
                vec![Value::Int(2), Value::Int(10)],
                vec![Value::Int(1), Value::Int(1)],
            ]),
            vec![Expression::col(0)],
            vec![],
            vec![(WindowFunctionType::Sum, Expression::col(1))],
        );
        let rows = collect(&mut window)?;
        let schema = window.output_schema().clone();

        for (tuple, _) in &rows {
            let p = int_at(tuple, 0, &schema);
            let total = int_at(tuple, 2, &schema);
            assert_eq!(total, if p == 1 { 4 } else { 10 });
        }
        Ok(())
    }

    #[test]
    fn test_rank_shares_on_ties() -> Result<()> {
        let mut window = WindowExecutor::new(
            child(vec![
                vec![Value::Int(1), Value::Int(5)],
                vec![Value::Int(1), Value::Int(5)],
                vec![Value::Int(1), Value::Int(7)],
                vec![Value::Int(1), Value::Int(9)],
            ]),
            vec![Expression::col(0)],
            vec![(OrderByType::Asc, Expression::col(1))],
            vec![(WindowFunctionType::Rank, Expression::col(1))],
        );
        let rows = collect(&mut window)?;
        let schema = window.output_schema().clone();

        let ranks: Vec<i64> = rows.iter().map(|(t, _)| int_at(t, 2, &schema)).collect();
        // two ties at rank 1, then competition ranking resumes at 3
        assert_eq!(ranks, vec![1, 1, 3, 4]);
        Ok(())
    }
}
