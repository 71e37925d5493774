use crate::catalog::Catalog;
use crate::execution::expr::{CompareOp, Expression, LogicOp};
use crate::execution::plan::{
    HashJoinPlan, IndexScanPlan, LimitPlan, PlanNode, TopNPlan,
};
use crate::types::Value;

/// The full rewrite pipeline, applied bottom-up.
pub fn optimize(plan: PlanNode, catalog: &Catalog) -> PlanNode {
    let plan = optimize_nlj_as_hash_join(plan);
    let plan = optimize_seq_scan_as_index_scan(plan, catalog);
    optimize_sort_limit_as_topn(plan)
}

fn transform_children(plan: PlanNode, f: &mut dyn FnMut(PlanNode) -> PlanNode) -> PlanNode {
    match plan {
        PlanNode::SeqScan(_) | PlanNode::IndexScan(_) | PlanNode::Values(_) => plan,
        PlanNode::Insert(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Insert(p)
        }
        PlanNode::Delete(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Delete(p)
        }
        PlanNode::Update(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Update(p)
        }
        PlanNode::NestedLoopJoin(mut p) => {
            p.left = Box::new(f(*p.left));
            p.right = Box::new(f(*p.right));
            PlanNode::NestedLoopJoin(p)
        }
        PlanNode::HashJoin(mut p) => {
            p.left = Box::new(f(*p.left));
            p.right = Box::new(f(*p.right));
            PlanNode::HashJoin(p)
        }
        PlanNode::Aggregation(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Aggregation(p)
        }
        PlanNode::Sort(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Sort(p)
        }
        PlanNode::Limit(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Limit(p)
        }
        PlanNode::TopN(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::TopN(p)
        }
        PlanNode::Window(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Window(p)
        }
    }
}

/// NestedLoopJoin whose predicate is a conjunction of equalities between
/// the two sides becomes a HashJoin. Anything else stays put.
pub fn optimize_nlj_as_hash_join(plan: PlanNode) -> PlanNode {
    let plan = transform_children(plan, &mut optimize_nlj_as_hash_join);
    let PlanNode::NestedLoopJoin(nlj) = plan else {
        return plan;
    };
    let Some(predicate) = &nlj.predicate else {
        return PlanNode::NestedLoopJoin(nlj);
    };

    let mut left_keys = Vec::new();
    let mut right_keys = Vec::new();
    if !split_equi_conjunction(predicate, &mut left_keys, &mut right_keys) {
        return PlanNode::NestedLoopJoin(nlj);
    }

    PlanNode::HashJoin(HashJoinPlan {
        left: nlj.left,
        right: nlj.right,
        left_keys,
        right_keys,
        join_type: nlj.join_type,
    })
}

fn split_equi_conjunction(
    expr: &Expression,
    left_keys: &mut Vec<Expression>,
    right_keys: &mut Vec<Expression>,
) -> bool {
    match expr {
        Expression::Logic {
            op: LogicOp::And,
            left,
            right,
        } => {
            split_equi_conjunction(left, left_keys, right_keys)
                && split_equi_conjunction(right, left_keys, right_keys)
        }
        Expression::Compare {
            op: CompareOp::Eq,
            left,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (
                Expression::Column { side: 0, idx: l },
                Expression::Column { side: 1, idx: r },
            ) => {
                left_keys.push(Expression::col(*l));
                right_keys.push(Expression::col(*r));
                true
            }
            (
                Expression::Column { side: 1, idx: r },
                Expression::Column { side: 0, idx: l },
            ) => {
                left_keys.push(Expression::col(*l));
                right_keys.push(Expression::col(*r));
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// SeqScan whose predicate is an equality (or an OR-chain of equalities)
/// on one indexed column becomes an IndexScan over the constant keys. The
/// original predicate is kept as the residual filter.
pub fn optimize_seq_scan_as_index_scan(plan: PlanNode, catalog: &Catalog) -> PlanNode {
    let plan = transform_children(plan, &mut |p| optimize_seq_scan_as_index_scan(p, catalog));
    let PlanNode::SeqScan(scan) = plan else {
        return plan;
    };
    let Some(predicate) = &scan.predicate else {
        return PlanNode::SeqScan(scan);
    };
    let Some((column, pred_keys)) = single_column_equalities(predicate) else {
        return PlanNode::SeqScan(scan);
    };

    for index in catalog.table_indexes(&scan.table) {
        if index.key_attrs == [column] {
            return PlanNode::IndexScan(IndexScanPlan {
                table: scan.table.clone(),
                index: index.name.clone(),
                pred_keys,
                predicate: scan.predicate.clone(),
            });
        }
    }
    PlanNode::SeqScan(scan)
}

fn single_column_equalities(expr: &Expression) -> Option<(usize, Vec<Value>)> {
    match expr {
        Expression::Logic {
            op: LogicOp::Or,
            left,
            right,
        } => {
            let (lcol, mut lkeys) = single_column_equalities(left)?;
            let (rcol, rkeys) = single_column_equalities(right)?;
            if lcol != rcol {
                return None;
            }
            lkeys.extend(rkeys);
            Some((lcol, lkeys))
        }
        Expression::Compare {
            op: CompareOp::Eq,
            left,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (Expression::Column { side: 0, idx }, Expression::Literal(value))
            | (Expression::Literal(value), Expression::Column { side: 0, idx }) => {
                Some((*idx, vec![value.clone()]))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Limit directly over Sort becomes TopN.
pub fn optimize_sort_limit_as_topn(plan: PlanNode) -> PlanNode {
    let plan = transform_children(plan, &mut optimize_sort_limit_as_topn);
    match plan {
        PlanNode::Limit(limit) => match *limit.child {
            PlanNode::Sort(sort) => PlanNode::TopN(TopNPlan {
                child: sort.child,
                order_bys: sort.order_bys,
                n: limit.limit,
            }),
            other => PlanNode::Limit(LimitPlan {
                child: Box::new(other),
                limit: limit.limit,
            }),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::plan::{
        JoinType, NestedLoopJoinPlan, OrderByType, SeqScanPlan, SortPlan, ValuesPlan,
    };
    use crate::execution::plan::build_executor;
    use crate::execution::tests::{collect, test_context};
    use crate::tuple::schema::{Field, Schema};
    use crate::tuple::TupleMeta;
    use crate::tuple::Tuple;
    use crate::types::Types;
    use anyhow::Result;

    fn values_plan() -> Box<PlanNode> {
        Box::new(PlanNode::Values(ValuesPlan {
            schema: Schema::new(vec![Field::new("a", Types::Int)]),
            rows: vec![],
        }))
    }

    #[test]
    fn test_nlj_with_equi_conjunction_becomes_hash_join() {
        let predicate = Expression::and(
            Expression::eq(Expression::col_of(0, 0), Expression::col_of(1, 1)),
            Expression::eq(Expression::col_of(1, 0), Expression::col_of(0, 1)),
        );
        let plan = PlanNode::NestedLoopJoin(NestedLoopJoinPlan {
            left: values_plan(),
            right: values_plan(),
            predicate: Some(predicate),
            join_type: JoinType::Inner,
        });

        let PlanNode::HashJoin(join) = optimize_nlj_as_hash_join(plan) else {
            panic!("expected a hash join");
        };
        assert_eq!(join.left_keys, vec![Expression::col(0), Expression::col(1)]);
        assert_eq!(join.right_keys, vec![Expression::col(1), Expression::col(0)]);
    }

    #[test]
    fn test_non_equi_join_stays_nlj() {
        let predicate = Expression::cmp(
            CompareOp::Lt,
            Expression::col_of(0, 0),
            Expression::col_of(1, 0),
        );
        let plan = PlanNode::NestedLoopJoin(NestedLoopJoinPlan {
            left: values_plan(),
            right: values_plan(),
            predicate: Some(predicate),
            join_type: JoinType::Inner,
        });
        assert!(matches!(
            optimize_nlj_as_hash_join(plan),
            PlanNode::NestedLoopJoin(_)
        ));
    }

    #[test]
    fn test_sort_limit_becomes_topn() {
        let plan = PlanNode::Limit(LimitPlan {
            child: Box::new(PlanNode::Sort(SortPlan {
                child: values_plan(),
                order_bys: vec![(OrderByType::Asc, Expression::col(0))],
            })),
            limit: 5,
        });

        let PlanNode::TopN(topn) = optimize_sort_limit_as_topn(plan) else {
            panic!("expected topn");
        };
        assert_eq!(topn.n, 5);
        assert_eq!(topn.order_bys.len(), 1);
    }

    #[test]
    fn test_limit_without_sort_survives() {
        let plan = PlanNode::Limit(LimitPlan {
            child: values_plan(),
            limit: 5,
        });
        assert!(matches!(
            optimize_sort_limit_as_topn(plan),
            PlanNode::Limit(_)
        ));
    }

    #[test]
    fn test_seq_scan_with_indexed_equality_becomes_index_scan() -> Result<()> {
        let ctx = test_context(64);
        let schema = Schema::new(vec![
            Field::new("id", Types::UInt),
            Field::new("v", Types::Int),
        ]);
        let table = ctx.catalog.write().create_table("t", schema.clone())?;
        let pk = ctx.catalog.write().create_index("t_pk", "t", vec![0], true)?;

        for i in 0..4u64 {
            let tuple = Tuple::new(vec![Value::UInt(i), Value::Int(i as i64)], &schema);
            let rid = table.heap.insert_tuple(TupleMeta::new(0, false), &tuple)?;
            pk.index.insert(
                crate::catalog::IndexKey::from_value(&Value::UInt(i)),
                rid,
            )?;
        }

        let predicate = Expression::or(
            Expression::eq(Expression::col(0), Expression::lit(Value::UInt(1))),
            Expression::eq(Expression::col(0), Expression::lit(Value::UInt(3))),
        );
        let plan = PlanNode::SeqScan(SeqScanPlan {
            table: "t".into(),
            predicate: Some(predicate),
        });

        let optimized = {
            let catalog = ctx.catalog.read();
            optimize_seq_scan_as_index_scan(plan, &catalog)
        };
        let PlanNode::IndexScan(ref scan) = optimized else {
            panic!("expected an index scan");
        };
        assert_eq!(scan.index, "t_pk");
        assert_eq!(scan.pred_keys, vec![Value::UInt(1), Value::UInt(3)]);

        // the rewritten plan returns the same rows
        let mut executor = build_executor(&ctx, &optimized)?;
        let rows = collect(executor.as_mut())?;
        assert_eq!(rows.len(), 2);
        Ok(())
    }

    #[test]
    fn test_mixed_or_columns_not_rewritten() -> Result<()> {
        let ctx = test_context(32);
        ctx.catalog.write().create_table(
            "t",
            Schema::new(vec![
                Field::new("id", Types::UInt),
                Field::new("v", Types::Int),
            ]),
        )?;
        ctx.catalog.write().create_index("t_pk", "t", vec![0], true)?;

        let predicate = Expression::or(
            Expression::eq(Expression::col(0), Expression::lit(Value::UInt(1))),
            Expression::eq(Expression::col(1), Expression::lit(Value::Int(3))),
        );
        let plan = PlanNode::SeqScan(SeqScanPlan {
            table: "t".into(),
            predicate: Some(predicate),
        });
        let catalog = ctx.catalog.read();
        assert!(matches!(
            optimize_seq_scan_as_index_scan(plan, &catalog),
            PlanNode::SeqScan(_)
        ));
        Ok(())
    }
}
