use anyhow::{anyhow, Result};

use crate::errors::Error;
use crate::tuple::schema::Schema;
use crate::types::{Types, Value};

use super::aggregation::AggregationExecutor;
use super::delete::DeleteExecutor;
use super::expr::Expression;
use super::hash_join::HashJoinExecutor;
use super::index_scan::IndexScanExecutor;
use super::insert::InsertExecutor;
use super::limit::LimitExecutor;
use super::nested_loop_join::NestedLoopJoinExecutor;
use super::seq_scan::SeqScanExecutor;
use super::sort::SortExecutor;
use super::topn::TopNExecutor;
use super::update::UpdateExecutor;
use super::values::ValuesExecutor;
use super::window::WindowExecutor;
use super::{Executor, ExecutorContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderByType {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationType {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFunctionType {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
    Rank,
}

/// Physical plan tree. The planner that would produce these is out of
/// scope; tests and the optimizer rewrites build them directly.
#[derive(Debug, Clone)]
pub enum PlanNode {
    SeqScan(SeqScanPlan),
    IndexScan(IndexScanPlan),
    Values(ValuesPlan),
    Insert(InsertPlan),
    Delete(DeletePlan),
    Update(UpdatePlan),
    NestedLoopJoin(NestedLoopJoinPlan),
    HashJoin(HashJoinPlan),
    Aggregation(AggregationPlan),
    Sort(SortPlan),
    Limit(LimitPlan),
    TopN(TopNPlan),
    Window(WindowPlan),
}

#[derive(Debug, Clone)]
pub struct SeqScanPlan {
    pub table: String,
    pub predicate: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct IndexScanPlan {
    pub table: String,
    pub index: String,
    pub pred_keys: Vec<Value>,
    pub predicate: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct ValuesPlan {
    pub schema: Schema,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub table: String,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct DeletePlan {
    pub table: String,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub table: String,
    pub child: Box<PlanNode>,
    pub target_expressions: Vec<Expression>,
}

#[derive(Debug, Clone)]
pub struct NestedLoopJoinPlan {
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    pub predicate: Option<Expression>,
    pub join_type: JoinType,
}

#[derive(Debug, Clone)]
pub struct HashJoinPlan {
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    pub left_keys: Vec<Expression>,
    pub right_keys: Vec<Expression>,
    pub join_type: JoinType,
}

#[derive(Debug, Clone)]
pub struct AggregationPlan {
    pub child: Box<PlanNode>,
    pub group_bys: Vec<Expression>,
    pub aggregates: Vec<(AggregationType, Expression)>,
}

#[derive(Debug, Clone)]
pub struct SortPlan {
    pub child: Box<PlanNode>,
    pub order_bys: Vec<(OrderByType, Expression)>,
}

#[derive(Debug, Clone)]
pub struct LimitPlan {
    pub child: Box<PlanNode>,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct TopNPlan {
    pub child: Box<PlanNode>,
    pub order_bys: Vec<(OrderByType, Expression)>,
    pub n: usize,
}

#[derive(Debug, Clone)]
pub struct WindowPlan {
    pub child: Box<PlanNode>,
    pub partition_by: Vec<Expression>,
    pub order_by: Vec<(OrderByType, Expression)>,
    pub functions: Vec<(WindowFunctionType, Expression)>,
}

/// Output type of a computed column.
pub fn expression_type(expr: &Expression, schema: &Schema) -> Types {
    match expr {
        Expression::Column { side: 0, idx } => schema.fields[*idx].ty,
        Expression::Column { .. } => Types::Int,
        Expression::Literal(value) => value.type_of().unwrap_or(Types::Int),
        Expression::Compare { .. } | Expression::Logic { .. } => Types::Bool,
        Expression::Add { left, .. } => expression_type(left, schema),
    }
}

/// Builds the operator tree for a plan, resolving table and index names
/// through the context's catalog.
pub fn build_executor(ctx: &ExecutorContext, plan: &PlanNode) -> Result<Box<dyn Executor>> {
    Ok(match plan {
        PlanNode::SeqScan(p) => {
            let table = ctx
                .catalog
                .read()
                .get_table(&p.table)
                .ok_or(anyhow!(Error::TableNotFound(p.table.clone())))?;
            Box::new(SeqScanExecutor::new(ctx.clone(), table, p.predicate.clone()))
        }
        PlanNode::IndexScan(p) => {
            let catalog = ctx.catalog.read();
            let table = catalog
                .get_table(&p.table)
                .ok_or(anyhow!(Error::TableNotFound(p.table.clone())))?;
            let index = catalog
                .get_index(&p.index)
                .ok_or(anyhow!(Error::IndexNotFound(p.index.clone())))?;
            Box::new(IndexScanExecutor::new(
                ctx.clone(),
                table,
                index,
                p.pred_keys.clone(),
                p.predicate.clone(),
            ))
        }
        PlanNode::Values(p) => Box::new(ValuesExecutor::new(p.schema.clone(), p.rows.clone())),
        PlanNode::Insert(p) => {
            let table = ctx
                .catalog
                .read()
                .get_table(&p.table)
                .ok_or(anyhow!(Error::TableNotFound(p.table.clone())))?;
            let child = build_executor(ctx, &p.child)?;
            Box::new(InsertExecutor::new(ctx.clone(), table, child))
        }
        PlanNode::Delete(p) => {
            let table = ctx
                .catalog
                .read()
                .get_table(&p.table)
                .ok_or(anyhow!(Error::TableNotFound(p.table.clone())))?;
            let child = build_executor(ctx, &p.child)?;
            Box::new(DeleteExecutor::new(ctx.clone(), table, child))
        }
        PlanNode::Update(p) => {
            let table = ctx
                .catalog
                .read()
                .get_table(&p.table)
                .ok_or(anyhow!(Error::TableNotFound(p.table.clone())))?;
            let child = build_executor(ctx, &p.child)?;
            Box::new(UpdateExecutor::new(
                ctx.clone(),
                table,
                child,
                p.target_expressions.clone(),
            ))
        }
        PlanNode::NestedLoopJoin(p) => {
            let left = build_executor(ctx, &p.left)?;
            let right = build_executor(ctx, &p.right)?;
            Box::new(NestedLoopJoinExecutor::new(
                left,
                right,
                p.predicate.clone(),
                p.join_type,
            ))
        }
        PlanNode::HashJoin(p) => {
            let left = build_executor(ctx, &p.left)?;
            let right = build_executor(ctx, &p.right)?;
            Box::new(HashJoinExecutor::new(
                left,
                right,
                p.left_keys.clone(),
                p.right_keys.clone(),
                p.join_type,
            ))
        }
        PlanNode::Aggregation(p) => {
            let child = build_executor(ctx, &p.child)?;
            Box::new(AggregationExecutor::new(
                child,
                p.group_bys.clone(),
                p.aggregates.clone(),
            ))
        }
        PlanNode::Sort(p) => {
            let child = build_executor(ctx, &p.child)?;
            Box::new(SortExecutor::new(child, p.order_bys.clone()))
        }
        PlanNode::Limit(p) => {
            let child = build_executor(ctx, &p.child)?;
            Box::new(LimitExecutor::new(child, p.limit))
        }
        PlanNode::TopN(p) => {
            let child = build_executor(ctx, &p.child)?;
            Box::new(TopNExecutor::new(child, p.order_bys.clone(), p.n))
        }
        PlanNode::Window(p) => {
            let child = build_executor(ctx, &p.child)?;
            Box::new(WindowExecutor::new(
                child,
                p.partition_by.clone(),
                p.order_by.clone(),
                p.functions.clone(),
            ))
        }
    })
}
