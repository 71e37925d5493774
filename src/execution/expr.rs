use std::cmp::Ordering;

use crate::tuple::schema::Schema;
use crate::tuple::Tuple;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// Expression tree the executors evaluate per tuple. Columns name a side
/// so join predicates can address both inputs; single-input operators use
/// side 0.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Column { side: usize, idx: usize },
    Literal(Value),
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logic {
        op: LogicOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Add {
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn col(idx: usize) -> Self {
        Expression::Column { side: 0, idx }
    }

    pub fn col_of(side: usize, idx: usize) -> Self {
        Expression::Column { side, idx }
    }

    pub fn lit(value: Value) -> Self {
        Expression::Literal(value)
    }

    pub fn cmp(op: CompareOp, left: Expression, right: Expression) -> Self {
        Expression::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Self::cmp(CompareOp::Eq, left, right)
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::Logic {
            op: LogicOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Expression::Logic {
            op: LogicOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn add(left: Expression, right: Expression) -> Self {
        Expression::Add {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn evaluate(&self, tuple: &Tuple, schema: &Schema) -> Value {
        self.eval(tuple, schema, None, None)
    }

    /// Two-sided evaluation for joins. A missing right tuple reads as all
    /// nulls (LEFT join padding).
    pub fn evaluate_join(
        &self,
        left: &Tuple,
        left_schema: &Schema,
        right: Option<&Tuple>,
        right_schema: &Schema,
    ) -> Value {
        self.eval(left, left_schema, right, Some(right_schema))
    }

    fn eval(
        &self,
        left: &Tuple,
        left_schema: &Schema,
        right: Option<&Tuple>,
        right_schema: Option<&Schema>,
    ) -> Value {
        match self {
            Expression::Column { side: 0, idx } => left.value_at(*idx, left_schema),
            Expression::Column { side: 1, idx } => match right {
                Some(tuple) => tuple.value_at(*idx, right_schema.unwrap()),
                None => Value::Null,
            },
            Expression::Column { side, .. } => panic!("column references side {side}"),
            Expression::Literal(value) => value.clone(),
            Expression::Compare { op, left: l, right: r } => {
                let lv = l.eval(left, left_schema, right, right_schema);
                let rv = r.eval(left, left_schema, right, right_schema);
                if lv.is_null() || rv.is_null() {
                    return Value::Bool(false);
                }
                let ord = lv.compare(&rv);
                Value::Bool(match op {
                    CompareOp::Eq => ord == Ordering::Equal,
                    CompareOp::NotEq => ord != Ordering::Equal,
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::LtEq => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::GtEq => ord != Ordering::Less,
                })
            }
            Expression::Logic { op, left: l, right: r } => {
                let lv = l.eval(left, left_schema, right, right_schema).as_bool();
                let rv = r.eval(left, left_schema, right, right_schema).as_bool();
                Value::Bool(match op {
                    LogicOp::And => lv && rv,
                    LogicOp::Or => lv || rv,
                })
            }
            Expression::Add { left: l, right: r } => {
                let lv = l.eval(left, left_schema, right, right_schema);
                let rv = r.eval(left, left_schema, right, right_schema);
                if lv.is_null() || rv.is_null() {
                    return Value::Null;
                }
                lv.add(&rv)
            }
        }
    }
}
