use crate::catalog::schema::TableSchema;
use crate::catalog::types::{Row, Value};
use crate::error::WsdbError;
use crate::query::plan::{Expr, Order};
use std::cmp::Ordering;

/// Expression with column names bound to row positions.
#[derive(Debug, Clone)]
pub enum CompiledExpr {
    Eq(usize, Value),
    Ne(usize, Value),
    Lt(usize, Value),
    Lte(usize, Value),
    Gt(usize, Value),
    Gte(usize, Value),
    In(usize, Vec<Value>),
    Between(usize, Value, Value),
    IsNull(usize),
    IsNotNull(usize),
    Like(usize, String),
    And(Box<CompiledExpr>, Box<CompiledExpr>),
    Or(Box<CompiledExpr>, Box<CompiledExpr>),
    Not(Box<CompiledExpr>),
}

pub fn compile_expr(expr: &Expr, schema: &TableSchema) -> Result<CompiledExpr, WsdbError> {
    let idx = |column: &str| {
        schema
            .column_index(column)
            .ok_or_else(|| WsdbError::UnknownColumn {
                table: schema.table_name.clone(),
                column: column.to_string(),
            })
    };
    Ok(match expr {
        Expr::Eq(c, v) => CompiledExpr::Eq(idx(c)?, v.clone()),
        Expr::Ne(c, v) => CompiledExpr::Ne(idx(c)?, v.clone()),
        Expr::Lt(c, v) => CompiledExpr::Lt(idx(c)?, v.clone()),
        Expr::Lte(c, v) => CompiledExpr::Lte(idx(c)?, v.clone()),
        Expr::Gt(c, v) => CompiledExpr::Gt(idx(c)?, v.clone()),
        Expr::Gte(c, v) => CompiledExpr::Gte(idx(c)?, v.clone()),
        Expr::In(c, vs) => CompiledExpr::In(idx(c)?, vs.clone()),
        Expr::Between(c, lo, hi) => CompiledExpr::Between(idx(c)?, lo.clone(), hi.clone()),
        Expr::IsNull(c) => CompiledExpr::IsNull(idx(c)?),
        Expr::IsNotNull(c) => CompiledExpr::IsNotNull(idx(c)?),
        Expr::Like(c, p) => CompiledExpr::Like(idx(c)?, p.clone()),
        Expr::And(a, b) => CompiledExpr::And(
            Box::new(compile_expr(a, schema)?),
            Box::new(compile_expr(b, schema)?),
        ),
        Expr::Or(a, b) => CompiledExpr::Or(
            Box::new(compile_expr(a, schema)?),
            Box::new(compile_expr(b, schema)?),
        ),
        Expr::Not(inner) => CompiledExpr::Not(Box::new(compile_expr(inner, schema)?)),
    })
}

/// Compiles an optional predicate; `None` matches every row.
pub fn compile_filter(
    predicate: Option<&Expr>,
    schema: &TableSchema,
) -> Result<Option<CompiledExpr>, WsdbError> {
    predicate.map(|p| compile_expr(p, schema)).transpose()
}

pub fn matches(filter: Option<&CompiledExpr>, row: &Row) -> bool {
    filter.is_none_or(|expr| eval_compiled_expr(expr, row))
}

pub fn eval_compiled_expr(expr: &CompiledExpr, row: &Row) -> bool {
    match expr {
        CompiledExpr::Eq(idx, v) => {
            get_col(row, *idx).is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_eq()))
        }
        CompiledExpr::Ne(idx, v) => {
            get_col(row, *idx).is_some_and(|rv| compare_values(rv, v).is_some_and(|o| !o.is_eq()))
        }
        CompiledExpr::Lt(idx, v) => {
            get_col(row, *idx).is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_lt()))
        }
        CompiledExpr::Lte(idx, v) => {
            get_col(row, *idx).is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_le()))
        }
        CompiledExpr::Gt(idx, v) => {
            get_col(row, *idx).is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_gt()))
        }
        CompiledExpr::Gte(idx, v) => {
            get_col(row, *idx).is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_ge()))
        }
        CompiledExpr::In(idx, values) => get_col(row, *idx).is_some_and(|rv| {
            values
                .iter()
                .any(|v| compare_values(rv, v).is_some_and(|o| o.is_eq()))
        }),
        CompiledExpr::Between(idx, lo, hi) => get_col(row, *idx).is_some_and(|rv| {
            compare_values(rv, lo).is_some_and(|o| o.is_ge())
                && compare_values(rv, hi).is_some_and(|o| o.is_le())
        }),
        CompiledExpr::IsNull(idx) => get_col(row, *idx).is_some_and(|rv| matches!(rv, Value::Null)),
        CompiledExpr::IsNotNull(idx) => {
            get_col(row, *idx).is_some_and(|rv| !matches!(rv, Value::Null))
        }
        CompiledExpr::Like(idx, pattern) => get_col(row, *idx).is_some_and(|rv| match rv {
            Value::Text(s) => like_match(s, pattern),
            _ => false,
        }),
        CompiledExpr::And(a, b) => eval_compiled_expr(a, row) && eval_compiled_expr(b, row),
        CompiledExpr::Or(a, b) => eval_compiled_expr(a, row) || eval_compiled_expr(b, row),
        CompiledExpr::Not(inner) => !eval_compiled_expr(inner, row),
    }
}

/// Resolves `ORDER BY` columns to positions.
pub fn compile_ordering(
    ordering: &[(String, Order)],
    schema: &TableSchema,
) -> Result<Vec<(usize, Order)>, WsdbError> {
    ordering
        .iter()
        .map(|(column, order)| {
            schema
                .column_index(column)
                .map(|idx| (idx, *order))
                .ok_or_else(|| WsdbError::UnknownColumn {
                    table: schema.table_name.clone(),
                    column: column.clone(),
                })
        })
        .collect()
}

pub fn compare_rows(a: &Row, b: &Row, ordering: &[(usize, Order)]) -> Ordering {
    for (idx, order) in ordering {
        let left = get_col(a, *idx).unwrap_or(&Value::Null);
        let right = get_col(b, *idx).unwrap_or(&Value::Null);
        let cmp = match order {
            Order::Asc => left.cmp(right),
            Order::Desc => right.cmp(left),
        };
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}

fn get_col(row: &Row, idx: usize) -> Option<&Value> {
    row.values.get(idx)
}

fn like_match(value: &str, pattern: &str) -> bool {
    let text = value.as_bytes();
    let pat = pattern.as_bytes();
    let mut ti = 0usize;
    let mut pi = 0usize;
    let mut star_pi: Option<usize> = None;
    let mut star_ti = 0usize;

    while ti < text.len() {
        if pi < pat.len() && (pat[pi] == b'_' || pat[pi] == text[ti]) {
            ti += 1;
            pi += 1;
            continue;
        }
        if pi < pat.len() && pat[pi] == b'%' {
            star_pi = Some(pi);
            pi += 1;
            star_ti = ti;
            continue;
        }
        if let Some(saved_pi) = star_pi {
            pi = saved_pi + 1;
            star_ti += 1;
            ti = star_ti;
            continue;
        }
        return false;
    }

    while pi < pat.len() && pat[pi] == b'%' {
        pi += 1;
    }

    pi == pat.len()
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Timestamp(a), Value::Integer(b)) => a.partial_cmp(b),
        (Value::Integer(a), Value::Timestamp(b)) => a.partial_cmp(b),
        _ => Some(left.cmp(right)),
    }
}
