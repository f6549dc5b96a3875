use crate::catalog::types::Value;
use crate::error::WsdbError;
use serde::{Deserialize, Serialize};

/// Maximum nesting depth for expressions to prevent stack overflow
const MAX_EXPR_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    In(String, Vec<Value>),
    Between(String, Value, Value),
    IsNull(String),
    IsNotNull(String),
    Like(String, String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// Calculates the maximum nesting depth of this expression tree.
    pub fn depth(&self) -> usize {
        match self {
            Expr::Eq(_, _)
            | Expr::Ne(_, _)
            | Expr::Lt(_, _)
            | Expr::Lte(_, _)
            | Expr::Gt(_, _)
            | Expr::Gte(_, _)
            | Expr::In(_, _)
            | Expr::Between(_, _, _)
            | Expr::IsNull(_)
            | Expr::IsNotNull(_)
            | Expr::Like(_, _) => 1,
            Expr::Not(inner) => 1 + inner.depth(),
            Expr::And(left, right) | Expr::Or(left, right) => 1 + left.depth().max(right.depth()),
        }
    }

    /// Validates that the expression depth does not exceed MAX_EXPR_DEPTH.
    pub fn validate_depth(&self) -> Result<(), WsdbError> {
        let depth = self.depth();
        if depth > MAX_EXPR_DEPTH {
            return Err(WsdbError::Validation(format!(
                "expression depth {} exceeds maximum allowed depth of {}",
                depth, MAX_EXPR_DEPTH
            )));
        }
        Ok(())
    }

    /// Every column name referenced anywhere in the tree, in visit order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Eq(c, _)
            | Expr::Ne(c, _)
            | Expr::Lt(c, _)
            | Expr::Lte(c, _)
            | Expr::Gt(c, _)
            | Expr::Gte(c, _)
            | Expr::In(c, _)
            | Expr::Between(c, _, _)
            | Expr::IsNull(c)
            | Expr::IsNotNull(c)
            | Expr::Like(c, _) => out.push(c.as_str()),
            Expr::Not(inner) => inner.collect_columns(out),
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
        }
    }
}

/// One entry of a [`Criteria`]: a predicate keyed by the column it constrains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub table: Option<String>,
    pub column: String,
    pub expr: Expr,
}

impl Criterion {
    /// The assigned value when this criterion is a plain equality on its own
    /// column, which is the only shape allowed in insert/update value sets.
    pub fn assigned_value(&self) -> Option<&Value> {
        match &self.expr {
            Expr::Eq(c, v) if *c == self.column => Some(v),
            _ => None,
        }
    }
}

/// Column-keyed predicate set used both as a filter (select, count, update
/// and delete targets) and as a value set (insert values, update values).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Criteria {
    table: Option<String>,
    entries: Vec<Criterion>,
    order_by: Vec<(String, Order)>,
    limit: Option<usize>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Self::default()
        }
    }

    pub fn primary_table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn set_primary_table(&mut self, table: impl Into<String>) {
        self.table = Some(table.into());
    }

    /// Adds `column = value`. `column` may be qualified as `table.column`.
    /// An existing entry for the same column is replaced.
    pub fn add(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value.into());
        self
    }

    /// Adds an arbitrary predicate keyed by `column`.
    pub fn add_expr(mut self, column: &str, expr: Expr) -> Self {
        self.insert_expr(column, expr);
        self
    }

    pub fn insert(&mut self, column: &str, value: Value) {
        let (_, name) = split_qualified(column);
        let expr = Expr::Eq(name.to_string(), value);
        self.insert_expr(column, expr);
    }

    pub fn insert_expr(&mut self, column: &str, expr: Expr) {
        let (table, name) = split_qualified(column);
        let criterion = Criterion {
            table: table.map(str::to_string),
            column: name.to_string(),
            expr,
        };
        match self.entries.iter_mut().find(|c| c.column == name) {
            Some(existing) => *existing = criterion,
            None => self.entries.push(criterion),
        }
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.order_by.push((column.to_string(), order));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn ordering(&self) -> &[(String, Order)] {
        &self.order_by
    }

    pub fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Whether some entry is keyed by `column` (qualifier ignored).
    pub fn contains_key(&self, column: &str) -> bool {
        let (_, name) = split_qualified(column);
        self.entries.iter().any(|c| c.column == name)
    }

    pub fn get(&self, column: &str) -> Option<&Criterion> {
        let (_, name) = split_qualified(column);
        self.entries.iter().find(|c| c.column == name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|c| c.column.as_str())
    }

    pub fn entries(&self) -> &[Criterion] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Conjunction of every entry, `None` when the set is empty.
    pub fn to_predicate(&self) -> Option<Expr> {
        self.entries
            .iter()
            .map(|c| c.expr.clone())
            .reduce(|acc, next| acc.and(next))
    }

    /// Reads the set as column assignments. Fails on any entry that is not a
    /// plain equality on its key column.
    pub fn assignments(&self) -> Result<Vec<(String, Value)>, WsdbError> {
        self.entries
            .iter()
            .map(|c| {
                c.assigned_value()
                    .map(|v| (c.column.clone(), v.clone()))
                    .ok_or_else(|| {
                        WsdbError::Validation(format!(
                            "value for column '{}' must be an equality assignment",
                            c.column
                        ))
                    })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), WsdbError> {
        for criterion in &self.entries {
            criterion.expr.validate_depth()?;
        }
        Ok(())
    }
}

fn split_qualified(column: &str) -> (Option<&str>, &str) {
    match column.rsplit_once('.') {
        Some((table, name)) if !table.is_empty() => (Some(table), name),
        _ => (None, column),
    }
}

pub struct ColumnRef(String);

pub fn col(name: &str) -> ColumnRef {
    ColumnRef(name.to_string())
}

pub trait IntoQueryValue {
    fn into_query_value(self) -> Value;
}

impl IntoQueryValue for Value {
    fn into_query_value(self) -> Value {
        self
    }
}

impl IntoQueryValue for bool {
    fn into_query_value(self) -> Value {
        Value::Boolean(self)
    }
}

impl IntoQueryValue for i64 {
    fn into_query_value(self) -> Value {
        Value::Integer(self)
    }
}

impl IntoQueryValue for i32 {
    fn into_query_value(self) -> Value {
        Value::Integer(self as i64)
    }
}

impl IntoQueryValue for f64 {
    fn into_query_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoQueryValue for String {
    fn into_query_value(self) -> Value {
        Value::Text(self.into())
    }
}

impl IntoQueryValue for &str {
    fn into_query_value(self) -> Value {
        Value::Text(self.into())
    }
}

pub fn lit<T: IntoQueryValue>(value: T) -> Value {
    value.into_query_value()
}

impl ColumnRef {
    pub fn eq(self, value: Value) -> Expr {
        Expr::Eq(self.0, value)
    }

    pub fn neq(self, value: Value) -> Expr {
        Expr::Ne(self.0, value)
    }

    pub fn gt(self, value: Value) -> Expr {
        Expr::Gt(self.0, value)
    }

    pub fn gte(self, value: Value) -> Expr {
        Expr::Gte(self.0, value)
    }

    pub fn lt(self, value: Value) -> Expr {
        Expr::Lt(self.0, value)
    }

    pub fn lte(self, value: Value) -> Expr {
        Expr::Lte(self.0, value)
    }

    pub fn between(self, low: Value, high: Value) -> Expr {
        Expr::Between(self.0, low, high)
    }

    pub fn in_(self, values: Vec<Value>) -> Expr {
        Expr::In(self.0, values)
    }

    pub fn like(self, pattern: &str) -> Expr {
        Expr::Like(self.0, pattern.to_string())
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(self.0)
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(self.0)
    }
}
