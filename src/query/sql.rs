use crate::catalog::schema::TableSchema;
use crate::catalog::types::Value;
use crate::query::plan::{Expr, Order};
use std::fmt::Write as _;

/// Statement handed to a [`crate::storage::StorageExecutor`]. Executors may run
/// the typed form directly or render it with [`Statement::to_sql`].
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select {
        table: String,
        predicate: Option<Expr>,
        order_by: Vec<(String, Order)>,
        limit: Option<usize>,
    },
    Count {
        table: String,
        predicate: Option<Expr>,
    },
    Insert {
        table: String,
        values: Vec<(String, Value)>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Value)>,
        predicate: Option<Expr>,
    },
    Delete {
        table: String,
        predicate: Option<Expr>,
    },
    /// `INSERT INTO target (columns) SELECT columns FROM source WHERE predicate`
    CopyRows {
        target: String,
        source: String,
        columns: Vec<String>,
        predicate: Option<Expr>,
    },
}

/// SQL text with `?` placeholders plus the values bound to them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSql {
    pub sql: String,
    pub params: Vec<Value>,
}

impl RenderedSql {
    pub fn params_display(&self) -> String {
        self.params
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Statement {
    pub fn table(&self) -> &str {
        match self {
            Statement::Select { table, .. }
            | Statement::Count { table, .. }
            | Statement::Insert { table, .. }
            | Statement::Update { table, .. }
            | Statement::Delete { table, .. } => table,
            Statement::CopyRows { target, .. } => target,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Select { .. } => "select",
            Statement::Count { .. } => "count",
            Statement::Insert { .. } => "insert",
            Statement::Update { .. } => "update",
            Statement::Delete { .. } => "delete",
            Statement::CopyRows { .. } => "copy",
        }
    }

    pub fn to_sql(&self) -> RenderedSql {
        let mut params = Vec::new();
        let sql = match self {
            Statement::Select {
                table,
                predicate,
                order_by,
                limit,
            } => {
                let mut sql = format!("SELECT * FROM {table}");
                push_where(&mut sql, predicate.as_ref(), &mut params);
                if !order_by.is_empty() {
                    let order = order_by
                        .iter()
                        .map(|(c, o)| match o {
                            Order::Asc => format!("{c} ASC"),
                            Order::Desc => format!("{c} DESC"),
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    let _ = write!(sql, " ORDER BY {order}");
                }
                if let Some(limit) = limit {
                    let _ = write!(sql, " LIMIT {limit}");
                }
                sql
            }
            Statement::Count { table, predicate } => {
                let mut sql = format!("SELECT COUNT(*) FROM {table}");
                push_where(&mut sql, predicate.as_ref(), &mut params);
                sql
            }
            Statement::Insert { table, values } => {
                let columns = values
                    .iter()
                    .map(|(c, _)| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let placeholders = vec!["?"; values.len()].join(", ");
                params.extend(values.iter().map(|(_, v)| v.clone()));
                format!("INSERT INTO {table} ({columns}) VALUES ({placeholders})")
            }
            Statement::Update {
                table,
                assignments,
                predicate,
            } => {
                let sets = assignments
                    .iter()
                    .map(|(c, _)| format!("{c} = ?"))
                    .collect::<Vec<_>>()
                    .join(", ");
                params.extend(assignments.iter().map(|(_, v)| v.clone()));
                let mut sql = format!("UPDATE {table} SET {sets}");
                push_where(&mut sql, predicate.as_ref(), &mut params);
                sql
            }
            Statement::Delete { table, predicate } => {
                let mut sql = format!("DELETE FROM {table}");
                push_where(&mut sql, predicate.as_ref(), &mut params);
                sql
            }
            Statement::CopyRows {
                target,
                source,
                columns,
                predicate,
            } => {
                let fields = columns.join(", ");
                let mut sql =
                    format!("INSERT INTO {target} ({fields}) SELECT {fields} FROM {source}");
                push_where(&mut sql, predicate.as_ref(), &mut params);
                sql
            }
        };
        RenderedSql { sql, params }
    }
}

fn push_where(sql: &mut String, predicate: Option<&Expr>, params: &mut Vec<Value>) {
    if let Some(expr) = predicate {
        sql.push_str(" WHERE ");
        append_expr(sql, expr, params);
    }
}

/// Appends `expr` as a prepared-statement fragment, pushing bound values.
pub fn append_expr(out: &mut String, expr: &Expr, params: &mut Vec<Value>) {
    match expr {
        Expr::Eq(c, v) => append_binary(out, c, "=", v, params),
        Expr::Ne(c, v) => append_binary(out, c, "<>", v, params),
        Expr::Lt(c, v) => append_binary(out, c, "<", v, params),
        Expr::Lte(c, v) => append_binary(out, c, "<=", v, params),
        Expr::Gt(c, v) => append_binary(out, c, ">", v, params),
        Expr::Gte(c, v) => append_binary(out, c, ">=", v, params),
        Expr::In(c, values) => {
            let placeholders = vec!["?"; values.len()].join(", ");
            let _ = write!(out, "{c} IN ({placeholders})");
            params.extend(values.iter().cloned());
        }
        Expr::Between(c, lo, hi) => {
            let _ = write!(out, "{c} BETWEEN ? AND ?");
            params.push(lo.clone());
            params.push(hi.clone());
        }
        Expr::IsNull(c) => {
            let _ = write!(out, "{c} IS NULL");
        }
        Expr::IsNotNull(c) => {
            let _ = write!(out, "{c} IS NOT NULL");
        }
        Expr::Like(c, pattern) => {
            let _ = write!(out, "{c} LIKE ?");
            params.push(Value::Text(pattern.as_str().into()));
        }
        Expr::And(a, b) => {
            for (i, side) in [a, b].into_iter().enumerate() {
                if i > 0 {
                    out.push_str(" AND ");
                }
                match &**side {
                    Expr::And(..) => append_expr(out, side, params),
                    _ => append_group(out, side, params),
                }
            }
        }
        Expr::Or(a, b) => {
            for (i, side) in [a, b].into_iter().enumerate() {
                if i > 0 {
                    out.push_str(" OR ");
                }
                match &**side {
                    Expr::Or(..) => append_expr(out, side, params),
                    _ => append_group(out, side, params),
                }
            }
        }
        Expr::Not(inner) => {
            out.push_str("NOT ");
            append_group(out, inner, params);
        }
    }
}

fn append_binary(
    out: &mut String,
    column: &str,
    op: &str,
    value: &Value,
    params: &mut Vec<Value>,
) {
    let _ = write!(out, "{column} {op} ?");
    params.push(value.clone());
}

fn append_group(out: &mut String, expr: &Expr, params: &mut Vec<Value>) {
    match expr {
        Expr::And(..) | Expr::Or(..) | Expr::Not(..) => {
            out.push('(');
            append_expr(out, expr, params);
            out.push(')');
        }
        _ => append_expr(out, expr, params),
    }
}

/// `CREATE TABLE` statement for `schema`.
pub fn create_table_sql(schema: &TableSchema) -> String {
    let mut lines = Vec::with_capacity(schema.columns.len() + 1);
    for column in &schema.columns {
        let mut line = format!("    {} {}", column.name, column.col_type.sql_name());
        if !column.nullable {
            line.push_str(" NOT NULL");
        }
        if column.auto_increment {
            line.push_str(" AUTO_INCREMENT");
        }
        lines.push(line);
    }
    if !schema.primary_key.is_empty() {
        lines.push(format!("    PRIMARY KEY ({})", schema.primary_key.join(", ")));
    }
    for fk in &schema.foreign_keys {
        lines.push(format!(
            "    CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            fk.name,
            fk.columns.join(", "),
            fk.references_table,
            fk.references_columns.join(", ")
        ));
    }
    format!(
        "CREATE TABLE {} (\n{}\n);",
        schema.table_name,
        lines.join(",\n")
    )
}

#[cfg(test)]
mod tests {
    use super::{Statement, create_table_sql};
    use crate::catalog::schema::{ColumnDef, TableSchema};
    use crate::catalog::types::{ColumnType, Value};
    use crate::query::plan::{col, lit};

    #[test]
    fn copy_rows_renders_insert_select_with_params() {
        let stmt = Statement::CopyRows {
            target: "book_version".into(),
            source: "book".into(),
            columns: vec!["id".into(), "title".into()],
            predicate: Some(col("id").eq(lit(3)).and(col("title").is_not_null())),
        };
        let rendered = stmt.to_sql();
        assert_eq!(
            rendered.sql,
            "INSERT INTO book_version (id, title) SELECT id, title FROM book WHERE id = ? AND title IS NOT NULL"
        );
        assert_eq!(rendered.params, vec![Value::Integer(3)]);
    }

    #[test]
    fn nested_boolean_groups_are_parenthesized() {
        let stmt = Statement::Delete {
            table: "book".into(),
            predicate: Some(
                col("id")
                    .eq(lit(1))
                    .or(col("id").eq(lit(2)))
                    .and(col("title").in_(vec![lit("a"), lit("b")])),
            ),
        };
        let rendered = stmt.to_sql();
        assert_eq!(
            rendered.sql,
            "DELETE FROM book WHERE (id = ? OR id = ?) AND title IN (?, ?)"
        );
        assert_eq!(rendered.params_display(), "1, 2, 'a', 'b'");
    }

    #[test]
    fn update_binds_assignments_before_predicate() {
        let stmt = Statement::Update {
            table: "book".into(),
            assignments: vec![("title".into(), lit("b"))],
            predicate: Some(col("id").eq(lit(1))),
        };
        let rendered = stmt.to_sql();
        assert_eq!(rendered.sql, "UPDATE book SET title = ? WHERE id = ?");
        assert_eq!(rendered.params, vec![lit("b"), lit(1)]);
    }

    #[test]
    fn create_table_lists_columns_and_primary_key() {
        let mut schema = TableSchema::new("book_version");
        schema.add_column(ColumnDef::new("id", ColumnType::Integer, false), false);
        schema.add_column(
            ColumnDef::new("workspace_rev", ColumnType::Integer, false).auto_increment(),
            true,
        );
        let ddl = create_table_sql(&schema);
        assert!(ddl.starts_with("CREATE TABLE book_version ("));
        assert!(ddl.contains("workspace_rev INTEGER NOT NULL AUTO_INCREMENT"));
        assert!(ddl.contains("PRIMARY KEY (workspace_rev)"));
    }
}
