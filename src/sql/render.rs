//! Dialect rendering
//!
//! Turns [`Statement`]s into text for one store dialect. Output is written
//! through a writer that reserves before every append, so allocation failure
//! surfaces as [`Error::OutOfMemory`] instead of aborting.

use super::ast::*;
use crate::error::{Error, Result};
use crate::value::{quote_text, ValueType};
use serde::{Deserialize, Serialize};

/// Target store dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
}

/// Fallible string builder
#[derive(Default)]
struct SqlWriter {
    buf: String,
}

impl SqlWriter {
    fn push(&mut self, s: &str) -> Result<()> {
        self.buf.try_reserve(s.len())?;
        self.buf.push_str(s);
        Ok(())
    }

    fn push_joined<T>(
        &mut self,
        items: &[T],
        sep: &str,
        mut each: impl FnMut(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(sep)?;
            }
            each(self, item)?;
        }
        Ok(())
    }
}

impl Dialect {
    /// Parse a dialect name
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Dialect::Sqlite),
            "postgres" | "postgresql" | "pg" => Some(Dialect::Postgres),
            _ => None,
        }
    }

    /// Render a relation name
    ///
    /// Series names are `namespace.table`. SQLite has no namespaces, so the
    /// whole name becomes one quoted identifier; Postgres keeps the schema.
    pub fn relation(&self, relation: &Relation) -> String {
        match (self, relation) {
            (_, Relation::Temp(name)) => name.clone(),
            (Dialect::Sqlite, Relation::Named(name)) => quote_ident(name),
            (Dialect::Postgres, Relation::Named(name)) => name.to_lowercase(),
        }
    }

    /// DDL type for a column
    pub fn column_type(&self, ty: ColumnType) -> &'static str {
        match self {
            Dialect::Sqlite => match ty {
                ColumnType::RecordNumber { auto: true } => "INTEGER PRIMARY KEY AUTOINCREMENT",
                ColumnType::RecordNumber { auto: false } => "INTEGER NOT NULL",
                ColumnType::Count => "INTEGER NOT NULL",
                ColumnType::Value(v) if v.is_integer() => "INTEGER",
                ColumnType::Value(ValueType::String) => "TEXT",
                ColumnType::Value(_) => "REAL",
            },
            Dialect::Postgres => match ty {
                ColumnType::RecordNumber { auto: true } => "bigserial PRIMARY KEY",
                ColumnType::RecordNumber { auto: false } => "bigint NOT NULL",
                ColumnType::Count => "integer NOT NULL",
                ColumnType::Value(ValueType::Char | ValueType::Short) => "smallint",
                ColumnType::Value(ValueType::Int) => "integer",
                ColumnType::Value(ValueType::LongLong) => "bigint",
                ColumnType::Value(ValueType::Float) => "real",
                ColumnType::Value(ValueType::Double | ValueType::Time) => "double precision",
                ColumnType::Value(ValueType::String) => "text",
            },
        }
    }

    /// Query counting relations with the given name (case-insensitive)
    pub fn relation_exists_query(&self, name: &str) -> String {
        match self {
            Dialect::Sqlite => format!(
                "SELECT count(*) FROM sqlite_master WHERE type IN ('table', 'view') AND lower(name) = lower({})",
                quote_text(name)
            ),
            Dialect::Postgres => {
                let (schema, table) = name.split_once('.').unwrap_or(("public", name));
                format!(
                    "SELECT count(*) FROM pg_tables WHERE schemaname ILIKE {} AND tablename ILIKE {}",
                    quote_text(schema),
                    quote_text(table)
                )
            }
        }
    }

    /// Render a statement
    pub fn render(&self, stmt: &Statement) -> Result<String> {
        let mut w = SqlWriter::default();
        self.write_statement(&mut w, stmt)?;
        Ok(w.buf)
    }

    /// Render an expression
    pub fn render_expr(&self, expr: &Expr) -> Result<String> {
        let mut w = SqlWriter::default();
        self.write_expr(&mut w, expr)?;
        Ok(w.buf)
    }

    fn write_statement(&self, w: &mut SqlWriter, stmt: &Statement) -> Result<()> {
        match stmt {
            Statement::Select(select) => self.write_select(w, select),
            Statement::CreateTempAs { name, query } => {
                w.push("CREATE TEMPORARY TABLE ")?;
                w.push(name)?;
                w.push(" AS ")?;
                self.write_select(w, query)
            }
            Statement::CreateTable {
                relation,
                columns,
                primary_key,
            } => {
                w.push("CREATE TABLE ")?;
                w.push(&self.relation(relation))?;
                w.push(" (")?;
                w.push_joined(columns, ", ", |w, c| {
                    w.push(&c.name)?;
                    w.push(" ")?;
                    w.push(self.column_type(c.ty))
                })?;
                if !primary_key.is_empty() {
                    w.push(", PRIMARY KEY (")?;
                    w.push(&primary_key.join(", "))?;
                    w.push(")")?;
                }
                w.push(")")
            }
            Statement::CreateIndex {
                name,
                relation,
                columns,
            } => {
                w.push("CREATE INDEX ")?;
                w.push(&self.index_name(name))?;
                w.push(" ON ")?;
                w.push(&self.relation(relation))?;
                w.push(" (")?;
                w.push(&columns.join(", "))?;
                w.push(")")
            }
            Statement::DropTable {
                relation,
                if_exists,
            } => {
                w.push("DROP TABLE ")?;
                if *if_exists {
                    w.push("IF EXISTS ")?;
                }
                w.push(&self.relation(relation))?;
                if *self == Dialect::Postgres {
                    w.push(" CASCADE")?;
                }
                Ok(())
            }
            Statement::InsertSelect {
                relation,
                columns,
                query,
            } => {
                w.push("INSERT INTO ")?;
                w.push(&self.relation(relation))?;
                w.push(" (")?;
                w.push(&columns.join(", "))?;
                w.push(") ")?;
                self.write_select(w, query)
            }
            Statement::InsertValues {
                relation,
                columns,
                values,
                returning,
            } => {
                w.push("INSERT INTO ")?;
                w.push(&self.relation(relation))?;
                w.push(" (")?;
                w.push(&columns.join(", "))?;
                w.push(") VALUES (")?;
                w.push_joined(values, ", ", |w, v| self.write_expr(w, v))?;
                w.push(")")?;
                self.write_returning(w, returning)
            }
            Statement::Update {
                relation,
                assignments,
                filter,
            } => {
                w.push("UPDATE ")?;
                w.push(&self.relation(relation))?;
                w.push(" SET ")?;
                w.push_joined(assignments, ", ", |w, (col, expr)| {
                    w.push(col)?;
                    w.push(" = ")?;
                    self.write_expr(w, expr)
                })?;
                self.write_where(w, filter)
            }
            Statement::Delete {
                relation,
                filter,
                returning,
            } => {
                w.push("DELETE FROM ")?;
                w.push(&self.relation(relation))?;
                self.write_where(w, filter)?;
                self.write_returning(w, returning)
            }
            Statement::Grant {
                privileges,
                relation,
                grantee,
            } => match self {
                Dialect::Sqlite => Err(Error::InvalidRequest(
                    "sqlite has no access-control statements".to_string(),
                )),
                Dialect::Postgres => {
                    w.push("GRANT ")?;
                    w.push(&privileges.join(", "))?;
                    w.push(" ON ")?;
                    w.push(&self.relation(relation))?;
                    w.push(" TO ")?;
                    w.push(grantee)
                }
            },
            Statement::CreateTrigger {
                name,
                relation,
                event,
                body,
            } => self.write_trigger(w, name, relation, *event, body),
            Statement::DropTrigger { name, relation } => match self {
                Dialect::Sqlite => {
                    w.push("DROP TRIGGER IF EXISTS ")?;
                    w.push(&quote_ident(name))
                }
                Dialect::Postgres => {
                    w.push("DROP TRIGGER IF EXISTS ")?;
                    w.push(&self.index_name(name))?;
                    w.push(" ON ")?;
                    w.push(&self.relation(relation))?;
                    w.push("; DROP FUNCTION IF EXISTS ")?;
                    w.push(&self.function_name(name, relation))?;
                    w.push("()")
                }
            },
        }
    }

    fn write_trigger(
        &self,
        w: &mut SqlWriter,
        name: &str,
        relation: &Relation,
        event: TriggerEvent,
        body: &[Statement],
    ) -> Result<()> {
        match self {
            Dialect::Sqlite => {
                w.push("CREATE TRIGGER IF NOT EXISTS ")?;
                w.push(&quote_ident(name))?;
                w.push(" ")?;
                w.push(event.as_str())?;
                w.push(" ON ")?;
                w.push(&self.relation(relation))?;
                w.push(" FOR EACH ROW BEGIN ")?;
                for stmt in body {
                    self.write_statement(w, stmt)?;
                    w.push("; ")?;
                }
                w.push("END")
            }
            Dialect::Postgres => {
                let function = self.function_name(name, relation);
                w.push("CREATE OR REPLACE FUNCTION ")?;
                w.push(&function)?;
                w.push("() RETURNS trigger AS $$ BEGIN ")?;
                for stmt in body {
                    self.write_statement(w, stmt)?;
                    w.push("; ")?;
                }
                w.push("RETURN NULL; END $$ LANGUAGE plpgsql; CREATE TRIGGER ")?;
                w.push(&self.index_name(name))?;
                w.push(" ")?;
                w.push(event.as_str())?;
                w.push(" ON ")?;
                w.push(&self.relation(relation))?;
                w.push(" FOR EACH ROW EXECUTE PROCEDURE ")?;
                w.push(&function)?;
                w.push("()")
            }
        }
    }

    /// Index and trigger names: quoted in SQLite, dots flattened in Postgres
    fn index_name(&self, name: &str) -> String {
        match self {
            Dialect::Sqlite => quote_ident(name),
            Dialect::Postgres => name.to_lowercase().replace('.', "_"),
        }
    }

    /// Postgres trigger function, in the schema of the triggering table
    fn function_name(&self, name: &str, relation: &Relation) -> String {
        let name = name.to_lowercase();
        let schema = match relation {
            Relation::Named(rel) => rel.split_once('.').map(|(s, _)| s.to_lowercase()),
            Relation::Temp(_) => None,
        };
        match schema {
            Some(schema) => {
                let local = name
                    .strip_prefix(&format!("{}.", schema))
                    .unwrap_or(&name)
                    .replace('.', "_");
                format!("{}.{}_fn", schema, local)
            }
            None => format!("{}_fn", name.replace('.', "_")),
        }
    }

    fn write_returning(&self, w: &mut SqlWriter, returning: &[String]) -> Result<()> {
        if returning.is_empty() {
            return Ok(());
        }
        w.push(" RETURNING ")?;
        w.push(&returning.join(", "))
    }

    fn write_where(&self, w: &mut SqlWriter, filter: &Option<Expr>) -> Result<()> {
        if let Some(expr) = filter {
            w.push(" WHERE ")?;
            self.write_expr(w, expr)?;
        }
        Ok(())
    }

    fn write_source(&self, w: &mut SqlWriter, source: &Source) -> Result<()> {
        w.push(&self.relation(&source.relation))?;
        if let Some(alias) = &source.alias {
            w.push(" AS ")?;
            w.push(alias)?;
        }
        Ok(())
    }

    fn write_select(&self, w: &mut SqlWriter, select: &Select) -> Result<()> {
        w.push("SELECT ")?;
        w.push_joined(&select.columns, ", ", |w, c| self.write_expr(w, c))?;

        if let Some(from) = &select.from {
            w.push(" FROM ")?;
            self.write_source(w, from)?;
        }
        for join in &select.joins {
            w.push(" JOIN ")?;
            self.write_source(w, &join.source)?;
            w.push(" ON ")?;
            self.write_expr(w, &join.on)?;
        }
        self.write_where(w, &select.filter)?;

        if !select.group_by.is_empty() {
            w.push(" GROUP BY ")?;
            w.push_joined(&select.group_by, ", ", |w, e| self.write_expr(w, e))?;
        }
        if !select.order_by.is_empty() {
            w.push(" ORDER BY ")?;
            w.push_joined(&select.order_by, ", ", |w, item| {
                self.write_expr(w, &item.expr)?;
                w.push(if item.descending { " DESC" } else { " ASC" })
            })?;
        }
        if let Some(limit) = select.limit {
            w.push(" LIMIT ")?;
            w.push(&limit.to_string())?;
        }
        Ok(())
    }

    fn write_expr(&self, w: &mut SqlWriter, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Column { qualifier, name } => {
                if let Some(q) = qualifier {
                    w.push(q)?;
                    w.push(".")?;
                }
                w.push(name)
            }
            Expr::Star(qualifier) => {
                if let Some(q) = qualifier {
                    w.push(q)?;
                    w.push(".")?;
                }
                w.push("*")
            }
            Expr::Literal(text) => w.push(text),
            Expr::Raw(text) => {
                w.push("(")?;
                w.push(text)?;
                w.push(")")
            }
            Expr::CountStar => w.push("count(*)"),
            Expr::Aggregate { func, arg } => {
                w.push(func.as_str())?;
                w.push("(")?;
                self.write_expr(w, arg)?;
                w.push(")")
            }
            Expr::Binary { left, op, right } => {
                self.write_expr(w, left)?;
                w.push(" ")?;
                w.push(op.as_str())?;
                w.push(" ")?;
                self.write_expr(w, right)
            }
            Expr::And(parts) => {
                if parts.is_empty() {
                    return w.push("1 = 1");
                }
                w.push_joined(parts, " AND ", |w, p| match p {
                    Expr::And(_) => {
                        w.push("(")?;
                        self.write_expr(w, p)?;
                        w.push(")")
                    }
                    _ => self.write_expr(w, p),
                })
            }
            Expr::Not(inner) => {
                w.push("NOT ")?;
                self.write_expr(w, inner)
            }
            Expr::Exists(query) => {
                w.push("EXISTS (")?;
                self.write_select(w, query)?;
                w.push(")")
            }
            Expr::InSubquery { expr, query } => {
                self.write_expr(w, expr)?;
                w.push(" IN (")?;
                self.write_select(w, query)?;
                w.push(")")
            }
            Expr::Subquery(query) => {
                w.push("(")?;
                self.write_select(w, query)?;
                w.push(")")
            }
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Sqlite => write!(f, "sqlite"),
            Dialect::Postgres => write!(f, "postgres"),
        }
    }
}

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shadow_count() -> Statement {
        Statement::Select(
            Select::new(vec![Expr::CountStar])
                .from(Source::aliased(Relation::named("hmi.m_45s_shadow"), "S"))
                .filter(Some(Expr::raw("S.t_rec > 10"))),
        )
    }

    #[test]
    fn test_render_select_per_dialect() {
        assert_eq!(
            Dialect::Sqlite.render(&shadow_count()).unwrap(),
            "SELECT count(*) FROM \"hmi.m_45s_shadow\" AS S WHERE (S.t_rec > 10)"
        );
        assert_eq!(
            Dialect::Postgres.render(&shadow_count()).unwrap(),
            "SELECT count(*) FROM hmi.m_45s_shadow AS S WHERE (S.t_rec > 10)"
        );
    }

    #[test]
    fn test_render_join_order_limit() {
        let select = Select::new(vec![Expr::Star(Some("T".to_string()))])
            .from(Source::aliased(Relation::named("a.b"), "T"))
            .join(
                Source::aliased(Relation::named("a.b_shadow"), "S"),
                Expr::eq(Expr::qcol("T", "recnum"), Expr::qcol("S", "recnum")),
            )
            .order_by(vec![OrderItem {
                expr: Expr::qcol("S", "t_rec"),
                descending: true,
            }])
            .limit(Some(5));
        assert_eq!(
            Dialect::Sqlite.render(&Statement::Select(select)).unwrap(),
            "SELECT T.* FROM \"a.b\" AS T JOIN \"a.b_shadow\" AS S ON T.recnum = S.recnum \
             ORDER BY S.t_rec DESC LIMIT 5"
        );
    }

    #[test]
    fn test_render_ddl() {
        let create = Statement::CreateTable {
            relation: Relation::named("a.b_shadow"),
            columns: vec![
                ColumnDef::new("t_rec", ColumnType::Value(ValueType::Time)),
                ColumnDef::new("nrecords", ColumnType::Count),
                ColumnDef::new("recnum", ColumnType::RecordNumber { auto: false }),
            ],
            primary_key: vec!["t_rec".to_string()],
        };
        assert_eq!(
            Dialect::Sqlite.render(&create).unwrap(),
            "CREATE TABLE \"a.b_shadow\" (t_rec REAL, nrecords INTEGER NOT NULL, \
             recnum INTEGER NOT NULL, PRIMARY KEY (t_rec))"
        );
        assert_eq!(
            Dialect::Postgres.render(&create).unwrap(),
            "CREATE TABLE a.b_shadow (t_rec double precision, nrecords integer NOT NULL, \
             recnum bigint NOT NULL, PRIMARY KEY (t_rec))"
        );

        let drop = Statement::DropTable {
            relation: Relation::named("a.b_shadow"),
            if_exists: true,
        };
        assert_eq!(
            Dialect::Postgres.render(&drop).unwrap(),
            "DROP TABLE IF EXISTS a.b_shadow CASCADE"
        );
    }

    #[test]
    fn test_grant_only_in_postgres() {
        let grant = Statement::Grant {
            privileges: vec!["SELECT", "INSERT"],
            relation: Relation::named("a.b_shadow"),
            grantee: "ops".to_string(),
        };
        assert_eq!(
            Dialect::Postgres.render(&grant).unwrap(),
            "GRANT SELECT, INSERT ON a.b_shadow TO ops"
        );
        assert!(Dialect::Sqlite.render(&grant).is_err());
    }

    #[test]
    fn test_relation_exists_query() {
        assert_eq!(
            Dialect::Postgres.relation_exists_query("hmi.m_45s"),
            "SELECT count(*) FROM pg_tables WHERE schemaname ILIKE 'hmi' AND tablename ILIKE 'm_45s'"
        );
        assert!(Dialect::Sqlite
            .relation_exists_query("it's")
            .ends_with("lower('it''s')"));
    }

    #[test]
    fn test_dialect_names() {
        assert_eq!(Dialect::from_name("PostgreSQL"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_name("sqlite"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_name("oracle"), None);
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
