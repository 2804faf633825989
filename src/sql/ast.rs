//! Statement AST
//!
//! Structured statements rendered by [`crate::sql::Dialect`]. Planner and
//! shadow code build these instead of concatenating text, so strategies can be
//! asserted on structure without a store.

use crate::value::ValueType;

/// A relation reference
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// Catalog relation (series, shadow index); quoted per dialect
    Named(String),
    /// Session-scoped temporary relation; rendered bare
    Temp(String),
}

impl Relation {
    pub fn named(name: impl Into<String>) -> Self {
        Relation::Named(name.into())
    }

    pub fn temp(name: impl Into<String>) -> Self {
        Relation::Temp(name.into())
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Gt,
    Lt,
    Plus,
    Minus,
}

impl BinOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Eq => "=",
            BinOp::Gt => ">",
            BinOp::Lt => "<",
            BinOp::Plus => "+",
            BinOp::Minus => "-",
        }
    }
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Max,
    Min,
    Count,
}

impl AggFunc {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggFunc::Max => "max",
            AggFunc::Min => "min",
            AggFunc::Count => "count",
        }
    }
}

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Optionally qualified column
    Column {
        qualifier: Option<String>,
        name: String,
    },
    /// `*` or `alias.*`
    Star(Option<String>),
    /// Pre-formatted literal text
    Literal(String),
    /// Caller predicate text, already qualified; rendered in parentheses
    Raw(String),
    /// `count(*)`
    CountStar,
    /// `max(e)`, `min(e)`, `count(e)`
    Aggregate { func: AggFunc, arg: Box<Expr> },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// Conjunction; an empty list renders as `1 = 1`
    And(Vec<Expr>),
    Not(Box<Expr>),
    Exists(Box<Select>),
    InSubquery { expr: Box<Expr>, query: Box<Select> },
    /// Scalar subquery
    Subquery(Box<Select>),
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            qualifier: None,
            name: name.into(),
        }
    }

    pub fn qcol(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    pub fn lit(text: impl Into<String>) -> Self {
        Expr::Literal(text.into())
    }

    pub fn int(v: i64) -> Self {
        Expr::Literal(v.to_string())
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Expr::Raw(text.into())
    }

    pub fn binary(left: Expr, op: BinOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinOp::Eq, right)
    }

    pub fn max(arg: Expr) -> Self {
        Expr::Aggregate {
            func: AggFunc::Max,
            arg: Box::new(arg),
        }
    }

    pub fn min(arg: Expr) -> Self {
        Expr::Aggregate {
            func: AggFunc::Min,
            arg: Box::new(arg),
        }
    }

    pub fn subquery(query: Select) -> Self {
        Expr::Subquery(Box::new(query))
    }

    pub fn in_subquery(expr: Expr, query: Select) -> Self {
        Expr::InSubquery {
            expr: Box::new(expr),
            query: Box::new(query),
        }
    }

    pub fn not_exists(query: Select) -> Self {
        Expr::Not(Box::new(Expr::Exists(Box::new(query))))
    }

    /// Conjunction of `parts`, flattening nested conjunctions
    ///
    /// Returns `None` for an empty list and the sole element for one.
    pub fn all(parts: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Expr::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Expr::And(flat)),
        }
    }

    /// Pairwise equality of `names` between two qualifiers
    pub fn tuple_eq(left: &str, right: &str, names: &[String]) -> Option<Expr> {
        Self::all(
            names
                .iter()
                .map(|n| Self::eq(Self::qcol(left, n.as_str()), Self::qcol(right, n.as_str()))),
        )
    }
}

/// A relation in a `FROM` or `JOIN` clause
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub relation: Relation,
    pub alias: Option<String>,
}

impl Source {
    pub fn new(relation: Relation) -> Self {
        Self {
            relation,
            alias: None,
        }
    }

    pub fn aliased(relation: Relation, alias: impl Into<String>) -> Self {
        Self {
            relation,
            alias: Some(alias.into()),
        }
    }
}

/// Inner join
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub source: Source,
    pub on: Expr,
}

/// Sort key
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub descending: bool,
}

/// A `SELECT`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub columns: Vec<Expr>,
    pub from: Option<Source>,
    pub joins: Vec<Join>,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
}

impl Select {
    pub fn new(columns: Vec<Expr>) -> Self {
        Self {
            columns,
            ..Default::default()
        }
    }

    pub fn from(mut self, source: Source) -> Self {
        self.from = Some(source);
        self
    }

    pub fn join(mut self, source: Source, on: Expr) -> Self {
        self.joins.push(Join { source, on });
        self
    }

    /// Add a filter, conjoined with any existing one
    pub fn filter(mut self, expr: Option<Expr>) -> Self {
        self.filter = Expr::all(self.filter.take().into_iter().chain(expr));
        self
    }

    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    pub fn order_by(mut self, items: Vec<OrderItem>) -> Self {
        self.order_by = items;
        self
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }
}

/// Column types in DDL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Keyword column typed by its value type
    Value(ValueType),
    /// Row identifier; `auto` allocates monotonically and never reuses
    RecordNumber { auto: bool },
    /// Version count
    Count,
}

/// Column definition
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Trigger timing and event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    AfterInsert,
    AfterDelete,
}

impl TriggerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerEvent::AfterInsert => "AFTER INSERT",
            TriggerEvent::AfterDelete => "AFTER DELETE",
        }
    }

    /// Row reference visible inside the trigger body
    pub fn row_ref(&self) -> &'static str {
        match self {
            TriggerEvent::AfterInsert => "NEW",
            TriggerEvent::AfterDelete => "OLD",
        }
    }
}

/// Statements
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Select),
    CreateTempAs {
        name: String,
        query: Select,
    },
    CreateTable {
        relation: Relation,
        columns: Vec<ColumnDef>,
        primary_key: Vec<String>,
    },
    CreateIndex {
        name: String,
        relation: Relation,
        columns: Vec<String>,
    },
    DropTable {
        relation: Relation,
        if_exists: bool,
    },
    InsertSelect {
        relation: Relation,
        columns: Vec<String>,
        query: Select,
    },
    InsertValues {
        relation: Relation,
        columns: Vec<String>,
        values: Vec<Expr>,
        returning: Vec<String>,
    },
    Update {
        relation: Relation,
        assignments: Vec<(String, Expr)>,
        filter: Option<Expr>,
    },
    Delete {
        relation: Relation,
        filter: Option<Expr>,
        returning: Vec<String>,
    },
    Grant {
        privileges: Vec<&'static str>,
        relation: Relation,
        grantee: String,
    },
    CreateTrigger {
        name: String,
        relation: Relation,
        event: TriggerEvent,
        body: Vec<Statement>,
    },
    DropTrigger {
        name: String,
        relation: Relation,
    },
}
