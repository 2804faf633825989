//! SQL statement building
//!
//! - [`ast`]: structured statements and expressions
//! - [`render`]: dialect-specific rendering (SQLite executes, Postgres renders for export)
//! - [`predicate`]: tokenizing, alias-qualifying and splitting caller predicates

pub mod ast;
pub mod predicate;
pub mod render;

pub use ast::{
    AggFunc, BinOp, ColumnDef, ColumnType, Expr, Join, OrderItem, Relation, Select, Source,
    Statement, TriggerEvent,
};
pub use render::{quote_ident, Dialect};
