//! Synchronization trigger program
//!
//! The same transitions as [`super::GroupVersionResolver`], expressed as guarded
//! statements against the trigger's `NEW`/`OLD` row so the store applies them
//! inside the mutating statement's transaction.
//!
//! After insert:
//!
//! ```text
//! INSERT INTO S (pk.., nrecords, recnum) SELECT NEW.pk.., 1, NEW.recnum
//!     WHERE (SELECT count(*) FROM T AS g WHERE g.pk = NEW.pk) = 1
//! UPDATE S SET nrecords = nrecords + 1,
//!              recnum = (SELECT max(g.recnum) FROM T AS g WHERE g.pk = NEW.pk)
//!     WHERE pk = NEW.pk AND (SELECT count(*) FROM T AS g WHERE g.pk = NEW.pk) > 1
//! ```
//!
//! After delete:
//!
//! ```text
//! DELETE FROM S WHERE pk = OLD.pk AND NOT EXISTS (SELECT 1 FROM T AS g WHERE g.pk = OLD.pk)
//! UPDATE S SET nrecords = nrecords - 1,
//!              recnum = (SELECT max(g.recnum) FROM T AS g WHERE g.pk = OLD.pk)
//!     WHERE pk = OLD.pk
//! ```

use super::resolver::adjust_statement;
use crate::catalog::{Series, NRECORDS, RECNUM};
use crate::sql::{BinOp, Expr, Relation, Select, Source, Statement, TriggerEvent};

const GROUP_ALIAS: &str = "g";

/// Trigger name for one event
pub fn trigger_name(series: &Series, suffix: &str, event: TriggerEvent) -> String {
    let tag = match event {
        TriggerEvent::AfterInsert => "ins",
        TriggerEvent::AfterDelete => "del",
    };
    format!("{}_sync_{}", series.shadow_name(suffix), tag)
}

/// `pk = ROW.pk` for every primary-key column, shadow side unqualified
fn row_match(series: &Series, row: &str, qualifier: Option<&str>) -> Expr {
    let parts = series.primary_keys().iter().map(|key| {
        let column = match qualifier {
            Some(q) => Expr::qcol(q, key.as_str()),
            None => Expr::col(key.as_str()),
        };
        Expr::eq(column, Expr::qcol(row, key.as_str()))
    });
    Expr::all(parts).unwrap_or(Expr::And(Vec::new()))
}

/// `SELECT <column> FROM T AS g WHERE g.pk = ROW.pk`
fn group_query(series: &Series, row: &str, column: Expr) -> Select {
    Select::new(vec![column])
        .from(Source::aliased(series.relation(), GROUP_ALIAS))
        .filter(Some(row_match(series, row, Some(GROUP_ALIAS))))
}

fn group_count(series: &Series, row: &str) -> Expr {
    Expr::subquery(group_query(series, row, Expr::CountStar))
}

fn group_max(series: &Series, row: &str) -> Expr {
    Expr::subquery(group_query(
        series,
        row,
        Expr::max(Expr::qcol(GROUP_ALIAS, RECNUM)),
    ))
}

/// Trigger keeping the shadow index current after inserts
pub fn insert_trigger(series: &Series, suffix: &str) -> Statement {
    let shadow = Relation::named(series.shadow_name(suffix));
    let row = TriggerEvent::AfterInsert.row_ref();

    let mut columns = series.primary_keys().to_vec();
    columns.push(NRECORDS.to_string());
    columns.push(RECNUM.to_string());

    let mut values: Vec<Expr> = series
        .primary_keys()
        .iter()
        .map(|k| Expr::qcol(row, k.as_str()))
        .collect();
    values.push(Expr::int(1));
    values.push(Expr::qcol(row, RECNUM));

    let new_group = Statement::InsertSelect {
        relation: shadow.clone(),
        columns,
        query: Select::new(values).filter(Some(Expr::eq(group_count(series, row), Expr::int(1)))),
    };

    let existing_group = adjust_statement(
        &shadow,
        Expr::And(vec![
            row_match(series, row, None),
            Expr::binary(group_count(series, row), BinOp::Gt, Expr::int(1)),
        ]),
        1,
        Some(group_max(series, row)),
    );

    Statement::CreateTrigger {
        name: trigger_name(series, suffix, TriggerEvent::AfterInsert),
        relation: series.relation(),
        event: TriggerEvent::AfterInsert,
        body: vec![new_group, existing_group],
    }
}

/// Trigger keeping the shadow index current after deletes
pub fn delete_trigger(series: &Series, suffix: &str) -> Statement {
    let shadow = Relation::named(series.shadow_name(suffix));
    let row = TriggerEvent::AfterDelete.row_ref();

    let last_version = Statement::Delete {
        relation: shadow.clone(),
        filter: Some(Expr::And(vec![
            row_match(series, row, None),
            Expr::not_exists(group_query(series, row, Expr::int(1))),
        ])),
        returning: Vec::new(),
    };

    // No-op when the group was just removed above
    let remaining = adjust_statement(
        &shadow,
        row_match(series, row, None),
        -1,
        Some(group_max(series, row)),
    );

    Statement::CreateTrigger {
        name: trigger_name(series, suffix, TriggerEvent::AfterDelete),
        relation: series.relation(),
        event: TriggerEvent::AfterDelete,
        body: vec![last_version, remaining],
    }
}

/// Both synchronization triggers
pub fn sync_program(series: &Series, suffix: &str) -> Vec<Statement> {
    vec![insert_trigger(series, suffix), delete_trigger(series, suffix)]
}

/// Statements removing both synchronization triggers
pub fn drop_program(series: &Series, suffix: &str) -> Vec<Statement> {
    [TriggerEvent::AfterInsert, TriggerEvent::AfterDelete]
        .into_iter()
        .map(|event| Statement::DropTrigger {
            name: trigger_name(series, suffix, event),
            relation: series.relation(),
        })
        .collect()
}
