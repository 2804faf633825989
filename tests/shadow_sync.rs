//! Shadow index synchronization against a live SQLite store

use proptest::prelude::*;
use shadowtab::records::Record;
use shadowtab::shadow::CreateOutcome;
use shadowtab::value::{Value, ValueType};
use shadowtab::{
    Config, CreationGate, ErrorKind, RelationalStore, SeriesDefinition, Session, SyncMode,
};

const SERIES: &str = "su.sync";

fn definition(create_shadow: bool) -> SeriesDefinition {
    let mut def = SeriesDefinition::from_json(
        r#"{
            "name": "su.sync",
            "attributes": [
                { "name": "a", "type": "int" },
                { "name": "b", "type": "string" },
                { "name": "q", "type": "int" }
            ],
            "primary_key": ["a", "b"]
        }"#,
    )
    .unwrap();
    def.create_shadow = create_shadow;
    def
}

fn session(sync: SyncMode) -> Session {
    let mut config = Config::default();
    config.shadow.sync = sync;
    let session = Session::in_memory(config)
        .unwrap()
        .with_gate(CreationGate::new(true));
    session.create_series(&definition(true)).unwrap();
    session
}

fn rec(a: i32, b: &str) -> Record {
    Record::new()
        .set("a", Value::Int(a))
        .set("b", Value::String(b.to_string()))
        .set("q", Value::Int(0))
}

fn filler(n: i32) -> Record {
    rec(1000 + n, "filler")
}

/// (nrecords, recnum) of the shadow row for (a, b)
fn shadow_row(session: &Session, a: i32, b: &str) -> Option<(i64, i64)> {
    let rows = session
        .store()
        .query_binary(&format!(
            "SELECT nrecords, recnum FROM \"su.sync_shadow\" WHERE a = {} AND b = '{}'",
            a, b
        ))
        .unwrap();
    rows.first()
        .map(|r| (r[0].as_i64().unwrap(), r[1].as_i64().unwrap()))
}

fn group_of_three(session: &Session) -> (i64, i64, i64) {
    // Fillers in other groups push the versions to row identifiers 5, 9 and 12
    let mut fill = 0;
    let mut pad = |session: &Session, n: usize| {
        for _ in 0..n {
            session.insert(SERIES, &filler(fill)).unwrap();
            fill += 1;
        }
    };
    pad(session, 4);
    let first = session.insert(SERIES, &rec(7, "x")).unwrap();
    pad(session, 3);
    let second = session.insert(SERIES, &rec(7, "x")).unwrap();
    pad(session, 2);
    let third = session.insert(SERIES, &rec(7, "x")).unwrap();
    (first, second, third)
}

#[test]
fn test_delete_transitions() {
    for sync in [SyncMode::Trigger, SyncMode::Application] {
        let s = session(sync);
        let (first, second, third) = group_of_three(&s);
        assert_eq!((first, second, third), (5, 9, 12));
        assert_eq!(shadow_row(&s, 7, "x"), Some((3, 12)));

        // Superseded version: count drops, current version stays
        assert!(s.delete(SERIES, 9).unwrap());
        assert_eq!(shadow_row(&s, 7, "x"), Some((2, 12)));

        // Current version: the older one is exposed
        s.insert(SERIES, &filler(99)).unwrap();
        assert!(s.delete(SERIES, 12).unwrap());
        assert_eq!(shadow_row(&s, 7, "x"), Some((1, 5)));

        assert!(s.delete(SERIES, 5).unwrap());
        assert_eq!(shadow_row(&s, 7, "x"), None);
        assert!(s.check_shadow(SERIES).unwrap().is_consistent());
    }
}

#[test]
fn test_delete_current_of_three() {
    for sync in [SyncMode::Trigger, SyncMode::Application] {
        let s = session(sync);
        group_of_three(&s);
        assert!(s.delete(SERIES, 12).unwrap());
        assert_eq!(shadow_row(&s, 7, "x"), Some((2, 9)));
    }
}

#[test]
fn test_create_is_idempotent() {
    let s = session(SyncMode::Trigger);
    s.insert(SERIES, &rec(1, "p")).unwrap();
    s.insert(SERIES, &rec(1, "p")).unwrap();

    let outcome = s.create_shadow_index(SERIES, None).unwrap();
    assert!(matches!(outcome, CreateOutcome::AlreadyPresent { .. }));
    assert_eq!(shadow_row(&s, 1, "p"), Some((2, 2)));

    // An alternate copy is populated but not kept in sync
    let copy = s.create_shadow_index(SERIES, Some("su.sync_copy")).unwrap();
    assert!(matches!(copy, CreateOutcome::Created { groups: 1, .. }));
    s.insert(SERIES, &rec(2, "p")).unwrap();
    assert_eq!(
        s.store()
            .query_i64("SELECT count(*) FROM \"su.sync_copy\"")
            .unwrap(),
        Some(1)
    );
    assert_eq!(
        s.store()
            .query_i64("SELECT count(*) FROM \"su.sync_shadow\"")
            .unwrap(),
        Some(2)
    );
}

#[test]
fn test_late_shadow_matches_history() {
    let mut config = Config::default();
    config.shadow.sync = SyncMode::Trigger;
    let s = Session::in_memory(config)
        .unwrap()
        .with_gate(CreationGate::new(false));
    s.create_series(&definition(false)).unwrap();
    for (a, b) in [(1, "p"), (1, "p"), (2, "p"), (1, "q"), (2, "p")] {
        s.insert(SERIES, &rec(a, b)).unwrap();
    }
    assert!(s.delete(SERIES, 4).unwrap());

    let err = s.create_shadow_index(SERIES, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert!(!s.shadow_index_exists(SERIES).unwrap());

    s.enable_shadow_creation(true);
    let outcome = s.create_shadow_index(SERIES, None).unwrap();
    assert!(matches!(outcome, CreateOutcome::Created { groups: 2, .. }));
    assert_eq!(shadow_row(&s, 1, "p"), Some((2, 2)));
    assert_eq!(shadow_row(&s, 2, "p"), Some((2, 5)));
    assert_eq!(shadow_row(&s, 1, "q"), None);
    assert!(s.check_shadow(SERIES).unwrap().is_consistent());
}

#[derive(Debug, Clone)]
enum Op {
    Insert(i32, bool),
    /// Delete the n-th live row, modulo the number of live rows
    Delete(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..4i32, any::<bool>()).prop_map(|(a, b)| Op::Insert(a, b)),
        2 => (0..64usize).prop_map(Op::Delete),
    ]
}

fn replay_with(s: &Session, series: &str, ops: &[Op], make: impl Fn(i32, bool) -> Record) {
    let mut live: Vec<i64> = Vec::new();
    for op in ops {
        match op {
            Op::Insert(a, b) => live.push(s.insert(series, &make(*a, *b)).unwrap()),
            Op::Delete(n) if !live.is_empty() => {
                let recnum = live.remove(n % live.len());
                assert!(s.delete(series, recnum).unwrap());
            }
            Op::Delete(_) => {}
        }
    }
    let report = s.check_shadow(series).unwrap();
    assert!(report.is_consistent(), "{:?}", report);
}

fn replay(sync: SyncMode, ops: &[Op]) {
    let s = session(sync);
    replay_with(&s, SERIES, ops, |a, b| rec(a, if b { "p" } else { "q" }));
}

// ==================== Float and string keys ====================

const KEYED: &str = "su.keyed";

/// Keys whose stored form differs from their literal: inexact floats, the
/// missing float, quoted and empty strings
fn keyed_record(a: i32, b: bool) -> Record {
    let x = match a {
        0 => Value::Float(0.1),
        1 => Value::Float(1.0 / 3.0),
        2 => Value::missing(ValueType::Float),
        _ => Value::Float(-2.5),
    };
    let tag = if b { "'x'" } else { "" };
    Record::new()
        .set("x", x)
        .set("tag", Value::String(tag.to_string()))
        .set("q", Value::Int(a))
}

fn keyed_session(sync: SyncMode) -> Session {
    let mut config = Config::default();
    config.shadow.sync = sync;
    let session = Session::in_memory(config)
        .unwrap()
        .with_gate(CreationGate::new(true));
    let mut def = SeriesDefinition::from_json(
        r#"{
            "name": "su.keyed",
            "attributes": [
                { "name": "x", "type": "float" },
                { "name": "tag", "type": "string" },
                { "name": "q", "type": "int" }
            ],
            "primary_key": ["x", "tag"]
        }"#,
    )
    .unwrap();
    def.create_shadow = true;
    session.create_series(&def).unwrap();
    session
}

fn replay_keyed(sync: SyncMode, ops: &[Op]) {
    let s = keyed_session(sync);
    replay_with(&s, KEYED, ops, keyed_record);
}

#[test]
fn test_keyed_delete_transitions() {
    for sync in [SyncMode::Trigger, SyncMode::Application] {
        let s = keyed_session(sync);
        for a in 0..4 {
            let older = s.insert(KEYED, &keyed_record(a, true)).unwrap();
            let newer = s.insert(KEYED, &keyed_record(a, true)).unwrap();
            assert!(s.delete(KEYED, newer).unwrap());
            assert!(s.delete(KEYED, older).unwrap());
        }
        let report = s.check_shadow(KEYED).unwrap();
        assert!(report.is_consistent(), "{:?}", report);
        assert_eq!(report.shadow_rows, 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_trigger_sync_keeps_invariant(ops in prop::collection::vec(op(), 0..40)) {
        replay(SyncMode::Trigger, &ops);
    }

    #[test]
    fn prop_application_sync_keeps_invariant(ops in prop::collection::vec(op(), 0..40)) {
        replay(SyncMode::Application, &ops);
    }

    #[test]
    fn prop_trigger_sync_keeps_invariant_on_float_keys(ops in prop::collection::vec(op(), 0..40)) {
        replay_keyed(SyncMode::Trigger, &ops);
    }

    #[test]
    fn prop_application_sync_keeps_invariant_on_float_keys(ops in prop::collection::vec(op(), 0..40)) {
        replay_keyed(SyncMode::Application, &ops);
    }
}
