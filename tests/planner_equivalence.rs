//! Planned queries agree with a full aggregate of the primary table
//!
//! Every combination of filters, first/last directives, limits and access
//! mode is run through the planner and compared with current versions
//! computed directly from all rows.

use shadowtab::planner::Extremum;
use shadowtab::records::Record;
use shadowtab::value::Value;
use shadowtab::{
    Config, CreationGate, QueryRequest, RelationalStore, SeriesDefinition, Session, SyncMode,
};
use std::collections::BTreeMap;

const SERIES: &str = "su.eq";

#[derive(Debug, Clone, Copy)]
struct Current {
    recnum: i64,
    a: i64,
    b: i64,
    q: i64,
}

type Pred = fn(&Current) -> bool;

/// A primary-key conjunct and the key position of its highest-ranked attribute
struct PkConjunct {
    sql: &'static str,
    slot: usize,
    test: Pred,
}

fn pk_cases() -> Vec<Vec<PkConjunct>> {
    vec![
        vec![],
        vec![PkConjunct { sql: "a = 1", slot: 0, test: |c| c.a == 1 }],
        vec![PkConjunct { sql: "b >= 1", slot: 1, test: |c| c.b >= 1 }],
        vec![
            PkConjunct { sql: "a < 3", slot: 0, test: |c| c.a < 3 },
            PkConjunct { sql: "b <> 0", slot: 1, test: |c| c.b != 0 },
        ],
        vec![PkConjunct { sql: "a <= b", slot: 1, test: |c| c.a <= c.b }],
    ]
}

struct NpkFilter {
    sql: &'static str,
    test: Pred,
}

fn npk_cases() -> Vec<Option<NpkFilter>> {
    vec![
        None,
        Some(NpkFilter { sql: "q = 1", test: |c| c.q == 1 }),
        Some(NpkFilter {
            sql: "q > 0 OR recnum < 10",
            test: |c| c.q > 0 || c.recnum < 10,
        }),
    ]
}

fn directive_cases() -> Vec<Vec<(usize, Extremum)>> {
    vec![
        vec![],
        vec![(0, Extremum::Last)],
        vec![(1, Extremum::First)],
        vec![(0, Extremum::Last), (1, Extremum::First)],
    ]
}

#[derive(Debug, Clone, Copy)]
enum Cap {
    None,
    Limit(u64),
    LastN(u64),
}

const CAPS: [Cap; 4] = [Cap::None, Cap::Limit(1), Cap::Limit(3), Cap::LastN(2)];

fn setup(sync: SyncMode) -> Session {
    let mut config = Config::default();
    config.shadow.sync = sync;
    // Low enough that unbounded and larger limits are staged
    config.planner.stage_threshold = 2;
    let session = Session::in_memory(config)
        .unwrap()
        .with_gate(CreationGate::new(true));
    session
        .create_series(
            &SeriesDefinition::from_json(
                r#"{
                    "name": "su.eq",
                    "attributes": [
                        { "name": "a", "type": "int" },
                        { "name": "b", "type": "int" },
                        { "name": "q", "type": "int" }
                    ],
                    "primary_key": ["a", "b"],
                    "create_shadow": true
                }"#,
            )
            .unwrap(),
        )
        .unwrap();

    let mut seed: u64 = 0x2545_f491;
    let mut next = move |m: u64| {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((seed >> 33) % m) as i32
    };
    let mut recnums = Vec::new();
    for _ in 0..45 {
        let record = Record::new()
            .set("a", Value::Int(next(4)))
            .set("b", Value::Int(next(3)))
            .set("q", Value::Int(next(3)));
        recnums.push(session.insert(SERIES, &record).unwrap());
    }
    for i in [3usize, 17, 30, 44] {
        assert!(session.delete(SERIES, recnums[i]).unwrap());
    }
    assert!(session.check_shadow(SERIES).unwrap().is_consistent());
    session
}

fn current_versions(session: &Session) -> Vec<Current> {
    let rows = session
        .store()
        .query_binary("SELECT recnum, a, b, q FROM \"su.eq\"")
        .unwrap();
    let mut groups: BTreeMap<(i64, i64), Current> = BTreeMap::new();
    for row in rows {
        let c = Current {
            recnum: row[0].as_i64().unwrap(),
            a: row[1].as_i64().unwrap(),
            b: row[2].as_i64().unwrap(),
            q: row[3].as_i64().unwrap(),
        };
        let entry = groups.entry((c.a, c.b)).or_insert(c);
        if c.recnum > entry.recnum {
            *entry = c;
        }
    }
    groups.into_values().collect()
}

fn key_of(c: &Current, slot: usize) -> i64 {
    if slot == 0 {
        c.a
    } else {
        c.b
    }
}

/// Matching current versions in output order, ignoring any cap
fn reference(
    all: &[Current],
    pk: &[PkConjunct],
    npk: Option<Pred>,
    directives: &[(usize, Extremum)],
    descending: bool,
) -> Vec<Current> {
    let mut rows: Vec<Current> = all.to_vec();
    if directives.is_empty() {
        rows.retain(|c| pk.iter().all(|p| (p.test)(c)));
    } else {
        // Narrow one key attribute at a time
        for slot in 0..2 {
            let conjuncts: Vec<&PkConjunct> = pk.iter().filter(|p| p.slot == slot).collect();
            let directive = directives.iter().find(|(s, _)| *s == slot).map(|(_, d)| *d);
            rows.retain(|c| conjuncts.iter().all(|p| (p.test)(c)));
            let extreme = match directive {
                Some(Extremum::First) => rows.iter().map(|c| key_of(c, slot)).min(),
                Some(Extremum::Last) => rows.iter().map(|c| key_of(c, slot)).max(),
                None => continue,
            };
            if let Some(m) = extreme {
                rows.retain(|c| key_of(c, slot) == m);
            }
        }
    }
    if let Some(npk) = npk {
        rows.retain(|c| npk(c));
    }
    rows.sort_by_key(|c| (c.a, c.b));
    if descending {
        rows.reverse();
    }
    rows
}

fn request(
    base: QueryRequest,
    pk: &[PkConjunct],
    npk: Option<&str>,
    directives: &[(usize, Extremum)],
    cap: Cap,
) -> QueryRequest {
    let pk_sql: Vec<&str> = pk.iter().map(|p| p.sql).collect();
    let mut req = base.pk_filter(pk_sql.join(" AND "));
    if let Some(npk) = npk {
        req = req.npk_filter(npk);
    }
    for (slot, which) in directives {
        req = req.extremum(if *slot == 0 { "a" } else { "b" }, *which);
    }
    match cap {
        Cap::None => req,
        Cap::Limit(n) => req.limit(n),
        Cap::LastN(n) => req.last_n(n),
    }
}

fn check_all(sync: SyncMode) {
    let session = setup(sync);
    let all = current_versions(&session);
    assert!(all.len() > 5);

    let mut checked = 0;
    for pk in pk_cases() {
        for npk in npk_cases() {
            let npk_sql = npk.as_ref().map(|n| n.sql);
            let npk_test = npk.as_ref().map(|n| n.test);
            for directives in directive_cases() {
                let unbounded = reference(&all, &pk, npk_test, &directives, false);
                let count_req = request(QueryRequest::count(), &pk, npk_sql, &directives, Cap::None);
                assert_eq!(
                    session.count(SERIES, &count_req).unwrap(),
                    unbounded.len() as u64,
                    "count {:?}",
                    count_req
                );

                for cap in CAPS {
                    let descending = matches!(cap, Cap::LastN(_));
                    let mut expected: Vec<i64> =
                        reference(&all, &pk, npk_test, &directives, descending)
                            .iter()
                            .map(|c| c.recnum)
                            .collect();
                    match cap {
                        Cap::Limit(n) | Cap::LastN(n) => expected.truncate(n as usize),
                        Cap::None => {}
                    }

                    let req = request(QueryRequest::select(&["recnum"]), &pk, npk_sql, &directives, cap);
                    let fetched: Vec<i64> = session
                        .select(SERIES, &req)
                        .unwrap()
                        .integers("recnum")
                        .into_iter()
                        .map(|v| v.unwrap())
                        .collect();
                    assert_eq!(fetched, expected, "select {:?}", req);

                    let mut streamed = Vec::new();
                    session
                        .stream(SERIES, &req, &mut |row| {
                            streamed.push(row[0].as_i64().unwrap());
                            true
                        })
                        .unwrap();
                    assert_eq!(streamed, expected, "stream {:?}", req);
                    checked += 1;
                }
            }
        }
    }
    assert_eq!(checked, 5 * 3 * 4 * CAPS.len());
}

#[test]
fn test_trigger_synced_plans_match_reference() {
    check_all(SyncMode::Trigger);
}

#[test]
fn test_application_synced_plans_match_reference() {
    check_all(SyncMode::Application);
}

#[test]
fn test_strategies_are_exercised() {
    let session = setup(SyncMode::Trigger);
    let strategy = |req: &QueryRequest| session.plan(SERIES, req).unwrap().strategy.to_string();

    let staged = QueryRequest::select(&[]).pk_filter("a = 1").npk_filter("q = 1");
    assert_eq!(strategy(&staged), "Both/Staged");
    assert_eq!(strategy(&staged.clone().limit(2)), "Both/DirectJoin");
    assert_eq!(strategy(&staged.clone().streaming(true)), "Both/DirectJoin");
    assert_eq!(strategy(&QueryRequest::select(&[]).last("a")), "Unfiltered/FirstLastChain");
    assert_eq!(strategy(&QueryRequest::count().npk_filter("q = 2")), "NonPrimaryOnly/DirectJoin");
}

#[test]
fn test_unknown_directive_attribute() {
    let session = setup(SyncMode::Trigger);
    let err = session
        .select(SERIES, &QueryRequest::select(&[]).last("q"))
        .unwrap_err();
    assert!(err.to_string().contains('q'), "{}", err);
}
