//! Access grant copying
//!
//! Stores that keep access-control lists report them as `grantee=codes/grantor`
//! entries (an empty grantee means everyone). Each code letter maps to one
//! privilege; a `*` after a letter marks grant option and is ignored.

use crate::sql::{Relation, Statement};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

static PRIVILEGES: Lazy<BTreeMap<char, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ('r', "SELECT"),
        ('a', "INSERT"),
        ('w', "UPDATE"),
        ('d', "DELETE"),
        ('D', "TRUNCATE"),
        ('x', "REFERENCES"),
        ('t', "TRIGGER"),
    ])
});

/// Privilege named by an ACL code letter
pub fn privilege_name(code: char) -> Option<&'static str> {
    PRIVILEGES.get(&code).copied()
}

/// Parse one ACL entry into its grantee and privileges
pub fn parse_acl(entry: &str) -> Option<(String, Vec<&'static str>)> {
    let (grantee, rest) = entry.trim().split_once('=')?;
    let codes = rest.split('/').next().unwrap_or_default();

    let mut privileges: Vec<&'static str> = Vec::new();
    for code in codes.chars().filter(|c| *c != '*') {
        if let Some(name) = privilege_name(code) {
            if !privileges.contains(&name) {
                privileges.push(name);
            }
        }
    }
    if privileges.is_empty() {
        return None;
    }

    let grantee = if grantee.is_empty() {
        "PUBLIC".to_string()
    } else {
        grantee.trim_matches('"').to_string()
    };
    Some((grantee, privileges))
}

/// `GRANT` statements that copy `acl` onto `relation`
pub fn grant_statements(acl: &[String], relation: &Relation) -> Vec<Statement> {
    acl.iter()
        .filter_map(|entry| parse_acl(entry))
        .map(|(grantee, privileges)| Statement::Grant {
            privileges,
            relation: relation.clone(),
            grantee,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Dialect;

    #[test]
    fn test_privilege_registry() {
        assert_eq!(privilege_name('r'), Some("SELECT"));
        assert_eq!(privilege_name('D'), Some("TRUNCATE"));
        assert_eq!(privilege_name('q'), None);
    }

    #[test]
    fn test_parse_acl() {
        assert_eq!(
            parse_acl("ops=arwd/owner"),
            Some(("ops".to_string(), vec!["INSERT", "SELECT", "UPDATE", "DELETE"]))
        );
        assert_eq!(
            parse_acl("=r*/owner"),
            Some(("PUBLIC".to_string(), vec!["SELECT"]))
        );
        assert_eq!(parse_acl("nobody=/owner"), None);
        assert_eq!(parse_acl("garbage"), None);
    }

    #[test]
    fn test_grant_statements_render() {
        let acl = vec!["ops=r/owner".to_string(), "=rx/owner".to_string()];
        let stmts = grant_statements(&acl, &Relation::named("hmi.m_45s_shadow"));
        let rendered: Vec<String> = stmts
            .iter()
            .map(|s| Dialect::Postgres.render(s).unwrap())
            .collect();
        assert_eq!(
            rendered,
            vec![
                "GRANT SELECT ON hmi.m_45s_shadow TO ops",
                "GRANT SELECT, REFERENCES ON hmi.m_45s_shadow TO PUBLIC",
            ]
        );
    }
}
