//! Randomized tests for the safe-query gate.
//!
//! The gate must never panic, and must never allow text that carries a
//! mutating statement, however it is padded or cased.

use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use sqltools_mcp_server::models::DatabaseType;
use sqltools_mcp_server::tools::safe_query::{SafeQueryGate, classify};

const ITERATIONS: usize = 500;

const MUTATIONS: &[&str] = &[
    "DELETE FROM users",
    "DROP TABLE users",
    "INSERT INTO users VALUES (1)",
    "UPDATE users SET a = 1",
    "TRUNCATE users",
    "ALTER TABLE users DROP COLUMN a",
    "CREATE TABLE x (a INT)",
];

const PADDING: &[&str] = &[" ", "\n", "\t", "  \n  ", "/* c */", "-- c\n"];

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn random_case(s: &str) -> String {
    let mut rng = rand::thread_rng();
    s.chars()
        .map(|c| {
            if rng.gen_bool(0.5) {
                c.to_ascii_lowercase()
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect()
}

fn edge_case_strings() -> Vec<String> {
    vec![
        String::new(),
        " ".to_string(),
        "\n\r\t".to_string(),
        "\0".to_string(),
        "🚀".repeat(100),
        "'OR 1=1--".to_string(),
        "'; DROP TABLE users--".to_string(),
        "a".repeat(100_000),
        "(".repeat(500),
        ")".repeat(500),
        "SELECT ".repeat(1000),
        "\"unterminated".to_string(),
        "`unterminated".to_string(),
        "$$unterminated".to_string(),
        "/* unterminated".to_string(),
        "\u{0000}\u{FFFF}".to_string(),
        "\x00\x01\x02".to_string(),
        ";;;;".to_string(),
    ]
}

fn gates() -> Vec<SafeQueryGate> {
    vec![
        SafeQueryGate::generic(),
        SafeQueryGate::for_database(DatabaseType::Postgres),
        SafeQueryGate::for_database(DatabaseType::MySql),
        SafeQueryGate::for_database(DatabaseType::Sqlite),
    ]
}

#[test]
fn fuzz_edge_cases_never_panic() {
    for gate in gates() {
        for input in edge_case_strings() {
            let _ = gate.check(&input);
        }
    }
}

#[test]
fn fuzz_random_text_never_panics() {
    let mut rng = rand::thread_rng();
    for _ in 0..ITERATIONS {
        let len = rng.gen_range(0..200);
        let input = random_string(len);
        for gate in gates() {
            let _ = gate.check(&input);
        }
    }
}

#[test]
fn fuzz_stacked_mutations_always_rejected() {
    let mut rng = rand::thread_rng();
    for _ in 0..ITERATIONS {
        let mutation = random_case(MUTATIONS.choose(&mut rng).unwrap());
        let pad = PADDING.choose(&mut rng).unwrap();
        let sql = format!("SELECT {}{};{}{}", rng.gen_range(0..1000), pad, pad, mutation);
        for gate in gates() {
            assert!(!gate.check(&sql).is_allowed(), "allowed {sql:?}");
        }
    }
}

#[test]
fn fuzz_bare_mutations_always_rejected() {
    let mut rng = rand::thread_rng();
    for _ in 0..ITERATIONS {
        let pad = PADDING.choose(&mut rng).unwrap();
        let sql = format!("{}{}", pad, random_case(MUTATIONS.choose(&mut rng).unwrap()));
        assert!(!classify(&sql).is_allowed(), "allowed {sql:?}");
    }
}

#[test]
fn fuzz_padded_selects_allowed() {
    let mut rng = rand::thread_rng();
    for _ in 0..ITERATIONS {
        let pad = PADDING.choose(&mut rng).unwrap();
        let column = format!("c{}", random_string(8));
        let sql = format!("{pad}{} {column} FROM t{pad}", random_case("select"));
        assert!(classify(&sql).is_allowed(), "rejected {sql:?}");
    }
}

#[test]
fn fuzz_literal_payloads_allowed() {
    let mut rng = rand::thread_rng();
    for _ in 0..ITERATIONS {
        let payload = MUTATIONS.choose(&mut rng).unwrap();
        let sql = format!("SELECT '{}' AS payload", payload.replace('\'', "''"));
        assert!(classify(&sql).is_allowed(), "rejected {sql:?}");
    }
}
