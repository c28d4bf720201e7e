//! Networked (MySQL) to embedded (SQLite) dialect translation.
//!
//! A deterministic, ordered set of textual rewrites. This is not a parser:
//! anything outside the rule set passes through untouched, and the
//! [`check_translatable`] pass exists so schema bootstrap can refuse
//! constructs the rules cannot express instead of miscompiling them.

use std::sync::LazyLock;

use regex::Regex;

use crate::interfaces::storage_adapter::{Result, StorageError};

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).unwrap_or_else(|e| panic!("invalid dialect rule {pattern}: {e}")),
        replacement,
    }
}

/// Ordered rewrite rules. Order matters: clauses that contain
/// `CURRENT_TIMESTAMP` are handled before the bare function rewrite, and
/// primary-key auto increment before the bare keyword.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        // Table option `AUTO_INCREMENT=100`
        rule(r"(?i)\bAUTO_INCREMENT\s*=\s*\d+", ""),
        // `id INT(11) AUTO_INCREMENT PRIMARY KEY` -> rowid alias
        rule(
            r"(?i)\b(?:TINY|SMALL|MEDIUM|BIG)?INT(?:EGER)?(?:\s*\(\s*\d+\s*\))?\s+(?:AUTO_INCREMENT\s+PRIMARY\s+KEY|PRIMARY\s+KEY\s+AUTO_INCREMENT)\b",
            "INTEGER PRIMARY KEY AUTOINCREMENT",
        ),
        rule(r"(?i)\bAUTO_INCREMENT\b", "AUTOINCREMENT"),
        // No embedded equivalent
        rule(r"(?i)\s*\bON\s+UPDATE\s+CURRENT_TIMESTAMP(?:\s*\(\s*\))?", ""),
        // Default expressions must be parenthesised in the embedded engine
        rule(
            r"(?i)\bDEFAULT\s+(?:CURRENT_TIMESTAMP(?:\s*\(\s*\))?|NOW\s*\(\s*\))",
            "DEFAULT (datetime('now'))",
        ),
        rule(r"(?i)\bNOW\s*\(\s*\)", "datetime('now')"),
        rule(r"(?i)\bCURDATE\s*\(\s*\)", "date('now')"),
        rule(r"(?i)\bCURRENT_TIMESTAMP\b(?:\s*\(\s*\))?", "datetime('now')"),
        rule(r"(?i)\bTRUE\b", "1"),
        rule(r"(?i)\bFALSE\b", "0"),
        rule(r"(?i)\b(?:TINY|SMALL|MEDIUM|BIG)?INT(?:EGER)?\s*\(\s*\d+\s*\)", "INTEGER"),
        rule(r"(?i)\b(?:VAR)?CHAR\s*\(\s*\d+\s*\)", "TEXT"),
        rule(r"(?i)\bENUM\s*\([^)]*\)", "TEXT"),
        rule(r"(?i)\b(?:TINY|MEDIUM|LONG)TEXT\b", "TEXT"),
        rule(r"(?i)\bBOOLEAN\b", "INTEGER"),
        // Table options
        rule(r"(?i)\s*\bENGINE\s*=\s*\w+", ""),
        rule(r"(?i)\s*\b(?:DEFAULT\s+)?(?:CHARSET|CHARACTER\s+SET)\s*=?\s*\w+", ""),
        rule(r"(?i)\s*\bCOLLATE\s*=?\s*\w+", ""),
    ]
});

/// Constructs with no embedded-engine translation.
static UNTRANSLATABLE: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\bON\s+DUPLICATE\s+KEY\s+UPDATE\b", "ON DUPLICATE KEY UPDATE"),
        (r"(?i)\bUNSIGNED\b", "UNSIGNED column modifier"),
        (r"(?i)\bFOR\s+UPDATE\b", "FOR UPDATE locking read"),
        (r"(?i)\bLAST_INSERT_ID\s*\(", "LAST_INSERT_ID()"),
        (r"(?i)\bDATE_FORMAT\s*\(", "DATE_FORMAT()"),
        (
            r"(?im)^\s*(?:UNIQUE\s+|FULLTEXT\s+)?(?:KEY|INDEX)\s+`?\w+`?\s*\(",
            "inline KEY/INDEX table clause",
        ),
    ]
    .into_iter()
    .map(|(pattern, name)| {
        let re = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("invalid dialect check {pattern}: {e}"));
        (re, name)
    })
    .collect()
});

/// Rewrite a networked-dialect statement (or script) for the embedded engine.
pub fn to_embedded(sql: &str) -> String {
    RULES.iter().fold(sql.to_string(), |acc, rule| {
        rule.pattern.replace_all(&acc, rule.replacement).into_owned()
    })
}

/// Fail on the first construct the rule set cannot translate.
pub fn check_translatable(sql: &str) -> Result<()> {
    for (pattern, name) in UNTRANSLATABLE.iter() {
        if let Some(m) = pattern.find(sql) {
            return Err(StorageError::Dialect {
                construct: format!("{} (near '{}')", name, m.as_str().trim()),
            });
        }
    }
    Ok(())
}

/// Check, then translate. Used for bootstrap scripts.
pub fn translate_checked(sql: &str) -> Result<String> {
    check_translatable(sql)?;
    Ok(to_embedded(sql))
}

/// Split a script into individual statements on `;` outside quoted text.
///
/// `--` line comments are dropped.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = script.chars().peekable();

    while let Some(ch) = chars.next() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
            }
            None if ch == '-' && chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
                current.push('\n');
                continue;
            }
            None if ch == '\'' || ch == '"' || ch == '`' => quote = Some(ch),
            None if ch == ';' => {
                push_statement(&mut statements, &current);
                current.clear();
                continue;
            }
            None => {}
        }
        current.push(ch);
    }
    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let body = raw.trim();
    if !body.is_empty() {
        statements.push(body.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squash(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_auto_increment_primary_key_becomes_rowid_alias() {
        let out = to_embedded("id INT(11) AUTO_INCREMENT PRIMARY KEY,");
        assert_eq!(squash(&out), "id INTEGER PRIMARY KEY AUTOINCREMENT,");

        let out = to_embedded("id BIGINT PRIMARY KEY AUTO_INCREMENT,");
        assert_eq!(squash(&out), "id INTEGER PRIMARY KEY AUTOINCREMENT,");
    }

    #[test]
    fn test_time_functions() {
        assert_eq!(
            to_embedded("UPDATE t SET a = NOW(), b = CURDATE(), c = CURRENT_TIMESTAMP"),
            "UPDATE t SET a = datetime('now'), b = date('now'), c = datetime('now')"
        );
    }

    #[test]
    fn test_default_current_timestamp_is_parenthesised() {
        let out = to_embedded(
            "updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,",
        );
        assert_eq!(squash(&out), "updated_at TIMESTAMP DEFAULT (datetime('now')),");
    }

    #[test]
    fn test_boolean_literals() {
        assert_eq!(
            to_embedded("SELECT * FROM teachers WHERE is_active = TRUE AND x = false"),
            "SELECT * FROM teachers WHERE is_active = 1 AND x = 0"
        );
        // Word boundaries keep identifiers intact.
        assert_eq!(to_embedded("SELECT is_true_flag"), "SELECT is_true_flag");
    }

    #[test]
    fn test_sized_types() {
        let out = to_embedded("a TINYINT(1), b VARCHAR(255), c CHAR(2), d INT(11), e LONGTEXT");
        assert_eq!(out, "a INTEGER, b TEXT, c TEXT, d INTEGER, e TEXT");
    }

    #[test]
    fn test_enum_becomes_text() {
        let out = to_embedded("status ENUM('pending','approved','rejected') DEFAULT 'pending'");
        assert_eq!(out, "status TEXT DEFAULT 'pending'");
    }

    #[test]
    fn test_table_options_stripped() {
        let out = to_embedded(
            ") ENGINE=InnoDB AUTO_INCREMENT=5 DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;",
        );
        assert_eq!(out, ");");
    }

    #[test]
    fn test_translation_is_deterministic_and_idempotent() {
        let sql = "CREATE TABLE x (id INT AUTO_INCREMENT PRIMARY KEY, ok BOOLEAN DEFAULT TRUE)";
        let once = to_embedded(sql);
        assert_eq!(once, to_embedded(sql));
        assert_eq!(once, to_embedded(&once));
    }

    #[test]
    fn test_dml_passes_through_unchanged() {
        let sql = "INSERT INTO `classes` (`kode`, `nama`) VALUES (?, ?)";
        assert_eq!(to_embedded(sql), sql);
    }

    #[test]
    fn test_untranslatable_constructs_rejected() {
        for sql in [
            "INSERT INTO t (a) VALUES (1) ON DUPLICATE KEY UPDATE a = 2",
            "CREATE TABLE t (n INT UNSIGNED)",
            "SELECT * FROM t WHERE id = 1 FOR UPDATE",
            "CREATE TABLE t (\n  id INT,\n  KEY idx_id (id)\n)",
        ] {
            let err = check_translatable(sql).unwrap_err();
            assert!(matches!(err, StorageError::Dialect { .. }), "{sql}");
        }
        assert!(check_translatable("CREATE TABLE t (id INT(11) PRIMARY KEY)").is_ok());
    }

    #[test]
    fn test_split_statements_respects_quotes_and_comments() {
        let script =
            "-- don't split here; really\nCREATE TABLE a (x TEXT);\nINSERT INTO a VALUES ('x;y');\n\n";
        let statements = split_statements(script);
        assert_eq!(
            statements,
            vec![
                "CREATE TABLE a (x TEXT)".to_string(),
                "INSERT INTO a VALUES ('x;y')".to_string(),
            ]
        );
    }
}
