//! Identifier/literal quoting and privilege validation shared by all
//! resource reconcilers. Everything that ends up inside a SQL statement
//! goes through this module first.

use anyhow::{anyhow, Result};

/// SQLSTATE reported by Redshift for serialization conflicts during
/// concurrent DDL.
pub const SQLSTATE_CONCURRENT: &str = "XX000";
/// SQLSTATE for a schema that disappears mid-statement while another
/// session is still creating it.
pub const SQLSTATE_INVALID_SCHEMA_NAME: &str = "3F000";
pub const SQLSTATE_DEADLOCK: &str = "40P01";
pub const SQLSTATE_FAILED_TRANSACTION: &str = "25P02";

/// Whether a SQLSTATE code is one of the known transient errors worth
/// retrying the whole operation for.
pub fn is_retryable_sqlstate(code: &str) -> bool {
    matches!(
        code,
        SQLSTATE_CONCURRENT
            | SQLSTATE_INVALID_SCHEMA_NAME
            | SQLSTATE_DEADLOCK
            | SQLSTATE_FAILED_TRANSACTION
    )
}

/// Quote a SQL identifier by wrapping it in double quotes, doubling any
/// embedded double quote.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes. When the
/// input contains a backslash the literal gets the `E` prefix and the
/// backslashes are doubled, matching quote_literal_internal() in the
/// Postgres backend.
pub fn quote_literal(value: &str) -> String {
    if value.contains('\\') {
        format!("E'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

/// Quote a list of identifiers and join them with commas. With a prefix,
/// each identifier is rendered as `"prefix"."name"`.
pub fn quote_ident_list(names: &[String], prefix: Option<&str>) -> String {
    names
        .iter()
        .map(|name| match prefix {
            Some(p) => format!("{}.{}", quote_ident(p), quote_ident(name)),
            None => quote_ident(name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check a privilege keyword list against the set allowed for the given
/// object type. Comparison is case-insensitive on both sides.
pub fn validate_privileges(privileges: &[String], object_type: &str) -> Result<()> {
    let allowed: &[&str] = match object_type.to_lowercase().as_str() {
        "schema" => &["CREATE", "USAGE"],
        "table" => &[
            "SELECT",
            "UPDATE",
            "INSERT",
            "DELETE",
            "DROP",
            "REFERENCES",
            "RULE",
            "TRIGGER",
        ],
        // USAGE is only valid for databases created from datashares
        "database" => &["CREATE", "TEMPORARY", "USAGE"],
        "procedure" | "function" => &["EXECUTE"],
        "language" => {
            if privileges.is_empty() {
                return Err(anyhow!("language privileges must not be empty"));
            }
            &["USAGE"]
        }
        other => return Err(anyhow!("unknown object type: {}", other)),
    };

    for privilege in privileges {
        if !allowed.contains(&privilege.to_uppercase().as_str()) {
            return Err(anyhow!(
                "invalid privilege {} for object type {}, expected one of: {:?}",
                privilege,
                object_type,
                allowed
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("analysts"), "\"analysts\"");
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
        assert_eq!(quote_ident("UPPER"), "\"UPPER\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
        assert_eq!(quote_literal("back\\slash"), "E'back\\\\slash'");
        assert_eq!(quote_literal("both\\'"), "E'both\\\\'''");
    }

    #[test]
    fn test_quote_ident_list() {
        let names = vec!["t1".to_string(), "t2".to_string()];
        assert_eq!(quote_ident_list(&names, None), "\"t1\", \"t2\"");
        assert_eq!(
            quote_ident_list(&names, Some("public")),
            "\"public\".\"t1\", \"public\".\"t2\""
        );
    }

    #[test]
    fn test_validate_privileges_table() {
        let privileges = vec!["SELECT".to_string(), "insert".to_string()];
        assert!(validate_privileges(&privileges, "table").is_ok());
        assert!(validate_privileges(&privileges, "TABLE").is_ok());

        let bad = vec!["EXECUTE".to_string()];
        assert!(validate_privileges(&bad, "table").is_err());
    }

    #[test]
    fn test_validate_privileges_schema() {
        let schema = vec!["CREATE".to_string(), "USAGE".to_string()];
        assert!(validate_privileges(&schema, "schema").is_ok());

        let bad = vec!["SELECT".to_string()];
        assert!(validate_privileges(&bad, "schema").is_err());
    }

    #[test]
    fn test_validate_privileges_database() {
        let grants = vec!["CREATE".to_string(), "TEMPORARY".to_string()];
        assert!(validate_privileges(&grants, "database").is_ok());

        let bad = vec!["SELECT".to_string()];
        assert!(validate_privileges(&bad, "database").is_err());
    }

    #[test]
    fn test_validate_privileges_callables_and_language() {
        let exec = vec!["EXECUTE".to_string()];
        assert!(validate_privileges(&exec, "function").is_ok());
        assert!(validate_privileges(&exec, "procedure").is_ok());

        let usage = vec!["USAGE".to_string()];
        assert!(validate_privileges(&usage, "language").is_ok());
        assert!(validate_privileges(&[], "language").is_err());
    }

    #[test]
    fn test_validate_privileges_unknown_object_type() {
        assert!(validate_privileges(&[], "view").is_err());
    }

    #[test]
    fn test_empty_privileges_are_valid_for_table() {
        assert!(validate_privileges(&[], "table").is_ok());
    }

    #[test]
    fn test_is_retryable_sqlstate() {
        assert!(is_retryable_sqlstate("XX000"));
        assert!(is_retryable_sqlstate("3F000"));
        assert!(is_retryable_sqlstate("40P01"));
        assert!(is_retryable_sqlstate("25P02"));
        assert!(!is_retryable_sqlstate("42501"));
        assert!(!is_retryable_sqlstate("42P06"));
    }
}
