use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::sql::quote_ident;

// A role config item. Entries with `drop: true` are removed from the
// cluster instead.
//
// ```yaml
// - name: readonly
// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub drop: bool,
}

impl Role {
    pub fn to_sql_create(&self) -> String {
        format!("CREATE ROLE {}", quote_ident(&self.lowered_name()))
    }

    pub fn to_sql_drop(&self) -> String {
        format!("DROP ROLE {}", quote_ident(&self.lowered_name()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(anyhow!("role name is empty"));
        }

        Ok(())
    }

    pub fn lowered_name(&self) -> String {
        self.name.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_sql() {
        let role = Role {
            name: "ReadOnly".to_string(),
            drop: false,
        };
        assert_eq!(role.to_sql_create(), "CREATE ROLE \"readonly\"");
        assert_eq!(role.to_sql_drop(), "DROP ROLE \"readonly\"");
    }

    #[test]
    fn test_validate() {
        let role = Role {
            name: String::new(),
            drop: false,
        };
        assert!(role.validate().is_err());
    }
}
