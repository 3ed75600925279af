use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::sql::{quote_ident, quote_ident_list};

// A group config item, for example:
//
// ```yaml
// - name: analysts
//   users:
//   - alice
//   - bob
// ```
//
// Entries with `drop: true` are removed from the cluster instead.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub drop: bool,
}

impl Group {
    // CREATE GROUP group_name [ WITH USER username [, ...] ]
    pub fn to_sql_create(&self) -> String {
        let mut sql = format!("CREATE GROUP {}", quote_ident(&self.lowered_name()));
        if !self.users.is_empty() {
            sql += &format!(" WITH USER {}", quote_ident_list(&self.lowered_users(), None));
        }

        sql
    }

    pub fn to_sql_drop(&self) -> String {
        format!("DROP GROUP {}", quote_ident(&self.lowered_name()))
    }

    pub fn to_sql_add_users(&self, users: &[String]) -> String {
        format!(
            "ALTER GROUP {} ADD USER {}",
            quote_ident(&self.lowered_name()),
            quote_ident_list(users, None)
        )
    }

    pub fn to_sql_drop_users(&self, users: &[String]) -> String {
        format!(
            "ALTER GROUP {} DROP USER {}",
            quote_ident(&self.lowered_name()),
            quote_ident_list(users, None)
        )
    }

    /// Statements clearing a schema's grants before the group can be
    /// dropped. Redshift refuses to drop a group that still holds
    /// privileges anywhere.
    pub fn to_sql_revoke_all_in_schema(&self, schema: &str) -> Vec<String> {
        vec![
            format!(
                "REVOKE ALL ON ALL TABLES IN SCHEMA {} FROM GROUP {}",
                quote_ident(schema),
                quote_ident(&self.lowered_name())
            ),
            format!(
                "ALTER DEFAULT PRIVILEGES IN SCHEMA {} REVOKE ALL ON TABLES FROM GROUP {}",
                quote_ident(schema),
                quote_ident(&self.lowered_name())
            ),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(anyhow!("group name is empty"));
        }
        if self.name.len() > 127 {
            return Err(anyhow!("group name {} is longer than 127 characters", self.name));
        }
        // Reserved for Amazon Redshift internal use
        if self.name.starts_with("__") {
            return Err(anyhow!(
                "group names beginning with two underscores are reserved: {}",
                self.name
            ));
        }

        Ok(())
    }

    pub fn lowered_name(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn lowered_users(&self) -> Vec<String> {
        self.users.iter().map(|u| u.to_lowercase()).collect()
    }
}
