use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::sql::{quote_ident, quote_ident_list};

// A group membership config item: manages the member list of an
// existing group that may have been created elsewhere. Conflicts with
// the `users` attribute of a `groups` entry for the same group.
//
// ```yaml
// - group: analysts
//   users:
//   - alice
//   - bob
// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GroupMembership {
    pub group: String,
    pub users: Vec<String>,
}

impl GroupMembership {
    pub fn to_sql_add_users(&self, users: &[String]) -> String {
        format!(
            "ALTER GROUP {} ADD USER {}",
            quote_ident(&self.lowered_group()),
            quote_ident_list(users, None)
        )
    }

    pub fn to_sql_drop_users(&self, users: &[String]) -> String {
        format!(
            "ALTER GROUP {} DROP USER {}",
            quote_ident(&self.lowered_group()),
            quote_ident_list(users, None)
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.group.is_empty() || self.group.len() > 127 {
            return Err(anyhow!(
                "membership group name must be between 1 and 127 characters"
            ));
        }
        if self.users.is_empty() {
            return Err(anyhow!(
                "at least one user must be specified in the membership for group {}",
                self.group
            ));
        }

        Ok(())
    }

    /// Natural-key id: group name followed by the member names.
    pub fn id(&self) -> String {
        let mut id = self.lowered_group();
        for user in &self.lowered_users() {
            id.push('_');
            id.push_str(user);
        }
        id
    }

    pub fn lowered_group(&self) -> String {
        self.group.to_lowercase()
    }

    pub fn lowered_users(&self) -> Vec<String> {
        self.users.iter().map(|u| u.to_lowercase()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership(group: &str, users: &[&str]) -> GroupMembership {
        GroupMembership {
            group: group.to_string(),
            users: users.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[test]
    fn test_id() {
        assert_eq!(
            membership("Analysts", &["Alice", "bob"]).id(),
            "analysts_alice_bob"
        );
    }

    #[test]
    fn test_validate_requires_users() {
        assert!(membership("analysts", &[]).validate().is_err());
        assert!(membership("analysts", &["alice"]).validate().is_ok());
        assert!(membership("", &["alice"]).validate().is_err());
    }

    #[test]
    fn test_to_sql() {
        let m = membership("analysts", &["alice"]);
        assert_eq!(
            m.to_sql_add_users(&["alice".to_string()]),
            "ALTER GROUP \"analysts\" ADD USER \"alice\""
        );
        assert_eq!(
            m.to_sql_drop_users(&["alice".to_string()]),
            "ALTER GROUP \"analysts\" DROP USER \"alice\""
        );
    }
}
