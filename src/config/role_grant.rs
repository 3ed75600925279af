use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::sql::quote_ident;

// A role grant config item: which users and roles hold a role.
//
// ```yaml
// - role: readonly
//   users:
//   - alice
//   roles:
//   - reporting
// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub role: String,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl RoleGrant {
    // GRANT ROLE role_name TO { user_name | ROLE role_name }
    pub fn to_sql_grant_user(&self, user: &str) -> String {
        format!(
            "GRANT ROLE {} TO {}",
            quote_ident(&self.lowered_role()),
            quote_ident(user)
        )
    }

    pub fn to_sql_grant_role(&self, role: &str) -> String {
        format!(
            "GRANT ROLE {} TO ROLE {}",
            quote_ident(&self.lowered_role()),
            quote_ident(role)
        )
    }

    pub fn to_sql_revoke_user(&self, user: &str) -> String {
        format!(
            "REVOKE ROLE {} FROM {}",
            quote_ident(&self.lowered_role()),
            quote_ident(user)
        )
    }

    pub fn to_sql_revoke_role(&self, role: &str) -> String {
        format!(
            "REVOKE ROLE {} FROM ROLE {}",
            quote_ident(&self.lowered_role()),
            quote_ident(role)
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.role.is_empty() {
            return Err(anyhow!("role grant has an empty role name"));
        }
        if self.users.is_empty() && self.roles.is_empty() {
            return Err(anyhow!(
                "role grant for {} must name at least one user or role",
                self.role
            ));
        }

        Ok(())
    }

    pub fn lowered_role(&self) -> String {
        self.role.to_lowercase()
    }

    pub fn lowered_users(&self) -> Vec<String> {
        self.users.iter().map(|u| u.to_lowercase()).collect()
    }

    pub fn lowered_roles(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.to_lowercase()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(role: &str, users: &[&str], roles: &[&str]) -> RoleGrant {
        RoleGrant {
            role: role.to_string(),
            users: users.iter().map(|u| u.to_string()).collect(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_to_sql() {
        let g = grant("readonly", &["alice"], &["reporting"]);
        assert_eq!(
            g.to_sql_grant_user("alice"),
            "GRANT ROLE \"readonly\" TO \"alice\""
        );
        assert_eq!(
            g.to_sql_grant_role("reporting"),
            "GRANT ROLE \"readonly\" TO ROLE \"reporting\""
        );
        assert_eq!(
            g.to_sql_revoke_user("alice"),
            "REVOKE ROLE \"readonly\" FROM \"alice\""
        );
        assert_eq!(
            g.to_sql_revoke_role("reporting"),
            "REVOKE ROLE \"readonly\" FROM ROLE \"reporting\""
        );
    }

    #[test]
    fn test_validate_requires_grantee() {
        assert!(grant("readonly", &[], &[]).validate().is_err());
        assert!(grant("readonly", &["alice"], &[]).validate().is_ok());
        assert!(grant("readonly", &[], &["reporting"]).validate().is_ok());
        assert!(grant("", &["alice"], &[]).validate().is_err());
    }
}
