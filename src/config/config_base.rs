use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::{fmt, fs};

pub use super::connection::{Connection, ConnectionType};
pub use super::default_privileges::DefaultPrivileges;
pub use super::group::Group;
pub use super::membership::GroupMembership;
pub use super::role::Role;
pub use super::role_grant::RoleGrant;
pub use super::user::User;

/// Configuration contains the connection to the cluster and the desired
/// database objects: users, groups, group memberships, roles, role
/// grants and default privileges.
///
/// For example:
///
/// ```yaml
/// connection:
///   host: example.abc123.us-east-1.redshift.amazonaws.com
///   database: analytics
///   username: admin
///   password: ${REDSHIFT_PASSWORD}
///
/// users:
///   - name: etl_loader
///     password: ${ETL_PASSWORD}
///
/// groups:
///   - name: analysts
///     users:
///       - alice
///
/// default_privileges:
///   - owner: etl_loader
///     group: analysts
///     object_type: table
///     privileges: [select]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Config {
    pub connection: Connection,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub memberships: Vec<GroupMembership>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub role_grants: Vec<RoleGrant>,
    #[serde(default)]
    pub default_privileges: Vec<DefaultPrivileges>,
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_yaml::to_string(&self) {
            Ok(yaml) => write!(f, "{}", yaml),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl std::str::FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(s)?;

        config.validate()?;

        Ok(config)
    }
}

impl Config {
    pub fn new(config_path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(config_path).context("failed to read config file")?;
        let config: Config = serde_yaml::from_str(&config_str)?;

        config.validate()?;

        // expand env variables
        let config = config.expand_env_vars()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;

        for user in &self.users {
            user.validate()?;
        }
        unique_names("user", self.users.iter().map(|u| u.lowered_name()))?;

        for group in &self.groups {
            group.validate()?;
        }
        unique_names("group", self.groups.iter().map(|g| g.lowered_name()))?;

        for membership in &self.memberships {
            membership.validate()?;
        }
        unique_names("membership", self.memberships.iter().map(|m| m.id()))?;

        // A membership entry for a group whose member list is already
        // managed by a groups entry would fight over the same state.
        for membership in &self.memberships {
            if self
                .groups
                .iter()
                .any(|g| g.lowered_name() == membership.lowered_group() && !g.users.is_empty())
            {
                return Err(anyhow!(
                    "membership for group {} conflicts with the users list of the groups entry",
                    membership.group
                ));
            }
        }

        for role in &self.roles {
            role.validate()?;
        }
        unique_names("role", self.roles.iter().map(|r| r.lowered_name()))?;

        for grant in &self.role_grants {
            grant.validate()?;
        }
        unique_names("role grant", self.role_grants.iter().map(|g| g.lowered_role()))?;

        for entry in &self.default_privileges {
            entry.validate()?;
        }
        let ids = self
            .default_privileges
            .iter()
            .map(|e| e.id())
            .collect::<Result<Vec<_>>>()?;
        unique_names("default privileges entry", ids.into_iter())?;

        Ok(())
    }

    // Expand env variables in the connection section and in user
    // passwords
    fn expand_env_vars(&self) -> Result<Self> {
        let mut config = self.clone();

        config.connection = config.connection.expand_env_vars()?;
        config.users = config.users.iter().map(|u| u.expand_env_vars()).collect();

        Ok(config)
    }
}

fn unique_names(kind: &str, names: impl Iterator<Item = String>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.clone()) {
            return Err(anyhow!("duplicated {}: {}", kind, name));
        }
    }

    Ok(())
}
