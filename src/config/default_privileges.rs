use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::sql::{quote_ident, validate_privileges};

/// Object types ALTER DEFAULT PRIVILEGES is supported for.
const ALLOWED_OBJECT_TYPES: [&str; 1] = ["table"];

/// The target of a default-privileges entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grantee<'a> {
    User(&'a str),
    Group(&'a str),
    Role(&'a str),
}

impl<'a> Grantee<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Grantee::User(name) | Grantee::Group(name) | Grantee::Role(name) => name,
        }
    }

    /// Keyword placed before the grantee name in GRANT/REVOKE. Users
    /// take no keyword.
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Grantee::User(_) => None,
            Grantee::Group(_) => Some("GROUP"),
            Grantee::Role(_) => Some("ROLE"),
        }
    }

    /// Grantee type name as stored in svv_default_privileges.
    pub fn kind(&self) -> &'static str {
        match self {
            Grantee::User(_) => "user",
            Grantee::Group(_) => "group",
            Grantee::Role(_) => "role",
        }
    }
}

// A default privileges config item: privileges automatically granted on
// objects the owner creates in the future.
//
// ```yaml
// - owner: etl_loader
//   schema: reports
//   group: analysts
//   object_type: table
//   privileges:
//   - select
// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DefaultPrivileges {
    pub owner: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default = "default_object_type")]
    pub object_type: String,
    pub privileges: Vec<String>,
}

fn default_object_type() -> String {
    "table".to_string()
}

impl DefaultPrivileges {
    pub fn grantee(&self) -> Result<Grantee> {
        match (&self.user, &self.group, &self.role) {
            (Some(user), None, None) => Ok(Grantee::User(user)),
            (None, Some(group), None) => Ok(Grantee::Group(group)),
            (None, None, Some(role)) => Ok(Grantee::Role(role)),
            _ => Err(anyhow!(
                "default privileges for owner {} must name exactly one of user, group or role",
                self.owner
            )),
        }
    }

    // ALTER DEFAULT PRIVILEGES FOR USER owner [IN SCHEMA schema]
    // GRANT privileges ON TABLES TO [GROUP|ROLE] grantee
    pub fn to_sql_grant(&self) -> Result<String> {
        let grantee = self.grantee()?;
        let privileges = self
            .privileges
            .iter()
            .map(|p| p.to_uppercase())
            .collect::<Vec<_>>()
            .join(",");

        Ok(format!(
            "{} GRANT {} ON {}S TO {}",
            self.alter_prefix(),
            privileges,
            self.object_type.to_uppercase(),
            self.grantee_clause(&grantee)
        ))
    }

    // ALTER DEFAULT PRIVILEGES FOR USER owner [IN SCHEMA schema]
    // REVOKE ALL PRIVILEGES ON TABLES FROM [GROUP|ROLE] grantee
    pub fn to_sql_revoke(&self) -> Result<String> {
        let grantee = self.grantee()?;

        Ok(format!(
            "{} REVOKE ALL PRIVILEGES ON {}S FROM {}",
            self.alter_prefix(),
            self.object_type.to_uppercase(),
            self.grantee_clause(&grantee)
        ))
    }

    fn alter_prefix(&self) -> String {
        let mut sql = format!(
            "ALTER DEFAULT PRIVILEGES FOR USER {}",
            quote_ident(&self.owner.to_lowercase())
        );
        if let Some(schema) = &self.schema {
            sql += &format!(" IN SCHEMA {}", quote_ident(schema));
        }
        sql
    }

    fn grantee_clause(&self, grantee: &Grantee) -> String {
        let name = grantee.name().to_lowercase();
        match grantee.keyword() {
            Some(keyword) => format!("{} {}", keyword, quote_ident(&name)),
            None => quote_ident(&name),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner.is_empty() {
            return Err(anyhow!("default privileges owner is empty"));
        }
        if !ALLOWED_OBJECT_TYPES.contains(&self.object_type.to_lowercase().as_str()) {
            return Err(anyhow!(
                "invalid object type {} for default privileges, expected one of: {:?}",
                self.object_type,
                ALLOWED_OBJECT_TYPES
            ));
        }
        self.grantee()?;
        validate_privileges(&self.privileges, &self.object_type)?;

        Ok(())
    }

    /// Natural-key id encoding grantee, schema, owner and object type.
    pub fn id(&self) -> Result<String> {
        let grantee = self.grantee()?;
        let entity = match grantee {
            Grantee::Group(name) => format!("gn:{}", name),
            Grantee::User(name) => format!("un:{}", name),
            Grantee::Role(name) => format!("rn:{}", name),
        };
        let schema = match &self.schema {
            Some(name) => format!("sn:{}", name),
            None => "noschema".to_string(),
        };

        Ok(format!(
            "{}_{}_on:{}_ot:{}",
            entity, schema, self.owner, self.object_type
        ))
    }

    /// The desired privilege set, lowercased and deduplicated, for
    /// comparison against catalog state.
    pub fn normalized_privileges(&self) -> BTreeSet<String> {
        self.privileges.iter().map(|p| p.to_lowercase()).collect()
    }
}
