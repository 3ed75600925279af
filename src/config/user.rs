use anyhow::{anyhow, Result};
use envmnt::{ExpandOptions, ExpansionType};
use serde::{Deserialize, Serialize};

use crate::sql::{quote_ident, quote_literal};

// A user config item, for example:
//
// ```yaml
// - name: etl_loader
//   password: ${ETL_PASSWORD}
//   createdb: false
//   connection_limit: 10
// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    // password is optional; omitted means PASSWORD DISABLE on create
    #[serde(default)]
    pub password: Option<String>,
    // only rewrite the password of an existing user when set
    #[serde(default)]
    pub update_password: Option<bool>,
    #[serde(default)]
    pub createdb: bool,
    #[serde(default)]
    pub connection_limit: Option<u32>,
}

impl User {
    // CREATE USER name PASSWORD { 'password' | DISABLE }
    // [ CREATEDB ] [ CONNECTION LIMIT { limit | UNLIMITED } ]
    pub fn to_sql_create(&self) -> String {
        let mut sql = format!("CREATE USER {}", quote_ident(&self.lowered_name()));

        match &self.password {
            Some(password) => sql += &format!(" PASSWORD {}", quote_literal(password)),
            None => sql += " PASSWORD DISABLE",
        }
        if self.createdb {
            sql += " CREATEDB";
        }
        if let Some(limit) = self.connection_limit {
            sql += &format!(" CONNECTION LIMIT {}", limit);
        }

        sql
    }

    pub fn to_sql_update_password(&self) -> Result<String> {
        let password = self
            .password
            .as_ref()
            .ok_or_else(|| anyhow!("user {} has update_password set but no password", self.name))?;

        Ok(format!(
            "ALTER USER {} PASSWORD {}",
            quote_ident(&self.lowered_name()),
            quote_literal(password)
        ))
    }

    pub fn to_sql_set_createdb(&self) -> String {
        let option = if self.createdb { "CREATEDB" } else { "NOCREATEDB" };
        format!("ALTER USER {} {}", quote_ident(&self.lowered_name()), option)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(anyhow!("user name is empty"));
        }
        if self.update_password.unwrap_or(false) && self.password.is_none() {
            return Err(anyhow!(
                "user {} has update_password set but no password",
                self.name
            ));
        }

        Ok(())
    }

    // Expand environment variables in the password field, so secrets
    // never have to live in the config file.
    // For example: `password: ${ETL_PASSWORD}` or `${VAR:default}`.
    pub fn expand_env_vars(&self) -> Self {
        let mut user = self.clone();

        let mut options = ExpandOptions::new();
        options.expansion_type = Some(ExpansionType::UnixBracketsWithDefaults);

        user.password = self.password.as_ref().map(|p| envmnt::expand(p, Some(options)));

        user
    }

    /// User names are folded to lowercase in the catalog.
    pub fn lowered_name(&self) -> String {
        self.name.to_lowercase()
    }
}
