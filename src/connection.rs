//! Database connection layer. Wraps either a native wire-protocol
//! client or the Data API executor behind one synchronous interface,
//! and exposes the catalog readers the reconcilers diff against.

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use native_tls::TlsConnector;
use postgres::{Client, NoTls};
use postgres_native_tls::MakeTlsConnector;
use std::collections::BTreeSet;

use crate::config::{Config, ConnectionType, DefaultPrivileges};
use crate::credentials;
use crate::data_api::DataApiExecutor;
use crate::sql::quote_literal;

/// A single result value. Catalog queries only ever produce booleans,
/// integers and text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

pub type SqlRow = Vec<SqlValue>;

impl SqlValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean accessor that also accepts 0/1, since aggregate CASE
    /// queries produce integers.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Int(n) => Some(*n != 0),
            SqlValue::Text(s) => match s.as_str() {
                "t" | "true" => Some(true),
                "f" | "false" => Some(false),
                _ => None,
            },
            SqlValue::Null => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SqlValue::Int(n) => Some(*n),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbUser {
    pub name: String,
    pub createdb: bool,
    pub superuser: bool,
}

#[derive(Debug, Clone)]
pub struct DbGroup {
    pub name: String,
    pub users: Vec<String>,
}

/// A row of svv_default_privileges, for inspection output.
#[derive(Debug, Clone)]
pub struct DbDefaultPrivilege {
    pub schema: Option<String>,
    pub owner: String,
    pub grantee: String,
    pub grantee_type: String,
    pub privilege: String,
}

enum Executor {
    Postgres(Client),
    DataApi(DataApiExecutor),
}

pub struct DbConnection {
    info: String,
    executor: Executor,
}

impl DbConnection {
    /// Connect using the config's connection block: native protocol
    /// with static or temporary credentials, or the Data API.
    pub fn new(config: &Config) -> Result<Self> {
        let conn = &config.connection;

        let executor = match conn.type_ {
            ConnectionType::Postgres => {
                let (username, password) = match &conn.temporary_credentials {
                    Some(tc) => {
                        debug!("using temporary credentials authentication");
                        credentials::resolve_temporary_credentials(conn, tc)?
                    }
                    None => {
                        debug!("using password authentication");
                        (
                            conn.username
                                .clone()
                                .ok_or_else(|| anyhow!("connection.username is not set"))?,
                            conn.password
                                .clone()
                                .ok_or_else(|| anyhow!("connection.password is not set"))?,
                        )
                    }
                };

                let url = conn.postgres_url(&username, &password)?;
                let client = if conn.sslmode == "disable" {
                    Client::connect(&url, NoTls)
                } else {
                    let connector =
                        TlsConnector::new().context("could not build tls connector")?;
                    Client::connect(&url, MakeTlsConnector::new(connector))
                }
                .with_context(|| format!("could not connect to {}", conn.describe()))?;

                Executor::Postgres(client)
            }
            ConnectionType::DataApi => {
                let data_api = conn
                    .data_api
                    .as_ref()
                    .ok_or_else(|| anyhow!("connection.data_api is not set"))?;

                Executor::DataApi(DataApiExecutor::new(
                    &data_api.workgroup_name,
                    &conn.database,
                    &data_api.region,
                )?)
            }
        };

        let mut db = Self {
            info: conn.describe(),
            executor,
        };
        db.ping()?;

        info!("Connected to database: {}", db.info);

        Ok(db)
    }

    pub fn info(&self) -> &str {
        &self.info
    }

    pub fn ping(&mut self) -> Result<()> {
        self.query("SELECT 1")?;
        Ok(())
    }

    pub fn execute(&mut self, sql: &str) -> Result<u64> {
        debug!("execute: {}", sql);
        match &mut self.executor {
            Executor::Postgres(client) => client
                .execute(sql, &[])
                .with_context(|| format!("could not execute: {}", sql)),
            Executor::DataApi(executor) => executor.execute(sql),
        }
    }

    pub fn query(&mut self, sql: &str) -> Result<Vec<SqlRow>> {
        debug!("query: {}", sql);
        match &mut self.executor {
            Executor::Postgres(client) => {
                let rows = client
                    .query(sql, &[])
                    .with_context(|| format!("could not query: {}", sql))?;
                rows.iter().map(convert_row).collect()
            }
            Executor::DataApi(executor) => executor.query(sql),
        }
    }

    /// Execute a batch of statements atomically where the backend
    /// allows it. The Data API path is non-transactional.
    pub fn execute_in_transaction(&mut self, statements: &[String]) -> Result<()> {
        match &mut self.executor {
            Executor::Postgres(client) => {
                let mut tx = client.transaction().context("could not start transaction")?;
                for sql in statements {
                    debug!("execute (tx): {}", sql);
                    tx.execute(sql.as_str(), &[])
                        .with_context(|| format!("could not execute: {}", sql))?;
                }
                tx.commit().context("could not commit transaction")?;
            }
            Executor::DataApi(executor) => {
                for sql in statements {
                    debug!("execute: {}", sql);
                    executor.execute(sql)?;
                }
            }
        }

        Ok(())
    }

    pub fn current_database(&mut self) -> Result<String> {
        let rows = self.query("SELECT current_database()")?;
        rows.first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_text)
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("could not determine current database"))
    }

    /// All users, with the flags the reconciler compares against.
    pub fn get_users(&mut self) -> Result<Vec<DbUser>> {
        let rows =
            self.query("SELECT usename, usecreatedb, usesuper FROM pg_user ORDER BY usename")?;

        rows.iter()
            .map(|row| {
                Ok(DbUser {
                    name: text_at(row, 0, "pg_user.usename")?,
                    createdb: row.get(1).and_then(SqlValue::as_bool).unwrap_or(false),
                    superuser: row.get(2).and_then(SqlValue::as_bool).unwrap_or(false),
                })
            })
            .collect()
    }

    pub fn user_exists(&mut self, name: &str) -> Result<bool> {
        let rows = self.query(&format!(
            "SELECT 1 FROM pg_user_info WHERE usename = {}",
            quote_literal(&name.to_lowercase())
        ))?;
        Ok(!rows.is_empty())
    }

    pub fn get_user_id(&mut self, name: &str) -> Result<i64> {
        let rows = self.query(&format!(
            "SELECT usesysid FROM pg_user WHERE usename = {}",
            quote_literal(&name.to_lowercase())
        ))?;
        rows.first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_int)
            .ok_or_else(|| anyhow!("user {} not found", name))
    }

    /// All groups with their member lists. Groups without members are
    /// included.
    pub fn get_groups(&mut self) -> Result<Vec<DbGroup>> {
        let rows = self.query("SELECT groname FROM pg_group ORDER BY groname")?;
        let mut groups = rows
            .iter()
            .map(|row| {
                Ok(DbGroup {
                    name: text_at(row, 0, "pg_group.groname")?,
                    users: vec![],
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let member_rows = self.query(
            "SELECT g.groname, u.usename FROM pg_group g, pg_user_info u \
             WHERE u.usesysid = ANY(g.grolist) ORDER BY g.groname, u.usename",
        )?;
        for row in &member_rows {
            let group_name = text_at(row, 0, "pg_group.groname")?;
            let user_name = text_at(row, 1, "pg_user_info.usename")?;
            if let Some(group) = groups.iter_mut().find(|g| g.name == group_name) {
                group.users.push(user_name);
            }
        }

        Ok(groups)
    }

    pub fn group_exists(&mut self, name: &str) -> Result<bool> {
        let rows = self.query(&format!(
            "SELECT 1 FROM pg_group WHERE groname = {}",
            quote_literal(&name.to_lowercase())
        ))?;
        Ok(!rows.is_empty())
    }

    pub fn get_group_members(&mut self, group: &str) -> Result<Vec<String>> {
        let rows = self.query(&format!(
            "SELECT pgu.usename FROM pg_group pgg \
             JOIN pg_user pgu ON pgu.usesysid = ANY(pgg.grolist) \
             WHERE pgg.groname = {} ORDER BY pgu.usename",
            quote_literal(&group.to_lowercase())
        ))?;

        rows.iter()
            .map(|row| text_at(row, 0, "pg_user.usename"))
            .collect()
    }

    /// Schemas that may hold grants blocking a group drop.
    pub fn get_nonsystem_schemas(&mut self) -> Result<Vec<String>> {
        let rows = self.query(
            "SELECT nspname FROM pg_namespace WHERE nspowner != 1 OR nspname = 'public'",
        )?;
        rows.iter()
            .map(|row| text_at(row, 0, "pg_namespace.nspname"))
            .collect()
    }

    pub fn get_roles(&mut self) -> Result<Vec<String>> {
        let rows = self.query("SELECT role_name FROM svv_roles ORDER BY role_name")?;
        rows.iter()
            .map(|row| text_at(row, 0, "svv_roles.role_name"))
            .collect()
    }

    /// (role, user) pairs from svv_user_grants.
    pub fn get_user_role_grants(&mut self) -> Result<Vec<(String, String)>> {
        let rows =
            self.query("SELECT role_name, user_name FROM svv_user_grants ORDER BY role_name")?;
        rows.iter()
            .map(|row| {
                Ok((
                    text_at(row, 0, "svv_user_grants.role_name")?,
                    text_at(row, 1, "svv_user_grants.user_name")?,
                ))
            })
            .collect()
    }

    /// (granted role, grantee role) pairs from svv_role_grants.
    pub fn get_role_role_grants(&mut self) -> Result<Vec<(String, String)>> {
        let rows = self.query(
            "SELECT granted_role_name, role_name FROM svv_role_grants ORDER BY granted_role_name",
        )?;
        rows.iter()
            .map(|row| {
                Ok((
                    text_at(row, 0, "svv_role_grants.granted_role_name")?,
                    text_at(row, 1, "svv_role_grants.role_name")?,
                ))
            })
            .collect()
    }

    /// The privilege set currently recorded for a default-privileges
    /// entry, read back from svv_default_privileges.
    pub fn get_default_privileges(
        &mut self,
        entry: &DefaultPrivileges,
    ) -> Result<BTreeSet<String>> {
        let grantee = entry.grantee()?;
        let owner_id = self.get_user_id(&entry.owner)?;

        let schema_filter = match &entry.schema {
            Some(schema) => format!("schema_name = {}", quote_literal(schema)),
            None => "schema_name IS NULL".to_string(),
        };

        let sql = format!(
            "SELECT \
               COALESCE(MAX(CASE WHEN privilege_type = 'SELECT' THEN 1 ELSE 0 END), 0), \
               COALESCE(MAX(CASE WHEN privilege_type = 'UPDATE' THEN 1 ELSE 0 END), 0), \
               COALESCE(MAX(CASE WHEN privilege_type = 'INSERT' THEN 1 ELSE 0 END), 0), \
               COALESCE(MAX(CASE WHEN privilege_type = 'DELETE' THEN 1 ELSE 0 END), 0), \
               COALESCE(MAX(CASE WHEN privilege_type = 'DROP' THEN 1 ELSE 0 END), 0), \
               COALESCE(MAX(CASE WHEN privilege_type = 'REFERENCES' THEN 1 ELSE 0 END), 0), \
               COALESCE(MAX(CASE WHEN privilege_type = 'RULE' THEN 1 ELSE 0 END), 0), \
               COALESCE(MAX(CASE WHEN privilege_type = 'TRIGGER' THEN 1 ELSE 0 END), 0) \
             FROM svv_default_privileges \
             WHERE object_type = 'RELATION' \
               AND grantee_name = {} AND grantee_type = {} \
               AND owner_id = {} AND {}",
            quote_literal(&grantee.name().to_lowercase()),
            quote_literal(grantee.kind()),
            owner_id,
            schema_filter,
        );

        let rows = self.query(&sql)?;
        let row = match rows.first() {
            Some(row) => row,
            None => return Ok(BTreeSet::new()),
        };

        let names = [
            "select",
            "update",
            "insert",
            "delete",
            "drop",
            "references",
            "rule",
            "trigger",
        ];
        let mut privileges = BTreeSet::new();
        for (idx, name) in names.iter().enumerate() {
            if row.get(idx).and_then(SqlValue::as_bool).unwrap_or(false) {
                privileges.insert(name.to_string());
            }
        }

        Ok(privileges)
    }

    /// All table default privileges, for inspection output.
    pub fn list_default_privileges(&mut self) -> Result<Vec<DbDefaultPrivilege>> {
        let rows = self.query(
            "SELECT schema_name, owner_name, grantee_name, grantee_type, privilege_type \
             FROM svv_default_privileges WHERE object_type = 'RELATION' \
             ORDER BY owner_name, grantee_name, privilege_type",
        )?;

        rows.iter()
            .map(|row| {
                Ok(DbDefaultPrivilege {
                    schema: row.get(0).and_then(SqlValue::as_text).map(|s| s.to_string()),
                    owner: text_at(row, 1, "svv_default_privileges.owner_name")?,
                    grantee: text_at(row, 2, "svv_default_privileges.grantee_name")?,
                    grantee_type: text_at(row, 3, "svv_default_privileges.grantee_type")?,
                    privilege: text_at(row, 4, "svv_default_privileges.privilege_type")?,
                })
            })
            .collect()
    }
}

fn text_at(row: &SqlRow, idx: usize, what: &str) -> Result<String> {
    row.get(idx)
        .and_then(SqlValue::as_text)
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("unexpected null {}", what))
}

fn convert_row(row: &postgres::Row) -> Result<SqlRow> {
    use postgres::types::Type;

    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Bool)
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)?
                .map(|v| SqlValue::Int(v.into()))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)?
                .map(|v| SqlValue::Int(v.into()))
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::Int)
        } else if *ty == Type::OID {
            row.try_get::<_, Option<u32>>(idx)?
                .map(|v| SqlValue::Int(v.into()))
        } else {
            row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text)
        };
        values.push(value.unwrap_or(SqlValue::Null));
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_bool_accepts_aggregate_ints() {
        assert_eq!(SqlValue::Int(1).as_bool(), Some(true));
        assert_eq!(SqlValue::Int(0).as_bool(), Some(false));
        assert_eq!(SqlValue::Bool(true).as_bool(), Some(true));
        assert_eq!(SqlValue::Text("t".to_string()).as_bool(), Some(true));
        assert_eq!(SqlValue::Text("false".to_string()).as_bool(), Some(false));
        assert_eq!(SqlValue::Null.as_bool(), None);
    }

    #[test]
    fn test_as_int_parses_text() {
        assert_eq!(SqlValue::Int(7).as_int(), Some(7));
        assert_eq!(SqlValue::Text("101".to_string()).as_int(), Some(101));
        assert_eq!(SqlValue::Text("x".to_string()).as_int(), None);
        assert_eq!(SqlValue::Null.as_int(), None);
    }

    #[test]
    fn test_as_text() {
        assert_eq!(SqlValue::Text("etl".to_string()).as_text(), Some("etl"));
        assert_eq!(SqlValue::Int(1).as_text(), None);
    }
}
