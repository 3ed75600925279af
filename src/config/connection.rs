use anyhow::{anyhow, Result};
use envmnt::{ExpandOptions, ExpansionType};
use serde::{Deserialize, Serialize};
use url::Url;

/// Connection type. Supported values: postgres (wire protocol), data_api
/// (AWS Redshift Data API over HTTPS).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub enum ConnectionType {
    #[default]
    #[serde(rename = "postgres")]
    Postgres,
    #[serde(rename = "data_api")]
    DataApi,
}

/// IAM authentication block: credentials are resolved at connect time
/// with GetClusterCredentials, optionally after assuming a role.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TemporaryCredentials {
    pub cluster_identifier: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub auto_create_user: Option<bool>,
    #[serde(default)]
    pub db_groups: Vec<String>,
    #[serde(default)]
    pub duration_seconds: Option<i32>,
    #[serde(default)]
    pub assume_role: Option<AssumeRole>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AssumeRole {
    pub arn: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub session_name: Option<String>,
}

/// Redshift Data API endpoint (serverless workgroup).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DataApi {
    pub workgroup_name: String,
    pub region: String,
}

// Connection configuration section. The connecting user needs permission
// to manage the configured objects. For example:
//
// ```yaml
// connection:
//   type: postgres
//   host: example.abc123.us-east-1.redshift.amazonaws.com
//   port: 5439
//   database: analytics
//   username: admin
//   password: ${REDSHIFT_PASSWORD}
// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Connection {
    #[serde(rename = "type", default)]
    pub type_: ConnectionType,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_sslmode")]
    pub sslmode: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub temporary_credentials: Option<TemporaryCredentials>,
    #[serde(default)]
    pub data_api: Option<DataApi>,
}

fn default_port() -> u16 {
    5439
}

fn default_database() -> String {
    "dev".to_string()
}

fn default_sslmode() -> String {
    "require".to_string()
}

fn default_max_connections() -> u32 {
    20
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            type_: ConnectionType::Postgres,
            host: None,
            port: default_port(),
            database: default_database(),
            username: None,
            password: None,
            sslmode: default_sslmode(),
            max_connections: default_max_connections(),
            temporary_credentials: None,
            data_api: None,
        }
    }
}

const VALID_SSLMODES: [&str; 5] = ["disable", "prefer", "require", "verify-ca", "verify-full"];

impl Connection {
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(anyhow!("connection.max_connections must be at least 1"));
        }

        match self.type_ {
            ConnectionType::Postgres => {
                if self.host.as_deref().unwrap_or("").is_empty() {
                    return Err(anyhow!("connection.host must be specified and non-empty"));
                }
                if self.username.as_deref().unwrap_or("").is_empty() {
                    return Err(anyhow!(
                        "connection.username must be specified and non-empty"
                    ));
                }
                if self.temporary_credentials.is_none()
                    && self.password.as_deref().unwrap_or("").is_empty()
                {
                    return Err(anyhow!(
                        "connection.password must be specified and non-empty when using password authentication"
                    ));
                }
                if !VALID_SSLMODES.contains(&self.sslmode.as_str()) {
                    return Err(anyhow!(
                        "invalid sslmode: {}, expected one of: {:?}",
                        self.sslmode,
                        VALID_SSLMODES
                    ));
                }
            }
            ConnectionType::DataApi => {
                let data_api = self.data_api.as_ref().ok_or_else(|| {
                    anyhow!("connection.data_api block is required for the data_api connection type")
                })?;
                if data_api.workgroup_name.is_empty() {
                    return Err(anyhow!(
                        "connection.data_api.workgroup_name must be non-empty"
                    ));
                }
                if data_api.region.is_empty() {
                    return Err(anyhow!("connection.data_api.region must be non-empty"));
                }
            }
        }

        Ok(())
    }

    /// Build the libpq-style connection URL for the given resolved
    /// credentials. Username and password are percent-encoded by the
    /// URL builder.
    pub fn postgres_url(&self, username: &str, password: &str) -> Result<String> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| anyhow!("connection.host is not set"))?;

        let mut url = Url::parse(&format!(
            "postgres://{}:{}/{}",
            host, self.port, self.database
        ))?;
        url.set_username(username)
            .map_err(|_| anyhow!("could not set username on connection url"))?;
        url.set_password(Some(password))
            .map_err(|_| anyhow!("could not set password on connection url"))?;
        url.query_pairs_mut()
            .append_pair("connect_timeout", "180")
            .append_pair("sslmode", &self.sslmode);

        Ok(url.to_string())
    }

    /// A loggable description of the target, with credentials redacted.
    pub fn describe(&self) -> String {
        match self.type_ {
            ConnectionType::Postgres => format!(
                "postgres://{}@{}:{}/{}",
                self.username.as_deref().unwrap_or(""),
                self.host.as_deref().unwrap_or(""),
                self.port,
                self.database
            ),
            ConnectionType::DataApi => {
                let (workgroup, region) = self
                    .data_api
                    .as_ref()
                    .map(|d| (d.workgroup_name.as_str(), d.region.as_str()))
                    .unwrap_or(("", ""));
                format!(
                    "data-api://{}/{}?region={}",
                    workgroup, self.database, region
                )
            }
        }
    }

    // Expand environment variables in the credential fields.
    // For example: `password: ${REDSHIFT_PASSWORD}` or `${VAR:default}`.
    pub fn expand_env_vars(&self) -> Result<Self> {
        let mut connection = self.clone();

        let mut options = ExpandOptions::new();
        options.expansion_type = Some(ExpansionType::UnixBracketsWithDefaults);

        let expand = |value: &Option<String>| value.as_ref().map(|v| envmnt::expand(v, Some(options)));

        connection.host = expand(&self.host);
        connection.username = expand(&self.username);
        connection.password = expand(&self.password);
        connection.database = envmnt::expand(&self.database, Some(options));

        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_connection() -> Connection {
        Connection {
            host: Some("localhost".to_string()),
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            ..Connection::default()
        }
    }

    #[test]
    fn test_defaults() {
        let conn: Connection = serde_yaml::from_str("host: localhost").unwrap();
        assert_eq!(conn.type_, ConnectionType::Postgres);
        assert_eq!(conn.port, 5439);
        assert_eq!(conn.database, "dev");
        assert_eq!(conn.sslmode, "require");
        assert_eq!(conn.max_connections, 20);
    }

    #[test]
    fn test_postgres_url_encodes_credentials() {
        let conn = base_connection();
        let url = conn.postgres_url("user@corp", "p@ss w/rd").unwrap();

        assert!(url.starts_with("postgres://user%40corp:"));
        assert!(url.contains("@localhost:5439/dev"));
        assert!(url.contains("connect_timeout=180"));
        assert!(url.contains("sslmode=require"));
        assert!(!url.contains("p@ss w/rd"));
    }

    #[test]
    fn test_validate_requires_host_and_username() {
        let mut conn = base_connection();
        conn.host = None;
        assert!(conn.validate().is_err());

        let mut conn = base_connection();
        conn.username = None;
        assert!(conn.validate().is_err());
    }

    #[test]
    fn test_validate_password_not_required_with_temporary_credentials() {
        let mut conn = base_connection();
        conn.password = None;
        assert!(conn.validate().is_err());

        conn.temporary_credentials = Some(TemporaryCredentials {
            cluster_identifier: "main".to_string(),
            region: None,
            auto_create_user: None,
            db_groups: vec![],
            duration_seconds: None,
            assume_role: None,
        });
        assert!(conn.validate().is_ok());
    }

    #[test]
    fn test_validate_sslmode() {
        let mut conn = base_connection();
        conn.sslmode = "negotiate".to_string();
        assert!(conn.validate().is_err());
    }

    #[test]
    fn test_validate_data_api() {
        let conn: Connection = serde_yaml::from_str("type: data_api").unwrap();
        assert!(conn.validate().is_err());

        let conn: Connection = serde_yaml::from_str(
            "type: data_api\ndata_api:\n  workgroup_name: etl\n  region: us-east-1",
        )
        .unwrap();
        assert!(conn.validate().is_ok());
        assert_eq!(conn.describe(), "data-api://etl/dev?region=us-east-1");
    }

    #[test]
    fn test_expand_env_vars() {
        envmnt::set("REDSHIFTCTL_TEST_PASSWORD", "hunter2");

        let conn = Connection {
            password: Some("${REDSHIFTCTL_TEST_PASSWORD}".to_string()),
            ..base_connection()
        };
        let expanded = conn.expand_env_vars().unwrap();
        assert_eq!(expanded.password.as_deref(), Some("hunter2"));

        envmnt::remove("REDSHIFTCTL_TEST_PASSWORD");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        let conn = Connection {
            host: Some("${REDSHIFTCTL_TEST_NO_SUCH_HOST:fallback.example.com}".to_string()),
            ..base_connection()
        };
        let expanded = conn.expand_env_vars().unwrap();
        assert_eq!(expanded.host.as_deref(), Some("fallback.example.com"));
    }
}
