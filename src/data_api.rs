//! Redshift Data API executor: runs SQL over HTTPS instead of a direct
//! database connection. Statements are submitted with ExecuteStatement,
//! polled via DescribeStatement and fetched with GetStatementResult.

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_redshiftdata::types::{Field, StatusString};
use log::debug;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::connection::{SqlRow, SqlValue};

/// Matches the driver-level connect timeout used on the wire-protocol
/// path.
const STATEMENT_TIMEOUT: Duration = Duration::from_secs(180);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A failed or aborted Data API statement. The service reports errors as
/// plain text; the SQLSTATE, when present, is embedded in the message.
#[derive(Debug, Error)]
#[error("data api statement failed: {message}")]
pub struct DataApiError {
    message: String,
}

impl DataApiError {
    pub fn failed(message: String) -> Self {
        Self { message }
    }

    /// The SQLSTATE embedded in the error message, if any.
    pub fn sqlstate(&self) -> Option<&str> {
        let idx = self.message.find("SQLSTATE")?;
        let rest = self.message[idx + "SQLSTATE".len()..]
            .trim_start_matches(|c: char| c == ':' || c == ' ');
        let code = rest.get(..5)?;
        if code.chars().all(|c| c.is_ascii_alphanumeric()) {
            Some(code)
        } else {
            None
        }
    }
}

/// Blocking wrapper around the async Data API client. The rest of the
/// program is synchronous, so each call drives the runtime to completion.
pub struct DataApiExecutor {
    runtime: tokio::runtime::Runtime,
    client: aws_sdk_redshiftdata::Client,
    workgroup_name: String,
    database: String,
}

impl DataApiExecutor {
    pub fn new(workgroup_name: &str, database: &str, region: &str) -> Result<Self> {
        let runtime =
            tokio::runtime::Runtime::new().context("could not start async runtime")?;
        let config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .load(),
        );

        Ok(Self {
            runtime,
            client: aws_sdk_redshiftdata::Client::new(&config),
            workgroup_name: workgroup_name.to_string(),
            database: database.to_string(),
        })
    }

    /// Execute a statement and return the number of affected rows.
    pub fn execute(&self, sql: &str) -> Result<u64> {
        let id = self.submit(sql)?;
        let affected = self.wait(&id)?;
        Ok(affected.max(0) as u64)
    }

    /// Execute a query and fetch all result rows.
    pub fn query(&self, sql: &str) -> Result<Vec<SqlRow>> {
        let id = self.submit(sql)?;
        self.wait(&id)?;

        self.runtime.block_on(async {
            let mut rows = Vec::new();
            let mut next_token: Option<String> = None;

            loop {
                let result = self
                    .client
                    .get_statement_result()
                    .id(&id)
                    .set_next_token(next_token.clone())
                    .send()
                    .await
                    .context("could not fetch data api statement result")?;

                for record in result.records() {
                    rows.push(record.iter().map(field_to_value).collect::<SqlRow>());
                }

                next_token = result.next_token().map(|t| t.to_string());
                if next_token.is_none() {
                    break;
                }
            }

            Ok(rows)
        })
    }

    fn submit(&self, sql: &str) -> Result<String> {
        debug!("data api submit: {}", sql);

        self.runtime.block_on(async {
            let out = self
                .client
                .execute_statement()
                .workgroup_name(&self.workgroup_name)
                .database(&self.database)
                .sql(sql)
                .send()
                .await
                .context("could not submit statement to data api")?;

            out.id()
                .map(|id| id.to_string())
                .context("data api did not return a statement id")
        })
    }

    /// Poll until the statement reaches a terminal status. Returns the
    /// affected row count on success.
    fn wait(&self, id: &str) -> Result<i64> {
        let deadline = Instant::now() + STATEMENT_TIMEOUT;

        loop {
            let desc = self.runtime.block_on(async {
                self.client
                    .describe_statement()
                    .id(id)
                    .send()
                    .await
                    .context("could not describe data api statement")
            })?;

            match desc.status() {
                Some(StatusString::Finished) => return Ok(desc.result_rows()),
                Some(StatusString::Failed) => {
                    return Err(DataApiError::failed(
                        desc.error().unwrap_or("unknown error").to_string(),
                    )
                    .into())
                }
                Some(StatusString::Aborted) => {
                    return Err(DataApiError::failed("statement aborted".to_string()).into())
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(DataApiError::failed(format!(
                    "statement {} did not finish within {:?}",
                    id, STATEMENT_TIMEOUT
                ))
                .into());
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

fn field_to_value(field: &Field) -> SqlValue {
    match field {
        Field::IsNull(_) => SqlValue::Null,
        Field::BooleanValue(b) => SqlValue::Bool(*b),
        Field::LongValue(n) => SqlValue::Int(*n),
        Field::DoubleValue(f) => SqlValue::Text(f.to_string()),
        Field::StringValue(s) => SqlValue::Text(s.clone()),
        _ => SqlValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlstate_parsing() {
        let err = DataApiError::failed(
            "ERROR: deadlock detected; SQLSTATE 40P01".to_string(),
        );
        assert_eq!(err.sqlstate(), Some("40P01"));

        let err = DataApiError::failed("ERROR: relation does not exist".to_string());
        assert_eq!(err.sqlstate(), None);

        let err = DataApiError::failed("failure; SQLSTATE: XX000".to_string());
        assert_eq!(err.sqlstate(), Some("XX000"));
    }

    #[test]
    fn test_sqlstate_truncated_code() {
        let err = DataApiError::failed("SQLSTATE 40".to_string());
        assert_eq!(err.sqlstate(), None);
    }

    #[test]
    fn test_field_to_value() {
        assert!(matches!(
            field_to_value(&Field::StringValue("etl".to_string())),
            SqlValue::Text(s) if s == "etl"
        ));
        assert!(matches!(
            field_to_value(&Field::BooleanValue(true)),
            SqlValue::Bool(true)
        ));
        assert!(matches!(field_to_value(&Field::LongValue(7)), SqlValue::Int(7)));
        assert!(matches!(field_to_value(&Field::IsNull(true)), SqlValue::Null));
    }
}
