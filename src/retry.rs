//! Bounded retry loop for resource operations hitting known transient
//! Redshift errors (serialization conflicts, deadlocks, schemas created
//! concurrently, aborted transactions).

use anyhow::Result;
use log::warn;
use std::thread;
use std::time::Duration;

use crate::data_api::DataApiError;
use crate::sql::is_retryable_sqlstate;

const MAX_ATTEMPTS: u64 = 10;

/// Run the operation, re-executing it up to [MAX_ATTEMPTS] times with
/// linear backoff (attempt n sleeps n seconds) while it keeps failing
/// with a retryable SQLSTATE. Any other error propagates immediately.
pub fn with_retries<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    for attempt in 1..MAX_ATTEMPTS {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => match retryable_sqlstate(&err) {
                Some(code) => {
                    warn!(
                        "transient error {} (attempt {}/{}), retrying: {}",
                        code, attempt, MAX_ATTEMPTS, err
                    );
                    thread::sleep(Duration::from_secs(attempt));
                }
                None => return Err(err),
            },
        }
    }

    op()
}

/// Extract a retryable SQLSTATE from anywhere in the error chain. Both
/// the native driver and the Data API surface codes, in different ways.
fn retryable_sqlstate(err: &anyhow::Error) -> Option<String> {
    for cause in err.chain() {
        if let Some(pg_err) = cause.downcast_ref::<postgres::Error>() {
            if let Some(state) = pg_err.code() {
                if is_retryable_sqlstate(state.code()) {
                    return Some(state.code().to_string());
                }
            }
        }
        if let Some(data_api_err) = cause.downcast_ref::<DataApiError>() {
            if let Some(code) = data_api_err.sqlstate() {
                if is_retryable_sqlstate(code) {
                    return Some(code.to_string());
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_success_passes_through() {
        let result = with_retries(|| Ok::<_, anyhow::Error>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_fatal_error_is_not_retried() {
        let mut calls = 0;
        let result: Result<()> = with_retries(|| {
            calls += 1;
            Err(anyhow!("permission denied"))
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_transient_data_api_error_is_retried() {
        let mut calls = 0;
        let result = with_retries(|| {
            calls += 1;
            if calls == 1 {
                Err(anyhow::Error::new(DataApiError::failed(
                    "ERROR: deadlock detected; SQLSTATE 40P01".to_string(),
                )))
            } else {
                Ok(calls)
            }
        });

        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn test_transient_error_survives_context() {
        let mut calls = 0;
        let result = with_retries(|| {
            calls += 1;
            if calls == 1 {
                let err = anyhow::Error::new(DataApiError::failed(
                    "serializable isolation violation; SQLSTATE XX000".to_string(),
                ));
                Err(err.context("could not drop group"))
            } else {
                Ok(())
            }
        });

        assert!(result.is_ok());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_non_retryable_data_api_error() {
        let mut calls = 0;
        let result: Result<()> = with_retries(|| {
            calls += 1;
            Err(anyhow::Error::new(DataApiError::failed(
                "ERROR: permission denied for schema reports".to_string(),
            )))
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
