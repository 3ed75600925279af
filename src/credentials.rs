//! IAM authentication: resolves a short-lived database user/password
//! pair with GetClusterCredentials, optionally assuming a role first.

use anyhow::{anyhow, Context, Result};
use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region};
use log::debug;
use std::time::Duration;

use crate::config::{Connection, TemporaryCredentials};

const ASSUME_ROLE_SESSION_LENGTH: Duration = Duration::from_secs(3600);

/// Resolve temporary credentials for the configured database user.
/// Returns the (possibly prefixed) user name and password handed back
/// by the service.
pub fn resolve_temporary_credentials(
    connection: &Connection,
    credentials: &TemporaryCredentials,
) -> Result<(String, String)> {
    let username = connection
        .username
        .as_deref()
        .ok_or_else(|| anyhow!("connection.username is required for temporary credentials"))?;

    let runtime = tokio::runtime::Runtime::new().context("could not start async runtime")?;
    runtime.block_on(resolve(connection, credentials, username))
}

async fn resolve(
    connection: &Connection,
    credentials: &TemporaryCredentials,
    username: &str,
) -> Result<(String, String)> {
    let mut config = load_aws_config(credentials, None).await;

    if let Some(role) = &credentials.assume_role {
        debug!("assuming role {}", role.arn);
        let mut builder = AssumeRoleProvider::builder(role.arn.clone())
            .session_length(ASSUME_ROLE_SESSION_LENGTH);
        if let Some(session_name) = &role.session_name {
            builder = builder.session_name(session_name.clone());
        }
        if let Some(external_id) = &role.external_id {
            builder = builder.external_id(external_id.clone());
        }
        let provider = builder.configure(&config).build().await;

        config = load_aws_config(credentials, Some(provider)).await;
    }

    let client = aws_sdk_redshift::Client::new(&config);
    let mut request = client
        .get_cluster_credentials()
        .cluster_identifier(&credentials.cluster_identifier)
        .db_name(&connection.database)
        .db_user(username);

    if let Some(auto_create) = credentials.auto_create_user {
        request = request.auto_create(auto_create);
    }
    for group in &credentials.db_groups {
        if !group.is_empty() {
            request = request.db_groups(group);
        }
    }
    if let Some(duration) = credentials.duration_seconds {
        if duration > 0 {
            request = request.duration_seconds(duration);
        }
    }

    debug!("requesting cluster credentials for user {}", username);
    let response = request
        .send()
        .await
        .context("failed to resolve temporary credentials")?;

    let db_user = response
        .db_user()
        .ok_or_else(|| anyhow!("GetClusterCredentials returned no user"))?
        .to_string();
    let db_password = response
        .db_password()
        .ok_or_else(|| anyhow!("GetClusterCredentials returned no password"))?
        .to_string();

    debug!("got temporary credentials for user {}", db_user);

    Ok((db_user, db_password))
}

async fn load_aws_config(
    credentials: &TemporaryCredentials,
    provider: Option<AssumeRoleProvider>,
) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &credentials.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(provider) = provider {
        loader = loader.credentials_provider(provider);
    }

    loader.load().await
}
