use crate::config::{Config, DefaultPrivileges, Group, GroupMembership, Role, RoleGrant, User};
use crate::connection::{DbConnection, DbGroup, DbUser};
use crate::retry::with_retries;
use ansi_term::Colour::{Green, Purple, Red};
use anyhow::{anyhow, Result};
use ascii_table::AsciiTable;
use log::{error, info, warn};
use std::collections::BTreeSet;
use std::path::Path;
use walkdir::WalkDir;

/// Read the config from the given path and apply it to the database.
/// If the dryrun flag is set, the changes will not be applied.
pub fn apply(target: &Path, dryrun: bool) -> Result<()> {
    let target = target.to_path_buf();

    if target.is_dir() {
        return Err(anyhow!(
            "{} is a directory, use --all to apply a directory",
            target.display()
        ));
    }

    let config = Config::new(&target)?;

    info!("Applying configuration from {}", target.display());
    let mut conn = DbConnection::new(&config)?;

    // Users first so groups and grants can reference them, grants last
    // so every object they name exists.
    sync_users(&mut conn, &config.users, dryrun)?;
    sync_groups(&mut conn, &config.groups, dryrun)?;
    sync_memberships(&mut conn, &config.memberships, dryrun)?;
    sync_roles(&mut conn, &config.roles, dryrun)?;
    sync_role_grants(&mut conn, &config.role_grants, dryrun)?;
    sync_default_privileges(&mut conn, &config.default_privileges, dryrun)?;

    Ok(())
}

/// Apply all config files (.yaml or .yml) found under the given
/// directory, recursively.
pub fn apply_all(target: &Path, dryrun: bool) -> Result<()> {
    let mut config_files = Vec::new();
    for entry in WalkDir::new(target) {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            if let Some(ext) = path.extension() {
                if ext == "yaml" || ext == "yml" {
                    config_files.push(path.to_path_buf());
                }
            }
        }
    }
    config_files.sort();

    for config_file in config_files {
        apply(&config_file, dryrun)?;
    }

    Ok(())
}

/// Create missing users and reconcile the attributes of existing ones.
/// Users in the database but not in the config are reported, never
/// dropped.
fn sync_users(conn: &mut DbConnection, users: &[User], dryrun: bool) -> Result<()> {
    let mut summary = summary_header(&["User", "Action"]);

    let users_in_db = conn.get_users()?;

    for user in users {
        let name = user.lowered_name();
        match users_in_db.iter().find(|u| u.name == name) {
            Some(user_in_db) => {
                let mut actions = Vec::new();

                if user.update_password.unwrap_or(false) {
                    run(conn, &user.to_sql_update_password()?, dryrun)?;
                    actions.push("update password");
                }
                if user_in_db.createdb != user.createdb {
                    run(conn, &user.to_sql_set_createdb(), dryrun)?;
                    actions.push(if user.createdb {
                        "grant createdb"
                    } else {
                        "revoke createdb"
                    });
                }

                let action = if actions.is_empty() {
                    "no action (already exists)".to_string()
                } else {
                    status(&actions.join(", "), dryrun)
                };
                summary.push(vec![name, action]);
            }
            None => {
                run(conn, &user.to_sql_create(), dryrun)?;
                summary.push(vec![name, status("create", dryrun)]);
            }
        }
    }

    for user in unmanaged_users(&users_in_db, users) {
        summary.push(vec![user, "no action (not in config)".to_string()]);
    }

    print_summary(summary);

    Ok(())
}

fn unmanaged_users(users_in_db: &[DbUser], users: &[User]) -> Vec<String> {
    users_in_db
        .iter()
        .filter(|u| !u.superuser && !users.iter().any(|c| c.lowered_name() == u.name))
        .map(|u| u.name.clone())
        .collect()
}

/// Create missing groups, reconcile member lists of groups that define
/// one, and drop groups marked with `drop: true`.
fn sync_groups(conn: &mut DbConnection, groups: &[Group], dryrun: bool) -> Result<()> {
    let mut summary = summary_header(&["Group", "Action"]);

    let groups_in_db = conn.get_groups()?;

    for group in groups {
        let name = group.lowered_name();
        let group_in_db = groups_in_db.iter().find(|g| g.name == name);

        if group.drop {
            match group_in_db {
                Some(_) => {
                    drop_group(conn, group, dryrun)?;
                    summary.push(vec![name, status("drop", dryrun)]);
                }
                None => summary.push(vec![name, "no action (already dropped)".to_string()]),
            }
            continue;
        }

        match group_in_db {
            Some(group_in_db) => {
                let action = sync_group_members(conn, group, group_in_db, dryrun)?;
                summary.push(vec![name, action]);
            }
            None => {
                run(conn, &group.to_sql_create(), dryrun)?;
                summary.push(vec![name, status("create", dryrun)]);
            }
        }
    }

    for group in &groups_in_db {
        if !groups.iter().any(|g| g.lowered_name() == group.name) {
            summary.push(vec![
                group.name.clone(),
                "no action (not in config)".to_string(),
            ]);
        }
    }

    print_summary(summary);

    Ok(())
}

/// A group cannot be dropped while it still holds privileges, so every
/// non-system schema is swept first. The sweep and the drop run in one
/// transaction: a failed drop must not leave the group alive with its
/// privileges already revoked. Concurrent DDL on the cluster can make
/// the sweep fail transiently, hence the retry.
fn drop_group(conn: &mut DbConnection, group: &Group, dryrun: bool) -> Result<()> {
    let schemas = conn.get_nonsystem_schemas()?;
    let statements = group_drop_statements(group, &schemas);

    if dryrun {
        for sql in &statements {
            info!("{}: {}", Purple.paint("Dry-run"), sql);
        }
        return Ok(());
    }

    with_retries(|| conn.execute_in_transaction(&statements))?;
    for sql in &statements {
        info!("{}: {}", Green.paint("Success"), Purple.paint(sql));
    }

    Ok(())
}

fn group_drop_statements(group: &Group, schemas: &[String]) -> Vec<String> {
    let mut statements = Vec::new();
    for schema in schemas {
        statements.extend(group.to_sql_revoke_all_in_schema(schema));
    }
    statements.push(group.to_sql_drop());
    statements
}

fn sync_group_members(
    conn: &mut DbConnection,
    group: &Group,
    group_in_db: &DbGroup,
    dryrun: bool,
) -> Result<String> {
    // Groups without a users list only assert existence.
    if group.users.is_empty() {
        return Ok("no action (already exists)".to_string());
    }

    let desired: BTreeSet<String> = group.lowered_users().into_iter().collect();
    let current: BTreeSet<String> = group_in_db.users.iter().cloned().collect();
    let (to_add, to_drop) = member_diff(&desired, &current);

    if to_add.is_empty() && to_drop.is_empty() {
        return Ok("no action (members up to date)".to_string());
    }

    if !to_add.is_empty() {
        run(conn, &group.to_sql_add_users(&to_add), dryrun)?;
    }
    if !to_drop.is_empty() {
        run(conn, &group.to_sql_drop_users(&to_drop), dryrun)?;
    }

    Ok(status(
        &format!("members +{} -{}", to_add.len(), to_drop.len()),
        dryrun,
    ))
}

/// Reconcile the member list of each membership's group, which may
/// have been created outside the config. Listed users are added,
/// members no longer listed are dropped.
fn sync_memberships(
    conn: &mut DbConnection,
    memberships: &[GroupMembership],
    dryrun: bool,
) -> Result<()> {
    if memberships.is_empty() {
        return Ok(());
    }

    let mut summary = summary_header(&["Group", "Action"]);

    for membership in memberships {
        let group = membership.lowered_group();
        if !conn.group_exists(&group)? {
            return Err(anyhow!("group {} does not exist", membership.group));
        }

        let desired: BTreeSet<String> = membership.lowered_users().into_iter().collect();
        let current: BTreeSet<String> = conn.get_group_members(&group)?.into_iter().collect();
        let (to_add, to_drop) = member_diff(&desired, &current);

        if to_add.is_empty() && to_drop.is_empty() {
            summary.push(vec![group, "no action (members up to date)".to_string()]);
            continue;
        }

        for user in &to_add {
            if !conn.user_exists(user)? {
                return Err(anyhow!("user {} does not exist", user));
            }
        }

        if !to_add.is_empty() {
            run(conn, &membership.to_sql_add_users(&to_add), dryrun)?;
        }
        if !to_drop.is_empty() {
            run(conn, &membership.to_sql_drop_users(&to_drop), dryrun)?;
        }

        summary.push(vec![
            group,
            status(
                &format!("members +{} -{}", to_add.len(), to_drop.len()),
                dryrun,
            ),
        ]);
    }

    print_summary(summary);

    Ok(())
}

/// Members to add and to drop to converge on the desired set.
fn member_diff(
    desired: &BTreeSet<String>,
    current: &BTreeSet<String>,
) -> (Vec<String>, Vec<String>) {
    (
        desired.difference(current).cloned().collect(),
        current.difference(desired).cloned().collect(),
    )
}

/// Create missing roles and drop roles marked with `drop: true`.
fn sync_roles(conn: &mut DbConnection, roles: &[Role], dryrun: bool) -> Result<()> {
    if roles.is_empty() {
        return Ok(());
    }

    let mut summary = summary_header(&["Role", "Action"]);

    let roles_in_db: BTreeSet<String> = conn.get_roles()?.into_iter().collect();

    for role in roles {
        let name = role.lowered_name();
        let exists = roles_in_db.contains(&name);

        let action = if role.drop {
            if exists {
                run(conn, &role.to_sql_drop(), dryrun)?;
                status("drop", dryrun)
            } else {
                "no action (already dropped)".to_string()
            }
        } else if exists {
            "no action (already exists)".to_string()
        } else {
            run(conn, &role.to_sql_create(), dryrun)?;
            status("create", dryrun)
        };

        summary.push(vec![name, action]);
    }

    print_summary(summary);

    Ok(())
}

/// Reconcile which users and roles hold each managed role. Grants for
/// roles not in the config are left alone.
fn sync_role_grants(conn: &mut DbConnection, grants: &[RoleGrant], dryrun: bool) -> Result<()> {
    if grants.is_empty() {
        return Ok(());
    }

    let mut summary = summary_header(&["Role", "Grantee", "Action"]);

    let user_grants = conn.get_user_role_grants()?;
    let role_grants = conn.get_role_role_grants()?;

    for grant in grants {
        let role = grant.lowered_role();

        let current_users: BTreeSet<String> = user_grants
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, u)| u.clone())
            .collect();
        let current_roles: BTreeSet<String> = role_grants
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, g)| g.clone())
            .collect();

        let desired_users: BTreeSet<String> = grant.lowered_users().into_iter().collect();
        let desired_roles: BTreeSet<String> = grant.lowered_roles().into_iter().collect();

        for user in desired_users.difference(&current_users) {
            run(conn, &grant.to_sql_grant_user(user), dryrun)?;
            summary.push(vec![role.clone(), user.clone(), status("grant", dryrun)]);
        }
        for user in current_users.difference(&desired_users) {
            run(conn, &grant.to_sql_revoke_user(user), dryrun)?;
            summary.push(vec![role.clone(), user.clone(), status("revoke", dryrun)]);
        }
        for grantee in desired_roles.difference(&current_roles) {
            run(conn, &grant.to_sql_grant_role(grantee), dryrun)?;
            summary.push(vec![
                role.clone(),
                format!("role {}", grantee),
                status("grant", dryrun),
            ]);
        }
        for grantee in current_roles.difference(&desired_roles) {
            run(conn, &grant.to_sql_revoke_role(grantee), dryrun)?;
            summary.push(vec![
                role.clone(),
                format!("role {}", grantee),
                status("revoke", dryrun),
            ]);
        }

        for user in desired_users.intersection(&current_users) {
            summary.push(vec![
                role.clone(),
                user.clone(),
                "no action (already granted)".to_string(),
            ]);
        }
        for grantee in desired_roles.intersection(&current_roles) {
            summary.push(vec![
                role.clone(),
                format!("role {}", grantee),
                "no action (already granted)".to_string(),
            ]);
        }
    }

    print_summary(summary);

    Ok(())
}

/// Reconcile default privileges. Each entry is revoked and re-granted
/// in one transaction so the grantee never observes a privilege gap,
/// then read back to confirm the catalog matches.
fn sync_default_privileges(
    conn: &mut DbConnection,
    entries: &[DefaultPrivileges],
    dryrun: bool,
) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }

    let mut summary = summary_header(&["Entry", "Privileges", "Action"]);

    for entry in entries {
        let id = entry.id()?;
        let desired = entry.normalized_privileges();
        let current = conn.get_default_privileges(entry)?;

        if current == desired {
            summary.push(vec![
                id,
                privileges_cell(&desired),
                "no action (up to date)".to_string(),
            ]);
            continue;
        }

        // An empty privilege set is a revoke-only entry
        let mut statements = vec![entry.to_sql_revoke()?];
        if !desired.is_empty() {
            statements.push(entry.to_sql_grant()?);
        }

        if dryrun {
            for sql in &statements {
                info!("{}: {}", Purple.paint("Dry-run"), sql);
            }
        } else {
            with_retries(|| conn.execute_in_transaction(&statements))?;
            for sql in &statements {
                info!("{}: {}", Green.paint("Success"), Purple.paint(sql));
            }

            let applied = conn.get_default_privileges(entry)?;
            if applied != desired {
                warn!(
                    "default privileges for {} read back as {:?}, expected {:?}",
                    id, applied, desired
                );
            }
        }

        summary.push(vec![id, privileges_cell(&desired), status("apply", dryrun)]);
    }

    print_summary(summary);

    Ok(())
}

fn privileges_cell(privileges: &BTreeSet<String>) -> String {
    privileges.iter().cloned().collect::<Vec<_>>().join(",")
}

/// Execute one statement, or only log it in dryrun mode.
fn run(conn: &mut DbConnection, sql: &str, dryrun: bool) -> Result<()> {
    if dryrun {
        info!("{}: {}", Purple.paint("Dry-run"), sql);
        return Ok(());
    }

    match conn.execute(sql) {
        Ok(_) => {
            info!("{}: {}", Green.paint("Success"), Purple.paint(sql));
            Ok(())
        }
        Err(e) => {
            error!("{}: {}", Red.paint("Error"), sql);
            Err(e)
        }
    }
}

fn status(action: &str, dryrun: bool) -> String {
    if dryrun {
        format!("would {} (dryrun)", action)
    } else {
        action.to_string()
    }
}

fn summary_header(columns: &[&str]) -> Vec<Vec<String>> {
    vec![
        columns.iter().map(|c| c.to_string()).collect(),
        columns.iter().map(|_| "---".to_string()).collect(),
    ]
}

/// Print summary table
fn print_summary(summary: Vec<Vec<String>>) {
    let ascii_table = AsciiTable::default();

    info!("Summary:\n{}", ascii_table.format(summary));
}
