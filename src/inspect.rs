use crate::config::Config;
use crate::connection::{DbConnection, DbDefaultPrivilege};
use anyhow::Result;
use ascii_table::AsciiTable;
use indoc::indoc;
use log::info;

/// Print the current users, groups, roles and default privileges of
/// the cluster the config connects to.
pub fn inspect(config: &Config) -> Result<()> {
    let mut conn = DbConnection::new(config)?;

    let current_database = conn.current_database()?;
    let users_in_db = conn.get_users()?;
    let groups_in_db = conn.get_groups()?;
    let user_grants = conn.get_user_role_grants()?;
    let default_privileges = conn.list_default_privileges()?;

    let mut users = users_in_db
        .iter()
        .map(|u| {
            let groups = groups_in_db
                .iter()
                .filter(|g| g.users.contains(&u.name))
                .map(|g| g.name.clone())
                .collect::<Vec<_>>()
                .join(", ");
            let roles = user_grants
                .iter()
                .filter(|(_, user)| *user == u.name)
                .map(|(role, _)| role.clone())
                .collect::<Vec<_>>()
                .join(", ");

            vec![
                u.name.clone(),
                u.superuser.to_string(),
                u.createdb.to_string(),
                groups,
                roles,
            ]
        })
        .collect::<Vec<_>>();

    users.insert(
        0,
        vec![
            "User".to_string(),
            "Super".to_string(),
            "Createdb".to_string(),
            "Groups".to_string(),
            "Roles".to_string(),
        ],
    );
    users.insert(1, vec!["---".to_string(); 5]);

    // Fit the tables to the terminal
    let term_width = term_size::dimensions().map(|(w, _)| w).unwrap_or(120) - 5;

    let mut table = AsciiTable::default();
    table.set_max_width(term_width);

    info!(
        "Current users in {} (database {}):\n{}",
        conn.info(),
        current_database,
        table.format(users)
    );

    let mut groups = groups_in_db
        .iter()
        .map(|g| vec![g.name.clone(), g.users.join(", ")])
        .collect::<Vec<_>>();
    groups.insert(0, vec!["Group".to_string(), "Members".to_string()]);
    groups.insert(1, vec!["---".to_string(); 2]);

    info!("Groups:\n{}", table.format(groups));

    let role_grants = conn.get_role_role_grants()?;
    let mut roles = conn
        .get_roles()?
        .into_iter()
        .map(|role| {
            let users = user_grants
                .iter()
                .filter(|(r, _)| *r == role)
                .map(|(_, u)| u.clone());
            let grantee_roles = role_grants
                .iter()
                .filter(|(r, _)| *r == role)
                .map(|(_, g)| format!("role {}", g));
            let grantees = users.chain(grantee_roles).collect::<Vec<_>>().join(", ");
            vec![role, grantees]
        })
        .collect::<Vec<_>>();
    roles.insert(0, vec!["Role".to_string(), "Granted To".to_string()]);
    roles.insert(1, vec!["---".to_string(); 2]);

    info!("Roles:\n{}", table.format(roles));

    let mut privileges = default_privileges
        .iter()
        .map(privilege_row)
        .collect::<Vec<_>>();
    privileges.insert(
        0,
        vec![
            "Schema".to_string(),
            "Owner".to_string(),
            "Grantee".to_string(),
            "Type".to_string(),
            "Privilege".to_string(),
        ],
    );
    privileges.insert(1, vec!["---".to_string(); 5]);

    info!("Default privileges on tables:\n{}", table.format(privileges));

    info!(indoc! {r#"
        == Legend ==

        Groups:     pg_group memberships of each user
        Roles:      roles granted directly to each user
        Schema:     empty means the entry applies database-wide
        Type:       grantee type (user, group or role)
    "#});

    Ok(())
}

fn privilege_row(p: &DbDefaultPrivilege) -> Vec<String> {
    vec![
        p.schema.clone().unwrap_or_default(),
        p.owner.clone(),
        p.grantee.clone(),
        p.grantee_type.clone(),
        p.privilege.clone(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_row_without_schema() {
        let p = DbDefaultPrivilege {
            schema: None,
            owner: "etl_loader".to_string(),
            grantee: "analysts".to_string(),
            grantee_type: "group".to_string(),
            privilege: "SELECT".to_string(),
        };
        assert_eq!(
            privilege_row(&p),
            vec!["", "etl_loader", "analysts", "group", "SELECT"]
        );
    }
}
