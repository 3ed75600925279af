use anyhow::{anyhow, Context, Result};
use indoc::indoc;
use log::info;
use rand::Rng;
use std::fs;
use std::path::Path;

const TEMPLATE: &str = indoc! {r#"
    connection:
      host: example.abc123.us-east-1.redshift.amazonaws.com
      port: 5439
      database: dev
      username: ${REDSHIFT_USERNAME}
      password: ${REDSHIFT_PASSWORD}

    users:
      - name: etl_loader
        password: ${ETL_PASSWORD}
        createdb: false

    groups:
      - name: analysts
        users:
          - etl_loader

    roles: []

    role_grants: []

    default_privileges:
      - owner: etl_loader
        group: analysts
        object_type: table
        privileges:
          - select
"#};

/// Generate a starter config in the given target folder.
pub fn gen(target: &Path) -> Result<()> {
    let config_path = target.join("config.yaml");
    if config_path.exists() {
        return Err(anyhow!("target already exists: {}", config_path.display()));
    }

    fs::create_dir_all(target)
        .with_context(|| format!("failed to generate {}", target.display()))?;
    fs::write(&config_path, TEMPLATE)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    info!("Generated to {:?}", config_path);

    Ok(())
}

/// Generate a password with the given length, or reuse the provided
/// one, and print the md5 hash Redshift accepts in place of a plain
/// password when a username is given.
pub fn gen_password(length: u8, username: Option<&str>, password: Option<&str>) {
    let password = match password {
        Some(password) => password.to_string(),
        None => random_password(length),
    };

    println!("Generated password: {}", password);

    match username {
        Some(username) => {
            // CREATE USER ... PASSWORD 'md5<hash of password || username>'
            let digest = md5::compute(format!("{}{}", password, username));
            println!("Generated MD5 (user: {}): md5{:x}", username, digest);
        }
        None => println!("Hint: Please provide --username to generate MD5"),
    }
}

fn random_password(length: u8) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                            abcdefghijklmnopqrstuvwxyz\
                            0123456789)(*&^%$#@!~";

    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}
