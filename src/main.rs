use anyhow::Result;
use std::env;
use std::path::PathBuf;

use redshiftctl::apply;
use redshiftctl::cli::{self, Command};
use redshiftctl::config::Config;
use redshiftctl::gen;
use redshiftctl::inspect;
use redshiftctl::validate;

fn main() -> Result<()> {
    // Logging is the primary output, default it on
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    match cli::parse().cmd {
        Command::Gen { target } => gen::gen(&target)?,

        Command::GenPass {
            length,
            username,
            password,
        } => gen::gen_password(length, username.as_deref(), password.as_deref()),

        Command::Apply { file, dryrun, all } => {
            if all {
                apply::apply_all(&file, dryrun)?;
            } else {
                apply::apply(&file, dryrun)?;
            }
        }

        Command::Validate { file } => {
            let target = file.unwrap_or_else(|| PathBuf::from("."));
            validate::validate_target(&target)?;
        }

        Command::Inspect { file } => {
            let config = Config::new(&file)?;
            inspect::inspect(&config)?;
        }
    }

    Ok(())
}
