use crate::config::Config;
use ansi_term::Colour::{Green, Red};
use anyhow::{anyhow, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Validate the target path. A directory is scanned recursively for
/// .yaml/.yml files, each validated in turn.
pub fn validate_target(target: &Path) -> Result<()> {
    if !target.exists() {
        return Err(anyhow!(
            "{:?} ... {} - file/directory does not exist",
            target,
            Red.paint("Failed")
        ));
    }

    if target.is_dir() {
        let mut files = vec![];
        for entry in WalkDir::new(target) {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                if let Some(ext) = path.extension() {
                    if ext == "yaml" || ext == "yml" {
                        files.push(path.to_path_buf());
                    }
                }
            }
        }
        files.sort();

        for file in files {
            // Report but keep validating the rest
            validate_file(&file).unwrap_or_else(|e| {
                println!("{}", e);
            });
        }

        return Ok(());
    }

    validate_file(target)
}

/// Validate one yaml config file
pub fn validate_file(file: &Path) -> Result<()> {
    Config::new(file).map_err(|e| anyhow!("{:?} ... {} - {}", file, Red.paint("invalid"), e))?;

    println!("{:?} ... {}", file, Green.paint("ok"));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_validate_missing_target() {
        assert!(validate_target(Path::new("/nonexistent/config.yaml")).is_err());
    }

    #[test]
    fn test_validate_file() {
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("good.yaml");
        fs::write(
            &good,
            "connection:\n  host: localhost\n  username: admin\n  password: secret\n",
        )
        .unwrap();
        assert!(validate_file(&good).is_ok());

        let bad = dir.path().join("bad.yaml");
        fs::write(&bad, "not a config").unwrap();
        assert!(validate_file(&bad).is_err());
    }

    #[test]
    fn test_validate_directory_reports_but_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.yml"), "not a config").unwrap();

        assert!(validate_target(dir.path()).is_ok());
    }
}
