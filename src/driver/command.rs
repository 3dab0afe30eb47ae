//! Argument vector renderers for each duplicity operation.
//!
//! duplicity consumes global flags before the subcommand, and filter
//! precedence follows argument order, so every renderer emits a fixed
//! relative ordering: gpg homedir override, encryption key, archive
//! cache, then operation flags and positionals, then include filters
//! and the catch-all exclude for backups. Reordering breaks the tool's
//! filter precedence.

use crate::driver::result_error::error::Error;
use crate::driver::result_error::result::Result;
use crate::driver::secrets::SecretStore;
use bon::Builder;
use getset::Getters;
use itertools::Itertools;
use std::path::{Path, PathBuf};
use std::result;
use validator::{Validate, ValidationError};

/// Age after which a full backup is forced instead of an incremental one
pub static FULL_BACKUP_AGE: &str = "30D";

/// Renders argument vectors from one configuration snapshot.
///
/// Pure and stateless: vectors are built fresh per call and never
/// mutated in place. Secrets never appear here; they travel through the
/// environment overlay only.
#[derive(Clone, Debug, Validate, Builder, Getters)]
#[getset(get = "pub")]
pub struct CommandBuilder {
    /// Root under which sources live and which the backup excludes by default
    #[validate(custom(function = validate_home_path))]
    home: PathBuf,
    sources: Vec<PathBuf>,
    encrypt_key: Option<String>,
    gpg_homedir: Option<PathBuf>,
    archive_dir: PathBuf,
}

fn validate_home_path(home: &PathBuf) -> result::Result<(), ValidationError> {
    if !home.is_absolute() {
        return Err(ValidationError::new("InvalidHome")
            .with_message(format!("home {:?} must be an absolute path", home).into()));
    }

    Ok(())
}

impl CommandBuilder {
    /// Builds a snapshot from the store, rooting the archive cache under
    /// the configuration directory.
    pub fn from_store(store: &SecretStore, config_dir: &Path) -> Result<Self> {
        let home = PathBuf::from(store.get("duplicity", "home").ok_or_else(|| {
            Error::MissingKey {
                section: "duplicity".to_owned(),
                key: "home".to_owned(),
            }
        })?);
        let sources = store
            .get("duplicity", "sources")
            .map(|raw| {
                raw.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(|line| home.join(line))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self::builder()
            .home(home)
            .sources(sources)
            .maybe_encrypt_key(store.get("gpg", "key"))
            .maybe_gpg_homedir(store.get("gpg", "homedir").map(PathBuf::from))
            .archive_dir(config_dir.join(".cache").join("duplicity"))
            .build())
    }

    /// `--include` per source, sorted case-insensitively by file name so
    /// filter precedence is stable across runs.
    pub fn include_filters(&self) -> Vec<String> {
        self.sources
            .iter()
            .sorted_by_cached_key(|source| {
                source
                    .file_name()
                    .map(|name| name.to_string_lossy().to_lowercase())
                    .unwrap_or_default()
            })
            .flat_map(|source| ["--include".to_owned(), source.display().to_string()])
            .collect()
    }

    /// Keyring override first, then the encryption key: duplicity reads
    /// `--gpg-options` before it resolves the key.
    pub fn encryption_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(homedir) = &self.gpg_homedir {
            args.push("--gpg-options".to_owned());
            args.push(format!("--homedir={}", homedir.display()));
        }
        if let Some(key) = &self.encrypt_key {
            args.push("--encrypt-key".to_owned());
            args.push(key.clone());
        }
        args
    }

    /// Fixed cache location, avoids re-scanning remote metadata per run.
    pub fn archive_cache_args(&self) -> Vec<String> {
        vec![
            "--archive-dir".to_owned(),
            self.archive_dir.display().to_string(),
        ]
    }

    fn global_args(&self) -> Vec<String> {
        let mut args = self.encryption_args();
        args.extend(self.archive_cache_args());
        args
    }

    pub fn backup_args(&self, destination: &str, debug: bool) -> Vec<String> {
        let mut args = self.global_args();
        if debug {
            args.push("-v9".to_owned());
        }
        args.push("--allow-source-mismatch".to_owned());
        args.push("--full-if-older-than".to_owned());
        args.push(FULL_BACKUP_AGE.to_owned());
        args.extend(self.include_filters());
        args.push("--exclude".to_owned());
        args.push("**".to_owned());
        args.push(self.home.display().to_string());
        args.push(destination.to_owned());
        args
    }

    pub fn status_args(&self, destination: &str) -> Vec<String> {
        let mut args = self.global_args();
        args.push("collection-status".to_owned());
        args.push(destination.to_owned());
        args
    }

    pub fn list_args(&self, destination: &str) -> Vec<String> {
        let mut args = self.global_args();
        args.push("list-current-files".to_owned());
        args.push(destination.to_owned());
        args
    }

    pub fn remove_older_args(&self, destination: &str, threshold: &str) -> Vec<String> {
        let mut args = self.global_args();
        args.push("remove-older-than".to_owned());
        args.push("--num-retries=1".to_owned());
        args.push(threshold.to_owned());
        args.push("--force".to_owned());
        args.push(destination.to_owned());
        args
    }

    pub fn restore_args(
        &self,
        destination: &str,
        target_dir: &Path,
        relpath: Option<&str>,
    ) -> Vec<String> {
        let mut args = self.global_args();
        args.push("restore".to_owned());
        args.push(destination.to_owned());
        if let Some(relpath) = relpath {
            args.push("--file-to-restore".to_owned());
            args.push(relpath.to_owned());
        }
        args.push(target_dir.display().to_string());
        args
    }

    pub fn cleanup_args(&self, destination: &str) -> Vec<String> {
        let mut args = self.global_args();
        args.push("cleanup".to_owned());
        args.push("--force".to_owned());
        args.push("--extra-clean".to_owned());
        args.push(destination.to_owned());
        args
    }
}
