//! Process-wide credential staging for the child process.
//!
//! duplicity reads its transport and encryption secrets from the
//! environment, never from the command line, so they can't leak into
//! argument vectors, mails or shell history. The guard owns the overlay
//! for one driver lifetime and clears it on every exit path.

use crate::driver::redacted::RedactedString;
use crate::driver::secrets::SecretStore;
use bon::Builder;
use getset::Getters;
use std::env;

pub static ACCESS_KEY_ID_VAR: &str = "AWS_ACCESS_KEY_ID";
pub static SECRET_ACCESS_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub static PASSPHRASE_VAR: &str = "PASSPHRASE";
pub static FTP_PASSWORD_VAR: &str = "FTP_PASSWORD";

/// The secrets written into the environment overlay.
///
/// Absent configuration keys become empty strings, so staging never
/// leaves a stale prior value behind.
#[derive(Clone, Debug, Default, Builder, Getters)]
#[getset(get = "pub")]
pub struct Credentials {
    #[builder(into, default)]
    access_key_id: RedactedString,
    #[builder(into, default)]
    secret_access_key: RedactedString,
    #[builder(into, default)]
    passphrase: RedactedString,
    #[builder(into, default)]
    ftp_password: RedactedString,
}

impl Credentials {
    pub fn from_store(store: &SecretStore) -> Self {
        Self::builder()
            .access_key_id(store.get("s3", "access_key_id").unwrap_or_default())
            .secret_access_key(store.get("s3", "secret_access_key").unwrap_or_default())
            .passphrase(store.get("gpg", "passphrase").unwrap_or_default())
            .ftp_password(store.get("ftp", "password").unwrap_or_default())
            .build()
    }
}

/// Scoped ownership of the credential environment variables.
///
/// Staged once per driver lifetime, not per call: duplicity expects the
/// variables to be present before any operation runs. `clear` is
/// idempotent and also runs on drop, so no exit path leaves secrets in
/// the environment. Single-tenant by design: two live guards in one
/// process would overwrite each other.
#[derive(Debug)]
pub struct EnvironmentGuard;

impl EnvironmentGuard {
    pub fn stage(credentials: &Credentials) -> Self {
        Self::write(credentials);
        EnvironmentGuard
    }

    pub fn clear(&mut self) {
        Self::write(&Credentials::default());
    }

    fn write(credentials: &Credentials) {
        env::set_var(ACCESS_KEY_ID_VAR, credentials.access_key_id().inner());
        env::set_var(
            SECRET_ACCESS_KEY_VAR,
            credentials.secret_access_key().inner(),
        );
        env::set_var(PASSPHRASE_VAR, credentials.passphrase().inner());
        env::set_var(FTP_PASSWORD_VAR, credentials.ftp_password().inner());
    }
}

impl Drop for EnvironmentGuard {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
