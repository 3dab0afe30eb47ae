//! Secure string handling with redacted display.
//!
//! Provides `RedactedString` for holding credentials in memory while
//! preventing accidental exposure in logs and debug output.

use bon::Builder;
use derive_more::From;
use getset::Getters;
use std::fmt::{Debug, Formatter};
use zeroize::Zeroize;

/// Placeholder text shown instead of the actual secret in logs/debug output
pub static REDACTED_PLACEHOLDER: &str = "###REDACTED###";

/// A string that gets redacted in debug output
///
/// Used to store sensitive data like passphrases and passwords while
/// preventing accidental exposure in logs or debug output. Memory is
/// zeroed on drop.
#[derive(Clone, Default, Zeroize, From, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct RedactedString {
    #[builder(into)]
    inner: String,
}

impl Debug for RedactedString {
    /// Always shows the redacted placeholder instead of the actual value
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", REDACTED_PLACEHOLDER)
    }
}

impl From<&str> for RedactedString {
    fn from(value: &str) -> Self {
        Self {
            inner: value.to_owned(),
        }
    }
}

impl Drop for RedactedString {
    fn drop(&mut self) {
        self.zeroize();
    }
}
