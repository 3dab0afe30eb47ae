use crate::driver::result_error::WithMsg;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot read configuration file {path:?}: {source}")]
    ConfigUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("configuration key [{section}] {key} is not set")]
    MissingKey { section: String, key: String },
    #[error("configuration key [{section}] {key} is not a boolean: {value:?}")]
    InvalidBoolean {
        section: String,
        key: String,
        value: String,
    },
    #[error("both relay credentials and a smarthost are configured, pick one")]
    AmbiguousMailer,
    #[error("no mailer is configured")]
    MailerNotConfigured,
    #[error("smtp server rejected the message: {0}")]
    SmtpRejected(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    Address(#[from] lettre::address::AddressError),
    #[error(transparent)]
    Email(#[from] lettre::error::Error),
    #[error(transparent)]
    SmtpTransport(#[from] lettre::transport::smtp::Error),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}
