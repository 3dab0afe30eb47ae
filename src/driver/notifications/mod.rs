use crate::driver::notifications::smtp::{RelayConfig, SmarthostConfig};
use crate::driver::redacted::RedactedString;
use crate::driver::result_error::error::Error;
use crate::driver::result_error::result::Result;
use crate::driver::result_error::WithMsg;
use crate::driver::secrets::SecretStore;
use derive_more::From;
use lettre::message::Mailbox;
use std::fmt::Display;
use std::result;
use validator::{Validate, ValidationErrors};

pub mod smtp;

/// The closed set of mailer strategies, selected once at construction
/// by inspecting which configuration fields are present.
#[derive(Clone, Debug, From)]
pub enum MailerConfig {
    Relay(RelayConfig),
    Smarthost(SmarthostConfig),
}

impl MailerConfig {
    /// Resolves the mailer from the `mail` section: relay credentials
    /// (`password` + `server`) or a local `smarthost`, never both.
    /// Returns `None` when no strategy is configured.
    pub fn from_store(store: &SecretStore) -> Result<Option<Self>> {
        let Some(user) = store.get("mail", "user") else {
            return Ok(None);
        };
        let recipient: Mailbox = user
            .parse()
            .map_err(Error::from)
            .with_msg(format!("Invalid mail user {:?}", user))?;

        let password = store.get("mail", "password");
        let server = store.get("mail", "server");
        let smarthost = store.get("mail", "smarthost");

        let config: Self = match (password, server, smarthost) {
            (Some(_), Some(_), Some(_)) => return Err(Error::AmbiguousMailer),
            (Some(password), Some(server), None) => {
                let username = recipient.email.user().to_string();
                RelayConfig::builder()
                    .host(server)
                    .from(recipient.clone())
                    .to(vec![recipient])
                    .username(username)
                    .password(RedactedString::from(password))
                    .build()
                    .into()
            }
            (_, _, Some(smarthost)) => SmarthostConfig::builder()
                .host(smarthost)
                .from(recipient.clone())
                .to(vec![recipient])
                .build()
                .into(),
            _ => return Ok(None),
        };
        config.validate()?;
        Ok(Some(config))
    }
}

impl Validate for MailerConfig {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            Self::Relay(inner) => inner.validate(),
            Self::Smarthost(inner) => inner.validate(),
        }
    }
}

impl Notification for MailerConfig {
    fn send<D1: Display, D2: Display>(&self, subject: D1, body: D2) -> Result<()> {
        match self {
            Self::Relay(inner) => inner.send(subject, body),
            Self::Smarthost(inner) => inner.send(subject, body),
        }
    }

    fn recipients(&self) -> &[Mailbox] {
        match self {
            Self::Relay(inner) => inner.to(),
            Self::Smarthost(inner) => inner.to(),
        }
    }
}

pub trait Notification {
    fn send<D1: Display, D2: Display>(&self, subject: D1, body: D2) -> Result<()>;

    fn recipients(&self) -> &[Mailbox];
}
