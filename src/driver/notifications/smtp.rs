use crate::driver::notifications::Notification;
use crate::driver::redacted::RedactedString;
use crate::driver::result_error::error::Error;
use crate::driver::result_error::result::Result;
use crate::driver::result_error::WithMsg;
use bon::Builder;
use getset::Getters;
use itertools::Itertools;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::fmt::Display;
use tracing::info;
use validator::Validate;

/// Authenticated submission relay (STARTTLS).
///
/// Logs in with the local part of the from-address, the way personal
/// mail providers expect.
#[derive(Clone, Debug, Validate, Builder, Getters)]
#[getset(get = "pub")]
pub struct RelayConfig {
    #[builder(into)]
    host: String,
    from: Mailbox,
    #[validate(length(min = 1))]
    to: Vec<Mailbox>,
    #[builder(into)]
    username: String,
    #[builder(into)]
    password: RedactedString,
}

/// Unauthenticated local smarthost, plain connection.
#[derive(Clone, Debug, Validate, Builder, Getters)]
#[getset(get = "pub")]
pub struct SmarthostConfig {
    #[builder(into)]
    host: String,
    port: Option<u16>,
    from: Mailbox,
    #[validate(length(min = 1))]
    to: Vec<Mailbox>,
}

fn build_message<D1: Display, D2: Display>(
    from: &Mailbox,
    to: &[Mailbox],
    subject: D1,
    body: D2,
) -> Result<Message> {
    to.iter()
        .fold(Message::builder(), |message, send_to| {
            message.to(send_to.clone())
        })
        .from(from.clone())
        .subject(format!("{}", subject))
        .header(ContentType::TEXT_PLAIN)
        .body(format!("{}", body))
        .map_err(Error::from)
        .with_msg(format!("Failed to build mail from {:?} to {:?}", from, to))
}

fn deliver(mailer: &SmtpTransport, email: &Message) -> Result<()> {
    info!("Sending email...");
    let response = mailer.send(email).map_err(Error::from)?;
    if response.is_positive() {
        Ok(())
    } else {
        Err(Error::SmtpRejected(response.message().join("\n")))
    }
}

impl Notification for RelayConfig {
    fn send<D1: Display, D2: Display>(&self, subject: D1, body: D2) -> Result<()> {
        info!("Relaying mail through {} as {}", self.host, self.username);
        let email = build_message(&self.from, &self.to, subject, body)?;

        let creds = Credentials::new(self.username.clone(), self.password.inner().clone());
        let mailer = SmtpTransport::starttls_relay(self.host.as_str())
            .map_err(Error::from)
            .with_msg(format!("Failed to build smtp client for host {:?}", self.host))?
            .credentials(creds)
            .build();

        deliver(&mailer, &email)
    }

    fn recipients(&self) -> &[Mailbox] {
        &self.to
    }
}

impl Notification for SmarthostConfig {
    fn send<D1: Display, D2: Display>(&self, subject: D1, body: D2) -> Result<()> {
        info!("Handing mail to smarthost {}", self.host);
        let email = build_message(&self.from, &self.to, subject, body)?;

        let mut builder = SmtpTransport::builder_dangerous(self.host.as_str());
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        let mailer = builder.build();

        deliver(&mailer, &email)
    }

    fn recipients(&self) -> &[Mailbox] {
        &self.to
    }
}
