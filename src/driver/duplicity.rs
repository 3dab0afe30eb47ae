//! The backup driver itself.
//!
//! Composes the secret store, command builder, process runner,
//! environment guard and mailer. Every operation follows the same
//! contract: run duplicity once, and on failure report the captured
//! stderr together with the exact argument vector, by mail when
//! configured and to the operator-facing stream otherwise. Failures on
//! one destination never abort the others; only a failing notification
//! channel is surfaced as an error, since there is no secondary channel
//! to report through.

use crate::driver::command::CommandBuilder;
use crate::driver::environment::{Credentials, EnvironmentGuard};
use crate::driver::notifications::{MailerConfig, Notification};
use crate::driver::result_error::error::Error;
use crate::driver::result_error::result::Result;
use crate::driver::runner::{DuplicityRunner, ExecutionResult, Runner, StdoutMode};
use crate::driver::secrets::{SecretStore, CONFIG_FILE};
use getset::Getters;
use itertools::Itertools;
use std::io::{self, Stdout, Write};
use std::path::Path;
use tracing::{info, warn};
use validator::Validate;

static FAILURE_SUBJECT: &str = "\"offsite\" failed";
static TEST_MAIL_SUBJECT: &str = "test mail from backup system";
static TEST_MAIL_BODY: &str = "This is a test mail from the backup system.";

/// Per-destination outcome of a `backup` run.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct DestinationStatus {
    destination: String,
    ok: bool,
}

/// Drives duplicity across the configured destinations.
///
/// Construction stages the credential overlay and loads configuration
/// atomically; `close` clears the overlay and is terminal. Single
/// instance per process: concurrent drivers would fight over the
/// environment overlay.
pub struct DuplicityDriver<R, M, W> {
    commands: CommandBuilder,
    destinations: Vec<String>,
    runner: R,
    mailer: Option<M>,
    notify_by_mail: bool,
    environment: EnvironmentGuard,
    echo: W,
}

impl DuplicityDriver<DuplicityRunner, MailerConfig, Stdout> {
    /// Opens the driver against a configuration directory holding
    /// `secrets.yml` and the archive cache.
    pub fn open(config_dir: &Path) -> Result<Self> {
        let store = SecretStore::load(&config_dir.join(CONFIG_FILE))?;
        let mailer = MailerConfig::from_store(&store)?;
        Self::new(
            &store,
            config_dir,
            DuplicityRunner::default(),
            mailer,
            io::stdout(),
        )
    }
}

impl<R: Runner, M: Notification, W: Write> DuplicityDriver<R, M, W> {
    pub fn new(
        store: &SecretStore,
        config_dir: &Path,
        runner: R,
        mailer: Option<M>,
        echo: W,
    ) -> Result<Self> {
        let commands = CommandBuilder::from_store(store, config_dir)?;
        commands.validate()?;
        let destinations = store
            .get("duplicity", "destinations")
            .map(|raw| raw.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default();
        let notify_by_mail = store.get_bool("duplicity", "mail")?.unwrap_or(false);
        if notify_by_mail && mailer.is_none() {
            return Err(Error::MailerNotConfigured);
        }
        let environment = EnvironmentGuard::stage(&Credentials::from_store(store));

        Ok(Self {
            commands,
            destinations,
            runner,
            mailer,
            notify_by_mail,
            environment,
            echo,
        })
    }

    /// Backs up to every destination in order. A failure on one
    /// destination is reported and the next is still attempted.
    pub fn backup(&mut self) -> Result<Vec<DestinationStatus>> {
        let destinations = self.destinations.clone();
        let mut statuses = Vec::with_capacity(destinations.len());
        for destination in destinations {
            info!("sending to {destination}...");
            let ok = self.backup_to(&destination, false)?;
            info!("{}", if ok { "done" } else { "failed" });
            statuses.push(DestinationStatus { destination, ok });
        }
        Ok(statuses)
    }

    pub fn backup_to(&mut self, destination: &str, debug: bool) -> Result<bool> {
        self.warn_missing_sources();
        let argv = self.commands.backup_args(destination, debug);
        Ok(self.execute(argv, StdoutMode::Inherit)?.is_some())
    }

    /// Collection status of a destination; `None` when the run failed.
    pub fn check(&mut self, destination: &str) -> Result<Option<String>> {
        let argv = self.commands.status_args(destination);
        self.execute(argv, StdoutMode::Capture)
    }

    pub fn list_files(&mut self, destination: &str) -> Result<Option<String>> {
        let argv = self.commands.list_args(destination);
        self.execute(argv, StdoutMode::Capture)
    }

    pub fn remove_older_than(
        &mut self,
        destination: &str,
        threshold: &str,
    ) -> Result<Option<String>> {
        let argv = self.commands.remove_older_args(destination, threshold);
        self.execute(argv, StdoutMode::Capture)
    }

    pub fn cleanup(&mut self, destination: &str) -> Result<Option<String>> {
        let argv = self.commands.cleanup_args(destination);
        self.execute(argv, StdoutMode::Capture)
    }

    /// Restores into `to_directory`, optionally a single relative path.
    /// The target directory is not pre-validated; duplicity's own error
    /// reporting surfaces through the standard failure path.
    pub fn restore(
        &mut self,
        from_destination: &str,
        to_directory: &Path,
        relpath: Option<&str>,
    ) -> Result<bool> {
        let argv = self
            .commands
            .restore_args(from_destination, to_directory, relpath);
        Ok(self.execute(argv, StdoutMode::Inherit)?.is_some())
    }

    /// Sends a fixed diagnostic mail, bypassing the execution path, and
    /// returns the recipient addresses used.
    pub fn test_mail(&self) -> Result<String> {
        let mailer = self.mailer.as_ref().ok_or(Error::MailerNotConfigured)?;
        mailer.send(TEST_MAIL_SUBJECT, TEST_MAIL_BODY)?;
        Ok(mailer.recipients().iter().join(", "))
    }

    /// Clears the credential overlay. Terminal: no further operations
    /// are permitted after closing.
    pub fn close(&mut self) {
        self.environment.clear();
    }

    fn execute(&mut self, argv: Vec<String>, stdout: StdoutMode) -> Result<Option<String>> {
        match self.runner.run(&argv, stdout) {
            ExecutionResult::Success { stdout } => Ok(Some(stdout)),
            ExecutionResult::Failure { stderr, argv } => {
                self.report_failure(&compose_failure_body(&stderr, &argv))?;
                Ok(None)
            }
            ExecutionResult::StartFailure { program, source } => {
                let diagnostics = format!("could not start {}: {}\n", program.display(), source);
                self.report_failure(&compose_failure_body(&diagnostics, &argv))?;
                Ok(None)
            }
        }
    }

    fn report_failure(&mut self, body: &str) -> Result<()> {
        if self.notify_by_mail {
            if let Some(mailer) = &self.mailer {
                warn!("operation failed, sending notification mail");
                return mailer.send(FAILURE_SUBJECT, body);
            }
        }
        warn!("operation failed");
        writeln!(self.echo, "\n*** ERROR ***\n\n{body}").map_err(Error::from)
    }

    fn warn_missing_sources(&self) {
        for source in self.commands.sources() {
            if !source.exists() {
                warn!("source {:?} does not exist", source);
            }
        }
    }
}

/// Captured stderr followed by the argument vector, one element per
/// line, so the exact invocation can be replayed from the report.
/// Secrets travel only through the environment and never appear here.
fn compose_failure_body(stderr: &str, argv: &[String]) -> String {
    format!("{}\n{}", stderr, argv.iter().join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::environment::{
        ENV_LOCK, ACCESS_KEY_ID_VAR, FTP_PASSWORD_VAR, PASSPHRASE_VAR, SECRET_ACCESS_KEY_VAR,
    };
    use lettre::message::Mailbox;
    use std::cell::RefCell;
    use std::env;
    use std::fmt::Display;
    use std::path::PathBuf;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct ScriptedRunner {
        fail_matching: Option<String>,
        start_failure: bool,
        calls: Rc<RefCell<Vec<Vec<String>>>>,
    }

    impl Runner for ScriptedRunner {
        fn run(&self, argv: &[String], _stdout: StdoutMode) -> ExecutionResult {
            self.calls.borrow_mut().push(argv.to_vec());
            if self.start_failure {
                return ExecutionResult::StartFailure {
                    program: PathBuf::from("duplicity"),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                };
            }
            if let Some(pattern) = &self.fail_matching {
                if argv.iter().any(|a| a == pattern) {
                    return ExecutionResult::Failure {
                        stderr: "disk full\n".to_owned(),
                        argv: argv.to_vec(),
                    };
                }
            }
            ExecutionResult::Success {
                stdout: "status output\n".to_owned(),
            }
        }
    }

    #[derive(Clone)]
    struct RecordingMailer {
        sent: Rc<RefCell<Vec<(String, String)>>>,
        to: Vec<Mailbox>,
    }

    impl Default for RecordingMailer {
        fn default() -> Self {
            Self {
                sent: Rc::default(),
                to: vec!["me@example.net".parse().unwrap()],
            }
        }
    }

    impl Notification for RecordingMailer {
        fn send<D1: Display, D2: Display>(&self, subject: D1, body: D2) -> Result<()> {
            self.sent
                .borrow_mut()
                .push((subject.to_string(), body.to_string()));
            Ok(())
        }

        fn recipients(&self) -> &[Mailbox] {
            &self.to
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn store(mail_flag: bool) -> SecretStore {
        format!(
            "duplicity:\n  home: /home/me\n  sources: |\n    Documents\n  destinations: \"s3://one s3://two\"\n  mail: {mail_flag}\ngpg:\n  key: ABC123\n  passphrase: opensesame\ns3:\n  access_key_id: AKIATEST\n  secret_access_key: sekrit\n"
        )
        .parse()
        .unwrap()
    }

    fn driver(
        store: &SecretStore,
        runner: ScriptedRunner,
        mailer: Option<RecordingMailer>,
        echo: SharedBuf,
    ) -> DuplicityDriver<ScriptedRunner, RecordingMailer, SharedBuf> {
        DuplicityDriver::new(store, Path::new("/home/me/.offsite"), runner, mailer, echo).unwrap()
    }

    #[test]
    fn test_backup_attempts_all_destinations_after_failure() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let runner = ScriptedRunner {
            fail_matching: Some("s3://one".to_owned()),
            ..Default::default()
        };
        let calls = runner.calls.clone();
        let mut driver = driver(&store(false), runner, Some(RecordingMailer::default()), SharedBuf::default());

        let statuses = driver.backup().unwrap();

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].destination(), "s3://one");
        assert!(!*statuses[0].ok());
        assert_eq!(statuses[1].destination(), "s3://two");
        assert!(*statuses[1].ok());
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn test_failure_notifies_by_mail_exactly_once() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let runner = ScriptedRunner {
            fail_matching: Some("s3://one".to_owned()),
            ..Default::default()
        };
        let mailer = RecordingMailer::default();
        let sent = mailer.sent.clone();
        let echo = SharedBuf::default();
        let mut driver = driver(&store(true), runner, Some(mailer), echo.clone());

        assert!(!driver.backup_to("s3://one", false).unwrap());

        let sent = sent.borrow();
        assert_eq!(sent.len(), 1);
        let (subject, body) = &sent[0];
        assert!(subject.contains("failed"));
        assert!(body.contains("disk full\n"));
        assert!(body.contains("s3://one"));
        assert!(body.contains("--encrypt-key"));
        assert_eq!(echo.contents(), "");
    }

    #[test]
    fn test_failure_echoes_when_mail_disabled() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let runner = ScriptedRunner {
            fail_matching: Some("s3://one".to_owned()),
            ..Default::default()
        };
        let mailer = RecordingMailer::default();
        let sent = mailer.sent.clone();
        let echo = SharedBuf::default();
        let mut driver = driver(&store(false), runner, Some(mailer), echo.clone());

        assert!(!driver.backup_to("s3://one", false).unwrap());

        assert!(sent.borrow().is_empty());
        let echoed = echo.contents();
        assert!(echoed.contains("disk full\n"));
        assert!(echoed.contains("s3://one"));
    }

    #[test]
    fn test_start_failure_reports_through_same_path() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let runner = ScriptedRunner {
            start_failure: true,
            ..Default::default()
        };
        let echo = SharedBuf::default();
        let mut driver = driver(&store(false), runner, None, echo.clone());

        assert_eq!(driver.check("s3://one").unwrap(), None);

        let echoed = echo.contents();
        assert!(echoed.contains("could not start"));
        assert!(echoed.contains("collection-status"));
    }

    #[test]
    fn test_check_returns_captured_output() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut driver = driver(
            &store(false),
            ScriptedRunner::default(),
            None,
            SharedBuf::default(),
        );

        assert_eq!(
            driver.check("s3://one").unwrap().as_deref(),
            Some("status output\n")
        );
    }

    #[test]
    fn test_restore_threads_relpath_through() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let runner = ScriptedRunner::default();
        let calls = runner.calls.clone();
        let mut driver = driver(&store(false), runner, None, SharedBuf::default());

        assert!(driver
            .restore("s3://one", Path::new("/tmp/restore"), Some("etc/passwd"))
            .unwrap());

        let calls = calls.borrow();
        let argv = &calls[0];
        let destination = argv.iter().position(|a| a == "s3://one").unwrap();
        assert_eq!(argv[destination + 1], "--file-to-restore");
        assert_eq!(argv[destination + 2], "etc/passwd");
    }

    #[test]
    fn test_test_mail_returns_recipient_without_running_duplicity() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let runner = ScriptedRunner::default();
        let calls = runner.calls.clone();
        let mailer = RecordingMailer::default();
        let sent = mailer.sent.clone();
        let driver = driver(&store(true), runner, Some(mailer), SharedBuf::default());

        assert_eq!(driver.test_mail().unwrap(), "me@example.net");
        assert_eq!(sent.borrow().len(), 1);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_test_mail_without_mailer_is_error() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let driver = driver(
            &store(false),
            ScriptedRunner::default(),
            None,
            SharedBuf::default(),
        );

        match driver.test_mail() {
            Err(Error::MailerNotConfigured) => (),
            other => panic!("Expected MailerNotConfigured, got {:?}", other),
        }
    }

    #[test]
    fn test_notify_enabled_without_mailer_is_rejected() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let result = DuplicityDriver::new(
            &store(true),
            Path::new("/home/me/.offsite"),
            ScriptedRunner::default(),
            None::<RecordingMailer>,
            SharedBuf::default(),
        );

        match result {
            Err(Error::MailerNotConfigured) => (),
            other => panic!("Expected MailerNotConfigured, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_construction_stages_and_close_clears_credentials() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut driver = driver(
            &store(false),
            ScriptedRunner::default(),
            None,
            SharedBuf::default(),
        );

        assert_eq!(env::var(ACCESS_KEY_ID_VAR).unwrap(), "AKIATEST");
        assert_eq!(env::var(SECRET_ACCESS_KEY_VAR).unwrap(), "sekrit");
        assert_eq!(env::var(PASSPHRASE_VAR).unwrap(), "opensesame");

        driver.close();
        for var in [
            ACCESS_KEY_ID_VAR,
            SECRET_ACCESS_KEY_VAR,
            PASSPHRASE_VAR,
            FTP_PASSWORD_VAR,
        ] {
            assert_eq!(env::var(var).unwrap(), "");
        }
    }

    #[test]
    fn test_compose_failure_body_renders_stderr_and_argv() {
        let body = compose_failure_body(
            "disk full\n",
            &["backup".to_owned(), "--foo".to_owned(), "dest1".to_owned()],
        );

        assert!(body.contains("disk full\n"));
        assert!(body.contains("backup\n--foo\ndest1"));
    }
}
