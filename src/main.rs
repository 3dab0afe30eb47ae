use clap::{Parser, Subcommand};
use offsite::driver::duplicity::DuplicityDriver;
use offsite::driver::result_error::result::Result;
use std::path::PathBuf;
use std::process::exit;
use tracing::error;

/// Drive duplicity backups across the configured destinations
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory holding secrets.yml and the archive cache
    #[arg(short, long)]
    config: PathBuf,

    #[command(subcommand)]
    operation: Operation,
}

#[derive(Subcommand, Debug)]
enum Operation {
    /// Back up to every configured destination
    Backup,
    /// Back up to a single destination
    Target {
        destination: String,
        /// Run duplicity at maximum verbosity
        #[arg(long)]
        debug: bool,
    },
    /// Show the collection status of a destination
    Check { destination: String },
    /// List the files currently stored at a destination
    List { destination: String },
    /// Delete backup sets older than a threshold such as 30D
    RemoveOlder {
        destination: String,
        threshold: String,
    },
    /// Delete extraneous files left behind at a destination
    Cleanup { destination: String },
    /// Restore from a destination into a directory
    Restore {
        destination: String,
        directory: PathBuf,
        /// Restore only this path relative to the backup root
        #[arg(long)]
        file: Option<String>,
    },
    /// Send a test mail to the configured recipient
    TestMail,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match run(args) {
        Ok(true) => {}
        Ok(false) => exit(1),
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}

fn run(args: Args) -> Result<bool> {
    let mut driver = DuplicityDriver::open(&args.config)?;
    let clean = match args.operation {
        Operation::Backup => {
            let statuses = driver.backup()?;
            for status in &statuses {
                println!(
                    "{}: {}",
                    status.destination(),
                    if *status.ok() { "done" } else { "failed" }
                );
            }
            statuses.iter().all(|status| *status.ok())
        }
        Operation::Target { destination, debug } => driver.backup_to(&destination, debug)?,
        Operation::Check { destination } => print_output(driver.check(&destination)?),
        Operation::List { destination } => print_output(driver.list_files(&destination)?),
        Operation::RemoveOlder {
            destination,
            threshold,
        } => print_output(driver.remove_older_than(&destination, &threshold)?),
        Operation::Cleanup { destination } => print_output(driver.cleanup(&destination)?),
        Operation::Restore {
            destination,
            directory,
            file,
        } => driver.restore(&destination, &directory, file.as_deref())?,
        Operation::TestMail => {
            let recipient = driver.test_mail()?;
            println!("test mail sent to {recipient}");
            true
        }
    };
    driver.close();
    Ok(clean)
}

fn print_output(output: Option<String>) -> bool {
    match output {
        Some(text) => {
            print!("{text}");
            true
        }
        None => false,
    }
}
