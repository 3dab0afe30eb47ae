//! # offsite
//!
//! A driver for day-to-day use of [duplicity](https://duplicity.gitlab.io/)
//! in unattended setups.
//!
//! ## Features
//!
//! - **Multiple Destinations**: one independent backup set per backend URI
//! - **Declarative Configuration**: a single section-grouped secrets file
//! - **Mail On Failure**: captured diagnostics delivered by SMTP instead of
//!   dying silently inside cron
//! - **Scoped Credentials**: secrets staged into the child environment and
//!   cleared on every exit path
//! - **Full Operation Set**: backup, restore, list, collection status,
//!   retention pruning and cleanup
//!
//! ## Quick Start
//!
//! ```no_run
//! use offsite::driver::duplicity::DuplicityDriver;
//! use std::path::Path;
//!
//! let mut driver = DuplicityDriver::open(Path::new("/home/me/.offsite"))?;
//! for status in driver.backup()? {
//!     println!("{}: {}", status.destination(), if *status.ok() { "done" } else { "failed" });
//! }
//! driver.close();
//! # Ok::<(), offsite::driver::result_error::error::Error>(())
//! ```

pub mod driver;
