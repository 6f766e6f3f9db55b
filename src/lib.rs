use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

pub mod catalog;
pub mod db;
pub mod error;
pub mod loans;
pub mod models;
pub mod shell;

pub use catalog::Catalog;
pub use error::{LibraryError, Result};
pub use loans::{overdue_fine, Loans, FINE_PER_DAY};

/// Track a small library's books, members and loans in a local SQLite file.
#[derive(Parser, Debug)]
#[command(name = "library-desk", version, about)]
pub struct Args {
  /// Library database file, created on first use
  #[arg(long, default_value = db::DEFAULT_DB_FILE)]
  pub db: PathBuf,

  /// Log filter used when RUST_LOG is not set (logs go to stderr)
  #[arg(long, default_value = "warn")]
  pub log_level: String,
}

fn init_logging(level: &str) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  // A second init (tests, embedding) keeps the first subscriber.
  let _ = fmt().with_env_filter(filter).with_writer(io::stderr).try_init();
}

pub fn run() -> ExitCode {
  let args = Args::parse();
  init_logging(&args.log_level);

  if let Err(err) = db::init_db(&args.db) {
    log::error!("failed to initialize {}: {}", args.db.display(), err);
    eprintln!("Could not open library database {}: {}", args.db.display(), err);
    return ExitCode::FAILURE;
  }

  let stdin = io::stdin();
  let stdout = io::stdout();
  let mut shell = shell::Shell::new(&args.db, stdin.lock(), stdout.lock());
  match shell.run() {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      log::error!("terminal session ended: {}", err);
      ExitCode::FAILURE
    }
  }
}
