//! Keypair file emission and the console report

use crate::error::{KeygenError, Result};
use crate::keypair::Keypair;
use crate::search::SearchOutcome;
use chrono::NaiveDate;
use ed25519_dalek::PUBLIC_KEY_LENGTH;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

/// `<prefix>-<YYYY-MM-DD>-<first 6 public key bytes as hex>.txt`
pub fn keypair_filename(prefix: &str, date: NaiveDate, public_key: &[u8; PUBLIC_KEY_LENGTH]) -> String {
    format!(
        "{}-{}-{}.txt",
        prefix,
        date.format("%Y-%m-%d"),
        hex::encode(&public_key[..6])
    )
}

/// Write the hex private key blob plus a newline into `dir`
pub fn write_keypair(dir: &Path, prefix: &str, date: NaiveDate, keypair: &Keypair) -> Result<PathBuf> {
    let path = dir.join(keypair_filename(prefix, date, keypair.public_key()));
    fs::write(&path, format!("{}\n", keypair.private_hex()))?;
    info!("Wrote keypair to {:?}", path);
    Ok(path)
}

/// Refuse to start a search whose result could not be written
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    Err(KeygenError::Config(format!(
        "Output directory {} does not exist",
        dir.display()
    )))
}

/// Write the winner of `outcome` and build the console report for it
pub fn emit(dir: &Path, prefix: &str, date: NaiveDate, outcome: &SearchOutcome) -> Result<Report> {
    let path = write_keypair(dir, prefix, date, &outcome.winner).map_err(|err| {
        error!(
            error = %err,
            public_key = %outcome.winner.public_hex(),
            "Failed to write keypair file"
        );
        err
    })?;

    Ok(Report {
        attempts: outcome.attempts,
        elapsed: outcome.elapsed,
        path,
    })
}

/// Two-line summary printed after a successful search
#[derive(Debug)]
pub struct Report {
    pub attempts: u64,
    pub elapsed: Duration,
    pub path: PathBuf,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Checked {} candidates in {}",
            self.attempts,
            format_elapsed(self.elapsed)
        )?;
        write!(f, "Wrote: {}", self.path.display())
    }
}

/// Millisecond-truncated duration in the `1h2m3.456s` / `250ms` / `0s` style
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis() as u64;
    if millis == 0 {
        return "0s".into();
    }
    if millis < 1000 {
        return format!("{}ms", millis);
    }

    let secs = millis / 1000;
    let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    out.push_str(&seconds.to_string());

    let fraction = millis % 1000;
    if fraction > 0 {
        let digits = format!("{:03}", fraction);
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }
    out.push('s');
    out
}
