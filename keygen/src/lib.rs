//! Spring '83 keypair generator
//!
//! Spring '83 publishers are identified by Ed25519 public keys whose hex
//! encoding ends in `83e` followed by an expiry month and year. Such keys
//! can only be found by generating candidates until one fits, so the
//! search runs one worker per CPU and keeps the first match.

pub mod config;
pub mod error;
pub mod filter;
pub mod keypair;
pub mod output;
pub mod search;

pub use config::Config;
pub use error::{KeygenError, Result};
pub use filter::CandidateFilter;
pub use keypair::{KeySource, Keypair, RngKeySource};
pub use search::{Search, SearchOutcome};
