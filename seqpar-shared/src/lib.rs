//! Types shared between seqpar crates.

pub mod errors;

pub use errors::{SeqparError, SeqparResult};
