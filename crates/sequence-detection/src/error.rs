//! Fatal run errors
//!
//! Everything else in this crate is recoverable by construction: extraction
//! failures skip a record, relocation failures are carried in per-member
//! outcomes. Only configuration problems abort a run, and they surface
//! before any record is processed.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Input folder is not readable: {path}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Output folder could not be created: {path}")]
    DestinationUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Output folder name must not be empty")]
    EmptyDestinationName,
}
