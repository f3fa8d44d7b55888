//! Batch relocation of completed sequences
//!
//! Moves the files of one completed pole sequence into the output folder.
//! The batch is not transactional: each member is attempted independently
//! and failures are carried in the returned outcomes, never thrown.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::classify::SequenceMember;
use crate::error::RunError;

/// Why a single member could not be moved.
#[derive(Debug, Error)]
pub enum MoveError {
    /// A file of the same name already exists at the destination. The move
    /// fails rather than overwriting it.
    #[error("Destination already has a file named {0}")]
    AlreadyExists(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result of attempting to move one sequence member.
#[derive(Debug)]
pub struct MoveOutcome {
    pub member: SequenceMember,
    /// The file's new path on success.
    pub result: Result<PathBuf, MoveError>,
}

/// Move every member of a completed sequence into `destination`, preserving
/// base names. A failure on one member does not prevent attempting the rest.
pub fn relocate_batch(members: &[SequenceMember], destination: &Path) -> Vec<MoveOutcome> {
    members
        .iter()
        .map(|member| MoveOutcome {
            member: member.clone(),
            result: move_into(&member.path, destination),
        })
        .collect()
}

fn move_into(source: &Path, destination: &Path) -> Result<PathBuf, MoveError> {
    let name = source.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("source path has no file name: {}", source.display()),
        )
    })?;

    let target = destination.join(name);
    if target.exists() {
        return Err(MoveError::AlreadyExists(target));
    }

    // rename cannot cross filesystems; fall back to copy + delete.
    if fs::rename(source, &target).is_err() {
        fs::copy(source, &target)?;
        fs::remove_file(source)?;
    }
    Ok(target)
}

/// Resolve and create the output folder for a run.
///
/// The folder is placed inside the scanned root, so repeated runs against
/// the same root reuse it. An empty name is a configuration error.
pub fn prepare_destination(root: &Path, name: &str) -> Result<PathBuf, RunError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RunError::EmptyDestinationName);
    }

    let destination = root.join(name);
    fs::create_dir_all(&destination).map_err(|source| RunError::DestinationUnavailable {
        path: destination.clone(),
        source,
    })?;
    Ok(destination)
}
