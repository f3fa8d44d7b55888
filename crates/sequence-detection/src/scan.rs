//! Image discovery for Polesort
//!
//! Classification depends on a fixed, deterministic input order, so the walk
//! is fully specified: within every directory, files sorted by name come
//! first, then subdirectories are descended in name order.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::RunError;

/// Extensions accepted as input images, matched case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Recursively collect image files under `root` in deterministic order.
///
/// An unreadable root is fatal; errors on nested entries (permissions,
/// vanished files) are skipped with a diagnostic.
pub fn collect_images(root: &Path) -> Result<Vec<PathBuf>, RunError> {
    // Surface a bad root before the run starts rather than as an empty scan.
    fs::read_dir(root).map_err(|source| RunError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let walker = WalkDir::new(root).sort_by(|a, b| {
        // Files before directories, each group in name order.
        a.file_type()
            .is_dir()
            .cmp(&b.file_type().is_dir())
            .then_with(|| a.file_name().cmp(b.file_name()))
    });

    let mut images = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(%error, "skipping unreadable entry during scan");
                continue;
            }
        };
        if entry.file_type().is_file() && is_image(entry.path()) {
            images.push(entry.into_path());
        }
    }
    Ok(images)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|accepted| extension.eq_ignore_ascii_case(accepted))
        })
        .unwrap_or(false)
}
