//! Per-image record construction for Polesort
//!
//! An [`ImageRecord`] carries the two capture-time tags the classifier
//! consumes, extracted once per file and immutable afterwards.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::xmp;

/// XMP tag carrying the gimbal pitch in degrees.
pub const GIMBAL_PITCH_TAG: &str = "drone-dji:GimbalPitchDegree";
/// XMP tag naming the camera the shot was taken with.
pub const IMAGE_SOURCE_TAG: &str = "drone-dji:ImageSource";

/// Which onboard camera produced a shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSourceKind {
    WideCamera,
    ZoomCamera,
    Unknown,
}

impl ImageSourceKind {
    fn from_tag(value: Option<&str>) -> Self {
        match value {
            Some("WideCamera") => ImageSourceKind::WideCamera,
            Some("ZoomCamera") => ImageSourceKind::ZoomCamera,
            _ => ImageSourceKind::Unknown,
        }
    }

    /// Check whether this shot came from the zoom camera.
    pub fn is_zoom(&self) -> bool {
        matches!(self, ImageSourceKind::ZoomCamera)
    }
}

/// One image of the input stream, with its extracted tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    /// Index of this image in the ordered input list.
    pub position: usize,
    /// Gimbal pitch in degrees, when present and numeric.
    pub gimbal_pitch: Option<f64>,
    pub source: ImageSourceKind,
}

impl ImageRecord {
    /// Build a record by extracting the embedded packet from `path`.
    ///
    /// Fails when the file is unreadable or carries no recognizable packet;
    /// a packet with missing or malformed tag values still succeeds, with
    /// the affected fields absent.
    pub fn from_file(path: &Path, position: usize) -> Result<Self> {
        let packet = xmp::extract_packet(path)?
            .ok_or_else(|| anyhow!("no metadata packet found in {}", path.display()))?;

        let gimbal_pitch = xmp::tag_value(&packet.xmp, GIMBAL_PITCH_TAG).and_then(|raw| {
            match raw.parse::<f64>() {
                Ok(pitch) => Some(pitch),
                Err(_) => {
                    tracing::debug!(value = raw, "gimbal pitch tag is not numeric");
                    None
                }
            }
        });

        let source = ImageSourceKind::from_tag(xmp::tag_value(&packet.xmp, IMAGE_SOURCE_TAG));

        Ok(Self {
            path: path.to_path_buf(),
            position,
            gimbal_pitch,
            source,
        })
    }
}
