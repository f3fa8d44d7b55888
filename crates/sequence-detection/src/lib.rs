//! Pole inspection sequence detection library for Polesort
//!
//! This crate provides the core of Polesort: extracting the proprietary XMP
//! metadata packet drone images carry, classifying an ordered image stream
//! into pole inspection sequences (NADIR reference, orbit run, closing zoom
//! shot), and relocating each completed sequence into an output folder.
//!
//! The pass is synchronous, single-owner, and thread-agnostic: callers feed
//! it an ordered file list, an event sink, and a cancellation token, and own
//! whatever threading sits around it.

pub mod classify;
pub mod error;
pub mod events;
pub mod record;
pub mod relocate;
pub mod scan;
pub mod xmp;

pub use classify::{
    CancelToken, RunTally, SequenceClassifier, SequenceConfig, SequenceMember, ShotRole,
};
pub use error::RunError;
pub use events::{EventSink, NullSink, RunEvent, Severity};
pub use record::{ImageRecord, ImageSourceKind};
pub use relocate::{prepare_destination, relocate_batch, MoveError, MoveOutcome};
pub use scan::collect_images;
pub use xmp::{extract_packet, tag_value, MetadataPacket};
