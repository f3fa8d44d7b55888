//! Pole sequence classification for Polesort
//!
//! This module implements the streaming state machine that walks an ordered
//! image list and recognizes pole inspection sequences: a straight-down
//! NADIR reference shot, a run of orbit shots, and a closing zoom shot.
//! Completed, valid sequences are relocated as a unit while the pass is
//! still running; everything else is tallied.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RunError;
use crate::events::{EventSink, RunEvent, Severity};
use crate::record::{ImageRecord, ImageSourceKind};
use crate::relocate;

/// Thresholds for sequence recognition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Pitch at or below which a shot counts as the straight-down NADIR
    /// reference (degrees)
    pub nadir_pitch_max: f64,
    /// Minimum number of orbit shots between NADIR and zoom for a sequence
    /// to be complete
    pub min_orbit_shots: u32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            // Inspection flight plans shoot the reference at -90 and never
            // orbit below -89, so -89 separates the two cleanly.
            nadir_pitch_max: -89.0,
            // A full orbit pass produces 25+ frames on the standard route.
            min_orbit_shots: 25,
        }
    }
}

/// The role a shot plays within its sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShotRole {
    Nadir,
    Orbit,
    Zoom,
}

/// One accepted member of the sequence currently being assembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceMember {
    pub path: PathBuf,
    pub role: ShotRole,
}

/// Tracking state for the sequence in progress. Exactly one instance is
/// live per pass; it is reset in full whenever a zoom record is accepted.
#[derive(Debug, Default)]
struct SequenceState {
    nadir_found: bool,
    zoom_found: bool,
    orbit_count: u32,
    pending: Vec<SequenceMember>,
}

impl SequenceState {
    fn reset(&mut self) {
        self.nadir_found = false;
        self.zoom_found = false;
        self.orbit_count = 0;
        self.pending.clear();
    }
}

/// Final counters of one classification run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTally {
    pub processed: u32,
    pub valid_sequences: u32,
    pub poles: u32,
    pub broken: u32,
    pub duplicate_nadir: u32,
    pub duplicate_zoom: u32,
    pub missing_nadir: u32,
    pub missing_zoom: u32,
}

/// Cooperative cancellation flag, checked between records.
///
/// Clone it, hand one copy to the pass and keep the other; `cancel` makes
/// the pass stop cleanly at the next record boundary with the tally it has
/// accumulated so far.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct SequenceClassifier {
    config: SequenceConfig,
}

impl SequenceClassifier {
    pub fn new(config: SequenceConfig) -> Self {
        Self { config }
    }

    /// Run one classification pass over `files`, in the order given.
    ///
    /// Emits progress, log, pole-count, tally, and completion events into
    /// `sink` as it goes. Valid sequences are relocated into `destination`
    /// the moment they complete. The returned tally is the same value the
    /// final [`RunEvent::Tally`] carries.
    ///
    /// Only configuration problems fail the pass, and they surface before
    /// any record is touched. Per-record extraction failures and per-file
    /// relocation failures are logged and tallied instead.
    pub fn classify(
        &self,
        files: &[PathBuf],
        destination: &Path,
        sink: &mut dyn EventSink,
        cancel: &CancelToken,
    ) -> Result<RunTally, RunError> {
        fs::create_dir_all(destination).map_err(|source| RunError::DestinationUnavailable {
            path: destination.to_path_buf(),
            source,
        })?;

        let total = files.len();
        let mut state = SequenceState::default();
        let mut tally = RunTally::default();

        for (position, path) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                sink.log(
                    Severity::Warning,
                    format!("Processing cancelled after {} of {} images", tally.processed, total),
                );
                break;
            }

            tally.processed += 1;

            let record = match ImageRecord::from_file(path, position) {
                Ok(record) => record,
                Err(error) => {
                    sink.log(
                        Severity::Error,
                        format!("Failed to extract metadata for {}: {error:#}", path.display()),
                    );
                    continue;
                }
            };

            if !self.apply_rules(&record, &mut state, &mut tally, destination, sink) {
                // Duplicate NADIR/zoom records are dropped whole: no state
                // change, no progress event.
                continue;
            }

            sink.emit(RunEvent::Progress(tally.processed as f64 / total as f64));
        }

        if state.nadir_found {
            let first = member_name(state.pending.first());
            let last = member_name(state.pending.last());
            sink.log(
                Severity::Error,
                format!("Incomplete sequence found between {first} and {last}."),
            );
        }

        sink.emit(RunEvent::Tally(tally));
        sink.emit(RunEvent::Finished);
        Ok(tally)
    }

    /// Evaluate the classification rules for one record, in fixed order.
    /// Returns false when the record was dropped as a duplicate.
    fn apply_rules(
        &self,
        record: &ImageRecord,
        state: &mut SequenceState,
        tally: &mut RunTally,
        destination: &Path,
        sink: &mut dyn EventSink,
    ) -> bool {
        // NADIR: the straight-down reference opens a sequence.
        if let Some(pitch) = record.gimbal_pitch {
            if pitch <= self.config.nadir_pitch_max {
                sink.log(
                    Severity::Notice,
                    format!("NADIR shot detected: {} with pitch {}", record.path.display(), pitch),
                );
                if state.nadir_found {
                    tally.duplicate_nadir += 1;
                    return false;
                }
                state.nadir_found = true;
                state.pending.push(SequenceMember {
                    path: record.path.clone(),
                    role: ShotRole::Nadir,
                });
            }
        }

        // Zoom: closes and resolves the sequence immediately.
        if record.source.is_zoom() {
            sink.log(
                Severity::Notice,
                format!("Zoom shot detected: {}", record.path.display()),
            );
            if state.zoom_found {
                tally.duplicate_zoom += 1;
                return false;
            }
            state.zoom_found = true;
            state.pending.push(SequenceMember {
                path: record.path.clone(),
                role: ShotRole::Zoom,
            });

            if state.nadir_found && state.orbit_count >= self.config.min_orbit_shots {
                tally.valid_sequences += 1;
                tally.poles += 1;
                self.relocate_sequence(&state.pending, destination, sink);
                sink.log(
                    Severity::Success,
                    format!("Valid pole sequence #{} completed.", tally.poles),
                );
                sink.emit(RunEvent::PoleCount(tally.poles));
            } else {
                sink.log(
                    Severity::Error,
                    "Incomplete sequence, missing orbit shots, NADIR, or Zoom.".to_string(),
                );
                tally.broken += 1;
                if !state.nadir_found {
                    tally.missing_nadir += 1;
                }
                // The symmetric missing-zoom case cannot arise here: a zoom
                // record was just accepted. The counter stays zero but is
                // still reported.
            }
            state.reset();
        }

        // Orbit: wide-camera shots circling the pole at non-NADIR pitch.
        if record.source == ImageSourceKind::WideCamera {
            if let Some(pitch) = record.gimbal_pitch {
                if pitch > self.config.nadir_pitch_max {
                    state.orbit_count += 1;
                    state.pending.push(SequenceMember {
                        path: record.path.clone(),
                        role: ShotRole::Orbit,
                    });
                    sink.log(
                        Severity::Info,
                        format!("Orbit shot detected: {}", record.path.display()),
                    );
                }
            }
        }

        true
    }

    fn relocate_sequence(
        &self,
        members: &[SequenceMember],
        destination: &Path,
        sink: &mut dyn EventSink,
    ) {
        let outcomes = relocate::relocate_batch(members, destination);
        let moved = outcomes.iter().filter(|outcome| outcome.result.is_ok()).count();
        for outcome in &outcomes {
            if let Err(error) = &outcome.result {
                sink.log(
                    Severity::Error,
                    format!("Failed to move {}: {}", outcome.member.path.display(), error),
                );
            }
        }
        sink.log(
            Severity::Info,
            format!("Moved {} of {} images to {}", moved, outcomes.len(), destination.display()),
        );
    }
}

fn member_name(member: Option<&SequenceMember>) -> String {
    member
        .map(|m| m.path.display().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RunEvent;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CollectSink {
        events: Vec<RunEvent>,
    }

    impl EventSink for CollectSink {
        fn emit(&mut self, event: RunEvent) {
            self.events.push(event);
        }
    }

    impl CollectSink {
        fn logs(&self) -> Vec<(Severity, &str)> {
            self.events
                .iter()
                .filter_map(|event| match event {
                    RunEvent::Log { severity, message } => Some((*severity, message.as_str())),
                    _ => None,
                })
                .collect()
        }

        fn progress(&self) -> Vec<f64> {
            self.events
                .iter()
                .filter_map(|event| match event {
                    RunEvent::Progress(fraction) => Some(*fraction),
                    _ => None,
                })
                .collect()
        }

        fn pole_counts(&self) -> Vec<u32> {
            self.events
                .iter()
                .filter_map(|event| match event {
                    RunEvent::PoleCount(count) => Some(*count),
                    _ => None,
                })
                .collect()
        }
    }

    /// Write a fake image: binary padding around an XMP packet carrying the
    /// requested tags.
    fn shot(dir: &Path, name: &str, pitch: Option<f64>, source: Option<&str>) -> PathBuf {
        let mut body = String::from("<x:xmpmeta");
        if let Some(pitch) = pitch {
            body.push_str(&format!(" drone-dji:GimbalPitchDegree=\"{pitch}\""));
        }
        if let Some(source) = source {
            body.push_str(&format!(" drone-dji:ImageSource=\"{source}\""));
        }
        body.push_str("></x:xmpmeta>");

        let mut data = Vec::from(&b"\xff\xd8\xff\xe1"[..]);
        data.extend_from_slice(body.as_bytes());
        data.extend_from_slice(b"\x00\xffpayload");

        let path = dir.join(name);
        fs::write(&path, data).unwrap();
        path
    }

    fn nadir(dir: &Path, name: &str) -> PathBuf {
        shot(dir, name, Some(-90.0), Some("WideCamera"))
    }

    fn orbit(dir: &Path, name: &str) -> PathBuf {
        shot(dir, name, Some(-10.0), Some("WideCamera"))
    }

    fn zoom(dir: &Path, name: &str) -> PathBuf {
        shot(dir, name, Some(-10.0), Some("ZoomCamera"))
    }

    fn run(files: &[PathBuf], destination: &Path) -> (RunTally, CollectSink) {
        let mut sink = CollectSink::default();
        let classifier = SequenceClassifier::new(SequenceConfig::default());
        let tally = classifier
            .classify(files, destination, &mut sink, &CancelToken::new())
            .unwrap();
        (tally, sink)
    }

    fn full_sequence(dir: &Path, prefix: &str) -> Vec<PathBuf> {
        let mut files = vec![nadir(dir, &format!("{prefix}_nadir.jpg"))];
        for i in 0..25 {
            files.push(orbit(dir, &format!("{prefix}_orbit{i:02}.jpg")));
        }
        files.push(zoom(dir, &format!("{prefix}_zoom.jpg")));
        files
    }

    #[test]
    fn test_valid_sequence_is_relocated_whole() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");
        let files = full_sequence(dir.path(), "p1");

        let (tally, sink) = run(&files, &dest);

        assert_eq!(tally.valid_sequences, 1);
        assert_eq!(tally.poles, 1);
        assert_eq!(tally.processed, 27);
        assert_eq!(tally.broken, 0);
        assert_eq!(sink.pole_counts(), vec![1]);

        // All 27 members moved as one batch.
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 27);
        assert!(!files[0].exists());
        assert!(!files[26].exists());
        assert_eq!(sink.progress().last().copied(), Some(1.0));
    }

    #[test]
    fn test_insufficient_orbits_break_the_sequence() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");

        let mut files = vec![nadir(dir.path(), "nadir.jpg")];
        for i in 0..10 {
            files.push(orbit(dir.path(), &format!("orbit{i:02}.jpg")));
        }
        files.push(zoom(dir.path(), "zoom.jpg"));

        let (tally, _) = run(&files, &dest);

        assert_eq!(tally.valid_sequences, 0);
        assert_eq!(tally.broken, 1);
        assert_eq!(tally.missing_nadir, 0);
        // Nothing relocated.
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
        assert!(files[0].exists());
    }

    #[test]
    fn test_zoom_without_nadir_counts_missing_nadir() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");
        let files = vec![zoom(dir.path(), "zoom.jpg")];

        let (tally, _) = run(&files, &dest);

        assert_eq!(tally.processed, 1);
        assert_eq!(tally.broken, 1);
        assert_eq!(tally.missing_nadir, 1);
        assert_eq!(tally.missing_zoom, 0);
    }

    #[test]
    fn test_duplicate_nadir_is_dropped_whole() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");
        let first = nadir(dir.path(), "nadir_a.jpg");
        let second = nadir(dir.path(), "nadir_b.jpg");
        let files = vec![first.clone(), second.clone()];

        let (tally, sink) = run(&files, &dest);

        assert_eq!(tally.duplicate_nadir, 1);
        assert_eq!(tally.processed, 2);
        // The dropped record emits no progress event.
        assert_eq!(sink.progress().len(), 1);

        // The open sequence holds only the first NADIR, so the end-of-stream
        // report names it twice.
        let incomplete = sink
            .logs()
            .into_iter()
            .find(|(_, message)| message.starts_with("Incomplete sequence found"))
            .expect("open sequence must be reported");
        assert!(incomplete.1.contains("nadir_a.jpg"));
        assert!(!incomplete.1.contains("nadir_b.jpg"));
    }

    #[test]
    fn test_duplicate_nadir_keeps_first_as_sequence_anchor() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");

        let mut files = vec![
            nadir(dir.path(), "nadir_a.jpg"),
            nadir(dir.path(), "nadir_b.jpg"),
        ];
        for i in 0..25 {
            files.push(orbit(dir.path(), &format!("orbit{i:02}.jpg")));
        }
        files.push(zoom(dir.path(), "zoom.jpg"));

        let (tally, _) = run(&files, &dest);

        assert_eq!(tally.valid_sequences, 1);
        assert_eq!(tally.duplicate_nadir, 1);
        // The first NADIR travels with the batch; the duplicate never joined
        // the sequence and stays behind.
        assert!(dest.join("nadir_a.jpg").exists());
        assert!(!dest.join("nadir_b.jpg").exists());
        assert!(dir.path().join("nadir_b.jpg").exists());
    }

    #[test]
    fn test_back_to_back_sequences_reset_cleanly() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");

        let mut files = full_sequence(dir.path(), "p1");
        files.extend(full_sequence(dir.path(), "p2"));

        let (tally, sink) = run(&files, &dest);

        assert_eq!(tally.valid_sequences, 2);
        assert_eq!(tally.poles, 2);
        assert_eq!(tally.broken, 0);
        assert_eq!(sink.pole_counts(), vec![1, 2]);
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 54);
    }

    #[test]
    fn test_extraction_failures_are_skipped_but_processed() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");

        let bare = dir.path().join("bare.jpg");
        fs::write(&bare, b"\xff\xd8 no packet").unwrap();
        let files = vec![bare, orbit(dir.path(), "orbit.jpg")];

        let (tally, sink) = run(&files, &dest);

        assert_eq!(tally.processed, 2);
        // The failed record emits no progress event.
        assert_eq!(sink.progress().len(), 1);
        assert!(sink
            .logs()
            .iter()
            .any(|(severity, message)| *severity == Severity::Error
                && message.starts_with("Failed to extract metadata")));
    }

    #[test]
    fn test_relocation_collision_is_isolated() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();
        // One orbit member's name is already taken at the destination.
        fs::write(dest.join("p1_orbit03.jpg"), b"previous run").unwrap();

        let files = full_sequence(dir.path(), "p1");
        let (tally, sink) = run(&files, &dest);

        assert_eq!(tally.valid_sequences, 1);
        assert!(sink
            .logs()
            .iter()
            .any(|(severity, message)| *severity == Severity::Error
                && message.contains("p1_orbit03.jpg")));
        // The colliding member stayed put; the other 26 moved.
        assert!(dir.path().join("p1_orbit03.jpg").exists());
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 27);
        assert!(sink
            .logs()
            .iter()
            .any(|(_, message)| message.starts_with("Moved 26 of 27 images")));
    }

    #[test]
    fn test_cancellation_stops_before_first_record() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");
        let files = full_sequence(dir.path(), "p1");

        let cancel = CancelToken::new();
        cancel.cancel();

        let mut sink = CollectSink::default();
        let classifier = SequenceClassifier::new(SequenceConfig::default());
        let tally = classifier
            .classify(&files, &dest, &mut sink, &cancel)
            .unwrap();

        assert_eq!(tally.processed, 0);
        assert!(files[0].exists());
        // The tally and completion events still close out the run.
        assert!(matches!(sink.events[sink.events.len() - 2], RunEvent::Tally(_)));
        assert!(matches!(sink.events[sink.events.len() - 1], RunEvent::Finished));
        assert!(sink
            .logs()
            .iter()
            .any(|(severity, _)| *severity == Severity::Warning));
    }

    #[test]
    fn test_empty_input_still_reports() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");

        let (tally, sink) = run(&[], &dest);

        assert_eq!(tally, RunTally::default());
        assert!(matches!(sink.events[0], RunEvent::Tally(_)));
        assert!(matches!(sink.events[1], RunEvent::Finished));
        assert!(dest.is_dir());
    }

    #[test]
    fn test_unterminated_sequence_reports_bounds() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");

        let files = vec![
            nadir(dir.path(), "nadir.jpg"),
            orbit(dir.path(), "orbit00.jpg"),
            orbit(dir.path(), "orbit01.jpg"),
        ];

        let (tally, sink) = run(&files, &dest);

        assert_eq!(tally.valid_sequences, 0);
        assert_eq!(tally.broken, 0);
        let incomplete = sink
            .logs()
            .into_iter()
            .find(|(_, message)| message.starts_with("Incomplete sequence found"))
            .expect("open sequence must be reported");
        assert!(incomplete.1.contains("nadir.jpg"));
        assert!(incomplete.1.contains("orbit01.jpg"));
    }
}
