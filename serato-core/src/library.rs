//! Building the intermediary library model
//!
//! Playlists reference tracks by the path their source wrote. Each distinct
//! path is resolved and loaded once, in first-seen order (playlist order,
//! then track order), and gets the next sequential key starting at 1.
//!
//! Loading can be driven two ways:
//! - [`LibraryBuilder::add_playlist`] loads synchronously through a
//!   [`TrackSource`].
//! - [`LibraryBuilder::plan`] lists what needs loading; the caller loads in
//!   any order or in parallel and hands results back to
//!   [`LibraryBuilder::insert`] in plan order. Keys come out the same.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::container::{extract_markers2, NativeFrames};
use crate::crate_file::{read_crate_file, CRATE_EXTENSION};
use crate::error::{Error, Result};
use crate::markers::{cue_points, decode_markers};
use crate::track::{Cue, FileType, Playlist, TrackMetadata, TrackRecord};

pub const SUBCRATES_DIR: &str = "Subcrates";

/// A playlist path that resolved to a supported, existing file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTrack {
    /// Path as written in the playlist
    pub path: String,
    pub absolute_path: PathBuf,
    pub file_type: FileType,
}

/// Per-track metadata and marker extraction
pub trait TrackSource {
    fn load_track(&mut self, track: &PendingTrack) -> Result<TrackRecord>;
}

impl<F> TrackSource for F
where
    F: FnMut(&PendingTrack) -> Result<TrackRecord>,
{
    fn load_track(&mut self, track: &PendingTrack) -> Result<TrackRecord> {
        self(track)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackEntry {
    pub key: u32,
    pub path: String,
    pub absolute_path: PathBuf,
    pub record: TrackRecord,
}

/// Playlist path -> track, keys in insertion order
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct TrackMap {
    entries: Vec<TrackEntry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl TrackMap {
    pub fn get(&self, path: &str) -> Option<&TrackEntry> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = &TrackEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, path: String, absolute_path: PathBuf, record: TrackRecord) -> u32 {
        if let Some(existing) = self.get(&path) {
            return existing.key;
        }
        let key = self.entries.len() as u32 + 1;
        self.index.insert(path.clone(), self.entries.len());
        self.entries.push(TrackEntry {
            key,
            path,
            absolute_path,
            record,
        });
        key
    }
}

/// Result of a conversion run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Library {
    pub playlists: Vec<Playlist>,
    pub tracks: TrackMap,
}

impl Library {
    /// Keys of a playlist's tracks; paths missing from the map are dropped
    pub fn playlist_keys(&self, playlist: &Playlist) -> Vec<u32> {
        playlist
            .tracks
            .iter()
            .filter_map(|path| self.tracks.get(path))
            .map(|entry| entry.key)
            .collect()
    }
}

pub struct LibraryBuilder {
    root: PathBuf,
    playlists: Vec<Playlist>,
    tracks: TrackMap,
    /// Paths that failed to resolve or load; never retried
    rejected: HashSet<String>,
}

impl LibraryBuilder {
    /// `root` is what relative playlist paths are resolved against
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            playlists: Vec::new(),
            tracks: TrackMap::default(),
            rejected: HashSet::new(),
        }
    }

    /// Check that a playlist path points at a supported audio file
    pub fn resolve(&self, path: &str) -> Result<PendingTrack> {
        let candidate = Path::new(path);
        let absolute_path = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let file_type = FileType::from_path(&absolute_path)
            .ok_or_else(|| Error::UnsupportedFile(absolute_path.clone()))?;
        if !absolute_path.is_file() {
            return Err(Error::UnsupportedFile(absolute_path));
        }

        Ok(PendingTrack {
            path: path.to_string(),
            absolute_path,
            file_type,
        })
    }

    fn is_settled(&self, path: &str) -> bool {
        self.tracks.contains(path) || self.rejected.contains(path)
    }

    /// Load every new track of `playlist`, then keep the playlist
    pub fn add_playlist<S: TrackSource>(&mut self, playlist: Playlist, source: &mut S) {
        for path in &playlist.tracks {
            if self.is_settled(path) {
                continue;
            }
            match self.resolve(path) {
                Ok(pending) => {
                    let record = source.load_track(&pending);
                    self.insert(pending, record);
                }
                Err(e) => {
                    debug!("Skipping {:?}: {}", path, e);
                    self.rejected.insert(path.clone());
                }
            }
        }
        self.playlists.push(playlist);
    }

    /// Tracks that still need loading, deduplicated, in key order
    ///
    /// Paths that do not resolve are rejected here, as in
    /// [`add_playlist`](Self::add_playlist).
    pub fn plan(&mut self, playlists: &[Playlist]) -> Vec<PendingTrack> {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for path in playlists.iter().flat_map(|p| p.tracks.iter()) {
            if self.is_settled(path) || !seen.insert(path.as_str()) {
                continue;
            }
            match self.resolve(path) {
                Ok(track) => pending.push(track),
                Err(e) => {
                    debug!("Skipping {:?}: {}", path, e);
                    self.rejected.insert(path.clone());
                }
            }
        }
        pending
    }

    /// Record the outcome of loading a planned track
    ///
    /// Returns the assigned key, or `None` if loading failed.
    pub fn insert(&mut self, pending: PendingTrack, record: Result<TrackRecord>) -> Option<u32> {
        match record {
            Ok(record) => Some(self.tracks.insert(pending.path, pending.absolute_path, record)),
            Err(e) => {
                warn!("Failed to load {:?}: {}", pending.absolute_path, e);
                self.rejected.insert(pending.path);
                None
            }
        }
    }

    /// Keep playlists whose tracks were loaded through [`plan`](Self::plan)
    pub fn extend_playlists<I: IntoIterator<Item = Playlist>>(&mut self, playlists: I) {
        self.playlists.extend(playlists);
    }

    /// Distinct paths that failed to resolve or load so far
    pub fn skipped(&self) -> usize {
        self.rejected.len()
    }

    pub fn build(self) -> Library {
        info!(
            "Library: {} playlists, {} tracks, {} skipped paths",
            self.playlists.len(),
            self.tracks.len(),
            self.skipped()
        );
        Library {
            playlists: self.playlists,
            tracks: self.tracks,
        }
    }
}

/// Hot cues stored in a file's native tags
pub fn read_cue_points(frames: &NativeFrames) -> Result<Vec<Cue>> {
    match extract_markers2(frames)? {
        Some(buffer) => Ok(cue_points(decode_markers(&buffer)?)),
        None => Ok(Vec::new()),
    }
}

/// Combine tag-reader output into a record
///
/// Marker failures only cost the cue points; the metadata is kept.
pub fn track_record(path: &Path, metadata: TrackMetadata, frames: &NativeFrames) -> TrackRecord {
    let cue_points = match read_cue_points(frames) {
        Ok(cues) => {
            if cues.is_empty() {
                debug!("No Serato cue points in {:?}", path);
            }
            cues
        }
        Err(e) => {
            warn!("Ignoring Serato markers of {:?}: {}", path, e);
            Vec::new()
        }
    };
    TrackRecord {
        metadata,
        cue_points,
    }
}

/// `.crate` files of a Serato directory, sorted by name
///
/// Fails before anything is decoded if `Subcrates` is missing.
pub fn discover_crates<P: AsRef<Path>>(serato_dir: P) -> Result<Vec<PathBuf>> {
    let subcrates = serato_dir.as_ref().join(SUBCRATES_DIR);
    if !subcrates.is_dir() {
        return Err(Error::MissingSubcrateDirectory(subcrates));
    }

    let crates = WalkDir::new(&subcrates)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(CRATE_EXTENSION))
        })
        .collect();
    Ok(crates)
}

/// Decode every crate of a Serato directory; one bad crate fails the run
pub fn load_playlists<P: AsRef<Path>>(serato_dir: P) -> Result<Vec<Playlist>> {
    let mut playlists = Vec::new();
    for path in discover_crates(serato_dir)? {
        let playlist = read_crate_file(&path)?;
        debug!("Crate {:?}: {} tracks", playlist.name, playlist.len());
        playlists.push(playlist);
    }
    Ok(playlists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::tests::geob_body;
    use crate::container::{EncapsulatedObject, MARKERS2_GEOB_DESCRIPTION};
    use crate::crate_file::tests::sample_crate;
    use crate::markers::tests::{entry, markers_buffer, CUE_PAYLOAD};
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"audio").unwrap();
    }

    fn record_for(track: &PendingTrack) -> TrackRecord {
        TrackRecord {
            metadata: TrackMetadata {
                title: Some(track.path.clone()),
                file_type: Some(track.file_type),
                ..Default::default()
            },
            cue_points: Vec::new(),
        }
    }

    #[test]
    fn test_shared_track_loaded_once() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "A.mp3");
        touch(tmp.path(), "B.flac");

        let mut calls: Vec<String> = Vec::new();
        let mut source = |track: &PendingTrack| -> Result<TrackRecord> {
            calls.push(track.path.clone());
            Ok(record_for(track))
        };

        let mut builder = LibraryBuilder::new(tmp.path());
        builder.add_playlist(Playlist::new("One", vec!["A.mp3".into()]), &mut source);
        builder.add_playlist(
            Playlist::new("Two", vec!["B.flac".into(), "A.mp3".into()]),
            &mut source,
        );
        let library = builder.build();

        assert_eq!(calls, vec!["A.mp3", "B.flac"]);
        assert_eq!(library.tracks.len(), 2);
        assert_eq!(library.tracks.get("A.mp3").unwrap().key, 1);
        assert_eq!(library.tracks.get("B.flac").unwrap().key, 2);
        assert_eq!(library.playlists.len(), 2);
        assert_eq!(library.playlist_keys(&library.playlists[1]), vec![2, 1]);
    }

    #[test]
    fn test_unresolvable_paths_dropped() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "Music/ok.wav");
        touch(tmp.path(), "Music/video.mp4");

        let mut calls = 0;
        let mut source = |track: &PendingTrack| -> Result<TrackRecord> {
            calls += 1;
            Ok(record_for(track))
        };

        let playlist = Playlist::new(
            "Mixed",
            vec![
                "Music/missing.mp3".into(),
                "Music/video.mp4".into(),
                "Music/ok.wav".into(),
                "Music/missing.mp3".into(),
            ],
        );
        let mut builder = LibraryBuilder::new(tmp.path());
        builder.add_playlist(playlist, &mut source);
        let library = builder.build();

        assert_eq!(calls, 1);
        assert_eq!(library.tracks.len(), 1);
        assert_eq!(library.tracks.get("Music/ok.wav").unwrap().key, 1);
        // Playlist keeps its paths; only the key lookup drops them
        assert_eq!(library.playlists[0].tracks.len(), 4);
        assert_eq!(library.playlist_keys(&library.playlists[0]), vec![1]);
    }

    #[test]
    fn test_absolute_paths_kept() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "x.mp3");
        let absolute = tmp.path().join("x.mp3");

        let builder = LibraryBuilder::new("/somewhere/else");
        let pending = builder.resolve(absolute.to_str().unwrap()).unwrap();
        assert_eq!(pending.absolute_path, absolute);
        assert_eq!(pending.file_type, FileType::Mp3);
    }

    #[test]
    fn test_failed_load_not_retried() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "bad.mp3");

        let mut calls = 0;
        let mut source = |_: &PendingTrack| -> Result<TrackRecord> {
            calls += 1;
            Err(Error::Metadata("unreadable".into()))
        };

        let mut builder = LibraryBuilder::new(tmp.path());
        builder.add_playlist(Playlist::new("A", vec!["bad.mp3".into()]), &mut source);
        builder.add_playlist(Playlist::new("B", vec!["bad.mp3".into()]), &mut source);
        let library = builder.build();

        assert_eq!(calls, 1);
        assert!(library.tracks.is_empty());
    }

    #[test]
    fn test_plan_matches_sequential_keys() {
        let tmp = TempDir::new().unwrap();
        for name in ["a.mp3", "b.mp3", "c.flac", "d.wav"] {
            touch(tmp.path(), name);
        }
        let playlists = vec![
            Playlist::new("P1", vec!["c.flac".into(), "a.mp3".into(), "nope.mp3".into()]),
            Playlist::new("P2", vec!["a.mp3".into(), "d.wav".into(), "b.mp3".into()]),
        ];

        let mut sequential = LibraryBuilder::new(tmp.path());
        let mut source = |track: &PendingTrack| -> Result<TrackRecord> { Ok(record_for(track)) };
        for playlist in playlists.clone() {
            sequential.add_playlist(playlist, &mut source);
        }
        let sequential = sequential.build();

        let mut planned = LibraryBuilder::new(tmp.path());
        let pending = planned.plan(&playlists);
        let order: Vec<_> = pending.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(order, vec!["c.flac", "a.mp3", "d.wav", "b.mp3"]);

        // Load in reverse, insert in plan order
        let mut loaded: Vec<_> = pending
            .iter()
            .rev()
            .map(|p| (p.clone(), Ok(record_for(p))))
            .collect();
        loaded.reverse();
        for (track, record) in loaded {
            planned.insert(track, record);
        }
        planned.extend_playlists(playlists);
        let planned = planned.build();

        let keys = |library: &Library| -> Vec<(String, u32)> {
            library.tracks.iter().map(|e| (e.path.clone(), e.key)).collect()
        };
        assert_eq!(keys(&planned), keys(&sequential));
        assert_eq!(keys(&planned)[0], ("c.flac".to_string(), 1));
    }

    #[test]
    fn test_plan_counts_unresolvable_paths() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.mp3");
        touch(tmp.path(), "clip.mp4");
        let playlists = vec![
            Playlist::new("P1", vec!["a.mp3".into(), "gone.mp3".into()]),
            Playlist::new("P2", vec!["clip.mp4".into(), "gone.mp3".into()]),
        ];

        let mut planned = LibraryBuilder::new(tmp.path());
        let pending = planned.plan(&playlists);
        assert_eq!(pending.len(), 1);
        assert_eq!(planned.skipped(), 2);
        // Already rejected, not resolved again
        assert!(planned.plan(&playlists[1..]).is_empty());
        assert_eq!(planned.skipped(), 2);

        let mut sequential = LibraryBuilder::new(tmp.path());
        let mut source = |track: &PendingTrack| -> Result<TrackRecord> { Ok(record_for(track)) };
        for playlist in playlists {
            sequential.add_playlist(playlist, &mut source);
        }
        assert_eq!(sequential.skipped(), planned.skipped());
    }

    #[test]
    fn test_insert_failure_returns_none() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.mp3");
        let mut builder = LibraryBuilder::new(tmp.path());
        let pending = builder.resolve("a.mp3").unwrap();

        assert_eq!(builder.insert(pending.clone(), Err(Error::Metadata("x".into()))), None);
        assert!(builder.plan(&[Playlist::new("P", vec!["a.mp3".into()])]).is_empty());
    }

    #[test]
    fn test_track_record_keeps_cues() {
        let markers = markers_buffer(&[entry("COLOR", &[0, 1, 2, 3]), entry("CUE", &CUE_PAYLOAD)]);
        let frames = NativeFrames::Id3(vec![EncapsulatedObject {
            description: MARKERS2_GEOB_DESCRIPTION.into(),
            data: geob_body(&markers),
        }]);

        let record = track_record(Path::new("a.mp3"), TrackMetadata::default(), &frames);
        assert_eq!(record.cue_points.len(), 1);
        assert_eq!(record.cue_points[0].position_ms, 32959);
    }

    #[test]
    fn test_track_record_bad_header_is_cue_less() {
        let mut markers = markers_buffer(&[entry("CUE", &CUE_PAYLOAD)]);
        markers[0] = 0x02;
        let frames = NativeFrames::Id3(vec![EncapsulatedObject {
            description: MARKERS2_GEOB_DESCRIPTION.into(),
            data: geob_body(&markers),
        }]);
        let metadata = TrackMetadata {
            title: Some("Kept".into()),
            ..Default::default()
        };

        assert!(matches!(read_cue_points(&frames), Err(Error::InvalidFrameHeader(_))));
        let record = track_record(Path::new("a.mp3"), metadata, &frames);
        assert!(record.cue_points.is_empty());
        assert_eq!(record.metadata.title.as_deref(), Some("Kept"));
    }

    #[test]
    fn test_missing_subcrates() {
        let tmp = TempDir::new().unwrap();
        let result = discover_crates(tmp.path());
        assert!(matches!(result, Err(Error::MissingSubcrateDirectory(_))));
    }

    #[test]
    fn test_discover_and_load_playlists() {
        let tmp = TempDir::new().unwrap();
        let subcrates = tmp.path().join(SUBCRATES_DIR);
        fs::create_dir_all(&subcrates).unwrap();
        fs::write(subcrates.join("b.crate"), sample_crate(&["x/2.mp3"])).unwrap();
        fs::write(subcrates.join("a.crate"), sample_crate(&["x/1.mp3"])).unwrap();
        fs::write(subcrates.join("notes.txt"), b"ignored").unwrap();

        let found = discover_crates(tmp.path()).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("a.crate"));

        let playlists = load_playlists(tmp.path()).unwrap();
        let names: Vec<_> = playlists.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_crate_aborts() {
        let tmp = TempDir::new().unwrap();
        let subcrates = tmp.path().join(SUBCRATES_DIR);
        fs::create_dir_all(&subcrates).unwrap();
        let mut data = sample_crate(&["x/1.mp3"]);
        data.truncate(data.len() - 2);
        fs::write(subcrates.join("broken.crate"), data).unwrap();

        assert!(matches!(load_playlists(tmp.path()), Err(Error::TruncatedPayload { .. })));
    }
}
