//! Per-track extraction pipeline
//!
//! Common metadata comes from Symphonia format detection (no decode),
//! Serato markers from the native tag frames: ID3v2 GEOB for MP3/WAV, Vorbis
//! comments for FLAC. Extraction runs on the blocking pool, bounded by a
//! semaphore and a per-file timeout; results go back into the builder in plan
//! order.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use id3::TagLike;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey, Tag};
use symphonia::core::probe::Hint;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use serato_core::library::track_record;
use serato_core::{
    EncapsulatedObject, Error, FileType, LibraryBuilder, NativeFrames, PendingTrack,
    TrackMetadata, TrackRecord,
};

use crate::config::Config;

/// Raw tag keys that carry the musical key
const KEY_TAGS: [&str; 3] = ["TKEY", "INITIALKEY", "KEY"];

/// Metadata plus cue points of one file
pub fn load_track(track: &PendingTrack) -> serato_core::Result<TrackRecord> {
    let path = &track.absolute_path;
    let metadata = read_metadata(path, track.file_type)?;
    let frames = match read_native_frames(path, track.file_type) {
        Ok(frames) => frames,
        Err(e) => {
            warn!("Cannot read tags of {:?}: {}", path, e);
            empty_frames(track.file_type)
        }
    };
    if frames.is_empty() {
        debug!("No native frames in {:?}", path);
    }
    Ok(track_record(path, metadata, &frames))
}

/// Read common metadata without decoding audio
pub fn read_metadata(path: &Path, file_type: FileType) -> serato_core::Result<TrackMetadata> {
    let file = File::open(path)?;
    let file_size = file.metadata()?.len();
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let detected = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Metadata(format!("{:?}: {}", path, e)))?;

    let mut metadata = TrackMetadata {
        file_size,
        file_type: Some(file_type),
        ..Default::default()
    };

    let mut format = detected.format;
    if let Some(track) = format.default_track() {
        let params = &track.codec_params;
        metadata.sample_rate = params.sample_rate;
        if let (Some(frames), Some(rate)) = (params.n_frames, params.sample_rate) {
            if rate > 0 {
                metadata.duration_secs = Some(frames as f64 / rate as f64);
            }
        }
    }
    metadata.bitrate = metadata
        .duration_secs
        .filter(|&secs| secs > 0.0)
        .map(|secs| (file_size as f64 * 8.0 / secs / 1000.0).round() as u32);

    // ID3 ahead of the stream lands in the detection metadata, the rest in the format
    let mut leading_metadata = detected.metadata;
    if let Some(container) = leading_metadata.get() {
        if let Some(revision) = container.current() {
            apply_tags(&mut metadata, revision.tags());
        }
    }
    if let Some(revision) = format.metadata().current() {
        apply_tags(&mut metadata, revision.tags());
    }

    if metadata.title.is_none() {
        metadata.title = path
            .file_stem()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string());
    }

    Ok(metadata)
}

fn apply_tags(metadata: &mut TrackMetadata, tags: &[Tag]) {
    for tag in tags {
        let value = tag.value.to_string();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match tag.std_key {
            Some(StandardTagKey::TrackTitle) => metadata.title = Some(value.to_string()),
            Some(StandardTagKey::Artist) => metadata.artist = Some(value.to_string()),
            Some(StandardTagKey::Album) => metadata.album = Some(value.to_string()),
            Some(StandardTagKey::Genre) => metadata.genre = Some(value.to_string()),
            Some(StandardTagKey::Comment) => metadata.comment = Some(value.to_string()),
            Some(StandardTagKey::Bpm) => {
                if let Ok(bpm) = value.parse::<f64>() {
                    metadata.bpm = Some(bpm);
                }
            }
            _ => {
                if KEY_TAGS.iter().any(|k| tag.key.eq_ignore_ascii_case(k)) {
                    metadata.key = Some(value.to_string());
                }
            }
        }
    }
}

fn empty_frames(file_type: FileType) -> NativeFrames {
    match file_type {
        FileType::Flac => NativeFrames::Vorbis(Vec::new()),
        FileType::Mp3 | FileType::Wav => NativeFrames::Id3(Vec::new()),
    }
}

/// Frames that may hold Serato markers; a file without a tag has none
pub fn read_native_frames(path: &Path, file_type: FileType) -> anyhow::Result<NativeFrames> {
    match file_type {
        FileType::Mp3 | FileType::Wav => {
            let read = if file_type == FileType::Wav {
                id3::Tag::read_from_wav_path(path)
            } else {
                id3::Tag::read_from_path(path)
            };
            let tag = match read {
                Ok(tag) => tag,
                Err(e) if matches!(e.kind, id3::ErrorKind::NoTag) => {
                    return Ok(empty_frames(file_type));
                }
                Err(e) => return Err(e.into()),
            };
            let objects = tag
                .encapsulated_objects()
                .map(|geob| EncapsulatedObject {
                    description: geob.description.clone(),
                    data: geob.data.clone(),
                })
                .collect();
            Ok(NativeFrames::Id3(objects))
        }
        FileType::Flac => {
            let tag = metaflac::Tag::read_from_path(path)?;
            let comments = tag
                .vorbis_comments()
                .map(|vorbis| {
                    vorbis
                        .comments
                        .iter()
                        .flat_map(|(field, values)| {
                            values.iter().map(move |v| (field.clone(), v.clone()))
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(NativeFrames::Vorbis(comments))
        }
    }
}

/// Extract planned tracks concurrently and insert them in plan order
pub async fn extract_tracks(
    builder: &mut LibraryBuilder,
    pending: Vec<PendingTrack>,
    config: &Config,
) -> usize {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
    let timeout = Duration::from_secs(config.timeout_secs);
    let total = pending.len();

    let mut handles = Vec::with_capacity(total);
    for track in pending {
        let semaphore = Arc::clone(&semaphore);
        let job = track.clone();
        let handle = tokio::spawn(async move {
            let permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| Error::Metadata(e.to_string()))?;
            // The permit lives as long as the blocking work, even past a timeout
            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                load_track(&job)
            });
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(Error::Metadata(format!("extraction task failed: {}", e))),
                Err(_) => Err(Error::Metadata(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                ))),
            }
        });
        handles.push((track, handle));
    }

    let mut loaded = 0;
    for (index, (track, handle)) in handles.into_iter().enumerate() {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Metadata(format!("extraction task failed: {}", e))),
        };
        if builder.insert(track, result).is_some() {
            loaded += 1;
        }
        if (index + 1) % 100 == 0 {
            info!("Extracted {}/{} tracks", index + 1, total);
        }
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use serato_core::container::MARKERS2_GEOB_DESCRIPTION;
    use serato_core::{Library, Playlist};
    use std::path::PathBuf;
    use symphonia::core::meta::Value;
    use tempfile::TempDir;

    /// 16-bit mono PCM at 8 kHz
    fn minimal_wav(seconds: u32) -> Vec<u8> {
        let rate: u32 = 8000;
        let samples = vec![0u8; (rate * seconds * 2) as usize];

        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&(36 + samples.len() as u32).to_le_bytes());
        data.extend_from_slice(b"WAVEfmt ");
        data.extend_from_slice(&16u32.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&rate.to_le_bytes());
        data.extend_from_slice(&(rate * 2).to_le_bytes());
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&16u16.to_le_bytes());
        data.extend_from_slice(b"data");
        data.extend_from_slice(&(samples.len() as u32).to_le_bytes());
        data.extend(samples);
        data
    }

    fn config(root: &Path, max_concurrent: usize) -> Config {
        Config {
            serato_dir: PathBuf::from("_Serato_"),
            library_root: root.to_path_buf(),
            output: None,
            format: OutputFormat::Xml,
            max_concurrent,
            timeout_secs: 30,
            memory_cues: false,
        }
    }

    fn keys(library: &Library) -> Vec<(String, u32)> {
        library.tracks.iter().map(|e| (e.path.clone(), e.key)).collect()
    }

    #[tokio::test]
    async fn test_extract_tracks_in_plan_order() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("one.wav"), minimal_wav(1)).unwrap();
        std::fs::write(tmp.path().join("two.wav"), minimal_wav(2)).unwrap();
        std::fs::write(tmp.path().join("three.wav"), minimal_wav(1)).unwrap();
        std::fs::write(tmp.path().join("bad.mp3"), b"not audio at all").unwrap();
        let playlists = vec![
            Playlist::new("A", vec!["two.wav".into(), "bad.mp3".into(), "one.wav".into()]),
            Playlist::new("B", vec!["three.wav".into(), "two.wav".into(), "gone.wav".into()]),
        ];

        let mut sequential = LibraryBuilder::new(tmp.path());
        let mut source = |track: &PendingTrack| load_track(track);
        for playlist in playlists.clone() {
            sequential.add_playlist(playlist, &mut source);
        }
        let sequential = sequential.build();
        assert_eq!(
            keys(&sequential),
            vec![
                ("two.wav".to_string(), 1),
                ("one.wav".to_string(), 2),
                ("three.wav".to_string(), 3)
            ]
        );

        for max_concurrent in [1, 3] {
            let mut builder = LibraryBuilder::new(tmp.path());
            let pending = builder.plan(&playlists);
            assert_eq!(pending.len(), 4);

            let config = config(tmp.path(), max_concurrent);
            let loaded = extract_tracks(&mut builder, pending, &config).await;
            assert_eq!(loaded, 3);
            assert_eq!(builder.skipped(), 2);

            builder.extend_playlists(playlists.clone());
            let library = builder.build();
            assert_eq!(keys(&library), keys(&sequential));
            assert!(!library.tracks.contains("bad.mp3"));

            let two = library.tracks.get("two.wav").unwrap();
            assert_eq!(two.record.metadata.sample_rate, Some(8000));
            assert_eq!(two.record.metadata.duration_secs, Some(2.0));
            assert_eq!(two.record.metadata.title.as_deref(), Some("two"));
            assert!(two.record.cue_points.is_empty());
            assert_eq!(library.playlist_keys(&library.playlists[1]), vec![3, 1]);
        }
    }

    #[test]
    fn test_apply_tags() {
        let tags = vec![
            Tag::new(Some(StandardTagKey::TrackTitle), "TIT2", Value::String("Title".into())),
            Tag::new(Some(StandardTagKey::Artist), "TPE1", Value::String("Artist".into())),
            Tag::new(Some(StandardTagKey::Bpm), "TBPM", Value::String("124.5".into())),
            Tag::new(None, "TKEY", Value::String("8A".into())),
            Tag::new(Some(StandardTagKey::Genre), "TCON", Value::String("  ".into())),
        ];
        let mut metadata = TrackMetadata::default();
        apply_tags(&mut metadata, &tags);

        assert_eq!(metadata.title.as_deref(), Some("Title"));
        assert_eq!(metadata.artist.as_deref(), Some("Artist"));
        assert_eq!(metadata.bpm, Some(124.5));
        assert_eq!(metadata.key.as_deref(), Some("8A"));
        assert_eq!(metadata.genre, None);
    }

    #[test]
    fn test_vorbis_initial_key() {
        let tags = vec![Tag::new(None, "initialkey", Value::String("Am".into()))];
        let mut metadata = TrackMetadata::default();
        apply_tags(&mut metadata, &tags);
        assert_eq!(metadata.key.as_deref(), Some("Am"));
    }

    #[test]
    fn test_mp3_without_tag_has_no_frames() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.mp3");
        std::fs::write(&path, [0u8; 64]).unwrap();

        let frames = read_native_frames(&path, FileType::Mp3).unwrap();
        assert_eq!(frames, NativeFrames::Id3(Vec::new()));
    }

    #[test]
    fn test_mp3_geob_frames() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tagged.mp3");
        std::fs::write(&path, [0u8; 64]).unwrap();

        let mut tag = id3::Tag::new();
        tag.add_frame(id3::frame::EncapsulatedObject {
            mime_type: "application/octet-stream".to_string(),
            filename: String::new(),
            description: MARKERS2_GEOB_DESCRIPTION.to_string(),
            data: vec![0x01, 0x01, b'A', b'Q', b'E', b'A'],
        });
        tag.write_to_path(&path, id3::Version::Id3v24).unwrap();

        match read_native_frames(&path, FileType::Mp3).unwrap() {
            NativeFrames::Id3(objects) => {
                assert_eq!(objects.len(), 1);
                assert_eq!(objects[0].description, MARKERS2_GEOB_DESCRIPTION);
                assert_eq!(objects[0].data, vec![0x01, 0x01, b'A', b'Q', b'E', b'A']);
            }
            other => panic!("expected ID3 frames, got {:?}", other),
        }
    }

    /// `fLaC`, a zeroed STREAMINFO and a last VORBIS_COMMENT block
    fn minimal_flac(comments: &[&str]) -> Vec<u8> {
        let mut data = b"fLaC".to_vec();
        data.extend_from_slice(&[0x00, 0x00, 0x00, 34]);
        data.extend_from_slice(&[0u8; 34]);

        let vendor = b"test";
        let mut block = (vendor.len() as u32).to_le_bytes().to_vec();
        block.extend_from_slice(vendor);
        block.extend_from_slice(&(comments.len() as u32).to_le_bytes());
        for comment in comments {
            block.extend_from_slice(&(comment.len() as u32).to_le_bytes());
            block.extend_from_slice(comment.as_bytes());
        }
        let length = (block.len() as u32).to_be_bytes();
        data.push(0x84);
        data.extend_from_slice(&length[1..]);
        data.extend(block);
        data
    }

    #[test]
    fn test_flac_vorbis_comments() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("track.flac");
        std::fs::write(&path, minimal_flac(&["ARTIST=Someone", "SERATO_MARKERS_V2=YXBw"])).unwrap();

        match read_native_frames(&path, FileType::Flac).unwrap() {
            NativeFrames::Vorbis(comments) => {
                assert!(comments
                    .iter()
                    .any(|(field, value)| field == "SERATO_MARKERS_V2" && value == "YXBw"));
                assert_eq!(comments.len(), 2);
            }
            other => panic!("expected Vorbis comments, got {:?}", other),
        }
    }
}
