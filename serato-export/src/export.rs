//! Library output
//!
//! Rekordbox XML layout:
//! - DJ_PLAYLISTS Version="1.0.0"
//!   - PRODUCT
//!   - COLLECTION: one TRACK per TrackMap entry, POSITION_MARK per hot cue
//!   - PLAYLISTS: ROOT folder node, one playlist node per crate, TRACK Key=
//!
//! JSON output is the library model as-is.

use std::io::Write;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use tracing::{debug, info};

use serato_core::library::TrackEntry;
use serato_core::{Cue, Library};

const PLAYLISTS_VERSION: &str = "1.0.0";
const PRODUCT_NAME: &str = "serato-export";
const PRODUCT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Node types under PLAYLISTS
const NODE_FOLDER: &str = "0";
const NODE_PLAYLIST: &str = "1";

/// POSITION_MARK Type for a cue
const MARK_CUE: &str = "0";
const MEMORY_CUE_NUM: &str = "-1";

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlOptions {
    /// Duplicate every hot cue as a memory cue
    pub memory_cues: bool,
}

/// `file://localhost` URL with every path segment percent-encoded
pub fn location(path: &Path) -> String {
    let path = path.to_string_lossy().replace('\\', "/");
    let encoded = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    if encoded.starts_with('/') {
        format!("file://localhost{}", encoded)
    } else {
        format!("file://localhost/{}", encoded)
    }
}

fn track_attrs(entry: &TrackEntry) -> Vec<(&'static str, String)> {
    let metadata = &entry.record.metadata;
    let mut attrs = vec![("TrackID", entry.key.to_string())];

    let optional = [
        ("Name", metadata.title.clone()),
        ("Artist", metadata.artist.clone()),
        ("Album", metadata.album.clone()),
        ("Genre", metadata.genre.clone()),
        ("Kind", metadata.file_type.map(|t| t.kind().to_string())),
        ("Size", Some(metadata.file_size.to_string())),
        ("TotalTime", metadata.duration_secs.map(|d| format!("{}", d.round() as u64))),
        ("AverageBpm", metadata.bpm.map(|b| format!("{:.2}", b))),
        ("Tonality", metadata.key.clone()),
        ("BitRate", metadata.bitrate.map(|b| b.to_string())),
        ("SampleRate", metadata.sample_rate.map(|r| r.to_string())),
        ("Comments", metadata.comment.clone()),
    ];
    attrs.extend(optional.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))));
    attrs.push(("Location", location(&entry.absolute_path)));
    attrs
}

fn mark_attrs(cue: &Cue, num: String, with_color: bool) -> Vec<(&'static str, String)> {
    let mut attrs = vec![
        ("Name", cue.label.clone().unwrap_or_default()),
        ("Type", MARK_CUE.to_string()),
        ("Start", format!("{:.3}", cue.position_secs())),
        ("Num", num),
    ];
    if with_color {
        attrs.push(("Red", cue.color.red.to_string()));
        attrs.push(("Green", cue.color.green.to_string()));
        attrs.push(("Blue", cue.color.blue.to_string()));
    }
    attrs
}

fn element(name: &str, attrs: &[(&str, String)]) -> BytesStart<'static> {
    let mut start = BytesStart::new(name.to_string());
    for (key, value) in attrs {
        start.push_attribute((*key, value.as_str()));
    }
    start
}

/// Write a Rekordbox XML library
pub fn write_rekordbox_xml<W: Write>(
    library: &Library,
    options: XmlOptions,
    out: &mut W,
) -> anyhow::Result<()> {
    let mut writer = Writer::new_with_indent(&mut *out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(element(
        "DJ_PLAYLISTS",
        &[("Version", PLAYLISTS_VERSION.to_string())],
    )))?;
    writer.write_event(Event::Empty(element(
        "PRODUCT",
        &[
            ("Name", PRODUCT_NAME.to_string()),
            ("Version", PRODUCT_VERSION.to_string()),
            ("Company", String::new()),
        ],
    )))?;

    writer.write_event(Event::Start(element(
        "COLLECTION",
        &[("Entries", library.tracks.len().to_string())],
    )))?;
    for entry in library.tracks.iter() {
        let cues = &entry.record.cue_points;
        let track = element("TRACK", &track_attrs(entry));
        if cues.is_empty() {
            writer.write_event(Event::Empty(track))?;
            continue;
        }
        writer.write_event(Event::Start(track))?;
        for cue in cues {
            let hot = mark_attrs(cue, cue.index.to_string(), true);
            writer.write_event(Event::Empty(element("POSITION_MARK", &hot)))?;
            if options.memory_cues {
                let memory = mark_attrs(cue, MEMORY_CUE_NUM.to_string(), false);
                writer.write_event(Event::Empty(element("POSITION_MARK", &memory)))?;
            }
        }
        writer.write_event(Event::End(BytesEnd::new("TRACK")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("COLLECTION")))?;

    writer.write_event(Event::Start(BytesStart::new("PLAYLISTS")))?;
    let root = element(
        "NODE",
        &[
            ("Type", NODE_FOLDER.to_string()),
            ("Name", "ROOT".to_string()),
            ("Count", library.playlists.len().to_string()),
        ],
    );
    if library.playlists.is_empty() {
        writer.write_event(Event::Empty(root))?;
    } else {
        writer.write_event(Event::Start(root))?;
        for playlist in &library.playlists {
            let keys = library.playlist_keys(playlist);
            let dropped = playlist.len() - keys.len();
            if dropped > 0 {
                debug!("Playlist {:?}: dropped {} unavailable tracks", playlist.name, dropped);
            }
            let node = element(
                "NODE",
                &[
                    ("Name", playlist.name.clone()),
                    ("Type", NODE_PLAYLIST.to_string()),
                    ("KeyType", "0".to_string()),
                    ("Entries", keys.len().to_string()),
                ],
            );
            if keys.is_empty() {
                writer.write_event(Event::Empty(node))?;
                continue;
            }
            writer.write_event(Event::Start(node))?;
            for key in keys {
                writer.write_event(Event::Empty(element("TRACK", &[("Key", key.to_string())])))?;
            }
            writer.write_event(Event::End(BytesEnd::new("NODE")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("NODE")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("PLAYLISTS")))?;
    writer.write_event(Event::End(BytesEnd::new("DJ_PLAYLISTS")))?;
    writeln!(out)?;

    info!(
        "Wrote Rekordbox XML: {} tracks, {} playlists",
        library.tracks.len(),
        library.playlists.len()
    );
    Ok(())
}

/// Write the library model as pretty JSON
pub fn write_json<W: Write>(library: &Library, out: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, library)?;
    writeln!(out)?;
    Ok(())
}
