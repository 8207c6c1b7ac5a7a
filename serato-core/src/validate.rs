//! Crate file validation
//!
//! Structural report over a `.crate` file. A file that does not decode is
//! invalid; everything else that looks odd but still yields a playlist is a
//! warning:
//! - no `vrsn` tag
//! - `otrk` without a `ptrk` path
//! - the same path listed twice
//! - top-level tags outside the crate type table

use std::collections::HashSet;

use crate::crate_file::{decode_crate, TRACK_NAME_TAG};

/// Statistics about a crate file
#[derive(Debug, Default, Clone)]
pub struct CrateStats {
    pub track_count: usize,
    pub column_count: usize,
    pub unknown_count: usize,
    pub has_version: bool,
    pub has_sort_column: bool,
}

/// Result of validating a crate file
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub stats: CrateStats,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            stats: CrateStats::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn add_error(&mut self, msg: impl Into<String>) {
        self.valid = false;
        self.errors.push(msg.into());
    }

    fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Validate crate bytes and return detailed results
pub fn validate_crate(data: &[u8]) -> ValidationResult {
    let mut result = ValidationResult::new();

    if data.is_empty() {
        result.add_warning("Empty file: no tags");
    }

    let decoded = match decode_crate(data) {
        Ok(decoded) => decoded,
        Err(e) => {
            result.add_error(format!("Decode failed: {}", e));
            return result;
        }
    };

    result.stats.has_version = decoded.version().is_some();
    result.stats.has_sort_column = decoded.sort_column().is_some();
    result.stats.column_count = decoded.columns().count();
    result.stats.unknown_count = decoded.unknown().count();

    if !result.stats.has_version {
        result.add_warning("Missing vrsn tag");
    }

    let mut seen = HashSet::new();
    for (position, track) in decoded.tracks().enumerate() {
        result.stats.track_count += 1;
        match track.track_name() {
            Some(path) => {
                if !seen.insert(path) {
                    result.add_warning(format!("Track #{}: duplicate path {:?}", position + 1, path));
                }
            }
            None => result.add_warning(format!(
                "Track #{}: no {} path",
                position + 1,
                TRACK_NAME_TAG
            )),
        }
    }

    for tag in decoded.unknown() {
        result.add_warning(format!("Unknown tag {}", tag.id));
    }

    result
}

/// Validate crate bytes and print results to stdout
pub fn validate_and_print(name: &str, data: &[u8]) -> bool {
    let result = validate_crate(data);

    println!("{}", name);
    println!("  Status: {}", if result.valid { "VALID" } else { "INVALID" });
    println!("  Tracks: {}", result.stats.track_count);
    println!("  Columns: {}", result.stats.column_count);
    println!("  Unknown tags: {}", result.stats.unknown_count);
    println!("  Version tag: {}", if result.stats.has_version { "yes" } else { "no" });
    println!("  Sort column: {}", if result.stats.has_sort_column { "yes" } else { "no" });

    for err in &result.errors {
        println!("  error: {}", err);
    }
    for warn in &result.warnings {
        println!("  warning: {}", warn);
    }
    println!();

    result.valid
}
