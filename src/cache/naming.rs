//! Deterministic cache file names.
//!
//! `<group>.<name>-<version>[-<suffix>].<ext>`; the suffix is a content hash
//! prefix, only added when the plain name is taken by other bytes.
//!
//! The readable stem is only used for keys it identifies unambiguously: the first
//! `-<digit>` of the stem must start the version and the last `.` before it must
//! end the group. Every other key (dotted names, classifiers, `-<digit>` inside a
//! group or name) gets `~<coordinate hash>` appended, a form no readable stem
//! can take. Distinct keys therefore never share a stem, whatever order they
//! are requested in.

use crate::artifact::{ArtifactKey, ContentHash, ResolvedArtifact};

const COORDINATE_TAG: char = '~';

/// Coordinate-derived stem shared by every file of one artifact key.
pub fn stem(artifact: &ResolvedArtifact) -> String {
    key_stem(&artifact.key)
}

pub fn key_stem(key: &ArtifactKey) -> String {
    let readable = match key.classifier() {
        Some(c) => format!("{}.{}-{}-{c}", key.group(), key.name(), key.version()),
        None => format!("{}.{}-{}", key.group(), key.name(), key.version()),
    };
    if is_readable(key) {
        readable
    } else {
        format!("{readable}{COORDINATE_TAG}{}", ContentHash::of_coordinate(key).short())
    }
}

fn is_readable(key: &ArtifactKey) -> bool {
    let segments = [key.group(), key.name(), key.version()];
    key.classifier().is_none()
        && !segments.iter().any(|s| s.contains(COORDINATE_TAG))
        && !has_dash_digit(key.group())
        && !has_dash_digit(key.name())
        && !key.name().contains('.')
        && key.version().starts_with(|c: char| c.is_ascii_digit())
        && !ends_with_hash_suffix(key.version())
}

fn has_dash_digit(segment: &str) -> bool {
    segment
        .as_bytes()
        .windows(2)
        .any(|w| w[0] == b'-' && w[1].is_ascii_digit())
}

/// Versions like `1.0-0a1b2c3d` read exactly like a hash-suffixed name.
fn ends_with_hash_suffix(version: &str) -> bool {
    version.rsplit_once('-').is_some_and(|(_, tail)| {
        matches!(tail.len(), 8 | 64) && tail.bytes().all(|b| b.is_ascii_hexdigit())
    })
}

/// Candidate file names in preference order: plain, short hash, full hash.
pub fn candidates(artifact: &ResolvedArtifact) -> [String; 3] {
    let stem = stem(artifact);
    let ext = artifact.extension();
    let hash: &ContentHash = &artifact.hash;
    [
        format!("{stem}.{ext}"),
        format!("{stem}-{}.{ext}", hash.short()),
        format!("{stem}-{}.{ext}", hash.as_str()),
    ]
}

/// Rule name for a cached file: the file name without its extension.
pub fn rule_name(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name.to_string(),
    }
}
