//! File system helpers for the artifact cache and rule files.
//!
//! Everything that publishes a file does so through a temp-and-rename sequence so a
//! concurrent reader either sees the previous file, or the complete new one, never a
//! partial write. These helpers return plain [`std::io::Result`]; callers attach the
//! coordinate or category to the error.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Ensures a directory exists, creating it and all parents if necessary.
///
/// Fails if `path` exists but is not a directory.
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    } else if !path.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("Path exists but is not a directory: {}", path.display()),
        ));
    }
    Ok(())
}

/// Atomically replace `path` with `content`.
///
/// The bytes are written to a uniquely named temp file next to `path`, synced to disk
/// and renamed over the destination.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = parent_dir(path);
    ensure_dir(&parent)?;

    let mut staged = tempfile::Builder::new().prefix(".staging-").tempfile_in(&parent)?;
    staged.write_all(content)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Copy `source` to `dest` through a staging file in the destination directory.
///
/// Two concurrent publishers of the same destination never interleave bytes: each
/// stages its own temp file and the final rename replaces the whole file at once.
pub fn stage_copy(source: &Path, dest: &Path) -> io::Result<u64> {
    let parent = parent_dir(dest);
    ensure_dir(&parent)?;

    let staged = tempfile::Builder::new().prefix(".staging-").tempfile_in(&parent)?;
    let copied = {
        let mut input = fs::File::open(source)?;
        let mut output = staged.as_file();
        let copied = io::copy(&mut input, &mut output)?;
        output.sync_all()?;
        copied
    };
    staged.persist(dest).map_err(|e| e.error)?;
    Ok(copied)
}

/// Lowercase hex SHA-256 of a file's bytes.
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Whether two files hold identical bytes.
pub fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    let (ma, mb) = (fs::metadata(a)?, fs::metadata(b)?);
    if ma.len() != mb.len() {
        return Ok(false);
    }
    Ok(file_sha256(a)? == file_sha256(b)?)
}

/// Total size in bytes and number of regular files below `path`.
pub fn dir_stats(path: &Path) -> io::Result<(u64, usize)> {
    let mut size = 0;
    let mut files = 0;

    for entry in walkdir::WalkDir::new(path) {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_file() {
            size += entry.metadata().map_err(io::Error::other)?.len();
            files += 1;
        }
    }

    Ok((size, files))
}

/// Remove a directory tree, treating a missing directory as success.
pub fn remove_dir_all(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
