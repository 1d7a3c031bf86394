//! File reads into arena memory
//!
//! Shader binaries, model files and config text are read once and parsed
//! immediately, so their bytes belong in the frame's temporary arena rather
//! than in a heap `Vec`.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::foundation::collections::ArenaString;
use crate::foundation::memory::{Arena, ArenaError};

/// File loading errors
#[derive(Error, Debug)]
pub enum FileError {
    /// The file could not be opened or read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The arena has no room for the file
    #[error("File does not fit in the arena: {0}")]
    Arena(#[from] ArenaError),

    /// The file is not UTF-8 text
    #[error("{path} is not valid UTF-8")]
    NotUtf8 {
        /// File that failed
        path: PathBuf,
    },
}

/// Read the whole file at `path` into `arena`.
pub fn read_temporary_file<'a>(arena: &'a Arena, path: impl AsRef<Path>) -> Result<&'a [u8], FileError> {
    let path = path.as_ref();
    let io_error = |source: std::io::Error| FileError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_error)?;
    let len = file.metadata().map_err(io_error)?.len();
    let len = usize::try_from(len).map_err(|_| {
        io_error(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "file too large for this platform",
        ))
    })?;

    let bytes = arena.try_push(len)?;
    file.read_exact(bytes).map_err(io_error)?;
    log::debug!("Read {} bytes from {}", len, path.display());
    Ok(bytes)
}

/// Read the UTF-8 text file at `path` into `arena`.
pub fn read_temporary_text<'a>(arena: &'a Arena, path: impl AsRef<Path>) -> Result<ArenaString<'a>, FileError> {
    let path = path.as_ref();
    let bytes = read_temporary_file(arena, path)?;
    let text = std::str::from_utf8(bytes).map_err(|_| FileError::NotUtf8 {
        path: path.to_path_buf(),
    })?;
    Ok(ArenaString::from(text))
}

/// Extension of `path` without the dot, copied into `arena`.
pub fn file_extension<'a>(arena: &'a Arena, path: impl AsRef<Path>) -> Option<ArenaString<'a>> {
    let extension = path.as_ref().extension()?.to_str()?;
    Some(ArenaString::new(arena, extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_whole_file_into_arena() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"#version 450\n").unwrap();

        let arena = Arena::new(64).unwrap();
        let bytes = read_temporary_file(&arena, file.path()).unwrap();
        assert_eq!(bytes, b"#version 450\n");
        assert_eq!(arena.used(), 13);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let arena = Arena::new(64).unwrap();
        let err = read_temporary_file(&arena, "does/not/exist.spv").unwrap_err();
        assert!(matches!(err, FileError::Io { .. }));
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn test_file_larger_than_arena() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[7u8; 128]).unwrap();

        let arena = Arena::new(64).unwrap();
        let err = read_temporary_file(&arena, file.path()).unwrap_err();
        assert!(matches!(err, FileError::Arena(_)));
    }

    #[test]
    fn test_text_and_extension() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all("name = \"café\"".as_bytes()).unwrap();

        let arena = Arena::new(64).unwrap();
        let text = read_temporary_text(&arena, file.path()).unwrap();
        assert!(text.contains("café"));
        assert_eq!(file_extension(&arena, file.path()).unwrap(), "toml");
        assert!(file_extension(&arena, "Makefile").is_none());

        let mut binary = tempfile::NamedTempFile::new().unwrap();
        binary.write_all(&[0xff, 0xfe]).unwrap();
        assert!(matches!(
            read_temporary_text(&arena, binary.path()),
            Err(FileError::NotUtf8 { .. })
        ));
    }
}
