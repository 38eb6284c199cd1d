//! File-system primitives the builder depends on.
//!
//! All operations are synchronous. [`LocalFileSystem`] maps them onto
//! `std::fs`; tests and embedders may supply their own [`FileSystem`].

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Synchronous file-system operations used during bundle assembly.
pub trait FileSystem {
    /// True when `path` exists (file or directory).
    fn exists(&self, path: &Path) -> bool;

    /// Create `path` and any missing parents.
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Copy the bytes of `from` to `to`, replacing `to`.
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Byte-for-byte comparison of two files.
    ///
    /// # Errors
    /// Returns the underlying I/O error if either file cannot be read.
    fn files_equal(&self, a: &Path, b: &Path) -> io::Result<bool>;

    /// Replace `path` with `contents` so readers never see a partial file.
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// [`FileSystem`] backed by the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

/// Read buffer size for file comparison.
const COMPARE_CHUNK: usize = 64 * 1024;

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn files_equal(&self, a: &Path, b: &Path) -> io::Result<bool> {
        if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
            return Ok(false);
        }

        let mut ra = BufReader::new(File::open(a)?);
        let mut rb = BufReader::new(File::open(b)?);
        let mut buf_a = vec![0u8; COMPARE_CHUNK];
        let mut buf_b = vec![0u8; COMPARE_CHUNK];

        loop {
            let n = read_full(&mut ra, &mut buf_a)?;
            let m = read_full(&mut rb, &mut buf_b)?;
            if n != m || buf_a[..n] != buf_b[..m] {
                return Ok(false);
            }
            if n == 0 {
                return Ok(true);
            }
        }
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let tmp = temp_sibling(path);
        let result = (|| {
            let mut file = File::create(&tmp)?;
            file.write_all(contents)?;
            file.sync_all()?;
            fs::rename(&tmp, path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}

/// Fill `buf` as far as the reader allows; returns bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Hidden temp path next to `path`, on the same file system for `rename`.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp-{}", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_files_equal_same_content() {
        let dir = TempDir::new().expect("tempdir");
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, b"hello").expect("write a");
        fs::write(&b, b"hello").expect("write b");
        assert!(LocalFileSystem.files_equal(&a, &b).expect("compare"));
    }

    #[test]
    fn test_files_equal_different_content_same_len() {
        let dir = TempDir::new().expect("tempdir");
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, b"hello").expect("write a");
        fs::write(&b, b"jello").expect("write b");
        assert!(!LocalFileSystem.files_equal(&a, &b).expect("compare"));
    }

    #[test]
    fn test_files_equal_large_files() {
        let dir = TempDir::new().expect("tempdir");
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let mut data = vec![7u8; COMPARE_CHUNK * 2 + 13];
        fs::write(&a, &data).expect("write a");
        if let Some(last) = data.last_mut() {
            *last = 8;
        }
        fs::write(&b, &data).expect("write b");
        assert!(!LocalFileSystem.files_equal(&a, &b).expect("compare"));
    }

    #[test]
    fn test_files_equal_missing_file_errors() {
        let dir = TempDir::new().expect("tempdir");
        let a = dir.path().join("a.txt");
        fs::write(&a, b"x").expect("write");
        assert!(LocalFileSystem
            .files_equal(&a, &dir.path().join("missing"))
            .is_err());
    }

    #[test]
    fn test_write_atomic_replaces_and_leaves_no_temp() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("out.bin");
        LocalFileSystem.write_atomic(&path, b"one").expect("first");
        LocalFileSystem.write_atomic(&path, b"two").expect("second");
        assert_eq!(fs::read(&path).expect("read"), b"two");
        let entries = fs::read_dir(dir.path()).expect("read_dir").count();
        assert_eq!(entries, 1);
    }
}
