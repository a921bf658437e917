use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use fieldrec_foundation::StorageError;

use crate::wav;

/// Exclusive-access wrapper around the shared storage medium.
///
/// Every storage touch from any thread goes through one of these methods,
/// each of which holds the single medium lock for exactly one bounded
/// operation: one frame write, one header patch, or one chunk read. Nothing
/// ever holds the lock across a whole file transfer, so the writer's next
/// frame waits at most one chunk-sized operation behind an upload.
pub struct StorageGateway {
    root: PathBuf,
    lock: Mutex<()>,
}

impl StorageGateway {
    /// Mounts the storage root, creating the directory if needed.
    pub fn mount(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::MountFailed {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates (truncating) a file under the root.
    pub fn create(&self, name: &str) -> Result<File, StorageError> {
        let _guard = self.lock.lock();
        File::create(self.root.join(name)).map_err(|source| StorageError::CreateFailed {
            name: name.to_string(),
            source,
        })
    }

    pub fn open_for_read(&self, name: &str) -> Result<File, StorageError> {
        let _guard = self.lock.lock();
        File::open(self.root.join(name)).map_err(|source| StorageError::OpenFailed {
            name: name.to_string(),
            source,
        })
    }

    pub fn file_size(&self, name: &str) -> Result<u64, StorageError> {
        let _guard = self.lock.lock();
        let meta =
            fs::metadata(self.root.join(name)).map_err(|source| StorageError::OpenFailed {
                name: name.to_string(),
                source,
            })?;
        Ok(meta.len())
    }

    /// Names of the regular files currently on the medium.
    pub fn list_names(&self) -> Result<Vec<String>, StorageError> {
        let _guard = self.lock.lock();
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    /// Appends one frame's PCM block. Anything but a complete write is the
    /// fatal storage fault; the confirmed count is never silently partial.
    pub fn write_frame<W: Write + ?Sized>(
        &self,
        file: &mut W,
        pcm: &[u8],
    ) -> Result<usize, StorageError> {
        let _guard = self.lock.lock();
        let written = file.write(pcm)?;
        if written != pcm.len() {
            return Err(StorageError::ShortWrite {
                expected: pcm.len(),
                written,
            });
        }
        Ok(written)
    }

    /// Writes the placeholder WAV header for a fresh session file.
    pub fn write_placeholder<W: Write + ?Sized>(
        &self,
        file: &mut W,
        sample_rate: u32,
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        wav::write_placeholder_header(file, sample_rate)?;
        Ok(())
    }

    /// Patches the WAV header of an open session file.
    pub fn patch_header<F: Write + Seek + ?Sized>(
        &self,
        file: Option<&mut F>,
        sample_rate: u32,
        data_size: u32,
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        wav::patch_header(file, sample_rate, data_size)?;
        Ok(())
    }

    /// Reads one bounded chunk of an upload source file.
    pub fn read_chunk<R: Read + ?Sized>(
        &self,
        file: &mut R,
        buf: &mut [u8],
    ) -> Result<usize, StorageError> {
        let _guard = self.lock.lock();
        Ok(file.read(buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use tempfile::TempDir;

    /// Writer that accepts at most `limit` bytes per call.
    struct ChokedWriter {
        inner: Vec<u8>,
        limit: usize,
    }

    impl Write for ChokedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit);
            self.inner.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn mount_creates_the_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("media");
        let gateway = StorageGateway::mount(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(gateway.root(), root);
    }

    #[test]
    fn short_write_is_reported_with_both_counts() {
        let dir = TempDir::new().unwrap();
        let gateway = StorageGateway::mount(dir.path()).unwrap();
        let mut choked = ChokedWriter {
            inner: Vec::new(),
            limit: 512,
        };

        let err = gateway.write_frame(&mut choked, &[0u8; 2048]).unwrap_err();
        match err {
            StorageError::ShortWrite { expected, written } => {
                assert_eq!(expected, 2048);
                assert_eq!(written, 512);
            }
            other => panic!("expected ShortWrite, got {other:?}"),
        }
    }

    #[test]
    fn full_write_returns_the_requested_count() {
        let dir = TempDir::new().unwrap();
        let gateway = StorageGateway::mount(dir.path()).unwrap();
        let mut sink = Cursor::new(Vec::new());
        assert_eq!(gateway.write_frame(&mut sink, &[1u8; 2048]).unwrap(), 2048);
    }

    #[test]
    fn list_names_sees_created_files() {
        let dir = TempDir::new().unwrap();
        let gateway = StorageGateway::mount(dir.path()).unwrap();
        drop(gateway.create("a.wav").unwrap());
        drop(gateway.create("b.wav").unwrap());

        let mut names = gateway.list_names().unwrap();
        names.sort();
        assert_eq!(names, ["a.wav", "b.wav"]);
        assert_eq!(gateway.file_size("a.wav").unwrap(), 0);
    }
}
