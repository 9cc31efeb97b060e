//! The filesystem the engine reads from and writes to.

use spin::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// A flat file store, e.g. a littlefs partition mounted on the device.
///
/// Names are passed through verbatim; whether a name is valid is up to the
/// implementation.
pub trait Storage {
    type Reader: Read;
    type Writer: Write;

    /// Opens `name` for writing, creating it or truncating an existing file.
    fn create(&self, name: &str) -> io::Result<Self::Writer>;

    /// Opens `name` for reading, returning the reader and the file size.
    fn open(&self, name: &str) -> io::Result<(Self::Reader, u64)>;

    /// Lists the stored files. Entries whose names start with `.` are left
    /// out.
    fn list(&self) -> io::Result<Vec<Entry>>;

    /// Deletes `name`.
    fn remove(&self, name: &str) -> io::Result<()>;
}

/// A directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Entry {
    pub name: String,
    pub size: u64,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

fn invalid_name(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("invalid file name: {:?}", name))
}

/// Storage rooted at a directory of the host filesystem, which is where the
/// flash filesystem is mounted.
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        DirStorage { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> io::Result<PathBuf> {
        if name.is_empty() {
            return Err(invalid_name(name));
        }
        Ok(self.root.join(name))
    }
}

impl Storage for DirStorage {
    type Reader = fs::File;
    type Writer = fs::File;

    fn create(&self, name: &str) -> io::Result<fs::File> {
        fs::File::create(self.path_of(name)?)
    }

    fn open(&self, name: &str) -> io::Result<(fs::File, u64)> {
        let file = fs::File::open(self.path_of(name)?)?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    fn list(&self) -> io::Result<Vec<Entry>> {
        let mut entries = Vec::new();

        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            let metadata = dir_entry.metadata()?;
            let kind = if metadata.is_file() {
                EntryKind::File
            } else if metadata.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::Other
            };

            entries.push(Entry {
                name,
                size: metadata.len(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.path_of(name)?)
    }
}

type Files = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

/// RAM-backed storage, for boards without an attached flash and for tests.
///
/// Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemStorage {
    files: Files,
}

impl MemStorage {
    pub fn new() -> Self {
        MemStorage::default()
    }

    /// A copy of the contents of `name`, if it exists.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().get(name).cloned()
    }

    /// Stores `data` under `name`, replacing an existing file.
    pub fn insert<N: Into<String>, D: Into<Vec<u8>>>(&self, name: N, data: D) {
        self.files.lock().insert(name.into(), data.into());
    }
}

/// Write handle of a [`MemStorage`] file.
#[derive(Debug)]
pub struct MemFile {
    name: String,
    files: Files,
}

impl Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut files = self.files.lock();
        let file = files
            .get_mut(&self.name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file removed while open"))?;
        file.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Storage for MemStorage {
    type Reader = Cursor<Vec<u8>>;
    type Writer = MemFile;

    fn create(&self, name: &str) -> io::Result<MemFile> {
        if name.is_empty() {
            return Err(invalid_name(name));
        }

        self.files.lock().insert(name.to_owned(), Vec::new());
        Ok(MemFile {
            name: name.to_owned(),
            files: Arc::clone(&self.files),
        })
    }

    fn open(&self, name: &str) -> io::Result<(Cursor<Vec<u8>>, u64)> {
        let data = self
            .contents(name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such file: {:?}", name)))?;
        let size = data.len() as u64;
        Ok((Cursor::new(data), size))
    }

    fn list(&self) -> io::Result<Vec<Entry>> {
        Ok(self
            .files
            .lock()
            .iter()
            .filter(|(name, _)| !name.starts_with('.'))
            .map(|(name, data)| Entry {
                name: name.clone(),
                size: data.len() as u64,
                kind: EntryKind::File,
            })
            .collect())
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        self.files
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such file: {:?}", name)))
    }
}
