use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufWriter, Seek, Write},
    path::Path,
};

use tracing::trace;
use zip::{write::FileOptions, CompressionMethod, DateTime, ZipWriter};

use crate::jar::io::EntrySink;

/// Zip writer that remembers every name it wrote. File entries are
/// deflated, directory entries are stored and named with a trailing `/`.
pub struct JarWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    names: HashSet<String>,
    files: usize,
}

impl JarWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Seek> JarWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            zip: ZipWriter::new(inner),
            names: HashSet::new(),
            files: 0,
        }
    }

    /// Whether an entry with this exact name (directories end in `/`) was
    /// written
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of file entries written so far
    pub fn entry_count(&self) -> usize {
        self.files
    }

    /// Writes `dir` and every missing ancestor, outermost first.
    pub fn add_directory(&mut self, dir: &str, time: DateTime) -> io::Result<()> {
        let dir = dir.trim_end_matches('/');
        if dir.is_empty() {
            return Ok(());
        }
        let name = format!("{dir}/");
        if self.names.contains(&name) {
            return Ok(());
        }
        if let Some((parent, _)) = dir.rsplit_once('/') {
            self.add_directory(parent, time)?;
        }

        trace!("dir {name}");
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .last_modified_time(time);
        self.zip
            .add_directory(name.as_str(), options)
            .map_err(io::Error::other)?;
        self.names.insert(name);
        Ok(())
    }

    /// Writes the directory entries enclosing the entry `name`.
    pub fn ensure_parent_directories(&mut self, name: &str, time: DateTime) -> io::Result<()> {
        match name.rsplit_once('/') {
            Some((parent, _)) => self.add_directory(parent, time),
            None => Ok(()),
        }
    }

    /// Writes a file entry unless the name is taken. Returns whether the
    /// entry was written.
    pub fn write(&mut self, name: &str, time: DateTime, data: &[u8]) -> io::Result<bool> {
        if self.names.contains(name) {
            return Ok(false);
        }

        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(time);
        self.zip
            .start_file(name, options)
            .map_err(io::Error::other)?;
        self.zip.write_all(data)?;

        self.names.insert(name.to_owned());
        self.files += 1;
        Ok(true)
    }

    /// Writes the central directory and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.zip.finish().map_err(io::Error::other)
    }
}

impl<W: Write + Seek> EntrySink for JarWriter<W> {
    fn put_entry(&mut self, name: &str, time: DateTime, data: &[u8]) -> io::Result<bool> {
        self.ensure_parent_directories(name, time)?;
        self.write(name, time, data)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use zip::ZipArchive;

    use super::*;

    fn names(bytes: Vec<u8>) -> Vec<String> {
        let zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        zip.file_names().map(str::to_owned).collect()
    }

    #[test]
    fn parents_are_written_before_children() {
        let mut writer = JarWriter::new(Cursor::new(Vec::new()));
        writer
            .put_entry("org/foo/A.class", DateTime::default(), b"a")
            .unwrap();
        writer
            .put_entry("org/bar/B.class", DateTime::default(), b"b")
            .unwrap();
        assert_eq!(writer.entry_count(), 2);

        let bytes = writer.finish().unwrap().into_inner();
        let mut names = names(bytes);
        names.sort();
        assert_eq!(
            names,
            vec![
                "org/",
                "org/bar/",
                "org/bar/B.class",
                "org/foo/",
                "org/foo/A.class"
            ]
        );
    }

    #[test]
    fn second_write_of_a_name_is_refused() {
        let mut writer = JarWriter::new(Cursor::new(Vec::new()));
        assert!(writer.write("a.txt", DateTime::default(), b"first").unwrap());
        assert!(!writer.write("a.txt", DateTime::default(), b"second").unwrap());
        assert!(writer.contains("a.txt"));

        let bytes = writer.finish().unwrap().into_inner();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut content = String::new();
        zip.by_name("a.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "first");
    }
}
