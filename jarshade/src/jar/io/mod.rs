//! Archive output
//!
//! Everything that produces entries of the merged archive writes through
//! [`EntrySink`], which keeps transformers independent of the zip writer.

use std::{collections::BTreeMap, io};

use zip::DateTime;

pub mod writer;

pub use writer::JarWriter;

pub trait EntrySink {
    /// Writes a file entry. Returns `false` when an entry with that name
    /// already exists, in which case nothing is written.
    fn put_entry(&mut self, name: &str, time: DateTime, data: &[u8]) -> io::Result<bool>;
}

/// In-memory sink, mostly useful to inspect transformer output
impl EntrySink for BTreeMap<String, Vec<u8>> {
    fn put_entry(&mut self, name: &str, _time: DateTime, data: &[u8]) -> io::Result<bool> {
        if self.contains_key(name) {
            return Ok(false);
        }
        self.insert(name.to_owned(), data.to_vec());
        Ok(true)
    }
}

fn time_key(time: &DateTime) -> (u16, u8, u8, u8, u8, u8) {
    (
        time.year(),
        time.month(),
        time.day(),
        time.hour(),
        time.minute(),
        time.second(),
    )
}

/// The later of two entry timestamps
pub fn latest(a: DateTime, b: DateTime) -> DateTime {
    if time_key(&b) > time_key(&a) {
        b
    } else {
        a
    }
}
