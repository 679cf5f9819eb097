//! Entry filters
//!
//! A filter decides, per input archive, which entries never reach the
//! output. Several filters may apply to one archive; an entry is dropped as
//! soon as any of them excludes it.

use std::path::Path;

pub mod minijar;
pub mod simple;

pub use minijar::{MinijarFilter, ProjectClasspath};
pub use simple::SimpleFilter;

pub trait Filter {
    /// Whether this filter applies to entries of `archive` at all
    fn can_filter(&self, archive: &Path) -> bool;

    /// `true` excludes the entry
    fn is_filtered(&self, entry: &str) -> bool;

    /// Called once after the merge, for reporting
    fn finished(&self) {}
}
