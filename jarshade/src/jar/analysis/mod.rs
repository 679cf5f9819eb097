//! Class reference analysis for the minimizer
//!
//! `scanner` harvests which classes a single class file refers to;
//! `clazzpath` joins those per-class facts into one graph over every
//! analyzed archive or directory.

pub mod clazzpath;
pub mod scanner;

pub use clazzpath::{AnalysisError, ClassId, Clazzpath, ClazzpathUnit};
pub use scanner::{
    class_name_of_entry, scan_class, strip_version_prefix, ClassSummary, ScanError,
};
