//! JVM archive plumbing
//!
//! - `core`: class file parsing, symbol rewriting and serialization
//! - `analysis`: class reference graph across archives
//! - `io`: output archive writing

pub mod analysis;
pub mod core;
pub mod io;

pub use self::core::{remap_class_bytes, ClassFile, ClassFileError, SymbolMapper};
pub use analysis::{AnalysisError, Clazzpath};
pub use io::{EntrySink, JarWriter};
