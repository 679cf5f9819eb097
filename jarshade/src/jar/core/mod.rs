//! Class file model and rewriting
//!
//! A class is parsed into a structured model that keeps constant pool
//! indices stable, so anything we do not understand can be carried through
//! as raw bytes.

pub mod assembly;
pub mod attributes;
pub mod bytecode;
pub mod classfile;
pub mod cpool;
pub mod descriptor;
pub mod mutf8;

pub use assembly::{remap_class_bytes, rewrite_symbols, SymbolMapper};
pub use classfile::{ClassFile, ClassFileError, SymbolRole};
