//! Package relocation
//!
//! A [`Relocator`] answers whether one name falls under a relocation rule
//! and what it becomes. The [`Remapper`] runs an ordered list of them over
//! class symbols and entry paths.

pub mod relocator;
pub mod remapper;
pub mod source;

pub use relocator::{RelocationRule, Relocator};
pub use remapper::Remapper;
pub use source::SourceShader;
