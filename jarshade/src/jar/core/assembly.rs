//! Symbol rewriting over a parsed class.
//!
//! Rewriting never renumbers existing constant pool slots. A Utf8 slot
//! whose every reference site agrees on the new text is overwritten in
//! place; sites that disagree with the other users of their slot are
//! repointed to a new (or an already existing) Utf8 entry. Attributes of
//! unknown layout may hold Utf8 indices we cannot see, so when a class has
//! any, no slot is overwritten at all.

use std::collections::{btree_map::Entry, BTreeMap, HashMap};

use tracing::trace;

use crate::jar::core::{
    classfile::{ClassFile, ClassFileError, SymbolRole},
    descriptor::{map_descriptor, map_signature},
};

/// Answers how names and strings inside a class should change.
///
/// Every method returns `None` to keep the input unchanged.
pub trait SymbolMapper {
    /// Internal class name, `org/foo/Bar`
    fn map_class_name(&self, name: &str) -> Option<String>;

    /// Value of a string constant
    fn map_string(&self, value: &str) -> Option<String>;

    /// `SourceFile` value of the class whose internal name is `class_name`
    fn map_source_file(&self, class_name: &str, source: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotUse {
    Uniform(Option<String>),
    Mixed,
}

/// Applies `mapper` to every symbol in `class`. Returns whether anything
/// changed.
pub fn rewrite_symbols(
    class: &mut ClassFile,
    mapper: &dyn SymbolMapper,
) -> Result<bool, ClassFileError> {
    let texts = class.pool.utf8_texts();
    let class_name = class.this_class_name().unwrap_or_default();

    let mut sites = Vec::new();
    class.visit_symbols(&mut |role, index| sites.push((role, *index)));

    // Ordered so that appended pool entries land in the same order every run
    let mut mapped: BTreeMap<(SymbolRole, u16), Option<String>> = BTreeMap::new();
    let mut slots: BTreeMap<u16, SlotUse> = BTreeMap::new();

    for (role, index) in sites {
        let target = mapped
            .entry((role, index))
            .or_insert_with(|| {
                let text = texts.get(index as usize).and_then(|t| t.as_deref())?;
                map_symbol(mapper, role, text, &class_name).filter(|new| new != text)
            })
            .clone();

        match slots.entry(index) {
            Entry::Vacant(slot) => {
                slot.insert(SlotUse::Uniform(target));
            }
            Entry::Occupied(mut slot) => {
                if *slot.get() != SlotUse::Uniform(target) {
                    slot.insert(SlotUse::Mixed);
                }
            }
        }
    }

    if mapped.values().all(Option::is_none) {
        return Ok(false);
    }

    let pinned = class.has_opaque_attributes();
    let mut overwritten = Vec::new();
    if !pinned {
        for (index, slot) in &slots {
            if let SlotUse::Uniform(Some(text)) = slot {
                class.pool.set_utf8(*index, text);
                overwritten.push(*index);
            }
        }
    }

    // After the overwrites every slot holds exactly what its remaining sites
    // expect, so any slot with matching text can be shared
    let mut repoint: HashMap<(SymbolRole, u16), u16> = HashMap::new();
    for ((role, index), target) in &mapped {
        let Some(text) = target else { continue };
        if overwritten.contains(index) {
            continue;
        }
        let new_index = class.pool.utf8_index(text)?;
        repoint.insert((*role, *index), new_index);
    }

    trace!(
        "{class_name}: {} slots overwritten, {} sites repointed",
        overwritten.len(),
        repoint.len()
    );

    if !repoint.is_empty() {
        class.visit_symbols(&mut |role, index| {
            if let Some(new_index) = repoint.get(&(role, *index)) {
                *index = *new_index;
            }
        });
    }

    Ok(true)
}

/// Parses, rewrites and serializes a class. `None` means the class needs no
/// change and the original bytes should be kept.
pub fn remap_class_bytes(
    data: &[u8],
    mapper: &dyn SymbolMapper,
) -> Result<Option<Vec<u8>>, ClassFileError> {
    let mut class = ClassFile::parse(data)?;
    if rewrite_symbols(&mut class, mapper)? {
        Ok(Some(class.to_bytes()?))
    } else {
        Ok(None)
    }
}

fn map_symbol(
    mapper: &dyn SymbolMapper,
    role: SymbolRole,
    text: &str,
    class_name: &str,
) -> Option<String> {
    let mut map_name = |name: &str| mapper.map_class_name(name);
    match role {
        SymbolRole::Name => None,
        // Array classes are named by their descriptor
        SymbolRole::ClassName if text.starts_with('[') => map_descriptor(text, &mut map_name),
        SymbolRole::ClassName => mapper.map_class_name(text),
        SymbolRole::Descriptor => map_descriptor(text, &mut map_name),
        SymbolRole::Signature => map_signature(text, &mut map_name),
        SymbolRole::StringValue => mapper.map_string(text),
        SymbolRole::SourceFile => mapper.map_source_file(class_name, text),
    }
}
