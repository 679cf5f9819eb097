use crate::jar::core::{
    bytecode::{ByteReader, ByteWriter},
    classfile::ClassFileError,
    mutf8,
};

/// One constant pool slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    /// Index 0 and the upper half of long/double constants
    Unusable,
    Utf8(Vec<u8>),
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstPool {
    entries: Vec<Constant>,
}

impl Default for ConstPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstPool {
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
        }
    }

    pub fn parse(r: &mut ByteReader<'_>) -> Result<Self, ClassFileError> {
        let count = r.u16()? as usize;
        let mut entries = Vec::with_capacity(count.max(1));
        entries.push(Constant::Unusable);

        while entries.len() < count {
            let index = entries.len();
            let tag = r.u8()?;
            let constant = match tag {
                1 => {
                    let len = r.u16()? as usize;
                    Constant::Utf8(r.bytes(len)?.to_vec())
                }
                3 => Constant::Integer(r.u32()?),
                4 => Constant::Float(r.u32()?),
                5 => Constant::Long(r.u64()?),
                6 => Constant::Double(r.u64()?),
                7 => Constant::Class(r.u16()?),
                8 => Constant::String(r.u16()?),
                9 => Constant::FieldRef {
                    class: r.u16()?,
                    name_and_type: r.u16()?,
                },
                10 => Constant::MethodRef {
                    class: r.u16()?,
                    name_and_type: r.u16()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class: r.u16()?,
                    name_and_type: r.u16()?,
                },
                12 => Constant::NameAndType {
                    name: r.u16()?,
                    descriptor: r.u16()?,
                },
                15 => Constant::MethodHandle {
                    kind: r.u8()?,
                    reference: r.u16()?,
                },
                16 => Constant::MethodType(r.u16()?),
                17 => Constant::Dynamic {
                    bootstrap: r.u16()?,
                    name_and_type: r.u16()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap: r.u16()?,
                    name_and_type: r.u16()?,
                },
                19 => Constant::Module(r.u16()?),
                20 => Constant::Package(r.u16()?),
                tag => return Err(ClassFileError::BadConstantTag { tag, index }),
            };
            let wide = constant.is_wide();
            entries.push(constant);
            if wide {
                entries.push(Constant::Unusable);
            }
        }

        // A long/double in the last slot would make the pool one entry longer
        // than declared
        if entries.len() != count.max(1) {
            return Err(ClassFileError::Truncated(r.position()));
        }

        Ok(Self { entries })
    }

    pub fn write(&self, w: &mut ByteWriter) -> Result<(), ClassFileError> {
        w.u16(u16_len("constant pool", self.entries.len())?);
        for constant in &self.entries {
            match constant {
                Constant::Unusable => {}
                Constant::Utf8(bytes) => {
                    w.u8(1);
                    w.u16(u16_len("Utf8 constant", bytes.len())?);
                    w.bytes(bytes);
                }
                Constant::Integer(v) => {
                    w.u8(3);
                    w.u32(*v);
                }
                Constant::Float(v) => {
                    w.u8(4);
                    w.u32(*v);
                }
                Constant::Long(v) => {
                    w.u8(5);
                    w.u64(*v);
                }
                Constant::Double(v) => {
                    w.u8(6);
                    w.u64(*v);
                }
                Constant::Class(i) => {
                    w.u8(7);
                    w.u16(*i);
                }
                Constant::String(i) => {
                    w.u8(8);
                    w.u16(*i);
                }
                Constant::FieldRef {
                    class,
                    name_and_type,
                } => {
                    w.u8(9);
                    w.u16(*class);
                    w.u16(*name_and_type);
                }
                Constant::MethodRef {
                    class,
                    name_and_type,
                } => {
                    w.u8(10);
                    w.u16(*class);
                    w.u16(*name_and_type);
                }
                Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => {
                    w.u8(11);
                    w.u16(*class);
                    w.u16(*name_and_type);
                }
                Constant::NameAndType { name, descriptor } => {
                    w.u8(12);
                    w.u16(*name);
                    w.u16(*descriptor);
                }
                Constant::MethodHandle { kind, reference } => {
                    w.u8(15);
                    w.u8(*kind);
                    w.u16(*reference);
                }
                Constant::MethodType(i) => {
                    w.u8(16);
                    w.u16(*i);
                }
                Constant::Dynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    w.u8(17);
                    w.u16(*bootstrap);
                    w.u16(*name_and_type);
                }
                Constant::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    w.u8(18);
                    w.u16(*bootstrap);
                    w.u16(*name_and_type);
                }
                Constant::Module(i) => {
                    w.u8(19);
                    w.u16(*i);
                }
                Constant::Package(i) => {
                    w.u8(20);
                    w.u16(*i);
                }
            }
        }
        Ok(())
    }

    /// Slot count, including the unusable slot 0
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize)
    }

    pub fn entries_mut(&mut self) -> &mut [Constant] {
        &mut self.entries
    }

    pub fn utf8(&self, index: u16) -> Option<String> {
        match self.get(index)? {
            Constant::Utf8(bytes) => mutf8::decode(bytes),
            _ => None,
        }
    }

    /// Internal name behind a `CONSTANT_Class` index
    pub fn class_name(&self, index: u16) -> Option<String> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            _ => None,
        }
    }

    /// Decoded text of every slot, `None` for non-Utf8 or undecodable slots
    pub fn utf8_texts(&self) -> Vec<Option<String>> {
        self.entries
            .iter()
            .map(|c| match c {
                Constant::Utf8(bytes) => mutf8::decode(bytes),
                _ => None,
            })
            .collect()
    }

    pub fn push(&mut self, constant: Constant) -> Result<u16, ClassFileError> {
        let index = self.entries.len();
        let slots = if constant.is_wide() { 2 } else { 1 };
        if index + slots > u16::MAX as usize {
            return Err(ClassFileError::PoolOverflow);
        }
        let wide = constant.is_wide();
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index as u16)
    }

    /// Index of a Utf8 constant with this text, appending one if needed
    pub fn utf8_index(&mut self, text: &str) -> Result<u16, ClassFileError> {
        let encoded = mutf8::encode(text);
        if let Some(index) = self
            .entries
            .iter()
            .position(|c| matches!(c, Constant::Utf8(bytes) if *bytes == encoded))
        {
            return Ok(index as u16);
        }
        self.push(Constant::Utf8(encoded))
    }

    pub fn class_index(&mut self, internal_name: &str) -> Result<u16, ClassFileError> {
        let name = self.utf8_index(internal_name)?;
        if let Some(index) = self
            .entries
            .iter()
            .position(|c| matches!(c, Constant::Class(i) if *i == name))
        {
            return Ok(index as u16);
        }
        self.push(Constant::Class(name))
    }

    pub fn set_utf8(&mut self, index: u16, text: &str) {
        if let Some(slot @ Constant::Utf8(_)) = self.entries.get_mut(index as usize) {
            *slot = Constant::Utf8(mutf8::encode(text));
        }
    }
}

/// Checked `u16` length prefix
pub(crate) fn u16_len(what: &'static str, len: usize) -> Result<u16, ClassFileError> {
    u16::try_from(len).map_err(|_| ClassFileError::TooLong { what, len })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstPool::new();
        let long = pool.push(Constant::Long(42)).unwrap();
        let text = pool.utf8_index("x").unwrap();
        assert_eq!(long, 1);
        assert_eq!(text, 3);
        assert_eq!(pool.get(2), Some(&Constant::Unusable));
    }

    #[test]
    fn parse_write_round_trip() {
        let mut pool = ConstPool::new();
        pool.class_index("org/foo/Bar").unwrap();
        pool.push(Constant::Double(7)).unwrap();
        pool.push(Constant::Integer(3)).unwrap();

        let mut w = ByteWriter::default();
        pool.write(&mut w).unwrap();
        let bytes = w.into_inner();

        let parsed = ConstPool::parse(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(parsed, pool);
        assert_eq!(parsed.class_name(2).as_deref(), Some("org/foo/Bar"));
    }

    #[test]
    fn interning_reuses_existing_entries() {
        let mut pool = ConstPool::new();
        let a = pool.class_index("a/B").unwrap();
        let b = pool.class_index("a/B").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn oversized_utf8_is_an_error() {
        let mut pool = ConstPool::new();
        pool.utf8_index(&"x".repeat(70_000)).unwrap();
        let err = pool.write(&mut ByteWriter::default()).unwrap_err();
        assert!(matches!(
            err,
            ClassFileError::TooLong {
                what: "Utf8 constant",
                len: 70_000
            }
        ));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let bytes = [0x00, 0x02, 0x02, 0x00];
        let err = ConstPool::parse(&mut ByteReader::new(&bytes)).unwrap_err();
        assert!(matches!(
            err,
            ClassFileError::BadConstantTag { tag: 2, index: 1 }
        ));
    }
}
