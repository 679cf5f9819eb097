use thiserror::Error;

use crate::jar::core::{
    attributes::{
        parse_attributes, write_attributes, Annotation, AttrBody, Attribute, ElementValue,
    },
    bytecode::{ByteReader, ByteWriter},
    cpool::{u16_len, ConstPool, Constant},
};

const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_SUPER: u16 = 0x0020;

#[derive(Debug, Error)]
pub enum ClassFileError {
    #[error("Unexpected end of class file at offset {0}")]
    Truncated(usize),
    #[error("Bad magic number {0:#010x}")]
    BadMagic(u32),
    #[error("Unknown constant pool tag {tag} at index {index}")]
    BadConstantTag { tag: u8, index: usize },
    #[error("Constant pool would exceed 65535 entries")]
    PoolOverflow,
    #[error("{what} length {len} does not fit in 16 bits")]
    TooLong { what: &'static str, len: usize },
    #[error("Malformed attribute: {0}")]
    BadAttribute(String),
    #[error("Trailing bytes after class file end at offset {0}")]
    TrailingBytes(usize),
}

/// How a `CONSTANT_Utf8` slot is used at one reference site
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SymbolRole {
    /// Member, attribute or parameter name; never rewritten
    Name,
    /// Internal name (or array descriptor) behind a `CONSTANT_Class`
    ClassName,
    /// Field or method descriptor
    Descriptor,
    /// Generic signature
    Signature,
    /// String literal, from `CONSTANT_String` or an annotation value
    StringValue,
    /// `SourceFile` debug attribute
    SourceFile,
}

/// A field or method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub pool: ConstPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Minimal class `name extends super_name` with an empty body.
    pub fn new(major_version: u16, name: &str, super_name: Option<&str>) -> Self {
        let mut pool = ConstPool::new();
        // A fresh pool cannot overflow with two entries
        let this_class = pool.class_index(name).unwrap_or_default();
        let super_class = super_name
            .map(|s| pool.class_index(s).unwrap_or_default())
            .unwrap_or_default();
        Self {
            minor_version: 0,
            major_version,
            pool,
            access_flags: ACC_PUBLIC | ACC_SUPER,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, ClassFileError> {
        let mut r = ByteReader::new(data);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::BadMagic(magic));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let pool = ConstPool::parse(&mut r)?;
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;

        let interface_count = r.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(r.u16()?);
        }

        let fields = parse_members(&mut r, &pool)?;
        let methods = parse_members(&mut r, &pool)?;
        let attributes = parse_attributes(&mut r, &pool)?;

        if !r.is_empty() {
            return Err(ClassFileError::TrailingBytes(r.position()));
        }

        Ok(Self {
            minor_version,
            major_version,
            pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ClassFileError> {
        let mut w = ByteWriter::with_capacity(1024);
        w.u32(MAGIC);
        w.u16(self.minor_version);
        w.u16(self.major_version);
        self.pool.write(&mut w)?;
        w.u16(self.access_flags);
        w.u16(self.this_class);
        w.u16(self.super_class);
        w.u16(u16_len("interface table", self.interfaces.len())?);
        for interface in &self.interfaces {
            w.u16(*interface);
        }
        write_members(&mut w, &self.fields)?;
        write_members(&mut w, &self.methods)?;
        write_attributes(&mut w, &self.attributes);
        Ok(w.into_inner())
    }

    pub fn this_class_name(&self) -> Option<String> {
        self.pool.class_name(self.this_class)
    }

    pub fn add_interface(&mut self, name: &str) -> Result<(), ClassFileError> {
        let index = self.pool.class_index(name)?;
        self.interfaces.push(index);
        Ok(())
    }

    pub fn add_field(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<(), ClassFileError> {
        let name_index = self.pool.utf8_index(name)?;
        let descriptor_index = self.pool.utf8_index(descriptor)?;
        self.fields.push(Member {
            access_flags,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        Ok(())
    }

    /// Adds a `CONSTANT_String` as an `ldc` in user code would.
    pub fn add_string_constant(&mut self, value: &str) -> Result<u16, ClassFileError> {
        let utf8 = self.pool.utf8_index(value)?;
        self.pool.push(Constant::String(utf8))
    }

    pub fn add_attribute(&mut self, name: &str, body: AttrBody) -> Result<(), ClassFileError> {
        let name_index = self.pool.utf8_index(name)?;
        self.attributes.push(Attribute { name_index, body });
        Ok(())
    }

    /// Whether any attribute of unknown layout is present.
    pub fn has_opaque_attributes(&self) -> bool {
        let pool = &self.pool;
        self.attributes
            .iter()
            .chain(self.fields.iter().flat_map(|f| f.attributes.iter()))
            .chain(self.methods.iter().flat_map(|m| m.attributes.iter()))
            .any(|a| a.is_opaque(pool))
    }

    /// Visits every reference to a Utf8 slot, tagged with how the slot is
    /// used at that site. The visitor may repoint the reference.
    pub fn visit_symbols(&mut self, visit: &mut dyn FnMut(SymbolRole, &mut u16)) {
        for constant in self.pool.entries_mut() {
            match constant {
                Constant::Class(name) => visit(SymbolRole::ClassName, name),
                Constant::String(value) => visit(SymbolRole::StringValue, value),
                Constant::NameAndType { name, descriptor } => {
                    visit(SymbolRole::Name, name);
                    visit(SymbolRole::Descriptor, descriptor);
                }
                Constant::MethodType(descriptor) => visit(SymbolRole::Descriptor, descriptor),
                Constant::Module(name) | Constant::Package(name) => visit(SymbolRole::Name, name),
                _ => {}
            }
        }

        for member in self.fields.iter_mut().chain(self.methods.iter_mut()) {
            visit(SymbolRole::Name, &mut member.name_index);
            visit(SymbolRole::Descriptor, &mut member.descriptor_index);
            visit_attributes(&mut member.attributes, visit);
        }

        visit_attributes(&mut self.attributes, visit);
    }
}

fn parse_members(r: &mut ByteReader<'_>, pool: &ConstPool) -> Result<Vec<Member>, ClassFileError> {
    let count = r.u16()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        members.push(Member {
            access_flags: r.u16()?,
            name_index: r.u16()?,
            descriptor_index: r.u16()?,
            attributes: parse_attributes(r, pool)?,
        });
    }
    Ok(members)
}

fn write_members(w: &mut ByteWriter, members: &[Member]) -> Result<(), ClassFileError> {
    w.u16(u16_len("member table", members.len())?);
    for member in members {
        w.u16(member.access_flags);
        w.u16(member.name_index);
        w.u16(member.descriptor_index);
        write_attributes(w, &member.attributes);
    }
    Ok(())
}

fn visit_attributes(attributes: &mut [Attribute], visit: &mut dyn FnMut(SymbolRole, &mut u16)) {
    for attribute in attributes {
        visit(SymbolRole::Name, &mut attribute.name_index);
        match &mut attribute.body {
            AttrBody::SourceFile(index) => visit(SymbolRole::SourceFile, index),
            AttrBody::Signature(index) => visit(SymbolRole::Signature, index),
            AttrBody::Code(code) => visit_attributes(&mut code.attributes, visit),
            AttrBody::LocalVariableTable(vars) => {
                for var in vars {
                    visit(SymbolRole::Name, &mut var.name_index);
                    visit(SymbolRole::Descriptor, &mut var.descriptor_index);
                }
            }
            AttrBody::LocalVariableTypeTable(vars) => {
                for var in vars {
                    visit(SymbolRole::Name, &mut var.name_index);
                    visit(SymbolRole::Signature, &mut var.descriptor_index);
                }
            }
            AttrBody::InnerClasses(classes) => {
                for class in classes.iter_mut().filter(|c| c.inner_name_index != 0) {
                    visit(SymbolRole::Name, &mut class.inner_name_index);
                }
            }
            AttrBody::MethodParameters(params) => {
                for param in params.iter_mut().filter(|p| p.name_index != 0) {
                    visit(SymbolRole::Name, &mut param.name_index);
                }
            }
            AttrBody::Annotations(annotations) => {
                for annotation in annotations {
                    visit_annotation(annotation, visit);
                }
            }
            AttrBody::ParameterAnnotations(params) => {
                for annotation in params.iter_mut().flatten() {
                    visit_annotation(annotation, visit);
                }
            }
            AttrBody::TypeAnnotations(annotations) => {
                for annotation in annotations {
                    visit_annotation(&mut annotation.annotation, visit);
                }
            }
            AttrBody::AnnotationDefault(value) => visit_element_value(value, visit),
            AttrBody::Record(components) => {
                for component in components {
                    visit(SymbolRole::Name, &mut component.name_index);
                    visit(SymbolRole::Descriptor, &mut component.descriptor_index);
                    visit_attributes(&mut component.attributes, visit);
                }
            }
            AttrBody::Raw(_) => {}
        }
    }
}

fn visit_annotation(annotation: &mut Annotation, visit: &mut dyn FnMut(SymbolRole, &mut u16)) {
    visit(SymbolRole::Descriptor, &mut annotation.type_index);
    for (name, value) in &mut annotation.pairs {
        visit(SymbolRole::Name, name);
        visit_element_value(value, visit);
    }
}

fn visit_element_value(value: &mut ElementValue, visit: &mut dyn FnMut(SymbolRole, &mut u16)) {
    match value {
        ElementValue::Const { tag: b's', index } => visit(SymbolRole::StringValue, index),
        ElementValue::Const { .. } => {}
        ElementValue::Enum {
            type_name,
            const_name,
        } => {
            visit(SymbolRole::Descriptor, type_name);
            visit(SymbolRole::Name, const_name);
        }
        ElementValue::Class(index) => visit(SymbolRole::Descriptor, index),
        ElementValue::Annotation(annotation) => visit_annotation(annotation, visit),
        ElementValue::Array(values) => {
            for value in values {
                visit_element_value(value, visit);
            }
        }
    }
}
