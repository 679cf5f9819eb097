//! Class file attributes.
//!
//! Only the attributes that hold direct references to `CONSTANT_Utf8`
//! entries are parsed into structure; every other attribute is carried as
//! raw bytes, which is safe as long as existing constant pool slots keep
//! their indices.

use crate::jar::core::{
    bytecode::{ByteReader, ByteWriter},
    classfile::ClassFileError,
    cpool::ConstPool,
};

/// Raw attributes known to reference the constant pool only through
/// non-Utf8 slots (or not at all)
const TRANSPARENT_ATTRIBUTES: &[&str] = &[
    "ConstantValue",
    "Exceptions",
    "LineNumberTable",
    "StackMapTable",
    "EnclosingMethod",
    "NestHost",
    "NestMembers",
    "PermittedSubclasses",
    "BootstrapMethods",
    "Deprecated",
    "Synthetic",
    "SourceDebugExtension",
    "ModuleMainClass",
    "ModulePackages",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: u16,
    pub body: AttrBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrBody {
    SourceFile(u16),
    Signature(u16),
    Code(Box<Code>),
    LocalVariableTable(Vec<LocalVariable>),
    LocalVariableTypeTable(Vec<LocalVariable>),
    InnerClasses(Vec<InnerClass>),
    MethodParameters(Vec<MethodParameter>),
    /// `RuntimeVisibleAnnotations` / `RuntimeInvisibleAnnotations`
    Annotations(Vec<Annotation>),
    /// `Runtime(In)VisibleParameterAnnotations`
    ParameterAnnotations(Vec<Vec<Annotation>>),
    /// `Runtime(In)VisibleTypeAnnotations`
    TypeAnnotations(Vec<TypeAnnotation>),
    AnnotationDefault(ElementValue),
    Record(Vec<RecordComponent>),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    /// Exception table, 8 bytes per handler
    pub exception_table: Vec<u8>,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    /// Descriptor in a `LocalVariableTable`, signature in a
    /// `LocalVariableTypeTable`
    pub descriptor_index: u16,
    pub index: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClass {
    pub inner_class_info: u16,
    pub outer_class_info: u16,
    pub inner_name_index: u16,
    pub access_flags: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodParameter {
    pub name_index: u16,
    pub access_flags: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub type_index: u16,
    pub pairs: Vec<(u16, ElementValue)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnnotation {
    /// `target_type`, `target_info` and `type_path`, kept verbatim
    pub target: Vec<u8>,
    pub annotation: Annotation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or string constant; `tag` is one of `BCDFIJSZs`
    Const { tag: u8, index: u16 },
    Enum { type_name: u16, const_name: u16 },
    Class(u16),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordComponent {
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl Attribute {
    /// Raw attributes of unknown layout may point at Utf8 slots we cannot
    /// see, so their presence pins existing Utf8 contents.
    pub fn is_opaque(&self, pool: &ConstPool) -> bool {
        match &self.body {
            AttrBody::Raw(_) => match pool.utf8(self.name_index) {
                Some(name) => !TRANSPARENT_ATTRIBUTES.contains(&name.as_str()),
                None => true,
            },
            AttrBody::Code(code) => code.attributes.iter().any(|a| a.is_opaque(pool)),
            AttrBody::Record(components) => components
                .iter()
                .any(|c| c.attributes.iter().any(|a| a.is_opaque(pool))),
            _ => false,
        }
    }
}

pub fn parse_attributes(
    r: &mut ByteReader<'_>,
    pool: &ConstPool,
) -> Result<Vec<Attribute>, ClassFileError> {
    let count = r.u16()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        attributes.push(parse_attribute(r, pool)?);
    }
    Ok(attributes)
}

fn parse_attribute(r: &mut ByteReader<'_>, pool: &ConstPool) -> Result<Attribute, ClassFileError> {
    let name_index = r.u16()?;
    let len = r.u32()? as usize;
    let data = r.bytes(len)?;
    let name = pool.utf8(name_index).unwrap_or_default();

    let mut body_reader = ByteReader::new(data);
    let br = &mut body_reader;
    let body = match name.as_str() {
        "SourceFile" => AttrBody::SourceFile(br.u16()?),
        "Signature" => AttrBody::Signature(br.u16()?),
        "Code" => AttrBody::Code(Box::new(parse_code(br, pool)?)),
        "LocalVariableTable" => AttrBody::LocalVariableTable(parse_local_variables(br)?),
        "LocalVariableTypeTable" => AttrBody::LocalVariableTypeTable(parse_local_variables(br)?),
        "InnerClasses" => {
            let count = br.u16()?;
            let mut classes = Vec::with_capacity(count as usize);
            for _ in 0..count {
                classes.push(InnerClass {
                    inner_class_info: br.u16()?,
                    outer_class_info: br.u16()?,
                    inner_name_index: br.u16()?,
                    access_flags: br.u16()?,
                });
            }
            AttrBody::InnerClasses(classes)
        }
        "MethodParameters" => {
            let count = br.u8()?;
            let mut params = Vec::with_capacity(count as usize);
            for _ in 0..count {
                params.push(MethodParameter {
                    name_index: br.u16()?,
                    access_flags: br.u16()?,
                });
            }
            AttrBody::MethodParameters(params)
        }
        "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
            AttrBody::Annotations(parse_annotations(br)?)
        }
        "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
            let count = br.u8()?;
            let mut params = Vec::with_capacity(count as usize);
            for _ in 0..count {
                params.push(parse_annotations(br)?);
            }
            AttrBody::ParameterAnnotations(params)
        }
        "RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => {
            let count = br.u16()?;
            let mut annotations = Vec::with_capacity(count as usize);
            for _ in 0..count {
                annotations.push(parse_type_annotation(br)?);
            }
            AttrBody::TypeAnnotations(annotations)
        }
        "AnnotationDefault" => AttrBody::AnnotationDefault(parse_element_value(br)?),
        "Record" => {
            let count = br.u16()?;
            let mut components = Vec::with_capacity(count as usize);
            for _ in 0..count {
                components.push(RecordComponent {
                    name_index: br.u16()?,
                    descriptor_index: br.u16()?,
                    attributes: parse_attributes(br, pool)?,
                });
            }
            AttrBody::Record(components)
        }
        _ => {
            return Ok(Attribute {
                name_index,
                body: AttrBody::Raw(data.to_vec()),
            })
        }
    };

    if !body_reader.is_empty() {
        return Err(ClassFileError::BadAttribute(name));
    }

    Ok(Attribute { name_index, body })
}

fn parse_code(r: &mut ByteReader<'_>, pool: &ConstPool) -> Result<Code, ClassFileError> {
    let max_stack = r.u16()?;
    let max_locals = r.u16()?;
    let code_len = r.u32()? as usize;
    let code = r.bytes(code_len)?.to_vec();
    let handlers = r.u16()? as usize;
    let exception_table = r.bytes(handlers * 8)?.to_vec();
    let attributes = parse_attributes(r, pool)?;
    Ok(Code {
        max_stack,
        max_locals,
        code,
        exception_table,
        attributes,
    })
}

fn parse_local_variables(r: &mut ByteReader<'_>) -> Result<Vec<LocalVariable>, ClassFileError> {
    let count = r.u16()?;
    let mut vars = Vec::with_capacity(count as usize);
    for _ in 0..count {
        vars.push(LocalVariable {
            start_pc: r.u16()?,
            length: r.u16()?,
            name_index: r.u16()?,
            descriptor_index: r.u16()?,
            index: r.u16()?,
        });
    }
    Ok(vars)
}

fn parse_annotations(r: &mut ByteReader<'_>) -> Result<Vec<Annotation>, ClassFileError> {
    let count = r.u16()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        annotations.push(parse_annotation(r)?);
    }
    Ok(annotations)
}

fn parse_annotation(r: &mut ByteReader<'_>) -> Result<Annotation, ClassFileError> {
    let type_index = r.u16()?;
    let count = r.u16()?;
    let mut pairs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = r.u16()?;
        pairs.push((name, parse_element_value(r)?));
    }
    Ok(Annotation { type_index, pairs })
}

fn parse_element_value(r: &mut ByteReader<'_>) -> Result<ElementValue, ClassFileError> {
    let tag = r.u8()?;
    Ok(match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
            tag,
            index: r.u16()?,
        },
        b'e' => ElementValue::Enum {
            type_name: r.u16()?,
            const_name: r.u16()?,
        },
        b'c' => ElementValue::Class(r.u16()?),
        b'@' => ElementValue::Annotation(parse_annotation(r)?),
        b'[' => {
            let count = r.u16()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(parse_element_value(r)?);
            }
            ElementValue::Array(values)
        }
        _ => return Err(ClassFileError::BadAttribute(format!("element value tag {tag}"))),
    })
}

fn parse_type_annotation(r: &mut ByteReader<'_>) -> Result<TypeAnnotation, ClassFileError> {
    let start = r.position();
    let mut target = Vec::new();
    let target_type = r.u8()?;
    target.push(target_type);
    let info_len = match target_type {
        0x00 | 0x01 | 0x16 => 1,
        0x10 | 0x17 | 0x42 | 0x43 | 0x44 | 0x45 | 0x46 => 2,
        0x11 | 0x12 => 2,
        0x13..=0x15 => 0,
        0x47..=0x4B => 3,
        0x40 | 0x41 => {
            let table_len = r.u16()?;
            target.extend_from_slice(&table_len.to_be_bytes());
            table_len as usize * 6
        }
        other => {
            return Err(ClassFileError::BadAttribute(format!(
                "type annotation target {other:#04x} at {start}"
            )))
        }
    };
    target.extend_from_slice(r.bytes(info_len)?);
    let path_len = r.u8()?;
    target.push(path_len);
    target.extend_from_slice(r.bytes(path_len as usize * 2)?);

    Ok(TypeAnnotation {
        target,
        annotation: parse_annotation(r)?,
    })
}

pub fn write_attributes(w: &mut ByteWriter, attributes: &[Attribute]) {
    w.u16(attributes.len() as u16);
    for attribute in attributes {
        w.u16(attribute.name_index);
        w.length_prefixed(|w| write_body(w, &attribute.body));
    }
}

fn write_body(w: &mut ByteWriter, body: &AttrBody) {
    match body {
        AttrBody::SourceFile(i) | AttrBody::Signature(i) => w.u16(*i),
        AttrBody::Code(code) => {
            w.u16(code.max_stack);
            w.u16(code.max_locals);
            w.u32(code.code.len() as u32);
            w.bytes(&code.code);
            w.u16((code.exception_table.len() / 8) as u16);
            w.bytes(&code.exception_table);
            write_attributes(w, &code.attributes);
        }
        AttrBody::LocalVariableTable(vars) | AttrBody::LocalVariableTypeTable(vars) => {
            w.u16(vars.len() as u16);
            for var in vars {
                w.u16(var.start_pc);
                w.u16(var.length);
                w.u16(var.name_index);
                w.u16(var.descriptor_index);
                w.u16(var.index);
            }
        }
        AttrBody::InnerClasses(classes) => {
            w.u16(classes.len() as u16);
            for class in classes {
                w.u16(class.inner_class_info);
                w.u16(class.outer_class_info);
                w.u16(class.inner_name_index);
                w.u16(class.access_flags);
            }
        }
        AttrBody::MethodParameters(params) => {
            w.u8(params.len() as u8);
            for param in params {
                w.u16(param.name_index);
                w.u16(param.access_flags);
            }
        }
        AttrBody::Annotations(annotations) => write_annotations(w, annotations),
        AttrBody::ParameterAnnotations(params) => {
            w.u8(params.len() as u8);
            for annotations in params {
                write_annotations(w, annotations);
            }
        }
        AttrBody::TypeAnnotations(annotations) => {
            w.u16(annotations.len() as u16);
            for annotation in annotations {
                w.bytes(&annotation.target);
                write_annotation(w, &annotation.annotation);
            }
        }
        AttrBody::AnnotationDefault(value) => write_element_value(w, value),
        AttrBody::Record(components) => {
            w.u16(components.len() as u16);
            for component in components {
                w.u16(component.name_index);
                w.u16(component.descriptor_index);
                write_attributes(w, &component.attributes);
            }
        }
        AttrBody::Raw(data) => w.bytes(data),
    }
}

fn write_annotations(w: &mut ByteWriter, annotations: &[Annotation]) {
    w.u16(annotations.len() as u16);
    for annotation in annotations {
        write_annotation(w, annotation);
    }
}

fn write_annotation(w: &mut ByteWriter, annotation: &Annotation) {
    w.u16(annotation.type_index);
    w.u16(annotation.pairs.len() as u16);
    for (name, value) in &annotation.pairs {
        w.u16(*name);
        write_element_value(w, value);
    }
}

fn write_element_value(w: &mut ByteWriter, value: &ElementValue) {
    match value {
        ElementValue::Const { tag, index } => {
            w.u8(*tag);
            w.u16(*index);
        }
        ElementValue::Enum {
            type_name,
            const_name,
        } => {
            w.u8(b'e');
            w.u16(*type_name);
            w.u16(*const_name);
        }
        ElementValue::Class(index) => {
            w.u8(b'c');
            w.u16(*index);
        }
        ElementValue::Annotation(annotation) => {
            w.u8(b'@');
            write_annotation(w, annotation);
        }
        ElementValue::Array(values) => {
            w.u8(b'[');
            w.u16(values.len() as u16);
            for value in values {
                write_element_value(w, value);
            }
        }
    }
}
