//! Shared helpers for jarshade integration tests.
//!
//! Archives are built in temp directories; classes are built with the
//! crate's own class file model.

#![allow(dead_code)]

use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use jarshade::{
    jar::core::{classfile::ACC_PUBLIC, ClassFile},
    ShadeRequest,
};
use zip::{write::FileOptions, ZipArchive, ZipWriter};

/// Class `name` with one public field per entry of `field_types`, each
/// holding an instance of that class.
pub fn class_bytes(name: &str, field_types: &[&str]) -> Vec<u8> {
    class_with(name, field_types, &[], &[])
}

pub fn class_with(
    name: &str,
    field_types: &[&str],
    interfaces: &[&str],
    strings: &[&str],
) -> Vec<u8> {
    let mut class = ClassFile::new(52, name, Some("java/lang/Object"));
    for interface in interfaces {
        class.add_interface(interface).unwrap();
    }
    for (i, ty) in field_types.iter().enumerate() {
        class
            .add_field(ACC_PUBLIC, &format!("f{i}"), &format!("L{ty};"))
            .unwrap();
    }
    for value in strings {
        class.add_string_constant(value).unwrap();
    }
    class.to_bytes().unwrap()
}

pub fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, data) in entries {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Every entry of the archive in archive order, directories included
pub fn read_jar(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..zip.len())
        .map(|i| {
            let mut file = zip.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            (file.name().to_owned(), data)
        })
        .collect()
}

/// File entry names, directories left out
pub fn file_names(path: &Path) -> Vec<String> {
    read_jar(path)
        .into_iter()
        .map(|(name, _)| name)
        .filter(|name| !name.ends_with('/'))
        .collect()
}

pub fn entry(path: &Path, name: &str) -> Option<Vec<u8>> {
    read_jar(path)
        .into_iter()
        .find(|(entry, _)| entry == name)
        .map(|(_, data)| data)
}

pub fn request(inputs: Vec<PathBuf>, output: PathBuf) -> ShadeRequest {
    ShadeRequest {
        inputs,
        output,
        filters: Vec::new(),
        relocators: Vec::new(),
        transformers: Vec::new(),
        shade_sources_content: false,
    }
}
