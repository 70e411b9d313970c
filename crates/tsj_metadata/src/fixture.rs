//! In-memory classfile and jar writers for tests.
//!
//! The encoder is the inverse of [`crate::classfile::read_class`] for the
//! attributes resolution cares about. It never emits `Code`, so the classes
//! it produces are loadable metadata only.

use crate::classfile::{
    AccessFlags, Annotation, AnnotationSet, ConstantValue, ElementValue, EnclosingMethod,
    InnerClass, ModuleAttribute, ModulePackageGrant, RecordComponent, TypeAnnotation,
    TypeAnnotationTarget,
};
use rustc_hash::FxHashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::ZipWriter;

#[derive(Debug, Clone)]
pub enum AttributeSpec {
    Signature(String),
    SourceFile(String),
    Deprecated,
    Synthetic,
    ConstantValue(ConstantValue),
    Exceptions(Vec<String>),
    MethodParameters(Vec<(Option<String>, u16)>),
    Annotations(AnnotationSet),
    VisibleParameterAnnotations(Vec<Vec<Annotation>>),
    InvisibleParameterAnnotations(Vec<Vec<Annotation>>),
    AnnotationDefault(ElementValue),
    InnerClasses(Vec<InnerClass>),
    EnclosingMethod(EnclosingMethod),
    NestHost(String),
    NestMembers(Vec<String>),
    PermittedSubclasses(Vec<String>),
    Record(Vec<RecordComponent>),
    Module(ModuleAttribute),
    ModulePackages(Vec<String>),
    /// Arbitrary attribute body, written verbatim.
    Raw { name: String, body: Vec<u8> },
}

/// A field or method declaration.
#[derive(Debug, Clone)]
pub struct MemberSpec {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub attributes: Vec<AttributeSpec>,
}

impl MemberSpec {
    pub fn new(access: u16, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            attributes: Vec::new(),
        }
    }

    pub fn public(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self::new(AccessFlags::PUBLIC, name, descriptor)
    }

    pub fn with(mut self, attribute: AttributeSpec) -> Self {
        self.attributes.push(attribute);
        self
    }
}

/// Builds the bytes of one classfile.
#[derive(Debug, Clone)]
pub struct ClassFileBuilder {
    major: u16,
    minor: u16,
    access: u16,
    this_class: String,
    super_class: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<MemberSpec>,
    methods: Vec<MemberSpec>,
    attributes: Vec<AttributeSpec>,
}

impl ClassFileBuilder {
    /// A public class extending `java/lang/Object`, major version 61.
    pub fn new(internal_name: impl Into<String>) -> Self {
        Self {
            major: 61,
            minor: 0,
            access: AccessFlags::PUBLIC | AccessFlags::SUPER,
            this_class: internal_name.into(),
            super_class: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// A public interface extending `java/lang/Object`.
    pub fn interface(internal_name: impl Into<String>) -> Self {
        Self::new(internal_name)
            .access(AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT)
    }

    /// A `module-info` class carrying `module` and, when non-empty, `packages`.
    pub fn module_info(module: ModuleAttribute, packages: Vec<String>) -> Self {
        let mut builder = Self::new("module-info").access(AccessFlags::MODULE).no_super();
        builder = builder.attribute(AttributeSpec::Module(module));
        if !packages.is_empty() {
            builder = builder.attribute(AttributeSpec::ModulePackages(packages));
        }
        builder
    }

    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.major = major;
        self.minor = minor;
        self
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn super_class(mut self, name: impl Into<String>) -> Self {
        self.super_class = Some(name.into());
        self
    }

    pub fn no_super(mut self) -> Self {
        self.super_class = None;
        self
    }

    pub fn implements(mut self, name: impl Into<String>) -> Self {
        self.interfaces.push(name.into());
        self
    }

    pub fn field(mut self, field: MemberSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MemberSpec) -> Self {
        self.methods.push(method);
        self
    }

    pub fn attribute(mut self, attribute: AttributeSpec) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = PoolWriter::default();
        let mut body = Vec::new();

        put_u2(&mut body, self.access);
        put_u2(&mut body, pool.class(&self.this_class));
        let super_index = self
            .super_class
            .as_deref()
            .map(|name| pool.class(name))
            .unwrap_or(0);
        put_u2(&mut body, super_index);
        put_u2(&mut body, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            put_u2(&mut body, pool.class(interface));
        }

        for members in [&self.fields, &self.methods] {
            put_u2(&mut body, members.len() as u16);
            for member in members {
                put_u2(&mut body, member.access);
                put_u2(&mut body, pool.utf8(&member.name));
                put_u2(&mut body, pool.utf8(&member.descriptor));
                write_attributes(&mut body, &mut pool, &member.attributes);
            }
        }
        write_attributes(&mut body, &mut pool, &self.attributes);

        let mut out = Vec::with_capacity(body.len() + pool.bytes.len() + 10);
        out.extend_from_slice(&0xCAFE_BABE_u32.to_be_bytes());
        put_u2(&mut out, self.minor);
        put_u2(&mut out, self.major);
        put_u2(&mut out, pool.next_index);
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        out
    }
}

fn write_attributes(out: &mut Vec<u8>, pool: &mut PoolWriter, attributes: &[AttributeSpec]) {
    let mut encoded: Vec<(u16, Vec<u8>)> = Vec::new();
    for attribute in attributes {
        encode_attribute(attribute, pool, &mut encoded);
    }
    put_u2(out, encoded.len() as u16);
    for (name_index, body) in encoded {
        put_u2(out, name_index);
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
    }
}

fn encode_attribute(
    attribute: &AttributeSpec,
    pool: &mut PoolWriter,
    out: &mut Vec<(u16, Vec<u8>)>,
) {
    let mut body = Vec::new();
    let name = match attribute {
        AttributeSpec::Signature(signature) => {
            put_u2(&mut body, pool.utf8(signature));
            "Signature"
        }
        AttributeSpec::SourceFile(file) => {
            put_u2(&mut body, pool.utf8(file));
            "SourceFile"
        }
        AttributeSpec::Deprecated => "Deprecated",
        AttributeSpec::Synthetic => "Synthetic",
        AttributeSpec::ConstantValue(value) => {
            put_u2(&mut body, pool.constant(value));
            "ConstantValue"
        }
        AttributeSpec::Exceptions(classes)
        | AttributeSpec::NestMembers(classes)
        | AttributeSpec::PermittedSubclasses(classes) => {
            put_class_list(&mut body, pool, classes);
            match attribute {
                AttributeSpec::Exceptions(_) => "Exceptions",
                AttributeSpec::NestMembers(_) => "NestMembers",
                _ => "PermittedSubclasses",
            }
        }
        AttributeSpec::MethodParameters(parameters) => {
            body.push(parameters.len() as u8);
            for (name, access) in parameters {
                put_u2(&mut body, name.as_deref().map(|n| pool.utf8(n)).unwrap_or(0));
                put_u2(&mut body, *access);
            }
            "MethodParameters"
        }
        AttributeSpec::Annotations(set) => {
            encode_annotation_set(set, pool, out);
            return;
        }
        AttributeSpec::VisibleParameterAnnotations(parameters)
        | AttributeSpec::InvisibleParameterAnnotations(parameters) => {
            body.push(parameters.len() as u8);
            for annotations in parameters {
                put_annotations(&mut body, pool, annotations);
            }
            if matches!(attribute, AttributeSpec::VisibleParameterAnnotations(_)) {
                "RuntimeVisibleParameterAnnotations"
            } else {
                "RuntimeInvisibleParameterAnnotations"
            }
        }
        AttributeSpec::AnnotationDefault(value) => {
            put_element_value(&mut body, pool, value);
            "AnnotationDefault"
        }
        AttributeSpec::InnerClasses(classes) => {
            put_u2(&mut body, classes.len() as u16);
            for inner in classes {
                put_u2(&mut body, pool.class(&inner.inner_class));
                put_u2(&mut body, pool.optional_class(inner.outer_class.as_deref()));
                put_u2(
                    &mut body,
                    inner.inner_name.as_deref().map(|n| pool.utf8(n)).unwrap_or(0),
                );
                put_u2(&mut body, inner.access.0);
            }
            "InnerClasses"
        }
        AttributeSpec::EnclosingMethod(enclosing) => {
            put_u2(&mut body, pool.class(&enclosing.class));
            let method = match (&enclosing.method_name, &enclosing.method_descriptor) {
                (Some(name), Some(descriptor)) => pool.name_and_type(name, descriptor),
                _ => 0,
            };
            put_u2(&mut body, method);
            "EnclosingMethod"
        }
        AttributeSpec::NestHost(host) => {
            put_u2(&mut body, pool.class(host));
            "NestHost"
        }
        AttributeSpec::Record(components) => {
            put_u2(&mut body, components.len() as u16);
            for component in components {
                put_u2(&mut body, pool.utf8(&component.name));
                put_u2(&mut body, pool.utf8(&component.descriptor));
                let mut nested = Vec::new();
                if let Some(signature) = &component.signature {
                    nested.push(AttributeSpec::Signature(signature.clone()));
                }
                if !component.annotations.is_empty() {
                    nested.push(AttributeSpec::Annotations(component.annotations.clone()));
                }
                write_attributes(&mut body, pool, &nested);
            }
            "Record"
        }
        AttributeSpec::Module(module) => {
            put_module(&mut body, pool, module);
            "Module"
        }
        AttributeSpec::ModulePackages(packages) => {
            put_u2(&mut body, packages.len() as u16);
            for package in packages {
                put_u2(&mut body, pool.package(package));
            }
            "ModulePackages"
        }
        AttributeSpec::Raw { name, body: raw } => {
            out.push((pool.utf8(name), raw.clone()));
            return;
        }
    };
    out.push((pool.utf8(name), body));
}

fn encode_annotation_set(
    set: &AnnotationSet,
    pool: &mut PoolWriter,
    out: &mut Vec<(u16, Vec<u8>)>,
) {
    let declaration_kinds = [
        ("RuntimeVisibleAnnotations", &set.visible),
        ("RuntimeInvisibleAnnotations", &set.invisible),
    ];
    for (name, annotations) in declaration_kinds {
        if annotations.is_empty() {
            continue;
        }
        let mut body = Vec::new();
        put_annotations(&mut body, pool, annotations);
        out.push((pool.utf8(name), body));
    }

    let type_kinds = [
        ("RuntimeVisibleTypeAnnotations", &set.visible_type),
        ("RuntimeInvisibleTypeAnnotations", &set.invisible_type),
    ];
    for (name, annotations) in type_kinds {
        if annotations.is_empty() {
            continue;
        }
        let mut body = Vec::new();
        put_u2(&mut body, annotations.len() as u16);
        for annotation in annotations {
            put_type_annotation(&mut body, pool, annotation);
        }
        out.push((pool.utf8(name), body));
    }
}

fn put_annotations(out: &mut Vec<u8>, pool: &mut PoolWriter, annotations: &[Annotation]) {
    put_u2(out, annotations.len() as u16);
    for annotation in annotations {
        put_annotation(out, pool, annotation);
    }
}

fn put_annotation(out: &mut Vec<u8>, pool: &mut PoolWriter, annotation: &Annotation) {
    put_u2(out, pool.utf8(&annotation.type_descriptor));
    put_u2(out, annotation.elements.len() as u16);
    for element in &annotation.elements {
        put_u2(out, pool.utf8(&element.name));
        put_element_value(out, pool, &element.value);
    }
}

fn put_element_value(out: &mut Vec<u8>, pool: &mut PoolWriter, value: &ElementValue) {
    match value {
        ElementValue::Const { tag, value } => {
            out.push(*tag as u8);
            let index = match value {
                // String-valued elements point at a Utf8 entry directly.
                ConstantValue::String(text) => pool.utf8(text),
                other => pool.constant(other),
            };
            put_u2(out, index);
        }
        ElementValue::Enum {
            type_descriptor,
            const_name,
        } => {
            out.push(b'e');
            put_u2(out, pool.utf8(type_descriptor));
            put_u2(out, pool.utf8(const_name));
        }
        ElementValue::Class(descriptor) => {
            out.push(b'c');
            put_u2(out, pool.utf8(descriptor));
        }
        ElementValue::Annotation(annotation) => {
            out.push(b'@');
            put_annotation(out, pool, annotation);
        }
        ElementValue::Array(values) => {
            out.push(b'[');
            put_u2(out, values.len() as u16);
            for value in values {
                put_element_value(out, pool, value);
            }
        }
    }
}

fn put_type_annotation(out: &mut Vec<u8>, pool: &mut PoolWriter, annotation: &TypeAnnotation) {
    out.push(annotation.target_type);
    match &annotation.target {
        TypeAnnotationTarget::TypeParameter { index } => out.push(*index),
        TypeAnnotationTarget::Supertype { index } => put_u2(out, *index),
        TypeAnnotationTarget::TypeParameterBound { parameter, bound } => {
            out.push(*parameter);
            out.push(*bound);
        }
        TypeAnnotationTarget::Empty => {}
        TypeAnnotationTarget::FormalParameter { index } => out.push(*index),
        TypeAnnotationTarget::Throws { index } => put_u2(out, *index),
        TypeAnnotationTarget::LocalVariable { ranges } => {
            put_u2(out, ranges.len() as u16);
            for range in ranges {
                put_u2(out, range.start_pc);
                put_u2(out, range.length);
                put_u2(out, range.index);
            }
        }
        TypeAnnotationTarget::Catch {
            exception_table_index,
        } => put_u2(out, *exception_table_index),
        TypeAnnotationTarget::Offset { offset } => put_u2(out, *offset),
        TypeAnnotationTarget::TypeArgument { offset, index } => {
            put_u2(out, *offset);
            out.push(*index);
        }
    }
    out.push(annotation.type_path.len() as u8);
    for step in &annotation.type_path {
        out.push(step.kind);
        out.push(step.argument_index);
    }
    put_annotation(out, pool, &annotation.annotation);
}

fn put_module(out: &mut Vec<u8>, pool: &mut PoolWriter, module: &ModuleAttribute) {
    put_u2(out, pool.module(&module.name));
    put_u2(out, module.flags);
    put_u2(out, module.version.as_deref().map(|v| pool.utf8(v)).unwrap_or(0));

    put_u2(out, module.requires.len() as u16);
    for requires in &module.requires {
        put_u2(out, pool.module(&requires.module));
        put_u2(out, requires.flags);
        put_u2(out, requires.version.as_deref().map(|v| pool.utf8(v)).unwrap_or(0));
    }

    for grants in [&module.exports, &module.opens] {
        put_grants(out, pool, grants);
    }

    put_class_list(out, pool, &module.uses);

    put_u2(out, module.provides.len() as u16);
    for provides in &module.provides {
        put_u2(out, pool.class(&provides.service));
        put_class_list(out, pool, &provides.implementations);
    }
}

fn put_grants(out: &mut Vec<u8>, pool: &mut PoolWriter, grants: &[ModulePackageGrant]) {
    put_u2(out, grants.len() as u16);
    for grant in grants {
        put_u2(out, pool.package(&grant.package));
        put_u2(out, grant.flags);
        put_u2(out, grant.targets.len() as u16);
        for target in &grant.targets {
            put_u2(out, pool.module(target));
        }
    }
}

fn put_class_list(out: &mut Vec<u8>, pool: &mut PoolWriter, classes: &[String]) {
    put_u2(out, classes.len() as u16);
    for class in classes {
        put_u2(out, pool.class(class));
    }
}

fn put_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Interning constant pool encoder.
struct PoolWriter {
    bytes: Vec<u8>,
    next_index: u16,
    interned: FxHashMap<(u8, String), u16>,
}

impl Default for PoolWriter {
    fn default() -> Self {
        Self {
            bytes: Vec::new(),
            next_index: 1,
            interned: FxHashMap::default(),
        }
    }
}

impl PoolWriter {
    fn intern(
        &mut self,
        tag: u8,
        key: String,
        slots: u16,
        payload: impl FnOnce(&mut Self) -> Vec<u8>,
    ) -> u16 {
        if let Some(index) = self.interned.get(&(tag, key.clone())) {
            return *index;
        }
        let encoded = payload(self);
        let index = self.next_index;
        self.bytes.push(tag);
        self.bytes.extend_from_slice(&encoded);
        self.next_index += slots;
        self.interned.insert((tag, key), index);
        index
    }

    fn utf8(&mut self, value: &str) -> u16 {
        self.intern(1, value.to_string(), 1, |_| {
            let encoded = encode_modified_utf8(value);
            let mut payload = (encoded.len() as u16).to_be_bytes().to_vec();
            payload.extend_from_slice(&encoded);
            payload
        })
    }

    fn indirect(&mut self, tag: u8, value: &str) -> u16 {
        self.intern(tag, value.to_string(), 1, |pool| {
            pool.utf8(value).to_be_bytes().to_vec()
        })
    }

    fn class(&mut self, name: &str) -> u16 {
        self.indirect(7, name)
    }

    fn optional_class(&mut self, name: Option<&str>) -> u16 {
        name.map(|name| self.class(name)).unwrap_or(0)
    }

    fn module(&mut self, name: &str) -> u16 {
        self.indirect(19, name)
    }

    fn package(&mut self, name: &str) -> u16 {
        self.indirect(20, name)
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        self.intern(12, format!("{name}:{descriptor}"), 1, |pool| {
            let mut payload = pool.utf8(name).to_be_bytes().to_vec();
            payload.extend_from_slice(&pool.utf8(descriptor).to_be_bytes());
            payload
        })
    }

    fn constant(&mut self, value: &ConstantValue) -> u16 {
        match value {
            ConstantValue::Int(v) => self.intern(3, v.to_string(), 1, |_| v.to_be_bytes().to_vec()),
            ConstantValue::Float(v) => {
                self.intern(4, v.to_bits().to_string(), 1, |_| v.to_bits().to_be_bytes().to_vec())
            }
            ConstantValue::Long(v) => {
                self.intern(5, v.to_string(), 2, |_| v.to_be_bytes().to_vec())
            }
            ConstantValue::Double(v) => {
                self.intern(6, v.to_bits().to_string(), 2, |_| v.to_bits().to_be_bytes().to_vec())
            }
            ConstantValue::String(text) => self.indirect(8, text),
        }
    }
}

fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) as u8 & 0x1F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) as u8 & 0x0F));
                out.push(0x80 | ((unit >> 6) as u8 & 0x3F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
        }
    }
    out
}

/// Writes `bytes` to `<root>/<internal_name>.class`, creating parent directories.
pub fn write_class(root: &Path, internal_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    let path = root.join(format!("{internal_name}.class"));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, bytes)?;
    Ok(path)
}

/// Builds a jar (zip) archive with an optional manifest.
#[derive(Debug, Clone, Default)]
pub struct JarBuilder {
    manifest: Vec<(String, String)>,
    entries: Vec<(String, Vec<u8>)>,
}

impl JarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manifest_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.manifest.push((key.into(), value.into()));
        self
    }

    pub fn multi_release(self) -> Self {
        self.manifest_attribute("Multi-Release", "true")
    }

    pub fn entry(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.entries.push((name.into(), bytes));
        self
    }

    /// Adds `<internal_name>.class`.
    pub fn class(self, internal_name: &str, bytes: Vec<u8>) -> Self {
        self.entry(format!("{internal_name}.class"), bytes)
    }

    /// Adds `META-INF/versions/<release>/<internal_name>.class`.
    pub fn versioned_class(self, release: u32, internal_name: &str, bytes: Vec<u8>) -> Self {
        self.entry(
            format!("META-INF/versions/{release}/{internal_name}.class"),
            bytes,
        )
    }

    pub fn write(&self, path: &Path) -> zip::result::ZipResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = ZipWriter::new(File::create(path)?);
        let options = FileOptions::default();
        if !self.manifest.is_empty() {
            writer.start_file("META-INF/MANIFEST.MF", options)?;
            let mut manifest = String::from("Manifest-Version: 1.0\r\n");
            for (key, value) in &self.manifest {
                manifest.push_str(&format!("{key}: {value}\r\n"));
            }
            manifest.push_str("\r\n");
            writer.write_all(manifest.as_bytes())?;
        }
        for (name, bytes) in &self.entries {
            writer.start_file(name.as_str(), options)?;
            writer.write_all(bytes)?;
        }
        writer.finish()?;
        Ok(())
    }
}
