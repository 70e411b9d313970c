//! Classfile decoding.
//!
//! [`read_class`] turns the bytes of one `.class` file into an immutable
//! [`ClassDescriptor`]. The reader keeps every member and attribute in the
//! order it appears on disk and fails fast on malformed input; callers decide
//! whether such a failure is fatal for their classpath scan.

mod attributes;
mod constant_pool;
mod model;
mod reader;

pub use model::{
    package_of, AccessFlags, Annotation, AnnotationElement, AnnotationSet, ClassDescriptor,
    ConstantValue, ElementValue, EnclosingMethod, FieldDescriptor, InnerClass,
    LocalVariableRange, MethodDescriptor, MethodParameter, ModuleAttribute, ModulePackageGrant,
    ModuleProvides, ModuleRequires, RecordComponent, TypeAnnotation, TypeAnnotationTarget,
    TypePathStep,
};

use attributes::{
    for_each_attribute, read_class_list, read_element_value, read_module, read_package_list,
    read_parameter_annotations, CommonAttributes,
};
use constant_pool::ConstantPool;
use reader::ClassReader;
use thiserror::Error;

/// Oldest classfile major version accepted (JDK 1.0.2).
pub const MIN_MAJOR_VERSION: u16 = 45;
/// Newest classfile major version accepted (Java 25).
pub const MAX_MAJOR_VERSION: u16 = 69;

/// Deepest annotation element nesting accepted before a class is rejected.
pub const MAX_ELEMENT_NESTING: usize = 64;

/// Malformed-binary failures. Each variant maps to a stable diagnostic code.
#[derive(Debug, Error)]
pub enum ClassfileError {
    #[error("unexpected end of class file at offset {offset} (needed {needed} more bytes)")]
    UnexpectedEof { offset: usize, needed: usize },
    #[error("invalid class file magic header {found:#010x}")]
    InvalidMagic { found: u32 },
    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("unsupported constant pool tag {tag} at index {index}")]
    UnsupportedConstant { tag: u8, index: u16 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("constant pool index {index} is not a {expected} entry")]
    UnexpectedConstant { index: u16, expected: &'static str },
    #[error("invalid modified UTF-8 in constant pool entry {index}")]
    InvalidUtf8 { index: u16 },
    #[error("invalid annotation element tag '{}'", *tag as char)]
    InvalidElementTag { tag: u8 },
    #[error("annotation element values nest deeper than {limit} levels")]
    ElementNestingTooDeep { limit: usize },
    #[error("invalid type annotation target {target:#04x}")]
    InvalidTypeAnnotationTarget { target: u8 },
    #[error("attribute {name} declares {declared} bytes but {consumed} were parsed")]
    AttributeLengthMismatch {
        name: String,
        declared: u32,
        consumed: usize,
    },
    #[error("{count} trailing bytes after class file end")]
    TrailingBytes { count: usize },
}

impl ClassfileError {
    /// Stable diagnostic code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            ClassfileError::UnexpectedEof { .. } => "TSJ-CF-TRUNCATED",
            ClassfileError::InvalidMagic { .. } => "TSJ-CF-MAGIC",
            ClassfileError::UnsupportedVersion { .. } => "TSJ-CF-VERSION",
            ClassfileError::UnsupportedConstant { .. } => "TSJ-CF-CONSTANT-TAG",
            ClassfileError::InvalidConstantIndex { .. } => "TSJ-CF-CONSTANT-INDEX",
            ClassfileError::UnexpectedConstant { .. } => "TSJ-CF-CONSTANT-KIND",
            ClassfileError::InvalidUtf8 { .. } => "TSJ-CF-UTF8",
            ClassfileError::InvalidElementTag { .. } => "TSJ-CF-ANNOTATION",
            ClassfileError::ElementNestingTooDeep { .. } => "TSJ-CF-ANNOTATION-DEPTH",
            ClassfileError::InvalidTypeAnnotationTarget { .. } => "TSJ-CF-TYPE-ANNOTATION",
            ClassfileError::AttributeLengthMismatch { .. } => "TSJ-CF-ATTRIBUTE-LENGTH",
            ClassfileError::TrailingBytes { .. } => "TSJ-CF-TRAILING",
        }
    }
}

/// Parses a complete classfile.
pub fn read_class(bytes: &[u8]) -> Result<ClassDescriptor, ClassfileError> {
    let mut reader = ClassReader::new(bytes);
    reader.expect_magic()?;
    let minor_version = reader.read_u2()?;
    let major_version = reader.read_u2()?;
    if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major_version) {
        return Err(ClassfileError::UnsupportedVersion {
            major: major_version,
            minor: minor_version,
        });
    }
    let pool = ConstantPool::parse(&mut reader)?;

    let access = AccessFlags(reader.read_u2()?);
    let internal_name = pool.class_name(reader.read_u2()?)?;
    let super_name = pool.optional_class_name(reader.read_u2()?)?;
    let interfaces = read_class_list(&mut reader, &pool)?;

    let field_count = reader.read_u2()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(read_field(&mut reader, &pool)?);
    }

    let method_count = reader.read_u2()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        methods.push(read_method(&mut reader, &pool)?);
    }

    let mut common = CommonAttributes::default();
    let mut source_file = None;
    let mut inner_classes = Vec::new();
    let mut enclosing_method = None;
    let mut nest_host = None;
    let mut nest_members = Vec::new();
    let mut record_components = Vec::new();
    let mut permitted_subclasses = Vec::new();
    let mut module = None;
    let mut module_packages = Vec::new();

    for_each_attribute(&mut reader, &pool, |name, body| {
        match name {
            "SourceFile" => source_file = Some(pool.utf8(body.read_u2()?)?.to_string()),
            "InnerClasses" => {
                let count = body.read_u2()?;
                for _ in 0..count {
                    inner_classes.push(InnerClass {
                        inner_class: pool.class_name(body.read_u2()?)?,
                        outer_class: pool.optional_class_name(body.read_u2()?)?,
                        inner_name: pool.optional_utf8(body.read_u2()?)?,
                        access: AccessFlags(body.read_u2()?),
                    });
                }
            }
            "EnclosingMethod" => {
                let class = pool.class_name(body.read_u2()?)?;
                let method_index = body.read_u2()?;
                let (method_name, method_descriptor) = if method_index == 0 {
                    (None, None)
                } else {
                    let (name, descriptor) = pool.name_and_type(method_index)?;
                    (Some(name), Some(descriptor))
                };
                enclosing_method = Some(EnclosingMethod {
                    class,
                    method_name,
                    method_descriptor,
                });
            }
            "NestHost" => nest_host = Some(pool.class_name(body.read_u2()?)?),
            "NestMembers" => nest_members = read_class_list(body, &pool)?,
            "PermittedSubclasses" => permitted_subclasses = read_class_list(body, &pool)?,
            "Record" => {
                let count = body.read_u2()?;
                for _ in 0..count {
                    record_components.push(read_record_component(body, &pool)?);
                }
            }
            "Module" => module = Some(read_module(body, &pool)?),
            "ModulePackages" => module_packages = read_package_list(body, &pool)?,
            other => return common.accept(other, body, &pool),
        }
        Ok(true)
    })?;

    if reader.remaining() != 0 {
        return Err(ClassfileError::TrailingBytes {
            count: reader.remaining(),
        });
    }

    Ok(ClassDescriptor {
        internal_name,
        minor_version,
        major_version,
        access,
        super_name,
        interfaces,
        signature: common.signature,
        source_file,
        deprecated: common.deprecated,
        synthetic: common.synthetic,
        annotations: common.annotations,
        fields,
        methods,
        inner_classes,
        enclosing_method,
        nest_host,
        nest_members,
        record_components,
        permitted_subclasses,
        module,
        module_packages,
    })
}

fn read_field(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<FieldDescriptor, ClassfileError> {
    let access = AccessFlags(reader.read_u2()?);
    let name = pool.utf8(reader.read_u2()?)?.to_string();
    let descriptor = pool.utf8(reader.read_u2()?)?.to_string();

    let mut common = CommonAttributes::default();
    let mut constant_value = None;
    for_each_attribute(reader, pool, |attribute, body| {
        if attribute == "ConstantValue" {
            constant_value = Some(pool.constant_value(body.read_u2()?)?);
            return Ok(true);
        }
        common.accept(attribute, body, pool)
    })?;

    Ok(FieldDescriptor {
        name,
        descriptor,
        access,
        signature: common.signature,
        constant_value,
        deprecated: common.deprecated,
        synthetic: common.synthetic,
        annotations: common.annotations,
    })
}

fn read_method(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<MethodDescriptor, ClassfileError> {
    let access = AccessFlags(reader.read_u2()?);
    let name = pool.utf8(reader.read_u2()?)?.to_string();
    let descriptor = pool.utf8(reader.read_u2()?)?.to_string();

    let mut common = CommonAttributes::default();
    let mut exceptions = Vec::new();
    let mut parameters = Vec::new();
    let mut annotation_default = None;
    let mut visible_parameter_annotations = Vec::new();
    let mut invisible_parameter_annotations = Vec::new();
    for_each_attribute(reader, pool, |attribute, body| {
        match attribute {
            "Exceptions" => exceptions = read_class_list(body, pool)?,
            "MethodParameters" => {
                let count = body.read_u1()?;
                for _ in 0..count {
                    parameters.push(MethodParameter {
                        name: pool.optional_utf8(body.read_u2()?)?,
                        access: AccessFlags(body.read_u2()?),
                    });
                }
            }
            "AnnotationDefault" => annotation_default = Some(read_element_value(body, pool)?),
            "RuntimeVisibleParameterAnnotations" => {
                visible_parameter_annotations = read_parameter_annotations(body, pool)?
            }
            "RuntimeInvisibleParameterAnnotations" => {
                invisible_parameter_annotations = read_parameter_annotations(body, pool)?
            }
            // Code bodies are opaque to resolution.
            "Code" => return Ok(false),
            other => return common.accept(other, body, pool),
        }
        Ok(true)
    })?;

    Ok(MethodDescriptor {
        name,
        descriptor,
        access,
        signature: common.signature,
        exceptions,
        parameters,
        annotation_default,
        deprecated: common.deprecated,
        synthetic: common.synthetic,
        annotations: common.annotations,
        visible_parameter_annotations,
        invisible_parameter_annotations,
    })
}

fn read_record_component(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<RecordComponent, ClassfileError> {
    let name = pool.utf8(reader.read_u2()?)?.to_string();
    let descriptor = pool.utf8(reader.read_u2()?)?.to_string();
    let mut common = CommonAttributes::default();
    for_each_attribute(reader, pool, |attribute, body| {
        common.accept(attribute, body, pool)
    })?;
    Ok(RecordComponent {
        name,
        descriptor,
        signature: common.signature,
        annotations: common.annotations,
    })
}
