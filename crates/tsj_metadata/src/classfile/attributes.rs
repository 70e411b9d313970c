use super::constant_pool::ConstantPool;
use super::model::{
    Annotation, AnnotationElement, AnnotationSet, ElementValue, LocalVariableRange,
    ModuleAttribute, ModulePackageGrant, ModuleProvides, ModuleRequires, TypeAnnotation,
    TypeAnnotationTarget, TypePathStep,
};
use super::reader::ClassReader;
use super::{ClassfileError, MAX_ELEMENT_NESTING};

/// Attributes every annotatable element may carry.
#[derive(Debug, Default)]
pub(crate) struct CommonAttributes {
    pub signature: Option<String>,
    pub deprecated: bool,
    pub synthetic: bool,
    pub annotations: AnnotationSet,
}

impl CommonAttributes {
    /// Consumes `name` if it is one of the shared attributes.
    pub(crate) fn accept(
        &mut self,
        name: &str,
        body: &mut ClassReader<'_>,
        pool: &ConstantPool,
    ) -> Result<bool, ClassfileError> {
        match name {
            "Signature" => self.signature = Some(pool.utf8(body.read_u2()?)?.to_string()),
            "Deprecated" => self.deprecated = true,
            "Synthetic" => self.synthetic = true,
            "RuntimeVisibleAnnotations" => self.annotations.visible = read_annotations(body, pool)?,
            "RuntimeInvisibleAnnotations" => {
                self.annotations.invisible = read_annotations(body, pool)?
            }
            "RuntimeVisibleTypeAnnotations" => {
                self.annotations.visible_type = read_type_annotations(body, pool)?
            }
            "RuntimeInvisibleTypeAnnotations" => {
                self.annotations.invisible_type = read_type_annotations(body, pool)?
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// Walks an attribute table, handing each body to `visit` in its own bounded
/// reader. Unknown attributes are skipped; a known body must be consumed exactly.
pub(crate) fn for_each_attribute<'a, F>(
    reader: &mut ClassReader<'a>,
    pool: &ConstantPool,
    mut visit: F,
) -> Result<(), ClassfileError>
where
    F: FnMut(&str, &mut ClassReader<'a>) -> Result<bool, ClassfileError>,
{
    let count = reader.read_u2()?;
    for _ in 0..count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()?;
        let name = pool.utf8(name_index)?;
        let mut body = ClassReader::new(reader.read_slice(length as usize)?);
        let handled = visit(name, &mut body)?;
        if handled && body.remaining() != 0 {
            return Err(ClassfileError::AttributeLengthMismatch {
                name: name.to_string(),
                declared: length,
                consumed: body.position(),
            });
        }
    }
    Ok(())
}

pub(crate) fn read_class_list(
    body: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<String>, ClassfileError> {
    let count = body.read_u2()?;
    (0..count)
        .map(|_| pool.class_name(body.read_u2()?))
        .collect()
}

pub(crate) fn read_annotations(
    body: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<Annotation>, ClassfileError> {
    let count = body.read_u2()?;
    (0..count).map(|_| read_annotation(body, pool)).collect()
}

pub(crate) fn read_parameter_annotations(
    body: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<Vec<Annotation>>, ClassfileError> {
    let count = body.read_u1()?;
    (0..count).map(|_| read_annotations(body, pool)).collect()
}

fn read_annotation(
    body: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<Annotation, ClassfileError> {
    read_nested_annotation(body, pool, 0)
}

pub(crate) fn read_element_value(
    body: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<ElementValue, ClassfileError> {
    read_nested_value(body, pool, 0)
}

fn read_nested_annotation(
    body: &mut ClassReader<'_>,
    pool: &ConstantPool,
    depth: usize,
) -> Result<Annotation, ClassfileError> {
    let type_descriptor = pool.utf8(body.read_u2()?)?.to_string();
    let pairs = body.read_u2()?;
    let mut elements = Vec::with_capacity(pairs as usize);
    for _ in 0..pairs {
        let name = pool.utf8(body.read_u2()?)?.to_string();
        let value = read_nested_value(body, pool, depth + 1)?;
        elements.push(AnnotationElement { name, value });
    }
    Ok(Annotation {
        type_descriptor,
        elements,
    })
}

fn read_nested_value(
    body: &mut ClassReader<'_>,
    pool: &ConstantPool,
    depth: usize,
) -> Result<ElementValue, ClassfileError> {
    if depth > MAX_ELEMENT_NESTING {
        return Err(ClassfileError::ElementNestingTooDeep {
            limit: MAX_ELEMENT_NESTING,
        });
    }
    let tag = body.read_u1()?;
    let value = match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
            tag: tag as char,
            value: pool.constant_value(body.read_u2()?)?,
        },
        b'e' => ElementValue::Enum {
            type_descriptor: pool.utf8(body.read_u2()?)?.to_string(),
            const_name: pool.utf8(body.read_u2()?)?.to_string(),
        },
        b'c' => ElementValue::Class(pool.utf8(body.read_u2()?)?.to_string()),
        b'@' => ElementValue::Annotation(Box::new(read_nested_annotation(body, pool, depth)?)),
        b'[' => {
            let count = body.read_u2()?;
            let values = (0..count)
                .map(|_| read_nested_value(body, pool, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            ElementValue::Array(values)
        }
        other => return Err(ClassfileError::InvalidElementTag { tag: other }),
    };
    Ok(value)
}

pub(crate) fn read_type_annotations(
    body: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<TypeAnnotation>, ClassfileError> {
    let count = body.read_u2()?;
    (0..count).map(|_| read_type_annotation(body, pool)).collect()
}

fn read_type_annotation(
    body: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<TypeAnnotation, ClassfileError> {
    let target_type = body.read_u1()?;
    let target = match target_type {
        0x00 | 0x01 => TypeAnnotationTarget::TypeParameter {
            index: body.read_u1()?,
        },
        0x10 => TypeAnnotationTarget::Supertype {
            index: body.read_u2()?,
        },
        0x11 | 0x12 => TypeAnnotationTarget::TypeParameterBound {
            parameter: body.read_u1()?,
            bound: body.read_u1()?,
        },
        0x13..=0x15 => TypeAnnotationTarget::Empty,
        0x16 => TypeAnnotationTarget::FormalParameter {
            index: body.read_u1()?,
        },
        0x17 => TypeAnnotationTarget::Throws {
            index: body.read_u2()?,
        },
        0x40 | 0x41 => {
            let table_length = body.read_u2()?;
            let ranges = (0..table_length)
                .map(|_| -> Result<LocalVariableRange, ClassfileError> {
                    Ok(LocalVariableRange {
                        start_pc: body.read_u2()?,
                        length: body.read_u2()?,
                        index: body.read_u2()?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            TypeAnnotationTarget::LocalVariable { ranges }
        }
        0x42 => TypeAnnotationTarget::Catch {
            exception_table_index: body.read_u2()?,
        },
        0x43..=0x46 => TypeAnnotationTarget::Offset {
            offset: body.read_u2()?,
        },
        0x47..=0x4B => TypeAnnotationTarget::TypeArgument {
            offset: body.read_u2()?,
            index: body.read_u1()?,
        },
        other => return Err(ClassfileError::InvalidTypeAnnotationTarget { target: other }),
    };

    let path_length = body.read_u1()?;
    let type_path = (0..path_length)
        .map(|_| -> Result<TypePathStep, ClassfileError> {
            Ok(TypePathStep {
                kind: body.read_u1()?,
                argument_index: body.read_u1()?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TypeAnnotation {
        target_type,
        target,
        type_path,
        annotation: read_annotation(body, pool)?,
    })
}

pub(crate) fn read_module(
    body: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<ModuleAttribute, ClassfileError> {
    let name = pool.module_name(body.read_u2()?)?;
    let flags = body.read_u2()?;
    let version = pool.optional_utf8(body.read_u2()?)?;

    let requires_count = body.read_u2()?;
    let mut requires = Vec::with_capacity(requires_count as usize);
    for _ in 0..requires_count {
        requires.push(ModuleRequires {
            module: pool.module_name(body.read_u2()?)?,
            flags: body.read_u2()?,
            version: pool.optional_utf8(body.read_u2()?)?,
        });
    }

    let exports = read_package_grants(body, pool)?;
    let opens = read_package_grants(body, pool)?;
    let uses = read_class_list(body, pool)?;

    let provides_count = body.read_u2()?;
    let mut provides = Vec::with_capacity(provides_count as usize);
    for _ in 0..provides_count {
        provides.push(ModuleProvides {
            service: pool.class_name(body.read_u2()?)?,
            implementations: read_class_list(body, pool)?,
        });
    }

    Ok(ModuleAttribute {
        name,
        flags,
        version,
        requires,
        exports,
        opens,
        uses,
        provides,
    })
}

fn read_package_grants(
    body: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<ModulePackageGrant>, ClassfileError> {
    let count = body.read_u2()?;
    let mut grants = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let package = pool.package_name(body.read_u2()?)?;
        let flags = body.read_u2()?;
        let target_count = body.read_u2()?;
        let targets = (0..target_count)
            .map(|_| pool.module_name(body.read_u2()?))
            .collect::<Result<Vec<_>, _>>()?;
        grants.push(ModulePackageGrant {
            package,
            flags,
            targets,
        });
    }
    Ok(grants)
}

pub(crate) fn read_package_list(
    body: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<String>, ClassfileError> {
    let count = body.read_u2()?;
    (0..count)
        .map(|_| pool.package_name(body.read_u2()?))
        .collect()
}
