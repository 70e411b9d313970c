use super::model::ConstantValue;
use super::reader::ClassReader;
use super::ClassfileError;

#[derive(Debug, Clone)]
pub(crate) enum Constant {
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    /// The bootstrap method index is skipped; `BootstrapMethods` is not read.
    Dynamic { name_and_type_index: u16 },
    InvokeDynamic { name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
}

impl Constant {
    fn kind(&self) -> &'static str {
        match self {
            Constant::Unusable => "unusable",
            Constant::Utf8(_) => "Utf8",
            Constant::Integer(_) => "Integer",
            Constant::Float(_) => "Float",
            Constant::Long(_) => "Long",
            Constant::Double(_) => "Double",
            Constant::Class { .. } => "Class",
            Constant::String { .. } => "String",
            Constant::FieldRef { .. } => "Fieldref",
            Constant::MethodRef { .. } => "Methodref",
            Constant::InterfaceMethodRef { .. } => "InterfaceMethodref",
            Constant::NameAndType { .. } => "NameAndType",
            Constant::MethodHandle { .. } => "MethodHandle",
            Constant::MethodType { .. } => "MethodType",
            Constant::Dynamic { .. } => "Dynamic",
            Constant::InvokeDynamic { .. } => "InvokeDynamic",
            Constant::Module { .. } => "Module",
            Constant::Package { .. } => "Package",
        }
    }
}

pub(crate) struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub(crate) fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassfileError> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable); // index 0 unused

        let mut index = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    let bytes = reader.read_slice(length)?;
                    let value = decode_modified_utf8(bytes).ok_or(ClassfileError::InvalidUtf8 {
                        index: index as u16,
                    })?;
                    Constant::Utf8(value)
                }
                3 => Constant::Integer(reader.read_u4()? as i32),
                4 => Constant::Float(f32::from_bits(reader.read_u4()?)),
                5 | 6 => {
                    let raw = reader.read_u8()?;
                    let value = if tag == 5 {
                        Constant::Long(raw as i64)
                    } else {
                        Constant::Double(f64::from_bits(raw))
                    };
                    // Eight-byte constants occupy two slots.
                    entries.push(value);
                    entries.push(Constant::Unusable);
                    index += 2;
                    continue;
                }
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                8 => Constant::String {
                    string_index: reader.read_u2()?,
                },
                9 | 10 | 11 => {
                    let class_index = reader.read_u2()?;
                    let name_and_type_index = reader.read_u2()?;
                    match tag {
                        9 => Constant::FieldRef {
                            class_index,
                            name_and_type_index,
                        },
                        10 => Constant::MethodRef {
                            class_index,
                            name_and_type_index,
                        },
                        _ => Constant::InterfaceMethodRef {
                            class_index,
                            name_and_type_index,
                        },
                    }
                }
                12 => Constant::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                15 => Constant::MethodHandle {
                    reference_kind: reader.read_u1()?,
                    reference_index: reader.read_u2()?,
                },
                16 => Constant::MethodType {
                    descriptor_index: reader.read_u2()?,
                },
                17 | 18 => {
                    reader.skip(2)?;
                    let name_and_type_index = reader.read_u2()?;
                    if tag == 17 {
                        Constant::Dynamic { name_and_type_index }
                    } else {
                        Constant::InvokeDynamic { name_and_type_index }
                    }
                }
                19 => Constant::Module {
                    name_index: reader.read_u2()?,
                },
                20 => Constant::Package {
                    name_index: reader.read_u2()?,
                },
                other => {
                    return Err(ClassfileError::UnsupportedConstant {
                        tag: other,
                        index: index as u16,
                    })
                }
            };

            entries.push(entry);
            index += 1;
        }

        // A trailing eight-byte constant can push one phantom slot past the count.
        entries.truncate(count.max(1));
        let pool = Self { entries };
        pool.validate()?;
        Ok(pool)
    }

    /// Checks every cross reference inside the pool.
    fn validate(&self) -> Result<(), ClassfileError> {
        for (position, entry) in self.entries.iter().enumerate() {
            let index = position as u16;
            match entry {
                Constant::Class { name_index }
                | Constant::Module { name_index }
                | Constant::Package { name_index } => {
                    self.expect_utf8(*name_index)?;
                }
                Constant::String { string_index } => self.expect_utf8(*string_index)?,
                Constant::MethodType { descriptor_index } => {
                    self.expect_utf8(*descriptor_index)?
                }
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    self.expect_utf8(*name_index)?;
                    self.expect_utf8(*descriptor_index)?;
                }
                Constant::FieldRef {
                    class_index,
                    name_and_type_index,
                }
                | Constant::MethodRef {
                    class_index,
                    name_and_type_index,
                }
                | Constant::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    self.expect_kind(*class_index, "Class")?;
                    self.expect_kind(*name_and_type_index, "NameAndType")?;
                }
                Constant::Dynamic {
                    name_and_type_index,
                }
                | Constant::InvokeDynamic {
                    name_and_type_index,
                } => self.expect_kind(*name_and_type_index, "NameAndType")?,
                Constant::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    if !(1..=9).contains(reference_kind) {
                        return Err(ClassfileError::UnexpectedConstant {
                            index,
                            expected: "MethodHandle reference kind 1..=9",
                        });
                    }
                    let target = self.get(*reference_index)?;
                    if !matches!(
                        target,
                        Constant::FieldRef { .. }
                            | Constant::MethodRef { .. }
                            | Constant::InterfaceMethodRef { .. }
                    ) {
                        return Err(ClassfileError::UnexpectedConstant {
                            index: *reference_index,
                            expected: "member reference",
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn expect_utf8(&self, index: u16) -> Result<(), ClassfileError> {
        self.utf8(index).map(|_| ())
    }

    fn expect_kind(&self, index: u16, expected: &'static str) -> Result<(), ClassfileError> {
        let entry = self.get(index)?;
        if entry.kind() != expected {
            return Err(ClassfileError::UnexpectedConstant { index, expected });
        }
        Ok(())
    }

    fn get(&self, index: u16) -> Result<&Constant, ClassfileError> {
        match self.entries.get(index as usize) {
            None | Some(Constant::Unusable) => Err(ClassfileError::InvalidConstantIndex { index }),
            Some(entry) => Ok(entry),
        }
    }

    pub(crate) fn utf8(&self, index: u16) -> Result<&str, ClassfileError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value.as_str()),
            _ => Err(ClassfileError::UnexpectedConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Resolves an optional Utf8 reference where index 0 means "absent".
    pub(crate) fn optional_utf8(&self, index: u16) -> Result<Option<String>, ClassfileError> {
        if index == 0 {
            return Ok(None);
        }
        self.utf8(index).map(|value| Some(value.to_string()))
    }

    pub(crate) fn class_name(&self, index: u16) -> Result<String, ClassfileError> {
        match self.get(index)? {
            Constant::Class { name_index } => Ok(self.utf8(*name_index)?.to_string()),
            _ => Err(ClassfileError::UnexpectedConstant {
                index,
                expected: "Class",
            }),
        }
    }

    pub(crate) fn optional_class_name(&self, index: u16) -> Result<Option<String>, ClassfileError> {
        if index == 0 {
            return Ok(None);
        }
        self.class_name(index).map(Some)
    }

    pub(crate) fn name_and_type(&self, index: u16) -> Result<(String, String), ClassfileError> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((
                self.utf8(*name_index)?.to_string(),
                self.utf8(*descriptor_index)?.to_string(),
            )),
            _ => Err(ClassfileError::UnexpectedConstant {
                index,
                expected: "NameAndType",
            }),
        }
    }

    pub(crate) fn package_name(&self, index: u16) -> Result<String, ClassfileError> {
        match self.get(index)? {
            Constant::Package { name_index } => Ok(self.utf8(*name_index)?.to_string()),
            _ => Err(ClassfileError::UnexpectedConstant {
                index,
                expected: "Package",
            }),
        }
    }

    pub(crate) fn module_name(&self, index: u16) -> Result<String, ClassfileError> {
        match self.get(index)? {
            Constant::Module { name_index } => Ok(self.utf8(*name_index)?.to_string()),
            _ => Err(ClassfileError::UnexpectedConstant {
                index,
                expected: "Module",
            }),
        }
    }

    /// Loadable value for a ConstantValue attribute or an annotation element.
    pub(crate) fn constant_value(&self, index: u16) -> Result<ConstantValue, ClassfileError> {
        match self.get(index)? {
            Constant::Integer(value) => Ok(ConstantValue::Int(*value)),
            Constant::Float(value) => Ok(ConstantValue::Float(*value)),
            Constant::Long(value) => Ok(ConstantValue::Long(*value)),
            Constant::Double(value) => Ok(ConstantValue::Double(*value)),
            Constant::String { string_index } => {
                Ok(ConstantValue::String(self.utf8(*string_index)?.to_string()))
            }
            Constant::Utf8(value) => Ok(ConstantValue::String(value.clone())),
            _ => Err(ClassfileError::UnexpectedConstant {
                index,
                expected: "loadable constant",
            }),
        }
    }

}

/// Decodes the JVM "modified UTF-8" encoding used by Utf8 constants.
///
/// NUL is encoded as `C0 80` and supplementary characters as surrogate
/// pairs of three-byte sequences. Returns `None` for malformed input or an
/// unpaired surrogate.
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    if bytes.iter().all(|byte| (0x01..0x80).contains(byte)) {
        return std::str::from_utf8(bytes).ok().map(str::to_string);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut pos = 0;
    while pos < bytes.len() {
        let first = bytes[pos];
        match first {
            0x01..=0x7F => {
                units.push(u16::from(first));
                pos += 1;
            }
            0xC0..=0xDF => {
                let second = *bytes.get(pos + 1)?;
                if second & 0xC0 != 0x80 {
                    return None;
                }
                units.push((u16::from(first & 0x1F) << 6) | u16::from(second & 0x3F));
                pos += 2;
            }
            0xE0..=0xEF => {
                let second = *bytes.get(pos + 1)?;
                let third = *bytes.get(pos + 2)?;
                if second & 0xC0 != 0x80 || third & 0xC0 != 0x80 {
                    return None;
                }
                units.push(
                    (u16::from(first & 0x0F) << 12)
                        | (u16::from(second & 0x3F) << 6)
                        | u16::from(third & 0x3F),
                );
                pos += 3;
            }
            _ => return None,
        }
    }

    String::from_utf16(&units).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ascii_fast_path() {
        assert_eq!(decode_modified_utf8(b"java/lang/Object").as_deref(), Some("java/lang/Object"));
    }

    #[test]
    fn decodes_encoded_nul_and_two_byte_sequences() {
        let bytes = [b'a', 0xC0, 0x80, 0xC3, 0xA9];
        assert_eq!(decode_modified_utf8(&bytes).as_deref(), Some("a\u{0}é"));
    }

    #[test]
    fn decodes_surrogate_pairs() {
        // U+1F600 as a CESU-8 surrogate pair.
        let bytes = [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80];
        assert_eq!(decode_modified_utf8(&bytes).as_deref(), Some("\u{1F600}"));
    }

    #[test]
    fn rejects_raw_nul_and_four_byte_forms() {
        assert!(decode_modified_utf8(&[0x00]).is_none());
        assert!(decode_modified_utf8(&[0xF0, 0x9F, 0x98, 0x80]).is_none());
    }

    #[test]
    fn rejects_unpaired_surrogate() {
        assert!(decode_modified_utf8(&[0xED, 0xA0, 0xBD]).is_none());
    }

    fn pool_with_dynamic(tag: u8, name_and_type: u16) -> Vec<u8> {
        let mut bytes = vec![0, 5];
        bytes.extend([1, 0, 3]);
        bytes.extend(b"run");
        bytes.extend([1, 0, 3]);
        bytes.extend(b"()V");
        bytes.extend([12, 0, 1, 0, 2]);
        // Bootstrap method index 7 precedes the NameAndType reference.
        bytes.extend([tag, 0, 7]);
        bytes.extend(name_and_type.to_be_bytes());
        bytes
    }

    #[test]
    fn dynamic_constants_skip_the_bootstrap_index() {
        for tag in [17, 18] {
            let bytes = pool_with_dynamic(tag, 3);
            let mut reader = ClassReader::new(&bytes);
            let pool = ConstantPool::parse(&mut reader).unwrap();
            assert_eq!(reader.remaining(), 0);
            let expected = if tag == 17 { "Dynamic" } else { "InvokeDynamic" };
            assert_eq!(pool.get(4).unwrap().kind(), expected);
            assert_eq!(pool.name_and_type(3).unwrap(), ("run".into(), "()V".into()));
        }
    }

    #[test]
    fn dynamic_constants_must_reference_name_and_type() {
        let bytes = pool_with_dynamic(18, 1);
        let mut reader = ClassReader::new(&bytes);
        assert!(matches!(
            ConstantPool::parse(&mut reader),
            Err(ClassfileError::UnexpectedConstant { index: 1, expected: "NameAndType" })
        ));
    }
}
