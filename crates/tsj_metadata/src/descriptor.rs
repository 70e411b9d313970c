//! Erased field and method descriptors (JVMS §4.3).

use crate::signature::{JType, PrimitiveKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("unexpected end of descriptor `{0}`")]
    UnexpectedEnd(String),
    #[error("unexpected descriptor tag '{tag}' in `{descriptor}`")]
    UnexpectedTag { descriptor: String, tag: char },
    #[error("unterminated reference in descriptor `{0}`")]
    UnterminatedReference(String),
    #[error("trailing content in descriptor `{0}`")]
    TrailingContent(String),
    #[error("more than 255 array dimensions in descriptor `{0}`")]
    TooManyDimensions(String),
}

/// JVMS §4.3.2 limit on array dimensions.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// Parameter and return descriptors of one method descriptor, as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptorParts {
    pub parameters: Vec<String>,
    pub return_type: String,
}

pub fn parse_field_descriptor(descriptor: &str) -> Result<JType, DescriptorError> {
    let mut parser = DescriptorParser::new(descriptor);
    let ty = parser.parse_type(false)?;
    parser.expect_end()?;
    Ok(ty)
}

/// Parses `(params)return` into parameter types and the return type.
pub fn parse_method_descriptor(descriptor: &str) -> Result<(Vec<JType>, JType), DescriptorError> {
    let mut parser = DescriptorParser::new(descriptor);
    parser.expect('(')?;
    let mut parameters = Vec::new();
    while !parser.consume_if(')')? {
        parameters.push(parser.parse_type(false)?);
    }
    let return_type = parser.parse_type(true)?;
    parser.expect_end()?;
    Ok((parameters, return_type))
}

/// Splits a method descriptor into per-parameter descriptor strings.
pub fn split_method_descriptor(descriptor: &str) -> Result<MethodDescriptorParts, DescriptorError> {
    let mut parser = DescriptorParser::new(descriptor);
    parser.expect('(')?;
    let mut parameters = Vec::new();
    while !parser.consume_if(')')? {
        let start = parser.pos;
        parser.parse_type(false)?;
        parameters.push(descriptor[start..parser.pos].to_string());
    }
    let start = parser.pos;
    parser.parse_type(true)?;
    let return_type = descriptor[start..parser.pos].to_string();
    parser.expect_end()?;
    Ok(MethodDescriptorParts {
        parameters,
        return_type,
    })
}

/// The `(params)` prefix of a method descriptor, used as an erased override key.
pub fn parameter_section(descriptor: &str) -> &str {
    match descriptor.find(')') {
        Some(end) => &descriptor[..=end],
        None => descriptor,
    }
}

struct DescriptorParser<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DescriptorParser<'a> {
    fn new(descriptor: &'a str) -> Self {
        Self {
            source: descriptor,
            bytes: descriptor.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Result<u8, DescriptorError> {
        self.bytes
            .get(self.pos)
            .copied()
            .ok_or_else(|| DescriptorError::UnexpectedEnd(self.source.to_string()))
    }

    fn expect(&mut self, ch: char) -> Result<(), DescriptorError> {
        let found = self.peek()?;
        if found != ch as u8 {
            return Err(DescriptorError::UnexpectedTag {
                descriptor: self.source.to_string(),
                tag: found as char,
            });
        }
        self.pos += 1;
        Ok(())
    }

    fn consume_if(&mut self, ch: char) -> Result<bool, DescriptorError> {
        if self.peek()? == ch as u8 {
            self.pos += 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect_end(&self) -> Result<(), DescriptorError> {
        if self.pos != self.bytes.len() {
            return Err(DescriptorError::TrailingContent(self.source.to_string()));
        }
        Ok(())
    }

    fn parse_type(&mut self, allow_void: bool) -> Result<JType, DescriptorError> {
        let mut dimensions = 0;
        while self.peek()? == b'[' {
            dimensions += 1;
            self.pos += 1;
        }
        if dimensions > MAX_ARRAY_DIMENSIONS {
            return Err(DescriptorError::TooManyDimensions(self.source.to_string()));
        }
        let element = self.parse_element(allow_void && dimensions == 0)?;
        Ok((0..dimensions).fold(element, |ty, _| JType::array_of(ty)))
    }

    fn parse_element(&mut self, allow_void: bool) -> Result<JType, DescriptorError> {
        let tag = self.peek()?;
        match tag {
            b'L' => self.parse_reference_type(),
            _ => match PrimitiveKind::from_descriptor(tag as char) {
                Some(PrimitiveKind::Void) if !allow_void => Err(DescriptorError::UnexpectedTag {
                    descriptor: self.source.to_string(),
                    tag: 'V',
                }),
                Some(kind) => {
                    self.pos += 1;
                    Ok(JType::Primitive(kind))
                }
                None => Err(DescriptorError::UnexpectedTag {
                    descriptor: self.source.to_string(),
                    tag: tag as char,
                }),
            },
        }
    }

    fn parse_reference_type(&mut self) -> Result<JType, DescriptorError> {
        self.expect('L')?;
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b';' {
            self.pos += 1;
        }
        if self.pos >= self.bytes.len() || self.pos == start {
            return Err(DescriptorError::UnterminatedReference(self.source.to_string()));
        }
        let name = &self.source[start..self.pos];
        self.pos += 1; // consume ';'
        Ok(JType::class(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_descriptors() {
        assert_eq!(
            parse_field_descriptor("[[Ljava/lang/String;").unwrap(),
            JType::array_of(JType::array_of(JType::class("java/lang/String")))
        );
        assert_eq!(
            parse_field_descriptor("J").unwrap(),
            JType::Primitive(PrimitiveKind::Long)
        );
    }

    #[test]
    fn splits_method_descriptor_text() {
        let parts = split_method_descriptor("(I[JLjava/util/List;)Ljava/lang/Object;").unwrap();
        assert_eq!(parts.parameters, vec!["I", "[J", "Ljava/util/List;"]);
        assert_eq!(parts.return_type, "Ljava/lang/Object;");
    }

    #[test]
    fn parameter_section_ignores_return_type() {
        assert_eq!(parameter_section("(ILjava/lang/String;)V"), "(ILjava/lang/String;)");
        assert_eq!(
            parameter_section("(ILjava/lang/String;)V"),
            parameter_section("(ILjava/lang/String;)Ljava/lang/Object;")
        );
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert!(matches!(
            parse_field_descriptor("Ljava/lang/String"),
            Err(DescriptorError::UnterminatedReference(_))
        ));
        assert!(matches!(
            parse_field_descriptor("V"),
            Err(DescriptorError::UnexpectedTag { tag: 'V', .. })
        ));
        assert!(matches!(
            parse_method_descriptor("(I"),
            Err(DescriptorError::UnexpectedEnd(_))
        ));
        assert!(matches!(
            parse_field_descriptor("II"),
            Err(DescriptorError::TrailingContent(_))
        ));
    }

    #[test]
    fn bounds_array_dimensions() {
        let deepest = format!("{}I", "[".repeat(MAX_ARRAY_DIMENSIONS));
        assert!(parse_field_descriptor(&deepest).is_ok());

        let too_deep = format!("({}I)V", "[".repeat(MAX_ARRAY_DIMENSIONS + 1));
        assert!(matches!(
            split_method_descriptor(&too_deep),
            Err(DescriptorError::TooManyDimensions(_))
        ));
        assert!(matches!(
            parse_field_descriptor("[V"),
            Err(DescriptorError::UnexpectedTag { tag: 'V', .. })
        ));
    }
}
