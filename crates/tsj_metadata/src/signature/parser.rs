use super::model::{
    ClassSignature, FieldSignature, JType, MethodSignature, PrimitiveKind, TypeParameter,
    WildcardVariance,
};
use crate::descriptor::{parse_field_descriptor, parse_method_descriptor};
use tracing::debug;

const MISSING_NOTE: &str = "Missing generic Signature attribute; descriptor fallback applied.";
/// Deepest nesting of arrays, type arguments and wildcard bounds accepted.
const MAX_TYPE_NESTING: usize = 255;

fn unsupported_note(signature: &str, error: &SyntaxError) -> String {
    debug!(
        signature,
        position = error.position,
        found = ?error.found.map(char::from),
        too_deep = error.too_deep,
        "generic signature rejected; using descriptor"
    );
    format!("Unsupported generic Signature `{signature}`; descriptor fallback applied.")
}

/// Parses a field Signature, falling back to the erased descriptor.
pub fn parse_field_signature_or_descriptor(
    signature: Option<&str>,
    descriptor: &str,
) -> FieldSignature {
    let note = match signature.filter(|s| !s.trim().is_empty()) {
        None => MISSING_NOTE.to_string(),
        Some(signature) => {
            let mut cursor = Cursor::new(signature);
            let parsed = parse_reference_type(&mut cursor).and_then(|ty| {
                cursor.expect_end()?;
                Ok(ty)
            });
            match parsed {
                Ok(ty) => {
                    return FieldSignature {
                        ty,
                        erased_fallback: false,
                        note: None,
                    }
                }
                Err(error) => unsupported_note(signature, &error),
            }
        }
    };

    match parse_field_descriptor(descriptor) {
        Ok(ty) => FieldSignature {
            ty,
            erased_fallback: true,
            note: Some(note),
        },
        Err(error) => FieldSignature {
            ty: JType::object(),
            erased_fallback: true,
            note: Some(format!("{note} Descriptor unusable: {error}.")),
        },
    }
}

/// Parses a method Signature, falling back to the erased descriptor.
pub fn parse_method_signature_or_descriptor(
    signature: Option<&str>,
    descriptor: &str,
) -> MethodSignature {
    let note = match signature.filter(|s| !s.trim().is_empty()) {
        None => MISSING_NOTE.to_string(),
        Some(signature) => match parse_method_signature(signature) {
            Ok(parsed) => return parsed,
            Err(error) => unsupported_note(signature, &error),
        },
    };

    match parse_method_descriptor(descriptor) {
        Ok((parameters, return_type)) => MethodSignature {
            type_parameters: Vec::new(),
            parameters,
            return_type,
            throws: Vec::new(),
            erased_fallback: true,
            note: Some(note),
        },
        Err(error) => MethodSignature {
            type_parameters: Vec::new(),
            parameters: Vec::new(),
            return_type: JType::object(),
            throws: Vec::new(),
            erased_fallback: true,
            note: Some(format!("{note} Descriptor unusable: {error}.")),
        },
    }
}

/// Parses a class Signature, falling back to the raw super names.
pub fn parse_class_signature_or_supertypes(
    signature: Option<&str>,
    super_name: Option<&str>,
    interfaces: &[String],
) -> ClassSignature {
    let note = match signature.filter(|s| !s.trim().is_empty()) {
        None => MISSING_NOTE.to_string(),
        Some(signature) => match parse_class_signature(signature) {
            Ok(parsed) => return parsed,
            Err(error) => unsupported_note(signature, &error),
        },
    };

    ClassSignature {
        type_parameters: Vec::new(),
        superclass: super_name.map(JType::class),
        interfaces: interfaces.iter().map(|name| JType::class(name.as_str())).collect(),
        erased_fallback: true,
        note: Some(note),
    }
}

fn parse_method_signature(signature: &str) -> Result<MethodSignature, SyntaxError> {
    let mut cursor = Cursor::new(signature);
    let type_parameters = parse_type_parameters(&mut cursor)?;
    cursor.expect(b'(')?;
    let mut parameters = Vec::new();
    while !cursor.consume_if(b')') {
        parameters.push(parse_java_type(&mut cursor)?);
    }
    let return_type = if cursor.consume_if(b'V') {
        JType::Primitive(PrimitiveKind::Void)
    } else {
        parse_java_type(&mut cursor)?
    };
    let mut throws = Vec::new();
    while cursor.consume_if(b'^') {
        match cursor.peek()? {
            b'L' | b'T' => throws.push(parse_reference_type(&mut cursor)?),
            other => return Err(SyntaxError::unexpected(other, cursor.pos)),
        }
    }
    cursor.expect_end()?;
    Ok(MethodSignature {
        type_parameters,
        parameters,
        return_type,
        throws,
        erased_fallback: false,
        note: None,
    })
}

fn parse_class_signature(signature: &str) -> Result<ClassSignature, SyntaxError> {
    let mut cursor = Cursor::new(signature);
    let type_parameters = parse_type_parameters(&mut cursor)?;
    cursor.expect(b'L')?;
    let superclass = parse_class_type(&mut cursor)?;
    let mut interfaces = Vec::new();
    while !cursor.at_end() {
        cursor.expect(b'L')?;
        interfaces.push(parse_class_type(&mut cursor)?);
    }
    Ok(ClassSignature {
        type_parameters,
        superclass: Some(superclass),
        interfaces,
        erased_fallback: false,
        note: None,
    })
}

fn parse_type_parameters(cursor: &mut Cursor<'_>) -> Result<Vec<TypeParameter>, SyntaxError> {
    let mut type_parameters = Vec::new();
    if !cursor.consume_if(b'<') {
        return Ok(type_parameters);
    }
    while !cursor.consume_if(b'>') {
        let identifier = cursor.read_until(&[b':'])?.to_string();
        if identifier.is_empty() {
            return Err(SyntaxError::unexpected(b':', cursor.pos));
        }
        cursor.expect(b':')?;
        let mut bounds = Vec::new();
        // The class bound may be empty when only interface bounds follow.
        if !cursor.peek_is(b':') {
            bounds.push(parse_reference_type(cursor)?);
        }
        while cursor.consume_if(b':') {
            bounds.push(parse_reference_type(cursor)?);
        }
        if bounds.len() > 1 {
            bounds = vec![JType::Intersection(bounds)];
        }
        type_parameters.push(TypeParameter { identifier, bounds });
    }
    Ok(type_parameters)
}

fn parse_java_type(cursor: &mut Cursor<'_>) -> Result<JType, SyntaxError> {
    match cursor.peek()? {
        b'L' | b'T' | b'[' => parse_reference_type(cursor),
        tag => {
            let kind = PrimitiveKind::from_descriptor(tag as char)
                .filter(|kind| *kind != PrimitiveKind::Void)
                .ok_or(SyntaxError::unexpected(tag, cursor.pos))?;
            cursor.pos += 1;
            Ok(JType::Primitive(kind))
        }
    }
}

fn parse_reference_type(cursor: &mut Cursor<'_>) -> Result<JType, SyntaxError> {
    if cursor.depth >= MAX_TYPE_NESTING {
        return Err(SyntaxError::too_deep(cursor.pos));
    }
    cursor.depth += 1;
    let parsed = parse_reference_body(cursor);
    cursor.depth -= 1;
    parsed
}

fn parse_reference_body(cursor: &mut Cursor<'_>) -> Result<JType, SyntaxError> {
    let marker = cursor.next()?;
    match marker {
        b'L' => parse_class_type(cursor),
        b'T' => {
            let identifier = cursor.read_until(&[b';'])?.to_string();
            cursor.expect(b';')?;
            Ok(JType::TypeVariable(identifier))
        }
        b'[' => Ok(JType::array_of(parse_java_type(cursor)?)),
        other => Err(SyntaxError::unexpected(other, cursor.pos - 1)),
    }
}

/// Parses the remainder of a class type after its leading `L`.
fn parse_class_type(cursor: &mut Cursor<'_>) -> Result<JType, SyntaxError> {
    let mut name = String::new();
    let mut owner: Option<JType> = None;
    loop {
        let segment = cursor.read_until(&[b'<', b';', b'.'])?;
        if segment.is_empty() {
            return Err(SyntaxError::unexpected(cursor.peek()?, cursor.pos));
        }
        name.push_str(segment);
        let arguments = if cursor.consume_if(b'<') {
            parse_type_arguments(cursor)?
        } else {
            Vec::new()
        };
        let current = if arguments.is_empty() && owner.is_none() {
            JType::Class(name.clone())
        } else {
            JType::Parameterized {
                name: name.clone(),
                arguments,
                owner: owner.take().map(Box::new),
            }
        };
        if cursor.consume_if(b'.') {
            owner = Some(current);
            name.push('$');
            continue;
        }
        cursor.expect(b';')?;
        return Ok(current);
    }
}

fn parse_type_arguments(cursor: &mut Cursor<'_>) -> Result<Vec<JType>, SyntaxError> {
    let mut arguments = Vec::new();
    while !cursor.consume_if(b'>') {
        let argument = if cursor.consume_if(b'*') {
            JType::Wildcard {
                variance: WildcardVariance::Unbounded,
                bound: None,
            }
        } else if cursor.consume_if(b'+') {
            JType::Wildcard {
                variance: WildcardVariance::Extends,
                bound: Some(Box::new(parse_reference_type(cursor)?)),
            }
        } else if cursor.consume_if(b'-') {
            JType::Wildcard {
                variance: WildcardVariance::Super,
                bound: Some(Box::new(parse_reference_type(cursor)?)),
            }
        } else {
            parse_reference_type(cursor)?
        };
        arguments.push(argument);
    }
    if arguments.is_empty() {
        return Err(SyntaxError::unexpected(b'>', cursor.pos - 1));
    }
    Ok(arguments)
}

#[derive(Debug)]
struct SyntaxError {
    position: usize,
    found: Option<u8>,
    too_deep: bool,
}

impl SyntaxError {
    fn unexpected(found: u8, position: usize) -> Self {
        Self {
            position,
            found: Some(found),
            too_deep: false,
        }
    }

    fn end(position: usize) -> Self {
        Self {
            position,
            found: None,
            too_deep: false,
        }
    }

    fn too_deep(position: usize) -> Self {
        Self {
            position,
            found: None,
            too_deep: true,
        }
    }
}

struct Cursor<'a> {
    source: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            depth: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Result<u8, SyntaxError> {
        self.source
            .as_bytes()
            .get(self.pos)
            .copied()
            .ok_or(SyntaxError::end(self.pos))
    }

    fn peek_is(&self, expected: u8) -> bool {
        self.source.as_bytes().get(self.pos) == Some(&expected)
    }

    fn next(&mut self) -> Result<u8, SyntaxError> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    fn consume_if(&mut self, expected: u8) -> bool {
        if self.peek_is(expected) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, expected: u8) -> Result<(), SyntaxError> {
        let found = self.next()?;
        if found != expected {
            return Err(SyntaxError::unexpected(found, self.pos - 1));
        }
        Ok(())
    }

    fn expect_end(&self) -> Result<(), SyntaxError> {
        match self.source.as_bytes().get(self.pos) {
            None => Ok(()),
            Some(found) => Err(SyntaxError::unexpected(*found, self.pos)),
        }
    }

    /// Reads up to (not including) the first delimiter; the delimiter must exist.
    fn read_until(&mut self, delimiters: &[u8]) -> Result<&'a str, SyntaxError> {
        let start = self.pos;
        let bytes = self.source.as_bytes();
        while self.pos < bytes.len() && !delimiters.contains(&bytes[self.pos]) {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return Err(SyntaxError::end(self.pos));
        }
        Ok(&self.source[start..self.pos])
    }
}
