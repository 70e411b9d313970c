use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl PrimitiveKind {
    pub fn from_descriptor(tag: char) -> Option<Self> {
        let kind = match tag {
            'Z' => PrimitiveKind::Boolean,
            'B' => PrimitiveKind::Byte,
            'C' => PrimitiveKind::Char,
            'S' => PrimitiveKind::Short,
            'I' => PrimitiveKind::Int,
            'J' => PrimitiveKind::Long,
            'F' => PrimitiveKind::Float,
            'D' => PrimitiveKind::Double,
            'V' => PrimitiveKind::Void,
            _ => return None,
        };
        Some(kind)
    }

    pub fn descriptor(self) -> char {
        match self {
            PrimitiveKind::Boolean => 'Z',
            PrimitiveKind::Byte => 'B',
            PrimitiveKind::Char => 'C',
            PrimitiveKind::Short => 'S',
            PrimitiveKind::Int => 'I',
            PrimitiveKind::Long => 'J',
            PrimitiveKind::Float => 'F',
            PrimitiveKind::Double => 'D',
            PrimitiveKind::Void => 'V',
        }
    }

    pub fn java_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Void => "void",
        }
    }

    /// Internal name of the boxing class; `java/lang/Void` for `void`.
    pub fn wrapper(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "java/lang/Boolean",
            PrimitiveKind::Byte => "java/lang/Byte",
            PrimitiveKind::Char => "java/lang/Character",
            PrimitiveKind::Short => "java/lang/Short",
            PrimitiveKind::Int => "java/lang/Integer",
            PrimitiveKind::Long => "java/lang/Long",
            PrimitiveKind::Float => "java/lang/Float",
            PrimitiveKind::Double => "java/lang/Double",
            PrimitiveKind::Void => "java/lang/Void",
        }
    }

    /// Inverse of [`PrimitiveKind::wrapper`] for the eight value types.
    pub fn unboxed(internal_name: &str) -> Option<Self> {
        let kind = match internal_name {
            "java/lang/Boolean" => PrimitiveKind::Boolean,
            "java/lang/Byte" => PrimitiveKind::Byte,
            "java/lang/Character" => PrimitiveKind::Char,
            "java/lang/Short" => PrimitiveKind::Short,
            "java/lang/Integer" => PrimitiveKind::Int,
            "java/lang/Long" => PrimitiveKind::Long,
            "java/lang/Float" => PrimitiveKind::Float,
            "java/lang/Double" => PrimitiveKind::Double,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WildcardVariance {
    Unbounded,
    Extends,
    Super,
}

/// Generic type tree decoded from a Signature attribute or a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JType {
    Primitive(PrimitiveKind),
    /// Non-generic class reference by internal name.
    Class(String),
    /// Class with type arguments, or a member class of a parameterized owner.
    /// Nested names are joined with `$`, e.g. `pkg/Outer$Inner`.
    Parameterized {
        name: String,
        arguments: Vec<JType>,
        owner: Option<Box<JType>>,
    },
    Array(Box<JType>),
    TypeVariable(String),
    Wildcard {
        variance: WildcardVariance,
        bound: Option<Box<JType>>,
    },
    /// Ordered bounds of a multi-bound type parameter.
    Intersection(Vec<JType>),
}

impl JType {
    pub fn class(name: impl Into<String>) -> Self {
        JType::Class(name.into())
    }

    pub fn object() -> Self {
        JType::Class("java/lang/Object".to_string())
    }

    pub fn array_of(element: JType) -> Self {
        JType::Array(Box::new(element))
    }

    /// Internal name of a class or parameterized type.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            JType::Class(name) | JType::Parameterized { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn type_arguments(&self) -> &[JType] {
        match self {
            JType::Parameterized { arguments, .. } => arguments,
            _ => &[],
        }
    }

    /// Erased field descriptor. Type variables and unbounded wildcards erase
    /// to `java/lang/Object`; intersections erase to their first bound.
    pub fn erasure(&self) -> String {
        let mut out = String::new();
        self.write_erasure(&mut out);
        out
    }

    fn write_erasure(&self, out: &mut String) {
        match self {
            JType::Primitive(kind) => out.push(kind.descriptor()),
            JType::Class(name) | JType::Parameterized { name, .. } => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            JType::Array(element) => {
                out.push('[');
                element.write_erasure(out);
            }
            JType::TypeVariable(_) => out.push_str("Ljava/lang/Object;"),
            JType::Wildcard { variance, bound } => match (variance, bound) {
                (WildcardVariance::Extends, Some(bound)) => bound.write_erasure(out),
                _ => out.push_str("Ljava/lang/Object;"),
            },
            JType::Intersection(bounds) => match bounds.first() {
                Some(first) => first.write_erasure(out),
                None => out.push_str("Ljava/lang/Object;"),
            },
        }
    }
}

impl fmt::Display for JType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JType::Primitive(kind) => f.write_str(kind.java_name()),
            JType::Class(name) => f.write_str(&source_name(name)),
            JType::Parameterized {
                name, arguments, ..
            } => {
                f.write_str(&source_name(name))?;
                if !arguments.is_empty() {
                    f.write_str("<")?;
                    for (index, argument) in arguments.iter().enumerate() {
                        if index > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{argument}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            JType::Array(element) => write!(f, "{element}[]"),
            JType::TypeVariable(identifier) => f.write_str(identifier),
            JType::Wildcard { variance, bound } => match (variance, bound) {
                (WildcardVariance::Extends, Some(bound)) => write!(f, "? extends {bound}"),
                (WildcardVariance::Super, Some(bound)) => write!(f, "? super {bound}"),
                _ => f.write_str("?"),
            },
            JType::Intersection(bounds) => {
                for (index, bound) in bounds.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" & ")?;
                    }
                    write!(f, "{bound}")?;
                }
                Ok(())
            }
        }
    }
}

fn source_name(internal_name: &str) -> String {
    internal_name.replace(|c: char| c == '/' || c == '$', ".")
}

/// Declared type parameter. More than one bound is stored as a single
/// [`JType::Intersection`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeParameter {
    pub identifier: String,
    pub bounds: Vec<JType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSignature {
    pub ty: JType,
    /// `true` when the type was rebuilt from the erased descriptor.
    pub erased_fallback: bool,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub parameters: Vec<JType>,
    pub return_type: JType,
    pub throws: Vec<JType>,
    pub erased_fallback: bool,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub superclass: Option<JType>,
    pub interfaces: Vec<JType>,
    pub erased_fallback: bool,
    pub note: Option<String>,
}
