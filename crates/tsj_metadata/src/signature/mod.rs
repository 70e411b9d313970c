//! Generic type model and Signature attribute parser.
//!
//! Parsing never fails: a missing or unparseable signature yields a type
//! rebuilt from the erased descriptor with `erased_fallback` set and a note
//! describing why generic precision was lost.

mod model;
mod parser;

pub use model::{
    ClassSignature, FieldSignature, JType, MethodSignature, PrimitiveKind, TypeParameter,
    WildcardVariance,
};
pub use parser::{
    parse_class_signature_or_supertypes, parse_field_signature_or_descriptor,
    parse_method_signature_or_descriptor,
};
