//! Method-invocation conversions over erased descriptors (JLS §5.3).

use crate::inheritance::{ClassLookup, InheritanceResolver};
use crate::nullability::Nullability;
use crate::overload::Argument;
use tsj_metadata::signature::PrimitiveKind;

const OBJECT: &str = "java/lang/Object";
const ARRAY_SUPERTYPES: &[&str] = &[
    "java/lang/Object",
    "java/lang/Cloneable",
    "java/io/Serializable",
];

/// Answers whether one class is a subtype of another.
pub trait SubtypeOracle {
    fn is_subtype(&mut self, sub: &str, sup: &str) -> bool;
}

impl<L: ClassLookup> SubtypeOracle for InheritanceResolver<L> {
    fn is_subtype(&mut self, sub: &str, sup: &str) -> bool {
        InheritanceResolver::is_subtype(self, sub, sup)
    }
}

impl<T: SubtypeOracle + ?Sized> SubtypeOracle for &mut T {
    fn is_subtype(&mut self, sub: &str, sup: &str) -> bool {
        (**self).is_subtype(sub, sup)
    }
}

/// Oracle that knows no hierarchy beyond the JDK value types.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHierarchy;

impl SubtypeOracle for NoHierarchy {
    fn is_subtype(&mut self, sub: &str, sup: &str) -> bool {
        sub == sup
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionKind {
    Identity,
    WideningPrimitive,
    WideningReference,
    Boxing,
    Unboxing,
    /// `null` or `undefined` passed to a reference parameter.
    NullReference,
}

impl ConversionKind {
    pub fn label(self) -> &'static str {
        match self {
            ConversionKind::Identity => "identity",
            ConversionKind::WideningPrimitive => "widening",
            ConversionKind::WideningReference => "subtyping",
            ConversionKind::Boxing => "boxing",
            ConversionKind::Unboxing => "unboxing",
            ConversionKind::NullReference => "null",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Allowed(ConversionKind),
    Rejected(String),
}

impl ConversionOutcome {
    pub fn kind(&self) -> Option<ConversionKind> {
        match self {
            ConversionOutcome::Allowed(kind) => Some(*kind),
            ConversionOutcome::Rejected(_) => None,
        }
    }
}

/// Primitive kind of a one-character value descriptor; `V` is not a value.
pub fn primitive_of(descriptor: &str) -> Option<PrimitiveKind> {
    let mut chars = descriptor.chars();
    let tag = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    PrimitiveKind::from_descriptor(tag).filter(|kind| *kind != PrimitiveKind::Void)
}

/// Internal name of an `L…;` descriptor.
pub fn class_of(descriptor: &str) -> Option<&str> {
    descriptor.strip_prefix('L')?.strip_suffix(';')
}

pub fn is_reference(descriptor: &str) -> bool {
    class_of(descriptor).is_some() || descriptor.starts_with('[')
}

pub fn widening_targets(kind: PrimitiveKind) -> &'static [PrimitiveKind] {
    use PrimitiveKind::*;
    match kind {
        Byte => &[Short, Int, Long, Float, Double],
        Short | Char => &[Int, Long, Float, Double],
        Int => &[Long, Float, Double],
        Long => &[Float, Double],
        Float => &[Double],
        Double | Boolean | Void => &[],
    }
}

/// Identity or widening primitive conversion.
pub fn primitive_widens(from: PrimitiveKind, to: PrimitiveKind) -> bool {
    from == to || widening_targets(from).contains(&to)
}

/// Supertypes of JDK value classes that a bare classpath may not contain.
fn value_class_supertype(sub: &str, sup: &str) -> bool {
    const COMMON: &[&str] = &[
        "java/io/Serializable",
        "java/lang/Comparable",
        "java/lang/constant/Constable",
    ];
    match sub {
        "java/lang/Byte" | "java/lang/Short" | "java/lang/Integer" | "java/lang/Long"
        | "java/lang/Float" | "java/lang/Double" => {
            sup == "java/lang/Number" || COMMON.contains(&sup)
        }
        "java/lang/Boolean" | "java/lang/Character" => COMMON.contains(&sup),
        "java/lang/String" => sup == "java/lang/CharSequence" || COMMON.contains(&sup),
        _ => false,
    }
}

/// Widening reference conversion between two reference descriptors.
pub fn reference_assignable<O>(from: &str, to: &str, oracle: &mut O) -> bool
where
    O: SubtypeOracle + ?Sized,
{
    if from == to {
        return true;
    }
    if let Some(from_element) = from.strip_prefix('[') {
        if let Some(class) = class_of(to) {
            return ARRAY_SUPERTYPES.contains(&class);
        }
        let Some(to_element) = to.strip_prefix('[') else {
            return false;
        };
        return match (primitive_of(from_element), primitive_of(to_element)) {
            (None, None) => reference_assignable(from_element, to_element, oracle),
            (Some(left), Some(right)) => left == right,
            _ => false,
        };
    }
    match (class_of(from), class_of(to)) {
        (Some(_), Some(OBJECT)) => true,
        (Some(sub), Some(sup)) => value_class_supertype(sub, sup) || oracle.is_subtype(sub, sup),
        _ => false,
    }
}

/// Classifies how `argument` reaches a parameter of type `parameter`.
pub fn classify<O>(
    argument: &Argument,
    parameter: &str,
    nullability: Nullability,
    oracle: &mut O,
) -> ConversionOutcome
where
    O: SubtypeOracle + ?Sized,
{
    let argument = match argument {
        Argument::Null | Argument::Undefined => {
            if primitive_of(parameter).is_some() {
                return ConversionOutcome::Rejected(format!(
                    "{argument} is incompatible with primitive {parameter}"
                ));
            }
            if nullability == Nullability::NonNull {
                return ConversionOutcome::Rejected(format!(
                    "{argument} is incompatible with non-null {parameter}"
                ));
            }
            if !is_reference(parameter) {
                return ConversionOutcome::Rejected(format!(
                    "invalid parameter descriptor {parameter}"
                ));
            }
            return ConversionOutcome::Allowed(ConversionKind::NullReference);
        }
        Argument::Typed(descriptor) => descriptor.as_str(),
    };

    if argument == parameter {
        return ConversionOutcome::Allowed(ConversionKind::Identity);
    }

    if let Some(target) = primitive_of(parameter) {
        if let Some(source) = primitive_of(argument) {
            return if primitive_widens(source, target) {
                ConversionOutcome::Allowed(ConversionKind::WideningPrimitive)
            } else {
                ConversionOutcome::Rejected(format!("no widening from {argument} to {parameter}"))
            };
        }
        let unboxed = class_of(argument).and_then(PrimitiveKind::unboxed);
        return match unboxed {
            Some(source) if primitive_widens(source, target) => {
                ConversionOutcome::Allowed(ConversionKind::Unboxing)
            }
            Some(_) => ConversionOutcome::Rejected(format!(
                "unboxed {argument} does not widen to {parameter}"
            )),
            None => ConversionOutcome::Rejected(format!(
                "reference {argument} is incompatible with primitive {parameter}"
            )),
        };
    }

    // A wrapper parameter takes any primitive or wrapper argument whose value
    // widens to the wrapped type: `int` and `Integer` both reach `Long`.
    if let Some(target) = class_of(parameter).and_then(PrimitiveKind::unboxed) {
        let source = primitive_of(argument)
            .or_else(|| class_of(argument).and_then(PrimitiveKind::unboxed));
        if let Some(source) = source {
            return if primitive_widens(source, target) {
                ConversionOutcome::Allowed(ConversionKind::Boxing)
            } else {
                ConversionOutcome::Rejected(format!("{argument} does not widen to {parameter}"))
            };
        }
    }

    if let Some(source) = primitive_of(argument) {
        let boxed = format!("L{};", source.wrapper());
        return if reference_assignable(&boxed, parameter, oracle) {
            ConversionOutcome::Allowed(ConversionKind::Boxing)
        } else {
            ConversionOutcome::Rejected(format!(
                "boxed {argument} is not assignable to {parameter}"
            ))
        };
    }

    if !is_reference(argument) || !is_reference(parameter) {
        return ConversionOutcome::Rejected(format!(
            "incompatible descriptor kinds {argument} and {parameter}"
        ));
    }
    if reference_assignable(argument, parameter, oracle) {
        ConversionOutcome::Allowed(ConversionKind::WideningReference)
    } else {
        ConversionOutcome::Rejected(format!("{argument} is not assignable to {parameter}"))
    }
}

/// Formal-parameter ordering used to rank applicable candidates: `from` is
/// at least as specific as `to`.
///
/// Primitives order by widening and references by subtyping. A primitive is
/// also at least as specific as any reference its box is assignable to, so
/// `int` ranks above `Integer`, `Number` and `Object`. Unboxing never orders
/// a reference above a primitive.
pub fn at_least_as_specific<O>(from: &str, to: &str, oracle: &mut O) -> bool
where
    O: SubtypeOracle + ?Sized,
{
    if from == to {
        return true;
    }
    match (primitive_of(from), primitive_of(to)) {
        (Some(left), Some(right)) => primitive_widens(left, right),
        (None, None) => reference_assignable(from, to, oracle),
        (Some(left), None) => reference_assignable(&format!("L{};", left.wrapper()), to, oracle),
        (None, Some(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("B", "I", true; "byte widens to int")]
    #[test_case("C", "J", true; "char widens to long")]
    #[test_case("S", "C", false; "short does not widen to char")]
    #[test_case("C", "S", false; "char does not widen to short")]
    #[test_case("J", "F", true; "long widens to float")]
    #[test_case("D", "F", false; "double does not narrow")]
    #[test_case("Z", "I", false; "boolean is not numeric")]
    fn primitive_widening(from: &str, to: &str, expected: bool) {
        let (Some(from), Some(to)) = (primitive_of(from), primitive_of(to)) else {
            panic!("not primitive");
        };
        assert_eq!(primitive_widens(from, to), expected);
    }

    #[test_case("[Ljava/lang/String;", "Ljava/lang/Object;", true; "array to object")]
    #[test_case("[I", "Ljava/io/Serializable;", true; "array to serializable")]
    #[test_case("[Ljava/lang/String;", "[Ljava/lang/Object;", true; "covariant arrays")]
    #[test_case("[[I", "[Ljava/lang/Object;", true; "nested primitive array to object array")]
    #[test_case("[I", "[J", false; "primitive arrays are invariant")]
    #[test_case("[I", "[Ljava/lang/Object;", false; "primitive array to object array")]
    #[test_case("Ljava/lang/Integer;", "Ljava/lang/Number;", true; "wrapper to number")]
    #[test_case("Ljava/lang/String;", "Ljava/lang/CharSequence;", true; "string to char sequence")]
    #[test_case("Ljava/lang/Number;", "Ljava/lang/Integer;", false; "no downcast")]
    fn reference_widening(from: &str, to: &str, expected: bool) {
        assert_eq!(reference_assignable(from, to, &mut NoHierarchy), expected);
    }

    #[test]
    fn classifies_boxing_and_unboxing() {
        let mut oracle = NoHierarchy;
        let int = Argument::typed("I");
        let boxed = Argument::typed("Ljava/lang/Integer;");
        let platform = Nullability::Platform;

        assert_eq!(
            classify(&int, "Ljava/lang/Object;", platform, &mut oracle),
            ConversionOutcome::Allowed(ConversionKind::Boxing)
        );
        assert_eq!(
            classify(&boxed, "J", platform, &mut oracle),
            ConversionOutcome::Allowed(ConversionKind::Unboxing)
        );
        assert_eq!(
            classify(&int, "D", platform, &mut oracle),
            ConversionOutcome::Allowed(ConversionKind::WideningPrimitive)
        );
    }

    #[test_case("I", "Ljava/lang/Long;", true; "int boxes into long")]
    #[test_case("I", "Ljava/lang/Double;", true; "int boxes into double")]
    #[test_case("C", "Ljava/lang/Integer;", true; "char boxes into integer")]
    #[test_case("Ljava/lang/Integer;", "Ljava/lang/Double;", true; "integer widens to double")]
    #[test_case("Ljava/lang/Byte;", "Ljava/lang/Short;", true; "byte widens to short")]
    #[test_case("J", "Ljava/lang/Integer;", false; "long does not narrow into integer")]
    #[test_case("Ljava/lang/Long;", "Ljava/lang/Integer;", false; "wrappers do not narrow")]
    #[test_case("Z", "Ljava/lang/Integer;", false; "boolean is not numeric")]
    #[test_case("Ljava/lang/Short;", "Ljava/lang/Character;", false; "short does not reach char")]
    fn boxing_into_wider_wrappers(argument: &str, parameter: &str, allowed: bool) {
        let outcome = classify(
            &Argument::typed(argument),
            parameter,
            Nullability::Platform,
            &mut NoHierarchy,
        );
        if allowed {
            assert_eq!(outcome, ConversionOutcome::Allowed(ConversionKind::Boxing));
        } else {
            assert!(matches!(outcome, ConversionOutcome::Rejected(_)));
        }
    }

    #[test_case("I", "Ljava/lang/Integer;", true; "int over its wrapper")]
    #[test_case("I", "Ljava/lang/Object;", true; "int over object")]
    #[test_case("I", "Ljava/lang/Number;", true; "int over number")]
    #[test_case("Ljava/lang/Integer;", "I", false; "wrapper never over primitive")]
    #[test_case("J", "Ljava/lang/Integer;", false; "long unrelated to integer")]
    #[test_case("I", "Ljava/lang/Long;", false; "int not over a wider wrapper")]
    #[test_case("I", "J", true; "int over long")]
    fn specificity_ordering(from: &str, to: &str, expected: bool) {
        assert_eq!(at_least_as_specific(from, to, &mut NoHierarchy), expected);
    }

    #[test]
    fn null_respects_primitives_and_non_null() {
        let mut oracle = NoHierarchy;
        assert!(matches!(
            classify(&Argument::Null, "I", Nullability::Platform, &mut oracle),
            ConversionOutcome::Rejected(_)
        ));
        assert!(matches!(
            classify(&Argument::Undefined, "Ljava/lang/String;", Nullability::NonNull, &mut oracle),
            ConversionOutcome::Rejected(_)
        ));
        assert_eq!(
            classify(&Argument::Null, "[I", Nullability::Nullable, &mut oracle),
            ConversionOutcome::Allowed(ConversionKind::NullReference)
        );
    }
}
