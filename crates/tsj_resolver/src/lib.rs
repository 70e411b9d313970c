//! Query-side resolution over [`tsj_metadata`]: module access checks,
//! supertype and member lookup, overload selection, override collapsing and
//! nullness facts.
//!
//! Every resolver takes its lookup source and access context as explicit
//! arguments. Results are plain values; denials, ambiguities and missing
//! classes are statuses and diagnostics rather than errors.

pub mod access;
pub mod conversions;
pub mod inheritance;
pub mod nullability;
pub mod overload;
pub mod override_normalizer;

pub use access::{AccessContext, AccessResolution, AccessStatus, ModuleAccessResolver};
pub use conversions::{ConversionKind, ConversionOutcome, NoHierarchy, SubtypeOracle};
pub use inheritance::{
    ClassLookup, InMemoryClasses, InheritanceResolver, LookupContext, MemberKind,
    MemberLookupResult, ResolvedMember, SupertypeResult, Visibility,
};
pub use nullability::{analyze, AnalysisResult, ClassNullability, MethodNullability, Nullability};
pub use overload::{
    candidates_for_constructors, candidates_for_method, Argument, Candidate, CandidateOutcome,
    InvokeKind, MemberIdentity, OverloadResolver, OverloadStatus, Phase, Resolution,
};
pub use override_normalizer::{normalize_methods, NormalizationResult, NormalizedMethod};
