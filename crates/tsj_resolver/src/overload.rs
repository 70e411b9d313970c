//! Overload selection over erased candidate descriptors.
//!
//! Resolution runs two phases. The fixed-arity phase matches every argument
//! against its formal parameter with identity, primitive widening, subtyping,
//! boxing and unboxing. Only when no fixed-arity candidate applies does the
//! varargs phase run, matching the trailing array parameter against zero or
//! more trailing arguments. Within the phase that produced applicable
//! candidates, the unique most specific one is selected.

use crate::conversions::{
    at_least_as_specific, classify, ConversionKind, ConversionOutcome, SubtypeOracle,
};
use crate::inheritance::{MemberKind, MemberLookupResult, ResolvedMember};
use crate::nullability::{AnalysisResult, Nullability};
use indexmap::IndexSet;
use std::fmt;
use tracing::debug;
use tsj_metadata::descriptor::{split_method_descriptor, DescriptorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InvokeKind {
    Constructor,
    StaticMethod,
    InstanceMethod,
}

impl InvokeKind {
    pub fn label(self) -> &'static str {
        match self {
            InvokeKind::Constructor => "constructor",
            InvokeKind::StaticMethod => "static",
            InvokeKind::InstanceMethod => "instance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberIdentity {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub invoke_kind: InvokeKind,
}

impl fmt::Display for MemberIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}{}", self.owner, self.name, self.descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub identity: MemberIdentity,
    pub varargs: bool,
    /// Erased parameter descriptors in declaration order.
    pub parameters: Vec<String>,
    /// Aligned with `parameters`.
    pub nullability: Vec<Nullability>,
}

impl Candidate {
    pub fn new(identity: MemberIdentity, varargs: bool) -> Result<Self, DescriptorError> {
        let parameters = split_method_descriptor(&identity.descriptor)?.parameters;
        let nullability = vec![Nullability::Platform; parameters.len()];
        Ok(Self {
            identity,
            varargs: varargs && !parameters.is_empty(),
            parameters,
            nullability,
        })
    }

    /// Replaces parameter nullability; missing trailing entries stay
    /// [`Nullability::Platform`].
    pub fn with_parameter_nullability(mut self, states: &[Nullability]) -> Self {
        for (slot, state) in self.nullability.iter_mut().zip(states) {
            *slot = *state;
        }
        self
    }

    /// Builds a candidate from a looked-up method. Fields and methods with
    /// unreadable descriptors yield `None`.
    pub fn from_member(member: &ResolvedMember, invoke_kind: InvokeKind) -> Option<Self> {
        if member.kind != MemberKind::Method {
            return None;
        }
        let identity = MemberIdentity {
            owner: member.owner.clone(),
            name: member.name.clone(),
            descriptor: member.descriptor.clone(),
            invoke_kind,
        };
        Self::new(identity, member.is_varargs()).ok()
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    fn nullability_at(&self, index: usize) -> Nullability {
        self.nullability.get(index).copied().unwrap_or_default()
    }
}

/// Accessible methods of `lookup` matching `invoke_kind`, most derived
/// declaration per descriptor, sorted for resolution. Bridges and synthetic
/// methods are dropped whenever an authored method remains.
pub fn candidates_for_method(
    lookup: &MemberLookupResult,
    invoke_kind: InvokeKind,
    nullability: Option<&AnalysisResult>,
) -> Vec<Candidate> {
    let expect_static = match invoke_kind {
        InvokeKind::StaticMethod => true,
        InvokeKind::InstanceMethod => false,
        InvokeKind::Constructor => return candidates_for_constructors(lookup, nullability),
    };
    let visible: Vec<&ResolvedMember> = lookup
        .methods()
        .filter(|member| member.accessible && member.is_static() == expect_static)
        .filter(|member| member.name != "<init>" && member.name != "<clinit>")
        .collect();
    collect_candidates(visible, invoke_kind, nullability)
}

/// Accessible constructors declared by the looked-up class itself.
pub fn candidates_for_constructors(
    lookup: &MemberLookupResult,
    nullability: Option<&AnalysisResult>,
) -> Vec<Candidate> {
    let visible: Vec<&ResolvedMember> = lookup
        .methods()
        .filter(|member| member.name == "<init>" && !member.inherited && member.accessible)
        .collect();
    collect_candidates(visible, InvokeKind::Constructor, nullability)
}

fn collect_candidates(
    visible: Vec<&ResolvedMember>,
    invoke_kind: InvokeKind,
    nullability: Option<&AnalysisResult>,
) -> Vec<Candidate> {
    let authored = visible
        .iter()
        .any(|member| !member.is_bridge() && !member.is_synthetic());

    let mut seen = IndexSet::new();
    let mut candidates: Vec<Candidate> = visible
        .into_iter()
        .filter(|member| !authored || (!member.is_bridge() && !member.is_synthetic()))
        .filter(|member| seen.insert(member.descriptor.clone()))
        .filter_map(|member| {
            let candidate = Candidate::from_member(member, invoke_kind)?;
            let states = nullability
                .and_then(|analysis| {
                    analysis.method(&member.owner, &member.name, &member.descriptor)
                })
                .map(|method| method.parameters.as_slice())
                .unwrap_or_default();
            Some(candidate.with_parameter_nullability(states))
        })
        .collect();
    sort_candidates(&mut candidates);
    candidates
}

fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|left, right| {
        left.identity
            .descriptor
            .cmp(&right.identity.descriptor)
            .then_with(|| left.identity.owner.cmp(&right.identity.owner))
    });
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Argument {
    /// Static type of the argument expression as an erased descriptor.
    Typed(String),
    Null,
    Undefined,
}

impl Argument {
    pub fn typed(descriptor: impl Into<String>) -> Self {
        Argument::Typed(descriptor.into())
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Typed(descriptor) => f.write_str(descriptor),
            Argument::Null => f.write_str("null"),
            Argument::Undefined => f.write_str("undefined"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    FixedArity,
    Varargs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateOutcome {
    pub candidate: Candidate,
    /// Phase the candidate became applicable in; `None` if it never did.
    pub phase: Option<Phase>,
    /// Formal parameter types the arguments were matched against, with the
    /// varargs parameter expanded to the argument count.
    pub formals: Vec<String>,
    pub conversions: Vec<ConversionKind>,
    pub reason: Option<String>,
}

impl CandidateOutcome {
    pub fn is_applicable(&self) -> bool {
        self.phase.is_some()
    }

    fn rejected(candidate: Candidate, reason: String) -> Self {
        Self {
            candidate,
            phase: None,
            formals: Vec::new(),
            conversions: Vec::new(),
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverloadStatus {
    Selected,
    NoApplicable,
    Ambiguous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: OverloadStatus,
    pub selected: Option<MemberIdentity>,
    pub diagnostic: Option<String>,
    /// One entry per candidate, in enumeration order.
    pub outcomes: Vec<CandidateOutcome>,
    /// The selected candidate, or the incomparable maximally specific ones.
    pub most_specific: Vec<MemberIdentity>,
    pub phase: Option<Phase>,
}

impl Resolution {
    pub fn is_selected(&self) -> bool {
        self.status == OverloadStatus::Selected
    }
}

/// Picks one candidate for a call site.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverloadResolver;

impl OverloadResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve<O>(
        &self,
        name: &str,
        candidates: &[Candidate],
        arguments: &[Argument],
        oracle: &mut O,
    ) -> Resolution
    where
        O: SubtypeOracle + ?Sized,
    {
        let mut ordered = candidates.to_vec();
        sort_candidates(&mut ordered);

        let outcomes: Vec<CandidateOutcome> = ordered
            .into_iter()
            .map(|candidate| evaluate(candidate, arguments, oracle))
            .collect();

        let Some(phase) = outcomes.iter().filter_map(|outcome| outcome.phase).min() else {
            let diagnostic = no_applicable_diagnostic(name, arguments, &outcomes);
            debug!(method = name, candidates = outcomes.len(), "no applicable overload");
            return Resolution {
                status: OverloadStatus::NoApplicable,
                selected: None,
                diagnostic: Some(diagnostic),
                outcomes,
                most_specific: Vec::new(),
                phase: None,
            };
        };

        let applicable: Vec<&CandidateOutcome> = outcomes
            .iter()
            .filter(|outcome| outcome.phase == Some(phase))
            .collect();

        let count = applicable.len();
        let mut dominates = vec![vec![false; count]; count];
        for (left, row) in dominates.iter_mut().enumerate() {
            for (right, cell) in row.iter_mut().enumerate() {
                if left != right {
                    *cell = strictly_more_specific(
                        &applicable[left].formals,
                        &applicable[right].formals,
                        oracle,
                    );
                }
            }
        }

        let winner = (0..count)
            .find(|&left| (0..count).all(|right| left == right || dominates[left][right]));
        if let Some(idx) = winner {
            let selected = applicable[idx].candidate.identity.clone();
            debug!(method = name, selected = %selected, ?phase, "overload selected");
            return Resolution {
                status: OverloadStatus::Selected,
                selected: Some(selected.clone()),
                diagnostic: None,
                outcomes,
                most_specific: vec![selected],
                phase: Some(phase),
            };
        }

        let maximal: Vec<MemberIdentity> = (0..count)
            .filter(|&idx| !(0..count).any(|other| other != idx && dominates[other][idx]))
            .map(|idx| applicable[idx].candidate.identity.clone())
            .collect();
        let diagnostic = ambiguous_diagnostic(name, arguments, &maximal);
        debug!(method = name, candidates = maximal.len(), "ambiguous overload");
        Resolution {
            status: OverloadStatus::Ambiguous,
            selected: None,
            diagnostic: Some(diagnostic),
            outcomes,
            most_specific: maximal,
            phase: Some(phase),
        }
    }
}

fn evaluate<O>(candidate: Candidate, arguments: &[Argument], oracle: &mut O) -> CandidateOutcome
where
    O: SubtypeOracle + ?Sized,
{
    if candidate.varargs {
        return evaluate_varargs(candidate, arguments, oracle);
    }
    if candidate.arity() != arguments.len() {
        let reason = format!(
            "arity mismatch: expected {} arguments, got {}",
            candidate.arity(),
            arguments.len()
        );
        return CandidateOutcome::rejected(candidate, reason);
    }

    let formals = candidate.parameters.clone();
    match match_arguments(&candidate, arguments, &formals, oracle) {
        Ok(conversions) => CandidateOutcome {
            candidate,
            phase: Some(Phase::FixedArity),
            formals,
            conversions,
            reason: None,
        },
        Err(reason) => CandidateOutcome::rejected(candidate, reason),
    }
}

fn evaluate_varargs<O>(
    candidate: Candidate,
    arguments: &[Argument],
    oracle: &mut O,
) -> CandidateOutcome
where
    O: SubtypeOracle + ?Sized,
{
    let Some(fixed) = candidate.arity().checked_sub(1) else {
        let reason = "varargs candidate without parameters".to_string();
        return CandidateOutcome::rejected(candidate, reason);
    };
    let array = candidate.parameters[fixed].clone();
    let Some(component) = array.strip_prefix('[').map(str::to_string) else {
        let reason = format!("invalid varargs parameter {array}");
        return CandidateOutcome::rejected(candidate, reason);
    };
    if arguments.len() < fixed {
        let reason = format!(
            "arity mismatch: expected at least {fixed} arguments, got {}",
            arguments.len()
        );
        return CandidateOutcome::rejected(candidate, reason);
    }

    // An array in the trailing position is passed through unchanged.
    if arguments.len() == candidate.arity() {
        let formals = candidate.parameters.clone();
        if let Ok(conversions) = match_arguments(&candidate, arguments, &formals, oracle) {
            return CandidateOutcome {
                candidate,
                phase: Some(Phase::Varargs),
                formals,
                conversions,
                reason: None,
            };
        }
    }

    let mut formals = candidate.parameters[..fixed].to_vec();
    formals.resize(arguments.len(), component);
    match match_arguments(&candidate, arguments, &formals, oracle) {
        Ok(conversions) => CandidateOutcome {
            candidate,
            phase: Some(Phase::Varargs),
            formals,
            conversions,
            reason: None,
        },
        Err(reason) => CandidateOutcome::rejected(candidate, reason),
    }
}

fn match_arguments<O>(
    candidate: &Candidate,
    arguments: &[Argument],
    formals: &[String],
    oracle: &mut O,
) -> Result<Vec<ConversionKind>, String>
where
    O: SubtypeOracle + ?Sized,
{
    let last = candidate.arity().saturating_sub(1);
    arguments
        .iter()
        .zip(formals)
        .enumerate()
        .map(|(index, (argument, formal))| {
            let nullability = candidate.nullability_at(index.min(last));
            match classify(argument, formal, nullability, oracle) {
                ConversionOutcome::Allowed(kind) => Ok(kind),
                ConversionOutcome::Rejected(reason) => {
                    Err(format!("argument {index} incompatible with {formal}: {reason}"))
                }
            }
        })
        .collect()
}

fn strictly_more_specific<O>(left: &[String], right: &[String], oracle: &mut O) -> bool
where
    O: SubtypeOracle + ?Sized,
{
    if left.len() != right.len() {
        return false;
    }
    let forward = left
        .iter()
        .zip(right)
        .all(|(l, r)| at_least_as_specific(l, r, oracle));
    forward
        && !left
            .iter()
            .zip(right)
            .all(|(l, r)| at_least_as_specific(r, l, oracle))
}

fn argument_list(arguments: &[Argument]) -> String {
    arguments
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn no_applicable_diagnostic(
    name: &str,
    arguments: &[Argument],
    outcomes: &[CandidateOutcome],
) -> String {
    let candidates = if outcomes.is_empty() {
        "none".to_string()
    } else {
        outcomes
            .iter()
            .map(|outcome| {
                format!(
                    "{} -> {}",
                    outcome.candidate.identity.descriptor,
                    outcome.reason.as_deref().unwrap_or("not applicable")
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    };
    format!(
        "No applicable candidate for {name}({}); candidates: {candidates}",
        argument_list(arguments)
    )
}

fn ambiguous_diagnostic(
    name: &str,
    arguments: &[Argument],
    candidates: &[MemberIdentity],
) -> String {
    let descriptors = candidates
        .iter()
        .map(|identity| identity.descriptor.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Ambiguous call to {name}({}): {descriptors}",
        argument_list(arguments)
    )
}
