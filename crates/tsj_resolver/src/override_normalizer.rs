//! Collapses overriding, covariant and bridge methods into one entry per
//! override key.

use crate::inheritance::{MemberKind, ResolvedMember};
use indexmap::{IndexMap, IndexSet};
use tsj_metadata::descriptor::{parameter_section, split_method_descriptor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMethod {
    pub owner: String,
    pub name: String,
    /// Descriptor of the preferred declaration.
    pub descriptor: String,
    /// Method name followed by the erased parameter section, e.g. `get(I)`.
    pub override_key: String,
    pub bridge: bool,
    pub synthetic: bool,
    /// Other descriptors that collapsed into this entry, first seen first.
    pub overridden_descriptors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizationResult {
    /// Every method among the input members, in input order.
    pub candidates: Vec<ResolvedMember>,
    pub normalized: Vec<NormalizedMethod>,
}

struct Accumulator<'a> {
    selected: &'a ResolvedMember,
    overridden: IndexSet<String>,
}

/// Normalizes the methods in `members`, typically the output of
/// [`InheritanceResolver::collect_members`](crate::InheritanceResolver::collect_members).
///
/// A bridge's key is adopted by every authored method of the same owner,
/// name and arity, so a generic bridge and the method it forwards to share
/// one entry. Within an entry the preferred method has the lowest score
/// (bridge 4, synthetic 2, inherited 1); ties keep the first seen.
pub fn normalize_methods(members: &[ResolvedMember]) -> NormalizationResult {
    let methods: Vec<&ResolvedMember> = members
        .iter()
        .filter(|member| member.kind == MemberKind::Method)
        .collect();

    let mut bridge_keys: IndexMap<(&str, &str, usize), String> = IndexMap::new();
    for method in methods.iter().filter(|method| method.is_bridge()) {
        bridge_keys
            .entry((&method.owner, &method.name, arity(&method.descriptor)))
            .or_insert_with(|| override_key(method));
    }

    let mut entries: IndexMap<String, Accumulator<'_>> = IndexMap::new();
    for method in methods.iter().copied() {
        let key = if method.is_bridge() {
            override_key(method)
        } else {
            bridge_keys
                .get(&(method.owner.as_str(), method.name.as_str(), arity(&method.descriptor)))
                .cloned()
                .unwrap_or_else(|| override_key(method))
        };

        let Some(entry) = entries.get_mut(&key) else {
            entries.insert(
                key,
                Accumulator {
                    selected: method,
                    overridden: IndexSet::new(),
                },
            );
            continue;
        };

        if score(method) < score(entry.selected) {
            let previous = std::mem::replace(&mut entry.selected, method);
            if previous.descriptor != method.descriptor {
                entry.overridden.insert(previous.descriptor.clone());
            }
            entry.overridden.shift_remove(&method.descriptor);
        } else if entry.selected.descriptor != method.descriptor {
            entry.overridden.insert(method.descriptor.clone());
        }
    }

    let normalized = entries
        .into_iter()
        .map(|(override_key, entry)| NormalizedMethod {
            owner: entry.selected.owner.clone(),
            name: entry.selected.name.clone(),
            descriptor: entry.selected.descriptor.clone(),
            override_key,
            bridge: entry.selected.is_bridge(),
            synthetic: entry.selected.is_synthetic(),
            overridden_descriptors: entry.overridden.into_iter().collect(),
        })
        .collect();

    NormalizationResult {
        candidates: methods.into_iter().cloned().collect(),
        normalized,
    }
}

fn override_key(method: &ResolvedMember) -> String {
    format!("{}{}", method.name, parameter_section(&method.descriptor))
}

fn arity(descriptor: &str) -> usize {
    split_method_descriptor(descriptor)
        .map(|parts| parts.parameters.len())
        .unwrap_or(0)
}

fn score(method: &ResolvedMember) -> u8 {
    let mut score = 0;
    if method.is_bridge() {
        score += 4;
    }
    if method.is_synthetic() {
        score += 2;
    }
    if method.inherited {
        score += 1;
    }
    score
}
