//! Supertype closure and inherited member lookup.
//!
//! Supertypes are walked depth-first (superclass chain, then each
//! interface) with an explicit worklist, so arbitrarily deep or cyclic
//! hierarchies terminate without growing the call stack. Member scans are
//! memoized per `(owner, member name)`.

use crate::access::AccessContext;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::{debug, trace};
use tsj_metadata::classfile::{package_of, AccessFlags, ClassDescriptor};
use tsj_metadata::symbol_table::normalize_class_name;
use tsj_metadata::SymbolTable;

/// Source of class descriptors for hierarchy walks.
pub trait ClassLookup {
    fn lookup_class(&mut self, internal_name: &str) -> Option<Arc<ClassDescriptor>>;

    /// Module the class was loaded from, when the source knows it.
    fn module_of(&mut self, internal_name: &str) -> Option<String> {
        let _ = internal_name;
        None
    }
}

impl ClassLookup for SymbolTable {
    fn lookup_class(&mut self, internal_name: &str) -> Option<Arc<ClassDescriptor>> {
        self.resolve_class(internal_name)
    }

    fn module_of(&mut self, internal_name: &str) -> Option<String> {
        self.resolve_class_with_metadata(internal_name)
            .origin
            .and_then(|origin| origin.module_name)
    }
}

impl<T: ClassLookup + ?Sized> ClassLookup for &mut T {
    fn lookup_class(&mut self, internal_name: &str) -> Option<Arc<ClassDescriptor>> {
        (**self).lookup_class(internal_name)
    }

    fn module_of(&mut self, internal_name: &str) -> Option<String> {
        (**self).module_of(internal_name)
    }
}

/// Hash-map backed lookup for descriptors that are already in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryClasses {
    classes: FxHashMap<String, Arc<ClassDescriptor>>,
    modules: FxHashMap<String, String>,
}

impl InMemoryClasses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, descriptor: ClassDescriptor) -> Option<Arc<ClassDescriptor>> {
        self.classes
            .insert(descriptor.internal_name.clone(), Arc::new(descriptor))
    }

    pub fn with_class(mut self, descriptor: ClassDescriptor) -> Self {
        self.insert(descriptor);
        self
    }

    pub fn with_module(mut self, class_name: &str, module: impl Into<String>) -> Self {
        self.modules
            .insert(normalize_class_name(class_name), module.into());
        self
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl FromIterator<ClassDescriptor> for InMemoryClasses {
    fn from_iter<I: IntoIterator<Item = ClassDescriptor>>(iter: I) -> Self {
        let mut classes = Self::new();
        for descriptor in iter {
            classes.insert(descriptor);
        }
        classes
    }
}

impl ClassLookup for InMemoryClasses {
    fn lookup_class(&mut self, internal_name: &str) -> Option<Arc<ClassDescriptor>> {
        self.classes.get(internal_name).cloned()
    }

    fn module_of(&mut self, internal_name: &str) -> Option<String> {
        self.modules.get(internal_name).cloned()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupertypeResult {
    /// De-duplicated, in traversal order; never contains the starting class.
    pub supertypes: Vec<String>,
    pub diagnostics: Vec<String>,
}

impl SupertypeResult {
    pub fn contains(&self, internal_name: &str) -> bool {
        self.supertypes.iter().any(|name| name == internal_name)
    }

    pub fn has_cycle(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diagnostic| diagnostic.starts_with("Detected inheritance cycle"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Protected,
    PackagePrivate,
    Private,
}

impl Visibility {
    pub fn from_flags(access: AccessFlags) -> Self {
        if access.is_public() {
            Visibility::Public
        } else if access.is_protected() {
            Visibility::Protected
        } else if access.is_private() {
            Visibility::Private
        } else {
            Visibility::PackagePrivate
        }
    }
}

/// A field or method found by [`InheritanceResolver::collect_members`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMember {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub kind: MemberKind,
    pub access: AccessFlags,
    /// `false` only for members declared by the queried class itself.
    pub inherited: bool,
    pub visibility: Visibility,
    pub accessible: bool,
    pub module_readable: bool,
    pub package_exported: bool,
}

impl ResolvedMember {
    pub fn is_static(&self) -> bool {
        self.access.is_static()
    }

    pub fn is_bridge(&self) -> bool {
        self.kind == MemberKind::Method && self.access.is_bridge()
    }

    pub fn is_synthetic(&self) -> bool {
        self.access.is_synthetic()
    }

    pub fn is_varargs(&self) -> bool {
        self.kind == MemberKind::Method && self.access.is_varargs()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberLookupResult {
    pub target: String,
    pub member_name: String,
    /// Fields before methods per owner; owners in supertype order.
    pub members: Vec<ResolvedMember>,
    pub diagnostics: Vec<String>,
}

impl MemberLookupResult {
    pub fn accessible(&self) -> impl Iterator<Item = &ResolvedMember> {
        self.members.iter().filter(|member| member.accessible)
    }

    pub fn methods(&self) -> impl Iterator<Item = &ResolvedMember> {
        self.members
            .iter()
            .filter(|member| member.kind == MemberKind::Method)
    }

    pub fn fields(&self) -> impl Iterator<Item = &ResolvedMember> {
        self.members
            .iter()
            .filter(|member| member.kind == MemberKind::Field)
    }
}

/// Requesting class plus the module context its checks run in.
#[derive(Debug, Clone, Default)]
pub struct LookupContext<'g> {
    requester_class: String,
    access: AccessContext<'g>,
}

impl<'g> LookupContext<'g> {
    pub fn new(requester_class: &str, access: AccessContext<'g>) -> Self {
        Self {
            requester_class: normalize_class_name(requester_class),
            access,
        }
    }

    /// Requester without module restrictions; visibility still applies.
    pub fn unrestricted(requester_class: &str) -> Self {
        Self::new(requester_class, AccessContext::unrestricted())
    }

    pub fn requester_class(&self) -> &str {
        &self.requester_class
    }

    pub fn access(&self) -> &AccessContext<'g> {
        &self.access
    }
}

#[derive(Debug, Clone)]
struct DeclaredMember {
    name: String,
    descriptor: String,
    kind: MemberKind,
    access: AccessFlags,
}

type MemberKey = (String, String);

struct Frame {
    name: String,
    edges: Vec<String>,
    next: usize,
}

impl Frame {
    fn new(descriptor: &ClassDescriptor) -> Self {
        let edges = descriptor
            .super_name
            .iter()
            .chain(descriptor.interfaces.iter())
            .cloned()
            .collect();
        Self {
            name: descriptor.internal_name.clone(),
            edges,
            next: 0,
        }
    }
}

/// Answers supertype and member queries over a [`ClassLookup`].
#[derive(Debug)]
pub struct InheritanceResolver<L> {
    lookup: L,
    supertypes: FxHashMap<String, SupertypeResult>,
    declared: FxHashMap<MemberKey, Arc<[DeclaredMember]>>,
    scan_counts: FxHashMap<MemberKey, u32>,
}

impl<L: ClassLookup> InheritanceResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            supertypes: FxHashMap::default(),
            declared: FxHashMap::default(),
            scan_counts: FxHashMap::default(),
        }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    pub fn lookup_mut(&mut self) -> &mut L {
        &mut self.lookup
    }

    pub fn into_lookup(self) -> L {
        self.lookup
    }

    /// Drops memoized supertypes and member scans, e.g. after the
    /// classpath behind the lookup changed.
    pub fn clear_caches(&mut self) {
        self.supertypes.clear();
        self.declared.clear();
        self.scan_counts.clear();
    }

    pub fn get_all_supertypes(&mut self, class_name: &str) -> SupertypeResult {
        let start = normalize_class_name(class_name);
        if let Some(cached) = self.supertypes.get(&start) {
            return cached.clone();
        }
        let result = self.walk_supertypes(&start);
        self.supertypes.insert(start, result.clone());
        result
    }

    fn walk_supertypes(&mut self, start: &str) -> SupertypeResult {
        let mut result = SupertypeResult::default();
        let mut seen = FxHashSet::default();

        let Some(descriptor) = self.lookup.lookup_class(start) else {
            result
                .diagnostics
                .push(format!("Class not found while traversing supertypes: {start}"));
            return result;
        };
        let mut stack = vec![Frame::new(&descriptor)];
        let mut on_path: FxHashSet<String> = FxHashSet::default();
        on_path.insert(descriptor.internal_name.clone());

        while let Some(frame) = stack.last_mut() {
            let Some(next) = frame.edges.get(frame.next).cloned() else {
                if let Some(done) = stack.pop() {
                    on_path.remove(&done.name);
                }
                continue;
            };
            frame.next += 1;

            if on_path.contains(&next) {
                let owner = &stack[stack.len() - 1].name;
                debug!(owner = %owner, next = %next, "inheritance cycle cut");
                result
                    .diagnostics
                    .push(format!("Detected inheritance cycle at {owner} -> {next}"));
                continue;
            }
            if !seen.insert(next.clone()) {
                continue;
            }
            result.supertypes.push(next.clone());

            match self.lookup.lookup_class(&next) {
                Some(descriptor) => {
                    on_path.insert(next);
                    stack.push(Frame::new(&descriptor));
                }
                None => result
                    .diagnostics
                    .push(format!("Class not found while traversing supertypes: {next}")),
            }
        }

        result
    }

    /// `true` when `sub` equals `sup` or lists it among its supertypes.
    pub fn is_subtype(&mut self, sub: &str, sup: &str) -> bool {
        let sub = normalize_class_name(sub);
        let sup = normalize_class_name(sup);
        sub == sup || self.get_all_supertypes(&sub).contains(&sup)
    }

    pub fn collect_members(
        &mut self,
        class_name: &str,
        member_name: &str,
        context: &LookupContext<'_>,
    ) -> MemberLookupResult {
        let target = normalize_class_name(class_name);
        let SupertypeResult {
            supertypes,
            diagnostics,
        } = self.get_all_supertypes(&target);

        let mut members = Vec::new();
        for owner in std::iter::once(target.clone()).chain(supertypes) {
            let declared = self.declared_members(&owner, member_name);
            if declared.is_empty() {
                continue;
            }
            let owner_module = context
                .access()
                .owner_module(&owner, || self.lookup.module_of(&owner));
            for member in declared.iter() {
                members.push(self.resolve_member(
                    &target,
                    &owner,
                    owner_module.as_deref(),
                    member,
                    context,
                ));
            }
        }

        MemberLookupResult {
            target,
            member_name: member_name.to_string(),
            members,
            diagnostics,
        }
    }

    /// How many times the declared members of `owner` named `member_name`
    /// were read from the backing descriptor.
    pub fn member_scan_count(&self, owner: &str, member_name: &str) -> u32 {
        let key = (normalize_class_name(owner), member_name.to_string());
        self.scan_counts.get(&key).copied().unwrap_or(0)
    }

    fn declared_members(&mut self, owner: &str, member_name: &str) -> Arc<[DeclaredMember]> {
        let key = (owner.to_string(), member_name.to_string());
        if let Some(cached) = self.declared.get(&key) {
            return cached.clone();
        }

        *self.scan_counts.entry(key.clone()).or_default() += 1;
        let members: Arc<[DeclaredMember]> = match self.lookup.lookup_class(owner) {
            Some(descriptor) => {
                let fields = descriptor.fields_named(member_name).map(|field| DeclaredMember {
                    name: field.name.clone(),
                    descriptor: field.descriptor.clone(),
                    kind: MemberKind::Field,
                    access: field.access,
                });
                let methods = descriptor
                    .methods_named(member_name)
                    .map(|method| DeclaredMember {
                        name: method.name.clone(),
                        descriptor: method.descriptor.clone(),
                        kind: MemberKind::Method,
                        access: method.access,
                    });
                fields.chain(methods).collect()
            }
            None => Arc::from(Vec::new()),
        };
        trace!(owner, member = member_name, found = members.len(), "scanned declared members");

        self.declared.insert(key, members.clone());
        members
    }

    fn resolve_member(
        &mut self,
        target: &str,
        owner: &str,
        owner_module: Option<&str>,
        member: &DeclaredMember,
        context: &LookupContext<'_>,
    ) -> ResolvedMember {
        let access = context.access();
        let requester = context.requester_class();
        let owner_package = package_of(owner);
        let same_package = !requester.is_empty() && package_of(requester) == owner_package;

        let module_readable = access.module_readable(owner_module);
        let package_exported = access.package_exported(owner_module, owner_package);
        let visibility = Visibility::from_flags(member.access);

        let accessible = match visibility {
            Visibility::Public => module_readable && package_exported,
            Visibility::Protected => {
                module_readable
                    && package_exported
                    && (same_package || self.requester_extends(requester, owner))
            }
            Visibility::Private => requester == owner,
            Visibility::PackagePrivate => {
                let same_module = match (owner_module, access.requester_module()) {
                    (Some(owner), Some(requester)) => owner == requester,
                    _ => true,
                };
                same_package && same_module
            }
        };

        ResolvedMember {
            owner: owner.to_string(),
            name: member.name.clone(),
            descriptor: member.descriptor.clone(),
            kind: member.kind,
            access: member.access,
            inherited: owner != target,
            visibility,
            accessible,
            module_readable,
            package_exported,
        }
    }

    fn requester_extends(&mut self, requester: &str, owner: &str) -> bool {
        !requester.is_empty() && self.get_all_supertypes(requester).contains(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsj_metadata::fixture::{ClassFileBuilder, MemberSpec};
    use tsj_metadata::read_class;

    fn class(builder: ClassFileBuilder) -> ClassDescriptor {
        read_class(&builder.build()).unwrap()
    }

    #[test]
    fn walks_superclass_chain_before_interfaces() {
        let classes: InMemoryClasses = [
            class(ClassFileBuilder::new("p/C").super_class("p/B").implements("p/I")),
            class(ClassFileBuilder::new("p/B").super_class("p/A").implements("p/J")),
            class(ClassFileBuilder::new("p/A")),
            class(ClassFileBuilder::interface("p/I").implements("p/J")),
            class(ClassFileBuilder::interface("p/J")),
            class(ClassFileBuilder::new("java/lang/Object").no_super()),
        ]
        .into_iter()
        .collect();

        let mut resolver = InheritanceResolver::new(classes);
        let result = resolver.get_all_supertypes("p.C");
        assert_eq!(
            result.supertypes,
            vec!["p/B", "p/A", "java/lang/Object", "p/J", "p/I"]
        );
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn missing_supertypes_are_listed_and_reported() {
        let classes: InMemoryClasses = [class(ClassFileBuilder::new("p/C").super_class("p/Gone"))]
            .into_iter()
            .collect();
        let mut resolver = InheritanceResolver::new(classes);
        let result = resolver.get_all_supertypes("p/C");
        assert_eq!(result.supertypes, vec!["p/Gone"]);
        assert_eq!(
            result.diagnostics,
            vec!["Class not found while traversing supertypes: p/Gone"]
        );
        assert!(resolver.is_subtype("p/C", "p/Gone"));
    }

    #[test]
    fn deep_hierarchy_does_not_recurse() {
        let depth = 5_000;
        let mut classes = InMemoryClasses::new();
        for idx in 0..depth {
            let name = format!("deep/C{idx}");
            let builder = if idx + 1 == depth {
                ClassFileBuilder::new(name).no_super()
            } else {
                ClassFileBuilder::new(name).super_class(format!("deep/C{}", idx + 1))
            };
            classes.insert(class(builder));
        }
        let mut resolver = InheritanceResolver::new(classes);
        let result = resolver.get_all_supertypes("deep/C0");
        assert_eq!(result.supertypes.len(), depth - 1);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn member_scans_are_memoized_per_owner_and_name() {
        let classes: InMemoryClasses = [
            class(
                ClassFileBuilder::new("p/A")
                    .no_super()
                    .field(MemberSpec::public("size", "I"))
                    .method(MemberSpec::public("size", "()I")),
            ),
            class(ClassFileBuilder::new("p/B").super_class("p/A")),
        ]
        .into_iter()
        .collect();
        let mut resolver = InheritanceResolver::new(classes);
        let context = LookupContext::unrestricted("p/B");

        let first = resolver.collect_members("p/B", "size", &context);
        let second = resolver.collect_members("p/B", "size", &context);
        assert_eq!(first, second);
        assert_eq!(first.members.len(), 2);
        assert_eq!(first.members[0].kind, MemberKind::Field);
        assert_eq!(first.members[1].kind, MemberKind::Method);
        assert!(first.members.iter().all(|member| member.inherited));
        assert_eq!(resolver.member_scan_count("p/A", "size"), 1);
        assert_eq!(resolver.member_scan_count("p/B", "size"), 1);
        assert_eq!(resolver.member_scan_count("p/A", "other"), 0);
    }
}
