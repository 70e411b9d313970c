use std::path::Path;

use tempfile::tempdir;
use tsj_metadata::classpath::ClasspathEntry;
use tsj_metadata::fixture::{write_class, ClassFileBuilder, MemberSpec};
use tsj_metadata::{AccessFlags, SymbolTable};
use tsj_resolver::{InheritanceResolver, LookupContext, MemberKind, Visibility};

fn classpath(root: &Path, classes: Vec<(&str, ClassFileBuilder)>) -> SymbolTable {
    for (name, builder) in classes {
        write_class(root, name, &builder.build()).unwrap();
    }
    SymbolTable::new(vec![ClasspathEntry::Directory(root.to_path_buf())], "fp", 21)
}

fn object() -> (&'static str, ClassFileBuilder) {
    ("java/lang/Object", ClassFileBuilder::new("java/lang/Object").no_super())
}

#[test]
fn cyclic_hierarchy_terminates_with_diagnostic() {
    let dir = tempdir().unwrap();
    let table = classpath(
        dir.path(),
        vec![
            ("cyc/A", ClassFileBuilder::new("cyc/A").super_class("cyc/B")),
            ("cyc/B", ClassFileBuilder::new("cyc/B").super_class("cyc/A")),
        ],
    );
    let mut resolver = InheritanceResolver::new(table);

    let result = resolver.get_all_supertypes("cyc.A");
    assert_eq!(result.supertypes, vec!["cyc/B"]);
    assert!(result.has_cycle());
    assert_eq!(
        result.diagnostics,
        vec!["Detected inheritance cycle at cyc/B -> cyc/A".to_string()]
    );
    assert!(resolver.is_subtype("cyc/A", "cyc/B"));
}

#[test]
fn interface_closure_follows_superclass_chain() {
    let dir = tempdir().unwrap();
    let table = classpath(
        dir.path(),
        vec![
            object(),
            ("h/Root", ClassFileBuilder::interface("h/Root")),
            (
                "h/Named",
                ClassFileBuilder::interface("h/Named").implements("h/Root"),
            ),
            ("h/Base", ClassFileBuilder::new("h/Base").implements("h/Root")),
            (
                "h/Leaf",
                ClassFileBuilder::new("h/Leaf")
                    .super_class("h/Base")
                    .implements("h/Named"),
            ),
        ],
    );
    let mut resolver = InheritanceResolver::new(table);

    let result = resolver.get_all_supertypes("h/Leaf");
    assert_eq!(
        result.supertypes,
        vec!["h/Base", "java/lang/Object", "h/Root", "h/Named"]
    );
    assert!(result.diagnostics.is_empty());
    assert!(resolver.is_subtype("h.Leaf", "h.Root"));
    assert!(!resolver.is_subtype("h/Base", "h/Named"));
}

fn access_fixture(root: &Path) -> SymbolTable {
    let base = ClassFileBuilder::new("lib/Base")
        .method(MemberSpec::new(AccessFlags::PROTECTED, "run", "()V"))
        .method(MemberSpec::new(0, "run", "(I)V"))
        .method(MemberSpec::new(AccessFlags::PRIVATE, "run", "(J)V"))
        .field(MemberSpec::public("run", "Ljava/lang/Runnable;"));
    classpath(
        root,
        vec![
            object(),
            ("lib/Base", base),
            ("app/Sub", ClassFileBuilder::new("app/Sub").super_class("lib/Base")),
            ("app/Other", ClassFileBuilder::new("app/Other")),
            ("lib/Neighbor", ClassFileBuilder::new("lib/Neighbor")),
        ],
    )
}

#[test]
fn protected_members_reach_cross_package_subclasses() {
    let dir = tempdir().unwrap();
    let mut resolver = InheritanceResolver::new(access_fixture(dir.path()));

    let context = LookupContext::unrestricted("app/Sub");
    let result = resolver.collect_members("app/Sub", "run", &context);
    assert!(result.diagnostics.is_empty());
    assert_eq!(result.target, "app/Sub");
    assert_eq!(result.members.len(), 4);
    assert!(result.members.iter().all(|member| member.inherited));
    assert!(result.members.iter().all(|member| member.owner == "lib/Base"));
    assert_eq!(result.members[0].kind, MemberKind::Field);

    let by_descriptor = |descriptor: &str| {
        result
            .methods()
            .find(|member| member.descriptor == descriptor)
            .expect("method present")
    };
    let protected = by_descriptor("()V");
    assert_eq!(protected.visibility, Visibility::Protected);
    assert!(protected.accessible);

    let package_private = by_descriptor("(I)V");
    assert_eq!(package_private.visibility, Visibility::PackagePrivate);
    assert!(!package_private.accessible);

    assert!(!by_descriptor("(J)V").accessible);
    assert_eq!(result.accessible().count(), 2);
}

#[test]
fn unrelated_requesters_see_only_their_package_rights() {
    let dir = tempdir().unwrap();
    let mut resolver = InheritanceResolver::new(access_fixture(dir.path()));

    let other =
        resolver.collect_members("lib/Base", "run", &LookupContext::unrestricted("app/Other"));
    let accessible: Vec<_> = other.methods().filter(|m| m.accessible).collect();
    assert!(accessible.is_empty());

    let neighbor =
        resolver.collect_members("lib/Base", "run", &LookupContext::unrestricted("lib/Neighbor"));
    let descriptors: Vec<_> = neighbor
        .methods()
        .filter(|member| member.accessible)
        .map(|member| member.descriptor.as_str())
        .collect();
    assert_eq!(descriptors, vec!["()V", "(I)V"]);

    let own =
        resolver.collect_members("lib/Base", "run", &LookupContext::unrestricted("lib/Base"));
    assert!(own.methods().all(|member| member.accessible && !member.inherited));
}

#[test]
fn repeated_member_queries_scan_each_owner_once() {
    let dir = tempdir().unwrap();
    let mut resolver = InheritanceResolver::new(access_fixture(dir.path()));
    let context = LookupContext::unrestricted("app/Sub");

    let first = resolver.collect_members("app/Sub", "run", &context);
    let second = resolver.collect_members("app/Sub", "run", &context);
    let third =
        resolver.collect_members("app.Sub", "run", &LookupContext::unrestricted("app/Other"));

    assert_eq!(first.members.len(), second.members.len());
    assert_eq!(first.members.len(), third.members.len());
    assert_eq!(resolver.member_scan_count("lib/Base", "run"), 1);
    assert_eq!(resolver.member_scan_count("app/Sub", "run"), 1);
    assert_eq!(resolver.member_scan_count("java.lang.Object", "run"), 1);
    assert_eq!(resolver.lookup().parse_count("lib/Base"), 1);

    resolver.clear_caches();
    resolver.collect_members("app/Sub", "run", &context);
    assert_eq!(resolver.member_scan_count("lib/Base", "run"), 1);
}
