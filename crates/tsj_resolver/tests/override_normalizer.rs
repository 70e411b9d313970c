use tempfile::{tempdir, TempDir};
use tsj_metadata::classpath::ClasspathEntry;
use tsj_metadata::fixture::{write_class, ClassFileBuilder, MemberSpec};
use tsj_metadata::{AccessFlags, SymbolTable};
use tsj_resolver::{normalize_methods, InheritanceResolver, LookupContext, NormalizedMethod};

const BRIDGE: u16 = AccessFlags::PUBLIC | AccessFlags::BRIDGE | AccessFlags::SYNTHETIC;

fn resolver(classes: Vec<(&str, ClassFileBuilder)>) -> (TempDir, InheritanceResolver<SymbolTable>) {
    let dir = tempdir().unwrap();
    for (name, builder) in classes {
        write_class(dir.path(), name, &builder.build()).unwrap();
    }
    let table = SymbolTable::new(
        vec![ClasspathEntry::Directory(dir.path().to_path_buf())],
        "fp",
        21,
    );
    (dir, InheritanceResolver::new(table))
}

fn object() -> (&'static str, ClassFileBuilder) {
    ("java/lang/Object", ClassFileBuilder::new("java/lang/Object").no_super())
}

#[test]
fn generic_bridge_collapses_into_authored_method() {
    let (_dir, mut resolver) = resolver(vec![
        object(),
        (
            "java/lang/Comparable",
            ClassFileBuilder::interface("java/lang/Comparable").method(MemberSpec::new(
                AccessFlags::PUBLIC | AccessFlags::ABSTRACT,
                "compareTo",
                "(Ljava/lang/Object;)I",
            )),
        ),
        (
            "lib/Name",
            ClassFileBuilder::new("lib/Name")
                .implements("java/lang/Comparable")
                .method(MemberSpec::new(BRIDGE, "compareTo", "(Ljava/lang/Object;)I"))
                .method(MemberSpec::public("compareTo", "(Llib/Name;)I"))
                .method(MemberSpec::public("compareTo", "(Llib/Name;Z)I")),
        ),
    ]);

    let context = LookupContext::unrestricted("lib/Name");
    let lookup = resolver.collect_members("lib/Name", "compareTo", &context);
    let result = normalize_methods(&lookup.members);

    assert_eq!(result.candidates.len(), 4);
    assert_eq!(
        result.normalized,
        vec![
            NormalizedMethod {
                owner: "lib/Name".into(),
                name: "compareTo".into(),
                descriptor: "(Llib/Name;)I".into(),
                override_key: "compareTo(Ljava/lang/Object;)".into(),
                bridge: false,
                synthetic: false,
                overridden_descriptors: vec!["(Ljava/lang/Object;)I".into()],
            },
            NormalizedMethod {
                owner: "lib/Name".into(),
                name: "compareTo".into(),
                descriptor: "(Llib/Name;Z)I".into(),
                override_key: "compareTo(Llib/Name;Z)".into(),
                bridge: false,
                synthetic: false,
                overridden_descriptors: Vec::new(),
            },
        ]
    );
}

#[test]
fn covariant_return_override_keeps_most_derived_declaration() {
    let (_dir, mut resolver) = resolver(vec![
        object(),
        (
            "lib/Box",
            ClassFileBuilder::new("lib/Box")
                .method(MemberSpec::public("get", "()Ljava/lang/Object;")),
        ),
        (
            "lib/StringBox",
            ClassFileBuilder::new("lib/StringBox")
                .super_class("lib/Box")
                .method(MemberSpec::public("get", "()Ljava/lang/String;"))
                .method(MemberSpec::new(BRIDGE, "get", "()Ljava/lang/Object;")),
        ),
    ]);

    let context = LookupContext::unrestricted("app/Main");
    let lookup = resolver.collect_members("lib/StringBox", "get", &context);
    let result = normalize_methods(&lookup.members);

    assert_eq!(result.normalized.len(), 1);
    let get = &result.normalized[0];
    assert_eq!(get.owner, "lib/StringBox");
    assert_eq!(get.descriptor, "()Ljava/lang/String;");
    assert_eq!(get.override_key, "get()");
    assert!(!get.bridge);
    assert_eq!(get.overridden_descriptors, vec!["()Ljava/lang/Object;"]);
}

#[test]
fn lone_bridge_is_kept_and_flagged() {
    let (_dir, mut resolver) = resolver(vec![
        object(),
        (
            "lib/Only",
            ClassFileBuilder::new("lib/Only").method(MemberSpec::new(BRIDGE, "run", "()V")),
        ),
    ]);

    let context = LookupContext::unrestricted("lib/Only");
    let lookup = resolver.collect_members("lib/Only", "run", &context);
    let result = normalize_methods(&lookup.members);
    assert_eq!(result.normalized.len(), 1);
    assert!(result.normalized[0].bridge);
    assert!(result.normalized[0].synthetic);
}
