use tsj_metadata::classfile::{
    Annotation, AnnotationSet, TypeAnnotation, TypeAnnotationTarget, TypePathStep,
};
use tsj_metadata::fixture::{AttributeSpec, ClassFileBuilder, MemberSpec};
use tsj_metadata::{read_class, AccessFlags, ClassDescriptor};
use tsj_resolver::{analyze, Nullability};

const NULLABLE: &str = "Lorg/jetbrains/annotations/Nullable;";
const NON_NULL: &str = "Lorg/checkerframework/checker/nullness/qual/NonNull;";

fn annotation(descriptor: &str) -> Annotation {
    Annotation {
        type_descriptor: descriptor.into(),
        elements: Vec::new(),
    }
}

fn declared(descriptor: &str) -> AttributeSpec {
    AttributeSpec::Annotations(AnnotationSet {
        visible: vec![annotation(descriptor)],
        ..AnnotationSet::default()
    })
}

fn type_use(
    target_type: u8,
    target: TypeAnnotationTarget,
    path: Vec<TypePathStep>,
) -> AttributeSpec {
    AttributeSpec::Annotations(AnnotationSet {
        visible_type: vec![TypeAnnotation {
            target_type,
            target,
            type_path: path,
            annotation: annotation(NULLABLE),
        }],
        ..AnnotationSet::default()
    })
}

fn class(builder: ClassFileBuilder) -> ClassDescriptor {
    read_class(&builder.build()).unwrap()
}

fn fixture() -> Vec<ClassDescriptor> {
    let package_info = ClassFileBuilder::new("p/package-info")
        .access(AccessFlags::INTERFACE | AccessFlags::ABSTRACT | AccessFlags::SYNTHETIC)
        .attribute(declared("Ljavax/annotation/ParametersAreNonnullByDefault;"));

    let service = ClassFileBuilder::new("p/Service")
        .field(MemberSpec::public("name", "Ljava/lang/String;").with(type_use(
            0x13,
            TypeAnnotationTarget::Empty,
            Vec::new(),
        )))
        .field(MemberSpec::public("items", "Ljava/util/List;").with(type_use(
            0x13,
            TypeAnnotationTarget::Empty,
            vec![TypePathStep {
                kind: 3,
                argument_index: 0,
            }],
        )))
        .method(MemberSpec::public("<init>", "()V"))
        .method(MemberSpec::new(AccessFlags::STATIC, "<clinit>", "()V"))
        .method(
            MemberSpec::public("find", "(Ljava/lang/String;I)Ljava/lang/Object;")
                .with(declared(NULLABLE)),
        )
        .method(
            MemberSpec::public("accept", "(Ljava/lang/String;Ljava/lang/String;)V").with(type_use(
                0x16,
                TypeAnnotationTarget::FormalParameter { index: 1 },
                Vec::new(),
            )),
        );

    let legacy = ClassFileBuilder::new("q/Legacy").method(
        MemberSpec::public("wrap", "(Ljava/lang/Object;)Ljava/lang/Object;").with(
            AttributeSpec::VisibleParameterAnnotations(vec![vec![
                annotation(NON_NULL),
                annotation(NULLABLE),
            ]]),
        ),
    );

    let marked = ClassFileBuilder::new("q/Marked")
        .attribute(declared("Lorg/jspecify/annotations/NullMarked;"))
        .method(MemberSpec::public("id", "(Ljava/lang/Object;)Ljava/lang/Object;"));

    [package_info, service, legacy, marked]
        .into_iter()
        .map(class)
        .collect()
}

#[test]
fn package_default_applies_to_unannotated_elements() {
    let result = analyze(fixture());

    assert_eq!(result.package_defaults.get("p"), Some(&Nullability::NonNull));
    assert!(result.class("p/package-info").is_none());

    let service = result.class("p/Service").unwrap();
    assert_eq!(service.default_nullability, Nullability::NonNull);

    let find = result
        .method("p/Service", "find", "(Ljava/lang/String;I)Ljava/lang/Object;")
        .unwrap();
    assert_eq!(find.return_nullability, Nullability::Nullable);
    assert_eq!(find.parameters, vec![Nullability::NonNull, Nullability::NonNull]);

    let accept = result
        .method("p/Service", "accept", "(Ljava/lang/String;Ljava/lang/String;)V")
        .unwrap();
    assert_eq!(accept.parameters, vec![Nullability::NonNull, Nullability::Nullable]);

    assert!(result.method("p/Service", "<init>", "()V").is_some());
    assert!(result.method("p/Service", "<clinit>", "()V").is_none());
}

#[test]
fn type_use_counts_only_on_the_top_level_type() {
    let result = analyze(fixture());
    assert_eq!(
        result.field("p/Service", "name", "Ljava/lang/String;"),
        Some(Nullability::Nullable)
    );
    assert_eq!(
        result.field("p/Service", "items", "Ljava/util/List;"),
        Some(Nullability::NonNull)
    );
}

#[test]
fn classes_outside_annotated_packages_stay_platform() {
    let result = analyze(fixture());

    let legacy = result.class("q/Legacy").unwrap();
    assert_eq!(legacy.default_nullability, Nullability::Platform);
    let wrap = result
        .method("q/Legacy", "wrap", "(Ljava/lang/Object;)Ljava/lang/Object;")
        .unwrap();
    assert_eq!(wrap.return_nullability, Nullability::Platform);
    assert_eq!(wrap.parameters, vec![Nullability::Nullable]);

    let id = result
        .method("q/Marked", "id", "(Ljava/lang/Object;)Ljava/lang/Object;")
        .unwrap();
    assert_eq!(id.return_nullability, Nullability::NonNull);
    assert_eq!(id.parameters, vec![Nullability::NonNull]);
}
