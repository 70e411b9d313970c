//! Nullness facts read from classfile annotations.
//!
//! Declaration annotations, per-parameter annotations and type-use
//! annotations on the top-level type are all honored. `@Nullable` beats
//! `@NonNull` when both are present. An unannotated element inherits its
//! class default, which in turn falls back to the `package-info` default and
//! finally to [`Nullability::Platform`].

use std::borrow::Borrow;
use std::collections::BTreeMap;
use tsj_metadata::classfile::{
    package_of, Annotation, AnnotationSet, ClassDescriptor, MethodDescriptor, TypeAnnotation,
    TypeAnnotationTarget,
};
use tsj_metadata::descriptor::split_method_descriptor;

const NON_NULL: &[&str] = &[
    "Lorg/jetbrains/annotations/NotNull;",
    "Ljavax/annotation/Nonnull;",
    "Landroidx/annotation/NonNull;",
    "Lorg/checkerframework/checker/nullness/qual/NonNull;",
];

const NULLABLE: &[&str] = &[
    "Lorg/jetbrains/annotations/Nullable;",
    "Ljavax/annotation/Nullable;",
    "Landroidx/annotation/Nullable;",
    "Lorg/checkerframework/checker/nullness/qual/Nullable;",
];

const NON_NULL_DEFAULT: &[&str] = &[
    "Ljavax/annotation/ParametersAreNonnullByDefault;",
    "Lorg/springframework/lang/NonNullApi;",
    "Lorg/jspecify/annotations/NullMarked;",
];

const NULLABLE_DEFAULT: &[&str] = &["Lorg/jspecify/annotations/NullUnmarked;"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Nullability {
    NonNull,
    Nullable,
    /// Nothing is known; callers may pass `null`.
    #[default]
    Platform,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodNullability {
    pub name: String,
    pub descriptor: String,
    pub return_nullability: Nullability,
    pub parameters: Vec<Nullability>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNullability {
    pub internal_name: String,
    pub default_nullability: Nullability,
    /// Keyed by `name:descriptor`.
    pub fields: BTreeMap<String, Nullability>,
    /// Keyed by `name` followed by the method descriptor.
    pub methods: BTreeMap<String, MethodNullability>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisResult {
    pub classes: BTreeMap<String, ClassNullability>,
    pub package_defaults: BTreeMap<String, Nullability>,
}

impl AnalysisResult {
    pub fn class(&self, internal_name: &str) -> Option<&ClassNullability> {
        self.classes.get(internal_name)
    }

    pub fn method(&self, owner: &str, name: &str, descriptor: &str) -> Option<&MethodNullability> {
        self.classes
            .get(owner)?
            .methods
            .get(&format!("{name}{descriptor}"))
    }

    pub fn field(&self, owner: &str, name: &str, descriptor: &str) -> Option<Nullability> {
        self.classes
            .get(owner)?
            .fields
            .get(&format!("{name}:{descriptor}"))
            .copied()
    }
}

/// Computes nullability for every class in `classes`. `package-info`
/// classes only contribute package defaults.
pub fn analyze<I>(classes: I) -> AnalysisResult
where
    I: IntoIterator,
    I::Item: Borrow<ClassDescriptor>,
{
    let items: Vec<I::Item> = classes.into_iter().collect();
    let classes: Vec<&ClassDescriptor> = items
        .iter()
        .map(<I::Item as Borrow<ClassDescriptor>>::borrow)
        .collect();

    let mut package_defaults = BTreeMap::new();
    for class in classes.iter().copied() {
        if !class.is_package_info() {
            continue;
        }
        let state = from_descriptors(
            class.annotations.declarations().map(|a| a.type_descriptor.as_str()),
            NON_NULL_DEFAULT,
            NULLABLE_DEFAULT,
        );
        if state != Nullability::Platform {
            package_defaults.insert(package_of(&class.internal_name).to_string(), state);
        }
    }

    let mut result = BTreeMap::new();
    for class in classes.iter().copied() {
        if class.is_package_info() || class.is_module_info() {
            continue;
        }
        let view = analyze_class(class, &package_defaults);
        result.insert(class.internal_name.clone(), view);
    }

    AnalysisResult {
        classes: result,
        package_defaults,
    }
}

fn analyze_class(
    class: &ClassDescriptor,
    package_defaults: &BTreeMap<String, Nullability>,
) -> ClassNullability {
    let explicit = from_descriptors(
        class.annotations.declarations().map(|a| a.type_descriptor.as_str()),
        NON_NULL_DEFAULT,
        NULLABLE_DEFAULT,
    );
    let default_nullability = match explicit {
        Nullability::Platform => package_defaults
            .get(class.package_name())
            .copied()
            .unwrap_or(Nullability::Platform),
        state => state,
    };

    let fields = class
        .fields
        .iter()
        .map(|field| {
            let state = element_state(&field.annotations);
            (
                format!("{}:{}", field.name, field.descriptor),
                or_default(state, default_nullability),
            )
        })
        .collect();

    let methods = class
        .methods
        .iter()
        .filter(|method| method.name != "<clinit>")
        .map(|method| {
            let view = analyze_method(method, default_nullability);
            (format!("{}{}", method.name, method.descriptor), view)
        })
        .collect();

    ClassNullability {
        internal_name: class.internal_name.clone(),
        default_nullability,
        fields,
        methods,
    }
}

fn analyze_method(method: &MethodDescriptor, class_default: Nullability) -> MethodNullability {
    let arity = split_method_descriptor(&method.descriptor)
        .map(|parts| parts.parameters.len())
        .unwrap_or(0);
    let count = arity
        .max(method.visible_parameter_annotations.len())
        .max(method.invisible_parameter_annotations.len());

    let parameters = (0..count)
        .map(|index| {
            let declared = method
                .parameter_annotations(index)
                .map(|a| a.type_descriptor.as_str());
            let type_uses = top_level_type_uses(&method.annotations, Some(index))
                .map(|a| a.type_descriptor.as_str());
            or_default(
                from_descriptors(declared.chain(type_uses), NON_NULL, NULLABLE),
                class_default,
            )
        })
        .collect();

    MethodNullability {
        name: method.name.clone(),
        descriptor: method.descriptor.clone(),
        return_nullability: or_default(element_state(&method.annotations), class_default),
        parameters,
    }
}

/// Declaration annotations plus top-level type-use annotations on the field
/// type or method return type.
fn element_state(annotations: &AnnotationSet) -> Nullability {
    let declared = annotations.declarations().map(|a| a.type_descriptor.as_str());
    let type_uses = top_level_type_uses(annotations, None).map(|a| a.type_descriptor.as_str());
    from_descriptors(declared.chain(type_uses), NON_NULL, NULLABLE)
}

fn top_level_type_uses(
    annotations: &AnnotationSet,
    parameter: Option<usize>,
) -> impl Iterator<Item = &Annotation> {
    annotations
        .type_uses()
        .filter(move |annotation| targets(annotation, parameter))
        .map(|annotation| &annotation.annotation)
}

fn targets(annotation: &TypeAnnotation, parameter: Option<usize>) -> bool {
    if !annotation.type_path.is_empty() {
        return false;
    }
    match (&annotation.target, parameter) {
        (TypeAnnotationTarget::Empty, None) => true,
        (TypeAnnotationTarget::FormalParameter { index }, Some(wanted)) => {
            usize::from(*index) == wanted
        }
        _ => false,
    }
}

fn from_descriptors<'a>(
    descriptors: impl Iterator<Item = &'a str>,
    non_null: &[&str],
    nullable: &[&str],
) -> Nullability {
    let mut state = Nullability::Platform;
    for descriptor in descriptors {
        if nullable.contains(&descriptor) {
            return Nullability::Nullable;
        }
        if non_null.contains(&descriptor) {
            state = Nullability::NonNull;
        }
    }
    state
}

fn or_default(state: Nullability, default: Nullability) -> Nullability {
    match state {
        Nullability::Platform => default,
        explicit => explicit,
    }
}
