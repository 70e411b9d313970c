use serde::{Deserialize, Serialize};

/// Raw `access_flags` word of a class, field, method or inner class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SUPER: u16 = 0x0020;
    pub const BRIDGE: u16 = 0x0040;
    pub const VARARGS: u16 = 0x0080;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ANNOTATION: u16 = 0x2000;
    pub const ENUM: u16 = 0x4000;
    pub const MODULE: u16 = 0x8000;

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    pub fn is_protected(self) -> bool {
        self.contains(Self::PROTECTED)
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_bridge(self) -> bool {
        self.contains(Self::BRIDGE)
    }

    pub fn is_varargs(self) -> bool {
        self.contains(Self::VARARGS)
    }

    pub fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    pub fn is_synthetic(self) -> bool {
        self.contains(Self::SYNTHETIC)
    }
}

/// Immutable snapshot of one parsed classfile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    /// Slash-separated binary name, e.g. `java/util/Map$Entry`.
    pub internal_name: String,
    pub minor_version: u16,
    pub major_version: u16,
    pub access: AccessFlags,
    /// `None` for `java/lang/Object` and `module-info`.
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub signature: Option<String>,
    pub source_file: Option<String>,
    pub deprecated: bool,
    pub synthetic: bool,
    pub annotations: AnnotationSet,
    pub fields: Vec<FieldDescriptor>,
    pub methods: Vec<MethodDescriptor>,
    pub inner_classes: Vec<InnerClass>,
    pub enclosing_method: Option<EnclosingMethod>,
    pub nest_host: Option<String>,
    pub nest_members: Vec<String>,
    pub record_components: Vec<RecordComponent>,
    pub permitted_subclasses: Vec<String>,
    /// Present only on `module-info` classes.
    pub module: Option<ModuleAttribute>,
    pub module_packages: Vec<String>,
}

impl ClassDescriptor {
    /// Slash-separated package, empty for the unnamed package.
    pub fn package_name(&self) -> &str {
        package_of(&self.internal_name)
    }

    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }

    pub fn is_module_info(&self) -> bool {
        self.access.contains(AccessFlags::MODULE) || self.internal_name == "module-info"
    }

    pub fn is_package_info(&self) -> bool {
        self.internal_name.ends_with("/package-info") || self.internal_name == "package-info"
    }

    pub fn fields_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FieldDescriptor> {
        self.fields.iter().filter(move |field| field.name == name)
    }

    pub fn methods_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a MethodDescriptor> {
        self.methods.iter().filter(move |method| method.name == name)
    }
}

/// Returns the slash-separated package portion of an internal class name.
pub fn package_of(internal_name: &str) -> &str {
    internal_name
        .rsplit_once('/')
        .map(|(package, _)| package)
        .unwrap_or("")
}

/// Declaration and type-use annotations attached to one element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSet {
    pub visible: Vec<Annotation>,
    pub invisible: Vec<Annotation>,
    pub visible_type: Vec<TypeAnnotation>,
    pub invisible_type: Vec<TypeAnnotation>,
}

impl AnnotationSet {
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
            && self.invisible.is_empty()
            && self.visible_type.is_empty()
            && self.invisible_type.is_empty()
    }

    /// Visible then invisible declaration annotations.
    pub fn declarations(&self) -> impl Iterator<Item = &Annotation> {
        self.visible.iter().chain(self.invisible.iter())
    }

    /// Visible then invisible type-use annotations.
    pub fn type_uses(&self) -> impl Iterator<Item = &TypeAnnotation> {
        self.visible_type.iter().chain(self.invisible_type.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub descriptor: String,
    pub access: AccessFlags,
    pub signature: Option<String>,
    pub constant_value: Option<ConstantValue>,
    pub deprecated: bool,
    pub synthetic: bool,
    pub annotations: AnnotationSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub descriptor: String,
    pub access: AccessFlags,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
    /// Entries of the MethodParameters attribute, if present.
    pub parameters: Vec<MethodParameter>,
    pub annotation_default: Option<ElementValue>,
    pub deprecated: bool,
    pub synthetic: bool,
    pub annotations: AnnotationSet,
    pub visible_parameter_annotations: Vec<Vec<Annotation>>,
    pub invisible_parameter_annotations: Vec<Vec<Annotation>>,
}

impl MethodDescriptor {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// Declaration annotations on the parameter at `index`, visible first.
    pub fn parameter_annotations(&self, index: usize) -> impl Iterator<Item = &Annotation> {
        self.visible_parameter_annotations
            .get(index)
            .into_iter()
            .chain(self.invisible_parameter_annotations.get(index))
            .flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodParameter {
    pub name: Option<String>,
    pub access: AccessFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstantValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Field descriptor of the annotation interface, e.g. `Ljavax/annotation/Nonnull;`.
    pub type_descriptor: String,
    pub elements: Vec<AnnotationElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationElement {
    pub name: String,
    pub value: ElementValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElementValue {
    /// Primitive or string constant; `tag` is the element_value tag byte.
    Const { tag: char, value: ConstantValue },
    Enum {
        type_descriptor: String,
        const_name: String,
    },
    Class(String),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAnnotation {
    pub target_type: u8,
    pub target: TypeAnnotationTarget,
    pub type_path: Vec<TypePathStep>,
    pub annotation: Annotation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeAnnotationTarget {
    TypeParameter { index: u8 },
    Supertype { index: u16 },
    TypeParameterBound { parameter: u8, bound: u8 },
    /// Field type, method return type or receiver type.
    Empty,
    FormalParameter { index: u8 },
    Throws { index: u16 },
    LocalVariable { ranges: Vec<LocalVariableRange> },
    Catch { exception_table_index: u16 },
    Offset { offset: u16 },
    TypeArgument { offset: u16, index: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalVariableRange {
    pub start_pc: u16,
    pub length: u16,
    pub index: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypePathStep {
    pub kind: u8,
    pub argument_index: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerClass {
    pub inner_class: String,
    pub outer_class: Option<String>,
    pub inner_name: Option<String>,
    pub access: AccessFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnclosingMethod {
    pub class: String,
    pub method_name: Option<String>,
    pub method_descriptor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordComponent {
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub annotations: AnnotationSet,
}

/// Contents of the `Module` attribute of a `module-info` class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAttribute {
    pub name: String,
    pub flags: u16,
    pub version: Option<String>,
    pub requires: Vec<ModuleRequires>,
    pub exports: Vec<ModulePackageGrant>,
    pub opens: Vec<ModulePackageGrant>,
    pub uses: Vec<String>,
    pub provides: Vec<ModuleProvides>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRequires {
    pub module: String,
    pub flags: u16,
    pub version: Option<String>,
}

/// An `exports` or `opens` directive; `targets` is empty when unqualified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulePackageGrant {
    pub package: String,
    pub flags: u16,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleProvides {
    pub service: String,
    pub implementations: Vec<String>,
}
