//! Purpose: Owned model of a JVM class file at declaration level.
//! Exports: `ClassFile`, member/attribute types, access flag constants, `parse`, `write`.
//! Role: The codec boundary; everything else works on this model, never raw bytes.
//! Invariants: `Code` bodies and debug attributes are never modeled; writing regenerates
//! Invariants: trivial bodies for any method that is neither abstract nor native.

mod parse;
mod write;

pub use parse::parse;
pub use write::write;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_ANNOTATION: u16 = 0x2000;

pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

#[derive(Clone, Debug, Default)]
pub struct ClassFile {
    pub minor: u16,
    pub major: u16,
    pub access: u16,
    pub name: String,
    /// `None` only for `java/lang/Object`.
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub signature: Option<String>,
    pub source_file: Option<String>,
    pub deprecated: bool,
    pub synthetic: bool,
    pub inner_classes: Vec<InnerClass>,
    pub enclosing_method: Option<EnclosingMethod>,
    pub nest_host: Option<String>,
    pub nest_members: Vec<String>,
    pub permitted_subclasses: Vec<String>,
    pub record_components: Vec<RecordComponent>,
    pub visible_annotations: Vec<Annotation>,
    pub invisible_annotations: Vec<Annotation>,
    /// Annotation payloads of type annotations; retained for scanning, never written back.
    pub type_annotations: Vec<Annotation>,
}

impl ClassFile {
    pub fn is_interface(&self) -> bool {
        self.access & ACC_INTERFACE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access & ACC_ABSTRACT != 0
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn find_method(&self, name: &str, desc: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.desc == desc)
    }
}

#[derive(Clone, Debug, Default)]
pub struct FieldInfo {
    pub access: u16,
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
    pub deprecated: bool,
    pub synthetic: bool,
    pub visible_annotations: Vec<Annotation>,
    pub invisible_annotations: Vec<Annotation>,
    pub type_annotations: Vec<Annotation>,
}

#[derive(Clone, Debug, Default)]
pub struct MethodInfo {
    pub access: u16,
    pub name: String,
    pub desc: String,
    pub exceptions: Vec<String>,
    pub signature: Option<String>,
    pub deprecated: bool,
    pub synthetic: bool,
    pub annotation_default: Option<ElementValue>,
    pub visible_annotations: Vec<Annotation>,
    pub invisible_annotations: Vec<Annotation>,
    pub visible_parameter_annotations: Vec<Vec<Annotation>>,
    pub invisible_parameter_annotations: Vec<Vec<Annotation>>,
    pub type_annotations: Vec<Annotation>,
}

impl MethodInfo {
    pub fn is_abstract(&self) -> bool {
        self.access & ACC_ABSTRACT != 0
    }

    pub fn is_native(&self) -> bool {
        self.access & ACC_NATIVE != 0
    }

    pub fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InnerClass {
    pub inner: String,
    pub outer: Option<String>,
    pub inner_name: Option<String>,
    pub access: u16,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnclosingMethod {
    pub class: String,
    pub method: Option<(String, String)>,
}

#[derive(Clone, Debug, Default)]
pub struct RecordComponent {
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
    pub visible_annotations: Vec<Annotation>,
    pub invisible_annotations: Vec<Annotation>,
    pub type_annotations: Vec<Annotation>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    /// Field descriptor of the annotation type, e.g. `Lkotlin/Metadata;`.
    pub type_desc: String,
    pub pairs: Vec<(String, ElementValue)>,
}

/// One `element_value`. Float and double carry raw bits so the model stays `Eq`-friendly
/// and round-trips NaN payloads untouched.
#[derive(Clone, Debug, PartialEq)]
pub enum ElementValue {
    /// Tags `B`, `C`, `I`, `S`, `Z` all back onto `CONSTANT_Integer`.
    Int { tag: u8, value: i32 },
    Long(i64),
    Float(u32),
    Double(u64),
    /// Raw modified-UTF-8 bytes; not validated as UTF-8.
    Str(Vec<u8>),
    Enum { type_desc: String, const_name: String },
    Class(String),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}
