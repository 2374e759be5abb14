//! Purpose: Compute the declaration closure of root signatures over a classpath.
//! Exports: `Collector`, `Retained`, `MemberKey`.
//! Role: The reachability engine; decides everything the emitter may keep.
//! Invariants: Closure is over declarations only; method bodies are never scanned.
//! Invariants: Retention order is discovery order, so results are deterministic.
//! Invariants: Classes absent from the classpath stay retained but are not traversed.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::core::classfile::{Annotation, ElementValue};
use crate::core::desc;
use crate::core::error::Error;
use crate::core::index::ClasspathIndex;
use crate::core::roots::RootSig;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct MemberKey {
    pub owner: String,
    pub name: String,
    pub desc: String,
}

impl MemberKey {
    fn new(owner: &str, name: &str, desc: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
        }
    }
}

/// The closure result: ordered retention lists plus membership sets.
pub struct Retained {
    pub classes: Vec<String>,
    pub fields: Vec<MemberKey>,
    pub methods: Vec<MemberKey>,
    class_set: HashSet<String>,
    field_set: HashSet<MemberKey>,
    method_set: HashSet<MemberKey>,
}

impl Retained {
    pub fn keeps_class(&self, name: &str) -> bool {
        self.class_set.contains(name)
    }

    pub fn keeps_method(&self, owner: &str, name: &str, desc: &str) -> bool {
        self.method_set.contains(&MemberKey::new(owner, name, desc))
    }

    /// A field matches on exact descriptor, or by name alone when it was
    /// retained without one.
    pub fn keeps_field(&self, owner: &str, name: &str, desc: &str) -> bool {
        self.field_set.contains(&MemberKey::new(owner, name, desc))
            || self.field_set.contains(&MemberKey::new(owner, name, ""))
    }
}

pub struct Collector<'a> {
    index: &'a ClasspathIndex,
    classes: Vec<String>,
    fields: Vec<MemberKey>,
    methods: Vec<MemberKey>,
    class_set: HashSet<String>,
    field_set: HashSet<MemberKey>,
    method_set: HashSet<MemberKey>,
    work_classes: VecDeque<String>,
    work_fields: VecDeque<MemberKey>,
    work_methods: VecDeque<MemberKey>,
}

impl<'a> Collector<'a> {
    pub fn new(index: &'a ClasspathIndex) -> Self {
        Self {
            index,
            classes: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            class_set: HashSet::new(),
            field_set: HashSet::new(),
            method_set: HashSet::new(),
            work_classes: VecDeque::new(),
            work_fields: VecDeque::new(),
            work_methods: VecDeque::new(),
        }
    }

    /// Seeds the worklists from parsed roots and runs the closure.
    pub fn seed(&mut self, roots: &[RootSig]) -> Result<(), Error> {
        for root in roots {
            match root {
                RootSig::Class { owner } => self.add_class(owner),
                RootSig::Field { owner, name, desc } => {
                    let desc = match desc {
                        Some(desc) => Some(desc.clone()),
                        None => self.resolve_field_desc(owner, name)?,
                    };
                    match desc {
                        Some(desc) => self.add_field(owner, name, &desc),
                        None => {
                            debug!(owner = %owner, field = %name, "field root unresolved, keeping owner only");
                            self.add_class(owner);
                        }
                    }
                }
                RootSig::Method { owner, name, desc } => self.add_method(owner, name, desc),
            }
        }
        self.run()
    }

    pub fn into_retained(self) -> Retained {
        Retained {
            classes: self.classes,
            fields: self.fields,
            methods: self.methods,
            class_set: self.class_set,
            field_set: self.field_set,
            method_set: self.method_set,
        }
    }

    fn resolve_field_desc(&self, owner: &str, name: &str) -> Result<Option<String>, Error> {
        let Some(class) = self.index.read_class(owner)? else {
            return Ok(None);
        };
        Ok(class.find_field(name).map(|field| field.desc.clone()))
    }

    fn run(&mut self) -> Result<(), Error> {
        loop {
            if let Some(class) = self.work_classes.pop_front() {
                self.process_class(&class)?;
            } else if let Some(field) = self.work_fields.pop_front() {
                self.process_field(&field)?;
            } else if let Some(method) = self.work_methods.pop_front() {
                self.process_method(&method)?;
            } else {
                return Ok(());
            }
        }
    }

    fn add_class(&mut self, name: &str) {
        if self.class_set.insert(name.to_string()) {
            self.classes.push(name.to_string());
            self.work_classes.push_back(name.to_string());
        }
    }

    fn add_field(&mut self, owner: &str, name: &str, desc: &str) {
        let key = MemberKey::new(owner, name, desc);
        if self.field_set.insert(key.clone()) {
            self.fields.push(key.clone());
            self.work_fields.push_back(key);
        }
        self.add_class(owner);
    }

    fn add_method(&mut self, owner: &str, name: &str, desc: &str) {
        let key = MemberKey::new(owner, name, desc);
        if self.method_set.insert(key.clone()) {
            self.methods.push(key.clone());
            self.work_methods.push_back(key);
        }
        self.add_class(owner);
    }

    fn process_class(&mut self, name: &str) -> Result<(), Error> {
        let Some(class) = self.index.read_class(name)? else {
            return Ok(());
        };

        if let Some(super_name) = &class.super_name {
            self.add_class(super_name);
        }
        for interface in &class.interfaces {
            self.add_class(interface);
        }
        self.scan_signature(class.signature.as_deref());

        if let Some(enclosing) = &class.enclosing_method {
            self.add_class(&enclosing.class);
            if let Some((method_name, method_desc)) = &enclosing.method {
                self.add_method(&enclosing.class, method_name, method_desc);
            }
        }
        if let Some(nest_host) = &class.nest_host {
            self.add_class(nest_host);
        }
        for member in &class.nest_members {
            self.add_class(member);
        }
        for permitted in &class.permitted_subclasses {
            self.add_class(permitted);
        }
        for component in &class.record_components {
            self.scan_field_desc(&component.desc);
            self.scan_signature(component.signature.as_deref());
            self.scan_annotations(&component.visible_annotations);
            self.scan_annotations(&component.invisible_annotations);
            self.scan_annotations(&component.type_annotations);
        }

        self.scan_annotations(&class.visible_annotations);
        self.scan_annotations(&class.invisible_annotations);
        self.scan_annotations(&class.type_annotations);

        for field in &class.fields {
            self.scan_field_desc(&field.desc);
            self.scan_signature(field.signature.as_deref());
            self.scan_annotations(&field.visible_annotations);
            self.scan_annotations(&field.invisible_annotations);
            self.scan_annotations(&field.type_annotations);
        }
        for method in &class.methods {
            self.scan_method_desc(&method.desc);
            for exception in &method.exceptions {
                self.add_class(exception);
            }
            self.scan_signature(method.signature.as_deref());
            self.scan_annotations(&method.visible_annotations);
            self.scan_annotations(&method.invisible_annotations);
            self.scan_annotations(&method.type_annotations);
            for annotations in &method.visible_parameter_annotations {
                self.scan_annotations(annotations);
            }
            for annotations in &method.invisible_parameter_annotations {
                self.scan_annotations(annotations);
            }
        }

        // The InnerClasses attribute records relationships; keep both sides.
        for inner in &class.inner_classes {
            self.add_class(&inner.inner);
            if let Some(outer) = &inner.outer {
                self.add_class(outer);
            }
        }
        Ok(())
    }

    fn process_field(&mut self, key: &MemberKey) -> Result<(), Error> {
        self.scan_field_desc(&key.desc);
        let Some(class) = self.index.read_class(&key.owner)? else {
            return Ok(());
        };
        if let Some(field) = class.find_field(&key.name) {
            if !key.desc.is_empty() && field.desc != key.desc {
                return Ok(());
            }
            self.scan_signature(field.signature.as_deref());
            self.scan_annotations(&field.visible_annotations);
            self.scan_annotations(&field.invisible_annotations);
        }
        Ok(())
    }

    fn process_method(&mut self, key: &MemberKey) -> Result<(), Error> {
        self.scan_method_desc(&key.desc);
        let Some(class) = self.index.read_class(&key.owner)? else {
            return Ok(());
        };
        if let Some(method) = class.find_method(&key.name, &key.desc) {
            for exception in &method.exceptions {
                self.add_class(exception);
            }
            self.scan_signature(method.signature.as_deref());
            self.scan_annotations(&method.visible_annotations);
            self.scan_annotations(&method.invisible_annotations);
            for annotations in &method.visible_parameter_annotations {
                self.scan_annotations(annotations);
            }
            for annotations in &method.invisible_parameter_annotations {
                self.scan_annotations(annotations);
            }
        }
        Ok(())
    }

    fn scan_field_desc(&mut self, desc: &str) {
        let mut found = Vec::new();
        desc::classes_in_field_desc(desc, &mut found);
        for class in found {
            self.add_class(&class);
        }
    }

    fn scan_method_desc(&mut self, desc: &str) {
        let mut found = Vec::new();
        desc::classes_in_method_desc(desc, &mut found);
        for class in found {
            self.add_class(&class);
        }
    }

    fn scan_signature(&mut self, signature: Option<&str>) {
        let Some(signature) = signature else {
            return;
        };
        let mut found = Vec::new();
        desc::classes_in_signature(signature, &mut found);
        for class in found {
            self.add_class(&class);
        }
    }

    fn scan_annotations(&mut self, annotations: &[Annotation]) {
        for annotation in annotations {
            self.scan_field_desc(&annotation.type_desc);
            for (_, value) in &annotation.pairs {
                self.scan_value(value);
            }
        }
    }

    fn scan_value(&mut self, value: &ElementValue) {
        match value {
            ElementValue::Class(desc) => self.scan_field_desc(desc),
            ElementValue::Enum { type_desc, .. } => self.scan_field_desc(type_desc),
            ElementValue::Annotation(annotation) => {
                self.scan_annotations(std::slice::from_ref(annotation));
            }
            ElementValue::Array(values) => {
                for value in values {
                    self.scan_value(value);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Collector;
    use crate::core::index::ClasspathIndex;
    use crate::core::roots::parse_line;
    use std::path::{Path, PathBuf};

    fn fixture_classpath() -> Vec<PathBuf> {
        vec![Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/classes")]
    }

    fn collect(roots: &[&str]) -> super::Retained {
        let index = ClasspathIndex::open(&fixture_classpath()).expect("index");
        let roots: Vec<_> = roots
            .iter()
            .map(|line| parse_line(line).expect("parse").expect("root"))
            .collect();
        let mut collector = Collector::new(&index);
        collector.seed(&roots).expect("seed");
        collector.into_retained()
    }

    #[test]
    fn method_root_pulls_descriptor_and_owner() {
        let retained =
            collect(&["com/example/gson/Gson#newBuilder()Lcom/example/gson/GsonBuilder;"]);

        assert!(retained.keeps_class("com/example/gson/Gson"));
        assert!(retained.keeps_class("com/example/gson/GsonBuilder"));
        assert!(retained.keeps_method(
            "com/example/gson/Gson",
            "newBuilder",
            "()Lcom/example/gson/GsonBuilder;"
        ));
        assert!(!retained.keeps_method("com/example/gson/Gson", "deprecatedMethod", "()V"));
    }

    #[test]
    fn class_processing_reaches_annotations_and_member_types() {
        let retained = collect(&["com/example/gson/Gson"]);

        // Class annotation type and its Class-literal value.
        assert!(retained.keeps_class("com/example/annotations/MyAnno"));
        assert!(retained.keeps_class("java/lang/String"));
        // Method annotation on deprecatedMethod.
        assert!(retained.keeps_class("java/lang/Deprecated"));
        // Member descriptor types.
        assert!(retained.keeps_class("java/lang/Class"));
        assert!(retained.keeps_class("java/lang/Object"));
        // Transitively: MyAnno is an annotation interface.
        assert!(retained.keeps_class("java/lang/annotation/Annotation"));
    }

    #[test]
    fn field_root_without_descriptor_degrades_to_owner() {
        let retained = collect(&["com/example/gson/Gson#noSuchField"]);
        assert!(retained.keeps_class("com/example/gson/Gson"));
        assert!(retained.fields.is_empty());
    }

    #[test]
    fn field_root_resolves_descriptor_from_owner() {
        let retained = collect(&["com/example/gson/GsonBuilder#lenient"]);
        assert!(retained.keeps_field("com/example/gson/GsonBuilder", "lenient", "Z"));
    }

    #[test]
    fn retention_order_is_stable() {
        let first = collect(&["com/example/gson/Gson"]);
        let second = collect(&["com/example/gson/Gson"]);
        assert_eq!(first.classes, second.classes);
    }

    #[test]
    fn off_classpath_classes_are_retained_but_not_traversed() {
        let retained = collect(&["java/util/List"]);
        assert!(retained.keeps_class("java/util/List"));
        assert_eq!(retained.classes, ["java/util/List"]);
    }
}
