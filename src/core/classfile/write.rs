// Class-file writer: rebuilds a deduplicated constant pool and serializes the
// model. Concrete methods receive generated trivial bodies; max_stack and
// max_locals are exact for those fixed shapes, so no StackMapTable is needed.
use std::collections::HashMap;

use crate::core::bytes::Writer;
use crate::core::classfile::{
    Annotation, ClassFile, ElementValue, FieldInfo, MethodInfo, CLASS_MAGIC,
};
use crate::core::error::{Error, ErrorKind};

const OP_ACONST_NULL: u8 = 0x01;
const OP_ICONST_0: u8 = 0x03;
const OP_LCONST_0: u8 = 0x09;
const OP_FCONST_0: u8 = 0x0b;
const OP_DCONST_0: u8 = 0x0e;
const OP_ALOAD_0: u8 = 0x2a;
const OP_IRETURN: u8 = 0xac;
const OP_LRETURN: u8 = 0xad;
const OP_FRETURN: u8 = 0xae;
const OP_DRETURN: u8 = 0xaf;
const OP_ARETURN: u8 = 0xb0;
const OP_RETURN: u8 = 0xb1;
const OP_INVOKESPECIAL: u8 = 0xb7;

/// Interning constant pool builder. Entries are stored pre-encoded; `None`
/// marks the phantom second slot of Long/Double entries.
#[derive(Default)]
struct PoolBuilder {
    entries: Vec<Option<Vec<u8>>>,
    map: HashMap<Vec<u8>, u16>,
}

impl PoolBuilder {
    fn add(&mut self, encoded: Vec<u8>, wide: bool) -> Result<u16, Error> {
        if let Some(&index) = self.map.get(&encoded) {
            return Ok(index);
        }
        let index = self.entries.len() + 1;
        let last = index + usize::from(wide);
        // constant_pool_count is a u16 one past the last slot.
        if last >= u16::MAX as usize {
            return Err(Error::new(ErrorKind::Unsupported)
                .with_message("constant pool overflow (more than 65534 entries)"));
        }
        let index = index as u16;
        self.map.insert(encoded.clone(), index);
        self.entries.push(Some(encoded));
        if wide {
            self.entries.push(None);
        }
        Ok(index)
    }

    fn utf8(&mut self, bytes: &[u8]) -> Result<u16, Error> {
        if bytes.len() > u16::MAX as usize {
            return Err(Error::new(ErrorKind::Unsupported)
                .with_message("Utf8 constant longer than 65535 bytes"));
        }
        let mut encoded = Vec::with_capacity(3 + bytes.len());
        encoded.push(1);
        encoded.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        encoded.extend_from_slice(bytes);
        self.add(encoded, false)
    }

    fn utf8_str(&mut self, text: &str) -> Result<u16, Error> {
        self.utf8(text.as_bytes())
    }

    fn class(&mut self, name: &str) -> Result<u16, Error> {
        let name_index = self.utf8_str(name)?;
        self.add(encode_ref(7, &[name_index]), false)
    }

    fn name_and_type(&mut self, name: &str, desc: &str) -> Result<u16, Error> {
        let name_index = self.utf8_str(name)?;
        let desc_index = self.utf8_str(desc)?;
        self.add(encode_ref(12, &[name_index, desc_index]), false)
    }

    fn method_ref(&mut self, class: &str, name: &str, desc: &str) -> Result<u16, Error> {
        let class_index = self.class(class)?;
        let nat_index = self.name_and_type(name, desc)?;
        self.add(encode_ref(10, &[class_index, nat_index]), false)
    }

    fn int(&mut self, value: i32) -> Result<u16, Error> {
        let mut encoded = vec![3];
        encoded.extend_from_slice(&value.to_be_bytes());
        self.add(encoded, false)
    }

    fn float_bits(&mut self, bits: u32) -> Result<u16, Error> {
        let mut encoded = vec![4];
        encoded.extend_from_slice(&bits.to_be_bytes());
        self.add(encoded, false)
    }

    fn long(&mut self, value: i64) -> Result<u16, Error> {
        let mut encoded = vec![5];
        encoded.extend_from_slice(&value.to_be_bytes());
        self.add(encoded, true)
    }

    fn double_bits(&mut self, bits: u64) -> Result<u16, Error> {
        let mut encoded = vec![6];
        encoded.extend_from_slice(&bits.to_be_bytes());
        self.add(encoded, true)
    }

    fn count(&self) -> u16 {
        (self.entries.len() + 1) as u16
    }
}

fn encode_ref(tag: u8, indices: &[u16]) -> Vec<u8> {
    let mut encoded = vec![tag];
    for index in indices {
        encoded.extend_from_slice(&index.to_be_bytes());
    }
    encoded
}

/// Named attributes accumulated before their count is known.
#[derive(Default)]
struct Attrs {
    list: Vec<(u16, Vec<u8>)>,
}

impl Attrs {
    fn push(&mut self, pool: &mut PoolBuilder, name: &str, payload: Vec<u8>) -> Result<(), Error> {
        let name_index = pool.utf8_str(name)?;
        self.list.push((name_index, payload));
        Ok(())
    }

    fn write(self, out: &mut Writer) {
        out.u16(self.list.len() as u16);
        for (name_index, payload) in self.list {
            out.u16(name_index);
            out.u32(payload.len() as u32);
            out.bytes(&payload);
        }
    }
}

pub fn write(class: &ClassFile) -> Result<Vec<u8>, Error> {
    let mut pool = PoolBuilder::default();
    let mut body = Writer::new();

    body.u16(class.access);
    body.u16(pool.class(&class.name)?);
    match &class.super_name {
        Some(name) => {
            let index = pool.class(name)?;
            body.u16(index);
        }
        None => body.u16(0),
    }
    body.u16(class.interfaces.len() as u16);
    for interface in &class.interfaces {
        let index = pool.class(interface)?;
        body.u16(index);
    }

    body.u16(class.fields.len() as u16);
    for field in &class.fields {
        write_field(&mut pool, &mut body, field)?;
    }
    body.u16(class.methods.len() as u16);
    for method in &class.methods {
        write_method(&mut pool, &mut body, method, class.super_name.as_deref())?;
    }

    let mut attrs = Attrs::default();
    if let Some(source_file) = &class.source_file {
        let index = pool.utf8_str(source_file)?;
        attrs.push(&mut pool, "SourceFile", index.to_be_bytes().to_vec())?;
    }
    push_signature(&mut pool, &mut attrs, class.signature.as_deref())?;
    push_markers(&mut pool, &mut attrs, class.deprecated, class.synthetic)?;
    if !class.inner_classes.is_empty() {
        let mut payload = Writer::new();
        payload.u16(class.inner_classes.len() as u16);
        for inner in &class.inner_classes {
            let inner_index = pool.class(&inner.inner)?;
            payload.u16(inner_index);
            payload.u16(opt_class(&mut pool, inner.outer.as_deref())?);
            match &inner.inner_name {
                Some(name) => {
                    let index = pool.utf8_str(name)?;
                    payload.u16(index);
                }
                None => payload.u16(0),
            }
            payload.u16(inner.access);
        }
        attrs.push(&mut pool, "InnerClasses", payload.into_vec())?;
    }
    if let Some(enclosing) = &class.enclosing_method {
        let mut payload = Writer::new();
        let class_index = pool.class(&enclosing.class)?;
        payload.u16(class_index);
        match &enclosing.method {
            Some((name, desc)) => {
                let nat = pool.name_and_type(name, desc)?;
                payload.u16(nat);
            }
            None => payload.u16(0),
        }
        attrs.push(&mut pool, "EnclosingMethod", payload.into_vec())?;
    }
    if let Some(nest_host) = &class.nest_host {
        let index = pool.class(nest_host)?;
        attrs.push(&mut pool, "NestHost", index.to_be_bytes().to_vec())?;
    }
    push_class_list(&mut pool, &mut attrs, "NestMembers", &class.nest_members)?;
    push_class_list(
        &mut pool,
        &mut attrs,
        "PermittedSubclasses",
        &class.permitted_subclasses,
    )?;
    if !class.record_components.is_empty() {
        let mut payload = Writer::new();
        payload.u16(class.record_components.len() as u16);
        for component in &class.record_components {
            let name_index = pool.utf8_str(&component.name)?;
            let desc_index = pool.utf8_str(&component.desc)?;
            payload.u16(name_index);
            payload.u16(desc_index);
            let mut component_attrs = Attrs::default();
            push_signature(&mut pool, &mut component_attrs, component.signature.as_deref())?;
            push_annotations(
                &mut pool,
                &mut component_attrs,
                &component.visible_annotations,
                &component.invisible_annotations,
            )?;
            component_attrs.write(&mut payload);
        }
        attrs.push(&mut pool, "Record", payload.into_vec())?;
    }
    push_annotations(
        &mut pool,
        &mut attrs,
        &class.visible_annotations,
        &class.invisible_annotations,
    )?;

    attrs.write(&mut body);

    let mut out = Writer::new();
    out.u32(CLASS_MAGIC);
    out.u16(class.minor);
    out.u16(class.major);
    out.u16(pool.count());
    for entry in &pool.entries {
        if let Some(encoded) = entry {
            out.bytes(encoded);
        }
    }
    out.bytes(&body.into_vec());
    Ok(out.into_vec())
}

fn write_field(pool: &mut PoolBuilder, body: &mut Writer, field: &FieldInfo) -> Result<(), Error> {
    body.u16(field.access);
    body.u16(pool.utf8_str(&field.name)?);
    body.u16(pool.utf8_str(&field.desc)?);
    let mut attrs = Attrs::default();
    push_signature(pool, &mut attrs, field.signature.as_deref())?;
    push_markers(pool, &mut attrs, field.deprecated, field.synthetic)?;
    push_annotations(
        pool,
        &mut attrs,
        &field.visible_annotations,
        &field.invisible_annotations,
    )?;
    attrs.write(body);
    Ok(())
}

fn write_method(
    pool: &mut PoolBuilder,
    body: &mut Writer,
    method: &MethodInfo,
    super_name: Option<&str>,
) -> Result<(), Error> {
    body.u16(method.access);
    body.u16(pool.utf8_str(&method.name)?);
    body.u16(pool.utf8_str(&method.desc)?);
    let mut attrs = Attrs::default();
    if !method.is_abstract() && !method.is_native() {
        let payload = trivial_code(pool, method, super_name)?;
        attrs.push(pool, "Code", payload)?;
    }
    if !method.exceptions.is_empty() {
        let mut payload = Writer::new();
        payload.u16(method.exceptions.len() as u16);
        for exception in &method.exceptions {
            let index = pool.class(exception)?;
            payload.u16(index);
        }
        attrs.push(pool, "Exceptions", payload.into_vec())?;
    }
    push_signature(pool, &mut attrs, method.signature.as_deref())?;
    push_markers(pool, &mut attrs, method.deprecated, method.synthetic)?;
    if let Some(default) = &method.annotation_default {
        let mut payload = Writer::new();
        write_element_value(pool, &mut payload, default)?;
        attrs.push(pool, "AnnotationDefault", payload.into_vec())?;
    }
    push_annotations(
        pool,
        &mut attrs,
        &method.visible_annotations,
        &method.invisible_annotations,
    )?;
    push_parameter_annotations(
        pool,
        &mut attrs,
        "RuntimeVisibleParameterAnnotations",
        &method.visible_parameter_annotations,
    )?;
    push_parameter_annotations(
        pool,
        &mut attrs,
        "RuntimeInvisibleParameterAnnotations",
        &method.invisible_parameter_annotations,
    )?;
    attrs.write(body);
    Ok(())
}

/// `Code` payload for a stub body: constructors chain to `super.<init>()V`,
/// everything else returns the zero value of its return type.
fn trivial_code(
    pool: &mut PoolBuilder,
    method: &MethodInfo,
    super_name: Option<&str>,
) -> Result<Vec<u8>, Error> {
    let arg_slots = argument_slots(&method.desc);
    let this_slot = if method.is_static() { 0 } else { 1 };
    let max_locals = this_slot + arg_slots;

    let (code, max_stack) = if method.name == "<init>" {
        let super_name = super_name.unwrap_or("java/lang/Object");
        let super_init = pool.method_ref(super_name, "<init>", "()V")?;
        let [hi, lo] = super_init.to_be_bytes();
        (vec![OP_ALOAD_0, OP_INVOKESPECIAL, hi, lo, OP_RETURN], 1)
    } else {
        let return_desc = method
            .desc
            .split_once(')')
            .map(|(_, ret)| ret)
            .unwrap_or("V");
        match return_desc.as_bytes().first() {
            Some(b'V') | None => (vec![OP_RETURN], 0),
            Some(b'B' | b'C' | b'S' | b'Z' | b'I') => (vec![OP_ICONST_0, OP_IRETURN], 1),
            Some(b'J') => (vec![OP_LCONST_0, OP_LRETURN], 2),
            Some(b'F') => (vec![OP_FCONST_0, OP_FRETURN], 1),
            Some(b'D') => (vec![OP_DCONST_0, OP_DRETURN], 2),
            Some(_) => (vec![OP_ACONST_NULL, OP_ARETURN], 1),
        }
    };

    let mut payload = Writer::new();
    payload.u16(max_stack);
    payload.u16(max_locals);
    payload.u32(code.len() as u32);
    payload.bytes(&code);
    payload.u16(0); // exception table
    payload.u16(0); // code attributes
    Ok(payload.into_vec())
}

/// Local variable slots taken by the arguments of a method descriptor.
/// Long and double take two; arrays and references take one.
fn argument_slots(desc: &str) -> u16 {
    let bytes = desc.as_bytes();
    let mut slots = 0u16;
    let mut pos = 1; // past '('
    while pos < bytes.len() && bytes[pos] != b')' {
        let mut is_array = false;
        while pos < bytes.len() && bytes[pos] == b'[' {
            is_array = true;
            pos += 1;
        }
        match bytes.get(pos) {
            Some(b'L') => {
                match desc[pos..].find(';') {
                    Some(end) => pos += end + 1,
                    None => break,
                }
                slots += 1;
            }
            Some(b'J' | b'D') => {
                slots += if is_array { 1 } else { 2 };
                pos += 1;
            }
            Some(_) => {
                slots += 1;
                pos += 1;
            }
            None => break,
        }
    }
    slots
}

fn opt_class(pool: &mut PoolBuilder, name: Option<&str>) -> Result<u16, Error> {
    match name {
        Some(name) => pool.class(name),
        None => Ok(0),
    }
}

fn push_signature(
    pool: &mut PoolBuilder,
    attrs: &mut Attrs,
    signature: Option<&str>,
) -> Result<(), Error> {
    if let Some(signature) = signature {
        let index = pool.utf8_str(signature)?;
        attrs.push(pool, "Signature", index.to_be_bytes().to_vec())?;
    }
    Ok(())
}

fn push_markers(
    pool: &mut PoolBuilder,
    attrs: &mut Attrs,
    deprecated: bool,
    synthetic: bool,
) -> Result<(), Error> {
    if deprecated {
        attrs.push(pool, "Deprecated", Vec::new())?;
    }
    if synthetic {
        attrs.push(pool, "Synthetic", Vec::new())?;
    }
    Ok(())
}

fn push_class_list(
    pool: &mut PoolBuilder,
    attrs: &mut Attrs,
    name: &str,
    classes: &[String],
) -> Result<(), Error> {
    if classes.is_empty() {
        return Ok(());
    }
    let mut payload = Writer::new();
    payload.u16(classes.len() as u16);
    for class in classes {
        let index = pool.class(class)?;
        payload.u16(index);
    }
    attrs.push(pool, name, payload.into_vec())
}

fn push_annotations(
    pool: &mut PoolBuilder,
    attrs: &mut Attrs,
    visible: &[Annotation],
    invisible: &[Annotation],
) -> Result<(), Error> {
    for (name, annotations) in [
        ("RuntimeVisibleAnnotations", visible),
        ("RuntimeInvisibleAnnotations", invisible),
    ] {
        if annotations.is_empty() {
            continue;
        }
        let mut payload = Writer::new();
        payload.u16(annotations.len() as u16);
        for annotation in annotations {
            write_annotation(pool, &mut payload, annotation)?;
        }
        attrs.push(pool, name, payload.into_vec())?;
    }
    Ok(())
}

fn push_parameter_annotations(
    pool: &mut PoolBuilder,
    attrs: &mut Attrs,
    name: &str,
    params: &[Vec<Annotation>],
) -> Result<(), Error> {
    if params.is_empty() {
        return Ok(());
    }
    let mut payload = Writer::new();
    payload.u8(params.len() as u8);
    for annotations in params {
        payload.u16(annotations.len() as u16);
        for annotation in annotations {
            write_annotation(pool, &mut payload, annotation)?;
        }
    }
    attrs.push(pool, name, payload.into_vec())
}

fn write_annotation(
    pool: &mut PoolBuilder,
    payload: &mut Writer,
    annotation: &Annotation,
) -> Result<(), Error> {
    payload.u16(pool.utf8_str(&annotation.type_desc)?);
    payload.u16(annotation.pairs.len() as u16);
    for (name, value) in &annotation.pairs {
        payload.u16(pool.utf8_str(name)?);
        write_element_value(pool, payload, value)?;
    }
    Ok(())
}

fn write_element_value(
    pool: &mut PoolBuilder,
    payload: &mut Writer,
    value: &ElementValue,
) -> Result<(), Error> {
    match value {
        ElementValue::Int { tag, value } => {
            payload.u8(*tag);
            payload.u16(pool.int(*value)?);
        }
        ElementValue::Long(value) => {
            payload.u8(b'J');
            payload.u16(pool.long(*value)?);
        }
        ElementValue::Float(bits) => {
            payload.u8(b'F');
            payload.u16(pool.float_bits(*bits)?);
        }
        ElementValue::Double(bits) => {
            payload.u8(b'D');
            payload.u16(pool.double_bits(*bits)?);
        }
        ElementValue::Str(bytes) => {
            payload.u8(b's');
            payload.u16(pool.utf8(bytes)?);
        }
        ElementValue::Enum {
            type_desc,
            const_name,
        } => {
            payload.u8(b'e');
            payload.u16(pool.utf8_str(type_desc)?);
            payload.u16(pool.utf8_str(const_name)?);
        }
        ElementValue::Class(desc) => {
            payload.u8(b'c');
            payload.u16(pool.utf8_str(desc)?);
        }
        ElementValue::Annotation(annotation) => {
            payload.u8(b'@');
            write_annotation(pool, payload, annotation)?;
        }
        ElementValue::Array(values) => {
            payload.u8(b'[');
            payload.u16(values.len() as u16);
            for value in values {
                write_element_value(pool, payload, value)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{argument_slots, write};
    use crate::core::classfile::parse;

    const GSON: &[u8] = include_bytes!("../../../tests/fixtures/classes/com/example/gson/Gson.class");
    const MY_ANNO: &[u8] =
        include_bytes!("../../../tests/fixtures/classes/com/example/annotations/MyAnno.class");

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|window| window == needle)
    }

    #[test]
    fn argument_slot_widths() {
        assert_eq!(argument_slots("()V"), 0);
        assert_eq!(argument_slots("(IJ)V"), 3);
        assert_eq!(argument_slots("(Ljava/lang/String;Ljava/lang/Class;)Ljava/lang/Object;"), 2);
        assert_eq!(argument_slots("([J[D)V"), 2);
        assert_eq!(argument_slots("(DD)D"), 4);
    }

    #[test]
    fn round_trips_concrete_class() {
        let class = parse(GSON).expect("parse");
        let bytes = write(&class).expect("write");
        let reparsed = parse(&bytes).expect("reparse");

        assert_eq!(reparsed.name, class.name);
        assert_eq!(reparsed.super_name, class.super_name);
        assert_eq!(reparsed.access, class.access);
        assert_eq!(reparsed.major, class.major);
        assert_eq!(reparsed.source_file, class.source_file);
        assert_eq!(reparsed.methods.len(), class.methods.len());
        for (before, after) in class.methods.iter().zip(&reparsed.methods) {
            assert_eq!(before.name, after.name);
            assert_eq!(before.desc, after.desc);
            assert_eq!(before.access, after.access);
            assert_eq!(before.signature, after.signature);
            assert_eq!(before.visible_annotations, after.visible_annotations);
            assert_eq!(before.deprecated, after.deprecated);
        }
        assert_eq!(reparsed.visible_annotations, class.visible_annotations);
    }

    #[test]
    fn concrete_methods_get_code() {
        let class = parse(GSON).expect("parse");
        let bytes = write(&class).expect("write");
        assert!(contains(&bytes, b"Code"));
    }

    #[test]
    fn abstract_methods_get_no_code() {
        let class = parse(MY_ANNO).expect("parse");
        let bytes = write(&class).expect("write");
        assert!(!contains(&bytes, b"Code"));
        let reparsed = parse(&bytes).expect("reparse");
        assert_eq!(reparsed.interfaces, class.interfaces);
        assert_eq!(reparsed.methods.len(), 1);
    }

    #[test]
    fn write_is_deterministic() {
        let class = parse(GSON).expect("parse");
        assert_eq!(write(&class).expect("first"), write(&class).expect("second"));
    }
}
