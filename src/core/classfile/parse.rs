// Class-file reader: constant pool, declarations, and declaration-level
// attributes. Code bodies and debug attributes are never modeled.
use tracing::debug;

use crate::core::bytes::Reader;
use crate::core::classfile::{
    Annotation, ClassFile, ElementValue, EnclosingMethod, FieldInfo, InnerClass, MethodInfo,
    RecordComponent, CLASS_MAGIC,
};
use crate::core::error::{Error, ErrorKind};

enum Const {
    Utf8(Vec<u8>),
    Int(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    Str(u16),
    Ref { class: u16, nat: u16 },
    NameAndType { name: u16, desc: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bsm: u16, nat: u16 },
    Module(u16),
    Package(u16),
    Unused,
}

struct Pool {
    entries: Vec<Const>,
}

impl Pool {
    fn get(&self, index: u16) -> Result<&Const, Error> {
        match self.entries.get(index as usize) {
            Some(Const::Unused) | None => Err(corrupt(format!(
                "constant pool index {index} out of range or unusable"
            ))),
            Some(entry) => Ok(entry),
        }
    }

    fn utf8_bytes(&self, index: u16) -> Result<&[u8], Error> {
        match self.get(index)? {
            Const::Utf8(bytes) => Ok(bytes),
            _ => Err(corrupt(format!("constant {index} is not Utf8"))),
        }
    }

    fn utf8(&self, index: u16) -> Result<String, Error> {
        let bytes = self.utf8_bytes(index)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| corrupt(format!("constant {index} is not valid UTF-8")))
    }

    fn class_name(&self, index: u16) -> Result<String, Error> {
        match self.get(index)? {
            Const::Class(name) => self.utf8(*name),
            _ => Err(corrupt(format!("constant {index} is not a Class"))),
        }
    }

    fn opt_class_name(&self, index: u16) -> Result<Option<String>, Error> {
        if index == 0 {
            Ok(None)
        } else {
            self.class_name(index).map(Some)
        }
    }

    fn name_and_type(&self, index: u16) -> Result<(String, String), Error> {
        match self.get(index)? {
            Const::NameAndType { name, desc } => Ok((self.utf8(*name)?, self.utf8(*desc)?)),
            _ => Err(corrupt(format!("constant {index} is not a NameAndType"))),
        }
    }

    fn int(&self, index: u16) -> Result<i32, Error> {
        match self.get(index)? {
            Const::Int(value) => Ok(*value),
            _ => Err(corrupt(format!("constant {index} is not an Integer"))),
        }
    }

    fn long(&self, index: u16) -> Result<i64, Error> {
        match self.get(index)? {
            Const::Long(value) => Ok(*value),
            _ => Err(corrupt(format!("constant {index} is not a Long"))),
        }
    }

    fn float_bits(&self, index: u16) -> Result<u32, Error> {
        match self.get(index)? {
            Const::Float(bits) => Ok(*bits),
            _ => Err(corrupt(format!("constant {index} is not a Float"))),
        }
    }

    fn double_bits(&self, index: u16) -> Result<u64, Error> {
        match self.get(index)? {
            Const::Double(bits) => Ok(*bits),
            _ => Err(corrupt(format!("constant {index} is not a Double"))),
        }
    }
}

fn corrupt(message: String) -> Error {
    Error::new(ErrorKind::Corrupt).with_message(message)
}

pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
    let mut reader = Reader::new(bytes);
    if reader.u32()? != CLASS_MAGIC {
        return Err(corrupt("bad class file magic".to_string()));
    }
    let minor = reader.u16()?;
    let major = reader.u16()?;
    let pool = parse_pool(&mut reader)?;

    let mut class = ClassFile {
        minor,
        major,
        access: reader.u16()?,
        ..ClassFile::default()
    };
    class.name = pool.class_name(reader.u16()?)?;
    class.super_name = pool.opt_class_name(reader.u16()?)?;

    let interface_count = reader.u16()?;
    for _ in 0..interface_count {
        class.interfaces.push(pool.class_name(reader.u16()?)?);
    }

    let field_count = reader.u16()?;
    for _ in 0..field_count {
        class.fields.push(parse_field(&mut reader, &pool)?);
    }
    let method_count = reader.u16()?;
    for _ in 0..method_count {
        class.methods.push(parse_method(&mut reader, &pool)?);
    }

    parse_class_attributes(&mut reader, &pool, &mut class)?;
    Ok(class)
}

fn parse_pool(reader: &mut Reader<'_>) -> Result<Pool, Error> {
    let count = reader.u16()?;
    let mut entries = Vec::with_capacity(count as usize);
    entries.push(Const::Unused);
    while entries.len() < count as usize {
        let tag = reader.u8()?;
        let entry = match tag {
            1 => {
                let len = reader.u16()? as usize;
                Const::Utf8(reader.take(len)?.to_vec())
            }
            3 => Const::Int(reader.u32()? as i32),
            4 => Const::Float(reader.u32()?),
            5 => Const::Long(reader.u64()? as i64),
            6 => Const::Double(reader.u64()?),
            7 => Const::Class(reader.u16()?),
            8 => Const::Str(reader.u16()?),
            9 | 10 | 11 => Const::Ref {
                class: reader.u16()?,
                nat: reader.u16()?,
            },
            12 => Const::NameAndType {
                name: reader.u16()?,
                desc: reader.u16()?,
            },
            15 => Const::MethodHandle {
                kind: reader.u8()?,
                reference: reader.u16()?,
            },
            16 => Const::MethodType(reader.u16()?),
            17 | 18 => Const::Dynamic {
                bsm: reader.u16()?,
                nat: reader.u16()?,
            },
            19 => Const::Module(reader.u16()?),
            20 => Const::Package(reader.u16()?),
            _ => return Err(corrupt(format!("unknown constant pool tag {tag}"))),
        };
        let wide = matches!(entry, Const::Long(_) | Const::Double(_));
        entries.push(entry);
        if wide {
            entries.push(Const::Unused);
        }
    }
    Ok(Pool { entries })
}

/// Reads one attribute header and hands a sub-reader over exactly its payload
/// to `handle`. Reading past the payload is corruption; bytes the handler
/// leaves unconsumed are ignored, which is how unknown attributes are skipped.
fn each_attribute<F>(reader: &mut Reader<'_>, pool: &Pool, mut handle: F) -> Result<(), Error>
where
    F: FnMut(&str, Reader<'_>) -> Result<(), Error>,
{
    let count = reader.u16()?;
    for _ in 0..count {
        let name = pool.utf8(reader.u16()?)?;
        let len = reader.u32()? as usize;
        let payload = reader.take(len)?;
        handle(&name, Reader::new(payload))?;
    }
    Ok(())
}

fn parse_field(reader: &mut Reader<'_>, pool: &Pool) -> Result<FieldInfo, Error> {
    let mut field = FieldInfo {
        access: reader.u16()?,
        name: pool.utf8(reader.u16()?)?,
        desc: pool.utf8(reader.u16()?)?,
        ..FieldInfo::default()
    };
    each_attribute(reader, pool, |name, mut r| {
        match name {
            "Signature" => field.signature = Some(pool.utf8(r.u16()?)?),
            "Deprecated" => field.deprecated = true,
            "Synthetic" => field.synthetic = true,
            // Dropped on output: stub fields carry no initializer constants.
            "ConstantValue" => {}
            "RuntimeVisibleAnnotations" => {
                field.visible_annotations = parse_annotations(&mut r, pool)?;
            }
            "RuntimeInvisibleAnnotations" => {
                field.invisible_annotations = parse_annotations(&mut r, pool)?;
            }
            "RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => {
                collect_type_annotations(&mut r, pool, &mut field.type_annotations);
            }
            other => debug!(attribute = other, field = %field.name, "skipping attribute"),
        }
        Ok(())
    })?;
    Ok(field)
}

fn parse_method(reader: &mut Reader<'_>, pool: &Pool) -> Result<MethodInfo, Error> {
    let mut method = MethodInfo {
        access: reader.u16()?,
        name: pool.utf8(reader.u16()?)?,
        desc: pool.utf8(reader.u16()?)?,
        ..MethodInfo::default()
    };
    each_attribute(reader, pool, |name, mut r| {
        match name {
            // Bodies are ignored by the minifier.
            "Code" => {}
            "Exceptions" => {
                let count = r.u16()?;
                for _ in 0..count {
                    method.exceptions.push(pool.class_name(r.u16()?)?);
                }
            }
            "Signature" => method.signature = Some(pool.utf8(r.u16()?)?),
            "Deprecated" => method.deprecated = true,
            "Synthetic" => method.synthetic = true,
            "AnnotationDefault" => {
                method.annotation_default = Some(parse_element_value(&mut r, pool)?);
            }
            "RuntimeVisibleAnnotations" => {
                method.visible_annotations = parse_annotations(&mut r, pool)?;
            }
            "RuntimeInvisibleAnnotations" => {
                method.invisible_annotations = parse_annotations(&mut r, pool)?;
            }
            "RuntimeVisibleParameterAnnotations" => {
                method.visible_parameter_annotations = parse_parameter_annotations(&mut r, pool)?;
            }
            "RuntimeInvisibleParameterAnnotations" => {
                method.invisible_parameter_annotations = parse_parameter_annotations(&mut r, pool)?;
            }
            "RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => {
                collect_type_annotations(&mut r, pool, &mut method.type_annotations);
            }
            other => debug!(attribute = other, method = %method.name, "skipping attribute"),
        }
        Ok(())
    })?;
    Ok(method)
}

fn parse_class_attributes(
    reader: &mut Reader<'_>,
    pool: &Pool,
    class: &mut ClassFile,
) -> Result<(), Error> {
    each_attribute(reader, pool, |name, mut r| {
        match name {
            "SourceFile" => class.source_file = Some(pool.utf8(r.u16()?)?),
            "Signature" => class.signature = Some(pool.utf8(r.u16()?)?),
            "Deprecated" => class.deprecated = true,
            "Synthetic" => class.synthetic = true,
            "InnerClasses" => {
                let count = r.u16()?;
                for _ in 0..count {
                    let inner = pool.class_name(r.u16()?)?;
                    let outer = pool.opt_class_name(r.u16()?)?;
                    let name_index = r.u16()?;
                    let inner_name = if name_index == 0 {
                        None
                    } else {
                        Some(pool.utf8(name_index)?)
                    };
                    class.inner_classes.push(InnerClass {
                        inner,
                        outer,
                        inner_name,
                        access: r.u16()?,
                    });
                }
            }
            "EnclosingMethod" => {
                let enclosing_class = pool.class_name(r.u16()?)?;
                let nat_index = r.u16()?;
                let method = if nat_index == 0 {
                    None
                } else {
                    Some(pool.name_and_type(nat_index)?)
                };
                class.enclosing_method = Some(EnclosingMethod {
                    class: enclosing_class,
                    method,
                });
            }
            "NestHost" => class.nest_host = Some(pool.class_name(r.u16()?)?),
            "NestMembers" => {
                let count = r.u16()?;
                for _ in 0..count {
                    class.nest_members.push(pool.class_name(r.u16()?)?);
                }
            }
            "PermittedSubclasses" => {
                let count = r.u16()?;
                for _ in 0..count {
                    class.permitted_subclasses.push(pool.class_name(r.u16()?)?);
                }
            }
            "Record" => {
                let count = r.u16()?;
                for _ in 0..count {
                    class
                        .record_components
                        .push(parse_record_component(&mut r, pool)?);
                }
            }
            "RuntimeVisibleAnnotations" => {
                class.visible_annotations = parse_annotations(&mut r, pool)?;
            }
            "RuntimeInvisibleAnnotations" => {
                class.invisible_annotations = parse_annotations(&mut r, pool)?;
            }
            "RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => {
                collect_type_annotations(&mut r, pool, &mut class.type_annotations);
            }
            other => debug!(attribute = other, class = %class.name, "skipping attribute"),
        }
        Ok(())
    })
}

fn parse_record_component(
    reader: &mut Reader<'_>,
    pool: &Pool,
) -> Result<RecordComponent, Error> {
    let mut component = RecordComponent {
        name: pool.utf8(reader.u16()?)?,
        desc: pool.utf8(reader.u16()?)?,
        ..RecordComponent::default()
    };
    each_attribute(reader, pool, |name, mut r| {
        match name {
            "Signature" => component.signature = Some(pool.utf8(r.u16()?)?),
            "RuntimeVisibleAnnotations" => {
                component.visible_annotations = parse_annotations(&mut r, pool)?;
            }
            "RuntimeInvisibleAnnotations" => {
                component.invisible_annotations = parse_annotations(&mut r, pool)?;
            }
            "RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => {
                collect_type_annotations(&mut r, pool, &mut component.type_annotations);
            }
            other => debug!(attribute = other, component = %component.name, "skipping attribute"),
        }
        Ok(())
    })?;
    Ok(component)
}

fn parse_annotations(reader: &mut Reader<'_>, pool: &Pool) -> Result<Vec<Annotation>, Error> {
    let count = reader.u16()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        annotations.push(parse_annotation(reader, pool)?);
    }
    Ok(annotations)
}

fn parse_parameter_annotations(
    reader: &mut Reader<'_>,
    pool: &Pool,
) -> Result<Vec<Vec<Annotation>>, Error> {
    let params = reader.u8()?;
    let mut out = Vec::with_capacity(params as usize);
    for _ in 0..params {
        out.push(parse_annotations(reader, pool)?);
    }
    Ok(out)
}

fn parse_annotation(reader: &mut Reader<'_>, pool: &Pool) -> Result<Annotation, Error> {
    let type_desc = pool.utf8(reader.u16()?)?;
    let pair_count = reader.u16()?;
    let mut pairs = Vec::with_capacity(pair_count as usize);
    for _ in 0..pair_count {
        let name = pool.utf8(reader.u16()?)?;
        let value = parse_element_value(reader, pool)?;
        pairs.push((name, value));
    }
    Ok(Annotation { type_desc, pairs })
}

fn parse_element_value(reader: &mut Reader<'_>, pool: &Pool) -> Result<ElementValue, Error> {
    let tag = reader.u8()?;
    let value = match tag {
        b'B' | b'C' | b'I' | b'S' | b'Z' => ElementValue::Int {
            tag,
            value: pool.int(reader.u16()?)?,
        },
        b'J' => ElementValue::Long(pool.long(reader.u16()?)?),
        b'F' => ElementValue::Float(pool.float_bits(reader.u16()?)?),
        b'D' => ElementValue::Double(pool.double_bits(reader.u16()?)?),
        b's' => ElementValue::Str(pool.utf8_bytes(reader.u16()?)?.to_vec()),
        b'e' => ElementValue::Enum {
            type_desc: pool.utf8(reader.u16()?)?,
            const_name: pool.utf8(reader.u16()?)?,
        },
        b'c' => ElementValue::Class(pool.utf8(reader.u16()?)?),
        b'@' => ElementValue::Annotation(parse_annotation(reader, pool)?),
        b'[' => {
            let count = reader.u16()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(parse_element_value(reader, pool)?);
            }
            ElementValue::Array(values)
        }
        other => {
            return Err(corrupt(format!("unknown element_value tag {other:#x}")));
        }
    };
    Ok(value)
}

/// Type annotations are scanned only for the classes they mention, so the
/// target info is discarded and an unparseable attribute is dropped whole.
fn collect_type_annotations(reader: &mut Reader<'_>, pool: &Pool, out: &mut Vec<Annotation>) {
    match parse_type_annotations(reader, pool) {
        Ok(mut annotations) => out.append(&mut annotations),
        Err(err) => debug!(error = %err, "dropping unparseable type annotation attribute"),
    }
}

fn parse_type_annotations(
    reader: &mut Reader<'_>,
    pool: &Pool,
) -> Result<Vec<Annotation>, Error> {
    let count = reader.u16()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let target_type = reader.u8()?;
        let target_len = match target_type {
            // type_parameter, formal_parameter
            0x00 | 0x01 | 0x16 => 1,
            // supertype, type_parameter_bound, throws
            0x10 | 0x11 | 0x12 | 0x17 => 2,
            // empty targets on field/method/receiver
            0x13 | 0x14 | 0x15 => 0,
            other => {
                return Err(corrupt(format!(
                    "unexpected type annotation target {other:#x} outside code"
                )));
            }
        };
        reader.skip(target_len)?;
        let path_len = reader.u8()? as usize;
        reader.skip(path_len * 2)?;
        annotations.push(parse_annotation(reader, pool)?);
    }
    Ok(annotations)
}
