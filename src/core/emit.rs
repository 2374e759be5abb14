//! Purpose: Assemble the stub jar from the retained closure.
//! Exports: `EmitOptions`, `EmitReport`, `emit`.
//! Role: Filters each retained class down to its kept members and writes the jar.
//! Invariants: Classes are emitted in retention order; output bytes are deterministic.
//! Invariants: Retained classes absent from the classpath are reported, never emitted.

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::core::classfile::{self, ClassFile, MethodInfo, ACC_ABSTRACT, ACC_NATIVE, ACC_PUBLIC};
use crate::core::collect::Retained;
use crate::core::error::Error;
use crate::core::index::ClasspathIndex;
use crate::core::jar::JarWriter;
use crate::core::metadata;

#[derive(Clone, Copy, Debug, Default)]
pub struct EmitOptions {
    pub keep_kotlin_metadata: bool,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct EmitReport {
    pub classes_retained: usize,
    pub fields_retained: usize,
    pub methods_retained: usize,
    pub classes_emitted: usize,
    /// Retained names not found on the classpath, retention order. JDK types
    /// land here; the consumer's own platform supplies them.
    pub missing: Vec<String>,
    pub output_bytes: usize,
    pub sha256: String,
}

/// Builds the stub jar in memory and describes what went into it.
pub fn emit(
    index: &ClasspathIndex,
    retained: &Retained,
    options: EmitOptions,
) -> Result<(Vec<u8>, EmitReport), Error> {
    let mut writer = JarWriter::new();
    let mut missing = Vec::new();
    let mut emitted = 0usize;

    for name in &retained.classes {
        let Some(class) = index.read_class(name)? else {
            missing.push(name.clone());
            continue;
        };
        let stub = filter_class(&class, retained, options);
        debug!(
            class = name.as_str(),
            fields = stub.fields.len(),
            methods = stub.methods.len(),
            "emitting stub"
        );
        let bytes = classfile::write(&stub)?;
        writer.add(&format!("{name}.class"), &bytes)?;
        emitted += 1;
    }

    let jar = writer.finish()?;
    let report = EmitReport {
        classes_retained: retained.classes.len(),
        fields_retained: retained.fields.len(),
        methods_retained: retained.methods.len(),
        classes_emitted: emitted,
        missing,
        output_bytes: jar.len(),
        sha256: hex_digest(&jar),
    };
    info!(
        emitted = report.classes_emitted,
        missing = report.missing.len(),
        bytes = report.output_bytes,
        "stub jar assembled"
    );
    Ok((jar, report))
}

fn filter_class(class: &ClassFile, retained: &Retained, options: EmitOptions) -> ClassFile {
    let mut stub = class.clone();
    let had_ctor = class.methods.iter().any(|method| method.name == CTOR);

    stub.fields
        .retain(|field| retained.keeps_field(&class.name, &field.name, &field.desc));
    stub.methods
        .retain(|method| retained.keeps_method(&class.name, &method.name, &method.desc));
    for method in &mut stub.methods {
        // Every kept method becomes concrete and gets a trivial body: native
        // methods must not demand a library, abstract ones become defaults.
        method.access &= !(ACC_ABSTRACT | ACC_NATIVE);
    }

    // Instantiable classes that lose every constructor get a bare public one
    // back, so code compiled against the stub can still say `new`.
    if had_ctor
        && !stub.is_interface()
        && !stub.is_abstract()
        && !stub.methods.iter().any(|method| method.name == CTOR)
    {
        stub.methods.push(stub_ctor());
    }

    let members_dropped = stub.fields.len() != class.fields.len()
        || stub.methods.len() != class.methods.len();
    if !metadata::keep_metadata(members_dropped, options.keep_kotlin_metadata) {
        let stripped = metadata::strip(&mut stub.visible_annotations)
            | metadata::strip(&mut stub.invisible_annotations);
        if stripped {
            debug!(class = class.name.as_str(), "stripped kotlin metadata");
        }
    }
    stub
}

const CTOR: &str = "<init>";

fn stub_ctor() -> MethodInfo {
    MethodInfo {
        access: ACC_PUBLIC,
        name: CTOR.to_string(),
        desc: "()V".to_string(),
        synthetic: true,
        ..MethodInfo::default()
    }
}

fn hex_digest(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::{emit, EmitOptions};
    use crate::core::collect::Collector;
    use crate::core::index::ClasspathIndex;
    use crate::core::jar::JarReader;
    use crate::core::roots::parse_line;
    use std::path::{Path, PathBuf};

    fn fixture_classpath() -> Vec<PathBuf> {
        vec![Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/classes")]
    }

    fn run(roots: &[&str]) -> (Vec<u8>, super::EmitReport) {
        let index = ClasspathIndex::open(&fixture_classpath()).expect("index");
        let roots: Vec<_> = roots
            .iter()
            .map(|line| parse_line(line).expect("parse").expect("root"))
            .collect();
        let mut collector = Collector::new(&index);
        collector.seed(&roots).expect("seed");
        let retained = collector.into_retained();
        emit(&index, &retained, EmitOptions::default()).expect("emit")
    }

    #[test]
    fn emits_only_kept_members_and_restores_a_ctor() {
        let (jar, report) =
            run(&["com/example/gson/Gson#newBuilder()Lcom/example/gson/GsonBuilder;"]);
        assert_eq!(report.classes_emitted, 3);
        assert!(report.missing.contains(&"java/lang/Object".to_string()));

        let jar = JarReader::from_bytes("stub.jar", jar).expect("read back");
        let gson = crate::core::classfile::parse(
            &jar.read("com/example/gson/Gson.class").expect("entry"),
        )
        .expect("parse");
        let mut names: Vec<_> = gson.methods.iter().map(|m| m.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["<init>", "newBuilder"]);
        assert!(gson.fields.is_empty());
    }

    #[test]
    fn unreferenced_members_collapse_to_the_stub_ctor() {
        let (jar, _) = run(&["com/example/gson/GsonBuilder"]);
        let jar = JarReader::from_bytes("stub.jar", jar).expect("read back");
        let builder = crate::core::classfile::parse(
            &jar.read("com/example/gson/GsonBuilder.class").expect("entry"),
        )
        .expect("parse");
        assert!(builder.fields.is_empty());
        assert_eq!(builder.methods.len(), 1);
        assert_eq!(builder.methods[0].name, "<init>");
        assert!(builder.methods[0].synthetic);
    }

    #[test]
    fn interfaces_never_gain_a_ctor() {
        let (jar, _) = run(&["com/example/annotations/MyAnno"]);
        let jar = JarReader::from_bytes("stub.jar", jar).expect("read back");
        let anno = crate::core::classfile::parse(
            &jar.read("com/example/annotations/MyAnno.class").expect("entry"),
        )
        .expect("parse");
        assert!(anno.is_interface());
        assert!(anno.methods.is_empty());
    }

    #[test]
    fn output_is_deterministic() {
        let first = run(&["com/example/gson/Gson"]);
        let second = run(&["com/example/gson/Gson"]);
        assert_eq!(first.0, second.0);
        assert_eq!(first.1.sha256, second.1.sha256);
    }
}
