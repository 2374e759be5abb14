//! Purpose: Define the stable public Rust API boundary for stubjar.
//! Exports: Core types plus the one-call `minify` pipeline used by the CLI.
//! Role: Public, additive-only surface; hides internal codec modules.
//! Invariants: This module is the only public path to the minifier primitives.
//! Invariants: `minify` is the whole pipeline; callers never sequence stages by hand.

use std::fs;
use std::path::PathBuf;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

use crate::core::emit;

pub use crate::core::collect::{Collector, MemberKey, Retained};
pub use crate::core::emit::{EmitOptions, EmitReport};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::index::{ClasspathIndex, EntrySummary};
pub use crate::core::roots::{parse_file as parse_roots_file, parse_line as parse_root, RootSig};

#[derive(Clone, Debug)]
pub struct MinifyRequest {
    pub classpath: Vec<PathBuf>,
    pub roots: Vec<RootSig>,
    pub output: PathBuf,
    pub keep_kotlin_metadata: bool,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct MinifyReport {
    pub generated_at: String,
    pub output: PathBuf,
    pub classpath: Vec<EntrySummary>,
    pub roots: usize,
    #[serde(flatten)]
    pub emit: EmitReport,
}

/// Runs the whole pipeline: index the classpath, close over the roots, write
/// the stub jar to `request.output`.
pub fn minify(request: &MinifyRequest) -> Result<MinifyReport, Error> {
    let index = ClasspathIndex::open(&request.classpath)?;
    let mut collector = Collector::new(&index);
    collector.seed(&request.roots)?;
    let retained = collector.into_retained();

    let options = EmitOptions {
        keep_kotlin_metadata: request.keep_kotlin_metadata,
    };
    let (jar, emit_report) = emit::emit(&index, &retained, options)?;
    fs::write(&request.output, &jar).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write output jar")
            .with_path(&request.output)
            .with_source(err)
    })?;
    info!(output = %request.output.display(), bytes = jar.len(), "wrote stub jar");

    let generated_at = OffsetDateTime::now_utc().format(&Rfc3339).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to format report timestamp")
            .with_source(err)
    })?;
    Ok(MinifyReport {
        generated_at,
        output: request.output.clone(),
        classpath: index.summaries(),
        roots: request.roots.len(),
        emit: emit_report,
    })
}

#[cfg(test)]
mod tests {
    use super::{minify, MinifyRequest};
    use crate::core::roots::parse_line;
    use std::path::Path;

    #[test]
    fn minify_writes_a_readable_jar_and_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("stub.jar");
        let request = MinifyRequest {
            classpath: vec![Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/classes")],
            roots: vec![parse_line("com/example/gson/Gson").expect("parse").expect("root")],
            output: output.clone(),
            keep_kotlin_metadata: false,
        };
        let report = minify(&request).expect("minify");
        assert_eq!(report.roots, 1);
        assert_eq!(report.emit.classes_emitted, 3);
        assert_eq!(report.emit.output_bytes, std::fs::read(&output).expect("read").len());

        let json = serde_json::to_value(&report).expect("json");
        assert!(json["sha256"].is_string());
        assert!(json["generated_at"].as_str().expect("ts").contains('T'));
    }
}
