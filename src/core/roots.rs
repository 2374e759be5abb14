//! Purpose: Parse root signature files that seed the reachability closure.
//! Exports: `RootSig`, `parse_line`, `parse_file`.
//! Role: The only reader of the roots line format.
//! Invariants: Lines are `owner`, `owner#field`, or `owner#method(desc)`; `#` starts a comment.
//! Invariants: Parse failures carry the offending line number as a `Usage` error.

use std::fs;
use std::path::Path;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RootSig {
    Class {
        owner: String,
    },
    Field {
        owner: String,
        name: String,
        /// Resolved from the owner class when absent in the roots file.
        desc: Option<String>,
    },
    Method {
        owner: String,
        name: String,
        desc: String,
    },
}

impl RootSig {
    pub fn owner(&self) -> &str {
        match self {
            RootSig::Class { owner }
            | RootSig::Field { owner, .. }
            | RootSig::Method { owner, .. } => owner,
        }
    }
}

/// Parses one roots line. `Ok(None)` means blank or comment.
pub fn parse_line(line: &str) -> Result<Option<RootSig>, Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let Some((owner, member)) = trimmed.split_once('#') else {
        return Ok(Some(RootSig::Class {
            owner: trimmed.to_string(),
        }));
    };
    if owner.is_empty() {
        return Err(usage("missing owner class before '#'"));
    }
    if member.is_empty() {
        return Err(usage("missing member name after '#'"));
    }
    let owner = owner.to_string();
    let Some(paren) = member.find('(') else {
        return Ok(Some(RootSig::Field {
            owner,
            name: member.to_string(),
            desc: None,
        }));
    };
    let (name, desc) = member.split_at(paren);
    if name.is_empty() {
        return Err(usage("missing method name before '('"));
    }
    if !desc.contains(')') {
        return Err(usage("method descriptor is missing ')'"));
    }
    Ok(Some(RootSig::Method {
        owner,
        name: name.to_string(),
        desc: desc.to_string(),
    }))
}

pub fn parse_file(path: &Path) -> Result<Vec<RootSig>, Error> {
    let text = fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read roots file")
            .with_path(path)
            .with_source(err)
    })?;
    let mut roots = Vec::new();
    for (index, line) in text.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(root)) => roots.push(root),
            Ok(None) => {}
            Err(err) => {
                let cause = err.message().unwrap_or("bad root signature").to_string();
                return Err(err
                    .with_path(path)
                    .with_message(format!("line {}: {cause}", index + 1))
                    .with_hint(
                        "Expected `pkg/Class`, `pkg/Class#field`, or `pkg/Class#method(desc)ret`.",
                    ));
            }
        }
    }
    Ok(roots)
}

fn usage(message: &str) -> Error {
    Error::new(ErrorKind::Usage).with_message(message)
}

#[cfg(test)]
mod tests {
    use super::{parse_file, parse_line, RootSig};
    use crate::core::error::ErrorKind;

    #[test]
    fn class_line() {
        let root = parse_line("com/example/gson/Gson").expect("parse").expect("root");
        assert_eq!(
            root,
            RootSig::Class {
                owner: "com/example/gson/Gson".to_string()
            }
        );
    }

    #[test]
    fn field_line_without_descriptor() {
        let root = parse_line("com/example/gson/JsonNull#INSTANCE")
            .expect("parse")
            .expect("root");
        assert_eq!(
            root,
            RootSig::Field {
                owner: "com/example/gson/JsonNull".to_string(),
                name: "INSTANCE".to_string(),
                desc: None,
            }
        );
    }

    #[test]
    fn method_line() {
        let root = parse_line("com/example/gson/Gson#newBuilder()Lcom/example/gson/GsonBuilder;")
            .expect("parse")
            .expect("root");
        assert_eq!(
            root,
            RootSig::Method {
                owner: "com/example/gson/Gson".to_string(),
                name: "newBuilder".to_string(),
                desc: "()Lcom/example/gson/GsonBuilder;".to_string(),
            }
        );
    }

    #[test]
    fn blanks_and_comments_are_skipped() {
        assert_eq!(parse_line("").expect("parse"), None);
        assert_eq!(parse_line("   ").expect("parse"), None);
        assert_eq!(parse_line("# a comment").expect("parse"), None);
    }

    #[test]
    fn file_errors_carry_line_number_and_cause() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("roots.txt");
        std::fs::write(&path, "com/example/gson/Gson\na/B#\n").expect("write");

        let err = parse_file(&path).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let message = err.message().expect("message");
        assert!(message.contains("line 2"), "message: {message}");
        assert!(
            message.contains("missing member name after '#'"),
            "message: {message}"
        );
    }

    #[test]
    fn malformed_lines_are_usage_errors() {
        for line in ["a/B#", "a/B#(", "a/B#run("] {
            let err = parse_line(line).expect_err("should fail");
            assert_eq!(err.kind(), ErrorKind::Usage, "line: {line}");
        }
    }
}
