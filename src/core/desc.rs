//! Purpose: Extract class internal names from descriptors and generic signatures.
//! Exports: `classes_in_field_desc`, `classes_in_method_desc`, `classes_in_signature`.
//! Role: Single place that understands JVM descriptor and signature grammars.
//! Invariants: Signature scanning is forgiving; malformed input yields partial results, never errors.
//! Invariants: Array dimensions are unwrapped; primitives and type variables contribute nothing.

/// Appends the class named by a field descriptor, if any (`[[Lcom/a/B;` -> `com/a/B`).
pub fn classes_in_field_desc(desc: &str, out: &mut Vec<String>) {
    let stripped = desc.trim_start_matches('[');
    if let Some(rest) = stripped.strip_prefix('L') {
        if let Some(end) = rest.find(';') {
            out.push(rest[..end].to_string());
        }
    }
}

/// Appends every class referenced by a method descriptor's arguments and return type.
pub fn classes_in_method_desc(desc: &str, out: &mut Vec<String>) {
    let bytes = desc.as_bytes();
    let mut pos = 0;
    if bytes.first() == Some(&b'(') {
        pos = 1;
    }
    while pos < bytes.len() {
        match bytes[pos] {
            b')' => pos += 1,
            b'[' => pos += 1,
            b'L' => {
                let rest = &desc[pos + 1..];
                match rest.find(';') {
                    Some(end) => {
                        out.push(rest[..end].to_string());
                        pos += 1 + end + 1;
                    }
                    None => return,
                }
            }
            // Primitives and V advance one position.
            _ => pos += 1,
        }
    }
}

/// Appends every class type named by a generic signature (class, method, or field form).
pub fn classes_in_signature(sig: &str, out: &mut Vec<String>) {
    let mut scanner = SigScanner {
        bytes: sig.as_bytes(),
        pos: 0,
        out,
    };
    scanner.scan();
}

struct SigScanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    out: &'a mut Vec<String>,
}

impl SigScanner<'_> {
    fn scan(&mut self) {
        // Best effort: stop quietly at the first malformed construct.
        let _ = self.scan_inner();
    }

    fn scan_inner(&mut self) -> Option<()> {
        if self.peek() == Some(b'<') {
            self.formal_type_params()?;
        }
        if self.peek() == Some(b'(') {
            self.pos += 1;
            while self.peek() != Some(b')') {
                self.java_type()?;
            }
            self.pos += 1;
            if self.peek() == Some(b'V') {
                self.pos += 1;
            } else {
                self.java_type()?;
            }
            while self.peek() == Some(b'^') {
                self.pos += 1;
                self.java_type()?;
            }
            return Some(());
        }
        // Class signature (superclass + interfaces) or a lone field type.
        while self.peek().is_some() {
            self.java_type()?;
        }
        Some(())
    }

    fn formal_type_params(&mut self) -> Option<()> {
        self.expect(b'<')?;
        while self.peek() != Some(b'>') {
            // Identifier up to the class-bound colon.
            while !matches!(self.peek()?, b':') {
                self.pos += 1;
            }
            self.expect(b':')?;
            if matches!(self.peek()?, b'L' | b'[' | b'T') {
                self.java_type()?;
            }
            while self.peek() == Some(b':') {
                self.pos += 1;
                self.java_type()?;
            }
        }
        self.expect(b'>')
    }

    fn java_type(&mut self) -> Option<()> {
        while self.peek() == Some(b'[') {
            self.pos += 1;
        }
        match self.peek()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => {
                self.pos += 1;
                Some(())
            }
            b'T' => {
                while self.peek()? != b';' {
                    self.pos += 1;
                }
                self.pos += 1;
                Some(())
            }
            b'L' => self.class_type(),
            _ => None,
        }
    }

    fn class_type(&mut self) -> Option<()> {
        self.expect(b'L')?;
        let start = self.pos;
        while !matches!(self.peek()?, b'<' | b';' | b'.') {
            self.pos += 1;
        }
        let name = std::str::from_utf8(&self.bytes[start..self.pos]).ok()?;
        if !name.is_empty() {
            self.out.push(name.to_string());
        }
        loop {
            match self.peek()? {
                b'<' => {
                    self.pos += 1;
                    while self.peek()? != b'>' {
                        match self.peek()? {
                            b'*' => self.pos += 1,
                            b'+' | b'-' => {
                                self.pos += 1;
                                self.java_type()?;
                            }
                            _ => self.java_type()?,
                        }
                    }
                    self.pos += 1;
                }
                // Inner-class suffix; only the outer name is collected.
                b'.' => {
                    self.pos += 1;
                    while !matches!(self.peek()?, b'<' | b';' | b'.') {
                        self.pos += 1;
                    }
                }
                b';' => {
                    self.pos += 1;
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Option<()> {
        if self.peek()? == byte {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{classes_in_field_desc, classes_in_method_desc, classes_in_signature};

    fn field(desc: &str) -> Vec<String> {
        let mut out = Vec::new();
        classes_in_field_desc(desc, &mut out);
        out
    }

    fn method(desc: &str) -> Vec<String> {
        let mut out = Vec::new();
        classes_in_method_desc(desc, &mut out);
        out
    }

    fn sig(text: &str) -> Vec<String> {
        let mut out = Vec::new();
        classes_in_signature(text, &mut out);
        out
    }

    #[test]
    fn field_descriptors() {
        assert_eq!(field("Lcom/a/B;"), vec!["com/a/B"]);
        assert_eq!(field("[[Lcom/a/B;"), vec!["com/a/B"]);
        assert!(field("I").is_empty());
        assert!(field("[J").is_empty());
    }

    #[test]
    fn method_descriptors() {
        assert_eq!(
            method("(Ljava/lang/String;Ljava/lang/Class;)Ljava/lang/Object;"),
            vec!["java/lang/String", "java/lang/Class", "java/lang/Object"]
        );
        assert_eq!(method("([IJ)V"), Vec::<String>::new());
        assert_eq!(method("()[Lcom/a/B;"), vec!["com/a/B"]);
    }

    #[test]
    fn generic_method_signature() {
        assert_eq!(
            sig("<T:Ljava/lang/Object;>(Ljava/lang/String;Ljava/lang/Class<TT;>;)TT;"),
            vec!["java/lang/Object", "java/lang/String", "java/lang/Class"]
        );
    }

    #[test]
    fn class_signature_with_interfaces() {
        assert_eq!(
            sig("Ljava/lang/Object;Ljava/lang/Comparable<Lcom/a/B;>;"),
            vec!["java/lang/Object", "java/lang/Comparable", "com/a/B"]
        );
    }

    #[test]
    fn inner_class_collects_outer_name_only() {
        assert_eq!(sig("Lcom/a/Outer<TT;>.Inner;"), vec!["com/a/Outer"]);
    }

    #[test]
    fn wildcards_and_throws() {
        assert_eq!(
            sig("(Ljava/util/List<*>;Ljava/util/Map<+Lcom/a/B;-Lcom/a/C;>;)V^Lcom/a/E;"),
            vec!["java/util/List", "java/util/Map", "com/a/B", "com/a/C", "com/a/E"]
        );
    }

    #[test]
    fn malformed_signature_is_partial_not_fatal() {
        assert_eq!(sig("Lcom/a/B;Lcom/broken"), vec!["com/a/B"]);
        assert!(sig("???").is_empty());
    }
}
