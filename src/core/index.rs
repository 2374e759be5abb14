//! Purpose: Index classpath entries (JARs and class directories) by internal name.
//! Exports: `ClasspathIndex`, `EntrySummary`.
//! Role: Resolution boundary between internal names and on-disk class bytes.
//! Invariants: Earlier classpath entries win for duplicate class names.
//! Invariants: Parsed classes are cached; the index never mutates its inputs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::core::classfile::{self, ClassFile};
use crate::core::error::{Error, ErrorKind};
use crate::core::jar::JarReader;

const CLASS_SUFFIX: &str = ".class";

enum Source {
    Jar(JarReader),
    Dir(PathBuf),
}

struct IndexedEntry {
    path: PathBuf,
    source: Source,
    class_count: usize,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct EntrySummary {
    pub path: PathBuf,
    pub classes: usize,
}

pub struct ClasspathIndex {
    entries: Vec<IndexedEntry>,
    /// Internal name -> index into `entries`; first classpath entry wins.
    locations: HashMap<String, usize>,
    /// Internal names in first-seen order.
    order: Vec<String>,
    cache: RefCell<HashMap<String, Rc<ClassFile>>>,
}

impl ClasspathIndex {
    pub fn open(paths: &[PathBuf]) -> Result<Self, Error> {
        let mut index = Self {
            entries: Vec::new(),
            locations: HashMap::new(),
            order: Vec::new(),
            cache: RefCell::new(HashMap::new()),
        };
        for path in paths {
            if !path.exists() {
                warn!(path = %path.display(), "classpath entry does not exist, skipping");
                continue;
            }
            if path.is_dir() {
                index.add_dir(path)?;
            } else {
                index.add_jar(path)?;
            }
        }
        debug!(
            entries = index.entries.len(),
            classes = index.order.len(),
            "classpath indexed"
        );
        Ok(index)
    }

    fn add_jar(&mut self, path: &Path) -> Result<(), Error> {
        let jar = JarReader::open(path)?;
        let entry_index = self.entries.len();
        let mut class_count = 0;
        for name in jar.names() {
            let Some(internal) = name.strip_suffix(CLASS_SUFFIX) else {
                continue;
            };
            class_count += 1;
            register(
                &mut self.locations,
                &mut self.order,
                internal.to_string(),
                entry_index,
            );
        }
        self.entries.push(IndexedEntry {
            path: path.to_path_buf(),
            source: Source::Jar(jar),
            class_count,
        });
        Ok(())
    }

    fn add_dir(&mut self, path: &Path) -> Result<(), Error> {
        let entry_index = self.entries.len();
        let mut names = Vec::new();
        collect_class_files(path, path, &mut names)?;
        // Directory walk order is OS-dependent; sort for reproducible output.
        names.sort();
        let class_count = names.len();
        for internal in names {
            register(&mut self.locations, &mut self.order, internal, entry_index);
        }
        self.entries.push(IndexedEntry {
            path: path.to_path_buf(),
            source: Source::Dir(path.to_path_buf()),
            class_count,
        });
        Ok(())
    }

    pub fn has_class(&self, internal_name: &str) -> bool {
        self.locations.contains_key(internal_name)
    }

    /// Internal names across all entries, first-seen order.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn class_count(&self) -> usize {
        self.order.len()
    }

    pub fn summaries(&self) -> Vec<EntrySummary> {
        self.entries
            .iter()
            .map(|entry| EntrySummary {
                path: entry.path.clone(),
                classes: entry.class_count,
            })
            .collect()
    }

    /// Resolves and parses a class. `Ok(None)` means the name is not on the
    /// classpath (typical for JDK types).
    pub fn read_class(&self, internal_name: &str) -> Result<Option<Rc<ClassFile>>, Error> {
        if let Some(class) = self.cache.borrow().get(internal_name) {
            return Ok(Some(Rc::clone(class)));
        }
        let Some(&entry_index) = self.locations.get(internal_name) else {
            return Ok(None);
        };
        let entry = &self.entries[entry_index];
        let bytes = match &entry.source {
            Source::Jar(jar) => jar.read(&format!("{internal_name}{CLASS_SUFFIX}"))?,
            Source::Dir(dir) => {
                let file = dir.join(format!("{internal_name}{CLASS_SUFFIX}"));
                fs::read(&file).map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to read class file")
                        .with_path(&file)
                        .with_source(err)
                })?
            }
        };
        let class = classfile::parse(&bytes).map_err(|err| {
            err.with_path(&entry.path)
                .with_entry(internal_name.to_string())
        })?;
        let class = Rc::new(class);
        self.cache
            .borrow_mut()
            .insert(internal_name.to_string(), Rc::clone(&class));
        Ok(Some(class))
    }
}

fn register(
    locations: &mut HashMap<String, usize>,
    order: &mut Vec<String>,
    internal: String,
    entry_index: usize,
) {
    if !locations.contains_key(&internal) {
        order.push(internal.clone());
        locations.insert(internal, entry_index);
    }
}

fn collect_class_files(
    root: &Path,
    dir: &Path,
    names: &mut Vec<String>,
) -> Result<(), Error> {
    let read = fs::read_dir(dir).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read classpath directory")
            .with_path(dir)
            .with_source(err)
    })?;
    for child in read {
        let child = child.map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read directory entry")
                .with_path(dir)
                .with_source(err)
        })?;
        let path = child.path();
        if path.is_dir() {
            collect_class_files(root, &path, names)?;
        } else if path.extension().is_some_and(|ext| ext == "class") {
            let relative = path.strip_prefix(root).map_err(|_| {
                Error::new(ErrorKind::Internal)
                    .with_message("walked path escaped classpath root")
                    .with_path(&path)
            })?;
            let mut internal = relative.to_string_lossy().replace('\\', "/");
            internal.truncate(internal.len() - CLASS_SUFFIX.len());
            names.push(internal);
        }
    }
    Ok(())
}
