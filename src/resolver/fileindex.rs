// src/resolver/fileindex.rs

//! File index: (directory, basename) to shipping packages
//!
//! Used for file requirement lookups and for the file-conflict scan, which
//! finds packages shipping the same path with different metadata.

use crate::packages::{Package, PackageFile, PkgId, split_path};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
struct FileRec {
    basename: String,
    pkg: PkgId,
    file: usize,
}

/// A path shipped by two packages with differing metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConflict {
    pub path: String,
    /// The lower handle of the pair
    pub first: PkgId,
    pub second: PkgId,
}

#[derive(Debug, Default)]
pub struct FileIndex {
    dirs: BTreeMap<String, Vec<FileRec>>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&mut self, id: PkgId, pkg: &Package) {
        for (i, file) in pkg.files.iter().enumerate() {
            let (dir, base) = file.split();
            self.dirs.entry(dir.to_string()).or_default().push(FileRec {
                basename: base.to_string(),
                pkg: id,
                file: i,
            });
        }
    }

    /// Sort every directory's entries by basename; call once after indexing
    pub fn setup(&mut self) {
        for entries in self.dirs.values_mut() {
            entries.sort_by(|a, b| a.basename.cmp(&b.basename).then(a.pkg.cmp(&b.pkg)));
        }
    }

    /// Packages owning exactly `path`
    pub fn lookup_path(&self, path: &str) -> Vec<PkgId> {
        let (dir, base) = split_path(path);
        let Some(entries) = self.dirs.get(dir) else {
            return Vec::new();
        };

        let start = entries.partition_point(|e| e.basename.as_str() < base);
        let mut ids: Vec<PkgId> = entries[start..]
            .iter()
            .take_while(|e| e.basename == base)
            .map(|e| e.pkg)
            .collect();
        ids.dedup();
        ids
    }

    /// Scan for file conflicts
    ///
    /// `declared(a, b)` tells whether either package already declares a
    /// conflict or obsoletes on the other; such pairs are not reported.
    /// Packages of the same name never conflict on files. Each unordered
    /// pair is reported once per path.
    pub fn find_conflicts<F>(&self, pkgs: &[Package], declared: F) -> Vec<FileConflict>
    where
        F: Fn(PkgId, PkgId) -> bool,
    {
        let mut found = Vec::new();
        let mut seen: HashSet<(PkgId, PkgId, String)> = HashSet::new();

        for entries in self.dirs.values() {
            let mut start = 0;
            while start < entries.len() {
                let mut end = start + 1;
                while end < entries.len() && entries[end].basename == entries[start].basename {
                    end += 1;
                }

                let group = &entries[start..end];
                for i in 0..group.len() {
                    for j in (i + 1)..group.len() {
                        let (a, b) = (&group[i], &group[j]);
                        if a.pkg == b.pkg {
                            continue;
                        }

                        let pa = &pkgs[a.pkg.index()];
                        let pb = &pkgs[b.pkg.index()];
                        if pa.name == pb.name || declared(a.pkg, b.pkg) {
                            continue;
                        }

                        let fa: &PackageFile = &pa.files[a.file];
                        let fb: &PackageFile = &pb.files[b.file];
                        if fa.same_metadata(fb) {
                            continue;
                        }

                        let (first, second) = if a.pkg < b.pkg {
                            (a.pkg, b.pkg)
                        } else {
                            (b.pkg, a.pkg)
                        };
                        if seen.insert((first, second, fa.path.clone())) {
                            debug!("file conflict {} ({} <-> {})", fa.path, pa, pb);
                            found.push(FileConflict {
                                path: fa.path.clone(),
                                first,
                                second,
                            });
                        }
                    }
                }
                start = end;
            }
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Evr;

    fn pkg(name: &str, files: &[(&str, i64)]) -> Package {
        let mut p = Package::new(name, Evr::parse("1.0-1").unwrap());
        p.files = files
            .iter()
            .map(|(path, size)| PackageFile::new(path, *size, 0o100644))
            .collect();
        p
    }

    fn build(pkgs: &[Package]) -> FileIndex {
        let mut idx = FileIndex::new();
        for (i, p) in pkgs.iter().enumerate() {
            idx.index(PkgId(i), p);
        }
        idx.setup();
        idx
    }

    #[test]
    fn test_lookup_path() {
        let pkgs = vec![
            pkg("a", &[("/usr/bin/x", 1), ("/usr/bin/y", 1)]),
            pkg("b", &[("/usr/bin/x", 1), ("/etc/b.conf", 1)]),
        ];
        let idx = build(&pkgs);

        assert_eq!(idx.lookup_path("/usr/bin/x"), vec![PkgId(0), PkgId(1)]);
        assert_eq!(idx.lookup_path("/usr/bin/y"), vec![PkgId(0)]);
        assert!(idx.lookup_path("/usr/bin/z").is_empty());
        assert!(idx.lookup_path("/nope/x").is_empty());
    }

    #[test]
    fn test_conflict_reported_once() {
        let pkgs = vec![
            pkg("a", &[("/usr/bin/x", 10)]),
            pkg("b", &[("/usr/bin/x", 20)]),
        ];
        let idx = build(&pkgs);

        let conflicts = idx.find_conflicts(&pkgs, |_, _| false);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, "/usr/bin/x");
        assert_eq!((conflicts[0].first, conflicts[0].second), (PkgId(0), PkgId(1)));
    }

    #[test]
    fn test_no_conflict_for_identical_or_declared() {
        let pkgs = vec![
            pkg("a", &[("/usr/bin/x", 10)]),
            pkg("b", &[("/usr/bin/x", 10)]),
            pkg("c", &[("/usr/bin/x", 30)]),
        ];
        let idx = build(&pkgs);

        // c clashes with both a and b, but declares a conflict on a
        let conflicts = idx.find_conflicts(&pkgs, |x, y| {
            let pair = if x < y { (x, y) } else { (y, x) };
            pair == (PkgId(0), PkgId(2))
        });
        assert_eq!(conflicts.len(), 1);
        assert_eq!((conflicts[0].first, conflicts[0].second), (PkgId(1), PkgId(2)));
    }

    #[test]
    fn test_same_name_is_exempt() {
        let pkgs = vec![pkg("a", &[("/usr/bin/x", 10)]), pkg("a", &[("/usr/bin/x", 11)])];
        let idx = build(&pkgs);
        assert!(idx.find_conflicts(&pkgs, |_, _| false).is_empty());
    }
}
