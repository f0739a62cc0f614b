//! Filesystem Scanner (§4.1): enumerates the corpus, filters, and emits
//! stable `IngestItem`s.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use tracing::{debug, warn};

/// Read at most this many bytes of a file's content when computing its
/// change-detection digest. §4.1 requires "a bounded prefix, ≥ 64 MiB".
const HASH_PREFIX_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Text,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymlinkPolicy {
    /// Follow symlinks when resolving a path's canonical form.
    Follow,
    /// Skip any entry that is a symlink.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestItem {
    pub path: PathBuf,
    pub doc_id: String,
    pub modality: Modality,
    pub mtime: i64,
    /// Hex-encoded digest of the file's content prefix. Computed with
    /// SHA-1 per §4.1; kept under the name `sha1` to match the Chunk
    /// Store's `docs.sha1` column (§4.6) rather than the data model's
    /// `sha256` field label in §3, which names the attribute generically
    /// without specifying hex width — see DESIGN.md for this resolution.
    pub sha1: String,
}

/// Deterministic function of an absolute path: two items with the same
/// `path` always produce the same `doc_id` (§3 invariant).
pub fn derive_doc_id(path: &Path) -> String {
    let mut hasher = Sha1::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

fn hash_prefix(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut buf = vec![0u8; HASH_PREFIX_BYTES.min(8 * 1024 * 1024)];
    let mut hasher = Sha1::new();
    let mut remaining = HASH_PREFIX_BYTES;

    loop {
        let want = buf.len().min(remaining);
        if want == 0 {
            break;
        }
        let n = file.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        remaining -= n;
    }

    Ok(hex::encode(hasher.finalize()))
}

fn modality_for(ext: &str) -> Modality {
    match ext {
        "png" | "jpg" | "jpeg" | "gif" | "webp" => Modality::Image,
        _ => Modality::Text,
    }
}

/// Expands `globs`, filters by `exts` and `max_file_size`, and returns
/// `IngestItem`s sorted by canonical absolute path (determinism invariant
/// of §4.1). Permission errors and oversize/disallowed-extension files are
/// skipped, not propagated.
pub fn scan(
    globs: &[String],
    exts: &[String],
    max_file_size: u64,
    symlink_policy: SymlinkPolicy,
) -> Vec<IngestItem> {
    let allowed: Vec<String> = exts.iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect();

    // Keyed by canonical path so re-matching globs (or overlapping patterns)
    // cannot produce duplicate items.
    let mut by_path: BTreeMap<PathBuf, IngestItem> = BTreeMap::new();

    for pattern in globs {
        let paths = match glob::glob(pattern) {
            Ok(p) => p,
            Err(e) => {
                warn!(pattern, error = %e, "invalid glob pattern, skipping");
                continue;
            }
        };

        for entry in paths {
            let raw_path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "glob entry error, skipping");
                    continue;
                }
            };

            if symlink_policy == SymlinkPolicy::Skip {
                match fs::symlink_metadata(&raw_path) {
                    Ok(meta) if meta.file_type().is_symlink() => continue,
                    Ok(_) => {}
                    Err(_) => continue,
                }
            }

            let canonical = match fs::canonicalize(&raw_path) {
                Ok(p) => p,
                Err(e) => {
                    debug!(path = %raw_path.display(), error = %e, "cannot canonicalize, skipping");
                    continue;
                }
            };

            let meta = match fs::metadata(&canonical) {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %canonical.display(), error = %e, "cannot stat, skipping");
                    continue;
                }
            };

            if !meta.is_file() {
                continue;
            }

            if meta.len() > max_file_size {
                debug!(path = %canonical.display(), size = meta.len(), "oversize, skipping");
                continue;
            }

            let ext = canonical
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            if !allowed.contains(&ext) {
                continue;
            }

            let mtime = match meta.modified() {
                Ok(t) => t
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0),
                Err(_) => 0,
            };

            let sha1 = match hash_prefix(&canonical) {
                Ok(h) => h,
                Err(e) => {
                    warn!(path = %canonical.display(), error = %e, "cannot read, skipping");
                    continue;
                }
            };

            let doc_id = derive_doc_id(&canonical);
            by_path.insert(
                canonical.clone(),
                IngestItem {
                    path: canonical,
                    doc_id,
                    modality: modality_for(&ext),
                    mtime,
                    sha1,
                },
            );
        }
    }

    by_path.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn doc_id_is_stable_for_same_path() {
        let p = PathBuf::from("/tmp/some/doc.txt");
        assert_eq!(derive_doc_id(&p), derive_doc_id(&p));
    }

    #[test]
    fn doc_id_differs_across_paths() {
        let a = PathBuf::from("/tmp/a.txt");
        let b = PathBuf::from("/tmp/b.txt");
        assert_ne!(derive_doc_id(&a), derive_doc_id(&b));
    }

    #[test]
    fn scan_filters_by_extension_and_yields_sorted_items() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", "hello");
        write_file(dir.path(), "b.md", "world");
        write_file(dir.path(), "c.bin", "ignored");

        let pattern = format!("{}/*", dir.path().display());
        let items = scan(&[pattern], &["txt".to_string(), "md".to_string()], 1024, SymlinkPolicy::Follow);

        assert_eq!(items.len(), 2);
        let mut paths: Vec<_> = items.iter().map(|i| i.path.clone()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
        paths.sort();
    }

    #[test]
    fn scan_skips_oversize_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "big.txt", &"x".repeat(100));

        let pattern = format!("{}/*", dir.path().display());
        let items = scan(&[pattern], &["txt".to_string()], 10, SymlinkPolicy::Follow);
        assert!(items.is_empty());
    }

    #[test]
    fn scan_is_deterministic_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", "hello");
        write_file(dir.path(), "b.txt", "world");
        let pattern = format!("{}/*", dir.path().display());

        let first = scan(&[pattern.clone()], &["txt".to_string()], 1024, SymlinkPolicy::Follow);
        let second = scan(&[pattern], &["txt".to_string()], 1024, SymlinkPolicy::Follow);
        assert_eq!(first, second);
    }
}
