use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tga", "tiff", "tif", "webp", "ico", "pnm", "pbm",
    "pgm", "ppm", "pam", "dds", "hdr", "exr", "ff", "qoi",
];

/// Picked up from the working directory when no paths are given.
const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "tif", "tiff"];

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| exts.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Build the picture list. Files are kept in argument order, directories
/// contribute their images sorted by name, and repeats are dropped.
pub fn collect_images(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    if paths.is_empty() {
        scan_dir(Path::new("."), false, DEFAULT_EXTENSIONS, &mut seen, &mut out);
        return out;
    }

    for path in paths {
        if path.is_dir() {
            scan_dir(path, recursive, IMAGE_EXTENSIONS, &mut seen, &mut out);
        } else if path.is_file() {
            push_unique(path.clone(), &mut seen, &mut out);
        } else {
            log::warn!("{}: no such file (ignored)", path.display());
        }
    }
    log::info!("Found {} images.", out.len());
    out
}

fn push_unique(path: PathBuf, seen: &mut HashSet<PathBuf>, out: &mut Vec<PathBuf>) {
    if seen.insert(path.clone()) {
        out.push(path);
    } else {
        log::debug!("{}: duplicate, skipped", path.display());
    }
}

fn scan_dir(
    dir: &Path,
    recursive: bool,
    exts: &[&str],
    seen: &mut HashSet<PathBuf>,
    out: &mut Vec<PathBuf>,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("{}: {} (ignored)", dir.display(), e);
            return;
        }
    };
    let mut files = Vec::new();
    let mut subdirs = Vec::new();

    for entry in entries.filter_map(|e| e.ok()) {
        let p = entry.path();
        if p.is_file() && has_extension(&p, exts) {
            files.push(p);
        } else if recursive && p.is_dir() {
            subdirs.push(p);
        }
    }

    files.sort();
    for f in files {
        push_unique(f, seen, out);
    }

    if recursive {
        subdirs.sort();
        for sub in subdirs {
            scan_dir(&sub, true, exts, seen, out);
        }
    }
}
