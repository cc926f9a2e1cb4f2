use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::TagError;

// ---------------------------------------------------------------------------
// Tag names and values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tag {
    Rating,
    Caption,
    Orientation,
}

/// In-memory tag mirror. Values are always strings, as stored.
pub type Tags = BTreeMap<Tag, String>;

impl Tag {
    /// Key used when writing this tag.
    pub fn key(self) -> &'static str {
        match self {
            Tag::Rating => "Xmp.xmp.Rating",
            Tag::Caption => "Iptc.Application2.Headline",
            Tag::Orientation => "Exif.Image.Orientation",
        }
    }

    /// Keys accepted when reading. Several IPTC fields are treated as caption.
    pub fn from_key(key: &str) -> Option<Tag> {
        match key {
            "Xmp.xmp.Rating" => Some(Tag::Rating),
            "Iptc.Application2.Caption"
            | "Iptc.Application2.Headline"
            | "Iptc.Application2.ObjectName" => Some(Tag::Caption),
            "Exif.Image.Orientation" => Some(Tag::Orientation),
            _ => None,
        }
    }

    pub fn read_keys() -> &'static [&'static str] {
        &[
            "Xmp.xmp.Rating",
            "Iptc.Application2.Caption",
            "Exif.Image.Orientation",
            "Iptc.Application2.Headline",
            "Iptc.Application2.ObjectName",
        ]
    }

    pub fn is_valid(self, value: &str) -> bool {
        match self {
            Tag::Rating => matches!(value, "0" | "1" | "2" | "3" | "4" | "5"),
            Tag::Orientation => {
                matches!(value, "1" | "2" | "3" | "4" | "5" | "6" | "7" | "8")
            }
            Tag::Caption => true,
        }
    }

    pub fn validate(self, value: &str) -> Result<(), TagError> {
        if self.is_valid(value) {
            Ok(())
        } else {
            Err(TagError::InvalidTagValue {
                tag: self,
                value: value.to_string(),
            })
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tag::Rating => "rating",
            Tag::Caption => "caption",
            Tag::Orientation => "orientation",
        })
    }
}

/// EXIF orientation from the mirror, 1 (no adjustment) when absent.
pub fn orientation_of(tags: &Tags) -> u8 {
    tags.get(&Tag::Orientation)
        .and_then(|o| o.parse().ok())
        .filter(|o| (1..=8).contains(o))
        .unwrap_or(1)
}

/// Parse `<key> <value words...>` lines. Unknown keys and illegal values are
/// skipped with a warning.
pub fn parse_tag_lines(src: &Path, text: &str) -> Tags {
    let mut tags = Tags::new();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let Some(key) = fields.next() else { continue };
        let value = fields.collect::<Vec<_>>().join(" ");
        if value.is_empty() {
            continue;
        }
        match Tag::from_key(key) {
            Some(tag) if tag.is_valid(&value) => {
                tags.insert(tag, value);
            }
            Some(tag) => {
                log::warn!("{}: illegal value for {} ({})", src.display(), tag, value);
            }
            None => {
                log::warn!("{}: unknown tag: {}", src.display(), key);
            }
        }
    }
    tags
}

// ---------------------------------------------------------------------------
// Metadata stores
// ---------------------------------------------------------------------------

/// Persistent tag storage for image files.
pub trait MetadataStore: Send + Sync {
    /// Missing storage or no tags yields an empty map, not an error.
    fn load(&self, path: &Path) -> io::Result<Tags>;
    fn write(&self, path: &Path, tag: Tag, value: &str) -> Result<(), TagError>;
    fn delete(&self, path: &Path, tag: Tag) -> Result<(), TagError>;
}

/// Tags kept in a plain text `<image>.exif` file next to the image.
#[derive(Debug, Default)]
pub struct SidecarStore;

impl SidecarStore {
    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut s = path.as_os_str().to_owned();
        s.push(".exif");
        PathBuf::from(s)
    }

    fn save(&self, sidecar: &Path, tags: &Tags) -> Result<(), TagError> {
        let mut out = String::new();
        for (tag, value) in tags {
            out.push_str(tag.key());
            out.push(' ');
            out.push_str(value);
            out.push('\n');
        }
        fs::write(sidecar, out).map_err(|e| TagError::store_write(sidecar, e))
    }
}

impl MetadataStore for SidecarStore {
    fn load(&self, path: &Path) -> io::Result<Tags> {
        let sidecar = Self::sidecar_path(path);
        match fs::read_to_string(&sidecar) {
            Ok(text) => Ok(parse_tag_lines(&sidecar, &text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Tags::new()),
            Err(e) => Err(e),
        }
    }

    fn write(&self, path: &Path, tag: Tag, value: &str) -> Result<(), TagError> {
        let sidecar = Self::sidecar_path(path);
        let mut tags = self
            .load(path)
            .map_err(|e| TagError::store_write(&sidecar, e))?;
        tags.insert(tag, value.to_string());
        self.save(&sidecar, &tags)
    }

    fn delete(&self, path: &Path, tag: Tag) -> Result<(), TagError> {
        let sidecar = Self::sidecar_path(path);
        let mut tags = self
            .load(path)
            .map_err(|e| TagError::store_write(&sidecar, e))?;
        if tags.remove(&tag).is_none() {
            return Ok(());
        }
        self.save(&sidecar, &tags)
    }
}

/// Tags embedded in the image file, read and written with the `exiv2` tool.
#[derive(Debug)]
pub struct EmbeddedStore {
    program: PathBuf,
}

impl Default for EmbeddedStore {
    fn default() -> Self {
        Self::new("exiv2")
    }
}

impl EmbeddedStore {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, path: &Path, modify: String) -> Result<(), TagError> {
        log::debug!("running {} -q {} {}", self.program.display(), modify, path.display());
        let status = Command::new(&self.program)
            .arg("-q")
            .arg(modify)
            .arg(path)
            .status()
            .map_err(|e| TagError::store_write(path, e))?;
        if status.success() {
            Ok(())
        } else {
            Err(TagError::store_write(path, format!("exiv2 exited with {}", status)))
        }
    }
}

impl MetadataStore for EmbeddedStore {
    fn load(&self, path: &Path) -> io::Result<Tags> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-q", "-P", "EkIXv"]);
        for key in Tag::read_keys() {
            cmd.args(["-K", key]);
        }
        cmd.arg(path);
        match cmd.output() {
            Ok(out) if out.status.success() => {
                Ok(parse_tag_lines(path, &String::from_utf8_lossy(&out.stdout)))
            }
            // exiv2 fails on files carrying none of the requested keys.
            Ok(_) => Ok(Tags::new()),
            Err(e) => {
                log::debug!("{}: cannot run {}: {}", path.display(), self.program.display(), e);
                Ok(read_exif_orientation(path)
                    .map(|o| Tags::from([(Tag::Orientation, o.to_string())]))
                    .unwrap_or_default())
            }
        }
    }

    fn write(&self, path: &Path, tag: Tag, value: &str) -> Result<(), TagError> {
        self.run(path, format!("-Mset {} {}", tag.key(), value))
    }

    fn delete(&self, path: &Path, tag: Tag) -> Result<(), TagError> {
        self.run(path, format!("-Mdel {}", tag.key()))
    }
}

/// Read-only fallback when `exiv2` is not installed.
fn read_exif_orientation(path: &Path) -> Option<u32> {
    let file = fs::File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .filter(|o| (1..=8).contains(o))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_keys_and_skips_junk() {
        let text = "Xmp.xmp.Rating 4\n\
                    Iptc.Application2.Caption  Beach at   dusk\n\
                    Exif.Image.Orientation 9\n\
                    Exif.Photo.FNumber 2.8\n\
                    \n\
                    Xmp.xmp.Rating\n";
        let tags = parse_tag_lines(Path::new("t.exif"), text);
        assert_eq!(tags.get(&Tag::Rating).map(String::as_str), Some("4"));
        assert_eq!(tags.get(&Tag::Caption).map(String::as_str), Some("Beach at dusk"));
        assert!(!tags.contains_key(&Tag::Orientation));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn validation_ranges() {
        assert!(Tag::Rating.validate("0").is_ok());
        assert!(Tag::Rating.validate("5").is_ok());
        assert!(matches!(
            Tag::Rating.validate("6"),
            Err(TagError::InvalidTagValue { tag: Tag::Rating, .. })
        ));
        assert!(Tag::Orientation.validate("0").is_err());
        assert!(Tag::Orientation.validate("8").is_ok());
        assert!(Tag::Caption.validate("anything at all").is_ok());
    }

    #[test]
    fn orientation_defaults_to_one() {
        let mut tags = Tags::new();
        assert_eq!(orientation_of(&tags), 1);
        tags.insert(Tag::Orientation, "6".into());
        assert_eq!(orientation_of(&tags), 6);
    }

    #[test]
    fn sidecar_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore;
        let tags = store.load(&dir.path().join("a.jpg")).unwrap();
        assert!(tags.is_empty());
    }

    #[test]
    fn sidecar_write_delete() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("a.jpg");
        let store = SidecarStore;

        store.write(&img, Tag::Rating, "3").unwrap();
        store.write(&img, Tag::Caption, "two words").unwrap();
        let text = fs::read_to_string(dir.path().join("a.jpg.exif")).unwrap();
        assert_eq!(text, "Xmp.xmp.Rating 3\nIptc.Application2.Headline two words\n");

        store.delete(&img, Tag::Rating).unwrap();
        let tags = store.load(&img).unwrap();
        assert!(!tags.contains_key(&Tag::Rating));
        assert_eq!(tags.get(&Tag::Caption).map(String::as_str), Some("two words"));

        // Deleting an absent tag leaves the file alone.
        store.delete(&img, Tag::Orientation).unwrap();
        assert_eq!(store.load(&img).unwrap().len(), 1);
    }

    #[test]
    fn sidecar_write_failure_is_store_write() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("missing-dir").join("a.jpg");
        let err = SidecarStore.write(&img, Tag::Rating, "1").unwrap_err();
        assert!(matches!(err, TagError::StoreWrite { .. }));
    }

    #[test]
    fn embedded_without_tool_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("a.jpg");
        fs::write(&img, b"not an image").unwrap();
        let store = EmbeddedStore::new(dir.path().join("no-such-exiv2"));
        assert!(store.load(&img).unwrap().is_empty());
        assert!(matches!(
            store.write(&img, Tag::Rating, "2"),
            Err(TagError::StoreWrite { .. })
        ));
    }
}
