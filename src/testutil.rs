//! Scriptable codec and tag store for unit tests.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::codec::{Codec, FitMode, Frame, Rect, Size};
use crate::error::{LoadError, TagError};
use crate::tags::{MetadataStore, Tag, Tags};

/// Fails for any path whose file name starts with "bad"; otherwise returns
/// a frame filling the target box.
#[derive(Default)]
pub struct FakeCodec {
    calls: Arc<AtomicUsize>,
    orientation: Arc<AtomicU8>,
    started: Arc<Mutex<Vec<(PathBuf, Size)>>>,
    gate: Option<Mutex<Receiver<()>>>,
}

impl FakeCodec {
    /// Each decode blocks until one `()` is sent on the returned sender.
    pub fn gated() -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let codec = FakeCodec {
            gate: Some(Mutex::new(rx)),
            ..Default::default()
        };
        (codec, tx)
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn last_orientation(&self) -> Arc<AtomicU8> {
        Arc::clone(&self.orientation)
    }

    /// Every decode as it starts (before the gate), with its target size.
    pub fn started(&self) -> Arc<Mutex<Vec<(PathBuf, Size)>>> {
        Arc::clone(&self.started)
    }
}

impl Codec for FakeCodec {
    fn decode(
        &self,
        path: &Path,
        target: Size,
        _fit: FitMode,
        orientation: u8,
    ) -> Result<Frame, LoadError> {
        self.started.lock().unwrap().push((path.to_path_buf(), target));
        if let Some(ref gate) = self.gate {
            let rx = gate.lock().unwrap();
            let _ = rx.recv();
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.orientation.store(orientation, Ordering::SeqCst);
        let bad = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with("bad"))
            .unwrap_or(false);
        if bad {
            return Err(LoadError::decode(path, "unsupported format"));
        }
        Ok(Frame {
            pixels: vec![0x00ff00; (target.width * target.height) as usize],
            placement: Rect::new(0, 0, target.width, target.height),
            cleared: Vec::new(),
            source_size: target,
        })
    }
}

#[derive(Default)]
pub struct FakeStore {
    files: Mutex<HashMap<PathBuf, Tags>>,
    loads: AtomicUsize,
    writes: AtomicUsize,
    fail: Mutex<bool>,
    fail_loads: AtomicBool,
}

impl FakeStore {
    pub fn seed(&self, path: &str, tag: Tag, value: &str) {
        self.files
            .lock()
            .unwrap()
            .entry(PathBuf::from(path))
            .or_default()
            .insert(tag, value.to_string());
    }

    pub fn get(&self, path: &str, tag: Tag) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(Path::new(path))
            .and_then(|t| t.get(&tag).cloned())
    }

    pub fn fail_writes(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl MetadataStore for FakeStore {
    fn load(&self, path: &Path) -> io::Result<Tags> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(io::Error::other("unreadable"));
        }
        Ok(self.files.lock().unwrap().get(path).cloned().unwrap_or_default())
    }

    fn write(&self, path: &Path, tag: Tag, value: &str) -> Result<(), TagError> {
        if *self.fail.lock().unwrap() {
            return Err(TagError::store_write(path, "read-only"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default()
            .insert(tag, value.to_string());
        Ok(())
    }

    fn delete(&self, path: &Path, tag: Tag) -> Result<(), TagError> {
        if *self.fail.lock().unwrap() {
            return Err(TagError::store_write(path, "read-only"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(tags) = self.files.lock().unwrap().get_mut(path) {
            tags.remove(&tag);
        }
        Ok(())
    }
}
