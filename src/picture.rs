use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::codec::{Codec, FitMode, Frame, Size};
use crate::error::{LoadError, TagError};
use crate::tags::{orientation_of, MetadataStore, Tag, Tags};

// ---------------------------------------------------------------------------
// Load services shared by every picture
// ---------------------------------------------------------------------------

type ReadyFn = Box<dyn Fn(usize) + Send + Sync>;

/// Everything a background load needs: the codec, the tag store, the pool
/// the loads run on, and who to tell when one finishes.
pub struct Loader {
    codec: Arc<dyn Codec>,
    store: Arc<dyn MetadataStore>,
    pool: rayon::ThreadPool,
    fit: FitMode,
    on_ready: Option<ReadyFn>,
}

impl Loader {
    pub fn new(
        codec: Arc<dyn Codec>,
        store: Arc<dyn MetadataStore>,
        threads: usize,
        fit: FitMode,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("load-{i}"))
            .build()?;
        Ok(Self {
            codec,
            store,
            pool,
            fit,
            on_ready: None,
        })
    }

    /// Called with the picture index after every completed load.
    pub fn with_notifier(mut self, f: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_ready = Some(Box::new(f));
        self
    }
}

// ---------------------------------------------------------------------------
// Picture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureState {
    Unloaded,
    Loading,
    Loaded,
    Errored,
}

/// The payload lives inside the state so that it exists iff `Loaded` and
/// the error exists iff `Errored`.
enum LoadState {
    Unloaded,
    Loading,
    Loaded(Arc<Frame>),
    Errored(LoadError),
}

impl LoadState {
    fn kind(&self) -> PictureState {
        match self {
            LoadState::Unloaded => PictureState::Unloaded,
            LoadState::Loading => PictureState::Loading,
            LoadState::Loaded(_) => PictureState::Loaded,
            LoadState::Errored(_) => PictureState::Errored,
        }
    }
}

struct Slot {
    state: LoadState,
    /// Fetched once per session; survives unload.
    tags: Option<Tags>,
}

type SharedSlot = Arc<(Mutex<Slot>, Condvar)>;

/// One image file in the list.
pub struct Picture {
    index: usize,
    path: PathBuf,
    name: String,
    title: String,
    loader: Arc<Loader>,
    shared: SharedSlot,
}

impl Picture {
    pub fn new(path: PathBuf, index: usize, total: usize, loader: Arc<Loader>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let title = format!("{} ({}/{})", name, index + 1, total);
        Self {
            index,
            path,
            name,
            title,
            loader,
            shared: Arc::new((
                Mutex::new(Slot {
                    state: LoadState::Unloaded,
                    tags: None,
                }),
                Condvar::new(),
            )),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.shared.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until no load is in flight and return the guard.
    fn settled(&self) -> MutexGuard<'_, Slot> {
        let (_, cvar) = &*self.shared;
        cvar.wait_while(self.lock(), |slot| matches!(slot.state, LoadState::Loading))
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> PictureState {
        self.lock().state.kind()
    }

    /// Start loading the image for `target` in the background. A picture
    /// that is already loaded is left as is; an in-flight load is waited
    /// for first so that only one is ever outstanding.
    pub fn request_load(&self, target: Size) {
        let mut slot = self.settled();
        if let LoadState::Loaded(_) = slot.state {
            return;
        }
        slot.state = LoadState::Loading;
        let need_tags = slot.tags.is_none();
        drop(slot);

        log::debug!("{} (index {}): loading...", self.name, self.index);
        let shared = Arc::clone(&self.shared);
        let loader = Arc::clone(&self.loader);
        let path = self.path.clone();
        let index = self.index;
        self.loader.pool.spawn(move || {
            load(&shared, &loader, &path, index, target, need_tags);
        });
    }

    /// Wait for any in-flight load, then report how the last one ended.
    pub fn await_ready(&self) -> Result<(), LoadError> {
        match &self.settled().state {
            LoadState::Errored(err) => Err(err.clone()),
            _ => Ok(()),
        }
    }

    /// Drop the payload or error. Tags are kept.
    pub fn unload(&self) {
        if let LoadState::Unloaded = self.lock().state {
            return;
        }
        log::debug!("Unloading {}, index {}", self.name, self.index);
        self.settled().state = LoadState::Unloaded;
    }

    /// Current payload, if loaded. Does not wait.
    pub fn frame(&self) -> Option<Arc<Frame>> {
        match &self.lock().state {
            LoadState::Loaded(frame) => Some(Arc::clone(frame)),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<LoadError> {
        match &self.lock().state {
            LoadState::Errored(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Fill the mirror from the store if no load has managed to yet.
    fn ensure_tags<'a>(&self, slot: &'a mut Slot) -> &'a mut Tags {
        slot.tags.get_or_insert_with(|| {
            self.loader.store.load(&self.path).unwrap_or_else(|e| {
                log::debug!("{}: no metadata: {}", self.name, e);
                Tags::new()
            })
        })
    }

    pub fn tag(&self, tag: Tag) -> Option<String> {
        let mut slot = self.settled();
        self.ensure_tags(&mut slot).get(&tag).cloned()
    }

    /// Validate, persist, then mirror. A failed write leaves the mirror alone.
    pub fn set_tag(&self, tag: Tag, value: &str) -> Result<(), TagError> {
        if tag == Tag::Caption && value.is_empty() {
            return self.delete_tag(tag);
        }
        tag.validate(value)?;
        let mut slot = self.settled();
        let tags = self.ensure_tags(&mut slot);
        self.loader.store.write(&self.path, tag, value)?;
        tags.insert(tag, value.to_string());
        log::debug!("{}: set {} to {:?}", self.name, tag, value);
        Ok(())
    }

    pub fn delete_tag(&self, tag: Tag) -> Result<(), TagError> {
        let mut slot = self.settled();
        let tags = self.ensure_tags(&mut slot);
        if !tags.contains_key(&tag) {
            return Ok(());
        }
        self.loader.store.delete(&self.path, tag)?;
        tags.remove(&tag);
        log::debug!("{}: deleted {}", self.name, tag);
        Ok(())
    }
}

/// Body of one background load. Only this task touches the slot while it
/// is `Loading`.
fn load(
    shared: &SharedSlot,
    loader: &Loader,
    path: &Path,
    index: usize,
    target: Size,
    need_tags: bool,
) {
    let (lock, cvar) = &**shared;

    let fetched = if need_tags {
        match loader.store.load(path) {
            Ok(tags) => Some(tags),
            Err(e) => {
                log::debug!("{} ({}): no metadata: {}", path.display(), index, e);
                None
            }
        }
    } else {
        None
    };
    let orientation = {
        let mut slot = lock.lock().unwrap_or_else(PoisonError::into_inner);
        if fetched.is_some() {
            slot.tags = fetched;
        }
        slot.tags.as_ref().map(orientation_of).unwrap_or(1)
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        loader.codec.decode(path, target, loader.fit, orientation)
    }))
    .unwrap_or_else(|_| Err(LoadError::decode(path, "decoder panicked")));

    {
        let mut slot = lock.lock().unwrap_or_else(PoisonError::into_inner);
        slot.state = match result {
            Ok(frame) => LoadState::Loaded(Arc::new(frame)),
            Err(err) => {
                log::debug!("{} ({}): load failed: {}", path.display(), index, err);
                LoadState::Errored(err)
            }
        };
        cvar.notify_all();
    }

    if let Some(ref notify) = loader.on_ready {
        notify(index);
    }
}
