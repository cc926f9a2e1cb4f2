use std::collections::HashSet;

use crate::codec::Size;
use crate::error::TagError;
use crate::picture::Picture;
use crate::tags::Tag;

/// Orientation reached by rotating 90 degrees clockwise from each state.
const ROTATE: [(&str, &str); 9] = [
    ("", "6"),
    ("1", "6"),
    ("2", "5"),
    ("3", "8"),
    ("4", "7"),
    ("5", "4"),
    ("6", "3"),
    ("7", "2"),
    ("8", "1"),
];

/// Orientation reached by mirroring left to right from each state.
const MIRROR: [(&str, &str); 9] = [
    ("", "2"),
    ("1", "2"),
    ("2", "1"),
    ("3", "4"),
    ("4", "3"),
    ("5", "6"),
    ("6", "5"),
    ("7", "8"),
    ("8", "7"),
];

/// Indices to keep resident: `preload + 1` of them, scanning outward from
/// a point a quarter of the budget ahead of `current` (start, start+1,
/// start-1, start+2, ...), skipping anything outside the list.
pub fn window_indices(current: usize, preload: usize, len: usize) -> Vec<usize> {
    let mut count = preload.saturating_add(1).min(len);
    let mut out = Vec::with_capacity(count);
    // Past the end, the scan only ever yields from the lower side.
    let start = current.saturating_add(preload / 4).min(len) as isize;
    let (mut before, mut after) = (start, start + 1);
    while count > 0 {
        for i in [before, after] {
            if count > 0 && i >= 0 && (i as usize) < len {
                out.push(i as usize);
                count -= 1;
            }
        }
        before -= 1;
        after += 1;
    }
    out
}

// ---------------------------------------------------------------------------
// Window cache
// ---------------------------------------------------------------------------

/// Keeps a bounded window of pictures around the current index loaded.
/// Owned by the controller thread; only picture loads run elsewhere.
pub struct WindowCache {
    pictures: Vec<Picture>,
    current: usize,
    preload: usize,
    target: Size,
    resident: HashSet<usize>,
}

impl WindowCache {
    pub fn new(pictures: Vec<Picture>, preload: usize, target: Size) -> Self {
        Self {
            pictures,
            current: 0,
            preload,
            target,
            resident: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pictures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pictures.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn picture(&self, index: usize) -> Option<&Picture> {
        self.pictures.get(index)
    }

    /// The picture to draw. Call `await_ready` on it first.
    pub fn current_picture(&self) -> Option<&Picture> {
        self.pictures.get(self.current)
    }

    pub fn is_resident(&self, index: usize) -> bool {
        self.resident.contains(&index)
    }

    pub fn resident_indices(&self) -> Vec<usize> {
        let mut v: Vec<usize> = self.resident.iter().copied().collect();
        v.sort_unstable();
        v
    }

    /// Select a picture, clamping to the list. Never waits for the load.
    pub fn set_current_index(&mut self, index: isize) {
        if self.is_empty() {
            return;
        }
        let index = index.clamp(0, self.pictures.len() as isize - 1) as usize;
        if index != self.current {
            log::debug!("[nav] {} -> {} (cached={})", self.current, index, self.is_resident(index));
        }
        self.current = index;
        self.add(index);
        self.recompute_window();
    }

    pub fn step(&mut self, delta: isize) {
        self.set_current_index(self.current as isize + delta);
    }

    /// Bring `resident` in line with the window around the current index.
    /// Stale entries are unloaded before any new load starts.
    pub fn recompute_window(&mut self) {
        let wanted = window_indices(self.current, self.preload, self.pictures.len());
        let stale: Vec<usize> = self
            .resident
            .iter()
            .copied()
            .filter(|i| !wanted.contains(i))
            .collect();
        for index in stale {
            self.remove(index);
        }
        for index in wanted {
            self.add(index);
        }
        log::debug!("cache: current {}, resident {:?}", self.current, self.resident_indices());
    }

    /// Unload everything; cached payloads are sized for the old box.
    pub fn flush(&mut self) {
        let all: Vec<usize> = self.resident.iter().copied().collect();
        for index in all {
            self.remove(index);
        }
    }

    pub fn on_settled_resize(&mut self, size: Size) {
        log::info!(
            "resize from {}x{} to {}x{}",
            self.target.width,
            self.target.height,
            size.width,
            size.height
        );
        self.target = size;
        self.flush();
        self.set_current_index(self.current as isize);
    }

    /// Reload the current picture, e.g. after its orientation changed.
    pub fn redisplay(&mut self) {
        self.remove(self.current);
        self.set_current_index(self.current as isize);
    }

    fn add(&mut self, index: usize) {
        if self.resident.insert(index) {
            self.pictures[index].request_load(self.target);
        }
    }

    fn remove(&mut self, index: usize) {
        if self.resident.remove(&index) {
            self.pictures[index].unload();
        }
    }

    // -----------------------------------------------------------------------
    // Tag commands on the current picture
    // -----------------------------------------------------------------------

    /// Current picture once its load has finished successfully.
    fn ready_current(&self) -> Result<Option<&Picture>, TagError> {
        match self.current_picture() {
            Some(p) => {
                p.await_ready()?;
                Ok(Some(p))
            }
            None => Ok(None),
        }
    }

    /// 0..=5 sets the rating, anything negative clears it.
    pub fn rate(&mut self, rating: i32) -> Result<(), TagError> {
        let Some(p) = self.ready_current()? else { return Ok(()) };
        log::debug!("Set rating of {} to {}", p.name(), rating);
        if rating < 0 {
            p.delete_tag(Tag::Rating)
        } else {
            p.set_tag(Tag::Rating, &rating.to_string())
        }
    }

    pub fn rating(&self) -> Result<Option<u8>, TagError> {
        let Some(p) = self.ready_current()? else { return Ok(None) };
        Ok(p.tag(Tag::Rating).and_then(|r| r.parse().ok()))
    }

    /// An empty caption deletes it.
    pub fn set_caption(&mut self, caption: &str) -> Result<(), TagError> {
        let Some(p) = self.ready_current()? else { return Ok(()) };
        if p.tag(Tag::Caption).as_deref().unwrap_or("") == caption {
            return Ok(());
        }
        log::debug!("{}: update caption to <{}>", p.name(), caption);
        p.set_tag(Tag::Caption, caption)
    }

    pub fn caption(&self) -> Result<String, TagError> {
        let Some(p) = self.ready_current()? else { return Ok(String::new()) };
        Ok(p.tag(Tag::Caption).unwrap_or_default())
    }

    /// "" clears the orientation. The picture is reloaded to show it.
    pub fn set_orientation(&mut self, orientation: &str) -> Result<(), TagError> {
        let Some(p) = self.ready_current()? else { return Ok(()) };
        if orientation.is_empty() {
            p.delete_tag(Tag::Orientation)?;
        } else {
            p.set_tag(Tag::Orientation, orientation)?;
        }
        self.redisplay();
        Ok(())
    }

    pub fn orientation(&self) -> Result<String, TagError> {
        let Some(p) = self.ready_current()? else { return Ok(String::new()) };
        Ok(p.tag(Tag::Orientation).unwrap_or_default())
    }

    pub fn rotate(&mut self) -> Result<(), TagError> {
        self.adjust_orientation(&ROTATE)
    }

    pub fn mirror(&mut self) -> Result<(), TagError> {
        self.adjust_orientation(&MIRROR)
    }

    fn adjust_orientation(&mut self, table: &[(&str, &str)]) -> Result<(), TagError> {
        let current = self.orientation()?;
        let Some(&(_, next)) = table.iter().find(|(from, _)| *from == current) else {
            log::warn!("unknown orientation: {}", current);
            return Ok(());
        };
        log::debug!("old orientation {:?}, new orientation {}", current, next);
        self.set_orientation(next)
    }
}
