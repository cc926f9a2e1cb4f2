use std::sync::mpsc::{self, RecvTimeoutError, SendError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::codec::Size;

/// Period of the settle timer.
pub const TICK: Duration = Duration::from_millis(50);
/// Ticks without a new raw size before a resize counts as settled (250 ms).
pub const QUIET_TICKS: u32 = 5;

// ---------------------------------------------------------------------------
// Debouncer state machine
// ---------------------------------------------------------------------------

/// Collapses a burst of raw sizes into the last one, once the burst has
/// been quiet for `quiet_ticks` timer ticks.
#[derive(Debug)]
pub struct ResizeDebouncer {
    quiet_ticks: u32,
    pending: Option<Size>,
    countdown: u32,
}

impl Default for ResizeDebouncer {
    fn default() -> Self {
        Self::new(QUIET_TICKS)
    }
}

impl ResizeDebouncer {
    pub fn new(quiet_ticks: u32) -> Self {
        Self {
            quiet_ticks: quiet_ticks.max(1),
            pending: None,
            countdown: 0,
        }
    }

    pub fn raw_resize(&mut self, size: Size) {
        self.pending = Some(size);
        self.countdown = self.quiet_ticks;
    }

    /// Advance the timer; returns the settled size on the tick the
    /// countdown runs out.
    pub fn tick(&mut self) -> Option<Size> {
        if self.pending.is_none() {
            return None;
        }
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown == 0 {
            self.pending.take()
        } else {
            None
        }
    }

    /// Settle now, whatever the countdown says.
    pub fn take_pending(&mut self) -> Option<Size> {
        self.countdown = 0;
        self.pending.take()
    }
}

// ---------------------------------------------------------------------------
// Event filter thread
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum Input<T> {
    Resize(Size),
    Event(T),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Output<T> {
    Resized(Size),
    Event(T),
}

/// Sending side of a running event filter. Dropping it stops the thread
/// after any pending resize is flushed.
pub struct EventFilter<T> {
    tx: Sender<Input<T>>,
}

impl<T: Send + 'static> EventFilter<T> {
    /// Spawn the filter thread. Raw resizes are debounced; every other event
    /// is forwarded at once, and a resize still pending is emitted
    /// immediately before it. `emit` returning false stops the thread.
    pub fn spawn<F>(tick: Duration, quiet_ticks: u32, mut emit: F) -> Self
    where
        F: FnMut(Output<T>) -> bool + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Input<T>>();
        thread::spawn(move || {
            let mut debouncer = ResizeDebouncer::new(quiet_ticks);
            let mut next_tick = Instant::now() + tick;
            loop {
                let timeout = next_tick.saturating_duration_since(Instant::now());
                match rx.recv_timeout(timeout) {
                    Ok(Input::Resize(size)) => debouncer.raw_resize(size),
                    Ok(Input::Event(ev)) => {
                        if let Some(size) = debouncer.take_pending() {
                            log::debug!("resize flushed early: {}x{}", size.width, size.height);
                            if !emit(Output::Resized(size)) {
                                return;
                            }
                        }
                        if !emit(Output::Event(ev)) {
                            return;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        next_tick += tick;
                        if let Some(size) = debouncer.tick() {
                            log::debug!("resize settled: {}x{}", size.width, size.height);
                            if !emit(Output::Resized(size)) {
                                return;
                            }
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        if let Some(size) = debouncer.take_pending() {
                            emit(Output::Resized(size));
                        }
                        return;
                    }
                }
            }
        });
        Self { tx }
    }

    pub fn resize(&self, size: Size) -> Result<(), SendError<Input<T>>> {
        self.tx.send(Input::Resize(size))
    }

    pub fn forward(&self, ev: T) -> Result<(), SendError<Input<T>>> {
        self.tx.send(Input::Event(ev))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::Receiver;

    fn sq(n: u32) -> Size {
        Size::new(n, n)
    }

    fn spawn_filter() -> (EventFilter<char>, Receiver<Output<char>>) {
        let (out_tx, out_rx) = mpsc::channel();
        let filter = EventFilter::spawn(Duration::from_millis(10), QUIET_TICKS, move |out| {
            out_tx.send(out).is_ok()
        });
        (filter, out_rx)
    }

    #[test]
    fn burst_collapses_to_last_size() {
        let mut d = ResizeDebouncer::new(5);
        for n in [100, 105, 110, 108, 112] {
            d.raw_resize(sq(n));
            assert_eq!(d.tick(), None);
        }
        let fired: Vec<_> = (0..10).filter_map(|_| d.tick()).collect();
        assert_eq!(fired, vec![sq(112)]);
        assert_eq!(d.take_pending(), None);
    }

    #[test]
    fn fires_on_the_nth_quiet_tick() {
        let mut d = ResizeDebouncer::new(4);
        d.raw_resize(sq(50));
        assert_eq!(d.tick(), None);
        assert_eq!(d.tick(), None);
        assert_eq!(d.tick(), None);
        assert_eq!(d.tick(), Some(sq(50)));
        assert_eq!(d.tick(), None);
    }

    #[test]
    fn new_size_restarts_countdown() {
        let mut d = ResizeDebouncer::new(3);
        d.raw_resize(sq(1));
        d.tick();
        d.tick();
        d.raw_resize(sq(2));
        assert_eq!(d.tick(), None);
        assert_eq!(d.tick(), None);
        assert_eq!(d.tick(), Some(sq(2)));
    }

    #[test]
    fn idle_ticks_fire_nothing() {
        let mut d = ResizeDebouncer::default();
        assert!((0..20).all(|_| d.tick().is_none()));
        assert_eq!(d.take_pending(), None);
    }

    #[test]
    fn filter_emits_one_settled_resize() {
        let (filter, out) = spawn_filter();
        for n in [100, 105, 110, 108, 112] {
            filter.resize(sq(n)).unwrap();
        }
        assert_eq!(out.recv_timeout(Duration::from_secs(2)), Ok(Output::Resized(sq(112))));
        assert!(out.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn filter_flushes_resize_before_event() {
        let (filter, out) = spawn_filter();
        filter.resize(sq(300)).unwrap();
        filter.forward('n').unwrap();
        filter.forward('p').unwrap();
        let wait = Duration::from_secs(2);
        assert_eq!(out.recv_timeout(wait), Ok(Output::Resized(sq(300))));
        assert_eq!(out.recv_timeout(wait), Ok(Output::Event('n')));
        assert_eq!(out.recv_timeout(wait), Ok(Output::Event('p')));
        assert!(out.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn filter_flushes_on_disconnect() {
        let (filter, out) = spawn_filter();
        filter.resize(sq(7)).unwrap();
        drop(filter);
        assert_eq!(out.recv_timeout(Duration::from_secs(2)), Ok(Output::Resized(sq(7))));
    }
}
