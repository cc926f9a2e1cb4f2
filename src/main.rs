mod cache;
mod cli;
mod codec;
mod debounce;
mod error;
mod files;
mod picture;
mod tags;
#[cfg(test)]
mod testutil;
mod ui;

use clap::Parser;
use std::sync::{Arc, Mutex};
use winit::event_loop::EventLoop;

use crate::cache::WindowCache;
use crate::cli::Cli;
use crate::codec::{FitMode, ImageCodec, Size};
use crate::debounce::{EventFilter, Output, QUIET_TICKS, TICK};
use crate::files::collect_images;
use crate::picture::{Loader, Picture};
use crate::tags::{EmbeddedStore, MetadataStore, SidecarStore};
use crate::ui::{App, UserEvent};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let files = collect_images(&cli.paths, cli.recursive);
    if files.is_empty() {
        log::error!("No image files found.");
        return;
    }
    let preload = cli.preload_count();
    log::info!("{} files in total, preload = {}", files.len(), preload);

    let event_loop = EventLoop::<UserEvent>::with_user_event()
        .build()
        .expect("create event loop");
    let proxy = event_loop.create_proxy();

    let store: Arc<dyn MetadataStore> = if cli.sidecar {
        Arc::new(SidecarStore)
    } else {
        Arc::new(EmbeddedStore::default())
    };
    let fit = if cli.fit { FitMode::Fill } else { FitMode::ShrinkOnly };
    let num_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(2, 16);

    // Wake the UI when a load finishes.
    let ready_proxy = Mutex::new(proxy.clone());
    let loader = Loader::new(Arc::new(ImageCodec), store, num_threads, fit)
        .expect("create load pool")
        .with_notifier(move |idx| {
            if let Ok(proxy) = ready_proxy.lock() {
                let _ = proxy.send_event(UserEvent::ImageReady(idx));
            }
        });
    let loader = Arc::new(loader);

    let total = files.len();
    let pictures = files
        .into_iter()
        .enumerate()
        .map(|(i, path)| Picture::new(path, i, total, Arc::clone(&loader)))
        .collect();
    let initial_size = Size::new(cli.width, cli.height);
    let cache = WindowCache::new(pictures, preload, initial_size);

    // Raw resizes and key commands pass through the debouncing filter
    // before they reach the event loop.
    let filter = EventFilter::spawn(TICK, QUIET_TICKS, move |out| {
        let ev = match out {
            Output::Resized(size) => UserEvent::Resized(size),
            Output::Event(cmd) => UserEvent::Command(cmd),
        };
        proxy.send_event(ev).is_ok()
    });

    let mut app = App::new(cache, filter, initial_size, cli.fullscreen);

    event_loop.run_app(&mut app).expect("run event loop");
}
