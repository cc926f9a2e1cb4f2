use clap::Parser;

pub const HELP_KEYS: &str = "\
Key Bindings:
  Right / Space / n     : Next image
  Left / Backspace / p  : Previous image
  Down / PageDown       : Forward 10 images
  Up / PageUp           : Back 10 images
  Home / End            : First / last image
  0 - 5                 : Set rating
  -                     : Clear rating
  r                     : Rotate 90 degrees clockwise
  m                     : Mirror
  c                     : Edit caption (Enter saves, Esc cancels)
  f                     : Toggle fullscreen
  q / Esc               : Quit
";

#[derive(Parser)]
#[command(name = "ptag", about = "View, rate and caption photos", after_help = HELP_KEYS)]
pub struct Cli {
    /// Files or directories to view (default: *.jpg, *.jpeg, *.tif, *.tiff here)
    pub paths: Vec<std::path::PathBuf>,

    /// Recurse into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Number of images to keep loaded besides the current one.
    /// Default: number of CPUs, capped by --max-preload.
    #[arg(short, long)]
    pub preload: Option<usize>,

    /// Cap for the default preload count
    #[arg(long, default_value = "10")]
    pub max_preload: usize,

    /// Initial window width
    #[arg(long, default_value = "800")]
    pub width: u32,

    /// Initial window height
    #[arg(long, default_value = "600")]
    pub height: u32,

    /// Rescale images to fill the window (default: only shrink large images)
    #[arg(long)]
    pub fit: bool,

    /// Keep tags in a <file>.exif sidecar instead of inside the image
    #[arg(long)]
    pub sidecar: bool,

    /// Start fullscreen
    #[arg(long)]
    pub fullscreen: bool,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn preload_count(&self) -> usize {
        self.preload.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .min(self.max_preload)
        })
    }
}
