//! Decoding of GIF (87a/89a, including animations) and PNG (including
//! APNG) into one uniform representation: a sequence of pre-composited
//! RGBA frames with per-frame durations.
//!
//! Display code, exporters and converters get a ready-to-blit
//! [`AnimatedImage`] regardless of which container was read:
//!
//! ```no_run
//! use pngif::{AnimatedImage, DecodeOptions};
//!
//! let bytes = std::fs::read("loading.gif")?;
//! let image = AnimatedImage::from_bytes(&bytes, &DecodeOptions::default())?;
//! for frame in &image.frames {
//!     // frame.rgba covers the full canvas, frame.duration_ms says how
//!     // long to show it.
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Both pipelines are implemented here, from the GIF LZW code stream and
//! the PNG filter/interlace reconstruction up to the shared disposal and
//! blend state machine that turns per-frame deltas into full-canvas
//! frames. Only zlib inflation is delegated, to `miniz_oxide`.

mod animation;
mod compositor;
mod error;
pub mod gif;
pub mod png;

pub use animation::{AnimatedImage, AnimationLoops, Frame, Playback};
pub use error::Error;

/// Knobs for the decoding pipelines.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Make the GIF pipeline behave like a browser: the first frame is not
    /// initialized with the background color, and a "restore to
    /// background" disposal clears the canvas to full transparency instead
    /// of the background color. Goes against the GIF87a wording, but
    /// matches what modern viewers do.
    pub ignore_background: bool,
    /// Whether a PNG chunk whose CRC does not match is fatal. When false
    /// the mismatch is logged and the chunk is used as-is.
    pub fail_on_crc: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            ignore_background: false,
            fail_on_crc: true,
        }
    }
}
