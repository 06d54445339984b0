//! The uniform in-memory animation produced by both decoding pipelines.

use std::fmt::Display;
use std::num::NonZeroU32;
use std::path::Path;

use crate::error::Error;
use crate::{DecodeOptions, gif, png};

/// Number of repetitions in an animated image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AnimationLoops {
    /// Finite number of repetitions
    Finite(NonZeroU32),
    /// Infinite number of repetitions
    Infinite,
}

impl AnimationLoops {
    /// Maps an on-wire repeat count to a loop count, where zero means
    /// "repeat forever". Both the GIF Netscape extension and the APNG
    /// animation control use this convention.
    pub(crate) fn from_repeat_count(count: u32) -> Self {
        match NonZeroU32::new(count) {
            Some(i) => Self::Finite(i),
            None => Self::Infinite,
        }
    }

    /// Loop count of an image without animation metadata: shown once.
    pub(crate) fn once() -> Self {
        Self::Finite(NonZeroU32::new(1).unwrap())
    }
}

impl Display for AnimationLoops {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnimationLoops::Finite(i) => write!(f, "{i}"),
            AnimationLoops::Infinite => write!(f, "infinite"),
        }
    }
}

/// A single pre-composited animation frame.
///
/// The pixel buffer always covers the full logical canvas, in 8-bit
/// non-premultiplied RGBA, row-major and top-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Pixel data, exactly `width * height * 4` bytes.
    pub rgba: Vec<u8>,
    /// How long the frame stays on screen. Zero for non-animated images.
    pub duration_ms: u32,
}

impl Frame {
    /// The frame's pixels reordered to ARGB, for consumers that want
    /// alpha first.
    pub fn to_argb(&self) -> Vec<u8> {
        self.rgba
            .chunks_exact(4)
            .flat_map(|px| [px[3], px[0], px[1], px[2]])
            .collect()
    }

    /// The frame's pixels with the color channels reversed to BGRA.
    pub fn to_bgra(&self) -> Vec<u8> {
        self.rgba
            .chunks_exact(4)
            .flat_map(|px| [px[2], px[1], px[0], px[3]])
            .collect()
    }
}

/// A decoded image: the logical canvas size, the loop count and an ordered
/// list of ready-to-blit frames.
///
/// Non-animated sources decode to a single frame with a zero duration, so
/// consumers can treat every image as an animation.
#[derive(Debug, Clone)]
pub struct AnimatedImage {
    pub width: u32,
    pub height: u32,
    pub loops: AnimationLoops,
    pub frames: Vec<Frame>,
}

impl AnimatedImage {
    /// Decodes a GIF or PNG byte stream, picking the format from the
    /// leading magic bytes.
    pub fn from_bytes(data: &[u8], options: &DecodeOptions) -> Result<Self, Error> {
        if data.starts_with(&png::SIGNATURE) {
            let parsed = png::PngParsed::from_bytes(data, options)?;
            png::decode(&parsed)
        } else if data.starts_with(b"GIF") {
            let parsed = gif::GifParsed::from_bytes(data)?;
            gif::decode(&parsed, options)
        } else {
            Err(Error::UnknownFormat)
        }
    }

    /// Reads and decodes the file at `path`.
    pub fn from_path(path: impl AsRef<Path>, options: &DecodeOptions) -> Result<Self, Error> {
        Self::from_bytes(&std::fs::read(path)?, options)
    }
}

/// Tracks a position in an animation's frame list across repetitions.
///
/// The caller owns the clock: feed the time elapsed since the last call
/// into [`advance`](Self::advance) and redraw whenever it reports a frame
/// change.
#[derive(Debug, Clone)]
pub struct Playback {
    current: usize,
    elapsed_ms: u32,
    loops: Option<AnimationLoops>,
}

impl Playback {
    pub fn new(animation: &AnimatedImage) -> Self {
        Self {
            current: 0,
            elapsed_ms: 0,
            loops: Some(animation.loops),
        }
    }

    /// Index of the frame currently showing.
    pub fn current_frame(&self) -> usize {
        self.current
    }

    /// Moves the playback clock forward. Returns `Some(true)` when the
    /// current frame changed, `Some(false)` while it keeps showing, and
    /// `None` once the animation has played out its repetitions.
    pub fn advance(&mut self, animation: &AnimatedImage, elapsed_ms: u32) -> Option<bool> {
        let loops = self.loops?;

        self.elapsed_ms += elapsed_ms;
        if self.elapsed_ms <= animation.frames[self.current].duration_ms {
            return Some(false);
        }
        self.elapsed_ms = 0;
        self.current += 1;

        if self.current != animation.frames.len() {
            return Some(true);
        }

        match loops {
            AnimationLoops::Finite(i) => match NonZeroU32::new(i.get() - 1) {
                Some(remaining) => {
                    self.loops = Some(AnimationLoops::Finite(remaining));
                    self.current = 0;
                    Some(true)
                }
                None => {
                    // Stay on the last frame once the repetitions run out.
                    self.current -= 1;
                    self.loops = None;
                    None
                }
            },
            AnimationLoops::Infinite => {
                self.current = 0;
                Some(true)
            }
        }
    }
}
