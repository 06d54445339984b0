//! Turns a sequence of decoded sub-images into full-canvas frames.
//!
//! Both pipelines feed this module: a GIF contributes one sub-image per
//! image block, an APNG one per frame control. The compositor keeps a
//! single canvas, paints each sub-image onto a working copy, emits the
//! copy as a frame and then prepares the canvas for the next step
//! according to the sub-image's disposal rule.

use log::trace;

use crate::animation::{AnimatedImage, AnimationLoops, Frame};
use crate::error::Error;

/// Rule applied to the canvas after a frame has been shown, preparing it
/// for the next frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Disposal {
    /// The canvas keeps the emitted frame.
    Keep,
    /// The canvas is reset to the background fill.
    Background,
    /// The canvas is restored to its state before the frame was drawn.
    Previous,
}

/// How a sub-image's pixels combine with the canvas.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Blend {
    /// Paint only pixels that are not fully transparent. A transparent
    /// pixel never clears previously drawn content, which is how GIF
    /// treats the transparent color index.
    PaintOpaque,
    /// Copy every source pixel, transparency included.
    Source,
    /// Alpha-blend the source over the canvas. The canvas alpha is left
    /// unchanged; accumulated transparency is not tracked.
    Over,
}

/// One decoded sub-image, placed on the logical canvas, together with the
/// parameters the compositor needs.
pub(crate) struct SubImage {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    /// `width * height * 4` bytes of RGBA.
    pub rgba: Vec<u8>,
    pub disposal: Disposal,
    pub blend: Blend,
    pub duration_ms: u32,
}

/// Composes `images` in order into a list of full-canvas frames.
///
/// `background` is the GIF background color, if any; PNG passes `None`.
/// When `animated` is false all sub-images collapse into one frame with a
/// zero duration, each painted with a source blend regardless of its own
/// blend mode.
pub(crate) fn assemble(
    width: u32,
    height: u32,
    background: Option<[u8; 3]>,
    images: Vec<SubImage>,
    animated: bool,
    loops: AnimationLoops,
    ignore_background: bool,
) -> Result<AnimatedImage, Error> {
    if images.is_empty() {
        return Err(Error::InvalidFormat("image contains no pixel data"));
    }

    let canvas_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or(Error::InvalidFormat("canvas dimensions overflow"))?;
    let mut canvas = vec![0u8; canvas_len];
    fill_background(&mut canvas, background, ignore_background);

    if !animated {
        for image in &images {
            check_bounds(image, width, height)?;
            draw(&mut canvas, image, width, Blend::Source);
        }
        return Ok(AnimatedImage {
            width,
            height,
            loops,
            frames: vec![Frame {
                rgba: canvas,
                duration_ms: 0,
            }],
        });
    }

    let mut frames = Vec::with_capacity(images.len());
    for (index, image) in images.iter().enumerate() {
        check_bounds(image, width, height)?;

        let mut composed = canvas.clone();
        draw(&mut composed, image, width, image.blend);

        trace!(
            "frame {index}: {}x{} at ({}, {}), {:?}/{:?}, {} ms",
            image.width,
            image.height,
            image.left,
            image.top,
            image.blend,
            image.disposal,
            image.duration_ms
        );

        match image.disposal {
            Disposal::Keep => {
                frames.push(Frame {
                    rgba: composed.clone(),
                    duration_ms: image.duration_ms,
                });
                canvas = composed;
            }
            Disposal::Background => {
                frames.push(Frame {
                    rgba: composed,
                    duration_ms: image.duration_ms,
                });
                fill_background(&mut canvas, background, ignore_background);
            }
            // The canvas was never touched, so it already holds the state
            // from before this frame.
            Disposal::Previous => frames.push(Frame {
                rgba: composed,
                duration_ms: image.duration_ms,
            }),
        }
    }

    Ok(AnimatedImage {
        width,
        height,
        loops,
        frames,
    })
}

fn fill_background(canvas: &mut [u8], background: Option<[u8; 3]>, ignore_background: bool) {
    match background {
        Some([r, g, b]) if !ignore_background => {
            for pixel in canvas.chunks_exact_mut(4) {
                pixel.copy_from_slice(&[r, g, b, 255]);
            }
        }
        _ => canvas.fill(0),
    }
}

fn check_bounds(image: &SubImage, width: u32, height: u32) -> Result<(), Error> {
    let right = image.left.checked_add(image.width);
    let bottom = image.top.checked_add(image.height);
    match (right, bottom) {
        (Some(r), Some(b)) if r <= width && b <= height => Ok(()),
        _ => Err(Error::InvalidFormat("sub-image exceeds canvas bounds")),
    }
}

fn draw(canvas: &mut [u8], image: &SubImage, canvas_width: u32, blend: Blend) {
    let canvas_width = canvas_width as usize;
    let row_len = image.width as usize * 4;

    for (line, row) in image.rgba.chunks_exact(row_len).enumerate() {
        let start = ((image.top as usize + line) * canvas_width + image.left as usize) * 4;
        let dest = &mut canvas[start..start + row_len];

        match blend {
            Blend::Source => dest.copy_from_slice(row),
            Blend::PaintOpaque => {
                for (dst, src) in dest.chunks_exact_mut(4).zip(row.chunks_exact(4)) {
                    if src[3] != 0 {
                        dst.copy_from_slice(src);
                    }
                }
            }
            Blend::Over => {
                for (dst, src) in dest.chunks_exact_mut(4).zip(row.chunks_exact(4)) {
                    match src[3] {
                        255 => dst.copy_from_slice(src),
                        0 => {}
                        alpha => {
                            let a = alpha as u32;
                            for channel in 0..3 {
                                dst[channel] = ((src[channel] as u32 * a
                                    + dst[channel] as u32 * (255 - a))
                                    / 255) as u8;
                            }
                        }
                    }
                }
            }
        }
    }
}
