//! GIF (87a/89a) tokenizing and decoding.

mod decoder;
mod lzw;
mod tokenizer;

pub use tokenizer::{
    ApplicationBlock, Block, GifParsed, GraphicControl, ImageBlock, ScreenDescriptor, TextBlock,
};

use log::{trace, warn};

use crate::animation::{AnimatedImage, AnimationLoops};
use crate::error::Error;
use crate::{DecodeOptions, compositor};

/// Decodes a tokenized GIF into a composited animation.
///
/// The image is animated exactly when a Netscape 2.0 looping extension is
/// present; without one, every image block composites into a single still
/// frame.
pub fn decode(parsed: &GifParsed, options: &DecodeOptions) -> Result<AnimatedImage, Error> {
    let global_color_table = parsed.global_color_table.as_deref();
    let mut animated = false;
    let mut loops = AnimationLoops::once();
    let mut images = Vec::new();

    for block in &parsed.blocks {
        match block {
            Block::Image(image) => {
                images.push(decoder::decode_image_block(image, global_color_table)?);
            }
            Block::Application(app) => {
                if let Some(count) = app.loop_count() {
                    animated = true;
                    loops = AnimationLoops::from_repeat_count(count.into());
                }
            }
            // Comment and plain text blocks carry no pixels.
            Block::Comment(_) | Block::PlainText(_) => {}
        }
    }

    let out = compositor::assemble(
        parsed.screen.width.into(),
        parsed.screen.height.into(),
        background_color(parsed),
        images,
        animated,
        loops,
        options.ignore_background,
    )?;

    trace!(
        "GIF{} decoded: {}x{}, {} frame(s), {} iteration(s)",
        String::from_utf8_lossy(&parsed.version),
        out.width,
        out.height,
        out.frames.len(),
        out.loops
    );
    Ok(out)
}

/// The screen background color, if the descriptor names one. Index zero
/// means "no background".
fn background_color(parsed: &GifParsed) -> Option<[u8; 3]> {
    let index = parsed.screen.background_color_index as usize;
    if index == 0 {
        return None;
    }
    let table = parsed.global_color_table.as_ref()?;
    match table.get(index) {
        Some(color) => Some(*color),
        None => {
            warn!("background color index {index} is outside the global color table");
            None
        }
    }
}
