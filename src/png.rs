//! PNG and APNG tokenizing and decoding.

mod chunks;
mod decoder;
mod parser;

pub use chunks::SIGNATURE;
pub use parser::{
    Animation, AnimationFrame, ColorType, FrameControl, Header, PngParsed, Transparency,
};

use log::trace;

use crate::animation::{AnimatedImage, AnimationLoops, Frame};
use crate::compositor::{self, Blend, Disposal, SubImage};
use crate::error::Error;

/// Decodes a parsed PNG into a composited animation.
///
/// A plain PNG becomes a single zero-duration frame. An APNG runs every
/// frame through the shared compositor; when the container marks the
/// default image as the animation's first frame, the already-decoded
/// default pixels are reused for it.
pub fn decode(parsed: &PngParsed) -> Result<AnimatedImage, Error> {
    let header = &parsed.header;
    let palette = parsed.palette.as_deref();
    let transparency = parsed.transparency.as_ref();

    let default_image = decoder::decode_image(
        &parsed.data,
        header.width,
        header.height,
        header.color_type,
        header.bit_depth,
        header.interlace,
        palette,
        transparency,
    )?;

    let Some(animation) = &parsed.animation else {
        trace!(
            "PNG decoded: {}x{}, {:?} depth {}",
            header.width, header.height, header.color_type, header.bit_depth
        );
        return Ok(AnimatedImage {
            width: header.width,
            height: header.height,
            loops: AnimationLoops::once(),
            frames: vec![Frame {
                rgba: default_image,
                duration_ms: 0,
            }],
        });
    };

    let mut images = Vec::with_capacity(animation.frames.len());
    for (index, frame) in animation.frames.iter().enumerate() {
        let control = &frame.control;
        let reuse_default = index == 0 && animation.default_image_is_first_frame;

        let (rgba, width, height, left, top) = if reuse_default {
            // The default image always spans the whole canvas.
            (
                default_image.clone(),
                header.width,
                header.height,
                0,
                0,
            )
        } else {
            let rgba = decoder::decode_image(
                &frame.data,
                control.width,
                control.height,
                header.color_type,
                header.bit_depth,
                header.interlace,
                palette,
                transparency,
            )?;
            (
                rgba,
                control.width,
                control.height,
                control.x_offset,
                control.y_offset,
            )
        };

        images.push(SubImage {
            left,
            top,
            width,
            height,
            rgba,
            disposal: match control.dispose {
                1 => Disposal::Background,
                2 => Disposal::Previous,
                _ => Disposal::Keep,
            },
            blend: match control.blend {
                1 => Blend::Over,
                _ => Blend::Source,
            },
            duration_ms: frame_duration_ms(control),
        });
    }

    let out = compositor::assemble(
        header.width,
        header.height,
        None,
        images,
        true,
        AnimationLoops::from_repeat_count(animation.num_plays),
        false,
    )?;

    trace!(
        "APNG decoded: {}x{}, {} frame(s), {} iteration(s)",
        out.width,
        out.height,
        out.frames.len(),
        out.loops
    );
    Ok(out)
}

/// Frame delay in milliseconds. A zero denominator reads as 100, making
/// the numerator centiseconds.
fn frame_duration_ms(control: &FrameControl) -> u32 {
    let denominator = if control.delay_den == 0 {
        100
    } else {
        u32::from(control.delay_den)
    };
    u32::from(control.delay_num) * 1000 / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(delay_num: u16, delay_den: u16) -> FrameControl {
        FrameControl {
            width: 1,
            height: 1,
            x_offset: 0,
            y_offset: 0,
            delay_num,
            delay_den,
            dispose: 0,
            blend: 0,
        }
    }

    #[test]
    fn zero_delay_denominator_reads_as_one_hundred() {
        assert_eq!(frame_duration_ms(&control(1, 0)), frame_duration_ms(&control(1, 100)));
        assert_eq!(frame_duration_ms(&control(3, 0)), 30);
    }

    #[test]
    fn delay_is_a_rational_in_seconds() {
        assert_eq!(frame_duration_ms(&control(1, 10)), 100);
        assert_eq!(frame_duration_ms(&control(2, 1)), 2000);
        assert_eq!(frame_duration_ms(&control(1, 3)), 333);
    }
}
