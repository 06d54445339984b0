//! Decodes one GIF image block into an RGBA sub-image.

use crate::compositor::{Blend, Disposal, SubImage};
use crate::error::Error;
use crate::gif::lzw::{BitCodeReader, LzwDictionary};
use crate::gif::tokenizer::ImageBlock;

const MAX_CODE_SIZE: u8 = 12;

/// Row schedule of the four interlace passes.
const PASS_OFFSET: [usize; 4] = [0, 4, 2, 1];
const PASS_STRIDE: [usize; 4] = [8, 8, 4, 2];

/// Runs the LZW decode of `image` against its active color table and
/// returns the block as a placed sub-image, ready for the compositor.
pub(crate) fn decode_image_block(
    image: &ImageBlock,
    global_color_table: Option<&[[u8; 3]]>,
) -> Result<SubImage, Error> {
    let color_table = image
        .color_table
        .as_deref()
        .or(global_color_table)
        .ok_or(Error::InvalidFormat("image block without a color table"))?;

    let transparent_index = image
        .graphic_control
        .as_ref()
        .and_then(|control| control.transparent_index);

    let mut rgba = decode_lzw(
        &image.data,
        image.minimum_code_size,
        color_table,
        transparent_index,
        image.width as usize,
        image.height as usize,
    )?;

    if image.interlaced {
        rgba = deinterlace(&rgba, image.width as usize, image.height as usize);
    }

    let control = image.graphic_control.as_ref();
    let delay_cs = control.map_or(0, |c| c.delay_cs);
    Ok(SubImage {
        left: image.left.into(),
        top: image.top.into(),
        width: image.width.into(),
        height: image.height.into(),
        rgba,
        disposal: match control.map_or(0, |c| c.disposal_method) {
            2 => Disposal::Background,
            3 => Disposal::Previous,
            // Unspecified and reserved disposal values behave like "leave".
            _ => Disposal::Keep,
        },
        blend: Blend::PaintOpaque,
        duration_ms: u32::from(delay_cs).saturating_mul(10).max(100),
    })
}

/// Decodes an LZW code stream into `width * height` RGBA pixels.
///
/// Beyond standard LZW this tolerates one producer quirk: a stream whose
/// very first code is a plain color index instead of the clear code
/// decodes as if the clear code had been there.
fn decode_lzw(
    data: &[u8],
    minimum_code_size: u8,
    color_table: &[[u8; 3]],
    transparent_index: Option<u8>,
    width: usize,
    height: usize,
) -> Result<Vec<u8>, Error> {
    if !(2..=8).contains(&minimum_code_size) {
        return Err(Error::InvalidEncoding("minimum LZW code size out of range"));
    }

    let capacity = width * height * 4;
    let mut out = Vec::with_capacity(capacity);
    let mut dictionary = LzwDictionary::new(color_table.len() as u16);
    let mut reader = BitCodeReader::new(data);
    let mut code_size = minimum_code_size + 1;
    let mut previous: Option<u16> = None;
    let mut expect_clear = true;

    loop {
        let code = reader.read_code(code_size);
        if code == dictionary.end_code() {
            break;
        }

        if code == dictionary.clear_code() {
            dictionary.reset();
            code_size = minimum_code_size + 1;
            expect_clear = false;

            // The code after a clear must name an existing sequence; emit
            // it and seed the previous-sequence register.
            let first = reader.read_code(code_size);
            if first == dictionary.end_code() {
                break;
            }
            let sequence = dictionary.sequence(first).ok_or(Error::InvalidEncoding(
                "code after a clear does not name an existing sequence",
            ))?;
            emit(&mut out, capacity, sequence, color_table, transparent_index)?;
            previous = Some(first);
            continue;
        }

        if expect_clear {
            let at_stream_start = reader.bits_consumed() == code_size as usize;
            if at_stream_start && code < dictionary.clear_code() {
                let sequence = dictionary
                    .sequence(code)
                    .ok_or(Error::InvalidEncoding("color index outside the color table"))?;
                emit(&mut out, capacity, sequence, color_table, transparent_index)?;
                previous = Some(code);
                expect_clear = false;
                continue;
            }
            return Err(Error::InvalidEncoding("expected a clear code"));
        }

        let previous_code = previous.ok_or(Error::InvalidEncoding(
            "code stream without a seed sequence",
        ))?;

        if let Some(sequence) = dictionary.sequence(code) {
            let first_index = sequence[0];
            emit(&mut out, capacity, sequence, color_table, transparent_index)?;
            dictionary.append(previous_code, first_index);
            previous = Some(code);
        } else if code == dictionary.code_count() {
            // The code names the entry being defined right now, so its
            // sequence is the previous one extended by its own first
            // index.
            let first_index = dictionary
                .sequence(previous_code)
                .ok_or(Error::InvalidEncoding("code stream without a seed sequence"))?[0];
            let new_code = dictionary.append(previous_code, first_index);
            let sequence = dictionary.sequence(new_code).ok_or(Error::InvalidEncoding(
                "dictionary rejected a new sequence",
            ))?;
            emit(&mut out, capacity, sequence, color_table, transparent_index)?;
            previous = Some(new_code);
        } else {
            return Err(Error::InvalidEncoding("code beyond the dictionary"));
        }

        if dictionary.code_count() == 1 << code_size {
            if code_size < MAX_CODE_SIZE {
                code_size += 1;
            } else {
                // The dictionary is saturated. Nothing new can be defined,
                // so the stream has to clear before the next data code.
                expect_clear = true;
            }
        }
    }

    if out.len() != capacity {
        return Err(Error::InvalidEncoding(
            "pixel count does not match the image dimensions",
        ));
    }
    Ok(out)
}

/// Resolves an index sequence against the color table and appends it to
/// the pixel buffer. The transparent index becomes a fully transparent
/// pixel.
fn emit(
    out: &mut Vec<u8>,
    capacity: usize,
    sequence: &[u8],
    color_table: &[[u8; 3]],
    transparent_index: Option<u8>,
) -> Result<(), Error> {
    if out.len() + sequence.len() * 4 > capacity {
        return Err(Error::InvalidEncoding(
            "more pixels than the image dimensions allow",
        ));
    }

    for &index in sequence {
        if transparent_index == Some(index) {
            out.extend_from_slice(&[0, 0, 0, 0]);
        } else {
            let [r, g, b] = *color_table
                .get(index as usize)
                .ok_or(Error::InvalidEncoding("color index outside the color table"))?;
            out.extend_from_slice(&[r, g, b, 255]);
        }
    }
    Ok(())
}

/// Scatters the rows of a line-sequential buffer into their interlaced
/// positions. A pure permutation of rows; no pixels are synthesized.
fn deinterlace(rgba: &[u8], width: usize, height: usize) -> Vec<u8> {
    let row_len = width * 4;
    let mut out = vec![0u8; rgba.len()];
    let mut line_in = 0;

    for pass in 0..4 {
        let mut line_out = PASS_OFFSET[pass];
        while line_out < height {
            out[line_out * row_len..][..row_len]
                .copy_from_slice(&rgba[line_in * row_len..][..row_len]);
            line_in += 1;
            line_out += PASS_STRIDE[pass];
        }
    }
    out
}
