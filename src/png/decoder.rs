//! Reconstructs RGBA pixels from an inflated PNG pixel stream: filter
//! reversal, sample extraction and color-type normalization, and the
//! seven-pass interlaced layout.

use byteorder_lite::{BigEndian, ByteOrder};
use log::warn;

use crate::error::Error;
use crate::png::parser::{ColorType, Transparency};

/// Pass schedules of the seven-pass interlaced layout.
const ROW_START: [usize; 7] = [0, 0, 4, 0, 2, 0, 1];
const COL_START: [usize; 7] = [0, 4, 0, 2, 0, 1, 0];
const ROW_STEP: [usize; 7] = [8, 8, 8, 4, 4, 2, 2];
const COL_STEP: [usize; 7] = [8, 8, 4, 4, 2, 2, 1];

/// Decodes one inflated pixel stream into `width * height` RGBA pixels.
///
/// Animation frames reuse the default image's bit depth, color type and
/// interlace method with their own dimensions, so those come in
/// separately.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_image(
    data: &[u8],
    width: u32,
    height: u32,
    color_type: ColorType,
    bit_depth: u8,
    interlace: u8,
    palette: Option<&[[u8; 3]]>,
    transparency: Option<&Transparency>,
) -> Result<Vec<u8>, Error> {
    let width = width as usize;
    let height = height as usize;
    match interlace {
        0 => decode_sequential(data, width, height, color_type, bit_depth, palette, transparency),
        1 => decode_interlaced(data, width, height, color_type, bit_depth, palette, transparency),
        _ => Err(Error::UnsupportedFeature("interlace method")),
    }
}

fn decode_sequential(
    data: &[u8],
    width: usize,
    height: usize,
    color_type: ColorType,
    bit_depth: u8,
    palette: Option<&[[u8; 3]]>,
    transparency: Option<&Transparency>,
) -> Result<Vec<u8>, Error> {
    let defiltered = unfilter(data, width, height, color_type, bit_depth)?;
    unpack(&defiltered, width, height, color_type, bit_depth, palette, transparency)
}

/// Bytes in one scanline, excluding the filter byte.
fn bytes_per_line(width: usize, color_type: ColorType, bit_depth: u8) -> usize {
    (width * color_type.samples_per_pixel() * bit_depth as usize).div_ceil(8)
}

/// Reverses the per-scanline filters.
///
/// Filters predict from the byte `bpp` positions back and from the
/// previous scanline, where `bpp` is the pixel size in whole bytes. For
/// depths below eight bits the predictor distance is a single byte.
fn unfilter(
    data: &[u8],
    width: usize,
    height: usize,
    color_type: ColorType,
    bit_depth: u8,
) -> Result<Vec<u8>, Error> {
    let line_len = bytes_per_line(width, color_type, bit_depth);
    let bpp = if bit_depth < 8 {
        1
    } else {
        color_type.samples_per_pixel() * (bit_depth as usize / 8)
    };

    let required = height
        .checked_mul(line_len + 1)
        .ok_or(Error::InvalidFormat("image dimensions overflow"))?;
    if data.len() < required {
        return Err(Error::InputTooShort("filtered pixel data"));
    }

    let mut out = vec![0u8; line_len * height];
    for line in 0..height {
        let filter = data[line * (line_len + 1)];
        let raw = &data[line * (line_len + 1) + 1..][..line_len];

        let (done, rest) = out.split_at_mut(line * line_len);
        let previous = &done[done.len().saturating_sub(line_len)..];
        let current = &mut rest[..line_len];

        for i in 0..line_len {
            let a = if i >= bpp { current[i - bpp] } else { 0 };
            let b = if line > 0 { previous[i] } else { 0 };
            let c = if line > 0 && i >= bpp { previous[i - bpp] } else { 0 };

            current[i] = match filter {
                0 => raw[i],
                1 => raw[i].wrapping_add(a),
                2 => raw[i].wrapping_add(b),
                // The average sum must not wrap; only the final add does.
                3 => raw[i].wrapping_add(((u16::from(a) + u16::from(b)) / 2) as u8),
                4 => raw[i].wrapping_add(paeth(a, b, c)),
                _ => return Err(Error::InvalidEncoding("unknown scanline filter type")),
            };
        }
    }
    Ok(out)
}

/// The three-neighbor predictor of filter type 4: picks whichever of
/// left, up and up-left is closest to `a + b - c`.
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (ia, ib, ic) = (i16::from(a), i16::from(b), i16::from(c));
    let p = ia + ib - ic;
    let pa = (p - ia).abs();
    let pb = (p - ib).abs();
    let pc = (p - ic).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Walks the samples of one defiltered scanline. Sub-byte samples are
/// packed most significant bit first; 16-bit samples are big-endian.
struct Samples<'a> {
    data: &'a [u8],
    bit_depth: u8,
    position_bits: usize,
}

impl<'a> Samples<'a> {
    fn new(data: &'a [u8], bit_depth: u8) -> Self {
        Self {
            data,
            bit_depth,
            position_bits: 0,
        }
    }

    fn next(&mut self) -> u16 {
        let byte = self.position_bits / 8;
        let value = match self.bit_depth {
            16 => BigEndian::read_u16(&self.data[byte..]),
            8 => u16::from(self.data[byte]),
            depth => {
                let bit = self.position_bits % 8;
                u16::from((self.data[byte] << bit) >> (8 - depth))
            }
        };
        self.position_bits += self.bit_depth as usize;
        value
    }
}

/// Largest sample value at the given depth; doubles as "fully opaque".
fn sample_max(bit_depth: u8) -> u16 {
    if bit_depth == 16 {
        u16::MAX
    } else {
        (1 << bit_depth) - 1
    }
}

/// Scales a sample to 8 bits. Indexed images skip this; their samples are
/// palette positions, not intensities.
fn scale_to_8(value: u16, bit_depth: u8) -> u8 {
    match bit_depth {
        16 => ((u32::from(value) * 255 + 32768) / 65535) as u8,
        8 => value as u8,
        depth => (u32::from(value) * 255 / ((1u32 << depth) - 1)) as u8,
    }
}

/// Converts a defiltered sample stream into 8-bit RGBA, applying the
/// palette and transparency data of the color type.
fn unpack(
    data: &[u8],
    width: usize,
    height: usize,
    color_type: ColorType,
    bit_depth: u8,
    palette: Option<&[[u8; 3]]>,
    transparency: Option<&Transparency>,
) -> Result<Vec<u8>, Error> {
    let line_len = bytes_per_line(width, color_type, bit_depth);
    let opaque = sample_max(bit_depth);
    let mut out = Vec::with_capacity(width * height * 4);

    let palette = match color_type {
        ColorType::Indexed => {
            Some(palette.ok_or(Error::InvalidFormat("indexed image without a palette"))?)
        }
        _ => None,
    };

    for line in 0..height {
        let mut samples = Samples::new(&data[line * line_len..][..line_len], bit_depth);
        for _ in 0..width {
            match color_type {
                ColorType::Grayscale => {
                    let gray = samples.next();
                    let alpha = match transparency {
                        Some(Transparency::Gray(key)) if *key == gray => 0,
                        _ => opaque,
                    };
                    push_scaled(&mut out, [gray, gray, gray, alpha], bit_depth);
                }
                ColorType::Truecolor => {
                    let (r, g, b) = (samples.next(), samples.next(), samples.next());
                    let alpha = match transparency {
                        Some(Transparency::Rgb(kr, kg, kb)) if (*kr, *kg, *kb) == (r, g, b) => 0,
                        _ => opaque,
                    };
                    push_scaled(&mut out, [r, g, b, alpha], bit_depth);
                }
                ColorType::Indexed => {
                    let index = samples.next() as usize;
                    match palette.unwrap().get(index) {
                        Some(&[r, g, b]) => {
                            let alpha = match transparency {
                                Some(Transparency::Indexed(entries)) => {
                                    entries.get(index).copied().unwrap_or(255)
                                }
                                _ => 255,
                            };
                            out.extend_from_slice(&[r, g, b, alpha]);
                        }
                        None => {
                            warn!("palette index {index} is outside the palette");
                            out.extend_from_slice(&[0, 0, 0, 0]);
                        }
                    }
                }
                ColorType::GrayscaleAlpha => {
                    let (gray, alpha) = (samples.next(), samples.next());
                    push_scaled(&mut out, [gray, gray, gray, alpha], bit_depth);
                }
                ColorType::TruecolorAlpha => {
                    let (r, g, b, a) =
                        (samples.next(), samples.next(), samples.next(), samples.next());
                    push_scaled(&mut out, [r, g, b, a], bit_depth);
                }
            }
        }
    }
    Ok(out)
}

fn push_scaled(out: &mut Vec<u8>, pixel: [u16; 4], bit_depth: u8) {
    for sample in pixel {
        out.push(scale_to_8(sample, bit_depth));
    }
}

/// Decodes the seven concatenated reduced images and scatters their
/// pixels onto the canvas. Each pass carries its own filter state,
/// starting from an implied zero scanline.
fn decode_interlaced(
    data: &[u8],
    width: usize,
    height: usize,
    color_type: ColorType,
    bit_depth: u8,
    palette: Option<&[[u8; 3]]>,
    transparency: Option<&Transparency>,
) -> Result<Vec<u8>, Error> {
    let canvas_len = width
        .checked_mul(height)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or(Error::InvalidFormat("image dimensions overflow"))?;
    let mut out = vec![0u8; canvas_len];
    let mut offset = 0;

    for pass in 0..7 {
        if width <= COL_START[pass] || height <= ROW_START[pass] {
            continue;
        }
        let reduced_width = (width - COL_START[pass]).div_ceil(COL_STEP[pass]);
        let reduced_height = (height - ROW_START[pass]).div_ceil(ROW_STEP[pass]);

        let pass_len = reduced_height
            .checked_mul(bytes_per_line(reduced_width, color_type, bit_depth) + 1)
            .ok_or(Error::InvalidFormat("image dimensions overflow"))?;
        let pass_data = data
            .get(offset..offset + pass_len)
            .ok_or(Error::InputTooShort("interlaced pixel data"))?;
        offset += pass_len;

        let reduced = decode_sequential(
            pass_data,
            reduced_width,
            reduced_height,
            color_type,
            bit_depth,
            palette,
            transparency,
        )?;

        for reduced_row in 0..reduced_height {
            for reduced_col in 0..reduced_width {
                let row = ROW_START[pass] + reduced_row * ROW_STEP[pass];
                let col = COL_START[pass] + reduced_col * COL_STEP[pass];
                let src = (reduced_row * reduced_width + reduced_col) * 4;
                let dst = (row * width + col) * 4;
                out[dst..dst + 4].copy_from_slice(&reduced[src..src + 4]);
            }
        }
    }
    Ok(out)
}
