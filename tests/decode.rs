//! Whole-file decoding scenarios over handcrafted GIF and PNG streams.

use std::num::NonZeroU32;

use pngif::{AnimatedImage, AnimationLoops, DecodeOptions, Error, gif, png};

fn once() -> AnimationLoops {
    AnimationLoops::Finite(NonZeroU32::new(1).unwrap())
}

/// Packs LZW codes into the little-endian bit stream GIF stores.
fn pack_codes(codes: &[(u16, u8)]) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut acc = 0u32;
    let mut bits = 0;
    for &(code, width) in codes {
        acc |= u32::from(code) << bits;
        bits += width;
        while bits >= 8 {
            bytes.push(acc as u8);
            acc >>= 8;
            bits -= 8;
        }
    }
    if bits > 0 {
        bytes.push(acc as u8);
    }
    bytes
}

struct GifBuilder {
    bytes: Vec<u8>,
}

impl GifBuilder {
    /// Starts a GIF with a global color table, which must be a power of
    /// two entries long.
    fn new(width: u16, height: u16, palette: &[[u8; 3]], background_index: u8) -> Self {
        let mut bytes = b"GIF89a".to_vec();
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.push(0x80 | (palette.len().trailing_zeros() as u8 - 1));
        bytes.push(background_index);
        bytes.push(0);
        for color in palette {
            bytes.extend_from_slice(color);
        }
        Self { bytes }
    }

    fn netscape_loop(mut self, count: u16) -> Self {
        self.bytes.extend_from_slice(&[0x21, 0xFF, 11]);
        self.bytes.extend_from_slice(b"NETSCAPE2.0");
        self.bytes.extend_from_slice(&[3, 1]);
        self.bytes.extend_from_slice(&count.to_le_bytes());
        self.bytes.push(0);
        self
    }

    fn graphic_control(mut self, disposal: u8, delay_cs: u16, transparent: Option<u8>) -> Self {
        let packed = (disposal << 2) | u8::from(transparent.is_some());
        self.bytes.extend_from_slice(&[0x21, 0xF9, 4, packed]);
        self.bytes.extend_from_slice(&delay_cs.to_le_bytes());
        self.bytes.push(transparent.unwrap_or(0));
        self.bytes.push(0);
        self
    }

    fn image(
        mut self,
        left: u16,
        top: u16,
        width: u16,
        height: u16,
        interlaced: bool,
        minimum_code_size: u8,
        codes: &[(u16, u8)],
    ) -> Self {
        self.bytes.push(0x2C);
        for value in [left, top, width, height] {
            self.bytes.extend_from_slice(&value.to_le_bytes());
        }
        self.bytes.push(if interlaced { 0x40 } else { 0 });
        self.bytes.push(minimum_code_size);
        for block in pack_codes(codes).chunks(255) {
            self.bytes.push(block.len() as u8);
            self.bytes.extend_from_slice(block);
        }
        self.bytes.push(0);
        self
    }

    fn build(mut self) -> Vec<u8> {
        self.bytes.push(0x3B);
        self.bytes
    }
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in bytes {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                0xEDB8_8320 ^ (crc >> 1)
            } else {
                crc >> 1
            };
        }
    }
    crc ^ 0xFFFF_FFFF
}

fn chunk(chunk_type: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(data.len() as u32).to_be_bytes());
    bytes.extend_from_slice(chunk_type);
    bytes.extend_from_slice(data);
    let mut checked = chunk_type.to_vec();
    checked.extend_from_slice(data);
    bytes.extend_from_slice(&crc32(&checked).to_be_bytes());
    bytes
}

fn ihdr(width: u32, height: u32, bit_depth: u8, color_type: u8) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&[bit_depth, color_type, 0, 0, 0]);
    chunk(b"IHDR", &data)
}

fn actl(num_frames: u32, num_plays: u32) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&num_frames.to_be_bytes());
    data.extend_from_slice(&num_plays.to_be_bytes());
    chunk(b"acTL", &data)
}

#[allow(clippy::too_many_arguments)]
fn fctl(
    sequence: u32,
    width: u32,
    height: u32,
    x_offset: u32,
    y_offset: u32,
    delay: (u16, u16),
    dispose: u8,
    blend: u8,
) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&sequence.to_be_bytes());
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&x_offset.to_be_bytes());
    data.extend_from_slice(&y_offset.to_be_bytes());
    data.extend_from_slice(&delay.0.to_be_bytes());
    data.extend_from_slice(&delay.1.to_be_bytes());
    data.extend_from_slice(&[dispose, blend]);
    chunk(b"fcTL", &data)
}

fn idat(raw: &[u8]) -> Vec<u8> {
    chunk(b"IDAT", &miniz_oxide::deflate::compress_to_vec_zlib(raw, 6))
}

fn fdat(sequence: u32, raw: &[u8]) -> Vec<u8> {
    let mut data = sequence.to_be_bytes().to_vec();
    data.extend_from_slice(&miniz_oxide::deflate::compress_to_vec_zlib(raw, 6));
    chunk(b"fdAT", &data)
}

fn png_file(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = png::SIGNATURE.to_vec();
    for part in parts {
        bytes.extend_from_slice(part);
    }
    bytes.extend_from_slice(&chunk(b"IEND", &[]));
    bytes
}

const BLACK_WHITE: [[u8; 3]; 2] = [[0, 0, 0], [255, 255, 255]];

#[test]
fn still_gif_decodes_to_one_frame() {
    // 2x2 checker over a two-color palette, no animation metadata.
    let bytes = GifBuilder::new(2, 2, &BLACK_WHITE, 0)
        .image(
            0,
            0,
            2,
            2,
            false,
            2,
            &[(2, 3), (0, 3), (1, 3), (1, 3), (0, 3), (3, 3)],
        )
        .build();
    let image = AnimatedImage::from_bytes(&bytes, &DecodeOptions::default()).unwrap();

    assert_eq!((image.width, image.height), (2, 2));
    assert_eq!(image.loops, once());
    assert_eq!(image.frames.len(), 1);
    assert_eq!(image.frames[0].duration_ms, 0);
    assert_eq!(
        image.frames[0].rgba,
        [
            0, 0, 0, 255, 255, 255, 255, 255, //
            255, 255, 255, 255, 0, 0, 0, 255,
        ]
    );
}

#[test]
fn still_gif_blocks_overdraw_with_a_source_blend() {
    // Without animation metadata every block copies its pixels verbatim,
    // so the second block's transparent pixel clears the white one the
    // first block painted.
    let bytes = GifBuilder::new(2, 1, &BLACK_WHITE, 0)
        .image(0, 0, 2, 1, false, 2, &[(2, 3), (1, 3), (1, 3), (3, 3)])
        .graphic_control(0, 0, Some(0))
        .image(0, 0, 1, 1, false, 2, &[(2, 3), (0, 3), (3, 3)])
        .build();
    let image = AnimatedImage::from_bytes(&bytes, &DecodeOptions::default()).unwrap();

    assert_eq!(image.frames.len(), 1);
    assert_eq!(image.frames[0].duration_ms, 0);
    assert_eq!(
        image.frames[0].rgba,
        [0, 0, 0, 0, 255, 255, 255, 255]
    );
}

#[test]
fn animated_gif_restores_the_previous_canvas() {
    // 2x1 canvas over a red background. Frame one draws green at (0, 0)
    // and restores, frame two draws blue at (1, 0) and stays.
    let palette = [[0, 0, 0], [255, 0, 0], [0, 255, 0], [0, 0, 255]];
    let bytes = GifBuilder::new(2, 1, &palette, 1)
        .netscape_loop(0)
        .graphic_control(3, 10, None)
        .image(0, 0, 1, 1, false, 2, &[(4, 3), (2, 3), (5, 3)])
        .graphic_control(1, 10, None)
        .image(1, 0, 1, 1, false, 2, &[(4, 3), (3, 3), (5, 3)])
        .build();
    let image = AnimatedImage::from_bytes(&bytes, &DecodeOptions::default()).unwrap();

    assert_eq!(image.loops, AnimationLoops::Infinite);
    assert_eq!(image.frames.len(), 2);
    assert_eq!(image.frames[0].rgba, [0, 255, 0, 255, 255, 0, 0, 255]);
    assert_eq!(image.frames[0].duration_ms, 100);
    assert_eq!(image.frames[1].rgba, [255, 0, 0, 255, 0, 0, 255, 255]);
    assert_eq!(image.frames[1].duration_ms, 100);
}

#[test]
fn ignoring_the_background_starts_transparent() {
    let palette = [[0, 0, 0], [255, 0, 0], [0, 255, 0], [0, 0, 255]];
    let bytes = GifBuilder::new(2, 1, &palette, 1)
        .netscape_loop(0)
        .graphic_control(1, 10, None)
        .image(0, 0, 1, 1, false, 2, &[(4, 3), (2, 3), (5, 3)])
        .build();

    let options = DecodeOptions {
        ignore_background: true,
        ..DecodeOptions::default()
    };
    let image = AnimatedImage::from_bytes(&bytes, &options).unwrap();
    assert_eq!(image.frames[0].rgba, [0, 255, 0, 255, 0, 0, 0, 0]);
}

#[test]
fn zero_gif_delay_becomes_a_tenth_of_a_second() {
    let bytes = GifBuilder::new(1, 1, &BLACK_WHITE, 0)
        .netscape_loop(0)
        .graphic_control(1, 0, None)
        .image(0, 0, 1, 1, false, 2, &[(2, 3), (0, 3), (3, 3)])
        .build();
    let image = AnimatedImage::from_bytes(&bytes, &DecodeOptions::default()).unwrap();
    assert_eq!(image.frames[0].duration_ms, 100);
}

#[test]
fn interlaced_gif_rows_land_in_pass_order() {
    // A 1x8 column of alternating palette indexes. Stored line order and
    // displayed row order differ; the decoder has to scatter the rows.
    let codes = [
        (2, 3),
        (0, 3),
        (1, 3),
        (0, 3),
        (1, 3),
        (0, 3),
        (1, 4),
        (0, 4),
        (1, 4),
        (3, 4),
    ];
    let bytes = GifBuilder::new(1, 8, &BLACK_WHITE, 0)
        .image(0, 0, 1, 8, true, 2, &codes)
        .build();
    let image = AnimatedImage::from_bytes(&bytes, &DecodeOptions::default()).unwrap();

    let rows: Vec<u8> = image.frames[0].rgba.chunks_exact(4).map(|px| px[0]).collect();
    assert_eq!(rows, [0, 0, 0, 255, 255, 0, 255, 255]);
}

#[test]
fn unfiltered_rgba_png_passes_pixels_through() {
    // With every filter byte zero, decoding is the identity on the
    // scanline payload.
    let pixels = [
        0, 1, 2, 3, 250, 251, 252, 253, //
        10, 20, 30, 40, 50, 60, 70, 80,
    ];
    let mut raw = Vec::new();
    raw.push(0);
    raw.extend_from_slice(&pixels[..8]);
    raw.push(0);
    raw.extend_from_slice(&pixels[8..]);

    let bytes = png_file(&[ihdr(2, 2, 8, 6), idat(&raw)]);
    let image = AnimatedImage::from_bytes(&bytes, &DecodeOptions::default()).unwrap();

    assert_eq!(image.frames.len(), 1);
    assert_eq!(image.frames[0].duration_ms, 0);
    assert_eq!(image.frames[0].rgba, pixels);
}

#[test]
fn one_bit_indexed_png_alternates_transparency() {
    let plte = chunk(b"PLTE", &[0, 0, 0, 255, 255, 255]);
    let trns = chunk(b"tRNS", &[0, 255]);
    let bytes = png_file(&[ihdr(8, 1, 1, 3), plte, trns, idat(&[0, 0xAA])]);
    let image = AnimatedImage::from_bytes(&bytes, &DecodeOptions::default()).unwrap();

    let expected: Vec<u8> = [[255, 255, 255, 255], [0, 0, 0, 0]]
        .iter()
        .cycle()
        .take(8)
        .flatten()
        .copied()
        .collect();
    assert_eq!(image.frames[0].rgba, expected);
}

#[test]
fn apng_blends_over_the_previous_frame() {
    // 2x1 canvas. The default image doubles as frame one, fully red.
    // Frame two lays a half-transparent blue pixel over (0, 0).
    let bytes = png_file(&[
        ihdr(2, 1, 8, 6),
        actl(2, 0),
        fctl(0, 2, 1, 0, 0, (1, 10), 0, 0),
        idat(&[0, 255, 0, 0, 255, 255, 0, 0, 255]),
        fctl(1, 1, 1, 0, 0, (1, 10), 0, 1),
        fdat(2, &[0, 0, 0, 255, 128]),
    ]);
    let image = AnimatedImage::from_bytes(&bytes, &DecodeOptions::default()).unwrap();

    assert_eq!(image.loops, AnimationLoops::Infinite);
    assert_eq!(image.frames.len(), 2);
    assert_eq!(image.frames[0].duration_ms, 100);
    assert_eq!(image.frames[0].rgba, [255, 0, 0, 255, 255, 0, 0, 255]);
    assert_eq!(image.frames[1].rgba, [127, 0, 128, 255, 255, 0, 0, 255]);
}

#[test]
fn apng_zero_delay_denominator_reads_as_centiseconds() {
    let bytes = png_file(&[
        ihdr(1, 1, 8, 6),
        actl(1, 1),
        fctl(0, 1, 1, 0, 0, (25, 0), 0, 0),
        idat(&[0, 1, 2, 3, 4]),
    ]);
    let image = AnimatedImage::from_bytes(&bytes, &DecodeOptions::default()).unwrap();

    assert_eq!(image.loops, once());
    assert_eq!(image.frames[0].duration_ms, 250);
}

#[test]
fn dispatch_matches_the_format_specific_entry_points() {
    let options = DecodeOptions::default();
    let gif_bytes = GifBuilder::new(1, 1, &BLACK_WHITE, 0)
        .image(0, 0, 1, 1, false, 2, &[(2, 3), (1, 3), (3, 3)])
        .build();

    let dispatched = AnimatedImage::from_bytes(&gif_bytes, &options).unwrap();
    let direct = gif::decode(&gif::GifParsed::from_bytes(&gif_bytes).unwrap(), &options).unwrap();
    assert_eq!(dispatched.frames[0].rgba, direct.frames[0].rgba);

    let png_bytes = png_file(&[ihdr(1, 1, 8, 6), idat(&[0, 9, 8, 7, 6])]);
    let dispatched = AnimatedImage::from_bytes(&png_bytes, &options).unwrap();
    let direct = png::decode(&png::PngParsed::from_bytes(&png_bytes, &options).unwrap()).unwrap();
    assert_eq!(dispatched.frames[0].rgba, direct.frames[0].rgba);
}

#[test]
fn gif_without_image_blocks_is_invalid() {
    let bytes = GifBuilder::new(1, 1, &BLACK_WHITE, 0).build();
    assert!(matches!(
        AnimatedImage::from_bytes(&bytes, &DecodeOptions::default()),
        Err(Error::InvalidFormat(_))
    ));
}

#[test]
fn gif_sub_image_outside_the_canvas_is_invalid() {
    let bytes = GifBuilder::new(1, 1, &BLACK_WHITE, 0)
        .image(1, 0, 1, 1, false, 2, &[(2, 3), (0, 3), (3, 3)])
        .build();
    assert!(matches!(
        AnimatedImage::from_bytes(&bytes, &DecodeOptions::default()),
        Err(Error::InvalidFormat(_))
    ));
}
