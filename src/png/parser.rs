//! Gives the raw chunk sequence its meaning: header and palette state,
//! transparency, the inflated pixel streams and the animation control
//! data.

use byteorder_lite::{BigEndian, ByteOrder};
use log::debug;

use crate::DecodeOptions;
use crate::error::Error;
use crate::png::chunks::{self, RawChunk};

/// PNG color types.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ColorType {
    Grayscale,
    Truecolor,
    Indexed,
    GrayscaleAlpha,
    TruecolorAlpha,
}

impl ColorType {
    fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Grayscale),
            2 => Ok(Self::Truecolor),
            3 => Ok(Self::Indexed),
            4 => Ok(Self::GrayscaleAlpha),
            6 => Ok(Self::TruecolorAlpha),
            _ => Err(Error::InvalidFormat("unknown color type")),
        }
    }

    /// Number of samples that make up one pixel.
    pub fn samples_per_pixel(self) -> usize {
        match self {
            Self::Grayscale | Self::Indexed => 1,
            Self::GrayscaleAlpha => 2,
            Self::Truecolor => 3,
            Self::TruecolorAlpha => 4,
        }
    }
}

/// The image header.
#[derive(Debug, Copy, Clone)]
pub struct Header {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: ColorType,
    pub compression: u8,
    pub filter: u8,
    /// 0 for sequential storage, 1 for the seven-pass interlaced layout.
    pub interlace: u8,
}

impl Header {
    fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.len() != 13 {
            return Err(Error::InvalidFormat("header chunk length"));
        }
        let header = Header {
            width: BigEndian::read_u32(&data[0..4]),
            height: BigEndian::read_u32(&data[4..8]),
            bit_depth: data[8],
            color_type: ColorType::from_u8(data[9])?,
            compression: data[10],
            filter: data[11],
            interlace: data[12],
        };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidFormat("zero image dimension"));
        }
        let depth_is_legal = match self.color_type {
            ColorType::Grayscale => matches!(self.bit_depth, 1 | 2 | 4 | 8 | 16),
            ColorType::Indexed => matches!(self.bit_depth, 1 | 2 | 4 | 8),
            ColorType::Truecolor | ColorType::GrayscaleAlpha | ColorType::TruecolorAlpha => {
                matches!(self.bit_depth, 8 | 16)
            }
        };
        if !depth_is_legal {
            return Err(Error::InvalidFormat(
                "illegal color type and bit depth combination",
            ));
        }
        if self.compression != 0 {
            return Err(Error::UnsupportedFeature("compression method"));
        }
        if self.filter != 0 {
            return Err(Error::UnsupportedFeature("filter method"));
        }
        if self.interlace > 1 {
            return Err(Error::UnsupportedFeature("interlace method"));
        }
        Ok(())
    }
}

/// Transparency data from the `tRNS` chunk, shaped by the color type.
#[derive(Debug, Clone)]
pub enum Transparency {
    /// The gray sample value that reads as fully transparent.
    Gray(u16),
    /// The RGB triple that reads as fully transparent.
    Rgb(u16, u16, u16),
    /// Per-palette-entry alpha. Entries past the end are opaque.
    Indexed(Vec<u8>),
}

/// One animation frame: its control data and the inflated pixel stream.
/// The stream is empty when the default image doubles as this frame.
#[derive(Debug, Clone)]
pub struct AnimationFrame {
    pub control: FrameControl,
    pub data: Vec<u8>,
}

/// Per-frame control data from an `fcTL` chunk.
#[derive(Debug, Copy, Clone)]
pub struct FrameControl {
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub delay_num: u16,
    pub delay_den: u16,
    /// 0 none, 1 background, 2 previous.
    pub dispose: u8,
    /// 0 source, 1 over.
    pub blend: u8,
}

impl FrameControl {
    fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.len() != 26 {
            return Err(Error::InvalidFormat("frame control chunk length"));
        }
        // The leading four bytes are the chunk sequence number.
        let control = FrameControl {
            width: BigEndian::read_u32(&data[4..8]),
            height: BigEndian::read_u32(&data[8..12]),
            x_offset: BigEndian::read_u32(&data[12..16]),
            y_offset: BigEndian::read_u32(&data[16..20]),
            delay_num: BigEndian::read_u16(&data[20..22]),
            delay_den: BigEndian::read_u16(&data[22..24]),
            dispose: data[24],
            blend: data[25],
        };
        if control.width == 0 || control.height == 0 {
            return Err(Error::InvalidFormat("zero frame dimension"));
        }
        if control.dispose > 2 {
            return Err(Error::InvalidFormat("unknown frame disposal type"));
        }
        if control.blend > 1 {
            return Err(Error::InvalidFormat("unknown frame blend type"));
        }
        Ok(control)
    }
}

/// The animation data of an APNG.
#[derive(Debug, Clone)]
pub struct Animation {
    /// Number of times to play the animation, zero meaning forever.
    pub num_plays: u32,
    /// Whether frame 0 reuses the already-decoded default image.
    pub default_image_is_first_frame: bool,
    pub frames: Vec<AnimationFrame>,
}

/// A parsed PNG container: header state plus the inflated pixel streams.
#[derive(Debug, Clone)]
pub struct PngParsed {
    pub header: Header,
    /// The inflated default-image pixel stream.
    pub data: Vec<u8>,
    pub palette: Option<Vec<[u8; 3]>>,
    pub transparency: Option<Transparency>,
    /// Gamma from the `gAMA` chunk, times 100000.
    pub gamma: Option<u32>,
    /// Raw `sBIT` payload.
    pub significant_bits: Option<Vec<u8>>,
    pub animation: Option<Animation>,
}

impl PngParsed {
    /// Parses a complete PNG byte stream, inflating every pixel stream it
    /// carries.
    pub fn from_bytes(data: &[u8], options: &DecodeOptions) -> Result<Self, Error> {
        let chunks = chunks::split_chunks(data, options.fail_on_crc)?;

        let header = match chunks.first() {
            Some(chunk) if chunk.chunk_type == *b"IHDR" => Header::parse(chunk.data)?,
            Some(_) => return Err(Error::InvalidFormat("first chunk is not the header")),
            None => return Err(Error::InputTooShort("chunk stream")),
        };

        let mut palette = None;
        let mut transparency = None;
        let mut gamma = None;
        let mut significant_bits = None;
        let mut idat = Vec::new();

        for chunk in &chunks[1..] {
            match &chunk.chunk_type {
                b"PLTE" => palette = Some(parse_palette(chunk.data)?),
                b"tRNS" => {
                    transparency = Some(parse_transparency(chunk.data, header.color_type)?);
                }
                b"gAMA" => {
                    if chunk.data.len() != 4 {
                        return Err(Error::InvalidFormat("gamma chunk length"));
                    }
                    gamma = Some(BigEndian::read_u32(chunk.data));
                }
                b"sBIT" => significant_bits = Some(chunk.data.to_vec()),
                b"IDAT" => idat.extend_from_slice(chunk.data),
                b"acTL" | b"fcTL" | b"fdAT" | b"IEND" => {}
                other => debug!(
                    "ignoring {} chunk ({} bytes)",
                    String::from_utf8_lossy(other),
                    chunk.data.len()
                ),
            }
        }

        if idat.is_empty() {
            return Err(Error::InvalidFormat("missing image data"));
        }

        Ok(PngParsed {
            header,
            data: inflate(&idat)?,
            palette,
            transparency,
            gamma,
            significant_bits,
            animation: parse_animation(&chunks)?,
        })
    }
}

fn inflate(compressed: &[u8]) -> Result<Vec<u8>, Error> {
    miniz_oxide::inflate::decompress_to_vec_zlib(compressed)
        .map_err(|e| Error::DecompressionFailure(e.status))
}

fn parse_palette(data: &[u8]) -> Result<Vec<[u8; 3]>, Error> {
    if data.is_empty() || data.len() % 3 != 0 || data.len() / 3 > 256 {
        return Err(Error::InvalidFormat("palette chunk length"));
    }
    Ok(data.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}

fn parse_transparency(data: &[u8], color_type: ColorType) -> Result<Transparency, Error> {
    match color_type {
        ColorType::Grayscale => {
            if data.len() != 2 {
                return Err(Error::InvalidFormat("transparency chunk length"));
            }
            Ok(Transparency::Gray(BigEndian::read_u16(data)))
        }
        ColorType::Truecolor => {
            if data.len() != 6 {
                return Err(Error::InvalidFormat("transparency chunk length"));
            }
            Ok(Transparency::Rgb(
                BigEndian::read_u16(&data[0..2]),
                BigEndian::read_u16(&data[2..4]),
                BigEndian::read_u16(&data[4..6]),
            ))
        }
        ColorType::Indexed => Ok(Transparency::Indexed(data.to_vec())),
        // Color types with a full alpha channel cannot also carry a
        // transparency chunk.
        ColorType::GrayscaleAlpha | ColorType::TruecolorAlpha => {
            Err(Error::InvalidFormat("transparency chunk for an alpha color type"))
        }
    }
}

fn parse_animation(chunks: &[RawChunk]) -> Result<Option<Animation>, Error> {
    // The animation control must precede every frame chunk.
    let mut control = None;
    for chunk in chunks {
        match &chunk.chunk_type {
            b"acTL" => {
                if chunk.data.len() != 8 {
                    return Err(Error::InvalidFormat("animation control chunk length"));
                }
                control = Some((
                    BigEndian::read_u32(&chunk.data[0..4]),
                    BigEndian::read_u32(&chunk.data[4..8]),
                ));
                break;
            }
            b"fcTL" | b"fdAT" => {
                return Err(Error::InvalidFormat(
                    "frame chunks without an animation control",
                ));
            }
            _ => {}
        }
    }
    let Some((num_frames, num_plays)) = control else {
        return Ok(None);
    };
    if num_frames == 0 {
        // An empty animation decodes like a plain PNG.
        return Ok(None);
    }

    let mut frames: Vec<AnimationFrame> = Vec::new();
    let mut pending: Option<(FrameControl, Vec<u8>)> = None;
    let mut default_image_is_first_frame = false;

    for chunk in chunks {
        match &chunk.chunk_type {
            b"fcTL" => {
                if let Some(done) = pending.take() {
                    frames.push(finish_frame(done)?);
                }
                pending = Some((FrameControl::parse(chunk.data)?, Vec::new()));
            }
            b"fdAT" => {
                let Some((_, buffer)) = pending.as_mut() else {
                    return Err(Error::InvalidFormat("frame data without a frame control"));
                };
                // The payload starts after the four sequence-number bytes.
                let payload = chunk
                    .data
                    .get(4..)
                    .ok_or(Error::InvalidFormat("frame data chunk too short"))?;
                buffer.extend_from_slice(payload);
            }
            b"IDAT" => {
                // A frame control ahead of the image data marks the
                // default image as the animation's first frame.
                if frames.is_empty()
                    && pending.as_ref().is_some_and(|(_, buffer)| buffer.is_empty())
                {
                    let (control, _) = pending.take().unwrap();
                    frames.push(AnimationFrame {
                        control,
                        data: Vec::new(),
                    });
                    default_image_is_first_frame = true;
                }
            }
            _ => {}
        }
    }
    if let Some(done) = pending.take() {
        frames.push(finish_frame(done)?);
    }

    if frames.len() != num_frames as usize {
        return Err(Error::InvalidFormat(
            "frame count does not match the animation control",
        ));
    }

    Ok(Some(Animation {
        num_plays,
        default_image_is_first_frame,
        frames,
    }))
}

fn finish_frame((control, compressed): (FrameControl, Vec<u8>)) -> Result<AnimationFrame, Error> {
    if compressed.is_empty() {
        return Err(Error::InvalidFormat("frame control without frame data"));
    }
    Ok(AnimationFrame {
        control,
        data: inflate(&compressed)?,
    })
}
