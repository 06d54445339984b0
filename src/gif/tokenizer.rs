//! Splits a GIF byte stream into its logical screen descriptor, color
//! tables and data blocks. No pixel decoding happens here; image blocks
//! come out with their LZW payload concatenated but untouched.

use log::debug;

use crate::error::Error;

const TRAILER: u8 = 0x3B;
const INTRO_EXTENSION: u8 = 0x21;
const INTRO_IMAGE: u8 = 0x2C;

const EXT_GRAPHIC_CONTROL: u8 = 0xF9;
const EXT_PLAIN_TEXT: u8 = 0x01;
const EXT_APPLICATION: u8 = 0xFF;
const EXT_COMMENT: u8 = 0xFE;

/// The logical screen descriptor.
#[derive(Debug, Clone, Copy)]
pub struct ScreenDescriptor {
    pub width: u16,
    pub height: u16,
    /// Bits needed to address the global color table, when one exists.
    pub color_resolution: u8,
    pub background_color_index: u8,
    pub pixel_aspect_ratio: u8,
}

/// Payload of a Graphic Control extension, attached to the image block it
/// precedes.
#[derive(Debug, Clone, Copy)]
pub struct GraphicControl {
    /// Raw disposal method, 0 through 7. Values above 3 are reserved.
    pub disposal_method: u8,
    pub user_input: bool,
    pub transparent_index: Option<u8>,
    /// Frame delay in centiseconds. A stored delay of zero reads as 10.
    pub delay_cs: u16,
}

/// One image block: placement, the optional local color table and the
/// still-compressed LZW data.
#[derive(Debug, Clone)]
pub struct ImageBlock {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub interlaced: bool,
    pub color_table: Option<Vec<[u8; 3]>>,
    pub minimum_code_size: u8,
    /// All data sub-blocks concatenated.
    pub data: Vec<u8>,
    pub graphic_control: Option<GraphicControl>,
}

/// An application extension block.
#[derive(Debug, Clone)]
pub struct ApplicationBlock {
    pub identifier: [u8; 8],
    pub auth_code: [u8; 3],
    pub data: Vec<u8>,
}

impl ApplicationBlock {
    /// The animation repeat count carried by the Netscape 2.0 looping
    /// extension, where zero stands for "repeat forever". `None` for any
    /// other application block.
    pub fn loop_count(&self) -> Option<u16> {
        (self.identifier == *b"NETSCAPE"
            && self.auth_code == *b"2.0"
            && self.data.len() >= 3
            && self.data[0] == 1)
            .then(|| u16::from_le_bytes([self.data[1], self.data[2]]))
    }
}

/// A comment or plain text extension, kept as raw bytes.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub data: Vec<u8>,
}

/// A data block of the GIF stream, in file order.
#[derive(Debug, Clone)]
pub enum Block {
    Image(ImageBlock),
    Application(ApplicationBlock),
    Comment(TextBlock),
    PlainText(TextBlock),
}

/// A tokenized GIF container.
#[derive(Debug, Clone)]
pub struct GifParsed {
    /// Version tag from the header, normally `87a` or `89a`.
    pub version: [u8; 3],
    pub screen: ScreenDescriptor,
    pub global_color_table: Option<Vec<[u8; 3]>>,
    pub blocks: Vec<Block>,
}

impl GifParsed {
    /// Tokenizes a complete GIF byte stream.
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if !data.starts_with(b"GIF") {
            return Err(Error::UnknownFormat);
        }
        let mut reader = Reader::new(data);
        reader.take(3, "header")?;
        let version: [u8; 3] = reader.take(3, "version")?.try_into().unwrap();

        let width = reader.u16_le("screen width")?;
        let height = reader.u16_le("screen height")?;
        let packed = reader.u8("screen flags")?;
        let background_color_index = reader.u8("background color index")?;
        let pixel_aspect_ratio = reader.u8("pixel aspect ratio")?;

        let mut color_resolution = 0;
        let mut global_color_table = None;
        if packed & 0x80 != 0 {
            color_resolution = ((packed & 0x70) >> 4) + 1;
            let entries = 2usize << (packed & 0x07);
            global_color_table = Some(read_color_table(&mut reader, entries)?);
        }

        let screen = ScreenDescriptor {
            width,
            height,
            color_resolution,
            background_color_index,
            pixel_aspect_ratio,
        };

        let mut blocks = Vec::new();
        let mut graphic_control = None;
        // A missing trailer is tolerated; the stream just ends.
        while let Some(introducer) = reader.next_u8() {
            match introducer {
                TRAILER => break,
                INTRO_IMAGE => {
                    blocks.push(Block::Image(read_image_block(
                        &mut reader,
                        graphic_control.take(),
                    )?));
                }
                INTRO_EXTENSION => {
                    let label = reader.u8("extension label")?;
                    match label {
                        // The graphic control payload belongs to the image
                        // block that follows, not to the block list.
                        EXT_GRAPHIC_CONTROL => {
                            graphic_control = Some(read_graphic_control(&mut reader)?);
                        }
                        EXT_APPLICATION => {
                            blocks.push(Block::Application(read_application_block(&mut reader)?));
                        }
                        EXT_COMMENT => blocks.push(Block::Comment(TextBlock {
                            data: concat_sub_blocks(&mut reader)?,
                        })),
                        EXT_PLAIN_TEXT => blocks.push(Block::PlainText(TextBlock {
                            data: concat_sub_blocks(&mut reader)?,
                        })),
                        other => {
                            debug!("skipping unknown extension label {other:#04x}");
                            concat_sub_blocks(&mut reader)?;
                        }
                    }
                }
                _ => return Err(Error::InvalidFormat("unknown block introducer")),
            }
        }

        Ok(GifParsed {
            version,
            screen,
            global_color_table,
            blocks,
        })
    }
}

fn read_color_table(reader: &mut Reader, entries: usize) -> Result<Vec<[u8; 3]>, Error> {
    let raw = reader.take(entries * 3, "color table")?;
    Ok(raw
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}

fn read_graphic_control(reader: &mut Reader) -> Result<GraphicControl, Error> {
    if reader.u8("graphic control size")? != 4 {
        return Err(Error::InvalidFormat("graphic control block size"));
    }

    // Packed settings byte: 000dddut, with ddd the disposal method, u the
    // user input flag and t the transparency flag.
    let packed = reader.u8("graphic control flags")?;
    let delay = reader.u16_le("frame delay")?;
    let transparent = reader.u8("transparent color index")?;
    reader.u8("graphic control terminator")?;

    Ok(GraphicControl {
        disposal_method: (packed & 0x1C) >> 2,
        user_input: packed & 0x02 != 0,
        transparent_index: (packed & 0x01 != 0).then_some(transparent),
        // A zero delay reads as 100 milliseconds.
        delay_cs: if delay > 0 { delay } else { 10 },
    })
}

fn read_application_block(reader: &mut Reader) -> Result<ApplicationBlock, Error> {
    if reader.u8("application block size")? != 11 {
        return Err(Error::InvalidFormat("application block signature size"));
    }
    let identifier: [u8; 8] = reader.take(8, "application identifier")?.try_into().unwrap();
    let auth_code: [u8; 3] = reader.take(3, "application auth code")?.try_into().unwrap();
    let data = concat_sub_blocks(reader)?;

    Ok(ApplicationBlock {
        identifier,
        auth_code,
        data,
    })
}

fn read_image_block(
    reader: &mut Reader,
    graphic_control: Option<GraphicControl>,
) -> Result<ImageBlock, Error> {
    let left = reader.u16_le("image left")?;
    let top = reader.u16_le("image top")?;
    let width = reader.u16_le("image width")?;
    let height = reader.u16_le("image height")?;
    let packed = reader.u8("image flags")?;

    let mut color_table = None;
    if packed & 0x80 != 0 {
        let entries = 2usize << (packed & 0x07);
        color_table = Some(read_color_table(reader, entries)?);
    }

    let minimum_code_size = reader.u8("minimum code size")?;
    let data = concat_sub_blocks(reader)?;

    Ok(ImageBlock {
        left,
        top,
        width,
        height,
        interlaced: packed & 0x40 != 0,
        color_table,
        minimum_code_size,
        data,
        graphic_control,
    })
}

/// Reads consecutive data sub-blocks up to the zero-length terminator and
/// concatenates them into one buffer.
fn concat_sub_blocks(reader: &mut Reader) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    loop {
        let len = reader.u8("sub-block length")?;
        if len == 0 {
            return Ok(out);
        }
        out.extend_from_slice(reader.take(len as usize, "sub-block data")?);
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn next_u8(&mut self) -> Option<u8> {
        let byte = self.data.get(self.pos).copied();
        if byte.is_some() {
            self.pos += 1;
        }
        byte
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, Error> {
        self.next_u8().ok_or(Error::InputTooShort(what))
    }

    fn u16_le(&mut self, what: &'static str) -> Result<u16, Error> {
        let bytes = self.take(2, what)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], Error> {
        let end = self.pos.checked_add(len).ok_or(Error::InputTooShort(what))?;
        let slice = self.data.get(self.pos..end).ok_or(Error::InputTooShort(what))?;
        self.pos = end;
        Ok(slice)
    }
}
