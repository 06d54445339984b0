//! The two primitives under GIF image decoding: a reader that pulls
//! variable-width codes out of the packed bit stream, and the growing
//! LZW code table.

/// The code table never holds more than 4096 entries; codes are at most
/// 12 bits wide.
pub(crate) const MAX_CODES: usize = 4096;

/// Reads codes from a concatenated sub-block buffer, treating it as a
/// little-endian bit stream: the first code sits in the low bits of byte
/// zero, and every following code starts at the exact bit where the
/// previous one ended, spanning byte boundaries as needed.
pub(crate) struct BitCodeReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitCodeReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Returns the next `code_size`-bit code and advances the cursor.
    ///
    /// Positions past the end of the buffer read as zero bits. That state
    /// is only reachable for streams missing their end code, which the
    /// decode loop rejects on its own.
    pub fn read_code(&mut self, code_size: u8) -> u16 {
        debug_assert!((3..=12).contains(&code_size));

        let mut value = 0u32;
        let mut filled = 0u8;
        while filled < code_size {
            let byte = self.data.get(self.bit_pos / 8).copied().unwrap_or(0);
            let bit = (self.bit_pos % 8) as u8;

            let take = (8 - bit).min(code_size - filled);
            let mask = ((1u16 << take) - 1) as u8;
            value |= (((byte >> bit) & mask) as u32) << filled;

            filled += take;
            self.bit_pos += take as usize;
        }
        value as u16
    }

    /// Total number of bits consumed so far.
    pub fn bits_consumed(&self) -> usize {
        self.bit_pos
    }
}

/// The GIF LZW code table.
///
/// Entries live in one flat byte arena indexed by per-code spans. The
/// table starts with one single-index entry per color plus the two
/// reserved codes (clear and end, which have no sequence), and grows one
/// entry per `append` until it freezes at [`MAX_CODES`].
pub(crate) struct LzwDictionary {
    color_count: u16,
    spans: Vec<(u32, u16)>,
    bytes: Vec<u8>,
}

impl LzwDictionary {
    pub fn new(color_count: u16) -> Self {
        debug_assert!((1..=256).contains(&color_count));

        let mut dictionary = Self {
            color_count,
            spans: Vec::with_capacity(MAX_CODES),
            bytes: Vec::new(),
        };
        dictionary.reset();
        dictionary
    }

    pub fn clear_code(&self) -> u16 {
        self.color_count
    }

    pub fn end_code(&self) -> u16 {
        self.color_count + 1
    }

    /// Number of codes defined so far, reserved codes included. This is
    /// also the id the next `append` will take.
    pub fn code_count(&self) -> u16 {
        self.spans.len() as u16
    }

    /// The index sequence a code stands for, or `None` for the reserved
    /// codes and for codes that have not been defined yet.
    pub fn sequence(&self, code: u16) -> Option<&[u8]> {
        if code == self.clear_code() || code == self.end_code() {
            return None;
        }
        let (start, len) = *self.spans.get(code as usize)?;
        Some(&self.bytes[start as usize..start as usize + len as usize])
    }

    /// Defines the next code as the sequence of `base` extended by one
    /// byte, and returns its id. Once the table is full this is a no-op;
    /// the stream is then required to clear before defining more codes.
    pub fn append(&mut self, base: u16, extra: u8) -> u16 {
        if self.spans.len() == MAX_CODES {
            return (MAX_CODES - 1) as u16;
        }

        let (start, len) = self.spans[base as usize];
        let new_start = self.bytes.len() as u32;
        self.bytes
            .extend_from_within(start as usize..start as usize + len as usize);
        self.bytes.push(extra);
        self.spans.push((new_start, len + 1));
        (self.spans.len() - 1) as u16
    }

    /// Drops every entry added since construction.
    pub fn reset(&mut self) {
        self.bytes.clear();
        self.spans.clear();
        for index in 0..self.color_count {
            self.bytes.push(index as u8);
            self.spans.push((index as u32, 1));
        }
        // Clear and end codes carry no sequence.
        self.spans.push((0, 0));
        self.spans.push((0, 0));
    }
}
