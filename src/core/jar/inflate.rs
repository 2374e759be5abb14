// Raw DEFLATE decoder (RFC 1951): stored, fixed-Huffman, and dynamic-Huffman
// blocks. Canonical codes are decoded bit by bit; archive entries are small
// enough that table acceleration is not worth the surface area.
use crate::core::error::{Error, ErrorKind};

const MAX_BITS: usize = 15;
const MAX_LITLEN_SYMBOLS: usize = 288;
const MAX_DIST_SYMBOLS: usize = 30;

const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115,
    131, 163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12,
    13, 13,
];
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

fn corrupt(message: &str) -> Error {
    Error::new(ErrorKind::Corrupt).with_message(format!("deflate: {message}"))
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u32,
    bit_count: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buf: 0,
            bit_count: 0,
        }
    }

    fn bit(&mut self) -> Result<u32, Error> {
        if self.bit_count == 0 {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or_else(|| corrupt("unexpected end of stream"))?;
            self.pos += 1;
            self.bit_buf = byte as u32;
            self.bit_count = 8;
        }
        let bit = self.bit_buf & 1;
        self.bit_buf >>= 1;
        self.bit_count -= 1;
        Ok(bit)
    }

    fn bits(&mut self, count: u32) -> Result<u32, Error> {
        let mut value = 0;
        for shift in 0..count {
            value |= self.bit()? << shift;
        }
        Ok(value)
    }

    fn align_to_byte(&mut self) {
        self.bit_buf = 0;
        self.bit_count = 0;
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| corrupt("stored block overruns input"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

/// Canonical Huffman table: symbol counts per code length plus symbols in
/// canonical order.
struct Huffman {
    count: [u16; MAX_BITS + 1],
    symbol: Vec<u16>,
}

impl Huffman {
    fn build(lengths: &[u8]) -> Result<Self, Error> {
        let mut count = [0u16; MAX_BITS + 1];
        for &length in lengths {
            if length as usize > MAX_BITS {
                return Err(corrupt("code length exceeds 15"));
            }
            count[length as usize] += 1;
        }

        // An all-zero table is legal: a dynamic block whose data is all
        // literals carries a single zero-length distance code (RFC 1951
        // section 3.2.7). Reject over-subscribed codes; incomplete or empty
        // codes fail at decode time if a symbol is actually requested.
        let mut left: i32 = 1;
        for length in 1..=MAX_BITS {
            left <<= 1;
            left -= count[length] as i32;
            if left < 0 {
                return Err(corrupt("over-subscribed code"));
            }
        }

        let mut offsets = [0u16; MAX_BITS + 2];
        for length in 1..=MAX_BITS {
            offsets[length + 1] = offsets[length] + count[length];
        }
        let mut symbol = vec![0u16; lengths.len()];
        for (sym, &length) in lengths.iter().enumerate() {
            if length != 0 {
                symbol[offsets[length as usize] as usize] = sym as u16;
                offsets[length as usize] += 1;
            }
        }
        Ok(Self { count, symbol })
    }

    fn decode(&self, reader: &mut BitReader<'_>) -> Result<u16, Error> {
        let mut code: u32 = 0;
        let mut first: u32 = 0;
        let mut index: u32 = 0;
        for length in 1..=MAX_BITS {
            code |= reader.bit()?;
            let count = self.count[length] as u32;
            if code < first + count {
                return Ok(self.symbol[(index + (code - first)) as usize]);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(corrupt("invalid code"))
    }
}

/// Decompresses a raw deflate stream. `size_hint` preallocates the output;
/// the stream's own end-of-block markers decide the real length.
pub fn inflate(data: &[u8], size_hint: usize) -> Result<Vec<u8>, Error> {
    let mut reader = BitReader::new(data);
    let mut out = Vec::with_capacity(size_hint);
    loop {
        let is_final = reader.bit()? == 1;
        match reader.bits(2)? {
            0 => inflate_stored(&mut reader, &mut out)?,
            1 => {
                let (litlen, dist) = fixed_tables()?;
                inflate_block(&mut reader, &mut out, &litlen, &dist)?;
            }
            2 => {
                let (litlen, dist) = dynamic_tables(&mut reader)?;
                inflate_block(&mut reader, &mut out, &litlen, &dist)?;
            }
            _ => return Err(corrupt("reserved block type")),
        }
        if is_final {
            return Ok(out);
        }
    }
}

fn inflate_stored(reader: &mut BitReader<'_>, out: &mut Vec<u8>) -> Result<(), Error> {
    reader.align_to_byte();
    let header = reader.take_bytes(4)?;
    let len = u16::from_le_bytes([header[0], header[1]]);
    let nlen = u16::from_le_bytes([header[2], header[3]]);
    if len != !nlen {
        return Err(corrupt("stored block length check failed"));
    }
    out.extend_from_slice(reader.take_bytes(len as usize)?);
    Ok(())
}

fn fixed_tables() -> Result<(Huffman, Huffman), Error> {
    let mut litlen_lengths = [0u8; MAX_LITLEN_SYMBOLS];
    for (sym, length) in litlen_lengths.iter_mut().enumerate() {
        *length = match sym {
            0..=143 => 8,
            144..=255 => 9,
            256..=279 => 7,
            _ => 8,
        };
    }
    let dist_lengths = [5u8; MAX_DIST_SYMBOLS];
    Ok((
        Huffman::build(&litlen_lengths)?,
        Huffman::build(&dist_lengths)?,
    ))
}

fn dynamic_tables(reader: &mut BitReader<'_>) -> Result<(Huffman, Huffman), Error> {
    let hlit = reader.bits(5)? as usize + 257;
    let hdist = reader.bits(5)? as usize + 1;
    let hclen = reader.bits(4)? as usize + 4;
    if hlit > MAX_LITLEN_SYMBOLS || hdist > MAX_DIST_SYMBOLS {
        return Err(corrupt("too many dynamic code symbols"));
    }

    let mut code_lengths = [0u8; 19];
    for &position in CODE_LENGTH_ORDER.iter().take(hclen) {
        code_lengths[position] = reader.bits(3)? as u8;
    }
    let code_table = Huffman::build(&code_lengths)?;

    let mut lengths = vec![0u8; hlit + hdist];
    let mut filled = 0;
    while filled < lengths.len() {
        let symbol = code_table.decode(reader)?;
        match symbol {
            0..=15 => {
                lengths[filled] = symbol as u8;
                filled += 1;
            }
            16 => {
                if filled == 0 {
                    return Err(corrupt("repeat with no previous length"));
                }
                let previous = lengths[filled - 1];
                let repeat = reader.bits(2)? as usize + 3;
                fill_repeat(&mut lengths, &mut filled, previous, repeat)?;
            }
            17 => {
                let repeat = reader.bits(3)? as usize + 3;
                fill_repeat(&mut lengths, &mut filled, 0, repeat)?;
            }
            18 => {
                let repeat = reader.bits(7)? as usize + 11;
                fill_repeat(&mut lengths, &mut filled, 0, repeat)?;
            }
            _ => return Err(corrupt("bad code length symbol")),
        }
    }

    if lengths[256] == 0 {
        return Err(corrupt("missing end-of-block code"));
    }
    let litlen = Huffman::build(&lengths[..hlit])?;
    let dist = Huffman::build(&lengths[hlit..])?;
    Ok((litlen, dist))
}

fn fill_repeat(
    lengths: &mut [u8],
    filled: &mut usize,
    value: u8,
    repeat: usize,
) -> Result<(), Error> {
    if *filled + repeat > lengths.len() {
        return Err(corrupt("length repeat overruns table"));
    }
    lengths[*filled..*filled + repeat].fill(value);
    *filled += repeat;
    Ok(())
}

fn inflate_block(
    reader: &mut BitReader<'_>,
    out: &mut Vec<u8>,
    litlen: &Huffman,
    dist: &Huffman,
) -> Result<(), Error> {
    loop {
        let symbol = litlen.decode(reader)?;
        match symbol {
            0..=255 => out.push(symbol as u8),
            256 => return Ok(()),
            257..=285 => {
                let length_index = symbol as usize - 257;
                let length = LENGTH_BASE[length_index] as usize
                    + reader.bits(LENGTH_EXTRA[length_index] as u32)? as usize;

                let dist_symbol = dist.decode(reader)? as usize;
                if dist_symbol >= DIST_BASE.len() {
                    return Err(corrupt("bad distance symbol"));
                }
                let distance = DIST_BASE[dist_symbol] as usize
                    + reader.bits(DIST_EXTRA[dist_symbol] as u32)? as usize;
                if distance > out.len() {
                    return Err(corrupt("distance beyond output start"));
                }

                // Overlapping copies are the norm; copy byte-wise.
                let start = out.len() - distance;
                for offset in 0..length {
                    let byte = out[start + offset];
                    out.push(byte);
                }
            }
            _ => return Err(corrupt("bad literal/length symbol")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::inflate;
    use crate::core::error::ErrorKind;

    // zlib level 0: a single stored block.
    const STORED_ABC: &[u8] = &[0x01, 0x03, 0x00, 0xfc, 0xff, 0x61, 0x62, 0x63];
    // zlib level 9 of b"hello hello hello hello": fixed Huffman with matches.
    const FIXED_HELLO: &[u8] = &[0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0x57, 0xc8, 0x40, 0x27, 0x01];
    // zlib level 9 of 768 bytes of rotating values plus repeated text:
    // exercises dynamic Huffman tables.
    const DYNAMIC: &[u8] = include_bytes!("../../../tests/fixtures/dynamic.deflate");
    const DYNAMIC_RAW: &[u8] = include_bytes!("../../../tests/fixtures/dynamic.raw");

    #[test]
    fn stored_block() {
        assert_eq!(inflate(STORED_ABC, 3).expect("inflate"), b"abc");
    }

    #[test]
    fn fixed_huffman_with_matches() {
        assert_eq!(
            inflate(FIXED_HELLO, 23).expect("inflate"),
            b"hello hello hello hello"
        );
    }

    #[test]
    fn dynamic_huffman() {
        assert_eq!(inflate(DYNAMIC, DYNAMIC_RAW.len()).expect("inflate"), DYNAMIC_RAW);
    }

    #[test]
    fn dynamic_block_with_no_distance_codes() {
        // Dynamic block encoding b"A" as a lone literal: HDIST is 1 and the
        // single distance code has length zero, so the distance table is
        // empty (RFC 1951 section 3.2.7).
        let all_literals = &[
            0x05, 0xc0, 0x81, 0x08, 0x00, 0x00, 0x00, 0x00, 0x20, 0xb6, 0xfd, 0xa5, 0x4e,
        ];
        assert_eq!(inflate(all_literals, 1).expect("inflate"), b"A");
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let err = inflate(&FIXED_HELLO[..4], 23).expect_err("truncated");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn empty_input_is_corrupt() {
        assert!(inflate(&[], 0).is_err());
    }

    #[test]
    fn stored_length_check() {
        let bad = &[0x01, 0x03, 0x00, 0x00, 0x00, 0x61, 0x62, 0x63];
        let err = inflate(bad, 3).expect_err("nlen mismatch");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }
}
