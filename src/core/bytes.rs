// Bounds-checked big-endian cursor primitives for the class-file codec.
use crate::core::error::{Error, ErrorKind};

pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn short(&self) -> Error {
        Error::new(ErrorKind::Corrupt)
            .with_message(format!("truncated class file at offset {}", self.pos))
    }

    pub fn u8(&mut self) -> Result<u8, Error> {
        let byte = *self.buf.get(self.pos).ok_or_else(|| self.short())?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn u16(&mut self) -> Result<u16, Error> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, Error> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn u64(&mut self) -> Result<u64, Error> {
        let hi = self.u32()? as u64;
        let lo = self.u32()? as u64;
        Ok(hi << 32 | lo)
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self.pos.checked_add(len).ok_or_else(|| self.short())?;
        let slice = self.buf.get(self.pos..end).ok_or_else(|| self.short())?;
        self.pos = end;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), Error> {
        self.take(len).map(|_| ())
    }
}

#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::{Reader, Writer};
    use crate::core::error::ErrorKind;

    #[test]
    fn round_trip_widths() {
        let mut writer = Writer::new();
        writer.u8(0xCA);
        writer.u16(0xFEBA);
        writer.u32(0xDEAD_BEEF);
        let buf = writer.into_vec();

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.u8().expect("u8"), 0xCA);
        assert_eq!(reader.u16().expect("u16"), 0xFEBA);
        assert_eq!(reader.u32().expect("u32"), 0xDEAD_BEEF);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn big_endian_layout() {
        let mut writer = Writer::new();
        writer.u16(0x0102);
        assert_eq!(writer.into_vec(), vec![0x01, 0x02]);
    }

    #[test]
    fn short_read_is_corrupt() {
        let mut reader = Reader::new(&[0x01]);
        let err = reader.u16().expect_err("short");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }
}
