use crate::errors::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// Byte emission for the class file format
///
/// The format is too irregular for an off-the-shelf serialization framework
/// to buy much here: tags are bare `u8`s, most sequences carry `u16` counts,
/// and attribute bodies are length-prefixed blobs whose size is only known
/// once their contents have been encoded. A thin trait over `byteorder`'s
/// big-endian writers covers all of it.
pub trait Serialize: Sized {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

// Single-byte values have no endianness to speak of
impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

macro_rules! serialize_big_endian {
    ($($typ:ty => $write:ident),* $(,)?) => {
        $(
            impl Serialize for $typ {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                    writer.$write::<BigEndian>(*self)
                }
            }
        )*
    };
}

serialize_big_endian! {
    u16 => write_u16,
    u32 => write_u32,
    i16 => write_i16,
    i32 => write_i32,
    i64 => write_i64,
    f32 => write_f32,
    f64 => write_f64,
}

/// Sequences write their element count as a leading `u16`
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for element in self {
            element.serialize(writer)?;
        }
        Ok(())
    }
}

/// Cursor over class bytes for the parsing direction
///
/// All multi-byte reads are big-endian; running off the end of the input is
/// reported as [`Error::ClassFormat`] rather than a bare I/O error.
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> ByteReader<'a> {
        ByteReader { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn bytes(&mut self, count: usize) -> std::result::Result<&'a [u8], Error> {
        if self.remaining() < count {
            return Err(Error::ClassFormat(format!(
                "unexpected end of class file at offset {}",
                self.position
            )));
        }
        let slice = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    pub fn skip(&mut self, count: usize) -> std::result::Result<(), Error> {
        self.bytes(count).map(|_| ())
    }

    pub fn u8(&mut self) -> std::result::Result<u8, Error> {
        let mut bytes = self.bytes(1)?;
        Ok(bytes.read_u8().expect("sliced read"))
    }

    pub fn u16(&mut self) -> std::result::Result<u16, Error> {
        let mut bytes = self.bytes(2)?;
        Ok(bytes.read_u16::<BigEndian>().expect("sliced read"))
    }

    pub fn u32(&mut self) -> std::result::Result<u32, Error> {
        let mut bytes = self.bytes(4)?;
        Ok(bytes.read_u32::<BigEndian>().expect("sliced read"))
    }

    pub fn i8(&mut self) -> std::result::Result<i8, Error> {
        Ok(self.u8()? as i8)
    }

    pub fn i16(&mut self) -> std::result::Result<i16, Error> {
        Ok(self.u16()? as i16)
    }

    pub fn i32(&mut self) -> std::result::Result<i32, Error> {
        Ok(self.u32()? as i32)
    }

    pub fn i64(&mut self) -> std::result::Result<i64, Error> {
        let mut bytes = self.bytes(8)?;
        Ok(bytes.read_i64::<BigEndian>().expect("sliced read"))
    }

    pub fn f32(&mut self) -> std::result::Result<f32, Error> {
        let mut bytes = self.bytes(4)?;
        Ok(bytes.read_f32::<BigEndian>().expect("sliced read"))
    }

    pub fn f64(&mut self) -> std::result::Result<f64, Error> {
        let mut bytes = self.bytes(8)?;
        Ok(bytes.read_f64::<BigEndian>().expect("sliced read"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn primitive_round_trip() {
        let mut buffer: Vec<u8> = vec![];
        0xCAFEBABEu32.serialize(&mut buffer).unwrap();
        0x0034u16.serialize(&mut buffer).unwrap();
        (-2i16).serialize(&mut buffer).unwrap();

        let mut reader = ByteReader::new(&buffer);
        assert_eq!(reader.u32().unwrap(), 0xCAFEBABE);
        assert_eq!(reader.u16().unwrap(), 0x0034);
        assert_eq!(reader.i16().unwrap(), -2);
        assert!(reader.u8().is_err());
    }

    #[test]
    fn vec_length_prefix() {
        let mut buffer: Vec<u8> = vec![];
        vec![7u16, 8u16].serialize(&mut buffer).unwrap();
        assert_eq!(buffer, vec![0, 2, 0, 7, 0, 8]);
    }
}
