use crate::error::{NsofError, Result};
use crate::object::{NewtonObject, MAX_DEPTH};
use crate::tag;

/// Decode one root object (version byte + object).
///
/// Returns the object and the number of bytes consumed. Trailing bytes are
/// left for the caller.
pub fn decode_root(data: &[u8]) -> Result<(NewtonObject, usize)> {
    let mut decoder = Decoder::new(data);
    let version = decoder.read_u8()?;
    if version != 1 && version != tag::VERSION {
        return Err(NsofError::UnsupportedVersion(version));
    }
    let object = decoder.read_object()?;
    Ok((object, decoder.pos))
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    /// One entry per object that can be referenced by a precedent, in
    /// encounter order. Symbols keep their name for frame key lookup.
    precedents: Vec<Option<String>>,
    depth: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            precedents: Vec::new(),
            depth: 0,
        }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.data.get(self.pos).ok_or(NsofError::UnexpectedEnd {
            offset: self.pos,
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(NsofError::UnexpectedEnd {
                offset: self.data.len(),
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_xlong(&mut self) -> Result<u32> {
        match self.read_u8()? {
            0xff => {
                let bytes = self.read_bytes(4)?;
                Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            small => Ok(small as u32),
        }
    }

    fn read_len(&mut self) -> Result<usize> {
        Ok(self.read_xlong()? as usize)
    }

    fn reserve_precedent(&mut self) {
        self.precedents.push(None);
    }

    fn read_object(&mut self) -> Result<NewtonObject> {
        if self.depth == MAX_DEPTH {
            return Err(NsofError::TooDeep { limit: MAX_DEPTH });
        }
        self.depth += 1;
        let object = self.read_tagged();
        self.depth -= 1;
        object
    }

    fn read_tagged(&mut self) -> Result<NewtonObject> {
        let offset = self.pos;
        let object = match self.read_u8()? {
            tag::IMMEDIATE => {
                let reference = self.read_xlong()?;
                if reference & 0x3 == 0 {
                    NewtonObject::Integer(reference as i32 >> 2)
                } else if reference == tag::TRUE_REF {
                    NewtonObject::True
                } else {
                    NewtonObject::Immediate(reference)
                }
            }
            tag::CHARACTER => NewtonObject::Character(self.read_u8()?),
            tag::UNICODE_CHARACTER => {
                let bytes = self.read_bytes(2)?;
                NewtonObject::UnicodeCharacter(u16::from_be_bytes([bytes[0], bytes[1]]))
            }
            tag::BINARY => {
                self.reserve_precedent();
                let len = self.read_len()?;
                let class = Box::new(self.read_object()?);
                let data = self.read_bytes(len)?.to_vec();
                NewtonObject::Binary { class, data }
            }
            tag::ARRAY => {
                self.reserve_precedent();
                let count = self.read_len()?;
                let class = Box::new(self.read_object()?);
                let values = self.read_values(count)?;
                NewtonObject::Array { class, values }
            }
            tag::PLAIN_ARRAY => {
                self.reserve_precedent();
                let count = self.read_len()?;
                NewtonObject::PlainArray(self.read_values(count)?)
            }
            tag::FRAME => {
                self.reserve_precedent();
                let count = self.read_len()?;
                let mut keys = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    let key = self.read_object()?;
                    keys.push(self.frame_key(key)?);
                }
                let values = self.read_values(count)?;
                NewtonObject::Frame(keys.into_iter().zip(values).collect())
            }
            tag::SYMBOL => {
                let len = self.read_len()?;
                let bytes = self.read_bytes(len)?;
                if !bytes.is_ascii() {
                    return Err(NsofError::InvalidSymbol);
                }
                let name = String::from_utf8_lossy(bytes).into_owned();
                self.precedents.push(Some(name.clone()));
                NewtonObject::Symbol(name)
            }
            tag::STRING => {
                self.reserve_precedent();
                let len = self.read_len()?;
                NewtonObject::String(decode_utf16(self.read_bytes(len)?)?)
            }
            tag::PRECEDENT => {
                let index = self.read_xlong()?;
                let count = self.precedents.len() as u32;
                if index >= count {
                    return Err(NsofError::DanglingPrecedent { index, count });
                }
                // Symbols are values, not shared structure.
                match &self.precedents[index as usize] {
                    Some(name) => NewtonObject::Symbol(name.clone()),
                    None => NewtonObject::Precedent(index),
                }
            }
            tag::NIL => NewtonObject::Nil,
            tag::SMALL_RECT => {
                self.reserve_precedent();
                let bytes = self.read_bytes(4)?;
                NewtonObject::SmallRect {
                    top: bytes[0],
                    left: bytes[1],
                    bottom: bytes[2],
                    right: bytes[3],
                }
            }
            other => return Err(NsofError::UnknownTag { tag: other, offset }),
        };
        Ok(object)
    }

    fn read_values(&mut self, count: usize) -> Result<Vec<NewtonObject>> {
        // Every object takes at least one byte; don't trust `count` for capacity.
        let mut values = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            values.push(self.read_object()?);
        }
        Ok(values)
    }

    fn frame_key(&self, key: NewtonObject) -> Result<String> {
        match key {
            NewtonObject::Symbol(name) => Ok(name),
            NewtonObject::Precedent(index) => self
                .precedents
                .get(index as usize)
                .and_then(Clone::clone)
                .ok_or(NsofError::InvalidFrameKey),
            _ => Err(NsofError::InvalidFrameKey),
        }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

fn decode_utf16(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(NsofError::InvalidString);
    }
    let mut units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    if units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16(&units).map_err(|_| NsofError::InvalidString)
}
