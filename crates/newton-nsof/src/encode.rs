use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{NsofError, Result};
use crate::object::{NewtonObject, MAX_DEPTH, MAX_INTEGER, MIN_INTEGER};
use crate::tag;

/// Encode `object` as a root (version byte + object).
///
/// Repeated symbols are written as precedents. `Precedent` values are
/// written as given, so a decoded object re-encodes to the same bytes.
pub fn encode_root(object: &NewtonObject) -> Result<Bytes> {
    let mut encoder = Encoder::default();
    encoder.buf.put_u8(tag::VERSION);
    encoder.write_object(object)?;
    Ok(encoder.buf.freeze())
}

#[derive(Default)]
struct Encoder {
    buf: BytesMut,
    /// Objects written so far that a precedent may refer to.
    count: u32,
    symbols: HashMap<String, u32>,
    depth: usize,
}

impl Encoder {
    fn write_xlong(&mut self, value: u32) {
        if value < 0xff {
            self.buf.put_u8(value as u8);
        } else {
            self.buf.put_u8(0xff);
            self.buf.put_u32(value);
        }
    }

    fn write_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len).map_err(|_| NsofError::LengthTooLarge(len))?;
        self.write_xlong(len);
        Ok(())
    }

    fn write_immediate(&mut self, reference: u32) {
        self.buf.put_u8(tag::IMMEDIATE);
        self.write_xlong(reference);
    }

    fn next_precedent(&mut self) -> u32 {
        let index = self.count;
        self.count += 1;
        index
    }

    fn write_object(&mut self, object: &NewtonObject) -> Result<()> {
        if self.depth == MAX_DEPTH {
            return Err(NsofError::TooDeep { limit: MAX_DEPTH });
        }
        self.depth += 1;
        let written = self.write_tagged(object);
        self.depth -= 1;
        written
    }

    fn write_tagged(&mut self, object: &NewtonObject) -> Result<()> {
        match object {
            NewtonObject::Integer(value) => {
                if !(MIN_INTEGER..=MAX_INTEGER).contains(value) {
                    return Err(NsofError::IntegerOutOfRange(*value));
                }
                self.write_immediate((*value << 2) as u32);
            }
            NewtonObject::True => self.write_immediate(tag::TRUE_REF),
            NewtonObject::Immediate(reference) => self.write_immediate(*reference),
            NewtonObject::Character(c) => {
                self.buf.put_u8(tag::CHARACTER);
                self.buf.put_u8(*c);
            }
            NewtonObject::UnicodeCharacter(c) => {
                self.buf.put_u8(tag::UNICODE_CHARACTER);
                self.buf.put_u16(*c);
            }
            NewtonObject::Binary { class, data } => {
                self.next_precedent();
                self.buf.put_u8(tag::BINARY);
                self.write_len(data.len())?;
                self.write_object(class)?;
                self.buf.put_slice(data);
            }
            NewtonObject::Array { class, values } => {
                self.next_precedent();
                self.buf.put_u8(tag::ARRAY);
                self.write_len(values.len())?;
                self.write_object(class)?;
                for value in values {
                    self.write_object(value)?;
                }
            }
            NewtonObject::PlainArray(values) => {
                self.next_precedent();
                self.buf.put_u8(tag::PLAIN_ARRAY);
                self.write_len(values.len())?;
                for value in values {
                    self.write_object(value)?;
                }
            }
            NewtonObject::Frame(slots) => {
                self.next_precedent();
                self.buf.put_u8(tag::FRAME);
                self.write_len(slots.len())?;
                for (key, _) in slots {
                    self.write_symbol(key)?;
                }
                for (_, value) in slots {
                    self.write_object(value)?;
                }
            }
            NewtonObject::Symbol(name) => self.write_symbol(name)?,
            NewtonObject::String(text) => {
                self.next_precedent();
                let units: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
                self.buf.put_u8(tag::STRING);
                self.write_len(units.len() * 2)?;
                for unit in units {
                    self.buf.put_u16(unit);
                }
            }
            NewtonObject::Precedent(index) => {
                if *index >= self.count {
                    return Err(NsofError::DanglingPrecedent {
                        index: *index,
                        count: self.count,
                    });
                }
                self.buf.put_u8(tag::PRECEDENT);
                self.write_xlong(*index);
            }
            NewtonObject::Nil => self.buf.put_u8(tag::NIL),
            NewtonObject::SmallRect {
                top,
                left,
                bottom,
                right,
            } => {
                self.next_precedent();
                self.buf.put_u8(tag::SMALL_RECT);
                self.buf.put_slice(&[*top, *left, *bottom, *right]);
            }
        }
        Ok(())
    }

    fn write_symbol(&mut self, name: &str) -> Result<()> {
        if let Some(&index) = self.symbols.get(name) {
            self.buf.put_u8(tag::PRECEDENT);
            self.write_xlong(index);
            return Ok(());
        }
        if !name.is_ascii() {
            return Err(NsofError::InvalidSymbol);
        }
        let index = self.next_precedent();
        self.symbols.insert(name.to_owned(), index);
        self.buf.put_u8(tag::SYMBOL);
        self.write_len(name.len())?;
        self.buf.put_slice(name.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_root;
    use crate::tests::{DESKTOP_APPS, PERSON_FRAME, STORE_INFO};

    #[test]
    fn decoded_streams_reencode_identically() {
        for stream in [&STORE_INFO[..], &DESKTOP_APPS[..], &PERSON_FRAME[..]] {
            let (object, _) = decode_root(stream).unwrap();
            assert_eq!(encode_root(&object).unwrap().as_ref(), stream);
        }
    }

    #[test]
    fn desktop_apps_from_scratch() {
        let apps = NewtonObject::PlainArray(vec![NewtonObject::frame([
            ("id", NewtonObject::from(2)),
            ("name", NewtonObject::from("Newton Connection Utilities")),
            ("version", NewtonObject::from(1)),
        ])]);
        assert_eq!(encode_root(&apps).unwrap().as_ref(), &DESKTOP_APPS[..]);
    }

    #[test]
    fn person_frame_from_scratch() {
        let fax = "408-974-9094";
        let mut fax_data: Vec<u8> = fax.encode_utf16().flat_map(u16::to_be_bytes).collect();
        fax_data.extend_from_slice(&[0, 0]);

        let person = NewtonObject::frame([
            ("name", NewtonObject::from("Walter Smith")),
            ("cats", NewtonObject::from(2)),
            (
                "bounds",
                NewtonObject::SmallRect {
                    top: 14,
                    left: 10,
                    bottom: 100,
                    right: 40,
                },
            ),
            ("uchar", NewtonObject::UnicodeCharacter(8226)),
            (
                "phones",
                NewtonObject::PlainArray(vec![
                    NewtonObject::from("408-996-1010"),
                    NewtonObject::Binary {
                        class: Box::new(NewtonObject::symbol("faxPhone")),
                        data: fax_data,
                    },
                ]),
            ),
            // Same string object as "name".
            ("nameAgain", NewtonObject::Precedent(7)),
        ]);
        assert_eq!(encode_root(&person).unwrap().as_ref(), &PERSON_FRAME[..]);
    }

    #[test]
    fn repeated_symbols_become_precedents() {
        let object = NewtonObject::PlainArray(vec![
            NewtonObject::frame([("class", NewtonObject::symbol("class"))]),
            NewtonObject::symbol("class"),
        ]);
        let bytes = encode_root(&object).unwrap();
        assert_eq!(
            bytes.as_ref(),
            &[
                0x02, 0x05, 0x02, 0x06, 0x01, 0x07, 0x05, b'c', b'l', b'a', b's', b's', 0x09,
                0x02, 0x09, 0x02
            ]
        );

        let (decoded, _) = decode_root(&bytes).unwrap();
        assert_eq!(decoded, object);
        assert_eq!(encode_root(&decoded).unwrap(), bytes);
    }

    fn assert_round_trip(object: NewtonObject, expected: &[u8]) {
        let bytes = encode_root(&object).unwrap();
        assert_eq!(bytes.as_ref(), expected);
        let (decoded, used) = decode_root(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(decoded, object);
        assert_eq!(encode_root(&decoded).unwrap(), bytes);
    }

    #[test]
    fn character_round_trips() {
        assert_round_trip(NewtonObject::Character(b'N'), &[0x02, 0x01, b'N']);
    }

    #[test]
    fn class_tagged_array_round_trips() {
        assert_round_trip(
            NewtonObject::Array {
                class: Box::new(NewtonObject::symbol("pt")),
                values: vec![NewtonObject::Integer(3), NewtonObject::symbol("pt")],
            },
            &[
                0x02, 0x04, 0x02, 0x07, 0x02, b'p', b't', 0x00, 0x0c, 0x09, 0x01,
            ],
        );
    }

    #[test]
    fn raw_immediate_round_trips() {
        assert_round_trip(NewtonObject::Immediate(0x06), &[0x02, 0x00, 0x06]);
        assert_round_trip(
            NewtonObject::Immediate(0x0004_1236),
            &[0x02, 0x00, 0xff, 0x00, 0x04, 0x12, 0x36],
        );
    }

    #[test]
    fn nesting_limit_enforced() {
        let nested = |levels: usize| {
            (0..levels).fold(NewtonObject::Nil, |inner, _| {
                NewtonObject::PlainArray(vec![inner])
            })
        };

        assert!(encode_root(&nested(MAX_DEPTH - 1)).is_ok());
        assert!(matches!(
            encode_root(&nested(MAX_DEPTH)),
            Err(NsofError::TooDeep { limit: MAX_DEPTH })
        ));
    }

    #[test]
    fn long_string_uses_wide_length() {
        let text = "x".repeat(200);
        let bytes = encode_root(&NewtonObject::string(text.clone())).unwrap();
        assert_eq!(&bytes[..7], &[0x02, 0x08, 0xff, 0x00, 0x00, 0x01, 0x92]);

        let (decoded, used) = decode_root(&bytes).unwrap();
        assert_eq!(decoded, NewtonObject::String(text));
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn integer_range_enforced() {
        assert!(encode_root(&NewtonObject::Integer(MAX_INTEGER)).is_ok());
        assert!(encode_root(&NewtonObject::Integer(MIN_INTEGER)).is_ok());
        assert!(matches!(
            encode_root(&NewtonObject::Integer(MAX_INTEGER + 1)),
            Err(NsofError::IntegerOutOfRange(_))
        ));
    }

    #[test]
    fn precedent_must_point_backwards() {
        let object = NewtonObject::PlainArray(vec![NewtonObject::Precedent(1)]);
        assert!(matches!(
            encode_root(&object),
            Err(NsofError::DanglingPrecedent { index: 1, count: 1 })
        ));
    }

    #[test]
    fn non_ascii_symbol_rejected() {
        assert!(matches!(
            encode_root(&NewtonObject::symbol("café")),
            Err(NsofError::InvalidSymbol)
        ));
    }

    #[test]
    fn negative_integer_round_trips_through_immediate() {
        let bytes = encode_root(&NewtonObject::Integer(-450135364)).unwrap();
        assert_eq!(bytes.as_ref(), &[0x02, 0x00, 0xff, 0x94, 0xad, 0xea, 0xf0]);
    }
}
