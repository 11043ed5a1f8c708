use serde::Serialize;

/// Smallest integer representable as an immediate.
pub const MIN_INTEGER: i32 = -(1 << 29);
/// Largest integer representable as an immediate.
pub const MAX_INTEGER: i32 = (1 << 29) - 1;

/// Deepest nesting of arrays, frames and binaries the codec will walk.
pub const MAX_DEPTH: usize = 256;

/// A value in the Newton object system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum NewtonObject {
    /// 30-bit signed integer.
    Integer(i32),
    /// 8-bit character.
    Character(u8),
    /// 16-bit character.
    UnicodeCharacter(u16),
    True,
    Nil,
    /// Any immediate reference that isn't an integer or `true`.
    Immediate(u32),
    Symbol(String),
    String(String),
    /// Raw bytes tagged with a class, usually a symbol.
    Binary {
        class: Box<NewtonObject>,
        #[serde(with = "hex_bytes")]
        data: Vec<u8>,
    },
    /// Array with a class.
    Array {
        class: Box<NewtonObject>,
        values: Vec<NewtonObject>,
    },
    PlainArray(Vec<NewtonObject>),
    /// Slots in insertion order.
    Frame(Vec<(String, NewtonObject)>),
    SmallRect {
        top: u8,
        left: u8,
        bottom: u8,
        right: u8,
    },
    /// Back-reference to an earlier non-symbol object in the same stream.
    /// References to symbols decode as the symbol itself.
    Precedent(u32),
}

impl NewtonObject {
    /// Build a frame from `(key, value)` pairs.
    pub fn frame<K, I>(slots: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, NewtonObject)>,
    {
        Self::Frame(slots.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    pub fn string(text: impl Into<String>) -> Self {
        Self::String(text.into())
    }

    /// Look up a frame slot by name.
    pub fn get(&self, key: &str) -> Option<&NewtonObject> {
        match self {
            Self::Frame(slots) => slots.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) | Self::Symbol(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }
}

impl From<i32> for NewtonObject {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for NewtonObject {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::Nil
        }
    }
}

impl From<&str> for NewtonObject {
    fn from(text: &str) -> Self {
        Self::String(text.to_owned())
    }
}

impl From<String> for NewtonObject {
    fn from(text: String) -> Self {
        Self::String(text)
    }
}

impl From<Vec<NewtonObject>> for NewtonObject {
    fn from(values: Vec<NewtonObject>) -> Self {
        Self::PlainArray(values)
    }
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_lookup_by_key() {
        let app = NewtonObject::frame([
            ("id", NewtonObject::from(2)),
            ("name", NewtonObject::from("Newton Connection Utilities")),
        ]);
        assert_eq!(app.get("id").and_then(NewtonObject::as_integer), Some(2));
        assert_eq!(
            app.get("name").and_then(NewtonObject::as_str),
            Some("Newton Connection Utilities")
        );
        assert!(app.get("version").is_none());
        assert!(NewtonObject::Nil.get("id").is_none());
    }

    #[test]
    fn bool_maps_to_true_and_nil() {
        assert_eq!(NewtonObject::from(true), NewtonObject::True);
        assert!(NewtonObject::from(false).is_nil());
    }

    #[test]
    fn serializes_to_tagged_json() {
        let binary = NewtonObject::Binary {
            class: Box::new(NewtonObject::symbol("faxPhone")),
            data: vec![0x00, 0x34, 0xff],
        };
        let json = serde_json::to_value(&binary).unwrap();
        assert_eq!(json["type"], "binary");
        assert_eq!(json["value"]["data"], "0034ff");
        assert_eq!(json["value"]["class"]["value"], "faxPhone");
    }
}
