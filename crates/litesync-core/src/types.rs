use bytes::Bytes;

/// Minimum bytes charged per field when estimating buffered size.
pub const MIN_FIELD_SIZE: usize = 4;

/// A value ready to be written to the replica.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LiteValue {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// UTF-8 text passed through undecoded; the replica converts it.
    RawText(Bytes),
    Blob(Vec<u8>),
}

impl LiteValue {
    pub fn is_null(&self) -> bool {
        matches!(self, LiteValue::Null)
    }

    /// Approximate in-memory size, used for flush thresholds.
    pub fn estimated_size(&self) -> usize {
        let size = match self {
            LiteValue::Null => 0,
            LiteValue::Integer(_) | LiteValue::Real(_) => 8,
            LiteValue::Text(s) => s.len(),
            LiteValue::RawText(b) => b.len(),
            LiteValue::Blob(b) => b.len(),
        };
        size.max(MIN_FIELD_SIZE)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            LiteValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LiteValue::Real(f) => Some(*f),
            LiteValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Text content, for both decoded and passthrough text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            LiteValue::Text(s) => Some(s),
            LiteValue::RawText(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimated_size_has_floor() {
        assert_eq!(LiteValue::Null.estimated_size(), MIN_FIELD_SIZE);
        assert_eq!(LiteValue::Text("a".into()).estimated_size(), MIN_FIELD_SIZE);
        assert_eq!(LiteValue::Text("hello".into()).estimated_size(), 5);
        assert_eq!(
            LiteValue::RawText(Bytes::from_static(b"0123456789")).estimated_size(),
            10
        );
    }

    #[test]
    fn test_as_text() {
        assert_eq!(LiteValue::Text("x".into()).as_text(), Some("x"));
        assert_eq!(
            LiteValue::RawText(Bytes::from_static(b"raw")).as_text(),
            Some("raw")
        );
        assert_eq!(LiteValue::Integer(1).as_text(), None);
    }
}
