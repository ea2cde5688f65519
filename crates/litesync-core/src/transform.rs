//! Conversion of COPY text fields into replica values.
//!
//! Each column gets a [`ValueParser`] chosen from its upstream type. Parsers
//! are looked up through [`TypeParsers`], which is seeded from `pg_type` when
//! connected and falls back to the built-in types otherwise.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;

use crate::copy::CopyField;
use crate::error::{Error, Result};
use crate::schema::{ColumnSpec, PgTypeClass};
use crate::types::LiteValue;

/// `pg_type.typcategory` for arrays.
const ARRAY_CATEGORY: char = 'A';

/// How a single column's text is turned into a [`LiteValue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueParser {
    /// Handed to the replica as-is and converted to TEXT there.
    RawText,
    Boolean,
    Integer,
    Real,
    /// `timestamp`, stored as epoch milliseconds.
    Timestamp,
    /// `timestamptz`, stored as epoch milliseconds.
    TimestampTz,
    /// `date`, stored as epoch milliseconds at midnight UTC.
    Date,
    /// `bytea` in hex output format.
    Bytea,
    /// Array literal, stored as JSON text.
    Array(Box<ValueParser>),
}

impl ValueParser {
    /// Whether values are bound as raw text and must be cast by the replica.
    pub fn is_raw_text(&self) -> bool {
        matches!(self, ValueParser::RawText)
    }

    /// Convert one non-null field.
    pub fn parse(&self, raw: Bytes) -> Result<LiteValue> {
        match self {
            ValueParser::RawText => Ok(LiteValue::RawText(raw)),
            ValueParser::Bytea => parse_bytea(&raw).map(LiteValue::Blob),
            ValueParser::Array(elem) => {
                let text = as_str("array", &raw)?;
                let json = parse_array(text, elem)?;
                Ok(LiteValue::Text(serde_json::to_string(&json)?))
            }
            scalar => {
                let text = as_str(scalar.type_name(), &raw)?;
                scalar.parse_scalar(text)
            }
        }
    }

    fn parse_scalar(&self, text: &str) -> Result<LiteValue> {
        let value = match self {
            ValueParser::Boolean => LiteValue::Integer(parse_bool(text)? as i64),
            ValueParser::Integer => LiteValue::Integer(
                text.parse::<i64>()
                    .map_err(|e| Error::invalid_value("integer", text.as_bytes(), e))?,
            ),
            ValueParser::Real => LiteValue::Real(parse_real(text)?),
            ValueParser::Timestamp => LiteValue::Real(parse_timestamp(text)?),
            ValueParser::TimestampTz => LiteValue::Real(parse_timestamptz(text)?),
            ValueParser::Date => LiteValue::Real(parse_date(text)?),
            ValueParser::RawText => LiteValue::Text(text.to_string()),
            ValueParser::Bytea => LiteValue::Blob(parse_bytea(text.as_bytes())?),
            ValueParser::Array(elem) => {
                LiteValue::Text(serde_json::to_string(&parse_array(text, elem)?)?)
            }
        };
        Ok(value)
    }

    /// Convert one array element to JSON.
    fn to_json(&self, text: &str) -> Result<JsonValue> {
        let json = match self {
            ValueParser::RawText | ValueParser::Bytea | ValueParser::Array(_) => {
                JsonValue::String(text.to_string())
            }
            ValueParser::Boolean => JsonValue::Bool(parse_bool(text)?),
            ValueParser::Integer => JsonValue::from(
                text.parse::<i64>()
                    .map_err(|e| Error::invalid_value("integer", text.as_bytes(), e))?,
            ),
            ValueParser::Real => float_json(parse_real(text)?),
            ValueParser::Timestamp => float_json(parse_timestamp(text)?),
            ValueParser::TimestampTz => float_json(parse_timestamptz(text)?),
            ValueParser::Date => float_json(parse_date(text)?),
        };
        Ok(json)
    }

    fn type_name(&self) -> &'static str {
        match self {
            ValueParser::RawText => "text",
            ValueParser::Boolean => "boolean",
            ValueParser::Integer => "integer",
            ValueParser::Real => "real",
            ValueParser::Timestamp => "timestamp",
            ValueParser::TimestampTz => "timestamptz",
            ValueParser::Date => "date",
            ValueParser::Bytea => "bytea",
            ValueParser::Array(_) => "array",
        }
    }
}

fn as_str<'a>(type_name: &'static str, raw: &'a [u8]) -> Result<&'a str> {
    std::str::from_utf8(raw).map_err(|e| Error::invalid_value(type_name, raw, e))
}

fn float_json(value: f64) -> JsonValue {
    serde_json::Number::from_f64(value)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

fn parse_bool(text: &str) -> Result<bool> {
    match text {
        "t" => Ok(true),
        "f" => Ok(false),
        _ => Err(Error::invalid_value(
            "boolean",
            text.as_bytes(),
            "expected 't' or 'f'",
        )),
    }
}

fn parse_real(text: &str) -> Result<f64> {
    text.parse::<f64>()
        .map_err(|e| Error::invalid_value("real", text.as_bytes(), e))
}

fn infinity(text: &str) -> Option<f64> {
    match text {
        "infinity" => Some(f64::INFINITY),
        "-infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

fn parse_timestamp(text: &str) -> Result<f64> {
    if let Some(inf) = infinity(text) {
        return Ok(inf);
    }
    let ts = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| Error::invalid_value("timestamp", text.as_bytes(), e))?;
    Ok(ts.and_utc().timestamp_micros() as f64 / 1000.0)
}

fn parse_timestamptz(text: &str) -> Result<f64> {
    if let Some(inf) = infinity(text) {
        return Ok(inf);
    }
    let ts = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
        .map_err(|e| Error::invalid_value("timestamptz", text.as_bytes(), e))?;
    Ok(ts.timestamp_micros() as f64 / 1000.0)
}

fn parse_date(text: &str) -> Result<f64> {
    if let Some(inf) = infinity(text) {
        return Ok(inf);
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| Error::invalid_value("date", text.as_bytes(), e))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::invalid_value("date", text.as_bytes(), "out of range"))?;
    Ok(midnight.and_utc().timestamp_millis() as f64)
}

fn parse_bytea(raw: &[u8]) -> Result<Vec<u8>> {
    let hex_digits = raw
        .strip_prefix(b"\\x")
        .ok_or_else(|| Error::invalid_value("bytea", raw, "expected hex format"))?;
    hex::decode(hex_digits).map_err(|e| Error::invalid_value("bytea", raw, e))
}

/// Parse a Postgres array literal such as `{1,2,NULL}` or `{{"a b",c},{d,e}}`.
pub fn parse_array(text: &str, elem: &ValueParser) -> Result<JsonValue> {
    let mut parser = ArrayLiteral {
        input: text.as_bytes(),
        pos: 0,
        elem,
    };
    // Arrays with non-default bounds carry a `[lo:hi]=` prefix.
    if parser.peek() == Some(b'[') {
        let eq = text
            .find('=')
            .ok_or_else(|| parser.error("unterminated dimension decoration"))?;
        parser.pos = eq + 1;
    }
    let value = parser.parse_level()?;
    parser.skip_whitespace();
    if parser.pos != parser.input.len() {
        return Err(parser.error("trailing characters after array"));
    }
    Ok(value)
}

struct ArrayLiteral<'a> {
    input: &'a [u8],
    pos: usize,
    elem: &'a ValueParser,
}

impl ArrayLiteral<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn error(&self, reason: &str) -> Error {
        Error::invalid_value("array", self.input, reason)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() != Some(byte) {
            return Err(self.error(&format!("expected '{}'", char::from(byte))));
        }
        self.pos += 1;
        Ok(())
    }

    fn parse_level(&mut self) -> Result<JsonValue> {
        self.skip_whitespace();
        self.expect(b'{')?;
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(JsonValue::Array(items));
        }
        loop {
            self.skip_whitespace();
            let item = match self.peek() {
                Some(b'{') => self.parse_level()?,
                Some(b'"') => {
                    let s = self.parse_quoted()?;
                    self.elem.to_json(&s)?
                }
                Some(_) => self.parse_unquoted()?,
                None => return Err(self.error("unterminated array")),
            };
            items.push(item);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(JsonValue::Array(items));
                }
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn parse_quoted(&mut self) -> Result<String> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = self
                        .peek()
                        .ok_or_else(|| self.error("unterminated escape"))?;
                    out.push(escaped);
                    self.pos += 1;
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated quoted element")),
            }
        }
        String::from_utf8(out).map_err(|e| self.error(&e.to_string()))
    }

    fn parse_unquoted(&mut self) -> Result<JsonValue> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b',' || b == b'}' {
                break;
            }
            self.pos += 1;
        }
        let token = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|e| self.error(&e.to_string()))?
            .trim();
        if token.is_empty() {
            return Err(self.error("empty unquoted element"));
        }
        if token.eq_ignore_ascii_case("NULL") {
            return Ok(JsonValue::Null);
        }
        self.elem.to_json(token)
    }
}

/// A row of `pg_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgTypeInfo {
    pub oid: u32,
    pub name: String,
    pub class: Option<PgTypeClass>,
    pub category: char,
    /// Element type for arrays, 0 otherwise.
    pub elem_oid: u32,
    /// Base type for domains, 0 otherwise.
    pub base_oid: u32,
}

impl PgTypeInfo {
    fn builtin(oid: u32, name: &str, category: char, elem_oid: u32) -> Self {
        PgTypeInfo {
            oid,
            name: name.to_string(),
            class: Some(PgTypeClass::Base),
            category,
            elem_oid,
            base_oid: 0,
        }
    }
}

/// Source of value parsers, keyed by type OID.
pub trait TypeParsers: Send + Sync {
    fn parser_for(&self, type_oid: u32) -> ValueParser;
}

/// Type catalog used to choose value parsers.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<u32, PgTypeInfo>,
}

impl TypeRegistry {
    /// Registry with the built-in types only.
    pub fn builtin() -> Self {
        let scalars: &[(u32, &str, char)] = &[
            (16, "bool", 'B'),
            (17, "bytea", 'U'),
            (18, "char", 'Z'),
            (19, "name", 'S'),
            (20, "int8", 'N'),
            (21, "int2", 'N'),
            (23, "int4", 'N'),
            (25, "text", 'S'),
            (26, "oid", 'N'),
            (114, "json", 'U'),
            (700, "float4", 'N'),
            (701, "float8", 'N'),
            (1042, "bpchar", 'S'),
            (1043, "varchar", 'S'),
            (1082, "date", 'D'),
            (1083, "time", 'D'),
            (1114, "timestamp", 'D'),
            (1184, "timestamptz", 'D'),
            (1700, "numeric", 'N'),
            (2950, "uuid", 'U'),
            (3802, "jsonb", 'U'),
        ];
        let arrays: &[(u32, &str, u32)] = &[
            (1000, "_bool", 16),
            (1001, "_bytea", 17),
            (1005, "_int2", 21),
            (1007, "_int4", 23),
            (1009, "_text", 25),
            (1015, "_varchar", 1043),
            (1016, "_int8", 20),
            (1021, "_float4", 700),
            (1022, "_float8", 701),
            (1115, "_timestamp", 1114),
            (1182, "_date", 1082),
            (1185, "_timestamptz", 1184),
            (1231, "_numeric", 1700),
            (199, "_json", 114),
            (2951, "_uuid", 2950),
            (3807, "_jsonb", 3802),
        ];

        let types = scalars
            .iter()
            .map(|&(oid, name, category)| PgTypeInfo::builtin(oid, name, category, 0))
            .chain(
                arrays
                    .iter()
                    .map(|&(oid, name, elem)| PgTypeInfo::builtin(oid, name, ARRAY_CATEGORY, elem)),
            )
            .map(|info| (info.oid, info))
            .collect();
        TypeRegistry { types }
    }

    /// Built-in types extended with the given catalog rows.
    pub fn from_types(types: impl IntoIterator<Item = PgTypeInfo>) -> Self {
        let mut registry = Self::builtin();
        for info in types {
            registry.insert(info);
        }
        registry
    }

    pub fn insert(&mut self, info: PgTypeInfo) {
        self.types.insert(info.oid, info);
    }

    pub fn get(&self, oid: u32) -> Option<&PgTypeInfo> {
        self.types.get(&oid)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn resolve(&self, oid: u32, depth: usize) -> ValueParser {
        // Domains over domains are rare; cap the chain.
        if depth > 8 {
            return ValueParser::RawText;
        }
        let Some(info) = self.types.get(&oid) else {
            return ValueParser::RawText;
        };
        if info.category == ARRAY_CATEGORY && info.elem_oid != 0 {
            return ValueParser::Array(Box::new(self.resolve(info.elem_oid, depth + 1)));
        }
        match info.class {
            Some(PgTypeClass::Domain) if info.base_oid != 0 => {
                return self.resolve(info.base_oid, depth + 1)
            }
            Some(PgTypeClass::Enum) => return ValueParser::RawText,
            _ => {}
        }
        match info.name.as_str() {
            "bool" => ValueParser::Boolean,
            "int2" | "int4" | "int8" | "oid" => ValueParser::Integer,
            "float4" | "float8" | "numeric" => ValueParser::Real,
            "timestamp" => ValueParser::Timestamp,
            "timestamptz" => ValueParser::TimestampTz,
            "date" => ValueParser::Date,
            "bytea" => ValueParser::Bytea,
            _ => ValueParser::RawText,
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TypeParsers for TypeRegistry {
    fn parser_for(&self, type_oid: u32) -> ValueParser {
        self.resolve(type_oid, 0)
    }
}

/// Converts the fields of one table's rows, column by column.
#[derive(Debug, Clone)]
pub struct RowConverter {
    parsers: Vec<ValueParser>,
}

impl RowConverter {
    /// Build a converter for columns in COPY order.
    pub fn new<'a>(
        columns: impl IntoIterator<Item = &'a ColumnSpec>,
        types: &dyn TypeParsers,
    ) -> Self {
        let parsers = columns
            .into_iter()
            .map(|c| types.parser_for(c.type_oid))
            .collect();
        RowConverter { parsers }
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    /// Convert the field for `column`. NULL stays NULL for every type.
    pub fn convert(&self, column: usize, field: CopyField) -> Result<LiteValue> {
        match field {
            None => Ok(LiteValue::Null),
            Some(raw) => match self.parsers.get(column) {
                Some(parser) => parser.parse(raw),
                None => Err(Error::TruncatedRow {
                    got: column + 1,
                    expected: self.parsers.len(),
                }),
            },
        }
    }

    /// Per column, whether it is bound as raw text.
    pub fn raw_text_columns(&self) -> Vec<bool> {
        self.parsers.iter().map(ValueParser::is_raw_text).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(parser: ValueParser, s: &str) -> LiteValue {
        parser.parse(Bytes::copy_from_slice(s.as_bytes())).unwrap()
    }

    fn column(name: &str, pos: i32, type_oid: u32) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            pos,
            data_type: String::new(),
            type_oid,
            not_null: false,
            dflt: None,
            character_maximum_length: None,
            pg_type_class: Some(PgTypeClass::Base),
            elem_pg_type_class: None,
        }
    }

    #[test]
    fn test_scalars() {
        assert_eq!(parse(ValueParser::Boolean, "t"), LiteValue::Integer(1));
        assert_eq!(parse(ValueParser::Boolean, "f"), LiteValue::Integer(0));
        assert_eq!(parse(ValueParser::Integer, "-42"), LiteValue::Integer(-42));
        assert_eq!(parse(ValueParser::Real, "1.5"), LiteValue::Real(1.5));
        assert_eq!(
            parse(ValueParser::Real, "Infinity"),
            LiteValue::Real(f64::INFINITY)
        );
        assert!(ValueParser::Integer
            .parse(Bytes::from_static(b"abc"))
            .is_err());
        assert!(ValueParser::Boolean
            .parse(Bytes::from_static(b"yes"))
            .is_err());
    }

    #[test]
    fn test_raw_text_is_passed_through() {
        let raw = Bytes::from_static(b"{\"a\": 1}");
        let value = ValueParser::RawText.parse(raw.clone()).unwrap();
        match value {
            LiteValue::RawText(b) => assert_eq!(b.as_ptr(), raw.as_ptr()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(
            parse(ValueParser::Timestamp, "2024-01-01 00:00:00.5"),
            LiteValue::Real(1_704_067_200_500.0)
        );
        assert_eq!(
            parse(ValueParser::TimestampTz, "2024-01-01 02:00:00+02"),
            LiteValue::Real(1_704_067_200_000.0)
        );
        assert_eq!(
            parse(ValueParser::TimestampTz, "2024-01-01 00:00:00.123456+00"),
            LiteValue::Real(1_704_067_200_123.456)
        );
        assert_eq!(
            parse(ValueParser::Date, "1970-01-02"),
            LiteValue::Real(86_400_000.0)
        );
        assert_eq!(
            parse(ValueParser::Timestamp, "-infinity"),
            LiteValue::Real(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn test_bytea() {
        assert_eq!(
            parse(ValueParser::Bytea, "\\xdeadbeef"),
            LiteValue::Blob(vec![0xde, 0xad, 0xbe, 0xef])
        );
        assert!(ValueParser::Bytea
            .parse(Bytes::from_static(b"deadbeef"))
            .is_err());
    }

    #[test]
    fn test_arrays() {
        let ints = ValueParser::Array(Box::new(ValueParser::Integer));
        assert_eq!(parse_array("{1,2,NULL}", &ValueParser::Integer).unwrap(), json!([1, 2, null]));
        assert_eq!(
            parse(ints, "{{1,2},{3,4}}"),
            LiteValue::Text("[[1,2],[3,4]]".to_string())
        );

        let texts = parse_array(r#"{"a b","NULL",NULL,"q\"uote",plain}"#, &ValueParser::RawText)
            .unwrap();
        assert_eq!(texts, json!(["a b", "NULL", null, "q\"uote", "plain"]));

        assert_eq!(parse_array("{}", &ValueParser::Integer).unwrap(), json!([]));
        assert_eq!(
            parse_array("[0:1]={t,f}", &ValueParser::Boolean).unwrap(),
            json!([true, false])
        );
        assert!(parse_array("{1,2", &ValueParser::Integer).is_err());
        assert!(parse_array("{1,2}x", &ValueParser::Integer).is_err());
    }

    #[test]
    fn test_registry_resolution() {
        let mut registry = TypeRegistry::builtin();
        assert_eq!(registry.parser_for(16), ValueParser::Boolean);
        assert_eq!(registry.parser_for(1700), ValueParser::Real);
        assert_eq!(registry.parser_for(3802), ValueParser::RawText);
        assert_eq!(
            registry.parser_for(1016),
            ValueParser::Array(Box::new(ValueParser::Integer))
        );
        assert_eq!(registry.parser_for(999_999), ValueParser::RawText);

        registry.insert(PgTypeInfo {
            oid: 50_000,
            name: "positive_int".to_string(),
            class: Some(PgTypeClass::Domain),
            category: 'N',
            elem_oid: 0,
            base_oid: 23,
        });
        registry.insert(PgTypeInfo {
            oid: 50_001,
            name: "mood".to_string(),
            class: Some(PgTypeClass::Enum),
            category: 'E',
            elem_oid: 0,
            base_oid: 0,
        });
        assert_eq!(registry.parser_for(50_000), ValueParser::Integer);
        assert_eq!(registry.parser_for(50_001), ValueParser::RawText);
    }

    #[test]
    fn test_row_converter() {
        let columns = [column("id", 1, 20), column("name", 2, 25), column("ok", 3, 16)];
        let converter = RowConverter::new(&columns, &TypeRegistry::builtin());
        assert_eq!(converter.len(), 3);
        assert_eq!(converter.raw_text_columns(), vec![false, true, false]);

        assert_eq!(
            converter.convert(0, Some(Bytes::from_static(b"7"))).unwrap(),
            LiteValue::Integer(7)
        );
        assert_eq!(converter.convert(2, None).unwrap(), LiteValue::Null);
        assert!(converter
            .convert(3, Some(Bytes::from_static(b"x")))
            .is_err());
    }
}
