//! Structural size estimate of a serializable value.
//!
//! [`estimate_size`] walks a value through a counting [`serde::Serializer`]
//! and sums the length of the JSON it would produce, without building the
//! string. Strings, integers and structure are counted exactly; floats use
//! their shortest `Display` form, which can differ from serde_json's output
//! by a couple of characters.

use serde::ser::{self, Serialize};
use std::fmt::Display;
use thiserror::Error;
use tracing::debug;

/// Returns the estimated serialized JSON length of `value`, in bytes.
///
/// Values whose `Serialize` impl fails cannot be sent at all. They are
/// estimated as `usize::MAX`, so any size cap turns them away.
pub fn estimate_size<T: Serialize + ?Sized>(value: &T) -> usize {
    let mut estimator = SizeEstimator::default();
    match value.serialize(&mut estimator) {
        Ok(()) => estimator.total,
        Err(e) => {
            debug!("📏 Size estimate failed: {}", e);
            usize::MAX
        }
    }
}

/// Error surfaced by custom `Serialize` impls during estimation.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EstimateError(String);

impl ser::Error for EstimateError {
    fn custom<T: Display>(msg: T) -> Self {
        EstimateError(msg.to_string())
    }
}

/// Byte counter driven by serde.
#[derive(Debug, Default)]
pub struct SizeEstimator {
    total: usize,
}

impl SizeEstimator {
    pub fn total(&self) -> usize {
        self.total
    }

    fn add(&mut self, n: usize) {
        self.total += n;
    }

    fn add_str(&mut self, v: &str) {
        self.total += quoted_len(v);
    }
}

fn digits(mut v: u64) -> usize {
    let mut n = 1;
    while v >= 10 {
        v /= 10;
        n += 1;
    }
    n
}

fn signed_digits(v: i64) -> usize {
    if v < 0 {
        1 + digits(v.unsigned_abs())
    } else {
        digits(v as u64)
    }
}

fn float_len(v: f64) -> usize {
    if v.is_finite() {
        v.to_string().len()
    } else {
        4 // null
    }
}

/// Length of `v` as a JSON string literal, quotes and escapes included.
fn quoted_len(v: &str) -> usize {
    let escapes: usize = v
        .bytes()
        .map(|b| match b {
            b'"' | b'\\' | b'\n' | b'\r' | b'\t' | 0x08 | 0x0c => 1,
            0x00..=0x1f => 5,
            _ => 0,
        })
        .sum();
    v.len() + 2 + escapes
}

impl<'a> ser::Serializer for &'a mut SizeEstimator {
    type Ok = ();
    type Error = EstimateError;

    type SerializeSeq = Compound<'a>;
    type SerializeTuple = Compound<'a>;
    type SerializeTupleStruct = Compound<'a>;
    type SerializeTupleVariant = Compound<'a>;
    type SerializeMap = Compound<'a>;
    type SerializeStruct = Compound<'a>;
    type SerializeStructVariant = Compound<'a>;

    fn serialize_bool(self, v: bool) -> Result<(), EstimateError> {
        self.add(if v { 4 } else { 5 });
        Ok(())
    }

    fn serialize_i8(self, v: i8) -> Result<(), EstimateError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> Result<(), EstimateError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> Result<(), EstimateError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> Result<(), EstimateError> {
        self.add(signed_digits(v));
        Ok(())
    }

    fn serialize_u8(self, v: u8) -> Result<(), EstimateError> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u16(self, v: u16) -> Result<(), EstimateError> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u32(self, v: u32) -> Result<(), EstimateError> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u64(self, v: u64) -> Result<(), EstimateError> {
        self.add(digits(v));
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<(), EstimateError> {
        self.serialize_f64(v as f64)
    }

    fn serialize_f64(self, v: f64) -> Result<(), EstimateError> {
        self.add(float_len(v));
        Ok(())
    }

    fn serialize_char(self, v: char) -> Result<(), EstimateError> {
        let mut buf = [0u8; 4];
        self.add_str(v.encode_utf8(&mut buf));
        Ok(())
    }

    fn serialize_str(self, v: &str) -> Result<(), EstimateError> {
        self.add_str(v);
        Ok(())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<(), EstimateError> {
        // Bytes serialize as an array of numbers.
        let body: usize = v.iter().map(|b| digits(*b as u64)).sum();
        self.add(2 + body + v.len().saturating_sub(1));
        Ok(())
    }

    fn serialize_none(self) -> Result<(), EstimateError> {
        self.add(4);
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), EstimateError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), EstimateError> {
        self.add(4);
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), EstimateError> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<(), EstimateError> {
        self.add_str(variant);
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), EstimateError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<(), EstimateError> {
        // {"variant":value}
        self.add(2 + quoted_len(variant) + 1);
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Compound<'a>, EstimateError> {
        Ok(Compound::open(self, 1, 1))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Compound<'a>, EstimateError> {
        Ok(Compound::open(self, 1, 1))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Compound<'a>, EstimateError> {
        Ok(Compound::open(self, 1, 1))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Compound<'a>, EstimateError> {
        // {"variant":[...]}
        let open = 1 + quoted_len(variant) + 1 + 1;
        Ok(Compound::open(self, open, 2))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Compound<'a>, EstimateError> {
        Ok(Compound::open(self, 1, 1))
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Compound<'a>, EstimateError> {
        Ok(Compound::open(self, 1, 1))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Compound<'a>, EstimateError> {
        // {"variant":{...}}
        let open = 1 + quoted_len(variant) + 1 + 1;
        Ok(Compound::open(self, open, 2))
    }
}

/// Counts separators and the closing delimiters of arrays and objects.
pub struct Compound<'a> {
    estimator: &'a mut SizeEstimator,
    first: bool,
    closing: usize,
}

impl<'a> Compound<'a> {
    fn open(estimator: &'a mut SizeEstimator, opening: usize, closing: usize) -> Self {
        estimator.add(opening);
        Self {
            estimator,
            first: true,
            closing,
        }
    }

    fn separator(&mut self) {
        if !self.first {
            self.estimator.add(1);
        }
        self.first = false;
    }

    fn element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EstimateError> {
        self.separator();
        value.serialize(&mut *self.estimator)
    }

    fn field<T: ?Sized + Serialize>(&mut self, key: &str, value: &T) -> Result<(), EstimateError> {
        self.separator();
        self.estimator.add(quoted_len(key) + 1);
        value.serialize(&mut *self.estimator)
    }

    fn close(self) -> Result<(), EstimateError> {
        self.estimator.add(self.closing);
        Ok(())
    }
}

impl ser::SerializeSeq for Compound<'_> {
    type Ok = ();
    type Error = EstimateError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EstimateError> {
        self.element(value)
    }

    fn end(self) -> Result<(), EstimateError> {
        self.close()
    }
}

impl ser::SerializeTuple for Compound<'_> {
    type Ok = ();
    type Error = EstimateError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EstimateError> {
        self.element(value)
    }

    fn end(self) -> Result<(), EstimateError> {
        self.close()
    }
}

impl ser::SerializeTupleStruct for Compound<'_> {
    type Ok = ();
    type Error = EstimateError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EstimateError> {
        self.element(value)
    }

    fn end(self) -> Result<(), EstimateError> {
        self.close()
    }
}

impl ser::SerializeTupleVariant for Compound<'_> {
    type Ok = ();
    type Error = EstimateError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EstimateError> {
        self.element(value)
    }

    fn end(self) -> Result<(), EstimateError> {
        self.close()
    }
}

impl ser::SerializeMap for Compound<'_> {
    type Ok = ();
    type Error = EstimateError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), EstimateError> {
        self.separator();
        let before = self.estimator.total;
        key.serialize(&mut *self.estimator)?;
        // JSON object keys are always strings; numeric keys gain quotes.
        let key_len = self.estimator.total - before;
        if key_len > 0 && !is_string_key(key) {
            self.estimator.add(2);
        }
        self.estimator.add(1);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EstimateError> {
        value.serialize(&mut *self.estimator)
    }

    fn end(self) -> Result<(), EstimateError> {
        self.close()
    }
}

impl ser::SerializeStruct for Compound<'_> {
    type Ok = ();
    type Error = EstimateError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), EstimateError> {
        self.field(key, value)
    }

    fn end(self) -> Result<(), EstimateError> {
        self.close()
    }
}

impl ser::SerializeStructVariant for Compound<'_> {
    type Ok = ();
    type Error = EstimateError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), EstimateError> {
        self.field(key, value)
    }

    fn end(self) -> Result<(), EstimateError> {
        self.close()
    }
}

/// True when `key` serializes through `serialize_str` (or `serialize_char`).
fn is_string_key<T: ?Sized + Serialize>(key: &T) -> bool {
    key.serialize(StringKeyCheck).is_ok()
}

/// Serializer that only accepts string-like values.
struct StringKeyCheck;

impl ser::Serializer for StringKeyCheck {
    type Ok = ();
    type Error = EstimateError;

    type SerializeSeq = ser::Impossible<(), EstimateError>;
    type SerializeTuple = ser::Impossible<(), EstimateError>;
    type SerializeTupleStruct = ser::Impossible<(), EstimateError>;
    type SerializeTupleVariant = ser::Impossible<(), EstimateError>;
    type SerializeMap = ser::Impossible<(), EstimateError>;
    type SerializeStruct = ser::Impossible<(), EstimateError>;
    type SerializeStructVariant = ser::Impossible<(), EstimateError>;

    fn serialize_str(self, _v: &str) -> Result<(), EstimateError> {
        Ok(())
    }

    fn serialize_char(self, _v: char) -> Result<(), EstimateError> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<(), EstimateError> {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), EstimateError> {
        value.serialize(self)
    }

    fn serialize_bool(self, _v: bool) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_i8(self, _v: i8) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_i16(self, _v: i16) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_i32(self, _v: i32) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_i64(self, _v: i64) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_u8(self, _v: u8) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_u16(self, _v: u16) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_u32(self, _v: u32) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_u64(self, _v: u64) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_f32(self, _v: f32) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_f64(self, _v: f64) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_none(self) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, _value: &T) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_unit(self) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<(), EstimateError> {
        Err(not_a_string())
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, EstimateError> {
        Err(not_a_string())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, EstimateError> {
        Err(not_a_string())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, EstimateError> {
        Err(not_a_string())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, EstimateError> {
        Err(not_a_string())
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, EstimateError> {
        Err(not_a_string())
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, EstimateError> {
        Err(not_a_string())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, EstimateError> {
        Err(not_a_string())
    }
}

fn not_a_string() -> EstimateError {
    EstimateError("map key is not a string".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn json_len<T: Serialize>(value: &T) -> usize {
        serde_json::to_string(value).unwrap().len()
    }

    #[test]
    fn test_matches_json_length_for_values() {
        let samples = [
            json!(null),
            json!(true),
            json!(false),
            json!(0),
            json!(-1234),
            json!(u64::MAX),
            json!("plain"),
            json!("quote \" and \\ and \n"),
            json!([]),
            json!({}),
            json!({"a": 1, "b": [true, null, "x"]}),
            json!([{"nested": {"deep": [1, 2, 3]}}, "tail"]),
        ];
        for sample in &samples {
            assert_eq!(estimate_size(sample), json_len(sample), "sample: {sample}");
        }
    }

    #[test]
    fn test_matches_json_length_for_structs_and_enums() {
        #[derive(Serialize)]
        enum Kind {
            Unit,
            Newtype(u32),
            Tuple(u8, String),
            Struct { x: i32 },
        }

        #[derive(Serialize)]
        struct Event {
            name: String,
            kinds: Vec<Kind>,
            #[serde(skip_serializing_if = "Option::is_none")]
            skipped: Option<u8>,
            counts: BTreeMap<u32, u32>,
            flag: Option<bool>,
        }

        let mut counts = BTreeMap::new();
        counts.insert(10, 200);
        counts.insert(3, 4);

        let event = Event {
            name: "pageview".to_string(),
            kinds: vec![
                Kind::Unit,
                Kind::Newtype(7),
                Kind::Tuple(1, "t".to_string()),
                Kind::Struct { x: -5 },
            ],
            skipped: None,
            counts,
            flag: None,
        };

        assert_eq!(estimate_size(&event), json_len(&event));
    }

    #[test]
    fn test_event_args_estimate() {
        let args = crate::events::EventArgs::Ajax {
            method: "GET".to_string(),
            url: "https://example.com/api".to_string(),
            status: 200,
            duration_ms: 12.0,
        };
        let estimate = estimate_size(&args) as i64;
        let actual = json_len(&args) as i64;
        // Float formatting is the only approximation.
        assert!((estimate - actual).abs() <= 2, "{estimate} vs {actual}");
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: ser::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(ser::Error::custom("refuses to serialize"))
        }
    }

    #[test]
    fn test_failed_serialize_is_unbounded() {
        assert_eq!(estimate_size(&Unserializable), usize::MAX);
        assert_eq!(estimate_size(&vec![Unserializable]), usize::MAX);
    }
}
