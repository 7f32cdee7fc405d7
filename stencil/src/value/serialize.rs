use std::sync::Arc;

use serde::{ser, Serialize, Serializer};

use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueMap, ValueRepr};

fn transform<T: Serialize + ?Sized>(value: &T) -> Result<Value, Error> {
    value.serialize(ValueSerializer)
}

// serde sizes are untrusted, cap preallocation
fn size_hint(len: Option<usize>) -> usize {
    len.unwrap_or(0).min(1024)
}

/// Map keys must be scalars; they are stored stringified.
fn map_key(key: Value) -> Result<Arc<str>, Error> {
    match key.0 {
        ValueRepr::String(s) => Ok(s),
        ValueRepr::Bool(_) | ValueRepr::I64(_) | ValueRepr::F64(_) => {
            Ok(Arc::from(key.to_string()))
        }
        _ => Err(Error::new(
            ErrorKind::BadSerialization,
            format!("map keys must be scalars, got {}", key.kind()),
        )),
    }
}

fn single_entry(key: &str, value: Value) -> Value {
    let mut map = ValueMap::with_capacity(1);
    map.insert(Arc::from(key), value);
    Value::from(map)
}

/// A serde serializer that produces [`Value`]s.
pub struct ValueSerializer;

impl Serializer for ValueSerializer {
    type Ok = Value;
    type Error = Error;

    type SerializeSeq = SerializeSeq;
    type SerializeTuple = SerializeSeq;
    type SerializeTupleStruct = SerializeSeq;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeStruct;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_str(self, value: &str) -> Result<Value, Error> {
        Ok(Value::from(value))
    }

    fn serialize_bytes(self, value: &[u8]) -> Result<Value, Error> {
        Ok(Value::from(String::from_utf8_lossy(value)))
    }

    fn serialize_none(self) -> Result<Value, Error> {
        Ok(Value::from(()))
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value, Error> {
        transform(value)
    }

    fn serialize_unit(self) -> Result<Value, Error> {
        Ok(Value::from(()))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, Error> {
        Ok(Value::from(()))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, Error> {
        Ok(Value::from(variant))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, Error> {
        transform(value)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, Error> {
        Ok(single_entry(variant, ok!(transform(value))))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Error> {
        Ok(SerializeSeq {
            elements: Vec::with_capacity(size_hint(len)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, Error> {
        Ok(SerializeTupleVariant {
            name: variant,
            fields: Vec::with_capacity(size_hint(Some(len))),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap, Error> {
        Ok(SerializeMap {
            entries: ValueMap::with_capacity(size_hint(len)),
            key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStruct, Error> {
        Ok(SerializeStruct {
            fields: ValueMap::with_capacity(size_hint(Some(len))),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStructVariant, Error> {
        Ok(SerializeStructVariant {
            variant,
            map: ValueMap::with_capacity(size_hint(Some(len))),
        })
    }
}

pub struct SerializeSeq {
    elements: Vec<Value>,
}

impl ser::SerializeSeq for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
        self.elements.push(ok!(transform(value)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value::from(self.elements))
    }
}

impl ser::SerializeTuple for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, Error> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, Error> {
        ser::SerializeSeq::end(self)
    }
}

pub struct SerializeTupleVariant {
    name: &'static str,
    fields: Vec<Value>,
}

impl ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
        self.fields.push(ok!(transform(value)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(single_entry(self.name, Value::from(self.fields)))
    }
}

pub struct SerializeMap {
    entries: ValueMap,
    key: Option<Arc<str>>,
}

impl ser::SerializeMap for SerializeMap {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), Error> {
        self.key = Some(ok!(map_key(ok!(transform(key)))));
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
        if let Some(key) = self.key.take() {
            self.entries.insert(key, ok!(transform(value)));
        }
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value::from(self.entries))
    }
}

pub struct SerializeStruct {
    fields: ValueMap,
}

impl ser::SerializeStruct for SerializeStruct {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Error> {
        self.fields.insert(Arc::from(key), ok!(transform(value)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value::from(self.fields))
    }
}

pub struct SerializeStructVariant {
    variant: &'static str,
    map: ValueMap,
}

impl ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Error> {
        self.map.insert(Arc::from(key), ok!(transform(value)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(single_entry(self.variant, Value::from(self.map)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use serde::Serialize;
    use similar_asserts::assert_eq;

    #[derive(Serialize)]
    struct User {
        name: &'static str,
        active: bool,
        tags: Vec<&'static str>,
        nickname: Option<&'static str>,
    }

    #[test]
    fn test_struct_becomes_map() {
        let value = Value::from_serialize(&User {
            name: "ada",
            active: true,
            tags: vec!["x"],
            nickname: None,
        });
        assert_eq!(value.resolve_path("name"), Value::from("ada"));
        assert_eq!(value.resolve_path("active"), Value::from(true));
        assert_eq!(value.resolve_path("tags.0"), Value::from("x"));
        assert!(value.resolve_path("nickname").is_none());
    }

    #[test]
    fn test_integer_keys_are_stringified() {
        let mut map = BTreeMap::new();
        map.insert(1, "one");
        let value = Value::from_serialize(&map);
        assert_eq!(value.resolve_path("1"), Value::from("one"));
    }

    #[test]
    fn test_non_scalar_keys_are_rejected() {
        let mut map = BTreeMap::new();
        map.insert(vec![1], "one");
        let err = vec![1].serialize(ValueSerializer).and_then(map_key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadSerialization);
        assert!(Value::from_serialize(&map).is_undefined());
    }
}
