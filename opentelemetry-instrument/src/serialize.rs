use opentelemetry::otel_debug;
use serde::ser::{self, Impossible, SerializeTuple, Serializer};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Attribute value recorded in place of an argument or result that cannot be
/// serialized.
pub const NOT_SERIALIZABLE: &str = "[Not Serializable]";

/// Serializes `value` to JSON text for use as a span attribute.
///
/// Never fails: values whose serialization errors (maps with non-string keys,
/// custom `Serialize` impls returning an error, ...) yield
/// [`NOT_SERIALIZABLE`].
pub fn to_attribute_value<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(text) => text,
        Err(err) => {
            otel_debug!(name: "Instrument.NotSerializable", reason = err.to_string());
            NOT_SERIALIZABLE.to_owned()
        }
    }
}

/// Splits an argument list into one attribute value per positional argument.
///
/// Tuples are spread, each element serialized on its own, so `(a, b)` yields
/// two values, `()` yields none and an element that cannot be serialized
/// only turns its own position into [`NOT_SERIALIZABLE`]. Any other value,
/// sequences included, counts as a single argument. Fixed-size arrays
/// serialize as tuples and are spread as well.
pub fn positional_arguments<A: Serialize + ?Sized>(args: &A) -> Vec<String> {
    match args.serialize(Spread) {
        Ok(values) => values,
        Err(NotATuple) => vec![to_attribute_value(args)],
    }
}

/// A value recorded as [`NOT_SERIALIZABLE`] wherever a serializable value is
/// expected.
///
/// ```
/// use opentelemetry_instrument::{to_attribute_value, Opaque, NOT_SERIALIZABLE};
///
/// struct Connection;
///
/// assert_eq!(to_attribute_value(&Opaque(Connection)), NOT_SERIALIZABLE);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Opaque<T>(pub T);

impl<T> Opaque<T> {
    /// Returns the wrapped value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Serialize for Opaque<T> {
    fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
        Err(ser::Error::custom("opaque value"))
    }
}

#[derive(Debug, Error)]
#[error("arguments are not a tuple")]
struct NotATuple;

impl ser::Error for NotATuple {
    fn custom<T: fmt::Display>(_: T) -> Self {
        NotATuple
    }
}

/// Serializer accepting only tuples (and unit), collecting one attribute
/// value per element.
struct Spread;

struct Positions(Vec<String>);

impl SerializeTuple for Positions {
    type Ok = Vec<String>;
    type Error = NotATuple;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), NotATuple> {
        self.0.push(to_attribute_value(value));
        Ok(())
    }

    fn end(self) -> Result<Vec<String>, NotATuple> {
        Ok(self.0)
    }
}

macro_rules! not_a_tuple {
    ($($method:ident($($ty:ty),*);)*) => {
        $(
            fn $method(self, $(_: $ty),*) -> Result<Vec<String>, NotATuple> {
                Err(NotATuple)
            }
        )*
    };
}

impl Serializer for Spread {
    type Ok = Vec<String>;
    type Error = NotATuple;
    type SerializeSeq = Impossible<Vec<String>, NotATuple>;
    type SerializeTuple = Positions;
    type SerializeTupleStruct = Impossible<Vec<String>, NotATuple>;
    type SerializeTupleVariant = Impossible<Vec<String>, NotATuple>;
    type SerializeMap = Impossible<Vec<String>, NotATuple>;
    type SerializeStruct = Impossible<Vec<String>, NotATuple>;
    type SerializeStructVariant = Impossible<Vec<String>, NotATuple>;

    not_a_tuple! {
        serialize_bool(bool);
        serialize_i8(i8);
        serialize_i16(i16);
        serialize_i32(i32);
        serialize_i64(i64);
        serialize_u8(u8);
        serialize_u16(u16);
        serialize_u32(u32);
        serialize_u64(u64);
        serialize_f32(f32);
        serialize_f64(f64);
        serialize_char(char);
        serialize_str(&str);
        serialize_bytes(&[u8]);
        serialize_none();
        serialize_unit_struct(&'static str);
        serialize_unit_variant(&'static str, u32, &'static str);
    }

    fn serialize_unit(self) -> Result<Vec<String>, NotATuple> {
        Ok(Vec::new())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, _: &T) -> Result<Vec<String>, NotATuple> {
        Err(NotATuple)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: &T,
    ) -> Result<Vec<String>, NotATuple> {
        Err(NotATuple)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<Vec<String>, NotATuple> {
        Err(NotATuple)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq, NotATuple> {
        Err(NotATuple)
    }

    fn serialize_tuple(self, len: usize) -> Result<Positions, NotATuple> {
        Ok(Positions(Vec::with_capacity(len)))
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct, NotATuple> {
        Err(NotATuple)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant, NotATuple> {
        Err(NotATuple)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, NotATuple> {
        Err(NotATuple)
    }

    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStruct, NotATuple> {
        Err(NotATuple)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant, NotATuple> {
        Err(NotATuple)
    }
}
