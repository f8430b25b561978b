//! Conversion between [`HostValue`]s and remote objects.
//!
//! Immediates (nil, booleans, small integers) are encoded and decoded locally. Everything else
//! costs native calls: strings and floats have dedicated entry points, collections are built
//! and read back with ordinary message sends, and byte contents are fetched in chunks of
//! [`SessionConfig::fetch_chunk_size`](crate::SessionConfig) bytes.

use ahash::AHashSet;
use num_bigint::BigInt;
use strum::IntoEnumIterator;

use crate::{
    error::{GemError, GemResult},
    gci::{
        OOP_CLASS_CHARACTER, OOP_CLASS_DOUBLE_BYTE_STRING, OOP_CLASS_DOUBLE_BYTE_SYMBOL, OOP_CLASS_FLOAT,
        OOP_CLASS_LARGE_INTEGER, OOP_CLASS_QUAD_BYTE_STRING, OOP_CLASS_QUAD_BYTE_SYMBOL, OOP_CLASS_SMALL_DOUBLE,
        OOP_CLASS_STRING, OOP_CLASS_SYMBOL, OOP_CLASS_UNICODE7, OOP_CLASS_UNICODE16, OOP_CLASS_UNICODE32,
        OOP_CLASS_UTF8, OOP_FALSE, OOP_NIL, OOP_TRUE, OopType,
    },
    oop::{Oop, decode_small_integer, encode_small_integer},
    proxy::GemObject,
    session::{Session, c_string},
    tracer::NativeCall,
    value::HostValue,
};

/// Collection classes that are looked up by name, once per login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::IntoStaticStr, strum::EnumIter)]
pub(crate) enum CollectionClass {
    OrderedCollection,
    KeyValueDictionary,
    IdentitySet,
    ByteArray,
}

/// How the contents of an instance of a well-known class are transferred.
enum Decoder {
    LargeInteger,
    Double,
    Latin1,
    Utf8,
}

fn decoder_for(class: OopType) -> Option<Decoder> {
    match class {
        OOP_CLASS_LARGE_INTEGER => Some(Decoder::LargeInteger),
        OOP_CLASS_SMALL_DOUBLE | OOP_CLASS_FLOAT => Some(Decoder::Double),
        OOP_CLASS_STRING | OOP_CLASS_SYMBOL => Some(Decoder::Latin1),
        OOP_CLASS_DOUBLE_BYTE_STRING
        | OOP_CLASS_DOUBLE_BYTE_SYMBOL
        | OOP_CLASS_QUAD_BYTE_STRING
        | OOP_CLASS_QUAD_BYTE_SYMBOL
        | OOP_CLASS_CHARACTER
        | OOP_CLASS_UTF8
        | OOP_CLASS_UNICODE7
        | OOP_CLASS_UNICODE16
        | OOP_CLASS_UNICODE32 => Some(Decoder::Utf8),
        _ => None,
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

impl Session {
    // =========================================================================
    // Host -> remote
    // =========================================================================

    /// Converts a host value into a remote object.
    ///
    /// Collections are converted element by element and built with `add:` / `at:put:`, so the
    /// remote object is a fresh copy. [`HostValue::Object`] is passed through as is.
    pub fn from_host(&self, value: &HostValue) -> GemResult<GemObject> {
        self.check_usable()?;
        match value {
            HostValue::None => Ok(self.object(Oop::NIL)),
            HostValue::Bool(b) => Ok(self.object(Oop::from_bool(*b))),
            HostValue::Int(i) => self.integer(*i),
            HostValue::BigInt(big) => match i64::try_from(big) {
                Ok(i) => self.integer(i),
                Err(_) => self.large_integer(&big.to_string()),
            },
            HostValue::Float(f) => {
                let oop = self.native(NativeCall::DoubleToOop, |t| t.double_to_oop(*f))?;
                Ok(self.object(Oop::new(oop)))
            }
            HostValue::String(s) => {
                let text = c_string(s, "string")?;
                let oop = self.native(NativeCall::NewUtf8String, |t| t.new_utf8_string(&text))?;
                Ok(self.object(Oop::new(oop)))
            }
            HostValue::List(items) => {
                let list = self.new_collection(CollectionClass::OrderedCollection)?;
                for item in items {
                    let element = self.from_host(item)?;
                    list.perform("add:", &[&element])?;
                }
                Ok(list)
            }
            HostValue::Dict(pairs) => {
                let dict = self.new_collection(CollectionClass::KeyValueDictionary)?;
                for (key, value) in pairs {
                    let key = self.from_host(key)?;
                    let value = self.from_host(value)?;
                    dict.perform("at:put:", &[&key, &value])?;
                }
                Ok(dict)
            }
            HostValue::Set(items) => {
                let set = self.new_collection(CollectionClass::IdentitySet)?;
                for item in items {
                    let element = self.from_host(item)?;
                    set.perform("add:", &[&element])?;
                }
                Ok(set)
            }
            HostValue::Object(object) => {
                self.own(object)?;
                Ok(object.clone())
            }
            HostValue::Bytes(_) => Err(GemError::Unsupported(format!(
                "no remote encoding for host type {}",
                value.type_name()
            ))),
        }
    }

    fn integer(&self, value: i64) -> GemResult<GemObject> {
        match encode_small_integer(value) {
            Ok(oop) => Ok(self.object(oop)),
            Err(_) => self.large_integer(&value.to_string()),
        }
    }

    /// Builds a LargeInteger by evaluating its decimal literal.
    fn large_integer(&self, decimal: &str) -> GemResult<GemObject> {
        let source = format!("^{decimal}");
        self.execute(source.as_str(), None, None)
    }

    fn new_collection(&self, class: CollectionClass) -> GemResult<GemObject> {
        let class = self.object(self.collection_class(class)?);
        class.perform("new", &[])
    }

    // =========================================================================
    // Remote -> host
    // =========================================================================

    /// Converts a remote object into a host value.
    ///
    /// Fails with [`GemError::Unsupported`] for classes without a host counterpart, and for
    /// collections that contain themselves; keep the proxy in that case.
    pub fn to_host(&self, object: &GemObject) -> GemResult<HostValue> {
        self.decode(object, &mut AHashSet::new())
    }

    /// `open` holds the collections being decoded further up the recursion.
    fn decode(&self, object: &GemObject, open: &mut AHashSet<Oop>) -> GemResult<HostValue> {
        self.check_usable()?;
        let raw = self.own(object)?;
        match raw {
            OOP_NIL => return Ok(HostValue::None),
            OOP_TRUE => return Ok(HostValue::Bool(true)),
            OOP_FALSE => return Ok(HostValue::Bool(false)),
            _ => {}
        }
        if object.oop().is_small_integer() {
            return Ok(HostValue::Int(decode_small_integer(object.oop())?));
        }

        let class = self.fetch_class(object)?;
        match decoder_for(class.raw()) {
            Some(Decoder::LargeInteger) => {
                let text = object.perform("asString", &[])?;
                let digits = latin1(&self.fetch_all_bytes(text.oop().raw())?);
                let big: BigInt = digits.parse().map_err(|_| {
                    GemError::ProtocolViolation(format!("LargeInteger printed as {digits:?}"))
                })?;
                Ok(HostValue::from(big))
            }
            Some(Decoder::Double) => {
                let value = self.native(NativeCall::OopToDouble, |t| t.oop_to_double(raw))?;
                Ok(HostValue::Float(value))
            }
            Some(Decoder::Latin1) => Ok(HostValue::String(latin1(&self.fetch_all_bytes(raw)?))),
            Some(Decoder::Utf8) => {
                let bytes = self.fetch_all_utf8_bytes(raw)?;
                String::from_utf8(bytes)
                    .map(HostValue::String)
                    .map_err(|err| GemError::ProtocolViolation(format!("invalid UTF-8 from the stone: {err}")))
            }
            None => match self.collection_kind(class)? {
                Some(kind) => {
                    if !open.insert(object.oop()) {
                        return Err(GemError::Unsupported(format!("{object} contains itself")));
                    }
                    let value = self.collection_to_host(object, kind, open)?;
                    open.remove(&object.oop());
                    Ok(value)
                }
                None => Err(self.no_conversion(class)),
            },
        }
    }

    /// Which collection class `class` is, if any. A class name the user's symbol list does not
    /// resolve matches nothing.
    fn collection_kind(&self, class: Oop) -> GemResult<Option<CollectionClass>> {
        for kind in CollectionClass::iter() {
            match self.collection_class(kind) {
                Ok(oop) if oop == class => return Ok(Some(kind)),
                Ok(_) | Err(GemError::Remote(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    fn collection_to_host(
        &self,
        object: &GemObject,
        kind: CollectionClass,
        open: &mut AHashSet<Oop>,
    ) -> GemResult<HostValue> {
        match kind {
            CollectionClass::ByteArray => Ok(HostValue::Bytes(self.fetch_all_bytes(object.oop().raw())?)),
            CollectionClass::OrderedCollection => Ok(HostValue::List(self.elements_to_host(object, open)?)),
            CollectionClass::IdentitySet => {
                let array = object.perform("asArray", &[])?;
                Ok(HostValue::Set(self.elements_to_host(&array, open)?))
            }
            CollectionClass::KeyValueDictionary => {
                let keys = object.perform("keys", &[])?.perform("asArray", &[])?;
                let count = self.remote_size(&keys)?;
                let mut pairs = Vec::with_capacity(count);
                for index in 1..=count {
                    let key = self.element_at(&keys, index)?;
                    let value = object.perform("at:", &[&key])?;
                    pairs.push((self.decode(&key, open)?, self.decode(&value, open)?));
                }
                Ok(HostValue::Dict(pairs))
            }
        }
    }

    fn no_conversion(&self, class: Oop) -> GemError {
        let class = self.object(class);
        let name = match class.perform("name", &[]).and_then(|name| name.to_host()) {
            Ok(HostValue::String(name)) => name,
            _ => format!("with oop {}", class.oop()),
        };
        GemError::Unsupported(format!("no host conversion for remote class {name}"))
    }

    /// Converts elements `1..=size` of an indexable collection.
    fn elements_to_host(&self, collection: &GemObject, open: &mut AHashSet<Oop>) -> GemResult<Vec<HostValue>> {
        let count = self.remote_size(collection)?;
        (1..=count)
            .map(|index| self.decode(&self.element_at(collection, index)?, open))
            .collect()
    }

    fn remote_size(&self, collection: &GemObject) -> GemResult<usize> {
        let size = collection.perform("size", &[])?;
        match size.to_host()? {
            HostValue::Int(n) => usize::try_from(n)
                .map_err(|_| GemError::ProtocolViolation(format!("collection reported size {n}"))),
            other => Err(GemError::ProtocolViolation(format!(
                "size answered a {}",
                other.type_name()
            ))),
        }
    }

    fn element_at(&self, collection: &GemObject, index: usize) -> GemResult<GemObject> {
        let index = i64::try_from(index).map_err(|_| GemError::OutOfRange(format!("index {index}")))?;
        let index = self.object(encode_small_integer(index)?);
        collection.perform("at:", &[&index])
    }

    // =========================================================================
    // Chunked byte transfer
    // =========================================================================

    /// Fetches the byte contents of `object` in chunks, stopping at the first short read.
    pub(crate) fn fetch_all_bytes(&self, object: OopType) -> GemResult<Vec<u8>> {
        self.fetch_chunks(|session, start, buf| {
            session.native(NativeCall::FetchBytes, |t| t.fetch_bytes(object, start, buf))
        })
    }

    /// Like [`Self::fetch_all_bytes`], transcoded to UTF-8 by the stone. The intermediate UTF-8
    /// object a chunk may create is released right after that chunk.
    pub(crate) fn fetch_all_utf8_bytes(&self, object: OopType) -> GemResult<Vec<u8>> {
        self.fetch_chunks(|session, start, buf| {
            let mut utf8_string = OOP_NIL;
            let count = session.native(NativeCall::FetchUtf8Bytes, |t| {
                t.fetch_utf8_bytes(object, start, buf, &mut utf8_string)
            })?;
            if utf8_string != OOP_NIL && !Oop::new(utf8_string).is_special() {
                session.native(NativeCall::ReleaseObjs, |t| t.release(&[utf8_string]))?;
            }
            Ok(count)
        })
    }

    fn fetch_chunks(&self, mut fetch: impl FnMut(&Self, i64, &mut [u8]) -> GemResult<usize>) -> GemResult<Vec<u8>> {
        let chunk = self.config().fetch_chunk_size.max(1);
        let mut buf = vec![0u8; chunk];
        let mut out = Vec::new();
        loop {
            let start = i64::try_from(out.len() + 1)
                .map_err(|_| GemError::OutOfRange("byte object too large to fetch".to_owned()))?;
            let count = fetch(self, start, &mut buf)?.min(chunk);
            out.extend_from_slice(&buf[..count]);
            if count < chunk {
                return Ok(out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_maps_bytes_to_code_points() {
        assert_eq!(latin1(b"abc"), "abc");
        assert_eq!(latin1(&[0x63, 0x61, 0x66, 0xE9]), "caf\u{e9}");
    }

    #[test]
    fn class_names_match_the_remote_globals() {
        let names: Vec<&'static str> = CollectionClass::iter().map(Into::into).collect();
        assert_eq!(
            names,
            ["OrderedCollection", "KeyValueDictionary", "IdentitySet", "ByteArray"]
        );
    }

    #[test]
    fn string_classes_choose_their_transfer_encoding() {
        assert!(matches!(decoder_for(OOP_CLASS_STRING), Some(Decoder::Latin1)));
        assert!(matches!(decoder_for(OOP_CLASS_SYMBOL), Some(Decoder::Latin1)));
        assert!(matches!(decoder_for(OOP_CLASS_UNICODE16), Some(Decoder::Utf8)));
        assert!(matches!(decoder_for(OOP_CLASS_CHARACTER), Some(Decoder::Utf8)));
        assert!(decoder_for(OOP_NIL).is_none());
    }
}
