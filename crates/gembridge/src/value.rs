use std::fmt::{self, Write};

use num_bigint::BigInt;
use serde_json::{Map, Value as JsonValue, json};

use crate::proxy::GemObject;

/// A host-side value that can be sent to or fetched from the stone.
///
/// Primitive variants are copied across the wire; [`HostValue::Object`] carries an existing
/// proxy through unchanged. Collections map to `OrderedCollection` (`List`),
/// `KeyValueDictionary` (`Dict`, insertion-ordered pairs) and `IdentitySet` (`Set`).
///
/// The stone enumerates sets and dictionaries in hash order, so `==` ignores order for them:
/// sets compare as sets and dictionaries as mappings where a repeated key's last value wins.
#[derive(Debug, Clone, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum HostValue {
    /// `nil`.
    None,
    Bool(bool),
    /// An integer that fits in 64 bits.
    Int(i64),
    /// An integer outside the 64-bit range.
    BigInt(BigInt),
    Float(f64),
    String(String),
    /// Contents of a `ByteArray`. Only produced by decoding.
    Bytes(Vec<u8>),
    List(Vec<Self>),
    Dict(Vec<(Self, Self)>),
    Set(Vec<Self>),
    /// An object already living in the stone.
    Object(GemObject),
}

impl HostValue {
    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.into()
    }

    /// JSON rendering for tools. Values without a natural JSON form are tagged objects:
    /// `{"$bigint": "..."}`, `{"$bytes": [...]}`, `{"$set": [...]}`, `{"$oop": n}`, and
    /// `{"$dict": [[k, v], ...]}` for dictionaries whose keys are not all strings.
    #[must_use]
    pub fn to_json_value(&self) -> JsonValue {
        match self {
            Self::None => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => json!(i),
            Self::BigInt(b) => json!({"$bigint": b.to_string()}),
            Self::Float(f) => json!(f),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Bytes(b) => json!({"$bytes": b}),
            Self::List(items) => JsonValue::Array(items.iter().map(Self::to_json_value).collect()),
            Self::Dict(pairs) => {
                if pairs.iter().all(|(k, _)| matches!(k, Self::String(_))) {
                    let map: Map<String, JsonValue> = pairs
                        .iter()
                        .filter_map(|(k, v)| match k {
                            Self::String(key) => Some((key.clone(), v.to_json_value())),
                            _ => None,
                        })
                        .collect();
                    JsonValue::Object(map)
                } else {
                    let pairs: Vec<_> = pairs
                        .iter()
                        .map(|(k, v)| json!([k.to_json_value(), v.to_json_value()]))
                        .collect();
                    json!({"$dict": pairs})
                }
            }
            Self::Set(items) => json!({"$set": items.iter().map(Self::to_json_value).collect::<Vec<_>>()}),
            Self::Object(object) => json!({"$oop": object.oop().raw()}),
        }
    }

    fn print_fmt(&self, f: &mut impl Write) -> fmt::Result {
        match self {
            Self::None => f.write_str("nil"),
            Self::Bool(true) => f.write_str("true"),
            Self::Bool(false) => f.write_str("false"),
            Self::Int(v) => write!(f, "{v}"),
            Self::BigInt(v) => write!(f, "{v}"),
            Self::Float(v) => {
                let s = v.to_string();
                f.write_str(&s)?;
                if v.is_finite() && !s.contains('.') {
                    f.write_str(".0")?;
                }
                Ok(())
            }
            Self::String(s) => {
                f.write_char('\'')?;
                for c in s.chars() {
                    if c == '\'' {
                        f.write_char('\'')?;
                    }
                    f.write_char(c)?;
                }
                f.write_char('\'')
            }
            Self::Bytes(bytes) => {
                f.write_str("#[")?;
                print_separated(f, bytes.iter(), |f, b| write!(f, "{b}"))?;
                f.write_char(']')
            }
            Self::List(items) => {
                f.write_str("OrderedCollection (")?;
                print_separated(f, items.iter(), |f, item| item.print_fmt(f))?;
                f.write_char(')')
            }
            Self::Dict(pairs) => {
                f.write_str("KeyValueDictionary (")?;
                print_separated(f, pairs.iter(), |f, (k, v)| {
                    k.print_fmt(f)?;
                    f.write_str("->")?;
                    v.print_fmt(f)
                })?;
                f.write_char(')')
            }
            Self::Set(items) => {
                f.write_str("IdentitySet (")?;
                print_separated(f, items.iter(), |f, item| item.print_fmt(f))?;
                f.write_char(')')
            }
            Self::Object(object) => write!(f, "{object}"),
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::Int(a), Self::BigInt(b)) | (Self::BigInt(b), Self::Int(a)) => BigInt::from(*a) == *b,
            // bitwise, so NaN survives a round trip
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => same_mapping(a, b),
            (Self::Set(a), Self::Set(b)) => a.iter().all(|x| b.contains(x)) && b.iter().all(|y| a.contains(y)),
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

fn lookup<'a>(pairs: &'a [(HostValue, HostValue)], key: &HostValue) -> Option<&'a HostValue> {
    pairs.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn same_mapping(a: &[(HostValue, HostValue)], b: &[(HostValue, HostValue)]) -> bool {
    a.iter().chain(b).all(|(key, _)| lookup(a, key) == lookup(b, key))
}

fn print_separated<W: Write, T>(
    f: &mut W,
    items: impl Iterator<Item = T>,
    mut print: impl FnMut(&mut W, T) -> fmt::Result,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_char(' ')?;
        }
        print(f, item)?;
    }
    Ok(())
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print_fmt(f)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<BigInt> for HostValue {
    /// Narrows to [`HostValue::Int`] when the value fits in 64 bits.
    fn from(value: BigInt) -> Self {
        match i64::try_from(&value) {
            Ok(small) => Self::Int(small),
            Err(_) => Self::BigInt(value),
        }
    }
}

impl From<Vec<Self>> for HostValue {
    fn from(value: Vec<Self>) -> Self {
        Self::List(value)
    }
}

impl From<GemObject> for HostValue {
    fn from(value: GemObject) -> Self {
        Self::Object(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printing_uses_smalltalk_literals() {
        let value = HostValue::List(vec![
            HostValue::None,
            HostValue::Bool(true),
            HostValue::Int(-3),
            HostValue::Float(2.0),
            HostValue::from("it's"),
            HostValue::Dict(vec![(HostValue::from("k"), HostValue::Int(1))]),
            HostValue::Bytes(vec![1, 2]),
        ]);
        assert_eq!(
            value.to_string(),
            "OrderedCollection (nil true -3 2.0 'it''s' KeyValueDictionary ('k'->1) #[1 2])"
        );
    }

    #[test]
    fn bigint_narrows_when_it_fits() {
        assert_eq!(HostValue::from(BigInt::from(7)), HostValue::Int(7));
        let huge = BigInt::from(i64::MAX) * 4;
        assert!(matches!(HostValue::from(huge), HostValue::BigInt(_)));
    }

    #[test]
    fn json_tags_values_without_a_json_form() {
        let dict = HostValue::Dict(vec![(HostValue::Int(1), HostValue::from("one"))]);
        assert_eq!(dict.to_json_value(), json!({"$dict": [[1, "one"]]}));
        let dict = HostValue::Dict(vec![(HostValue::from("a"), HostValue::Int(1))]);
        assert_eq!(dict.to_json_value(), json!({"a": 1}));
        assert_eq!(HostValue::Set(vec![]).to_json_value(), json!({"$set": []}));
    }

    #[test]
    fn sets_and_dicts_ignore_order() {
        let one = HostValue::Int(1);
        let two = HostValue::Int(2);
        assert_eq!(
            HostValue::Set(vec![one.clone(), two.clone()]),
            HostValue::Set(vec![two.clone(), one.clone()])
        );
        assert_eq!(
            HostValue::Set(vec![one.clone(), one.clone()]),
            HostValue::Set(vec![one.clone()])
        );
        assert_ne!(HostValue::Set(vec![one.clone()]), HostValue::Set(vec![one.clone(), two.clone()]));

        let dict = |pairs: &[(i64, i64)]| {
            HostValue::Dict(pairs.iter().map(|&(k, v)| (HostValue::Int(k), HostValue::Int(v))).collect())
        };
        assert_eq!(dict(&[(1, 2), (3, 4)]), dict(&[(3, 4), (1, 2)]));
        assert_eq!(dict(&[(1, 2), (1, 5)]), dict(&[(1, 5)]));
        assert_ne!(dict(&[(1, 2)]), dict(&[(1, 3)]));
        assert_ne!(dict(&[(1, 2)]), dict(&[(1, 2), (3, 4)]));

        // lists keep their order
        assert_ne!(HostValue::List(vec![one.clone(), two.clone()]), HostValue::List(vec![two, one]));
    }

    #[test]
    fn floats_compare_bitwise() {
        assert_eq!(HostValue::Float(f64::NAN), HostValue::Float(f64::NAN));
        assert_ne!(HostValue::Float(0.0), HostValue::Float(-0.0));
        assert_eq!(HostValue::Int(5), HostValue::BigInt(BigInt::from(5)));
    }

    #[test]
    fn type_names_are_snake_case() {
        assert_eq!(HostValue::BigInt(BigInt::from(1)).type_name(), "big_int");
        assert_eq!(HostValue::Bytes(vec![]).type_name(), "bytes");
    }
}
