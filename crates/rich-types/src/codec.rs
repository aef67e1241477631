use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::kind::Kind;
use crate::types::*;
use crate::CodecError;

pub const TYPE_TAG: &str = "_type";

#[derive(Serialize)]
#[serde(tag = "_type")]
enum TaggedRef<'a> {
    Vector3(&'a Vector3),
    Vector2(&'a Vector2),
    Color3(&'a Color3),
    CFrame(&'a CFrame),
    UDim(&'a UDim),
    UDim2(&'a UDim2),
    EnumItem(&'a EnumItem),
    BrickColor(&'a BrickColor),
    NumberSequence(&'a NumberSequence),
    ColorSequence(&'a ColorSequence),
    NumberRange(&'a NumberRange),
    Rect(&'a Rect),
    PhysicalProperties(&'a PhysicalProperties),
}

#[derive(Deserialize)]
#[serde(tag = "_type")]
enum Tagged {
    Vector3(Vector3),
    Vector2(Vector2),
    Color3(Color3),
    CFrame(CFrame),
    UDim(UDim),
    UDim2(UDim2),
    EnumItem(EnumItem),
    BrickColor(BrickColor),
    NumberSequence(NumberSequence),
    ColorSequence(ColorSequence),
    NumberRange(NumberRange),
    Rect(Rect),
    PhysicalProperties(PhysicalProperties),
}

impl From<Tagged> for Variant {
    fn from(tagged: Tagged) -> Self {
        match tagged {
            Tagged::Vector3(v) => Variant::Vector3(v),
            Tagged::Vector2(v) => Variant::Vector2(v),
            Tagged::Color3(v) => Variant::Color3(v),
            Tagged::CFrame(v) => Variant::CFrame(v),
            Tagged::UDim(v) => Variant::UDim(v),
            Tagged::UDim2(v) => Variant::UDim2(v),
            Tagged::EnumItem(v) => Variant::EnumItem(v),
            Tagged::BrickColor(v) => Variant::BrickColor(v),
            Tagged::NumberSequence(v) => Variant::NumberSequence(v),
            Tagged::ColorSequence(v) => Variant::ColorSequence(v),
            Tagged::NumberRange(v) => Variant::NumberRange(v),
            Tagged::Rect(v) => Variant::Rect(v),
            Tagged::PhysicalProperties(v) => Variant::PhysicalProperties(v),
        }
    }
}

impl Variant {
    fn as_tagged(&self) -> Option<TaggedRef<'_>> {
        Some(match self {
            Variant::Vector3(v) => TaggedRef::Vector3(v),
            Variant::Vector2(v) => TaggedRef::Vector2(v),
            Variant::Color3(v) => TaggedRef::Color3(v),
            Variant::CFrame(v) => TaggedRef::CFrame(v),
            Variant::UDim(v) => TaggedRef::UDim(v),
            Variant::UDim2(v) => TaggedRef::UDim2(v),
            Variant::EnumItem(v) => TaggedRef::EnumItem(v),
            Variant::BrickColor(v) => TaggedRef::BrickColor(v),
            Variant::NumberSequence(v) => TaggedRef::NumberSequence(v),
            Variant::ColorSequence(v) => TaggedRef::ColorSequence(v),
            Variant::NumberRange(v) => TaggedRef::NumberRange(v),
            Variant::Rect(v) => TaggedRef::Rect(v),
            Variant::PhysicalProperties(v) => TaggedRef::PhysicalProperties(v),
            _ => return None,
        })
    }
}

/// Encodes a native value into its wire form. Structured kinds become
/// `{_type, ...fields}` records; primitives pass through unwrapped.
///
/// Non-finite numbers have no JSON representation and encode as `null`.
pub fn encode(value: &Variant) -> Value {
    match value {
        Variant::Nil => Value::Null,
        Variant::Bool(flag) => Value::Bool(*flag),
        Variant::Number(number) => serde_json::Number::from_f64(*number)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Variant::String(text) => Value::String(text.clone()),
        Variant::Array(items) => Value::Array(items.iter().map(encode).collect()),
        Variant::Table(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, item)| (key.clone(), encode(item)))
                .collect(),
        ),
        structured => structured
            .as_tagged()
            .and_then(|tagged| serde_json::to_value(tagged).ok())
            .unwrap_or(Value::Null),
    }
}

/// Decodes a wire value.
///
/// With `hint`, the value must be a record of that kind; an untagged record
/// is read as the hinted kind, which lets callers pass bare `{x, y, z}`
/// objects where a `Vector3` (or a positional `CFrame`) is expected.
/// Without a hint, untagged records decode as tables.
pub fn decode(value: &Value, hint: Option<Kind>) -> Result<Variant, CodecError> {
    match (value, hint) {
        (Value::Object(map), hint) => decode_object(map, hint),
        (other, Some(expected)) => Err(CodecError::KindMismatch {
            expected,
            found: json_kind(other).to_string(),
        }),
        (Value::Null, None) => Ok(Variant::Nil),
        (Value::Bool(flag), None) => Ok(Variant::Bool(*flag)),
        (Value::Number(number), None) => number
            .as_f64()
            .map(Variant::Number)
            .ok_or_else(|| CodecError::Malformed {
                kind: "number".into(),
                reason: format!("{number} is not representable as f64"),
            }),
        (Value::String(text), None) => Ok(Variant::String(text.clone())),
        (Value::Array(items), None) => items
            .iter()
            .map(|item| decode(item, None))
            .collect::<Result<Vec<_>, _>>()
            .map(Variant::Array),
    }
}

/// Checks that every tagged record inside `value` decodes.
pub fn validate(value: &Value) -> Result<(), CodecError> {
    decode(value, None).map(|_| ())
}

fn decode_object(map: &Map<String, Value>, hint: Option<Kind>) -> Result<Variant, CodecError> {
    match map.get(TYPE_TAG) {
        Some(Value::String(tag)) => {
            let kind: Kind = tag
                .parse()
                .map_err(|_| CodecError::UnknownType(tag.clone()))?;
            if let Some(expected) = hint {
                if expected != kind {
                    return Err(CodecError::KindMismatch {
                        expected,
                        found: kind.as_str().to_string(),
                    });
                }
            }
            decode_tagged(kind, Value::Object(map.clone()))
        }
        Some(other) => Err(CodecError::UnknownType(other.to_string())),
        None => match hint {
            Some(kind) => decode_untagged(kind, map),
            None => map
                .iter()
                .map(|(key, item)| decode(item, None).map(|decoded| (key.clone(), decoded)))
                .collect::<Result<_, _>>()
                .map(Variant::Table),
        },
    }
}

fn decode_untagged(kind: Kind, map: &Map<String, Value>) -> Result<Variant, CodecError> {
    if kind == Kind::CFrame && !map.contains_key("components") {
        let position: Vector3 = serde_json::from_value(Value::Object(map.clone())).map_err(
            |err| CodecError::Malformed {
                kind: kind.as_str().into(),
                reason: format!("expected components or a position: {err}"),
            },
        )?;
        return Ok(Variant::CFrame(CFrame::from_position(position)));
    }
    let mut tagged = map.clone();
    tagged.insert(TYPE_TAG.into(), Value::String(kind.as_str().into()));
    decode_tagged(kind, Value::Object(tagged))
}

fn decode_tagged(kind: Kind, value: Value) -> Result<Variant, CodecError> {
    serde_json::from_value::<Tagged>(value)
        .map(Variant::from)
        .map_err(|err| CodecError::Malformed {
            kind: kind.as_str().into(),
            reason: err.to_string(),
        })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn color_wire_uses_byte_channels() {
        let encoded = encode(&Variant::Color3(Color3::from_rgb(255, 0, 12)));
        assert_eq!(encoded, json!({ "_type": "Color3", "r": 255.0, "g": 0.0, "b": 12.0 }));
    }

    #[test]
    fn udim2_is_flat_on_the_wire() {
        let value = Variant::UDim2(UDim2 {
            x: UDim {
                scale: 0.5,
                offset: -10,
            },
            y: UDim {
                scale: 1.0,
                offset: 0,
            },
        });
        let encoded = encode(&value);
        assert_eq!(encoded["_type"], "UDim2");
        assert_eq!(encoded["xScale"], 0.5);
        assert_eq!(encoded["xOffset"], -10);
    }

    #[test]
    fn nested_tables_decode_their_members() {
        let decoded = decode(
            &json!({ "Size": { "_type": "Vector3", "x": 4, "y": 1, "z": 2 }, "Anchored": true }),
            None,
        )
        .unwrap();
        let Variant::Table(entries) = decoded else {
            panic!("expected table");
        };
        assert_eq!(entries["Anchored"], Variant::Bool(true));
        assert_eq!(
            entries["Size"],
            Variant::Vector3(Vector3::new(4.0, 1.0, 2.0))
        );
    }

    #[test]
    fn positional_cframe_hint_gets_identity_rotation() {
        let decoded = decode(&json!({ "x": 1, "y": 2, "z": 3 }), Some(Kind::CFrame)).unwrap();
        let Variant::CFrame(cframe) = decoded else {
            panic!("expected cframe");
        };
        assert_eq!(cframe.position(), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(cframe.components[3], 1.0);
        assert_eq!(cframe.components[7], 1.0);
        assert_eq!(cframe.components[11], 1.0);
    }
}
