use std::fmt;
use std::str::FromStr;

use crate::types::Variant;

/// The closed set of structured kinds recognised in a `_type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Vector3,
    Vector2,
    Color3,
    CFrame,
    UDim,
    UDim2,
    EnumItem,
    BrickColor,
    NumberSequence,
    ColorSequence,
    NumberRange,
    Rect,
    PhysicalProperties,
}

impl Kind {
    pub const ALL: [Kind; 13] = [
        Kind::Vector3,
        Kind::Vector2,
        Kind::Color3,
        Kind::CFrame,
        Kind::UDim,
        Kind::UDim2,
        Kind::EnumItem,
        Kind::BrickColor,
        Kind::NumberSequence,
        Kind::ColorSequence,
        Kind::NumberRange,
        Kind::Rect,
        Kind::PhysicalProperties,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Vector3 => "Vector3",
            Kind::Vector2 => "Vector2",
            Kind::Color3 => "Color3",
            Kind::CFrame => "CFrame",
            Kind::UDim => "UDim",
            Kind::UDim2 => "UDim2",
            Kind::EnumItem => "EnumItem",
            Kind::BrickColor => "BrickColor",
            Kind::NumberSequence => "NumberSequence",
            Kind::ColorSequence => "ColorSequence",
            Kind::NumberRange => "NumberRange",
            Kind::Rect => "Rect",
            Kind::PhysicalProperties => "PhysicalProperties",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl FromStr for Kind {
    type Err = UnknownKind;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == tag)
            .ok_or_else(|| UnknownKind(tag.to_string()))
    }
}

impl Variant {
    /// Structured kind of this value, `None` for primitives and containers.
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Variant::Nil
            | Variant::Bool(_)
            | Variant::Number(_)
            | Variant::String(_)
            | Variant::Array(_)
            | Variant::Table(_) => None,
            Variant::Vector3(_) => Some(Kind::Vector3),
            Variant::Vector2(_) => Some(Kind::Vector2),
            Variant::Color3(_) => Some(Kind::Color3),
            Variant::CFrame(_) => Some(Kind::CFrame),
            Variant::UDim(_) => Some(Kind::UDim),
            Variant::UDim2(_) => Some(Kind::UDim2),
            Variant::EnumItem(_) => Some(Kind::EnumItem),
            Variant::BrickColor(_) => Some(Kind::BrickColor),
            Variant::NumberSequence(_) => Some(Kind::NumberSequence),
            Variant::ColorSequence(_) => Some(Kind::ColorSequence),
            Variant::NumberRange(_) => Some(Kind::NumberRange),
            Variant::Rect(_) => Some(Kind::Rect),
            Variant::PhysicalProperties(_) => Some(Kind::PhysicalProperties),
        }
    }

    /// Short description used in mismatch diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            Variant::Nil => "null",
            Variant::Bool(_) => "boolean",
            Variant::Number(_) => "number",
            Variant::String(_) => "string",
            Variant::Array(_) => "array",
            Variant::Table(_) => "table",
            other => other.kind().map(Kind::as_str).unwrap_or("value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_parses_from_its_tag() {
        for kind in Kind::ALL {
            assert_eq!(kind.as_str().parse::<Kind>(), Ok(kind));
        }
    }

    #[test]
    fn tags_are_case_sensitive() {
        assert!("vector3".parse::<Kind>().is_err());
    }
}
