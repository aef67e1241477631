use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// RGB color in byte channels, written on the wire as `{r, g, b}` in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ColorWire", into = "ColorWire")]
pub struct Color3 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color3 {
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Serialize, Deserialize)]
struct ColorWire {
    r: f64,
    g: f64,
    b: f64,
}

impl TryFrom<ColorWire> for Color3 {
    type Error = String;

    fn try_from(wire: ColorWire) -> Result<Self, Self::Error> {
        Ok(Color3 {
            r: channel("r", wire.r)?,
            g: channel("g", wire.g)?,
            b: channel("b", wire.b)?,
        })
    }
}

impl From<Color3> for ColorWire {
    fn from(color: Color3) -> Self {
        ColorWire {
            r: f64::from(color.r),
            g: f64::from(color.g),
            b: f64::from(color.b),
        }
    }
}

fn channel(name: &str, value: f64) -> Result<u8, String> {
    if !(0.0..=255.0).contains(&value) {
        return Err(format!("color channel {name}={value} is outside 0..=255"));
    }
    Ok(value.round() as u8)
}

/// Rigid transform: position followed by the row-major 3x3 rotation matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CFrame {
    pub components: [f64; 12],
}

impl CFrame {
    pub fn from_position(position: Vector3) -> Self {
        Self {
            components: [
                position.x, position.y, position.z, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0,
            ],
        }
    }

    pub fn position(&self) -> Vector3 {
        Vector3::new(self.components[0], self.components[1], self.components[2])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UDim {
    pub scale: f64,
    pub offset: i32,
}

/// Two scale/offset pairs. The wire form is flat: `xScale, xOffset, yScale, yOffset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "UDim2Wire", into = "UDim2Wire")]
pub struct UDim2 {
    pub x: UDim,
    pub y: UDim,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UDim2Wire {
    x_scale: f64,
    x_offset: i32,
    y_scale: f64,
    y_offset: i32,
}

impl From<UDim2Wire> for UDim2 {
    fn from(wire: UDim2Wire) -> Self {
        UDim2 {
            x: UDim {
                scale: wire.x_scale,
                offset: wire.x_offset,
            },
            y: UDim {
                scale: wire.y_scale,
                offset: wire.y_offset,
            },
        }
    }
}

impl From<UDim2> for UDim2Wire {
    fn from(value: UDim2) -> Self {
        UDim2Wire {
            x_scale: value.x.scale,
            x_offset: value.x.offset,
            y_scale: value.y.scale,
            y_offset: value.y.offset,
        }
    }
}

/// Member of a named enumeration, e.g. `Material.Plastic`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumItem {
    pub enum_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
}

/// Named palette color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrickColor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumberSequenceKeypoint {
    pub time: f64,
    pub value: f64,
    #[serde(default)]
    pub envelope: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberSequence {
    pub keypoints: Vec<NumberSequenceKeypoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorSequenceKeypoint {
    pub time: f64,
    pub color: Color3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorSequence {
    pub keypoints: Vec<ColorSequenceKeypoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumberRange {
    pub min: f64,
    pub max: f64,
}

/// Axis-aligned 2D bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vector2,
    pub max: Vector2,
}

/// Physical-material coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalProperties {
    pub density: f64,
    pub friction: f64,
    pub elasticity: f64,
    pub friction_weight: f64,
    pub elasticity_weight: f64,
}

/// A decoded value: primitives, containers, or one of the structured kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Variant>),
    Table(BTreeMap<String, Variant>),
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
