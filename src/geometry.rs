//! Fixed-size aggregate types from Haiku's interface kit.
//!
//! These are all stored as packed little-endian components, in declaration order.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::flattenable::{fixed, Flattenable};
use crate::type_code::TypeCode;

/// A 2D point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A 2D extent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// An axis-aligned rectangle given by its edges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// A 32-bit color with alpha.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RgbColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl RgbColor {
    pub fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }
}

fn push_f32s(buf: &mut Vec<u8>, vals: &[f32]) {
    let start = buf.len();
    buf.resize(start + vals.len() * 4, 0);
    LittleEndian::write_f32_into(vals, &mut buf[start..]);
}

// `data` has already been checked against the registry width, which is exactly N floats.
fn read_f32s<const N: usize>(data: &[u8]) -> [f32; N] {
    let mut out = [0f32; N];
    LittleEndian::read_f32_into(data, &mut out);
    out
}

impl Flattenable for Point {
    const TYPE: TypeCode = TypeCode::Point;

    fn flattened_size(&self) -> usize {
        8
    }

    fn flatten_into(&self, buf: &mut Vec<u8>) {
        push_f32s(buf, &[self.x, self.y]);
    }

    fn unflatten(data: &[u8]) -> Result<Self> {
        let raw = fixed::<8>(Self::TYPE, data)?;
        let [x, y] = read_f32s::<2>(&raw);
        Ok(Point { x, y })
    }
}

impl Flattenable for Size {
    const TYPE: TypeCode = TypeCode::Size;

    fn flattened_size(&self) -> usize {
        8
    }

    fn flatten_into(&self, buf: &mut Vec<u8>) {
        push_f32s(buf, &[self.width, self.height]);
    }

    fn unflatten(data: &[u8]) -> Result<Self> {
        let raw = fixed::<8>(Self::TYPE, data)?;
        let [width, height] = read_f32s::<2>(&raw);
        Ok(Size { width, height })
    }
}

impl Flattenable for Rect {
    const TYPE: TypeCode = TypeCode::Rect;

    fn flattened_size(&self) -> usize {
        16
    }

    fn flatten_into(&self, buf: &mut Vec<u8>) {
        push_f32s(buf, &[self.left, self.top, self.right, self.bottom]);
    }

    fn unflatten(data: &[u8]) -> Result<Self> {
        let raw = fixed::<16>(Self::TYPE, data)?;
        let [left, top, right, bottom] = read_f32s::<4>(&raw);
        Ok(Rect {
            left,
            top,
            right,
            bottom,
        })
    }
}

impl Flattenable for RgbColor {
    const TYPE: TypeCode = TypeCode::Color;

    fn flattened_size(&self) -> usize {
        4
    }

    fn flatten_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&[self.red, self.green, self.blue, self.alpha]);
    }

    fn unflatten(data: &[u8]) -> Result<Self> {
        let [red, green, blue, alpha] = fixed::<4>(Self::TYPE, data)?;
        Ok(RgbColor {
            red,
            green,
            blue,
            alpha,
        })
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(x:{}, y:{})", self.x, self.y)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(w:{}, h:{})", self.width, self.height)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "(l:{}, t:{}, r:{}, b:{})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "(r:{}, g:{}, b:{}, a:{})",
            self.red, self.green, self.blue, self.alpha
        )
    }
}
