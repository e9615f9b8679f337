//! Byte-level primitives for the table image format.
//!
//! Unsigned integers are big-endian base-128 varints of 1-9 bytes (the
//! 9th byte carries a full 8 bits). Signed integers are zig-zag mapped first.
//! Floats are big-endian IEEE-754 bit patterns. Strings are a varint byte
//! length followed by UTF-8.

use crate::kind::ValueKind;
use crate::math::{Name, Quat, Rotator, Transform, Vector2, Vector3, Vector4};
use crate::value::MetadataValue;

/// Number of bytes needed to encode `value` as a varint.
pub const fn varint_len(value: u64) -> usize {
    if value <= 0x7F {
        1
    } else if value <= 0x3FFF {
        2
    } else if value <= 0x001F_FFFF {
        3
    } else if value <= 0x0FFF_FFFF {
        4
    } else if value <= 0x07_FFFF_FFFF {
        5
    } else if value <= 0x03FF_FFFF_FFFF {
        6
    } else if value <= 0x01_FFFF_FFFF_FFFF {
        7
    } else if value <= 0xFF_FFFF_FFFF_FFFF {
        8
    } else {
        9
    }
}

/// Append `value` as a varint.
#[allow(clippy::cast_possible_truncation)]
pub fn put_varint(buf: &mut Vec<u8>, value: u64) {
    let len = varint_len(value);
    let start = buf.len();
    buf.resize(start + len, 0);
    let out = &mut buf[start..];

    if len == 9 {
        let mut v = value >> 8;
        for slot in out[..8].iter_mut().rev() {
            *slot = (v as u8 & 0x7F) | 0x80;
            v >>= 7;
        }
        out[8] = value as u8;
        return;
    }

    let mut v = value;
    for (i, slot) in out.iter_mut().enumerate().rev() {
        *slot = if i == len - 1 {
            v as u8 & 0x7F
        } else {
            (v as u8 & 0x7F) | 0x80
        };
        v >>= 7;
    }
}

/// Zig-zag map a signed integer so small magnitudes stay short.
#[allow(clippy::cast_sign_loss)]
pub const fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[allow(clippy::cast_possible_wrap)]
pub const fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

pub fn put_signed(buf: &mut Vec<u8>, value: i64) {
    put_varint(buf, zigzag(value));
}

pub fn put_f64(buf: &mut Vec<u8>, value: f64) {
    buf.extend_from_slice(&value.to_bits().to_be_bytes());
}

pub fn put_f32(buf: &mut Vec<u8>, value: f32) {
    buf.extend_from_slice(&value.to_bits().to_be_bytes());
}

pub fn put_str(buf: &mut Vec<u8>, value: &str) {
    put_varint(buf, value.len() as u64);
    buf.extend_from_slice(value.as_bytes());
}

/// Cursor over an encoded image. Every read returns `None` on truncation.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub const fn position(&self) -> usize {
        self.pos
    }

    pub const fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    pub fn varint(&mut self) -> Option<u64> {
        let rest = self.buf.get(self.pos..)?;
        let mut value: u64 = 0;
        for (i, &byte) in rest.iter().enumerate().take(8) {
            if byte & 0x80 == 0 {
                value = (value << 7) | u64::from(byte);
                self.pos += i + 1;
                return Some(value);
            }
            value = (value << 7) | u64::from(byte & 0x7F);
        }
        let ninth = *rest.get(8)?;
        self.pos += 9;
        Some((value << 8) | u64::from(ninth))
    }

    pub fn signed(&mut self) -> Option<i64> {
        self.varint().map(unzigzag)
    }

    pub fn u16(&mut self) -> Option<u16> {
        self.varint().and_then(|v| u16::try_from(v).ok())
    }

    /// Varint length prefix.
    pub fn length(&mut self) -> Option<usize> {
        self.varint().and_then(|v| usize::try_from(v).ok())
    }

    pub fn bool(&mut self) -> Option<bool> {
        match self.take(1)?[0] {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }
    }

    pub fn f64(&mut self) -> Option<f64> {
        let bytes: [u8; 8] = self.take(8)?.try_into().ok()?;
        Some(f64::from_bits(u64::from_be_bytes(bytes)))
    }

    pub fn f32(&mut self) -> Option<f32> {
        let bytes: [u8; 4] = self.take(4)?.try_into().ok()?;
        Some(f32::from_bits(u32::from_be_bytes(bytes)))
    }

    pub fn str(&mut self) -> Option<&'a str> {
        let len = self.length()?;
        std::str::from_utf8(self.take(len)?).ok()
    }
}

fn put_vec3(buf: &mut Vec<u8>, v: Vector3) {
    put_f64(buf, v.x);
    put_f64(buf, v.y);
    put_f64(buf, v.z);
}

fn put_quat(buf: &mut Vec<u8>, q: Quat) {
    put_f64(buf, q.x);
    put_f64(buf, q.y);
    put_f64(buf, q.z);
    put_f64(buf, q.w);
}

fn read_vec3(r: &mut ByteReader<'_>) -> Option<Vector3> {
    Some(Vector3::new(r.f64()?, r.f64()?, r.f64()?))
}

fn read_quat(r: &mut ByteReader<'_>) -> Option<Quat> {
    Some(Quat::new(r.f64()?, r.f64()?, r.f64()?, r.f64()?))
}

/// Append the payload of `value` (without its kind tag).
pub fn put_value(buf: &mut Vec<u8>, value: &MetadataValue) {
    match value {
        MetadataValue::Bool(b) => buf.push(u8::from(*b)),
        MetadataValue::Int32(i) => put_signed(buf, i64::from(*i)),
        MetadataValue::Int64(i) => put_signed(buf, *i),
        MetadataValue::Float(f) => put_f32(buf, *f),
        MetadataValue::Double(d) => put_f64(buf, *d),
        MetadataValue::Vector2(v) => {
            put_f64(buf, v.x);
            put_f64(buf, v.y);
        }
        MetadataValue::Vector3(v) => put_vec3(buf, *v),
        MetadataValue::Vector4(v) => {
            put_f64(buf, v.x);
            put_f64(buf, v.y);
            put_f64(buf, v.z);
            put_f64(buf, v.w);
        }
        MetadataValue::Rotator(r) => {
            put_f64(buf, r.pitch);
            put_f64(buf, r.yaw);
            put_f64(buf, r.roll);
        }
        MetadataValue::Quat(q) => put_quat(buf, *q),
        MetadataValue::Transform(t) => {
            put_quat(buf, t.rotation);
            put_vec3(buf, t.translation);
            put_vec3(buf, t.scale);
        }
        MetadataValue::String(s) => put_str(buf, s),
        MetadataValue::Name(n) => put_str(buf, n.as_str()),
    }
}

/// Read a value payload of the given kind.
pub fn read_value(r: &mut ByteReader<'_>, kind: ValueKind) -> Option<MetadataValue> {
    let value = match kind {
        ValueKind::Bool => MetadataValue::Bool(r.bool()?),
        ValueKind::Int32 => MetadataValue::Int32(i32::try_from(r.signed()?).ok()?),
        ValueKind::Int64 => MetadataValue::Int64(r.signed()?),
        ValueKind::Float => MetadataValue::Float(r.f32()?),
        ValueKind::Double => MetadataValue::Double(r.f64()?),
        ValueKind::Vector2 => MetadataValue::Vector2(Vector2::new(r.f64()?, r.f64()?)),
        ValueKind::Vector3 => MetadataValue::Vector3(read_vec3(r)?),
        ValueKind::Vector4 => {
            MetadataValue::Vector4(Vector4::new(r.f64()?, r.f64()?, r.f64()?, r.f64()?))
        }
        ValueKind::Rotator => MetadataValue::Rotator(Rotator::new(r.f64()?, r.f64()?, r.f64()?)),
        ValueKind::Quat => MetadataValue::Quat(read_quat(r)?),
        ValueKind::Transform => MetadataValue::Transform(Transform {
            rotation: read_quat(r)?,
            translation: read_vec3(r)?,
            scale: read_vec3(r)?,
        }),
        ValueKind::String => MetadataValue::String(r.str()?.to_owned()),
        ValueKind::Name => MetadataValue::Name(Name::new(r.str()?)),
    };
    Some(value)
}
