//! Plain geometric value types stored in attributes.
//!
//! Components are `f64`. Rotators are in degrees (pitch about Y, yaw about
//! Z, roll about X).
#![allow(clippy::suboptimal_flops, clippy::many_single_char_names)]

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

macro_rules! componentwise {
    ($ty:ident { $($field:ident),+ }) => {
        impl $ty {
            pub const ZERO: Self = Self { $($field: 0.0),+ };

            /// Every component set to `v`.
            pub const fn splat(v: f64) -> Self {
                Self { $($field: v),+ }
            }

            #[must_use]
            pub fn component_min(self, other: Self) -> Self {
                Self { $($field: self.$field.min(other.$field)),+ }
            }

            #[must_use]
            pub fn component_max(self, other: Self) -> Self {
                Self { $($field: self.$field.max(other.$field)),+ }
            }

            pub fn dot(self, other: Self) -> f64 {
                0.0 $(+ self.$field * other.$field)+
            }

            pub fn length(self) -> f64 {
                self.dot(self).sqrt()
            }

            #[must_use]
            pub fn abs(self) -> Self {
                Self { $($field: self.$field.abs()),+ }
            }
        }

        impl Add for $ty {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                Self { $($field: self.$field + rhs.$field),+ }
            }
        }

        impl Sub for $ty {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                Self { $($field: self.$field - rhs.$field),+ }
            }
        }

        impl Mul for $ty {
            type Output = Self;
            fn mul(self, rhs: Self) -> Self {
                Self { $($field: self.$field * rhs.$field),+ }
            }
        }

        impl Div for $ty {
            type Output = Self;
            fn div(self, rhs: Self) -> Self {
                Self { $($field: self.$field / rhs.$field),+ }
            }
        }

        impl Mul<f64> for $ty {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self {
                Self { $($field: self.$field * rhs),+ }
            }
        }

        impl Neg for $ty {
            type Output = Self;
            fn neg(self) -> Self {
                Self { $($field: -self.$field),+ }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Vector4 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// Euler rotation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Rotator {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

componentwise!(Vector2 { x, y });
componentwise!(Vector3 { x, y, z });
componentwise!(Vector4 { x, y, z, w });
componentwise!(Rotator { pitch, yaw, roll });

impl Vector2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Vector3 {
    pub const ONE: Self = Self::splat(1.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn cross(self, o: Self) -> Self {
        Self {
            x: self.y * o.z - self.z * o.y,
            y: self.z * o.x - self.x * o.z,
            z: self.x * o.y - self.y * o.x,
        }
    }

    /// Component-wise division that yields 0 where the divisor is 0.
    #[must_use]
    pub fn safe_div(self, o: Self) -> Self {
        let d = |a: f64, b: f64| if b == 0.0 { 0.0 } else { a / b };
        Self {
            x: d(self.x, o.x),
            y: d(self.y, o.y),
            z: d(self.z, o.z),
        }
    }
}

impl Vector4 {
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }
}

impl Rotator {
    pub const fn new(pitch: f64, yaw: f64, roll: f64) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Quaternion for this rotation.
    pub fn quaternion(self) -> Quat {
        let half = std::f64::consts::PI / 360.0;
        let (sp, cp) = (self.pitch * half).sin_cos();
        let (sy, cy) = (self.yaw * half).sin_cos();
        let (sr, cr) = (self.roll * half).sin_cos();
        Quat {
            x: cr * sp * sy - sr * cp * cy,
            y: -cr * sp * cy - sr * cp * sy,
            z: cr * cp * sy - sr * sp * cy,
            w: cr * cp * cy + sr * sp * sy,
        }
    }
}

/// Rotation quaternion.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    pub fn dot(self, o: Self) -> f64 {
        self.x * o.x + self.y * o.y + self.z * o.z + self.w * o.w
    }

    /// Inverse rotation. The zero quaternion inverts to identity.
    #[must_use]
    pub fn inverse(self) -> Self {
        let norm_sq = self.dot(self);
        if norm_sq == 0.0 {
            return Self::IDENTITY;
        }
        Self::new(
            -self.x / norm_sq,
            -self.y / norm_sq,
            -self.z / norm_sq,
            self.w / norm_sq,
        )
    }

    #[must_use]
    pub fn normalized(self) -> Self {
        let len = self.dot(self).sqrt();
        if len == 0.0 {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Rotate a vector by this quaternion.
    pub fn rotate(self, v: Vector3) -> Vector3 {
        let q = Vector3::new(self.x, self.y, self.z);
        let t = q.cross(v) * 2.0;
        v + t * self.w + q.cross(t)
    }

    /// Weighted accumulation on the same hemisphere as `self`.
    #[must_use]
    pub fn weighted_add(self, other: Self, weight: f64) -> Self {
        let w = if self.dot(other) < 0.0 { -weight } else { weight };
        Self::new(
            self.x + other.x * w,
            self.y + other.y * w,
            self.z + other.z * w,
            self.w + other.w * w,
        )
    }
}

/// Hamilton product: `a * b` applies `b` first, then `a`.
impl Mul for Quat {
    type Output = Self;
    fn mul(self, b: Self) -> Self {
        let a = self;
        Self::new(
            a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
            a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
            a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
        )
    }
}

/// Rotation, translation and non-uniform scale.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Transform {
    pub rotation: Quat,
    pub translation: Vector3,
    pub scale: Vector3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        translation: Vector3::ZERO,
        scale: Vector3::ONE,
    };

    pub const fn from_translation(translation: Vector3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub const fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    /// `self` followed by `other`.
    #[must_use]
    pub fn compose(self, other: Self) -> Self {
        Self {
            rotation: other.rotation * self.rotation,
            scale: self.scale * other.scale,
            translation: other.rotation.rotate(self.translation * other.scale) + other.translation,
        }
    }

    /// `self` expressed relative to `other` (`self * other⁻¹`).
    #[must_use]
    pub fn relative_to(self, other: Self) -> Self {
        let inv = other.rotation.inverse();
        Self {
            rotation: inv * self.rotation,
            scale: self.scale.safe_div(other.scale),
            translation: inv
                .rotate(self.translation - other.translation)
                .safe_div(other.scale),
        }
    }
}

/// Interned-name value. Compared case-sensitively.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The empty name.
    pub const fn none() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Vector2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X={} Y={}", self.x, self.y)
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X={} Y={} Z={}", self.x, self.y, self.z)
    }
}

impl fmt::Display for Vector4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X={} Y={} Z={} W={}", self.x, self.y, self.z, self.w)
    }
}

impl fmt::Display for Rotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P={} Y={} R={}", self.pitch, self.yaw, self.roll)
    }
}

impl fmt::Display for Quat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X={} Y={} Z={} W={}", self.x, self.y, self.z, self.w)
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.translation,
            self.rotation,
            self.scale
        )
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
