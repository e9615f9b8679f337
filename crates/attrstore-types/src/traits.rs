//! Compile-time capability description per value kind.
//!
//! [`MetadataType`] is implemented exactly once per [`ValueKind`]. Its
//! capability constants are read from the central table in
//! [`ValueKind::traits`]; the primitive methods return `None` wherever the
//! corresponding constant is `false`.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]

use std::cmp::Ordering;
use std::fmt;

use crate::kind::ValueKind;
use crate::math::{Name, Quat, Rotator, Transform, Vector2, Vector3, Vector4};
use crate::value::MetadataValue;

/// A concrete value type storable in an attribute.
pub trait MetadataType: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Runtime tag of this type.
    const KIND: ValueKind;

    const CAN_MIN_MAX: bool = Self::KIND.traits().can_min_max;
    const CAN_SUB_ADD: bool = Self::KIND.traits().can_sub_add;
    const CAN_MUL_DIV: bool = Self::KIND.traits().can_mul_div;
    const CAN_INTERPOLATE: bool = Self::KIND.traits().can_interpolate;
    const COMPRESS_DATA: bool = Self::KIND.traits().compress_data;

    /// Zero / identity value used to seed accumulation.
    fn zero_value() -> Self;

    fn min(&self, _other: &Self) -> Option<Self> {
        None
    }

    fn max(&self, _other: &Self) -> Option<Self> {
        None
    }

    fn add(&self, _other: &Self) -> Option<Self> {
        None
    }

    fn sub(&self, _other: &Self) -> Option<Self> {
        None
    }

    fn mul(&self, _other: &Self) -> Option<Self> {
        None
    }

    fn div(&self, _other: &Self) -> Option<Self> {
        None
    }

    /// `self + other * weight`.
    fn weighted_sum(&self, _other: &Self, _weight: f64) -> Option<Self> {
        None
    }

    /// Ordering for kinds where [`ValueKind::is_ordered`] holds.
    fn compare(&self, _other: &Self) -> Option<Ordering> {
        None
    }

    /// Wrap into the erased representation.
    fn into_value(self) -> MetadataValue;

    /// Unwrap an erased value of exactly this kind.
    fn from_value(value: &MetadataValue) -> Option<Self>;

    /// Unwrap an erased value, broadcasting it to this kind first if needed.
    fn from_broadcast(value: &MetadataValue) -> Option<Self> {
        if value.kind() == Self::KIND {
            return Self::from_value(value);
        }
        value
            .broadcast_to(Self::KIND)
            .and_then(|v| Self::from_value(&v))
    }
}

macro_rules! erased_bridge {
    ($variant:ident) => {
        fn into_value(self) -> MetadataValue {
            MetadataValue::$variant(self)
        }

        fn from_value(value: &MetadataValue) -> Option<Self> {
            match value {
                MetadataValue::$variant(v) => Some(v.clone()),
                _ => None,
            }
        }
    };
}

macro_rules! integer_kind {
    ($ty:ty, $kind:ident) => {
        impl MetadataType for $ty {
            const KIND: ValueKind = ValueKind::$kind;

            fn zero_value() -> Self {
                0
            }

            fn min(&self, other: &Self) -> Option<Self> {
                Some(Ord::min(*self, *other))
            }

            fn max(&self, other: &Self) -> Option<Self> {
                Some(Ord::max(*self, *other))
            }

            fn add(&self, other: &Self) -> Option<Self> {
                Some(self.wrapping_add(*other))
            }

            fn sub(&self, other: &Self) -> Option<Self> {
                Some(self.wrapping_sub(*other))
            }

            fn mul(&self, other: &Self) -> Option<Self> {
                Some(self.wrapping_mul(*other))
            }

            /// Division by zero yields 0.
            fn div(&self, other: &Self) -> Option<Self> {
                Some(self.checked_div(*other).unwrap_or(0))
            }

            fn weighted_sum(&self, other: &Self, weight: f64) -> Option<Self> {
                Some(self.wrapping_add((*other as f64 * weight) as $ty))
            }

            fn compare(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }

            erased_bridge!($kind);
        }
    };
}

macro_rules! float_kind {
    ($ty:ty, $kind:ident) => {
        impl MetadataType for $ty {
            const KIND: ValueKind = ValueKind::$kind;

            fn zero_value() -> Self {
                0.0
            }

            fn min(&self, other: &Self) -> Option<Self> {
                Some(<$ty>::min(*self, *other))
            }

            fn max(&self, other: &Self) -> Option<Self> {
                Some(<$ty>::max(*self, *other))
            }

            fn add(&self, other: &Self) -> Option<Self> {
                Some(self + other)
            }

            fn sub(&self, other: &Self) -> Option<Self> {
                Some(self - other)
            }

            fn mul(&self, other: &Self) -> Option<Self> {
                Some(self * other)
            }

            fn div(&self, other: &Self) -> Option<Self> {
                Some(self / other)
            }

            fn weighted_sum(&self, other: &Self, weight: f64) -> Option<Self> {
                Some(self + (f64::from(*other) * weight) as $ty)
            }

            fn compare(&self, other: &Self) -> Option<Ordering> {
                self.partial_cmp(other)
            }

            erased_bridge!($kind);
        }
    };
}

macro_rules! vector_kind {
    ($ty:ident) => {
        impl MetadataType for $ty {
            const KIND: ValueKind = ValueKind::$ty;

            fn zero_value() -> Self {
                $ty::ZERO
            }

            fn min(&self, other: &Self) -> Option<Self> {
                Some(self.component_min(*other))
            }

            fn max(&self, other: &Self) -> Option<Self> {
                Some(self.component_max(*other))
            }

            fn add(&self, other: &Self) -> Option<Self> {
                Some(*self + *other)
            }

            fn sub(&self, other: &Self) -> Option<Self> {
                Some(*self - *other)
            }

            fn mul(&self, other: &Self) -> Option<Self> {
                Some(*self * *other)
            }

            fn div(&self, other: &Self) -> Option<Self> {
                Some(*self / *other)
            }

            fn weighted_sum(&self, other: &Self, weight: f64) -> Option<Self> {
                Some(*self + *other * weight)
            }

            erased_bridge!($ty);
        }
    };
}

integer_kind!(i32, Int32);
integer_kind!(i64, Int64);
float_kind!(f32, Float);
float_kind!(f64, Double);
vector_kind!(Vector2);
vector_kind!(Vector3);
vector_kind!(Vector4);

impl MetadataType for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn zero_value() -> Self {
        false
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    erased_bridge!(Bool);
}

impl MetadataType for Rotator {
    const KIND: ValueKind = ValueKind::Rotator;

    fn zero_value() -> Self {
        Self::ZERO
    }

    fn add(&self, other: &Self) -> Option<Self> {
        Some(*self + *other)
    }

    fn sub(&self, other: &Self) -> Option<Self> {
        Some(*self - *other)
    }

    fn weighted_sum(&self, other: &Self, weight: f64) -> Option<Self> {
        Some(*self + *other * weight)
    }

    erased_bridge!(Rotator);
}

impl MetadataType for Quat {
    const KIND: ValueKind = ValueKind::Quat;

    fn zero_value() -> Self {
        Self::IDENTITY
    }

    fn mul(&self, other: &Self) -> Option<Self> {
        Some(*self * *other)
    }

    fn div(&self, other: &Self) -> Option<Self> {
        Some(*self * other.inverse())
    }

    fn weighted_sum(&self, other: &Self, weight: f64) -> Option<Self> {
        Some(self.weighted_add(*other, weight))
    }

    erased_bridge!(Quat);
}

impl MetadataType for Transform {
    const KIND: ValueKind = ValueKind::Transform;

    fn zero_value() -> Self {
        Self::IDENTITY
    }

    fn mul(&self, other: &Self) -> Option<Self> {
        Some(self.compose(*other))
    }

    fn div(&self, other: &Self) -> Option<Self> {
        Some(self.relative_to(*other))
    }

    fn weighted_sum(&self, other: &Self, weight: f64) -> Option<Self> {
        Some(Self {
            rotation: self.rotation.weighted_add(other.rotation, weight),
            translation: self.translation + other.translation * weight,
            scale: self.scale + other.scale * weight,
        })
    }

    erased_bridge!(Transform);
}

impl MetadataType for String {
    const KIND: ValueKind = ValueKind::String;

    fn zero_value() -> Self {
        Self::new()
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    erased_bridge!(String);
}

impl MetadataType for Name {
    const KIND: ValueKind = ValueKind::Name;

    fn zero_value() -> Self {
        Self::none()
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    erased_bridge!(Name);
}
