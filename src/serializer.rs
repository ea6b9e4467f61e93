//! Fixed-width compact representations for field values.
//!
//! A serializer is chosen once at registration and its `bit_width` never
//! changes afterwards, which is what makes the downlink layout static.
//! Packing may be lossy but is always deterministic; unpacking is total:
//! every bit pattern maps to some value, clamped into range if necessary.

use crate::bitstream::{bits_for, BitStream};
use crate::error::{ConfigError, ConfigResult};
use core::marker::PhantomData;

pub trait Serializer<T>: Send + Sync {
    fn bit_width(&self) -> usize;
    fn pack(&self, value: &T, stream: &mut BitStream<'_>);
    fn unpack(&self, stream: &mut BitStream<'_>) -> T;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolSerializer;

impl Serializer<bool> for BoolSerializer {
    fn bit_width(&self) -> usize {
        1
    }

    fn pack(&self, value: &bool, stream: &mut BitStream<'_>) {
        stream.write(u64::from(*value), 1);
    }

    fn unpack(&self, stream: &mut BitStream<'_>) -> bool {
        stream.read(1) == 1
    }
}

/// Integer types a field can hold.
pub trait IntegerValue: Copy + Send + Sync + 'static {
    const MIN: i128;
    const MAX: i128;
    fn to_i128(self) -> i128;
    fn from_i128(value: i128) -> Self;
}

macro_rules! integer_value {
    ($($ty:ty),*) => {
        $(
            impl IntegerValue for $ty {
                const MIN: i128 = <$ty>::MIN as i128;
                const MAX: i128 = <$ty>::MAX as i128;

                fn to_i128(self) -> i128 {
                    self as i128
                }

                #[allow(clippy::cast_possible_wrap)]
                fn from_i128(value: i128) -> Self {
                    value.clamp(<Self as IntegerValue>::MIN, <Self as IntegerValue>::MAX) as $ty
                }
            }
        )*
    };
}

integer_value!(u8, u16, u32, u64, i8, i16, i32, i64);

/// Offset encoding of an integer range `[min, max]`: the wire value is
/// `v - min` in just enough bits to hold `max - min`.
#[derive(Debug, Clone, Copy)]
pub struct IntegerSerializer<T> {
    min: i128,
    max: i128,
    bits: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: IntegerValue> IntegerSerializer<T> {
    pub fn new(min: T, max: T) -> ConfigResult<Self> {
        let (min, max) = (min.to_i128(), max.to_i128());
        if min > max {
            return Err(ConfigError::InvalidSerializer(format!(
                "integer range [{min}, {max}] is empty"
            )));
        }
        Ok(Self {
            min,
            max,
            bits: bits_for((max - min) as u64),
            _marker: PhantomData,
        })
    }

    /// Covers every value of `T`.
    pub fn full_range() -> Self {
        Self {
            min: T::MIN,
            max: T::MAX,
            bits: bits_for((T::MAX - T::MIN) as u64),
            _marker: PhantomData,
        }
    }

    pub fn range(&self) -> (T, T) {
        (T::from_i128(self.min), T::from_i128(self.max))
    }
}

impl<T: IntegerValue> Serializer<T> for IntegerSerializer<T> {
    fn bit_width(&self) -> usize {
        self.bits
    }

    fn pack(&self, value: &T, stream: &mut BitStream<'_>) {
        let clamped = value.to_i128().clamp(self.min, self.max);
        stream.write((clamped - self.min) as u64, self.bits);
    }

    fn unpack(&self, stream: &mut BitStream<'_>) -> T {
        let raw = i128::from(stream.read(self.bits));
        T::from_i128((self.min + raw).min(self.max))
    }
}

/// Floating point types a field can hold.
pub trait FloatValue: Copy + Send + Sync + 'static {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl FloatValue for f32 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl FloatValue for f64 {
    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Uniform quantizer over `[min, max]` with `2^bits` levels, the first at
/// `min` and the last at `max`. Inputs outside the range clamp to the
/// nearest bound; NaN packs as `min`.
#[derive(Debug, Clone, Copy)]
pub struct QuantizedSerializer<F> {
    min: f64,
    max: f64,
    bits: usize,
    levels: u64,
    _marker: PhantomData<fn() -> F>,
}

impl<F: FloatValue> QuantizedSerializer<F> {
    pub fn new(min: f64, max: f64, bits: usize) -> ConfigResult<Self> {
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(ConfigError::InvalidSerializer(format!(
                "quantization range [{min}, {max}] is empty or not finite"
            )));
        }
        if !(1..=64).contains(&bits) {
            return Err(ConfigError::InvalidSerializer(format!(
                "quantization width {bits} not in 1..=64"
            )));
        }
        let levels = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
        Ok(Self {
            min,
            max,
            bits,
            levels,
            _marker: PhantomData,
        })
    }

    /// Distance between adjacent reconstruction levels.
    #[allow(clippy::cast_precision_loss)]
    pub fn step(&self) -> f64 {
        (self.max - self.min) / self.levels as f64
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    #[allow(clippy::cast_precision_loss)]
    fn quantize(&self, value: f64) -> u64 {
        if value.is_nan() {
            return 0;
        }
        let clamped = value.clamp(self.min, self.max);
        let level = ((clamped - self.min) / self.step()).round();
        if level >= self.levels as f64 {
            self.levels
        } else {
            level as u64
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn reconstruct(&self, level: u64) -> f64 {
        (self.min + level.min(self.levels) as f64 * self.step()).clamp(self.min, self.max)
    }
}

impl<F: FloatValue> Serializer<F> for QuantizedSerializer<F> {
    fn bit_width(&self) -> usize {
        self.bits
    }

    fn pack(&self, value: &F, stream: &mut BitStream<'_>) {
        stream.write(self.quantize(value.to_f64()), self.bits);
    }

    fn unpack(&self, stream: &mut BitStream<'_>) -> F {
        F::from_f64(self.reconstruct(stream.read(self.bits)))
    }
}

/// Fixed-length array quantized component by component.
#[derive(Debug, Clone, Copy)]
pub struct VectorSerializer<F, const N: usize> {
    component: QuantizedSerializer<F>,
}

impl<F: FloatValue, const N: usize> VectorSerializer<F, N> {
    pub fn new(min: f64, max: f64, bits_per_component: usize) -> ConfigResult<Self> {
        Ok(Self {
            component: QuantizedSerializer::new(min, max, bits_per_component)?,
        })
    }

    pub fn step(&self) -> f64 {
        self.component.step()
    }
}

impl<F: FloatValue, const N: usize> Serializer<[F; N]> for VectorSerializer<F, N> {
    fn bit_width(&self) -> usize {
        self.component.bit_width() * N
    }

    fn pack(&self, value: &[F; N], stream: &mut BitStream<'_>) {
        for component in value {
            self.component.pack(component, stream);
        }
    }

    fn unpack(&self, stream: &mut BitStream<'_>) -> [F; N] {
        core::array::from_fn(|_| self.component.unpack(stream))
    }
}

/// Closed enumerations carried on the bus.
pub trait FieldEnum: Copy + Send + Sync + 'static {
    const VARIANTS: usize;
    /// Value decoded from an index no variant owns.
    const FALLBACK: Self;

    fn to_index(self) -> usize;
    fn from_index(index: usize) -> Option<Self>;
}

/// Encodes the variant index in `bits_for(VARIANTS - 1)` bits.
#[derive(Debug, Clone, Copy)]
pub struct EnumSerializer<E> {
    _marker: PhantomData<fn() -> E>,
}

impl<E: FieldEnum> EnumSerializer<E> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<E: FieldEnum> Default for EnumSerializer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: FieldEnum> Serializer<E> for EnumSerializer<E> {
    fn bit_width(&self) -> usize {
        bits_for(E::VARIANTS.saturating_sub(1) as u64)
    }

    fn pack(&self, value: &E, stream: &mut BitStream<'_>) {
        stream.write(value.to_index() as u64, self.bit_width());
    }

    fn unpack(&self, stream: &mut BitStream<'_>) -> E {
        let index = stream.read(self.bit_width()) as usize;
        E::from_index(index).unwrap_or(E::FALLBACK)
    }
}

/// Implements [`FieldEnum`] for a fieldless enum, in declaration order.
#[macro_export]
macro_rules! field_enum {
    ($ty:ty, fallback = $fallback:expr, [$($variant:expr),+ $(,)?]) => {
        impl $crate::serializer::FieldEnum for $ty {
            const VARIANTS: usize = [$($variant),+].len();
            const FALLBACK: Self = $fallback;

            fn to_index(self) -> usize {
                [$($variant),+]
                    .iter()
                    .position(|v| *v == self)
                    .unwrap_or(0)
            }

            fn from_index(index: usize) -> Option<Self> {
                [$($variant),+].get(index).copied()
            }
        }
    };
}
