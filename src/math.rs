use std::{
    array,
    ops::{Add, AddAssign, Div, Mul, Neg, RangeInclusive, Sub},
};

use bytemuck::NoUninit;

/// Scalar types the vector math is generic over.
pub trait Float:
    Copy
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    const ZERO: Self;
    const ONE: Self;

    fn sqrt(self) -> Self;
    fn max(self, other: Self) -> Self;
    fn min(self, other: Self) -> Self;
}

macro_rules! impl_float {
    ($($t:ty),*) => {$(
        impl Float for $t {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;

            fn sqrt(self) -> Self {
                <$t>::sqrt(self)
            }

            fn max(self, other: Self) -> Self {
                <$t>::max(self, other)
            }

            fn min(self, other: Self) -> Self {
                <$t>::min(self, other)
            }
        }
    )*};
}

impl_float!(f32, f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Vec<T, const N: usize>([T; N]);

impl<T: Float, const N: usize> Vec<T, N> {
    pub fn dot(self, other: Self) -> T {
        let mut sum = T::ZERO;
        for (&a, &b) in self.0.iter().zip(&other.0) {
            sum = sum + a * b;
        }
        sum
    }

    pub fn dist(self, other: Self) -> T {
        (other - self).length()
    }

    pub fn length(self) -> T {
        self.dot(self).sqrt()
    }

    /// Scales the vector to unit length.
    ///
    /// A zero vector has no direction; the result is NaN in every component.
    pub fn normalize(self) -> Self {
        self / self.length()
    }

    /// Shortens the vector to at most `max`, keeping its direction.
    pub fn clamp_length(self, max: T) -> Self {
        let len = self.length();
        if len > max {
            self * (max / len)
        } else {
            self
        }
    }
}

impl<T: Copy> Vec<T, 2> {
    pub fn x(self) -> T {
        self.0[0]
    }

    pub fn y(self) -> T {
        self.0[1]
    }
}

impl<T: Float> Vec<T, 2> {
    /// Counter-clockwise perpendicular `(-y, x)`.
    pub fn perp(self) -> Self {
        vec2(-self.y(), self.x())
    }
}

impl<const N: usize> Vec<f64, N> {
    pub fn to_f32(self) -> Vec<f32, N> {
        Vec(self.0.map(|c| c as f32))
    }
}

impl<const N: usize> Vec<f32, N> {
    pub fn to_f64(self) -> Vec<f64, N> {
        Vec(self.0.map(f64::from))
    }
}

// Safety: `[T; N]` has no padding iff `T` has no padding.
unsafe impl<T: NoUninit, const N: usize> NoUninit for Vec<T, N> {}

pub type Vec2<T> = Vec<T, 2>;
pub type Vec2f = Vec2<f32>;
pub type Vec2d = Vec2<f64>;
pub type Vec3f = Vec<f32, 3>;

impl<T, const N: usize> From<[T; N]> for Vec<T, N> {
    fn from(value: [T; N]) -> Self {
        Self(value)
    }
}

impl<T, const N: usize> From<Vec<T, N>> for [T; N] {
    fn from(value: Vec<T, N>) -> Self {
        value.0
    }
}

impl<T, const N: usize> Add<Vec<T, N>> for Vec<T, N>
where
    T: Add<Output = T> + Copy,
{
    type Output = Vec<T, N>;

    fn add(self, rhs: Vec<T, N>) -> Self::Output {
        Vec(array::from_fn(|i| self.0[i] + rhs.0[i]))
    }
}

impl<T, const N: usize> AddAssign<Vec<T, N>> for Vec<T, N>
where
    T: Add<Output = T> + Copy,
{
    fn add_assign(&mut self, rhs: Vec<T, N>) {
        *self = *self + rhs;
    }
}

impl<T, const N: usize> Sub<Vec<T, N>> for Vec<T, N>
where
    T: Sub<Output = T> + Copy,
{
    type Output = Vec<T, N>;

    fn sub(self, rhs: Vec<T, N>) -> Self::Output {
        Vec(array::from_fn(|i| self.0[i] - rhs.0[i]))
    }
}

impl<T, const N: usize> Neg for Vec<T, N>
where
    T: Neg<Output = T> + Copy,
{
    type Output = Vec<T, N>;

    fn neg(self) -> Self::Output {
        Vec(self.0.map(|c| -c))
    }
}

impl<T, const N: usize> Mul<Vec<T, N>> for Vec<T, N>
where
    T: Mul<Output = T> + Copy,
{
    type Output = Vec<T, N>;

    fn mul(self, rhs: Vec<T, N>) -> Self::Output {
        Vec(array::from_fn(|i| self.0[i] * rhs.0[i]))
    }
}

impl<T, const N: usize> Mul<T> for Vec<T, N>
where
    T: Mul<Output = T> + Copy,
{
    type Output = Vec<T, N>;

    fn mul(self, rhs: T) -> Self::Output {
        Vec(array::from_fn(|i| self.0[i] * rhs))
    }
}

impl<T, const N: usize> Div<T> for Vec<T, N>
where
    T: Div<Output = T> + Copy,
{
    type Output = Vec<T, N>;

    fn div(self, rhs: T) -> Self::Output {
        Vec(array::from_fn(|i| self.0[i] / rhs))
    }
}

pub const fn vec2<T>(x: T, y: T) -> Vec2<T> {
    Vec([x, y])
}

pub const fn vec3<T>(x: T, y: T, z: T) -> Vec<T, 3> {
    Vec([x, y, z])
}

pub fn lerp<R, T>(range: RangeInclusive<R>, t: T) -> R
where
    T: Float,
    R: Copy + Add<R, Output = R> + Mul<T, Output = R>,
{
    *range.start() * (T::ONE - t) + *range.end() * t
}

/// Axis-aligned 2D affine map `p * scale + offset`.
///
/// Orthographic projections and their inverses are exactly this shape, so the
/// camera uses it for both directions of the screen/world mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2 {
    pub scale: Vec2d,
    pub offset: Vec2d,
}

impl Transform2 {
    /// Orthographic projection mapping the box `min..=max` onto `-1..=1`.
    pub fn ortho(min: Vec2d, max: Vec2d) -> Self {
        let extent = max - min;
        let scale = vec2(2.0 / extent.x(), 2.0 / extent.y());
        let offset = vec2(-1.0, -1.0) - min * scale;
        Self { scale, offset }
    }

    pub fn apply(&self, p: Vec2d) -> Vec2d {
        p * self.scale + self.offset
    }

    pub fn inverse(&self) -> Self {
        let scale = vec2(1.0 / self.scale.x(), 1.0 / self.scale.y());
        Self {
            scale,
            offset: -(self.offset * scale),
        }
    }

    /// Column-major 4x4 matrix for shader uniforms.
    pub fn to_mat4(&self) -> [[f32; 4]; 4] {
        let s = self.scale.to_f32();
        let o = self.offset.to_f32();
        [
            [s.x(), 0.0, 0.0, 0.0],
            [0.0, s.y(), 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [o.x(), o.y(), 0.0, 1.0],
        ]
    }
}
