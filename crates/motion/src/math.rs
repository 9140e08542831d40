//! f32 math shim: inherent methods on std, `libm` on bare metal.

#[cfg(not(feature = "std"))]
pub use libm::{fabsf, roundf, sqrtf};

#[cfg(feature = "std")]
#[inline]
pub fn sqrtf(v: f32) -> f32 {
    v.sqrt()
}

#[cfg(feature = "std")]
#[inline]
pub fn fabsf(v: f32) -> f32 {
    v.abs()
}

#[cfg(feature = "std")]
#[inline]
pub fn roundf(v: f32) -> f32 {
    v.round()
}
