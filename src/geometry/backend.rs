// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Capability interface of the external geometry kernel
//!
//! The interpreter never builds meshes. Every terminal geometric operation is
//! a call on a [`GeometryBackend`], which hands back an opaque
//! [`GeometryHandle`]. Child geometry is always passed by handle.

use super::{BooleanOp, TransformOp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque reference to geometry owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeometryHandle(pub u64);

impl GeometryHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Failure reported by the geometry kernel
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("{operation} is not supported by this backend")]
    Unsupported { operation: String },

    #[error("invalid arguments to {operation}: {message}")]
    InvalidArguments { operation: String, message: String },

    #[error("unknown geometry handle #{0}")]
    UnknownHandle(u64),

    #[error("{0}")]
    Kernel(String),
}

/// Grid below which radii count as degenerate
const GRID_FINE: f64 = 0.000_000_953_674_316_406_25;

/// Circle tessellation settings taken from `$fn`, `$fa` and `$fs`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    #[serde(rename = "fn")]
    pub fn_: f64,
    pub fa: f64,
    pub fs: f64,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            fn_: 0.0,
            fa: 12.0,
            fs: 2.0,
        }
    }
}

impl Resolution {
    pub fn new(fn_: f64, fa: f64, fs: f64) -> Self {
        Self { fn_, fa, fs }
    }

    /// Number of segments for a full circle of radius `r`
    pub fn fragments(&self, r: f64) -> u32 {
        if r < GRID_FINE || !r.is_finite() {
            return 3;
        }
        if self.fn_ > 0.0 {
            return (self.fn_.floor() as u32).max(3);
        }
        let by_angle = 360.0 / self.fa.max(0.01);
        let by_size = r * 2.0 * std::f64::consts::PI / self.fs.max(0.01);
        by_angle.min(by_size).max(5.0).ceil() as u32
    }
}

/// `text()` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextParams {
    pub text: String,
    pub size: f64,
    pub font: Option<String>,
    pub halign: String,
    pub valign: String,
    pub spacing: f64,
    pub direction: String,
    pub language: String,
    pub script: String,
    pub resolution: Resolution,
}

/// `linear_extrude()` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearExtrude {
    pub height: f64,
    pub center: bool,
    pub convexity: u32,
    pub twist: f64,
    pub slices: Option<u32>,
    pub scale: [f64; 2],
    pub resolution: Resolution,
}

/// `rotate_extrude()` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotateExtrude {
    pub angle: f64,
    pub convexity: u32,
    pub resolution: Resolution,
}

/// `color()` argument, either a name / hex string or RGBA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Color {
    Named { name: String, alpha: f64 },
    Rgba([f64; 4]),
}

/// Operations the interpreter requires from a geometry kernel
pub trait GeometryBackend {
    fn cube(&mut self, size: [f64; 3], center: bool) -> Result<GeometryHandle, BackendError>;

    fn sphere(&mut self, radius: f64, resolution: Resolution) -> Result<GeometryHandle, BackendError>;

    fn cylinder(
        &mut self,
        height: f64,
        r1: f64,
        r2: f64,
        center: bool,
        resolution: Resolution,
    ) -> Result<GeometryHandle, BackendError>;

    fn square(&mut self, size: [f64; 2], center: bool) -> Result<GeometryHandle, BackendError>;

    fn circle(&mut self, radius: f64, resolution: Resolution) -> Result<GeometryHandle, BackendError>;

    fn polygon(
        &mut self,
        points: &[[f64; 2]],
        paths: Option<&[Vec<usize>]>,
    ) -> Result<GeometryHandle, BackendError>;

    fn polyhedron(
        &mut self,
        points: &[[f64; 3]],
        faces: &[Vec<usize>],
    ) -> Result<GeometryHandle, BackendError>;

    fn text(&mut self, params: &TextParams) -> Result<GeometryHandle, BackendError>;

    fn transform(
        &mut self,
        op: &TransformOp,
        children: &[GeometryHandle],
    ) -> Result<GeometryHandle, BackendError>;

    fn boolean(
        &mut self,
        op: BooleanOp,
        children: &[GeometryHandle],
    ) -> Result<GeometryHandle, BackendError>;

    fn linear_extrude(
        &mut self,
        params: &LinearExtrude,
        children: &[GeometryHandle],
    ) -> Result<GeometryHandle, BackendError>;

    fn rotate_extrude(
        &mut self,
        params: &RotateExtrude,
        children: &[GeometryHandle],
    ) -> Result<GeometryHandle, BackendError>;

    /// Kernels without material support just group the children
    fn color(
        &mut self,
        _color: &Color,
        children: &[GeometryHandle],
    ) -> Result<GeometryHandle, BackendError> {
        self.boolean(BooleanOp::Union, children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_from_fn() {
        let res = Resolution::new(6.0, 12.0, 2.0);
        assert_eq!(res.fragments(2.0), 6);

        // $fn below 3 is clamped
        let res = Resolution::new(1.0, 12.0, 2.0);
        assert_eq!(res.fragments(2.0), 3);
    }

    #[test]
    fn test_fragments_from_fa_fs() {
        let res = Resolution::default();
        // r = 1: 2*pi/2 = 3.14 -> clamped to 5
        assert_eq!(res.fragments(1.0), 5);
        // r = 100: min(30, 314) = 30
        assert_eq!(res.fragments(100.0), 30);
    }

    #[test]
    fn test_degenerate_radius() {
        assert_eq!(Resolution::default().fragments(0.0), 3);
    }
}
