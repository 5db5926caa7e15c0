// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry module - the interface to the external geometry kernel

mod backend;
mod csg;
mod transform;

pub use backend::{
    BackendError, Color, GeometryBackend, GeometryHandle, LinearExtrude, Resolution,
    RotateExtrude, TextParams,
};
pub use csg::{CsgNode, CsgOp, CsgTree};
pub use transform::TransformOp;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BooleanOp {
    Union,
    Difference,
    Intersection,
}
