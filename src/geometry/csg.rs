// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Recording backend that builds a CSG tree instead of geometry
//!
//! Every call becomes a node in an arena. The tree can be printed in the
//! OpenSCAD `.csg` style or serialized to JSON, which makes it the reference
//! backend for the CLI and for tests.

use super::backend::{
    BackendError, Color, GeometryBackend, GeometryHandle, LinearExtrude, Resolution,
    RotateExtrude, TextParams,
};
use super::{BooleanOp, TransformOp};
use serde::Serialize;
use std::fmt::Write;

/// Operation recorded for one node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CsgOp {
    Cube { size: [f64; 3], center: bool },
    Sphere { r: f64, resolution: Resolution, fragments: u32 },
    Cylinder { h: f64, r1: f64, r2: f64, center: bool, resolution: Resolution, fragments: u32 },
    Square { size: [f64; 2], center: bool },
    Circle { r: f64, resolution: Resolution, fragments: u32 },
    Polygon { points: Vec<[f64; 2]>, paths: Option<Vec<Vec<usize>>> },
    Polyhedron { points: Vec<[f64; 3]>, faces: Vec<Vec<usize>> },
    Text(TextParams),
    Transform { matrix: [[f64; 4]; 4], source: &'static str },
    Union,
    Difference,
    Intersection,
    LinearExtrude(LinearExtrude),
    RotateExtrude(RotateExtrude),
    Color { color: Color },
}

#[derive(Debug, Clone, Serialize)]
pub struct CsgNode {
    pub id: u64,
    #[serde(flatten)]
    pub op: CsgOp,
    pub children: Vec<u64>,
}

/// Arena of recorded operations
#[derive(Debug, Default, Clone)]
pub struct CsgTree {
    nodes: Vec<CsgNode>,
}

impl CsgTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, handle: GeometryHandle) -> Option<&CsgNode> {
        self.nodes.get(handle.id() as usize)
    }

    pub fn nodes(&self) -> &[CsgNode] {
        &self.nodes
    }

    fn push(&mut self, op: CsgOp, children: &[GeometryHandle]) -> Result<GeometryHandle, BackendError> {
        for child in children {
            if child.id() as usize >= self.nodes.len() {
                return Err(BackendError::UnknownHandle(child.id()));
            }
        }
        let id = self.nodes.len() as u64;
        self.nodes.push(CsgNode {
            id,
            op,
            children: children.iter().map(GeometryHandle::id).collect(),
        });
        Ok(GeometryHandle(id))
    }

    /// Render the subtree below `root` in OpenSCAD's CSG notation
    pub fn render(&self, root: GeometryHandle) -> String {
        let mut out = String::new();
        self.render_node(root.id(), 0, &mut out);
        out
    }

    fn render_node(&self, id: u64, depth: usize, out: &mut String) {
        let indent = "\t".repeat(depth);
        let Some(node) = self.nodes.get(id as usize) else {
            let _ = writeln!(out, "{}/* missing node #{} */", indent, id);
            return;
        };

        let head = describe(&node.op);
        if node.children.is_empty() {
            let _ = writeln!(out, "{}{};", indent, head);
            return;
        }

        let _ = writeln!(out, "{}{} {{", indent, head);
        for child in &node.children {
            self.render_node(*child, depth + 1, out);
        }
        let _ = writeln!(out, "{}}}", indent);
    }

    /// Nested JSON view of the subtree below `root`
    pub fn to_json(&self, root: GeometryHandle) -> serde_json::Value {
        self.json_node(root.id())
    }

    fn json_node(&self, id: u64) -> serde_json::Value {
        let Some(node) = self.nodes.get(id as usize) else {
            return serde_json::Value::Null;
        };
        let mut value = serde_json::to_value(&node.op).unwrap_or(serde_json::Value::Null);
        if let serde_json::Value::Object(map) = &mut value {
            let children: Vec<_> = node.children.iter().map(|c| self.json_node(*c)).collect();
            if !children.is_empty() {
                map.insert("children".to_string(), serde_json::Value::Array(children));
            }
        }
        value
    }
}

fn num(n: f64) -> String {
    crate::eval::format_number(n)
}

fn list(values: &[f64]) -> String {
    let items: Vec<_> = values.iter().map(|v| num(*v)).collect();
    format!("[{}]", items.join(", "))
}

fn describe(op: &CsgOp) -> String {
    match op {
        CsgOp::Cube { size, center } => format!("cube(size = {}, center = {})", list(size), center),
        CsgOp::Sphere { r, resolution, .. } => format!("sphere({}, r = {})", res(resolution), num(*r)),
        CsgOp::Cylinder { h, r1, r2, center, resolution, .. } => format!(
            "cylinder({}, h = {}, r1 = {}, r2 = {}, center = {})",
            res(resolution),
            num(*h),
            num(*r1),
            num(*r2),
            center
        ),
        CsgOp::Square { size, center } => format!("square(size = {}, center = {})", list(size), center),
        CsgOp::Circle { r, resolution, .. } => format!("circle({}, r = {})", res(resolution), num(*r)),
        CsgOp::Polygon { points, .. } => format!("polygon(points = [{} points])", points.len()),
        CsgOp::Polyhedron { points, faces } => format!(
            "polyhedron(points = [{} points], faces = [{} faces])",
            points.len(),
            faces.len()
        ),
        CsgOp::Text(params) => format!("text(text = \"{}\", size = {})", params.text, num(params.size)),
        CsgOp::Transform { matrix, .. } => {
            let rows: Vec<_> = matrix.iter().map(|row| list(row)).collect();
            format!("multmatrix([{}])", rows.join(", "))
        }
        CsgOp::Union => "union()".to_string(),
        CsgOp::Difference => "difference()".to_string(),
        CsgOp::Intersection => "intersection()".to_string(),
        CsgOp::LinearExtrude(p) => format!(
            "linear_extrude(height = {}, center = {}, twist = {}, scale = {})",
            num(p.height),
            p.center,
            num(p.twist),
            list(&p.scale)
        ),
        CsgOp::RotateExtrude(p) => format!("rotate_extrude(angle = {})", num(p.angle)),
        CsgOp::Color { color: Color::Named { name, alpha } } => {
            format!("color(\"{}\", alpha = {})", name, num(*alpha))
        }
        CsgOp::Color { color: Color::Rgba(rgba) } => format!("color({})", list(rgba)),
    }
}

fn res(r: &Resolution) -> String {
    format!("$fn = {}, $fa = {}, $fs = {}", num(r.fn_), num(r.fa), num(r.fs))
}

impl GeometryBackend for CsgTree {
    fn cube(&mut self, size: [f64; 3], center: bool) -> Result<GeometryHandle, BackendError> {
        self.push(CsgOp::Cube { size, center }, &[])
    }

    fn sphere(&mut self, radius: f64, resolution: Resolution) -> Result<GeometryHandle, BackendError> {
        let fragments = resolution.fragments(radius);
        self.push(CsgOp::Sphere { r: radius, resolution, fragments }, &[])
    }

    fn cylinder(
        &mut self,
        height: f64,
        r1: f64,
        r2: f64,
        center: bool,
        resolution: Resolution,
    ) -> Result<GeometryHandle, BackendError> {
        let fragments = resolution.fragments(r1.max(r2));
        self.push(
            CsgOp::Cylinder { h: height, r1, r2, center, resolution, fragments },
            &[],
        )
    }

    fn square(&mut self, size: [f64; 2], center: bool) -> Result<GeometryHandle, BackendError> {
        self.push(CsgOp::Square { size, center }, &[])
    }

    fn circle(&mut self, radius: f64, resolution: Resolution) -> Result<GeometryHandle, BackendError> {
        let fragments = resolution.fragments(radius);
        self.push(CsgOp::Circle { r: radius, resolution, fragments }, &[])
    }

    fn polygon(
        &mut self,
        points: &[[f64; 2]],
        paths: Option<&[Vec<usize>]>,
    ) -> Result<GeometryHandle, BackendError> {
        if points.len() < 3 {
            return Err(BackendError::InvalidArguments {
                operation: "polygon".to_string(),
                message: format!("need at least 3 points, got {}", points.len()),
            });
        }
        self.push(
            CsgOp::Polygon {
                points: points.to_vec(),
                paths: paths.map(|p| p.to_vec()),
            },
            &[],
        )
    }

    fn polyhedron(
        &mut self,
        points: &[[f64; 3]],
        faces: &[Vec<usize>],
    ) -> Result<GeometryHandle, BackendError> {
        if let Some(bad) = faces.iter().flatten().find(|i| **i >= points.len()) {
            return Err(BackendError::InvalidArguments {
                operation: "polyhedron".to_string(),
                message: format!("face index {} out of range", bad),
            });
        }
        self.push(
            CsgOp::Polyhedron {
                points: points.to_vec(),
                faces: faces.to_vec(),
            },
            &[],
        )
    }

    fn text(&mut self, params: &TextParams) -> Result<GeometryHandle, BackendError> {
        self.push(CsgOp::Text(params.clone()), &[])
    }

    fn transform(
        &mut self,
        op: &TransformOp,
        children: &[GeometryHandle],
    ) -> Result<GeometryHandle, BackendError> {
        let m = op.to_matrix();
        let mut matrix = [[0.0; 4]; 4];
        for (r, row) in matrix.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = m[(r, c)];
            }
        }
        self.push(CsgOp::Transform { matrix, source: op.name() }, children)
    }

    fn boolean(
        &mut self,
        op: BooleanOp,
        children: &[GeometryHandle],
    ) -> Result<GeometryHandle, BackendError> {
        let op = match op {
            BooleanOp::Union => CsgOp::Union,
            BooleanOp::Difference => CsgOp::Difference,
            BooleanOp::Intersection => CsgOp::Intersection,
        };
        self.push(op, children)
    }

    fn linear_extrude(
        &mut self,
        params: &LinearExtrude,
        children: &[GeometryHandle],
    ) -> Result<GeometryHandle, BackendError> {
        self.push(CsgOp::LinearExtrude(params.clone()), children)
    }

    fn rotate_extrude(
        &mut self,
        params: &RotateExtrude,
        children: &[GeometryHandle],
    ) -> Result<GeometryHandle, BackendError> {
        self.push(CsgOp::RotateExtrude(params.clone()), children)
    }

    fn color(
        &mut self,
        color: &Color,
        children: &[GeometryHandle],
    ) -> Result<GeometryHandle, BackendError> {
        self.push(CsgOp::Color { color: color.clone() }, children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_records_nodes() {
        let mut tree = CsgTree::new();
        let cube = tree.cube([10.0, 10.0, 10.0], false).unwrap();
        let sphere = tree.sphere(8.0, Resolution::default()).unwrap();
        let diff = tree.boolean(BooleanOp::Difference, &[cube, sphere]).unwrap();

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.node(diff).unwrap().children, vec![0, 1]);
    }

    #[test]
    fn test_render_dump() {
        let mut tree = CsgTree::new();
        let cube = tree.cube([1.0, 2.0, 3.0], true).unwrap();
        let moved = tree
            .transform(&TransformOp::Translate(Vector3::new(5.0, 0.0, 0.0)), &[cube])
            .unwrap();

        let dump = tree.render(moved);
        assert!(dump.starts_with("multmatrix([[1, 0, 0, 5], [0, 1, 0, 0], [0, 0, 1, 0], [0, 0, 0, 1]]) {"));
        assert!(dump.contains("\tcube(size = [1, 2, 3], center = true);"));
    }

    #[test]
    fn test_unknown_child_handle() {
        let mut tree = CsgTree::new();
        let result = tree.boolean(BooleanOp::Union, &[GeometryHandle(42)]);
        assert_eq!(result, Err(BackendError::UnknownHandle(42)));
    }

    #[test]
    fn test_json_nesting() {
        let mut tree = CsgTree::new();
        let circle = tree.circle(2.0, Resolution::new(6.0, 12.0, 2.0)).unwrap();
        let json = tree.to_json(circle);
        assert_eq!(json["op"], "circle");
        assert_eq!(json["fragments"], 6);
    }
}
