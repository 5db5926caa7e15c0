// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Builtin modules: primitives, transforms, booleans, extrusions

use super::Builtin;
use crate::error::{EvalResult, WarningKind};
use crate::eval::native::{BoundArguments, NativeCall};
use crate::eval::value::Value;
use crate::geometry::{
    BackendError, BooleanOp, Color, GeometryBackend, GeometryHandle, LinearExtrude, RotateExtrude,
    TextParams, TransformOp,
};
use nalgebra::{Matrix4, Vector3};

pub(super) fn table() -> Vec<Builtin> {
    vec![
        Builtin::primitive("cube", &["size", "center"], cube),
        Builtin::primitive("sphere", &["r", "d"], sphere),
        Builtin::primitive("cylinder", &["h", "r1", "r2", "center", "r", "d", "d1", "d2"], cylinder),
        Builtin::primitive("square", &["size", "center"], square),
        Builtin::primitive("circle", &["r", "d"], circle),
        Builtin::primitive("polygon", &["points", "paths", "convexity"], polygon),
        Builtin::primitive("polyhedron", &["points", "faces", "convexity", "triangles"], polyhedron),
        Builtin::primitive(
            "text",
            &["text", "size", "font", "halign", "valign", "spacing", "direction", "language", "script"],
            text,
        ),
        Builtin::operator("translate", &["v"], |call, a| {
            let v = vector3(a.get("v"), 0.0).unwrap_or_else(Vector3::zeros);
            transform(call, TransformOp::Translate(v))
        }),
        Builtin::operator("rotate", &["a", "v"], rotate),
        Builtin::operator("scale", &["v"], |call, a| {
            let v = match a.get("v") {
                Value::Number(s) => Vector3::repeat(*s),
                other => vector3(other, 1.0).unwrap_or_else(|| Vector3::repeat(1.0)),
            };
            transform(call, TransformOp::Scale(v))
        }),
        Builtin::operator("mirror", &["v"], |call, a| {
            let v = vector3(a.get("v"), 0.0).unwrap_or_else(Vector3::x);
            transform(call, TransformOp::Mirror(v))
        }),
        Builtin::operator("multmatrix", &["m"], multmatrix),
        Builtin::operator("color", &["c", "alpha"], color),
        Builtin::operator("render", &["convexity"], |call, _| {
            group(call, |backend, children| backend.boolean(BooleanOp::Union, children))
        }),
        Builtin::operator("union", &[], |call, _| {
            group(call, |backend, children| backend.boolean(BooleanOp::Union, children))
        }),
        Builtin::operator("difference", &[], |call, _| {
            group(call, |backend, children| backend.boolean(BooleanOp::Difference, children))
        }),
        Builtin::operator("intersection", &[], |call, _| {
            group(call, |backend, children| backend.boolean(BooleanOp::Intersection, children))
        }),
        Builtin::operator(
            "linear_extrude",
            &["height", "center", "convexity", "twist", "slices", "scale"],
            linear_extrude,
        ),
        Builtin::operator("rotate_extrude", &["angle", "convexity"], rotate_extrude),
        Builtin::primitive("children", &["index"], children),
    ]
}

/// Instantiate the child block and hand the handles to `op`
///
/// An empty child block produces nothing and never reaches the backend.
fn group<F>(call: &mut NativeCall<'_, '_>, op: F) -> EvalResult<Value>
where
    F: FnOnce(&mut dyn GeometryBackend, &[GeometryHandle]) -> Result<GeometryHandle, BackendError>,
{
    let children = call.instantiate_children()?;
    if children.is_empty() {
        return Ok(Value::Undef);
    }
    Ok(Value::Geometry(op(call.backend(), &children)?))
}

fn transform(call: &mut NativeCall<'_, '_>, op: TransformOp) -> EvalResult<Value> {
    group(call, |backend, children| backend.transform(&op, children))
}

/// `[x, y, z]` with missing components set to `fill`
fn vector3(value: &Value, fill: f64) -> Option<Vector3<f64>> {
    let numbers = value.as_numbers()?;
    let component = |i: usize| numbers.get(i).copied().unwrap_or(fill);
    Some(Vector3::new(component(0), component(1), component(2)))
}

/// Radius from an `r`/`d` pair, warning when both are given
fn radius(call: &mut NativeCall<'_, '_>, args: &BoundArguments, r: &str, d: &str) -> Option<f64> {
    match (args.number(r), args.number(d)) {
        (Some(_), Some(diameter)) => {
            call.warn(
                WarningKind::AmbiguousParameters,
                format!("{}: both {} and {} given, using {}", call.name(), r, d, d),
            );
            Some(diameter / 2.0)
        }
        (Some(radius), None) => Some(radius),
        (None, Some(diameter)) => Some(diameter / 2.0),
        (None, None) => None,
    }
}

fn center(args: &BoundArguments) -> bool {
    args.bool_or("center", false)
}

fn cube(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let size = match args.get("size") {
        Value::Undef => [1.0; 3],
        Value::Number(s) => [*s; 3],
        other => match other.as_numbers().as_deref() {
            Some([x, y, z]) => [*x, *y, *z],
            _ => {
                call.warn(WarningKind::TypeMismatch, "cube: size must be a number or a 3-vector");
                [1.0; 3]
            }
        },
    };
    let center = center(args);
    Ok(Value::Geometry(call.backend().cube(size, center)?))
}

fn sphere(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let r = radius(call, args, "r", "d").unwrap_or(1.0);
    let resolution = call.resolution()?;
    Ok(Value::Geometry(call.backend().sphere(r, resolution)?))
}

fn cylinder(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let h = args.number_or("h", 1.0);
    let base = radius(call, args, "r", "d");
    let r1 = radius(call, args, "r1", "d1");
    let r2 = radius(call, args, "r2", "d2");
    if base.is_some() && (r1.is_some() || r2.is_some()) {
        call.warn(
            WarningKind::AmbiguousParameters,
            "cylinder: r/d combined with r1/r2/d1/d2, using the specific radii",
        );
    }
    let r1 = r1.or(base).unwrap_or(1.0);
    let r2 = r2.or(base).unwrap_or(1.0);
    let center = center(args);
    let resolution = call.resolution()?;
    Ok(Value::Geometry(call.backend().cylinder(h, r1, r2, center, resolution)?))
}

fn square(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let size = match args.get("size") {
        Value::Undef => [1.0; 2],
        Value::Number(s) => [*s; 2],
        other => match other.as_numbers().as_deref() {
            Some([x, y]) => [*x, *y],
            _ => {
                call.warn(WarningKind::TypeMismatch, "square: size must be a number or a 2-vector");
                [1.0; 2]
            }
        },
    };
    let center = center(args);
    Ok(Value::Geometry(call.backend().square(size, center)?))
}

fn circle(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let r = radius(call, args, "r", "d").unwrap_or(1.0);
    let resolution = call.resolution()?;
    Ok(Value::Geometry(call.backend().circle(r, resolution)?))
}

fn points<const N: usize>(value: &Value) -> Option<Vec<[f64; N]>> {
    value
        .as_vector()?
        .iter()
        .map(|p| p.as_numbers()?.try_into().ok())
        .collect()
}

fn index_lists(value: &Value) -> Option<Vec<Vec<usize>>> {
    value
        .as_vector()?
        .iter()
        .map(|list| {
            list.as_numbers()?
                .into_iter()
                .map(|i| (i >= 0.0).then_some(i as usize))
                .collect()
        })
        .collect()
}

fn polygon(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let Some(points) = points::<2>(args.get("points")) else {
        call.warn(WarningKind::TypeMismatch, "polygon: points must be a list of 2D points");
        return Ok(Value::Undef);
    };
    let paths = index_lists(args.get("paths"));
    Ok(Value::Geometry(call.backend().polygon(&points, paths.as_deref())?))
}

fn polyhedron(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let Some(points) = points::<3>(args.get("points")) else {
        call.warn(WarningKind::TypeMismatch, "polyhedron: points must be a list of 3D points");
        return Ok(Value::Undef);
    };
    let faces = if args.is_set("faces") {
        index_lists(args.get("faces"))
    } else if args.is_set("triangles") {
        call.warn(WarningKind::Deprecated, "polyhedron: 'triangles' is deprecated, use 'faces'");
        index_lists(args.get("triangles"))
    } else {
        None
    };
    let Some(faces) = faces else {
        call.warn(WarningKind::TypeMismatch, "polyhedron: faces must be lists of point indices");
        return Ok(Value::Undef);
    };
    Ok(Value::Geometry(call.backend().polyhedron(&points, &faces)?))
}

fn text(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let string_or = |name: &str, default: &str| args.get(name).as_str().unwrap_or(default).to_string();
    let params = TextParams {
        text: args.get("text").to_string(),
        size: args.number_or("size", 10.0),
        font: args.get("font").as_str().map(str::to_string),
        halign: string_or("halign", "left"),
        valign: string_or("valign", "baseline"),
        spacing: args.number_or("spacing", 1.0),
        direction: string_or("direction", "ltr"),
        language: string_or("language", "en"),
        script: string_or("script", "latin"),
        resolution: call.resolution()?,
    };
    Ok(Value::Geometry(call.backend().text(&params)?))
}

fn rotate(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let op = match (args.get("a"), args.get("v")) {
        (Value::Number(angle), Value::Undef) => TransformOp::Rotate(Vector3::new(0.0, 0.0, *angle)),
        (Value::Number(angle), axis) => match vector3(axis, 0.0) {
            Some(axis) => TransformOp::RotateAxis { angle: *angle, axis },
            None => TransformOp::Rotate(Vector3::new(0.0, 0.0, *angle)),
        },
        (angles, _) => TransformOp::Rotate(vector3(angles, 0.0).unwrap_or_else(Vector3::zeros)),
    };
    transform(call, op)
}

fn multmatrix(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let mut matrix = Matrix4::identity();
    match args.get("m").as_vector() {
        Some(rows) => {
            for (i, row) in rows.iter().take(4).enumerate() {
                let Some(row) = row.as_numbers() else { continue };
                for (j, value) in row.into_iter().take(4).enumerate() {
                    matrix[(i, j)] = value;
                }
            }
        }
        None => call.warn(WarningKind::TypeMismatch, "multmatrix: m must be a matrix"),
    }
    transform(call, TransformOp::Multmatrix(matrix))
}

fn color(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let alpha = args.number("alpha");
    let color = match args.get("c") {
        Value::Str(name) => Color::Named {
            name: name.clone(),
            alpha: alpha.unwrap_or(1.0),
        },
        other => match other.as_numbers().as_deref() {
            Some([r, g, b]) => Color::Rgba([*r, *g, *b, alpha.unwrap_or(1.0)]),
            Some([r, g, b, a]) => Color::Rgba([*r, *g, *b, alpha.unwrap_or(*a)]),
            _ => {
                call.warn(WarningKind::TypeMismatch, "color: expected a name or an RGB(A) vector");
                return group(call, |backend, children| backend.boolean(BooleanOp::Union, children));
            }
        },
    };
    group(call, |backend, children| backend.color(&color, children))
}

fn linear_extrude(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let scale = match args.get("scale") {
        Value::Number(s) => [*s, *s],
        other => match other.as_numbers().as_deref() {
            Some([x, y]) => [*x, *y],
            _ => [1.0, 1.0],
        },
    };
    let params = LinearExtrude {
        height: args.number_or("height", 100.0),
        center: center(args),
        convexity: args.number_or("convexity", 1.0).max(1.0) as u32,
        twist: args.number_or("twist", 0.0),
        slices: args.number("slices").map(|s| s.max(1.0) as u32),
        scale,
        resolution: call.resolution()?,
    };
    group(call, |backend, children| backend.linear_extrude(&params, children))
}

fn rotate_extrude(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let params = RotateExtrude {
        angle: args.number_or("angle", 360.0),
        convexity: args.number_or("convexity", 1.0).max(1.0) as u32,
        resolution: call.resolution()?,
    };
    group(call, |backend, children| backend.rotate_extrude(&params, children))
}

/// `children()`, `children(i)`, `children([i, j])` and `children([a:b])`
fn children(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let Some(frame) = call.frame() else {
        return Ok(Value::Undef);
    };

    let selection: Option<Vec<usize>> = match args.get("index") {
        Value::Undef => None,
        Value::Number(i) => Some(vec![as_index(*i)]),
        Value::Vector(items) => Some(items.iter().filter_map(Value::as_number).map(as_index).collect()),
        Value::Range(range) => Some(range.iter().map(as_index).collect()),
        other => {
            call.warn(
                WarningKind::TypeMismatch,
                format!("children: index must be a number, vector or range, got {}", other.type_name()),
            );
            return Ok(Value::Undef);
        }
    };

    let handles = call.instantiate_frame(&frame, selection.as_deref())?;
    Ok(Value::Vector(handles.into_iter().map(Value::Geometry).collect()))
}

/// Negative indices map past the end so they report as out of range
fn as_index(i: f64) -> usize {
    if i < 0.0 {
        usize::MAX
    } else {
        i as usize
    }
}
