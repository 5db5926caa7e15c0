// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Builtin functions: math, vectors, strings and type tests

use super::Builtin;
use crate::error::{EvalResult, WarningKind};
use crate::eval::native::{BoundArguments, NativeCall};
use crate::eval::value::Value;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub(super) fn table() -> Vec<Builtin> {
    vec![
        Builtin::function("abs", &["x"], |_, a| Ok(map_number(a, f64::abs))),
        Builtin::function("sign", &["x"], |_, a| Ok(map_number(a, sign))),
        Builtin::function("sin", &["x"], |_, a| Ok(map_number(a, sin_degrees))),
        Builtin::function("cos", &["x"], |_, a| Ok(map_number(a, cos_degrees))),
        Builtin::function("tan", &["x"], |_, a| Ok(map_number(a, tan_degrees))),
        Builtin::function("asin", &["x"], |_, a| Ok(map_number(a, |x| x.asin().to_degrees()))),
        Builtin::function("acos", &["x"], |_, a| Ok(map_number(a, |x| x.acos().to_degrees()))),
        Builtin::function("atan", &["x"], |_, a| Ok(map_number(a, |x| x.atan().to_degrees()))),
        Builtin::function("atan2", &["y", "x"], |_, a| {
            Ok(match (a.number("y"), a.number("x")) {
                (Some(y), Some(x)) => Value::Number(y.atan2(x).to_degrees()),
                _ => Value::Undef,
            })
        }),
        Builtin::function("floor", &["x"], |_, a| Ok(map_number(a, f64::floor))),
        Builtin::function("ceil", &["x"], |_, a| Ok(map_number(a, f64::ceil))),
        Builtin::function("round", &["x"], |_, a| Ok(map_number(a, f64::round))),
        Builtin::function("ln", &["x"], |_, a| Ok(map_number(a, f64::ln))),
        Builtin::function("log", &["a", "b"], log),
        Builtin::function("exp", &["x"], |_, a| Ok(map_number(a, f64::exp))),
        Builtin::function("sqrt", &["x"], |_, a| Ok(map_number(a, f64::sqrt))),
        Builtin::function("pow", &["base", "exponent"], |_, a| {
            Ok(match (a.number("base"), a.number("exponent")) {
                (Some(b), Some(e)) => Value::Number(b.powf(e)),
                _ => Value::Undef,
            })
        }),
        Builtin::variadic("min", |call, _| Ok(extremum(call, f64::min))),
        Builtin::variadic("max", |call, _| Ok(extremum(call, f64::max))),
        Builtin::function("norm", &["v"], |_, a| {
            Ok(a.get("v")
                .as_numbers()
                .map_or(Value::Undef, |v| Value::Number(v.iter().map(|x| x * x).sum::<f64>().sqrt())))
        }),
        Builtin::function("cross", &["a", "b"], cross),
        Builtin::function("len", &["v"], |_, a| {
            Ok(match a.get("v") {
                Value::Vector(items) => Value::Number(items.len() as f64),
                Value::Str(s) => Value::Number(s.chars().count() as f64),
                _ => Value::Undef,
            })
        }),
        Builtin::variadic("concat", concat),
        Builtin::variadic("str", |call, _| {
            let text: String = call.args().iter().map(|(_, v)| v.to_string()).collect();
            Ok(Value::Str(text))
        }),
        Builtin::variadic("chr", chr),
        Builtin::function("ord", &["s"], ord),
        Builtin::function("lookup", &["key", "table"], lookup),
        Builtin::function("rands", &["min_value", "max_value", "value_count", "seed_value"], rands),
        Builtin::function("is_undef", &["x"], |_, a| Ok(Value::Bool(a.get("x").is_undef()))),
        Builtin::function("is_bool", &["x"], |_, a| Ok(Value::Bool(matches!(a.get("x"), Value::Bool(_))))),
        Builtin::function("is_num", &["x"], |_, a| {
            Ok(Value::Bool(matches!(a.get("x"), Value::Number(n) if !n.is_nan())))
        }),
        Builtin::function("is_string", &["x"], |_, a| Ok(Value::Bool(matches!(a.get("x"), Value::Str(_))))),
        Builtin::function("is_list", &["x"], |_, a| Ok(Value::Bool(matches!(a.get("x"), Value::Vector(_))))),
        Builtin::function("is_function", &["x"], |_, a| {
            Ok(Value::Bool(matches!(a.get("x"), Value::Function(_))))
        }),
        Builtin::function("version", &[], |_, _| {
            Ok(Value::Vector(VERSION.iter().map(|n| Value::Number(*n)).collect()))
        }),
        Builtin::function("version_num", &[], |_, _| {
            Ok(Value::Number(VERSION[0] * 10000.0 + VERSION[1] * 100.0 + VERSION[2]))
        }),
    ]
}

/// Language version reported by `version()`
const VERSION: [f64; 3] = [2021.0, 1.0, 0.0];

fn map_number(args: &BoundArguments, f: impl Fn(f64) -> f64) -> Value {
    args.number("x").map_or(Value::Undef, |x| Value::Number(f(x)))
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

// Multiples of 90 degrees are exact
fn sin_degrees(x: f64) -> f64 {
    if x.is_finite() && x % 90.0 == 0.0 {
        let quadrant = (x / 90.0).rem_euclid(4.0) as i32;
        return [0.0, 1.0, 0.0, -1.0][quadrant as usize];
    }
    x.to_radians().sin()
}

fn cos_degrees(x: f64) -> f64 {
    sin_degrees(x + 90.0)
}

fn tan_degrees(x: f64) -> f64 {
    if x.is_finite() && x % 180.0 == 0.0 {
        return 0.0;
    }
    x.to_radians().tan()
}

/// `log(x)` is base 10, `log(b, x)` base `b`
fn log(_: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    Ok(match (args.number("a"), args.number("b")) {
        (Some(base), Some(x)) => Value::Number(x.ln() / base.ln()),
        (Some(x), None) if !args.is_set("b") => Value::Number(x.log10()),
        _ => Value::Undef,
    })
}

/// `min`/`max` over the arguments, or over a single vector argument
fn extremum(call: &mut NativeCall<'_, '_>, pick: fn(f64, f64) -> f64) -> Value {
    let args = call.args();
    let numbers: Option<Vec<f64>> = match (args.len(), args.get(0)) {
        (1, Some(Value::Vector(items))) => items.iter().map(Value::as_number).collect(),
        _ => args.iter().map(|(_, v)| v.as_number()).collect(),
    };
    match numbers {
        Some(numbers) if !numbers.is_empty() => {
            Value::Number(numbers.into_iter().fold(f64::NAN, |acc, n| if acc.is_nan() { n } else { pick(acc, n) }))
        }
        _ => Value::Undef,
    }
}

fn cross(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let (Some(a), Some(b)) = (args.get("a").as_numbers(), args.get("b").as_numbers()) else {
        call.warn(WarningKind::TypeMismatch, "cross() requires two numeric vectors");
        return Ok(Value::Undef);
    };
    Ok(match (a.as_slice(), b.as_slice()) {
        ([ax, ay], [bx, by]) => Value::Number(ax * by - ay * bx),
        ([ax, ay, az], [bx, by, bz]) => Value::Vector(vec![
            Value::Number(ay * bz - az * by),
            Value::Number(az * bx - ax * bz),
            Value::Number(ax * by - ay * bx),
        ]),
        _ => {
            call.warn(WarningKind::TypeMismatch, "cross() requires vectors of length 2 or 3");
            Value::Undef
        }
    })
}

fn concat(call: &mut NativeCall<'_, '_>, _: &BoundArguments) -> EvalResult<Value> {
    let mut out = Vec::new();
    for (_, value) in call.args().iter() {
        match value {
            Value::Vector(items) => out.extend(items.iter().cloned()),
            other => out.push(other.clone()),
        }
    }
    Ok(Value::Vector(out))
}

fn chr(call: &mut NativeCall<'_, '_>, _: &BoundArguments) -> EvalResult<Value> {
    let mut codes = Vec::new();
    for (_, value) in call.args().iter() {
        match value {
            Value::Number(n) => codes.push(*n),
            Value::Vector(items) => codes.extend(items.iter().filter_map(Value::as_number)),
            Value::Range(r) => codes.extend(r.iter()),
            _ => {}
        }
    }
    let text: Option<String> = codes
        .into_iter()
        .map(|code| if code >= 1.0 { char::from_u32(code as u32) } else { None })
        .collect();
    match text {
        Some(text) => Ok(Value::Str(text)),
        None => {
            call.warn(WarningKind::TypeMismatch, "chr() got an invalid code point");
            Ok(Value::Undef)
        }
    }
}

fn ord(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let Some(s) = args.get("s").as_str() else {
        return Ok(Value::Undef);
    };
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Number(c as u32 as f64)),
        _ => {
            call.warn(WarningKind::TypeMismatch, "ord() requires a single character");
            Ok(Value::Undef)
        }
    }
}

/// Linear interpolation in a table of `[key, value]` pairs
fn lookup(_: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let Some(key) = args.number("key") else {
        return Ok(Value::Undef);
    };
    let Some(rows) = args.get("table").as_vector() else {
        return Ok(Value::Undef);
    };
    let mut table: Vec<(f64, f64)> = rows
        .iter()
        .filter_map(|row| match row.as_numbers()?.as_slice() {
            [k, v, ..] => Some((*k, *v)),
            _ => None,
        })
        .collect();
    if table.is_empty() {
        return Ok(Value::Undef);
    }
    table.sort_by(|a, b| a.0.total_cmp(&b.0));

    let (first, last) = (table[0], table[table.len() - 1]);
    if key <= first.0 {
        return Ok(Value::Number(first.1));
    }
    if key >= last.0 {
        return Ok(Value::Number(last.1));
    }
    for pair in table.windows(2) {
        let ((k0, v0), (k1, v1)) = (pair[0], pair[1]);
        if key >= k0 && key <= k1 {
            let t = (key - k0) / (k1 - k0);
            return Ok(Value::Number(v0 + (v1 - v0) * t));
        }
    }
    Ok(Value::Undef)
}

fn rands(call: &mut NativeCall<'_, '_>, args: &BoundArguments) -> EvalResult<Value> {
    let (Some(min), Some(max), Some(count)) = (
        args.number("min_value"),
        args.number("max_value"),
        args.number("value_count"),
    ) else {
        call.warn(WarningKind::TypeMismatch, "rands() requires numeric min, max and count");
        return Ok(Value::Undef);
    };

    let mut rng = match args.number("seed_value") {
        Some(seed) => StdRng::seed_from_u64(seed.to_bits()),
        None => StdRng::from_entropy(),
    };
    let count = count.max(0.0) as usize;
    let values = (0..count)
        .map(|_| Value::Number(min + (max - min) * rng.gen::<f64>()))
        .collect();
    Ok(Value::Vector(values))
}
