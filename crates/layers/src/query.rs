//! Feature-level evaluation of [`Expression`]s.
//!
//! Semantics follow the engine: absent attributes are `null`, ordering
//! comparisons involving `null` or mixed types are false, and `coalesce`
//! yields its first non-null argument. A feature is drawn iff its layer
//! filter evaluates to `true`.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::expression::{Comparison, Curve, Expression};

pub type FeatureProperties = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    Null,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Evaluated {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map_or(Evaluated::Null, Evaluated::Number),
            Value::String(s) => Evaluated::Text(s.clone()),
            Value::Bool(b) => Evaluated::Bool(*b),
            _ => Evaluated::Null,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Evaluated::Number(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct EvalContext<'a> {
    pub properties: &'a FeatureProperties,
    pub zoom: f64,
}

pub fn evaluate(expr: &Expression, ctx: EvalContext<'_>) -> Evaluated {
    match expr {
        Expression::Number(n) => Evaluated::Number(*n),
        Expression::Text(s) => Evaluated::Text(s.clone()),
        Expression::Get(field) => ctx
            .properties
            .get(field)
            .map_or(Evaluated::Null, Evaluated::from_json),
        Expression::Zoom => Evaluated::Number(ctx.zoom),
        Expression::Coalesce(args) => args
            .iter()
            .map(|a| evaluate(a, ctx))
            .find(|v| *v != Evaluated::Null)
            .unwrap_or(Evaluated::Null),
        Expression::Compare { op, lhs, rhs } => {
            let (l, r) = (evaluate(lhs, ctx), evaluate(rhs, ctx));
            Evaluated::Bool(compare(*op, &l, &r))
        }
        Expression::All(args) => Evaluated::Bool(
            args.iter()
                .all(|a| evaluate(a, ctx) == Evaluated::Bool(true)),
        ),
        Expression::Interpolate {
            curve,
            input,
            stops,
        } => match evaluate(input, ctx).as_number() {
            Some(x) => interpolate(*curve, x, stops, ctx),
            None => Evaluated::Null,
        },
    }
}

fn compare(op: Comparison, l: &Evaluated, r: &Evaluated) -> bool {
    match op {
        Comparison::Eq => l == r,
        Comparison::Gt => match (l, r) {
            (Evaluated::Number(a), Evaluated::Number(b)) => a > b,
            (Evaluated::Text(a), Evaluated::Text(b)) => a > b,
            _ => false,
        },
    }
}

fn interpolate(
    curve: Curve,
    x: f64,
    stops: &[(f64, Expression)],
    ctx: EvalContext<'_>,
) -> Evaluated {
    let Some(((first_at, first), (last_at, last))) = stops.first().zip(stops.last()) else {
        return Evaluated::Null;
    };
    if x <= *first_at {
        return evaluate(first, ctx);
    }
    if x >= *last_at {
        return evaluate(last, ctx);
    }
    let Some(hi) = stops.iter().position(|(at, _)| *at > x) else {
        return evaluate(last, ctx);
    };
    let (lo_at, lo) = &stops[hi - 1];
    let (hi_at, hi) = &stops[hi];
    let (a, b) = (evaluate(lo, ctx), evaluate(hi, ctx));
    match (a.as_number(), b.as_number()) {
        (Some(a), Some(b)) => {
            let t = match curve {
                Curve::Linear => (x - lo_at) / (hi_at - lo_at),
                Curve::Exponential(base) if (base - 1.0).abs() > f64::EPSILON => {
                    (base.powf(x - lo_at) - 1.0) / (base.powf(hi_at - lo_at) - 1.0)
                }
                Curve::Exponential(_) => (x - lo_at) / (hi_at - lo_at),
            };
            Evaluated::Number(a + (b - a) * t)
        }
        // Colors and other non-numeric outputs take the lower stop.
        _ => a,
    }
}

/// Whether a feature with `properties` passes `filter`.
pub fn matches(filter: &Expression, properties: &FeatureProperties) -> bool {
    let ctx = EvalContext {
        properties,
        zoom: 0.0,
    };
    evaluate(filter, ctx) == Evaluated::Bool(true)
}
