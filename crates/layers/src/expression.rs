//! Style expressions in the array form the map engine evaluates per feature.
//!
//! Only the operators the viewer emits are modelled. `to_json` produces the
//! wire form (`[">", ["get", "pm25"], 0.01]`), which is also what `Serialize`
//! writes.

use serde::{Serialize, Serializer};
use serde_json::{Value, json};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
}

impl Comparison {
    fn op(self) -> &'static str {
        match self {
            Comparison::Eq => "==",
            Comparison::Gt => ">",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Curve {
    Linear,
    Exponential(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(f64),
    Text(String),
    /// Feature attribute lookup; `null` when absent.
    Get(String),
    /// Current camera zoom.
    Zoom,
    /// First non-null argument.
    Coalesce(Vec<Expression>),
    Compare {
        op: Comparison,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    All(Vec<Expression>),
    Interpolate {
        curve: Curve,
        input: Box<Expression>,
        /// Breakpoints in strictly ascending input order.
        stops: Vec<(f64, Expression)>,
    },
}

impl Expression {
    pub fn get(field: impl Into<String>) -> Self {
        Expression::Get(field.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Expression::Text(value.into())
    }

    pub fn gt(lhs: Expression, rhs: Expression) -> Self {
        Expression::Compare {
            op: Comparison::Gt,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn eq(lhs: Expression, rhs: Expression) -> Self {
        Expression::Compare {
            op: Comparison::Eq,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn interpolate(curve: Curve, input: Expression, stops: Vec<(f64, Expression)>) -> Self {
        Expression::Interpolate {
            curve,
            input: Box::new(input),
            stops,
        }
    }

    /// Every attribute name this expression reads, in visit order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expression::Get(field) => out.push(field),
            Expression::Coalesce(args) | Expression::All(args) => {
                args.iter().for_each(|a| a.collect_fields(out));
            }
            Expression::Compare { lhs, rhs, .. } => {
                lhs.collect_fields(out);
                rhs.collect_fields(out);
            }
            Expression::Interpolate { input, stops, .. } => {
                input.collect_fields(out);
                stops.iter().for_each(|(_, v)| v.collect_fields(out));
            }
            Expression::Number(_) | Expression::Text(_) | Expression::Zoom => {}
        }
    }

    /// True if some `["==", ["get", field], ...]` appears in the tree.
    pub fn has_equality_on(&self, field: &str) -> bool {
        match self {
            Expression::Compare {
                op: Comparison::Eq,
                lhs,
                ..
            } => matches!(lhs.as_ref(), Expression::Get(f) if f == field),
            Expression::All(args) | Expression::Coalesce(args) => {
                args.iter().any(|a| a.has_equality_on(field))
            }
            _ => false,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Expression::Number(n) => json!(n),
            Expression::Text(s) => json!(s),
            Expression::Get(field) => json!(["get", field]),
            Expression::Zoom => json!(["zoom"]),
            Expression::Coalesce(args) => prefixed("coalesce", args),
            Expression::All(args) => prefixed("all", args),
            Expression::Compare { op, lhs, rhs } => json!([op.op(), lhs.to_json(), rhs.to_json()]),
            Expression::Interpolate {
                curve,
                input,
                stops,
            } => {
                let curve = match curve {
                    Curve::Linear => json!(["linear"]),
                    Curve::Exponential(base) => json!(["exponential", base]),
                };
                let mut out = vec![json!("interpolate"), curve, input.to_json()];
                for (at, value) in stops {
                    out.push(json!(at));
                    out.push(value.to_json());
                }
                Value::Array(out)
            }
        }
    }
}

fn prefixed(op: &str, args: &[Expression]) -> Value {
    let mut out = Vec::with_capacity(args.len() + 1);
    out.push(json!(op));
    out.extend(args.iter().map(Expression::to_json));
    Value::Array(out)
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::{Curve, Expression};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn filter_wire_form() {
        let f = Expression::All(vec![
            Expression::eq(Expression::get("layer_type"), Expression::text("footprint")),
            Expression::gt(
                Expression::Coalesce(vec![Expression::get("value"), Expression::Number(0.0)]),
                Expression::Number(0.5),
            ),
        ]);
        assert_eq!(
            f.to_json(),
            json!([
                "all",
                ["==", ["get", "layer_type"], "footprint"],
                [">", ["coalesce", ["get", "value"], 0.0], 0.5]
            ])
        );
        assert!(f.has_equality_on("layer_type"));
        assert!(!f.has_equality_on("date"));
        assert_eq!(f.fields(), vec!["layer_type", "value"]);
    }

    #[test]
    fn interpolate_wire_form() {
        let e = Expression::interpolate(
            Curve::Exponential(2.0),
            Expression::Zoom,
            vec![(4.0, Expression::Number(2.0)), (8.0, Expression::Number(20.0))],
        );
        assert_eq!(
            serde_json::to_value(&e).unwrap(),
            json!(["interpolate", ["exponential", 2.0], ["zoom"], 4.0, 2.0, 8.0, 20.0])
        );
    }
}
