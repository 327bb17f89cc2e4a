//! Per-schema attribute table.
//!
//! Everything that differs between the three tile schemas (field names, the
//! date partition, the sub-layer discriminator) is read from [`profile`].
//! Filter and paint construction never branch on the schema themselves.

use catalog::SchemaKind;
use foundation::time::DateKey;

use crate::expression::Expression;
use crate::layer::LayerKind;

/// Where one data series lives inside a feature.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SeriesFields {
    pub value: &'static str,
    /// Read when `value` is absent on a feature.
    pub fallback: Option<&'static str>,
    /// `(field, expected)` equality selecting this series' sub-layer.
    pub discriminator: Option<(&'static str, &'static str)>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SchemaProfile {
    pub kind: SchemaKind,
    pub footprint: SeriesFields,
    pub pm25: SeriesFields,
    /// Exact-match date attribute for time-series tiles.
    pub date_field: Option<&'static str>,
    /// A tick refreshes both layers rather than only the visible one.
    pub tick_refreshes_both: bool,
}

impl SchemaProfile {
    pub fn series(&self, kind: LayerKind) -> &SeriesFields {
        match kind {
            LayerKind::Footprint => &self.footprint,
            LayerKind::Pm25 => &self.pm25,
        }
    }

    /// Layers that must be refiltered when the date advances.
    pub fn tick_layers(&self, active: LayerKind) -> Vec<LayerKind> {
        if self.date_field.is_none() {
            Vec::new()
        } else if self.tick_refreshes_both {
            LayerKind::ALL.to_vec()
        } else {
            vec![active]
        }
    }

    /// Numeric input for thresholds and color ramps. Missing attributes
    /// coalesce to the fallback field, then to zero.
    pub fn value_expression(&self, kind: LayerKind) -> Expression {
        let series = self.series(kind);
        let mut args = vec![Expression::get(series.value)];
        if let Some(fallback) = series.fallback {
            args.push(Expression::get(fallback));
        }
        args.push(Expression::Number(0.0));
        Expression::Coalesce(args)
    }

    /// `all(discriminator?, value > threshold, date == day?)`
    pub fn filter(&self, kind: LayerKind, threshold: f64, date: DateKey) -> Expression {
        let series = self.series(kind);
        let mut clauses = Vec::with_capacity(3);
        if let Some((field, expected)) = series.discriminator {
            clauses.push(Expression::eq(
                Expression::get(field),
                Expression::text(expected),
            ));
        }
        clauses.push(Expression::gt(
            self.value_expression(kind),
            Expression::Number(threshold),
        ));
        if let Some(field) = self.date_field {
            clauses.push(Expression::eq(
                Expression::get(field),
                Expression::text(date.query_string()),
            ));
        }
        Expression::All(clauses)
    }
}

const GENERIC: SchemaProfile = SchemaProfile {
    kind: SchemaKind::Generic,
    footprint: SeriesFields {
        value: "footprint",
        fallback: None,
        discriminator: None,
    },
    pm25: SeriesFields {
        value: "pm25",
        fallback: None,
        discriminator: None,
    },
    date_field: None,
    tick_refreshes_both: false,
};

const TIME_SERIES_A: SchemaProfile = SchemaProfile {
    kind: SchemaKind::TimeSeriesA,
    footprint: SeriesFields {
        value: "value",
        fallback: Some("footprint"),
        discriminator: None,
    },
    pm25: SeriesFields {
        value: "pm25",
        fallback: None,
        discriminator: None,
    },
    date_field: Some("date"),
    tick_refreshes_both: false,
};

const TIME_SERIES_B: SchemaProfile = SchemaProfile {
    kind: SchemaKind::TimeSeriesB,
    footprint: SeriesFields {
        value: "value",
        fallback: Some("footprint"),
        discriminator: Some(("layer_type", "footprint")),
    },
    pm25: SeriesFields {
        value: "pm25_value",
        fallback: Some("pm25"),
        discriminator: Some(("layer_type", "convolved")),
    },
    date_field: Some("date"),
    // Both series share one date-partitioned source.
    tick_refreshes_both: true,
};

pub fn profile(kind: SchemaKind) -> &'static SchemaProfile {
    match kind {
        SchemaKind::Generic => &GENERIC,
        SchemaKind::TimeSeriesA => &TIME_SERIES_A,
        SchemaKind::TimeSeriesB => &TIME_SERIES_B,
    }
}

/// Shorthand for `profile(schema).filter(..)`.
pub fn filter_for(schema: SchemaKind, kind: LayerKind, threshold: f64, date: DateKey) -> Expression {
    profile(schema).filter(kind, threshold, date)
}
