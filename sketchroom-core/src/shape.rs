//! Shape data model.
//!
//! A shape is a closed tagged variant over the drawing tools, sharing a base
//! of common fields. On the wire every field sits at the top level of one
//! JSON object and the variant is selected by the `tool` tag:
//!
//! ```text
//! { "id": "s1", "tool": "rect", "color": "#fff", "strokeWidth": 3,
//!   "x": 10, "y": 10, "width": 40, "height": 20 }
//! ```
//!
//! Optional fields that were absent on receipt stay absent when the shape is
//! relayed, so peers see exactly what the creator sent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single 2D point in board coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Optional placement of a shape on the board.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Transform {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_y: Option<f64>,
}

impl Transform {
    /// Translation-only transform.
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }
}

/// Variant-specific geometry, tagged by `tool`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "lowercase")]
pub enum ShapeKind {
    Pen {
        #[serde(with = "flat_points")]
        points: Vec<Point>,
    },
    Rect {
        width: f64,
        height: f64,
    },
    Circle {
        radius: f64,
    },
    Arrow {
        #[serde(with = "flat_points")]
        points: Vec<Point>,
    },
    Text {
        text: String,
        #[serde(rename = "fontSize", default, skip_serializing_if = "Option::is_none")]
        font_size: Option<f64>,
    },
    /// Opaque binary-as-text payload (typically a data URL).
    Image {
        image: String,
    },
}

impl ShapeKind {
    /// The wire tag of this variant.
    pub fn tool(&self) -> &'static str {
        match self {
            ShapeKind::Pen { .. } => "pen",
            ShapeKind::Rect { .. } => "rect",
            ShapeKind::Circle { .. } => "circle",
            ShapeKind::Arrow { .. } => "arrow",
            ShapeKind::Text { .. } => "text",
            ShapeKind::Image { .. } => "image",
        }
    }
}

/// Shape validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("shape id must not be empty")]
    EmptyId,
}

/// One drawable object with a stable identity.
///
/// `id` is assigned by the creating client and never changes; it is the only
/// key used to address updates and deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "strokeWidth", default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(flatten)]
    pub transform: Transform,
    #[serde(flatten)]
    pub kind: ShapeKind,
}

impl Shape {
    pub fn new(id: impl Into<String>, kind: ShapeKind) -> Self {
        Self {
            id: id.into(),
            color: None,
            stroke_width: None,
            transform: Transform::default(),
            kind,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_stroke_width(mut self, width: f64) -> Self {
        self.stroke_width = Some(width);
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.transform.x = Some(x);
        self.transform.y = Some(y);
        self
    }

    pub fn tool(&self) -> &'static str {
        self.kind.tool()
    }

    /// Checks the invariants the type system cannot express.
    pub fn validate(&self) -> Result<(), ShapeError> {
        if self.id.is_empty() {
            return Err(ShapeError::EmptyId);
        }
        Ok(())
    }
}

/// `points` travel as a flat `[x0, y0, x1, y1, ...]` array.
mod flat_points {
    use super::Point;
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(points: &[Point], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(points.len() * 2))?;
        for p in points {
            seq.serialize_element(&p.x)?;
            seq.serialize_element(&p.y)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Point>, D::Error> {
        let flat = Vec::<f64>::deserialize(deserializer)?;
        if flat.len() % 2 != 0 {
            return Err(D::Error::custom(format!(
                "points must hold x/y pairs, got {} numbers",
                flat.len()
            )));
        }
        Ok(flat.chunks_exact(2).map(|c| Point::new(c[0], c[1])).collect())
    }
}
