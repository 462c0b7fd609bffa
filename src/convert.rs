//! Conversion between committed shapes and business records.
//!
//! Business records are the flat wire format the labelling backend stores:
//! one record per rectangle (four clockwise corners starting top-left) and a
//! single `ignoreArea` record wrapping every polygon. Colors never travel in
//! records; they are re-derived from the type name through the
//! [`TypeStyleTable`] registered for the scene.

use serde::{Deserialize, Serialize};

use crate::error::{ConversionError, ConversionResult};
use crate::geometry::{Point, Rect};
use crate::palette::{Color, Palette, UNKNOWN_TYPE_COLOR};
use crate::shape::{PolygonHandle, PolygonShape, RectHandle, RectShape, ShapeId, ShapeMeta};

/// Name of the record that wraps all ignore polygons.
pub const IGNORE_AREA_NAME: &str = "ignoreArea";

/// Stroke color of ignore polygons.
pub const IGNORE_AREA_COLOR: Color = Color::rgb(0, 0, 0);

// ============================================================================
// Type table
// ============================================================================

/// A registered label type and its color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeStyle {
    pub type_name: String,
    pub color: Color,
}

/// Ordered type list; the color of each type is its palette slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeStyleTable {
    entries: Vec<TypeStyle>,
}

impl TypeStyleTable {
    pub fn new<S: AsRef<str>>(names: &[S], palette: &Palette) -> Self {
        let entries = names
            .iter()
            .enumerate()
            .map(|(index, name)| TypeStyle {
                type_name: name.as_ref().to_string(),
                color: palette.color_by_index(index as isize),
            })
            .collect();
        Self { entries }
    }

    pub fn color_of(&self, type_name: &str) -> Option<Color> {
        self.entries
            .iter()
            .find(|e| e.type_name == type_name)
            .map(|e| e.color)
    }

    /// First type registered with `color`.
    pub fn type_of(&self, color: Color) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.color == color)
            .map(|e| e.type_name.as_str())
    }

    pub fn index_of(&self, type_name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.type_name == type_name)
    }

    pub fn entries(&self) -> &[TypeStyle] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Wire format
// ============================================================================

/// One coordinate of a business record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessPoint {
    pub axis_x: f32,
    pub axis_y: f32,
    #[serde(default)]
    pub source: u8,
}

impl BusinessPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            axis_x: x,
            axis_y: y,
            source: 0,
        }
    }

    pub fn to_point(self) -> Point {
        Point::new(self.axis_x, self.axis_y)
    }
}

impl From<Point> for BusinessPoint {
    fn from(p: Point) -> Self {
        Self::new(p.x, p.y)
    }
}

/// A labelled rectangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRect {
    pub name: String,
    #[serde(default)]
    pub source: u8,
    pub coordinates: Vec<BusinessPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

/// One ignore region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessPolygon {
    pub coordinates: Vec<BusinessPoint>,
}

/// The record wrapping every ignore region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreArea {
    pub name: String,
    pub ignore_area_coordinates: Vec<BusinessPolygon>,
}

impl IgnoreArea {
    pub fn new(polygons: Vec<BusinessPolygon>) -> Self {
        Self {
            name: IGNORE_AREA_NAME.to_string(),
            ignore_area_coordinates: polygons,
        }
    }
}

/// Any record of a label result. A record named [`IGNORE_AREA_NAME`] is the
/// ignore area; every other name is a rect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BusinessRecord {
    IgnoreArea(IgnoreArea),
    Rect(BusinessRect),
}

/// Every field either record kind may carry, before the name picks one.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    name: String,
    #[serde(default)]
    source: u8,
    #[serde(default)]
    coordinates: Vec<BusinessPoint>,
    #[serde(default)]
    group_id: Option<String>,
    #[serde(default)]
    ignore_area_coordinates: Vec<BusinessPolygon>,
}

impl From<RawRecord> for BusinessRecord {
    fn from(raw: RawRecord) -> Self {
        if raw.name == IGNORE_AREA_NAME {
            BusinessRecord::IgnoreArea(IgnoreArea {
                name: raw.name,
                ignore_area_coordinates: raw.ignore_area_coordinates,
            })
        } else {
            BusinessRecord::Rect(BusinessRect {
                name: raw.name,
                source: raw.source,
                coordinates: raw.coordinates,
                group_id: raw.group_id,
            })
        }
    }
}

impl<'de> Deserialize<'de> for BusinessRecord {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawRecord::deserialize(deserializer).map(BusinessRecord::from)
    }
}

impl BusinessRecord {
    pub fn name(&self) -> &str {
        match self {
            BusinessRecord::IgnoreArea(area) => &area.name,
            BusinessRecord::Rect(rect) => &rect.name,
        }
    }

    pub fn is_ignore_area(&self) -> bool {
        matches!(self, BusinessRecord::IgnoreArea(_))
    }
}

/// Shapes rebuilt from business records.
#[derive(Debug, Default)]
pub struct ModelShapes {
    pub rects: Vec<RectShape>,
    pub polygons: Vec<PolygonShape>,
}

impl ModelShapes {
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty() && self.polygons.is_empty()
    }
}

/// Serialize records as pretty JSON.
pub fn records_to_json(records: &[BusinessRecord]) -> ConversionResult<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// Parse a JSON array of records.
pub fn records_from_json(json: &str) -> ConversionResult<Vec<BusinessRecord>> {
    Ok(serde_json::from_str(json)?)
}

// ============================================================================
// Factory
// ============================================================================

/// Maps shapes to records and back using a registered type table.
#[derive(Debug, Clone)]
pub struct DataConversionFactory {
    table: TypeStyleTable,
}

impl DataConversionFactory {
    pub fn new(table: TypeStyleTable) -> Self {
        log::debug!("Type table registered with {} type(s)", table.len());
        Self { table }
    }

    pub fn table(&self) -> &TypeStyleTable {
        &self.table
    }

    /// Color for a type, falling back to [`UNKNOWN_TYPE_COLOR`].
    pub fn color_for(&self, type_name: &str) -> Color {
        self.table.color_of(type_name).unwrap_or_else(|| {
            log::warn!("Type '{}' is not registered; using fallback color", type_name);
            UNKNOWN_TYPE_COLOR
        })
    }

    /// Build a new rect for `type_name`, colored from the table.
    pub fn create_rect(&self, rect: Rect, type_name: &str, group_id: Option<&str>) -> RectShape {
        let mut meta = ShapeMeta::new(type_name);
        meta.group_id = group_id.map(str::to_string);
        let shape = RectShape::new(ShapeId::generate(), rect, self.color_for(type_name)).with_meta(meta);
        match group_id {
            Some(group) => shape.with_text(group),
            None => shape,
        }
    }

    pub fn rect_to_business(&self, rect: &RectShape) -> ConversionResult<BusinessRect> {
        let r = rect.rect();
        if !r.is_finite() {
            return Err(ConversionError::invalid_record(0, format!("rect {} has non-finite geometry", rect.id())));
        }
        Ok(BusinessRect {
            name: rect.type_name().to_string(),
            source: 0,
            coordinates: r.corners().into_iter().map(BusinessPoint::from).collect(),
            group_id: rect.group_id().map(str::to_string),
        })
    }

    pub fn polygon_to_business(&self, polygon: &PolygonShape) -> ConversionResult<BusinessPolygon> {
        let points = polygon.absolute_points();
        if !points.iter().all(Point::is_finite) {
            return Err(ConversionError::invalid_record(
                0,
                format!("polygon {} has non-finite points", polygon.id()),
            ));
        }
        Ok(BusinessPolygon {
            coordinates: points.into_iter().map(BusinessPoint::from).collect(),
        })
    }

    /// Rect records first, then exactly one ignore-area record.
    pub fn try_model_to_business(
        &self,
        rects: &[RectHandle],
        polygons: &[PolygonHandle],
    ) -> ConversionResult<Vec<BusinessRecord>> {
        let mut records = Vec::with_capacity(rects.len() + 1);
        for (index, rect) in rects.iter().enumerate() {
            let record = self
                .rect_to_business(&rect.borrow())
                .map_err(|e| reindex(e, index))?;
            records.push(BusinessRecord::Rect(record));
        }

        let ignore = polygons
            .iter()
            .enumerate()
            .map(|(index, p)| self.polygon_to_business(&p.borrow()).map_err(|e| reindex(e, index)))
            .collect::<ConversionResult<Vec<_>>>()?;
        records.push(BusinessRecord::IgnoreArea(IgnoreArea::new(ignore)));
        Ok(records)
    }

    /// Like [`Self::try_model_to_business`], but logs failures and returns
    /// no records.
    pub fn model_to_business(&self, rects: &[RectHandle], polygons: &[PolygonHandle]) -> Vec<BusinessRecord> {
        self.try_model_to_business(rects, polygons).unwrap_or_else(|e| {
            log::error!("Model to business conversion failed: {}", e);
            Vec::new()
        })
    }

    pub fn rect_from_business(&self, index: usize, record: &BusinessRect) -> ConversionResult<RectShape> {
        let points = finite_points(index, &record.coordinates)?;
        let bounds = Rect::bounding(&points)
            .ok_or_else(|| ConversionError::invalid_record(index, "empty coordinates"))?;
        Ok(self.create_rect(bounds, &record.name, record.group_id.as_deref()))
    }

    pub fn polygon_from_business(&self, index: usize, record: &BusinessPolygon) -> ConversionResult<PolygonShape> {
        let points = finite_points(index, &record.coordinates)?;
        if points.is_empty() {
            return Err(ConversionError::invalid_record(index, "empty coordinates"));
        }
        Ok(PolygonShape::closed(ShapeId::generate(), points, IGNORE_AREA_COLOR)
            .with_meta(ShapeMeta::new(IGNORE_AREA_NAME)))
    }

    /// Rebuild shapes from records. Malformed records are skipped one by one
    /// with a warning.
    pub fn business_to_model(&self, records: &[BusinessRecord]) -> ModelShapes {
        let mut model = ModelShapes::default();
        for (index, record) in records.iter().enumerate() {
            match record {
                BusinessRecord::IgnoreArea(area) => {
                    for polygon in &area.ignore_area_coordinates {
                        match self.polygon_from_business(index, polygon) {
                            Ok(shape) => model.polygons.push(shape),
                            Err(e) => log::warn!("Skipping ignore polygon: {}", e),
                        }
                    }
                }
                BusinessRecord::Rect(rect) => match self.rect_from_business(index, rect) {
                    Ok(shape) => model.rects.push(shape),
                    Err(e) => log::warn!("Skipping rect record: {}", e),
                },
            }
        }
        log::debug!(
            "Rebuilt {} rect(s) and {} polygon(s) from {} record(s)",
            model.rects.len(),
            model.polygons.len(),
            records.len()
        );
        model
    }
}

fn finite_points(index: usize, coordinates: &[BusinessPoint]) -> ConversionResult<Vec<Point>> {
    coordinates
        .iter()
        .map(|c| {
            let p = c.to_point();
            if p.is_finite() {
                Ok(p)
            } else {
                Err(ConversionError::invalid_record(index, "non-finite coordinate"))
            }
        })
        .collect()
}

fn reindex(error: ConversionError, index: usize) -> ConversionError {
    match error {
        ConversionError::InvalidRecord { message, .. } => ConversionError::InvalidRecord { index, message },
        other => other,
    }
}
