//! Uniform element model and the mapping from vendor element records
//!
//! The transformer is lenient: malformed records degrade to partial elements
//! and a malformed payload degrades to an empty list. Problems are logged,
//! never returned.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Confidence reported for every element; the service does not supply one
pub const DEFAULT_CONFIDENCE: f32 = 1.0;

/// Closed set of element kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Title,
    Header,
    Footer,
    NarrativeText,
    ListItem,
    Table,
    Image,
    Formula,
    Text,
}

impl ElementType {
    /// Map a vendor type tag, falling back to `Text` for anything unknown
    pub fn from_vendor(tag: &str) -> Self {
        match tag {
            "Title" => ElementType::Title,
            "Header" | "PageHeader" => ElementType::Header,
            "Footer" | "PageFooter" | "PageNumber" => ElementType::Footer,
            "NarrativeText" => ElementType::NarrativeText,
            "ListItem" | "List-item" => ElementType::ListItem,
            "Table" | "TableChunk" => ElementType::Table,
            "Image" | "Figure" | "Picture" => ElementType::Image,
            "Formula" => ElementType::Formula,
            _ => ElementType::Text,
        }
    }

    /// Snake case tag
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Title => "title",
            ElementType::Header => "header",
            ElementType::Footer => "footer",
            ElementType::NarrativeText => "narrative_text",
            ElementType::ListItem => "list_item",
            ElementType::Table => "table",
            ElementType::Image => "image",
            ElementType::Formula => "formula",
            ElementType::Text => "text",
        }
    }
}

/// Axis aligned region of a page, in the coordinate system of the source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,

    /// Page the region is on, 1-based
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Width of the page layout the coordinates refer to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_width: Option<f64>,

    /// Height of the page layout the coordinates refer to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_height: Option<f64>,
}

impl BoundingBox {
    /// Smallest box containing every point, or `None` for an empty list
    pub fn from_points(points: &[(f64, f64)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bbox = Self {
            x1: first.0,
            y1: first.1,
            x2: first.0,
            y2: first.1,
            page: None,
            layout_width: None,
            layout_height: None,
        };
        for &(x, y) in rest {
            bbox.x1 = bbox.x1.min(x);
            bbox.y1 = bbox.y1.min(y);
            bbox.x2 = bbox.x2.max(x);
            bbox.y2 = bbox.y2.max(y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Remap into the unit square using the layout size
    ///
    /// Returns `None` when the layout size is unknown or degenerate.
    pub fn normalized(&self) -> Option<Self> {
        let width = self.layout_width.filter(|w| *w > 0.0)?;
        let height = self.layout_height.filter(|h| *h > 0.0)?;
        Some(Self {
            x1: self.x1 / width,
            y1: self.y1 / height,
            x2: self.x2 / width,
            y2: self.y2 / height,
            page: self.page,
            layout_width: Some(1.0),
            layout_height: Some(1.0),
        })
    }
}

/// One unit of extracted document content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedElement {
    /// Vendor element id, or a positional id when the vendor gave none
    pub id: String,

    #[serde(rename = "type")]
    pub element_type: ElementType,

    pub text: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,

    pub confidence: f32,

    /// Vendor metadata, passed through untouched
    pub metadata: Map<String, Value>,
}

/// Convert a vendor response payload into processed elements
///
/// Anything other than a JSON array yields an empty list.
pub fn transform_elements(payload: &Value) -> Vec<ProcessedElement> {
    let Some(records) = payload.as_array() else {
        warn!(
            "Expected an element array from the partition service, got {}",
            json_kind(payload)
        );
        return Vec::new();
    };

    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| transform_element(index, record))
        .collect()
}

fn transform_element(index: usize, record: &Value) -> Option<ProcessedElement> {
    let Some(object) = record.as_object() else {
        warn!("Skipping element {}: expected an object", index);
        return None;
    };

    let element_type = object
        .get("type")
        .and_then(Value::as_str)
        .map(ElementType::from_vendor)
        .unwrap_or(ElementType::Text);

    let id = object
        .get("element_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("element-{}", index));

    let text = object
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let metadata = object
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let page_number = metadata
        .get("page_number")
        .and_then(Value::as_u64)
        .and_then(|p| u32::try_from(p).ok());

    let bbox = metadata.get("coordinates").and_then(|coordinates| {
        let bbox = bounding_box(coordinates, page_number);
        if bbox.is_none() {
            warn!("Element {} has malformed coordinates; dropping bounding box", id);
        }
        bbox
    });

    if bbox.is_none() {
        debug!("Element {} has no bounding box", id);
    }

    Some(ProcessedElement {
        id,
        element_type,
        text,
        bbox,
        page_number,
        confidence: DEFAULT_CONFIDENCE,
        metadata,
    })
}

/// Derive a bounding box from a vendor `coordinates` object
///
/// Every entry of `points` must be a pair of numbers; any deviation yields
/// `None`.
pub fn bounding_box(coordinates: &Value, page: Option<u32>) -> Option<BoundingBox> {
    let points = coordinates
        .get("points")?
        .as_array()?
        .iter()
        .map(point)
        .collect::<Option<Vec<_>>>()?;

    let mut bbox = BoundingBox::from_points(&points)?;
    bbox.page = page;
    bbox.layout_width = coordinates.get("layout_width").and_then(Value::as_f64);
    bbox.layout_height = coordinates.get("layout_height").and_then(Value::as_f64);
    Some(bbox)
}

fn point(value: &Value) -> Option<(f64, f64)> {
    match value.as_array()?.as_slice() {
        [x, y] => Some((x.as_f64()?, y.as_f64()?)),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vendor_type_mapping() {
        assert_eq!(ElementType::from_vendor("NarrativeText"), ElementType::NarrativeText);
        assert_eq!(ElementType::from_vendor("Title"), ElementType::Title);
        assert_eq!(ElementType::from_vendor("ListItem"), ElementType::ListItem);
        assert_eq!(ElementType::from_vendor("TableChunk"), ElementType::Table);
        assert_eq!(ElementType::from_vendor("Figure"), ElementType::Image);
        assert_eq!(ElementType::from_vendor("UncategorizedText"), ElementType::Text);
        assert_eq!(ElementType::from_vendor("SomethingNew"), ElementType::Text);
        assert_eq!(ElementType::from_vendor(""), ElementType::Text);
    }

    #[test]
    fn test_bounding_box_from_points() {
        let coordinates = json!({
            "points": [[0, 0], [10, 0], [10, 5], [0, 5]],
            "system": "PixelSpace"
        });
        let bbox = bounding_box(&coordinates, None).unwrap();
        assert_eq!((bbox.x1, bbox.y1, bbox.x2, bbox.y2), (0.0, 0.0, 10.0, 5.0));
        assert_eq!(bbox.page, None);
        assert_eq!(bbox.width(), 10.0);
        assert_eq!(bbox.height(), 5.0);
    }

    #[test]
    fn test_bounding_box_unordered_points() {
        let coordinates = json!({"points": [[7.5, 3.0], [2.0, 9.0], [4.0, 1.5]]});
        let bbox = bounding_box(&coordinates, Some(2)).unwrap();
        assert_eq!((bbox.x1, bbox.y1, bbox.x2, bbox.y2), (2.0, 1.5, 7.5, 9.0));
        assert_eq!(bbox.page, Some(2));
    }

    #[test]
    fn test_malformed_coordinates_yield_none() {
        assert!(bounding_box(&json!({}), None).is_none());
        assert!(bounding_box(&json!({"points": null}), None).is_none());
        assert!(bounding_box(&json!({"points": []}), None).is_none());
        assert!(bounding_box(&json!({"points": [[1, 2], [3]]}), None).is_none());
        assert!(bounding_box(&json!({"points": [["a", "b"]]}), None).is_none());
        assert!(bounding_box(&json!("points"), None).is_none());
    }

    #[test]
    fn test_normalized_bounding_box() {
        let coordinates = json!({
            "points": [[100, 200], [300, 200], [300, 400], [100, 400]],
            "layout_width": 1000,
            "layout_height": 800
        });
        let bbox = bounding_box(&coordinates, Some(1)).unwrap();
        let normalized = bbox.normalized().unwrap();
        assert!((normalized.x1 - 0.1).abs() < 1e-9);
        assert!((normalized.y1 - 0.25).abs() < 1e-9);
        assert!((normalized.x2 - 0.3).abs() < 1e-9);
        assert!((normalized.y2 - 0.5).abs() < 1e-9);
        assert_eq!(normalized.page, Some(1));

        let without_layout = bounding_box(&json!({"points": [[0, 0], [1, 1]]}), None).unwrap();
        assert!(without_layout.normalized().is_none());
    }

    #[test]
    fn test_transform_full_element() {
        let payload = json!([{
            "type": "NarrativeText",
            "element_id": "abc123",
            "text": "Rust is a systems programming language.",
            "metadata": {
                "page_number": 3,
                "filename": "intro.pdf",
                "coordinates": {
                    "points": [[0, 0], [10, 0], [10, 5], [0, 5]],
                    "system": "PixelSpace",
                    "layout_width": 20,
                    "layout_height": 10
                }
            }
        }]);

        let elements = transform_elements(&payload);
        assert_eq!(elements.len(), 1);

        let element = &elements[0];
        assert_eq!(element.id, "abc123");
        assert_eq!(element.element_type, ElementType::NarrativeText);
        assert_eq!(element.text, "Rust is a systems programming language.");
        assert_eq!(element.page_number, Some(3));
        assert_eq!(element.confidence, 1.0);
        assert_eq!(element.metadata["filename"], "intro.pdf");

        let bbox = element.bbox.unwrap();
        assert_eq!((bbox.x1, bbox.y1, bbox.x2, bbox.y2), (0.0, 0.0, 10.0, 5.0));
        assert_eq!(bbox.page, Some(3));
    }

    #[test]
    fn test_transform_degrades_on_partial_records() {
        let payload = json!([
            {"type": "Title", "text": "Heading"},
            {"type": "Mystery", "element_id": "m1", "text": "?", "metadata": {"coordinates": {"system": "PixelSpace"}}},
            "not an object",
            {"element_id": "t1"}
        ]);

        let elements = transform_elements(&payload);
        assert_eq!(elements.len(), 3);

        assert_eq!(elements[0].id, "element-0");
        assert_eq!(elements[0].element_type, ElementType::Title);
        assert!(elements[0].bbox.is_none());
        assert!(elements[0].metadata.is_empty());

        assert_eq!(elements[1].element_type, ElementType::Text);
        assert!(elements[1].bbox.is_none());

        assert_eq!(elements[2].id, "t1");
        assert_eq!(elements[2].element_type, ElementType::Text);
        assert_eq!(elements[2].text, "");
    }

    #[test]
    fn test_transform_non_array_payload() {
        assert!(transform_elements(&json!({"detail": "oops"})).is_empty());
        assert!(transform_elements(&Value::Null).is_empty());
        assert!(transform_elements(&json!([])).is_empty());
    }

    #[test]
    fn test_element_serializes_snake_case_type() {
        let element = ProcessedElement {
            id: "e1".to_string(),
            element_type: ElementType::ListItem,
            text: "- item".to_string(),
            bbox: None,
            page_number: None,
            confidence: DEFAULT_CONFIDENCE,
            metadata: Map::new(),
        };
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json["type"], "list_item");
        assert!(json.get("bbox").is_none());
        assert_eq!(ElementType::ListItem.as_str(), "list_item");
    }
}
