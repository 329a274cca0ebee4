//! Operation model: one immutable edit intent against a document element.
//!
//! Parameters are a discriminated union keyed by kind, validated when the
//! operation is built. Callers holding loose JSON go through
//! [`OperationParams::from_json`], which rejects missing or malformed fields
//! up front instead of failing later on a dictionary lookup.
//!
//! Required fields per kind:
//!
//! | Kind              | Fields                          |
//! |-------------------|---------------------------------|
//! | insert            | `position`                      |
//! | delete            | (none)                          |
//! | update            | arbitrary properties            |
//! | move              | `position` and/or `delta`       |
//! | resize            | `dimensions` and/or `scale`     |
//! | rotate            | `angle`, `center`               |
//! | constraint_add    | `type`, `parameters`            |
//! | constraint_remove | (none)                          |
//! | precision_change  | `level`, `value`                |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{now_millis, Point, Size};

/// Flat field map. Ordered so that merges and encodings are deterministic.
pub type Fields = BTreeMap<String, ParamValue>;

/// A typed parameter value.
///
/// Mirrors the JSON data model but round-trips through non-self-describing
/// encodings (bincode) because every variant is explicitly tagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ParamValue>> {
        match self {
            ParamValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Accepts `{"x": .., "y": ..}` or `[x, y]`.
    pub fn as_point(&self) -> Option<Point> {
        let (x, y) = self.pair("x", "y")?;
        Some(Point::new(x, y))
    }

    /// Accepts `{"width": .., "height": ..}` or `[width, height]`.
    pub fn as_size(&self) -> Option<Size> {
        let (w, h) = self.pair("width", "height")?;
        Some(Size::new(w, h))
    }

    fn pair(&self, first: &str, second: &str) -> Option<(f64, f64)> {
        match self {
            ParamValue::Map(m) => Some((m.get(first)?.as_f64()?, m.get(second)?.as_f64()?)),
            ParamValue::List(items) if items.len() == 2 => {
                Some((items[0].as_f64()?, items[1].as_f64()?))
            }
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<Point> for ParamValue {
    fn from(p: Point) -> Self {
        let mut m = BTreeMap::new();
        m.insert("x".to_string(), ParamValue::Number(p.x));
        m.insert("y".to_string(), ParamValue::Number(p.y));
        ParamValue::Map(m)
    }
}

impl From<Size> for ParamValue {
    fn from(s: Size) -> Self {
        let mut m = BTreeMap::new();
        m.insert("width".to_string(), ParamValue::Number(s.width));
        m.insert("height".to_string(), ParamValue::Number(s.height));
        ParamValue::Map(m)
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Null => ParamValue::Null,
            Value::Bool(b) => ParamValue::Bool(b),
            // u64/i64 beyond 2^53 lose precision; coordinates never get there
            Value::Number(n) => n.as_f64().map(ParamValue::Number).unwrap_or(ParamValue::Null),
            Value::String(s) => ParamValue::Text(s),
            Value::Array(items) => ParamValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(obj) => {
                ParamValue::Map(obj.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// The nine edit kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Insert,
    Delete,
    Update,
    Move,
    Resize,
    Rotate,
    ConstraintAdd,
    ConstraintRemove,
    PrecisionChange,
}

impl OperationKind {
    pub const ALL: [OperationKind; 9] = [
        OperationKind::Insert,
        OperationKind::Delete,
        OperationKind::Update,
        OperationKind::Move,
        OperationKind::Resize,
        OperationKind::Rotate,
        OperationKind::ConstraintAdd,
        OperationKind::ConstraintRemove,
        OperationKind::PrecisionChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Delete => "delete",
            OperationKind::Update => "update",
            OperationKind::Move => "move",
            OperationKind::Resize => "resize",
            OperationKind::Rotate => "rotate",
            OperationKind::ConstraintAdd => "constraint_add",
            OperationKind::ConstraintRemove => "constraint_remove",
            OperationKind::PrecisionChange => "precision_change",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| OperationError::UnknownKind(s.to_string()))
    }
}

/// Drawing precision tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrecisionLevel {
    /// 0.1mm
    Ui,
    /// 0.01mm
    Edit,
    /// 0.001mm
    Compute,
}

impl PrecisionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrecisionLevel::Ui => "ui",
            PrecisionLevel::Edit => "edit",
            PrecisionLevel::Compute => "compute",
        }
    }
}

impl FromStr for PrecisionLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ui" => Ok(PrecisionLevel::Ui),
            "edit" => Ok(PrecisionLevel::Edit),
            "compute" => Ok(PrecisionLevel::Compute),
            _ => Err(()),
        }
    }
}

/// Per-kind operation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationParams {
    Insert {
        position: Point,
    },
    Delete,
    Update {
        properties: Fields,
    },
    /// At least one of `position` (absolute) or `delta` (relative) is set.
    Move {
        position: Option<Point>,
        delta: Option<Point>,
    },
    /// At least one of `dimensions` or `scale` is set.
    Resize {
        dimensions: Option<Size>,
        scale: Option<f64>,
    },
    Rotate {
        angle: f64,
        center: Point,
    },
    ConstraintAdd {
        constraint_type: String,
        parameters: Fields,
    },
    ConstraintRemove,
    PrecisionChange {
        level: PrecisionLevel,
        value: f64,
    },
}

impl OperationParams {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationParams::Insert { .. } => OperationKind::Insert,
            OperationParams::Delete => OperationKind::Delete,
            OperationParams::Update { .. } => OperationKind::Update,
            OperationParams::Move { .. } => OperationKind::Move,
            OperationParams::Resize { .. } => OperationKind::Resize,
            OperationParams::Rotate { .. } => OperationKind::Rotate,
            OperationParams::ConstraintAdd { .. } => OperationKind::ConstraintAdd,
            OperationParams::ConstraintRemove => OperationKind::ConstraintRemove,
            OperationParams::PrecisionChange { .. } => OperationKind::PrecisionChange,
        }
    }

    /// Build and validate parameters for `kind` from a flat field map.
    ///
    /// Unknown fields are ignored, except for `update` where every field is
    /// a property.
    pub fn from_fields(kind: OperationKind, mut fields: Fields) -> Result<Self, OperationError> {
        let params = match kind {
            OperationKind::Insert => OperationParams::Insert {
                position: point(kind, &fields, "position")?
                    .ok_or(OperationError::MissingField { kind, field: "position" })?,
            },
            OperationKind::Delete => OperationParams::Delete,
            OperationKind::Update => OperationParams::Update { properties: fields },
            OperationKind::Move => {
                let position = point(kind, &fields, "position")?;
                let delta = point(kind, &fields, "delta")?;
                if position.is_none() && delta.is_none() {
                    return Err(OperationError::MissingField { kind, field: "position|delta" });
                }
                OperationParams::Move { position, delta }
            }
            OperationKind::Resize => {
                let dimensions = match fields.get("dimensions") {
                    None => None,
                    Some(v) => Some(v.as_size().filter(|s| s.width.is_finite() && s.height.is_finite()).ok_or(
                        OperationError::InvalidField {
                            kind,
                            field: "dimensions",
                            reason: "expected {width, height}".to_string(),
                        },
                    )?),
                };
                let scale = number(kind, &fields, "scale")?;
                if let Some(s) = scale {
                    if s <= 0.0 {
                        return Err(OperationError::InvalidField {
                            kind,
                            field: "scale",
                            reason: format!("must be positive, got {s}"),
                        });
                    }
                }
                if dimensions.is_none() && scale.is_none() {
                    return Err(OperationError::MissingField { kind, field: "dimensions|scale" });
                }
                OperationParams::Resize { dimensions, scale }
            }
            OperationKind::Rotate => OperationParams::Rotate {
                angle: number(kind, &fields, "angle")?
                    .ok_or(OperationError::MissingField { kind, field: "angle" })?,
                center: point(kind, &fields, "center")?
                    .ok_or(OperationError::MissingField { kind, field: "center" })?,
            },
            OperationKind::ConstraintAdd => {
                let constraint_type = match fields.get("type") {
                    Some(ParamValue::Text(t)) if !t.is_empty() => t.clone(),
                    Some(_) => {
                        return Err(OperationError::InvalidField {
                            kind,
                            field: "type",
                            reason: "expected a non-empty string".to_string(),
                        })
                    }
                    None => return Err(OperationError::MissingField { kind, field: "type" }),
                };
                let parameters = match fields.remove("parameters") {
                    Some(ParamValue::Map(m)) => m,
                    Some(_) => {
                        return Err(OperationError::InvalidField {
                            kind,
                            field: "parameters",
                            reason: "expected an object".to_string(),
                        })
                    }
                    None => return Err(OperationError::MissingField { kind, field: "parameters" }),
                };
                OperationParams::ConstraintAdd { constraint_type, parameters }
            }
            OperationKind::ConstraintRemove => OperationParams::ConstraintRemove,
            OperationKind::PrecisionChange => {
                let level = match fields.get("level") {
                    Some(v) => v.as_str().and_then(|s| s.parse().ok()).ok_or(
                        OperationError::InvalidField {
                            kind,
                            field: "level",
                            reason: "expected one of ui, edit, compute".to_string(),
                        },
                    )?,
                    None => return Err(OperationError::MissingField { kind, field: "level" }),
                };
                let value = number(kind, &fields, "value")?
                    .ok_or(OperationError::MissingField { kind, field: "value" })?;
                OperationParams::PrecisionChange { level, value }
            }
        };
        Ok(params)
    }

    /// Build parameters from caller-supplied JSON. `null` means no fields.
    pub fn from_json(kind: OperationKind, value: serde_json::Value) -> Result<Self, OperationError> {
        let fields = match value {
            serde_json::Value::Null => Fields::new(),
            serde_json::Value::Object(obj) => {
                obj.into_iter().map(|(k, v)| (k, ParamValue::from(v))).collect()
            }
            _ => {
                return Err(OperationError::InvalidField {
                    kind,
                    field: "parameters",
                    reason: "expected an object".to_string(),
                })
            }
        };
        Self::from_fields(kind, fields)
    }

    /// Flatten back into a field map. Inverse of [`from_fields`](Self::from_fields).
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        match self {
            OperationParams::Insert { position } => {
                fields.insert("position".into(), (*position).into());
            }
            OperationParams::Delete | OperationParams::ConstraintRemove => {}
            OperationParams::Update { properties } => return properties.clone(),
            OperationParams::Move { position, delta } => {
                if let Some(p) = position {
                    fields.insert("position".into(), (*p).into());
                }
                if let Some(d) = delta {
                    fields.insert("delta".into(), (*d).into());
                }
            }
            OperationParams::Resize { dimensions, scale } => {
                if let Some(d) = dimensions {
                    fields.insert("dimensions".into(), (*d).into());
                }
                if let Some(s) = scale {
                    fields.insert("scale".into(), (*s).into());
                }
            }
            OperationParams::Rotate { angle, center } => {
                fields.insert("angle".into(), (*angle).into());
                fields.insert("center".into(), (*center).into());
            }
            OperationParams::ConstraintAdd { constraint_type, parameters } => {
                fields.insert("type".into(), constraint_type.as_str().into());
                fields.insert("parameters".into(), ParamValue::Map(parameters.clone()));
            }
            OperationParams::PrecisionChange { level, value } => {
                fields.insert("level".into(), level.as_str().into());
                fields.insert("value".into(), (*value).into());
            }
        }
        fields
    }
}

fn number(kind: OperationKind, fields: &Fields, field: &'static str) -> Result<Option<f64>, OperationError> {
    match fields.get(field) {
        None => Ok(None),
        Some(v) => match v.as_f64() {
            Some(n) if n.is_finite() => Ok(Some(n)),
            _ => Err(OperationError::InvalidField {
                kind,
                field,
                reason: "expected a finite number".to_string(),
            }),
        },
    }
}

fn point(kind: OperationKind, fields: &Fields, field: &'static str) -> Result<Option<Point>, OperationError> {
    match fields.get(field) {
        None => Ok(None),
        Some(v) => match v.as_point() {
            Some(p) if p.x.is_finite() && p.y.is_finite() => Ok(Some(p)),
            _ => Err(OperationError::InvalidField {
                kind,
                field,
                reason: "expected {x, y}".to_string(),
            }),
        },
    }
}

/// One edit intent. Never mutated once appended to a session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub user_id: String,
    pub session_id: Uuid,
    pub target_element: String,
    pub params: OperationParams,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Per-session position in the log. 0 until appended.
    pub sequence_number: u64,
    pub parent_operation_id: Option<Uuid>,
    pub metadata: BTreeMap<String, String>,
}

impl Operation {
    pub fn new(
        session_id: Uuid,
        user_id: impl Into<String>,
        target_element: impl Into<String>,
        params: OperationParams,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            session_id,
            target_element: target_element.into(),
            params,
            created_at: now_millis(),
            sequence_number: 0,
            parent_operation_id: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.params.kind()
    }

    pub fn with_sequence(mut self, sequence_number: u64) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// A successor of this operation carrying new parameters.
    ///
    /// Fresh id, `sequence_number + 1`, parent set to this operation.
    pub fn derive(&self, params: OperationParams) -> Operation {
        Operation {
            id: Uuid::new_v4(),
            user_id: self.user_id.clone(),
            session_id: self.session_id,
            target_element: self.target_element.clone(),
            params,
            created_at: now_millis(),
            sequence_number: self.sequence_number + 1,
            parent_operation_id: Some(self.id),
            metadata: self.metadata.clone(),
        }
    }

    /// Equality on everything except id, timestamp and log bookkeeping.
    pub fn same_intent(&self, other: &Operation) -> bool {
        self.user_id == other.user_id
            && self.session_id == other.session_id
            && self.target_element == other.target_element
            && self.params == other.params
            && self.metadata == other.metadata
    }
}

/// Malformed operation parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationError {
    MissingField {
        kind: OperationKind,
        field: &'static str,
    },
    InvalidField {
        kind: OperationKind,
        field: &'static str,
        reason: String,
    },
    UnknownKind(String),
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { kind, field } => write!(f, "{kind}: missing field `{field}`"),
            Self::InvalidField { kind, field, reason } => {
                write!(f, "{kind}: invalid field `{field}`: {reason}")
            }
            Self::UnknownKind(k) => write!(f, "Unknown operation kind: {k}"),
        }
    }
}

impl std::error::Error for OperationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_names_parse_back() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
        assert!(matches!(
            "explode".parse::<OperationKind>(),
            Err(OperationError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_insert_requires_position() {
        let err = OperationParams::from_json(OperationKind::Insert, json!({})).unwrap_err();
        assert_eq!(
            err,
            OperationError::MissingField { kind: OperationKind::Insert, field: "position" }
        );

        let ok = OperationParams::from_json(
            OperationKind::Insert,
            json!({"position": {"x": 1.5, "y": -2}}),
        )
        .unwrap();
        assert_eq!(ok, OperationParams::Insert { position: Point::new(1.5, -2.0) });
    }

    #[test]
    fn test_position_accepts_pair_array() {
        let params =
            OperationParams::from_json(OperationKind::Insert, json!({"position": [3, 4]})).unwrap();
        assert_eq!(params, OperationParams::Insert { position: Point::new(3.0, 4.0) });
    }

    #[test]
    fn test_malformed_position_rejected() {
        let err = OperationParams::from_json(OperationKind::Insert, json!({"position": "here"}))
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidField { field: "position", .. }));
    }

    #[test]
    fn test_move_needs_position_or_delta() {
        assert!(OperationParams::from_json(OperationKind::Move, json!({})).is_err());

        let delta_only =
            OperationParams::from_json(OperationKind::Move, json!({"delta": {"x": 5, "y": 0}}))
                .unwrap();
        assert_eq!(
            delta_only,
            OperationParams::Move { position: None, delta: Some(Point::new(5.0, 0.0)) }
        );
    }

    #[test]
    fn test_resize_validation() {
        assert!(OperationParams::from_json(OperationKind::Resize, json!({})).is_err());
        assert!(OperationParams::from_json(OperationKind::Resize, json!({"scale": 0})).is_err());
        assert!(OperationParams::from_json(OperationKind::Resize, json!({"scale": -2.0})).is_err());

        let dims = OperationParams::from_json(
            OperationKind::Resize,
            json!({"dimensions": {"width": 10, "height": 20}}),
        )
        .unwrap();
        assert_eq!(
            dims,
            OperationParams::Resize { dimensions: Some(Size::new(10.0, 20.0)), scale: None }
        );
    }

    #[test]
    fn test_rotate_requires_angle_and_center() {
        assert!(OperationParams::from_json(OperationKind::Rotate, json!({"angle": 90})).is_err());
        assert!(OperationParams::from_json(
            OperationKind::Rotate,
            json!({"center": {"x": 0, "y": 0}})
        )
        .is_err());
        let ok = OperationParams::from_json(
            OperationKind::Rotate,
            json!({"angle": 90, "center": {"x": 1, "y": 1}}),
        )
        .unwrap();
        assert_eq!(ok.kind(), OperationKind::Rotate);
    }

    #[test]
    fn test_constraint_add_fields() {
        let err =
            OperationParams::from_json(OperationKind::ConstraintAdd, json!({"type": "distance"}))
                .unwrap_err();
        assert_eq!(
            err,
            OperationError::MissingField { kind: OperationKind::ConstraintAdd, field: "parameters" }
        );

        let ok = OperationParams::from_json(
            OperationKind::ConstraintAdd,
            json!({"type": "distance", "parameters": {"value": 25.0}}),
        )
        .unwrap();
        match ok {
            OperationParams::ConstraintAdd { constraint_type, parameters } => {
                assert_eq!(constraint_type, "distance");
                assert_eq!(parameters.get("value"), Some(&ParamValue::Number(25.0)));
            }
            other => panic!("Wrong params: {other:?}"),
        }
    }

    #[test]
    fn test_precision_change_level() {
        assert!(OperationParams::from_json(
            OperationKind::PrecisionChange,
            json!({"level": "nano", "value": 0.1})
        )
        .is_err());
        let ok = OperationParams::from_json(
            OperationKind::PrecisionChange,
            json!({"level": "compute", "value": 0.001}),
        )
        .unwrap();
        assert_eq!(
            ok,
            OperationParams::PrecisionChange { level: PrecisionLevel::Compute, value: 0.001 }
        );
    }

    #[test]
    fn test_fieldless_kinds_ignore_extras() {
        assert_eq!(
            OperationParams::from_json(OperationKind::Delete, json!({"why": "typo"})).unwrap(),
            OperationParams::Delete
        );
        assert_eq!(
            OperationParams::from_json(OperationKind::ConstraintRemove, serde_json::Value::Null)
                .unwrap(),
            OperationParams::ConstraintRemove
        );
    }

    #[test]
    fn test_non_object_parameters_rejected() {
        let err = OperationParams::from_json(OperationKind::Update, json!([1, 2])).unwrap_err();
        assert!(matches!(err, OperationError::InvalidField { field: "parameters", .. }));
    }

    #[test]
    fn test_update_fields_are_properties() {
        let params = OperationParams::from_json(
            OperationKind::Update,
            json!({"status": "active", "layer": 3}),
        )
        .unwrap();
        let fields = params.to_fields();
        assert_eq!(fields.get("status"), Some(&ParamValue::from("active")));
        assert_eq!(fields.get("layer"), Some(&ParamValue::Number(3.0)));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_to_fields_rebuilds_same_params() {
        let samples = vec![
            OperationParams::Insert { position: Point::new(1.0, 2.0) },
            OperationParams::Move { position: None, delta: Some(Point::new(-1.0, 0.5)) },
            OperationParams::Resize { dimensions: Some(Size::new(4.0, 3.0)), scale: Some(2.0) },
            OperationParams::Rotate { angle: 45.0, center: Point::ZERO },
            OperationParams::PrecisionChange { level: PrecisionLevel::Edit, value: 0.01 },
        ];
        for params in samples {
            let rebuilt = OperationParams::from_fields(params.kind(), params.to_fields()).unwrap();
            assert_eq!(rebuilt, params);
        }
    }

    #[test]
    fn test_derive_links_parent() {
        let op = Operation::new(
            Uuid::new_v4(),
            "alice",
            "wall-1",
            OperationParams::Insert { position: Point::ZERO },
        )
        .with_sequence(4);

        let next = op.derive(OperationParams::Insert { position: Point::new(1.0, 1.0) });
        assert_ne!(next.id, op.id);
        assert_eq!(next.sequence_number, 5);
        assert_eq!(next.parent_operation_id, Some(op.id));
        assert_eq!(next.target_element, "wall-1");
        assert_eq!(next.user_id, "alice");
    }

    #[test]
    fn test_same_intent_ignores_bookkeeping() {
        let session = Uuid::new_v4();
        let a = Operation::new(session, "u", "e", OperationParams::Delete).with_sequence(1);
        let b = Operation::new(session, "u", "e", OperationParams::Delete).with_sequence(9);
        assert!(a.same_intent(&b));

        let c = Operation::new(session, "u", "other", OperationParams::Delete);
        assert!(!a.same_intent(&c));
    }
}
