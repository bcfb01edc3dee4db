use crate::ResourceError;
use serde_json::{Map, Value};

/// Free-form image metadata and per-axis resolution.
///
/// Carried through the envelope unchanged. Absence is `None` and encodes as
/// `null`, never as an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub metadata: Option<Map<String, Value>>,
    pub resolution: Option<Vec<f64>>,
}

impl Metadata {
    pub fn get_metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata.as_ref()
    }

    pub fn get_resolution(&self) -> Option<&[f64]> {
        self.resolution.as_deref()
    }

    pub(crate) fn write_fields(&self, fields: &mut Map<String, Value>) {
        fields.insert(
            "metadata".to_owned(),
            self.metadata.clone().map_or(Value::Null, Value::Object),
        );
        fields.insert(
            "resolution".to_owned(),
            self.resolution.as_ref().map_or(Value::Null, |r| {
                Value::Array(
                    r.iter()
                        .map(|v| serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number))
                        .collect(),
                )
            }),
        );
    }

    pub(crate) fn from_fields(fields: &Map<String, Value>) -> Result<Self, ResourceError> {
        let metadata = match fields.get("metadata") {
            None | Some(Value::Null) => None,
            Some(Value::Object(m)) => Some(m.clone()),
            Some(other) => {
                return Err(ResourceError::InvalidField {
                    field: "metadata".to_owned(),
                    reason: format!("expected a mapping or null, got {other}"),
                })
            }
        };

        let resolution = match fields.get("resolution") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|v| {
                        v.as_f64().ok_or_else(|| ResourceError::InvalidField {
                            field: "resolution".to_owned(),
                            reason: format!("expected a number, got {v}"),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(other) => {
                return Err(ResourceError::InvalidField {
                    field: "resolution".to_owned(),
                    reason: format!("expected a sequence or null, got {other}"),
                })
            }
        };

        Ok(Self {
            metadata,
            resolution,
        })
    }
}
