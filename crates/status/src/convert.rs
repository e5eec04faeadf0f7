//! Conversions between the wire view-step messages and the core model.
//!
//! Property bags travel as `google.protobuf.Struct` values; operation,
//! status, and diff-kind tags travel as their canonical text forms.

use std::collections::BTreeMap;

use converge_core::{
    DiffKind, PropertyDiff, PropertyMap, ResourceStatus, StepOp, ViewStep, ViewStepState,
};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::proto::v1;

/// Decodes a wire view step into the core model.
///
/// # Errors
///
/// Returns an error when the operation, status, or a diff kind does not
/// parse.
pub fn view_step_from_proto(msg: v1::ViewStep) -> Result<ViewStep> {
    let op: StepOp = msg.op.parse().map_err(invalid)?;
    let status: ResourceStatus = if msg.status.is_empty() {
        ResourceStatus::Ok
    } else {
        msg.status.parse().map_err(invalid)?
    };

    let mut detailed_diff = BTreeMap::new();
    for (path, diff) in msg.detailed_diff {
        let kind: DiffKind = diff.kind.parse().map_err(invalid)?;
        detailed_diff.insert(
            path,
            PropertyDiff {
                kind,
                input_diff: diff.input_diff,
            },
        );
    }

    Ok(ViewStep {
        op,
        status,
        error: msg.error,
        old: msg.old.map(view_state_from_proto),
        new: msg.new.map(view_state_from_proto),
        keys: msg.keys,
        diffs: msg.diffs,
        has_detailed_diff: msg.has_detailed_diff,
        detailed_diff,
    })
}

/// Encodes a core view step for the wire.
#[must_use]
pub fn view_step_to_proto(step: &ViewStep) -> v1::ViewStep {
    v1::ViewStep {
        op: step.op.to_string(),
        status: step.status.to_string(),
        error: step.error.clone(),
        old: step.old.as_ref().map(view_state_to_proto),
        new: step.new.as_ref().map(view_state_to_proto),
        keys: step.keys.clone(),
        diffs: step.diffs.clone(),
        has_detailed_diff: step.has_detailed_diff,
        detailed_diff: step
            .detailed_diff
            .iter()
            .map(|(path, diff)| {
                (
                    path.clone(),
                    v1::PropertyDiff {
                        kind: diff.kind.to_string(),
                        input_diff: diff.input_diff,
                    },
                )
            })
            .collect(),
    }
}

fn view_state_from_proto(msg: v1::ViewStepState) -> ViewStepState {
    ViewStepState {
        ty: msg.r#type,
        name: msg.name,
        parent_type: msg.parent_type,
        inputs: msg.inputs.map(|s| struct_to_map(&s)).unwrap_or_default(),
        outputs: msg.outputs.map(|s| struct_to_map(&s)).unwrap_or_default(),
    }
}

fn view_state_to_proto(state: &ViewStepState) -> v1::ViewStepState {
    v1::ViewStepState {
        r#type: state.ty.clone(),
        name: state.name.clone(),
        parent_type: state.parent_type.clone(),
        inputs: Some(map_to_struct(&state.inputs)),
        outputs: Some(map_to_struct(&state.outputs)),
    }
}

fn invalid(e: converge_core::Error) -> Error {
    Error::InvalidViewStep {
        message: e.to_string(),
    }
}

/// Encodes a property map as a `google.protobuf.Struct`.
#[must_use]
pub fn map_to_struct(map: &PropertyMap) -> prost_types::Struct {
    prost_types::Struct {
        fields: map
            .iter()
            .map(|(k, v)| (k.clone(), value_to_proto(v)))
            .collect(),
    }
}

/// Decodes a `google.protobuf.Struct` into a property map.
#[must_use]
pub fn struct_to_map(value: &prost_types::Struct) -> PropertyMap {
    value
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), proto_to_value(v)))
        .collect()
}

fn value_to_proto(value: &Value) -> prost_types::Value {
    use prost_types::value::Kind;
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(items) => Kind::ListValue(prost_types::ListValue {
            values: items.iter().map(value_to_proto).collect(),
        }),
        Value::Object(map) => Kind::StructValue(map_to_struct(map)),
    };
    prost_types::Value { kind: Some(kind) }
}

fn proto_to_value(value: &prost_types::Value) -> Value {
    use prost_types::value::Kind;
    match &value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::NumberValue(n)) => serde_json::Number::from_f64(*n)
            .map_or(Value::Null, Value::Number),
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.iter().map(proto_to_value).collect())
        }
        Some(Kind::StructValue(s)) => Value::Object(struct_to_map(s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> PropertyMap {
        match value {
            Value::Object(m) => m,
            _ => PropertyMap::new(),
        }
    }

    #[test]
    fn property_maps_round_trip_through_struct_values() {
        let original = map(json!({
            "string": "s",
            "number": 4.5,
            "bool": true,
            "null": null,
            "list": [1.0, "two", {"nested": false}],
            "object": {"a": {"b": [true]}},
        }));
        let back = struct_to_map(&map_to_struct(&original));
        assert_eq!(back, original);
    }

    #[test]
    fn view_steps_round_trip_through_the_wire_shape() {
        let mut detailed = BTreeMap::new();
        detailed.insert(
            "size".to_string(),
            PropertyDiff {
                kind: DiffKind::UpdateReplace,
                input_diff: true,
            },
        );
        let step = ViewStep {
            op: StepOp::Refresh,
            status: ResourceStatus::PartialFailure,
            error: "half-way".to_string(),
            old: None,
            new: Some(ViewStepState {
                ty: "aws:s3:Object".to_string(),
                name: "o".to_string(),
                parent_type: String::new(),
                inputs: map(json!({"key": "v"})),
                outputs: map(json!({"etag": "abc"})),
            }),
            keys: vec!["size".to_string()],
            diffs: vec!["size".to_string()],
            has_detailed_diff: true,
            detailed_diff: detailed,
        };

        let decoded = view_step_from_proto(view_step_to_proto(&step)).unwrap();
        assert_eq!(decoded.op, step.op);
        assert_eq!(decoded.status, step.status);
        assert_eq!(decoded.error, step.error);
        assert_eq!(decoded.keys, step.keys);
        assert_eq!(decoded.detailed_diff, step.detailed_diff);
        let new = decoded.new.unwrap();
        assert_eq!(new.name, "o");
        assert_eq!(new.inputs, map(json!({"key": "v"})));
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        let msg = v1::ViewStep {
            op: "no-such-op".to_string(),
            ..v1::ViewStep::default()
        };
        assert!(matches!(
            view_step_from_proto(msg),
            Err(Error::InvalidViewStep { .. })
        ));
    }

    #[test]
    fn empty_status_defaults_to_ok() {
        let msg = v1::ViewStep {
            op: "view".to_string(),
            ..v1::ViewStep::default()
        };
        let step = view_step_from_proto(msg).unwrap();
        assert_eq!(step.status, ResourceStatus::Ok);
    }
}
