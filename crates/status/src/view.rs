//! View state materialization.
//!
//! A published view step carries identity and properties relative to its
//! owning resource; this module turns those into [`ResourceState`] records
//! whose URN lives in the owner's stack and project and whose `viewOf`
//! points back at the owner.

use converge_core::{ResourceState, Snapshot, Urn, ViewStepState};

use crate::error::Result;

/// Computes the URN of a view state relative to its owning resource.
///
/// The view's parent-type-chain is the owner's qualified type, extended by
/// the view's own `parent_type` when it nests deeper.
///
/// # Errors
///
/// Returns an error when the view's type or name is not a valid URN segment.
pub fn view_state_urn(owner: &Urn, state: &ViewStepState) -> Result<Urn> {
    let chain = if state.parent_type.is_empty() {
        owner.qualified_type()
    } else {
        format!("{}${}", owner.qualified_type(), state.parent_type)
    };
    Ok(owner.relative(chain, state.ty.clone(), state.name.clone())?)
}

/// Materializes a view state record.
///
/// When the prior snapshot holds a state for the computed URN, that state is
/// updated in place with the published inputs and outputs so its identity
/// (id, creation time, import marker) is preserved for snapshot consistency;
/// otherwise a fresh record is created.
///
/// # Errors
///
/// Returns an error when the view's identity segments are invalid.
pub fn materialize_view_state(
    owner: &Urn,
    state: &ViewStepState,
    prior: &Snapshot,
) -> Result<ResourceState> {
    let urn = view_state_urn(owner, state)?;
    let mut record = prior
        .get(&urn)
        .map(|r| r.as_ref().clone())
        .unwrap_or_else(|| ResourceState::new(urn.clone()));
    record.urn = urn;
    record.ty = state.ty.clone();
    record.inputs = state.inputs.clone();
    record.outputs = state.outputs.clone();
    record.view_of = Some(owner.clone());
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::PropertyMap;
    use serde_json::json;

    fn owner() -> Urn {
        "urn:deploy:dev::web::deploy:deploy:Stack::aws:s3:Bucket::assets"
            .parse()
            .unwrap()
    }

    fn view_state(name: &str) -> ViewStepState {
        let mut inputs = PropertyMap::new();
        inputs.insert("key".to_string(), json!("v"));
        ViewStepState {
            ty: "aws:s3:Object".to_string(),
            name: name.to_string(),
            parent_type: String::new(),
            inputs,
            outputs: PropertyMap::new(),
        }
    }

    #[test]
    fn view_urns_nest_under_the_owner() {
        let urn = view_state_urn(&owner(), &view_state("o")).unwrap();
        assert_eq!(urn.stack(), "dev");
        assert_eq!(urn.project(), "web");
        assert_eq!(
            urn.parent_type_chain(),
            "deploy:deploy:Stack$aws:s3:Bucket"
        );
        assert_eq!(urn.name(), "o");
    }

    #[test]
    fn prior_identity_is_preserved() {
        let urn = view_state_urn(&owner(), &view_state("o")).unwrap();
        let mut prior_state = ResourceState::new(urn);
        prior_state.id = "obj-123".to_string();
        let prior = Snapshot::new(vec![prior_state]);

        let record = materialize_view_state(&owner(), &view_state("o"), &prior).unwrap();
        assert_eq!(record.id, "obj-123");
        assert_eq!(record.view_of, Some(owner()));
        assert_eq!(record.inputs.get("key"), Some(&json!("v")));
    }

    #[test]
    fn unseen_views_start_fresh() {
        let prior = Snapshot::new(Vec::new());
        let record = materialize_view_state(&owner(), &view_state("new"), &prior).unwrap();
        assert!(record.id.is_empty());
        assert_eq!(record.view_of, Some(owner()));
    }
}
