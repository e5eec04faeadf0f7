//! Canonical resource identity.
//!
//! A URN is the cross-run identity of a resource:
//!
//! ```text
//! urn:deploy:<stack>::<project>::<parent-type-chain>::<type>::<name>
//! ```
//!
//! The parent-type-chain is the `$`-joined chain of ancestor types, starting
//! at the root stack; it is empty for resources without a parent. URNs are
//! stable across runs and globally unique within one deployment.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix shared by every URN.
pub const URN_PREFIX: &str = "urn:deploy:";

/// Separator between URN segments.
const SEGMENT_SEP: &str = "::";

/// Separator between types inside the parent-type-chain.
const TYPE_CHAIN_SEP: &str = "$";

/// Type of the singleton root stack resource.
pub const ROOT_STACK_TYPE: &str = "deploy:deploy:Stack";

/// Type prefix identifying provider resources.
pub const PROVIDER_TYPE_PREFIX: &str = "deploy:providers:";

/// Canonical resource identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Urn {
    stack: String,
    project: String,
    parent_chain: String,
    ty: String,
    name: String,
}

impl Urn {
    /// Builds a URN from its five segments.
    ///
    /// # Errors
    ///
    /// Returns an error if any segment is empty (other than the
    /// parent-type-chain) or contains the `::` separator.
    pub fn new(
        stack: impl Into<String>,
        project: impl Into<String>,
        parent_chain: impl Into<String>,
        ty: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let urn = Self {
            stack: stack.into(),
            project: project.into(),
            parent_chain: parent_chain.into(),
            ty: ty.into(),
            name: name.into(),
        };
        urn.validate()?;
        Ok(urn)
    }

    /// Builds the URN of a resource registered under `parent`.
    ///
    /// The child's parent-type-chain is the parent's qualified type.
    ///
    /// # Errors
    ///
    /// Returns an error if `ty` or `name` is invalid.
    pub fn child(parent: &Self, ty: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        Self::new(
            parent.stack.clone(),
            parent.project.clone(),
            parent.qualified_type(),
            ty,
            name,
        )
    }

    /// Builds the URN of the root stack resource for a deployment.
    ///
    /// # Errors
    ///
    /// Returns an error if `stack` or `project` is invalid.
    pub fn root_stack(stack: impl Into<String>, project: impl Into<String>) -> Result<Self> {
        Self::new(stack, project, "", ROOT_STACK_TYPE, stack_resource_name())
    }

    /// Builds the URN of the default provider for `package`.
    ///
    /// Default providers are ordinary provider resources whose URN is derived
    /// from the package name and parented to the root stack.
    ///
    /// # Errors
    ///
    /// Returns an error if any segment is invalid.
    pub fn default_provider(
        stack: impl Into<String>,
        project: impl Into<String>,
        package: &str,
    ) -> Result<Self> {
        Self::new(
            stack,
            project,
            ROOT_STACK_TYPE,
            format!("{PROVIDER_TYPE_PREFIX}{package}"),
            format!("default_{package}"),
        )
    }

    fn validate(&self) -> Result<()> {
        let err = |message: &str| Error::InvalidUrn {
            urn: self.to_string(),
            message: message.to_string(),
        };
        if self.stack.is_empty() || self.project.is_empty() {
            return Err(err("stack and project must be non-empty"));
        }
        if self.ty.is_empty() || self.name.is_empty() {
            return Err(err("type and name must be non-empty"));
        }
        for segment in [
            &self.stack,
            &self.project,
            &self.parent_chain,
            &self.ty,
            &self.name,
        ] {
            if segment.contains(SEGMENT_SEP) {
                return Err(err("segments may not contain '::'"));
            }
        }
        Ok(())
    }

    /// The stack segment.
    #[must_use]
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// The project segment.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The `$`-joined ancestor type chain; empty for parentless resources.
    #[must_use]
    pub fn parent_type_chain(&self) -> &str {
        &self.parent_chain
    }

    /// The resource type, e.g. `aws:s3:Bucket`.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.ty
    }

    /// The resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full type chain including this resource's own type.
    ///
    /// Children of this resource use this as their parent-type-chain.
    #[must_use]
    pub fn qualified_type(&self) -> String {
        if self.parent_chain.is_empty() {
            self.ty.clone()
        } else {
            format!("{}{}{}", self.parent_chain, TYPE_CHAIN_SEP, self.ty)
        }
    }

    /// The package a type belongs to: the first `:`-separated component.
    #[must_use]
    pub fn package(&self) -> &str {
        self.ty.split(':').next().unwrap_or(&self.ty)
    }

    /// Whether this is the root stack resource.
    #[must_use]
    pub fn is_root_stack(&self) -> bool {
        self.ty == ROOT_STACK_TYPE && self.parent_chain.is_empty()
    }

    /// Whether this URN names a provider resource.
    #[must_use]
    pub fn is_provider(&self) -> bool {
        self.ty.starts_with(PROVIDER_TYPE_PREFIX)
    }

    /// For provider URNs, the package the provider serves.
    #[must_use]
    pub fn provider_package(&self) -> Option<&str> {
        self.ty.strip_prefix(PROVIDER_TYPE_PREFIX)
    }

    /// The same URN with a different name segment.
    #[must_use]
    pub fn rename(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// The same URN with a different parent-type-chain.
    #[must_use]
    pub fn with_parent_chain(&self, parent_chain: impl Into<String>) -> Self {
        Self {
            parent_chain: parent_chain.into(),
            ..self.clone()
        }
    }

    /// A URN for `ty`/`name` in the same stack and project as `self`.
    ///
    /// Used for provider-published view states, whose identity is computed
    /// relative to their owning resource.
    ///
    /// # Errors
    ///
    /// Returns an error if `ty` or `name` is invalid.
    pub fn relative(
        &self,
        parent_chain: impl Into<String>,
        ty: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        Self::new(self.stack.clone(), self.project.clone(), parent_chain, ty, name)
    }
}

/// Name given to the singleton root stack resource.
fn stack_resource_name() -> &'static str {
    "stack"
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{URN_PREFIX}{}{SEGMENT_SEP}{}{SEGMENT_SEP}{}{SEGMENT_SEP}{}{SEGMENT_SEP}{}",
            self.stack, self.project, self.parent_chain, self.ty, self.name
        )
    }
}

impl FromStr for Urn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let err = |message: &str| Error::InvalidUrn {
            urn: s.to_string(),
            message: message.to_string(),
        };
        let rest = s.strip_prefix(URN_PREFIX).ok_or_else(|| {
            err(&format!("missing {URN_PREFIX} prefix"))
        })?;
        let segments: Vec<&str> = rest.split(SEGMENT_SEP).collect();
        let [stack, project, parent_chain, ty, name] = segments.as_slice() else {
            return Err(err("expected five '::'-separated segments"));
        };
        Self::new(*stack, *project, *parent_chain, *ty, *name)
    }
}

impl TryFrom<String> for Urn {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Urn> for String {
    fn from(urn: Urn) -> Self {
        urn.to_string()
    }
}
