//! Deployment manifest.
//!
//! Each snapshot carries a manifest recording when it was produced, by which
//! engine version, and with which plugins. The manifest must survive a
//! serialize→deserialize round trip unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel distinguishing manifests from unrelated JSON documents.
pub const MANIFEST_MAGIC: &str = "converge-manifest";

/// The kind of plugin a manifest entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginKind {
    /// A policy analyzer.
    Analyzer,
    /// A language host.
    Language,
    /// A resource provider.
    Resource,
}

/// Metadata about one plugin that participated in a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    /// Plugin name, e.g. `aws`.
    pub name: String,
    /// What the plugin is.
    pub kind: PluginKind,
    /// Version, when the plugin reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<semver::Version>,
}

/// Snapshot metadata: engine time, version, and plugin set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// When the snapshot was produced.
    pub time: DateTime<Utc>,
    /// Manifest magic; always [`MANIFEST_MAGIC`].
    pub magic: String,
    /// Engine version string.
    pub version: String,
    /// Plugins that participated, in load order.
    #[serde(default)]
    pub plugins: Vec<PluginInfo>,
}

impl Manifest {
    /// A manifest stamped now for the given engine version.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            magic: MANIFEST_MAGIC.to_string(),
            version: version.into(),
            plugins: Vec::new(),
        }
    }

    /// Records a plugin once; an identical entry is ignored.
    pub fn add_plugin(&mut self, plugin: PluginInfo) {
        if !self.plugins.contains(&plugin) {
            self.plugins.push(plugin);
        }
    }

    /// Whether the magic marks this as a manifest this engine understands.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.magic == MANIFEST_MAGIC
    }
}
