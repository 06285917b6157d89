//! Blueprint parsing and placeholder resolution
//!
//! A blueprint is the JSON description of a composite solution: the model
//! nodes to deploy and whether a probe should run alongside them. String
//! values may reference runtime parameters with `${NAME}` placeholders.

use regex_lite::{Captures, Regex};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::{BundleError, Result};
use crate::params::ParameterSet;

/// Parsed blueprint document
#[derive(Debug, Clone, Deserialize)]
pub struct Blueprint {
    /// Solution name
    #[serde(default)]
    pub name: Option<String>,

    /// Blueprint version
    #[serde(default)]
    pub version: Option<String>,

    /// Probe switch, e.g. `[{"value": "true"}]`
    #[serde(default, rename = "probeIndicator")]
    pub probe_indicator: Vec<ProbeIndicator>,

    /// Model containers in the solution graph
    #[serde(default)]
    pub nodes: Option<Vec<BlueprintNode>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeIndicator {
    pub value: String,
}

/// One component declared by the blueprint
#[derive(Debug, Clone, Deserialize)]
pub struct BlueprintNode {
    #[serde(default)]
    pub container_name: String,

    #[serde(default)]
    pub node_type: Option<String>,

    #[serde(default)]
    pub image: String,

    /// Container port; the increment port is used when absent
    #[serde(default)]
    pub port: Option<String>,

    /// Extra environment passed to the container
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Blueprint {
    /// Parse and structurally validate blueprint JSON
    pub fn parse(json: &str) -> Result<Self> {
        let blueprint: Blueprint = serde_json::from_str(json)?;
        blueprint.validate()?;
        Ok(blueprint)
    }

    fn validate(&self) -> Result<()> {
        let nodes = self.nodes.as_deref().ok_or_else(|| {
            BundleError::ManifestComposition("blueprint has no 'nodes' entry".to_string())
        })?;
        if nodes.is_empty() {
            return Err(BundleError::ManifestComposition("blueprint declares no nodes".to_string()));
        }
        for (index, node) in nodes.iter().enumerate() {
            if node.container_name.is_empty() {
                return Err(BundleError::ManifestComposition(format!(
                    "node {} is missing 'container_name'",
                    index
                )));
            }
            if node.image.is_empty() {
                return Err(BundleError::ManifestComposition(format!(
                    "node '{}' is missing 'image'",
                    node.container_name
                )));
            }
        }
        Ok(())
    }

    /// Declared nodes (empty only for blueprints that skipped validation)
    pub fn nodes(&self) -> &[BlueprintNode] {
        self.nodes.as_deref().unwrap_or_default()
    }

    /// Whether the blueprint asks for a probe component
    pub fn probe_enabled(&self) -> bool {
        self.probe_indicator
            .first()
            .map(|p| p.value.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

/// Resolves `${NAME}` placeholders against a [`ParameterSet`]
pub struct PlaceholderResolver<'a> {
    parameters: &'a ParameterSet,
}

impl<'a> PlaceholderResolver<'a> {
    pub fn new(parameters: &'a ParameterSet) -> Self {
        Self { parameters }
    }

    fn lookup(&self, name: &str) -> Result<&'a str> {
        let p = self.parameters;
        let (value, field) = match name {
            "BLUEPRINT_IMAGE" => (p.blueprint_image(), "blueprint image"),
            "BLUEPRINT_PORT" => (p.blueprint_port(), "blueprint port"),
            "PROBE_IMAGE" => (p.probe_image(), "probe image"),
            "PROBE_PORT" => (p.probe_port(), "probe port"),
            "INCREMENT_PORT" => (p.increment_port(), "increment port"),
            "SOLUTION_ID" => (p.solution_id(), "solution id"),
            "SOLUTION_REVISION_ID" => (p.solution_revision_id(), "solution revision id"),
            other => {
                return Err(BundleError::ManifestComposition(format!(
                    "unknown placeholder ${{{}}}",
                    other
                )))
            }
        };
        value.ok_or_else(|| {
            BundleError::ManifestComposition(format!(
                "placeholder ${{{}}} needs the {} parameter",
                name, field
            ))
        })
    }

    /// Substitute every placeholder in `input`
    ///
    /// Fails on the first placeholder that cannot be resolved.
    pub fn resolve(&self, input: &str) -> Result<String> {
        let mut failure = None;
        let resolved = placeholder_pattern().replace_all(input, |caps: &Captures| {
            match self.lookup(&caps[1]) {
                Ok(value) => value.to_string(),
                Err(err) => {
                    failure.get_or_insert(err);
                    String::new()
                }
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(resolved.into_owned()),
        }
    }
}
