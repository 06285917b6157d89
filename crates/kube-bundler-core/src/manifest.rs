//! Kubernetes manifest composition
//!
//! Every component becomes a `Service` plus a `Deployment`. Objects are built
//! as typed values and serialized with `serde_yaml`, then joined into one
//! multi-document stream.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::blueprint::{Blueprint, BlueprintNode, PlaceholderResolver};
use crate::error::{BundleError, Result};
use crate::params::ParameterSet;

pub const ORCHESTRATOR_NAME: &str = "blueprint-orchestrator";
pub const PROBE_NAME: &str = "probe";
pub const SINGLE_NAME: &str = "single-model";

const APP_LABEL: &str = "app";

/// A port reference echoed verbatim
///
/// Values whose integer form reads back identically are written as YAML
/// integers, anything else (named ports, leading zeros) as strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortValue(String);

impl PortValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl Serialize for PortValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0.parse::<u64>() {
            Ok(n) if n.to_string() == self.0 => serializer.serialize_u64(n),
            _ => serializer.serialize_str(&self.0),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    name: String,
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServicePort {
    name: String,
    port: PortValue,
    target_port: PortValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_port: Option<PortValue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceSpec {
    #[serde(rename = "type")]
    service_type: &'static str,
    selector: BTreeMap<String, String>,
    ports: Vec<ServicePort>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Service {
    api_version: &'static str,
    kind: &'static str,
    metadata: ObjectMeta,
    spec: ServiceSpec,
}

#[derive(Debug, Serialize)]
struct EnvVar {
    name: String,
    value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContainerPort {
    container_port: PortValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Container {
    name: String,
    image: String,
    image_pull_policy: &'static str,
    ports: Vec<ContainerPort>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    env: Vec<EnvVar>,
}

#[derive(Debug, Serialize)]
struct PodSpec {
    containers: Vec<Container>,
}

#[derive(Debug, Serialize)]
struct PodTemplate {
    metadata: PodMeta,
    spec: PodSpec,
}

#[derive(Debug, Serialize)]
struct PodMeta {
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LabelSelector {
    match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct DeploymentSpec {
    replicas: u32,
    selector: LabelSelector,
    template: PodTemplate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Deployment {
    api_version: &'static str,
    kind: &'static str,
    metadata: ObjectMeta,
    spec: DeploymentSpec,
}

/// A deployable unit before rendering
#[derive(Debug, Clone)]
struct Component {
    name: String,
    image: String,
    /// Port the service exposes inside the cluster
    service_port: String,
    /// Port the container listens on
    container_port: String,
    node_port: Option<String>,
    service_type: &'static str,
    env: Vec<(String, String)>,
}

impl Component {
    fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(APP_LABEL.to_string(), self.name.clone())])
    }

    fn service(&self) -> Service {
        Service {
            api_version: "v1",
            kind: "Service",
            metadata: ObjectMeta {
                name: self.name.clone(),
                labels: self.labels(),
            },
            spec: ServiceSpec {
                service_type: self.service_type,
                selector: self.labels(),
                ports: vec![ServicePort {
                    name: format!("{}-port", self.name),
                    port: PortValue::new(&self.service_port),
                    target_port: PortValue::new(&self.container_port),
                    node_port: self.node_port.as_ref().map(PortValue::new),
                }],
            },
        }
    }

    fn deployment(&self) -> Deployment {
        Deployment {
            api_version: "apps/v1",
            kind: "Deployment",
            metadata: ObjectMeta {
                name: self.name.clone(),
                labels: self.labels(),
            },
            spec: DeploymentSpec {
                replicas: 1,
                selector: LabelSelector { match_labels: self.labels() },
                template: PodTemplate {
                    metadata: PodMeta { labels: self.labels() },
                    spec: PodSpec {
                        containers: vec![Container {
                            name: self.name.clone(),
                            image: self.image.clone(),
                            image_pull_policy: "IfNotPresent",
                            ports: vec![ContainerPort {
                                container_port: PortValue::new(&self.container_port),
                            }],
                            env: self
                                .env
                                .iter()
                                .map(|(name, value)| EnvVar { name: name.clone(), value: value.clone() })
                                .collect(),
                        }],
                    },
                },
            },
        }
    }
}

fn render(components: &[Component]) -> Result<String> {
    let mut documents = Vec::with_capacity(components.len() * 2);
    for component in components {
        tracing::debug!("Rendering component {} ({})", component.name, component.image);
        documents.push(serde_yaml::to_string(&component.service())?);
        documents.push(serde_yaml::to_string(&component.deployment())?);
    }
    Ok(documents.join("---\n"))
}

/// Kubernetes object names are lowercase RFC 1123 labels
fn dns_label(name: &str) -> String {
    let mut label: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    label.truncate(63);
    label.trim_matches('-').to_string()
}

fn required_for_composite<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    value.ok_or_else(|| {
        BundleError::ManifestComposition(format!("{} is required for a composite manifest", field))
    })
}

/// Merges blueprints and runtime parameters into manifest text
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestComposer;

impl ManifestComposer {
    pub fn new() -> Self {
        Self
    }

    /// Compose the multi-component manifest for a blueprint
    ///
    /// Emits the orchestrator, the probe when the blueprint asks for one, and
    /// every declared node.
    pub fn compose_composite(&self, parameters: &ParameterSet, blueprint_json: &str) -> Result<String> {
        let blueprint = Blueprint::parse(blueprint_json)?;
        let resolver = PlaceholderResolver::new(parameters);

        let blueprint_image = required_for_composite(parameters.blueprint_image(), "blueprint image")?;
        let blueprint_port = required_for_composite(parameters.blueprint_port(), "blueprint port")?;
        let increment_port = required_for_composite(parameters.increment_port(), "increment port")?;

        let solution_env = solution_env(parameters);
        let mut components = Vec::with_capacity(blueprint.nodes().len() + 2);

        components.push(Component {
            name: ORCHESTRATOR_NAME.to_string(),
            image: blueprint_image.to_string(),
            service_port: blueprint_port.to_string(),
            container_port: blueprint_port.to_string(),
            node_port: None,
            service_type: "NodePort",
            env: solution_env.clone(),
        });

        if blueprint.probe_enabled() {
            let probe_image = required_for_composite(parameters.probe_image(), "probe image")?;
            let probe_port = required_for_composite(parameters.probe_port(), "probe port")?;
            components.push(Component {
                name: PROBE_NAME.to_string(),
                image: probe_image.to_string(),
                service_port: probe_port.to_string(),
                container_port: probe_port.to_string(),
                node_port: None,
                service_type: "NodePort",
                env: solution_env.clone(),
            });
        }

        for node in blueprint.nodes() {
            components.push(node_component(node, &resolver, increment_port, &solution_env)?);
        }

        let mut seen = std::collections::HashSet::new();
        for component in &components {
            if !seen.insert(component.name.as_str()) {
                return Err(BundleError::ManifestComposition(format!(
                    "component name '{}' is declared more than once",
                    component.name
                )));
            }
        }

        let text = render(&components)?;
        tracing::info!(
            "Composed composite manifest with {} components for {}",
            components.len(),
            blueprint.name.as_deref().unwrap_or("unnamed blueprint")
        );
        Ok(text)
    }

    /// Compose the composite manifest and store it on the parameters
    pub fn compose_composite_into(&self, parameters: ParameterSet, blueprint_json: &str) -> Result<ParameterSet> {
        let text = self.compose_composite(&parameters, blueprint_json)?;
        Ok(parameters.with_generated_manifest(text))
    }

    /// Compose a manifest running `image` as one service exposed on node port `port`
    ///
    /// The output depends only on the inputs.
    pub fn compose_single(&self, image: &str, port: &str, parameters: &ParameterSet) -> Result<String> {
        if image.is_empty() {
            return Err(BundleError::InvalidParameter("image must not be empty".to_string()));
        }
        if port.is_empty() {
            return Err(BundleError::InvalidParameter("port must not be empty".to_string()));
        }
        let model_port = ParameterSet::require(parameters.single_model_port(), "single model port")?;
        let target_port = ParameterSet::require(parameters.single_target_port(), "single target port")?;
        let proxy_host = ParameterSet::require(parameters.proxy_host(), "proxy host")?;
        let proxy_port = ParameterSet::require(parameters.proxy_port(), "proxy port")?;

        let mut env = vec![
            ("DOCKER_PROXY_HOST".to_string(), proxy_host.to_string()),
            ("DOCKER_PROXY_PORT".to_string(), proxy_port.to_string()),
        ];
        env.extend(solution_env(parameters));

        let component = Component {
            name: SINGLE_NAME.to_string(),
            image: image.to_string(),
            service_port: model_port.to_string(),
            container_port: target_port.to_string(),
            node_port: Some(port.to_string()),
            service_type: "NodePort",
            env,
        };

        let text = render(std::slice::from_ref(&component))?;
        tracing::info!("Composed single manifest for {}", image);
        Ok(text)
    }
}

fn solution_env(parameters: &ParameterSet) -> Vec<(String, String)> {
    let mut env = Vec::new();
    if let Some(id) = parameters.solution_id() {
        env.push(("SOLUTION_ID".to_string(), id.to_string()));
    }
    if let Some(revision) = parameters.solution_revision_id() {
        env.push(("SOLUTION_REVISION_ID".to_string(), revision.to_string()));
    }
    env
}

fn node_component(
    node: &BlueprintNode,
    resolver: &PlaceholderResolver<'_>,
    increment_port: &str,
    solution_env: &[(String, String)],
) -> Result<Component> {
    let name = dns_label(&node.container_name);
    if name.is_empty() {
        return Err(BundleError::ManifestComposition(format!(
            "container name '{}' has no usable characters",
            node.container_name
        )));
    }

    let port = match &node.port {
        Some(port) => resolver.resolve(port)?,
        None => increment_port.to_string(),
    };

    let mut env = solution_env.to_vec();
    for (key, value) in &node.env {
        env.push((key.clone(), resolver.resolve(value)?));
    }

    Ok(Component {
        name,
        image: resolver.resolve(&node.image)?,
        service_port: port.clone(),
        container_port: port,
        node_port: None,
        service_type: "ClusterIP",
        env,
    })
}
