//! Deployment parameters
//!
//! A [`ParameterSet`] carries every runtime value for one deployment request.
//! It is assembled with [`ParameterSetBuilder`] and is read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::hash_map;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{BundleError, Result};

/// Characters that would break the environment descriptor format
const RESERVED_ID_CHARS: &[char] = &[',', ':', '=', '\n', '\r'];

fn check_id(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(BundleError::InvalidParameter(format!("{} must not be empty", kind)));
    }
    if let Some(c) = value.chars().find(|c| RESERVED_ID_CHARS.contains(c)) {
        return Err(BundleError::InvalidParameter(format!(
            "{} '{}' contains reserved character {:?}",
            kind, value, c
        )));
    }
    Ok(())
}

/// Identifier of a deployed logical solution
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SolutionId(String);

/// Identifier of one revision of a solution
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevisionId(String);

macro_rules! id_newtype {
    ($ty:ident, $kind:literal) => {
        impl $ty {
            pub fn new(value: impl Into<String>) -> Result<Self> {
                let value = value.into();
                check_id($kind, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = BundleError;
            fn try_from(value: String) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$ty> for String {
            fn from(id: $ty) -> String {
                id.0
            }
        }
    };
}

id_newtype!(SolutionId, "solution id");
id_newtype!(RevisionId, "revision id");

/// Every solution known to be part of a composite bundle, keyed by solution id.
///
/// Iteration order is unspecified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SolutionRevisionMap(HashMap<SolutionId, RevisionId>);

impl SolutionRevisionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a revision with a solution, returning the revision it replaces
    pub fn insert(&mut self, solution: SolutionId, revision: RevisionId) -> Option<RevisionId> {
        self.0.insert(solution, revision)
    }

    /// Validate and insert a pair of raw strings
    pub fn insert_str(&mut self, solution: &str, revision: &str) -> Result<Option<RevisionId>> {
        Ok(self.insert(SolutionId::new(solution)?, RevisionId::new(revision)?))
    }

    pub fn get(&self, solution: &SolutionId) -> Option<&RevisionId> {
        self.0.get(solution)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, SolutionId, RevisionId> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a SolutionRevisionMap {
    type Item = (&'a SolutionId, &'a RevisionId);
    type IntoIter = hash_map::Iter<'a, SolutionId, RevisionId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(SolutionId, RevisionId)> for SolutionRevisionMap {
    fn from_iter<I: IntoIterator<Item = (SolutionId, RevisionId)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Runtime parameters for one deployment request
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    blueprint_image: Option<String>,
    blueprint_port: Option<String>,
    probe_image: Option<String>,
    probe_port: Option<String>,
    increment_port: Option<String>,

    single_model_port: Option<String>,
    single_target_port: Option<String>,
    proxy_host: Option<String>,
    proxy_port: Option<String>,

    folder_path: Option<PathBuf>,
    blueprint_json_name: Option<String>,
    docker_info_json_name: Option<String>,
    solution_yml_name: Option<String>,
    data_broker_json_name: Option<String>,

    common_data_user: Option<String>,
    common_data_password: Option<String>,
    common_data_url: Option<String>,

    solution_id: Option<String>,
    solution_revision_id: Option<String>,
    solution_revisions: SolutionRevisionMap,

    generated_manifest: Option<String>,
}

impl ParameterSet {
    pub fn builder() -> ParameterSetBuilder {
        ParameterSetBuilder::default()
    }

    pub fn blueprint_image(&self) -> Option<&str> {
        self.blueprint_image.as_deref()
    }

    pub fn blueprint_port(&self) -> Option<&str> {
        self.blueprint_port.as_deref()
    }

    pub fn probe_image(&self) -> Option<&str> {
        self.probe_image.as_deref()
    }

    pub fn probe_port(&self) -> Option<&str> {
        self.probe_port.as_deref()
    }

    pub fn increment_port(&self) -> Option<&str> {
        self.increment_port.as_deref()
    }

    pub fn single_model_port(&self) -> Option<&str> {
        self.single_model_port.as_deref()
    }

    pub fn single_target_port(&self) -> Option<&str> {
        self.single_target_port.as_deref()
    }

    pub fn proxy_host(&self) -> Option<&str> {
        self.proxy_host.as_deref()
    }

    pub fn proxy_port(&self) -> Option<&str> {
        self.proxy_port.as_deref()
    }

    pub fn folder_path(&self) -> Option<&Path> {
        self.folder_path.as_deref()
    }

    pub fn blueprint_json_name(&self) -> Option<&str> {
        self.blueprint_json_name.as_deref()
    }

    pub fn docker_info_json_name(&self) -> Option<&str> {
        self.docker_info_json_name.as_deref()
    }

    pub fn solution_yml_name(&self) -> Option<&str> {
        self.solution_yml_name.as_deref()
    }

    pub fn data_broker_json_name(&self) -> Option<&str> {
        self.data_broker_json_name.as_deref()
    }

    pub fn common_data_user(&self) -> Option<&str> {
        self.common_data_user.as_deref()
    }

    pub fn common_data_password(&self) -> Option<&str> {
        self.common_data_password.as_deref()
    }

    pub fn common_data_url(&self) -> Option<&str> {
        self.common_data_url.as_deref()
    }

    pub fn solution_id(&self) -> Option<&str> {
        self.solution_id.as_deref()
    }

    pub fn solution_revision_id(&self) -> Option<&str> {
        self.solution_revision_id.as_deref()
    }

    pub fn solution_revisions(&self) -> &SolutionRevisionMap {
        &self.solution_revisions
    }

    /// Manifest text stored by [`crate::ManifestComposer::compose_composite_into`]
    pub fn generated_manifest(&self) -> Option<&str> {
        self.generated_manifest.as_deref()
    }

    /// Return a copy carrying the generated manifest text
    pub fn with_generated_manifest(mut self, text: String) -> Self {
        self.generated_manifest = Some(text);
        self
    }

    /// Look up a field that an operation cannot proceed without
    pub(crate) fn require<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
        value.ok_or_else(|| BundleError::InvalidParameter(format!("{} is required", field)))
    }
}

// Credentials stay out of log output.
impl fmt::Debug for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSet")
            .field("blueprint_image", &self.blueprint_image)
            .field("blueprint_port", &self.blueprint_port)
            .field("probe_image", &self.probe_image)
            .field("probe_port", &self.probe_port)
            .field("increment_port", &self.increment_port)
            .field("single_model_port", &self.single_model_port)
            .field("single_target_port", &self.single_target_port)
            .field("proxy_host", &self.proxy_host)
            .field("proxy_port", &self.proxy_port)
            .field("folder_path", &self.folder_path)
            .field("common_data_user", &self.common_data_user)
            .field("common_data_password", &self.common_data_password.as_ref().map(|_| "***"))
            .field("common_data_url", &self.common_data_url)
            .field("solution_id", &self.solution_id)
            .field("solution_revision_id", &self.solution_revision_id)
            .field("solution_revisions", &self.solution_revisions.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ParameterSet`]
///
/// Empty strings are treated as unset.
#[derive(Debug, Clone, Default)]
pub struct ParameterSetBuilder {
    inner: ParameterSet,
}

fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

macro_rules! string_setters {
    ($($field:ident),* $(,)?) => {
        $(
            pub fn $field(mut self, value: impl Into<String>) -> Self {
                self.inner.$field = non_empty(value);
                self
            }
        )*
    };
}

impl ParameterSetBuilder {
    string_setters!(
        blueprint_image,
        blueprint_port,
        probe_image,
        probe_port,
        increment_port,
        single_model_port,
        single_target_port,
        proxy_host,
        proxy_port,
        blueprint_json_name,
        docker_info_json_name,
        solution_yml_name,
        data_broker_json_name,
        common_data_user,
        common_data_password,
        common_data_url,
        solution_id,
        solution_revision_id,
    );

    pub fn folder_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner.folder_path = Some(path.into());
        self
    }

    pub fn solution_revisions(mut self, revisions: SolutionRevisionMap) -> Self {
        self.inner.solution_revisions = revisions;
        self
    }

    /// Add one association to the solution revision map
    pub fn solution_revision(mut self, solution: SolutionId, revision: RevisionId) -> Self {
        self.inner.solution_revisions.insert(solution, revision);
        self
    }

    pub fn build(self) -> ParameterSet {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_reject_reserved_characters() {
        assert!(SolutionId::new("solution-id-x").is_ok());
        assert!(SolutionId::new("").is_err());
        assert!(SolutionId::new("a,b").is_err());
        assert!(RevisionId::new("rev:1").is_err());
        assert!(RevisionId::new("rev=1").is_err());
        assert!(RevisionId::new("rev\n1").is_err());
    }

    #[test]
    fn test_map_keeps_one_revision_per_solution() {
        let mut map = SolutionRevisionMap::new();
        assert_eq!(map.insert_str("sol-a", "rev-1").unwrap(), None);
        let previous = map.insert_str("sol-a", "rev-2").unwrap();
        assert_eq!(previous.as_ref().map(RevisionId::as_str), Some("rev-1"));
        assert_eq!(map.len(), 1);
        let key = SolutionId::new("sol-a").unwrap();
        assert_eq!(map.get(&key).map(RevisionId::as_str), Some("rev-2"));
    }

    #[test]
    fn test_map_deserializes_from_json_object() {
        let map: SolutionRevisionMap =
            serde_json::from_str(r#"{"sol-a": "rev-a", "sol-b": "rev-b"}"#).unwrap();
        assert_eq!(map.len(), 2);
        assert!(serde_json::from_str::<SolutionRevisionMap>(r#"{"bad,id": "rev"}"#).is_err());
    }

    #[test]
    fn test_builder_treats_empty_as_unset() {
        let params = ParameterSet::builder()
            .blueprint_image("repo/blueprint:1")
            .probe_image("")
            .build();
        assert_eq!(params.blueprint_image(), Some("repo/blueprint:1"));
        assert_eq!(params.probe_image(), None);
        assert_eq!(params.generated_manifest(), None);
    }

    #[test]
    fn test_with_generated_manifest() {
        let params = ParameterSet::builder().build().with_generated_manifest("kind: Service".into());
        assert_eq!(params.generated_manifest(), Some("kind: Service"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let params = ParameterSet::builder().common_data_password("hunter2").build();
        let rendered = format!("{:?}", params);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }
}
