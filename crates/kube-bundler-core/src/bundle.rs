//! Deployment bundle assembly
//!
//! Bundle structure:
//! ```text
//! bundle.zip
//! ├── deployments/
//! │   └── solution.yml      # Generated manifest
//! ├── deploy_env.sh         # Environment descriptor
//! ├── blueprint.json        # Passthrough files, under their logical names
//! ├── dockerinfo.json
//! ├── solution.yml
//! └── dataBroker.json
//! ```
//!
//! Single-model bundles carry only the generated manifest and the descriptor.

use std::io::{Cursor, Read};
use std::path::Path;
use zip::ZipArchive;

use crate::env::EnvironmentAggregator;
use crate::error::{BundleError, Result};
use crate::loader::ResourceLoader;
use crate::manifest::ManifestComposer;
use crate::params::ParameterSet;
use crate::writer::BundleWriter;

/// Archive entry holding the generated manifest
pub const MANIFEST_ENTRY: &str = "deployments/solution.yml";

/// Archive entry holding the environment descriptor
pub const ENVIRONMENT_ENTRY: &str = "deploy_env.sh";

/// A passthrough file loaded from the solution folder
struct Passthrough {
    name: String,
    content: Vec<u8>,
}

/// Produces deployment archives from parameters
pub struct BundleAssembler<L, W> {
    loader: L,
    writer: W,
    composer: ManifestComposer,
    aggregator: EnvironmentAggregator,
}

impl<L: ResourceLoader, W: BundleWriter> BundleAssembler<L, W> {
    pub fn new(loader: L, writer: W) -> Self {
        Self {
            loader,
            writer,
            composer: ManifestComposer::new(),
            aggregator: EnvironmentAggregator::new(),
        }
    }

    pub fn composer(&self) -> &ManifestComposer {
        &self.composer
    }

    pub fn aggregator(&self) -> &EnvironmentAggregator {
        &self.aggregator
    }

    /// Build the composite bundle for `parameters`
    ///
    /// The blueprint, docker info, solution yml and data broker files are read
    /// from the parameters' folder. The manifest is always regenerated from the
    /// blueprint rather than copied. Nothing is returned unless every entry was
    /// written.
    pub fn create_composite_bundle(&self, parameters: &ParameterSet) -> Result<Vec<u8>> {
        let folder = parameters
            .folder_path()
            .ok_or_else(|| BundleError::InvalidParameter("folder path is required".to_string()))?;

        let names = [
            ParameterSet::require(parameters.blueprint_json_name(), "blueprint json name")?,
            ParameterSet::require(parameters.docker_info_json_name(), "docker info json name")?,
            ParameterSet::require(parameters.solution_yml_name(), "solution yml name")?,
            ParameterSet::require(parameters.data_broker_json_name(), "data broker json name")?,
        ];
        let passthrough = self.load_passthrough(folder, &names)?;

        let blueprint_json = std::str::from_utf8(&passthrough[0].content).map_err(|_| {
            BundleError::ManifestComposition(format!("{} is not valid UTF-8", passthrough[0].name))
        })?;
        let composed = self
            .composer
            .compose_composite_into(parameters.clone(), blueprint_json)?;
        let manifest = composed.generated_manifest().ok_or_else(|| {
            BundleError::ManifestComposition("composer produced no manifest".to_string())
        })?;
        let environment = self.aggregator.build_environment(&composed)?;

        let mut entries: Vec<(&str, &[u8])> = vec![
            (MANIFEST_ENTRY, manifest.as_bytes()),
            (ENVIRONMENT_ENTRY, environment.as_bytes()),
        ];
        entries.extend(passthrough.iter().map(|p| (p.name.as_str(), p.content.as_slice())));

        let bytes = self.write_archive(&entries)?;
        tracing::info!(
            "Created composite bundle from {:?}: {} entries, {} bytes",
            folder,
            entries.len(),
            bytes.len()
        );
        Ok(bytes)
    }

    /// Build a bundle for one model image exposed on `port`
    pub fn create_single_bundle(&self, image: &str, port: &str, parameters: &ParameterSet) -> Result<Vec<u8>> {
        let manifest = self.composer.compose_single(image, port, parameters)?;
        let environment = self.aggregator.build_environment(parameters)?;

        let entries: [(&str, &[u8]); 2] = [
            (MANIFEST_ENTRY, manifest.as_bytes()),
            (ENVIRONMENT_ENTRY, environment.as_bytes()),
        ];
        let bytes = self.write_archive(&entries)?;
        tracing::info!("Created single bundle for {}: {} bytes", image, bytes.len());
        Ok(bytes)
    }

    fn load_passthrough(&self, folder: &Path, names: &[&str]) -> Result<Vec<Passthrough>> {
        names
            .iter()
            .map(|name| {
                Ok(Passthrough {
                    name: name.to_string(),
                    content: self.loader.load(folder, name)?,
                })
            })
            .collect()
    }

    fn write_archive(&self, entries: &[(&str, &[u8])]) -> Result<Vec<u8>> {
        let mut handle = self.writer.open()?;
        for (name, bytes) in entries {
            // An early return drops the handle and the partial archive with it.
            self.writer.add_entry(&mut handle, name, bytes)?;
        }
        self.writer.close(handle)
    }
}

/// Read one entry of a zip bundle as text
pub fn read_entry(bundle: &[u8], name: &str) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bundle))
        .map_err(|e| BundleError::ResourceNotFound(format!("not a readable bundle: {}", e)))?;
    let mut file = archive
        .by_name(name)
        .map_err(|_| BundleError::ResourceNotFound(format!("bundle has no entry {}", name)))?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| BundleError::ResourceNotFound(format!("failed to read {}: {}", name, e)))?;
    Ok(content)
}

/// Names of every entry in a zip bundle
pub fn entry_names(bundle: &[u8]) -> Result<Vec<String>> {
    let archive = ZipArchive::new(Cursor::new(bundle))
        .map_err(|e| BundleError::ResourceNotFound(format!("not a readable bundle: {}", e)))?;
    Ok(archive.file_names().map(String::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{parse_solution_revisions, COMMON_DATA_PASSWORD_KEY};
    use crate::loader::{FsResourceLoader, MemoryResourceLoader};
    use crate::params::SolutionRevisionMap;
    use crate::writer::ZipBundleWriter;

    const FOLDER: &str = "/solutions/demo";
    const BLUEPRINT: &str = r#"{
        "name": "demo",
        "probeIndicator": [{"value": "true"}],
        "nodes": [{"container_name": "classifier", "image": "repo/classifier:1"}]
    }"#;

    fn loader() -> MemoryResourceLoader {
        MemoryResourceLoader::new()
            .with(FOLDER, "blueprint.json", BLUEPRINT)
            .with(FOLDER, "dockerinfo.json", r#"{"docker_info_list": []}"#)
            .with(FOLDER, "solution.yml", "stale: manifest\n")
            .with(FOLDER, "dataBroker.json", r#"{"dataBrokerMap": {}}"#)
    }

    fn params() -> ParameterSet {
        let mut revisions = SolutionRevisionMap::new();
        revisions.insert_str("solution-id-x", "revision-id-x").unwrap();
        revisions.insert_str("solution-id-y", "revision-id-y").unwrap();

        ParameterSet::builder()
            .folder_path(FOLDER)
            .blueprint_json_name("blueprint.json")
            .docker_info_json_name("dockerinfo.json")
            .solution_yml_name("solution.yml")
            .data_broker_json_name("dataBroker.json")
            .common_data_password("password")
            .common_data_url("https://dataurl")
            .common_data_user("datauser")
            .probe_image("repo/probeImage:1")
            .probe_port("5006")
            .blueprint_image("repo/blueprintImage:1")
            .blueprint_port("8555")
            .increment_port("8557")
            .solution_revisions(revisions)
            .build()
    }

    #[test]
    fn test_composite_bundle_contents() {
        let assembler = BundleAssembler::new(loader(), ZipBundleWriter::new());
        let bytes = assembler.create_composite_bundle(&params()).unwrap();

        let mut names = entry_names(&bytes).unwrap();
        names.sort();
        assert_eq!(
            names,
            vec![
                "blueprint.json",
                "dataBroker.json",
                "deploy_env.sh",
                "deployments/solution.yml",
                "dockerinfo.json",
                "solution.yml",
            ]
        );
        assert_eq!(read_entry(&bytes, "solution.yml").unwrap(), "stale: manifest\n");
        assert_eq!(read_entry(&bytes, "blueprint.json").unwrap(), BLUEPRINT);
    }

    #[test]
    fn test_manifest_entry_matches_direct_composition() {
        let assembler = BundleAssembler::new(loader(), ZipBundleWriter::new());
        let bytes = assembler.create_composite_bundle(&params()).unwrap();

        let direct = ManifestComposer::new().compose_composite(&params(), BLUEPRINT).unwrap();
        assert_eq!(read_entry(&bytes, MANIFEST_ENTRY).unwrap(), direct);
    }

    #[test]
    fn test_environment_entry() {
        let assembler = BundleAssembler::new(loader(), ZipBundleWriter::new());
        let bytes = assembler.create_composite_bundle(&params()).unwrap();

        let env = read_entry(&bytes, ENVIRONMENT_ENTRY).unwrap();
        assert!(env.starts_with("SOLUTION_ID="));
        assert_eq!(&parse_solution_revisions(&env).unwrap(), params().solution_revisions());
        assert!(env.contains(&format!("{}=password", COMMON_DATA_PASSWORD_KEY)));
    }

    #[test]
    fn test_missing_passthrough_file() {
        let loader = MemoryResourceLoader::new().with(FOLDER, "blueprint.json", BLUEPRINT);
        let assembler = BundleAssembler::new(loader, ZipBundleWriter::new());
        let err = assembler.create_composite_bundle(&params()).unwrap_err();
        assert!(matches!(err, BundleError::ResourceNotFound(_)));
    }

    #[test]
    fn test_missing_folder_is_invalid_parameter() {
        let assembler = BundleAssembler::new(loader(), ZipBundleWriter::new());
        let params = ParameterSet::builder().blueprint_json_name("blueprint.json").build();
        assert!(matches!(
            assembler.create_composite_bundle(&params),
            Err(BundleError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_colliding_entry_names_fail_whole_bundle() {
        let loader = loader().with(FOLDER, ENVIRONMENT_ENTRY, "X=1");
        let params = ParameterSet::builder()
            .folder_path(FOLDER)
            .blueprint_json_name("blueprint.json")
            .docker_info_json_name("dockerinfo.json")
            .solution_yml_name(ENVIRONMENT_ENTRY)
            .data_broker_json_name("dataBroker.json")
            .probe_image("repo/probeImage:1")
            .probe_port("5006")
            .blueprint_image("repo/blueprintImage:1")
            .blueprint_port("8555")
            .increment_port("8557")
            .build();
        let assembler = BundleAssembler::new(loader, ZipBundleWriter::new());
        assert!(matches!(
            assembler.create_composite_bundle(&params),
            Err(BundleError::BundleWrite(_))
        ));
    }

    #[test]
    fn test_composite_bundle_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blueprint.json"), BLUEPRINT).unwrap();
        std::fs::write(dir.path().join("dockerinfo.json"), "{}").unwrap();
        std::fs::write(dir.path().join("solution.yml"), "").unwrap();
        std::fs::write(dir.path().join("dataBroker.json"), "{}").unwrap();

        let params = ParameterSet::builder()
            .folder_path(dir.path())
            .blueprint_json_name("blueprint.json")
            .docker_info_json_name("dockerinfo.json")
            .solution_yml_name("solution.yml")
            .data_broker_json_name("dataBroker.json")
            .probe_image("repo/probeImage:1")
            .probe_port("5006")
            .blueprint_image("repo/blueprintImage:1")
            .blueprint_port("8555")
            .increment_port("8557")
            .build();

        let assembler = BundleAssembler::new(FsResourceLoader::new(), ZipBundleWriter::new());
        let bytes = assembler.create_composite_bundle(&params).unwrap();
        assert!(read_entry(&bytes, MANIFEST_ENTRY).unwrap().contains("repo/probeImage:1"));
    }

    #[test]
    fn test_single_bundle() {
        let params = ParameterSet::builder()
            .single_model_port("8556")
            .single_target_port("3330")
            .proxy_host("http://host")
            .proxy_port("4243")
            .build();
        let assembler = BundleAssembler::new(MemoryResourceLoader::new(), ZipBundleWriter::new());
        let bytes = assembler.create_single_bundle("repo/image:1", "30333", &params).unwrap();

        let direct = ManifestComposer::new().compose_single("repo/image:1", "30333", &params).unwrap();
        assert_eq!(read_entry(&bytes, MANIFEST_ENTRY).unwrap(), direct);
        assert_eq!(read_entry(&bytes, ENVIRONMENT_ENTRY).unwrap(), "SOLUTION_ID=\nSOL_REVISION_ID=\n");
    }

    #[test]
    fn test_read_entry_errors() {
        assert!(matches!(read_entry(b"not a zip", "x"), Err(BundleError::ResourceNotFound(_))));

        let writer = ZipBundleWriter::new();
        let bytes = writer.close(writer.open().unwrap()).unwrap();
        assert!(matches!(read_entry(&bytes, MANIFEST_ENTRY), Err(BundleError::ResourceNotFound(_))));
    }
}
