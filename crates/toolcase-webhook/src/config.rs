use anyhow::{anyhow, Result};
use clap::ArgMatches;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::mutation::{DecisionContext, MutatorKind};

pub const TOOLS_MOUNT_PATH: &str = "/tools";
pub const TOOL_VOLUME_NAME: &str = "tool-volume";
pub const DEFAULT_INIT_CONTAINER_NAME: &str = "tool";
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "IfNotPresent";
pub const DEFAULT_SHELL: [&str; 2] = ["/bin/sh", "-c"];

lazy_static! {
    pub(crate) static ref HOSTNAME: String =
        std::env::var("HOSTNAME").unwrap_or_else(|_| String::from("unknown"));
}

pub struct Config {
    pub addr: SocketAddr,
    pub tls_config: TlsConfig,
    pub mutators: BTreeSet<MutatorKind>,
    pub tool_registry: ToolRegistry,
    pub init_container: InitContainerTemplate,
    pub tool_annotation_prefix: String,
    pub node_allocatable_cpu: String,
    pub log_level: String,
    pub log_fmt: String,
    pub log_no_color: bool,
}

pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl Config {
    pub fn from_args(matches: &ArgMatches) -> Result<Self> {
        let addr = api_bind_address(matches)?;
        let tls_config = tls_files(matches)?;

        let mutators = matches
            .get_many::<String>("mutators")
            .map(|values| {
                values
                    .map(|v| v.parse::<MutatorKind>())
                    .collect::<Result<BTreeSet<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        // The registry is needed only by the Pod mutator, don't require the
        // file to be around otherwise
        let tool_registry = if mutators.contains(&MutatorKind::PodTools) {
            let path = Path::new(
                matches
                    .get_one::<String>("tool-config")
                    .expect("This should not happen, there's a default value for tool-config"),
            );
            read_tool_registry_file(path).map_err(|e| {
                anyhow!("error while loading the tool registry from {:?}: {}", path, e)
            })?
        } else {
            ToolRegistry::default()
        };

        let init_container_path = Path::new(
            matches
                .get_one::<String>("init-container-config")
                .expect("This should not happen, there's a default value for init-container-config"),
        );
        let init_container = read_init_container_template(init_container_path).map_err(|e| {
            anyhow!(
                "error while loading the init container template from {:?}: {}",
                init_container_path,
                e
            )
        })?;

        let tool_annotation_prefix = matches
            .get_one::<String>("tool-annotation-prefix")
            .expect("This should not happen, there's a default value for tool-annotation-prefix")
            .to_owned();
        if tool_annotation_prefix.is_empty() || tool_annotation_prefix.contains('/') {
            return Err(anyhow!(
                "error parsing arguments: the tool annotation prefix must be a non empty string without '/'"
            ));
        }
        let node_allocatable_cpu = matches
            .get_one::<String>("node-allocatable-cpu")
            .expect("This should not happen, there's a default value for node-allocatable-cpu")
            .to_owned();

        let log_level = matches
            .get_one::<String>("log-level")
            .expect("This should not happen, there's a default value for log-level")
            .to_owned();
        let log_fmt = matches
            .get_one::<String>("log-fmt")
            .expect("This should not happen, there's a default value for log-fmt")
            .to_owned();
        let log_no_color = matches
            .get_one::<bool>("log-no-color")
            .expect("clap should have assigned a default value")
            .to_owned();

        Ok(Self {
            addr,
            tls_config,
            mutators,
            tool_registry,
            init_container,
            tool_annotation_prefix,
            node_allocatable_cpu,
            log_level,
            log_fmt,
            log_no_color,
        })
    }

    /// The read-only data handed to the mutators.
    pub fn decision_context(&self) -> DecisionContext {
        DecisionContext {
            tool_registry: self.tool_registry.clone(),
            init_container: self.init_container.clone(),
            tool_annotation_prefix: self.tool_annotation_prefix.clone(),
            node_allocatable_cpu: self.node_allocatable_cpu.clone(),
        }
    }
}

fn api_bind_address(matches: &clap::ArgMatches) -> Result<SocketAddr> {
    format!(
        "{}:{}",
        matches.get_one::<String>("address").unwrap(),
        matches.get_one::<String>("port").unwrap()
    )
    .parse()
    .map_err(|e| anyhow!("error parsing arguments: {}", e))
}

fn tls_files(matches: &clap::ArgMatches) -> Result<TlsConfig> {
    let cert_file = matches.get_one::<String>("cert-file").unwrap().to_owned();
    let key_file = matches.get_one::<String>("key-file").unwrap().to_owned();
    if cert_file.is_empty() || key_file.is_empty() {
        Err(anyhow!(
            "error parsing arguments: both --cert-file and --key-file must be provided"
        ))
    } else {
        Ok(TlsConfig {
            cert_file: PathBuf::from(cert_file),
            key_file: PathBuf::from(key_file),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    pub name: String,
    pub path: String,
}

/// The tools that can be injected, indexed by name, and the image shipping
/// them.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(from = "ToolConfigFile")]
pub struct ToolRegistry {
    image: String,
    tools: BTreeMap<String, Tool>,
}

#[derive(Deserialize)]
struct ToolConfigFile {
    #[serde(default)]
    image: String,
    #[serde(default)]
    tools: Vec<Tool>,
}

impl From<ToolConfigFile> for ToolRegistry {
    fn from(file: ToolConfigFile) -> Self {
        ToolRegistry::new(file.image, file.tools)
    }
}

impl ToolRegistry {
    /// When the same name is listed more than once, the last entry wins.
    pub fn new(image: String, tools: Vec<Tool>) -> Self {
        let tools = tools
            .into_iter()
            .map(|tool| (tool.name.clone(), tool))
            .collect();
        ToolRegistry { image, tools }
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Reads the tool registry file:
/// `{"image": "...", "tools": [{"name": "...", "path": "..."}]}`
pub fn read_tool_registry_file(path: &Path) -> Result<ToolRegistry> {
    let file = File::open(path)?;
    let registry: ToolRegistry = serde_json::from_reader(BufReader::new(file))?;
    Ok(registry)
}

/// Describes the init container injected into the Pods, together with the
/// volume it shares with the application container.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct InitContainerTemplate {
    pub volume_mount: VolumeMountTemplate,
    pub container: ContainerTemplate,
    pub volume: VolumeTemplate,
}

/// Both containers mount the shared volume at [`TOOLS_MOUNT_PATH`], under the
/// name of the volume. `Name` and `MountPath` keys are accepted and ignored.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct VolumeMountTemplate {
    /// Applies to the mount of the application container. The init container
    /// always mounts the volume read-write, it has to copy the tools into it.
    pub read_only: bool,
}

impl Default for VolumeMountTemplate {
    fn default() -> Self {
        VolumeMountTemplate { read_only: true }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerTemplate {
    pub name: String,
    /// Used only when the tool registry doesn't define an image.
    pub image: Option<String>,
    /// Shell the copy command is handed to.
    pub command: Vec<String>,
    pub image_pull_policy: String,
}

impl Default for ContainerTemplate {
    fn default() -> Self {
        ContainerTemplate {
            name: DEFAULT_INIT_CONTAINER_NAME.to_owned(),
            image: None,
            command: DEFAULT_SHELL.iter().map(|s| s.to_string()).collect(),
            image_pull_policy: DEFAULT_IMAGE_PULL_POLICY.to_owned(),
        }
    }
}

impl ContainerTemplate {
    pub fn shell(&self) -> Vec<String> {
        if self.command.is_empty() {
            DEFAULT_SHELL.iter().map(|s| s.to_string()).collect()
        } else {
            self.command.clone()
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct VolumeTemplate {
    pub name: String,
}

impl Default for VolumeTemplate {
    fn default() -> Self {
        VolumeTemplate {
            name: TOOL_VOLUME_NAME.to_owned(),
        }
    }
}

/// Reads the init container template. A missing file is not an error, the
/// built-in defaults are used instead.
pub fn read_init_container_template(path: &Path) -> Result<InitContainerTemplate> {
    if !path.exists() {
        return Ok(InitContainerTemplate::default());
    }
    let file = File::open(path)?;
    let template: InitContainerTemplate = serde_json::from_reader(BufReader::new(file))?;
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp_file(contents: &str) -> tempfile::TempPath {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file.into_temp_path()
    }

    #[test]
    fn parse_tool_registry() {
        let input = r#"
{
    "image": "registry.example.com/tools:1.0",
    "tools": [
        {"name": "arthas", "path": "/opt/arthas"},
        {"name": "busybox", "path": "/bin/busybox"}
    ]
}
"#;
        let registry: ToolRegistry = serde_json::from_str(input).unwrap();
        assert_eq!(registry.image(), "registry.example.com/tools:1.0");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("arthas").unwrap().path, "/opt/arthas");
        assert!(registry.get("gdb").is_none());
    }

    #[test]
    fn last_duplicated_tool_wins() {
        let input = r#"
{
    "image": "tools",
    "tools": [
        {"name": "arthas", "path": "/old"},
        {"name": "arthas", "path": "/new"}
    ]
}
"#;
        let registry: ToolRegistry = serde_json::from_str(input).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("arthas").unwrap().path, "/new");
    }

    #[test]
    fn empty_tool_registry() {
        let registry: ToolRegistry = serde_json::from_str("{}").unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.image(), "");
    }

    #[test]
    fn malformed_tool_registry_file() {
        let path = write_temp_file(r#"{"tools": "nope"}"#);
        assert!(read_tool_registry_file(&path).is_err());
    }

    #[test]
    fn parse_init_container_template() {
        let input = r#"
{
    "VolumeMount": {"Name": "ignored", "ReadOnly": false, "MountPath": "/ignored"},
    "Container": {"Name": "copy-tools", "ImagePullPolicy": "Always"},
    "Volume": {"Name": "shared"}
}
"#;
        let template: InitContainerTemplate = serde_json::from_str(input).unwrap();
        assert!(!template.volume_mount.read_only);
        assert_eq!(template.container.name, "copy-tools");
        assert_eq!(template.container.image_pull_policy, "Always");
        assert_eq!(template.container.shell(), vec!["/bin/sh", "-c"]);
        assert_eq!(template.volume.name, "shared");
    }

    #[test]
    fn partial_init_container_template_uses_defaults() {
        let template: InitContainerTemplate =
            serde_json::from_str(r#"{"Container": {"Command": []}}"#).unwrap();
        assert_eq!(template.container.name, DEFAULT_INIT_CONTAINER_NAME);
        assert_eq!(template.container.shell(), vec!["/bin/sh", "-c"]);
        assert_eq!(template.volume_mount, VolumeMountTemplate::default());
        assert_eq!(template.volume, VolumeTemplate::default());
    }

    #[test]
    fn missing_init_container_template_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let template =
            read_init_container_template(&dir.path().join("initContainerConfig.json")).unwrap();
        assert_eq!(template, InitContainerTemplate::default());
    }

    #[test]
    fn config_from_args() {
        let tool_config = write_temp_file(
            r#"{"image": "tools:1.0", "tools": [{"name": "arthas", "path": "/opt/arthas"}]}"#,
        );
        let tool_config_flag = format!("--tool-config={}", tool_config.to_str().unwrap());

        let matches = cli::build_cli()
            .try_get_matches_from([
                "toolcase-webhook",
                &tool_config_flag,
                "--init-container-config=/does/not/exist.json",
                "--mutators=pod-tools,node-cpu",
                "--port=9443",
                "--node-allocatable-cpu=16",
            ])
            .unwrap();
        let config = Config::from_args(&matches).unwrap();

        assert_eq!(config.addr, "0.0.0.0:9443".parse::<SocketAddr>().unwrap());
        assert_eq!(
            config.mutators,
            BTreeSet::from([MutatorKind::PodTools, MutatorKind::NodeCpu])
        );
        assert_eq!(config.tool_registry.image(), "tools:1.0");
        assert_eq!(config.init_container, InitContainerTemplate::default());
        assert_eq!(
            config.tls_config.cert_file,
            PathBuf::from("/run/secrets/tls/cert.pem")
        );

        let context = config.decision_context();
        assert_eq!(context.node_allocatable_cpu, "16");
        assert_eq!(context.tool_annotation_prefix, "webhook.citiccard.com");
        assert!(context.tool_registry.get("arthas").is_some());
    }

    #[test]
    fn tool_registry_is_required_by_the_pod_mutator() {
        let matches = cli::build_cli()
            .try_get_matches_from([
                "toolcase-webhook",
                "--tool-config=/does/not/exist.json",
                "--mutators=pod-tools",
            ])
            .unwrap();
        assert!(Config::from_args(&matches).is_err());
    }

    #[test]
    fn tool_registry_is_not_required_by_the_node_mutator() {
        let matches = cli::build_cli()
            .try_get_matches_from([
                "toolcase-webhook",
                "--tool-config=/does/not/exist.json",
                "--init-container-config=/does/not/exist.json",
                "--mutators=node-cpu",
            ])
            .unwrap();
        let config = Config::from_args(&matches).unwrap();
        assert!(config.tool_registry.is_empty());
        assert_eq!(config.mutators, BTreeSet::from([MutatorKind::NodeCpu]));
    }

    #[test]
    fn unknown_mutator_is_rejected() {
        let result =
            cli::build_cli().try_get_matches_from(["toolcase-webhook", "--mutators=deployments"]);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_annotation_prefix_is_rejected() {
        let matches = cli::build_cli()
            .try_get_matches_from([
                "toolcase-webhook",
                "--mutators=node-cpu",
                "--tool-annotation-prefix=example.com/tools",
            ])
            .unwrap();
        assert!(Config::from_args(&matches).is_err());
    }

    #[test]
    fn boolean_flags() {
        let matches = cli::build_cli()
            .try_get_matches_from(["toolcase-webhook", "--mutators=node-cpu", "--log-no-color"])
            .unwrap();
        let config = Config::from_args(&matches).unwrap();
        assert!(config.log_no_color);
    }
}
