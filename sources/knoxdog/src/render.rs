//! Renders topology variables into a Knox topology descriptor, and moves the descriptor from the
//! local artifact to Ambari.

use crate::error::{self, Result};
use crate::topology::TopologyVariables;
use ambariclient::{set_properties, ConfigStore, Properties};
use handlebars::Handlebars;
use log::{debug, info};
use snafu::ResultExt;
use std::fs;
use std::path::{Path, PathBuf};

pub const TOPOLOGY_TEMPLATE: &str = "topology";
const DEFAULT_TOPOLOGY_TEMPLATE: &str = include_str!("../templates/topology.xml.hbs");

pub const TOPOLOGY_CONFIG_TYPE: &str = "topology";
const TOPOLOGY_CONTENT: &str = "content";

/// Builds the registry holding the topology template, read from `template_path` if given.
pub fn build_registry(template_path: Option<&Path>) -> Result<Handlebars<'static>> {
    let mut registry = Handlebars::new();
    // Strict mode fails rendering when the template names a variable the assembler doesn't
    // provide
    registry.set_strict_mode(true);

    match template_path {
        Some(path) => {
            debug!("Registering topology template from {}", path.display());
            registry
                .register_template_file(TOPOLOGY_TEMPLATE, path)
                .context(error::TemplateRegisterSnafu {
                    name: TOPOLOGY_TEMPLATE,
                    path,
                })?;
        }
        None => {
            registry
                .register_template_string(TOPOLOGY_TEMPLATE, DEFAULT_TOPOLOGY_TEMPLATE)
                .context(error::TemplateParseSnafu {
                    name: TOPOLOGY_TEMPLATE,
                })?;
        }
    }

    Ok(registry)
}

pub fn render_topology(
    registry: &Handlebars<'_>,
    variables: &TopologyVariables,
) -> Result<String> {
    registry
        .render(TOPOLOGY_TEMPLATE, variables)
        .context(error::TemplateRenderSnafu {
            name: TOPOLOGY_TEMPLATE,
        })
}

/// The rendered descriptor on local disk, between rendering and publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyArtifact {
    path: PathBuf,
}

impl TopologyArtifact {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `rendered` to the artifact path, creating parent directories as needed.
    pub fn write(&self, rendered: &str) -> Result<()> {
        if let Some(dirname) = self.path.parent() {
            fs::create_dir_all(dirname).context(error::TopologyWriteSnafu {
                path: dirname,
                pathtype: "directory",
            })?;
        };

        fs::write(&self.path, rendered.as_bytes()).context(error::TopologyWriteSnafu {
            path: &self.path,
            pathtype: "file",
        })
    }

    pub fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path).context(error::TopologyReadSnafu { path: &self.path })
    }
}

/// Publishes whatever the artifact currently holds as the `content` of the topology config type.
pub fn publish_topology(
    artifact: &TopologyArtifact,
    store: &dyn ConfigStore,
    cluster: &str,
    note: &str,
) -> Result<()> {
    let content = artifact.read()?;
    info!(
        "Publishing {} bytes from {} to '{}'",
        content.len(),
        artifact.path().display(),
        TOPOLOGY_CONFIG_TYPE
    );
    let mut changes = Properties::new();
    changes.insert(TOPOLOGY_CONTENT.to_string(), content);
    set_properties(store, cluster, TOPOLOGY_CONFIG_TYPE, note, &changes).context(
        error::ConfigTypeUpdateSnafu {
            config_type: TOPOLOGY_CONFIG_TYPE,
        },
    )
}
