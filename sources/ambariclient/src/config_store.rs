//! Read-modify-write access to Ambari's versioned configuration types.
//!
//! Each config type (e.g. `core-site`) has a history of versions owned by Ambari. Writing a new
//! set of properties creates a new version; the version number is always assigned by the store.

use crate::{error, AmbariClient, Result, CLUSTERS_PATH};
use log::{debug, info};
use serde::Deserialize;
use serde_json::json;
use snafu::OptionExt;
use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

pub type Properties = BTreeMap<String, String>;
/// Per-attribute maps of property name to attribute value, e.g. `final` -> {`fs.defaultFS` -> `true`}.
pub type Attributes = BTreeMap<String, BTreeMap<String, String>>;

/// One config type's state at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigVersion {
    pub properties: Properties,
    pub attributes: Attributes,
    pub version: u64,
}

/// A store of versioned configuration, keyed by (cluster, config type).
pub trait ConfigStore {
    /// Returns the current version of `config_type`.
    fn read(&self, cluster: &str, config_type: &str) -> Result<ConfigVersion>;

    /// Submits a complete new set of properties and attributes for `config_type`, recorded with
    /// the audit `note`.
    fn submit(
        &self,
        cluster: &str,
        config_type: &str,
        properties: Properties,
        attributes: Attributes,
        note: &str,
    ) -> Result<()>;
}

/// Reads the current version of `config_type`, passes it through `updater`, and submits the
/// result. This is one read and one write; there's no lock across them.
pub fn update_config<F>(
    store: &dyn ConfigStore,
    cluster: &str,
    config_type: &str,
    note: &str,
    updater: F,
) -> Result<()>
where
    F: FnOnce(Properties, Attributes) -> (Properties, Attributes),
{
    let current = store.read(cluster, config_type)?;
    debug!(
        "Updating '{}' from version {} in cluster '{}'",
        config_type, current.version, cluster
    );
    let (properties, attributes) = updater(current.properties, current.attributes);
    store.submit(cluster, config_type, properties, attributes, note)
}

/// Merges `changes` into `config_type`. Keys not named in `changes` are kept as they are.
pub fn set_properties(
    store: &dyn ConfigStore,
    cluster: &str,
    config_type: &str,
    note: &str,
    changes: &Properties,
) -> Result<()> {
    update_config(store, cluster, config_type, note, |mut properties, attributes| {
        for (key, value) in changes {
            properties.insert(key.clone(), value.clone());
        }
        (properties, attributes)
    })
}

#[derive(Debug, Deserialize)]
struct DesiredConfigsResponse {
    #[serde(rename = "Clusters")]
    clusters: DesiredConfigs,
}

#[derive(Debug, Deserialize)]
struct DesiredConfigs {
    #[serde(default)]
    desired_configs: HashMap<String, DesiredConfig>,
}

#[derive(Debug, Deserialize)]
struct DesiredConfig {
    tag: String,
}

#[derive(Debug, Deserialize)]
struct ConfigurationsResponse {
    #[serde(default)]
    items: Vec<ConfigurationItem>,
}

#[derive(Debug, Deserialize)]
struct ConfigurationItem {
    #[serde(default)]
    version: u64,
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    properties_attributes: Attributes,
}

impl ConfigStore for AmbariClient {
    fn read(&self, cluster: &str, config_type: &str) -> Result<ConfigVersion> {
        let cluster_uri = format!("{}/{}/{}", self.base_uri, CLUSTERS_PATH, cluster);
        let desired: DesiredConfigsResponse =
            self.get_json(&cluster_uri, &[("fields", "Clusters/desired_configs")])?;
        let tag = desired
            .clusters
            .desired_configs
            .get(config_type)
            .context(error::MissingDesiredConfigSnafu {
                cluster,
                config_type,
            })?
            .tag
            .clone();

        let configurations_uri = format!("{}/configurations", cluster_uri);
        let configurations: ConfigurationsResponse = self.get_json(
            &configurations_uri,
            &[("type", config_type), ("tag", tag.as_str())],
        )?;
        let item = configurations
            .items
            .into_iter()
            .next()
            .context(error::MissingConfigurationSnafu { config_type, tag })?;
        Ok(ConfigVersion {
            properties: item.properties,
            attributes: item.properties_attributes,
            version: item.version,
        })
    }

    fn submit(
        &self,
        cluster: &str,
        config_type: &str,
        properties: Properties,
        attributes: Attributes,
        note: &str,
    ) -> Result<()> {
        let cluster_uri = format!("{}/{}/{}", self.base_uri, CLUSTERS_PATH, cluster);
        let body = json!({
            "Clusters": {
                "desired_config": [{
                    "type": config_type,
                    "tag": new_tag(),
                    "properties": properties,
                    "properties_attributes": attributes,
                    "service_config_version_note": note,
                }]
            }
        });
        self.put_json(&cluster_uri, &body)?;
        info!("Submitted new '{}' config to cluster '{}'", config_type, cluster);
        Ok(())
    }
}

/// Ambari requires a unique tag per submitted version; it's a label, not the version number.
fn new_tag() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("version{}", millis)
}
