//! In-memory versioned config store for use in testing other modules.
//!
//! Mimics the decisions Ambari makes: every submit appends a new version with the next number,
//! and reading a config type that was never created is an error.

use crate::config_store::{Attributes, ConfigStore, ConfigVersion, Properties};
use crate::{error, Result};
use snafu::OptionExt;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub config: ConfigVersion,
    pub note: String,
}

#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    // (cluster, config type) -> append-only history
    history: RefCell<HashMap<(String, String), Vec<Revision>>>,
    // Config types whose reads fail.
    unreadable: RefCell<HashSet<String>>,
    // Config types whose next submit is rejected.
    conflicts: RefCell<HashSet<String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a new version of `config_type` holding exactly `properties`.
    pub fn seed(&self, cluster: &str, config_type: &str, properties: Properties) {
        self.append(cluster, config_type, properties, Attributes::new(), "seed");
    }

    /// Creates a new version of `config_type` that keeps the current properties and replaces the
    /// attributes.
    pub fn set_attributes(&self, cluster: &str, config_type: &str, attributes: Attributes) {
        let properties = self
            .latest(cluster, config_type)
            .map(|c| c.properties)
            .unwrap_or_default();
        self.append(cluster, config_type, properties, attributes, "seed");
    }

    /// Makes every read of `config_type` fail, as if the service's config couldn't be fetched.
    pub fn fail_reads(&self, config_type: &str) {
        self.unreadable.borrow_mut().insert(config_type.to_string());
    }

    /// Rejects the next submit to `config_type`, as if another writer got there first.
    pub fn reject_next_write(&self, config_type: &str) {
        self.conflicts.borrow_mut().insert(config_type.to_string());
    }

    pub fn latest(&self, cluster: &str, config_type: &str) -> Option<ConfigVersion> {
        self.revisions(cluster, config_type)
            .pop()
            .map(|revision| revision.config)
    }

    pub fn revisions(&self, cluster: &str, config_type: &str) -> Vec<Revision> {
        self.history
            .borrow()
            .get(&(cluster.to_string(), config_type.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn append(
        &self,
        cluster: &str,
        config_type: &str,
        properties: Properties,
        attributes: Attributes,
        note: &str,
    ) {
        let mut history = self.history.borrow_mut();
        let revisions = history
            .entry((cluster.to_string(), config_type.to_string()))
            .or_default();
        let version = revisions.last().map_or(1, |r| r.config.version + 1);
        revisions.push(Revision {
            config: ConfigVersion {
                properties,
                attributes,
                version,
            },
            note: note.to_string(),
        });
    }
}

impl ConfigStore for MemoryConfigStore {
    fn read(&self, cluster: &str, config_type: &str) -> Result<ConfigVersion> {
        if self.unreadable.borrow().contains(config_type) {
            return error::RejectedSnafu {
                config_type,
                reason: "read failure injected",
            }
            .fail();
        }
        self.latest(cluster, config_type)
            .context(error::MissingDesiredConfigSnafu {
                cluster,
                config_type,
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
        if self.conflicts.borrow_mut().remove(config_type) {
            return error::RejectedSnafu {
                config_type,
                reason: "a newer version was written concurrently",
            }
            .fail();
        }
        self.append(cluster, config_type, properties, attributes, note);
        Ok(())
    }
}
