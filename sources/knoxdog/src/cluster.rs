use crate::config::Config;
use crate::error::{self, Result};
use ambariclient::{AmbariClient, ServicePresence};
use log::info;
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeSet;

/// The questions knoxdog asks about a cluster's live state.
pub trait ClusterApi {
    /// Whether `service` is installed.
    fn service_presence(&self, service: &str) -> Result<ServicePresence>;

    /// Every host in the cluster.
    fn cluster_hosts(&self) -> Result<BTreeSet<String>>;

    /// The first host running `component`, if any.
    fn host_for_component(&self, component: &str) -> Result<Option<String>>;
}

/// A `ClusterApi` backed by the Ambari REST API.
pub struct AmbariCluster<'a> {
    client: &'a AmbariClient,
    cluster: String,
}

impl<'a> AmbariCluster<'a> {
    pub fn new<S: Into<String>>(client: &'a AmbariClient, cluster: S) -> Self {
        Self {
            client,
            cluster: cluster.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.cluster
    }
}

impl ClusterApi for AmbariCluster<'_> {
    fn service_presence(&self, service: &str) -> Result<ServicePresence> {
        self.client
            .fetch_service_presence(&self.cluster, service)
            .context(error::PresenceCheckSnafu { service })
    }

    fn cluster_hosts(&self) -> Result<BTreeSet<String>> {
        self.client
            .fetch_cluster_hosts(&self.cluster)
            .context(error::ListHostsSnafu)
    }

    fn host_for_component(&self, component: &str) -> Result<Option<String>> {
        self.client
            .fetch_host_for_component(&self.cluster, component)
            .context(error::ComponentHostSnafu { component })
    }
}

/// Creates a client for the configured Ambari server.
pub fn connect(config: &Config) -> Result<AmbariClient> {
    let ambari = &config.ambari;
    AmbariClient::new(ambari.base_uri(), &ambari.username, &ambari.password)
        .context(error::AmbariClientSnafu)
}

/// Uses the configured cluster name, or asks Ambari for the first cluster it manages.
pub fn resolve_cluster_name(config: &Config, client: &AmbariClient) -> Result<String> {
    if let Some(name) = &config.ambari.cluster_name {
        return Ok(name.clone());
    }
    let name = client
        .fetch_cluster_name()
        .context(error::NoClusterNameSnafu {
            uri: client.base_uri(),
        })?;
    info!("Discovered cluster '{}'", name);
    Ok(name)
}

#[cfg(test)]
mod test {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};

    #[test]
    fn configured_cluster_name_wins() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/v1/clusters"))
                .times(0)
                .respond_with(status_code(200)),
        );
        let mut config = Config::default();
        config.ambari.cluster_name = Some("configured".to_string());
        let client = AmbariClient::new(format!("http://{}", server.addr()), "a", "b").unwrap();
        assert_eq!(
            resolve_cluster_name(&config, &client).unwrap(),
            "configured"
        );
    }

    #[test]
    fn discovered_cluster_name() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/v1/clusters"))
                .times(1)
                .respond_with(
                    status_code(200).body(r#"{"items":[{"Clusters":{"cluster_name":"found"}}]}"#),
                ),
        );
        let client = AmbariClient::new(format!("http://{}", server.addr()), "a", "b").unwrap();
        assert_eq!(
            resolve_cluster_name(&Config::default(), &client).unwrap(),
            "found"
        );
    }

    #[test]
    fn connect_ipv6_host() {
        let mut config = Config::default();
        config.ambari.host = "::1".to_string();
        let client = connect(&config).unwrap();
        assert_eq!(client.base_uri(), "http://[::1]:8080");
    }

    #[test]
    fn no_cluster_name() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/v1/clusters"))
                .times(1)
                .respond_with(status_code(401)),
        );
        let client = AmbariClient::new(format!("http://{}", server.addr()), "a", "b").unwrap();
        assert!(matches!(
            resolve_cluster_name(&Config::default(), &client),
            Err(crate::error::Error::NoClusterName { .. })
        ));
    }
}
