/*!
Assembles the variables that describe where each service behind the gateway lives.

Ambari's own endpoint comes from the knoxdog config and is always present. Everything else is
discovered from the cluster, one subsystem at a time:

* HDFS NameNode (`hdfs-site`, live `NAMENODE` host), and the default filesystem (`core-site`)
* Ranger (`admin-properties`)
* Infra Solr (`infra-solr-env`, live `INFRA_SOLR` host)
* YARN log server (`yarn-site`)

A subsystem that can't be read is left out and its availability flag is false. That's the
normal state of most clusters, so it never fails assembly as a whole.
*/

use crate::cluster::ClusterApi;
use crate::config::Config;
use crate::endpoint::{ClusterEndpoint, Protocol};
use crate::error::{self, Result};
use ambariclient::{ConfigStore, Properties};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;
use snafu::{OptionExt, ResultExt};
use url::Url;

const HDFS_SITE: &str = "hdfs-site";
const CORE_SITE: &str = "core-site";
const RANGER_ADMIN_PROPERTIES: &str = "admin-properties";
const INFRA_SOLR_ENV: &str = "infra-solr-env";
const YARN_SITE: &str = "yarn-site";

const NAMENODE_COMPONENT: &str = "NAMENODE";
const INFRA_SOLR_COMPONENT: &str = "INFRA_SOLR";

lazy_static! {
    // scheme://host[:port], anything after is ignored
    static ref URL_PREFIX: Regex = Regex::new(r"^(?P<scheme>[A-Za-z]+)://(?P<host>[^:/?#]+)(?::(?P<port>[0-9]+))?").unwrap();
}

/// Which optional subsystems were found. A flag is true exactly when its endpoint is present,
/// even if that endpoint is only partially resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceAvailability {
    pub is_ranger_installed: bool,
    pub is_solr_installed: bool,
    pub is_yarn_installed: bool,
    pub is_namenode_ha: bool,
}

/// Everything the topology template is rendered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyVariables {
    cluster_name: String,
    ambari: ClusterEndpoint,
    namenode: ClusterEndpoint,
    nameservice: Option<String>,
    default_fs: Option<String>,
    ranger: Option<ClusterEndpoint>,
    solr: Option<ClusterEndpoint>,
    yarn_log_server: Option<ClusterEndpoint>,
    #[serde(flatten)]
    availability: ServiceAvailability,
}

impl TopologyVariables {
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn ambari(&self) -> &ClusterEndpoint {
        &self.ambari
    }

    pub fn namenode(&self) -> &ClusterEndpoint {
        &self.namenode
    }

    pub fn nameservice(&self) -> Option<&str> {
        self.nameservice.as_deref()
    }

    pub fn default_fs(&self) -> Option<&str> {
        self.default_fs.as_deref()
    }

    pub fn ranger(&self) -> Option<&ClusterEndpoint> {
        self.ranger.as_ref()
    }

    pub fn solr(&self) -> Option<&ClusterEndpoint> {
        self.solr.as_ref()
    }

    pub fn yarn_log_server(&self) -> Option<&ClusterEndpoint> {
        self.yarn_log_server.as_ref()
    }

    pub fn availability(&self) -> ServiceAvailability {
        self.availability
    }
}

struct NamenodeLookup {
    endpoint: ClusterEndpoint,
    nameservice: Option<String>,
}

pub struct TopologyAssembler<'a> {
    config: &'a Config,
    cluster_name: &'a str,
    cluster: &'a dyn ClusterApi,
    store: &'a dyn ConfigStore,
}

impl<'a> TopologyAssembler<'a> {
    pub fn new(
        config: &'a Config,
        cluster_name: &'a str,
        cluster: &'a dyn ClusterApi,
        store: &'a dyn ConfigStore,
    ) -> Self {
        Self {
            config,
            cluster_name,
            cluster,
            store,
        }
    }

    pub fn assemble(&self) -> TopologyVariables {
        let ambari = ClusterEndpoint::new(
            self.config.ambari.protocol,
            Some(self.config.ambari.host.clone()),
            Some(self.config.ambari.port.to_string()),
        );

        let namenode = self.namenode().unwrap_or_else(|e| {
            warn!("Unable to resolve the NameNode endpoint: {}", e);
            NamenodeLookup {
                endpoint: ClusterEndpoint::unresolved(Protocol::Http),
                nameservice: None,
            }
        });
        let default_fs = optional("default filesystem", self.default_fs());
        let ranger = optional("Ranger", self.ranger());
        let solr = optional("Infra Solr", self.solr());
        let yarn_log_server = optional("YARN log server", self.yarn_log_server());

        let availability = ServiceAvailability {
            is_ranger_installed: ranger.is_some(),
            is_solr_installed: solr.is_some(),
            is_yarn_installed: yarn_log_server.is_some(),
            is_namenode_ha: namenode.nameservice.is_some(),
        };
        info!("Assembled topology for '{}': {:?}", self.cluster_name, availability);

        TopologyVariables {
            cluster_name: self.cluster_name.to_string(),
            ambari,
            namenode: namenode.endpoint,
            nameservice: namenode.nameservice,
            default_fs,
            ranger,
            solr,
            yarn_log_server,
            availability,
        }
    }

    fn read_properties(&self, config_type: &str) -> Result<Properties> {
        self.store
            .read(self.cluster_name, config_type)
            .map(|config| config.properties)
            .context(error::ConfigTypeReadSnafu { config_type })
    }

    /// A failed live lookup is only logged; callers fall back to configured values.
    fn live_host(&self, component: &str) -> Option<String> {
        match self.cluster.host_for_component(component) {
            Ok(host) => host,
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    /// The NameNode web endpoint. The configured address may name an HA nameservice rather than
    /// a host, so the host comes from live role assignment when there is one, and the port
    /// always comes from config.
    fn namenode(&self) -> Result<NamenodeLookup> {
        let hdfs = self.read_properties(HDFS_SITE)?;
        let https_only = hdfs
            .get("dfs.http.policy")
            .map_or(false, |policy| policy.eq_ignore_ascii_case("HTTPS_ONLY"));
        let (protocol, key, legacy_key) = if https_only {
            (
                Protocol::Https,
                "dfs.namenode.https-address",
                "dfs.https.address",
            )
        } else {
            (
                Protocol::Http,
                "dfs.namenode.http-address",
                "dfs.http.address",
            )
        };

        let nameservice = hdfs
            .get("dfs.nameservices")
            .and_then(|services| services.split(',').next())
            .map(str::trim)
            .filter(|service| !service.is_empty())
            .map(str::to_string);

        let address = hdfs
            .get(key)
            .or_else(|| hdfs.get(legacy_key))
            .cloned()
            .or_else(|| {
                nameservice
                    .as_deref()
                    .and_then(|ns| ha_address(&hdfs, key, ns))
            });
        let configured = match address {
            Some(address) => ClusterEndpoint::from_address(protocol, &address),
            None => {
                warn!("No '{}' or '{}' in {}", key, legacy_key, HDFS_SITE);
                ClusterEndpoint::unresolved(protocol)
            }
        };
        debug!("Configured NameNode endpoint: {:?}", configured);

        let host = self.live_host(NAMENODE_COMPONENT).or(configured.host);
        Ok(NamenodeLookup {
            endpoint: ClusterEndpoint::new(protocol, host, configured.port),
            nameservice,
        })
    }

    fn default_fs(&self) -> Result<String> {
        let core = self.read_properties(CORE_SITE)?;
        core.get("fs.defaultFS")
            .cloned()
            .context(error::MissingPropertySnafu {
                config_type: CORE_SITE,
                property: "fs.defaultFS",
            })
    }

    /// Ranger's externally advertised URL. Reading the config is what decides availability; an
    /// unusable URL still counts as installed.
    fn ranger(&self) -> Result<ClusterEndpoint> {
        let admin = self.read_properties(RANGER_ADMIN_PROPERTIES)?;
        let endpoint = admin
            .get("policymgr_external_url")
            .and_then(|url| endpoint_from_url(url));
        Ok(endpoint.unwrap_or_else(|| {
            warn!(
                "Ranger is installed but 'policymgr_external_url' is missing or invalid in {}",
                RANGER_ADMIN_PROPERTIES
            );
            ClusterEndpoint::unresolved(Protocol::Http)
        }))
    }

    fn solr(&self) -> Result<ClusterEndpoint> {
        let env = self.read_properties(INFRA_SOLR_ENV)?;
        let protocol = if env
            .get("infra_solr_ssl_enabled")
            .map_or(false, |enabled| enabled.eq_ignore_ascii_case("true"))
        {
            Protocol::Https
        } else {
            Protocol::Http
        };
        let port = env.get("infra_solr_port").cloned();
        Ok(ClusterEndpoint::new(
            protocol,
            self.live_host(INFRA_SOLR_COMPONENT),
            port,
        ))
    }

    fn yarn_log_server(&self) -> Result<ClusterEndpoint> {
        let yarn = self.read_properties(YARN_SITE)?;
        let endpoint = yarn
            .get("yarn.log.server.url")
            .and_then(|url| endpoint_from_url_prefix(url));
        Ok(endpoint.unwrap_or_else(|| {
            warn!(
                "YARN is installed but 'yarn.log.server.url' is missing or invalid in {}",
                YARN_SITE
            );
            ClusterEndpoint::unresolved(Protocol::Http)
        }))
    }
}

fn optional<T>(subsystem: &str, lookup: Result<T>) -> Option<T> {
    match lookup {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} not available, leaving it out of the topology: {}", subsystem, e);
            None
        }
    }
}

/// In HA mode, the address of the first NameNode listed for `nameservice`.
fn ha_address(hdfs: &Properties, key: &str, nameservice: &str) -> Option<String> {
    let first_namenode = hdfs
        .get(&format!("dfs.ha.namenodes.{}", nameservice))?
        .split(',')
        .next()?
        .trim()
        .to_string();
    hdfs.get(&format!("{}.{}.{}", key, nameservice, first_namenode))
        .cloned()
}

fn endpoint_from_url(url: &str) -> Option<ClusterEndpoint> {
    let url = Url::parse(url.trim()).ok()?;
    let protocol = url.scheme().parse::<Protocol>().ok()?;
    Some(ClusterEndpoint::new(
        protocol,
        url.host_str().map(str::to_string),
        url.port_or_known_default().map(|port| port.to_string()),
    ))
}

fn endpoint_from_url_prefix(url: &str) -> Option<ClusterEndpoint> {
    let captures = URL_PREFIX.captures(url.trim())?;
    let protocol = captures["scheme"].parse::<Protocol>().ok()?;
    Some(ClusterEndpoint::new(
        protocol,
        Some(captures["host"].to_string()),
        captures.name("port").map(|port| port.as_str().to_string()),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;
    use ambariclient::memory::MemoryConfigStore;
    use ambariclient::ServicePresence;
    use maplit::{btreemap, hashmap};
    use std::collections::{BTreeSet, HashMap};

    struct MockCluster {
        components: HashMap<&'static str, &'static str>,
    }

    impl ClusterApi for MockCluster {
        fn service_presence(&self, _service: &str) -> Result<ServicePresence> {
            Ok(ServicePresence::Installed)
        }

        fn cluster_hosts(&self) -> Result<BTreeSet<String>> {
            Ok(BTreeSet::new())
        }

        fn host_for_component(&self, component: &str) -> Result<Option<String>> {
            if component == "BROKEN" {
                return Err(Error::InsufficientHosts);
            }
            Ok(self.components.get(component).map(|h| h.to_string()))
        }
    }

    fn mock_cluster() -> MockCluster {
        MockCluster {
            components: hashmap! {
                "NAMENODE" => "nn1.cluster.example.com",
                "INFRA_SOLR" => "solr1.cluster.example.com",
            },
        }
    }

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_store() -> MemoryConfigStore {
        let store = MemoryConfigStore::new();
        store.seed(
            "c1",
            HDFS_SITE,
            props(&[
                ("dfs.http.policy", "HTTPS_ONLY"),
                ("dfs.namenode.https-address", "nn-logical.example.com:9871"),
                ("dfs.namenode.http-address", "nn-logical.example.com:9870"),
            ]),
        );
        store.seed(
            "c1",
            CORE_SITE,
            props(&[("fs.defaultFS", "hdfs://nn1.cluster.example.com:8020")]),
        );
        store.seed(
            "c1",
            RANGER_ADMIN_PROPERTIES,
            props(&[(
                "policymgr_external_url",
                "https://ranger.cluster.example.com:6182",
            )]),
        );
        store.seed(
            "c1",
            INFRA_SOLR_ENV,
            props(&[
                ("infra_solr_ssl_enabled", "true"),
                ("infra_solr_port", "8886"),
            ]),
        );
        store.seed(
            "c1",
            YARN_SITE,
            props(&[(
                "yarn.log.server.url",
                "http://jhs.cluster.example.com:19888/jobhistory/logs",
            )]),
        );
        store
    }

    fn assemble(store: &MemoryConfigStore, cluster: &MockCluster) -> TopologyVariables {
        let config = Config::default();
        TopologyAssembler::new(&config, "c1", cluster, store).assemble()
    }

    #[test]
    fn all_subsystems() {
        let vars = assemble(&full_store(), &mock_cluster());
        assert_eq!(vars.cluster_name(), "c1");
        assert_eq!(
            vars.ambari().url().as_deref(),
            Some("http://localhost:8080")
        );
        assert_eq!(
            vars.namenode(),
            &ClusterEndpoint::new(
                Protocol::Https,
                Some("nn1.cluster.example.com".to_string()),
                Some("9871".to_string())
            )
        );
        assert_eq!(vars.default_fs(), Some("hdfs://nn1.cluster.example.com:8020"));
        assert_eq!(
            vars.ranger().and_then(|r| r.url()).as_deref(),
            Some("https://ranger.cluster.example.com:6182")
        );
        assert_eq!(
            vars.solr().and_then(|s| s.url()).as_deref(),
            Some("https://solr1.cluster.example.com:8886")
        );
        assert_eq!(
            vars.yarn_log_server().and_then(|y| y.url()).as_deref(),
            Some("http://jhs.cluster.example.com:19888")
        );
        assert_eq!(
            vars.availability(),
            ServiceAvailability {
                is_ranger_installed: true,
                is_solr_installed: true,
                is_yarn_installed: true,
                is_namenode_ha: false,
            }
        );
    }

    #[test]
    fn ranger_failure_is_isolated() {
        let cluster = mock_cluster();
        let healthy = assemble(&full_store(), &cluster);

        let store = full_store();
        store.fail_reads(RANGER_ADMIN_PROPERTIES);
        let vars = assemble(&store, &cluster);

        assert!(!vars.availability().is_ranger_installed);
        assert_eq!(vars.ranger(), None);
        assert_eq!(vars.namenode(), healthy.namenode());
        assert_eq!(vars.default_fs(), healthy.default_fs());
        assert_eq!(vars.solr(), healthy.solr());
        assert_eq!(vars.yarn_log_server(), healthy.yarn_log_server());
        assert!(vars.availability().is_solr_installed);
        assert!(vars.availability().is_yarn_installed);
    }

    #[test]
    fn nothing_optional_installed() {
        let store = MemoryConfigStore::new();
        store.seed(
            "c1",
            HDFS_SITE,
            props(&[("dfs.namenode.http-address", "nn1.cluster.example.com:50070")]),
        );
        let cluster = MockCluster {
            components: HashMap::new(),
        };
        let vars = assemble(&store, &cluster);
        assert_eq!(
            vars.namenode().url().as_deref(),
            Some("http://nn1.cluster.example.com:50070")
        );
        assert_eq!(vars.availability(), ServiceAvailability::default());
        assert_eq!(vars.ranger(), None);
        assert_eq!(vars.solr(), None);
        assert_eq!(vars.yarn_log_server(), None);
        assert_eq!(vars.default_fs(), None);
    }

    #[test]
    fn hdfs_unreadable() {
        let store = MemoryConfigStore::new();
        let vars = assemble(&store, &mock_cluster());
        assert_eq!(vars.namenode(), &ClusterEndpoint::unresolved(Protocol::Http));
        assert!(vars.ambari().url().is_some());
    }

    #[test]
    fn legacy_namenode_address() {
        let store = MemoryConfigStore::new();
        store.seed(
            "c1",
            HDFS_SITE,
            props(&[("dfs.http.address", "old-nn.cluster.example.com:50070")]),
        );
        let cluster = MockCluster {
            components: HashMap::new(),
        };
        let vars = assemble(&store, &cluster);
        assert_eq!(
            vars.namenode().url().as_deref(),
            Some("http://old-nn.cluster.example.com:50070")
        );
    }

    #[test]
    fn namenode_ha() {
        let store = MemoryConfigStore::new();
        store.seed(
            "c1",
            HDFS_SITE,
            props(&[
                ("dfs.nameservices", "prodns"),
                ("dfs.ha.namenodes.prodns", "nn1,nn2"),
                (
                    "dfs.namenode.http-address.prodns.nn1",
                    "nn1.cluster.example.com:50070",
                ),
                (
                    "dfs.namenode.http-address.prodns.nn2",
                    "nn2.cluster.example.com:50070",
                ),
            ]),
        );
        let cluster = MockCluster {
            components: hashmap! {"NAMENODE" => "nn2.cluster.example.com"},
        };
        let vars = assemble(&store, &cluster);
        assert!(vars.availability().is_namenode_ha);
        assert_eq!(vars.nameservice(), Some("prodns"));
        assert_eq!(
            vars.namenode().url().as_deref(),
            Some("http://nn2.cluster.example.com:50070")
        );
    }

    #[test]
    fn live_lookup_failure_uses_configured_host() {
        let store = full_store();
        store.seed(
            "c1",
            INFRA_SOLR_ENV,
            props(&[("infra_solr_port", "8886")]),
        );
        let cluster = MockCluster {
            components: HashMap::new(),
        };
        let vars = assemble(&store, &cluster);
        assert_eq!(
            vars.namenode().host.as_deref(),
            Some("nn-logical.example.com")
        );
        // Solr is installed, but without a live host its endpoint is partial.
        let solr = vars.solr().unwrap();
        assert!(vars.availability().is_solr_installed);
        assert_eq!(solr.protocol, Protocol::Http);
        assert_eq!(solr.host, None);
        assert_eq!(solr.port.as_deref(), Some("8886"));
    }

    #[test]
    fn ranger_without_url_is_still_installed() {
        let store = full_store();
        store.seed("c1", RANGER_ADMIN_PROPERTIES, btreemap! {});
        let vars = assemble(&store, &mock_cluster());
        assert!(vars.availability().is_ranger_installed);
        assert_eq!(vars.ranger().and_then(|r| r.url()), None);
    }

    #[test]
    fn ranger_default_port() {
        let endpoint = endpoint_from_url("https://ranger.example.com").unwrap();
        assert_eq!(endpoint.port.as_deref(), Some("443"));
    }

    #[test]
    fn url_prefix() {
        let endpoint =
            endpoint_from_url_prefix("https://jhs.example.com:19890/jobhistory/logs").unwrap();
        assert_eq!(endpoint.protocol, Protocol::Https);
        assert_eq!(endpoint.host.as_deref(), Some("jhs.example.com"));
        assert_eq!(endpoint.port.as_deref(), Some("19890"));

        let endpoint = endpoint_from_url_prefix("http://jhs.example.com/logs").unwrap();
        assert_eq!(endpoint.port, None);

        assert!(endpoint_from_url_prefix("jhs.example.com:19888").is_none());
        assert!(endpoint_from_url_prefix("gopher://jhs.example.com:70").is_none());
    }

    #[test]
    fn serialized_variables() {
        let vars = assemble(&full_store(), &mock_cluster());
        let value = serde_json::to_value(&vars).unwrap();
        assert_eq!(value["is_ranger_installed"], true);
        assert_eq!(value["is_namenode_ha"], false);
        assert_eq!(value["namenode"]["host"], "nn1.cluster.example.com");
        assert_eq!(value["ambari"]["url"], "http://localhost:8080");
    }

    #[test]
    fn broken_component_lookup_is_absorbed() {
        assert_eq!(
            TopologyAssembler::new(&Config::default(), "c1", &mock_cluster(), &full_store())
                .live_host("BROKEN"),
            None
        );
    }
}
