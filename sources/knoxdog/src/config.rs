use crate::endpoint::{url_host, Protocol};
use crate::error::{self, Result};
use log::debug;
use serde::Deserialize;
use snafu::ResultExt;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/knoxdog.toml";
const DEFAULT_AMBARI_PROPERTIES_PATH: &str = "/etc/ambari-server/conf/ambari.properties";
const DEFAULT_TOPOLOGY_PATH: &str = "/etc/knox/conf/topologies/knoxdog.xml";
// Ambari's own default when `api.ssl` is on and no port is given.
const DEFAULT_AMBARI_SSL_PORT: u16 = 8443;

/// The knoxdog configuration. Loaded once and passed by reference to everything that needs it.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub ambari: AmbariConfig,
    pub knox: KnoxConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AmbariConfig {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Discovered from the Ambari API when absent.
    pub cluster_name: Option<String>,
    /// The Ambari server's own properties; its SSL settings override `protocol` and `port`.
    pub properties_file: Option<PathBuf>,
}

impl Default for AmbariConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Http,
            host: "localhost".to_string(),
            port: 8080,
            username: "admin".to_string(),
            password: "admin".to_string(),
            cluster_name: None,
            properties_file: Some(PathBuf::from(DEFAULT_AMBARI_PROPERTIES_PATH)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KnoxConfig {
    /// The gateway's service name in Ambari.
    pub service_name: String,
    /// The user the gateway impersonates others as.
    pub proxy_user: String,
    /// Where the rendered topology descriptor is written before it's published.
    pub topology_path: PathBuf,
    /// Uses the built-in topology template when absent.
    pub template_path: Option<PathBuf>,
}

impl Default for KnoxConfig {
    fn default() -> Self {
        Self {
            service_name: "KNOX".to_string(),
            proxy_user: "knox".to_string(),
            topology_path: PathBuf::from(DEFAULT_TOPOLOGY_PATH),
            template_path: None,
        }
    }
}

impl Config {
    /// Loads the config from `path` if given. Otherwise the default path is used if it exists,
    /// falling back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)
            }
            None => {
                debug!(
                    "No config at {}, using built-in defaults",
                    DEFAULT_CONFIG_PATH
                );
                Self::default().with_ambari_properties()
            }
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).context(error::ConfigReadSnafu { path })?;
        let config: Config = toml::from_str(&s).context(error::ConfigParseSnafu { path })?;
        config.with_ambari_properties()
    }

    fn with_ambari_properties(mut self) -> Result<Self> {
        let path = match &self.ambari.properties_file {
            Some(path) if path.exists() => path.clone(),
            _ => return Ok(self),
        };
        debug!("Applying Ambari server properties from {}", path.display());
        let contents =
            fs::read_to_string(&path).context(error::AmbariPropertiesReadSnafu { path: &path })?;
        self.ambari.apply_server_properties(&contents)?;
        Ok(self)
    }
}

impl AmbariConfig {
    pub fn base_uri(&self) -> String {
        format!("{}://{}:{}", self.protocol, url_host(&self.host), self.port)
    }

    /// `api.ssl=true` means Ambari serves https on `client.api.ssl.port`; otherwise it serves http,
    /// on `client.api.port` when that's set.
    fn apply_server_properties(&mut self, contents: &str) -> Result<()> {
        let properties = parse_properties(contents);
        let ssl = properties
            .get("api.ssl")
            .map_or(false, |value| value.eq_ignore_ascii_case("true"));
        if ssl {
            self.protocol = Protocol::Https;
            self.port = match properties.get("client.api.ssl.port") {
                Some(port) => parse_port("client.api.ssl.port", port)?,
                None => DEFAULT_AMBARI_SSL_PORT,
            };
        } else {
            self.protocol = Protocol::Http;
            if let Some(port) = properties.get("client.api.port") {
                self.port = parse_port("client.api.port", port)?;
            }
        }
        Ok(())
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context(error::AmbariPropertiesPortSnafu { key })
}

/// Parses Java-style `key=value` lines, skipping blanks and comments.
fn parse_properties(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    const STANDARD_CONFIG: &str = r#"
    [ambari]
    protocol = "https"
    host = "ambari.cluster.example.com"
    port = 8442
    username = "operator"
    password = "hunter2"
    cluster_name = "prod"
    properties_file = "PROPERTIES"

    [knox]
    proxy_user = "gateway"
    topology_path = "/tmp/knoxdog/topology.xml"
    "#;

    // Points `properties_file` into the tempdir so the host's real Ambari properties are never
    // read, and writes the config there.
    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let config_path = dir.path().join("knoxdog.toml");
        let properties_path = dir.path().join("ambari.properties");
        let contents = contents.replace("PROPERTIES", &properties_path.display().to_string());
        std::fs::write(&config_path, contents).unwrap();
        config_path
    }

    #[test]
    fn standard_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, STANDARD_CONFIG);
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.ambari.protocol, Protocol::Https);
        assert_eq!(config.ambari.host, "ambari.cluster.example.com");
        assert_eq!(config.ambari.port, 8442);
        assert_eq!(config.ambari.username, "operator");
        assert_eq!(config.ambari.password, "hunter2");
        assert_eq!(config.ambari.cluster_name.as_deref(), Some("prod"));
        assert_eq!(config.knox.service_name, "KNOX");
        assert_eq!(config.knox.proxy_user, "gateway");
        assert_eq!(
            config.knox.topology_path,
            PathBuf::from("/tmp/knoxdog/topology.xml")
        );
        assert_eq!(config.knox.template_path, None);
        assert_eq!(
            config.ambari.base_uri(),
            "https://ambari.cluster.example.com:8442"
        );
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.ambari.base_uri(), "http://localhost:8080");
        assert_eq!(config.knox.proxy_user, "knox");
    }

    #[test]
    fn ipv6_host_bracketed() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "[ambari]\nhost = \"::1\"\nport = 8081\nproperties_file = \"PROPERTIES\"\n",
        );
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.ambari.host, "::1");
        assert_eq!(config.ambari.base_uri(), "http://[::1]:8081");
    }

    #[test]
    fn missing_explicit_config() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn invalid_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[ambari]\nport = \"eighty\"\n");
        assert!(matches!(
            Config::from_file(&path),
            Err(crate::error::Error::ConfigParse { .. })
        ));
    }

    fn config_with_properties(properties: &str) -> Result<Config> {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ambari.properties"), properties).unwrap();
        let path = write_config(
            &dir,
            "[ambari]\nport = 8081\nproperties_file = \"PROPERTIES\"\n",
        );
        Config::from_file(&path)
    }

    #[test]
    fn ambari_properties_ssl() {
        let config = config_with_properties(
            "# Ambari server\napi.ssl=true\nclient.api.ssl.port=8445\nserver.os_type=redhat8\n",
        )
        .unwrap();
        assert_eq!(config.ambari.protocol, Protocol::Https);
        assert_eq!(config.ambari.port, 8445);
    }

    #[test]
    fn ambari_properties_ssl_default_port() {
        let config = config_with_properties("api.ssl=TRUE\n").unwrap();
        assert_eq!(config.ambari.protocol, Protocol::Https);
        assert_eq!(config.ambari.port, 8443);
    }

    #[test]
    fn ambari_properties_plain() {
        let config = config_with_properties("api.ssl=false\nclient.api.port=8090\n").unwrap();
        assert_eq!(config.ambari.protocol, Protocol::Http);
        assert_eq!(config.ambari.port, 8090);
    }

    #[test]
    fn ambari_properties_ssl_port_needs_ssl() {
        let config = config_with_properties("client.api.ssl.port=8445\n").unwrap();
        assert_eq!(config.ambari.protocol, Protocol::Http);
        assert_eq!(config.ambari.port, 8081);
    }

    #[test]
    fn ambari_properties_without_port_keep_configured_port() {
        let config = config_with_properties("server.jdbc.database=postgres\n").unwrap();
        assert_eq!(config.ambari.protocol, Protocol::Http);
        assert_eq!(config.ambari.port, 8081);
    }

    #[test]
    fn ambari_properties_bad_port() {
        assert!(config_with_properties("api.ssl=true\nclient.api.ssl.port=https\n").is_err());
    }
}
