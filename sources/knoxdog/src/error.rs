//! Provides the list of errors for `knoxdog`.

use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to read config file {}: {}", path.display(), source))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse config file {}: {}", path.display(), source))]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("Failed to read Ambari properties {}: {}", path.display(), source))]
    AmbariPropertiesRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid '{}' in Ambari properties: {}", key, source))]
    AmbariPropertiesPort {
        key: String,
        source: std::num::ParseIntError,
    },

    #[snafu(display("Unknown protocol '{}'", protocol))]
    UnknownProtocol { protocol: String },

    #[snafu(display("Unable to create Ambari client: {}", source))]
    AmbariClient { source: ambariclient::Error },

    #[snafu(display("No cluster name configured and none could be discovered from {}", uri))]
    NoClusterName { uri: String },

    #[snafu(display("Unable to check whether '{}' is installed: {}", service, source))]
    PresenceCheck {
        service: String,
        source: ambariclient::Error,
    },

    #[snafu(display("Service '{}' is not installed in cluster '{}'", service, cluster))]
    NotInstalled { service: String, cluster: String },

    #[snafu(display("Unable to list cluster hosts: {}", source))]
    ListHosts { source: ambariclient::Error },

    #[snafu(display("Unable to find host for component '{}': {}", component, source))]
    ComponentHost {
        component: String,
        source: ambariclient::Error,
    },

    #[snafu(display("Unable to read '{}' config: {}", config_type, source))]
    ConfigTypeRead {
        config_type: String,
        source: ambariclient::Error,
    },

    #[snafu(display("Unable to update '{}' config: {}", config_type, source))]
    ConfigTypeUpdate {
        config_type: String,
        source: ambariclient::Error,
    },

    #[snafu(display("Property '{}' missing from '{}' config", property, config_type))]
    MissingProperty {
        config_type: String,
        property: String,
    },

    #[snafu(display("No fully-qualified hostnames found, unable to infer a domain"))]
    InsufficientHosts,

    #[snafu(display(
        "Hosts span more than one domain ({}), refusing to infer a whitelist",
        domains.join(", ")
    ))]
    InconsistentDomain { domains: Vec<String> },

    #[snafu(display("Unable to compile whitelist pattern '{}': {}", pattern, source))]
    WhitelistRegex {
        pattern: String,
        source: regex::Error,
    },

    #[snafu(display("Failure to read template '{}' from '{}': {}", name, path.display(), source))]
    TemplateRegister {
        name: String,
        path: PathBuf,
        #[snafu(source(from(handlebars::TemplateError, Box::new)))]
        source: Box<handlebars::TemplateError>,
    },

    #[snafu(display("Built-in template '{}' is invalid: {}", name, source))]
    TemplateParse {
        name: String,
        #[snafu(source(from(handlebars::TemplateError, Box::new)))]
        source: Box<handlebars::TemplateError>,
    },

    #[snafu(display("Template '{}' failed to render: {}", name, source))]
    TemplateRender {
        name: String,
        #[snafu(source(from(handlebars::RenderError, Box::new)))]
        source: Box<handlebars::RenderError>,
    },

    #[snafu(display("Failed to write topology {} at {}: {}", pathtype, path.display(), source))]
    TopologyWrite {
        path: PathBuf,
        pathtype: &'static str,
        source: std::io::Error,
    },

    #[snafu(display("Failed to read topology from {}: {}", path.display(), source))]
    TopologyRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Setup did not complete, failed steps: {}", failed.join(", ")))]
    SetupIncomplete { failed: Vec<String> },
}

pub type Result<T> = std::result::Result<T, Error>;
