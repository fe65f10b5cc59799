/*!
`ambariclient` provides blocking, high-level methods to interact with the Ambari management REST
API of a single cluster manager.

Every request is authenticated with HTTP basic auth and bounded by a 10 second timeout. When the
base URI is `https` and the first attempt of a request fails certificate verification, the request
is retried exactly once with verification disabled and a warning is logged. There is no other
retry policy; callers decide what a failed request means for them.

For example, to find out whether the Knox gateway is installed in cluster `c1`:

```no_run
use ambariclient::{AmbariClient, ServicePresence};

let client = AmbariClient::new("https://ambari.example.com:8443", "admin", "admin").unwrap();
match client.fetch_service_presence("c1", "KNOX").unwrap() {
    ServicePresence::Installed => println!("installed"),
    ServicePresence::NotInstalled => println!("not installed"),
}
```

The crate also defines the narrow interface used to read and write Ambari's versioned
configuration types, see [`ConfigStore`].
*/

#![deny(rust_2018_idioms)]

mod config_store;
#[cfg(any(test, feature = "testfakes"))]
pub mod memory;

pub use config_store::{
    set_properties, update_config, Attributes, ConfigStore, ConfigVersion, Properties,
};

use http::StatusCode;
use log::{debug, trace, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use snafu::{ensure, ResultExt};
use std::collections::BTreeSet;
use std::time::Duration;

const CLUSTERS_PATH: &str = "api/v1/clusters";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
// Ambari rejects modifying requests without this header.
const REQUESTED_BY_HEADER: &str = "X-Requested-By";
const REQUESTED_BY: &str = "ambari";
const COMPONENT_FILTER: &str = "host_components/HostRoles/component_name";

/// Whether a service is installed in a cluster, as reported by Ambari.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePresence {
    Installed,
    NotInstalled,
}

/// A client for making Ambari API queries.
pub struct AmbariClient {
    client: Client,
    // Only built for https base URIs, used for the single unverified retry.
    insecure_client: Option<Client>,
    base_uri: String,
    username: String,
    password: String,
}

impl AmbariClient {
    pub fn new<S1, S2, S3>(base_uri: S1, username: S2, password: S3) -> Result<Self>
    where
        S1: AsRef<str>,
        S2: Into<String>,
        S3: Into<String>,
    {
        let base_uri = base_uri.as_ref().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context(error::ClientBuildSnafu)?;
        let insecure_client = if base_uri.starts_with("https://") {
            Some(
                Client::builder()
                    .timeout(REQUEST_TIMEOUT)
                    .danger_accept_invalid_certs(true)
                    .build()
                    .context(error::ClientBuildSnafu)?,
            )
        } else {
            None
        };
        Ok(Self {
            client,
            insecure_client,
            base_uri,
            username: username.into(),
            password: password.into(),
        })
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Returns the name of the first cluster managed by this Ambari server. Any failure, including
    /// an Ambari that manages no clusters, is reported as `None`.
    pub fn fetch_cluster_name(&self) -> Option<String> {
        let uri = format!("{}/{}", self.base_uri, CLUSTERS_PATH);
        let clusters: Items<ClusterItem> = match self.get_json(&uri, &[]) {
            Ok(clusters) => clusters,
            Err(e) => {
                debug!("Unable to discover cluster name: {}", e);
                return None;
            }
        };
        clusters
            .items
            .into_iter()
            .next()
            .map(|item| item.clusters.cluster_name)
    }

    /// Checks whether `service` is installed in `cluster`.
    ///
    /// A 404, or a body carrying Ambari's "Service not found" status, means `NotInstalled`. A 200
    /// carrying `ServiceInfo` means `Installed`. Anything else (unexpected status, malformed body)
    /// is also treated as `NotInstalled`. Transport failures are returned as errors.
    pub fn fetch_service_presence(&self, cluster: &str, service: &str) -> Result<ServicePresence> {
        let uri = format!(
            "{}/{}/{}/services/{}",
            self.base_uri, CLUSTERS_PATH, cluster, service
        );
        let (code, body) = self.get(&uri, &[])?;
        Ok(classify_presence(code, &body))
    }

    /// Returns the fully-qualified names of every host registered in `cluster`.
    pub fn fetch_cluster_hosts(&self, cluster: &str) -> Result<BTreeSet<String>> {
        let uri = format!("{}/{}/{}/hosts", self.base_uri, CLUSTERS_PATH, cluster);
        let hosts: Items<HostItem> = self.get_json(&uri, &[])?;
        Ok(hosts
            .items
            .into_iter()
            .map(|item| item.hosts.host_name)
            .collect())
    }

    /// Returns the first host that has `component` (e.g. `NAMENODE`) assigned, if any.
    pub fn fetch_host_for_component(
        &self,
        cluster: &str,
        component: &str,
    ) -> Result<Option<String>> {
        let uri = format!("{}/{}/{}/hosts", self.base_uri, CLUSTERS_PATH, cluster);
        let hosts: Items<HostItem> = self.get_json(&uri, &[(COMPONENT_FILTER, component)])?;
        Ok(hosts
            .items
            .into_iter()
            .next()
            .map(|item| item.hosts.host_name))
    }

    /// Sends the request built by `build`. If certificate verification fails on an https
    /// endpoint, the request is built again against the unverified client and sent once more.
    fn send<F>(&self, method: &str, uri: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        debug!("Sending {} {}", method, uri);
        let first_attempt = build(&self.client)
            .basic_auth(&self.username, Some(&self.password))
            .send();
        match (first_attempt, &self.insecure_client) {
            (Ok(response), _) => Ok(response),
            (Err(e), Some(insecure_client)) if is_tls_verification_error(&e) => {
                warn!(
                    "TLS verification failed for {}: {}. Retrying with verification disabled.",
                    uri, e
                );
                build(insecure_client)
                    .basic_auth(&self.username, Some(&self.password))
                    .send()
                    .context(error::RequestSnafu { method, uri })
            }
            (Err(e), _) => Err(e).context(error::RequestSnafu { method, uri }),
        }
    }

    /// GETs `uri` and returns the status code and body, whatever the status.
    fn get(&self, uri: &str, query: &[(&str, &str)]) -> Result<(StatusCode, String)> {
        let response = self.send("GET", uri, |client| client.get(uri).query(query))?;
        read_body("GET", uri, response)
    }

    /// GETs `uri`, requires a success status, and deserializes the body.
    fn get_json<T>(&self, uri: &str, query: &[(&str, &str)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let (code, response_body) = self.get(uri, query)?;
        ensure!(
            code.is_success(),
            error::ResponseSnafu {
                method: "GET",
                uri,
                code,
                response_body,
            }
        );
        serde_json::from_str(&response_body).context(error::ResponseJsonSnafu { method: "GET", uri })
    }

    /// PUTs a JSON body to `uri` and requires a success status.
    fn put_json(&self, uri: &str, body: &Value) -> Result<()> {
        let response = self.send("PUT", uri, |client| {
            client
                .put(uri)
                .header(REQUESTED_BY_HEADER, REQUESTED_BY)
                .json(body)
        })?;
        let (code, response_body) = read_body("PUT", uri, response)?;
        ensure!(
            code.is_success(),
            error::ResponseSnafu {
                method: "PUT",
                uri,
                code,
                response_body,
            }
        );
        Ok(())
    }
}

fn read_body(method: &str, uri: &str, response: Response) -> Result<(StatusCode, String)> {
    let code = response.status();
    let body = response
        .text()
        .context(error::ResponseBodySnafu { method, uri, code })?;
    trace!("Response {} from {}: {}", code, uri, printable_string(&body));
    Ok((code, body))
}

fn classify_presence(code: StatusCode, body: &str) -> ServicePresence {
    if code == StatusCode::NOT_FOUND {
        return ServicePresence::NotInstalled;
    }
    let data: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let reports_not_found = data.get("status").and_then(Value::as_u64) == Some(404)
        && data
            .get("message")
            .and_then(Value::as_str)
            .map_or(false, |message| message.contains("Service not found"));
    if reports_not_found {
        return ServicePresence::NotInstalled;
    }
    if code == StatusCode::OK && data.get("ServiceInfo").is_some() {
        return ServicePresence::Installed;
    }
    debug!(
        "Unrecognized service response ({}), treating service as not installed",
        code
    );
    ServicePresence::NotInstalled
}

/// reqwest doesn't expose a typed certificate error, so walk the source chain looking for the
/// rustls verification failure.
fn is_tls_verification_error(e: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(e);
    while let Some(err) = source {
        let message = err.to_string().to_lowercase();
        if message.contains("certificate") || message.contains("unknownissuer") {
            return true;
        }
        source = err.source();
    }
    false
}

/// Truncates `s` if it is too long for printing.
fn printable_string(s: &str) -> String {
    if s.len() < 2048 {
        s.to_string()
    } else {
        let mut end = 2034;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}<truncated...>", &s[..end])
    }
}

// Ambari wraps collections in an `items` array; only the fields we read are modeled.
#[derive(Debug, Deserialize)]
struct Items<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ClusterItem {
    #[serde(rename = "Clusters")]
    clusters: ClusterInfo,
}

#[derive(Debug, Deserialize)]
struct ClusterInfo {
    cluster_name: String,
}

#[derive(Debug, Deserialize)]
struct HostItem {
    #[serde(rename = "Hosts")]
    hosts: HostInfo,
}

#[derive(Debug, Deserialize)]
struct HostInfo {
    host_name: String,
}

mod error {
    use http::StatusCode;
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display("Unable to build HTTP client: {}", source))]
        ClientBuild { source: reqwest::Error },

        #[snafu(display("Error {}ing '{}': {}", method, uri, source))]
        Request {
            method: String,
            uri: String,
            source: reqwest::Error,
        },

        #[snafu(display("Error {} when {}ing '{}': {}", code, method, uri, response_body))]
        Response {
            method: String,
            uri: String,
            code: StatusCode,
            response_body: String,
        },

        #[snafu(display(
            "Unable to read response body when {}ing '{}' (code {}) - {}",
            method,
            uri,
            code,
            source
        ))]
        ResponseBody {
            method: String,
            uri: String,
            code: StatusCode,
            source: reqwest::Error,
        },

        #[snafu(display(
            "Error deserializing response as JSON from {} to '{}': {}",
            method,
            uri,
            source
        ))]
        ResponseJson {
            method: String,
            uri: String,
            source: serde_json::Error,
        },

        #[snafu(display("Config type '{}' is not present in cluster '{}'", config_type, cluster))]
        MissingDesiredConfig { cluster: String, config_type: String },

        #[snafu(display(
            "No configuration found for type '{}' with tag '{}'",
            config_type,
            tag
        ))]
        MissingConfiguration { config_type: String, tag: String },

        #[snafu(display("Config store rejected '{}': {}", config_type, reason))]
        Rejected { config_type: String, reason: String },
    }
}

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
