use crate::error::{self, Error, Result};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Ws,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Ws => "ws",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "ws" => Ok(Protocol::Ws),
            _ => error::UnknownProtocolSnafu { protocol: s }.fail(),
        }
    }
}

/// Returns `host` as it must appear in a URL: IPv6 literals are bracketed, anything else is
/// returned unchanged.
pub fn url_host(host: &str) -> Cow<'_, str> {
    if host.parse::<Ipv6Addr>().is_ok() {
        Cow::Owned(format!("[{}]", host))
    } else {
        Cow::Borrowed(host)
    }
}

/// Where one dependent service can be reached. Host and port are absent when discovery couldn't
/// resolve them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEndpoint {
    pub protocol: Protocol,
    pub host: Option<String>,
    pub port: Option<String>,
}

impl ClusterEndpoint {
    pub fn new(protocol: Protocol, host: Option<String>, port: Option<String>) -> Self {
        Self {
            protocol,
            host,
            port,
        }
    }

    /// An endpoint with nothing but its protocol known.
    pub fn unresolved(protocol: Protocol) -> Self {
        Self::new(protocol, None, None)
    }

    /// Splits a Hadoop-style `host:port` address. A missing port leaves `port` absent, and an
    /// empty host leaves `host` absent.
    pub fn from_address(protocol: Protocol, address: &str) -> Self {
        let address = address.trim();
        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (address, None),
        };
        Self::new(
            protocol,
            Some(host).filter(|h| !h.is_empty()).map(str::to_string),
            port.filter(|p| !p.is_empty()).map(str::to_string),
        )
    }

    /// `host:port`, with IPv6 hosts bracketed, when both host and port are known.
    pub fn address(&self) -> Option<String> {
        match (&self.host, &self.port) {
            (Some(host), Some(port)) => Some(format!("{}:{}", url_host(host), port)),
            _ => None,
        }
    }

    /// `protocol://host:port`, when both host and port are known.
    pub fn url(&self) -> Option<String> {
        self.address()
            .map(|address| format!("{}://{}", self.protocol, address))
    }
}

// Templates can't call methods, so the derived address and url are serialized alongside the parts.
impl Serialize for ClusterEndpoint {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("ClusterEndpoint", 5)?;
        state.serialize_field("protocol", &self.protocol)?;
        state.serialize_field("host", &self.host)?;
        state.serialize_field("port", &self.port)?;
        state.serialize_field("address", &self.address())?;
        state.serialize_field("url", &self.url())?;
        state.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_address() {
        let endpoint = ClusterEndpoint::from_address(Protocol::Http, "nn1.example.com:50070");
        assert_eq!(endpoint.host.as_deref(), Some("nn1.example.com"));
        assert_eq!(endpoint.port.as_deref(), Some("50070"));
        assert_eq!(
            endpoint.url().as_deref(),
            Some("http://nn1.example.com:50070")
        );
    }

    #[test]
    fn split_address_without_port() {
        let endpoint = ClusterEndpoint::from_address(Protocol::Https, "nn1.example.com");
        assert_eq!(endpoint.host.as_deref(), Some("nn1.example.com"));
        assert_eq!(endpoint.port, None);
        assert_eq!(endpoint.url(), None);
    }

    #[test]
    fn split_address_without_host() {
        let endpoint = ClusterEndpoint::from_address(Protocol::Https, ":9871");
        assert_eq!(endpoint.host, None);
        assert_eq!(endpoint.port.as_deref(), Some("9871"));
    }

    #[test]
    fn ipv6_url() {
        let endpoint =
            ClusterEndpoint::new(Protocol::Http, Some("::1".to_string()), Some("8080".to_string()));
        assert_eq!(endpoint.address().as_deref(), Some("[::1]:8080"));
        assert_eq!(endpoint.url().as_deref(), Some("http://[::1]:8080"));
        assert_eq!(url_host("[::1]"), "[::1]");
        assert_eq!(url_host("10.0.0.1"), "10.0.0.1");
        assert_eq!(url_host("nn1.example.com"), "nn1.example.com");
    }

    #[test]
    fn protocol_parse() {
        assert_eq!("HTTPS".parse::<Protocol>().unwrap(), Protocol::Https);
        assert_eq!("ws".parse::<Protocol>().unwrap(), Protocol::Ws);
        assert!("ftp".parse::<Protocol>().is_err());
    }

    #[test]
    fn serialized_with_url() {
        let endpoint = ClusterEndpoint::from_address(Protocol::Https, "a.example.com:8443");
        assert_eq!(
            serde_json::to_value(&endpoint).unwrap(),
            json!({
                "protocol": "https",
                "host": "a.example.com",
                "port": "8443",
                "address": "a.example.com:8443",
                "url": "https://a.example.com:8443",
            })
        );
    }
}
