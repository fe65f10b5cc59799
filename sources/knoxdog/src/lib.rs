/*!
`knoxdog` onboards an Apache Knox gateway onto an Ambari-managed cluster.

Given a cluster where the Knox service is installed, it:

* grants the gateway's proxy user impersonation rights,
* infers a dispatch whitelist from the cluster's host inventory,
* discovers the endpoints of the services Knox fronts and renders them into a topology
  descriptor, which is published back to Ambari.

All cluster state is read live from the Ambari API on every run; nothing is cached between runs.
Configuration comes from a TOML file, by default `/etc/knoxdog.toml`:

```toml
[ambari]
protocol = "http"
host = "localhost"
port = 8080
username = "admin"
password = "admin"
# discovered from Ambari when unset
cluster_name = "mycluster"
# api.ssl and the client API ports in here override protocol and port
properties_file = "/etc/ambari-server/conf/ambari.properties"

[knox]
service_name = "KNOX"
proxy_user = "knox"
topology_path = "/etc/knox/conf/topologies/knoxdog.xml"
# a Handlebars template; the built-in topology template is used when unset
template_path = "/etc/knoxdog/topology.xml.hbs"
```

Every key is optional.
*/

#![deny(rust_2018_idioms)]

pub mod cluster;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod onboard;
pub mod render;
pub mod topology;
pub mod whitelist;

pub use error::{Error, Result};
