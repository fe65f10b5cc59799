/*!
# Introduction

knoxdog onboards an Apache Knox gateway onto an Ambari-managed cluster.

```text
knoxdog [--config PATH] [--log-level LEVEL] <command>
```

* `check-knox` reports whether the gateway service is installed.
* `whitelist` prints the dispatch whitelist inferred from the cluster's hosts.
* `topology` prints the rendered topology descriptor.
* `setup` grants proxy rights, publishes the whitelist, and renders and publishes the topology.

Only `setup` writes anything. It runs every step even if an earlier one fails, and exits non-zero
if any step failed. A failed run can simply be run again.

See the `knoxdog` library docs for the config file format.
*/

mod args;

use crate::args::{Arguments, Command};
use ambariclient::ServicePresence;
use knoxdog::cluster::{self, AmbariCluster, ClusterApi};
use knoxdog::config::Config;
use knoxdog::onboard::Onboarder;
use knoxdog::Result;
use log::info;
use simplelog::{Config as LogConfig, SimpleLogger};
use std::process;

fn main() -> ! {
    let args: Arguments = argh::from_env();
    SimpleLogger::init(args.log_level, LogConfig::default()).expect("unable to configure logger");
    process::exit(match main_inner(args) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{}", err);
            1
        }
    })
}

/// pub(crate) for testing.
pub(crate) fn main_inner(arguments: Arguments) -> Result<()> {
    let config = Config::load(arguments.config.as_deref())?;
    let client = cluster::connect(&config)?;
    let cluster_name = cluster::resolve_cluster_name(&config, &client)?;
    let cluster = AmbariCluster::new(&client, &cluster_name);
    let onboarder = Onboarder::new(&config, &cluster_name, &cluster, &client);

    match arguments.command {
        Command::CheckKnox(_) => {
            let service = &config.knox.service_name;
            match cluster.service_presence(service)? {
                ServicePresence::Installed => println!("{} is installed.", service),
                ServicePresence::NotInstalled => println!("{} is NOT installed.", service),
            }
        }
        Command::Whitelist(_) => {
            println!("{}", onboarder.whitelist()?);
        }
        Command::Topology(_) => {
            let variables = onboarder.assemble();
            print!("{}", onboarder.render_to_string(&variables)?);
        }
        Command::Setup(_) => {
            let report = onboarder.run()?;
            report.ensure_success()?;
            info!("Onboarded {} onto '{}'", config.knox.service_name, cluster_name);
        }
    }

    Ok(())
}
