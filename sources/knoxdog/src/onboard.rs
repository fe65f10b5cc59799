/*!
Runs the onboarding sequence that registers the Knox gateway with a cluster:

1. grant the gateway's proxy user impersonation rights in `core-site`
2. infer the dispatch whitelist and publish it to `gateway-site`
3. assemble the topology variables
4. render the topology descriptor to the local artifact
5. publish the artifact's contents to the `topology` config type

Every step is attempted and its outcome recorded in a [`Report`]. A step only gets skipped when
its input came from a step that failed. Writes that succeeded are never rolled back.
*/

use crate::cluster::ClusterApi;
use crate::config::Config;
use crate::error::{self, Result};
use crate::render::{self, TopologyArtifact};
use crate::topology::{TopologyAssembler, TopologyVariables};
use crate::whitelist::{infer_whitelist, WhitelistPattern};
use ambariclient::{set_properties, ConfigStore, Properties, ServicePresence};
use log::{error, info, warn};
use snafu::{ensure, ResultExt};
use std::fmt;

const CORE_SITE: &str = "core-site";
const GATEWAY_SITE: &str = "gateway-site";
const DISPATCH_WHITELIST: &str = "gateway.dispatch.whitelist";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    GrantProxyRights,
    PublishWhitelist,
    AssembleTopology,
    RenderTopology,
    PublishTopology,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::GrantProxyRights => "grant-proxy-rights",
            Step::PublishWhitelist => "publish-whitelist",
            Step::AssembleTopology => "assemble-topology",
            Step::RenderTopology => "render-topology",
            Step::PublishTopology => "publish-topology",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed(String),
    Skipped(String),
}

/// The outcome of every step, in the order the steps ran.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    outcomes: Vec<(Step, StepOutcome)>,
}

impl Report {
    fn record(&mut self, step: Step, result: Result<()>) {
        let outcome = match result {
            Ok(()) => {
                info!("Step {} succeeded", step);
                StepOutcome::Succeeded
            }
            Err(e) => {
                error!("Step {} failed: {}", step, e);
                StepOutcome::Failed(e.to_string())
            }
        };
        self.outcomes.push((step, outcome));
    }

    fn skip<S: Into<String>>(&mut self, step: Step, reason: S) {
        let reason = reason.into();
        warn!("Step {} skipped: {}", step, reason);
        self.outcomes.push((step, StepOutcome::Skipped(reason)));
    }

    /// True when no step failed.
    pub fn is_success(&self) -> bool {
        self.failed().is_empty()
    }

    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, outcome)| outcome)
    }

    pub fn failed(&self) -> Vec<Step> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, StepOutcome::Failed(_)))
            .map(|(step, _)| *step)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Step, StepOutcome)> {
        self.outcomes.iter()
    }

    /// Fails with `SetupIncomplete`, naming the failed steps, unless every step succeeded.
    pub fn ensure_success(&self) -> Result<()> {
        let failed = self.failed();
        ensure!(
            failed.is_empty(),
            error::SetupIncompleteSnafu {
                failed: failed.iter().map(Step::to_string).collect::<Vec<_>>(),
            }
        );
        Ok(())
    }
}

pub struct Onboarder<'a> {
    config: &'a Config,
    cluster_name: &'a str,
    cluster: &'a dyn ClusterApi,
    store: &'a dyn ConfigStore,
}

impl<'a> Onboarder<'a> {
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

    /// Fails with `NotInstalled` unless the gateway service is installed.
    pub fn ensure_installed(&self) -> Result<()> {
        let service = &self.config.knox.service_name;
        let presence = self.cluster.service_presence(service)?;
        ensure!(
            presence == ServicePresence::Installed,
            error::NotInstalledSnafu {
                service,
                cluster: self.cluster_name,
            }
        );
        Ok(())
    }

    /// Runs every step against a cluster where the gateway is installed. Only the presence check
    /// can fail the run as a whole, and it happens before anything is written.
    pub fn run(&self) -> Result<Report> {
        self.ensure_installed()?;
        let mut report = Report::default();

        report.record(Step::GrantProxyRights, self.grant_proxy_rights());
        report.record(
            Step::PublishWhitelist,
            self.publish_whitelist().map(|_| ()),
        );

        let variables = self.assemble();
        report.record(Step::AssembleTopology, Ok(()));

        let artifact = TopologyArtifact::new(&self.config.knox.topology_path);
        match self.render(&variables, &artifact) {
            Ok(()) => {
                report.record(Step::RenderTopology, Ok(()));
                report.record(Step::PublishTopology, self.publish_topology(&artifact));
            }
            Err(e) => {
                report.record(Step::RenderTopology, Err(e));
                report.skip(
                    Step::PublishTopology,
                    format!("{} was not rendered", artifact.path().display()),
                );
            }
        }

        Ok(report)
    }

    fn note(&self, action: &str) -> String {
        format!("knoxdog: {}", action)
    }

    /// Lets the gateway's proxy user impersonate any user from any host.
    pub fn grant_proxy_rights(&self) -> Result<()> {
        let user = &self.config.knox.proxy_user;
        info!("Granting proxy rights to '{}'", user);
        let mut changes = Properties::new();
        changes.insert(format!("hadoop.proxyuser.{}.groups", user), "*".to_string());
        changes.insert(format!("hadoop.proxyuser.{}.hosts", user), "*".to_string());
        set_properties(
            self.store,
            self.cluster_name,
            CORE_SITE,
            &self.note(&format!("grant proxy rights to {}", user)),
            &changes,
        )
        .context(error::ConfigTypeUpdateSnafu {
            config_type: CORE_SITE,
        })
    }

    /// Infers the whitelist from the live host inventory without writing it.
    pub fn whitelist(&self) -> Result<WhitelistPattern> {
        let hosts = self.cluster.cluster_hosts()?;
        info!("Inferring whitelist from {} hosts", hosts.len());
        let pattern = infer_whitelist(&hosts)?;
        // Only patterns that compile are published.
        pattern.to_regex()?;
        Ok(pattern)
    }

    pub fn publish_whitelist(&self) -> Result<WhitelistPattern> {
        let pattern = self.whitelist()?;
        info!("Publishing dispatch whitelist {}", pattern);
        let mut changes = Properties::new();
        changes.insert(DISPATCH_WHITELIST.to_string(), pattern.to_string());
        set_properties(
            self.store,
            self.cluster_name,
            GATEWAY_SITE,
            &self.note(&format!("allow dispatch to {}", pattern.domain())),
            &changes,
        )
        .context(error::ConfigTypeUpdateSnafu {
            config_type: GATEWAY_SITE,
        })?;
        Ok(pattern)
    }

    pub fn assemble(&self) -> TopologyVariables {
        TopologyAssembler::new(self.config, self.cluster_name, self.cluster, self.store).assemble()
    }

    /// Renders `variables` with the configured template, or the built-in one.
    pub fn render_to_string(&self, variables: &TopologyVariables) -> Result<String> {
        let registry = render::build_registry(self.config.knox.template_path.as_deref())?;
        render::render_topology(&registry, variables)
    }

    pub fn render(&self, variables: &TopologyVariables, artifact: &TopologyArtifact) -> Result<()> {
        let rendered = self.render_to_string(variables)?;
        info!("Writing topology to {}", artifact.path().display());
        artifact.write(&rendered)
    }

    pub fn publish_topology(&self, artifact: &TopologyArtifact) -> Result<()> {
        render::publish_topology(
            artifact,
            self.store,
            self.cluster_name,
            &self.note("publish topology"),
        )
    }
}
