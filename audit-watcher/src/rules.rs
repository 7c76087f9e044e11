//! The ordered table of administrative changes the watcher knows how to name.
//!
//! Each rule is a (verb, status code, path pattern) triple plus the plural
//! phrase used in the summary and, optionally, the [`Resolver`] that renders a
//! detail line per matched record. Path patterns are relative to the
//! organization root `/v1/(organizations|o)/<org>`; their capture groups are
//! numbered from the first group after that root.

use regex::Regex;

use crate::types::{AuditRecord, Operation, Result, WatcherError};

/// How a matched record is turned into a detail line.
///
/// Variant docs list the path captures each kind reads, by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolver {
    /// `[name]`
    Named,
    /// `[developer, app]`
    DeveloperApp,
    /// `[developer, app, key, product]`, missing values render as `-unk-`
    DeveloperAppKey,
    /// `[environment, kvm]`
    EnvKvm,
    /// `[environment, kvm, entry]`
    EnvKvmEntry,
    /// `[environment, proxy, revision]`
    ProxyDeployment,
    /// `[proxy, revision]`
    ProxyRevision,
    /// `[environment, proxy, revision, session]`
    TraceSession,
    /// `[report id]`, display name fetched from the management API
    ReportName,
}

impl Resolver {
    pub fn required_captures(self) -> usize {
        match self {
            Resolver::Named | Resolver::ReportName => 1,
            Resolver::DeveloperApp | Resolver::ProxyRevision | Resolver::EnvKvm => 2,
            Resolver::EnvKvmEntry | Resolver::ProxyDeployment | Resolver::TraceSession => 3,
            Resolver::DeveloperAppKey => 4,
        }
    }

    /// Whether resolving needs a network round trip.
    pub fn is_remote(self) -> bool {
        matches!(self, Resolver::ReportName)
    }
}

/// Path captures of one match; `None` for a group that did not participate.
pub type Captures = Vec<Option<String>>;

#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub operation: Operation,
    pub response_code: String,
    pub path_pattern: String,
    pub plural_phrase: String,
    pub resolver: Option<Resolver>,
    pattern: Regex,
}

impl ClassificationRule {
    /// Compile a rule for `organization`.
    ///
    /// Fails if the pattern does not compile or has fewer groups than the
    /// resolver reads.
    pub fn new(
        operation: Operation,
        response_code: &str,
        path_pattern: &str,
        plural_phrase: &str,
        resolver: Option<Resolver>,
        organization: &str,
    ) -> Result<Self> {
        let full = format!(
            "/v1/(?:organizations|o)/{}{}",
            regex::escape(organization),
            path_pattern
        );
        let pattern = Regex::new(&full).map_err(|e| WatcherError::ClassificationDefect {
            rule: plural_phrase.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(resolver) = resolver {
            let groups = pattern.captures_len() - 1;
            if groups < resolver.required_captures() {
                return Err(WatcherError::ClassificationDefect {
                    rule: plural_phrase.to_string(),
                    reason: format!(
                        "{resolver:?} reads {} capture group(s) but the pattern has {groups}",
                        resolver.required_captures()
                    ),
                });
            }
        }

        Ok(Self {
            operation,
            response_code: response_code.to_string(),
            path_pattern: path_pattern.to_string(),
            plural_phrase: plural_phrase.to_string(),
            resolver,
            pattern,
        })
    }

    /// Path captures if `request_uri` matches this rule's pattern.
    pub fn captures(&self, request_uri: &str) -> Option<Captures> {
        let caps = self.pattern.captures(request_uri)?;
        Some(
            caps.iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
        )
    }

    /// Applies all three gates: verb, status code, path.
    pub fn matches(&self, record: &AuditRecord) -> Option<Captures> {
        if record.operation != self.operation || record.response_code != self.response_code {
            return None;
        }
        self.captures(&record.request_uri)
    }
}

struct RuleDef {
    operation: &'static str,
    response_code: &'static str,
    path: &'static str,
    plural_phrase: &'static str,
    resolver: Option<Resolver>,
}

const fn rule(
    operation: &'static str,
    response_code: &'static str,
    path: &'static str,
    plural_phrase: &'static str,
    resolver: Option<Resolver>,
) -> RuleDef {
    RuleDef {
        operation,
        response_code,
        path,
        plural_phrase,
        resolver,
    }
}

use Resolver::*;

const DEFAULT_RULES: &[RuleDef] = &[
    rule("DELETE", "200", r"/developers/([^/]+)/apps/([^/]+)$", "dev apps deleted", Some(DeveloperApp)),
    rule("CREATE", "201", r"/developers/([^/]+)/apps/([^/]+)/$", "dev apps created", Some(DeveloperApp)),
    rule("UPDATE", "200", r"/developers/([^/]+)/apps/([^/]+)$", "developer apps updated", Some(DeveloperApp)),
    rule("CREATE", "204", r"/developers/([^/]+)/apps/([^/]+)/keys/([^/]+)/apiproducts/([^/]+)\?action=approve$", "dev app keys approved", Some(DeveloperAppKey)),
    rule("CREATE", "204", r"/developers/([^/]+)/apps/([^/]+)/keys/([^/]+)/apiproducts/([^/]+)\?action=revoke$", "dev app keys revoked", Some(DeveloperAppKey)),
    rule("UPDATE", "200", r"/developers/([^/]+)/apps/([^/]+)/keys/([^/]+)$", "developer app keys updated", Some(DeveloperApp)),
    rule("CREATE", "201", r"/developers/([^/]+)/$", "devs created", Some(Named)),
    rule("DELETE", "200", r"/developers/([^/]+)$", "devs deleted", Some(Named)),
    rule("UPDATE", "200", r"/developers/([^/]+)$", "developers updated", Some(Named)),
    rule("CREATE", "204", r"/developers/([^/]+)\?action=active$", "devs activated", Some(Named)),
    rule("DELETE", "200", r"/e/([^/]+)/apis/([^/]+)/revisions/([0-9]+)/deployments$", "proxies undeployed", Some(ProxyDeployment)),
    rule("DELETE", "200", r"/apis/([^/]+)/revisions/([0-9]+)$", "proxy revisions deleted", Some(ProxyRevision)),
    rule("CREATE", "200", r"/e/([^/]+)/apis/([^/]+)/revisions/([0-9]+)/deployments$", "proxies deployed", Some(ProxyDeployment)),
    rule("CREATE", "201", r"/apis/([^/]+)/\?action=import&name=([^&/]+)$", "proxies imported", Some(Named)),
    rule("UPDATE", "200", r"/apis/([^/]+)/revisions/([0-9]+)\?validate=true$", "proxies updated", Some(Named)),
    rule("DELETE", "200", r"/apis/([^/]+)$", "APIs deleted", Some(Named)),
    rule("CREATE", "201", r"/apiproducts/([^/]+)/$", "api products created", Some(Named)),
    rule("UPDATE", "200", r"/apiproducts/([^/]+)$", "api products updated", Some(Named)),
    rule("DELETE", "200", r"/apiproducts/([^/]+)$", "api products deleted", Some(Named)),
    rule("CREATE", "201", r"/environments/([^/]+)/keyvaluemaps/([^/]+)/?$", "env KVMs created", Some(EnvKvm)),
    rule("UPDATE", "200", r"/environments/([^/]+)/keyvaluemaps/([^/]+)$", "env KVMs updated", Some(EnvKvm)),
    rule("DELETE", "200", r"/environments/([^/]+)/keyvaluemaps/([^/]+)$", "env KVMs deleted", Some(EnvKvm)),
    rule("CREATE", "201", r"/environments/([^/]+)/keyvaluemaps/([^/]+)/entries/([^/]+)/?$", "env KVM entries created", Some(EnvKvmEntry)),
    rule("UPDATE", "200", r"/environments/([^/]+)/keyvaluemaps/([^/]+)/entries/([^/]+)$", "env KVM entries updated", Some(EnvKvmEntry)),
    rule("DELETE", "200", r"/environments/([^/]+)/keyvaluemaps/([^/]+)/entries/([^/]+)$", "env KVM entries deleted", Some(EnvKvmEntry)),
    rule("CREATE", "201", r"/reports/([^/]+)/$", "AX reports created", Some(ReportName)),
    rule("UPDATE", "200", r"/reports/([^/]+)$", "AX reports updated", Some(ReportName)),
    rule("DELETE", "200", r"/reports/([^/]+)$", "AX reports deleted", Some(Named)),
    rule("CREATE", "201", r"/environments/([^/]+)/apis/([^/]+)/revisions/([0-9]+)/debugsessions/([0-9]+)/\?", "Trace sessions created", Some(TraceSession)),
    rule("DELETE", "200", r"/environments/([^/]+)/apis/([^/]+)/revisions/([0-9]+)/debugsessions/([0-9]+)$", "Trace sessions deleted", Some(TraceSession)),
];

/// Ordered, immutable set of rules for one organization.
#[derive(Debug, Clone)]
pub struct RuleTable {
    organization: String,
    rules: Vec<ClassificationRule>,
}

impl RuleTable {
    /// The built-in table compiled for `organization`.
    pub fn for_organization(organization: &str) -> Result<Self> {
        let rules = DEFAULT_RULES
            .iter()
            .map(|def| {
                ClassificationRule::new(
                    Operation::from(def.operation),
                    def.response_code,
                    def.path,
                    def.plural_phrase,
                    def.resolver,
                    organization,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            organization: organization.to_string(),
            rules,
        })
    }

    pub fn from_rules(organization: &str, rules: Vec<ClassificationRule>) -> Self {
        Self {
            organization: organization.to_string(),
            rules,
        }
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
