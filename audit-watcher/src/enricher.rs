use std::sync::Arc;

use tracing::{debug, warn};

use crate::classifier::{Classified, Match};
use crate::rules::Resolver;
use crate::traits::DetailLookup;
use crate::types::Result;

/// Placeholder for a value the audit record did not provide.
pub const UNKNOWN: &str = "-unk-";

/// Counted matches of one rule plus the detail lines its resolver produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedGroup {
    pub plural_phrase: String,
    pub count: usize,
    pub details: Vec<String>,
}

fn cap<'m>(m: &'m Match<'_>, index: usize) -> &'m str {
    m.capture(index).unwrap_or(UNKNOWN)
}

/// Detail line for resolvers that need nothing beyond the match itself.
///
/// Returns `None` for remote resolvers.
pub fn render(resolver: Resolver, m: &Match<'_>) -> Option<String> {
    let user = &m.record.user;
    let line = match resolver {
        Resolver::Named => format!("\u{2022} {} (user:{})\n", cap(m, 0), user),
        Resolver::DeveloperApp => {
            format!("\u{2022} {} (dev:{} user:{})\n", cap(m, 1), cap(m, 0), user)
        }
        Resolver::DeveloperAppKey => {
            let user = if user.is_empty() { UNKNOWN } else { user.as_str() };
            format!(
                "\u{2022} app:{} product:{} (dev:{} user:{})\n",
                cap(m, 1),
                cap(m, 3),
                cap(m, 0),
                user
            )
        }
        Resolver::EnvKvm => format!("\u{2022} {} (env:{} user:{})\n", cap(m, 1), cap(m, 0), user),
        Resolver::EnvKvmEntry => format!(
            "\u{2022} {} (env:{} entry:{} user:{})\n",
            cap(m, 1),
            cap(m, 0),
            cap(m, 2),
            user
        ),
        Resolver::ProxyDeployment => format!(
            "\u{2022} {} (rev:{} env:{} user:{})\n",
            cap(m, 1),
            cap(m, 2),
            cap(m, 0),
            user
        ),
        Resolver::ProxyRevision => {
            format!("\u{2022} {} (rev:{} user:{})\n", cap(m, 0), cap(m, 1), user)
        }
        Resolver::TraceSession => format!(
            "\u{2022} proxy:{} (rev:{} env:{} user:{})\n",
            cap(m, 1),
            cap(m, 2),
            cap(m, 0),
            user
        ),
        Resolver::ReportName => return None,
    };
    Some(line)
}

/// Resolves detail lines for classified matches.
///
/// Remote lookups are issued one at a time and awaited in rule order, then
/// match order, so the summary text is deterministic.
pub struct Enricher {
    lookup: Arc<dyn DetailLookup>,
}

impl Enricher {
    pub fn new(lookup: Arc<dyn DetailLookup>) -> Self {
        Self { lookup }
    }

    /// Detail line for one match, or `None` when there is nothing to add.
    ///
    /// Lookup failures are logged and swallowed; authentication failures are
    /// returned.
    pub async fn resolve(&self, resolver: Resolver, m: &Match<'_>) -> Result<Option<String>> {
        if !resolver.is_remote() {
            return Ok(render(resolver, m));
        }

        let Some(report_id) = m.capture(0) else {
            return Ok(None);
        };
        match self.lookup.report_display_name(report_id).await {
            Ok(Some(name)) if !name.trim().is_empty() => {
                Ok(Some(format!("\u{2022} {} (user:{})\n", name, m.record.user)))
            }
            Ok(_) => {
                debug!("no display name for report {}", report_id);
                Ok(None)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("details query failed for report {}: {}", report_id, e);
                Ok(None)
            }
        }
    }

    pub async fn enrich(&self, classified: &[Classified<'_>]) -> Result<Vec<EnrichedGroup>> {
        let mut groups = Vec::with_capacity(classified.len());

        for group in classified {
            let mut details = Vec::new();
            if let Some(resolver) = group.rule.resolver {
                for m in &group.matches {
                    if let Some(line) = self.resolve(resolver, m).await? {
                        details.push(line);
                    }
                }
            }
            groups.push(EnrichedGroup {
                plural_phrase: group.rule.plural_phrase.clone(),
                count: group.matches.len(),
                details,
            });
        }

        Ok(groups)
    }
}
