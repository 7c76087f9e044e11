pub mod types;
pub mod config;
pub mod interval;
pub mod rules;
pub mod pluralize;
pub mod novelty;
pub mod classifier;
pub mod enricher;
pub mod summary;
pub mod traits;
pub mod auth;
pub mod fetcher;
pub mod notifier;
pub mod status;
pub mod cycle;

pub use types::*;
pub use config::{AlertType, WatcherConfig};
pub use rules::{ClassificationRule, Resolver, RuleTable};
pub use classifier::classify;
pub use enricher::{EnrichedGroup, Enricher};
pub use summary::build_elaboration;
pub use traits::{AuditSource, DetailLookup, Notifier};
pub use auth::{Credentials, TokenProvider};
pub use fetcher::ManagementClient;
pub use notifier::{Deployment, MessageProducer, NoticeContext, WebhookNotifier};
pub use status::{CyclePhase, SharedStatus, WatcherStatus};
pub use cycle::{CycleReport, CycleState, NotifyOutcome, PollCycle};
