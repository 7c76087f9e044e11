//! Alert messages and webhook delivery.
//!
//! [`MessageProducer`] turns a cycle's results into the JSON body expected by
//! the configured destination; [`WebhookNotifier`] posts it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::config::{AlertSection, AlertType};
use crate::traits::Notifier;
use crate::types::{Result, WatcherError};

const DATE_FORMAT: &str = "%Y %B %-d %-H:%M:%S";
const SLACK_TITLE: &str = "Apigee Administrative Changes";
const SLACK_COLOR: &str = "#d08f2c";
const SLACK_USERNAME: &str = "Apigee Audit Watcher";
const DEFAULT_ICON_URL: &str = "https://yt3.ggpht.com/a/AGF-l7_ahLayWFLAgeXEVNG3LC8il4bAfMq-wOLqHw=s900-c-k-c0xffffffff-no-rj-mo";
const GCHAT_SENDER: &str = "Audit watcher Bot";
const GCHAT_PREFIX: &str = "https://chat.googleapis.com";

const GCHAT_TEMPLATE: &str = "<b>{{summary}}</b><br/>\n\
Timebox: {{timeRange}}<br/>\n\
Organization: {{organization}}<br/>\n\
Watcher: {{watcherInfo}}<br/>\n\
<br/>\n\
{{elaborations}}";

/// Where the watcher itself is deployed, shown in the plain alert header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub organization: String,
    pub environment: String,
}

impl Deployment {
    /// Read from `APIGEE_ORGANIZATION` and `APIGEE_ENVIRONMENT`.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_else(|_| "unknown".to_string());
        Self {
            organization: var("APIGEE_ORGANIZATION"),
            environment: var("APIGEE_ENVIRONMENT"),
        }
    }
}

/// Everything a message needs to know about the cycle that produced it.
#[derive(Debug, Clone)]
pub struct NoticeContext {
    pub organization: String,
    /// Records that passed the novelty filter.
    pub novel_count: usize,
    /// Novel records that are not failed calls.
    pub filtered_count: usize,
    pub elaboration: String,
    pub last_check: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
    /// Zone the timebox is rendered in.
    pub timezone: Tz,
    pub host: String,
    pub version: String,
    pub deployment: Deployment,
}

impl NoticeContext {
    pub fn summary(&self, count: usize) -> String {
        let verb = if count == 1 { "update has" } else { "updates have" };
        format!("{} {} been made to org {}", count, verb, self.organization)
    }

    pub fn timebox(&self) -> String {
        match self.last_check {
            Some(last) => format!(
                "between {} and {}",
                last.with_timezone(&self.timezone).format(DATE_FORMAT),
                self.now.with_timezone(&self.timezone).format(DATE_FORMAT)
            ),
            None => "since yesterday".to_string(),
        }
    }

    fn watcher_info(&self) -> String {
        format!("hostname:{} ver:{}", self.host, self.version)
    }

    fn deployment_info(&self) -> String {
        format!(
            "in org:{} env:{}",
            self.deployment.organization, self.deployment.environment
        )
    }
}

/// Builds the webhook body for one alert destination type.
#[derive(Debug, Clone)]
pub struct MessageProducer {
    alert_type: AlertType,
    uri: String,
    icon_url: Option<String>,
    template: Option<Value>,
}

impl MessageProducer {
    pub fn new(alert: &AlertSection) -> Self {
        Self {
            alert_type: alert.alert_type,
            uri: alert.uri.clone(),
            icon_url: alert.icon_url.clone(),
            template: alert.template.clone(),
        }
    }

    /// Webhook body, or `None` when this destination has nothing to send.
    ///
    /// Slack and Google Chat only post when there is an elaboration and the
    /// URI belongs to the service.
    pub fn produce(&self, ctx: &NoticeContext) -> Option<Value> {
        match self.alert_type {
            AlertType::Slack => self.slack(ctx),
            AlertType::GoogleChat => self.google_chat(ctx),
            AlertType::Plain => Some(self.plain(ctx)),
        }
    }

    fn slack(&self, ctx: &NoticeContext) -> Option<Value> {
        if !self.uri.contains("hooks.slack.com") {
            warn!("alert uri is not a slack webhook, not posting");
            return None;
        }
        if ctx.elaboration.is_empty() {
            return None;
        }

        let text = ctx.summary(ctx.filtered_count);
        Some(json!({
            "icon_url": self.icon_url.as_deref().unwrap_or(DEFAULT_ICON_URL),
            "username": SLACK_USERNAME,
            "attachments": [{
                "title": SLACK_TITLE,
                "title_link": format!("https://apigee.com/organizations/{}", ctx.organization),
                "text": text,
                "fallback": text,
                "color": SLACK_COLOR,
                "fields": [
                    { "title": "Timebox", "short": false, "value": ctx.timebox() },
                    { "title": "Organization", "short": true, "value": ctx.organization },
                    { "title": "Watcher Info", "short": true, "value": ctx.watcher_info() },
                    { "title": "Changes", "short": false, "value": ctx.elaboration },
                ]
            }]
        }))
    }

    fn google_chat(&self, ctx: &NoticeContext) -> Option<Value> {
        if !self.uri.starts_with(GCHAT_PREFIX) {
            warn!("alert uri is not a google chat webhook, not posting");
            return None;
        }
        if ctx.elaboration.is_empty() {
            return None;
        }

        let text = GCHAT_TEMPLATE
            .replace("{{summary}}", &ctx.summary(ctx.filtered_count))
            .replace("{{timeRange}}", &ctx.timebox())
            .replace("{{organization}}", &ctx.organization)
            .replace("{{watcherInfo}}", &ctx.watcher_info())
            .replace("{{elaborations}}", &ctx.elaboration.replace('\n', "<br/>\n"));

        Some(json!({
            "sender": { "displayName": GCHAT_SENDER },
            "cards": [{
                "sections": [{
                    "widgets": [{ "textParagraph": { "text": text } }]
                }]
            }]
        }))
    }

    fn plain(&self, ctx: &NoticeContext) -> Value {
        let mut message = format!(
            "*Apigee Edge Updates*\nwatcher {}\n{}\n{}",
            ctx.deployment_info(),
            ctx.summary(ctx.novel_count),
            ctx.timebox()
        );
        if !ctx.elaboration.is_empty() {
            message.push_str(", including\n");
            message.push_str(&ctx.elaboration);
        }
        fill_template(self.template.as_ref(), &message)
    }
}

/// Substitute `%message%` in every top-level string of `template`, or wrap
/// the message as `{"text": ...}` when there is no template object.
pub fn fill_template(template: Option<&Value>, message: &str) -> Value {
    let Some(Value::Object(fields)) = template else {
        return json!({ "text": message });
    };

    let filled: Map<String, Value> = fields
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => Value::String(s.replacen("%message%", message, 1)),
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect();
    Value::Object(filled)
}

/// Posts JSON payloads to one webhook URI.
pub struct WebhookNotifier {
    client: Client,
    uri: String,
    token: Option<String>,
}

impl WebhookNotifier {
    pub fn new(client: Client, uri: &str, token: Option<String>) -> Self {
        Self {
            client,
            uri: uri.to_string(),
            token,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, payload: &Value) -> Result<()> {
        let mut request = self
            .client
            .post(&self.uri)
            .header("Accept", "application/json")
            .json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        debug!("POST {}", self.uri);
        let response = request
            .send()
            .await
            .map_err(|e| WatcherError::Notify(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WatcherError::Notify(format!("webhook returned HTTP {status}")));
        }
        info!("webhook delivered, status={}", status.as_u16());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn alert(alert_type: AlertType, uri: &str) -> AlertSection {
        AlertSection {
            alert_type,
            uri: uri.to_string(),
            icon_url: None,
            token: None,
            template: None,
        }
    }

    fn context(elaboration: &str) -> NoticeContext {
        NoticeContext {
            organization: "acme".into(),
            novel_count: 3,
            filtered_count: 1,
            elaboration: elaboration.into(),
            last_check: Some(Utc.with_ymd_and_hms(2024, 3, 5, 7, 4, 9).unwrap()),
            now: Utc.with_ymd_and_hms(2024, 3, 5, 17, 4, 9).unwrap(),
            timezone: chrono_tz::UTC,
            host: "box1".into(),
            version: "1.2.3".into(),
            deployment: Deployment {
                organization: "ops".into(),
                environment: "prod".into(),
            },
        }
    }

    #[test]
    fn summary_and_timebox() {
        let ctx = context("");
        assert_eq!(ctx.summary(1), "1 update has been made to org acme");
        assert_eq!(ctx.summary(0), "0 updates have been made to org acme");
        assert_eq!(
            ctx.timebox(),
            "between 2024 March 5 7:04:09 and 2024 March 5 17:04:09"
        );
        let first = NoticeContext {
            last_check: None,
            ..ctx
        };
        assert_eq!(first.timebox(), "since yesterday");
    }

    #[test]
    fn timebox_uses_configured_zone() {
        let pacific = NoticeContext {
            timezone: chrono_tz::America::Los_Angeles,
            ..context("")
        };
        assert_eq!(
            pacific.timebox(),
            "between 2024 March 4 23:04:09 and 2024 March 5 9:04:09"
        );

        let summer = NoticeContext {
            last_check: Some(Utc.with_ymd_and_hms(2024, 7, 1, 6, 30, 0).unwrap()),
            now: Utc.with_ymd_and_hms(2024, 7, 1, 16, 30, 0).unwrap(),
            timezone: chrono_tz::Europe::Berlin,
            ..context("")
        };
        assert_eq!(
            summer.timebox(),
            "between 2024 July 1 8:30:00 and 2024 July 1 18:30:00"
        );
    }

    #[test]
    fn slack_message_has_changes_field() {
        let producer = MessageProducer::new(&alert(
            AlertType::Slack,
            "https://hooks.slack.com/services/T/B/X",
        ));
        let body = producer.produce(&context("1 dev deleted\n")).unwrap();
        let attachment = &body["attachments"][0];
        assert_eq!(body["username"], SLACK_USERNAME);
        assert_eq!(body["icon_url"], DEFAULT_ICON_URL);
        assert_eq!(attachment["text"], "1 update has been made to org acme");
        assert_eq!(attachment["color"], "#d08f2c");
        assert_eq!(attachment["title_link"], "https://apigee.com/organizations/acme");
        let fields = attachment["fields"].as_array().unwrap();
        let titles: Vec<_> = fields.iter().map(|f| f["title"].as_str().unwrap()).collect();
        assert_eq!(titles, ["Timebox", "Organization", "Watcher Info", "Changes"]);
        assert_eq!(fields[2]["value"], "hostname:box1 ver:1.2.3");
        assert_eq!(fields[3]["value"], "1 dev deleted\n");
    }

    #[test]
    fn slack_and_chat_respect_uri_guards() {
        let ctx = context("1 dev deleted\n");
        let slack = MessageProducer::new(&alert(AlertType::Slack, "https://example.com/hook"));
        assert!(slack.produce(&ctx).is_none());
        let chat = MessageProducer::new(&alert(
            AlertType::GoogleChat,
            "https://example.com/chat.googleapis.com",
        ));
        assert!(chat.produce(&ctx).is_none());
    }

    #[test]
    fn slack_and_chat_skip_empty_elaboration() {
        let ctx = context("");
        let slack = MessageProducer::new(&alert(AlertType::Slack, "https://hooks.slack.com/x"));
        assert!(slack.produce(&ctx).is_none());
        let chat = MessageProducer::new(&alert(AlertType::GoogleChat, "https://chat.googleapis.com/v1/x"));
        assert!(chat.produce(&ctx).is_none());
    }

    #[test]
    fn google_chat_card_uses_html_breaks() {
        let producer = MessageProducer::new(&alert(
            AlertType::GoogleChat,
            "https://chat.googleapis.com/v1/spaces/S/messages?key=k",
        ));
        let body = producer
            .produce(&context("1 dev deleted\n\u{2022} d1 (user:a@x.com)\n"))
            .unwrap();
        assert_eq!(body["sender"]["displayName"], GCHAT_SENDER);
        let text = body["cards"][0]["sections"][0]["widgets"][0]["textParagraph"]["text"]
            .as_str()
            .unwrap();
        assert!(text.starts_with("<b>1 update has been made to org acme</b>"));
        assert!(text.ends_with("1 dev deleted<br/>\n\u{2022} d1 (user:a@x.com)<br/>\n"));
        assert!(!text.contains("{{"));
    }

    #[test]
    fn plain_message_without_template() {
        let producer = MessageProducer::new(&alert(AlertType::Plain, "https://example.com/hook"));
        let body = producer.produce(&context("1 dev deleted\n")).unwrap();
        let text = body["text"].as_str().unwrap();
        assert!(text.starts_with("*Apigee Edge Updates*\nwatcher in org:ops env:prod\n"));
        assert!(text.contains("3 updates have been made to org acme\n"));
        assert!(text.ends_with("17:04:09, including\n1 dev deleted\n"));

        let bare = producer.produce(&context("")).unwrap();
        assert!(bare["text"].as_str().unwrap().ends_with("17:04:09"));
    }

    #[test]
    fn template_fills_string_fields_only() {
        let template = json!({ "message": "Audit: %message%", "notify": true, "color": "green" });
        let filled = fill_template(Some(&template), "hello");
        assert_eq!(
            filled,
            json!({ "message": "Audit: hello", "notify": true, "color": "green" })
        );
        assert_eq!(fill_template(None, "hello"), json!({ "text": "hello" }));
        assert_eq!(fill_template(Some(&json!("x")), "hello"), json!({ "text": "hello" }));
    }
}
