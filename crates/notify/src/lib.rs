//! Outbound delivery for approval events.
//!
//! Renders `ApprovalEvent`s into short human-readable messages and posts them
//! to a configured webhook. Delivery is best-effort by contract: the engine
//! logs and swallows every error returned from here, so a channel outage can
//! never fail an approval.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tera::{Context, Tera};

use signoff_core::config::NotifierConfig;
use signoff_core::events::{ApprovalEvent, NotificationSink, NotifyError};

const TEMPLATES: &[(&str, &str)] = &[
    (
        "chain_initialized",
        "{{ kind }} {{ request_id }} is waiting for {{ role }} approval (step {{ level }}).",
    ),
    (
        "chain_advanced",
        "{{ kind }} {{ request_id }} cleared step {{ approved_level }} and now needs \
         {{ role }} approval (step {{ level }}).",
    ),
    ("chain_completed", "{{ kind }} {{ request_id }} is fully approved."),
    ("chain_rejected", "{{ kind }} {{ request_id }} was rejected at step {{ level }}."),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedMessage {
    pub title: String,
    pub body: String,
}

/// Renders approval events with a fixed set of embedded templates.
pub struct EventRenderer {
    tera: Tera,
}

impl EventRenderer {
    pub fn new() -> Result<Self, NotifyError> {
        let mut tera = Tera::default();
        for (name, template) in TEMPLATES {
            tera.add_raw_template(name, template)
                .map_err(|err| NotifyError::Render(err.to_string()))?;
        }
        Ok(Self { tera })
    }

    pub fn render(&self, event: &ApprovalEvent) -> Result<RenderedMessage, NotifyError> {
        let mut context = Context::new();
        let request = event.request();
        context.insert("kind", kind_label(request.kind));
        context.insert("request_id", &request.id.0);

        let (template, title) = match event {
            ApprovalEvent::ChainInitialized { step, .. } => {
                context.insert("role", role_label(step.required_role));
                context.insert("level", &step.level_order);
                ("chain_initialized", "Approval needed")
            }
            ApprovalEvent::ChainAdvanced { approved_step, next_step, .. } => {
                context.insert("approved_level", &approved_step.level_order);
                context.insert("role", role_label(next_step.required_role));
                context.insert("level", &next_step.level_order);
                ("chain_advanced", "Approval needed")
            }
            ApprovalEvent::ChainCompleted { .. } => ("chain_completed", "Request approved"),
            ApprovalEvent::ChainRejected { rejected_step, .. } => {
                context.insert("level", &rejected_step.level_order);
                ("chain_rejected", "Request rejected")
            }
        };

        let body = self
            .tera
            .render(template, &context)
            .map_err(|err| NotifyError::Render(err.to_string()))?;

        Ok(RenderedMessage { title: title.to_string(), body })
    }
}

fn kind_label(kind: signoff_core::RequestKind) -> &'static str {
    match kind {
        signoff_core::RequestKind::LeaveRequest => "Leave request",
        signoff_core::RequestKind::PurchaseRequest => "Purchase request",
        signoff_core::RequestKind::AssetRequest => "Asset request",
    }
}

fn role_label(role: signoff_core::ApproverRole) -> &'static str {
    match role {
        signoff_core::ApproverRole::Manager => "manager",
        signoff_core::ApproverRole::HrManager => "HR",
        signoff_core::ApproverRole::FinanceManager => "finance",
        signoff_core::ApproverRole::Director => "director",
        signoff_core::ApproverRole::Employee => "employee",
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    event: &'a str,
    title: &'a str,
    body: &'a str,
    request_kind: &'a str,
    request_id: &'a str,
    recipients: Vec<&'a str>,
}

/// Posts rendered approval events to an HTTP webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    token: Option<SecretString>,
    renderer: EventRenderer,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        token: Option<SecretString>,
        timeout_secs: u64,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|err| NotifyError::Transport(err.to_string()))?;

        Ok(Self { client, url: url.into(), token, renderer: EventRenderer::new()? })
    }

    /// Build a notifier from configuration; `None` when delivery is disabled.
    pub fn from_config(config: &NotifierConfig) -> Result<Option<Self>, NotifyError> {
        if !config.enabled {
            return Ok(None);
        }
        let Some(url) = config.webhook_url.as_deref() else {
            return Ok(None);
        };

        Self::new(url, config.webhook_token.clone(), config.timeout_secs).map(Some)
    }

    fn payload<'a>(
        event: &'a ApprovalEvent,
        rendered: &'a RenderedMessage,
    ) -> WebhookPayload<'a> {
        let recipients = match event {
            ApprovalEvent::ChainInitialized { recipients, .. }
            | ApprovalEvent::ChainAdvanced { recipients, .. } => {
                recipients.iter().map(|contact| contact.email.as_str()).collect()
            }
            ApprovalEvent::ChainCompleted { .. } | ApprovalEvent::ChainRejected { .. } => {
                Vec::new()
            }
        };

        let request = event.request();
        WebhookPayload {
            event: event.event_type(),
            title: &rendered.title,
            body: &rendered.body,
            request_kind: request.kind.as_str(),
            request_id: &request.id.0,
            recipients,
        }
    }
}

#[async_trait::async_trait]
impl NotificationSink for WebhookNotifier {
    async fn deliver(&self, event: &ApprovalEvent) -> Result<(), NotifyError> {
        let rendered = self.renderer.render(event)?;
        let payload = Self::payload(event, &rendered);

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response =
            request.send().await.map_err(|err| NotifyError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Transport(format!(
                "webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(event_type = event.event_type(), "webhook notification delivered");
        Ok(())
    }
}
