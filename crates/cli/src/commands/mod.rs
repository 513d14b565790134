pub mod bypass;
pub mod chain;
pub mod decide;
pub mod migrate;
pub mod policy;
pub mod seed;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use signoff_core::config::{AppConfig, LoadOptions};
use signoff_core::domain::request::{RequestKind, RequestRef};
use signoff_db::{connect_with_settings, DbPool};
use signoff_engine::ApprovalEngine;
use signoff_notify::WebhookNotifier;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| {
        format!("{{\"command\":\"{}\",\"status\":\"serialization_error\"}}", payload.command)
    })
}

pub(crate) type CommandFailure = (&'static str, String, u8);

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(command, "config_validation", format!("configuration issue: {error}"), 2)
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

pub(crate) async fn connect(config: &AppConfig) -> Result<DbPool, CommandFailure> {
    connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| ("db_connectivity", error.to_string(), 4))
}

/// Open the pool and wire an engine, attaching the webhook notifier when the
/// configuration enables it. Pending migrations are applied first, the same
/// way a server bootstrap would before serving.
pub(crate) async fn open_engine(
    config: &AppConfig,
) -> Result<(DbPool, ApprovalEngine), CommandFailure> {
    let pool = connect(config).await?;
    signoff_db::migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), 5))?;

    let mut engine = ApprovalEngine::for_pool(&pool);
    match WebhookNotifier::from_config(&config.notifier) {
        Ok(Some(notifier)) => {
            engine = engine.with_notification_sink(Arc::new(notifier));
        }
        Ok(None) => {}
        Err(error) => return Err(("notifier_init", error.to_string(), 4)),
    }

    Ok((pool, engine))
}

pub(crate) fn parse_kind(value: &str) -> Result<RequestKind, CommandFailure> {
    RequestKind::parse(value).ok_or_else(|| {
        (
            "invalid_request_kind",
            format!(
                "unknown request kind `{value}` (expected leave_request|purchase_request|asset_request)"
            ),
            7,
        )
    })
}

pub(crate) fn request_ref(kind: &str, id: &str) -> Result<RequestRef, CommandFailure> {
    Ok(RequestRef::new(parse_kind(kind)?, id))
}

pub(crate) fn failure_result(command: &str, failure: CommandFailure) -> CommandResult {
    let (error_class, message, exit_code) = failure;
    CommandResult::failure(command, error_class, message, exit_code)
}
