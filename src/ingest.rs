//! OTLP log-export ingestion: selector, attribute parser, commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry_proto::tonic::collector::logs::v1::logs_service_server::LogsService;
use opentelemetry_proto::tonic::collector::logs::v1::{
    ExportLogsServiceRequest, ExportLogsServiceResponse,
};
use opentelemetry_proto::tonic::collector::metrics::v1::metrics_service_server::MetricsService;
use opentelemetry_proto::tonic::collector::metrics::v1::{
    ExportMetricsServiceRequest, ExportMetricsServiceResponse,
};
use opentelemetry_proto::tonic::collector::trace::v1::trace_service_server::TraceService;
use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use opentelemetry_proto::tonic::common::v1::any_value::Value as AnyValueKind;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue};
use opentelemetry_proto::tonic::logs::v1::LogRecord;
use tonic::{Request as TonicRequest, Response, Status};
use tracing::{debug, warn};

use crate::domain::{Cost, Model, Request, Token};
use crate::storage::StorageEngine;

/// The fixed log-record body that distinguishes ingestible records from
/// all other OTLP traffic.
pub const SELECTOR_BODY: &str = "claude_code.api_request";

fn string_value(value: &AnyValue) -> Option<&str> {
    match &value.value {
        Some(AnyValueKind::StringValue(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn attr<'a>(attributes: &'a [KeyValue], key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|kv| kv.key == key)
        .and_then(|kv| kv.value.as_ref())
        .and_then(string_value)
}

/// Parse a decimal-int attribute transmitted as a string. Defaults to 0
/// and logs a warning on failure — a malformed value never discards the
/// record.
fn parse_u64_attr(attributes: &[KeyValue], key: &str) -> u64 {
    match attr(attributes, key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, raw, "failed to parse integer attribute, defaulting to 0");
            0
        }),
        None => {
            warn!(key, "missing integer attribute, defaulting to 0");
            0
        }
    }
}

fn parse_f64_attr(attributes: &[KeyValue], key: &str) -> f64 {
    match attr(attributes, key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, raw, "failed to parse float attribute, defaulting to 0");
            0.0
        }),
        None => {
            warn!(key, "missing float attribute, defaulting to 0");
            0.0
        }
    }
}

/// Turn a selector-matched [`LogRecord`] into a [`Request`]. Every field
/// soft-fails to its documented default; the record is always produced.
fn parse_request(record: &LogRecord) -> Request {
    let session_id = attr(&record.attributes, "session.id").unwrap_or("").to_string();

    let timestamp = attr(&record.attributes, "event.timestamp")
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| {
            warn!("missing or unparsable event.timestamp, defaulting to now");
            Utc::now()
        });

    let model = Model::new(attr(&record.attributes, "model").unwrap_or(""));

    let token = Token::new(
        parse_u64_attr(&record.attributes, "input_tokens"),
        parse_u64_attr(&record.attributes, "output_tokens"),
        parse_u64_attr(&record.attributes, "cache_read_tokens"),
        parse_u64_attr(&record.attributes, "cache_creation_tokens"),
    );
    let cost = Cost::new(parse_f64_attr(&record.attributes, "cost_usd"));
    let duration_ms = parse_u64_attr(&record.attributes, "duration_ms");

    Request::new(session_id, timestamp, model, token, cost, duration_ms)
}

fn is_selected(record: &LogRecord) -> bool {
    record
        .body
        .as_ref()
        .and_then(string_value)
        .is_some_and(|body| body == SELECTOR_BODY)
}

pub struct LogsServiceImpl {
    storage: Arc<dyn StorageEngine>,
}

impl LogsServiceImpl {
    pub fn new(storage: Arc<dyn StorageEngine>) -> Self {
        Self { storage }
    }
}

#[tonic::async_trait]
impl LogsService for LogsServiceImpl {
    async fn export(
        &self,
        request: TonicRequest<ExportLogsServiceRequest>,
    ) -> Result<Response<ExportLogsServiceResponse>, Status> {
        let body = request.into_inner();
        for resource_logs in &body.resource_logs {
            for scope_logs in &resource_logs.scope_logs {
                for record in &scope_logs.log_records {
                    if !is_selected(record) {
                        debug!("discarding non-selected log record");
                        continue;
                    }
                    let parsed = parse_request(record);
                    if let Err(e) = self.storage.save(&parsed).await {
                        // Telemetry is advisory: the RPC still reports
                        // success so the emitter doesn't retry forever.
                        warn!(error = %e, "failed to persist ingested request");
                    }
                }
            }
        }
        Ok(Response::new(ExportLogsServiceResponse {
            partial_success: None,
        }))
    }
}

/// Accept-and-discard: satisfies the OTLP wire contract for emitters that
/// send traces/metrics alongside logs, without storing anything.
pub struct TraceServiceImpl;

#[tonic::async_trait]
impl TraceService for TraceServiceImpl {
    async fn export(
        &self,
        _request: TonicRequest<ExportTraceServiceRequest>,
    ) -> Result<Response<ExportTraceServiceResponse>, Status> {
        Ok(Response::new(ExportTraceServiceResponse {
            partial_success: None,
        }))
    }
}

/// Accept-and-discard: satisfies the OTLP wire contract for emitters that
/// send traces/metrics alongside logs, without storing anything.
pub struct MetricsServiceImpl;

#[tonic::async_trait]
impl MetricsService for MetricsServiceImpl {
    async fn export(
        &self,
        _request: TonicRequest<ExportMetricsServiceRequest>,
    ) -> Result<Response<ExportMetricsServiceResponse>, Status> {
        Ok(Response::new(ExportMetricsServiceResponse {
            partial_success: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorageEngine;
    use opentelemetry_proto::tonic::logs::v1::{ResourceLogs, ScopeLogs};

    fn kv(key: &str, value: &str) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(AnyValue {
                value: Some(AnyValueKind::StringValue(value.to_string())),
            }),
        }
    }

    fn body_record(body: &str, attributes: Vec<KeyValue>) -> LogRecord {
        LogRecord {
            body: Some(AnyValue {
                value: Some(AnyValueKind::StringValue(body.to_string())),
            }),
            attributes,
            ..Default::default()
        }
    }

    fn wrap(records: Vec<LogRecord>) -> ExportLogsServiceRequest {
        ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                resource: None,
                scope_logs: vec![ScopeLogs {
                    scope: None,
                    log_records: records,
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        }
    }

    #[test]
    fn selector_matches_exact_body_only() {
        let matched = body_record(SELECTOR_BODY, vec![]);
        let unmatched = body_record("something.else", vec![]);
        assert!(is_selected(&matched));
        assert!(!is_selected(&unmatched));
    }

    #[test]
    fn attribute_resilience_bad_integer_defaults_to_zero() {
        let record = body_record(
            SELECTOR_BODY,
            vec![
                kv("session.id", "s1"),
                kv("model", "claude-3-haiku"),
                kv("input_tokens", "not-a-number"),
                kv("output_tokens", "50"),
            ],
        );
        let parsed = parse_request(&record);
        assert_eq!(parsed.token.input, 0);
        assert_eq!(parsed.token.output, 50);
    }

    #[tokio::test]
    async fn non_selected_records_are_never_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn StorageEngine> =
            Arc::new(SqliteStorageEngine::open(dir.path().join("i.db")).unwrap());
        let service = LogsServiceImpl::new(storage.clone());

        let req = wrap(vec![body_record("unrelated", vec![kv("session.id", "s1")])]);
        let response = service.export(TonicRequest::new(req)).await;
        assert!(response.is_ok());
        assert!(storage.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn s1_selected_record_is_persisted_and_rpc_reports_success() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn StorageEngine> =
            Arc::new(SqliteStorageEngine::open(dir.path().join("i.db")).unwrap());
        let service = LogsServiceImpl::new(storage.clone());

        let record = body_record(
            SELECTOR_BODY,
            vec![
                kv("session.id", "s1"),
                kv("event.timestamp", "2024-06-29T12:00:00Z"),
                kv("model", "claude-3-sonnet-20240229"),
                kv("input_tokens", "100"),
                kv("output_tokens", "50"),
                kv("cache_read_tokens", "10"),
                kv("cache_creation_tokens", "5"),
                kv("cost_usd", "0.500000"),
                kv("duration_ms", "1000"),
            ],
        );

        let response = service.export(TonicRequest::new(wrap(vec![record]))).await;
        assert!(response.is_ok());

        let stored = storage.find_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].session_id, "s1");
        assert_eq!(stored[0].token.total(), 165);
    }

    #[tokio::test]
    async fn storage_failure_still_reports_rpc_success() {
        // A read-only engine rejects writes; the RPC must still succeed.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        SqliteStorageEngine::open(&path).unwrap(); // create the file first
        let storage: Arc<dyn StorageEngine> =
            Arc::new(SqliteStorageEngine::open_read_only(&path).unwrap());
        let service = LogsServiceImpl::new(storage);

        let record = body_record(SELECTOR_BODY, vec![kv("session.id", "s1")]);
        let response = service.export(TonicRequest::new(wrap(vec![record]))).await;
        assert!(response.is_ok());
    }
}
