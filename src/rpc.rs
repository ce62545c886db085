//! Wires the custom `QueryService` and the OTLP ingest services onto a
//! single `tonic` server.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry_proto::tonic::collector::logs::v1::logs_service_server::LogsServiceServer;
use opentelemetry_proto::tonic::collector::metrics::v1::metrics_service_server::MetricsServiceServer;
use opentelemetry_proto::tonic::collector::trace::v1::trace_service_server::TraceServiceServer;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tonic::{Request as TonicRequest, Response, Status};

use crate::domain::{Cost as DomainCost, Model, Period, Request as DomainRequest, Stats as DomainStats, Token as DomainToken};
use crate::ingest::{LogsServiceImpl, MetricsServiceImpl, TraceServiceImpl};
use crate::proto::query_service_server::{QueryService, QueryServiceServer};
use crate::proto::{
    ApiRequest, Cost as WireCost, GetApiRequestsRequest, GetApiRequestsResponse, GetStatsRequest,
    Stats as WireStats, Token as WireToken,
};
use crate::query::QueryCore;
use crate::storage::StorageEngine;

fn wire_token(token: DomainToken) -> WireToken {
    WireToken {
        total: token.total(),
        input: token.input,
        output: token.output,
        cache_read: token.cache_read,
        cache_creation: token.cache_creation,
        limited: token.limited(),
        cache: token.cache(),
    }
}

fn wire_cost(cost: DomainCost) -> WireCost {
    WireCost { amount: cost.amount }
}

fn wire_stats(stats: DomainStats) -> WireStats {
    WireStats {
        base_requests: stats.base_requests,
        premium_requests: stats.premium_requests,
        total_requests: stats.total_requests(),
        base_tokens: Some(wire_token(stats.base_tokens)),
        premium_tokens: Some(wire_token(stats.premium_tokens)),
        total_tokens: Some(wire_token(stats.total_tokens())),
        base_cost: Some(wire_cost(stats.base_cost)),
        premium_cost: Some(wire_cost(stats.premium_cost)),
        total_cost: Some(wire_cost(stats.total_cost())),
    }
}

fn wire_request(request: &DomainRequest) -> ApiRequest {
    ApiRequest {
        session_id: request.session_id.clone(),
        timestamp_unix_nano: request.timestamp.timestamp_nanos_opt().unwrap_or(0),
        model: request.model.as_str().to_string(),
        input_tokens: request.token.input,
        output_tokens: request.token.output,
        cache_read_tokens: request.token.cache_read,
        cache_creation_tokens: request.token.cache_creation,
        total_tokens: request.token.total(),
        cost_usd: request.cost.amount,
        duration_ms: request.duration_ms,
    }
}

fn unix_nano_to_utc(nanos: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(nanos.div_euclid(1_000_000_000), nanos.rem_euclid(1_000_000_000) as u32)
        .unwrap_or_else(Utc::now)
}

fn period_from_bounds(start: Option<i64>, end: Option<i64>) -> Period {
    Period::from_bounds(start.map(unix_nano_to_utc), end.map(unix_nano_to_utc))
}

pub struct QueryServiceImpl {
    query: Arc<QueryCore>,
}

impl QueryServiceImpl {
    pub fn new(query: Arc<QueryCore>) -> Self {
        Self { query }
    }
}

#[tonic::async_trait]
impl QueryService for QueryServiceImpl {
    async fn get_stats(
        &self,
        request: TonicRequest<GetStatsRequest>,
    ) -> Result<Response<WireStats>, Status> {
        let body = request.into_inner();
        let period = period_from_bounds(body.start_unix_nano, body.end_unix_nano);
        let stats = self
            .query
            .calculate_stats(period)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(wire_stats(stats)))
    }

    async fn get_api_requests(
        &self,
        request: TonicRequest<GetApiRequestsRequest>,
    ) -> Result<Response<GetApiRequestsResponse>, Status> {
        let body = request.into_inner();
        let period = period_from_bounds(body.start_unix_nano, body.end_unix_nano);
        let (requests, total_count) = self
            .query
            .get_filtered_api_requests(period, body.limit as u64, body.offset as u64)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;

        Ok(Response::new(GetApiRequestsResponse {
            requests: requests.iter().map(wire_request).collect(),
            total_count,
        }))
    }
}

/// Assemble one `tonic` server hosting the query RPCs and the three OTLP
/// ingest RPCs on the same wire port.
pub fn build_router(storage: Arc<dyn StorageEngine>, query: Arc<QueryCore>) -> Router {
    Server::builder()
        .add_service(QueryServiceServer::new(QueryServiceImpl::new(query)))
        .add_service(LogsServiceServer::new(LogsServiceImpl::new(storage)))
        .add_service(TraceServiceServer::new(TraceServiceImpl))
        .add_service(MetricsServiceServer::new(MetricsServiceImpl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::build as build_cache;
    use crate::storage::SqliteStorageEngine;
    use std::time::Duration;

    #[tokio::test]
    async fn get_stats_absent_bounds_means_all_time() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn StorageEngine> =
            Arc::new(SqliteStorageEngine::open(dir.path().join("rpc.db")).unwrap());
        let cache = build_cache(false, Duration::from_secs(60));
        let query = Arc::new(QueryCore::new(storage, cache));
        let service = QueryServiceImpl::new(query);

        let response = service
            .get_stats(TonicRequest::new(GetStatsRequest {
                start_unix_nano: None,
                end_unix_nano: None,
            }))
            .await
            .unwrap();
        assert_eq!(response.into_inner().total_requests, 0);
    }

    #[tokio::test]
    async fn get_api_requests_reports_total_count() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn StorageEngine> =
            Arc::new(SqliteStorageEngine::open(dir.path().join("rpc2.db")).unwrap());
        storage
            .save(&DomainRequest::new(
                "s1",
                Utc::now(),
                Model::new("claude-3-haiku"),
                DomainToken::default(),
                DomainCost::default(),
                0,
            ))
            .await
            .unwrap();

        let cache = build_cache(false, Duration::from_secs(60));
        let query = Arc::new(QueryCore::new(storage, cache));
        let service = QueryServiceImpl::new(query);

        let response = service
            .get_api_requests(TonicRequest::new(GetApiRequestsRequest {
                start_unix_nano: None,
                end_unix_nano: None,
                limit: 0,
                offset: 0,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.total_count, 1);
        assert_eq!(response.requests.len(), 1);
    }
}
