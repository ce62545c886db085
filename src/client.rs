//! Thin client over `QueryService`, used by the terminal dashboard and
//! one-shot CLI adapters.

use tonic::transport::Channel;
use tonic::Request;

use crate::proto::query_service_client::QueryServiceClient;
use crate::proto::{GetApiRequestsRequest, GetApiRequestsResponse, GetStatsRequest, Stats};

pub struct QueryClient {
    inner: QueryServiceClient<Channel>,
}

impl QueryClient {
    pub async fn connect(endpoint: String) -> Result<Self, tonic::transport::Error> {
        let inner = QueryServiceClient::connect(endpoint).await?;
        Ok(Self { inner })
    }

    pub async fn get_stats(
        &self,
        start_unix_nano: Option<i64>,
        end_unix_nano: Option<i64>,
    ) -> Result<Stats, tonic::Status> {
        let mut client = self.inner.clone();
        let response = client
            .get_stats(Request::new(GetStatsRequest {
                start_unix_nano,
                end_unix_nano,
            }))
            .await?;
        Ok(response.into_inner())
    }

    pub async fn get_api_requests(
        &self,
        start_unix_nano: Option<i64>,
        end_unix_nano: Option<i64>,
        limit: u32,
        offset: u32,
    ) -> Result<GetApiRequestsResponse, tonic::Status> {
        let mut client = self.inner.clone();
        let response = client
            .get_api_requests(Request::new(GetApiRequestsRequest {
                start_unix_nano,
                end_unix_nano,
                limit,
                offset,
            }))
            .await?;
        Ok(response.into_inner())
    }
}
