//! `grpc.health.v1.Health` backed by the [`HealthRegistry`].
//!
//! This is the fine-grained probe: it reports exactly what the registry holds,
//! unlike the HTTP liveness endpoint.
use std::{pin::Pin, sync::Arc};

use futures_util::{Stream, StreamExt, stream};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tonic::{Request, Response, Status};

use crate::{
    core::health::{HealthRegistry, ServingStatus},
    proto::grpc::health::v1::{
        HealthCheckRequest, HealthCheckResponse,
        health_check_response::ServingStatus as ProtoStatus,
        health_server::{Health, HealthServer},
    },
};

fn to_proto(status: ServingStatus) -> ProtoStatus {
    match status {
        ServingStatus::Unknown => ProtoStatus::Unknown,
        ServingStatus::Serving => ProtoStatus::Serving,
        ServingStatus::NotServing => ProtoStatus::NotServing,
    }
}

fn response(status: ProtoStatus) -> HealthCheckResponse {
    HealthCheckResponse {
        status: status as i32,
    }
}

pub struct HealthService {
    registry: Arc<HealthRegistry>,
}

impl HealthService {
    pub fn new(registry: Arc<HealthRegistry>) -> Self {
        Self { registry }
    }

    pub fn into_server(self) -> HealthServer<Self> {
        HealthServer::new(self)
    }
}

#[tonic::async_trait]
impl Health for HealthService {
    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let service = request.into_inner().service;
        let status = self.registry.status(&service).await;
        tracing::trace!(service = %service, status = %status, "health check");
        Ok(Response::new(response(to_proto(status))))
    }

    type WatchStream = Pin<Box<dyn Stream<Item = Result<HealthCheckResponse, Status>> + Send>>;

    async fn watch(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let service = request.into_inner().service;

        // Subscribe before reading so no transition slips between the two.
        let changes = self.registry.subscribe();
        let initial = if self.registry.is_tracked(&service).await {
            to_proto(self.registry.status(&service).await)
        } else {
            ProtoStatus::ServiceUnknown
        };

        let updates = BroadcastStream::new(changes).filter_map(move |change| {
            let service = service.clone();
            async move {
                match change {
                    Ok(change) if change.service == service => {
                        Some(Ok(response(to_proto(change.status))))
                    }
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "health watcher lagged behind");
                        None
                    }
                }
            }
        });

        let stream = stream::once(async move { Ok(response(initial)) }).chain(updates);
        Ok(Response::new(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(service: &str) -> Request<HealthCheckRequest> {
        Request::new(HealthCheckRequest {
            service: service.to_string(),
        })
    }

    #[tokio::test]
    async fn test_check_reports_registry_status() {
        let registry = Arc::new(HealthRegistry::new());
        registry
            .mark_serving("envoy.service.ext_proc.v3.ExternalProcessor")
            .await;
        let service = HealthService::new(registry.clone());

        let status = service
            .check(request("envoy.service.ext_proc.v3.ExternalProcessor"))
            .await
            .unwrap()
            .into_inner()
            .status;
        assert_eq!(status, ProtoStatus::Serving as i32);

        let overall = service.check(request("")).await.unwrap().into_inner().status;
        assert_eq!(overall, ProtoStatus::Serving as i32);

        registry.set_status("", ServingStatus::NotServing).await;
        let overall = service.check(request("")).await.unwrap().into_inner().status;
        assert_eq!(overall, ProtoStatus::NotServing as i32);
    }

    #[tokio::test]
    async fn test_check_unknown_service() {
        let service = HealthService::new(Arc::new(HealthRegistry::new()));
        let status = service
            .check(request("not.registered"))
            .await
            .unwrap()
            .into_inner()
            .status;
        assert_eq!(status, ProtoStatus::Unknown as i32);
    }

    #[tokio::test]
    async fn test_watch_streams_changes() {
        let registry = Arc::new(HealthRegistry::new());
        registry.set_status("svc", ServingStatus::Serving).await;
        let service = HealthService::new(registry.clone());

        let mut updates = service.watch(request("svc")).await.unwrap().into_inner();
        let first = updates.next().await.unwrap().unwrap();
        assert_eq!(first.status, ProtoStatus::Serving as i32);

        registry.set_status("other", ServingStatus::NotServing).await;
        registry.set_status("svc", ServingStatus::NotServing).await;

        let next = updates.next().await.unwrap().unwrap();
        assert_eq!(next.status, ProtoStatus::NotServing as i32);
    }

    #[tokio::test]
    async fn test_watch_untracked_service() {
        let service = HealthService::new(Arc::new(HealthRegistry::new()));
        let mut updates = service.watch(request("ghost")).await.unwrap().into_inner();
        let first = updates.next().await.unwrap().unwrap();
        assert_eq!(first.status, ProtoStatus::ServiceUnknown as i32);
    }
}
