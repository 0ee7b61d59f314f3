//! Prometheus scrape endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use nagflux_core::{MetricsCollector, PrometheusExporter};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serves `GET /metrics` in Prometheus text format.
pub struct MetricsServer {
    local_addr: SocketAddr,
    quit: CancellationToken,
    handle: JoinHandle<()>,
}

impl MetricsServer {
    pub async fn bind(listen: &str, metrics: Arc<MetricsCollector>) -> anyhow::Result<Self> {
        let exporter = Arc::new(PrometheusExporter::new(metrics));
        let app = Router::new()
            .route("/metrics", get(scrape))
            .with_state(exporter);

        let listener = tokio::net::TcpListener::bind(listen)
            .await
            .with_context(|| format!("could not bind metrics endpoint on `{listen}`"))?;
        let local_addr = listener.local_addr()?;
        info!(listen = %local_addr, "metrics endpoint up");

        let quit = CancellationToken::new();
        let shutdown = quit.clone();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
        });
        Ok(Self {
            local_addr,
            quit,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn stop(self) {
        self.quit.cancel();
        let _ = self.handle.await;
    }
}

async fn scrape(State(exporter): State<Arc<PrometheusExporter>>) -> String {
    exporter.export()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn scrape_endpoint_serves_the_collector() {
        let metrics = Arc::new(MetricsCollector::new());
        metrics.record_bytes_sent("influx", 42);

        let server = MetricsServer::bind("127.0.0.1:0", metrics).await.unwrap();

        let mut stream = tokio::net::TcpStream::connect(server.local_addr())
            .await
            .unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.0\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.0 200"));
        assert!(response.contains("nagflux_bytes_sent_total{target=\"influx\"} 42"));

        server.stop().await;
    }
}
