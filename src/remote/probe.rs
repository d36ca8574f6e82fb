use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ConnectivityProbe, RemoteError};

/// Reachability check by HTTP GET. Any response, whatever its status,
/// counts as reachable.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Request(e.to_string()))?;
        Ok(Self { client, url: url.into(), timeout })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match tokio::time::timeout(self.timeout, self.client.get(&self.url).send()).await {
            Ok(Ok(response)) => {
                debug!(url = %self.url, status = response.status().as_u16(), "Probe reached remote");
                true
            }
            Ok(Err(e)) => {
                debug!(url = %self.url, error = %e, "Probe failed");
                false
            }
            Err(_) => {
                debug!(url = %self.url, timeout = ?self.timeout, "Probe timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    #[tokio::test]
    async fn test_any_status_is_reachable() {
        let app = Router::new().route("/", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let probe = HttpProbe::new(format!("http://{addr}/"), Duration::from_secs(2)).unwrap();
        assert!(probe.is_reachable().await);
    }

    #[tokio::test]
    async fn test_refused_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = HttpProbe::new(format!("http://{addr}/"), Duration::from_secs(2)).unwrap();
        assert!(!probe.is_reachable().await);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // Accepts the connection but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let probe = HttpProbe::new(format!("http://{addr}/"), Duration::from_millis(200)).unwrap();
        assert!(!probe.is_reachable().await);
    }
}
