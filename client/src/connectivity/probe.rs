//! Health probe that feeds the connectivity observer.

use std::time::Duration;

use reqwest::Client;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::ConnectivityObserver;

/// Polls the remote `/health` endpoint.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
    interval: Duration,
}

impl HttpProbe {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/health", base_url.trim_end_matches('/')),
            interval,
        })
    }

    /// One probe: `(is_connected, is_internet_reachable)`.
    ///
    /// A timeout still counts as connected; only an answered 2xx counts as reachable.
    pub async fn check(&self) -> (bool, bool) {
        match self.client.get(&self.url).send().await {
            Ok(response) => (true, response.status().is_success()),
            Err(e) if e.is_timeout() => (true, false),
            Err(e) => {
                tracing::trace!(error = %e, "Health probe failed");
                (false, false)
            }
        }
    }

    /// Probe forever, reporting every result to `observer`.
    pub fn spawn(self, observer: ConnectivityObserver) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let (connected, reachable) = self.check().await;
                observer.report(connected, reachable);
            }
        })
    }
}
