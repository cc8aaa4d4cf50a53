use async_trait::async_trait;

use crate::aqi::{with_deadline, FetchClient, FetchError, Observation};
use crate::bridge::BridgeClient;

/// Something the poll loop can fetch observations from.
///
/// Implementations enforce their own deadline: a call must resolve (with
/// `FetchError::Timeout` if need be) and must not have effects after it
/// resolves.
#[async_trait]
pub trait FeedSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Observation, FetchError>;
}

/// The station feed, with the token read from the host on every cycle.
pub struct StationFeed {
    client: FetchClient,
    bridge: BridgeClient,
    secret_name: String,
}

impl StationFeed {
    pub fn new(client: FetchClient, bridge: BridgeClient, secret_name: &str) -> Self {
        Self {
            client,
            bridge,
            secret_name: secret_name.to_string(),
        }
    }
}

#[async_trait]
impl FeedSource for StationFeed {
    /// The token read and the request share one deadline, so a host that
    /// never answers still yields `Timeout`.
    async fn fetch(&self) -> Result<Observation, FetchError> {
        with_deadline(self.client.timeout(), async {
            let token = match self.bridge.get_secret(&self.secret_name).await {
                Ok(Some(token)) => token,
                Ok(None) => return Err(FetchError::MissingCredential),
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot read API token from host");
                    return Err(FetchError::MissingCredential);
                }
            };
            self.client.fetch(&token).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::channel;
    use std::time::Duration;
    use tokio::time::Instant;

    fn feed(bridge: BridgeClient) -> StationFeed {
        let client = FetchClient::new(
            reqwest::Client::new(),
            "https://feed.example.invalid",
            "A377965",
            Duration::from_secs(3),
        )
        .unwrap();
        StationFeed::new(client, bridge, "AQI_API_TOKEN")
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_host_times_out() {
        // The port stays open but nobody answers the secret request.
        let (bridge, _pushes, _port) = channel(4);
        let source = feed(bridge);

        let started = Instant::now();
        assert_eq!(source.fetch().await.unwrap_err(), FetchError::Timeout);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_host_is_missing_credential() {
        let (bridge, _pushes, port) = channel(4);
        drop(port);
        let source = feed(bridge);
        assert_eq!(
            source.fetch().await.unwrap_err(),
            FetchError::MissingCredential
        );
    }
}
