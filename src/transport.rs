//! HTTP transport construction.

use std::time::Duration;
use tracing::{debug, warn};

use crate::endpoint::EndpointConfig;
use crate::error::ClientResult;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("gcs-redirector/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the HTTP client used for every request of one storage client.
///
/// With `insecure_tls` set, certificate validation is disabled and a single
/// warning is logged here. Requests made through the returned client log
/// nothing further about it.
pub fn build_http_client(config: &EndpointConfig) -> ClientResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(config.timeout));

    if config.insecure_tls {
        warn!(
            endpoint = %config.internal_base_url,
            "TLS certificate validation disabled; connections to this endpoint are insecure"
        );
        builder = builder.danger_accept_invalid_certs(true);
    }

    debug!(
        endpoint = %config.internal_base_url,
        timeout_secs = config.timeout.as_secs(),
        "built HTTP transport"
    );

    Ok(builder.build()?)
}
