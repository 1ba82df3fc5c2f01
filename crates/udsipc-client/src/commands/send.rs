//! Send command: one request, response payload printed to stdout.

use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::socket::UdsClient;

/// Sends `payload` and prints the response payload as (lossy) UTF-8.
///
/// A success response without payload prints nothing.
pub async fn run(
    config: ClientConfig,
    payload: String,
    timeout: Option<Duration>,
) -> ClientResult<()> {
    let client = UdsClient::new(config);
    let response = match timeout {
        Some(timeout) => client.send_with_timeout(payload, timeout).await?,
        None => client.send(payload).await?,
    };

    if let Some(bytes) = response {
        println!("{}", String::from_utf8_lossy(&bytes));
    }
    client.disconnect().await;
    Ok(())
}
