//! One benchmark attempt

use std::time::Instant;

use super::stats::RequestOutcome;
use crate::client::{BodyMode, HttpClient};
use crate::errors::Result;
use crate::request::RequestFactory;

/// Send one freshly built request and classify what happened
///
/// Transport failures are part of the outcome. The only `Err` is a request
/// that could not be built, which ends the whole benchmark.
pub async fn run_cycle<C: HttpClient>(client: &C, requests: &RequestFactory) -> Result<RequestOutcome> {
    let request = requests.build()?;

    let start = Instant::now();
    let result = client.send(request, BodyMode::Discard).await;
    let elapsed = start.elapsed();

    Ok(match result {
        Ok(resp) => RequestOutcome::status(resp.status.as_u16(), elapsed),
        Err(e) => RequestOutcome::error(e.to_string(), elapsed),
    })
}
