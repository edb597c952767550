//! The message loop.
//!
//! Single-threaded, single-request-at-a-time: each frame is read, validated,
//! dispatched to completion (including subprocess waits and retry delays),
//! and answered before the next frame is read. Exactly one response frame is
//! written per request frame, in order. The loop ends only on clean
//! end-of-stream; every other failure is answered and survived.

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info};

use crate::dispatch::Dispatcher;
use crate::protocol::{self, invalid_input_response, Request};
use crate::transport::{read_frame, write_frame, FrameError};

async fn respond<W: AsyncWrite + Unpin>(writer: &mut W, response: &Value) -> Result<()> {
    let payload = serde_json::to_vec(response).context("Failed to encode response")?;
    match write_frame(writer, &payload).await {
        Ok(()) => Ok(()),
        // The cap is checked before any bytes go out, so the stream is still
        // clean: substitute an error frame and keep the request answered.
        Err(FrameError::OutgoingTooLarge { len, max }) => {
            error!(len, max, "response exceeds outgoing frame cap");
            let substitute = protocol::error_response(format!(
                "Response too large: {len} bytes exceeds limit of {max}"
            ));
            let payload =
                serde_json::to_vec(&substitute).context("Failed to encode error response")?;
            write_frame(writer, &payload)
                .await
                .context("Failed to write error response frame")?;
            Ok(())
        }
        Err(e) => Err(e).context("Failed to write response frame"),
    }
}

/// Run the message loop over arbitrary streams until end-of-stream.
pub async fn run_message_loop<R, W>(
    reader: &mut R,
    writer: &mut W,
    dispatcher: &Dispatcher,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("native messaging host started");

    loop {
        let payload = match read_frame(reader).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                info!("input stream closed, exiting message loop");
                return Ok(());
            }
            Err(e) => {
                // Malformed frame: answer and keep reading. A truncated
                // stream resolves to clean EOF on the next iteration.
                error!(error = %e, "failed to read frame");
                respond(writer, &protocol::error_response(e.to_string())).await?;
                continue;
            }
        };

        let message: Value = match serde_json::from_slice(&payload) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "frame payload is not valid JSON");
                respond(writer, &protocol::error_response(format!("Invalid JSON payload: {e}")))
                    .await?;
                continue;
            }
        };

        if !protocol::validate(&message) {
            respond(writer, &invalid_input_response()).await?;
            continue;
        }

        // The validator accepted the shape, so lifting cannot fail; treat a
        // disagreement as a validation failure rather than panicking.
        let Some(request) = Request::from_value(&message) else {
            error!("validated message failed typed conversion");
            respond(writer, &invalid_input_response()).await?;
            continue;
        };

        debug!(request = ?request, "dispatching request");
        let response = dispatcher.dispatch(request).await;
        respond(writer, &response).await?;
    }
}

/// Run the message loop over the process's standard streams.
pub async fn serve_stdio(dispatcher: &Dispatcher) -> Result<()> {
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    run_message_loop(&mut stdin, &mut stdout, dispatcher).await
}
