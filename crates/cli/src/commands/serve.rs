//! `cuke serve`: line-delimited hook requests on stdin, responses on stdout.

use std::io;
use std::sync::Arc;

use anyhow::Context;
use cuke::env;
use cuke::{Host, PgConnector, Project};
use cuke_protocol::{HostMessage, HostResponse};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Counts reported when the input side closes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeSummary {
	pub requests: u64,
	pub failures: u64,
}

pub async fn execute(project: Project) -> Result<()> {
	let vars = env::capture(project.root())?;
	let host = Host::load(project, &vars, Arc::new(PgConnector))?;

	info!(target = "cuke.serve", root = %host.root().display(), "serving hook requests on stdin");
	let summary = serve(&host, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
	info!(target = "cuke.serve", requests = summary.requests, failures = summary.failures, "input closed, shutting down");
	Ok(())
}

/// Answers one response per request line, in order, until `reader` hits EOF
/// or `writer` reports a broken pipe.
pub async fn serve<R, W>(host: &Host, mut reader: R, mut writer: W) -> Result<ServeSummary>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let mut summary = ServeSummary::default();
	let mut buf = Vec::new();

	loop {
		buf.clear();
		let bytes = reader
			.read_until(b'\n', &mut buf)
			.await
			.context("failed reading hook request")?;
		if bytes == 0 {
			break;
		}

		let response = match std::str::from_utf8(&buf) {
			Ok(line) if line.trim().is_empty() => continue,
			Ok(line) => respond_line(host, line.trim()).await,
			Err(err) => {
				warn!(target = "cuke.serve", error = %err, "request is not UTF-8");
				HostResponse::failure(None, "INVALID_REQUEST", format!("request is not valid UTF-8: {err}"))
			}
		};

		summary.requests += 1;
		if !response.ok {
			summary.failures += 1;
		}

		match write_response(&mut writer, &response).await {
			Ok(()) => {}
			Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
				info!(target = "cuke.serve", "response consumer went away");
				break;
			}
			Err(err) => return Err(anyhow::Error::new(err).context("failed writing hook response").into()),
		}
	}

	Ok(summary)
}

async fn respond_line(host: &Host, line: &str) -> HostResponse {
	match serde_json::from_str::<HostMessage>(line) {
		Ok(message) => {
			debug!(target = "cuke.serve", id = ?message.id, event = message.request.event(), "request");
			host.respond(message).await
		}
		Err(err) => {
			warn!(target = "cuke.serve", error = %err, "malformed request");
			HostResponse::failure(request_id(line), "INVALID_REQUEST", err.to_string())
		}
	}
}

/// Best-effort id recovery so a malformed request still gets a correlated answer.
fn request_id(line: &str) -> Option<u64> {
	serde_json::from_str::<Value>(line).ok()?.get("id")?.as_u64()
}

async fn write_response<W>(writer: &mut W, response: &HostResponse) -> io::Result<()>
where
	W: AsyncWrite + Unpin,
{
	let mut payload = serde_json::to_vec(response).map_err(io::Error::other)?;
	payload.push(b'\n');
	writer.write_all(&payload).await?;
	writer.flush().await
}
