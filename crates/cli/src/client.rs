// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor client for CLI commands

use anyhow::{anyhow, Context, Result};
use ember_daemon::protocol::{wire, Request, Response};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UnixStream;

/// Timeout for plain request/reply operations (waiting operations are
/// unbounded; the job decides how long they take).
fn timeout_ipc() -> Duration {
    std::env::var("EMBER_TIMEOUT_IPC_MS")
        .ok()
        .and_then(|ms| ms.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(wire::DEFAULT_TIMEOUT)
}

/// Connection to the supervisor's control socket.
pub struct Client {
    socket_path: PathBuf,
}

impl Client {
    /// A client over the given socket, or the discovered default.
    pub fn new(socket: Option<PathBuf>) -> Self {
        Self {
            socket_path: socket.unwrap_or_else(ember_daemon::env::socket_path),
        }
    }

    async fn connect(&self) -> Result<UnixStream> {
        UnixStream::connect(&self.socket_path).await.with_context(|| {
            format!(
                "cannot connect to the supervisor at {} (is emberd running?)",
                self.socket_path.display()
            )
        })
    }

    /// Send one request and read one response.
    ///
    /// `bounded` applies the IPC timeout; waiting operations pass false and
    /// block until the supervisor answers.
    pub async fn request(&self, request: Request, bounded: bool) -> Result<Response> {
        let mut stream = self.connect().await?;
        let data = wire::encode(&request)?;
        wire::write_message(&mut stream, &data).await?;

        let bytes = if bounded {
            tokio::time::timeout(timeout_ipc(), wire::read_message(&mut stream))
                .await
                .map_err(|_| anyhow!("timed out waiting for the supervisor"))??
        } else {
            wire::read_message(&mut stream).await?
        };
        Ok(wire::decode(&bytes)?)
    }

    /// Request expecting a plain Ok; errors become CLI failures.
    pub async fn expect_ok(&self, request: Request, bounded: bool) -> Result<()> {
        match self.request(request, bounded).await? {
            Response::Ok => Ok(()),
            Response::Error { message } => Err(anyhow!(message)),
            other => Err(anyhow!("unexpected response: {other:?}")),
        }
    }
}

/// Turn an error response into a CLI failure, passing others through.
pub fn expect<T>(response: Response, extract: impl FnOnce(Response) -> Option<T>) -> Result<T> {
    match response {
        Response::Error { message } => Err(anyhow!(message)),
        other => {
            let detail = format!("unexpected response: {other:?}");
            extract(other).ok_or_else(|| anyhow!(detail))
        }
    }
}
