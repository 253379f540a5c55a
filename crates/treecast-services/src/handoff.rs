//! Single-use TCP transfers negotiated over the control plane.
//!
//! The peer that owns the file side of a request binds an ephemeral
//! listener, advertises its port in the `*-result`, accepts exactly one
//! connection, streams the whole file once and closes. There is no framing:
//! the sender closing its half ends the transfer.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("failed to bind transfer listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("nobody connected within {0:?}")]
    AcceptTimeout(Duration),
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot open {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stream interrupted: {0}")]
    Stream(#[source] std::io::Error),
}

/// Which way the bytes flow, from the listener's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Listener sends the file (answering a download).
    Serve,
    /// Listener writes what it receives (answering an upload).
    Receive,
}

/// An armed listener. `task` resolves to the byte count once the single
/// connection has been served.
pub struct FileListener {
    pub port: u16,
    pub task: JoinHandle<Result<u64, TransferError>>,
}

/// Bind an ephemeral port and serve one transfer of `local` on it.
///
/// The file is opened before this returns, in either direction, so a file
/// that cannot be read or written is reported here rather than after the
/// port has been advertised. A receiving file is only truncated once the
/// uploader has connected.
pub async fn listen(
    local: PathBuf,
    direction: Direction,
    accept_timeout: Duration,
) -> Result<FileListener, TransferError> {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        .await
        .map_err(TransferError::Bind)?;
    let port = listener.local_addr().map_err(TransferError::Bind)?.port();

    let file = match direction {
        Direction::Serve => open(&local).await?,
        Direction::Receive => open_for_write(&local).await?,
    };

    tracing::debug!(port, path = %local.display(), ?direction, "transfer listener armed");

    let task = tokio::spawn(async move {
        let result = serve_once(listener, file, direction, accept_timeout).await;
        match &result {
            Ok(bytes) => {
                tracing::info!(port, bytes, path = %local.display(), ?direction, "transfer served")
            }
            Err(e) => {
                tracing::warn!(port, error = %e, path = %local.display(), ?direction, "transfer failed")
            }
        }
        result
    });

    Ok(FileListener { port, task })
}

async fn serve_once(
    listener: TcpListener,
    mut file: File,
    direction: Direction,
    accept_timeout: Duration,
) -> Result<u64, TransferError> {
    let (mut stream, peer) = tokio::time::timeout(accept_timeout, listener.accept())
        .await
        .map_err(|_| TransferError::AcceptTimeout(accept_timeout))?
        .map_err(TransferError::Accept)?;
    drop(listener);

    tracing::debug!(%peer, "transfer connection accepted");

    match direction {
        Direction::Serve => {
            let n = tokio::io::copy(&mut file, &mut stream)
                .await
                .map_err(TransferError::Stream)?;
            stream.shutdown().await.map_err(TransferError::Stream)?;
            Ok(n)
        }
        Direction::Receive => {
            file.set_len(0).await.map_err(TransferError::Stream)?;
            let n = tokio::io::copy(&mut stream, &mut file)
                .await
                .map_err(TransferError::Stream)?;
            file.flush().await.map_err(TransferError::Stream)?;
            Ok(n)
        }
    }
}

/// Connect to a serving peer and write everything it sends to `dest`.
pub async fn fetch(host: &str, port: u16, dest: &Path) -> Result<u64, TransferError> {
    let mut stream = connect(host, port).await?;
    let mut file = create(dest).await?;
    let n = tokio::io::copy(&mut stream, &mut file)
        .await
        .map_err(TransferError::Stream)?;
    file.flush().await.map_err(TransferError::Stream)?;
    Ok(n)
}

/// Connect to a receiving peer and send the whole of `src`.
pub async fn push(host: &str, port: u16, src: &Path) -> Result<u64, TransferError> {
    let mut file = open(src).await?;
    let mut stream = connect(host, port).await?;
    let n = tokio::io::copy(&mut file, &mut stream)
        .await
        .map_err(TransferError::Stream)?;
    stream.shutdown().await.map_err(TransferError::Stream)?;
    Ok(n)
}

async fn connect(host: &str, port: u16) -> Result<TcpStream, TransferError> {
    TcpStream::connect((host, port))
        .await
        .map_err(|source| TransferError::Connect {
            addr: format!("{host}:{port}"),
            source,
        })
}

async fn open(path: &Path) -> Result<File, TransferError> {
    File::open(path).await.map_err(|source| TransferError::File {
        path: path.to_path_buf(),
        source,
    })
}

/// Writable handle on an existing or new file, left untruncated.
async fn open_for_write(path: &Path) -> Result<File, TransferError> {
    tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await
        .map_err(|source| TransferError::File {
            path: path.to_path_buf(),
            source,
        })
}

async fn create(path: &Path) -> Result<File, TransferError> {
    File::create(path).await.map_err(|source| TransferError::File {
        path: path.to_path_buf(),
        source,
    })
}
