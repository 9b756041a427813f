//! Streaming archive download with progress reporting.

use std::io::Write;
use std::path::Path;

use futures_util::StreamExt;

use crate::UpdateError;

/// Incremental download progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadProgress {
    /// Total size known from `Content-Length`.
    Determinate {
        percent: u8,
        received: u64,
        total: u64,
    },
    /// Total size unknown.
    Indeterminate { received: u64 },
}

/// Callback invoked as download progress advances.
pub type ProgressFn = Box<dyn Fn(DownloadProgress) + Send + Sync>;

/// Streams the body at `url` into `dest`, reporting progress per chunk.
/// Returns the number of bytes received.
pub async fn download_to_file(
    http: &reqwest::Client,
    url: &str,
    dest: &Path,
    on_progress: Option<&ProgressFn>,
) -> Result<u64, UpdateError> {
    let resp = http.get(url).send().await?.error_for_status()?;
    let total = resp.content_length().filter(|t| *t > 0);

    let mut file = std::fs::File::create(dest)?;
    let mut received: u64 = 0;
    let mut last_percent: Option<u8> = None;

    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        received += chunk.len() as u64;

        if let Some(cb) = on_progress {
            match total {
                Some(total) => {
                    let percent = ((received * 100) / total).min(100) as u8;
                    // Only report whole-percent steps.
                    if last_percent != Some(percent) {
                        last_percent = Some(percent);
                        cb(DownloadProgress::Determinate {
                            percent,
                            received,
                            total,
                        });
                    }
                }
                None => cb(DownloadProgress::Indeterminate { received }),
            }
        }
    }

    file.flush()?;
    tracing::debug!(url, bytes = received, "download complete");
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_bytes(body: Vec<u8>) -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/archive.zip");

        let handle = tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let _ = stream.read(&mut buf).await;

                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(header.as_bytes()).await;
                let _ = stream.write_all(&body).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, handle)
    }

    #[tokio::test]
    async fn downloads_body_and_reports_percentages() {
        let body: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
        let (url, handle) = serve_bytes(body.clone()).await;

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("archive.zip");

        let seen: Arc<Mutex<Vec<DownloadProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let cb: ProgressFn = Box::new(move |p| seen2.lock().unwrap().push(p));

        let http = reqwest::Client::new();
        let received = download_to_file(&http, &url, &dest, Some(&cb)).await.unwrap();

        assert_eq!(received, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        match *seen.last().unwrap() {
            DownloadProgress::Determinate { percent, received, total } => {
                assert_eq!(percent, 100);
                assert_eq!(received, total);
            }
            other => panic!("expected determinate progress, got {other:?}"),
        }

        handle.abort();
    }

    #[tokio::test]
    async fn download_error_status_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/missing.zip");

        let handle = tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
                let _ = stream.shutdown().await;
            }
        });

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("missing.zip");
        let http = reqwest::Client::new();

        let result = download_to_file(&http, &url, &dest, None).await;
        assert!(matches!(result, Err(UpdateError::Http(_))));

        handle.abort();
    }
}
