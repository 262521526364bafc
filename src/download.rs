/*============================================================
  Synavera Project: Syn-Tools
  Module: syntools_core::download
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Fetch remote archives into the staging directory with
    bounded retries and chunk-level progress reporting.

  Security / Safety Notes:
    Performs HTTP(S) GET requests to manifest-declared URLs
    only. Partial files are removed after a failed attempt.

  Dependencies:
    reqwest for HTTP, tokio for file I/O and backoff sleeps.

  Operational Scope:
    Driven by the installer for every entry needing a fetch.

  Revision History:
    2025-11-12 COD  Implemented retrying downloader.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Bounded retry logic with exponential backoff
    - Explicit socket timeouts on every connection
    - Failures surface as values, never panics
============================================================*/

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;

use crate::config::DownloadConfig;
use crate::error::{Result, SyntoolsError};
use crate::logger::Logger;

/// Progress callback: `(bytes_so_far, total_if_known)`.
pub type Progress<'a> = dyn FnMut(u64, Option<u64>) + Send + 'a;

/// A single, non-retrying transfer of `url` into `destination`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write the full body to `destination`, truncating it first.
    async fn fetch_once(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut Progress<'_>,
    ) -> Result<u64>;
}

/// reqwest-backed transport with connect and read timeouts.
///
/// Content-Encoding is never decoded: the staged file holds the bytes as
/// served, which is what the manifest size and digest describe.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .read_timeout(config.timeout())
            .no_gzip()
            .no_brotli()
            .user_agent("Syn-Tools-Core/0.4")
            .build()
            .map_err(|err| SyntoolsError::Network(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_once(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut Progress<'_>,
    ) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| SyntoolsError::Network(format!("GET {url}: {err}")))?;
        let total = response.content_length();

        let mut file = File::create(destination).await.map_err(|err| {
            SyntoolsError::Filesystem(format!(
                "Failed to create {}: {err}",
                destination.display()
            ))
        })?;

        let mut received = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| SyntoolsError::Network(format!("Reading {url}: {err}")))?
        {
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            progress(received, total);
        }
        file.flush().await?;
        Ok(received)
    }
}

/// Retry wrapper around a [`Transport`].
pub struct Downloader<T> {
    transport: T,
    max_attempts: usize,
    backoff_ms: u64,
}

impl<T: Transport> Downloader<T> {
    pub fn new(transport: T, config: &DownloadConfig) -> Self {
        Self {
            transport,
            max_attempts: config.max_attempts.max(1),
            backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Fetch `url` to `destination`, restarting from zero on every failure.
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut Progress<'_>,
        logger: &Logger,
    ) -> Result<u64> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.fetch_once(url, destination, progress).await {
                Ok(bytes) => {
                    logger.debug("FETCH", format!("{url}: {bytes} bytes on attempt {attempt}"));
                    return Ok(bytes);
                }
                Err(err @ SyntoolsError::Network(_)) => {
                    logger.warn(
                        "FETCH",
                        format!("Attempt {attempt}/{} for {url} failed: {err}", self.max_attempts),
                    );
                    remove_partial(destination, logger);
                    if attempt >= self.max_attempts {
                        return Err(SyntoolsError::TransportFailure {
                            url: url.to_string(),
                            attempts: attempt,
                            last_error: err.to_string(),
                        });
                    }
                    if self.backoff_ms > 0 {
                        let exponent = (attempt as u32 - 1).min(8);
                        sleep(Duration::from_millis(
                            self.backoff_ms.saturating_mul(1_u64 << exponent),
                        ))
                        .await;
                    }
                }
                Err(err) => {
                    remove_partial(destination, logger);
                    return Err(err);
                }
            }
        }
    }
}

fn remove_partial(destination: &Path, logger: &Logger) {
    match std::fs::remove_file(destination) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => logger.warn(
            "FETCH",
            format!("Failed to remove partial {}: {err}", destination.display()),
        ),
    }
}

/// Terminal progress renderer.
#[derive(Default)]
pub struct ConsoleProgress {
    drawn: bool,
}

impl ConsoleProgress {
    pub fn update(&mut self, so_far: u64, total: Option<u64>) {
        let mut out = std::io::stdout();
        let line = match total {
            Some(total) if total > 0 => {
                let percent = so_far as f64 * 100.0 / total as f64;
                let width = total.to_string().len();
                format!("\r{percent:5.1}% {so_far:>width$} / {total}")
            }
            _ => format!("\rread {so_far}"),
        };
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
        self.drawn = true;
    }

    /// Close the progress line.
    pub fn finish(&mut self) {
        if self.drawn {
            println!();
            self.drawn = false;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use httptest::{matchers::*, responders::*, Expectation, Server};

    /// Scripted transport. Each call pops the next response for the URL;
    /// the last scripted response repeats. `None` simulates a transport error.
    #[derive(Clone, Default)]
    pub(crate) struct FakeTransport {
        scripts: Arc<Mutex<HashMap<String, VecDeque<Option<Vec<u8>>>>>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeTransport {
        pub(crate) fn serve(self, url: &str, responses: Vec<Option<Vec<u8>>>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(url.to_string(), responses.into());
            self
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn fetch_once(
            &self,
            url: &str,
            destination: &Path,
            progress: &mut Progress<'_>,
        ) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = {
                let mut scripts = self.scripts.lock().unwrap();
                let queue = scripts
                    .get_mut(url)
                    .ok_or_else(|| SyntoolsError::Network(format!("unreachable {url}")))?;
                if queue.len() > 1 {
                    queue.pop_front().flatten()
                } else {
                    queue.front().cloned().flatten()
                }
            };
            match next {
                Some(body) => {
                    std::fs::write(destination, &body)?;
                    progress(body.len() as u64, Some(body.len() as u64));
                    Ok(body.len() as u64)
                }
                None => {
                    std::fs::write(destination, b"partial")?;
                    Err(SyntoolsError::Network("connection reset".into()))
                }
            }
        }
    }

    fn fast_config() -> DownloadConfig {
        DownloadConfig {
            retry_backoff_ms: 0,
            ..DownloadConfig::default()
        }
    }

    #[tokio::test]
    async fn retries_transport_errors_until_success() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.tar.gz");
        let transport = FakeTransport::default().serve(
            "https://x/a.tar.gz",
            vec![None, None, Some(b"payload".to_vec())],
        );
        let downloader = Downloader::new(transport.clone(), &fast_config());

        let bytes = downloader
            .fetch("https://x/a.tar.gz", &dest, &mut |_, _| {}, &Logger::console(false))
            .await
            .unwrap();
        assert_eq!(bytes, 7);
        assert_eq!(transport.call_count(), 3);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_and_removes_partial() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.tar.gz");
        let transport = FakeTransport::default().serve("https://x/a.tar.gz", vec![None]);
        let downloader = Downloader::new(transport.clone(), &fast_config());

        let err = downloader
            .fetch("https://x/a.tar.gz", &dest, &mut |_, _| {}, &Logger::console(false))
            .await
            .unwrap_err();
        assert!(matches!(err, SyntoolsError::TransportFailure { attempts: 3, .. }));
        assert_eq!(transport.call_count(), 3);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn http_transport_streams_body_and_reports_progress() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/dl/tool.tar.gz"))
                .respond_with(status_code(200).body("0123456789")),
        );
        let url = server.url("/dl/tool.tar.gz").to_string();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool.tar.gz");
        let transport = HttpTransport::new(&DownloadConfig::default()).unwrap();

        let mut last = (0, None);
        let bytes = transport
            .fetch_once(&url, &dest, &mut |so_far, total| last = (so_far, total))
            .await
            .unwrap();
        assert_eq!(bytes, 10);
        assert_eq!(last, (10, Some(10)));
        assert_eq!(std::fs::read(&dest).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn http_transport_keeps_content_encoded_bytes() {
        use flate2::{write::GzEncoder, Compression};

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"tar payload bytes").unwrap();
        let served = encoder.finish().unwrap();

        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/dl/tool.tar.gz")).respond_with(
                status_code(200)
                    .insert_header("Content-Encoding", "gzip")
                    .body(served.clone()),
            ),
        );
        let url = server.url("/dl/tool.tar.gz").to_string();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool.tar.gz");
        let transport = HttpTransport::new(&DownloadConfig::default()).unwrap();

        let mut last = (0, None);
        let bytes = transport
            .fetch_once(&url, &dest, &mut |so_far, total| last = (so_far, total))
            .await
            .unwrap();
        assert_eq!(bytes, served.len() as u64);
        assert_eq!(last, (served.len() as u64, Some(served.len() as u64)));
        assert_eq!(std::fs::read(&dest).unwrap(), served);
    }

    #[tokio::test]
    async fn local_write_errors_are_not_retried() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/dl/tool.tar.gz"))
                .times(1)
                .respond_with(status_code(200).body("0123456789")),
        );
        let url = server.url("/dl/tool.tar.gz").to_string();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("no-such-dir").join("tool.tar.gz");
        let downloader =
            Downloader::new(HttpTransport::new(&fast_config()).unwrap(), &fast_config());

        let err = downloader
            .fetch(&url, &dest, &mut |_, _| {}, &Logger::console(false))
            .await
            .unwrap_err();
        assert!(matches!(err, SyntoolsError::Filesystem(_)), "{err:?}");
    }

    #[tokio::test]
    async fn http_error_status_counts_as_transport_failure() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/missing.tar.gz"))
                .times(2)
                .respond_with(status_code(503)),
        );
        let url = server.url("/missing.tar.gz").to_string();
        let dir = tempfile::tempdir().unwrap();
        let config = DownloadConfig {
            max_attempts: 2,
            retry_backoff_ms: 0,
            ..DownloadConfig::default()
        };
        let downloader = Downloader::new(HttpTransport::new(&config).unwrap(), &config);

        let err = downloader
            .fetch(
                &url,
                &dir.path().join("missing.tar.gz"),
                &mut |_, _| {},
                &Logger::console(false),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyntoolsError::TransportFailure { attempts: 2, .. }));
    }
}
