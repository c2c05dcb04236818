//! Nginx Collector
//!
//! Scrapes the `stub_status` page of a local nginx:
//!
//! ```text
//! Active connections: 291
//! server accepts handled requests
//!  16630948 16630948 31070465
//! Reading: 6 Writing: 179 Waiting: 106
//! ```
//!
//! Connection counts become gauges; the accepts/handled/requests totals are
//! cumulative and go through the delta tracker.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::collector::{Collector, CollectorBase};
use crate::context::MetricsContext;
use crate::error::{Error, Result};

pub const PREFIX: &str = "nginx";

// =============================================================================
// Configuration
// =============================================================================

/// `[collector.nginx]` section
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct NginxConfig {
    pub enable: bool,

    /// stub_status page URL
    pub url: String,

    /// Whole-request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for NginxConfig {
    fn default() -> Self {
        Self {
            enable: false,
            url: "http://127.0.0.1/nginx_status".to_string(),
            timeout_seconds: 3,
        }
    }
}

// =============================================================================
// Status Page
// =============================================================================

/// Parsed `stub_status` page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StubStatus {
    pub active: i64,
    pub accepts: i64,
    pub handled: i64,
    pub requests: i64,
    pub reading: i64,
    pub writing: i64,
    pub waiting: i64,
}

fn parse_number(field: &str, raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .map_err(|_| Error::NginxStatus(format!("{} is not a number: {:?}", field, raw)))
}

/// Parse the body of a `stub_status` page
pub fn parse_stub_status(body: &str) -> Result<StubStatus> {
    let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 4 {
        return Err(Error::NginxStatus(format!(
            "expected 4 lines, got {}",
            lines.len()
        )));
    }

    let active = lines[0]
        .split_once(':')
        .map(|(_, v)| v)
        .ok_or_else(|| Error::NginxStatus(format!("bad active line: {:?}", lines[0])))?;

    let totals: Vec<&str> = lines[2].split_whitespace().collect();
    if totals.len() < 3 {
        return Err(Error::NginxStatus(format!("bad totals line: {:?}", lines[2])));
    }

    // "Reading: 6 Writing: 179 Waiting: 106"
    let rw: Vec<&str> = lines[3].split_whitespace().collect();
    if rw.len() < 6 {
        return Err(Error::NginxStatus(format!("bad state line: {:?}", lines[3])));
    }

    Ok(StubStatus {
        active: parse_number("active", active)?,
        accepts: parse_number("accepts", totals[0])?,
        handled: parse_number("handled", totals[1])?,
        requests: parse_number("requests", totals[2])?,
        reading: parse_number("reading", rw[1])?,
        writing: parse_number("writing", rw[3])?,
        waiting: parse_number("waiting", rw[5])?,
    })
}

// =============================================================================
// Collector
// =============================================================================

/// Collector for nginx `stub_status`
pub struct NginxCollector {
    base: CollectorBase,
    client: Client,
    url: String,
}

impl NginxCollector {
    pub fn new(config: &NginxConfig, ctx: &MetricsContext) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            base: CollectorBase::new(PREFIX, ctx),
            client,
            url: config.url.clone(),
        })
    }

    pub fn base(&self) -> &CollectorBase {
        &self.base
    }

    /// Fetch the page body, recording the failure category on error
    async fn fetch(&self) -> Option<String> {
        let url = match Url::parse(&self.url) {
            Ok(url) => url,
            Err(e) => {
                self.base.on_err(
                    "error_parse_address",
                    anyhow::anyhow!("error parsing address {:?}: {}", self.url, e),
                );
                return None;
            }
        };

        let response = match self.client.get(url.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                self.base.on_err(
                    "error_making_request",
                    anyhow::anyhow!("error making HTTP request to {}: {}", url, e),
                );
                return None;
            }
        };

        if !response.status().is_success() {
            self.base.on_err(
                "error_response",
                anyhow::anyhow!("response from {}: {}", url, response.status()),
            );
            return None;
        }

        match response.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                self.base.on_err("error_read_string", e);
                None
            }
        }
    }

    /// Write one parsed page into the registry
    pub fn record(&self, status: &StubStatus) {
        self.base.gauge_update("active", status.active);
        self.base.gauge_update("reading", status.reading);
        self.base.gauge_update("writing", status.writing);
        self.base.gauge_update("waiting", status.waiting);

        self.base.counter_inc_total("accepts", status.accepts);
        self.base.counter_inc_total("handled", status.handled);
        self.base.counter_inc_total("requests", status.requests);
    }
}

#[async_trait]
impl Collector for NginxCollector {
    fn prefix(&self) -> &str {
        self.base.prefix()
    }

    #[instrument(skip(self))]
    async fn collect(&self) {
        let Some(body) = self.fetch().await else {
            return;
        };

        match parse_stub_status(&body) {
            Ok(status) => {
                debug!(?status, "Scraped stub_status");
                self.record(&status);
            }
            Err(e) => self.base.on_err("error_read_lines", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricSnapshot;
    use assert_matches::assert_matches;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const PAGE: &str = "Active connections: 291 \n\
                        server accepts handled requests\n \
                        16630948 16630948 31070465 \n\
                        Reading: 6 Writing: 179 Waiting: 106 \n";

    fn value(ctx: &MetricsContext, name: &str) -> i64 {
        match ctx.registry().get(name).unwrap().snapshot() {
            MetricSnapshot::Gauge(g) => g.value(),
            MetricSnapshot::Counter(c) => c.count(),
            other => panic!("unexpected snapshot {:?}", other),
        }
    }

    /// Serve `body` with `status` to every connection
    async fn serve(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        format!("http://{}/nginx_status", addr)
    }

    fn collector(url: String, ctx: &MetricsContext) -> NginxCollector {
        let config = NginxConfig {
            enable: true,
            url,
            timeout_seconds: 2,
        };
        NginxCollector::new(&config, ctx).unwrap()
    }

    // =========================================================================
    // Parser Tests
    // =========================================================================

    #[test]
    fn test_parse_stub_status() {
        let status = parse_stub_status(PAGE).unwrap();
        assert_eq!(
            status,
            StubStatus {
                active: 291,
                accepts: 16630948,
                handled: 16630948,
                requests: 31070465,
                reading: 6,
                writing: 179,
                waiting: 106,
            }
        );
    }

    #[test]
    fn test_parse_too_few_lines() {
        assert_matches!(
            parse_stub_status("Active connections: 1\n"),
            Err(Error::NginxStatus(_))
        );
    }

    #[test]
    fn test_parse_garbage_number() {
        let page = PAGE.replace("179", "many");
        assert_matches!(parse_stub_status(&page), Err(Error::NginxStatus(msg)) if msg.contains("writing"));
    }

    #[test]
    fn test_default_config() {
        let config = NginxConfig::default();
        assert!(!config.enable);
        assert_eq!(config.url, "http://127.0.0.1/nginx_status");
    }

    // =========================================================================
    // Collector Tests
    // =========================================================================

    #[test]
    fn test_record_uses_deltas_for_totals() {
        let ctx = MetricsContext::standalone();
        let nginx = collector("http://127.0.0.1/nginx_status".into(), &ctx);

        let mut status = parse_stub_status(PAGE).unwrap();
        nginx.record(&status);
        status.requests += 25;
        status.active = 12;
        nginx.record(&status);

        assert_eq!(value(&ctx, "nginx.active"), 12);
        assert_eq!(value(&ctx, "nginx.requests"), 25);
        assert_eq!(value(&ctx, "nginx.accepts"), 0);
    }

    #[tokio::test]
    async fn test_collect_from_server() {
        let url = serve("200 OK", PAGE.to_string()).await;
        let ctx = MetricsContext::standalone();
        let nginx = collector(url, &ctx);

        nginx.collect().await;

        assert_eq!(value(&ctx, "nginx.active"), 291);
        assert_eq!(value(&ctx, "nginx.waiting"), 106);
        assert_eq!(nginx.base().errors().total(), 0);
    }

    #[tokio::test]
    async fn test_collect_error_response() {
        let url = serve("500 Internal Server Error", String::new()).await;
        let ctx = MetricsContext::standalone();
        let nginx = collector(url, &ctx);

        nginx.collect().await;

        assert_eq!(nginx.base().last_error("error_response").unwrap().count, 1);
        assert_eq!(value(&ctx, "nginx.error.error_response"), 1);
        assert!(ctx.registry().get("nginx.active").is_none());
    }

    #[tokio::test]
    async fn test_collect_bad_page() {
        let url = serve("200 OK", "hello".to_string()).await;
        let ctx = MetricsContext::standalone();
        let nginx = collector(url, &ctx);

        nginx.collect().await;

        assert_eq!(nginx.base().last_error("error_read_lines").unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_collect_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ctx = MetricsContext::standalone();
        let nginx = collector(format!("http://{}/nginx_status", addr), &ctx);
        nginx.collect().await;
        nginx.collect().await;

        assert_eq!(
            nginx.base().last_error("error_making_request").unwrap().count,
            2
        );
    }

    #[tokio::test]
    async fn test_collect_bad_url() {
        let ctx = MetricsContext::standalone();
        let nginx = collector("not a url".into(), &ctx);
        nginx.collect().await;

        assert!(nginx.base().last_error("error_parse_address").is_some());
    }
}
