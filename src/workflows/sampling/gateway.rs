use super::proxy::{proxy_url, rotate_with_probe};
use super::retry::{retry_with_policy, RetryPolicy};
use crate::workflows::cases::domain::{ReceiptNumber, StatusRecord, NO_DATA_TEXT};
use chrono::Utc;
use std::fmt::{self, Debug};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::info;

/// Endpoint answering case status form posts.
const CASE_STATUS_URL: &str = "https://egov.uscis.gov/casestatus/mycasestatus.do";

/// Plain-text service echoing the caller's public address.
const IP_PROBE_URL: &str = "https://ip.42.pl/short";

/// Budget for one remote call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Class of the page container holding the status sentence.
const STATUS_CONTAINER_CLASS: &str = "col-lg-12 appointment-sec center";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("case status request failed")]
    Http(#[from] reqwest::Error),
    #[error("proxy {proxy} still routes through the direct egress address")]
    ProxyUnverified { proxy: String },
    #[error("sampling runtime unavailable: {0}")]
    Runtime(String),
}

/// Boundary to the remote case status site. `fetch_status` owns retries and
/// proxy rotation; callers see one record per receipt.
pub trait CaseStatusGateway: Debug {
    fn fetch_status(&mut self, receipt: &ReceiptNumber) -> Result<StatusRecord, FetchError>;
}

/// Tuning for the remote client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub proxy_pool: Vec<String>,
    /// Rotate the egress proxy after this many fetches. Zero disables
    /// rotation.
    pub rotate_every: u32,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub rotation_retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            proxy_pool: Vec::new(),
            rotate_every: 100,
            timeout: REQUEST_TIMEOUT,
            retry: RetryPolicy::network(),
            rotation_retry: RetryPolicy::rotation(),
        }
    }
}

/// Thin wrapper around the reqwest client allowing synchronous workflows to
/// query the case status site without exposing async details.
pub struct UscisStatusClient {
    runtime: Runtime,
    direct: reqwest::Client,
    active: reqwest::Client,
    baseline_ip: Option<String>,
    fetches_done: u64,
    config: FetchConfig,
}

impl UscisStatusClient {
    /// Builds the runtime and the direct client. No traffic happens until
    /// the first fetch.
    pub fn connect(config: FetchConfig) -> Result<Self, FetchError> {
        let runtime = Runtime::new().map_err(|err| FetchError::Runtime(err.to_string()))?;
        let direct = Self::client_builder(config.timeout).build()?;

        Ok(Self {
            active: direct.clone(),
            direct,
            runtime,
            baseline_ip: None,
            fetches_done: 0,
            config,
        })
    }

    fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
        reqwest::Client::builder().timeout(timeout)
    }

    fn rotate_if_due(&mut self) -> Result<(), FetchError> {
        let every = self.config.rotate_every;
        if every == 0 || self.config.proxy_pool.is_empty() {
            return Ok(());
        }
        if self.fetches_done % u64::from(every) != 0 {
            return Ok(());
        }
        self.rotate()
    }

    /// Switches the active client to a pool proxy whose egress address
    /// differs from the direct one. The direct address is probed once and
    /// reused as the baseline for every later rotation.
    fn rotate(&mut self) -> Result<(), FetchError> {
        let baseline = match &self.baseline_ip {
            Some(ip) => ip.clone(),
            None => {
                let ip = retry_with_policy(self.config.rotation_retry, "egress probe", || {
                    Self::probe_egress(&self.runtime, &self.direct)
                })?;
                self.baseline_ip = Some(ip.clone());
                ip
            }
        };

        let timeout = self.config.timeout;
        let runtime = &self.runtime;
        let mut candidate = None;
        let selected = rotate_with_probe(
            &self.config.proxy_pool,
            &baseline,
            self.config.rotation_retry,
            |address| {
                let proxied = Self::client_builder(timeout)
                    .proxy(reqwest::Proxy::https(proxy_url(address))?)
                    .build()?;
                let egress_ip = Self::probe_egress(runtime, &proxied)?;
                candidate = Some(proxied);
                Ok(egress_ip)
            },
        )?;

        if let Some(proxy) = selected {
            if let Some(client) = candidate.take() {
                info!(proxy = %proxy.address, egress_ip = %proxy.egress_ip, "switched egress proxy");
                self.active = client;
            }
        }

        Ok(())
    }

    fn probe_egress(runtime: &Runtime, client: &reqwest::Client) -> Result<String, FetchError> {
        let ip = runtime.block_on(async {
            client
                .get(IP_PROBE_URL)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
        })?;
        Ok(ip.trim().to_string())
    }

    fn lookup_status_text(&self, receipt: &str) -> Result<String, FetchError> {
        let form = [
            ("changeLocale", ""),
            ("completedActionsCurrentPage", "0"),
            ("upcomingActionsCurrentPage", "0"),
            ("appReceiptNum", receipt),
            ("caseStatusSearchBtn", "CHECK+STATUS"),
        ];

        let body = self.runtime.block_on(async {
            self.active
                .post(CASE_STATUS_URL)
                .form(&form)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
        })?;

        Ok(extract_status_paragraph(&body).unwrap_or_else(|| NO_DATA_TEXT.to_string()))
    }
}

impl fmt::Debug for UscisStatusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UscisStatusClient")
            .field("fetches_done", &self.fetches_done)
            .field("rotate_every", &self.config.rotate_every)
            .finish_non_exhaustive()
    }
}

impl CaseStatusGateway for UscisStatusClient {
    fn fetch_status(&mut self, receipt: &ReceiptNumber) -> Result<StatusRecord, FetchError> {
        self.rotate_if_due()?;
        self.fetches_done += 1;

        let receipt_text = receipt.to_string();
        let retry = self.config.retry;
        let text = retry_with_policy(retry, "status lookup", || {
            self.lookup_status_text(&receipt_text)
        })?;

        Ok(StatusRecord {
            receipt: receipt_text,
            timestamp: Utc::now(),
            text,
        })
    }
}

/// Pulls the first paragraph out of the status container. The page nests
/// the sentence as `<div class="col-lg-12 appointment-sec center"> ...
/// <p>text</p>`. Pages without the container carry no case data.
fn extract_status_paragraph(body: &str) -> Option<String> {
    let class_marker = format!("class=\"{STATUS_CONTAINER_CLASS}\"");
    let container = body.find(&class_marker)?;
    let rest = &body[container + class_marker.len()..];

    let p_open = find_paragraph_open(rest)?;
    let after_tag = &rest[p_open..];
    let text_start = after_tag.find('>')? + 1;
    let text_end = after_tag.find("</p>")?;
    if text_end <= text_start {
        return None;
    }

    let text = decode_entities(after_tag[text_start..text_end].trim());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Finds a real `<p` tag open, skipping tags that merely start with the same
/// two characters.
fn find_paragraph_open(rest: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(found) = rest[from..].find("<p") {
        let at = from + found;
        match rest.as_bytes().get(at + 2) {
            Some(b'>') | Some(b' ') | Some(b'\n') | Some(b'\r') | Some(b'\t') => return Some(at),
            _ => from = at + 2,
        }
    }
    None
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_page(paragraph: &str) -> String {
        format!(
            "<html><body><div class=\"row\"><div class=\"col-lg-12 appointment-sec center\">\
             <div class=\"rows text-center\">{paragraph}</div></div></div></body></html>"
        )
    }

    #[test]
    fn extracts_the_status_paragraph() {
        let body = status_page("<h1>Case Was Approved</h1><p>On January 5, 2018, we approved your Form I-765.</p>");
        assert_eq!(
            extract_status_paragraph(&body).as_deref(),
            Some("On January 5, 2018, we approved your Form I-765.")
        );
    }

    #[test]
    fn attributed_paragraph_tags_still_match() {
        let body = status_page("<p class=\"text-center\">  On March 22, 2018, we ordered your new card for Receipt Number YSC1790095015.  </p>");
        assert_eq!(
            extract_status_paragraph(&body).as_deref(),
            Some("On March 22, 2018, we ordered your new card for Receipt Number YSC1790095015.")
        );
    }

    #[test]
    fn tags_sharing_the_prefix_are_skipped() {
        let body = status_page("<picture><img src=\"x.png\"></picture><p>On January 5, 2018, we approved your Form I-765.</p>");
        assert_eq!(
            extract_status_paragraph(&body).as_deref(),
            Some("On January 5, 2018, we approved your Form I-765.")
        );
    }

    #[test]
    fn pages_without_the_container_have_no_data() {
        assert_eq!(extract_status_paragraph("<html><body>maintenance</body></html>"), None);
        assert_eq!(extract_status_paragraph(""), None);
        assert_eq!(extract_status_paragraph(&status_page("<p>   </p>")), None);
    }

    #[test]
    fn entities_decode_in_a_single_pass() {
        let body = status_page("<p>we mailed a notice titled &quot;Case&nbsp;Update&quot; &amp; a card.</p>");
        assert_eq!(
            extract_status_paragraph(&body).as_deref(),
            Some("we mailed a notice titled \"Case Update\" & a card.")
        );
    }

    #[test]
    fn client_builds_with_default_config() {
        let client = UscisStatusClient::connect(FetchConfig::default()).expect("client builds");
        assert!(format!("{client:?}").contains("fetches_done"));
    }

    #[test]
    fn default_config_keeps_the_sampling_budget() {
        let config = FetchConfig::default();
        assert_eq!(config.rotate_every, 100);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.retry, RetryPolicy::network());
        assert_eq!(config.rotation_retry, RetryPolicy::rotation());
    }
}
