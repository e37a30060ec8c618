//! Access-log line parser: one raw ALB line -> one typed [`RequestRecord`].

mod convert;
mod tokenize;
mod user_agent;

pub use convert::{to_float, to_int};
pub use tokenize::split;
pub use user_agent::{RuleClassifier, UaClassifier, UaFamilies};

use crate::config::ParserConfig;
use crate::error::ParseFailure;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use chrono_tz::Tz;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Field order of an ALB access-log line. Lines may carry extra trailing fields.
pub const ELB_LOG_COLUMNS: [&str; 29] = [
    "type",
    "time",
    "elb",
    "client_ip_port",
    "target_ip_port",
    "request_processing_time",
    "target_processing_time",
    "response_processing_time",
    "elb_status_code",
    "target_status_code",
    "received_bytes",
    "sent_bytes",
    "request",
    "user_agent",
    "ssl_cipher",
    "ssl_protocol",
    "target_group_arn",
    "trace_id",
    "domain_name",
    "chosen_cert_arn",
    "matched_rule_priority",
    "request_creation_time",
    "actions_executed",
    "redirect_url",
    "error_reason",
    "target_port_list",
    "target_status_code_list",
    "classification",
    "classification_reason",
];

const TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%SZ"];

/// Sentinel method when the request line cannot be decomposed.
pub const UNKNOWN: &str = "Unknown";

/// Fields copied verbatim from the log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawElbFields {
    #[serde(rename = "type")]
    pub log_type: String,
    pub time: String,
    pub elb: String,
    pub client_ip_port: String,
    pub target_ip_port: String,
    pub request: String,
    pub ssl_cipher: String,
    pub ssl_protocol: String,
    pub target_group_arn: String,
    pub trace_id: String,
    pub domain_name: String,
    pub chosen_cert_arn: String,
    pub matched_rule_priority: String,
    pub request_creation_time: String,
    pub actions_executed: String,
    pub redirect_url: String,
    pub error_reason: String,
    pub target_port_list: String,
    pub target_status_code_list: String,
    pub classification: String,
    pub classification_reason: String,
}

/// One parsed access-log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Request time in the configured zone
    pub log_time: DateTime<FixedOffset>,
    pub client_ip: String,
    pub http_method: String,
    pub url: String,
    pub http_version: String,
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub query: Option<String>,
    pub elb_status_code: Option<i64>,
    pub target_status_code: Option<i64>,
    pub received_bytes: Option<i64>,
    pub sent_bytes: Option<i64>,
    pub request_processing_s: Option<f64>,
    pub target_processing_s: Option<f64>,
    pub response_processing_s: Option<f64>,
    /// Sum of the three processing times in ms; null if any is missing
    pub total_processing_ms: Option<f64>,
    pub user_agent_raw: String,
    pub ua_browser_family: String,
    pub ua_os_family: String,
    pub is_bot: bool,
    pub source_file: String,
    #[serde(flatten)]
    pub raw: RawElbFields,
}

#[derive(Debug, Clone, PartialEq)]
struct RequestLine {
    method: String,
    url: String,
    version: String,
    protocol: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
    query: Option<String>,
}

impl RequestLine {
    fn unknown() -> Self {
        Self {
            method: UNKNOWN.to_string(),
            url: String::new(),
            version: String::new(),
            protocol: None,
            host: None,
            port: None,
            path: None,
            query: None,
        }
    }

    fn parse(request: &str) -> Self {
        let mut parts = request.splitn(3, ' ');
        let (Some(method), Some(url), Some(version)) = (parts.next(), parts.next(), parts.next()) else {
            return Self::unknown();
        };
        // Path and query come from the raw target so `..` and escapes survive.
        let (protocol, host, port, target) = match Url::parse(url) {
            Ok(parsed) => {
                let target = match url.split_once("://") {
                    Some((_, rest)) => rest.find(['/', '?', '#']).map(|i| &rest[i..]).unwrap_or(""),
                    None => url.split_once(':').map(|(_, rest)| rest).unwrap_or(url),
                };
                (
                    Some(parsed.scheme().to_string()),
                    parsed.host_str().map(|h| h.to_string()),
                    parsed.port_or_known_default(),
                    target,
                )
            }
            // origin-form target, e.g. `/api/items?page=2`
            Err(_) if url.starts_with('/') => (None, None, None, url),
            Err(_) => return Self::unknown(),
        };
        let (path, query) = split_target(target);
        Self {
            method: method.to_string(),
            url: url.to_string(),
            version: version.to_string(),
            protocol,
            host,
            port,
            path: Some(path.to_string()),
            query: query.map(|q| q.to_string()),
        }
    }
}

/// Path and query of a request target; the fragment is discarded.
fn split_target(target: &str) -> (&str, Option<&str>) {
    let target = target.split('#').next().unwrap_or("");
    match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    }
}

/// Host part of `ip:port`, `[v6]:port`, or a bare address.
fn client_ip(client_ip_port: &str) -> &str {
    if let Some(rest) = client_ip_port.strip_prefix('[') {
        return rest.split(']').next().unwrap_or("");
    }
    match client_ip_port.matches(':').count() {
        1 => client_ip_port.split(':').next().unwrap_or(""),
        _ => client_ip_port,
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Parses lines into [`RequestRecord`]s. Holds only read-only configuration.
pub struct LineParser {
    tz: Tz,
    bot_tokens: Vec<String>,
    classifier: Box<dyn UaClassifier>,
}

impl LineParser {
    pub fn new(config: &ParserConfig, classifier: Box<dyn UaClassifier>) -> Self {
        let tz = config.timezone.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(timezone = %config.timezone, "unknown timezone; using America/New_York");
            chrono_tz::America::New_York
        });
        Self {
            tz,
            bot_tokens: config.bot_tokens.iter().map(|t| t.to_lowercase()).collect(),
            classifier,
        }
    }

    /// Parser with the default zone, bot tokens and rule classifier
    pub fn with_defaults() -> Self {
        Self::new(&ParserConfig::default(), Box::new(RuleClassifier))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    fn parse_time(&self, raw: &str) -> Option<DateTime<FixedOffset>> {
        TIME_FORMATS.iter().find_map(|fmt| {
            NaiveDateTime::parse_from_str(raw, fmt)
                .ok()
                .map(|naive| naive.and_utc().with_timezone(&self.tz).fixed_offset())
        })
    }

    /// Browser family, OS family, bot flag
    fn user_agent(&self, ua: &str) -> (String, String, bool) {
        if ua.is_empty() || ua == "-" {
            return (UNKNOWN.to_string(), UNKNOWN.to_string(), false);
        }
        let families = self.classifier.classify(ua);
        let lower = ua.to_lowercase();
        let is_bot = self.bot_tokens.iter().any(|t| lower.contains(t.as_str()));
        (families.browser_family, families.os_family, is_bot)
    }

    pub fn parse(&self, line: &str, source_id: &str) -> Result<RequestRecord, ParseFailure> {
        let tokens = split(line).ok_or_else(|| ParseFailure::MalformedLine("unbalanced quoting".to_string()))?;
        if tokens.len() < ELB_LOG_COLUMNS.len() {
            return Err(ParseFailure::MalformedLine(format!(
                "{} fields, expected at least {}",
                tokens.len(),
                ELB_LOG_COLUMNS.len()
            )));
        }
        let mut fields = tokens.into_iter();
        let mut next = || fields.next().unwrap_or_default();

        let log_type = next();
        let time = next();
        let elb = next();
        let client_ip_port = next();
        let target_ip_port = next();
        let request_processing = next();
        let target_processing = next();
        let response_processing = next();
        let elb_status = next();
        let target_status = next();
        let received = next();
        let sent = next();
        let request = next();
        let user_agent = next();

        let log_time = self
            .parse_time(&time)
            .ok_or_else(|| ParseFailure::UnparseableTimestamp(time.clone()))?;

        let client = client_ip(&client_ip_port);
        if client.is_empty() {
            return Err(ParseFailure::MalformedLine(format!("no client address in {client_ip_port:?}")));
        }
        let client = client.to_string();

        let request_processing_s = to_float(Some(&request_processing));
        let target_processing_s = to_float(Some(&target_processing));
        let response_processing_s = to_float(Some(&response_processing));
        let total_processing_ms = match (request_processing_s, target_processing_s, response_processing_s) {
            (Some(a), Some(b), Some(c)) => Some(round3((a + b + c) * 1000.0)),
            _ => None,
        };

        let req = RequestLine::parse(&request);
        let (ua_browser_family, ua_os_family, is_bot) = self.user_agent(&user_agent);

        let raw = RawElbFields {
            log_type,
            time,
            elb,
            client_ip_port,
            target_ip_port,
            request,
            ssl_cipher: next(),
            ssl_protocol: next(),
            target_group_arn: next(),
            trace_id: next(),
            domain_name: next(),
            chosen_cert_arn: next(),
            matched_rule_priority: next(),
            request_creation_time: next(),
            actions_executed: next(),
            redirect_url: next(),
            error_reason: next(),
            target_port_list: next(),
            target_status_code_list: next(),
            classification: next(),
            classification_reason: next(),
        };

        Ok(RequestRecord {
            log_time,
            client_ip: client,
            http_method: req.method,
            url: req.url,
            http_version: req.version,
            protocol: req.protocol,
            host: req.host,
            port: req.port,
            path: req.path,
            query: req.query,
            elb_status_code: to_int(Some(&elb_status)),
            target_status_code: to_int(Some(&target_status)),
            received_bytes: to_int(Some(&received)),
            sent_bytes: to_int(Some(&sent)),
            request_processing_s,
            target_processing_s,
            response_processing_s,
            total_processing_ms,
            user_agent_raw: user_agent,
            ua_browser_family,
            ua_os_family,
            is_bot,
            source_file: source_id.to_string(),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_with_explicit_port() {
        let r = RequestLine::parse("POST https://beta.erank.com:443/api/browser-ext-user HTTP/2.0");
        assert_eq!(r.method, "POST");
        assert_eq!(r.protocol.as_deref(), Some("https"));
        assert_eq!(r.host.as_deref(), Some("beta.erank.com"));
        assert_eq!(r.port, Some(443));
        assert_eq!(r.path.as_deref(), Some("/api/browser-ext-user"));
        assert_eq!(r.query, None);
        assert_eq!(r.version, "HTTP/2.0");
    }

    #[test]
    fn request_line_with_query() {
        let r = RequestLine::parse("GET http://example.com:8080/a/b?x=1&y=2 HTTP/1.1");
        assert_eq!(r.port, Some(8080));
        assert_eq!(r.query.as_deref(), Some("x=1&y=2"));
    }

    #[test]
    fn origin_form_target_keeps_method_path_and_query() {
        let r = RequestLine::parse("GET /api/items?page=2 HTTP/1.1");
        assert_eq!(r.method, "GET");
        assert_eq!(r.url, "/api/items?page=2");
        assert_eq!(r.version, "HTTP/1.1");
        assert_eq!(r.protocol, None);
        assert_eq!(r.host, None);
        assert_eq!(r.port, None);
        assert_eq!(r.path.as_deref(), Some("/api/items"));
        assert_eq!(r.query.as_deref(), Some("page=2"));
    }

    #[test]
    fn path_is_taken_verbatim() {
        let r = RequestLine::parse("GET https://example.com/a/../b/%7Euser?q=1#frag HTTP/1.1");
        assert_eq!(r.path.as_deref(), Some("/a/../b/%7Euser"));
        assert_eq!(r.query.as_deref(), Some("q=1"));
        assert_eq!(r.port, Some(443));

        let bare = RequestLine::parse("GET http://example.com HTTP/1.1");
        assert_eq!(bare.host.as_deref(), Some("example.com"));
        assert_eq!(bare.path.as_deref(), Some(""));
        assert_eq!(bare.query, None);
    }

    #[test]
    fn split_target_parts() {
        assert_eq!(split_target("/a/b?x=1#f"), ("/a/b", Some("x=1")));
        assert_eq!(split_target("/a/b"), ("/a/b", None));
        assert_eq!(split_target("?x"), ("", Some("x")));
    }

    #[test]
    fn broken_request_line_degrades() {
        assert_eq!(RequestLine::parse("- - -"), RequestLine::unknown());
        assert_eq!(RequestLine::parse("GET"), RequestLine::unknown());
    }

    #[test]
    fn client_ip_forms() {
        assert_eq!(client_ip("3.135.238.214:60827"), "3.135.238.214");
        assert_eq!(client_ip("[2001:db8::1]:443"), "2001:db8::1");
        assert_eq!(client_ip("2001:db8::1"), "2001:db8::1");
        assert_eq!(client_ip("10.0.0.1"), "10.0.0.1");
        assert_eq!(client_ip(":80"), "");
    }
}
