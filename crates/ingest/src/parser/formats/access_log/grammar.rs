//! Candidate access-log grammars, tried in a fixed order.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

static COMBINED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"^(?P<ip>\S+)\s+(?P<ident>\S+)\s+(?P<user>\S+)\s+"#,
        r#"\[(?P<timestamp>[^\]]+)\]\s+"#,
        r#""(?P<method>\S+)\s+(?P<path>\S+)\s*(?P<protocol>[^"]*)"\s+"#,
        r#"(?P<status>\d+)\s+(?P<size>\S+)"#,
        r#"(?:\s+"(?P<referer>[^"]*)")?"#,
        r#"(?:\s+"(?P<user_agent>[^"]*)")?"#,
        r#"(?:\s+(?P<extra>.*))?"#,
    ))
    .expect("combined log pattern")
});

static COMMON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"^(?P<ip>\S+)\s+(?P<ident>\S+)\s+(?P<user>\S+)\s+"#,
        r#"\[(?P<timestamp>[^\]]+)\]\s+"#,
        r#""(?P<method>\S+)\s+(?P<path>\S+)\s*(?P<protocol>[^"]*)"\s+"#,
        r#"(?P<status>\d+)\s+(?P<size>\S+)"#,
    ))
    .expect("common log pattern")
});

static NGINX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"^(?P<ip>\S+)\s+-\s+(?P<user>\S+)\s+"#,
        r#"\[(?P<timestamp>[^\]]+)\]\s+"#,
        r#""(?P<request>[^"]+)"\s+"#,
        r#"(?P<status>\d+)\s+(?P<size>\S+)\s+"#,
        r#""(?P<referer>[^"]*)"\s+"(?P<user_agent>[^"]*)""#,
        r#"(?:\s+(?P<extra>.*))?"#,
    ))
    .expect("nginx log pattern")
});

static SIMPLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?P<ip>\S+)\s+.*\[(?P<timestamp>[^\]]+)\]\s+"(?P<request>[^"]+)"\s+(?P<status>\d+)"#)
        .expect("simple log pattern")
});

static JSON_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"^\{[^}]*"(?:ip|remote_addr|client_ip)":\s*"(?P<ip>[^"]+)".*"#,
        r#""(?:timestamp|time|@timestamp)":\s*"(?P<timestamp>[^"]+)".*"#,
        r#""(?:status|status_code|response_code)":\s*(?P<status>\d+)"#,
    ))
    .expect("json-like log pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    Combined,
    Common,
    Nginx,
    Simple,
    JsonLike,
}

impl Grammar {
    pub const ALL: [Grammar; 5] = [
        Grammar::Combined,
        Grammar::Common,
        Grammar::Nginx,
        Grammar::Simple,
        Grammar::JsonLike,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Grammar::Combined => "combined",
            Grammar::Common => "common",
            Grammar::Nginx => "nginx",
            Grammar::Simple => "simple",
            Grammar::JsonLike => "json",
        }
    }

    fn regex(&self) -> &'static Regex {
        match self {
            Grammar::Combined => &COMBINED,
            Grammar::Common => &COMMON,
            Grammar::Nginx => &NGINX,
            Grammar::Simple => &SIMPLE,
            Grammar::JsonLike => &JSON_LIKE,
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        self.regex().is_match(line)
    }

    pub fn extract(&self, line: &str) -> Option<RequestFields> {
        let caps = self.regex().captures(line)?;
        let mut fields = RequestFields::from_captures(&caps);
        if *self == Grammar::JsonLike {
            fields.enrich_from_json(line);
        }
        Some(fields)
    }
}

/// Fields pulled out of one access-log line by a grammar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestFields {
    pub ip: String,
    /// Empty when the log shows `-`
    pub user: String,
    pub timestamp: String,
    pub method: String,
    pub path: String,
    pub protocol: String,
    /// 0 when absent or not numeric
    pub status: u16,
    /// 0 when absent or `-`
    pub size: u64,
    pub referer: String,
    pub user_agent: String,
    /// Unmatched trailing text (custom fields)
    pub extra: Option<String>,
}

impl RequestFields {
    fn from_captures(caps: &Captures<'_>) -> Self {
        let get = |name: &str| caps.name(name).map_or("", |m| m.as_str());

        let mut method = get("method").to_string();
        let mut path = get("path").to_string();
        let mut protocol = get("protocol").trim().to_string();

        // Nginx and simple grammars capture the request line whole
        let request: Vec<&str> = get("request").split_whitespace().collect();
        if request.len() >= 2 {
            method = request[0].to_string();
            path = request[1].to_string();
            protocol = request.get(2).map_or_else(String::new, |p| p.to_string());
        }

        if method.is_empty() {
            method = "GET".to_string();
        }
        if path.is_empty() {
            path = "/".to_string();
        }

        let user = match get("user") {
            "-" => "",
            u => u,
        };

        Self {
            ip: get("ip").to_string(),
            user: user.to_string(),
            timestamp: get("timestamp").to_string(),
            method,
            path,
            protocol,
            status: get("status").parse().unwrap_or(0),
            size: get("size").parse().unwrap_or(0),
            referer: get("referer").to_string(),
            user_agent: get("user_agent").to_string(),
            extra: caps
                .name("extra")
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }

    /// JSON lines carry more than the three fields the grammar requires.
    fn enrich_from_json(&mut self, line: &str) {
        let Ok(object) = serde_json::from_str::<Map<String, Value>>(line) else {
            return;
        };

        if let Some(v) = first_string(&object, &["method", "request_method", "http_method"]) {
            self.method = v.to_uppercase();
        }
        if let Some(v) = first_string(&object, &["path", "uri", "url", "request_uri"]) {
            self.path = v;
        }
        if let Some(v) = first_string(&object, &["user", "remote_user", "username"]).filter(|u| u != "-") {
            self.user = v;
        }
        if let Some(v) = first_string(&object, &["protocol", "server_protocol"]) {
            self.protocol = v;
        }
        if let Some(v) = first_string(&object, &["user_agent", "http_user_agent", "agent"]) {
            self.user_agent = v;
        }
        if let Some(v) = first_string(&object, &["referer", "http_referer", "referrer"]) {
            self.referer = v;
        }
        if let Some(size) = ["size", "bytes", "body_bytes_sent", "response_size"]
            .iter()
            .find_map(|k| object.get(*k).and_then(json_u64))
        {
            self.size = size;
        }
    }
}

fn first_string(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match object.get(*k) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })
}

fn json_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
