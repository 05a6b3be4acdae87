//! Pure summary helpers over parsed events.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::NormalizedEvent;

const TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ranked {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Per-file summary for the analyst overview.
///
/// Histograms are keyed maps so output order is stable. Empty hosts, users,
/// methods and paths are left out of every count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventStatistics {
    pub total_events: u64,
    pub unique_hosts: usize,
    pub unique_users: usize,
    pub event_types: BTreeMap<String, u64>,
    pub status_codes: BTreeMap<i64, u64>,
    pub methods: BTreeMap<String, u64>,
    pub top_hosts: Vec<Ranked>,
    pub top_paths: Vec<Ranked>,
    pub time_range: Option<TimeRange>,
}

impl EventStatistics {
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a NormalizedEvent>,
    {
        let mut stats = Self::default();
        let mut hosts: HashMap<&str, u64> = HashMap::new();
        let mut paths: HashMap<&str, u64> = HashMap::new();
        let mut users: HashSet<&str> = HashSet::new();

        for event in events {
            stats.total_events += 1;

            if !event.host.is_empty() {
                *hosts.entry(event.host.as_str()).or_default() += 1;
            }
            if !event.user.is_empty() {
                users.insert(event.user.as_str());
            }
            *stats.event_types.entry(event.event_type.clone()).or_default() += 1;

            if let Some(code) = event.extra("status_code").and_then(|v| v.as_i64()) {
                *stats.status_codes.entry(code).or_default() += 1;
            }
            if let Some(method) = event.extra("method").and_then(|v| v.as_str()).filter(|m| !m.is_empty()) {
                *stats.methods.entry(method.to_string()).or_default() += 1;
            }
            if let Some(path) = event.extra("path").and_then(|v| v.as_str()).filter(|p| !p.is_empty()) {
                *paths.entry(path).or_default() += 1;
            }

            stats.time_range = Some(match stats.time_range {
                None => TimeRange {
                    start: event.timestamp,
                    end: event.timestamp,
                },
                Some(range) => TimeRange {
                    start: range.start.min(event.timestamp),
                    end: range.end.max(event.timestamp),
                },
            });
        }

        stats.unique_hosts = hosts.len();
        stats.unique_users = users.len();
        stats.top_hosts = top_n(hosts);
        stats.top_paths = top_n(paths);
        stats
    }
}

/// Highest counts first, ties broken by value.
fn top_n(counts: HashMap<&str, u64>) -> Vec<Ranked> {
    let mut ranked: Vec<Ranked> = counts
        .into_iter()
        .map(|(value, count)| Ranked {
            value: value.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    ranked.truncate(TOP_N);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn web(minute: u32, host: &str, method: &str, path: &str, status: i64) -> NormalizedEvent {
        let ts = Utc.with_ymd_and_hms(2026, 1, 12, 10, minute, 0).unwrap();
        let mut event = NormalizedEvent::new(ts, "WEB_ACCESS", format!("{} {}", method, path), 1);
        event.host = host.to_string();
        event.set_extra("method", method);
        event.set_extra("path", path);
        event.set_extra("status_code", status);
        event
    }

    #[test]
    fn test_empty_input() {
        let stats = EventStatistics::from_events(&Vec::<NormalizedEvent>::new());
        assert_eq!(stats.total_events, 0);
        assert!(stats.time_range.is_none());
        assert!(stats.top_hosts.is_empty());
    }

    #[test]
    fn test_histograms_and_ranges() {
        let mut events = vec![
            web(5, "10.0.0.1", "GET", "/index.html", 200),
            web(1, "10.0.0.2", "POST", "/login", 401),
            web(9, "10.0.0.1", "GET", "/index.html", 200),
        ];
        events[1].user = "alice".into();

        let stats = EventStatistics::from_events(&events);
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.unique_hosts, 2);
        assert_eq!(stats.unique_users, 1);
        assert_eq!(stats.event_types["WEB_ACCESS"], 3);
        assert_eq!(stats.status_codes[&200], 2);
        assert_eq!(stats.methods["POST"], 1);
        assert_eq!(stats.top_hosts[0], Ranked { value: "10.0.0.1".into(), count: 2 });
        assert_eq!(stats.top_paths[0].value, "/index.html");

        let range = stats.time_range.unwrap();
        assert_eq!(range.start, events[1].timestamp);
        assert_eq!(range.end, events[2].timestamp);
    }

    #[test]
    fn test_top_lists_are_capped() {
        let events: Vec<_> = (0..15).map(|i| web(i, &format!("10.0.0.{}", i), "GET", "/", 200)).collect();
        let stats = EventStatistics::from_events(&events);
        assert_eq!(stats.unique_hosts, 15);
        assert_eq!(stats.top_hosts.len(), 10);
        assert_eq!(stats.top_paths.len(), 1);
    }
}
