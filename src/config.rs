use std::env;
use std::time::Duration;

const DEFAULT_GENERATE_URL: &str = "http://127.0.0.1:8003/api/generate";
const DEFAULT_GRAPH_URL: &str = "http://127.0.0.1:8004/api/graph/query";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_FILTER: &str = "graphdeck=info";

#[derive(Debug, Clone)]
pub struct Config {
    pub generate_url: String,
    pub graph_url: String,
    pub request_timeout: Duration,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let timeout_secs = lookup("GRAPHDECK_REQUEST_TIMEOUT_SECS")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            generate_url: lookup("GRAPHDECK_GENERATE_URL")
                .unwrap_or_else(|| DEFAULT_GENERATE_URL.to_string()),
            graph_url: lookup("GRAPHDECK_GRAPH_URL")
                .unwrap_or_else(|| DEFAULT_GRAPH_URL.to_string()),
            request_timeout: Duration::from_secs(timeout_secs),
            log_filter: lookup("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }
}
