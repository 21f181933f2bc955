use std::time::Duration;

use anyhow::Context;

/// Runtime configuration, read from the environment at startup.
/// Missing required settings are fatal: the process refuses to start.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub gitlab_base_url: String,
    pub gitlab_token: String,
    /// Project scopes to poll. Required, at least one.
    pub project_ids: Vec<u64>,
    /// Group scopes to poll. Optional, may be empty.
    pub group_ids: Vec<u64>,
    pub scrape_interval: Duration,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a `Config` from an arbitrary key lookup.
/// Split out from `load()` so tests never touch process environment.
fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
    let gitlab_base_url = require(&get, "GITLAB_BASE_URL")?;
    let gitlab_token = require(&get, "GITLAB_TOKEN")?;

    let project_ids = parse_id_list(&require(&get, "GITLAB_PROJECT_IDS")?)
        .context("GITLAB_PROJECT_IDS")?;
    if project_ids.is_empty() {
        anyhow::bail!("GITLAB_PROJECT_IDS must contain at least one project ID");
    }

    let group_ids =
        parse_id_list(&get("GITLAB_GROUP_IDS").unwrap_or_default()).context("GITLAB_GROUP_IDS")?;

    let port = match get("SERVER_PORT") {
        Some(raw) => raw.parse().context("SERVER_PORT must be a port number")?,
        None => 8080,
    };

    let interval_secs = match get("SCRAPER_INTERVAL_SECONDS") {
        Some(raw) => {
            let secs: u64 = raw
                .parse()
                .context("SCRAPER_INTERVAL_SECONDS must be a number of seconds")?;
            if secs == 0 {
                anyhow::bail!("SCRAPER_INTERVAL_SECONDS must be greater than zero");
            }
            secs
        }
        None => 10,
    };

    Ok(Config {
        port,
        gitlab_base_url,
        gitlab_token,
        project_ids,
        group_ids,
        scrape_interval: Duration::from_secs(interval_secs),
    })
}

fn require(get: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    get(key)
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{key} is required"))
}

/// Parse a comma-separated ID list. Blank segments are skipped; a
/// non-numeric segment is an error rather than a silent drop.
fn parse_id_list(raw: &str) -> anyhow::Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().with_context(|| format!("invalid scope ID {s:?}")))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn load_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars = env(pairs);
        from_lookup(|key| vars.get(key).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("GITLAB_BASE_URL", "https://gitlab.example.com"),
        ("GITLAB_TOKEN", "glpat-test"),
        ("GITLAB_PROJECT_IDS", "1,2,3"),
    ];

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = load_from(BASE).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.project_ids, vec![1, 2, 3]);
        assert!(cfg.group_ids.is_empty());
        assert_eq!(cfg.scrape_interval, Duration::from_secs(10));
    }

    #[test]
    fn missing_token_is_fatal() {
        let err = load_from(&[
            ("GITLAB_BASE_URL", "https://gitlab.example.com"),
            ("GITLAB_PROJECT_IDS", "1"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("GITLAB_TOKEN"));
    }

    #[test]
    fn missing_base_url_is_fatal() {
        let err = load_from(&[("GITLAB_TOKEN", "t"), ("GITLAB_PROJECT_IDS", "1")]).unwrap_err();
        assert!(err.to_string().contains("GITLAB_BASE_URL"));
    }

    #[test]
    fn empty_project_ids_is_fatal() {
        let err = load_from(&[
            ("GITLAB_BASE_URL", "https://gitlab.example.com"),
            ("GITLAB_TOKEN", "t"),
            ("GITLAB_PROJECT_IDS", " , ,"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("at least one"));
    }

    #[test]
    fn malformed_project_id_is_fatal() {
        let err = load_from(&[
            ("GITLAB_BASE_URL", "https://gitlab.example.com"),
            ("GITLAB_TOKEN", "t"),
            ("GITLAB_PROJECT_IDS", "1,abc,3"),
        ])
        .unwrap_err();
        assert!(format!("{err:#}").contains("invalid scope ID"));
    }

    #[test]
    fn group_ids_parse_with_whitespace() {
        let mut pairs = BASE.to_vec();
        pairs.push(("GITLAB_GROUP_IDS", " 10, 20 ,30 "));
        let cfg = load_from(&pairs).unwrap();
        assert_eq!(cfg.group_ids, vec![10, 20, 30]);
    }

    #[test]
    fn interval_and_port_overrides() {
        let mut pairs = BASE.to_vec();
        pairs.push(("SERVER_PORT", "9100"));
        pairs.push(("SCRAPER_INTERVAL_SECONDS", "300"));
        let cfg = load_from(&pairs).unwrap();
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.scrape_interval, Duration::from_secs(300));
    }

    #[test]
    fn zero_interval_is_fatal() {
        let mut pairs = BASE.to_vec();
        pairs.push(("SCRAPER_INTERVAL_SECONDS", "0"));
        assert!(load_from(&pairs).is_err());
    }
}
