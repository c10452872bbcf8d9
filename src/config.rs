//! Job configuration loading
//!
//! The job file is YAML. It is parsed into a loose [`RawConfig`] first and then
//! resolved once into a typed [`JobConfig`] with every default filled in, so no
//! other module needs to know the fallback values.

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default subscription-conversion host
pub const DEFAULT_ENDPOINT: &str = "api.wcc.best";

/// Default listing site
pub const DEFAULT_LISTING_URL: &str = "https://www.freeproxy.world/";

/// Default page cap for a listing scrape
pub const DEFAULT_MAX_PAGES: u32 = 50;

/// Default pause between two jobs of the same kind, in seconds
pub const DEFAULT_JOB_DELAY_SECS: u64 = 1;

/// Listing entry keys that configure the job instead of the query string
const LISTING_MAX_KEY: &str = "max";
const LISTING_FILE_KEY: &str = "file";
const LISTING_URL_KEY: &str = "url";

/// Errors raised while loading the job file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid entry in {section}: {reason}")]
    InvalidEntry {
        section: &'static str,
        reason: String,
    },
}

impl ConfigError {
    fn entry(section: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidEntry {
            section,
            reason: reason.into(),
        }
    }
}

/// Scalar query parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    fn from_yaml(section: &'static str, key: &str, value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Bool(b) => Ok(ParamValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(ParamValue::Int(i)),
                None => Ok(ParamValue::Float(n.as_f64().unwrap_or_default())),
            },
            Value::String(s) => Ok(ParamValue::Str(s.clone())),
            Value::Null => Ok(ParamValue::Str(String::new())),
            _ => Err(ConfigError::entry(
                section,
                format!("parameter `{}` must be a scalar", key),
            )),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:.1}", x),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Ordered list of query parameters
pub type Params = Vec<(String, ParamValue)>;

/// Inputs shared by every subscription-download job
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSource {
    /// Host of the conversion service, without scheme
    pub endpoint: String,
    /// Upstream subscription URLs, joined with `|`
    pub urls: Vec<String>,
    /// Optional remote rule config
    pub config_url: Option<String>,
    /// Extra query parameters appended verbatim
    pub extra: Params,
}

/// One subscription-download job
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionJob {
    pub name: String,
    pub target: String,
    pub file: String,
}

/// One paginated listing-scrape job
#[derive(Debug, Clone, PartialEq)]
pub struct ListingJob {
    pub name: String,
    pub base_url: String,
    pub params: Params,
    pub max_pages: u32,
    pub file: String,
}

/// One merge target and its ordered sources
#[derive(Debug, Clone, PartialEq)]
pub struct MergeSpec {
    pub target_file: String,
    pub source_files: Vec<String>,
}

/// Fully resolved job configuration
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    pub source: ConversionSource,
    pub subscriptions: Vec<SubscriptionJob>,
    pub listings: Vec<ListingJob>,
    pub merges: Vec<MergeSpec>,
    pub job_delay: Duration,
}

/// Job file as written on disk
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub endpoint: Option<String>,
    pub url: Option<Vec<String>>,
    pub config: Option<String>,
    pub extra: Option<Mapping>,
    pub target_list: Option<Vec<Mapping>>,
    pub freeproxy_list: Option<Vec<Mapping>>,
    pub merge_list: Option<Vec<Mapping>>,
    pub freeproxy_url: Option<String>,
    pub freeproxy_max: Option<u32>,
    pub job_delay: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionEntry {
    target: String,
    file: Option<String>,
}

impl JobConfig {
    /// Load and resolve a job file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse and resolve job configuration from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Self::resolve(RawConfig::default());
        }
        let raw: RawConfig = serde_yaml::from_str(content)?;
        Self::resolve(raw)
    }

    /// Fill in defaults and convert the raw file into typed jobs
    pub fn resolve(raw: RawConfig) -> Result<Self, ConfigError> {
        let endpoint = raw
            .endpoint
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let urls = raw
            .url
            .unwrap_or_default()
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();

        let config_url = raw
            .config
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let extra = match raw.extra {
            Some(mapping) => params_from_mapping("extra", &mapping)?,
            None => Vec::new(),
        };

        let base_url = raw
            .freeproxy_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_LISTING_URL.to_string());
        let max_pages = raw.freeproxy_max.unwrap_or(DEFAULT_MAX_PAGES);

        let mut subscriptions = Vec::new();
        for (name, body) in named_entries("target_list", raw.target_list.unwrap_or_default())? {
            subscriptions.push(subscription_job(name, body)?);
        }

        let mut listings = Vec::new();
        for (name, body) in named_entries("freeproxy_list", raw.freeproxy_list.unwrap_or_default())? {
            listings.push(listing_job(name, body, &base_url, max_pages)?);
        }

        let mut merges = Vec::new();
        for (target_file, body) in named_entries("merge_list", raw.merge_list.unwrap_or_default())? {
            merges.push(merge_spec(target_file, body)?);
        }

        Ok(Self {
            source: ConversionSource {
                endpoint,
                urls,
                config_url,
                extra,
            },
            subscriptions,
            listings,
            merges,
            job_delay: Duration::from_secs(raw.job_delay.unwrap_or(DEFAULT_JOB_DELAY_SECS)),
        })
    }
}

/// Flatten a list of `{name: body}` mappings into ordered pairs
fn named_entries(
    section: &'static str,
    list: Vec<Mapping>,
) -> Result<Vec<(String, Value)>, ConfigError> {
    let mut entries = Vec::new();
    for mapping in list {
        if mapping.is_empty() {
            return Err(ConfigError::entry(section, "empty job entry"));
        }
        for (key, value) in mapping {
            entries.push((scalar_key(section, &key)?, value));
        }
    }
    Ok(entries)
}

fn scalar_key(section: &'static str, key: &Value) -> Result<String, ConfigError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ConfigError::entry(section, "keys must be scalars")),
    }
}

fn params_from_mapping(section: &'static str, mapping: &Mapping) -> Result<Params, ConfigError> {
    mapping
        .iter()
        .map(|(k, v)| {
            let key = scalar_key(section, k)?;
            let value = ParamValue::from_yaml(section, &key, v)?;
            Ok((key, value))
        })
        .collect()
}

fn subscription_job(name: String, body: Value) -> Result<SubscriptionJob, ConfigError> {
    let entry: SubscriptionEntry = serde_yaml::from_value(body)
        .map_err(|e| ConfigError::entry("target_list", format!("{}: {}", name, e)))?;
    let file = entry
        .file
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| format!("{}.txt", name));

    Ok(SubscriptionJob {
        target: entry.target.trim().to_string(),
        file,
        name,
    })
}

fn listing_job(
    name: String,
    body: Value,
    default_base_url: &str,
    default_max_pages: u32,
) -> Result<ListingJob, ConfigError> {
    let mapping = match body {
        Value::Null => Mapping::new(),
        Value::Mapping(m) => m,
        _ => {
            return Err(ConfigError::entry(
                "freeproxy_list",
                format!("{}: expected a mapping of query parameters", name),
            ))
        }
    };

    let mut base_url = default_base_url.to_string();
    let mut max_pages = default_max_pages;
    let mut file = format!("{}.txt", name);
    let mut params = Vec::new();

    for (k, v) in &mapping {
        let key = scalar_key("freeproxy_list", k)?;
        let value = ParamValue::from_yaml("freeproxy_list", &key, v)?;
        match key.as_str() {
            LISTING_MAX_KEY => {
                max_pages = match value {
                    ParamValue::Int(n) => u32::try_from(n).map_err(|_| {
                        ConfigError::entry(
                            "freeproxy_list",
                            format!("{}: `max` out of range: {}", name, n),
                        )
                    })?,
                    other => {
                        return Err(ConfigError::entry(
                            "freeproxy_list",
                            format!("{}: `max` must be a non-negative integer, got {}", name, other),
                        ))
                    }
                }
            }
            LISTING_FILE_KEY => file = value.to_string(),
            LISTING_URL_KEY => base_url = value.to_string(),
            _ => params.push((key, value)),
        }
    }

    Ok(ListingJob {
        name,
        base_url,
        params,
        max_pages,
        file,
    })
}

fn merge_spec(target_file: String, body: Value) -> Result<MergeSpec, ConfigError> {
    let source_files = match body {
        Value::Null => Vec::new(),
        Value::Sequence(items) => items
            .iter()
            .map(|item| scalar_key("merge_list", item))
            .collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(ConfigError::entry(
                "merge_list",
                format!("{}: expected a list of source files", target_file),
            ))
        }
    };

    Ok(MergeSpec {
        target_file,
        source_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
endpoint: " sub.example.com "
url:
  - https://a.example/sub
  - "  "
  - " https://b.example/sub "
config: https://rules.example/base.ini
extra:
  udp: true
  emoji: false
  interval: 86400
target_list:
  - clashcfg:
      target: clash
      file: c.txt
  - v2:
      target: v2ray
      file: v2.txt
freeproxy_list:
  - fp1:
      type: socks5
      anonymity: 4
      max: 2
  - fp2:
      file: socks.txt
  - fp3:
merge_list:
  - all.txt:
      - clashcfg.yml
      - fp1.txt
"#;

    #[test]
    fn test_load_sample() {
        let config = JobConfig::from_yaml_str(SAMPLE).unwrap();

        assert_eq!(config.source.endpoint, "sub.example.com");
        assert_eq!(
            config.source.urls,
            vec!["https://a.example/sub", "https://b.example/sub"]
        );
        assert_eq!(
            config.source.config_url.as_deref(),
            Some("https://rules.example/base.ini")
        );
        assert_eq!(
            config.source.extra,
            vec![
                ("udp".to_string(), ParamValue::Bool(true)),
                ("emoji".to_string(), ParamValue::Bool(false)),
                ("interval".to_string(), ParamValue::Int(86400)),
            ]
        );
        assert_eq!(config.job_delay, Duration::from_secs(DEFAULT_JOB_DELAY_SECS));
    }

    #[test]
    fn test_subscription_jobs_in_order() {
        let config = JobConfig::from_yaml_str(SAMPLE).unwrap();
        let names: Vec<_> = config.subscriptions.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["clashcfg", "v2"]);
        assert_eq!(config.subscriptions[0].target, "clash");
        assert_eq!(config.subscriptions[0].file, "c.txt");
    }

    #[test]
    fn test_listing_jobs() {
        let config = JobConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.listings.len(), 3);

        let fp1 = &config.listings[0];
        assert_eq!(fp1.max_pages, 2);
        assert_eq!(fp1.file, "fp1.txt");
        assert_eq!(fp1.base_url, DEFAULT_LISTING_URL);
        assert_eq!(
            fp1.params,
            vec![
                ("type".to_string(), ParamValue::Str("socks5".to_string())),
                ("anonymity".to_string(), ParamValue::Int(4)),
            ]
        );

        let fp2 = &config.listings[1];
        assert_eq!(fp2.max_pages, DEFAULT_MAX_PAGES);
        assert_eq!(fp2.file, "socks.txt");
        assert!(fp2.params.is_empty());

        let fp3 = &config.listings[2];
        assert_eq!(fp3.file, "fp3.txt");
    }

    #[test]
    fn test_merge_specs() {
        let config = JobConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(
            config.merges,
            vec![MergeSpec {
                target_file: "all.txt".to_string(),
                source_files: vec!["clashcfg.yml".to_string(), "fp1.txt".to_string()],
            }]
        );
    }

    #[test]
    fn test_defaults_for_empty_file() {
        let config = JobConfig::from_yaml_str("").unwrap();
        assert_eq!(config.source.endpoint, DEFAULT_ENDPOINT);
        assert!(config.source.urls.is_empty());
        assert!(config.source.config_url.is_none());
        assert!(config.subscriptions.is_empty());
        assert!(config.listings.is_empty());
        assert!(config.merges.is_empty());
    }

    #[test]
    fn test_global_listing_defaults() {
        let yaml = r#"
freeproxy_url: https://proxies.example/list
freeproxy_max: 7
job_delay: 0
freeproxy_list:
  - a:
  - b:
      url: https://other.example/
"#;
        let config = JobConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.listings[0].base_url, "https://proxies.example/list");
        assert_eq!(config.listings[0].max_pages, 7);
        assert_eq!(config.listings[1].base_url, "https://other.example/");
        assert_eq!(config.job_delay, Duration::ZERO);
    }

    #[test]
    fn test_subscription_file_defaults_to_name() {
        let yaml = "target_list:\n  - mixed:\n      target: mixed\n";
        let config = JobConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.subscriptions[0].file, "mixed.txt");
    }

    #[test]
    fn test_missing_target_is_error() {
        let yaml = "target_list:\n  - broken:\n      file: x.txt\n";
        let err = JobConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEntry { section: "target_list", .. }));
    }

    #[test]
    fn test_non_scalar_param_is_error() {
        let yaml = "extra:\n  nested:\n    a: 1\n";
        let err = JobConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEntry { section: "extra", .. }));
    }

    #[test]
    fn test_invalid_max_is_error() {
        let yaml = "freeproxy_list:\n  - fp:\n      max: lots\n";
        assert!(JobConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_max_out_of_range_is_error() {
        for max in ["4294967297", "-1"] {
            let yaml = format!("freeproxy_list:\n  - fp:\n      max: {}\n", max);
            let err = JobConfig::from_yaml_str(&yaml).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidEntry { section: "freeproxy_list", .. }
            ));
        }
    }

    #[test]
    fn test_param_value_display() {
        assert_eq!(ParamValue::Bool(true).to_string(), "true");
        assert_eq!(ParamValue::Bool(false).to_string(), "false");
        assert_eq!(ParamValue::Int(42).to_string(), "42");
        assert_eq!(ParamValue::Float(1.0).to_string(), "1.0");
        assert_eq!(ParamValue::Float(1.5).to_string(), "1.5");
        assert_eq!(ParamValue::Str("x y".to_string()).to_string(), "x y");
    }

    #[test]
    fn test_load_missing_file() {
        let err = JobConfig::load("/nonexistent/config.yml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
