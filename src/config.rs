use std::env;
use std::fmt;
use std::str::FromStr;

use super::error::ValidationError;

pub const BUCKET_VAR: &str = "S3_BUCKET";
pub const REMOTE_PREFIX_VAR: &str = "S3_ARTIFACT_PREFIX";
pub const LOCAL_PREFIX_VAR: &str = "ARTIFACT_LOCAL_PREFIX";
pub const LOCAL_POLICY_VAR: &str = "ARTIFACT_LOCAL_POLICY";
pub const MAX_CONCURRENT_VAR: &str = "ARTIFACT_MAX_CONCURRENT";
pub const ENDPOINT_VAR: &str = "S3_ENDPOINT";

pub const DEFAULT_MAX_CONCURRENT: usize = 50;

/// What `get` does with a local file that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalPolicy {
    Overwrite,
    Skip,
}

impl Default for LocalPolicy {
    fn default() -> Self {
        LocalPolicy::Overwrite
    }
}

impl FromStr for LocalPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(LocalPolicy::Overwrite),
            "skip" => Ok(LocalPolicy::Skip),
            _ => Err(ValidationError::new(format!(
                "unknown local policy {:?}, expected \"overwrite\" or \"skip\"",
                s
            ))),
        }
    }
}

impl fmt::Display for LocalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalPolicy::Overwrite => write!(f, "overwrite"),
            LocalPolicy::Skip => write!(f, "skip"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestConfiguration {
    bucket: String,
    remote_prefix: String,
    local_prefix: String,
    local_policy: LocalPolicy,
    max_concurrent: usize,
    endpoint: Option<String>,
}

impl ManifestConfiguration {
    pub fn new<S: Into<String>>(bucket: S) -> Result<Self, ValidationError> {
        let bucket = bucket.into();
        if bucket.is_empty() {
            return Err(ValidationError::new("bucket must not be empty"));
        }
        Ok(ManifestConfiguration {
            bucket,
            remote_prefix: String::new(),
            local_prefix: String::new(),
            local_policy: LocalPolicy::default(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            endpoint: None,
        })
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a configuration from any variable source keyed by the
    /// environment variable names above.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bucket = lookup(BUCKET_VAR)
            .ok_or_else(|| ValidationError::new(format!("{} is not set", BUCKET_VAR)))?;
        let mut config = Self::new(bucket)?;
        if let Some(prefix) = lookup(REMOTE_PREFIX_VAR) {
            config = config.with_remote_prefix(prefix);
        }
        if let Some(prefix) = lookup(LOCAL_PREFIX_VAR) {
            config = config.with_local_prefix(prefix);
        }
        if let Some(policy) = lookup(LOCAL_POLICY_VAR) {
            config = config.with_local_policy(policy.parse()?);
        }
        if let Some(max) = lookup(MAX_CONCURRENT_VAR) {
            let max = max.parse::<usize>().map_err(|e| {
                ValidationError::new(format!("{}={:?}: {}", MAX_CONCURRENT_VAR, max, e))
            })?;
            config = config.with_max_concurrent(max)?;
        }
        if let Some(endpoint) = lookup(ENDPOINT_VAR) {
            config = config.with_endpoint(endpoint);
        }
        Ok(config)
    }

    pub fn with_remote_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.remote_prefix = prefix.into();
        self
    }

    pub fn with_local_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.local_prefix = prefix.into();
        self
    }

    pub fn with_local_policy(mut self, policy: LocalPolicy) -> Self {
        self.local_policy = policy;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Result<Self, ValidationError> {
        if max_concurrent == 0 {
            return Err(ValidationError::new("max_concurrent must be positive"));
        }
        self.max_concurrent = max_concurrent;
        Ok(self)
    }

    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn remote_prefix(&self) -> &str {
        &self.remote_prefix
    }

    pub fn local_prefix(&self) -> &str {
        &self.local_prefix
    }

    pub fn local_policy(&self) -> LocalPolicy {
        self.local_policy
    }

    pub fn set_local_policy(&mut self, policy: LocalPolicy) {
        self.local_policy = policy;
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}
