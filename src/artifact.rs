use std::path::Path;

use tokio::fs;

use super::error::{Error, ValidationError};

/// A named file tracked by a manifest.
///
/// `name` becomes the remote object key (after the remote prefix is
/// prepended); `path` is the local location relative to the local prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    name: String,
    path: String,
}

impl Artifact {
    pub fn new<N, P>(name: N, path: P) -> Result<Artifact, ValidationError>
    where
        N: Into<String>,
        P: Into<String>,
    {
        let name = name.into();
        let path = path.into();
        if name.is_empty() {
            return Err(ValidationError::new("artifact name must not be empty"));
        }
        if path.is_empty() {
            return Err(ValidationError::new(format!(
                "artifact {:?} has an empty path",
                name
            )));
        }
        Ok(Artifact { name, path })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Parses a manifest list: one `name<TAB>path` per line, blank lines and
/// `#` comments ignored.
pub fn parse_list(text: &str) -> Result<Vec<Artifact>, ValidationError> {
    let mut artifacts = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let mut cols = line.splitn(2, '\t');
        let name = cols.next().unwrap_or_default();
        let path = cols.next().ok_or_else(|| {
            ValidationError::new(format!("line {}: no path in manifest", line_no))
        })?;
        let artifact = Artifact::new(name, path)
            .map_err(|e| ValidationError::new(format!("line {}: {}", line_no, e.message())))?;
        artifacts.push(artifact);
    }
    Ok(artifacts)
}

pub async fn read_list<P: AsRef<Path>>(path: P) -> Result<Vec<Artifact>, Error> {
    let text = fs::read_to_string(path).await?;
    Ok(parse_list(&text)?)
}
