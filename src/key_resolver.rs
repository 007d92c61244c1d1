use std::path::{Path, PathBuf};

pub fn remote_key(remote_prefix: &str, name: &str) -> String {
    format!("{}{}", remote_prefix, name)
}

pub fn local_path(local_prefix: &str, path: &str) -> PathBuf {
    Path::new(local_prefix).join(path)
}
