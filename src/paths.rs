use std::path::PathBuf;

/// Per-deployment work directory:
/// `~/.local/share/vigil/<id>-<name>/` or `~/.local/share/vigil/<id>/`
pub fn work_dir(id: &str, name: Option<&str>) -> PathBuf {
    let dir_name = match name {
        Some(n) => format!("{id}-{n}"),
        None => id.to_string(),
    };
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("vigil")
        .join(dir_name)
}

/// Install run logs for a deployment.
pub fn logs_dir(id: &str, name: Option<&str>) -> PathBuf {
    work_dir(id, name).join("logs")
}

/// Path to the persisted deployment record.
pub fn record_path(id: &str, name: Option<&str>) -> PathBuf {
    work_dir(id, name).join("deployment.json")
}
