use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::model::{MODEL_FORMAT_VERSION, TrainedModel};

const CACHE_DIR: &str = "matchcast";
const MODEL_SUFFIX: &str = ".model.json";

pub fn app_cache_dir() -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    // Fallback to ~/.cache on linux-like systems.
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn default_models_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("MATCHCAST_MODELS_DIR")
        && !raw.trim().is_empty()
    {
        return Some(PathBuf::from(raw.trim()));
    }
    app_cache_dir().map(|dir| dir.join("models"))
}

/// File stem for a competition key: lowercase ascii alphanumerics, `-` and `_`.
pub fn file_stem(competition: &str) -> String {
    competition
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

pub fn model_path(dir: &Path, competition: &str) -> PathBuf {
    dir.join(format!("{}{MODEL_SUFFIX}", file_stem(competition)))
}

/// Writes the model next to its final path and renames it into place, so a
/// reader never sees a half-written file.
pub fn save_model(dir: &Path, model: &TrainedModel) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create models dir {}", dir.display()))?;
    let path = model_path(dir, &model.competition);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec(model).context("serialize model")?;
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, &path).with_context(|| format!("swap {}", path.display()))?;
    Ok(path)
}

pub fn load_model(path: &Path) -> Result<TrainedModel> {
    let raw = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let model = serde_json::from_slice::<TrainedModel>(&raw)
        .with_context(|| format!("decode {}", path.display()))?;
    if model.format_version != MODEL_FORMAT_VERSION {
        bail!(
            "{}: model format v{} is not supported (expected v{MODEL_FORMAT_VERSION})",
            path.display(),
            model.format_version
        );
    }
    Ok(model)
}

pub fn list_model_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(err) => return Err(err).with_context(|| format!("list {}", dir.display())),
    };
    for entry in entries {
        let path = entry.context("read dir entry")?.path();
        let is_model = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(MODEL_SUFFIX));
        if is_model {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
