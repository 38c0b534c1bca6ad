//! Audio path discovery and caching

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::audio::is_supported_audio;

/// Recursively collect decodable audio files under `root`, sorted
///
/// A `root` that is itself an audio file is returned as-is.
pub fn find_audio_files(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(if is_supported_audio(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).with_context(|| format!("Failed to list {:?}", dir))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_supported_audio(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Audio paths for `roots`, read from `cache_path` when present
///
/// Without a cache the roots are scanned and the result is written to
/// `cache_path` as a JSON list. Paths named in any exclusion file (one per
/// line) are removed from the result, not from the cache.
pub fn load_paths_from_cache(
    roots: &[PathBuf],
    cache_path: &Path,
    exclusions: &[PathBuf],
) -> Result<Vec<PathBuf>> {
    let paths: Vec<PathBuf> = if cache_path.exists() {
        let content = fs::read_to_string(cache_path)
            .with_context(|| format!("Failed to read path cache {:?}", cache_path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid path cache {:?}", cache_path))?
    } else {
        let mut paths = Vec::new();
        for root in roots {
            paths.extend(find_audio_files(root)?);
        }
        info!("Found {} audio files, caching to {:?}", paths.len(), cache_path);
        fs::write(cache_path, serde_json::to_string(&paths)?)
            .with_context(|| format!("Failed to write path cache {:?}", cache_path))?;
        paths
    };

    let mut excluded = HashSet::new();
    for exclusion in exclusions {
        let content = fs::read_to_string(exclusion)
            .with_context(|| format!("Failed to read exclusion list {:?}", exclusion))?;
        excluded.extend(content.lines().filter(|l| !l.is_empty()).map(PathBuf::from));
    }

    Ok(paths.into_iter().filter(|p| !excluded.contains(p)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_find_audio_files_recurses_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.wav"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("sub/b.wav"));

        let found = find_audio_files(dir.path()).unwrap();
        assert_eq!(found, vec![dir.path().join("a.wav"), dir.path().join("sub/b.wav")]);
    }

    #[test]
    fn test_cache_written_then_reused() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio");
        touch(&audio.join("a.wav"));
        let cache = dir.path().join("cache.json");

        let first = load_paths_from_cache(&[audio.clone()], &cache, &[]).unwrap();
        assert_eq!(first.len(), 1);
        assert!(cache.exists());

        // New files are not picked up while the cache exists
        touch(&audio.join("b.wav"));
        let second = load_paths_from_cache(&[audio], &cache, &[]).unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn test_exclusions_removed() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.wav"));
        touch(&dir.path().join("b.wav"));
        let exclusions = dir.path().join("exclude.txt");
        fs::write(&exclusions, format!("{}\n", dir.path().join("a.wav").display())).unwrap();

        let paths =
            load_paths_from_cache(&[dir.path().to_path_buf()], &dir.path().join("c.json"), &[exclusions]).unwrap();
        assert_eq!(paths, vec![dir.path().join("b.wav")]);
    }
}
