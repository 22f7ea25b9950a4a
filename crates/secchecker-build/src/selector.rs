//! ファイル選択
//!
//! ルートディレクトリ以下を深さ優先で走査し、ベース名がglobパターンに
//! 一致するファイルをルートからの相対パスとして返します。

use crate::error::SelectError;
use glob::Pattern;
use std::fs;
use std::path::{Component, Path};
use tracing::debug;

type Result<T> = std::result::Result<T, SelectError>;

/// `root` 以下でベース名が `pattern` に一致するファイルを列挙
///
/// ディレクトリ自体は結果に含めないが、その中身は走査する。
/// `root` 以外のシンボリックリンクは辿らない。エラーが起きた場合は途中結果を返さない。
pub fn select_files(root: &Path, pattern: &str) -> Result<Vec<String>> {
    let pattern = Pattern::new(pattern).map_err(|source| SelectError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let metadata = fs::metadata(root).map_err(|e| walk_error(root, e))?;

    let mut matches = Vec::new();
    if metadata.is_dir() {
        visit_dir(root, root, &pattern, &mut matches)?;
    } else if name_matches(root, &pattern) {
        matches.push(".".to_string());
    }

    debug!(root = %root.display(), count = matches.len(), "Selected files");
    Ok(matches)
}

fn visit_dir(
    root: &Path,
    dir: &Path,
    pattern: &Pattern,
    matches: &mut Vec<String>,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| walk_error(dir, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| walk_error(dir, e))?;

    // 走査順を安定させる
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| walk_error(&path, e))?;

        if file_type.is_dir() {
            visit_dir(root, &path, pattern, matches)?;
        } else if name_matches(&path, pattern) {
            matches.push(relative_path(root, &path)?);
        }
    }

    Ok(())
}

fn name_matches(path: &Path, pattern: &Pattern) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| pattern.matches(name))
}

/// `/` 区切りの相対パス文字列に変換
fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|e| SelectError::Walk {
        path: path.to_path_buf(),
        message: format!("相対パスに変換できません: {}", e),
    })?;

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| SelectError::Walk {
                    path: path.to_path_buf(),
                    message: "UTF-8でないパス".to_string(),
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => {
                return Err(SelectError::Walk {
                    path: path.to_path_buf(),
                    message: "ルート外のパス".to_string(),
                });
            }
        }
    }

    Ok(parts.join("/"))
}

fn walk_error(path: &Path, err: std::io::Error) -> SelectError {
    SelectError::Walk {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
