use crate::error::{BuildError, BuildResult};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::HashSet;
use std::path::{Component, Path};
use tar::Builder;

pub struct ContextBuilder;

impl ContextBuilder {
    /// 指定したファイルだけを含むビルドコンテキストをtar.gzアーカイブとして作成
    ///
    /// `include` は `context_path` からの相対パス。存在しないエントリは警告を出して
    /// スキップし、重複したエントリは最初の1回だけ追加する。
    pub fn create_context(context_path: &Path, include: &[String]) -> BuildResult<Vec<u8>> {
        tracing::debug!("Creating build context from: {}", context_path.display());

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);
            // シンボリックリンクはリンクとして格納する
            tar.follow_symlinks(false);
            let mut seen = HashSet::new();

            for entry in include {
                Self::validate_entry(entry)?;

                if !seen.insert(entry.as_str()) {
                    continue;
                }

                let source = context_path.join(entry);
                let metadata = match std::fs::symlink_metadata(&source) {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        tracing::warn!("Skipping {} in build context: {}", entry, e);
                        continue;
                    }
                };

                if metadata.is_dir() {
                    tar.append_dir_all(entry, &source)?;
                } else {
                    tar.append_path_with_name(&source, entry)?;
                }
            }

            tar.into_inner()?.finish()?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());

        // コンテキストサイズの警告
        Self::check_context_size(archive_data.len());

        Ok(archive_data)
    }

    /// ルート外を指すパスを拒否
    fn validate_entry(entry: &str) -> BuildResult<()> {
        let path = Path::new(entry);
        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));

        if entry.is_empty() || escapes {
            return Err(BuildError::InvalidConfig(format!(
                "build context entry must be relative to the context root: '{}'",
                entry
            )));
        }
        Ok(())
    }

    /// コンテキストサイズのチェックと警告
    fn check_context_size(size: usize) {
        const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024; // 500MB

        if size > MAX_CONTEXT_SIZE {
            tracing::warn!(
                "警告: ビルドコンテキストが大きすぎます（{}MB）",
                size / 1024 / 1024
            );
        }
    }
}
