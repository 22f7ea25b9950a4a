//! スキャン用イメージのビルド処理
//!
//! Dockerfileの書き込み → Goファイルの選択 → ビルドコンテキスト作成 →
//! イメージビルド → ビルドログの出力、を順番に実行します。
//! どのステップも失敗した時点で中断し、リトライはしません。

use crate::context::ContextBuilder;
use crate::error::{Result, ScanError};
use crate::selector::select_files;
use crate::service::{BuildRequest, BuildService};
use crate::template::{DOCKERFILE_NAME, write_template};
use futures_util::StreamExt;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// ビルドコンテキストに含めるGoソースのパターン
pub const SOURCE_PATTERN: &str = "*.go";

/// 常にビルドコンテキストに含めるモジュールファイル
pub const MODULE_FILES: [&str; 2] = ["go.mod", "go.sum"];

/// 正常終了時の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// ビルドコンテキストに含めたファイル
    pub included: Vec<String>,
    /// ビルドコンテキストのサイズ（バイト）
    pub context_bytes: usize,
    /// 出力したビルドログのサイズ（バイト）
    pub log_bytes: u64,
}

pub struct ScanPipeline<S> {
    service: S,
    request: BuildRequest,
}

impl<S: BuildService> ScanPipeline<S> {
    pub fn new(service: S, request: BuildRequest) -> Self {
        Self { service, request }
    }

    /// Dockerfileを書き込み、ビルドコンテキストに含めるファイルの一覧を作る
    ///
    /// 一覧は重複排除しない。
    pub fn prepare(&self, root: &Path) -> Result<Vec<String>> {
        let dockerfile = root.join(DOCKERFILE_NAME);
        write_template(root).map_err(|source| ScanError::TemplateWrite {
            path: dockerfile,
            source,
        })?;

        let mut included = select_files(root, SOURCE_PATTERN)?;
        tracing::info!("Found {} Go source files under {}", included.len(), root.display());

        included.extend(MODULE_FILES.iter().map(|name| name.to_string()));
        included.push(DOCKERFILE_NAME.to_string());

        Ok(included)
    }

    /// ビルドを実行し、ビルドログを `out` にそのまま書き出す
    pub async fn run<W>(&self, root: &Path, out: &mut W) -> Result<ScanReport>
    where
        W: AsyncWrite + Unpin,
    {
        let included = self.prepare(root)?;

        let context =
            ContextBuilder::create_context(root, &included).map_err(ScanError::Archive)?;
        let context_bytes = context.len();

        // ストリームはこのスコープを抜けるときに必ず解放される
        let mut stream = self.service.build(context, &self.request);

        let mut log_bytes = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(ScanError::Build)?;
            out.write_all(&chunk).await.map_err(ScanError::OutputCopy)?;
            log_bytes += chunk.len() as u64;
        }
        out.flush().await.map_err(ScanError::OutputCopy)?;

        tracing::info!("Successfully built: {}", self.request.tag);

        Ok(ScanReport {
            included,
            context_bytes,
            log_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BuildError, BuildResult};
    use crate::template::DOCKERFILE_TEMPLATE;
    use bytes::Bytes;
    use futures_util::stream::{self, LocalBoxStream};
    use std::cell::RefCell;
    use std::fs;
    use tempfile::tempdir;

    /// 受け取ったコンテキストを記録し、決まったログを返すビルドサービス
    #[derive(Default)]
    struct FakeService {
        chunks: Vec<BuildResult<Bytes>>,
        contexts: RefCell<Vec<Vec<u8>>>,
    }

    impl FakeService {
        fn with_log(chunks: &[&'static [u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| Ok(Bytes::from_static(c))).collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.contexts.borrow().len()
        }
    }

    impl BuildService for FakeService {
        fn build<'a>(
            &'a self,
            context: Vec<u8>,
            _request: &'a BuildRequest,
        ) -> LocalBoxStream<'a, BuildResult<Bytes>> {
            self.contexts.borrow_mut().push(context);
            let chunks: Vec<BuildResult<Bytes>> = self
                .chunks
                .iter()
                .map(|c| match c {
                    Ok(bytes) => Ok(bytes.clone()),
                    Err(_) => Err(BuildError::InvalidConfig("engine gone".to_string())),
                })
                .collect();
            stream::iter(chunks).boxed_local()
        }
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "x").unwrap();
    }

    fn sorted(mut list: Vec<String>) -> Vec<String> {
        list.sort();
        list
    }

    #[test]
    fn test_prepare_go_module() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        touch(root, "main.go");
        touch(root, "util/helper.go");
        touch(root, "go.mod");
        touch(root, "go.sum");

        let pipeline = ScanPipeline::new(FakeService::default(), BuildRequest::default());
        let included = pipeline.prepare(root).unwrap();

        assert_eq!(
            sorted(included),
            vec!["Dockerfile", "go.mod", "go.sum", "main.go", "util/helper.go"]
        );
        assert_eq!(
            fs::read_to_string(root.join("Dockerfile")).unwrap(),
            DOCKERFILE_TEMPLATE
        );
    }

    #[test]
    fn test_prepare_without_go_files() {
        let temp_dir = tempdir().unwrap();
        touch(temp_dir.path(), "README.md");

        let pipeline = ScanPipeline::new(FakeService::default(), BuildRequest::default());
        let included = pipeline.prepare(temp_dir.path()).unwrap();

        assert_eq!(included, vec!["go.mod", "go.sum", "Dockerfile"]);
    }

    #[test]
    fn test_prepare_appends_fixed_files_last() {
        let temp_dir = tempdir().unwrap();
        touch(temp_dir.path(), "a.go");
        touch(temp_dir.path(), "z/z.go");

        let pipeline = ScanPipeline::new(FakeService::default(), BuildRequest::default());
        let included = pipeline.prepare(temp_dir.path()).unwrap();

        assert_eq!(included, vec!["a.go", "z/z.go", "go.mod", "go.sum", "Dockerfile"]);
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        touch(temp_dir.path(), "main.go");

        let pipeline = ScanPipeline::new(FakeService::default(), BuildRequest::default());
        let first = pipeline.prepare(temp_dir.path()).unwrap();
        let first_template = fs::read(temp_dir.path().join("Dockerfile")).unwrap();
        let second = pipeline.prepare(temp_dir.path()).unwrap();
        let second_template = fs::read(temp_dir.path().join("Dockerfile")).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_template, second_template);
    }

    #[tokio::test]
    async fn test_run_relays_build_log_verbatim() {
        let temp_dir = tempdir().unwrap();
        touch(temp_dir.path(), "main.go");

        let log: &[&'static [u8]] = &[
            b"{\"stream\":\"Step 1/9 : FROM golang:latest\\n\"}\n",
            b"",
            b"\x00\xffraw bytes\r\n",
        ];
        let expected: Vec<u8> = log.concat();

        let pipeline = ScanPipeline::new(FakeService::with_log(log), BuildRequest::default());
        let mut out = Vec::new();
        let report = pipeline.run(temp_dir.path(), &mut out).await.unwrap();

        assert_eq!(out, expected);
        assert_eq!(report.log_bytes, expected.len() as u64);
        assert_eq!(pipeline.service.calls(), 1);
    }

    #[tokio::test]
    async fn test_run_sends_only_included_files() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        touch(root, "main.go");
        touch(root, "go.mod");
        touch(root, ".env");
        touch(root, "docs/guide.md");

        let pipeline = ScanPipeline::new(FakeService::default(), BuildRequest::default());
        let mut out = Vec::new();
        let report = pipeline.run(root, &mut out).await.unwrap();

        let context = pipeline.service.contexts.borrow()[0].clone();
        assert_eq!(report.context_bytes, context.len());

        let decoder = flate2::read::GzDecoder::new(std::io::Cursor::new(context));
        let mut archive = tar::Archive::new(decoder);
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();

        // go.sum は存在しないのでアーカイブには入らない
        assert_eq!(names, vec!["Dockerfile", "go.mod", "main.go"]);
    }

    #[tokio::test]
    async fn test_run_missing_root_never_calls_service() {
        let temp_dir = tempdir().unwrap();
        let missing = temp_dir.path().join("missing");

        let pipeline = ScanPipeline::new(FakeService::default(), BuildRequest::default());
        let mut out = Vec::new();
        let result = pipeline.run(&missing, &mut out).await;

        let err = result.unwrap_err();
        assert!(matches!(err, ScanError::TemplateWrite { .. }));
        assert_eq!(err.stage(), "write dockerfile");
        assert_eq!(pipeline.service.calls(), 0);
        assert!(out.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_run_walk_error_never_calls_service() {
        use crate::error::SelectError;
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        // UTF-8でないディレクトリ名は相対パスに変換できない
        let bad_dir = root.join(OsStr::from_bytes(b"pkg\xff"));
        fs::create_dir(&bad_dir).unwrap();
        fs::write(bad_dir.join("main.go"), "package pkg").unwrap();

        let pipeline = ScanPipeline::new(FakeService::default(), BuildRequest::default());
        let mut out = Vec::new();
        let err = pipeline.run(root, &mut out).await.unwrap_err();

        assert!(matches!(err, ScanError::Select(SelectError::Walk { .. })));
        assert_eq!(err.stage(), "walk files");
        // Dockerfileの書き込みは済んでいる
        assert!(root.join("Dockerfile").exists());
        assert_eq!(pipeline.service.calls(), 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_service_error() {
        let temp_dir = tempdir().unwrap();
        touch(temp_dir.path(), "main.go");

        let service = FakeService {
            chunks: vec![
                Ok(Bytes::from_static(b"partial\n")),
                Err(BuildError::InvalidConfig("engine gone".to_string())),
                Ok(Bytes::from_static(b"never written\n")),
            ],
            ..Default::default()
        };
        let pipeline = ScanPipeline::new(service, BuildRequest::default());
        let mut out = Vec::new();
        let err = pipeline.run(temp_dir.path(), &mut out).await.unwrap_err();

        assert!(matches!(err, ScanError::Build(_)));
        assert_eq!(out, b"partial\n");
    }
}
