//! secchecker のビルド処理
//!
//! GoのセキュリティLinter（gosec / govulncheck / safesql）を実行するイメージを
//! ビルドするための機能を提供します。対象ディレクトリにDockerfileを生成し、
//! Goソースとモジュールファイルだけを含むビルドコンテキストを作成して
//! Docker Engineでビルドし、ビルドログを出力します。

pub mod context;
pub mod error;
pub mod pipeline;
pub mod selector;
pub mod service;
pub mod template;

pub use context::ContextBuilder;
pub use error::{BuildError, BuildResult, ScanError, SelectError};
pub use pipeline::{ScanPipeline, ScanReport};
pub use selector::select_files;
pub use service::{BuildRequest, BuildService, DockerBuildService};
pub use template::{DOCKERFILE_TEMPLATE, write_template};
