use std::path::PathBuf;
use thiserror::Error;

/// ファイル選択のエラー
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("無効なglobパターン '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("ディレクトリの走査に失敗: {path}\n理由: {message}")]
    Walk { path: PathBuf, message: String },
}

/// アーカイブ作成・ビルドサービスのエラー
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("Build log encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// スキャン処理の各ステージで発生するエラー
///
/// どのステージで失敗したかを呼び出し側が判別できるよう、ステージごとに
/// バリアントを分けている。
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Dockerfileの書き込みに失敗しました: {path}: {source}")]
    TemplateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Goファイルの走査に失敗しました: {0}")]
    Select(#[from] SelectError),

    #[error("Dockerクライアントの初期化に失敗しました: {0}")]
    ClientInit(#[source] bollard::errors::Error),

    #[error("ビルドコンテキストの作成に失敗しました: {0}")]
    Archive(#[source] BuildError),

    #[error("イメージのビルドに失敗しました: {0}")]
    Build(#[source] BuildError),

    #[error("ビルドログの出力に失敗しました: {0}")]
    OutputCopy(#[source] std::io::Error),
}

impl ScanError {
    /// 失敗したステージ名
    pub fn stage(&self) -> &'static str {
        match self {
            ScanError::TemplateWrite { .. } => "write dockerfile",
            ScanError::Select(_) => "walk files",
            ScanError::ClientInit(_) => "init client",
            ScanError::Archive(_) => "create tar",
            ScanError::Build(_) => "build docker image",
            ScanError::OutputCopy(_) => "read image build response",
        }
    }

    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            ScanError::ClientInit(_) | ScanError::Build(BuildError::DockerConnection(_)) => {
                format!(
                    "{}\n\
                     \n\
                     ヒント:\n  \
                     • Dockerが起動しているか確認してください\n  \
                     • DOCKER_HOST 環境変数を確認してください",
                    self
                )
            }
            ScanError::Select(SelectError::Walk { path, .. }) => {
                format!(
                    "{}\n\
                     \n\
                     --path で指定したディレクトリ ({}) が読み取り可能か確認してください。",
                    self,
                    path.display()
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
