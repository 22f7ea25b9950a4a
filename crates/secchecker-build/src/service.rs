//! イメージビルドサービス
//!
//! ビルドコンテキストとビルドオプションをコンテナエンジンに送り、
//! ビルドログをバイト列のストリームとして返します。

use crate::error::{BuildError, BuildResult};
use crate::template::DOCKERFILE_NAME;
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::{LocalBoxStream, StreamExt};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// ビルドするイメージのタグ
pub const IMAGE_TAG: &str = "secchecker";

/// ビルド時に付与するラベル
pub const IMAGE_LABELS: [(&str, &str); 1] = [("custom", "test")];

/// ビルドオプション
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub tag: String,
    pub dockerfile: String,
    /// ベースイメージを常にpullする
    pub pull: bool,
    pub labels: HashMap<String, String>,
}

impl Default for BuildRequest {
    fn default() -> Self {
        Self {
            tag: IMAGE_TAG.to_string(),
            dockerfile: DOCKERFILE_NAME.to_string(),
            pull: true,
            labels: IMAGE_LABELS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// ビルドコンテキストを受け取り、ビルドログを返すサービス
pub trait BuildService {
    fn build<'a>(
        &'a self,
        context: Vec<u8>,
        request: &'a BuildRequest,
    ) -> LocalBoxStream<'a, BuildResult<Bytes>>;
}

/// Docker Engine APIを使うビルドサービス
pub struct DockerBuildService {
    docker: Docker,
}

impl DockerBuildService {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// デフォルトの接続先（DOCKER_HOST またはローカルソケット）に接続
    pub fn connect() -> Result<Self, bollard::errors::Error> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::new(docker))
    }
}

impl BuildService for DockerBuildService {
    fn build<'a>(
        &'a self,
        context: Vec<u8>,
        request: &'a BuildRequest,
    ) -> LocalBoxStream<'a, BuildResult<Bytes>> {
        tracing::info!("Building image: {}", request.tag);

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions::<String> {
            dockerfile: request.dockerfile.clone(),
            t: request.tag.clone(),
            pull: request.pull,
            labels: request.labels.clone(),
            ..Default::default()
        };

        tracing::debug!("Build options: {:?}", options);

        use http_body_util::{Either, Full};
        let body = Full::new(Bytes::from(context));

        let stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        stream
            .map(|msg| match msg {
                Ok(output) => encode_line(&build_info_line(output)),
                // エンジンが報告したビルドエラーもログの1行として出力する
                Err(bollard::errors::Error::DockerStreamError { error }) => {
                    encode_line(&error_line(error))
                }
                Err(e) => Err(BuildError::DockerConnection(e)),
            })
            .boxed_local()
    }
}

/// Engine APIのビルドレスポンスの1行を組み立てる
fn build_info_line(output: bollard::models::BuildInfo) -> Map<String, Value> {
    let mut line = Map::new();

    if let Some(id) = output.id {
        line.insert("id".to_string(), Value::String(id));
    }
    if let Some(stream) = output.stream {
        line.insert("stream".to_string(), Value::String(stream));
    }
    if let Some(status) = output.status {
        line.insert("status".to_string(), Value::String(status));
    }
    if let Some(progress) = output.progress {
        line.insert("progress".to_string(), Value::String(progress));
    }
    if let Some(detail) = output.error_detail {
        let mut error_detail = Map::new();
        if let Some(code) = detail.code {
            error_detail.insert("code".to_string(), json!(code));
        }
        if let Some(message) = detail.message {
            error_detail.insert("message".to_string(), Value::String(message));
        }
        line.insert("errorDetail".to_string(), Value::Object(error_detail));
    }
    if let Some(error) = output.error {
        line.insert("error".to_string(), Value::String(error));
    }
    if let Some(image_id) = output.aux.and_then(|aux| aux.id) {
        line.insert("aux".to_string(), json!({ "ID": image_id }));
    }

    line
}

fn error_line(error: String) -> Map<String, Value> {
    let mut line = Map::new();
    line.insert("errorDetail".to_string(), json!({ "message": error.clone() }));
    line.insert("error".to_string(), Value::String(error));
    line
}

/// 1行のJSONとしてエンコード
///
/// Engine APIと同じ `\r\n` 区切り。
fn encode_line(line: &Map<String, Value>) -> BuildResult<Bytes> {
    let mut bytes = serde_json::to_vec(line)?;
    bytes.extend_from_slice(b"\r\n");
    Ok(Bytes::from(bytes))
}
