//! スキャン用Dockerfileテンプレート
//!
//! gosec / govulncheck / safesql をインストールし、ソースツリー全体に対して
//! 順番に実行するDockerfileを生成します。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 生成するDockerfileのファイル名
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Dockerfileの内容（固定）
pub const DOCKERFILE_TEMPLATE: &str = r#"
FROM golang:latest

WORKDIR /app
ENV GO111MODULE=on

COPY . ./
RUN go mod download

RUN go install github.com/securego/gosec/v2/cmd/gosec@latest
RUN go install golang.org/x/vuln/cmd/govulncheck@latest
RUN go get github.com/stripe/safesql

CMD gosec ./... && govulncheck ./... && safesql ./..."#;

/// `root/Dockerfile` にテンプレートを書き込む
///
/// 既存のファイルは上書きする。Unixではパーミッションを 0777 に設定する。
pub fn write_template(root: &Path) -> io::Result<PathBuf> {
    let path = root.join(DOCKERFILE_NAME);
    fs::write(&path, DOCKERFILE_TEMPLATE)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o777))?;
    }

    tracing::debug!("Wrote {}", path.display());
    Ok(path)
}
