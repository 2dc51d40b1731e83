//! ihs-client エラー型

use ihs_crypto::CryptoError;
use ihs_media::MediaError;
use ihs_session::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// 設定ファイルの読み込み・解析の失敗
    #[error("Config error: {0}")]
    Config(String),
    /// 設定値が不正
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    /// セッション鍵が不正
    #[error("Invalid session key: {0}")]
    Key(#[from] CryptoError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Media error: {0}")]
    Media(#[from] MediaError),
    /// ソケット・ファイル I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// ホスト名を解決できなかった
    #[error("Could not resolve host {0}")]
    Resolve(String),
    #[error("Failed to init logging: {0}")]
    Logging(String),
}

pub type Result<T> = core::result::Result<T, ClientError>;
