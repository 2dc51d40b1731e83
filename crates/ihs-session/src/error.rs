//! ihs-session エラー型

use ihs_crypto::CryptoError;
use ihs_transport::TransportError;
use thiserror::Error;

/// セッション層のエラー
///
/// 受信パケットの破棄（CRC 不一致・接続 ID 不一致・デコード失敗など）はエラーにせず
/// ログだけ残す。ここに現れるのは呼び出し側が対処すべきものだけ。
#[derive(Debug, Error)]
pub enum SessionError {
    /// 暗号処理の失敗（復号の完全性・シーケンス検証はセッション致命的）
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
    /// 送信パケットの組み立て失敗
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    /// チャンネルのパケット ID を使い切った
    #[error("No free packet id on channel {channel}")]
    PacketIdsExhausted { channel: u8 },
    /// ホストが認証を拒否した
    #[error("Authorization rejected by host (result {0})")]
    AuthorizationRejected(i32),
    /// 乱数生成の失敗
    #[error("Random source unavailable: {0}")]
    Random(String),
    /// 既に切断されたセッションへの送信
    #[error("Session is closed")]
    Closed,
}

impl SessionError {
    /// セッションを終了させるエラーか
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::Crypto(e) => e.is_fatal(),
            SessionError::AuthorizationRejected(_) | SessionError::Closed => true,
            _ => false,
        }
    }
}

pub type Result<T> = core::result::Result<T, SessionError>;
