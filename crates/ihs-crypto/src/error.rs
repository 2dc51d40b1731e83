//! 暗号エラー型

use thiserror::Error;

/// 暗号操作のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// 鍵の長さが不正（16 / 24 / 32 バイト以外）
    #[error("Invalid key length: {0} bytes (expected 16, 24 or 32)")]
    InvalidKeyLength(usize),
    /// 16 進文字列のデコードに失敗
    #[error("Invalid hex encoding")]
    InvalidHex,
    /// 完全性検証に失敗（IV の HMAC 不一致、パディング不正、長さ不正を含む）
    #[error("Authentication failed: frame integrity check did not match")]
    AuthenticationFailed,
    /// 埋め込まれたシーケンス番号が期待値と異なる
    #[error("Sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch { expected: u64, actual: u64 },
    /// データチャンネルのペイロード復号に失敗
    #[error("Data payload decryption failed")]
    DataDecryptionFailed,
}

impl CryptoError {
    /// セッションを継続できないエラーか
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CryptoError::AuthenticationFailed | CryptoError::SequenceMismatch { .. }
        )
    }
}
