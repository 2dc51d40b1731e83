//! ihs-proto エラー型

use thiserror::Error;

/// Protobuf エンコード/デコードのエラー
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Protobuf デコード失敗
    #[error("Proto decode failed: {0}")]
    DecodeFailed(#[from] prost::DecodeError),
    /// 未知の列挙値
    #[error("Unknown {kind} value: {value}")]
    UnknownEnumValue { kind: &'static str, value: i32 },
    /// 長さプレフィックスが不正
    #[error("Invalid length prefix: {0}")]
    InvalidLength(i32),
}
