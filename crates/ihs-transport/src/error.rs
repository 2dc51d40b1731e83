//! ihs-transport エラー型

use thiserror::Error;

/// トランスポート層のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// ヘッダー（13 バイト）に満たない
    #[error("Malformed packet: {0} bytes is shorter than the header")]
    TooShort(usize),
    /// CRC フラグが立っているのにトレーラーが足りない
    #[error("Malformed packet: CRC flag set but trailer missing")]
    MissingCrc,
    /// 未知のパケット種別
    #[error("Malformed packet: unknown packet type {0}")]
    UnknownPacketType(u8),
    /// フラグメント数が fragment_id の範囲を超える
    #[error("Message of {0} bytes cannot be fragmented")]
    MessageTooLarge(usize),
}

impl TransportError {
    /// 受信パケットが不正で、黙って捨てるべきエラーか
    pub fn is_malformed(&self) -> bool {
        !matches!(self, TransportError::MessageTooLarge(_))
    }
}

pub type Result<T> = core::result::Result<T, TransportError>;
