//! ihs-media エラー型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    /// 出力先への書き込み失敗
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// シンクがペイロードを解釈できなかった
    #[error("Decode failed: {0}")]
    Decode(String),
    /// キューの深さが 0
    #[error("Queue depth must be at least 1")]
    InvalidQueueDepth,
    /// ワーカースレッドを起動できなかった
    #[error("Failed to spawn media worker: {0}")]
    Spawn(String),
    /// ワーカースレッドが panic した
    #[error("Media worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = core::result::Result<T, MediaError>;
