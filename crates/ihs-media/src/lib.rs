//! # ihs-media
//!
//! データチャンネル（音声・映像）のペイロードを受け取る出力層。
//!
//! コーデックのデコードと再生はこのクレートの外側にあり、ここでは境界となる
//! [`MediaSink`] トレイトと、受信ループを止めずに順序どおり処理するための
//! [`MediaWorker`] を提供する。
//!
//! ```text
//! SessionRunner ──submit()──▶ [bounded mpsc] ──▶ worker thread ──▶ MediaSink::decode → write
//!                  満杯なら捨てる                   1 本だけ（順序を保つ）
//! ```

pub mod error;
pub mod sink;
pub mod worker;

pub use error::{MediaError, Result};
pub use sink::{CollectSink, FileSink, MediaSink, NullSink};
pub use worker::{MediaWorker, WorkerStats};

/// 音声キューの既定の深さ
pub const DEFAULT_QUEUE_DEPTH: usize = 64;
