//! # ihs-client
//!
//! In-Home Streaming クライアントの駆動部。
//!
//! ## 内部アーキテクチャ
//!
//! ```text
//! SessionRunner
//!   ├── UdpSocket      (tokio)        - 1 セッション = 1 ソケット
//!   ├── SessionClient  (ihs-session)  - 状態機械（ソケットを持たない）
//!   ├── RetryTask      (retry)        - CONNECT_ACK が来るまで CONNECT を再送
//!   └── MediaWorker    (ihs-media)    - 音声・映像ペイロードの出力（専用スレッド）
//! ```
//!
//! ## 使い方
//!
//! ```text
//! ihs-client connect --host 192.168.1.20 --key 00112233445566778899aabbccddeeff --steamid 7656...
//! ihs-client --config client.toml connect --dump-video capture.h264
//! ihs-client --config client.toml show-config
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod retry;
pub mod runner;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use retry::{CancelFlag, RetryTask};
pub use runner::{RunSummary, SessionRunner};
