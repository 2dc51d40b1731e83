//! # ihs-session
//!
//! In-Home Streaming のクライアントセッション。
//!
//! ## 構成
//!
//! - [`channel`]: チャンネルごとのパケット ID 管理とフレーム組み立て、ACK / NACK の返信
//! - [`control`]: 制御メッセージの登録表（種別バイト → デコーダー）
//! - [`data`]: 音声・映像ペイロードのヘッダー解析
//! - [`negotiation`]: コーデック選択と NegotiationSetConfig の組み立て
//! - [`session`]: 接続からストリーミングまでの状態機械
//!
//! ## 状態遷移
//!
//! ```text
//! Connecting → AwaitingConnectAck   CONNECT 送信
//!            → Handshaking          CONNECT_ACK 受信 / ClientHandshake 送信
//!            → Authenticating       ServerHandshake 受信 / AuthenticationRequest 送信
//!            → Negotiating          AuthenticationResponse(result = 0)
//!            → Streaming            NegotiationSetConfig 受信 / NegotiationComplete 送信
//! 任意の状態 → Disconnected         DISCONNECT、認証拒否、復号失敗、hangup
//! ```
//!
//! セッションはソケットを持たない（sans-IO）。受信データグラムを
//! [`SessionClient::handle_datagram`] に渡し、[`SessionClient::poll_transmit`] と
//! [`SessionClient::poll_event`] で結果を取り出す。

pub mod channel;
pub mod control;
pub mod data;
pub mod error;
pub mod event;
mod link;
pub mod negotiation;
pub mod session;

pub use channel::{Channel, ChannelCore, ChannelKind};
pub use control::{decode_control, ControlDecode, ControlMessage};
pub use data::{parse_data_payload, DataHeader, DataPayload, SubHeader, TimingHeader};
pub use error::{Result, SessionError};
pub use event::{ControlNotification, DisconnectReason, SessionEvent};
pub use link::DEFAULT_MTU;
pub use negotiation::{NegotiatedConfig, StreamPreferences, VideoMode};
pub use session::{SessionClient, SessionOptions, SessionState};

/// CONNECT パケットの本体（`crc32c(b"Connect")`）
pub const CONNECT_MAGIC: u32 = 0x3C8F_3DC7;
