//! セッションから上位層（UI・メディア出力）へ通知するイベント

use ihs_proto::{
    CDeleteCursorMsg, CGetCursorImageMsg, CSetActivityMsg, CSetCaptureSizeMsg, CSetCursorImageMsg,
    CSetCursorMsg, CSetIconMsg, CSetKeymapMsg, CSetQoSMsg, CSetSpectatorModeMsg,
    CSetTargetBitrateMsg, CSetTargetFramerateMsg, CSetTitleMsg, CShowCursorMsg,
    CVideoEncoderInfoMsg, EStreamAudioCodec, EStreamVideoCodec,
};

use crate::data::DataHeader;
use crate::negotiation::NegotiatedConfig;
use crate::session::SessionState;

/// セッションが終了した理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// ホストから DISCONNECT を受信した
    PeerDisconnected,
    /// こちらから切断した
    LocalHangup,
    /// ホストが認証を拒否した
    AuthorizationRejected,
    /// 制御メッセージの復号・検証に失敗した
    DecryptFailed,
    /// ソケットエラーなどでホストに到達できない
    HostUnreachable,
    /// 返信を組み立てられなかった（パケット ID の枯渇など）
    SendFailed,
}

/// ストリーミング中にホストから届く通知
///
/// プロトコル上は副作用がなく、UI 層がそのまま扱う。
#[derive(Debug, Clone, PartialEq)]
pub enum ControlNotification {
    SetTitle(CSetTitleMsg),
    SetIcon(CSetIconMsg),
    ShowCursor(CShowCursorMsg),
    HideCursor,
    SetCursor(CSetCursorMsg),
    GetCursorImage(CGetCursorImageMsg),
    SetCursorImage(CSetCursorImageMsg),
    DeleteCursor(CDeleteCursorMsg),
    SetKeymap(CSetKeymapMsg),
    SetActivity(CSetActivityMsg),
    SetCaptureSize(CSetCaptureSizeMsg),
    VideoEncoderInfo(CVideoEncoderInfoMsg),
    SetQos(CSetQoSMsg),
    SetTargetBitrate(CSetTargetBitrateMsg),
    SetTargetFramerate(CSetTargetFramerateMsg),
    SetSpectatorMode(CSetSpectatorModeMsg),
    KeepAlive,
    QuitRequest,
}

/// [`SessionClient::poll_event`](crate::SessionClient::poll_event) で取り出すイベント
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// 状態遷移
    StateChanged { from: SessionState, to: SessionState },
    /// CONNECT_ACK を受信した
    Connected { dst_conn_id: u8, connect_timestamp: u32 },
    /// サーバーハンドシェイクで MTU のヒントを受け取った
    ServerHandshake { mtu: Option<i32> },
    /// ネゴシエーション結果を送信した
    Negotiated(NegotiatedConfig),
    AudioStarted {
        channel: u8,
        codec: EStreamAudioCodec,
        frequency: u32,
        channels: u32,
    },
    AudioStopped { channel: u8 },
    VideoStarted {
        channel: u8,
        codec: EStreamVideoCodec,
        width: u32,
        height: u32,
    },
    VideoStopped { channel: u8 },
    /// 音声ペイロード（復号済み）
    AudioData {
        channel: u8,
        header: DataHeader,
        payload: Vec<u8>,
    },
    /// 映像ペイロード（復号済み）
    VideoData {
        channel: u8,
        header: DataHeader,
        payload: Vec<u8>,
    },
    Notification(ControlNotification),
    /// 送信したパケットが NACK された（自動再送はしない）
    PacketRejected { channel: u8, pkt_id: u16 },
    /// 登録されていない制御メッセージ種別
    Unrecognized { msg_type: u8 },
    Disconnected { reason: DisconnectReason },
}
