//! 制御チャンネルのメッセージ登録表
//!
//! メッセージ種別バイトからデコーダーを引く静的な表。表にない種別は
//! [`ControlDecode::Unrecognized`] になる。

use ihs_proto::{
    decode_from_bytes, frame_should_encrypt, CAuthenticationResponseMsg, CDeleteCursorMsg,
    CGetCursorImageMsg, CHideCursorMsg, CKeepAliveMsg, CNegotiationCompleteMsg,
    CNegotiationInitMsg, CNegotiationSetConfigMsg, CQuitRequest, CServerHandshakeMsg,
    CSetActivityMsg, CSetCaptureSizeMsg, CSetCursorImageMsg, CSetCursorMsg, CSetIconMsg,
    CSetKeymapMsg, CSetQoSMsg, CSetSpectatorModeMsg, CSetTargetBitrateMsg,
    CSetTargetFramerateMsg, CSetTitleMsg, CShowCursorMsg, CStartAudioDataMsg, CStartVideoDataMsg,
    CStopAudioDataMsg, CStopVideoDataMsg, CVideoEncoderInfoMsg, EStreamControlMessage as M,
    ProtoError,
};
use ihs_transport::{Frame, PacketType};
use tracing::debug;

use crate::error::Result;
use crate::event::ControlNotification;
use crate::link::Link;

/// デコード済みの制御メッセージ
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    ServerHandshake(CServerHandshakeMsg),
    AuthenticationResponse(CAuthenticationResponseMsg),
    NegotiationInit(CNegotiationInitMsg),
    NegotiationSetConfig(CNegotiationSetConfigMsg),
    NegotiationComplete,
    StartAudioData(CStartAudioDataMsg),
    StopAudioData,
    StartVideoData(CStartVideoDataMsg),
    StopVideoData,
    Notification(ControlNotification),
}

/// 登録表を引いた結果
#[derive(Debug, Clone, PartialEq)]
pub enum ControlDecode {
    Known(ControlMessage),
    Unrecognized(u8),
}

type Decoder = fn(&[u8]) -> core::result::Result<ControlMessage, ProtoError>;

fn notification(n: ControlNotification) -> ControlMessage {
    ControlMessage::Notification(n)
}

/// メッセージ種別 → デコーダー
static REGISTRY: &[(M, Decoder)] = &[
    (M::ServerHandshake, |b| decode_from_bytes(b).map(ControlMessage::ServerHandshake)),
    (M::AuthenticationResponse, |b| {
        decode_from_bytes(b).map(ControlMessage::AuthenticationResponse)
    }),
    (M::NegotiationInit, |b| decode_from_bytes(b).map(ControlMessage::NegotiationInit)),
    (M::NegotiationSetConfig, |b| {
        decode_from_bytes(b).map(ControlMessage::NegotiationSetConfig)
    }),
    (M::NegotiationComplete, |b| {
        decode_from_bytes::<CNegotiationCompleteMsg>(b).map(|_| ControlMessage::NegotiationComplete)
    }),
    (M::StartAudioData, |b| decode_from_bytes(b).map(ControlMessage::StartAudioData)),
    (M::StopAudioData, |b| {
        decode_from_bytes::<CStopAudioDataMsg>(b).map(|_| ControlMessage::StopAudioData)
    }),
    (M::StartVideoData, |b| decode_from_bytes(b).map(ControlMessage::StartVideoData)),
    (M::StopVideoData, |b| {
        decode_from_bytes::<CStopVideoDataMsg>(b).map(|_| ControlMessage::StopVideoData)
    }),
    (M::SetQos, |b| {
        decode_from_bytes(b).map(|m: CSetQoSMsg| notification(ControlNotification::SetQos(m)))
    }),
    (M::SetTargetBitrate, |b| {
        decode_from_bytes(b)
            .map(|m: CSetTargetBitrateMsg| notification(ControlNotification::SetTargetBitrate(m)))
    }),
    (M::SetTargetFramerate, |b| {
        decode_from_bytes(b).map(|m: CSetTargetFramerateMsg| {
            notification(ControlNotification::SetTargetFramerate(m))
        })
    }),
    (M::SetTitle, |b| {
        decode_from_bytes(b).map(|m: CSetTitleMsg| notification(ControlNotification::SetTitle(m)))
    }),
    (M::SetIcon, |b| {
        decode_from_bytes(b).map(|m: CSetIconMsg| notification(ControlNotification::SetIcon(m)))
    }),
    (M::ShowCursor, |b| {
        decode_from_bytes(b)
            .map(|m: CShowCursorMsg| notification(ControlNotification::ShowCursor(m)))
    }),
    (M::HideCursor, |b| {
        decode_from_bytes::<CHideCursorMsg>(b).map(|_| notification(ControlNotification::HideCursor))
    }),
    (M::SetCursor, |b| {
        decode_from_bytes(b).map(|m: CSetCursorMsg| notification(ControlNotification::SetCursor(m)))
    }),
    (M::GetCursorImage, |b| {
        decode_from_bytes(b)
            .map(|m: CGetCursorImageMsg| notification(ControlNotification::GetCursorImage(m)))
    }),
    (M::SetCursorImage, |b| {
        decode_from_bytes(b)
            .map(|m: CSetCursorImageMsg| notification(ControlNotification::SetCursorImage(m)))
    }),
    (M::DeleteCursor, |b| {
        decode_from_bytes(b)
            .map(|m: CDeleteCursorMsg| notification(ControlNotification::DeleteCursor(m)))
    }),
    (M::SetSpectatorMode, |b| {
        decode_from_bytes(b)
            .map(|m: CSetSpectatorModeMsg| notification(ControlNotification::SetSpectatorMode(m)))
    }),
    (M::SetKeymap, |b| {
        decode_from_bytes(b).map(|m: CSetKeymapMsg| notification(ControlNotification::SetKeymap(m)))
    }),
    (M::SetActivity, |b| {
        decode_from_bytes(b)
            .map(|m: CSetActivityMsg| notification(ControlNotification::SetActivity(m)))
    }),
    (M::SetCaptureSize, |b| {
        decode_from_bytes(b)
            .map(|m: CSetCaptureSizeMsg| notification(ControlNotification::SetCaptureSize(m)))
    }),
    (M::VideoEncoderInfo, |b| {
        decode_from_bytes(b)
            .map(|m: CVideoEncoderInfoMsg| notification(ControlNotification::VideoEncoderInfo(m)))
    }),
    (M::KeepAlive, |b| {
        decode_from_bytes::<CKeepAliveMsg>(b).map(|_| notification(ControlNotification::KeepAlive))
    }),
    (M::QuitRequest, |b| {
        decode_from_bytes::<CQuitRequest>(b).map(|_| notification(ControlNotification::QuitRequest))
    }),
];

/// 登録表から種別に対応するデコーダーを探す
fn lookup(msg_type: u8) -> Option<Decoder> {
    let kind = M::from_wire(msg_type)?;
    REGISTRY
        .iter()
        .find(|(registered, _)| *registered == kind)
        .map(|(_, decoder)| *decoder)
}

/// 平文のメッセージ本体をデコードする
///
/// # エラー
/// - `ProtoError::DecodeFailed`: 本体が宣言された型として解釈できない
pub fn decode_control(
    msg_type: u8,
    payload: &[u8],
) -> core::result::Result<ControlDecode, ProtoError> {
    match lookup(msg_type) {
        Some(decoder) => decoder(payload).map(ControlDecode::Known),
        None => Ok(ControlDecode::Unrecognized(msg_type)),
    }
}

/// 開封済みの制御フレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OpenedFrame {
    pub pkt_id: u16,
    pub msg_type: u8,
    pub payload: Vec<u8>,
}

/// 制御フレームから種別を取り出し、必要なら復号する
///
/// RELIABLE 以外や空のフレームは `Ok(None)`。
///
/// # エラー
/// 復号の失敗（完全性・シーケンス不一致）はセッション致命的なのでそのまま返す。
pub(crate) fn open_frame(frame: &Frame, link: &mut Link) -> Result<Option<OpenedFrame>> {
    if frame.pkt_type != PacketType::Reliable {
        debug!(pkt_id = frame.pkt_id(), "ignoring unreliable control frame");
        return Ok(None);
    }
    let Some((&msg_type, rest)) = frame.body.split_first() else {
        debug!(pkt_id = frame.pkt_id(), "empty control frame");
        return Ok(None);
    };

    let payload = if frame_should_encrypt(msg_type) {
        link.crypto.decrypt_message(rest)?
    } else {
        rest.to_vec()
    };

    Ok(Some(OpenedFrame {
        pkt_id: frame.pkt_id(),
        msg_type,
        payload,
    }))
}
