//! # ihs-proto
//!
//! In-Home Streaming の制御 / 探索メッセージ定義と
//! エンコード/デコードユーティリティ。
//!
//! ## フレームペイロード
//!
//! 制御チャンネルのフレームは先頭 1 バイトがメッセージ種別、残りが protobuf 本体：
//!
//! ```text
//! [message_type: u8][message_bytes...]
//! ```
//!
//! ハンドシェイク・認証以外の種別では `message_bytes` が暗号化されている
//! （[`frame_should_encrypt`]）。
//!
//! ## 探索チャンネル（UNCONNECTED）
//!
//! ```text
//! [message_type: u8][size: i32 LE][proto...]
//! ```

pub mod enums;
pub mod error;
pub mod messages;

pub use enums::*;
pub use error::ProtoError;
pub use messages::*;

use prost::Message;

/// メッセージをバイト列にエンコードする
pub fn encode_to_bytes<M: Message>(msg: &M) -> Vec<u8> {
    msg.encode_to_vec()
}

/// バイト列からメッセージをデコードする
///
/// # エラー
/// - `ProtoError::DecodeFailed`: protobuf デコード失敗
pub fn decode_from_bytes<M: Message + Default>(bytes: &[u8]) -> Result<M, ProtoError> {
    Ok(M::decode(bytes)?)
}

/// 制御フレームのペイロード `[message_type][message_bytes]` を組み立てる
pub fn control_frame(msg_type: EStreamControlMessage, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(msg_type.wire_byte());
    out.extend_from_slice(body);
    out
}

/// 探索メッセージを `[message_type][size: i32 LE][proto]` に包む
pub fn encode_unconnected<M: Message>(msg_type: EStreamDiscoveryMessage, msg: &M) -> Vec<u8> {
    let proto = msg.encode_to_vec();
    let mut out = Vec::with_capacity(5 + proto.len());
    out.push(msg_type as i32 as u8);
    // protobuf 本体が i32 を超えることはない
    out.extend_from_slice(&(proto.len() as i32).to_le_bytes());
    out.extend_from_slice(&proto);
    out
}

/// `[message_type][size][proto]` を分解する
///
/// 戻り値はメッセージ種別と protobuf 本体。`size` を超える末尾（パディング）は無視する。
///
/// # エラー
/// - `ProtoError::InvalidLength`: 長さが負、または本体より長い
/// - `ProtoError::UnknownEnumValue`: 未知のメッセージ種別
pub fn decode_unconnected(body: &[u8]) -> Result<(EStreamDiscoveryMessage, &[u8]), ProtoError> {
    if body.len() < 5 {
        return Err(ProtoError::InvalidLength(body.len() as i32));
    }
    let msg_type = EStreamDiscoveryMessage::try_from(i32::from(body[0])).map_err(|_| {
        ProtoError::UnknownEnumValue {
            kind: "EStreamDiscoveryMessage",
            value: i32::from(body[0]),
        }
    })?;
    let size = i32::from_le_bytes([body[1], body[2], body[3], body[4]]);
    if size < 0 || size as usize > body.len() - 5 {
        return Err(ProtoError::InvalidLength(size));
    }
    Ok((msg_type, &body[5..5 + size as usize]))
}

/// i32 の列挙値を型付きの値に変換する
pub fn enum_value<E>(kind: &'static str, value: i32) -> Result<E, ProtoError>
where
    E: TryFrom<i32>,
{
    E::try_from(value).map_err(|_| ProtoError::UnknownEnumValue { kind, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_request_roundtrip() {
        let msg = CAuthenticationRequestMsg {
            token: Some(vec![0xAA; 32]),
            version: Some(EStreamVersion::Current as i32),
            steamid: Some(76561197960265728),
        };
        let bytes = encode_to_bytes(&msg);
        let decoded: CAuthenticationRequestMsg = decode_from_bytes(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.version(), EStreamVersion::Current);
    }

    #[test]
    fn test_negotiation_init_unpacked_codecs() {
        let msg = CNegotiationInitMsg {
            reliable_data: Some(true),
            supported_audio_codecs: vec![EStreamAudioCodec::Opus as i32],
            supported_video_codecs: vec![
                EStreamVideoCodec::H264 as i32,
                EStreamVideoCodec::Vp9 as i32,
            ],
            supports_remote_hid: None,
            supports_touch_input: None,
        };
        let bytes = encode_to_bytes(&msg);
        // 非 packed: タグ 3 (varint) が 2 回現れる
        assert_eq!(bytes.iter().filter(|&&b| b == 0x18).count(), 2);
        let decoded: CNegotiationInitMsg = decode_from_bytes(&bytes).unwrap();
        assert_eq!(decoded.supported_video_codecs, vec![4, 3]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: Result<CServerHandshakeMsg, _> = decode_from_bytes(&[0x0A, 0xFF]);
        assert!(matches!(result, Err(ProtoError::DecodeFailed(_))));
    }

    #[test]
    fn test_control_frame_prefix() {
        let frame = control_frame(EStreamControlMessage::NegotiationComplete, &[]);
        assert_eq!(frame, vec![5]);
    }

    #[test]
    fn test_unconnected_roundtrip_with_padding() {
        let ping = CDiscoveryPingRequest {
            sequence: Some(9),
            packet_size_requested: Some(512),
        };
        let mut body = encode_unconnected(EStreamDiscoveryMessage::PingRequest, &ping);
        body.extend_from_slice(&[0xFE; 16]);

        let (msg_type, proto) = decode_unconnected(&body).unwrap();
        assert_eq!(msg_type, EStreamDiscoveryMessage::PingRequest);
        let decoded: CDiscoveryPingRequest = decode_from_bytes(proto).unwrap();
        assert_eq!(decoded, ping);
    }

    #[test]
    fn test_unconnected_bad_length() {
        let mut body = vec![1u8];
        body.extend_from_slice(&100i32.to_le_bytes());
        assert!(matches!(
            decode_unconnected(&body),
            Err(ProtoError::InvalidLength(100))
        ));
        assert!(matches!(
            decode_unconnected(&[1, 0]),
            Err(ProtoError::InvalidLength(2))
        ));
    }

    #[test]
    fn test_enum_value() {
        let codec: EStreamVideoCodec = enum_value("EStreamVideoCodec", 5).unwrap();
        assert_eq!(codec, EStreamVideoCodec::Hevc);
        let err = enum_value::<EStreamVideoCodec>("EStreamVideoCodec", 99);
        assert!(matches!(
            err,
            Err(ProtoError::UnknownEnumValue { value: 99, .. })
        ));
    }
}
