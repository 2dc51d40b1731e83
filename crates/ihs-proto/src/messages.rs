//! 制御チャンネル / 探索チャンネルのメッセージ定義
//!
//! 各構造体はホストが使う remoteplay スキーマ（proto2）のフィールド番号に合わせて
//! prost derive で直接定義している。ホストが送る未使用フィールドはデコード時に読み飛ばされる。

use crate::enums::{
    EStreamActivity, EStreamAudioCodec, EStreamDeviceFormFactor, EStreamVersion, EStreamVideoCodec,
};

// ==============================================================
// 探索チャンネル（UNCONNECTED）
// ==============================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct CDiscoveryPingRequest {
    #[prost(uint32, optional, tag = "1")]
    pub sequence: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub packet_size_requested: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CDiscoveryPingResponse {
    #[prost(uint32, optional, tag = "1")]
    pub sequence: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub packet_size_received: Option<u32>,
}

// ==============================================================
// ハンドシェイク / 認証
// ==============================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct CStreamingClientHandshakeInfo {
    #[prost(int32, optional, tag = "2")]
    pub network_test: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CClientHandshakeMsg {
    #[prost(message, optional, tag = "1")]
    pub info: Option<CStreamingClientHandshakeInfo>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CStreamingServerHandshakeInfo {
    #[prost(int32, optional, tag = "1")]
    pub mtu: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CServerHandshakeMsg {
    #[prost(message, optional, tag = "1")]
    pub info: Option<CStreamingServerHandshakeInfo>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CAuthenticationRequestMsg {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub token: Option<Vec<u8>>,
    #[prost(enumeration = "EStreamVersion", optional, tag = "2")]
    pub version: Option<i32>,
    #[prost(uint64, optional, tag = "3")]
    pub steamid: Option<u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CAuthenticationResponseMsg {
    /// 0 = 成功。それ以外は拒否
    #[prost(int32, optional, tag = "1")]
    pub result: Option<i32>,
    #[prost(enumeration = "EStreamVersion", optional, tag = "2")]
    pub version: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CKeepAliveMsg {}

// ==============================================================
// ネゴシエーション
// ==============================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct CStreamVideoMode {
    #[prost(uint32, optional, tag = "1")]
    pub width: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub height: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub refresh_rate: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub refresh_rate_numerator: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub refresh_rate_denominator: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CNegotiationInitMsg {
    #[prost(bool, optional, tag = "1")]
    pub reliable_data: Option<bool>,
    #[prost(enumeration = "EStreamAudioCodec", repeated, packed = "false", tag = "2")]
    pub supported_audio_codecs: Vec<i32>,
    #[prost(enumeration = "EStreamVideoCodec", repeated, packed = "false", tag = "3")]
    pub supported_video_codecs: Vec<i32>,
    #[prost(bool, optional, tag = "4")]
    pub supports_remote_hid: Option<bool>,
    #[prost(bool, optional, tag = "5")]
    pub supports_touch_input: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CNegotiatedConfig {
    #[prost(bool, optional, tag = "1")]
    pub reliable_data: Option<bool>,
    #[prost(enumeration = "EStreamAudioCodec", optional, tag = "2")]
    pub selected_audio_codec: Option<i32>,
    #[prost(enumeration = "EStreamVideoCodec", optional, tag = "3")]
    pub selected_video_codec: Option<i32>,
    #[prost(message, repeated, tag = "4")]
    pub available_video_modes: Vec<CStreamVideoMode>,
    #[prost(bool, optional, tag = "5")]
    pub enable_remote_hid: Option<bool>,
    #[prost(bool, optional, tag = "6")]
    pub enable_touch_input: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CStreamingClientCaps {
    #[prost(string, optional, tag = "1")]
    pub system_info: Option<String>,
    #[prost(bool, optional, tag = "2")]
    pub system_can_suspend: Option<bool>,
    #[prost(int32, optional, tag = "3")]
    pub maximum_decode_bitrate_kbps: Option<i32>,
    #[prost(int32, optional, tag = "4")]
    pub maximum_burst_bitrate_kbps: Option<i32>,
    #[prost(bool, optional, tag = "5")]
    pub supports_video_hevc: Option<bool>,
    #[prost(bool, optional, tag = "6")]
    pub disable_steam_store: Option<bool>,
    #[prost(bool, optional, tag = "7")]
    pub disable_client_cursor: Option<bool>,
    #[prost(enumeration = "EStreamDeviceFormFactor", optional, tag = "11")]
    pub form_factor: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CStreamingClientConfig {
    #[prost(int32, optional, tag = "1")]
    pub quality: Option<i32>,
    #[prost(uint32, optional, tag = "2")]
    pub maximum_resolution_x: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub maximum_resolution_y: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub maximum_framerate_numerator: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub maximum_framerate_denominator: Option<u32>,
    #[prost(int32, optional, tag = "6")]
    pub maximum_bitrate_kbps: Option<i32>,
    #[prost(bool, optional, tag = "7")]
    pub enable_hardware_decoding: Option<bool>,
    #[prost(bool, optional, tag = "8")]
    pub enable_performance_overlay: Option<bool>,
    #[prost(bool, optional, tag = "9")]
    pub enable_video_streaming: Option<bool>,
    #[prost(bool, optional, tag = "10")]
    pub enable_audio_streaming: Option<bool>,
    #[prost(bool, optional, tag = "11")]
    pub enable_input_streaming: Option<bool>,
    #[prost(int32, optional, tag = "12")]
    pub audio_channels: Option<i32>,
    #[prost(bool, optional, tag = "13")]
    pub enable_video_hevc: Option<bool>,
    #[prost(bool, optional, tag = "14")]
    pub enable_performance_icons: Option<bool>,
    #[prost(bool, optional, tag = "15")]
    pub enable_microphone_streaming: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CNegotiationSetConfigMsg {
    #[prost(message, optional, tag = "1")]
    pub config: Option<CNegotiatedConfig>,
    #[prost(message, optional, tag = "2")]
    pub streaming_client_config: Option<CStreamingClientConfig>,
    #[prost(message, optional, tag = "3")]
    pub streaming_client_caps: Option<CStreamingClientCaps>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CNegotiationCompleteMsg {}

// ==============================================================
// データチャンネルのライフサイクル
// ==============================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct CStartAudioDataMsg {
    #[prost(uint32, optional, tag = "2")]
    pub channel: Option<u32>,
    #[prost(enumeration = "EStreamAudioCodec", optional, tag = "3")]
    pub codec: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub codec_data: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "5")]
    pub frequency: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub channels: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CStopAudioDataMsg {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CStartVideoDataMsg {
    #[prost(uint32, optional, tag = "1")]
    pub channel: Option<u32>,
    #[prost(enumeration = "EStreamVideoCodec", optional, tag = "2")]
    pub codec: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub codec_data: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "4")]
    pub width: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub height: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CStopVideoDataMsg {}

// ==============================================================
// ストリーミング中の通知
// ==============================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct CSetQoSMsg {
    #[prost(bool, optional, tag = "1")]
    pub use_qos: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CSetTargetFramerateMsg {
    #[prost(uint32, optional, tag = "1")]
    pub framerate: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub reasons: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub framerate_numerator: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub framerate_denominator: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CSetTargetBitrateMsg {
    #[prost(int32, optional, tag = "1")]
    pub bitrate: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CSetTitleMsg {
    #[prost(string, optional, tag = "1")]
    pub text: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CSetIconMsg {
    #[prost(int32, optional, tag = "1")]
    pub width: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub height: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub image: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CShowCursorMsg {
    #[prost(float, optional, tag = "1")]
    pub x_normalized: Option<f32>,
    #[prost(float, optional, tag = "2")]
    pub y_normalized: Option<f32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CHideCursorMsg {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CSetCursorMsg {
    #[prost(uint64, optional, tag = "1")]
    pub cursor_id: Option<u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CGetCursorImageMsg {
    #[prost(uint64, optional, tag = "1")]
    pub cursor_id: Option<u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CSetCursorImageMsg {
    #[prost(uint64, optional, tag = "1")]
    pub cursor_id: Option<u64>,
    #[prost(int32, optional, tag = "2")]
    pub width: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub height: Option<i32>,
    #[prost(int32, optional, tag = "4")]
    pub hot_x: Option<i32>,
    #[prost(int32, optional, tag = "5")]
    pub hot_y: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub image: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CDeleteCursorMsg {
    #[prost(uint64, optional, tag = "1")]
    pub cursor_id: Option<u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CSetSpectatorModeMsg {
    #[prost(bool, optional, tag = "1")]
    pub enabled: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CKeymapEntry {
    #[prost(int32, optional, tag = "1")]
    pub scancode: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub normal_keycode: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub shift_keycode: Option<i32>,
    #[prost(int32, optional, tag = "4")]
    pub capslock_keycode: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CSetKeymapMsg {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<CKeymapEntry>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CSetActivityMsg {
    #[prost(enumeration = "EStreamActivity", optional, tag = "1")]
    pub activity: Option<i32>,
    #[prost(uint32, optional, tag = "2")]
    pub appid: Option<u32>,
    #[prost(uint64, optional, tag = "3")]
    pub gameid: Option<u64>,
    #[prost(string, optional, tag = "4")]
    pub game_name: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CSetCaptureSizeMsg {
    #[prost(int32, optional, tag = "1")]
    pub width: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub height: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CVideoEncoderInfoMsg {
    #[prost(string, optional, tag = "1")]
    pub info: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CQuitRequest {}
