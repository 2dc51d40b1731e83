//! コーデックのネゴシエーション
//!
//! ホストが提示したコーデックとローカルで扱えるもの（音声 Opus、映像 H.264 / HEVC）の
//! 積集合から選び、クライアントの能力・設定と一緒に返信する。

use ihs_proto::{
    CNegotiatedConfig, CNegotiationInitMsg, CNegotiationSetConfigMsg, CStreamVideoMode,
    CStreamingClientCaps, CStreamingClientConfig, EStreamAudioCodec, EStreamDeviceFormFactor,
    EStreamVideoCodec,
};

/// ローカルで扱える音声コーデック
pub const SUPPORTED_AUDIO_CODECS: &[EStreamAudioCodec] = &[EStreamAudioCodec::Opus];
/// ローカルで扱える映像コーデック
pub const SUPPORTED_VIDEO_CODECS: &[EStreamVideoCodec] =
    &[EStreamVideoCodec::H264, EStreamVideoCodec::Hevc];

/// ホストへ提示する映像モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMode {
    pub width: u32,
    pub height: u32,
    pub refresh_rate_numerator: u32,
    pub refresh_rate_denominator: u32,
}

impl Default for VideoMode {
    fn default() -> Self {
        VideoMode {
            width: 1920,
            height: 1080,
            refresh_rate_numerator: 5994,
            refresh_rate_denominator: 100,
        }
    }
}

/// ネゴシエーションでこちらが主張する値
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPreferences {
    pub video_mode: VideoMode,
    pub max_decode_bitrate_kbps: i32,
    pub max_burst_bitrate_kbps: i32,
}

impl Default for StreamPreferences {
    fn default() -> Self {
        StreamPreferences {
            video_mode: VideoMode::default(),
            max_decode_bitrate_kbps: 30_000,
            max_burst_bitrate_kbps: 90_000,
        }
    }
}

/// ネゴシエーション結果
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatedConfig {
    pub reliable_data: Option<bool>,
    /// 積集合が空なら `None`
    pub audio_codec: Option<EStreamAudioCodec>,
    pub video_codec: Option<EStreamVideoCodec>,
    pub video_modes: Vec<VideoMode>,
    pub enable_remote_hid: bool,
    pub enable_touch_input: bool,
    pub client_config: CStreamingClientConfig,
    pub client_caps: CStreamingClientCaps,
}

impl NegotiatedConfig {
    /// ホストの提示から構築する
    pub fn from_offer(offer: &CNegotiationInitMsg, prefs: &StreamPreferences) -> Self {
        NegotiatedConfig {
            reliable_data: offer.reliable_data,
            audio_codec: select_codec(&offer.supported_audio_codecs, SUPPORTED_AUDIO_CODECS),
            video_codec: select_codec(&offer.supported_video_codecs, SUPPORTED_VIDEO_CODECS),
            video_modes: vec![prefs.video_mode],
            enable_remote_hid: true,
            enable_touch_input: true,
            client_config: client_config(),
            client_caps: client_caps(prefs),
        }
    }

    /// NegotiationSetConfig メッセージに変換する
    pub fn to_message(&self) -> CNegotiationSetConfigMsg {
        let config = CNegotiatedConfig {
            reliable_data: self.reliable_data,
            selected_audio_codec: self.audio_codec.map(|c| c as i32),
            selected_video_codec: self.video_codec.map(|c| c as i32),
            available_video_modes: self
                .video_modes
                .iter()
                .map(|mode| CStreamVideoMode {
                    width: Some(mode.width),
                    height: Some(mode.height),
                    refresh_rate: None,
                    refresh_rate_numerator: Some(mode.refresh_rate_numerator),
                    refresh_rate_denominator: Some(mode.refresh_rate_denominator),
                })
                .collect(),
            enable_remote_hid: Some(self.enable_remote_hid),
            enable_touch_input: Some(self.enable_touch_input),
        };
        CNegotiationSetConfigMsg {
            config: Some(config),
            streaming_client_config: Some(self.client_config.clone()),
            streaming_client_caps: Some(self.client_caps.clone()),
        }
    }
}

/// 提示されたコーデック列から、ローカルで扱えるものを選ぶ
///
/// 複数一致した場合はホストの提示順で最後のものを採る。
pub fn select_codec<C>(offered: &[i32], supported: &[C]) -> Option<C>
where
    C: Copy + Into<i32>,
{
    offered
        .iter()
        .filter_map(|&value| supported.iter().copied().find(|c| (*c).into() == value))
        .last()
}

fn client_config() -> CStreamingClientConfig {
    CStreamingClientConfig {
        maximum_resolution_x: Some(0),
        maximum_resolution_y: Some(0),
        enable_hardware_decoding: Some(true),
        enable_performance_overlay: Some(true),
        enable_audio_streaming: Some(true),
        enable_performance_icons: Some(true),
        enable_microphone_streaming: Some(true),
        ..Default::default()
    }
}

fn client_caps(prefs: &StreamPreferences) -> CStreamingClientCaps {
    CStreamingClientCaps {
        system_can_suspend: Some(true),
        maximum_decode_bitrate_kbps: Some(prefs.max_decode_bitrate_kbps),
        maximum_burst_bitrate_kbps: Some(prefs.max_burst_bitrate_kbps),
        form_factor: Some(EStreamDeviceFormFactor::Tv as i32),
        ..Default::default()
    }
}
