//! ストリーミングプロトコルの列挙型
//!
//! 値はホストが使う remoteplay スキーマの番号に合わせる。

/// チャンネル番号（3 以降はデータチャンネルとして動的に割り当てられる）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EStreamChannel {
    Discovery = 0,
    Control = 1,
    Stats = 2,
    DataChannelStart = 3,
}

/// UNCONNECTED パケットで運ばれるメッセージ種別
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EStreamDiscoveryMessage {
    PingRequest = 1,
    PingResponse = 2,
}

/// 制御チャンネルのメッセージ種別（フレーム先頭 1 バイト）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EStreamControlMessage {
    AuthenticationRequest = 1,
    AuthenticationResponse = 2,
    NegotiationInit = 3,
    NegotiationSetConfig = 4,
    NegotiationComplete = 5,
    ClientHandshake = 6,
    ServerHandshake = 7,
    StartNetworkTest = 8,
    KeepAlive = 9,
    StartAudioData = 50,
    StopAudioData = 51,
    StartVideoData = 52,
    StopVideoData = 53,
    ShowCursor = 63,
    HideCursor = 64,
    SetCursor = 65,
    GetCursorImage = 66,
    SetCursorImage = 67,
    DeleteCursor = 68,
    SetTargetFramerate = 69,
    SetTitle = 81,
    SetIcon = 82,
    QuitRequest = 83,
    SetQos = 87,
    VideoEncoderInfo = 90,
    SetTargetBitrate = 94,
    SetActivity = 98,
    SetSpectatorMode = 105,
    SetCaptureSize = 120,
    SetKeymap = 128,
}

/// データチャンネルのペイロード種別
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EStreamDataMessage {
    DataPacket = 1,
    DataLost = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EStreamAudioCodec {
    None = 0,
    Raw = 1,
    Vorbis = 2,
    Opus = 3,
    Mp3 = 4,
    Aac = 5,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EStreamVideoCodec {
    None = 0,
    Raw = 1,
    Vp8 = 2,
    Vp9 = 3,
    H264 = 4,
    Hevc = 5,
    Orbx1 = 6,
    Orbx2 = 7,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EStreamVersion {
    None = 0,
    Current = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EStreamDeviceFormFactor {
    Unknown = 0,
    Phone = 1,
    Tablet = 2,
    Computer = 3,
    Tv = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EStreamActivity {
    Idle = 1,
    Game = 2,
    Desktop = 3,
    SecureDesktop = 4,
    Music = 5,
}

impl EStreamControlMessage {
    /// ワイヤ上の 1 バイト表現から変換する
    pub fn from_wire(byte: u8) -> Option<Self> {
        Self::try_from(i32::from(byte)).ok()
    }

    /// ワイヤ上の 1 バイト表現
    pub fn wire_byte(self) -> u8 {
        // 定義済みの値はすべて 0..=255 に収まる
        self as i32 as u8
    }

    /// 鍵交換前に平文で送るメッセージか
    pub fn is_handshake(self) -> bool {
        matches!(
            self,
            EStreamControlMessage::ClientHandshake
                | EStreamControlMessage::ServerHandshake
                | EStreamControlMessage::AuthenticationRequest
                | EStreamControlMessage::AuthenticationResponse
        )
    }
}

/// 制御メッセージ本体を暗号化するか
///
/// 未知のメッセージ種別も暗号化されているものとして扱う。
pub fn frame_should_encrypt(msg_type: u8) -> bool {
    EStreamControlMessage::from_wire(msg_type).map_or(true, |t| !t.is_handshake())
}
