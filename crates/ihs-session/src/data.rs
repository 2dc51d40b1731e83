//! データチャンネル（音声・映像）のペイロード解析
//!
//! ## ペイロードの構造
//! ```text
//! [payload_type: u8]
//! [timing: 12 bytes]              残りが 12 バイトを超える場合のみ
//!   [id: u16][timestamp: u32][input_mark: u16][input_recv_timestamp: u32]
//! [sequence: u16][flags: u8][reserved1: u16][reserved2: u16]
//! [codec payload...]              flags & 0x20 ならセッション鍵・全ゼロ IV で暗号化
//! ```

use ihs_proto::EStreamDataMessage;
use ihs_transport::{Frame, PacketType};

/// タイミングヘッダー長
pub const TIMING_HEADER_LEN: usize = 12;
/// サブヘッダー長
pub const SUB_HEADER_LEN: usize = 7;
/// 暗号化フラグ
pub const FLAG_ENCRYPTED: u8 = 0x20;

/// フレーム単位のタイミング情報
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingHeader {
    pub id: u16,
    pub timestamp: u32,
    pub input_mark: u16,
    pub input_recv_timestamp: u32,
}

impl TimingHeader {
    fn parse(bytes: &[u8; TIMING_HEADER_LEN]) -> Self {
        TimingHeader {
            id: u16::from_le_bytes([bytes[0], bytes[1]]),
            timestamp: u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
            input_mark: u16::from_le_bytes([bytes[6], bytes[7]]),
            input_recv_timestamp: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }
}

/// ペイロードごとのサブヘッダー
///
/// reserved1 / reserved2 は意味不明だが、そのまま保持する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubHeader {
    pub sequence: u16,
    pub flags: u8,
    pub reserved1: u16,
    pub reserved2: u16,
}

impl SubHeader {
    fn parse(bytes: &[u8; SUB_HEADER_LEN]) -> Self {
        SubHeader {
            sequence: u16::from_le_bytes([bytes[0], bytes[1]]),
            flags: bytes[2],
            reserved1: u16::from_le_bytes([bytes[3], bytes[4]]),
            reserved2: u16::from_le_bytes([bytes[5], bytes[6]]),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }
}

/// データペイロードのヘッダー一式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub timing: Option<TimingHeader>,
    pub sub: SubHeader,
}

/// 解析済みのデータペイロード（codec payload はまだ暗号化されている場合がある）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPayload<'a> {
    pub header: DataHeader,
    pub body: &'a [u8],
}

/// データチャンネルのフレームを解析する
///
/// UNRELIABLE 以外・DataPacket 以外・サブヘッダーに満たないものは `None`。
pub fn parse_data_frame(frame: &Frame) -> Option<DataPayload<'_>> {
    if frame.pkt_type != PacketType::Unreliable {
        return None;
    }
    parse_data_payload(&frame.body)
}

/// `[payload_type][timing?][sub-header][body]` を分解する
pub fn parse_data_payload(bytes: &[u8]) -> Option<DataPayload<'_>> {
    let (&payload_type, mut rest) = bytes.split_first()?;
    if i32::from(payload_type) != EStreamDataMessage::DataPacket as i32 {
        return None;
    }

    let mut timing = None;
    if rest.len() > TIMING_HEADER_LEN {
        let (head, tail) = rest.split_at(TIMING_HEADER_LEN);
        timing = head.try_into().ok().map(TimingHeader::parse);
        rest = tail;
    }

    if rest.len() < SUB_HEADER_LEN {
        return None;
    }
    let (head, body) = rest.split_at(SUB_HEADER_LEN);
    let sub = SubHeader::parse(head.try_into().ok()?);

    Some(DataPayload {
        header: DataHeader { timing, sub },
        body,
    })
}
