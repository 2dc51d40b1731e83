//! UDP パケット構造
//!
//! ## Wire Format
//! ```text
//! [type_and_crc: u8][retransmit_count: u8][src_conn_id: u8][dst_conn_id: u8]
//! [channel: u8][fragment_id: i16 LE][pkt_id: u16 LE][send_timestamp: u32 LE]
//! [body...][padding 0xFE...][crc32c: u32 LE (type_and_crc bit 7 が立っている場合のみ)]
//! ```
//!
//! CRC32C はヘッダー・本体・パディングすべてを対象にする。

use crate::error::{Result, TransportError};

/// ヘッダー長
pub const HEADER_LEN: usize = 13;
/// CRC トレーラー長
pub const CRC_LEN: usize = 4;
/// type_and_crc の CRC フラグ
pub const CRC_FLAG: u8 = 0x80;
/// パディングに使うバイト
pub const PAD_BYTE: u8 = 0xFE;
/// IPv4 上の UDP で送れるペイロードの最大長
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// パケット種別（type_and_crc の下位 7 ビット）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Unconnected = 0,
    Connect = 1,
    ConnectAck = 2,
    Unreliable = 3,
    UnreliableFrag = 4,
    Reliable = 5,
    ReliableFrag = 6,
    Ack = 7,
    Nack = 8,
    Disconnect = 9,
}

impl PacketType {
    /// ACK/NACK の対象となる種別か
    pub fn is_reliable(self) -> bool {
        matches!(self, PacketType::Reliable | PacketType::ReliableFrag)
    }

    /// 後続フラグメントの種別か
    pub fn is_fragment(self) -> bool {
        matches!(self, PacketType::UnreliableFrag | PacketType::ReliableFrag)
    }

    /// フレームを運ぶ種別か（フレーム組み立ての対象）
    pub fn carries_frame(self) -> bool {
        matches!(
            self,
            PacketType::Unreliable
                | PacketType::UnreliableFrag
                | PacketType::Reliable
                | PacketType::ReliableFrag
        )
    }

    /// このフレーム種別に続くフラグメントの種別
    pub fn fragment_kind(self) -> Option<PacketType> {
        match self {
            PacketType::Reliable => Some(PacketType::ReliableFrag),
            PacketType::Unreliable => Some(PacketType::UnreliableFrag),
            _ => None,
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = TransportError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => PacketType::Unconnected,
            1 => PacketType::Connect,
            2 => PacketType::ConnectAck,
            3 => PacketType::Unreliable,
            4 => PacketType::UnreliableFrag,
            5 => PacketType::Reliable,
            6 => PacketType::ReliableFrag,
            7 => PacketType::Ack,
            8 => PacketType::Nack,
            9 => PacketType::Disconnect,
            other => return Err(TransportError::UnknownPacketType(other)),
        })
    }
}

/// パケットヘッダー（13 バイト、リトルエンディアン）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    pub type_and_crc: u8,
    pub retransmit_count: u8,
    pub src_conn_id: u8,
    pub dst_conn_id: u8,
    pub channel: u8,
    pub fragment_id: i16,
    pub pkt_id: u16,
    pub send_timestamp: u32,
}

impl PacketHeader {
    /// 種別と CRC フラグを指定してヘッダーを作る（他フィールドは 0）
    pub fn new(pkt_type: PacketType, has_crc: bool) -> Self {
        let mut header = PacketHeader::default();
        header.set_pkt_type(pkt_type);
        header.set_has_crc(has_crc);
        header
    }

    /// パケット種別
    ///
    /// # エラー
    /// - `TransportError::UnknownPacketType`: 下位 7 ビットが未定義の値
    pub fn pkt_type(&self) -> Result<PacketType> {
        PacketType::try_from(self.type_and_crc & !CRC_FLAG)
    }

    pub fn set_pkt_type(&mut self, pkt_type: PacketType) {
        self.type_and_crc = (self.type_and_crc & CRC_FLAG) | (pkt_type as u8 & !CRC_FLAG);
    }

    /// CRC トレーラーが付くか
    pub fn has_crc(&self) -> bool {
        self.type_and_crc & CRC_FLAG != 0
    }

    pub fn set_has_crc(&mut self, has_crc: bool) {
        self.type_and_crc = (self.type_and_crc & !CRC_FLAG) | if has_crc { CRC_FLAG } else { 0 };
    }

    /// ヘッダーを Wire Format に変換する
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.type_and_crc;
        out[1] = self.retransmit_count;
        out[2] = self.src_conn_id;
        out[3] = self.dst_conn_id;
        out[4] = self.channel;
        out[5..7].copy_from_slice(&self.fragment_id.to_le_bytes());
        out[7..9].copy_from_slice(&self.pkt_id.to_le_bytes());
        out[9..13].copy_from_slice(&self.send_timestamp.to_le_bytes());
        out
    }

    /// 先頭 13 バイトからヘッダーを復元する
    ///
    /// # エラー
    /// - `TransportError::TooShort`: 13 バイト未満
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(TransportError::TooShort(bytes.len()));
        }
        Ok(PacketHeader {
            type_and_crc: bytes[0],
            retransmit_count: bytes[1],
            src_conn_id: bytes[2],
            dst_conn_id: bytes[3],
            channel: bytes[4],
            fragment_id: i16::from_le_bytes([bytes[5], bytes[6]]),
            pkt_id: u16::from_le_bytes([bytes[7], bytes[8]]),
            send_timestamp: u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]),
        })
    }
}

/// 受信・送信するパケット
///
/// 構築後は変更しない。種別は構築時に検証済み。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: PacketHeader,
    pkt_type: PacketType,
    body: Vec<u8>,
    /// CRC フラグ付きパケットの検証結果（フラグなしなら `None`）
    crc_ok: Option<bool>,
    /// 受信時のデータグラム長（送信用に組み立てたパケットでは 0）
    wire_len: usize,
}

impl Packet {
    /// 送信用パケットを構築する
    ///
    /// # エラー
    /// - `TransportError::UnknownPacketType`: ヘッダーの種別が未定義
    pub fn new(header: PacketHeader, body: Vec<u8>) -> Result<Self> {
        let pkt_type = header.pkt_type()?;
        Ok(Packet {
            header,
            pkt_type,
            body,
            crc_ok: None,
            wire_len: 0,
        })
    }

    /// 受信したデータグラムをパースする
    ///
    /// CRC 不一致はエラーにせず `crc_ok = Some(false)` で返す（破棄は呼び出し側）。
    ///
    /// # エラー
    /// - `TransportError::TooShort`: 13 バイト未満
    /// - `TransportError::UnknownPacketType`: 未定義の種別
    /// - `TransportError::MissingCrc`: CRC フラグ付きでトレーラーが 4 バイト未満
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let header = PacketHeader::from_bytes(bytes)?;
        let pkt_type = header.pkt_type()?;

        let (body, crc_ok) = if header.has_crc() {
            if bytes.len() < HEADER_LEN + CRC_LEN {
                return Err(TransportError::MissingCrc);
            }
            let split = bytes.len() - CRC_LEN;
            let expected = u32::from_le_bytes([
                bytes[split],
                bytes[split + 1],
                bytes[split + 2],
                bytes[split + 3],
            ]);
            let ok = crc32c::crc32c(&bytes[..split]) == expected;
            (&bytes[HEADER_LEN..split], Some(ok))
        } else {
            (&bytes[HEADER_LEN..], None)
        };

        Ok(Packet {
            header,
            pkt_type,
            body: body.to_vec(),
            crc_ok,
            wire_len: bytes.len(),
        })
    }

    /// Wire Format に変換する
    ///
    /// # 引数
    /// - `pad_to`: 0 より大きければ、ヘッダー + 本体が `pad_to` バイトになるまで `0xFE` で埋める
    pub fn serialize(&self, pad_to: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(HEADER_LEN + self.body.len().max(pad_to) + CRC_LEN);
        data.extend_from_slice(&self.header.to_bytes());
        data.extend_from_slice(&self.body);
        if data.len() < pad_to {
            data.resize(pad_to, PAD_BYTE);
        }
        if self.header.has_crc() {
            let crc = crc32c::crc32c(&data);
            data.extend_from_slice(&crc.to_le_bytes());
        }
        data
    }

    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    pub fn pkt_type(&self) -> PacketType {
        self.pkt_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn crc_ok(&self) -> Option<bool> {
        self.crc_ok
    }

    pub fn wire_len(&self) -> usize {
        self.wire_len
    }

    /// CRC 不一致で破棄すべきか
    pub fn is_corrupt(&self) -> bool {
        self.crc_ok == Some(false)
    }

    /// 本体を取り出す
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_header() -> PacketHeader {
        let mut header = PacketHeader::new(PacketType::Reliable, true);
        header.src_conn_id = 7;
        header.dst_conn_id = 42;
        header.channel = 1;
        header.fragment_id = -2;
        header.pkt_id = 0x1234;
        header.send_timestamp = 0xDEADBEEF;
        header
    }

    #[test]
    fn test_header_layout() {
        let bytes = sample_header().to_bytes();
        assert_eq!(hex::encode(bytes), "8500072a01feff3412efbeadde");
    }

    #[test]
    fn test_type_and_crc_bits() {
        let mut header = PacketHeader::new(PacketType::Connect, false);
        assert_eq!(header.type_and_crc, 1);
        header.set_has_crc(true);
        assert_eq!(header.type_and_crc, 0x81);
        header.set_pkt_type(PacketType::Disconnect);
        assert_eq!(header.type_and_crc, 0x89);
        assert_eq!(header.pkt_type(), Ok(PacketType::Disconnect));
    }

    #[test]
    fn test_serialize_parse_with_crc() {
        let packet = Packet::new(sample_header(), b"hello".to_vec()).unwrap();
        let wire = packet.serialize(0);
        assert_eq!(wire.len(), HEADER_LEN + 5 + CRC_LEN);

        let parsed = Packet::parse(&wire).unwrap();
        assert_eq!(parsed.header(), packet.header());
        assert_eq!(parsed.body(), b"hello");
        assert_eq!(parsed.crc_ok(), Some(true));
        assert_eq!(parsed.wire_len(), wire.len());
    }

    #[test]
    fn test_without_crc() {
        let packet = Packet::new(PacketHeader::new(PacketType::Connect, false), vec![1, 2]).unwrap();
        let wire = packet.serialize(0);
        assert_eq!(wire.len(), HEADER_LEN + 2);
        let parsed = Packet::parse(&wire).unwrap();
        assert_eq!(parsed.crc_ok(), None);
        assert_eq!(parsed.body(), &[1, 2]);
    }

    #[test]
    fn test_padding() {
        let packet = Packet::new(PacketHeader::new(PacketType::Unconnected, true), vec![1]).unwrap();
        let wire = packet.serialize(64);
        assert_eq!(wire.len(), 64 + CRC_LEN);
        assert!(wire[HEADER_LEN + 1..64].iter().all(|&b| b == PAD_BYTE));
        assert_eq!(Packet::parse(&wire).unwrap().crc_ok(), Some(true));
    }

    #[test]
    fn test_parse_too_short() {
        assert_eq!(Packet::parse(&[0u8; 12]), Err(TransportError::TooShort(12)));
    }

    #[test]
    fn test_parse_unknown_type() {
        let mut wire = [0u8; HEADER_LEN];
        wire[0] = 0x0A;
        assert_eq!(Packet::parse(&wire), Err(TransportError::UnknownPacketType(10)));
    }

    #[test]
    fn test_parse_crc_flag_without_trailer() {
        let mut wire = [0u8; HEADER_LEN + 2];
        wire[0] = CRC_FLAG | PacketType::Ack as u8;
        assert_eq!(Packet::parse(&wire), Err(TransportError::MissingCrc));
    }

    proptest! {
        #[test]
        fn prop_crc_detects_single_bit_flip(
            body in prop::collection::vec(any::<u8>(), 0..256),
            bit in any::<prop::sample::Index>(),
        ) {
            let packet = Packet::new(sample_header(), body).unwrap();
            let mut wire = packet.serialize(0);
            // 先頭バイト（種別 / CRC フラグ）以外を反転させる
            let bit_index = 8 + bit.index((wire.len() - 1) * 8);
            wire[bit_index / 8] ^= 1 << (bit_index % 8);
            let parsed = Packet::parse(&wire).unwrap();
            prop_assert_eq!(parsed.crc_ok(), Some(false));
        }

        #[test]
        fn prop_roundtrip_body(
            body in prop::collection::vec(any::<u8>(), 0..256),
            pkt_id in any::<u16>(),
        ) {
            let mut header = PacketHeader::new(PacketType::Unreliable, true);
            header.pkt_id = pkt_id;
            let packet = Packet::new(header, body.clone()).unwrap();
            let parsed = Packet::parse(&packet.serialize(0)).unwrap();
            prop_assert_eq!(parsed.body(), body.as_slice());
            prop_assert_eq!(parsed.crc_ok(), Some(true));
        }
    }
}
