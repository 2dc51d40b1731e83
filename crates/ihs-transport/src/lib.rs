//! # ihs-transport
//!
//! UDP トランスポート層の実装。
//!
//! パケットのエンコード/デコード（CRC32C 検証付き）、フレームの分割と再組み立て、
//! 重複パケットの抑制、ワイヤタイムスタンプを担当する。暗号化は扱わない。
//!
//! ## パケットの Wire Format
//!
//! ```text
//! [type_and_crc: u8][retransmit_count: u8][src_conn_id: u8][dst_conn_id: u8]
//! [channel: u8][fragment_id: i16][pkt_id: u16][send_timestamp: u32]
//! [body...][crc32c: u32?]
//!
//! type_and_crc:
//!   bit 7    = CRC トレーラーの有無
//!   bit 0..6 = パケット種別（0 UNCONNECTED 〜 9 DISCONNECT）
//! ```

pub mod error;
pub mod frame;
pub mod packet;
pub mod timestamp;

pub use error::{Result, TransportError};
pub use frame::{split_frame, AddOutcome, Frame, FrameAssembler, RejectReason, DUPLICATE_WINDOW};
pub use packet::{
    Packet, PacketHeader, PacketType, CRC_FLAG, CRC_LEN, HEADER_LEN, MAX_UDP_PAYLOAD, PAD_BYTE,
};
pub use timestamp::{Timestamp32, WireClock};
