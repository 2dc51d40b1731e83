//! 送信パケットの組み立てとイベントの蓄積
//!
//! セッションはソケットを持たない。組み立てたデータグラムは送信キューに積み、
//! 所有者（`ihs-client`）が取り出して送る。

use std::collections::VecDeque;

use ihs_crypto::CryptoSession;
use ihs_transport::{Packet, PacketHeader, PacketType, Timestamp32, CRC_LEN, HEADER_LEN};
use tracing::trace;

use crate::error::Result;
use crate::event::SessionEvent;

/// 既定の MTU（ServerHandshake でヒントを受け取るまで）
pub const DEFAULT_MTU: usize = 1200;

/// 1 パケットの送信指示
#[derive(Debug, Clone)]
pub(crate) struct Outgoing {
    pub pkt_type: PacketType,
    pub has_crc: bool,
    pub channel: u8,
    pub pkt_id: u16,
    pub fragment_id: i16,
    pub body: Vec<u8>,
    pub pad_to: usize,
}

impl Outgoing {
    pub fn new(pkt_type: PacketType, has_crc: bool, channel: u8, pkt_id: u16, body: Vec<u8>) -> Self {
        Outgoing {
            pkt_type,
            has_crc,
            channel,
            pkt_id,
            fragment_id: 0,
            body,
            pad_to: 0,
        }
    }
}

/// チャンネル間で共有するセッションの送信側状態
pub(crate) struct Link {
    pub src_conn_id: u8,
    pub dst_conn_id: u8,
    pub crypto: CryptoSession,
    /// 現在処理中のパケットの時刻
    pub now: Timestamp32,
    pub mtu: usize,
    outbox: VecDeque<Vec<u8>>,
    events: VecDeque<SessionEvent>,
}

impl Link {
    pub fn new(src_conn_id: u8, crypto: CryptoSession) -> Self {
        Link {
            src_conn_id,
            dst_conn_id: 0,
            crypto,
            now: Timestamp32::default(),
            mtu: DEFAULT_MTU,
            outbox: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    /// ヘッダーを埋めて送信キューに積む
    pub fn send(&mut self, out: Outgoing) -> Result<()> {
        let mut header = PacketHeader::new(out.pkt_type, out.has_crc);
        header.src_conn_id = self.src_conn_id;
        header.dst_conn_id = self.dst_conn_id;
        header.channel = out.channel;
        header.fragment_id = out.fragment_id;
        header.pkt_id = out.pkt_id;
        header.send_timestamp = self.now.raw();

        let packet = Packet::new(header, out.body)?;
        let wire = packet.serialize(out.pad_to);
        trace!(
            channel = out.channel,
            pkt_id = out.pkt_id,
            kind = ?out.pkt_type,
            len = wire.len(),
            "queue packet"
        );
        self.outbox.push_back(wire);
        Ok(())
    }

    /// 1 パケットに載せられる本体の最大長
    pub fn max_body(&self) -> usize {
        self.mtu.saturating_sub(HEADER_LEN + CRC_LEN)
    }

    pub fn emit(&mut self, event: SessionEvent) {
        self.events.push_back(event);
    }

    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.outbox.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }
}
