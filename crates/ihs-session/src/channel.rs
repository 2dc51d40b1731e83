//! チャンネル
//!
//! 1 つの UDP ソケット上に多重化された論理チャンネル。各チャンネルは
//! 送信パケット ID の払い出しと ACK 待ちの管理、受信フレームの組み立てを持つ。
//!
//! チャンネルの種類は閉じた列挙 [`ChannelKind`] で表し、種類ごとの処理は
//! セッションが `match` で振り分ける。

use std::collections::BTreeSet;

use ihs_proto::{
    decode_from_bytes, decode_unconnected, encode_to_bytes, encode_unconnected,
    frame_should_encrypt, CDiscoveryPingRequest, CDiscoveryPingResponse, CStartAudioDataMsg,
    CStartVideoDataMsg, EStreamControlMessage, EStreamDiscoveryMessage,
};
use ihs_transport::{
    split_frame, AddOutcome, Frame, Packet, PacketType, Timestamp32, CRC_LEN, MAX_UDP_PAYLOAD,
};
use prost::Message;
use tracing::{debug, warn};

use crate::data::parse_data_frame;
use crate::error::{Result, SessionError};
use crate::event::SessionEvent;
use crate::link::{Link, Outgoing};

/// pong を埋める上限（UDP ペイロードの最大長から CRC トレーラー分を引いたもの）
pub const MAX_PONG_LEN: usize = MAX_UDP_PAYLOAD - CRC_LEN;

/// チャンネルの種類
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelKind {
    /// CONNECT / CONNECT_ACK / DISCONNECT を扱う仮想チャンネル（チャンネル 0 で送信する）
    Connection,
    Discovery,
    Control,
    /// 統計チャンネル。ACK/NACK の管理のみ
    Stats,
    Audio(CStartAudioDataMsg),
    Video(CStartVideoDataMsg),
}

impl ChannelKind {
    pub fn is_data(&self) -> bool {
        matches!(self, ChannelKind::Audio(_) | ChannelKind::Video(_))
    }
}

/// 全チャンネル共通の送受信管理
pub struct ChannelCore {
    id: u8,
    /// ACK 待ちのパケット ID
    sent_packets: BTreeSet<u16>,
    assembler: ihs_transport::FrameAssembler,
}

impl ChannelCore {
    pub fn new(id: u8) -> Self {
        ChannelCore {
            id,
            sent_packets: BTreeSet::new(),
            assembler: ihs_transport::FrameAssembler::new(),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// 使われていない最小のパケット ID を予約して返す
    ///
    /// # エラー
    /// - `SessionError::PacketIdsExhausted`: 65536 個すべてが ACK 待ち
    pub fn next_pkt_id(&mut self) -> Result<u16> {
        let mut candidate: u32 = 0;
        for &used in &self.sent_packets {
            if u32::from(used) != candidate {
                break;
            }
            candidate += 1;
        }
        let pkt_id = u16::try_from(candidate)
            .map_err(|_| SessionError::PacketIdsExhausted { channel: self.id })?;
        self.sent_packets.insert(pkt_id);
        Ok(pkt_id)
    }

    /// 指定した ID を ACK 待ちとして登録する
    pub fn reserve(&mut self, pkt_id: u16) {
        self.sent_packets.insert(pkt_id);
    }

    /// 送らなかったパケットの ID を戻す
    pub fn release(&mut self, pkt_id: u16) {
        self.sent_packets.remove(&pkt_id);
    }

    /// ACK を受けて ID を解放する。未知の ID なら `false`
    pub fn on_ack(&mut self, pkt_id: u16) -> bool {
        self.sent_packets.remove(&pkt_id)
    }

    /// NACK を受けて ID を解放する。未知の ID なら `false`
    pub fn on_nack(&mut self, pkt_id: u16) -> bool {
        self.sent_packets.remove(&pkt_id)
    }

    pub fn is_outstanding(&self, pkt_id: u16) -> bool {
        self.sent_packets.contains(&pkt_id)
    }

    pub fn in_flight(&self) -> usize {
        self.sent_packets.len()
    }
}

/// 論理チャンネル
pub struct Channel {
    core: ChannelCore,
    kind: ChannelKind,
}

impl Channel {
    pub fn new(id: u8, kind: ChannelKind) -> Self {
        Channel {
            core: ChannelCore::new(id),
            kind,
        }
    }

    pub fn id(&self) -> u8 {
        self.core.id
    }

    pub fn kind(&self) -> &ChannelKind {
        &self.kind
    }

    pub fn core(&self) -> &ChannelCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    /// ACK / NACK / フレームを運ぶパケットを処理し、完成したフレームを返す
    ///
    /// 信頼性ありの種別には、取り込めたもの（重複を含む）に ACK、拒否したものに NACK を返す。
    pub(crate) fn receive(&mut self, packet: &Packet, link: &mut Link) -> Result<Vec<Frame>> {
        let header = packet.header();
        match packet.pkt_type() {
            PacketType::Ack => {
                let echoed = receipt_timestamp(packet).map(|ts| ts.raw());
                if self.core.on_ack(header.pkt_id) {
                    debug!(channel = self.id(), pkt_id = header.pkt_id, ?echoed, "ACK");
                } else {
                    debug!(channel = self.id(), pkt_id = header.pkt_id, "ACK for unknown packet");
                }
                Ok(Vec::new())
            }
            PacketType::Nack => {
                if self.core.on_nack(header.pkt_id) {
                    warn!(channel = self.id(), pkt_id = header.pkt_id, "packet returned NACK");
                    link.emit(SessionEvent::PacketRejected {
                        channel: self.id(),
                        pkt_id: header.pkt_id,
                    });
                }
                Ok(Vec::new())
            }
            kind if kind.carries_frame() => {
                let outcome = self.core.assembler.add_packet(packet);
                if kind.is_reliable() {
                    let reply = match outcome {
                        AddOutcome::Accepted | AddOutcome::Duplicate => PacketType::Ack,
                        AddOutcome::Rejected(reason) => {
                            debug!(channel = self.id(), pkt_id = header.pkt_id, ?reason, "NACK");
                            PacketType::Nack
                        }
                    };
                    self.send_receipt(link, reply, header.pkt_id)?;
                }

                let mut frames = Vec::new();
                while let Some(frame) = self.core.assembler.poll_frame() {
                    frames.push(frame);
                }
                Ok(frames)
            }
            other => {
                debug!(channel = self.id(), kind = ?other, "ignoring packet kind on channel");
                Ok(Vec::new())
            }
        }
    }

    /// ACK / NACK を送る（本体はこちらの現在時刻）
    fn send_receipt(&mut self, link: &mut Link, kind: PacketType, pkt_id: u16) -> Result<()> {
        let body = link.now.to_le_bytes().to_vec();
        link.send(Outgoing::new(kind, true, self.id(), pkt_id, body))
    }

    /// 制御メッセージを RELIABLE で送る
    ///
    /// 制御チャンネルではハンドシェイク・認証以外の本体を暗号化する。
    ///
    /// # 引数
    /// - `reuse_pkt_id`: 指定すればその ID で送る（ネゴシエーションの返信で使う）
    ///
    /// # 戻り値
    /// 送信に使ったパケット ID（分割した場合は先頭パケットのもの）
    pub(crate) fn send_reliable<M: Message>(
        &mut self,
        link: &mut Link,
        msg_type: EStreamControlMessage,
        message: &M,
        reuse_pkt_id: Option<u16>,
    ) -> Result<u16> {
        let mut payload = encode_to_bytes(message);
        let type_byte = msg_type.wire_byte();
        let encrypt = self.kind == ChannelKind::Control && frame_should_encrypt(type_byte);
        if encrypt {
            payload = link.crypto.seal_message(&payload)?;
        }

        let mut body = Vec::with_capacity(1 + payload.len());
        body.push(type_byte);
        body.extend_from_slice(&payload);

        let parts = split_frame(PacketType::Reliable, &body, link.max_body())?;
        let pkt_ids = self.allocate_pkt_ids(parts.len(), reuse_pkt_id)?;
        // ID がすべて確保できてから暗号シーケンスを消費する
        if encrypt {
            link.crypto.commit_send();
        }

        let pkt_id = pkt_ids[0];
        for ((kind, fragment_id, chunk), id) in parts.into_iter().zip(pkt_ids) {
            let mut out = Outgoing::new(kind, true, self.id(), id, chunk);
            out.fragment_id = fragment_id;
            link.send(out)?;
        }
        debug!(channel = self.id(), pkt_id, ?msg_type, "sent reliable message");
        Ok(pkt_id)
    }

    /// フレームを構成するパケット数ぶんの ID を確保する
    ///
    /// `count` は 1 以上（`split_frame` は必ず 1 要素以上を返す）。
    /// 途中で尽きた場合は確保済みの分を解放してエラーを返す。
    fn allocate_pkt_ids(&mut self, count: usize, reuse_pkt_id: Option<u16>) -> Result<Vec<u16>> {
        let mut ids = Vec::with_capacity(count);
        let mut fresh = Vec::with_capacity(count);
        if let Some(id) = reuse_pkt_id {
            if !self.core.is_outstanding(id) {
                fresh.push(id);
            }
            self.core.reserve(id);
            ids.push(id);
        }
        while ids.len() < count {
            match self.core.next_pkt_id() {
                Ok(id) => {
                    fresh.push(id);
                    ids.push(id);
                }
                Err(e) => {
                    for id in fresh {
                        self.core.release(id);
                    }
                    return Err(e);
                }
            }
        }
        Ok(ids)
    }

    /// UNCONNECTED パケットで探索メッセージを送る
    pub(crate) fn send_unconnected<M: Message>(
        &mut self,
        link: &mut Link,
        msg_type: EStreamDiscoveryMessage,
        message: &M,
        pad_to: usize,
    ) -> Result<()> {
        let body = encode_unconnected(msg_type, message);
        let mut out = Outgoing::new(PacketType::Unconnected, true, self.id(), 0, body);
        out.pad_to = pad_to;
        link.send(out)
    }

    /// 探索チャンネル: ping リクエストに pong を返す
    pub(crate) fn handle_unconnected(&mut self, packet: &Packet, link: &mut Link) -> Result<()> {
        let (msg_type, proto) = match decode_unconnected(packet.body()) {
            Ok(parts) => parts,
            Err(e) => {
                debug!(error = %e, "dropping unconnected packet");
                return Ok(());
            }
        };
        if msg_type != EStreamDiscoveryMessage::PingRequest {
            debug!(?msg_type, "unrecognized unconnected message");
            return Ok(());
        }
        let request: CDiscoveryPingRequest = match decode_from_bytes(proto) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "failed to decode ping request");
                return Ok(());
            }
        };

        let requested = request.packet_size_requested() as usize;
        if requested > MAX_PONG_LEN {
            warn!(requested, max = MAX_PONG_LEN, "ping asks for an oversized pong, clamping");
        }

        let response = CDiscoveryPingResponse {
            sequence: request.sequence,
            packet_size_received: Some(packet.wire_len() as u32),
        };
        debug!(
            sequence = request.sequence(),
            requested = request.packet_size_requested(),
            "answering ping"
        );
        self.send_unconnected(
            link,
            EStreamDiscoveryMessage::PingResponse,
            &response,
            requested.min(MAX_PONG_LEN),
        )
    }

    /// データチャンネル: フレームを解析・復号して上位へ渡す
    ///
    /// 解析・復号に失敗したペイロードは捨てる（セッションは続く）。
    pub(crate) fn handle_data_frame(&self, frame: &Frame, link: &mut Link) {
        let Some(data) = parse_data_frame(frame) else {
            debug!(channel = self.id(), pkt_id = frame.pkt_id(), "ignoring data frame");
            return;
        };

        let payload = if data.header.sub.is_encrypted() {
            match link.crypto.decrypt_data(data.body) {
                Ok(plain) => plain,
                Err(e) => {
                    warn!(channel = self.id(), error = %e, "dropping undecryptable data payload");
                    return;
                }
            }
        } else {
            data.body.to_vec()
        };

        let channel = self.id();
        let header = data.header;
        match self.kind {
            ChannelKind::Audio(_) => link.emit(SessionEvent::AudioData {
                channel,
                header,
                payload,
            }),
            ChannelKind::Video(_) => link.emit(SessionEvent::VideoData {
                channel,
                header,
                payload,
            }),
            _ => {}
        }
    }
}

/// ACK / NACK 本体のタイムスタンプ（短すぎる場合は `None`）
pub fn receipt_timestamp(packet: &Packet) -> Option<Timestamp32> {
    Timestamp32::from_le_slice(packet.body())
}
