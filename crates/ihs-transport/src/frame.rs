//! フレームの分割と再組み立て
//!
//! ## フラグメントの並び
//! ```text
//! [RELIABLE   fragment_id = N][RELIABLE_FRAG fragment_id = 1]...[RELIABLE_FRAG fragment_id = N-1]
//! ```
//!
//! 先頭パケット（RELIABLE / UNRELIABLE）の `fragment_id` は先頭を含む総パケット数 N。
//! N ≤ 1 なら単独パケットのフレーム。後続は対応する *_FRAG 種別で 1 から順に番号が振られる。

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::packet::{Packet, PacketHeader, PacketType};
use crate::timestamp::Timestamp32;

/// 重複判定のウィンドウ（タイムスタンプ単位）
pub const DUPLICATE_WINDOW: u32 = 10_000;

/// 1 つ以上のパケットから組み立てた論理メッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 先頭パケットのヘッダー
    pub header: PacketHeader,
    /// 先頭パケットの種別（RELIABLE / UNRELIABLE）
    pub pkt_type: PacketType,
    /// 連結した本体
    pub body: Vec<u8>,
    pub completed: bool,
    /// 受け取ったパケット数（先頭を含む）
    pub frag_count: u16,
    total: u16,
}

impl Frame {
    fn start(packet: &Packet, total: u16) -> Self {
        Frame {
            header: *packet.header(),
            pkt_type: packet.pkt_type(),
            body: packet.body().to_vec(),
            completed: total <= 1,
            frag_count: 1,
            total: total.max(1),
        }
    }

    /// 先頭パケットで宣言された総パケット数
    pub fn total(&self) -> u16 {
        self.total
    }

    pub fn is_reliable(&self) -> bool {
        self.pkt_type.is_reliable()
    }

    /// フレームの識別に使うパケット ID（先頭パケットのもの）
    pub fn pkt_id(&self) -> u16 {
        self.header.pkt_id
    }
}

/// パケットを拒否した理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// フレーム組み立て中に新しいフレームの先頭が届いた
    Interleaved,
    /// 先頭パケットなしでフラグメントが届いた
    NoFrameInProgress,
    /// 組み立て中フレームと信頼性種別が一致しない
    ReliabilityMismatch,
    /// フラグメント番号が期待値と異なる
    OutOfOrder { expected: i16, actual: i16 },
    /// フレームを運ばない種別
    NotAFrame(PacketType),
}

/// [`FrameAssembler::add_packet`] の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// フレームに取り込んだ（または完成させた）
    Accepted,
    /// 重複判定ウィンドウ内で既に受信済み
    Duplicate,
    Rejected(RejectReason),
}

impl AddOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AddOutcome::Accepted)
    }
}

/// チャンネルごとのフレーム組み立て器
///
/// 組み立て中のフレームは高々 1 つ。完成したフレームは FIFO で取り出す。
pub struct FrameAssembler {
    /// (type_and_crc, pkt_id) → 最後に見た send_timestamp
    seen: HashMap<(u8, u16), Timestamp32>,
    /// 最後に `seen` を掃除した時刻
    last_prune: Option<Timestamp32>,
    in_progress: Option<Frame>,
    completed: VecDeque<Frame>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        FrameAssembler {
            seen: HashMap::new(),
            last_prune: None,
            in_progress: None,
            completed: VecDeque::new(),
        }
    }

    /// パケットを取り込む
    ///
    /// 完成したフレームは [`poll_frame`](Self::poll_frame) で取り出す。
    pub fn add_packet(&mut self, packet: &Packet) -> AddOutcome {
        let kind = packet.pkt_type();
        if !kind.carries_frame() {
            return AddOutcome::Rejected(RejectReason::NotAFrame(kind));
        }

        let header = packet.header();
        let ts = Timestamp32(header.send_timestamp);
        let key = (header.type_and_crc, header.pkt_id);

        if let Some(&last) = self.seen.get(&key) {
            if Timestamp32::within(last, ts, DUPLICATE_WINDOW) {
                debug!(pkt_id = header.pkt_id, channel = header.channel, "duplicate packet");
                return AddOutcome::Duplicate;
            }
        }
        self.prune(ts);
        self.seen.insert(key, ts);

        self.abandon_stale(ts);

        if kind.is_fragment() {
            self.add_fragment(packet, kind)
        } else {
            self.add_initiator(packet)
        }
    }

    fn add_initiator(&mut self, packet: &Packet) -> AddOutcome {
        let header = packet.header();
        if let Some(current) = &self.in_progress {
            warn!(
                channel = header.channel,
                pkt_id = header.pkt_id,
                in_progress = current.pkt_id(),
                "frame started while another is still being assembled"
            );
            return AddOutcome::Rejected(RejectReason::Interleaved);
        }

        let total = if header.fragment_id <= 1 {
            1
        } else {
            header.fragment_id as u16
        };
        let frame = Frame::start(packet, total);
        if frame.completed {
            self.completed.push_back(frame);
        } else {
            self.in_progress = Some(frame);
        }
        AddOutcome::Accepted
    }

    fn add_fragment(&mut self, packet: &Packet, kind: PacketType) -> AddOutcome {
        let header = packet.header();
        let Some(frame) = self.in_progress.as_mut() else {
            debug!(channel = header.channel, pkt_id = header.pkt_id, "fragment without frame");
            return AddOutcome::Rejected(RejectReason::NoFrameInProgress);
        };

        if frame.pkt_type.fragment_kind() != Some(kind) {
            self.in_progress = None;
            return AddOutcome::Rejected(RejectReason::ReliabilityMismatch);
        }

        let expected = frame.frag_count as i16;
        if header.fragment_id != expected {
            warn!(
                channel = header.channel,
                pkt_id = header.pkt_id,
                expected,
                actual = header.fragment_id,
                "out-of-order fragment, abandoning frame"
            );
            self.in_progress = None;
            return AddOutcome::Rejected(RejectReason::OutOfOrder {
                expected,
                actual: header.fragment_id,
            });
        }

        frame.body.extend_from_slice(packet.body());
        frame.frag_count += 1;
        if frame.frag_count == frame.total {
            frame.completed = true;
            if let Some(done) = self.in_progress.take() {
                self.completed.push_back(done);
            }
        }
        AddOutcome::Accepted
    }

    /// 完成したフレームを 1 つ取り出す
    pub fn poll_frame(&mut self) -> Option<Frame> {
        self.completed.pop_front()
    }

    /// 組み立て中のフレームがあるか
    pub fn has_partial(&self) -> bool {
        self.in_progress.is_some()
    }

    /// 重複判定マップのエントリ数
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }

    /// ウィンドウを外れたエントリを捨てる
    ///
    /// 毎パケット走査しないよう、半ウィンドウ進むごとにまとめて行う。
    fn prune(&mut self, now: Timestamp32) {
        let due = match self.last_prune {
            Some(last) => !Timestamp32::within(last, now, DUPLICATE_WINDOW / 2),
            None => true,
        };
        if !due {
            return;
        }
        self.seen
            .retain(|_, last| Timestamp32::within(*last, now, DUPLICATE_WINDOW));
        self.last_prune = Some(now);
    }

    /// 残りのフラグメントが来ないまま古くなったフレームを破棄する
    fn abandon_stale(&mut self, now: Timestamp32) {
        let stale = self.in_progress.as_ref().is_some_and(|frame| {
            !Timestamp32::within(Timestamp32(frame.header.send_timestamp), now, DUPLICATE_WINDOW)
        });
        if stale {
            debug!("abandoning stale partial frame");
            self.in_progress = None;
        }
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// 送信するメッセージ本体をパケット単位に分割する
///
/// # 戻り値
/// `(種別, fragment_id, 本体)` の列。`max_body` に収まる場合は 1 要素で fragment_id = 0。
///
/// # エラー
/// - `TransportError::MessageTooLarge`: 分割数が i16 に収まらない
pub fn split_frame(
    kind: PacketType,
    body: &[u8],
    max_body: usize,
) -> Result<Vec<(PacketType, i16, Vec<u8>)>> {
    let frag_kind = kind.fragment_kind().unwrap_or(kind);
    if body.len() <= max_body || max_body == 0 {
        return Ok(vec![(kind, 0, body.to_vec())]);
    }

    let chunks: Vec<&[u8]> = body.chunks(max_body).collect();
    let total =
        i16::try_from(chunks.len()).map_err(|_| TransportError::MessageTooLarge(body.len()))?;

    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            if i == 0 {
                (kind, total, chunk.to_vec())
            } else {
                (frag_kind, i as i16, chunk.to_vec())
            }
        })
        .collect())
}
