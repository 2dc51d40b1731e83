//! セッション状態機械
//!
//! 接続（CONNECT / CONNECT_ACK）からハンドシェイク・認証・ネゴシエーションを経て
//! ストリーミングに至るまでを管理する。ソケットは持たず、受信データグラムを
//! [`SessionClient::handle_datagram`] で受け取り、送信データグラムを
//! [`SessionClient::poll_transmit`] で返す。

use std::collections::BTreeMap;

use ihs_crypto::{CryptoSession, SessionKey};
use ihs_proto::{
    CAuthenticationRequestMsg, CAuthenticationResponseMsg, CClientHandshakeMsg,
    CNegotiationCompleteMsg, CNegotiationInitMsg, CServerHandshakeMsg, CStartAudioDataMsg,
    CStartVideoDataMsg, CStreamingClientHandshakeInfo, EStreamChannel, EStreamControlMessage,
    EStreamVersion,
};
use ihs_transport::{Frame, Packet, PacketType, Timestamp32};
use tracing::{debug, error, info, warn};

use crate::channel::{Channel, ChannelKind};
use crate::control::{decode_control, open_frame, ControlDecode, ControlMessage, OpenedFrame};
use crate::error::{Result, SessionError};
use crate::event::{DisconnectReason, SessionEvent};
use crate::link::{Link, Outgoing};
use crate::negotiation::{NegotiatedConfig, StreamPreferences};
use crate::CONNECT_MAGIC;

const DISCOVERY: u8 = EStreamChannel::Discovery as u8;
const CONTROL: u8 = EStreamChannel::Control as u8;
const STATS: u8 = EStreamChannel::Stats as u8;

/// セッションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    AwaitingConnectAck,
    Handshaking,
    Authenticating,
    Negotiating,
    Streaming,
    Disconnected,
}

/// セッション生成時に与える値
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// 認証リクエストに載せる Steam ID
    pub steam_id: u64,
    pub stream: StreamPreferences,
}

/// In-Home Streaming のクライアントセッション
pub struct SessionClient {
    state: SessionState,
    options: SessionOptions,
    link: Link,
    /// CONNECT 系パケットを扱う仮想チャンネル
    connection: Channel,
    channels: BTreeMap<u8, Channel>,
    /// CONNECT_ACK で受け取ったホストの時刻
    connect_timestamp: Option<u32>,
    /// 送信済み CONNECT のパケット ID（再送で使い回す）
    connect_pkt_id: Option<u16>,
    negotiated: Option<NegotiatedConfig>,
    closed: bool,
}

impl SessionClient {
    /// ランダムな接続 ID（1..=255）でセッションを作る
    pub fn new(key: SessionKey, options: SessionOptions) -> Result<Self> {
        let mut byte = [0u8; 1];
        getrandom::getrandom(&mut byte).map_err(|e| SessionError::Random(e.to_string()))?;
        Ok(Self::with_conn_id(1 + byte[0] % 255, key, options))
    }

    /// 接続 ID を指定してセッションを作る
    pub fn with_conn_id(src_conn_id: u8, key: SessionKey, options: SessionOptions) -> Self {
        let mut channels = BTreeMap::new();
        channels.insert(DISCOVERY, Channel::new(DISCOVERY, ChannelKind::Discovery));
        channels.insert(CONTROL, Channel::new(CONTROL, ChannelKind::Control));
        channels.insert(STATS, Channel::new(STATS, ChannelKind::Stats));

        SessionClient {
            state: SessionState::Connecting,
            options,
            link: Link::new(src_conn_id, CryptoSession::new(key)),
            connection: Channel::new(DISCOVERY, ChannelKind::Connection),
            channels,
            connect_timestamp: None,
            connect_pkt_id: None,
            negotiated: None,
            closed: false,
        }
    }

    // ===== 状態の参照 =====

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn src_conn_id(&self) -> u8 {
        self.link.src_conn_id
    }

    /// ホストの接続 ID（CONNECT_ACK 前は 0）
    pub fn dst_conn_id(&self) -> u8 {
        self.link.dst_conn_id
    }

    pub fn connect_timestamp(&self) -> Option<u32> {
        self.connect_timestamp
    }

    pub fn negotiated(&self) -> Option<&NegotiatedConfig> {
        self.negotiated.as_ref()
    }

    /// ServerHandshake で受け取った MTU（未受信なら既定値）
    pub fn mtu(&self) -> usize {
        self.link.mtu
    }

    pub fn send_encrypt_sequence(&self) -> u64 {
        self.link.crypto.send_seq()
    }

    pub fn recv_decrypt_sequence(&self) -> u64 {
        self.link.crypto.recv_seq()
    }

    /// 現在開いているチャンネル番号（仮想チャンネルを除く）
    pub fn channel_ids(&self) -> Vec<u8> {
        self.channels.keys().copied().collect()
    }

    pub fn channel(&self, id: u8) -> Option<&Channel> {
        self.channels.get(&id)
    }

    // ===== 送受信キュー =====

    /// 次に送信するデータグラム
    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.link.poll_transmit()
    }

    /// 次のイベント
    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.link.poll_event()
    }

    // ===== 接続・切断 =====

    /// CONNECT を送って CONNECT_ACK 待ちに入る
    pub fn connect(&mut self, now: Timestamp32) -> Result<()> {
        if self.state != SessionState::Connecting {
            return Ok(());
        }
        self.link.now = now;
        let pkt_id = self.connection.core_mut().next_pkt_id()?;
        self.connect_pkt_id = Some(pkt_id);
        self.send_connect(pkt_id)?;
        info!(src_conn_id = self.link.src_conn_id, "connecting");
        self.transition(SessionState::AwaitingConnectAck);
        Ok(())
    }

    /// CONNECT_ACK が届くまで CONNECT を送り直す
    ///
    /// 既に接続済み・切断済みなら何もしない。
    pub fn resend_connect(&mut self, now: Timestamp32) -> Result<()> {
        if self.state != SessionState::AwaitingConnectAck {
            return Ok(());
        }
        let Some(pkt_id) = self.connect_pkt_id else {
            return Ok(());
        };
        self.link.now = now;
        debug!(pkt_id, "re-sending CONNECT");
        self.send_connect(pkt_id)
    }

    fn send_connect(&mut self, pkt_id: u16) -> Result<()> {
        let body = CONNECT_MAGIC.to_le_bytes().to_vec();
        self.link.send(Outgoing::new(
            PacketType::Connect,
            false,
            self.connection.id(),
            pkt_id,
            body,
        ))
    }

    /// DISCONNECT を送って切断する
    pub fn hangup(&mut self, now: Timestamp32) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.link.now = now;
        self.send_disconnect()?;
        self.close(DisconnectReason::LocalHangup);
        Ok(())
    }

    fn send_disconnect(&mut self) -> Result<()> {
        self.link.send(Outgoing::new(
            PacketType::Disconnect,
            true,
            self.connection.id(),
            0,
            Vec::new(),
        ))
    }

    /// パケットを送らずに切断状態へ移る（ソケットエラーなど）
    pub fn abort(&mut self, reason: DisconnectReason) {
        if !self.closed {
            self.close(reason);
        }
    }

    fn close(&mut self, reason: DisconnectReason) {
        info!(?reason, state = ?self.state, "session closed");
        self.closed = true;
        self.channels.clear();
        self.transition(SessionState::Disconnected);
        self.link.emit(SessionEvent::Disconnected { reason });
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!(?from, ?to, "state transition");
        self.state = to;
        self.link.emit(SessionEvent::StateChanged { from, to });
    }

    // ===== 受信 =====

    /// 受信したデータグラムを 1 つ処理する
    ///
    /// 不正なパケットは黙って捨てる（`Ok`）。`Err` を返すのは復号失敗・認証拒否・
    /// 返信の組み立て失敗のときで、その時点でセッションは切断状態になっている。
    pub fn handle_datagram(&mut self, bytes: &[u8], now: Timestamp32) -> Result<()> {
        if self.closed {
            debug!("datagram after close ignored");
            return Ok(());
        }
        self.link.now = now;

        let packet = match Packet::parse(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(error = %e, len = bytes.len(), "dropping malformed packet");
                return Ok(());
            }
        };
        if packet.is_corrupt() {
            warn!(len = bytes.len(), "bad CRC, dropping");
            return Ok(());
        }

        let header = *packet.header();
        let kind = packet.pkt_type();
        if !matches!(kind, PacketType::Unconnected | PacketType::Connect)
            && header.dst_conn_id != self.link.src_conn_id
        {
            debug!(
                dst_conn_id = header.dst_conn_id,
                expected = self.link.src_conn_id,
                "connection id mismatch, dropping"
            );
            return Ok(());
        }

        let result = match kind {
            PacketType::Connect | PacketType::ConnectAck | PacketType::Disconnect => {
                self.on_connection_packet(&packet)
            }
            PacketType::Unconnected => self.on_unconnected(&packet),
            _ => self.on_channel_packet(&packet),
        };
        if let Err(e) = &result {
            if !self.closed {
                error!(error = %e, "failed to answer host, closing");
                self.close(DisconnectReason::SendFailed);
            }
        }
        result
    }

    fn on_connection_packet(&mut self, packet: &Packet) -> Result<()> {
        let header = packet.header();
        match packet.pkt_type() {
            PacketType::ConnectAck => {
                if self.state != SessionState::AwaitingConnectAck {
                    debug!(state = ?self.state, "late CONNECT_ACK ignored");
                    return Ok(());
                }
                if !self.connection.core_mut().on_ack(header.pkt_id) {
                    debug!(pkt_id = header.pkt_id, "CONNECT_ACK for unknown packet");
                    return Ok(());
                }
                let connect_timestamp = Timestamp32::from_le_slice(packet.body())
                    .map(|ts| ts.raw())
                    .unwrap_or(0);
                self.on_connected(header.src_conn_id, connect_timestamp)
            }
            PacketType::Disconnect => {
                info!("host sent DISCONNECT");
                self.close(DisconnectReason::PeerDisconnected);
                Ok(())
            }
            other => {
                debug!(kind = ?other, "ignoring connection packet");
                Ok(())
            }
        }
    }

    fn on_connected(&mut self, conn_id: u8, connect_timestamp: u32) -> Result<()> {
        info!(dst_conn_id = conn_id, connect_timestamp, "connected");
        self.link.dst_conn_id = conn_id;
        self.connect_timestamp = Some(connect_timestamp);
        self.link.emit(SessionEvent::Connected {
            dst_conn_id: conn_id,
            connect_timestamp,
        });

        let handshake = CClientHandshakeMsg {
            info: Some(CStreamingClientHandshakeInfo::default()),
        };
        self.send_control(EStreamControlMessage::ClientHandshake, &handshake, None)?;
        self.transition(SessionState::Handshaking);
        Ok(())
    }

    fn on_unconnected(&mut self, packet: &Packet) -> Result<()> {
        let channel_id = packet.header().channel;
        match self.channels.get_mut(&channel_id) {
            Some(channel) if *channel.kind() == ChannelKind::Discovery => {
                channel.handle_unconnected(packet, &mut self.link)
            }
            _ => {
                debug!(channel = channel_id, "unconnected packet off the discovery channel");
                Ok(())
            }
        }
    }

    fn on_channel_packet(&mut self, packet: &Packet) -> Result<()> {
        let channel_id = packet.header().channel;
        let Some(channel) = self.channels.get_mut(&channel_id) else {
            debug!(channel = channel_id, "packet for unknown channel");
            return Ok(());
        };
        let frames = channel.receive(packet, &mut self.link)?;
        for frame in frames {
            self.dispatch_frame(channel_id, &frame)?;
            if self.closed {
                break;
            }
        }
        Ok(())
    }

    fn dispatch_frame(&mut self, channel_id: u8, frame: &Frame) -> Result<()> {
        let Some(channel) = self.channels.get(&channel_id) else {
            return Ok(());
        };
        match channel.kind() {
            ChannelKind::Control => self.on_control_frame(frame),
            ChannelKind::Audio(_) | ChannelKind::Video(_) => {
                channel.handle_data_frame(frame, &mut self.link);
                Ok(())
            }
            ChannelKind::Discovery | ChannelKind::Stats | ChannelKind::Connection => Ok(()),
        }
    }

    // ===== 制御チャンネル =====

    fn on_control_frame(&mut self, frame: &Frame) -> Result<()> {
        let opened = match open_frame(frame, &mut self.link) {
            Ok(Some(opened)) => opened,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(error = %e, pkt_id = frame.pkt_id(), "failed to decrypt control message");
                self.close(DisconnectReason::DecryptFailed);
                return Err(e);
            }
        };
        let OpenedFrame {
            pkt_id,
            msg_type,
            payload,
        } = opened;

        match decode_control(msg_type, &payload) {
            Ok(ControlDecode::Known(message)) => self.on_control_message(pkt_id, message),
            Ok(ControlDecode::Unrecognized(msg_type)) => {
                debug!(msg_type, "unrecognized control message");
                self.link.emit(SessionEvent::Unrecognized { msg_type });
                Ok(())
            }
            Err(e) => {
                warn!(msg_type, error = %e, "failed to decode control message");
                Ok(())
            }
        }
    }

    fn on_control_message(&mut self, pkt_id: u16, message: ControlMessage) -> Result<()> {
        match message {
            ControlMessage::ServerHandshake(msg) => self.on_server_handshake(msg),
            ControlMessage::AuthenticationResponse(msg) => self.on_auth_response(msg),
            ControlMessage::NegotiationInit(msg) => self.on_negotiation_init(pkt_id, msg),
            ControlMessage::NegotiationSetConfig(_) => self.on_negotiation_set_config(pkt_id),
            ControlMessage::NegotiationComplete => {
                if self.state == SessionState::Negotiating {
                    self.transition(SessionState::Streaming);
                }
                Ok(())
            }
            ControlMessage::StartAudioData(msg) => {
                self.start_audio(msg);
                Ok(())
            }
            ControlMessage::StopAudioData => {
                self.stop_data(|kind| matches!(kind, ChannelKind::Audio(_)));
                Ok(())
            }
            ControlMessage::StartVideoData(msg) => {
                self.start_video(msg);
                Ok(())
            }
            ControlMessage::StopVideoData => {
                self.stop_data(|kind| matches!(kind, ChannelKind::Video(_)));
                Ok(())
            }
            ControlMessage::Notification(notification) => {
                debug!(?notification, "control notification");
                self.link.emit(SessionEvent::Notification(notification));
                Ok(())
            }
        }
    }

    fn on_server_handshake(&mut self, msg: CServerHandshakeMsg) -> Result<()> {
        if self.state != SessionState::Handshaking {
            warn!(state = ?self.state, "unexpected ServerHandshake");
            return Ok(());
        }
        let mtu = msg.info.as_ref().and_then(|info| info.mtu);
        if let Some(mtu) = mtu.and_then(|m| usize::try_from(m).ok()).filter(|&m| m > 0) {
            self.link.mtu = mtu;
        }
        self.link.emit(SessionEvent::ServerHandshake { mtu });

        let request = CAuthenticationRequestMsg {
            token: Some(self.link.crypto.auth_token()?.to_vec()),
            version: Some(EStreamVersion::Current as i32),
            steamid: Some(self.options.steam_id),
        };
        self.send_control(EStreamControlMessage::AuthenticationRequest, &request, None)?;
        self.transition(SessionState::Authenticating);
        Ok(())
    }

    fn on_auth_response(&mut self, msg: CAuthenticationResponseMsg) -> Result<()> {
        if self.state != SessionState::Authenticating {
            warn!(state = ?self.state, "unexpected AuthenticationResponse");
            return Ok(());
        }
        let result = msg.result();
        if result != 0 {
            warn!(result, "authentication rejected");
            self.send_disconnect()?;
            self.close(DisconnectReason::AuthorizationRejected);
            return Err(SessionError::AuthorizationRejected(result));
        }
        info!("authenticated");
        self.transition(SessionState::Negotiating);
        Ok(())
    }

    fn on_negotiation_init(&mut self, pkt_id: u16, msg: CNegotiationInitMsg) -> Result<()> {
        if self.state != SessionState::Negotiating {
            warn!(state = ?self.state, "unexpected NegotiationInit");
            return Ok(());
        }
        let config = NegotiatedConfig::from_offer(&msg, &self.options.stream);
        info!(
            audio = ?config.audio_codec,
            video = ?config.video_codec,
            "negotiated codecs"
        );
        self.send_control(
            EStreamControlMessage::NegotiationSetConfig,
            &config.to_message(),
            Some(pkt_id),
        )?;
        self.link.emit(SessionEvent::Negotiated(config.clone()));
        self.negotiated = Some(config);
        Ok(())
    }

    fn on_negotiation_set_config(&mut self, pkt_id: u16) -> Result<()> {
        if self.state != SessionState::Negotiating {
            warn!(state = ?self.state, "unexpected NegotiationSetConfig");
            return Ok(());
        }
        self.send_control(
            EStreamControlMessage::NegotiationComplete,
            &CNegotiationCompleteMsg {},
            Some(pkt_id),
        )?;
        self.transition(SessionState::Streaming);
        Ok(())
    }

    fn start_audio(&mut self, msg: CStartAudioDataMsg) {
        let Some(channel) = data_channel_id(msg.channel) else {
            warn!(channel = ?msg.channel, "StartAudioData with invalid channel");
            return;
        };
        info!(channel, codec = ?msg.codec(), "audio stream started");
        self.link.emit(SessionEvent::AudioStarted {
            channel,
            codec: msg.codec(),
            frequency: msg.frequency(),
            channels: msg.channels(),
        });
        self.channels
            .insert(channel, Channel::new(channel, ChannelKind::Audio(msg)));
    }

    fn start_video(&mut self, msg: CStartVideoDataMsg) {
        let Some(channel) = data_channel_id(msg.channel) else {
            warn!(channel = ?msg.channel, "StartVideoData with invalid channel");
            return;
        };
        info!(channel, codec = ?msg.codec(), "video stream started");
        self.link.emit(SessionEvent::VideoStarted {
            channel,
            codec: msg.codec(),
            width: msg.width(),
            height: msg.height(),
        });
        self.channels
            .insert(channel, Channel::new(channel, ChannelKind::Video(msg)));
    }

    fn stop_data(&mut self, is_target: impl Fn(&ChannelKind) -> bool) {
        let ids: Vec<u8> = self
            .channels
            .iter()
            .filter(|(_, channel)| is_target(channel.kind()))
            .map(|(&id, _)| id)
            .collect();
        for id in ids {
            if let Some(channel) = self.channels.remove(&id) {
                let event = match channel.kind() {
                    ChannelKind::Audio(_) => SessionEvent::AudioStopped { channel: id },
                    _ => SessionEvent::VideoStopped { channel: id },
                };
                info!(channel = id, "data stream stopped");
                self.link.emit(event);
            }
        }
    }

    fn send_control<Msg: prost::Message>(
        &mut self,
        msg_type: EStreamControlMessage,
        message: &Msg,
        reuse_pkt_id: Option<u16>,
    ) -> Result<u16> {
        let channel = self
            .channels
            .get_mut(&CONTROL)
            .ok_or(SessionError::Closed)?;
        channel.send_reliable(&mut self.link, msg_type, message, reuse_pkt_id)
    }
}

/// StartAudio/VideoData のチャンネル番号を検証する
///
/// 固定チャンネル（0..=2）と u8 を超える値は受け付けない。
fn data_channel_id(channel: Option<u32>) -> Option<u8> {
    let id = u8::try_from(channel?).ok()?;
    (id >= EStreamChannel::DataChannelStart as u8).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ihs_crypto::{encrypt_frame, CryptoError};
    use ihs_proto::{
        control_frame, encode_to_bytes, CKeepAliveMsg, CStreamingServerHandshakeInfo,
        EStreamAudioCodec, EStreamVideoCodec,
    };
    use ihs_transport::PacketHeader;

    const KEY: [u8; 16] = [0x11; 16];

    fn session() -> SessionClient {
        SessionClient::with_conn_id(
            7,
            SessionKey::new(&KEY).unwrap(),
            SessionOptions {
                steam_id: 76561198000000000,
                stream: StreamPreferences::default(),
            },
        )
    }

    fn drain(session: &mut SessionClient) -> Vec<Packet> {
        let mut out = Vec::new();
        while let Some(wire) = session.poll_transmit() {
            out.push(Packet::parse(&wire).unwrap());
        }
        out
    }

    fn host_packet(kind: PacketType, channel: u8, pkt_id: u16, body: Vec<u8>) -> Vec<u8> {
        let mut header = PacketHeader::new(kind, true);
        header.src_conn_id = 42;
        header.dst_conn_id = 7;
        header.channel = channel;
        header.pkt_id = pkt_id;
        header.send_timestamp = u32::from(pkt_id) * 10;
        Packet::new(header, body).unwrap().serialize(0)
    }

    fn connected() -> SessionClient {
        let mut s = session();
        s.connect(Timestamp32(0)).unwrap();
        drain(&mut s);
        s.handle_datagram(
            &host_packet(PacketType::ConnectAck, 0, 0, 1234u32.to_le_bytes().to_vec()),
            Timestamp32(5),
        )
        .unwrap();
        drain(&mut s);
        s
    }

    #[test]
    fn test_connect_packet() {
        let mut s = session();
        assert_eq!(s.state(), SessionState::Connecting);
        s.connect(Timestamp32(0)).unwrap();
        assert_eq!(s.state(), SessionState::AwaitingConnectAck);

        let packets = drain(&mut s);
        assert_eq!(packets.len(), 1);
        let connect = &packets[0];
        assert_eq!(connect.pkt_type(), PacketType::Connect);
        assert!(!connect.header().has_crc());
        assert_eq!(connect.header().channel, 0);
        assert_eq!(connect.header().src_conn_id, 7);
        assert_eq!(connect.header().dst_conn_id, 0);
        assert_eq!(connect.body(), CONNECT_MAGIC.to_le_bytes());
    }

    #[test]
    fn test_resend_connect_reuses_pkt_id() {
        let mut s = session();
        s.connect(Timestamp32(0)).unwrap();
        s.resend_connect(Timestamp32(500)).unwrap();
        let packets = drain(&mut s);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].header().pkt_id, packets[1].header().pkt_id);
        assert_eq!(packets[1].header().send_timestamp, 500);
    }

    #[test]
    fn test_connect_ack_starts_handshake() {
        let mut s = session();
        s.connect(Timestamp32(0)).unwrap();
        drain(&mut s);

        s.handle_datagram(
            &host_packet(PacketType::ConnectAck, 0, 0, 1234u32.to_le_bytes().to_vec()),
            Timestamp32(5),
        )
        .unwrap();

        assert_eq!(s.dst_conn_id(), 42);
        assert_eq!(s.connect_timestamp(), Some(1234));
        assert_eq!(s.state(), SessionState::Handshaking);

        let packets = drain(&mut s);
        assert_eq!(packets.len(), 1);
        let handshake = &packets[0];
        assert_eq!(handshake.pkt_type(), PacketType::Reliable);
        assert_eq!(handshake.header().channel, CONTROL);
        assert_eq!(handshake.header().dst_conn_id, 42);
        assert_eq!(handshake.body()[0], EStreamControlMessage::ClientHandshake.wire_byte());
        // ハンドシェイクは平文
        assert_eq!(s.send_encrypt_sequence(), 0);

        // 再送パケットには反応しない
        s.resend_connect(Timestamp32(10)).unwrap();
        assert!(s.poll_transmit().is_none());
    }

    #[test]
    fn test_connect_ack_for_unknown_pkt_id_ignored() {
        let mut s = session();
        s.connect(Timestamp32(0)).unwrap();
        drain(&mut s);
        s.handle_datagram(
            &host_packet(PacketType::ConnectAck, 0, 9, vec![0; 4]),
            Timestamp32(5),
        )
        .unwrap();
        assert_eq!(s.state(), SessionState::AwaitingConnectAck);
        assert_eq!(s.dst_conn_id(), 0);
    }

    #[test]
    fn test_mismatched_conn_id_dropped() {
        let mut s = connected();
        let mut header = PacketHeader::new(PacketType::Reliable, true);
        header.dst_conn_id = 8;
        header.channel = STATS;
        let wire = Packet::new(header, vec![1]).unwrap().serialize(0);
        s.handle_datagram(&wire, Timestamp32(6)).unwrap();
        // ACK も返さない
        assert!(s.poll_transmit().is_none());
    }

    #[test]
    fn test_bad_crc_and_malformed_dropped() {
        let mut s = connected();
        let mut wire = host_packet(PacketType::Reliable, STATS, 1, vec![1, 2, 3]);
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        s.handle_datagram(&wire, Timestamp32(6)).unwrap();
        s.handle_datagram(&[0x85, 0, 7], Timestamp32(6)).unwrap();
        assert!(s.poll_transmit().is_none());
        assert!(!s.is_closed());
    }

    #[test]
    fn test_server_handshake_sends_auth_request() {
        let mut s = connected();
        let msg = CServerHandshakeMsg {
            info: Some(CStreamingServerHandshakeInfo { mtu: Some(1300) }),
        };
        let body = control_frame(EStreamControlMessage::ServerHandshake, &encode_to_bytes(&msg));
        s.handle_datagram(&host_packet(PacketType::Reliable, CONTROL, 1, body), Timestamp32(6))
            .unwrap();

        assert_eq!(s.state(), SessionState::Authenticating);
        assert_eq!(s.mtu(), 1300);

        let packets = drain(&mut s);
        // ACK + AuthenticationRequest
        assert_eq!(packets[0].pkt_type(), PacketType::Ack);
        assert_eq!(packets[0].header().pkt_id, 1);
        let auth = &packets[1];
        assert_eq!(
            auth.body()[0],
            EStreamControlMessage::AuthenticationRequest.wire_byte()
        );
        let request: CAuthenticationRequestMsg =
            ihs_proto::decode_from_bytes(&auth.body()[1..]).unwrap();
        assert_eq!(request.steamid, Some(76561198000000000));
        assert_eq!(request.version(), EStreamVersion::Current);
        assert_eq!(
            request.token.unwrap(),
            ihs_crypto::auth_token(&KEY).unwrap().to_vec()
        );
    }

    fn authenticating() -> SessionClient {
        let mut s = connected();
        let msg = CServerHandshakeMsg::default();
        let body = control_frame(EStreamControlMessage::ServerHandshake, &encode_to_bytes(&msg));
        s.handle_datagram(&host_packet(PacketType::Reliable, CONTROL, 1, body), Timestamp32(6))
            .unwrap();
        drain(&mut s);
        s
    }

    #[test]
    fn test_auth_rejected_is_fatal() {
        let mut s = authenticating();
        let msg = CAuthenticationResponseMsg {
            result: Some(2),
            version: None,
        };
        let body = control_frame(
            EStreamControlMessage::AuthenticationResponse,
            &encode_to_bytes(&msg),
        );
        let result =
            s.handle_datagram(&host_packet(PacketType::Reliable, CONTROL, 2, body), Timestamp32(7));
        assert!(matches!(result, Err(SessionError::AuthorizationRejected(2))));
        assert!(s.is_closed());
        assert_eq!(s.state(), SessionState::Disconnected);
        assert!(s.channel_ids().is_empty());

        let packets = drain(&mut s);
        let disconnect = packets.last().unwrap();
        assert_eq!(disconnect.pkt_type(), PacketType::Disconnect);
        assert!(disconnect.header().has_crc());
    }

    #[test]
    fn test_decrypt_failure_is_fatal() {
        let mut s = authenticating();
        let response = CAuthenticationResponseMsg {
            result: Some(0),
            version: None,
        };
        let body = control_frame(
            EStreamControlMessage::AuthenticationResponse,
            &encode_to_bytes(&response),
        );
        s.handle_datagram(&host_packet(PacketType::Reliable, CONTROL, 2, body), Timestamp32(7))
            .unwrap();
        assert_eq!(s.state(), SessionState::Negotiating);

        // 別の鍵で暗号化されたメッセージ
        let encrypted = encrypt_frame(&[], &[0x22; 16], 0).unwrap();
        let body = control_frame(EStreamControlMessage::NegotiationInit, &encrypted);
        let result =
            s.handle_datagram(&host_packet(PacketType::Reliable, CONTROL, 3, body), Timestamp32(8));
        assert!(matches!(result, Err(SessionError::Crypto(_))));
        assert!(result.unwrap_err().is_fatal());
        assert!(s.is_closed());

        // 切断後のパケットは無視する
        s.handle_datagram(&host_packet(PacketType::Reliable, CONTROL, 4, vec![9]), Timestamp32(9))
            .unwrap();
    }

    fn negotiating() -> SessionClient {
        let mut s = authenticating();
        let response = CAuthenticationResponseMsg {
            result: Some(0),
            version: None,
        };
        let body = control_frame(
            EStreamControlMessage::AuthenticationResponse,
            &encode_to_bytes(&response),
        );
        s.handle_datagram(&host_packet(PacketType::Reliable, CONTROL, 2, body), Timestamp32(7))
            .unwrap();
        drain(&mut s);
        while s.poll_event().is_some() {}
        s
    }

    fn disconnect_reasons(session: &mut SessionClient) -> Vec<DisconnectReason> {
        let mut reasons = Vec::new();
        while let Some(event) = session.poll_event() {
            if let SessionEvent::Disconnected { reason } = event {
                reasons.push(reason);
            }
        }
        reasons
    }

    #[test]
    fn test_sequence_mismatch_is_fatal() {
        let mut s = negotiating();
        assert_eq!(s.state(), SessionState::Negotiating);
        assert_eq!(s.recv_decrypt_sequence(), 0);

        // 正しい鍵だが番号が 1 つ先
        let wire = host_encrypted(
            EStreamControlMessage::NegotiationInit,
            &CNegotiationInitMsg::default(),
            3,
            1,
        );
        let result = s.handle_datagram(&wire, Timestamp32(8));
        assert!(matches!(
            result,
            Err(SessionError::Crypto(CryptoError::SequenceMismatch {
                expected: 0,
                actual: 1
            }))
        ));
        assert!(s.is_closed());
        assert_eq!(s.state(), SessionState::Disconnected);
        assert!(s.channel_ids().is_empty());
        assert_eq!(disconnect_reasons(&mut s), vec![DisconnectReason::DecryptFailed]);
    }

    #[test]
    fn test_replayed_control_message_is_fatal() {
        let mut s = negotiating();
        let keep_alive = host_encrypted(
            EStreamControlMessage::KeepAlive,
            &CKeepAliveMsg::default(),
            3,
            0,
        );
        s.handle_datagram(&keep_alive, Timestamp32(8)).unwrap();
        assert_eq!(s.recv_decrypt_sequence(), 1);

        // 同じ暗号文を別のパケット ID で再送
        let replay = host_encrypted(
            EStreamControlMessage::KeepAlive,
            &CKeepAliveMsg::default(),
            4,
            0,
        );
        let result = s.handle_datagram(&replay, Timestamp32(9));
        assert!(matches!(
            result,
            Err(SessionError::Crypto(CryptoError::SequenceMismatch { .. }))
        ));
        assert!(s.is_closed());
        assert_eq!(disconnect_reasons(&mut s), vec![DisconnectReason::DecryptFailed]);
    }

    #[test]
    fn test_reply_failure_closes_session() {
        let mut s = connected();
        let control = s.channels.get_mut(&CONTROL).unwrap();
        for id in 0..=u16::MAX {
            control.core_mut().reserve(id);
        }
        while s.poll_event().is_some() {}

        let msg = CServerHandshakeMsg::default();
        let body = control_frame(EStreamControlMessage::ServerHandshake, &encode_to_bytes(&msg));
        let result =
            s.handle_datagram(&host_packet(PacketType::Reliable, CONTROL, 1, body), Timestamp32(6));
        assert!(matches!(
            result,
            Err(SessionError::PacketIdsExhausted { channel: CONTROL })
        ));
        assert!(s.is_closed());
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(disconnect_reasons(&mut s), vec![DisconnectReason::SendFailed]);
    }

    #[test]
    fn test_oversized_ping_keeps_session_open() {
        let mut s = connected();
        let ping = ihs_proto::CDiscoveryPingRequest {
            sequence: Some(9),
            packet_size_requested: Some(70_000),
        };
        let body = ihs_proto::encode_unconnected(
            ihs_proto::EStreamDiscoveryMessage::PingRequest,
            &ping,
        );
        let mut header = PacketHeader::new(PacketType::Unconnected, true);
        header.channel = DISCOVERY;
        let wire = Packet::new(header, body).unwrap().serialize(0);
        s.handle_datagram(&wire, Timestamp32(6)).unwrap();

        assert!(!s.is_closed());
        let out = s.poll_transmit().unwrap();
        assert_eq!(out.len(), ihs_transport::MAX_UDP_PAYLOAD);
        assert!(s.poll_transmit().is_none());
    }

    #[test]
    fn test_peer_disconnect() {
        let mut s = connected();
        s.handle_datagram(&host_packet(PacketType::Disconnect, 0, 0, vec![]), Timestamp32(6))
            .unwrap();
        assert!(s.is_closed());
        let mut reasons = Vec::new();
        while let Some(event) = s.poll_event() {
            if let SessionEvent::Disconnected { reason } = event {
                reasons.push(reason);
            }
        }
        assert_eq!(reasons, vec![DisconnectReason::PeerDisconnected]);
    }

    #[test]
    fn test_hangup_sends_disconnect_once() {
        let mut s = connected();
        s.hangup(Timestamp32(6)).unwrap();
        s.hangup(Timestamp32(7)).unwrap();
        let packets = drain(&mut s);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].pkt_type(), PacketType::Disconnect);
        assert_eq!(packets[0].header().dst_conn_id, 42);
    }

    #[test]
    fn test_discovery_ping_pong_padded() {
        let mut s = connected();
        let ping = ihs_proto::CDiscoveryPingRequest {
            sequence: Some(3),
            packet_size_requested: Some(512),
        };
        let body = ihs_proto::encode_unconnected(
            ihs_proto::EStreamDiscoveryMessage::PingRequest,
            &ping,
        );
        let mut header = PacketHeader::new(PacketType::Unconnected, true);
        header.channel = DISCOVERY;
        let wire = Packet::new(header, body).unwrap().serialize(100);
        s.handle_datagram(&wire, Timestamp32(6)).unwrap();

        let out = s.poll_transmit().unwrap();
        assert_eq!(out.len(), 512 + ihs_transport::CRC_LEN);
        let pong = Packet::parse(&out).unwrap();
        assert_eq!(pong.pkt_type(), PacketType::Unconnected);
        let (msg_type, proto) = ihs_proto::decode_unconnected(pong.body()).unwrap();
        assert_eq!(msg_type, ihs_proto::EStreamDiscoveryMessage::PingResponse);
        let response: ihs_proto::CDiscoveryPingResponse =
            ihs_proto::decode_from_bytes(proto).unwrap();
        assert_eq!(response.sequence, Some(3));
        assert_eq!(response.packet_size_received, Some(104));
    }

    /// ホスト側で暗号化した制御メッセージ
    fn host_encrypted<Msg: prost::Message>(
        msg_type: EStreamControlMessage,
        message: &Msg,
        pkt_id: u16,
        sequence: u64,
    ) -> Vec<u8> {
        let encrypted = encrypt_frame(&encode_to_bytes(message), &KEY, sequence).unwrap();
        host_packet(
            PacketType::Reliable,
            CONTROL,
            pkt_id,
            control_frame(msg_type, &encrypted),
        )
    }

    #[test]
    fn test_full_flow_to_streaming() {
        let mut s = authenticating();
        let response = CAuthenticationResponseMsg {
            result: Some(0),
            version: Some(EStreamVersion::Current as i32),
        };
        let body = control_frame(
            EStreamControlMessage::AuthenticationResponse,
            &encode_to_bytes(&response),
        );
        s.handle_datagram(&host_packet(PacketType::Reliable, CONTROL, 2, body), Timestamp32(7))
            .unwrap();
        drain(&mut s);

        let offer = CNegotiationInitMsg {
            reliable_data: Some(true),
            supported_audio_codecs: vec![EStreamAudioCodec::Opus as i32],
            supported_video_codecs: vec![EStreamVideoCodec::H264 as i32, EStreamVideoCodec::Vp9 as i32],
            ..Default::default()
        };
        s.handle_datagram(
            &host_encrypted(EStreamControlMessage::NegotiationInit, &offer, 3, 0),
            Timestamp32(8),
        )
        .unwrap();
        assert_eq!(s.recv_decrypt_sequence(), 1);
        assert_eq!(
            s.negotiated().unwrap().video_codec,
            Some(EStreamVideoCodec::H264)
        );

        let packets = drain(&mut s);
        let set_config = packets
            .iter()
            .find(|p| p.pkt_type() == PacketType::Reliable)
            .unwrap();
        // ネゴシエーションの返信は受信したパケット ID を使い回す
        assert_eq!(set_config.header().pkt_id, 3);
        assert_eq!(
            set_config.body()[0],
            EStreamControlMessage::NegotiationSetConfig.wire_byte()
        );
        assert_eq!(s.send_encrypt_sequence(), 1);

        let host_config = ihs_proto::CNegotiationSetConfigMsg::default();
        s.handle_datagram(
            &host_encrypted(EStreamControlMessage::NegotiationSetConfig, &host_config, 4, 1),
            Timestamp32(9),
        )
        .unwrap();
        assert_eq!(s.state(), SessionState::Streaming);
        let packets = drain(&mut s);
        let complete = packets
            .iter()
            .find(|p| p.pkt_type() == PacketType::Reliable)
            .unwrap();
        assert_eq!(complete.header().pkt_id, 4);
        assert_eq!(
            complete.body()[0],
            EStreamControlMessage::NegotiationComplete.wire_byte()
        );

        let start = CStartVideoDataMsg {
            channel: Some(4),
            codec: Some(EStreamVideoCodec::H264 as i32),
            codec_data: None,
            width: Some(1280),
            height: Some(720),
        };
        s.handle_datagram(
            &host_encrypted(EStreamControlMessage::StartVideoData, &start, 5, 2),
            Timestamp32(10),
        )
        .unwrap();
        assert_eq!(s.channel_ids(), vec![0, 1, 2, 4]);
        drain(&mut s);

        // サブヘッダーのみ（タイミングヘッダーなし）の平文ペイロード
        let mut payload = vec![ihs_proto::EStreamDataMessage::DataPacket as u8];
        payload.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0]);
        payload.extend_from_slice(b"nal");
        s.handle_datagram(
            &host_packet(PacketType::Unreliable, 4, 1, payload),
            Timestamp32(11),
        )
        .unwrap();
        // UNRELIABLE には ACK を返さない
        assert!(s.poll_transmit().is_none());

        s.handle_datagram(
            &host_encrypted(
                EStreamControlMessage::StopVideoData,
                &ihs_proto::CStopVideoDataMsg {},
                6,
                3,
            ),
            Timestamp32(12),
        )
        .unwrap();
        assert_eq!(s.channel_ids(), vec![0, 1, 2]);

        let events: Vec<SessionEvent> = std::iter::from_fn(|| s.poll_event()).collect();
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::StateChanged {
                to: SessionState::Streaming,
                ..
            }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::VideoStarted {
                channel: 4,
                codec: EStreamVideoCodec::H264,
                width: 1280,
                height: 720
            }
        )));
        let video = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::VideoData {
                    channel, payload, ..
                } => Some((*channel, payload.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(video, (4, b"nal".to_vec()));
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::VideoStopped { channel: 4 })));
    }

    #[test]
    fn test_data_channel_id_validation() {
        assert_eq!(data_channel_id(Some(3)), Some(3));
        assert_eq!(data_channel_id(Some(1)), None);
        assert_eq!(data_channel_id(Some(300)), None);
        assert_eq!(data_channel_id(None), None);
    }
}
