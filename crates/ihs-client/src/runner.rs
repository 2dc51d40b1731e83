//! セッションの駆動ループ
//!
//! UDP ソケットを 1 つ持ち、受信データグラムを [`SessionClient`] に渡して、
//! 出てきた送信データグラムを送り、イベントをメディアワーカーへ振り分ける。
//! 待つのはソケット受信・CONNECT の再送タイマー・取り消しの 3 つだけ。

use std::net::SocketAddr;

use ihs_media::{FileSink, MediaWorker, NullSink};
use ihs_session::{DisconnectReason, SessionClient, SessionEvent, SessionState};
use ihs_transport::WireClock;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::retry::{CancelFlag, RetryTask};

/// セッション終了時の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// 切断理由（切断イベントを受け取れなかった場合は `None`）
    pub reason: Option<DisconnectReason>,
    /// 最後に到達した接続中の状態
    pub furthest_state: Option<SessionState>,
    pub audio_frames: u64,
    pub video_frames: u64,
    /// キュー満杯で捨てたフレーム数
    pub audio_dropped: u64,
    pub video_dropped: u64,
}

pub struct SessionRunner {
    socket: UdpSocket,
    peer: SocketAddr,
    session: SessionClient,
    clock: WireClock,
    retry: RetryTask,
    shutdown: CancelFlag,
    recv_buffer: usize,
    audio: Option<MediaWorker>,
    video: Option<MediaWorker>,
    summary: RunSummary,
}

impl SessionRunner {
    /// 設定からソケット・セッション・メディアワーカーを用意する
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let host = config.host_addr();
        let peer = tokio::net::lookup_host(&host)
            .await?
            .next()
            .ok_or_else(|| ClientError::Resolve(host.clone()))?;
        let socket = UdpSocket::bind(&config.session.bind).await?;
        info!(local = %socket.local_addr()?, %peer, "socket bound");

        let session = SessionClient::new(config.session_key()?, config.session_options())?;
        let mut runner = Self::from_parts(socket, peer, session, config);

        runner.audio = Some(MediaWorker::spawn(
            "audio",
            Box::new(NullSink::new()),
            config.media.audio_queue_depth,
        )?);
        if let Some(path) = &config.media.dump_video {
            runner.video = Some(MediaWorker::spawn(
                "video",
                Box::new(FileSink::create(path)?),
                config.media.video_queue_depth,
            )?);
        }
        Ok(runner)
    }

    /// 用意済みのソケットとセッションから組み立てる（メディアワーカーなし）
    pub fn from_parts(
        socket: UdpSocket,
        peer: SocketAddr,
        session: SessionClient,
        config: &ClientConfig,
    ) -> Self {
        let shutdown = CancelFlag::new();
        SessionRunner {
            socket,
            peer,
            session,
            clock: WireClock::new(),
            retry: RetryTask::with_cancel(
                config.session.connect_retry_interval(),
                config.session.connect_attempts,
                shutdown.clone(),
            ),
            shutdown,
            recv_buffer: config.session.recv_buffer,
            audio: None,
            video: None,
            summary: RunSummary::default(),
        }
    }

    pub fn with_audio_worker(mut self, worker: MediaWorker) -> Self {
        self.audio = Some(worker);
        self
    }

    pub fn with_video_worker(mut self, worker: MediaWorker) -> Self {
        self.video = Some(worker);
        self
    }

    /// 立てると DISCONNECT を送って終了する
    pub fn shutdown_flag(&self) -> CancelFlag {
        self.shutdown.clone()
    }

    /// 切断されるまで動かす
    ///
    /// # エラー
    /// セッション致命的なエラー（復号失敗・認証拒否・送信パケットの組み立て失敗）。
    /// どの場合もメディアワーカーの停止は済んでいる。
    pub async fn run(mut self) -> Result<RunSummary> {
        let mut fatal = None;
        if let Err(e) = self.session.connect(self.clock.now()) {
            error!(error = %e, "failed to send CONNECT");
            self.session.abort(DisconnectReason::SendFailed);
            fatal = Some(e);
        }
        self.flush().await;
        self.drain_events();

        let mut buf = vec![0u8; self.recv_buffer];

        while !self.session.is_closed() {
            let awaiting_ack = self.session.state() == SessionState::AwaitingConnectAck
                && self.retry.is_active();

            tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) if from == self.peer => {
                        if let Err(e) = self.session.handle_datagram(&buf[..len], self.clock.now()) {
                            error!(error = %e, "session failed");
                            fatal = Some(e);
                        }
                    }
                    Ok((len, from)) => {
                        debug!(%from, len, "datagram from unexpected address");
                    }
                    Err(e) => {
                        warn!(error = %e, "socket receive failed");
                        self.session.abort(DisconnectReason::HostUnreachable);
                    }
                },
                attempt = self.retry.tick(), if awaiting_ack => match attempt {
                    Some(n) => {
                        debug!(attempt = n, "no CONNECT_ACK yet");
                        if let Err(e) = self.session.resend_connect(self.clock.now()) {
                            error!(error = %e, "failed to re-send CONNECT");
                            self.session.abort(DisconnectReason::SendFailed);
                            fatal = Some(e);
                        }
                    }
                    None if self.shutdown.is_cancelled() => {}
                    None => {
                        warn!(attempts = self.retry.attempts(), "host did not answer CONNECT");
                        self.session.abort(DisconnectReason::HostUnreachable);
                    }
                },
                _ = self.shutdown.cancelled() => {
                    info!("hanging up");
                    if let Err(e) = self.session.hangup(self.clock.now()) {
                        error!(error = %e, "failed to send DISCONNECT");
                        self.session.abort(DisconnectReason::LocalHangup);
                        fatal = Some(e);
                    }
                }
            }

            self.flush().await;
            self.drain_events();
        }

        let summary = self.finish()?;
        match fatal {
            Some(e) => Err(e.into()),
            None => Ok(summary),
        }
    }

    async fn flush(&mut self) {
        while let Some(wire) = self.session.poll_transmit() {
            if let Err(e) = self.socket.send_to(&wire, self.peer).await {
                warn!(error = %e, "socket send failed");
                self.session.abort(DisconnectReason::HostUnreachable);
                while self.session.poll_transmit().is_some() {}
                return;
            }
        }
    }

    fn drain_events(&mut self) {
        while let Some(event) = self.session.poll_event() {
            match event {
                SessionEvent::StateChanged { from, to } => {
                    info!(?from, ?to, "session state");
                    if to != SessionState::Disconnected {
                        self.summary.furthest_state = Some(to);
                    }
                }
                SessionEvent::Connected {
                    dst_conn_id,
                    connect_timestamp,
                } => info!(dst_conn_id, connect_timestamp, "connected to host"),
                SessionEvent::Negotiated(config) => info!(
                    audio = ?config.audio_codec,
                    video = ?config.video_codec,
                    "negotiated"
                ),
                SessionEvent::AudioStarted {
                    channel,
                    codec,
                    frequency,
                    channels,
                } => info!(channel, ?codec, frequency, channels, "audio started"),
                SessionEvent::VideoStarted {
                    channel,
                    codec,
                    width,
                    height,
                } => info!(channel, ?codec, width, height, "video started"),
                SessionEvent::AudioData { payload, .. } => {
                    self.summary.audio_frames += 1;
                    if let Some(worker) = self.audio.as_mut() {
                        worker.submit(payload);
                    }
                }
                SessionEvent::VideoData { payload, .. } => {
                    self.summary.video_frames += 1;
                    if let Some(worker) = self.video.as_mut() {
                        worker.submit(payload);
                    }
                }
                SessionEvent::Disconnected { reason } => {
                    info!(?reason, "disconnected");
                    self.summary.reason = Some(reason);
                }
                other => debug!(event = ?other, "session event"),
            }
        }
    }

    /// メディアワーカーを止めて集計を返す
    fn finish(&mut self) -> Result<RunSummary> {
        if let Some(worker) = self.audio.take() {
            self.summary.audio_dropped = worker.dropped();
            let stats = worker.shutdown()?;
            debug!(?stats, "audio worker stopped");
        }
        if let Some(worker) = self.video.take() {
            self.summary.video_dropped = worker.dropped();
            let stats = worker.shutdown()?;
            debug!(?stats, "video worker stopped");
        }
        Ok(self.summary.clone())
    }
}
