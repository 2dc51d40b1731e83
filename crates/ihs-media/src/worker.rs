//! 単一ワーカーの順序付きキュー
//!
//! 受信ループは [`MediaWorker::submit`] でペイロードを積むだけで、デコードと出力は
//! 専用スレッドが 1 本で順に行う。キューが満杯ならそのフレームを捨てて警告を出す
//! （受信ループをブロックしない）。

use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::error::{MediaError, Result};
use crate::sink::MediaSink;

/// ワーカー終了時の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// 出力まで済んだフレーム数
    pub written: u64,
    /// デコード・出力に失敗したフレーム数
    pub failed: u64,
}

pub struct MediaWorker {
    name: String,
    tx: Option<mpsc::Sender<Vec<u8>>>,
    handle: Option<JoinHandle<WorkerStats>>,
    dropped: u64,
}

impl MediaWorker {
    /// ワーカースレッドを起動する
    ///
    /// # エラー
    /// - `MediaError::InvalidQueueDepth`: `depth` が 0
    /// - `MediaError::Spawn`: スレッドを作れなかった
    pub fn spawn(name: &str, sink: Box<dyn MediaSink>, depth: usize) -> Result<Self> {
        if depth == 0 {
            return Err(MediaError::InvalidQueueDepth);
        }
        let (tx, rx) = mpsc::channel(depth);
        let thread_name = format!("ihs-media-{name}");
        let worker_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || run(worker_name, sink, rx))
            .map_err(|e| MediaError::Spawn(e.to_string()))?;

        debug!(worker = name, depth, "media worker started");
        Ok(MediaWorker {
            name: name.to_string(),
            tx: Some(tx),
            handle: Some(handle),
            dropped: 0,
        })
    }

    /// ペイロードを積む
    ///
    /// 積めたら `true`。キューが満杯、またはワーカーが止まっていたら捨てて `false`。
    pub fn submit(&mut self, payload: Vec<u8>) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                warn!(worker = %self.name, dropped = self.dropped, "media queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(worker = %self.name, "media worker gone, dropping frame");
                false
            }
        }
    }

    /// キューが満杯で捨てたフレーム数
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// 残りのフレームを処理させてからワーカーを止める
    pub fn shutdown(mut self) -> Result<WorkerStats> {
        self.tx.take();
        let stats = match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| MediaError::WorkerPanicked)?,
            None => WorkerStats::default(),
        };
        debug!(worker = %self.name, ?stats, dropped = self.dropped, "media worker stopped");
        Ok(stats)
    }
}

impl Drop for MediaWorker {
    fn drop(&mut self) {
        // 送信側を閉じればスレッドは残りを処理して抜ける
        self.tx.take();
    }
}

fn run(name: String, mut sink: Box<dyn MediaSink>, mut rx: mpsc::Receiver<Vec<u8>>) -> WorkerStats {
    let mut stats = WorkerStats::default();
    while let Some(payload) = rx.blocking_recv() {
        let result = sink
            .decode(&payload)
            .and_then(|samples| sink.write(&samples));
        match result {
            Ok(()) => stats.written += 1,
            Err(e) => {
                stats.failed += 1;
                warn!(worker = %name, error = %e, "media sink failed");
            }
        }
    }
    if let Err(e) = sink.finish() {
        warn!(worker = %name, error = %e, "media sink finish failed");
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectSink;
    use std::sync::mpsc as std_mpsc;

    #[test]
    fn test_order_preserved() {
        let sink = CollectSink::new();
        let mut worker = MediaWorker::spawn("audio", Box::new(sink.clone()), 8).unwrap();
        for i in 0..5u8 {
            assert!(worker.submit(vec![i]));
        }
        let stats = worker.shutdown().unwrap();
        assert_eq!(stats.written, 5);
        assert_eq!(
            sink.frames(),
            (0..5u8).map(|i| vec![i]).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_zero_depth_rejected() {
        assert!(matches!(
            MediaWorker::spawn("audio", Box::new(CollectSink::new()), 0),
            Err(MediaError::InvalidQueueDepth)
        ));
    }

    /// 1 件目の decode で止まるシンク
    struct GatedSink {
        started: std_mpsc::Sender<()>,
        gate: std_mpsc::Receiver<()>,
        inner: CollectSink,
    }

    impl MediaSink for GatedSink {
        fn decode(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
            let _ = self.started.send(());
            let _ = self.gate.recv();
            Ok(payload.to_vec())
        }

        fn write(&mut self, samples: &[u8]) -> Result<()> {
            self.inner.write(samples)
        }
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (started_tx, started_rx) = std_mpsc::channel();
        let (gate_tx, gate_rx) = std_mpsc::channel();
        let collected = CollectSink::new();
        let sink = GatedSink {
            started: started_tx,
            gate: gate_rx,
            inner: collected.clone(),
        };
        let mut worker = MediaWorker::spawn("audio", Box::new(sink), 1).unwrap();

        assert!(worker.submit(vec![1]));
        // ワーカーが 1 件目を取り出して止まるのを待つ
        started_rx.recv().unwrap();
        assert!(worker.submit(vec![2]));
        assert!(!worker.submit(vec![3]));
        assert_eq!(worker.dropped(), 1);

        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();
        let stats = worker.shutdown().unwrap();
        assert_eq!(stats.written, 2);
        assert_eq!(collected.frames(), vec![vec![1], vec![2]]);
    }

    struct FailingSink;

    impl MediaSink for FailingSink {
        fn decode(&mut self, _payload: &[u8]) -> Result<Vec<u8>> {
            Err(MediaError::Decode("bad frame".into()))
        }

        fn write(&mut self, _samples: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_failure_is_counted() {
        let mut worker = MediaWorker::spawn("video", Box::new(FailingSink), 4).unwrap();
        worker.submit(vec![0]);
        worker.submit(vec![1]);
        let stats = worker.shutdown().unwrap();
        assert_eq!(stats, WorkerStats { written: 0, failed: 2 });
    }
}
