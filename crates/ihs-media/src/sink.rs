//! メディアシンク
//!
//! ペイロードを受け取ってデコード・出力する側の境界。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{MediaError, Result};

/// デコーダー兼出力先
///
/// [`MediaWorker`](crate::MediaWorker) のスレッド上で呼ばれる。
pub trait MediaSink: Send {
    /// コーデックペイロードをサンプル列にする
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<u8>>;

    /// デコード済みサンプルを出力する
    fn write(&mut self, samples: &[u8]) -> Result<()>;

    /// ストリーム終了時に呼ばれる
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 何も出力しないシンク（件数だけ数える）
#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
    bytes: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl MediaSink for NullSink {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(payload.to_vec())
    }

    fn write(&mut self, samples: &[u8]) -> Result<()> {
        self.frames += 1;
        self.bytes += samples.len() as u64;
        Ok(())
    }
}

/// 映像エレメンタリストリームをそのままファイルに書き出すシンク
///
/// H.264 / HEVC の NAL をデコードせずに連結するので、出力は
/// `ffplay -f h264` などでそのまま再生できる。
pub struct FileSink {
    path: PathBuf,
    out: BufWriter<File>,
    written: u64,
}

impl FileSink {
    /// 出力ファイルを作成する（既存なら切り詰める）
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        debug!(path = %path.display(), "video dump opened");
        Ok(FileSink {
            path,
            out: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl MediaSink for FileSink {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.is_empty() {
            return Err(MediaError::Decode("empty payload".into()));
        }
        Ok(payload.to_vec())
    }

    fn write(&mut self, samples: &[u8]) -> Result<()> {
        self.out.write_all(samples)?;
        self.written += samples.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        debug!(path = %self.path.display(), bytes = self.written, "video dump closed");
        Ok(())
    }
}

/// 受け取ったペイロードを共有バッファに溜めるシンク
///
/// ワーカーに渡した後でも [`CollectSink::frames`] で中身を確認できる。
#[derive(Debug, Clone, Default)]
pub struct CollectSink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// これまでに書き込まれたフレームの写し
    pub fn frames(&self) -> Vec<Vec<u8>> {
        match self.frames.lock() {
            Ok(frames) => frames.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl MediaSink for CollectSink {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(payload.to_vec())
    }

    fn write(&mut self, samples: &[u8]) -> Result<()> {
        match self.frames.lock() {
            Ok(mut frames) => frames.push(samples.to_vec()),
            Err(poisoned) => poisoned.into_inner().push(samples.to_vec()),
        }
        Ok(())
    }
}
