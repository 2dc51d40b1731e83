//! ワイヤタイムスタンプ（32ビット）
//!
//! クライアント起動からの経過ミリ秒を u32 でラップさせた値を
//! ヘッダーの `send_timestamp` と ACK/NACK 本体に載せる。

use std::time::{Duration, Instant};

/// パケットのタイムスタンプ（ミリ秒、mod 2^32）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp32(pub u32);

impl Timestamp32 {
    /// 経過ミリ秒から生成する（2^32 ms を超えたらラップする）
    pub fn from_ms(ms: u64) -> Self {
        Timestamp32((ms & 0xFFFF_FFFF) as u32)
    }

    /// 経過時間から生成する
    pub fn from_elapsed(elapsed: Duration) -> Self {
        Self::from_ms(elapsed.as_millis() as u64)
    }

    /// 2 つのタイムスタンプの差（newer - older、ラップアラウンド考慮）
    pub fn diff(newer: Self, older: Self) -> u32 {
        newer.0.wrapping_sub(older.0)
    }

    /// 符号付きで解釈した差の絶対値
    ///
    /// どちらが新しいかに関わらず「近さ」を測るために使う。
    pub fn distance(a: Self, b: Self) -> u32 {
        (a.0.wrapping_sub(b.0) as i32).unsigned_abs()
    }

    /// 2 つのタイムスタンプが `window` 以内か
    pub fn within(a: Self, b: Self, window: u32) -> bool {
        Self::distance(a, b) <= window
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    /// ACK/NACK 本体のリトルエンディアン表現
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// ACK/NACK 本体から読み取る（4 バイト未満なら `None`）
    pub fn from_le_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        Some(Timestamp32(u32::from_le_bytes(raw)))
    }
}

impl From<u32> for Timestamp32 {
    fn from(val: u32) -> Self {
        Timestamp32(val)
    }
}

/// セッション開始時刻を基準にタイムスタンプを払い出す時計
#[derive(Debug, Clone, Copy)]
pub struct WireClock {
    start: Instant,
}

impl WireClock {
    pub fn new() -> Self {
        WireClock {
            start: Instant::now(),
        }
    }

    /// 現在のタイムスタンプ
    pub fn now(&self) -> Timestamp32 {
        Timestamp32::from_elapsed(self.start.elapsed())
    }
}

impl Default for WireClock {
    fn default() -> Self {
        Self::new()
    }
}
