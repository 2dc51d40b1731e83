//! フレーム IV の導出
//!
//! 制御チャンネルの暗号化 IV は平文（シーケンス番号 + ペイロード）に対する
//! HMAC-MD5 で決まる。受信側は復号後の平文から同じ値を再計算し、
//! 受け取った IV と比較することで完全性を検証する。

use hmac::{Hmac, Mac};
use md5::Md5;

use crate::cipher::BLOCK_LEN;
use crate::error::CryptoError;

type HmacMd5 = Hmac<Md5>;

/// 平文から 16 バイトの IV を導出する
///
/// # 引数
/// - `key`: セッション鍵
/// - `plain`: `[sequence: u64 LE][payload...]`
pub fn derive_iv(key: &[u8], plain: &[u8]) -> Result<[u8; BLOCK_LEN], CryptoError> {
    let mut mac = HmacMd5::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
    mac.update(plain);
    let mut iv = [0u8; BLOCK_LEN];
    iv.copy_from_slice(&mac.finalize().into_bytes());
    Ok(iv)
}

/// 復号後の平文が IV と一致するか（定数時間比較）
pub fn verify_iv(key: &[u8], plain: &[u8], iv: &[u8; BLOCK_LEN]) -> Result<(), CryptoError> {
    let mut mac = HmacMd5::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
    mac.update(plain);
    mac.verify_slice(iv)
        .map_err(|_| CryptoError::AuthenticationFailed)
}
