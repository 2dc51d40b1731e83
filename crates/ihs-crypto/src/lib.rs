//! # ihs-crypto
//!
//! In-Home Streaming セッションのフレーム暗号化。
//!
//! ## 制御チャンネルの暗号化仕様
//!
//! ```text
//! 平文:
//!   [sequence: u64 LE][payload...]
//!
//! 暗号文:
//!   [iv: 16bytes][AES-CBC-PKCS7(平文, key, iv)]
//!   iv = HMAC-MD5(key, 平文)
//! ```
//!
//! 送信・受信のシーケンス番号はセッションごとに独立して 0 から増加する。
//! ハンドシェイク・認証メッセージは鍵交換前に送るため暗号化しない。
//!
//! ## データチャンネル
//!
//! 映像ペイロードの一部はフラグ `0x20` 付きで、全ゼロ IV の AES-CBC で暗号化される。

mod cipher;
mod error;
mod frame;
mod iv;
mod session;

pub use cipher::{cbc_decrypt, cbc_encrypt, BLOCK_LEN};
pub use error::CryptoError;
pub use frame::{decrypt_data_payload, decrypt_frame, encrypt_frame, SEQUENCE_LEN};
pub use iv::derive_iv;
pub use session::CryptoSession;

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// 認証トークンの HMAC 対象となる固定文字列
pub const AUTH_TOKEN_LABEL: &[u8] = b"Steam In-Home Streaming";

/// ペアリングで共有したセッション鍵（16 / 24 / 32 バイト）
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    /// raw バイト列から鍵を作る
    pub fn new(bytes: &[u8]) -> Result<Self, CryptoError> {
        match bytes.len() {
            16 | 24 | 32 => Ok(SessionKey(bytes.to_vec())),
            n => Err(CryptoError::InvalidKeyLength(n)),
        }
    }

    /// 16 進文字列から鍵を作る
    ///
    /// ペアリング済みクライアントは鍵を 16 進で保存・受け渡しする。
    pub fn from_hex(key_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(key_hex.trim()).map_err(|_| CryptoError::InvalidHex)?;
        Self::new(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SessionKey({} bytes)", self.0.len())
    }
}

/// 認証リクエストのトークン: HMAC-SHA256(key, "Steam In-Home Streaming")
pub fn auth_token(key: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
    mac.update(AUTH_TOKEN_LABEL);
    let mut token = [0u8; 32];
    token.copy_from_slice(&mac.finalize().into_bytes());
    Ok(token)
}
