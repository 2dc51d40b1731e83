//! AES-CBC-PKCS7 プリミティブ
//!
//! 鍵長で AES-128 / AES-192 / AES-256 を切り替える。

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::CryptoError;

/// AES ブロック長 = IV 長
pub const BLOCK_LEN: usize = 16;

/// AES-CBC で暗号化する（PKCS7 パディング付き）
pub fn cbc_encrypt(key: &[u8], iv: &[u8; BLOCK_LEN], plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let out = match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plain),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plain),
        32 => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plain),
        n => return Err(CryptoError::InvalidKeyLength(n)),
    };
    Ok(out)
}

/// AES-CBC で復号し、PKCS7 パディングを取り除く
///
/// 長さがブロック境界でない、またはパディングが壊れている場合は
/// `AuthenticationFailed` を返す。
pub fn cbc_decrypt(key: &[u8], iv: &[u8; BLOCK_LEN], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.is_empty() || data.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::AuthenticationFailed);
    }
    let result = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
        32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
        n => return Err(CryptoError::InvalidKeyLength(n)),
    };
    result.map_err(|_| CryptoError::AuthenticationFailed)
}
