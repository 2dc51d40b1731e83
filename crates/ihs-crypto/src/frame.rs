//! シーケンス番号に束縛されたフレーム暗号化
//!
//! ## 暗号文の構造
//! ```text
//! [iv: 16bytes][AES-CBC-PKCS7( [sequence: u64 LE][payload...] )]
//!
//! iv = HMAC-MD5(key, [sequence: u64 LE][payload...])
//! ```
//!
//! IV がそのまま MAC を兼ねるため、復号側は平文から IV を再計算して検証する。

use crate::cipher::{cbc_decrypt, cbc_encrypt, BLOCK_LEN};
use crate::error::CryptoError;
use crate::iv::{derive_iv, verify_iv};

/// 平文先頭に埋め込むシーケンス番号の長さ
pub const SEQUENCE_LEN: usize = 8;

/// 最小の暗号文長（IV + 1 ブロック）
pub const MIN_CIPHERTEXT_LEN: usize = BLOCK_LEN * 2;

/// ペイロードを暗号化する
///
/// # 引数
/// - `payload`: 暗号化するメッセージ本体（メッセージ種別バイトは含まない）
/// - `key`: セッション鍵
/// - `sequence`: 送信シーケンス番号
pub fn encrypt_frame(payload: &[u8], key: &[u8], sequence: u64) -> Result<Vec<u8>, CryptoError> {
    let mut plain = Vec::with_capacity(SEQUENCE_LEN + payload.len());
    plain.extend_from_slice(&sequence.to_le_bytes());
    plain.extend_from_slice(payload);

    let iv = derive_iv(key, &plain)?;
    let cipher = cbc_encrypt(key, &iv, &plain)?;

    let mut out = Vec::with_capacity(BLOCK_LEN + cipher.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&cipher);
    Ok(out)
}

/// 暗号文を復号し、シーケンス番号を検証する
///
/// # 引数
/// - `ciphertext`: `[iv][cipher body]`
/// - `key`: セッション鍵
/// - `expected_sequence`: 期待するシーケンス番号。`None` なら検証しない
///
/// # エラー
/// - `CryptoError::AuthenticationFailed`: 長さ・パディング・HMAC のいずれかが不正
/// - `CryptoError::SequenceMismatch`: 埋め込まれた番号が期待値と異なる
pub fn decrypt_frame(
    ciphertext: &[u8],
    key: &[u8],
    expected_sequence: Option<u64>,
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < MIN_CIPHERTEXT_LEN {
        return Err(CryptoError::AuthenticationFailed);
    }

    let mut iv = [0u8; BLOCK_LEN];
    iv.copy_from_slice(&ciphertext[..BLOCK_LEN]);

    let plain = cbc_decrypt(key, &iv, &ciphertext[BLOCK_LEN..])?;
    verify_iv(key, &plain, &iv)?;

    if plain.len() < SEQUENCE_LEN {
        return Err(CryptoError::AuthenticationFailed);
    }
    let mut seq_bytes = [0u8; SEQUENCE_LEN];
    seq_bytes.copy_from_slice(&plain[..SEQUENCE_LEN]);
    let actual = u64::from_le_bytes(seq_bytes);

    if let Some(expected) = expected_sequence {
        if actual != expected {
            return Err(CryptoError::SequenceMismatch { expected, actual });
        }
    }

    Ok(plain[SEQUENCE_LEN..].to_vec())
}

/// データチャンネルの暗号化ペイロードを復号する
///
/// データチャンネルはシーケンス番号を使わず、全ゼロ IV とセッション鍵で
/// AES-CBC 暗号化されている。ホスト側の挙動をそのまま再現する。
pub fn decrypt_data_payload(data: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    cbc_decrypt(key, &[0u8; BLOCK_LEN], data).map_err(|e| match e {
        CryptoError::InvalidKeyLength(n) => CryptoError::InvalidKeyLength(n),
        _ => CryptoError::DataDecryptionFailed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY: [u8; 16] = [0x5Au8; 16];

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let encrypted = encrypt_frame(b"negotiation", &KEY, 3).unwrap();
        let plain = decrypt_frame(&encrypted, &KEY, Some(3)).unwrap();
        assert_eq!(plain, b"negotiation");
    }

    #[test]
    fn test_layout_iv_prefix() {
        let encrypted = encrypt_frame(b"", &KEY, 0).unwrap();
        // IV(16) + [seq 8 bytes + padding 8 bytes]
        assert_eq!(encrypted.len(), 32);
        let iv = derive_iv(&KEY, &0u64.to_le_bytes()).unwrap();
        assert_eq!(&encrypted[..16], &iv);
    }

    #[test]
    fn test_sequence_binding() {
        let encrypted = encrypt_frame(b"payload", &KEY, 10).unwrap();
        assert_eq!(
            decrypt_frame(&encrypted, &KEY, Some(11)),
            Err(CryptoError::SequenceMismatch {
                expected: 11,
                actual: 10
            })
        );
    }

    #[test]
    fn test_sequence_check_skipped() {
        let encrypted = encrypt_frame(b"payload", &KEY, 10).unwrap();
        assert_eq!(decrypt_frame(&encrypted, &KEY, None).unwrap(), b"payload");
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = encrypt_frame(b"payload", &KEY, 0).unwrap();
        let result = decrypt_frame(&encrypted, &[0x11u8; 16], Some(0));
        assert_eq!(result, Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn test_too_short_fails() {
        assert_eq!(
            decrypt_frame(&[0u8; 20], &KEY, None),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_data_payload_zero_iv() {
        let cipher = cbc_encrypt(&KEY, &[0u8; BLOCK_LEN], b"nal unit").unwrap();
        assert_eq!(decrypt_data_payload(&cipher, &KEY).unwrap(), b"nal unit");
        assert_eq!(
            decrypt_data_payload(&cipher[..15], &KEY),
            Err(CryptoError::DataDecryptionFailed)
        );
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            payload in prop::collection::vec(any::<u8>(), 0..512),
            key in prop::array::uniform16(any::<u8>()),
            seq in any::<u64>(),
        ) {
            let encrypted = encrypt_frame(&payload, &key, seq).unwrap();
            prop_assert_eq!(decrypt_frame(&encrypted, &key, Some(seq)).unwrap(), payload);
        }

        #[test]
        fn prop_tamper_detected(
            payload in prop::collection::vec(any::<u8>(), 0..128),
            seq in 0u64..1_000_000,
            bit in any::<prop::sample::Index>(),
        ) {
            let mut encrypted = encrypt_frame(&payload, &KEY, seq).unwrap();
            let bit_index = bit.index(encrypted.len() * 8);
            encrypted[bit_index / 8] ^= 1 << (bit_index % 8);
            prop_assert_eq!(
                decrypt_frame(&encrypted, &KEY, Some(seq)),
                Err(CryptoError::AuthenticationFailed)
            );
        }
    }
}
