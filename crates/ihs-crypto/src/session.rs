//! セッション単位の暗号状態
//!
//! 送信・受信それぞれのシーケンス番号を保持し、暗号化メッセージごとに
//! ちょうど 1 だけ進める。セッションが続く限りリセットも再利用もしない。

use crate::error::CryptoError;
use crate::frame::{decrypt_data_payload, decrypt_frame, encrypt_frame};
use crate::{auth_token, SessionKey};

/// 制御チャンネルの暗号セッション
pub struct CryptoSession {
    key: SessionKey,
    /// 次に送信する暗号化メッセージのシーケンス番号
    send_seq: u64,
    /// 次に受信するはずの暗号化メッセージのシーケンス番号
    recv_seq: u64,
}

impl CryptoSession {
    /// ペアリングで得たセッション鍵から初期化する
    pub fn new(key: SessionKey) -> Self {
        CryptoSession {
            key,
            send_seq: 0,
            recv_seq: 0,
        }
    }

    /// メッセージ本体を暗号化し、送信シーケンス番号を進める
    ///
    /// 暗号化に失敗した場合、シーケンス番号は消費しない。
    pub fn encrypt_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let encrypted = self.seal_message(payload)?;
        self.commit_send();
        Ok(encrypted)
    }

    /// 送信シーケンス番号を進めずに暗号化する
    ///
    /// 送信が確定した時点で [`commit_send`](Self::commit_send) を呼ぶ。
    /// 呼ばなければ同じ番号で次のメッセージを暗号化する。
    pub fn seal_message(&self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        encrypt_frame(payload, self.key.as_bytes(), self.send_seq)
    }

    /// 封をしたメッセージを送ったことにして送信シーケンス番号を進める
    pub fn commit_send(&mut self) {
        self.send_seq += 1;
    }

    /// 受信した暗号文を復号し、受信シーケンス番号を進める
    ///
    /// # エラー
    /// `AuthenticationFailed` / `SequenceMismatch` はどちらもセッション致命的。
    /// 失敗時はシーケンス番号を進めない。
    pub fn decrypt_message(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let plain = decrypt_frame(ciphertext, self.key.as_bytes(), Some(self.recv_seq))?;
        self.recv_seq += 1;
        Ok(plain)
    }

    /// データチャンネル（全ゼロ IV）のペイロードを復号する
    pub fn decrypt_data(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        decrypt_data_payload(data, self.key.as_bytes())
    }

    /// 認証リクエストに載せるトークン
    pub fn auth_token(&self) -> Result<[u8; 32], CryptoError> {
        auth_token(self.key.as_bytes())
    }

    /// 次の送信シーケンス番号
    pub fn send_seq(&self) -> u64 {
        self.send_seq
    }

    /// 次の受信シーケンス番号
    pub fn recv_seq(&self) -> u64 {
        self.recv_seq
    }
}
