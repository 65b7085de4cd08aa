use std::fmt;

use data_encoding::{BASE64URL_NOPAD, HEXLOWER};
use domain::SessionKey;
use rand::RngCore;
use ring::digest::{digest, SHA256};

const TOKEN_BYTES: usize = 32;

/// 客户端持有的原始会话令牌。
///
/// 服务端只保存它的 SHA-256 摘要（[`SessionKey`]），原文不落库。
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(BASE64URL_NOPAD.encode(&bytes))
    }

    /// 从 cookie 值还原；空值视为没有令牌。
    pub fn from_cookie(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            None
        } else {
            Some(Self(value.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn key(&self) -> SessionKey {
        let hash = digest(&SHA256, self.0.as_bytes());
        SessionKey::new(HEXLOWER.encode(hash.as_ref()))
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}
