use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use star_core::{
    models::{Role, UserToken},
    StarError, StarResult,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    name: String,
    email: String,
    roles: Vec<Role>,
    iat: i64,
    exp: i64,
}

/// 用户令牌与签名字符串之间的转换（HS256）
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_hours: i64,
}

impl TokenService {
    pub fn new(secret: &str, expiration_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_hours,
        }
    }

    pub fn issue(&self, token: &UserToken) -> StarResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: token.id.clone(),
            name: token.name.clone(),
            email: token.email.clone(),
            roles: token.roles.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.expiration_hours)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| StarError::Internal(format!("签发令牌失败: {e}")))
    }

    /// 校验签名与有效期
    pub fn verify(&self, raw: &str) -> StarResult<UserToken> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(raw, &self.decoding_key, &validation).map_err(|e| {
            debug!("令牌校验失败: {}", e);
            StarError::NotAuthorized(format!("无效的用户令牌: {e}"))
        })?;

        let claims = data.claims;
        Ok(UserToken::new(claims.sub, claims.name, claims.email, claims.roles))
    }
}
