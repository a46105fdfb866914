/// JWT access/refresh token issuing and verification
use crate::{
    account::Tokens,
    config::AuthConfig,
    db::{Account, Role},
    error::{AppError, AppResult},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Allowed clock skew when checking `exp`, in seconds
const LEEWAY_SECS: u64 = 30;

/// Identity claims embedded in both token kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token so rotation always yields a new value
    pub jti: String,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn label(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Signs and verifies token pairs. Access and refresh tokens use separate keys.
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: i64,
    refresh_ttl: i64,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
        }
    }

    /// Issue a fresh access/refresh pair for an account
    pub fn issue_pair(&self, account: &Account) -> AppResult<Tokens> {
        Ok(Tokens {
            access_token: self.sign(account, TokenKind::Access)?,
            refresh_token: self.sign(account, TokenKind::Refresh)?,
        })
    }

    fn sign(&self, account: &Account, kind: TokenKind) -> AppResult<String> {
        let (key, ttl) = match kind {
            TokenKind::Access => (&self.access_encoding, self.access_ttl),
            TokenKind::Refresh => (&self.refresh_encoding, self.refresh_ttl),
        };

        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: account.id.clone(),
            email: account.email.clone(),
            role: account.role,
            iat: now,
            exp: now + ttl,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, key).map_err(|e| {
            AppError::Jwt(format!("Failed to generate {} token: {}", kind.label(), e))
        })
    }

    /// Verify an access token's signature and expiry
    pub fn verify_access(&self, token: &str) -> AppResult<Claims> {
        self.verify(token, TokenKind::Access)
    }

    /// Verify a refresh token's signature and expiry
    pub fn verify_refresh(&self, token: &str) -> AppResult<Claims> {
        self.verify(token, TokenKind::Refresh)
    }

    fn verify(&self, token: &str, kind: TokenKind) -> AppResult<Claims> {
        let key = match kind {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<Claims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(kind = kind.label(), error = %e, "token verification failed");
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        AppError::Authentication("Token has expired".to_string())
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        AppError::Authentication("Invalid token signature".to_string())
                    }
                    _ => AppError::Authentication("Invalid token".to_string()),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ServerConfig, db::CertificationStatus};

    fn account() -> Account {
        let now = Utc::now();
        Account {
            id: "acc-1".to_string(),
            email: "a@x.com".to_string(),
            password_hash: "hash".to_string(),
            name: "A".to_string(),
            farm_size: None,
            crop_type: None,
            role: Role::Farmer,
            status: CertificationStatus::Pending,
            refresh_token_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&ServerConfig::for_testing().authentication)
    }

    #[test]
    fn test_pair_carries_identity() {
        let issuer = issuer();
        let tokens = issuer.issue_pair(&account()).unwrap();

        let access = issuer.verify_access(&tokens.access_token).unwrap();
        assert_eq!(access.sub, "acc-1");
        assert_eq!(access.email, "a@x.com");
        assert_eq!(access.role, Role::Farmer);

        let refresh = issuer.verify_refresh(&tokens.refresh_token).unwrap();
        assert_eq!(refresh.sub, "acc-1");
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn test_kinds_are_not_interchangeable() {
        let issuer = issuer();
        let tokens = issuer.issue_pair(&account()).unwrap();

        assert!(matches!(
            issuer.verify_access(&tokens.refresh_token),
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(
            issuer.verify_refresh(&tokens.access_token),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn test_consecutive_pairs_differ() {
        let issuer = issuer();
        let a = issuer.issue_pair(&account()).unwrap();
        let b = issuer.issue_pair(&account()).unwrap();
        assert_ne!(a.refresh_token, b.refresh_token);
        assert_ne!(a.access_token, b.access_token);
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = ServerConfig::for_testing().authentication;
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "acc-1".to_string(),
            email: "a@x.com".to_string(),
            role: Role::Farmer,
            iat: now - 7200,
            exp: now - 3600,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(config.access_token_secret.as_bytes()),
        )
        .unwrap();

        match issuer().verify_access(&token) {
            Err(AppError::Authentication(msg)) => assert!(msg.contains("expired")),
            other => panic!("Expected Authentication error, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            issuer().verify_access("not.a.jwt"),
            Err(AppError::Authentication(_))
        ));
    }
}
