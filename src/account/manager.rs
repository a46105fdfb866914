/// Account manager: registration, credential checks and token rotation
use crate::{
    account::{
        normalize_email, password, AuthResponse, Claims, CreateAdminRequest, LoginRequest,
        MessageResponse, RegisterRequest, TokenIssuer, Tokens, User,
    },
    config::{AuthConfig, SeedAdminConfig},
    db::{Account, AccountStore, CertificationStatus, NewAccount, Role},
    error::{AppError, AppResult},
    metrics,
};
use validator::Validate;

/// Verified against when the email is unknown so both login failures cost the same
const DUMMY_PASSWORD_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$CTFhFdXPJO1aFaMaO6Mm5c8y7cJHAph8ArZWb2GRPPc";

/// Account manager service
pub struct AccountManager {
    store: AccountStore,
    tokens: TokenIssuer,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(store: AccountStore, config: &AuthConfig) -> Self {
        Self {
            store,
            tokens: TokenIssuer::new(config),
        }
    }

    /// Register a farmer account and open its first session
    pub async fn register(&self, req: RegisterRequest) -> AppResult<AuthResponse> {
        req.validate()?;

        let email = normalize_email(&req.email);
        if self.store.email_exists(&email).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let password_hash = password::hash_secret(&req.password)?;
        let account = self
            .store
            .insert(NewAccount {
                email,
                password_hash,
                name: req.name.trim().to_string(),
                farm_size: Some(req.farm_size),
                crop_type: Some(req.crop_type.trim().to_string()),
                role: Role::Farmer,
                status: CertificationStatus::Pending,
            })
            .await?;

        tracing::info!(account_id = %account.id, "farmer registered");
        metrics::record_auth_event("register", true);

        self.open_session(account).await
    }

    /// Create an admin account. Callers must have passed the bootstrap guard.
    pub async fn create_admin(&self, req: CreateAdminRequest) -> AppResult<AuthResponse> {
        req.validate()?;

        let email = normalize_email(&req.email);
        if self.store.email_exists(&email).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let account = self.insert_admin(email, &req.password, req.name.trim()).await?;
        tracing::info!(account_id = %account.id, "admin account created");
        metrics::record_auth_event("create_admin", true);

        self.open_session(account).await
    }

    /// Create the configured admin if no account holds its email yet.
    ///
    /// Returns `true` when an account was created.
    pub async fn seed_admin(&self, seed: &SeedAdminConfig) -> AppResult<bool> {
        let email = normalize_email(&seed.email);
        if self.store.email_exists(&email).await? {
            tracing::info!("seed admin already exists, skipping");
            return Ok(false);
        }

        let account = self.insert_admin(email, &seed.password, &seed.name).await?;
        tracing::info!(account_id = %account.id, "seed admin created");
        Ok(true)
    }

    async fn insert_admin(&self, email: String, password: &str, name: &str) -> AppResult<Account> {
        let password_hash = password::hash_secret(password)?;
        self.store
            .insert(NewAccount {
                email,
                password_hash,
                name: name.to_string(),
                farm_size: None,
                crop_type: None,
                role: Role::Admin,
                status: CertificationStatus::Certified,
            })
            .await
    }

    /// Authenticate with email and password
    pub async fn login(&self, req: LoginRequest) -> AppResult<AuthResponse> {
        // Malformed input fails like any other bad credential
        let account = match req.validate() {
            Ok(()) => self.store.find_by_email(&normalize_email(&req.email)).await?,
            Err(_) => None,
        };

        let verified = match &account {
            Some(account) => password::verify_secret(&account.password_hash, &req.password),
            None => {
                password::verify_secret(DUMMY_PASSWORD_HASH, &req.password);
                false
            }
        };

        let account = match account {
            Some(account) if verified => account,
            _ => {
                tracing::warn!("login rejected: invalid credentials");
                metrics::record_auth_event("login", false);
                return Err(AppError::Authentication("Invalid credentials".to_string()));
            }
        };

        tracing::info!(account_id = %account.id, role = %account.role, "login succeeded");
        metrics::record_auth_event("login", true);

        self.open_session(account).await
    }

    /// Rotate the token pair for an account holding a valid refresh token
    pub async fn refresh_tokens(&self, account_id: &str, refresh_token: &str) -> AppResult<Tokens> {
        let account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::Authentication("Access denied".to_string()))?;

        let stored_hash = account.refresh_token_hash.as_deref().ok_or_else(|| {
            metrics::record_auth_event("refresh", false);
            AppError::Authentication("Access denied".to_string())
        })?;

        if !password::verify_secret(stored_hash, refresh_token) {
            tracing::warn!(account_id = %account.id, "stale or foreign refresh token presented");
            metrics::record_auth_event("refresh", false);
            return Err(AppError::Authentication("Access denied".to_string()));
        }

        let tokens = self.tokens.issue_pair(&account)?;
        self.store_refresh_hash(&account.id, &tokens.refresh_token).await?;

        tracing::debug!(account_id = %account.id, "token pair rotated");
        metrics::record_auth_event("refresh", true);

        Ok(tokens)
    }

    /// Clear the stored refresh-token hash. Idempotent.
    pub async fn logout(&self, account_id: &str) -> AppResult<MessageResponse> {
        self.store.set_refresh_token_hash(account_id, None).await?;
        tracing::info!(account_id, "logged out");
        metrics::record_auth_event("logout", true);

        Ok(MessageResponse {
            message: "Logged out successfully".to_string(),
        })
    }

    /// Stateless access-token validation; no store lookup
    pub fn validate_access_token(&self, token: &str) -> AppResult<Claims> {
        self.tokens.verify_access(token)
    }

    /// Signature/expiry check for a presented refresh token
    pub fn validate_refresh_token(&self, token: &str) -> AppResult<Claims> {
        self.tokens.verify_refresh(token)
    }

    async fn open_session(&self, account: Account) -> AppResult<AuthResponse> {
        let tokens = self.tokens.issue_pair(&account)?;
        self.store_refresh_hash(&account.id, &tokens.refresh_token).await?;

        Ok(AuthResponse {
            tokens,
            user: User::from(account),
        })
    }

    async fn store_refresh_hash(&self, account_id: &str, refresh_token: &str) -> AppResult<()> {
        let hash = password::hash_secret(refresh_token)?;
        self.store
            .set_refresh_token_hash(account_id, Some(&hash))
            .await?;
        Ok(())
    }
}
