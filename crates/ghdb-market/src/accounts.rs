use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ghdb_crypto::PasswordDigest;

use crate::config::Limits;
use crate::context::ClientContext;
use crate::documents::{AdminConfig, LoginHistoryDoc, RegistrationHistoryDoc, UsersDoc};
use crate::error::{MarketError, MarketResult};
use crate::marketplace::SharedClient;
use crate::records::{LoginRecord, LoginStatus, RegistrationRecord, Role, User, UserStatus};

/// Canonical form of an email address: trimmed, lowercase.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> MarketResult<()> {
    let invalid = || MarketError::InvalidEmail(email.to_string());
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() => Ok(()),
        _ => Err(invalid()),
    }
}

fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

fn check_credentials(users: &UsersDoc, email: &str, password: &str) -> MarketResult<User> {
    let user = users
        .by_email(email)
        .filter(|u| u.is_active())
        .ok_or_else(|| MarketError::UnknownUser(email.to_string()))?;
    if !user.password.verify(password) {
        debug!(user_id = %user.id, "password mismatch");
        return Err(MarketError::InvalidCredentials);
    }
    Ok(user.clone())
}

fn login_record(user_id: Uuid, ctx: &ClientContext, is_admin: bool, status: LoginStatus) -> LoginRecord {
    let browser = ctx.browser();
    LoginRecord {
        user_id,
        session_id: Uuid::now_v7(),
        login_time: Utc::now(),
        ip_address: ctx.ip_address.clone(),
        user_agent: ctx.user_agent.clone(),
        device_type: ctx.device_type(),
        browser: browser.browser,
        browser_version: browser.version,
        platform: browser.platform,
        location: ctx.location.clone(),
        is_admin,
        status,
    }
}

/// Registration, authentication and the login/registration histories.
#[derive(Clone)]
pub struct Accounts {
    client: SharedClient,
    limits: Limits,
    seed_admins: Arc<[String]>,
    admin_failures: Arc<Mutex<HashMap<String, u32>>>,
}

impl Accounts {
    pub(crate) fn new(
        client: SharedClient,
        limits: Limits,
        seed_admins: Arc<[String]>,
        admin_failures: Arc<Mutex<HashMap<String, u32>>>,
    ) -> Self {
        Self {
            client,
            limits,
            seed_admins,
            admin_failures,
        }
    }

    // ---- Registration ----

    /// Create an account.
    ///
    /// The duplicate-email check runs inside the write loop, so of two
    /// concurrent registrations for one address exactly one succeeds and the
    /// other gets [`MarketError::EmailTaken`]. The registration history is a
    /// separate write; if it fails the account still exists.
    pub async fn register(&self, email: &str, password: &str, ctx: &ClientContext) -> MarketResult<User> {
        let email = normalize_email(email);
        validate_email(&email)?;
        if password.chars().count() < self.limits.min_password_len {
            return Err(MarketError::WeakPassword {
                min: self.limits.min_password_len,
            });
        }

        let user = User {
            id: Uuid::now_v7(),
            username: local_part(&email).to_string(),
            email,
            password: PasswordDigest::derive(password),
            register_date: Utc::now(),
            last_login: None,
            login_count: 0,
            status: UserStatus::Active,
            role: Role::User,
            avatar: String::new(),
            verified: false,
        };

        self.client
            .update::<UsersDoc, _, MarketError, _>(|doc| {
                if doc.by_email(&user.email).is_some() {
                    return Err(MarketError::EmailTaken(user.email.clone()));
                }
                doc.users.push(user.clone());
                Ok(())
            })
            .await?;
        info!(user_id = %user.id, email = %user.email, "registered user");

        let record = RegistrationRecord {
            user_id: user.id,
            user_email: user.email.clone(),
            register_time: user.register_date,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            device_type: ctx.device_type(),
            location: ctx.location.clone(),
        };
        if let Err(e) = self
            .client
            .append_capped::<RegistrationHistoryDoc, _, _>(
                record,
                self.limits.registration_history_cap,
                |d| &mut d.registrations,
            )
            .await
        {
            warn!(user_id = %user.id, error = %e, "account created but registration history write failed");
        }
        Ok(user)
    }

    // ---- Authentication ----

    /// Check credentials. The account must exist and be active.
    ///
    /// A miss against the cached users document is re-checked against the
    /// store before it is reported.
    pub async fn verify(&self, email: &str, password: &str) -> MarketResult<User> {
        let email = normalize_email(email);
        let cached = self.client.load::<UsersDoc>().await?;
        match check_credentials(&cached, &email, password) {
            Err(MarketError::UnknownUser(_) | MarketError::InvalidCredentials) => {
                debug!(email = %email, "credentials not matched in cache, re-reading users");
                let fresh = self.client.refresh::<UsersDoc>().await?;
                check_credentials(&fresh, &email, password)
            }
            outcome => outcome,
        }
    }

    /// Verify credentials and record a successful login.
    pub async fn login(&self, email: &str, password: &str, ctx: &ClientContext) -> MarketResult<LoginRecord> {
        let user = self.verify(email, password).await?;
        self.record_login(user.id, ctx, false).await
    }

    /// Administrator login.
    ///
    /// After `maxLoginAttempts` consecutive failures for an address, further
    /// attempts are refused until a success resets the count. Counts are
    /// kept in process.
    pub async fn admin_login(
        &self,
        email: &str,
        password: &str,
        ctx: &ClientContext,
    ) -> MarketResult<LoginRecord> {
        let email = normalize_email(email);
        let mut config = self.client.load::<AdminConfig>().await?.into_inner();
        if !self.is_admin_in(&config, &email) {
            config = self.client.refresh::<AdminConfig>().await?.into_inner();
        }
        let max = config.security.max_login_attempts;

        let failures = self.failures(&email);
        if max > 0 && failures >= max {
            warn!(email = %email, failures, "admin login locked out");
            return Err(MarketError::TooManyAttempts {
                email,
                attempts: failures,
            });
        }
        if !self.is_admin_in(&config, &email) {
            return Err(MarketError::NotAdmin(email));
        }

        match self.verify(&email, password).await {
            Ok(user) => {
                self.reset_failures(&email);
                self.record_login(user.id, ctx, true).await
            }
            Err(e @ (MarketError::InvalidCredentials | MarketError::UnknownUser(_))) => {
                let attempts = self.note_failure(&email);
                warn!(email = %email, attempts, "admin login failed");
                self.record_failed_login(&email, ctx).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Whether `email` is an administrator.
    pub async fn is_admin(&self, email: &str) -> MarketResult<bool> {
        let config = self.client.load::<AdminConfig>().await?;
        Ok(self.is_admin_in(&config, &normalize_email(email)))
    }

    fn is_admin_in(&self, config: &AdminConfig, email: &str) -> bool {
        config
            .security
            .admin_emails
            .iter()
            .chain(self.seed_admins.iter())
            .any(|a| normalize_email(a) == email)
    }

    fn failures(&self, email: &str) -> u32 {
        let map = self.admin_failures.lock().expect("lock poisoned");
        map.get(email).copied().unwrap_or(0)
    }

    fn note_failure(&self, email: &str) -> u32 {
        let mut map = self.admin_failures.lock().expect("lock poisoned");
        let count = map.entry(email.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn reset_failures(&self, email: &str) {
        self.admin_failures.lock().expect("lock poisoned").remove(email);
    }

    // ---- Histories ----

    /// Prepend a login record, then bump the user's last-login fields.
    ///
    /// The last-login update runs even if the history write failed.
    pub async fn record_login(
        &self,
        user_id: Uuid,
        ctx: &ClientContext,
        is_admin: bool,
    ) -> MarketResult<LoginRecord> {
        let record = login_record(user_id, ctx, is_admin, LoginStatus::Success);
        let appended = self
            .client
            .append_capped::<LoginHistoryDoc, _, _>(
                record.clone(),
                self.limits.login_history_cap,
                |d| &mut d.sessions,
            )
            .await;
        if let Err(e) = self.touch_last_login(user_id).await {
            warn!(user_id = %user_id, error = %e, "failed to update last login");
        }
        appended?;

        info!(user_id = %user_id, session_id = %record.session_id, is_admin, "login recorded");
        Ok(record)
    }

    /// Append a failed admin attempt for a known account. Best effort.
    async fn record_failed_login(&self, email: &str, ctx: &ClientContext) {
        let user_id = match self.find_user(email).await {
            Ok(Some(user)) => user.id,
            Ok(None) => return,
            Err(e) => {
                warn!(email = %email, error = %e, "failed login not recorded");
                return;
            }
        };
        let record = login_record(user_id, ctx, true, LoginStatus::Failed);
        if let Err(e) = self
            .client
            .append_capped::<LoginHistoryDoc, _, _>(record, self.limits.login_history_cap, |d| {
                &mut d.sessions
            })
            .await
        {
            warn!(user_id = %user_id, error = %e, "failed login not recorded");
        }
    }

    /// Set `lastLogin` to now and increment `loginCount`.
    pub async fn touch_last_login(&self, user_id: Uuid) -> MarketResult<User> {
        let user = self
            .client
            .update::<UsersDoc, _, MarketError, _>(|doc| {
                let user = doc
                    .by_id_mut(user_id)
                    .ok_or_else(|| MarketError::UnknownUser(user_id.to_string()))?;
                user.last_login = Some(Utc::now());
                user.login_count += 1;
                Ok(user.clone())
            })
            .await?;
        Ok(user)
    }

    /// Enable or disable an account.
    pub async fn set_status(&self, user_id: Uuid, status: UserStatus) -> MarketResult<User> {
        let user = self
            .client
            .update::<UsersDoc, _, MarketError, _>(|doc| {
                let user = doc
                    .by_id_mut(user_id)
                    .ok_or_else(|| MarketError::UnknownUser(user_id.to_string()))?;
                user.status = status;
                Ok(user.clone())
            })
            .await?;
        info!(user_id = %user_id, ?status, "account status changed");
        Ok(user)
    }

    // ---- Queries ----

    pub async fn users(&self) -> MarketResult<Vec<User>> {
        Ok(self.client.load::<UsersDoc>().await?.into_inner().users)
    }

    pub async fn find_user(&self, email: &str) -> MarketResult<Option<User>> {
        let email = normalize_email(email);
        Ok(self.client.load::<UsersDoc>().await?.by_email(&email).cloned())
    }

    /// Login history, most recent first.
    pub async fn login_history(&self) -> MarketResult<Vec<LoginRecord>> {
        Ok(self
            .client
            .load::<LoginHistoryDoc>()
            .await?
            .into_inner()
            .sessions
            .into_vec())
    }

    /// Registration history, most recent first.
    pub async fn registration_history(&self) -> MarketResult<Vec<RegistrationRecord>> {
        Ok(self
            .client
            .load::<RegistrationHistoryDoc>()
            .await?
            .into_inner()
            .registrations
            .into_vec())
    }
}

impl std::fmt::Debug for Accounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accounts")
            .field("limits", &self.limits)
            .field("seed_admins", &self.seed_admins.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use crate::marketplace::Marketplace;

    fn ctx() -> ClientContext {
        ClientContext::new(
            "198.51.100.7",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/124.0.0.0 Safari/537.36",
        )
    }

    fn market_with_admin(admin: &str) -> Marketplace {
        let config = MarketConfig {
            seed_admin_emails: vec![admin.to_string()],
            ..MarketConfig::default()
        };
        Marketplace::open(&config).unwrap()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn email_validation() {
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("first.last@mail.example.com").is_ok());
        for bad in ["", "plain", "@b.co", "a@", "a@b", "a@.co", "a@b.", "a b@c.co", "a@b@c.co"] {
            assert!(validate_email(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn register_creates_user_and_history() {
        let market = Marketplace::open(&MarketConfig::default()).unwrap();
        let accounts = market.accounts();

        let user = accounts.register("Alice@Example.com", "secret1", &ctx()).await.unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.username, "alice");
        assert_eq!(user.role, Role::User);
        assert!(user.last_login.is_none());

        let users = accounts.users().await.unwrap();
        assert_eq!(users.len(), 1);

        let history = accounts.registration_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_id, user.id);
        assert_eq!(history[0].ip_address, "198.51.100.7");
    }

    #[tokio::test]
    async fn register_rejects_duplicates_and_bad_input() {
        let market = Marketplace::open(&MarketConfig::default()).unwrap();
        let accounts = market.accounts();
        accounts.register("bob@example.com", "secret1", &ctx()).await.unwrap();

        let dup = accounts.register("BOB@example.com", "secret2", &ctx()).await.unwrap_err();
        assert!(matches!(dup, MarketError::EmailTaken(_)));

        let weak = accounts.register("carol@example.com", "12345", &ctx()).await.unwrap_err();
        assert!(matches!(weak, MarketError::WeakPassword { min: 6 }));

        let bad = accounts.register("carol", "secret1", &ctx()).await.unwrap_err();
        assert!(matches!(bad, MarketError::InvalidEmail(_)));

        assert_eq!(accounts.users().await.unwrap().len(), 1);
    }

    // -----------------------------------------------------------------------
    // Authentication
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn login_records_history_and_bumps_counters() {
        let market = Marketplace::open(&MarketConfig::default()).unwrap();
        let accounts = market.accounts();
        let user = accounts.register("dana@example.com", "secret1", &ctx()).await.unwrap();

        let record = accounts.login("dana@example.com", "secret1", &ctx()).await.unwrap();
        assert_eq!(record.user_id, user.id);
        assert_eq!(record.browser, "Chrome");
        assert_eq!(record.platform, "Windows");
        assert!(!record.is_admin);

        let stored = accounts.find_user("dana@example.com").await.unwrap().unwrap();
        assert_eq!(stored.login_count, 1);
        assert!(stored.last_login.is_some());

        let history = accounts.login_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].session_id, record.session_id);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user() {
        let market = Marketplace::open(&MarketConfig::default()).unwrap();
        let accounts = market.accounts();
        accounts.register("erin@example.com", "secret1", &ctx()).await.unwrap();

        let wrong = accounts.login("erin@example.com", "secret2", &ctx()).await.unwrap_err();
        assert!(matches!(wrong, MarketError::InvalidCredentials));

        let unknown = accounts.login("nobody@example.com", "secret1", &ctx()).await.unwrap_err();
        assert!(matches!(unknown, MarketError::UnknownUser(_)));

        assert!(accounts.login_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_accounts_cannot_log_in() {
        let market = Marketplace::open(&MarketConfig::default()).unwrap();
        let accounts = market.accounts();
        let user = accounts.register("fay@example.com", "secret1", &ctx()).await.unwrap();

        accounts.set_status(user.id, UserStatus::Disabled).await.unwrap();
        let err = accounts.login("fay@example.com", "secret1", &ctx()).await.unwrap_err();
        assert!(matches!(err, MarketError::UnknownUser(_)));

        accounts.set_status(user.id, UserStatus::Active).await.unwrap();
        assert!(accounts.login("fay@example.com", "secret1", &ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn touch_unknown_user_writes_nothing() {
        let market = Marketplace::open(&MarketConfig::default()).unwrap();
        let err = market.accounts().touch_last_login(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, MarketError::UnknownUser(_)));
        assert!(market.accounts().users().await.unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Administrators
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn seeded_admin_can_log_in() {
        let market = market_with_admin("root@example.com");
        let accounts = market.accounts();
        accounts.register("root@example.com", "secret1", &ctx()).await.unwrap();
        accounts.register("user@example.com", "secret1", &ctx()).await.unwrap();

        assert!(accounts.is_admin("ROOT@example.com").await.unwrap());
        assert!(!accounts.is_admin("user@example.com").await.unwrap());

        let record = accounts.admin_login("root@example.com", "secret1", &ctx()).await.unwrap();
        assert!(record.is_admin);

        let err = accounts.admin_login("user@example.com", "secret1", &ctx()).await.unwrap_err();
        assert!(matches!(err, MarketError::NotAdmin(_)));
    }

    #[tokio::test]
    async fn admin_lockout_after_max_attempts() {
        let market = market_with_admin("root@example.com");
        let accounts = market.accounts();
        accounts.register("root@example.com", "secret1", &ctx()).await.unwrap();

        for _ in 0..5 {
            let err = accounts.admin_login("root@example.com", "wrong!", &ctx()).await.unwrap_err();
            assert!(matches!(err, MarketError::InvalidCredentials));
        }
        let err = accounts.admin_login("root@example.com", "secret1", &ctx()).await.unwrap_err();
        assert!(matches!(err, MarketError::TooManyAttempts { attempts: 5, .. }));
    }

    #[tokio::test]
    async fn failed_admin_attempt_is_recorded_for_known_accounts() {
        let market = market_with_admin("root@example.com");
        let accounts = market.accounts();
        let root = accounts.register("root@example.com", "secret1", &ctx()).await.unwrap();

        accounts.admin_login("root@example.com", "wrong!", &ctx()).await.unwrap_err();
        accounts.admin_login("ghost@example.com", "wrong!", &ctx()).await.unwrap_err();

        let history = accounts.login_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_id, root.id);
        assert_eq!(history[0].status, LoginStatus::Failed);
        assert!(history[0].is_admin);

        let stored = accounts.find_user("root@example.com").await.unwrap().unwrap();
        assert_eq!(stored.login_count, 0);
    }

    // -----------------------------------------------------------------------
    // Independent clients over one store
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn verify_sees_accounts_created_by_another_client() {
        let store: Arc<dyn ghdb_store::VersionedStore> = Arc::new(ghdb_store::InMemoryStore::new());
        let first = Marketplace::with_store(Arc::clone(&store), &MarketConfig::default());
        let second = Marketplace::with_store(store, &MarketConfig::default());

        // Warm the first client's cache with an empty users document.
        assert!(first.accounts().users().await.unwrap().is_empty());
        second.accounts().register("gil@example.com", "secret1", &ctx()).await.unwrap();

        let record = first.accounts().login("gil@example.com", "secret1", &ctx()).await.unwrap();
        let user = second.accounts().find_user("gil@example.com").await.unwrap().unwrap();
        assert_eq!(record.user_id, user.id);
    }

    #[tokio::test]
    async fn admin_added_by_another_client_can_log_in() {
        let store: Arc<dyn ghdb_store::VersionedStore> = Arc::new(ghdb_store::InMemoryStore::new());
        let first = Marketplace::with_store(Arc::clone(&store), &MarketConfig::default());
        let seeded = MarketConfig {
            seed_admin_emails: vec!["ops@example.com".into()],
            ..MarketConfig::default()
        };
        let second = Marketplace::with_store(store, &seeded);

        first.accounts().register("ops@example.com", "secret1", &ctx()).await.unwrap();
        assert!(!first.accounts().is_admin("ops@example.com").await.unwrap());
        second.bootstrap().await.unwrap();

        let record = first.accounts().admin_login("ops@example.com", "secret1", &ctx()).await.unwrap();
        assert!(record.is_admin);
    }

    #[tokio::test]
    async fn admin_success_resets_failures() {
        let market = market_with_admin("root@example.com");
        let accounts = market.accounts();
        accounts.register("root@example.com", "secret1", &ctx()).await.unwrap();

        for _ in 0..4 {
            accounts.admin_login("root@example.com", "wrong!", &ctx()).await.unwrap_err();
        }
        accounts.admin_login("root@example.com", "secret1", &ctx()).await.unwrap();
        for _ in 0..4 {
            accounts.admin_login("root@example.com", "wrong!", &ctx()).await.unwrap_err();
        }
        assert!(accounts.admin_login("root@example.com", "secret1", &ctx()).await.is_ok());
    }
}
