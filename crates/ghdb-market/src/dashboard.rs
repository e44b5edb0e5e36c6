use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::documents::{ChatDoc, LoginHistoryDoc, ProductsDoc, RegistrationHistoryDoc, UsersDoc};
use crate::error::MarketResult;
use crate::marketplace::SharedClient;
use crate::records::{LoginRecord, LoginStatus, User};

/// Days an account counts as new on the admin view.
pub const NEW_USER_DAYS: i64 = 7;

/// Counters shown on the admin dashboard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: usize,
    pub active_users: usize,
    pub logins_today: usize,
    pub registrations_today: usize,
    pub products: usize,
    pub messages: usize,
}

/// Read-only summary over every document.
#[derive(Clone)]
pub struct Dashboard {
    client: SharedClient,
}

impl Dashboard {
    pub(crate) fn new(client: SharedClient) -> Self {
        Self { client }
    }

    // ---- Filters ----

    /// Accounts that can log in.
    pub async fn active_users(&self) -> MarketResult<Vec<User>> {
        let users = self.client.load::<UsersDoc>().await?.into_inner().users;
        Ok(users.into_iter().filter(User::is_active).collect())
    }

    /// Accounts registered within `window` before `now`, oldest first.
    pub async fn new_users(&self, now: DateTime<Utc>, window: Duration) -> MarketResult<Vec<User>> {
        let since = now - window;
        let users = self.client.load::<UsersDoc>().await?.into_inner().users;
        Ok(users.into_iter().filter(|u| u.register_date > since).collect())
    }

    /// Login history entries, successful or not, on the UTC day `day`.
    pub async fn logins_on(&self, day: NaiveDate) -> MarketResult<Vec<LoginRecord>> {
        self.logins_where(|r| r.login_time.date_naive() == day).await
    }

    /// Failed login attempts still in the history, most recent first.
    pub async fn failed_logins(&self) -> MarketResult<Vec<LoginRecord>> {
        self.logins_where(|r| r.status == LoginStatus::Failed).await
    }

    async fn logins_where<F>(&self, keep: F) -> MarketResult<Vec<LoginRecord>>
    where
        F: Fn(&LoginRecord) -> bool,
    {
        let history = self.client.load::<LoginHistoryDoc>().await?.into_inner();
        Ok(history.sessions.into_vec().into_iter().filter(|r| keep(r)).collect())
    }

    // ---- Counters ----

    /// Compute counters, with "today" meaning the UTC calendar day `today`.
    pub async fn stats(&self, today: NaiveDate) -> MarketResult<DashboardStats> {
        let users = self.client.load::<UsersDoc>().await?;
        let logins = self.client.load::<LoginHistoryDoc>().await?;
        let registrations = self.client.load::<RegistrationHistoryDoc>().await?;
        let products = self.client.load::<ProductsDoc>().await?;
        let chat = self.client.load::<ChatDoc>().await?;

        let stats = DashboardStats {
            total_users: users.users.len(),
            active_users: users.users.iter().filter(|u| u.is_active()).count(),
            logins_today: logins
                .sessions
                .iter()
                .filter(|r| r.status == LoginStatus::Success && r.login_time.date_naive() == today)
                .count(),
            registrations_today: registrations
                .registrations
                .iter()
                .filter(|r| r.register_time.date_naive() == today)
                .count(),
            products: products.products.len(),
            messages: chat.messages.len(),
        };
        debug!(?stats, %today, "dashboard stats");
        Ok(stats)
    }
}

impl std::fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dashboard").finish_non_exhaustive()
    }
}
