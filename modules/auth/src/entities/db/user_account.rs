use std::future::Future;
use std::sync::Arc;

use compact_str::CompactString;
use framework::sqlx::DatabaseProcessor;
use kanau::processor::Processor;
use tracing::instrument;
use uuid::Uuid;

/// A user as known to the external identity service. Read-only from this workspace.
#[derive(Debug, Clone, Eq, PartialEq, sqlx::FromRow)]
pub struct UserAccount {
    pub id: Uuid,
    pub email: String,
    pub first_name: CompactString,
    pub last_name: CompactString,
    pub role: UserRole,
    pub created_at: time::PrimitiveDateTime,
    pub updated_at: time::PrimitiveDateTime,
}

impl UserAccount {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, serde::Serialize, serde::Deserialize,
)]
#[sqlx(type_name = "auth.user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Customer,
    #[serde(alias = "agent")]
    Driver,
    Admin,
}

/// Read access to user accounts, by whatever backend holds them.
pub trait UserDirectory: Send + Sync {
    fn find_user(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<UserAccount>, framework::Error>> + Send;

    fn find_users(
        &self,
        ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<UserAccount>, framework::Error>> + Send;
}

impl<T: UserDirectory> UserDirectory for Arc<T> {
    fn find_user(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<UserAccount>, framework::Error>> + Send {
        (**self).find_user(id)
    }

    fn find_users(
        &self,
        ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<UserAccount>, framework::Error>> + Send {
        (**self).find_users(ids)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FindUserAccountById {
    pub id: Uuid,
}

impl Processor<FindUserAccountById> for DatabaseProcessor {
    type Output = Option<UserAccount>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:FindUserAccountById", err)]
    async fn process(&self, input: FindUserAccountById) -> Result<Option<UserAccount>, sqlx::Error> {
        sqlx::query_as::<_, UserAccount>(
            r#"
            SELECT id, email, first_name, last_name, role, created_at, updated_at
            FROM "auth"."user_account"
            WHERE id = $1
            "#,
        )
        .bind(input.id)
        .fetch_optional(self.db())
        .await
    }
}

#[derive(Debug, Clone)]
pub struct FindUserAccountsByIds {
    pub ids: Vec<Uuid>,
}

impl Processor<FindUserAccountsByIds> for DatabaseProcessor {
    type Output = Vec<UserAccount>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:FindUserAccountsByIds", err)]
    async fn process(&self, input: FindUserAccountsByIds) -> Result<Vec<UserAccount>, sqlx::Error> {
        sqlx::query_as::<_, UserAccount>(
            r#"
            SELECT id, email, first_name, last_name, role, created_at, updated_at
            FROM "auth"."user_account"
            WHERE id = ANY($1)
            "#,
        )
        .bind(&input.ids)
        .fetch_all(self.db())
        .await
    }
}

impl UserDirectory for DatabaseProcessor {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserAccount>, framework::Error> {
        Ok(self.process(FindUserAccountById { id }).await?)
    }

    async fn find_users(&self, ids: &[Uuid]) -> Result<Vec<UserAccount>, framework::Error> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        Ok(self
            .process(FindUserAccountsByIds { ids: ids.to_vec() })
            .await?)
    }
}
