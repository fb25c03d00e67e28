use crate::entities::db::user_account::{UserAccount, UserDirectory, UserRole};
use kanau::processor::Processor;
use tracing::{Span, instrument};
use uuid::Uuid;

pub struct AuthenticatedOperation<T: RoleGated> {
    pub user_id: Uuid,
    pub operation: T,
}

/// An operation that passed the role check, together with the resolved caller.
#[derive(Debug, Clone)]
pub struct Authorized<T> {
    pub actor: UserAccount,
    pub operation: T,
}

pub trait RoleGated {
    const ALLOWED_ROLES: &'static [UserRole];
    fn check_permission(role: UserRole) -> bool {
        Self::ALLOWED_ROLES.contains(&role)
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationLayer<D> {
    directory: D,
}

impl<D> AuthorizationLayer<D> {
    pub fn new(directory: D) -> Self {
        Self { directory }
    }
}

impl<Oper, D> Processor<AuthenticatedOperation<Oper>> for AuthorizationLayer<D>
where
    Oper: RoleGated + Send,
    D: UserDirectory,
{
    type Output = Authorized<Oper>;
    type Error = framework::Error;
    #[instrument(skip_all, err, fields(user_id = %input.user_id, user_role = tracing::field::Empty))]
    async fn process(
        &self,
        input: AuthenticatedOperation<Oper>,
    ) -> Result<Authorized<Oper>, framework::Error> {
        // A valid token for a user the directory no longer knows is treated as no identity.
        let Some(actor) = self.directory.find_user(input.user_id).await? else {
            return Err(framework::Error::Unauthenticated);
        };

        Span::current().record("user_role", tracing::field::debug(actor.role));

        if !Oper::check_permission(actor.role) {
            Err(framework::Error::PermissionsDenied)
        } else {
            Ok(Authorized {
                actor,
                operation: input.operation,
            })
        }
    }
}

#[macro_export]
/// Declare which roles may request an operation.
///
/// # Example
/// ```ignore
/// role_gated! {UpdateParcelStatus => [UserRole::Driver, UserRole::Admin]}
/// ```
macro_rules! role_gated {
    ($oper:ty => $roles:expr) => {
        impl $crate::utils::rbac::RoleGated for $oper {
            const ALLOWED_ROLES: &'static [$crate::entities::db::user_account::UserRole] =
                &$roles;
        }
    };
}
