use crate::error::{Error, Result};
use crate::middleware::auth::AuthUser;

/// Admins act on any job; recruiters only on jobs they posted.
pub fn ensure_job_owner(actor: &AuthUser, posted_by: i32) -> Result<()> {
    if actor.is_admin() || actor.id == posted_by {
        Ok(())
    } else {
        Err(Error::Forbidden(
            "You can only manage jobs you posted".to_string(),
        ))
    }
}

/// Checks every owner up front so a batch is rejected before any row is touched.
pub fn ensure_owns_all<I>(actor: &AuthUser, owners: I) -> Result<()>
where
    I: IntoIterator<Item = i32>,
{
    if actor.is_admin() {
        return Ok(());
    }
    match owners.into_iter().find(|owner| *owner != actor.id) {
        Some(_) => Err(Error::Forbidden(
            "One or more applications belong to jobs you did not post".to_string(),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;

    fn actor(id: i32, role: Role) -> AuthUser {
        AuthUser {
            id,
            username: format!("user{}@example.com", id),
            role,
        }
    }

    #[test]
    fn recruiter_must_own_the_job() {
        let recruiter = actor(5, Role::Recruiter);
        assert!(ensure_job_owner(&recruiter, 5).is_ok());
        assert!(matches!(ensure_job_owner(&recruiter, 6), Err(Error::Forbidden(_))));
    }

    #[test]
    fn admin_bypasses_ownership() {
        let admin = actor(1, Role::Admin);
        assert!(ensure_job_owner(&admin, 99).is_ok());
        assert!(ensure_owns_all(&admin, [2, 3, 4]).is_ok());
    }

    #[test]
    fn one_foreign_job_rejects_the_batch() {
        let recruiter = actor(5, Role::Recruiter);
        assert!(ensure_owns_all(&recruiter, [5, 5, 5, 5]).is_ok());
        assert!(matches!(
            ensure_owns_all(&recruiter, [5, 5, 8, 5, 5]),
            Err(Error::Forbidden(_))
        ));
    }
}
