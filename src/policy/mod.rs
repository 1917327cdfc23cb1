//! Authorization policy (admin-or-self)

use crate::error::{AppError, Result};

/// Caller identity as established by the auth middleware
#[derive(Debug, Clone)]
pub struct Caller {
    pub login: String,
    pub is_admin: bool,
}

impl Caller {
    pub fn new(login: impl Into<String>, admin_login: &str) -> Self {
        let login = login.into();
        let is_admin = login == admin_login;
        Self { login, is_admin }
    }
}

/// Require the caller to be the admin
pub fn require_admin(caller: &Caller) -> Result<()> {
    if caller.is_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the administrator may perform this operation".to_string(),
        ))
    }
}

/// Require the caller to be the admin or the owner of the target record
pub fn require_self_or_admin(caller: &Caller, target_login: &str) -> Result<()> {
    if caller.is_admin || caller.login == target_login {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the administrator may modify other users".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("admin", "jdoe", true)]
    #[case("jdoe", "jdoe", true)]
    #[case("jdoe", "asmith", false)]
    fn test_self_or_admin(#[case] caller: &str, #[case] target: &str, #[case] allowed: bool) {
        let caller = Caller::new(caller, "admin");
        assert_eq!(require_self_or_admin(&caller, target).is_ok(), allowed);
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&Caller::new("admin", "admin")).is_ok());
        assert!(require_admin(&Caller::new("jdoe", "admin")).is_err());
    }
}
