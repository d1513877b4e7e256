use serde::Deserialize;

use super::{email, Contract, ContractError};

/// Shared by `user.created` and `user.updated`. The id comes from the
/// identity provider and is not a UUID.
#[derive(Debug, Clone, Deserialize)]
pub struct UserChanged {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Contract for UserChanged {
    fn validate(&self) -> Result<(), ContractError> {
        match &self.email {
            Some(address) => email("email", address),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::parse;
    use serde_json::json;

    #[test]
    fn accepts_non_uuid_ids() {
        let user: UserChanged = parse(&json!({"id": "f:realm:1234", "name": "Ada"})).unwrap();
        assert_eq!(user.id, "f:realm:1234");
    }

    #[test]
    fn rejects_malformed_email() {
        assert!(parse::<UserChanged>(&json!({"id": "u1", "email": "ada at example"})).is_err());
    }
}
