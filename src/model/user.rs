use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    #[serde(rename = "caissier")]
    Cashier,
    #[serde(rename = "directeur")]
    Director,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Cashier => "caissier",
            Role::Director => "directeur",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "caissier" => Some(Role::Cashier),
            "directeur" => Some(Role::Director),
            _ => None,
        }
    }

    /// Whether the role may see aggregate cash balances.
    pub fn sees_balances(&self) -> bool {
        matches!(self, Role::Admin | Role::Director)
    }
}

/// An authentication principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(rename = "nom", default)]
    pub display_name: Option<String>,
    pub role: Role,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Cashier profile attached to a user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    #[serde(rename = "user")]
    pub user_id: Uuid,
    #[serde(rename = "nom")]
    pub last_name: String,
    #[serde(rename = "prenom")]
    pub first_name: String,
    /// e.g. "titulaire", "adjoint"
    #[serde(rename = "fonction")]
    pub function: String,
    #[serde(rename = "actif")]
    pub active: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentInput {
    #[serde(rename = "nom", default)]
    pub last_name: Option<String>,
    #[serde(rename = "prenom", default)]
    pub first_name: Option<String>,
    #[serde(rename = "fonction", default)]
    pub function: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_names_round_trip() {
        for role in [Role::Admin, Role::Cashier, Role::Director] {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn test_only_elevated_roles_see_balances() {
        assert!(Role::Admin.sees_balances());
        assert!(Role::Director.sees_balances());
        assert!(!Role::Cashier.sees_balances());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            id: Uuid::new_v4(),
            username: "caisse1".into(),
            password_hash: "salt$digest".into(),
            display_name: Some("Awa".into()),
            role: Role::Cashier,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("digest"));
    }
}
