//! Principals, password digests, bearer sessions and role gates.
//!
//! Passwords are stored as bcrypt hashes (`$2b$<cost>$...`). Sessions
//! live in process memory and expire after `auth.session_hours`; a restart
//! logs everyone out.

use crate::clock::Clock;
use crate::config::{AuthConfig, BootstrapAdmin};
use crate::error::{BursarError, BursarResult};
use crate::model::{Agent, AgentInput, Role, User};
use crate::store::{constraints, Store};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

pub const MISSING_TOKEN: &str = "Pas de token, accès refusé.";
pub const INVALID_TOKEN: &str = "Token invalide ou expiré.";
pub const ACCESS_DENIED: &str = "Accès refusé.";
const AGENT_NOT_FOUND: &str = "Agent introuvable";

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    #[serde(rename = "id")]
    pub user_id: Uuid,
    pub username: String,
    #[serde(rename = "nom")]
    pub display_name: Option<String>,
    pub role: Role,
}

impl Principal {
    fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
        }
    }

    /// Name stamped on the records this principal creates.
    pub fn label(&self) -> String {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.username)
            .to_string()
    }

    pub fn require(&self, allowed: &[Role]) -> BursarResult<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(BursarError::Forbidden(ACCESS_DENIED.to_string()))
        }
    }
}

const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;

/// Salted bcrypt hash at `cost`.
pub fn hash_password(password: &str, cost: u32) -> BursarResult<String> {
    bcrypt::hash(password, cost.clamp(MIN_COST, MAX_COST))
        .map_err(|e| BursarError::Internal(format!("password hashing failed: {e}")))
}

/// A malformed stored hash never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match bcrypt::verify(password, stored) {
        Ok(matches) => matches,
        Err(e) => {
            log::warn!("unreadable password hash: {e}");
            false
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub nom: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub user: Principal,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Session {
    principal: Principal,
    expires_at: DateTime<Utc>,
}

pub struct AuthService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    password_cost: u32,
    sessions: RwLock<HashMap<String, Session>>,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &AuthConfig) -> Self {
        Self {
            store,
            clock,
            ttl: Duration::hours(config.session_hours.max(1)),
            password_cost: config.password_cost,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create the configured admin account unless the username already exists.
    pub fn ensure_admin(&self, admin: &BootstrapAdmin) -> BursarResult<bool> {
        if self.store.find_user_by_username(&admin.username)?.is_some() {
            return Ok(false);
        }
        self.create_user(&admin.username, &admin.password, admin.nom.clone(), Role::Admin)?;
        log::info!("created bootstrap admin account '{}'", admin.username);
        Ok(true)
    }

    /// Admin only.
    pub fn register(&self, actor: &Principal, input: RegisterInput) -> BursarResult<User> {
        actor.require(&[Role::Admin])?;

        let username = input.username.as_deref().map(str::trim).unwrap_or_default();
        let password = input.password.as_deref().unwrap_or_default();
        if username.is_empty() || password.is_empty() {
            return Err(BursarError::validation(
                "username",
                "Username et mot de passe requis.",
            ));
        }
        let role = match input.role.as_deref() {
            None | Some("") => Role::default(),
            Some(r) => Role::parse(r)
                .ok_or_else(|| BursarError::validation("role", "Rôle invalide."))?,
        };
        let nom = input.nom.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self.create_user(username, password, nom, role)
    }

    fn create_user(
        &self,
        username: &str,
        password: &str,
        display_name: Option<String>,
        role: Role,
    ) -> BursarResult<User> {
        if self.store.find_user_by_username(username)?.is_some() {
            return Err(duplicate_username());
        }
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: hash_password(password, self.password_cost)?,
            display_name,
            role,
            created_at: self.clock.now(),
        };
        self.store.insert_user(&user).map_err(|e| {
            if e.is_unique_violation_on(constraints::USERNAME) {
                duplicate_username()
            } else {
                e.into()
            }
        })?;
        Ok(user)
    }

    pub fn login(&self, credentials: &Credentials) -> BursarResult<LoginOutcome> {
        let username = credentials.username.as_deref().unwrap_or_default().trim();
        let user = self
            .store
            .find_user_by_username(username)?
            .ok_or_else(|| BursarError::Unauthorized("Identifiant invalide.".into()))?;
        let password = credentials.password.as_deref().unwrap_or_default();
        if !verify_password(password, &user.password_hash) {
            log::warn!("failed login for '{username}'");
            return Err(BursarError::Unauthorized("Mot de passe invalide.".into()));
        }

        let now = self.clock.now();
        let token = new_token();
        let principal = Principal::from_user(&user);
        let expires_at = now + self.ttl;

        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| BursarError::Internal("session table poisoned".into()))?;
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(
            token.clone(),
            Session {
                principal: principal.clone(),
                expires_at,
            },
        );

        log::info!("user '{}' logged in", user.username);
        Ok(LoginOutcome {
            token,
            user: principal,
            expires_at,
        })
    }

    /// Resolve an `Authorization` header value.
    pub fn authenticate(&self, authorization: Option<&str>) -> BursarResult<Principal> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer"))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BursarError::Unauthorized(MISSING_TOKEN.into()))?;

        let sessions = self
            .sessions
            .read()
            .map_err(|_| BursarError::Internal("session table poisoned".into()))?;
        match sessions.get(token) {
            Some(session) if session.expires_at > self.clock.now() => {
                Ok(session.principal.clone())
            }
            _ => Err(BursarError::Unauthorized(INVALID_TOKEN.into())),
        }
    }

    pub fn create_agent(&self, owner: &Principal, input: AgentInput) -> BursarResult<Agent> {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let last_name = clean(input.last_name)
            .ok_or_else(|| BursarError::validation("nom", "Nom requis."))?;
        let first_name = clean(input.first_name)
            .ok_or_else(|| BursarError::validation("prenom", "Prénom requis."))?;
        let agent = Agent {
            id: Uuid::new_v4(),
            user_id: owner.user_id,
            last_name,
            first_name,
            function: clean(input.function).unwrap_or_else(|| "titulaire".to_string()),
            active: true,
            created_at: self.clock.now(),
        };
        self.store.insert_agent(&agent)?;
        Ok(agent)
    }

    pub fn agents(&self, owner: &Principal) -> BursarResult<Vec<Agent>> {
        Ok(self.store.agents_for_user(owner.user_id)?)
    }

    /// Only the owning user or an admin may deactivate an agent.
    pub fn deactivate_agent(&self, actor: &Principal, id: Uuid) -> BursarResult<()> {
        let agent = self
            .store
            .get_agent(id)?
            .ok_or_else(|| BursarError::NotFound(AGENT_NOT_FOUND.into()))?;
        if agent.user_id != actor.user_id && actor.role != Role::Admin {
            log::warn!("{} tried to deactivate agent {id} of another user", actor.username);
            return Err(BursarError::Forbidden(ACCESS_DENIED.into()));
        }
        if self.store.deactivate_agent(id)? {
            Ok(())
        } else {
            Err(BursarError::NotFound(AGENT_NOT_FOUND.into()))
        }
    }
}

fn duplicate_username() -> BursarError {
    BursarError::Conflict("Cet identifiant existe déjà.".into())
}

fn new_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    to_hex(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn service() -> (AuthService, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
        ));
        let auth = AuthService::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            &AuthConfig::default(),
        );
        (auth, clock)
    }

    fn admin(auth: &AuthService) -> Principal {
        auth.ensure_admin(&BootstrapAdmin {
            username: "admin".into(),
            password: "secret".into(),
            nom: Some("Direction".into()),
        })
        .unwrap();
        auth.login(&Credentials {
            username: Some("admin".into()),
            password: Some("secret".into()),
        })
        .unwrap()
        .user
    }

    #[test]
    fn test_password_hash_round_trip() {
        let stored = hash_password("caisse2025", 10).unwrap();
        assert!(stored.starts_with("$2b$10$"));
        assert_eq!(stored.len(), 60);
        assert!(verify_password("caisse2025", &stored));
        assert!(!verify_password("caisse2024", &stored));
        assert!(!verify_password("caisse2025", "garbage"));
    }

    #[test]
    fn test_same_password_gets_different_salts() {
        assert_ne!(hash_password("x", 4).unwrap(), hash_password("x", 4).unwrap());
    }

    #[test]
    fn test_cost_is_clamped() {
        assert!(hash_password("x", 1).unwrap().starts_with("$2b$04$"));
    }

    #[test]
    fn test_stored_user_hash_is_bcrypt() {
        let (auth, _) = service();
        admin(&auth);
        let user = auth.store.find_user_by_username("admin").unwrap().unwrap();
        assert!(user.password_hash.starts_with("$2b$10$"));
        assert!(!user.password_hash.contains("secret"));
    }

    #[test]
    fn test_login_and_authenticate() {
        let (auth, _) = service();
        let principal = admin(&auth);
        assert_eq!(principal.role, Role::Admin);

        let outcome = auth
            .login(&Credentials {
                username: Some("admin".into()),
                password: Some("secret".into()),
            })
            .unwrap();
        assert_eq!(outcome.token.len(), 32);
        let header = format!("Bearer {}", outcome.token);
        assert_eq!(auth.authenticate(Some(&header)).unwrap().username, "admin");
    }

    #[test]
    fn test_login_failures_are_unauthorized() {
        let (auth, _) = service();
        admin(&auth);
        let unknown = auth.login(&Credentials {
            username: Some("nobody".into()),
            password: Some("secret".into()),
        });
        assert!(matches!(unknown, Err(BursarError::Unauthorized(m)) if m == "Identifiant invalide."));
        let wrong = auth.login(&Credentials {
            username: Some("admin".into()),
            password: Some("nope".into()),
        });
        assert!(matches!(wrong, Err(BursarError::Unauthorized(m)) if m == "Mot de passe invalide."));
    }

    #[test]
    fn test_session_expires() {
        let (auth, clock) = service();
        admin(&auth);
        let outcome = auth
            .login(&Credentials {
                username: Some("admin".into()),
                password: Some("secret".into()),
            })
            .unwrap();
        let header = format!("Bearer {}", outcome.token);
        clock.advance(Duration::hours(5));
        let err = auth.authenticate(Some(&header)).unwrap_err();
        assert_eq!(err.public_message(), INVALID_TOKEN);
    }

    #[test]
    fn test_missing_header() {
        let (auth, _) = service();
        let err = auth.authenticate(None).unwrap_err();
        assert_eq!(err.public_message(), MISSING_TOKEN);
        assert!(auth.authenticate(Some("Bearer ")).is_err());
    }

    #[test]
    fn test_register_requires_admin_and_unique_username() {
        let (auth, _) = service();
        let root = admin(&auth);
        let cashier = auth
            .register(
                &root,
                RegisterInput {
                    username: Some("caisse1".into()),
                    password: Some("pw".into()),
                    nom: Some("Awa".into()),
                    role: None,
                },
            )
            .unwrap();
        assert_eq!(cashier.role, Role::Cashier);

        let dup = auth.register(
            &root,
            RegisterInput {
                username: Some("caisse1".into()),
                password: Some("pw".into()),
                ..Default::default()
            },
        );
        assert!(matches!(dup, Err(BursarError::Conflict(_))));

        let as_cashier = Principal::from_user(&cashier);
        let denied = auth.register(
            &as_cashier,
            RegisterInput {
                username: Some("other".into()),
                password: Some("pw".into()),
                ..Default::default()
            },
        );
        assert!(matches!(denied, Err(BursarError::Forbidden(_))));
    }

    #[test]
    fn test_agents_belong_to_owner() {
        let (auth, _) = service();
        let root = admin(&auth);
        let agent = auth
            .create_agent(
                &root,
                AgentInput {
                    last_name: Some("HOUNSOU".into()),
                    first_name: Some("Paul".into()),
                    function: None,
                },
            )
            .unwrap();
        assert_eq!(agent.function, "titulaire");
        assert!(agent.active);
        assert_eq!(auth.agents(&root).unwrap().len(), 1);

        let stranger = Principal {
            user_id: Uuid::new_v4(),
            username: "caisse2".into(),
            display_name: None,
            role: Role::Cashier,
        };
        assert!(matches!(
            auth.deactivate_agent(&stranger, agent.id),
            Err(BursarError::Forbidden(_))
        ));
        assert!(auth.agents(&root).unwrap()[0].active);

        auth.deactivate_agent(&root, agent.id).unwrap();
        assert!(!auth.agents(&root).unwrap()[0].active);
        assert!(matches!(
            auth.deactivate_agent(&root, Uuid::new_v4()),
            Err(BursarError::NotFound(_))
        ));
    }

    #[test]
    fn test_label_prefers_display_name() {
        let p = Principal {
            user_id: Uuid::new_v4(),
            username: "caisse1".into(),
            display_name: Some("Awa".into()),
            role: Role::Cashier,
        };
        assert_eq!(p.label(), "Awa");
        let p = Principal {
            display_name: None,
            ..p
        };
        assert_eq!(p.label(), "caisse1");
    }
}
