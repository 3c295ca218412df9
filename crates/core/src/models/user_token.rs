use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// 访问角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Guest,
    User,
    Service,
    Admin,
}

const GUEST_ID: &str = "guest";
const SERVICE_ID: &str = "service";

/// 用户令牌
///
/// 相等性只看 `(id, name, email)`。`GUEST` 与 `SERVICE` 是两个哨兵值，
/// 后者用于仅凭集群密钥认证的服务间调用。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserToken {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl UserToken {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        roles: Vec<Role>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            roles,
        }
    }

    pub fn guest() -> Self {
        Self::new(GUEST_ID, "Guest", "", vec![Role::Guest])
    }

    pub fn service() -> Self {
        Self::new(SERVICE_ID, "Service", "", vec![Role::Service])
    }

    pub fn is_guest(&self) -> bool {
        *self == Self::guest()
    }

    pub fn is_service(&self) -> bool {
        *self == Self::service()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.has_role(*role))
    }
}

impl PartialEq for UserToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name && self.email == other.email
    }
}

impl Eq for UserToken {}

impl Hash for UserToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.name.hash(state);
        self.email.hash(state);
    }
}
