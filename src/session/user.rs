//! User shapes: what the backend sends, and what the session keeps.
//!
//! The backend is inconsistent about roles (bare string or object), ids
//! (numbers or strings), flags and key casing. Everything is folded into
//! [`User`] here, once, so nothing downstream has to look at the raw shape.
//! A field of an unexpected type reads as absent instead of failing the record.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Role name assigned when the backend sent no usable role.
pub const FALLBACK_ROLE: &str = "UNKNOWN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub organization_id: Option<String>,
    pub organization: Option<Organization>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
}

impl User {
    pub fn has_role(&self, name: &str) -> bool {
        self.role.name.eq_ignore_ascii_case(name)
    }

    pub fn has_organization(&self) -> bool {
        self.organization_id.is_some()
    }
}

/// Identifier as the backend sends it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// Boolean flag sent as `true`, `1` or `"yes"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawFlag {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl RawFlag {
    fn into_bool(self) -> Option<bool> {
        match self {
            RawFlag::Bool(b) => Some(b),
            RawFlag::Number(n) => n.as_f64().map(|n| n != 0.0),
            RawFlag::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawRole {
    Name(RawId),
    Object {
        #[serde(default, deserialize_with = "lenient")]
        id: Option<RawId>,
        #[serde(default, deserialize_with = "lenient")]
        name: Option<RawId>,
        #[serde(default, deserialize_with = "lenient")]
        permissions: Option<Vec<Value>>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawOrganization {
    Name(RawId),
    Object {
        #[serde(default, deserialize_with = "lenient")]
        id: Option<RawId>,
        #[serde(default, deserialize_with = "lenient")]
        name: Option<RawId>,
    },
}

/// Decode an optional field, reading a value of the wrong type as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// A user record straight off the wire (or out of an older persisted snapshot).
///
/// camelCase and snake_case spellings are separate fields rather than serde
/// aliases, so payloads carrying both do not fail as duplicates.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<RawId>,
    #[serde(default, deserialize_with = "lenient")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub full_name: Option<String>,
    #[serde(default, rename = "full_name", deserialize_with = "lenient")]
    pub full_name_snake: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub role: Option<RawRole>,
    #[serde(default, deserialize_with = "lenient")]
    pub organization_id: Option<RawId>,
    #[serde(default, rename = "organization_id", deserialize_with = "lenient")]
    pub organization_id_snake: Option<RawId>,
    #[serde(default, deserialize_with = "lenient")]
    pub organization: Option<RawOrganization>,
    #[serde(default, deserialize_with = "lenient")]
    pub is_active: Option<RawFlag>,
    #[serde(default, rename = "is_active", deserialize_with = "lenient")]
    pub is_active_snake: Option<RawFlag>,
}

impl RawUser {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

impl From<RawUser> for User {
    fn from(raw: RawUser) -> Self {
        let role = normalize_role(raw.role);
        let organization = raw.organization.and_then(normalize_organization);

        let organization_id = raw
            .organization_id
            .or(raw.organization_id_snake)
            .map(RawId::into_string)
            .or_else(|| organization.as_ref().map(|o| o.id.clone()))
            .filter(|id| !id.is_empty());

        let full_name = raw
            .full_name
            .or(raw.full_name_snake)
            .or(raw.name)
            .unwrap_or_default();

        User {
            id: raw.id.map(RawId::into_string).unwrap_or_default(),
            email: raw.email.unwrap_or_default(),
            full_name,
            role,
            organization_id,
            organization,
            is_active: raw
                .is_active
                .and_then(RawFlag::into_bool)
                .or_else(|| raw.is_active_snake.and_then(RawFlag::into_bool))
                .unwrap_or(true),
        }
    }
}

fn normalize_role(raw: Option<RawRole>) -> Role {
    let (id, name, permissions) = match raw {
        Some(RawRole::Name(name)) => (String::new(), name.into_string(), Vec::new()),
        Some(RawRole::Object { id, name, permissions }) => (
            id.map(RawId::into_string).unwrap_or_default(),
            name.map(RawId::into_string).unwrap_or_default(),
            permissions.map(normalize_permissions).unwrap_or_default(),
        ),
        None => (String::new(), String::new(), Vec::new()),
    };

    let name = name.trim().to_string();
    Role {
        // A bare role name doubles as its id
        id: if id.is_empty() { name.clone() } else { id },
        name: if name.is_empty() { FALLBACK_ROLE.to_string() } else { name },
        permissions,
    }
}

/// Permissions arrive as names or as `{name}` / `{code}` objects.
fn normalize_permissions(raw: Vec<Value>) -> Vec<String> {
    raw.into_iter()
        .filter_map(|p| match p {
            Value::String(s) => Some(s),
            Value::Object(obj) => obj
                .get("name")
                .or_else(|| obj.get("code"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

fn normalize_organization(raw: RawOrganization) -> Option<Organization> {
    match raw {
        RawOrganization::Name(name) => {
            let name = name.into_string();
            (!name.is_empty()).then(|| Organization {
                id: String::new(),
                name,
            })
        }
        RawOrganization::Object { id: None, name: None } => None,
        RawOrganization::Object { id, name } => Some(Organization {
            id: id.map(RawId::into_string).unwrap_or_default(),
            name: name.map(RawId::into_string).unwrap_or_default(),
        }),
    }
}
