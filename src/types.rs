use std::collections::BTreeSet;

use derive_more::{Display, From, Into};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Role label carried by an identity (e.g. `"admin"`).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct RoleName(pub String);

impl RoleName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoleName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Role memberships of an identity. Duplicates collapse on insert.
///
/// Serialized as a plain array of labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<RoleName>);

impl RoleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, role: &RoleName) -> bool {
        self.0.contains(role)
    }

    /// True if any of `roles` is a member.
    #[must_use]
    pub fn intersects(&self, roles: &[RoleName]) -> bool {
        roles.iter().any(|r| self.0.contains(r))
    }

    pub fn insert(&mut self, role: impl Into<RoleName>) -> bool {
        self.0.insert(role.into())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleName> {
        self.0.iter()
    }
}

impl<R: Into<RoleName>> FromIterator<R> for RoleSet {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Bearer credential issued by the backend.
///
/// `Debug` is redacted so the token never lands in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Signed-in principal as described by the backend.
///
/// The record is opaque apart from `roles`; every other field is kept
/// verbatim in `attributes` so it survives a save/load cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "RoleSet::is_empty"
    )]
    roles: RoleSet,
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

/// Backends send `"roles": null` for accounts without roles.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RoleSet, D::Error> {
    Ok(Option::<RoleSet>::deserialize(deserializer)?.unwrap_or_default())
}

impl Identity {
    /// Identity with a single `id` attribute.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self::default().with_attribute("id", Value::String(id.into()))
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_roles(mut self, roles: RoleSet) -> Self {
        self.roles = roles;
        self
    }

    #[must_use]
    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Backend identifier, whether sent as a string or a number.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        match self.attributes.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.attributes.get("name").and_then(Value::as_str)
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.attributes.get("email").and_then(Value::as_str)
    }

    /// A record with no roles and no attributes counts as no identity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_set_collapses_duplicates() {
        let roles: RoleSet = ["admin", "admin", "viewer"].into_iter().collect();
        assert_eq!(roles.len(), 2);
        assert!(roles.contains(&"admin".into()));
    }

    #[test]
    fn role_set_intersection() {
        let roles: RoleSet = ["admin"].into_iter().collect();
        assert!(roles.intersects(&["admin".into(), "super-admin".into()]));
        assert!(!roles.intersects(&["viewer".into()]));
        assert!(!roles.intersects(&[]));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("secret-token");
        assert_eq!(format!("{credential:?}"), "Credential(***)");
        assert_eq!(credential.as_str(), "secret-token");
    }

    #[test]
    fn null_roles_read_as_none() {
        let identity: Identity =
            serde_json::from_str(r#"{"id":7,"name":"Ada","roles":null}"#).unwrap();

        assert!(identity.roles().is_empty());
        assert_eq!(identity.name(), Some("Ada"));
        assert!(identity.attribute("roles").is_none());
    }

    #[test]
    fn identity_keeps_unknown_attributes() {
        let json = r#"{"id":7,"name":"Ada","profile_image":null,"roles":["admin","admin"]}"#;
        let identity: Identity = serde_json::from_str(json).unwrap();

        assert_eq!(identity.id().as_deref(), Some("7"));
        assert_eq!(identity.name(), Some("Ada"));
        assert_eq!(identity.attribute("profile_image"), Some(&Value::Null));
        assert_eq!(identity.roles().len(), 1);

        let back: Identity =
            serde_json::from_str(&serde_json::to_string(&identity).unwrap()).unwrap();
        assert_eq!(back, identity);
    }

    #[test]
    fn empty_object_is_empty_identity() {
        let identity: Identity = serde_json::from_str("{}").unwrap();
        assert!(identity.is_empty());
        assert!(!Identity::with_id("u1").is_empty());
    }
}
