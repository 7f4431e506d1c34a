//! Custom and managed domains routed to box ports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Who owns the DNS for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    /// Subdomain of the service's managed suffix.
    Managed,
    /// Caller-owned hostname pointed at the service by CNAME.
    Custom,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Managed => "managed",
            Self::Custom => "custom",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Provisioning status of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    Pending,
    Active,
    Failed,
    Disabled,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Failed => "failed",
            Self::Disabled => "disabled",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub kind: DomainKind,
    pub status: DomainStatus,
    /// Port inside the box that traffic is routed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub box_id: Option<String>,
    /// DNS records the caller must publish for a custom domain.
    #[serde(default)]
    pub verification_payload: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub verification_errors: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Service-wide settings returned alongside every domain response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainMeta {
    #[serde(default)]
    pub managed_suffix: String,
    /// Target for custom domains' CNAME records.
    #[serde(default)]
    pub cname_target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainsResponse {
    pub data: Vec<Domain>,
    #[serde(default)]
    pub meta: DomainMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainResponse {
    pub data: Domain,
    #[serde(default)]
    pub meta: DomainMeta,
}

/// Body of `POST /domains`. Unset fields are left out of the payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateDomainRequest {
    pub kind: DomainKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_id: Option<String>,
}

impl CreateDomainRequest {
    /// A managed domain under the service suffix.
    pub fn managed(slug: impl Into<String>) -> Self {
        Self {
            kind: DomainKind::Managed,
            hostname: None,
            slug: Some(slug.into()),
            target_port: None,
            box_id: None,
        }
    }

    /// A caller-owned hostname.
    pub fn custom(hostname: impl Into<String>) -> Self {
        Self {
            kind: DomainKind::Custom,
            hostname: Some(hostname.into()),
            slug: None,
            target_port: None,
            box_id: None,
        }
    }

    /// Route the domain to `port` on `box_id`.
    pub fn route_to(mut self, box_id: impl Into<String>, port: u16) -> Self {
        self.box_id = Some(box_id.into());
        self.target_port = Some(port);
        self
    }
}

/// Body of `PATCH /domains/{id}`.
///
/// Each field is tri-state: [`UpdateField::Unset`] leaves it untouched,
/// [`UpdateField::Null`] clears it, [`UpdateField::Value`] replaces it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDomainRequest {
    #[serde(default, skip_serializing_if = "UpdateField::is_unset")]
    pub status: UpdateField<DomainStatus>,
    #[serde(default, skip_serializing_if = "UpdateField::is_unset")]
    pub target_port: UpdateField<u16>,
    #[serde(default, skip_serializing_if = "UpdateField::is_unset")]
    pub box_id: UpdateField<String>,
}

/// A field of a partial update.
///
/// Pair with `#[serde(default, skip_serializing_if = "UpdateField::is_unset")]`
/// so that `Unset` is omitted, `Null` is sent as JSON `null` and `Value` as
/// the value itself. Deserializing maps an absent field to `Unset` and an
/// explicit `null` to `Null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateField<T> {
    Unset,
    Null,
    Value(T),
}

impl<T> UpdateField<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The value, if one is set.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> Default for UpdateField<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T> From<T> for UpdateField<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<T: Serialize> Serialize for UpdateField<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => v.serialize(serializer),
            Self::Unset | Self::Null => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for UpdateField<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Self::Value(v),
            None => Self::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_field_serialization() {
        let req = UpdateDomainRequest {
            status: DomainStatus::Active.into(),
            target_port: UpdateField::Null,
            box_id: UpdateField::Unset,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"status": "active", "target_port": null})
        );

        let empty = UpdateDomainRequest::default();
        assert_eq!(serde_json::to_value(&empty).unwrap(), json!({}));
    }

    #[test]
    fn test_update_field_deserialization() {
        let req: UpdateDomainRequest =
            serde_json::from_value(json!({"target_port": null, "box_id": "b1"})).unwrap();
        assert!(req.status.is_unset());
        assert!(req.target_port.is_null());
        assert_eq!(req.box_id.value().map(String::as_str), Some("b1"));
    }

    #[test]
    fn test_create_request_omits_unset_fields() {
        let req = CreateDomainRequest::managed("app").route_to("box_123", 4000);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"kind": "managed", "slug": "app", "target_port": 4000, "box_id": "box_123"})
        );

        let req = CreateDomainRequest::custom("app.example.com");
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"kind": "custom", "hostname": "app.example.com"})
        );
    }

    #[test]
    fn test_domain_response_parses() {
        let resp: DomainsResponse = serde_json::from_value(json!({
            "data": [{
                "id": "dom_123",
                "hostname": "app.deven.to",
                "slug": "app",
                "kind": "managed",
                "status": "active",
                "target_port": 4000,
                "box_id": "box_123",
                "verification_payload": {"cname": "app.deven.to"},
                "verification_errors": {},
                "inserted_at": "2025-01-01T00:00:00Z",
                "updated_at": "2025-01-01T00:00:00Z"
            }],
            "meta": {"managed_suffix": "deven.to", "cname_target": "edge.deven.to"}
        }))
        .unwrap();

        assert_eq!(resp.data.len(), 1);
        assert_eq!(resp.data[0].kind, DomainKind::Managed);
        assert_eq!(resp.data[0].target_port, Some(4000));
        assert_eq!(resp.meta.cname_target, "edge.deven.to");
    }
}
