//! Domain types exchanged between the client and the issue backend.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Server-assigned identifier of an issue.
///
/// The backend hands out numeric ids from SQL and string ids from fixtures,
/// so both are accepted on input and kept as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueId(#[serde(deserialize_with = "string_or_number")] String);

impl IssueId {
    /// Create a new IssueId.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "IssueId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-origin identifier for a write that is waiting in the offline queue.
///
/// Never sent to the server as a canonical id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempId(String);

impl TempId {
    /// Prefix that distinguishes temporary ids from server ids.
    pub const PREFIX: &'static str = "tmp-";

    /// Generate a fresh temporary id.
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4()))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    #[serde(alias = "Pending")]
    Pending,
    #[serde(alias = "In Progress", alias = "in-progress")]
    InProgress,
    #[serde(alias = "Resolved")]
    Resolved,
}

impl IssueStatus {
    /// Wire spelling of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Pending => "pending",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// A citizen-reported issue as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: IssueId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub status: IssueStatus,
    /// Free-text address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, alias = "image_url", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub upvotes: u32,
    #[serde(
        default,
        alias = "created_at",
        deserialize_with = "optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        alias = "updated_at",
        deserialize_with = "optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        alias = "user_id",
        deserialize_with = "optional_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
    #[serde(default, alias = "user_name", skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl Issue {
    /// Geolocation, if both coordinates are known.
    pub fn geolocation(&self) -> Option<GeoLocation> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoLocation {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

/// Payload for reporting a new issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl NewIssue {
    /// Create a new issue payload.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            category: category.into(),
            location: None,
            latitude: None,
            longitude: None,
            image_url: None,
        }
    }

    /// Attach a geolocation.
    pub fn with_geolocation(mut self, geo: GeoLocation) -> Self {
        self.latitude = Some(geo.latitude);
        self.longitude = Some(geo.longitude);
        self
    }

    /// Attach a free-text address.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Attach an image reference.
    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// Check the payload before it is sent or queued.
    pub fn validate(&self) -> crate::Result<()> {
        if self.title.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "Issue title cannot be empty".to_string(),
            ));
        }
        if self.category.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "Issue category cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Minimal profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "citizen".to_string()
}

/// Bearer token issued at login.
///
/// Zeroized on drop and redacted in `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, attached verbatim to outgoing requests.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken([REDACTED])")
    }
}

/// An authenticated session: token plus profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: AuthToken,
    pub user: UserProfile,
}

/// Sensitive string wrapper that zeroizes on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SensitiveString(String);

impl SensitiveString {
    /// Create a new sensitive string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the inner value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveString([REDACTED; {} bytes])", self.0.len())
    }
}

impl Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Login credentials.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: SensitiveString,
}

impl Credentials {
    /// Create credentials from an email and password.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SensitiveString::new(password),
        }
    }
}

/// Registration request.
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: SensitiveString,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Accept either a JSON string or a JSON number and keep it as a string.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Uint(n) => n.to_string(),
    })
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "string_or_number")] String);

    Option::<Wrapper>::deserialize(deserializer).map(|w| w.map(|w| w.0))
}

/// SQL timestamp columns arrive as `YYYY-MM-DD HH:MM:SS` (UTC) rather than
/// RFC 3339; accept both.
fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_issue_id_empty_fails() {
        assert!(IssueId::new("").is_err());
    }

    #[test]
    fn test_temp_id_prefix_and_uniqueness() {
        let a = TempId::generate();
        let b = TempId::generate();
        assert!(a.as_str().starts_with(TempId::PREFIX));
        assert_ne!(a, b);
    }

    #[test]
    fn test_status_accepts_legacy_spellings() {
        let s: IssueStatus = serde_json::from_str("\"In Progress\"").unwrap();
        assert_eq!(s, IssueStatus::InProgress);
        let s: IssueStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(s, IssueStatus::InProgress);
        let s: IssueStatus = serde_json::from_str("\"Pending\"").unwrap();
        assert_eq!(s, IssueStatus::Pending);
        assert_eq!(serde_json::to_string(&IssueStatus::InProgress).unwrap(), "\"in_progress\"");
    }

    #[test]
    fn test_issue_from_backend_row() {
        let json = r#"{
            "id": 42,
            "title": "Broken street light",
            "description": "Dark for a week",
            "category": "Electricity",
            "status": "pending",
            "location": "Oak Avenue",
            "latitude": 28.6149,
            "longitude": 77.2080,
            "upvotes": 3,
            "createdAt": "2024-01-15T10:30:00Z",
            "userId": 7
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.id.as_str(), "42");
        assert_eq!(issue.user_id.as_deref(), Some("7"));
        assert_eq!(
            issue.geolocation(),
            Some(GeoLocation {
                latitude: 28.6149,
                longitude: 77.2080
            })
        );
        assert!(issue.updated_at.is_none());
    }

    #[test]
    fn test_issue_from_sql_row() {
        let json = r#"{
            "id": 9,
            "title": "Overflowing bin",
            "status": "Pending",
            "image_url": "/uploads/bin.jpg",
            "created_at": "2024-03-02 08:15:00",
            "user_id": 3,
            "user_name": "Asha"
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.image_url.as_deref(), Some("/uploads/bin.jpg"));
        assert_eq!(issue.user_id.as_deref(), Some("3"));
        assert_eq!(issue.user_name.as_deref(), Some("Asha"));
        assert_eq!(
            issue.created_at.unwrap().to_rfc3339(),
            "2024-03-02T08:15:00+00:00"
        );

        // Re-serialized in the client's own spelling.
        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["userId"], "3");
        assert!(value.get("user_id").is_none());
    }

    #[test]
    fn test_issue_timestamp_rejects_garbage() {
        let json = r#"{"id":1,"title":"x","createdAt":"last tuesday"}"#;
        assert!(serde_json::from_str::<Issue>(json).is_err());
    }

    #[test]
    fn test_issue_without_coordinates() {
        let json = r#"{"id":"1","title":"Pothole"}"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert!(issue.geolocation().is_none());
        assert_eq!(issue.status, IssueStatus::Pending);
        assert_eq!(issue.upvotes, 0);
    }

    #[test]
    fn test_new_issue_validation() {
        assert!(NewIssue::new("Pothole", "Deep", "Road").validate().is_ok());
        assert!(NewIssue::new("  ", "Deep", "Road").validate().is_err());
        assert!(NewIssue::new("Pothole", "Deep", "").validate().is_err());
    }

    #[test]
    fn test_new_issue_wire_format() {
        let issue = NewIssue::new("Pothole", "Deep", "Road").with_geolocation(GeoLocation {
            latitude: 1.0,
            longitude: 2.0,
        });
        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["latitude"], 1.0);
        assert!(value.get("imageUrl").is_none());
    }

    #[test]
    fn test_secrets_redacted() {
        let creds = Credentials::new("john@example.com", "citizen123");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("citizen123"));
        assert!(!format!("{:?}", AuthToken::new("jwt")).contains("jwt"));

        let value = serde_json::to_value(&creds).unwrap();
        assert_eq!(value["password"], "citizen123");
    }

    proptest! {
        #[test]
        fn prop_numeric_ids_keep_their_digits(n in any::<u64>()) {
            let id: IssueId = serde_json::from_str(&n.to_string()).unwrap();
            prop_assert_eq!(id.as_str(), n.to_string());
        }
    }
}
