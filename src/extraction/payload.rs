//! Form payloads for the portal's AJAX endpoints.

use chrono::{DateTime, Utc};

use crate::auth::RequestSignature;

/// Timestamp in the portal's expected `Tue, 07 Oct 2025 09:15:02 GMT` form.
pub fn portal_timestamp(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Ordered form-encoded body for one signed request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    fields: Vec<(String, String)>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.push((name.to_string(), value.into()));
        self
    }

    pub fn csrf(self, signature: &RequestSignature) -> Self {
        self.field("_csrf", signature.anti_forgery_token.as_str())
    }

    pub fn authorized_id(self, signature: &RequestSignature) -> Self {
        self.field("authorizedID", signature.authorized_id())
    }

    pub fn semester(self, semester_id: &str) -> Self {
        self.field("semesterSubId", semester_id)
    }

    /// Cache-busting `x` timestamp.
    pub fn timestamp(self) -> Self {
        self.field("x", portal_timestamp(Utc::now()))
    }

    pub fn verify_menu(self) -> Self {
        self.field("verifyMenu", "true")
    }

    pub fn into_fields(self) -> Vec<(String, String)> {
        self.fields
    }
}
