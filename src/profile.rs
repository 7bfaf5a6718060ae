//! Authenticated user profile and the endpoints that populate it.
//!
//! The profile is kept as an opaque JSON object: the coordinator only reads a
//! few identifying fields and merges optional health attributes fetched from a
//! separate endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::config::{HEALTH_PATH, PROFILE_PATH};
use crate::error::AuthError;
use crate::request::{ApiRequest, stamp};
use crate::transport::Transport;

// =============================================================================
// PROFILE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(Map<String, Value>);

impl Profile {
    /// Wrap a profile response body.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Parse` unless the body is a JSON object.
    pub fn from_value(value: Value) -> Result<Self, AuthError> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(AuthError::Parse(format!("profile must be an object, got {other}"))),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        self.get("id")
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.get("email").and_then(Value::as_str)
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Copy every present health attribute into the profile. Absent
    /// attributes leave existing profile values untouched.
    pub fn merge_health(&mut self, health: &HealthAttributes) {
        let numbers = [("height", &health.height), ("weight", &health.weight)];
        for (key, value) in numbers {
            if let Some(n) = value {
                self.0.insert(key.to_owned(), Value::Number(n.clone()));
            }
        }

        let flags = [
            ("diabetes", health.diabetes),
            ("highBloodPressure", health.high_blood_pressure),
            ("hyperlipidemia", health.hyperlipidemia),
            ("kidneyDisease", health.kidney_disease),
        ];
        for (key, value) in flags {
            if let Some(flag) = value {
                self.0.insert(key.to_owned(), Value::Bool(flag));
            }
        }

        if let Some(level) = &health.activity_level {
            self.0.insert("activityLevel".to_owned(), Value::String(level.clone()));
        }
    }
}

/// Optional health attributes served by `/user/health`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthAttributes {
    pub height: Option<Number>,
    pub weight: Option<Number>,
    pub diabetes: Option<bool>,
    pub high_blood_pressure: Option<bool>,
    pub hyperlipidemia: Option<bool>,
    pub kidney_disease: Option<bool>,
    pub activity_level: Option<String>,
}

// =============================================================================
// ENDPOINTS
// =============================================================================

/// `GET /user/me` with the bearer header when a credential exists, cookie only otherwise.
///
/// # Errors
///
/// Returns the classified transport/status error, or `Parse` for a non-object body.
pub async fn fetch_profile(transport: &dyn Transport, credential: Option<&str>) -> Result<Profile, AuthError> {
    let mut request = ApiRequest::get(PROFILE_PATH);
    stamp(&mut request, credential)?;
    let response = transport.send(&request).await?.into_result()?;
    Profile::from_value(response.body)
}

/// `GET /user/health`, same auth mode as [`fetch_profile`].
///
/// # Errors
///
/// Returns the classified transport/status error, or `Parse` for an unexpected body.
pub async fn fetch_health(transport: &dyn Transport, credential: Option<&str>) -> Result<HealthAttributes, AuthError> {
    let mut request = ApiRequest::get(HEALTH_PATH);
    stamp(&mut request, credential)?;
    let response = transport.send(&request).await?.into_result()?;
    if response.body.is_null() {
        return Ok(HealthAttributes::default());
    }
    response.json()
}

/// Merge health attributes into `profile`, swallowing any failure.
pub(crate) async fn enrich_with_health(transport: &dyn Transport, credential: Option<&str>, profile: &mut Profile) {
    match fetch_health(transport, credential).await {
        Ok(health) => profile.merge_health(&health),
        Err(e) => tracing::debug!(error = %e, "health fetch failed; profile left unenriched"),
    }
}

#[cfg(test)]
#[path = "profile_test.rs"]
mod tests;
