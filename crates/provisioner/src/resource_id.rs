//! ARM resource identifier parsing.
//!
//! Resource identifiers have the form
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}`.
//! Nested resources (for example subnets) append further `{type}/{name}` pairs.

use std::fmt;

use thiserror::Error;

/// Errors produced while parsing a resource identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceIdError {
    /// Fewer than two path segments.
    #[error("malformed resource identifier: {0:?}")]
    Malformed(String),

    /// The path does not contain the expected type segment.
    #[error("resource identifier {id:?} is not of type {expected}")]
    UnexpectedResourceType { id: String, expected: String },

    /// No `resourceGroups/{name}` segment pair.
    #[error("resource identifier {0:?} has no resource group")]
    MissingResourceGroup(String),

    /// Trailing name segment is empty.
    #[error("resource identifier {0:?} has no resource name")]
    MissingResourceName(String),
}

/// A parsed ARM resource identifier.
///
/// A bare name (input without any `/`) yields an identifier with only
/// [`name`](Self::name) set. Full paths always carry a resource group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceId {
    /// Subscription ID.
    pub subscription_id: Option<String>,
    /// Resource group.
    pub resource_group: Option<String>,
    /// Provider namespace (e.g. `Microsoft.Network`).
    pub provider: Option<String>,
    /// Innermost resource type (e.g. `networkInterfaces`).
    pub resource_type: Option<String>,
    /// Resource name (last segment).
    pub name: String,
}

impl ResourceId {
    /// Parse a resource identifier, optionally requiring a resource type.
    ///
    /// The input is trimmed and percent-decoded. Already-decoded input and
    /// input that fails to decode are used as given.
    ///
    /// # Errors
    /// Returns [`ResourceIdError`] if the path is too short, is not of
    /// `expected_type`, or lacks a resource group or name.
    pub fn parse(raw: &str, expected_type: Option<&str>) -> Result<Self, ResourceIdError> {
        let trimmed = raw.trim();
        let decoded = urlencoding::decode(trimmed)
            .map_or_else(|_| trimmed.to_string(), std::borrow::Cow::into_owned);
        let decoded = decoded.trim();

        if !decoded.contains('/') {
            return Ok(Self {
                name: decoded.to_string(),
                ..Self::default()
            });
        }

        let path = decoded.trim_end_matches('/');
        // Empty segments stay in `raw_segments` so `resourceGroups//x` has an empty group.
        let raw_segments: Vec<&str> = path.split('/').collect();
        let segments: Vec<&str> = raw_segments.iter().copied().filter(|s| !s.is_empty()).collect();
        if segments.len() < 2 {
            return Err(ResourceIdError::Malformed(raw.to_string()));
        }

        if let Some(expected) = expected_type {
            let needle = format!("/{}/", expected.to_lowercase());
            if !path.to_lowercase().contains(&needle) {
                return Err(ResourceIdError::UnexpectedResourceType {
                    id: raw.to_string(),
                    expected: expected.to_string(),
                });
            }
        }

        let resource_group = segment_after(&raw_segments, "resourceGroups")
            .map(str::trim)
            .filter(|rg| !rg.is_empty())
            .ok_or_else(|| ResourceIdError::MissingResourceGroup(raw.to_string()))?;

        let name = path.rsplit('/').next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(ResourceIdError::MissingResourceName(raw.to_string()));
        }

        let provider_index = segments
            .iter()
            .position(|s| s.eq_ignore_ascii_case("providers"));
        let provider = provider_index
            .and_then(|i| segments.get(i + 1))
            .map(|s| (*s).to_string());
        let resource_type = provider_index
            .filter(|i| segments.len() >= i + 4)
            .map(|_| segments[segments.len() - 2].to_string());

        Ok(Self {
            subscription_id: segment_after(&raw_segments, "subscriptions")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            resource_group: Some(resource_group.to_string()),
            provider,
            resource_type,
            name: name.to_string(),
        })
    }

    /// Resource group, or an empty string for bare names.
    #[must_use]
    pub fn resource_group(&self) -> &str {
        self.resource_group.as_deref().unwrap_or_default()
    }

    /// Whether this identifier was a bare name rather than a full path.
    #[must_use]
    pub fn is_bare_name(&self) -> bool {
        self.resource_group.is_none()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.resource_group, &self.resource_type) {
            (Some(rg), Some(kind)) => write!(f, "{rg}/{kind}/{}", self.name),
            (Some(rg), None) => write!(f, "{rg}/{}", self.name),
            _ => write!(f, "{}", self.name),
        }
    }
}

/// Segment immediately following `key` (case-insensitive).
fn segment_after<'a>(segments: &[&'a str], key: &str) -> Option<&'a str> {
    segments
        .iter()
        .position(|s| s.eq_ignore_ascii_case(key))
        .and_then(|i| segments.get(i + 1))
        .copied()
}
