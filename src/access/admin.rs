//! Admin link visibility
//!
//! Single source of truth for which signed-in users see the external admin
//! portal link, and where it points.
//!
//! Note: This is UI-only; the admin portals enforce their own access.

use serde_json::Value;

use crate::auth::claims::IdTokenClaims;

/// Claim carrying the partner category of the user
pub const USER_CATEGORY_CLAIM: &str = "userCategory";

/// Claim carrying the admin flag (must be the JSON boolean `true`)
pub const IS_ADMIN_CLAIM: &str = "isAdmin";

pub const PARTNER_ADMIN_URL: &str =
    "https://usaa-b2b-trial.oktapreview.com/partner-portal/guoo1sbgvmBzqsXI31d7";

pub const BROKERAGES_ADMIN_URL: &str =
    "https://usaa-b2b-trial.oktapreview.com/partner-portal/guoo3cy7mwXgAYnvj1d7";

/// User categories that may be granted admin portal access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCategory {
    Partner,
    Brokerages,
}

impl UserCategory {
    /// Strict match on the claim value: only the exact JSON strings qualify
    pub fn from_claim(value: Option<&Value>) -> Option<Self> {
        match value {
            Some(Value::String(s)) if s == "partner" => Some(UserCategory::Partner),
            Some(Value::String(s)) if s == "brokerages" => Some(UserCategory::Brokerages),
            _ => None,
        }
    }
}

/// External admin portal URLs, one per qualifying category
#[derive(Debug, Clone, PartialEq)]
pub struct AdminPortalUrls {
    pub partner: String,
    pub brokerages: String,
}

impl Default for AdminPortalUrls {
    fn default() -> Self {
        Self {
            partner: PARTNER_ADMIN_URL.to_string(),
            brokerages: BROKERAGES_ADMIN_URL.to_string(),
        }
    }
}

impl AdminPortalUrls {
    pub fn url_for(&self, category: UserCategory) -> &str {
        match category {
            UserCategory::Brokerages => &self.brokerages,
            UserCategory::Partner => &self.partner,
        }
    }
}

/// Check the admin flag with strict typing: `"true"`, `1` or a missing
/// claim are all treated as not-admin.
pub fn is_admin_flag(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Bool(true)))
}

/// Resolve the admin portal link for a user, if they should see one.
///
/// Visible iff `userCategory` is `"partner"` or `"brokerages"` AND
/// `isAdmin` is the boolean `true`.
pub fn admin_portal_link<'a>(claims: &IdTokenClaims, urls: &'a AdminPortalUrls) -> Option<&'a str> {
    let category = UserCategory::from_claim(claims.get(USER_CATEGORY_CLAIM))?;
    if !is_admin_flag(claims.get(IS_ADMIN_CLAIM)) {
        return None;
    }
    Some(urls.url_for(category))
}
