pub mod admin;
pub mod nav;

pub use admin::{admin_portal_link, AdminPortalUrls, UserCategory};
pub use nav::NavView;
