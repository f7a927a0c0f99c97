//! Contact data layer: audiences, tags, and contact rows with
//! predicate-driven paginated queries for segmentation call sites.

pub mod store;

pub use store::{AudienceStore, ContactPage, ContactStore, TagStore};
