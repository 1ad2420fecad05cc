//! Concrete source adapters

pub mod asahi;
pub mod digest;
pub mod new_yorker;
pub mod yomiuri;

pub use asahi::{AsahiSource, ASAHI_SOURCE};
pub use digest::{DigestSource, DIGEST_BASE_URL, DIGEST_SOURCE};
pub use new_yorker::{NewYorkerSource, NEW_YORKER_SOURCE};
pub use yomiuri::{YomiuriSource, YOMIURI_SOURCE};
