mod claims;
pub mod extractors;
pub mod keys;

pub use extractors::AuthSubject;
pub use keys::SessionKeys;
