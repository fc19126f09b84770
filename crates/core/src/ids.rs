//! Identifier generation for directives.

use ulid::Ulid;

/// Source of unique identifiers.
pub trait IdGenerator: Send + Sync {
    /// A globally unique identifier.
    fn long(&self) -> String;

    /// A short identifier, unique enough within one campaign.
    fn short(&self) -> String;
}

/// ULID-based generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct UlidIdGenerator;

impl IdGenerator for UlidIdGenerator {
    fn long(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    fn short(&self) -> String {
        // The random part of a ULID, without the timestamp prefix.
        let id = self.long();
        id.chars().skip(16).collect()
    }
}
