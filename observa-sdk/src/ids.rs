//! Event identifier generation

/// Produces RFC 4122 identifiers for events.
///
/// The normalizer takes this as a collaborator so tests can pin ids.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Default generator backed by random v4 UUIDs.
#[derive(Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_uuid_shape() {
        let id = UuidGenerator.generate();
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
    }

    #[test]
    fn test_generates_unique_ids() {
        assert_ne!(UuidGenerator.generate(), UuidGenerator.generate());
    }
}
