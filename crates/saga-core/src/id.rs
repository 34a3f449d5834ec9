use uuid::Uuid;

/// Produces a globally unique, opaque id for each saga.
pub trait SagaIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random (v4) UUIDs in hyphenated form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidSagaIdGenerator;

impl SagaIdGenerator for UuidSagaIdGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

impl<F> SagaIdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_generator_produces_parseable_unique_ids() {
        let generator = UuidSagaIdGenerator;

        let first = generator.generate();
        let second = generator.generate();

        let parsed = Uuid::parse_str(&first).expect("valid uuid");
        assert_eq!(parsed.to_string(), first);
        assert_ne!(first, second);
    }

    #[test]
    fn closures_act_as_generators() {
        let generator = || "fixed-id".to_string();

        assert_eq!(generator.generate(), "fixed-id");
    }
}
