#[cfg(test)]
pub mod strategies {
    use proptest::prelude::*;

    /// Arbitrary non-empty consumer group id
    pub fn arb_group_id() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9._-]{0,48}"
    }

    /// Arbitrary topic name (Kafka legal characters)
    pub fn arb_topic() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9][a-zA-Z0-9._-]{0,40}"
    }

    pub fn arb_partition() -> impl Strategy<Value = u32> {
        0u32..1024
    }

    /// Non-empty per-partition lags whose sum cannot overflow
    pub fn arb_lags() -> impl Strategy<Value = Vec<i64>> {
        proptest::collection::vec(0i64..1_000_000_000, 1..64)
    }
}
