use crate::stored_object;
use uuid::Uuid;

stored_object!(InteractionRecord, "interaction_log", {
    request_id: String,
    query: String,
    answer: String,
    sources: String,
    prompt: String
});

impl InteractionRecord {
    /// Builds the audit row for one completed request. `created_at` doubles
    /// as the interaction timestamp; `sources` is stored comma-joined.
    pub fn new(
        request_id: String,
        query: String,
        answer: String,
        sources: &[String],
        prompt: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            request_id,
            query,
            answer,
            sources: sources.join(", "),
            prompt,
        }
    }
}
