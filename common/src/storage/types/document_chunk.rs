use crate::stored_object;
use uuid::Uuid;

stored_object!(DocumentChunk, "document_chunk", {
    title: String,
    content: String,
    embedding: Vec<f32>
});

impl DocumentChunk {
    pub fn new(title: String, content: String, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            title,
            content,
            embedding,
        }
    }
}
