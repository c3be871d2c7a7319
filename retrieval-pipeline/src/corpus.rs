use std::path::Path;

use common::error::AppError;
use text_splitter::{ChunkConfig, TextSplitter};
use tokio::fs;
use tracing::{info, warn};

/// A bounded slice of one source document, before embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusChunk {
    pub title: String,
    pub content: String,
}

/// A raw document read from the corpus directory. The title is the file
/// stem when one could be derived.
pub struct CorpusDocument {
    pub title: Option<String>,
    pub text: String,
}

/// Reads every `.txt`/`.md` file under `dir`, sorted by filename so chunk
/// ordering is stable across runs.
pub async fn read_documents(dir: &Path, min_documents: usize) -> Result<Vec<CorpusDocument>, AppError> {
    if !fs::try_exists(dir).await? {
        return Err(AppError::NotFound(format!(
            "corpus directory {} not found",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("txt" | "md") => files.push(path),
            _ => continue,
        }
    }
    files.sort();

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        let text = fs::read_to_string(&path).await?;
        let title = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_owned);
        documents.push(CorpusDocument { title, text });
    }

    if documents.len() < min_documents {
        warn!(
            found = documents.len(),
            minimum = min_documents,
            "corpus holds fewer documents than the recommended minimum"
        );
    }

    Ok(documents)
}

/// Splits documents into overlapping chunks. Chunks inherit their document
/// title; a synthetic `doc_<index>` stands in where none exists.
pub fn chunk_documents(
    documents: &[CorpusDocument],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<CorpusChunk>, AppError> {
    let chunk_config = ChunkConfig::new(chunk_size)
        .with_overlap(chunk_overlap)
        .map_err(|e| AppError::Internal(format!("invalid chunking configuration: {e}")))?;
    let splitter = TextSplitter::new(chunk_config);

    let mut chunks = Vec::new();
    for document in documents {
        for piece in splitter.chunks(&document.text) {
            let title = document
                .title
                .clone()
                .unwrap_or_else(|| format!("doc_{}", chunks.len()));
            chunks.push(CorpusChunk {
                title,
                content: piece.to_owned(),
            });
        }
    }

    info!(
        document_count = documents.len(),
        chunk_count = chunks.len(),
        "corpus chunked"
    );
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_corpus(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        for (name, content) in files {
            tokio::fs::write(dir.path().join(name), content)
                .await
                .expect("failed to write corpus file");
        }
        dir
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_found() {
        let result = read_documents(Path::new("/definitely/not/here"), 10).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_only_text_files_are_loaded() {
        let dir = write_corpus(&[
            ("geo.txt", "Paris is the capital of France."),
            ("notes.md", "Berlin is the capital of Germany."),
            ("image.png", "binary junk"),
        ])
        .await;

        let documents = read_documents(dir.path(), 1).await.expect("read failed");

        assert_eq!(documents.len(), 2);
        let titles: Vec<_> = documents.iter().map(|d| d.title.as_deref()).collect();
        assert_eq!(titles, vec![Some("geo"), Some("notes")]);
    }

    #[tokio::test]
    async fn test_small_corpus_is_not_an_error() {
        let dir = write_corpus(&[("only.txt", "one lonely document")]).await;

        // Below the minimum is a warning, not a failure.
        let documents = read_documents(dir.path(), 10).await.expect("read failed");
        assert_eq!(documents.len(), 1);
    }

    #[test]
    fn test_chunks_inherit_document_title() {
        let documents = vec![CorpusDocument {
            title: Some("geo".to_string()),
            text: "Paris is the capital of France. Berlin is the capital of Germany."
                .to_string(),
        }];

        let chunks = chunk_documents(&documents, 40, 10).expect("chunking failed");

        assert!(chunks.len() > 1, "expected the text to split");
        assert!(chunks.iter().all(|c| c.title == "geo"));
    }

    #[test]
    fn test_untitled_documents_get_synthetic_titles() {
        let documents = vec![
            CorpusDocument {
                title: None,
                text: "first untitled document".to_string(),
            },
            CorpusDocument {
                title: None,
                text: "second untitled document".to_string(),
            },
        ];

        let chunks = chunk_documents(&documents, 1000, 0).expect("chunking failed");

        assert_eq!(chunks[0].title, "doc_0");
        assert_eq!(chunks[1].title, "doc_1");
    }

    #[test]
    fn test_overlap_must_fit_in_chunk_size() {
        let documents = vec![CorpusDocument {
            title: None,
            text: "text".to_string(),
        }];

        let result = chunk_documents(&documents, 10, 50);

        assert!(matches!(result, Err(AppError::Internal(_))));
    }
}
