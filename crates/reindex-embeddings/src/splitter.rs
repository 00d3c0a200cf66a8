//! Word-boundary text splitter.

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Splits text on whitespace into chunks of roughly `chunk_size` characters.
///
/// Words are never broken: a single word longer than `chunk_size` becomes its
/// own chunk. The result is never empty.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn split(&self, content: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0usize;

        for word in content.split_whitespace() {
            let word_len = word.chars().count();
            if current_len + word_len > self.chunk_size && !current.is_empty() {
                chunks.push(current.join(" "));
                current.clear();
                current_len = 0;
            }
            current.push(word);
            // +1 for the joining space
            current_len += word_len + 1;
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }

        if chunks.is_empty() {
            chunks.push(content.to_string());
        }
        chunks
    }
}
