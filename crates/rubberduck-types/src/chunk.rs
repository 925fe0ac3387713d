use std::fmt;

/// One incremental, non-empty fragment of model output.
///
/// Construction goes through [`DeltaChunk::new`], which rejects empty text, so
/// a chunk in hand always carries at least one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaChunk(String);

impl DeltaChunk {
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.is_empty() {
            None
        } else {
            Some(Self(text))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DeltaChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
