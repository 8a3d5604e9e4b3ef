/// Key material blobs shorter than this are treated as corrupt.
pub const MIN_KEY_MATERIAL_LEN: usize = 64;

/// One raw key-material object fetched from the key folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBlob {
    /// Where the blob came from, for log messages.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl KeyBlob {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Whether the blob is long enough to possibly hold a key.
    pub fn is_plausible(&self) -> bool {
        self.bytes.len() >= MIN_KEY_MATERIAL_LEN
    }
}
