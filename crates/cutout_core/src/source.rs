use bytes::Bytes;

const SUPPORTED_CONTENT_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp"];
const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// One acquired input: a file name and its bytes, as handed over by file
/// selection or drag-and-drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Accepts PNG, JPEG and WebP, judged by content type when one is known,
    /// otherwise by file extension.
    pub fn is_supported_image(&self) -> bool {
        if let Some(ct) = self.content_type.as_deref() {
            let ct = ct.split(';').next().unwrap_or(ct).trim();
            return SUPPORTED_CONTENT_TYPES
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ct));
        }
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterReason {
    UnsupportedType,
    Empty,
}

/// An input rejected before becoming an item. Not a failure, just a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionFilteredOut {
    pub name: String,
    pub reason: FilterReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddReport {
    pub added: Vec<crate::ItemId>,
    pub filtered_out: Vec<AcquisitionFilteredOut>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(SourceFile::new("a.JPG", vec![1u8]).is_supported_image());
        assert!(SourceFile::new("b.webp", vec![1u8]).is_supported_image());
        assert!(!SourceFile::new("c.gif", vec![1u8]).is_supported_image());
        assert!(!SourceFile::new("png", vec![1u8]).is_supported_image());
    }

    #[test]
    fn content_type_takes_precedence() {
        let file = SourceFile::new("upload", vec![1u8]).with_content_type("image/png; q=1");
        assert!(file.is_supported_image());

        let file = SourceFile::new("fake.png", vec![1u8]).with_content_type("text/html");
        assert!(!file.is_supported_image());
    }
}
