use crate::error::RagError;
use lopdf::Document;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, RagError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, RagError> {
        if !path.is_file() {
            return Err(RagError::Load(format!("pdf not found: {}", path.display())));
        }

        let document = Document::load(path)
            .map_err(|error| RagError::Load(format!("{}: {error}", path.display())))?;

        if document.is_encrypted() {
            return Err(RagError::Load(format!(
                "pdf is encrypted and cannot be read: {}",
                path.display()
            )));
        }

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| RagError::Load(format!("page {page_no}: {error}")))?;

            if text.trim().is_empty() {
                debug!(page = page_no, "skipping page without text");
                continue;
            }

            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        if pages.is_empty() {
            return Err(RagError::Load(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        Ok(pages)
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, RagError> {
    LopdfExtractor.extract_pages(path)
}

#[cfg(test)]
mod tests {
    use super::extract_page_texts;
    use crate::error::RagError;
    use crate::test_support::pdf_with_pages;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn pages_with_text_are_numbered_from_one() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("sky.pdf");
        fs::write(&path, pdf_with_pages(&["The sky is blue.", "Grass is green."]))?;

        let pages = extract_page_texts(&path)?;
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert!(pages[0].text.contains("sky"));
        assert_eq!(pages[1].number, 2);
        assert!(pages[1].text.contains("Grass"));
        Ok(())
    }

    #[test]
    fn blank_pages_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("mixed.pdf");
        fs::write(&path, pdf_with_pages(&["", "Only the second page has text."]))?;

        let pages = extract_page_texts(&path)?;
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 2);
        Ok(())
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let result = extract_page_texts(std::path::Path::new("/definitely/not/here.pdf"));
        assert!(matches!(result, Err(RagError::Load(_))));
    }

    #[test]
    fn garbage_bytes_are_a_load_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        assert!(matches!(extract_page_texts(&path), Err(RagError::Load(_))));
        Ok(())
    }

    #[test]
    fn pdf_without_text_is_a_load_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let empty = dir.path().join("empty.pdf");
        fs::write(&empty, pdf_with_pages(&[]))?;
        let blank = dir.path().join("blank.pdf");
        fs::write(&blank, pdf_with_pages(&["", ""]))?;

        assert!(matches!(extract_page_texts(&empty), Err(RagError::Load(_))));
        assert!(matches!(extract_page_texts(&blank), Err(RagError::Load(_))));
        Ok(())
    }
}
