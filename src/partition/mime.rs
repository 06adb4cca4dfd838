//! File type lookup for documents sent to the partition service

use std::path::Path;

/// Extensions the partition service accepts, with the MIME type to send
const SUPPORTED_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("ppt", "application/vnd.ms-powerpoint"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("csv", "text/csv"),
    ("tsv", "text/tab-separated-values"),
    ("txt", "text/plain"),
    ("text", "text/plain"),
    ("log", "text/plain"),
    ("md", "text/markdown"),
    ("rst", "text/x-rst"),
    ("org", "text/org"),
    ("rtf", "application/rtf"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("xml", "application/xml"),
    ("json", "application/json"),
    ("eml", "message/rfc822"),
    ("msg", "application/vnd.ms-outlook"),
    ("p7s", "application/pkcs7-signature"),
    ("epub", "application/epub+zip"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("bmp", "image/bmp"),
    ("heic", "image/heic"),
];

fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// MIME type to declare for `file_name`
///
/// Types the service supports come from a fixed table; anything else is
/// guessed from the extension, defaulting to `application/octet-stream`.
pub fn mime_for(file_name: &str) -> String {
    if let Some(ext) = extension(file_name) {
        if let Some((_, mime)) = SUPPORTED_TYPES.iter().find(|(e, _)| *e == ext) {
            return (*mime).to_string();
        }
    }
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Whether the partition service accepts files with this name's extension
pub fn is_supported(file_name: &str) -> bool {
    extension(file_name).is_some_and(|ext| SUPPORTED_TYPES.iter().any(|(e, _)| *e == ext))
}

/// All accepted extensions, lowercase and without the dot
pub fn supported_extensions() -> impl Iterator<Item = &'static str> {
    SUPPORTED_TYPES.iter().map(|(ext, _)| *ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_types() {
        assert_eq!(mime_for("report.pdf"), "application/pdf");
        assert_eq!(mime_for("REPORT.PDF"), "application/pdf");
        assert_eq!(
            mime_for("/tmp/slides.pptx"),
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        );
        assert_eq!(mime_for("notes.md"), "text/markdown");
        assert_eq!(mime_for("scan.JPG"), "image/jpeg");
    }

    #[test]
    fn test_fallback_types() {
        assert_eq!(mime_for("archive.zip"), "application/zip");
        assert_eq!(mime_for("no_extension"), "application/octet-stream");
    }

    #[test]
    fn test_supported() {
        assert!(is_supported("a.docx"));
        assert!(is_supported("b.EML"));
        assert!(!is_supported("c.zip"));
        assert!(!is_supported("README"));
        assert!(supported_extensions().any(|ext| ext == "epub"));
    }
}
