//! MIME type detection based on file extensions, and the reverse mapping used
//! to name stored uploads.

use std::path::Path;

/// Get the Content-Type for a file extension.
///
/// # Examples
/// ```
/// use plainwire::http::mime::content_type_for_extension;
/// assert_eq!(content_type_for_extension(Some("html")), "text/html");
/// assert_eq!(content_type_for_extension(Some("png")), "image/png");
/// assert_eq!(content_type_for_extension(None), "application/octet-stream");
/// ```
pub fn content_type_for_extension(extension: Option<&str>) -> &'static str {
    match extension.map(str::to_ascii_lowercase).as_deref() {
        // Text
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("txt" | "md") => "text/plain",
        Some("csv") => "text/csv",
        Some("xml") => "text/xml",

        // Scripts and data
        Some("js" | "mjs") => "application/javascript",
        Some("json") => "application/json",

        // Images
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",

        // Documents
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",

        _ => "application/octet-stream",
    }
}

/// Content-Type for a path on disk.
pub fn content_type_for_path(path: &Path) -> &'static str {
    content_type_for_extension(path.extension().and_then(|ext| ext.to_str()))
}

/// File extension for a declared Content-Type; unknown types are stored as text.
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/jpeg" => "jpeg",
        "image/png" => "png",
        "image/gif" => "gif",
        "text/html" => "html",
        "application/json" => "json",
        _ => "txt",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_types() {
        assert_eq!(content_type_for_extension(Some("html")), "text/html");
        assert_eq!(content_type_for_extension(Some("PNG")), "image/png");
        assert_eq!(content_type_for_path(Path::new("a/b/photo.jpg")), "image/jpeg");
    }

    #[test]
    fn upload_extensions() {
        assert_eq!(extension_for_content_type("image/png"), "png");
        assert_eq!(extension_for_content_type("image/jpeg"), "jpeg");
        assert_eq!(extension_for_content_type("text/html; charset=utf-8"), "html");
        assert_eq!(extension_for_content_type("text/plain"), "txt");
        assert_eq!(extension_for_content_type("application/x-unknown"), "txt");
    }
}
