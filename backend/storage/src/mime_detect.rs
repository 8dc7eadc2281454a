//! MIME type detection for stored artifacts.

use std::path::Path;

const FALLBACK: &str = "application/octet-stream";

/// Detect MIME type by file extension.
pub fn detect_mime_type(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "bmp"          => "image/bmp",
        "jpg" | "jpeg" => "image/jpeg",
        "png"          => "image/png",
        "gif"          => "image/gif",
        "webp"         => "image/webp",
        "tiff" | "tif" => "image/tiff",
        "txt"          => "text/plain",
        "json"         => "application/json",
        _              => FALLBACK,
    }
}

/// MIME type declared by a `data:<mime>;base64,` prefix, if any.
pub fn data_url_mime(data: &str) -> Option<&str> {
    let rest = data.strip_prefix("data:")?;
    let (mime, _) = rest.split_once(";base64,")?;
    (!mime.is_empty()).then_some(mime)
}

/// Content type for a stored artifact: the data-URL prefix wins, then the extension.
pub fn content_type_for(file_name: &str, data: &str) -> String {
    data_url_mime(data)
        .map(str::to_string)
        .unwrap_or_else(|| detect_mime_type(file_name).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_lookup_is_case_insensitive() {
        assert_eq!(detect_mime_type("photo_outputdecrypted.BMP"), "image/bmp");
        assert_eq!(detect_mime_type("photo_output.bin"), FALLBACK);
        assert_eq!(detect_mime_type("noext"), FALLBACK);
    }

    #[test]
    fn data_url_prefix_is_parsed() {
        assert_eq!(data_url_mime("data:image/png;base64,AAAA"), Some("image/png"));
        assert_eq!(data_url_mime("data:;base64,AAAA"), None);
        assert_eq!(data_url_mime("AAAA"), None);
    }

    #[test]
    fn data_url_beats_extension() {
        assert_eq!(content_type_for("x.bmp", "data:image/png;base64,AA"), "image/png");
        assert_eq!(content_type_for("x.bmp", "Qk0="), "image/bmp");
    }
}
