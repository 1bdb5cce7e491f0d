//! MIME type sniffing.
//!
//! Discovery reads a bounded prefix of each file and hands it to [`sniff`].
//! Magic bytes win; the file extension is only consulted when the content is
//! not recognised (plain-text subtitle formats, truncated headers).

/// Known extensions and their MIME types, used when magic bytes are inconclusive.
const EXTENSION_TABLE: &[(&str, &str)] = &[
    ("flac", "audio/flac"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("oga", "audio/ogg"),
    ("opus", "audio/opus"),
    ("wav", "audio/wav"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("avi", "video/x-msvideo"),
    ("mov", "video/quicktime"),
    ("srt", "application/x-subrip"),
    ("vtt", "text/vtt"),
    ("ass", "text/x-ssa"),
];

/// Result of sniffing a file prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffedType {
    pub mime_type: String,
    pub extension: String,
}

/// Detect the MIME type of `prefix`, falling back to `extension_hint`.
///
/// Returns `None` when neither the content nor the extension is known.
pub fn sniff(prefix: &[u8], extension_hint: Option<&str>) -> Option<SniffedType> {
    if let Some(kind) = infer::get(prefix) {
        return Some(SniffedType {
            mime_type: kind.mime_type().to_string(),
            extension: kind.extension().to_string(),
        });
    }

    let extension = extension_hint?.trim_start_matches('.').to_ascii_lowercase();
    let mime_type = mime_for_extension(&extension)?;
    Some(SniffedType {
        mime_type: mime_type.to_string(),
        extension,
    })
}

/// MIME type registered for a file extension (case-insensitive).
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let extension = extension.trim_start_matches('.');
    EXTENSION_TABLE
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        .map(|(_, mime)| *mime)
}

/// Whether a MIME type is something a playback engine can be asked to open.
pub fn is_media_mime(mime_type: &str) -> bool {
    mime_type.starts_with("audio/") || mime_type.starts_with("video/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_take_precedence_over_extension() {
        let sniffed = sniff(b"fLaC\0\0\0\x22\x10\x00\x10\x00", Some("mp3")).unwrap();
        assert_eq!(sniffed.extension, "flac");
        assert!(sniffed.mime_type.starts_with("audio/"));
    }

    #[test]
    fn id3_header_is_mp3() {
        let sniffed = sniff(b"ID3\x04\0\0\0\0\0\x0f", None).unwrap();
        assert_eq!(sniffed.extension, "mp3");
        assert_eq!(sniffed.mime_type, "audio/mpeg");
    }

    #[test]
    fn falls_back_to_extension_for_text_formats() {
        let sniffed = sniff(b"1\n00:00:01,000 --> 00:00:02,000\nHello\n", Some("SRT")).unwrap();
        assert_eq!(sniffed.mime_type, "application/x-subrip");
        assert_eq!(sniffed.extension, "srt");
    }

    #[test]
    fn unknown_content_and_extension() {
        assert_eq!(sniff(b"plain words", Some("xyz")), None);
        assert_eq!(sniff(b"plain words", None), None);
    }

    #[test]
    fn extension_lookup_ignores_case_and_dot() {
        assert_eq!(mime_for_extension(".MKV"), Some("video/x-matroska"));
        assert!(is_media_mime("video/webm"));
        assert!(!is_media_mime("application/x-subrip"));
    }
}
