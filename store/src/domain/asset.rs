//! Asset References
//!
//! Records point at uploaded files through a public URL. Object storage
//! addresses the same file by its path inside a bucket, so deletion needs
//! the URL mapped back to that path.

use percent_encoding::percent_decode_str;
use reqwest::Url;

/// Derive the object path inside `bucket` from a public asset URL.
///
/// `https://host/storage/v1/object/public/images/grid/a%20b.png` with bucket
/// `images` yields `grid/a b.png`. Returns `None` when the URL does not point
/// into the bucket, or when a decoded segment could change the path
/// (`.`, `..`, or an encoded separator).
pub fn asset_path_from_url(url: &str, bucket: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;

    segments.by_ref().find(|s| *s == bucket)?;

    let decoded: Vec<String> = segments
        .filter(|s| !s.is_empty())
        .map(|s| percent_decode_str(s).decode_utf8_lossy().to_string())
        .collect();

    if decoded.is_empty() || !decoded.iter().all(|s| is_plain_segment(s)) {
        return None;
    }
    Some(decoded.join("/"))
}

fn is_plain_segment(segment: &str) -> bool {
    segment != "." && segment != ".." && !segment.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_from_public_url() {
        let url = "https://abc.supabase.co/storage/v1/object/public/images/grid/a%20b.png";
        assert_eq!(asset_path_from_url(url, "images"), Some("grid/a b.png".to_string()));
    }

    #[test]
    fn test_query_string_is_ignored() {
        let url = "https://cdn.example.com/media/hero.mp4?v=3";
        assert_eq!(asset_path_from_url(url, "media"), Some("hero.mp4".to_string()));
    }

    #[test]
    fn test_other_bucket_is_none() {
        let url = "https://cdn.example.com/images/hero.png";
        assert_eq!(asset_path_from_url(url, "media"), None);
    }

    #[test]
    fn test_bucket_without_object_is_none() {
        assert_eq!(asset_path_from_url("https://cdn.example.com/images/", "images"), None);
        assert_eq!(asset_path_from_url("not a url", "images"), None);
    }

    #[test]
    fn test_encoded_separators_cannot_leave_bucket() {
        let base = "https://abc.supabase.co/storage/v1/object/public/images/";
        let escapes = [
            "x%2F..%2F..%2Fmedia%2Fsecret.mp4",
            "x%5C..%5Cmedia%5Csecret.mp4",
            "%2E%2E",
            "grid%2F.%2Fa.png",
        ];
        for tail in escapes {
            let url = format!("{}{}", base, tail);
            assert_eq!(asset_path_from_url(&url, "images"), None, "{}", tail);
        }
        assert_eq!(
            asset_path_from_url(&format!("{}grid/a..b.png", base), "images"),
            Some("grid/a..b.png".to_string())
        );
    }
}
