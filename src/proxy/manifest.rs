//! Playlist manifest rewriting

use crate::utils::{encode_component, manifest_base};
use url::Url;

/// Content type used when the upstream declared none.
pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Rewrite every sub-resource reference in a playlist into a proxy request
/// carrying the original header bundle.
///
/// Purely textual and line-oriented: comment-marked (`#`) and blank lines
/// pass through untouched, which means URIs embedded in tag attributes (for
/// example `#EXT-X-KEY`) are left alone. Every other line, relative or
/// absolute, is appended to the manifest's base (origin plus directory path)
/// and percent-encoded as one opaque `url` value.
pub fn rewrite_manifest(body: &str, target: &Url, headers_param: Option<&str>) -> String {
    let base = encode_component(&manifest_base(target));

    body.split('\n')
        .map(|line| {
            if line.starts_with('#') || line.trim().is_empty() {
                line.to_string()
            } else {
                match headers_param {
                    Some(headers) => format!(
                        "/m3u8-proxy?url={}{}&headers={}",
                        base,
                        encode_component(line),
                        encode_component(headers)
                    ),
                    None => format!("/m3u8-proxy?url={}{}", base, encode_component(line)),
                }
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn test_rewrites_segment_lines_and_keeps_comments() {
        let body = "#EXTM3U\n#EXT-X-VERSION:3\nseg0.ts\n";
        let out = rewrite_manifest(body, &target("https://host/path/index.m3u8"), None);

        let lines: Vec<&str> = out.split('\n').collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "#EXT-X-VERSION:3");
        assert_eq!(
            lines[2],
            "/m3u8-proxy?url=https%3A%2F%2Fhost%2Fpath%2Fseg0.ts"
        );
        assert_eq!(lines[3], "");
    }

    #[test]
    fn test_decoded_url_is_base_plus_original_line() {
        let out = rewrite_manifest("seg1.ts", &target("https://host/path/index.m3u8"), None);
        let encoded = out.strip_prefix("/m3u8-proxy?url=").unwrap();
        let decoded = percent_encoding::percent_decode_str(encoded)
            .decode_utf8()
            .unwrap();
        assert_eq!(decoded, "https://host/path/seg1.ts");
    }

    #[test]
    fn test_header_bundle_is_propagated() {
        let headers = r#"{"Referer":"https://site/"}"#;
        let out = rewrite_manifest(
            "seg0.ts",
            &target("https://host/live/chunks.m3u8"),
            Some(headers),
        );
        assert_eq!(
            out,
            "/m3u8-proxy?url=https%3A%2F%2Fhost%2Flive%2Fseg0.ts\
             &headers=%7B%22Referer%22%3A%22https%3A%2F%2Fsite%2F%22%7D"
        );
    }

    #[test]
    fn test_absolute_lines_are_still_prefixed_with_base() {
        // Line-oriented rewriting does not resolve absolute references; the
        // base is prepended unconditionally.
        let out = rewrite_manifest(
            "https://cdn/seg.ts",
            &target("https://host/path/index.m3u8"),
            None,
        );
        let encoded = out.strip_prefix("/m3u8-proxy?url=").unwrap();
        let decoded = percent_encoding::percent_decode_str(encoded)
            .decode_utf8()
            .unwrap();
        assert_eq!(decoded, "https://host/path/https://cdn/seg.ts");
    }

    #[test]
    fn test_blank_and_whitespace_lines_pass_through() {
        let body = "#EXTM3U\n\n   \nseg0.ts";
        let out = rewrite_manifest(body, &target("https://host/a.m3u8"), None);
        let lines: Vec<&str> = out.split('\n').collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "   ");
        assert!(lines[3].starts_with("/m3u8-proxy?url="));
    }

    #[test]
    fn test_key_tag_uri_is_not_rewritten() {
        let body = "#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\nseg0.ts";
        let out = rewrite_manifest(body, &target("https://host/a.m3u8"), None);
        assert!(out.starts_with("#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n"));
    }
}
