use chardetng::EncodingDetector;
use encoding_rs::Encoding;

/// Bytes scanned for a `<meta charset>` declaration.
const META_SCAN_LIMIT: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
    /// Malformed sequences were replaced with U+FFFD.
    pub lossy: bool,
}

/// Decode fetched bytes to UTF-8.
///
/// Order: BOM, then the `Content-Type` charset, then a `<meta charset>` in the first
/// kilobyte, then chardetng. Malformed input is decoded lossily rather than
/// rejected; `lossy` records that it happened.
pub fn decode_bytes(bytes: &[u8], content_type: Option<&str>) -> DecodedText {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(enc) = content_type
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return decode_with(bytes, enc);
    }

    if let Some(enc) = meta_charset(bytes).and_then(|label| Encoding::for_label(label.as_bytes())) {
        return decode_with(bytes, enc);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    decode_with(bytes, detector.guess(None, true))
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (name, value) = part.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(['"', '\'']).to_string())
    })
}

fn meta_charset(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(META_SCAN_LIMIT)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let idx = head.find("charset=")?;
    let value: String = head[idx + "charset=".len()..]
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .collect();
    (!value.is_empty()).then_some(value)
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> DecodedText {
    let (text, used, had_errors) = enc.decode(bytes);
    DecodedText {
        text: text.into_owned(),
        encoding: used.name(),
        lossy: had_errors,
    }
}
