use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use tracing::{debug, warn};

/// Outcome of sniffing a byte stream for its character encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub encoding: &'static Encoding,
    /// False when the detector had nothing reliable to go on.
    pub confident: bool,
}

/// Text decoded to UTF-8 plus what it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub source_encoding: &'static Encoding,
    /// Undecodable sequences were replaced with U+FFFD.
    pub lossy: bool,
}

pub fn detect(bytes: &[u8]) -> Detection {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return Detection {
            encoding,
            confident: true,
        };
    }

    if std::str::from_utf8(bytes).is_ok() {
        return Detection {
            encoding: UTF_8,
            confident: true,
        };
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);

    // The input is not valid UTF-8, so a UTF-8 guess means the detector gave up.
    Detection {
        encoding,
        confident: encoding != UTF_8,
    }
}

/// Decodes `bytes` according to `detection`. Inconclusive detections fall
/// back to lossy UTF-8.
pub fn decode(bytes: &[u8], detection: Detection, subject: &'static str) -> Normalized {
    if !detection.confident {
        warn!(
            subject,
            guess = detection.encoding.name(),
            "encoding detection inconclusive, assuming UTF-8"
        );
        let text = String::from_utf8_lossy(bytes).into_owned();
        let lossy = text.as_bytes() != bytes;
        return Normalized {
            text,
            source_encoding: UTF_8,
            lossy,
        };
    }

    let (text, used, had_errors) = detection.encoding.decode(bytes);
    if had_errors {
        warn!(
            subject,
            encoding = used.name(),
            "undecodable sequences replaced during conversion"
        );
    } else {
        debug!(subject, encoding = used.name(), "decoded to UTF-8");
    }

    Normalized {
        text: text.into_owned(),
        source_encoding: used,
        lossy: had_errors,
    }
}

pub fn normalize(bytes: &[u8], subject: &'static str) -> Normalized {
    decode(bytes, detect(bytes), subject)
}

/// Non-ASCII bytes a filename needs before its own statistics outweigh the
/// encoding of the file it names.
const MIN_NAME_SAMPLE: usize = 16;

/// Picks the encoding of a filename.
///
/// A name is a handful of bytes, too few for frequency analysis, so a legacy
/// name is decoded with the encoding detected for the file's content (`hint`)
/// when that decodes it cleanly. Genuine UTF-8 names, and legacy names long
/// enough to be assessed on their own, keep their independent detection.
pub fn detect_file_name(raw: &[u8], hint: Option<&'static Encoding>) -> Detection {
    if let Some((encoding, _)) = Encoding::for_bom(raw) {
        return Detection {
            encoding,
            confident: true,
        };
    }

    let Some(hint) = hint.filter(|encoding| *encoding != UTF_8 && encoding.is_ascii_compatible())
    else {
        return detect(raw);
    };
    if raw.is_ascii() {
        return detect(raw);
    }
    let Some(hinted) = hint.decode_without_bom_handling_and_without_replacement(raw) else {
        return detect(raw);
    };

    if let Ok(as_utf8) = std::str::from_utf8(raw) {
        // Browsers send UTF-8 names regardless of the file's encoding. Short
        // legacy names can still happen to be valid UTF-8, so switch only when
        // the UTF-8 reading looks accidental and the hint yields ideographs.
        if !misread_as_utf8(as_utf8) || !has_cjk(&hinted) {
            return Detection {
                encoding: UTF_8,
                confident: true,
            };
        }
    } else {
        let non_ascii = raw.iter().filter(|b| !b.is_ascii()).count();
        if non_ascii >= MIN_NAME_SAMPLE {
            let mut detector = EncodingDetector::new();
            detector.feed(raw, true);
            let (guess, assessed) = detector.guess_assess(None, false);
            if assessed {
                return Detection {
                    encoding: guess,
                    confident: true,
                };
            }
        }
    }

    debug!(hint = hint.name(), "file name decoded with content encoding");
    Detection {
        encoding: hint,
        confident: true,
    }
}

/// Legacy double-byte text that happens to be valid UTF-8 lands on
/// combining marks and right-to-left scripts rather than on letters.
fn misread_as_utf8(text: &str) -> bool {
    !has_cjk(text)
        && text.chars().any(|c| {
            !c.is_ascii()
                && !matches!(c,
                    '\u{00C0}'..='\u{02AF}'
                        | '\u{0370}'..='\u{04FF}'
                        | '\u{2000}'..='\u{206F}')
        })
}

fn has_cjk(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c,
            '\u{3040}'..='\u{30FF}'
                | '\u{3400}'..='\u{4DBF}'
                | '\u{4E00}'..='\u{9FFF}'
                | '\u{AC00}'..='\u{D7AF}'
                | '\u{F900}'..='\u{FAFF}')
    })
}

/// Decodes an uploaded filename and strips anything that would make it a
/// path rather than a name. `hint` is the encoding detected for the file's
/// content, if any.
pub fn normalize_file_name(raw: &[u8], hint: Option<&'static Encoding>) -> String {
    let decoded = decode(raw, detect_file_name(raw, hint), "file_name").text;
    let base = decoded
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Raw filename bytes from a multipart `Content-Disposition` header value.
///
/// Prefers the RFC 5987 `filename*` form over plain `filename`. The plain form
/// is returned byte for byte, whatever encoding the client used.
pub fn file_name_from_disposition(header: &[u8]) -> Option<Vec<u8>> {
    let params = parameters(header);

    let extended = params
        .iter()
        .find(|(name, _)| name == "filename*")
        .and_then(|(_, value)| {
            let mut parts = value.splitn(3, |b| *b == b'\'');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(_charset), Some(_language), Some(encoded)) => {
                    Some(urlencoding::decode_binary(encoded).into_owned())
                }
                _ => None,
            }
        });

    extended.or_else(|| {
        params
            .into_iter()
            .find(|(name, _)| name == "filename")
            .map(|(_, value)| value)
    })
}

fn parameters(header: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut params = Vec::new();
    let mut bytes = header.iter().copied().peekable();

    // Skip the disposition type (`form-data`).
    while bytes.next_if(|b| *b != b';').is_some() {}

    while bytes.next().is_some() {
        let mut name = Vec::new();
        while let Some(b) = bytes.next_if(|b| *b != b'=' && *b != b';') {
            if !b.is_ascii_whitespace() {
                name.push(b);
            }
        }
        if bytes.next_if_eq(&b'=').is_none() {
            continue;
        }
        while bytes.next_if(u8::is_ascii_whitespace).is_some() {}

        let mut value = Vec::new();
        if bytes.next_if_eq(&b'"').is_some() {
            while let Some(b) = bytes.next() {
                match b {
                    b'"' => break,
                    // Legacy multibyte names can carry 0x5C as a trail byte,
                    // so only `\"` and `\\` are treated as escapes.
                    b'\\' => match bytes.next_if(|b| *b == b'"' || *b == b'\\') {
                        Some(escaped) => value.push(escaped),
                        None => value.push(b'\\'),
                    },
                    other => value.push(other),
                }
            }
            while bytes.next_if(|b| *b != b';').is_some() {}
        } else {
            while let Some(b) = bytes.next_if(|b| *b != b';') {
                value.push(b);
            }
            while value.last().is_some_and(u8::is_ascii_whitespace) {
                value.pop();
            }
        }

        params.push((String::from_utf8_lossy(&name).to_ascii_lowercase(), value));
    }

    params
}
