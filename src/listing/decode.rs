//! Content-Encoding handling for listing API bodies.
//!
//! The listing client negotiates compression itself, so bodies arrive as
//! sent. Decoding is best effort: a body that fails to decompress is passed
//! through untouched and left for the JSON parser to judge.

use std::borrow::Cow;
use std::io::Read;

/// Compression codecs the listing client advertises.
pub const ACCEPT_ENCODING: &str = "gzip, deflate, br";

/// Codec declared by a `Content-Encoding` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Identity,
    Gzip,
    Deflate,
    Brotli,
    Unknown,
}

impl Codec {
    /// Parses a `Content-Encoding` header value.
    ///
    /// Only the outermost (last listed) coding is considered.
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Codec::Identity;
        };

        let last = value
            .rsplit(',')
            .next()
            .map(|c| c.trim().to_ascii_lowercase())
            .unwrap_or_default();

        match last.as_str() {
            "" | "identity" => Codec::Identity,
            "gzip" | "x-gzip" => Codec::Gzip,
            "deflate" => Codec::Deflate,
            "br" => Codec::Brotli,
            _ => Codec::Unknown,
        }
    }
}

/// Decodes `body` according to the declared encoding.
///
/// Falls back to the raw bytes when the body is already plain JSON, the
/// codec is unknown, or decompression fails.
pub fn decode_body<'a>(encoding: Option<&str>, body: &'a [u8]) -> Cow<'a, [u8]> {
    let codec = Codec::from_header(encoding);

    if codec == Codec::Identity {
        return Cow::Borrowed(body);
    }

    if looks_like_json(body) {
        tracing::debug!(?codec, "Body declared compressed but is already plain JSON");
        return Cow::Borrowed(body);
    }

    let decoded = match codec {
        Codec::Gzip => read_all(flate2::read::GzDecoder::new(body)),
        Codec::Deflate => read_all(flate2::read::ZlibDecoder::new(body))
            .or_else(|_| read_all(flate2::read::DeflateDecoder::new(body))),
        Codec::Brotli => read_all(brotli::Decompressor::new(body, 4096)),
        Codec::Unknown => {
            tracing::warn!(encoding = ?encoding, "Unknown content encoding, using raw body");
            return Cow::Borrowed(body);
        }
        Codec::Identity => unreachable!("identity handled above"),
    };

    match decoded {
        Ok(bytes) => Cow::Owned(bytes),
        Err(err) => {
            tracing::warn!(?codec, error = %err, "Failed to decompress body, using raw bytes");
            Cow::Borrowed(body)
        }
    }
}

/// Returns true if the first non-whitespace byte opens a JSON object or array.
pub fn looks_like_json(body: &[u8]) -> bool {
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{' || *b == b'[')
}

fn read_all<R: Read>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}
