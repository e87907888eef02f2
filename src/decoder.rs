use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use serde::{Deserialize, Serialize};
use std::io::Read;
use thiserror::Error;

/// Buffer size handed to the brotli decompressor
const BROTLI_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decompress {encoding} body: {source}")]
    Decompress {
        encoding: ContentEncoding,
        source: std::io::Error,
    },

    #[error("response body is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Compression applied to an HTTP response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    #[default]
    Identity,
    Gzip,
    Deflate,
    Br,
}

impl std::fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ContentEncoding::Identity => "identity",
            ContentEncoding::Gzip => "gzip",
            ContentEncoding::Deflate => "deflate",
            ContentEncoding::Br => "br",
        };
        f.write_str(label)
    }
}

impl ContentEncoding {
    /// Parses a single content-encoding label.
    ///
    /// Unknown labels fall back to identity so a mislabelled body never aborts a scrape.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => ContentEncoding::Identity,
            "gzip" | "x-gzip" => ContentEncoding::Gzip,
            "deflate" => ContentEncoding::Deflate,
            "br" => ContentEncoding::Br,
            other => {
                ::log::warn!("Unsupported content-encoding '{}', treating as identity", other);
                ContentEncoding::Identity
            }
        }
    }

    /// Parses a full Content-Encoding header value into the layers in the order they were applied
    pub fn from_header(header: Option<&str>) -> Vec<Self> {
        match header {
            Some(value) => value
                .split(',')
                .map(Self::from_label)
                .filter(|encoding| *encoding != ContentEncoding::Identity)
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Decodes a body compressed with a single encoding into UTF-8 text
pub fn decode_body(body: &[u8], encoding: ContentEncoding) -> Result<String, DecodeError> {
    let bytes = decompress(body, encoding)?;
    Ok(String::from_utf8(bytes)?)
}

/// Decodes a body using the raw Content-Encoding header value.
///
/// Layers are removed in reverse order of application.
pub fn decode_with_header(body: &[u8], header: Option<&str>) -> Result<String, DecodeError> {
    let mut bytes = body.to_vec();
    for encoding in ContentEncoding::from_header(header).into_iter().rev() {
        bytes = decompress(&bytes, encoding)?;
    }
    Ok(String::from_utf8(bytes)?)
}

fn decompress(body: &[u8], encoding: ContentEncoding) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    let result = match encoding {
        ContentEncoding::Identity => return Ok(body.to_vec()),
        ContentEncoding::Gzip => MultiGzDecoder::new(body).read_to_end(&mut out),
        ContentEncoding::Deflate => {
            // Servers disagree on whether "deflate" carries the zlib wrapper
            match ZlibDecoder::new(body).read_to_end(&mut out) {
                Ok(n) => Ok(n),
                Err(_) => {
                    out.clear();
                    DeflateDecoder::new(body).read_to_end(&mut out)
                }
            }
        }
        ContentEncoding::Br => {
            brotli::Decompressor::new(body, BROTLI_BUFFER_SIZE).read_to_end(&mut out)
        }
    };

    result.map_err(|source| DecodeError::Decompress { encoding, source })?;
    Ok(out)
}
