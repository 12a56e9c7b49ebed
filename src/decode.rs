//! Image response decoding.
//!
//! The image endpoint does not return one fixed schema. Each known shape is a
//! named [`ImageDecoder`], tried in [`ImageDecoder::ORDER`]; the first one that
//! finds an image wins.

use base64::Engine;
use base64::engine::general_purpose;
use serde_json::Value;

use crate::error::SynthesisError;

/// Where the image lives in a response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImagePayload {
    /// Base64 data carried in the response itself
    Inline {
        /// MIME type, when the response names one
        mime_type: Option<String>,
        /// Still base64-encoded
        data: String,
    },
    /// A hosted image that needs a follow-up GET
    Url(String),
}

/// Known response shapes, in the order they are tried.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageDecoder {
    /// `candidates[].content.parts[].inlineData { mimeType, data }`
    InlineData,
    /// `parts[].fileData.fileUri`, top-level `url`, or `data[].url`
    HostedUrl,
    /// Top-level `images: [...]` of strings or `{ bytesBase64Encoded | b64_json | data }`
    ImagesArray,
}

impl ImageDecoder {
    /// Order in which decoders are attempted.
    pub const ORDER: [ImageDecoder; 3] = [
        ImageDecoder::InlineData,
        ImageDecoder::HostedUrl,
        ImageDecoder::ImagesArray,
    ];

    /// Tries this decoder against a response body.
    pub fn decode(self, body: &Value) -> Option<ImagePayload> {
        match self {
            ImageDecoder::InlineData => parts(body).find_map(|part| {
                let inline = part.get("inlineData").or_else(|| part.get("inline_data"))?;
                let data = non_empty_str(inline.get("data"))?;
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some(ImagePayload::Inline {
                    mime_type,
                    data: data.to_string(),
                })
            }),
            ImageDecoder::HostedUrl => parts(body)
                .find_map(|part| {
                    let file = part.get("fileData").or_else(|| part.get("file_data"))?;
                    non_empty_str(file.get("fileUri").or_else(|| file.get("file_uri")))
                })
                .or_else(|| non_empty_str(body.get("url")))
                .or_else(|| {
                    body.get("data")?
                        .as_array()?
                        .iter()
                        .find_map(|item| non_empty_str(item.get("url")))
                })
                .map(url_or_data_uri),
            ImageDecoder::ImagesArray => {
                body.get("images")?
                    .as_array()?
                    .iter()
                    .find_map(|item| match item {
                        Value::String(s) if !s.is_empty() => Some(url_or_data_uri(s)),
                        Value::Object(_) => {
                            let data = ["bytesBase64Encoded", "b64_json", "data", "image"]
                                .iter()
                                .find_map(|key| non_empty_str(item.get(*key)))?;
                            let mime_type = item
                                .get("mimeType")
                                .and_then(Value::as_str)
                                .map(str::to_string);
                            Some(ImagePayload::Inline {
                                mime_type,
                                data: data.to_string(),
                            })
                        }
                        _ => None,
                    })
            }
        }
    }
}

/// Runs every decoder in order; the first match wins.
pub fn decode_image_response(body: &Value) -> Result<ImagePayload, SynthesisError> {
    ImageDecoder::ORDER
        .iter()
        .find_map(|decoder| decoder.decode(body))
        .ok_or(SynthesisError::NoDecoderMatched)
}

/// Decodes base64, accepting `data:<mime>;base64,` prefixes and line breaks.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, SynthesisError> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(general_purpose::STANDARD.decode(cleaned)?)
}

fn parts(body: &Value) -> impl Iterator<Item = &Value> {
    body.get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|candidate| candidate.get("content")?.get("parts")?.as_array())
        .flatten()
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Strings in URL positions are sometimes data URIs rather than links.
fn url_or_data_uri(value: &str) -> ImagePayload {
    if let Some(rest) = value.strip_prefix("data:")
        && let Some((mime, _)) = rest.split_once(";base64,")
    {
        return ImagePayload::Inline {
            mime_type: Some(mime.to_string()),
            data: value.to_string(),
        };
    }
    if value.starts_with("http://") || value.starts_with("https://") {
        ImagePayload::Url(value.to_string())
    } else {
        ImagePayload::Inline {
            mime_type: None,
            data: value.to_string(),
        }
    }
}
