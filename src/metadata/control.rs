// SPDX-License-Identifier: MIT OR Apache-2.0

//! Control-XML documents: the literal strings a channel's `process_control`
//! recognizes, distinct from the typed-metadata item stream (which is
//! `0xFD`-prefixed binary, not UTF-8). These never appear as items inside a
//! typed-metadata stream; a Metadata frame's payload is either one or the
//! other, distinguished by its first byte.

use crate::types::{Quality, SenderInfo};

/// One recognized control document. Unrecognized or malformed XML is simply
/// not matched by [`parse`]; the caller treats the frame as an opaque
/// metadata payload instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlDocument {
    SubscribeVideo,
    SubscribeAudio,
    SubscribeMetadata,
    TallyPreviewProgram,
    TallyProgram,
    TallyPreview,
    TallyNone,
    PreviewVideoOn,
    PreviewVideoOff,
    SuggestedQuality(Quality),
    SenderInfo(SenderInfo),
    Redirect { address: String },
}

/// Recognizes a control document from a UTF-8 metadata-frame payload.
/// Returns `None` for anything that isn't one of the literal strings (or one
/// of the two attribute-carrying element shapes) this table defines.
pub fn parse(payload: &[u8]) -> Option<ControlDocument> {
    let text = std::str::from_utf8(payload).ok()?.trim();
    match text {
        "<SubscribeVideo/>" => return Some(ControlDocument::SubscribeVideo),
        "<SubscribeAudio/>" => return Some(ControlDocument::SubscribeAudio),
        "<SubscribeMetadata/>" => return Some(ControlDocument::SubscribeMetadata),
        "<TallyPreviewProgram/>" => return Some(ControlDocument::TallyPreviewProgram),
        "<TallyProgram/>" => return Some(ControlDocument::TallyProgram),
        "<TallyPreview/>" => return Some(ControlDocument::TallyPreview),
        "<TallyNone/>" => return Some(ControlDocument::TallyNone),
        "<PreviewVideoOn/>" => return Some(ControlDocument::PreviewVideoOn),
        "<PreviewVideoOff/>" => return Some(ControlDocument::PreviewVideoOff),
        _ => {}
    }
    if let Some(attrs) = element_attrs(text, "SuggestedQuality") {
        let quality = Quality::parse(attrs.get("Quality")?)?;
        return Some(ControlDocument::SuggestedQuality(quality));
    }
    if let Some(attrs) = element_attrs(text, "Redirect") {
        return Some(ControlDocument::Redirect {
            address: attrs.get("Address")?.clone(),
        });
    }
    if let Some(attrs) = element_attrs(text, "SenderInfo") {
        return Some(ControlDocument::SenderInfo(SenderInfo {
            name: attrs.get("Name").cloned().unwrap_or_default(),
            product_name: attrs.get("ProductName").cloned(),
            product_version: attrs.get("ProductVersion").cloned(),
            vendor_name: attrs.get("VendorName").cloned(),
        }));
    }
    None
}

/// A minimal single-element attribute parser: enough to read
/// `<Tag Attr1="v1" Attr2="v2"/>`. Not a general XML parser; the control
/// surface is a closed, literal set of self-closing elements.
fn element_attrs(text: &str, tag: &str) -> Option<std::collections::HashMap<String, String>> {
    let prefix = format!("<{tag}");
    if !text.starts_with(&prefix) || !text.ends_with("/>") {
        return None;
    }
    let body = &text[prefix.len()..text.len() - 2];
    let mut attrs = std::collections::HashMap::new();
    let mut rest = body.trim_start();
    while !rest.is_empty() {
        let eq = rest.find('=')?;
        let key = rest[..eq].trim().to_string();
        rest = rest[eq + 1..].trim_start();
        let quote = rest.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        rest = &rest[1..];
        let end = rest.find(quote)?;
        let value = rest[..end].to_string();
        rest = rest[end + 1..].trim_start();
        attrs.insert(key, value);
    }
    Some(attrs)
}

/// Serializes a control document back to its literal wire form, for the
/// sender side of the exchange (e.g. a `Receiver` sending `SubscribeVideo`).
pub fn encode(doc: &ControlDocument) -> String {
    match doc {
        ControlDocument::SubscribeVideo => "<SubscribeVideo/>".to_string(),
        ControlDocument::SubscribeAudio => "<SubscribeAudio/>".to_string(),
        ControlDocument::SubscribeMetadata => "<SubscribeMetadata/>".to_string(),
        ControlDocument::TallyPreviewProgram => "<TallyPreviewProgram/>".to_string(),
        ControlDocument::TallyProgram => "<TallyProgram/>".to_string(),
        ControlDocument::TallyPreview => "<TallyPreview/>".to_string(),
        ControlDocument::TallyNone => "<TallyNone/>".to_string(),
        ControlDocument::PreviewVideoOn => "<PreviewVideoOn/>".to_string(),
        ControlDocument::PreviewVideoOff => "<PreviewVideoOff/>".to_string(),
        ControlDocument::SuggestedQuality(q) => format!("<SuggestedQuality Quality=\"{}\"/>", q.name()),
        ControlDocument::Redirect { address } => format!("<Redirect Address=\"{address}\"/>"),
        ControlDocument::SenderInfo(fields) => {
            let mut attrs = String::new();
            if !fields.name.is_empty() {
                attrs.push_str(&format!(" Name=\"{}\"", fields.name));
            }
            if let Some(v) = &fields.product_name {
                attrs.push_str(&format!(" ProductName=\"{v}\""));
            }
            if let Some(v) = &fields.product_version {
                attrs.push_str(&format!(" ProductVersion=\"{v}\""));
            }
            if let Some(v) = &fields.vendor_name {
                attrs.push_str(&format!(" VendorName=\"{v}\""));
            }
            format!("<SenderInfo{attrs}/>")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_bare_elements() {
        assert_eq!(parse(b"<SubscribeVideo/>"), Some(ControlDocument::SubscribeVideo));
        assert_eq!(parse(b"<TallyPreviewProgram/>"), Some(ControlDocument::TallyPreviewProgram));
        assert_eq!(parse(b"<PreviewVideoOff/>"), Some(ControlDocument::PreviewVideoOff));
    }

    #[test]
    fn parses_suggested_quality_attribute() {
        assert_eq!(
            parse(b"<SuggestedQuality Quality=\"Low\"/>"),
            Some(ControlDocument::SuggestedQuality(Quality::Low))
        );
        assert_eq!(parse(b"<SuggestedQuality Quality=\"Bogus\"/>"), None);
    }

    #[test]
    fn parses_redirect_address() {
        assert_eq!(
            parse(b"<Redirect Address=\"10.0.0.5:6400\"/>"),
            Some(ControlDocument::Redirect {
                address: "10.0.0.5:6400".to_string()
            })
        );
    }

    #[test]
    fn parses_sender_info_subset_of_attributes() {
        let doc = parse(b"<SenderInfo Name=\"CAM1\" VendorName=\"Acme\"/>").unwrap();
        assert_eq!(
            doc,
            ControlDocument::SenderInfo(SenderInfo {
                name: "CAM1".to_string(),
                product_name: None,
                product_version: None,
                vendor_name: Some("Acme".to_string()),
            })
        );
    }

    #[test]
    fn non_control_payload_is_not_parsed() {
        assert_eq!(parse(b"not xml at all"), None);
        assert_eq!(parse(&[0xFD, 0x01, 0x00, 0x00, 0x00]), None);
    }

    #[test]
    fn encode_round_trips_through_parse() {
        let doc = ControlDocument::SuggestedQuality(Quality::High);
        let text = encode(&doc);
        assert_eq!(parse(text.as_bytes()), Some(doc));
    }
}
