// SPDX-License-Identifier: MIT OR Apache-2.0

/// Structured fields carried by a `<SenderInfo .../>` control document.
///
/// `original_source/` didn't retain the file that would have fixed these
/// attribute names exactly, so this is the minimal surface spec.md's
/// `SenderInfo` record implies: a name plus the usual product/vendor
/// identification fields a production switcher displays next to a source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SenderInfo {
    pub name: String,
    pub product_name: Option<String>,
    pub product_version: Option<String>,
    pub vendor_name: Option<String>,
}
