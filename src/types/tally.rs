// SPDX-License-Identifier: MIT OR Apache-2.0

/// On-air state of a source in a production switcher, as signaled by the
/// remote peer's control-XML documents (see `<TallyPreviewProgram/>` et al.).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub preview: bool,
    pub program: bool,
}

impl Tally {
    pub const NONE: Self = Tally {
        preview: false,
        program: false,
    };
    pub const PREVIEW: Self = Tally {
        preview: true,
        program: false,
    };
    pub const PROGRAM: Self = Tally {
        preview: false,
        program: true,
    };
    pub const PREVIEW_PROGRAM: Self = Tally {
        preview: true,
        program: true,
    };
}
