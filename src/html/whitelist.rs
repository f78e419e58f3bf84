//! Tag, attribute, and attribute-value whitelists for the client's HTML
//! subset.
//!
//! Lookups take uppercase names; the tokenizer normalizes case before
//! calling in. Anything absent from these tables is dropped by the
//! composer.

/// Every tag the client understands.
pub const SUPPORTED_TAGS: &[&str] = &[
    "A", "ADDRESS", "AREA", "B", "BASE", "BASEFONT", "BLINK", "BLOCKQUOTE",
    "BODY", "BGCOLOR", "BR", "CLEAR", "CENTER", "CAPTION", "CITE", "CODE",
    "DD", "DIR", "DIV", "DL", "DT", "FONT", "FORM", "FRAME", "FRAMESET",
    "H1", "H2", "H3", "H4", "H5", "H6", "HEAD", "HR", "I", "IMG", "INPUT",
    "ISINDEX", "KBD", "LI", "MAP", "META", "MULTICOL", "NOBR", "NOFRAMES",
    "OL", "OPTION", "P", "PLAINTEXT", "PRE", "S", "SELECT", "SMALL",
    "STRIKE", "STRONG", "STYLE", "SUB", "SUP", "TABLE", "TITLE",
    "TD", "TH", "TR", "TT", "U", "UL", "VAR", "XMP",
];

/// Tags that never take an end tag.
pub const VOID_TAGS: &[&str] = &[
    "AREA", "BASE", "BASEFONT", "BR", "FRAME", "HR", "IMG", "INPUT",
    "ISINDEX", "META",
];

/// Attributes the client understands, per tag. Tags not listed keep no
/// attributes at all.
const TAG_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("A", &["HREF", "NAME", "TARGET", "ONCLICK"]),
    ("AREA", &["SHAPE", "COORDS", "HREF", "ALT", "TARGET"]),
    ("BASE", &["HREF"]),
    ("BASEFONT", &["SIZE", "COLOR", "FACE"]),
    ("BODY", &["BGCOLOR", "TEXT", "LINK", "VLINK", "ALINK"]),
    ("BR", &["CLEAR"]),
    ("CAPTION", &["ALIGN"]),
    ("DIV", &["ALIGN"]),
    ("FONT", &["SIZE", "COLOR", "FACE"]),
    ("FORM", &["ACTION", "METHOD", "NAME", "TARGET"]),
    ("FRAME", &["SRC", "NAME", "SCROLLING", "NORESIZE"]),
    ("FRAMESET", &["ROWS", "COLS"]),
    ("H1", &["ALIGN"]),
    ("H2", &["ALIGN"]),
    ("H3", &["ALIGN"]),
    ("H4", &["ALIGN"]),
    ("H5", &["ALIGN"]),
    ("H6", &["ALIGN"]),
    ("HR", &["ALIGN", "SIZE", "WIDTH", "NOSHADE"]),
    (
        "IMG",
        &["WIDTH", "HEIGHT", "BORDER", "HSPACE", "VSPACE", "ALIGN", "ISMAP", "USEMAP", "ALT", "SRC"],
    ),
    ("INPUT", &["TYPE", "NAME", "VALUE", "SIZE", "MAXLENGTH", "CHECKED"]),
    ("ISINDEX", &["PROMPT"]),
    ("LI", &["TYPE", "VALUE"]),
    ("MAP", &["NAME"]),
    ("META", &["HTTP-EQUIV", "CONTENT", "NAME"]),
    ("MULTICOL", &["COLS"]),
    ("OL", &["TYPE", "START"]),
    ("OPTION", &["VALUE", "SELECTED"]),
    ("P", &["ALIGN"]),
    ("PRE", &["WIDTH"]),
    ("SELECT", &["NAME", "SIZE", "MULTIPLE"]),
    ("TABLE", &["BORDER", "WIDTH", "CELLPADDING", "CELLSPACING", "ALIGN", "BGCOLOR"]),
    (
        "TD",
        &["ALIGN", "VALIGN", "COLSPAN", "ROWSPAN", "WIDTH", "HEIGHT", "NOWRAP", "BGCOLOR"],
    ),
    (
        "TH",
        &["ALIGN", "VALIGN", "COLSPAN", "ROWSPAN", "WIDTH", "HEIGHT", "NOWRAP", "BGCOLOR"],
    ),
    ("TR", &["ALIGN", "VALIGN", "BGCOLOR"]),
    ("UL", &["TYPE"]),
];

const HORIZONTAL_ALIGN: &[&str] = &["LEFT", "CENTER", "RIGHT"];
const VERTICAL_ALIGN: &[&str] = &["TOP", "MIDDLE", "BOTTOM", "BASELINE"];
const LIST_TYPES: &[&str] = &["1", "A", "I", "DISC", "CIRCLE", "SQUARE"];

/// Value enumerations, per (tag, attribute). Attributes not listed accept
/// any value.
const ATTRIBUTE_VALUES: &[(&str, &str, &[&str])] = &[
    ("AREA", "SHAPE", &["RECT", "CIRCLE", "POLY", "DEFAULT"]),
    ("BR", "CLEAR", &["LEFT", "RIGHT", "ALL", "NONE"]),
    ("DIV", "ALIGN", HORIZONTAL_ALIGN),
    ("FORM", "METHOD", &["GET", "POST"]),
    ("HR", "ALIGN", HORIZONTAL_ALIGN),
    ("IMG", "ALIGN", &["TOP", "MIDDLE", "BOTTOM", "LEFT", "RIGHT"]),
    (
        "INPUT",
        "TYPE",
        &["TEXT", "PASSWORD", "CHECKBOX", "RADIO", "SUBMIT", "RESET", "HIDDEN", "IMAGE", "BUTTON"],
    ),
    ("LI", "TYPE", LIST_TYPES),
    ("OL", "TYPE", LIST_TYPES),
    ("UL", "TYPE", LIST_TYPES),
    ("TD", "ALIGN", HORIZONTAL_ALIGN),
    ("TD", "VALIGN", VERTICAL_ALIGN),
    ("TH", "ALIGN", HORIZONTAL_ALIGN),
    ("TH", "VALIGN", VERTICAL_ALIGN),
    ("TR", "ALIGN", HORIZONTAL_ALIGN),
    ("TR", "VALIGN", VERTICAL_ALIGN),
];

/// Is this (uppercase) tag one the client understands?
pub fn is_supported(tag: &str) -> bool {
    SUPPORTED_TAGS.contains(&tag)
}

/// Does this (uppercase) tag close itself?
pub fn is_void(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

/// Is this (uppercase) attribute kept on this tag?
pub fn is_allowed_attribute(tag: &str, attribute: &str) -> bool {
    TAG_ATTRIBUTES
        .iter()
        .find(|(t, _)| *t == tag)
        .is_some_and(|(_, attrs)| attrs.contains(&attribute))
}

/// Is this value acceptable for this (uppercase tag, uppercase attribute)?
///
/// Matching is case-insensitive; the original casing is what gets emitted.
pub fn is_allowed_value(tag: &str, attribute: &str, value: &str) -> bool {
    match ATTRIBUTE_VALUES
        .iter()
        .find(|(t, a, _)| *t == tag && *a == attribute)
    {
        Some((_, _, values)) => values.iter().any(|v| v.eq_ignore_ascii_case(value)),
        None => true,
    }
}
