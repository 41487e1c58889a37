//! Selector heuristics for the catalog's generated markup.
//!
//! The search page exposes no stable identifiers, so every lookup is an
//! ordered list of independent matchers evaluated lazily until one hits.
//! Keeping the lists as data means a markup change is a one-line addition
//! here, not a new code path.

use regex::Regex;
use std::sync::OnceLock;

/// One element lookup strategy: a CSS selector, optionally narrowed to
/// elements whose visible text contains a fragment.
#[derive(Debug, Clone, Copy)]
pub struct ElementMatcher {
    pub selector: &'static str,
    pub text: Option<&'static str>,
}

impl ElementMatcher {
    const fn css(selector: &'static str) -> Self {
        Self {
            selector,
            text: None,
        }
    }

    const fn with_text(selector: &'static str, text: &'static str) -> Self {
        Self {
            selector,
            text: Some(text),
        }
    }
}

/// A filter control on the search form. Each control is a custom dropdown
/// button showing an "All ..." placeholder until a value is picked.
#[derive(Debug, Clone, Copy)]
pub struct FilterField {
    /// Name used in logs when the control cannot be driven.
    pub name: &'static str,
    pub openers: &'static [ElementMatcher],
}

pub const GIFT_FIELD: FilterField = FilterField {
    name: "gift",
    openers: &[
        ElementMatcher::with_text("button", "All gifts"),
        ElementMatcher::with_text("button[aria-haspopup=\"listbox\"]", "All gifts"),
        ElementMatcher::with_text("button[type=\"button\"]", "All gifts"),
        ElementMatcher::with_text("button[class*=\"w-full\"]", "All gifts"),
    ],
};

pub const MODEL_FIELD: FilterField = FilterField {
    name: "model",
    openers: &[
        ElementMatcher::with_text("button", "All models"),
        ElementMatcher::with_text("button[aria-haspopup=\"listbox\"]", "All models"),
        ElementMatcher::with_text("button[type=\"button\"]", "All models"),
        ElementMatcher::with_text("button[class*=\"w-full\"]", "All models"),
    ],
};

pub const BACKGROUND_FIELD: FilterField = FilterField {
    name: "background",
    openers: &[
        ElementMatcher::with_text("button", "All backgrounds"),
        ElementMatcher::with_text("button[aria-haspopup=\"listbox\"]", "All backgrounds"),
        ElementMatcher::with_text("button[type=\"button\"]", "All backgrounds"),
        ElementMatcher::with_text("button[class*=\"w-full\"]", "All backgrounds"),
    ],
};

pub const PATTERN_FIELD: FilterField = FilterField {
    name: "pattern",
    openers: &[
        ElementMatcher::with_text("button", "All patterns"),
        ElementMatcher::with_text("button[aria-haspopup=\"listbox\"]", "All patterns"),
        ElementMatcher::with_text("button[type=\"button\"]", "All patterns"),
        ElementMatcher::with_text("button[class*=\"w-full\"]", "All patterns"),
    ],
};

/// Search input that appears inside an opened dropdown panel.
pub const DROPDOWN_SEARCH_INPUTS: &[&str] = &[
    "input[placeholder=\"Search...\"]",
    "input[type=\"text\"][placeholder=\"Search...\"]",
    "div[role=\"listbox\"] input[placeholder=\"Search...\"]",
    "input[class*=\"bg-gray-700\"]",
];

/// Option rows inside an opened dropdown panel.
pub const DROPDOWN_OPTIONS: &[&str] = &[
    "[role=\"option\"]",
    "div[role=\"option\"]",
    "div[class*=\"cursor-pointer\"]",
];

/// The search submit button.
pub const SEARCH_BUTTONS: &[ElementMatcher] = &[
    ElementMatcher::with_text("button", "Найти"),
    ElementMatcher::with_text("button", "Find"),
    ElementMatcher::with_text("button", "Search"),
    ElementMatcher::css("button[type=\"submit\"]"),
    ElementMatcher::css("[data-testid*=\"search\" i]"),
    ElementMatcher::css("button[class*=\"search\" i]"),
];

/// Signs that results have rendered. The counter element comes first; the
/// rest are progressively vaguer containers.
pub const RESULT_INDICATORS: &[&str] = &[
    "span.font-medium.text-white",
    "[class*=\"result\" i]",
    "[data-testid*=\"result\" i]",
    "[class*=\"gift\" i]",
    "[class*=\"item\" i]",
];

/// The authoritative result counter.
pub const COUNT_ELEMENT: &str = "span.font-medium.text-white";

/// Vaguer counter candidates tried after the authoritative element.
pub const COUNT_FALLBACKS: &[&str] = &["[class*=\"count\" i]", "[data-testid*=\"count\" i]"];

/// Gift card containers, for item extraction.
pub const ITEM_CONTAINERS: &[&str] = &[
    "[class*=\"gift\" i]",
    "[class*=\"item\" i]",
    "[data-testid*=\"gift\" i]",
];

/// Card images, used as a last-resort proxy for the result count.
pub const CARD_IMAGES: &[&str] = &[
    "img[src*=\"gift\"]",
    "img[alt*=\"gift\" i]",
    "[class*=\"gift\" i] img",
    "[class*=\"item\" i] img",
];

/// Counting card elements stops being believable above this.
pub const CARD_COUNT_CAP: usize = 100;

/// Blocking subscription overlay on the results page.
pub const SUBSCRIBE_MODAL: &str = "#subscribe-modal-portal";

pub const MODAL_CLOSE_BUTTONS: &[ElementMatcher] = &[
    ElementMatcher::css("button[aria-label=\"Close\"]"),
    ElementMatcher::css("button[aria-label=\"close\"]"),
    ElementMatcher::with_text("button", "×"),
    ElementMatcher::with_text("button", "✕"),
    ElementMatcher::css("button[class*=\"close\" i]"),
    ElementMatcher::css("[data-testid=\"close\"]"),
    ElementMatcher::css(".close-button"),
];

/// Results grid on the search page, exact Tailwind class chain first.
pub const RESULT_GRIDS: &[&str] = &[
    "div.grid.gap-2.md\\:gap-3.grid-cols-3.sm\\:grid-cols-4.md\\:grid-cols-5.lg\\:grid-cols-6.mb-5",
    "div.grid[class*=\"grid-cols\"]",
];

/// Deep link anchor on a gift detail view.
pub const GIFT_LINK_ANCHOR: &str = "a[href*=\"t.me/nft/\"]";

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\d,]+").expect("static regex"))
}

fn found_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:Найдено|Found):\s*([\d,]+)").expect("static regex"))
}

/// Parse the first number out of a counter element's text, tolerating
/// thousands separators ("1,234 results" -> 1234).
pub fn parse_count_text(text: &str) -> Option<i64> {
    let m = digits_re().find(text)?;
    m.as_str().replace(',', "").parse().ok()
}

/// Parse a "Found: N" / "Найдено: N" label out of free-running page text.
pub fn parse_found_label(text: &str) -> Option<i64> {
    let caps = found_label_re().captures(text)?;
    caps[1].replace(',', "").parse().ok()
}

/// Derive a t.me deep link from a gift detail page URL.
pub fn gift_link_from_url(url: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"/gifts/([^/?#]+)").expect("static regex"));
    let caps = re.captures(url)?;
    Some(format!("https://t.me/nft/{}", &caps[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_text_strips_thousands_separators() {
        assert_eq!(parse_count_text("1,234 gifts"), Some(1234));
        assert_eq!(parse_count_text("Found: 42"), Some(42));
        assert_eq!(parse_count_text("no numbers here"), None);
    }

    #[test]
    fn found_label_matches_both_languages() {
        assert_eq!(parse_found_label("Найдено: 1,500"), Some(1500));
        assert_eq!(parse_found_label("found: 7 items"), Some(7));
        assert_eq!(parse_found_label("7 items"), None);
    }

    #[test]
    fn gift_link_derived_from_detail_url() {
        assert_eq!(
            gift_link_from_url("https://peek.tg/gifts/PlushPepe-1234?ref=x"),
            Some("https://t.me/nft/PlushPepe-1234".to_string())
        );
        assert_eq!(gift_link_from_url("https://peek.tg/search"), None);
    }

    #[test]
    fn matcher_tables_put_precise_strategies_first() {
        assert_eq!(GIFT_FIELD.openers[0].text, Some("All gifts"));
        assert_eq!(RESULT_INDICATORS[0], COUNT_ELEMENT);
        assert!(SEARCH_BUTTONS.iter().any(|m| m.text.is_none()));
    }
}
