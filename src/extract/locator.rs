//! Ordered fallback chains for locating a field inside a page fragment
//!
//! Each logical field is described by a list of `Locator`s. They are tried in
//! order and the first non-empty value wins, so a change in the site markup
//! degrades to the next candidate instead of losing the field.

use scraper::{ElementRef, Selector};

/// One way of reading a value out of an element subtree
#[derive(Clone, Copy)]
pub enum Locator {
    /// Text content of the first element matching the selector
    Text(&'static str),
    /// Attribute value of the first element matching the selector
    Attr(&'static str, &'static str),
    /// Arbitrary pure strategy
    Custom(fn(ElementRef<'_>) -> Option<String>),
}

impl Locator {
    /// Applies this locator to an element subtree
    pub fn locate(&self, root: ElementRef<'_>) -> Option<String> {
        match self {
            Self::Text(css) => select_first(root, css)
                .map(element_text)
                .filter(|text| !text.is_empty()),
            Self::Attr(css, attr) => select_first(root, css)
                .and_then(|el| el.value().attr(attr))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            Self::Custom(strategy) => strategy(root).filter(|value| !value.is_empty()),
        }
    }
}

impl std::fmt::Debug for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(css) => write!(f, "Text({})", css),
            Self::Attr(css, attr) => write!(f, "Attr({}, {})", css, attr),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Tries each locator in order and returns the first non-empty value
pub fn first_match(root: ElementRef<'_>, locators: &[Locator]) -> Option<String> {
    locators.iter().find_map(|locator| locator.locate(root))
}

/// Like `first_match`, but keeps only values accepted by `parse`
///
/// A locator that finds text which does not parse falls through to the next
/// one.
pub fn first_parsed<T>(
    root: ElementRef<'_>,
    locators: &[Locator],
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    locators
        .iter()
        .filter_map(|locator| locator.locate(root))
        .find_map(|value| parse(&value))
}

/// Returns the first descendant matching `css`
///
/// Invalid selectors are treated as "no match".
pub fn select_first<'a>(root: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    root.select(&selector).next()
}

/// Returns every descendant matching `css`
pub fn select_all<'a>(root: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => root.select(&selector).collect(),
        Err(_) => {
            tracing::debug!("Ignoring invalid selector: {}", css);
            Vec::new()
        }
    }
}

/// Text content with whitespace collapsed to single spaces
///
/// Separate text nodes are joined by a space, so sibling blocks such as
/// `<div>street</div><div>city</div>` do not run together.
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max` characters on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
