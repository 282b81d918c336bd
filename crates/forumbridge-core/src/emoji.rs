//! Single-emoji detection.
//!
//! A reply consisting of exactly one emoji is sent to Network A as a
//! reaction rather than a message. "One emoji" means one emoji sequence:
//! a base pictograph with optional variation selector, skin-tone modifier,
//! keycap, tag sequence, or ZWJ-joined continuation; or a pair of regional
//! indicators (a flag).

const VARIATION_SELECTOR: char = '\u{FE0F}';
const TEXT_SELECTOR: char = '\u{FE0E}';
const ZWJ: char = '\u{200D}';
const KEYCAP: char = '\u{20E3}';

fn is_regional_indicator(c: char) -> bool {
    ('\u{1F1E6}'..='\u{1F1FF}').contains(&c)
}

fn is_skin_tone(c: char) -> bool {
    ('\u{1F3FB}'..='\u{1F3FF}').contains(&c)
}

fn is_tag(c: char) -> bool {
    ('\u{E0020}'..='\u{E007F}').contains(&c)
}

fn is_pictograph(c: char) -> bool {
    matches!(c,
        '\u{00A9}' | '\u{00AE}' | '\u{203C}' | '\u{2049}' | '\u{2122}' | '\u{2139}'
        | '\u{2194}'..='\u{21AA}'
        | '\u{231A}'..='\u{23FF}'
        | '\u{24C2}'
        | '\u{25AA}'..='\u{25FE}'
        | '\u{2600}'..='\u{27BF}'
        | '\u{2934}' | '\u{2935}'
        | '\u{2B05}'..='\u{2B55}'
        | '\u{3030}' | '\u{303D}' | '\u{3297}' | '\u{3299}'
        | '\u{1F000}'..='\u{1F1E5}'
        | '\u{1F200}'..='\u{1F3FA}'
        | '\u{1F400}'..='\u{1FAFF}'
    )
}

fn is_keycap_base(c: char) -> bool {
    c.is_ascii_digit() || c == '#' || c == '*'
}

/// Whether `text` (trimmed) is exactly one emoji.
pub fn is_single_emoji(text: &str) -> bool {
    let mut chars = text.trim().chars().peekable();
    let Some(first) = chars.next() else { return false };

    if is_regional_indicator(first) {
        return chars.next().is_some_and(is_regional_indicator) && chars.next().is_none();
    }

    if is_keycap_base(first) {
        if chars.peek() == Some(&VARIATION_SELECTOR) {
            chars.next();
        }
        return chars.next() == Some(KEYCAP) && chars.next().is_none();
    }

    if !is_pictograph(first) {
        return false;
    }

    while let Some(c) = chars.next() {
        match c {
            VARIATION_SELECTOR | TEXT_SELECTOR => {},
            c if is_skin_tone(c) || is_tag(c) => {},
            ZWJ => match chars.next() {
                Some(next) if is_pictograph(next) => {},
                _ => return false,
            },
            _ => return false,
        }
    }
    true
}
