//! Minimal vCard reader.
//!
//! Only the `FN` and `TEL` properties are read. Folded lines (continuation
//! lines starting with a space or tab) are joined first, group prefixes such
//! as `item1.TEL` are stripped, and parameters are split on `;`.

use crate::ProtocolError;

/// Phone number entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phone {
    /// Number as written in the card.
    pub number: String,
    /// Network-A user id, from the `waid` parameter.
    pub wa_id: Option<String>,
    /// Marked `TYPE=pref` or `PREF=1`.
    pub preferred: bool,
}

/// Decoded contact card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VCard {
    /// `FN` property.
    pub full_name: Option<String>,
    /// `TEL` properties in card order.
    pub phones: Vec<Phone>,
}

impl VCard {
    /// Parse a vCard 2.1/3.0/4.0 body.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidVCard`] if the text has no
    /// `BEGIN:VCARD` line.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let lines = unfold(input);
        if !lines.iter().any(|line| line.trim().eq_ignore_ascii_case("BEGIN:VCARD")) {
            return Err(ProtocolError::InvalidVCard("missing BEGIN:VCARD".into()));
        }

        let mut card = Self::default();
        for line in &lines {
            let Some((head, value)) = line.split_once(':') else { continue };
            let mut params = head.split(';');
            let name = params.next().unwrap_or_default();
            let name = name.rsplit_once('.').map_or(name, |(_, name)| name);

            if name.eq_ignore_ascii_case("FN") {
                let value = value.trim();
                if !value.is_empty() {
                    card.full_name = Some(value.to_string());
                }
            } else if name.eq_ignore_ascii_case("TEL") {
                let mut phone =
                    Phone { number: value.trim().to_string(), wa_id: None, preferred: false };
                for param in params {
                    let (key, val) = param.split_once('=').unwrap_or(("TYPE", param));
                    if key.eq_ignore_ascii_case("waid") {
                        phone.wa_id = Some(val.to_string());
                    } else if key.eq_ignore_ascii_case("TYPE") {
                        phone.preferred |=
                            val.split(',').any(|kind| kind.eq_ignore_ascii_case("pref"));
                    } else if key.eq_ignore_ascii_case("PREF") {
                        phone.preferred = true;
                    }
                }
                if !phone.number.is_empty() {
                    card.phones.push(phone);
                }
            }
        }
        Ok(card)
    }

    /// Number to share: the preferred one, else one tagged with a Network-A
    /// id, else the first.
    pub fn preferred_phone(&self) -> Option<&Phone> {
        self.phones
            .iter()
            .find(|phone| phone.preferred)
            .or_else(|| self.phones.iter().find(|phone| phone.wa_id.is_some()))
            .or_else(|| self.phones.first())
    }
}

fn unfold(input: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in input.lines() {
        let raw = raw.trim_end_matches('\r');
        if let Some(rest) = raw.strip_prefix([' ', '\t'])
            && let Some(last) = lines.last_mut()
        {
            last.push_str(rest);
            continue;
        }
        lines.push(raw.to_string());
    }
    lines
}
