//! Phone number handling for the messaging channel.
//!
//! Inbound senders arrive as provider JIDs (`5511912345678@s.whatsapp.net`)
//! while customer records keep whatever the receptionist typed
//! (`(11) 91234-5678`). Matching is therefore done on digits only and on a
//! trailing window, see [`PhoneMatchPolicy`].

/// Strips everything that is not an ASCII digit.
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Extracts the sender number from a provider JID. Device suffixes
/// (`5511...:12@s.whatsapp.net`) and the server part are dropped.
pub fn jid_to_digits(remote_jid: &str) -> String {
    let user = remote_jid.split('@').next().unwrap_or_default();
    let user = user.split(':').next().unwrap_or_default();
    digits_only(user)
}

pub fn is_group_jid(remote_jid: &str) -> bool {
    remote_jid.ends_with("@g.us")
}

/// Normalizes a stored number into the single country-code-prefixed digit
/// string the provider expects. Returns `None` when nothing dialable is left.
pub fn normalize_for_send(raw: &str, country_code: &str) -> Option<String> {
    let digits = digits_only(raw);
    let digits = digits.trim_start_matches('0');

    if digits.len() < 8 {
        return None;
    }

    // National numbers are at most 11 digits (area code + 9-digit mobile)
    if digits.starts_with(country_code) && digits.len() > 11 {
        Some(digits.to_string())
    } else {
        Some(format!("{}{}", country_code, digits))
    }
}

/// Loose matching between an inbound sender and a stored customer phone.
///
/// The last `suffix_len` digits of the inbound number must appear in the
/// digits of the stored number. This tolerates missing or extra country and
/// area codes, and the Brazilian mobile "9" prefix drift on older records,
/// at the price of possible collisions between numbers sharing the same
/// trailing digits. Callers scope candidates by organization first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhoneMatchPolicy {
    pub suffix_len: usize,
}

impl Default for PhoneMatchPolicy {
    fn default() -> Self {
        Self { suffix_len: 8 }
    }
}

impl PhoneMatchPolicy {
    /// The trailing window of an inbound number, or `None` if it is too short
    /// to match safely.
    pub fn key(&self, inbound: &str) -> Option<String> {
        let digits = digits_only(inbound);
        if digits.len() < self.suffix_len {
            return None;
        }
        Some(digits[digits.len() - self.suffix_len..].to_string())
    }

    pub fn matches(&self, stored: &str, inbound: &str) -> bool {
        match self.key(inbound) {
            Some(key) => digits_only(stored).contains(&key),
            None => false,
        }
    }
}
