use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Availability of one exam session as read from its note and purchase link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct Availability {
    /// The note carries the sold-out marker
    pub is_sold_out: bool,
    /// The session can be booked right now
    pub is_available: bool,
    /// The note announces the last few seats
    pub has_last_spots: bool,
}

/// Compiled regex patterns for note classification
static RE_SOLD_OUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)esaurito").unwrap());

static RE_LAST_SPOTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)ultim\w*\s+\d+\s+post").unwrap());

/// Classify a session from its free-text note.
///
/// A purchase link wins over the note: a row that says sold out but still
/// offers a link is reported as available. Notes that match nothing are
/// simply not sold out and not last-spots.
pub fn classify(note: &str, has_purchase_link: bool) -> Availability {
    let is_sold_out = RE_SOLD_OUT.is_match(note);
    Availability {
        is_sold_out,
        is_available: !is_sold_out || has_purchase_link,
        has_last_spots: RE_LAST_SPOTS.is_match(note),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOLD_OUT_NOTES: &[&str] = &[
        "Esaurito",
        "esaurito",
        "ESAURITO ",
        "posti esauriti? no: Esaurito!",
        "EsAuRiTo",
    ];

    #[test]
    fn test_sold_out_without_link_is_unavailable() {
        for note in SOLD_OUT_NOTES {
            let a = classify(note, false);
            assert!(a.is_sold_out, "{note}");
            assert!(!a.is_available, "{note}");
        }
    }

    #[test]
    fn test_purchase_link_overrides_sold_out() {
        for note in SOLD_OUT_NOTES {
            let a = classify(note, true);
            assert!(a.is_sold_out, "{note}");
            assert!(a.is_available, "{note}");
        }
    }

    #[test]
    fn test_detect_last_spots() {
        let a = classify("ultimi 2 posti", false);
        assert!(!a.is_sold_out);
        assert!(a.has_last_spots);
        assert!(a.is_available);

        assert!(classify("Attenzione: ULTIMI 12 POSTI disponibili", false).has_last_spots);
        assert!(classify("ultimo 1 posto", true).has_last_spots);
    }

    #[test]
    fn test_last_spots_requires_digits() {
        assert!(!classify("ultimi posti", false).has_last_spots);
        assert!(!classify("ultimi tre posti", false).has_last_spots);
        assert!(!classify("12 posti", false).has_last_spots);
    }

    #[test]
    fn test_garbled_notes_never_match() {
        for note in ["", "   ", "n/d", "esaur ito", "ult1mi 3 posti", "\u{fffd}\u{fffd}"] {
            let a = classify(note, false);
            assert!(!a.is_sold_out, "{note:?}");
            assert!(!a.has_last_spots, "{note:?}");
            assert!(a.is_available, "{note:?}");
        }
    }

    #[test]
    fn test_availability_invariant_holds() {
        let notes = ["", "Esaurito", "ultimi 3 posti", "esaurito - ultimi 1 posti", "Sold out"];
        for note in notes {
            for link in [false, true] {
                let a = classify(note, link);
                assert_eq!(a.is_available, !a.is_sold_out || link, "{note:?} link={link}");
            }
        }
    }
}
