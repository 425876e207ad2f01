use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use super::client::Snapshot;
use super::{SessionRecord, MISSING_DESCRIPTION};

const ROW_CLASS: &str = "riga_tabella";
const DESCRIPTION_CLASS: &str = "tabelladescrizione";
const NOTE_CLASS: &str = "tabellanote";
const PURCHASE_CLASS: &str = "tabellaacquista";
const PRICE_CLASS: &str = "tabellaprezzo";
const PUBLIC_CLASS: &str = "pubblico";
const STUDENT_CLASS: &str = "studenti";

/// Href used for an anchor that has none: the page itself
const SELF_HREF: &str = "#";

/// Opening (with attributes) or closing div tag
static RE_DIV_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<div\b([^>]*)>|</div\s*>").unwrap());

static RE_CLASS_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)\bclass\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

static RE_ANCHOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<a\b([^>]*)>").unwrap());

static RE_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static RE_NUMERIC_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(?:([0-9]{1,7})|[xX]([0-9a-fA-F]{1,6}));").unwrap());

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// One `<div>` element: where its opening tag starts, its class list, and
/// the span of its content up to the matching `</div>` (if there is one)
#[derive(Debug)]
struct Div<'a> {
    start: usize,
    classes: Vec<&'a str>,
    body_start: usize,
    body_end: Option<usize>,
}

impl Div<'_> {
    fn has(&self, class: &str) -> bool {
        self.classes.iter().any(|c| *c == class)
    }

    /// Content span, clipped to `limit` when the div is never closed
    fn body(&self, limit: usize) -> Range<usize> {
        let end = self.body_end.unwrap_or(limit).min(limit);
        self.body_start..end.max(self.body_start)
    }
}

/// Every div in document order, with closing tags paired by nesting depth.
/// Stray closing tags are ignored.
fn scan_divs(html: &str) -> Vec<Div<'_>> {
    let mut divs: Vec<Div<'_>> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    for cap in RE_DIV_TAG.captures_iter(html) {
        let Some(tag) = cap.get(0) else { continue };
        match cap.get(1) {
            Some(attrs) => {
                open.push(divs.len());
                divs.push(Div {
                    start: tag.start(),
                    classes: class_list(attrs.as_str()),
                    body_start: tag.end(),
                    body_end: None,
                });
            }
            None => {
                if let Some(i) = open.pop() {
                    divs[i].body_end = Some(tag.start());
                }
            }
        }
    }
    divs
}

fn class_list(attrs: &str) -> Vec<&str> {
    RE_CLASS_ATTR
        .captures(attrs)
        .and_then(|cap| cap.get(1).or_else(|| cap.get(2)))
        .map(|m| m.as_str().split_whitespace().collect())
        .unwrap_or_default()
}

/// Turn a page snapshot into session records, in document order.
///
/// Sub-fields are found at any depth inside their row. Missing sub-fields
/// fall back to defaults; a page without rows yields an empty list.
pub fn parse_sessions(snapshot: &Snapshot) -> Vec<SessionRecord> {
    let html = snapshot.html.as_str();
    let divs = scan_divs(html);
    let row_starts: Vec<usize> = divs
        .iter()
        .enumerate()
        .filter(|(_, d)| d.has(ROW_CLASS))
        .map(|(i, _)| i)
        .collect();

    let mut sessions = Vec::new();
    let mut covered = 0;
    for (n, &i) in row_starts.iter().enumerate() {
        let div = &divs[i];
        if div.start < covered {
            // nested inside the previous row
            continue;
        }
        // an unclosed row stops where the next one begins
        let limit = row_starts
            .get(n + 1)
            .map(|&next| divs[next].start)
            .unwrap_or(html.len());
        let body = div.body(limit);
        covered = body.end;

        let row = Row {
            html,
            inner: divs[i + 1..]
                .iter()
                .take_while(|d| d.start < body.end)
                .collect(),
            end: body.end,
        };
        sessions.push(row.parse(snapshot.base_url.as_ref()));
    }
    sessions
}

/// The divs nested anywhere inside one row
struct Row<'h, 'd> {
    html: &'h str,
    inner: Vec<&'d Div<'h>>,
    end: usize,
}

impl<'h> Row<'h, '_> {
    /// Content of the first nested div accepted by `matches`
    fn field(&self, matches: impl Fn(&Div<'_>) -> bool) -> Option<&'h str> {
        self.inner
            .iter()
            .find(|d| matches(d))
            .map(|d| &self.html[d.body(self.end)])
    }

    fn parse(&self, base: Option<&Url>) -> SessionRecord {
        let description = self
            .field(|d| d.has(DESCRIPTION_CLASS))
            .map(extract_text)
            .unwrap_or_else(|| MISSING_DESCRIPTION.to_string());
        let note = self
            .field(|d| d.has(NOTE_CLASS))
            .map(extract_text)
            .unwrap_or_default();
        let purchase_url = self
            .field(|d| d.has(PURCHASE_CLASS))
            .and_then(|cell| purchase_href(cell, base));
        let price_public = self
            .field(|d| d.has(PRICE_CLASS) && d.has(PUBLIC_CLASS))
            .map(extract_text)
            .unwrap_or_default();
        let price_student = self
            .field(|d| d.has(PRICE_CLASS) && d.has(STUDENT_CLASS))
            .map(extract_text)
            .unwrap_or_default();

        SessionRecord::new(description, note, purchase_url)
            .with_prices(price_public, price_student)
    }
}

/// First anchor inside the purchase cell, resolved against the page. An
/// anchor without an href (script-driven buy buttons) points at the page.
fn purchase_href(cell: &str, base: Option<&Url>) -> Option<String> {
    let attrs = RE_ANCHOR.captures(cell)?.get(1)?.as_str();
    let raw = RE_HREF
        .captures(attrs)
        .and_then(|href| href.get(1).or_else(|| href.get(2)))
        .map(|m| decode_entities(m.as_str().trim()))
        .filter(|href| !href.is_empty())
        .unwrap_or_else(|| SELF_HREF.to_string());

    match base.and_then(|b| b.join(&raw).ok()) {
        Some(resolved) => Some(resolved.to_string()),
        None => Some(raw),
    }
}
/// Visible text of an HTML fragment: tags dropped, entities decoded,
/// whitespace collapsed.
pub(crate) fn extract_text(fragment: &str) -> String {
    let stripped = RE_TAG.replace_all(fragment, " ");
    let decoded = decode_entities(&stripped);
    RE_WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

fn decode_entities(s: &str) -> String {
    let named = s
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&euro;", "€")
        .replace("&agrave;", "à")
        .replace("&egrave;", "è")
        .replace("&eacute;", "é")
        .replace("&igrave;", "ì")
        .replace("&ograve;", "ò")
        .replace("&ugrave;", "ù");

    let numeric = RE_NUMERIC_ENTITY.replace_all(&named, |caps: &regex::Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(dec), _) => dec.as_str().parse::<u32>().ok(),
            (_, Some(hex)) => u32::from_str_radix(hex.as_str(), 16).ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    // last, so "&amp;lt;" stays "&lt;"
    numeric.replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::MOCK_PAGE;

    fn snapshot(html: &str) -> Snapshot {
        Snapshot::new(html.to_string(), None)
    }

    fn row(note: &str, purchase: &str) -> String {
        format!(
            r#"<div class="riga_tabella Marzo" data-mese="3">
                <div class="tabelladescrizione">
                    <strong>Lunedì 10 ore 10:00</strong> - Sessione Remota
                </div>
                <div class="tabellaprezzo pubblico">&euro; 145,00</div>
                <div class="tabellaprezzo studenti">€ 130,00</div>
                <div class="tabellanote">{note}</div>
                <div class="tabellaacquista">{purchase}</div>
            </div>"#
        )
    }

    #[test]
    fn test_empty_snapshot_yields_no_sessions() {
        assert!(parse_sessions(&snapshot("")).is_empty());
        let maintenance = "<html><body><p>Manutenzione</p></body></html>";
        assert!(parse_sessions(&snapshot(maintenance)).is_empty());
    }

    #[test]
    fn test_parses_fields_in_document_order() {
        let link = r#"<a href="index.php?f=carrello.php&amp;id=999">Acquista</a>"#;
        let html = format!("{}{}", row("ultimi 2 posti", link), row("Esaurito&nbsp;", ""));
        let sessions = parse_sessions(&snapshot(&html));

        assert_eq!(sessions.len(), 2);
        let first = &sessions[0];
        assert_eq!(first.description, "Lunedì 10 ore 10:00 - Sessione Remota");
        assert_eq!(first.note, "ultimi 2 posti");
        assert_eq!(first.purchase_url.as_deref(), Some("index.php?f=carrello.php&id=999"));
        assert_eq!(first.price_public, "€ 145,00");
        assert_eq!(first.price_student, "€ 130,00");
        assert!(first.has_last_spots());

        let second = &sessions[1];
        assert_eq!(second.note, "Esaurito");
        assert!(second.purchase_url.is_none());
        assert!(!second.is_available());
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let html = r#"<div class="riga_tabella"><div class="altro">x</div></div>"#;
        let sessions = parse_sessions(&snapshot(html));

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].description, MISSING_DESCRIPTION);
        assert_eq!(sessions[0].note, "");
        assert!(!sessions[0].has_purchase_link());
        assert!(sessions[0].is_available());
    }

    #[test]
    fn test_fields_inside_wrapper_divs_are_found() {
        let html = r#"
            <div class="riga_tabella">
                <div class="col">
                    <div class="tabelladescrizione">Mar 11 ore 09:00</div>
                    <div class="col-inner"><div class="tabellanote">Esaurito</div></div>
                </div>
                <div class="col"><div class="tabellaacquista"></div></div>
            </div>
            <div class="riga_tabella">
                <div class="col"><div class="tabellanote">Esaurito</div></div>
                <div class="col">
                    <div class="tabellaacquista">
                        <span><a href="/cart?id=4">Acquista</a></span>
                    </div>
                </div>
            </div>"#;
        let sessions = parse_sessions(&snapshot(html));

        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].description, "Mar 11 ore 09:00");
        assert_eq!(sessions[0].note, "Esaurito");
        assert!(sessions[0].is_sold_out());
        assert!(!sessions[0].is_available());

        assert_eq!(sessions[1].purchase_url.as_deref(), Some("/cart?id=4"));
        assert!(sessions[1].is_available());
    }

    #[test]
    fn test_last_row_ends_at_its_closing_tag() {
        let html = r#"
            <div class="riga_tabella">
                <div class="tabelladescrizione">Ven 14 ore 10:00</div>
                <div class="tabellanote">Esaurito</div>
            </div>
            <div class="footer">
                <div class="tabellaacquista"><a href="/newsletter">Iscriviti</a></div>
            </div>"#;
        let sessions = parse_sessions(&snapshot(html));

        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].purchase_url.is_none());
        assert!(!sessions[0].is_available());
    }

    #[test]
    fn test_unclosed_row_stops_at_next_row() {
        let html = r#"
            <div class="riga_tabella"><div class="tabellanote">Esaurito</div>
            <div class="riga_tabella"><div class="tabellanote">ultimi 3 posti</div></div>"#;
        let sessions = parse_sessions(&snapshot(html));

        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].note, "Esaurito");
        assert_eq!(sessions[1].note, "ultimi 3 posti");
    }

    #[test]
    fn test_relative_link_resolves_against_base() {
        let base = Url::parse("https://exams.example.org/index.php?f=toeic").unwrap();
        let link = r#"<a class="btn" href='index.php?f=carrello.php&amp;id=7'>Acquista</a>"#;
        let sessions = parse_sessions(&Snapshot::new(row("Esaurito", link), Some(base)));

        assert_eq!(
            sessions[0].purchase_url.as_deref(),
            Some("https://exams.example.org/index.php?f=carrello.php&id=7")
        );
        assert!(sessions[0].is_sold_out());
        assert!(sessions[0].is_available());
    }

    #[test]
    fn test_anchor_without_href_links_to_the_page() {
        let base = Url::parse("https://exams.example.org/toeic").unwrap();
        let html = row("Esaurito", r#"<a onclick="buy(7)">Acquista</a>"#);
        let sessions = parse_sessions(&Snapshot::new(html.clone(), Some(base)));

        assert!(sessions[0].has_purchase_link());
        assert!(sessions[0].is_available());
        assert_eq!(
            sessions[0].purchase_url.as_deref(),
            Some("https://exams.example.org/toeic#")
        );

        let unbased = parse_sessions(&snapshot(&html));
        assert_eq!(unbased[0].purchase_url.as_deref(), Some(SELF_HREF));
    }

    #[test]
    fn test_empty_purchase_cell_is_not_a_link() {
        let sessions = parse_sessions(&snapshot(&row("Esaurito", "<span>-</span>")));
        assert!(!sessions[0].has_purchase_link());
        assert!(!sessions[0].is_available());
    }

    #[test]
    fn test_mock_page_has_one_available_row() {
        let sessions = parse_sessions(&snapshot(MOCK_PAGE));
        assert_eq!(sessions.len(), 2);
        assert!(sessions[0].is_available());
        assert!(!sessions[1].is_available());
    }

    #[test]
    fn test_extract_text_decodes_entities() {
        assert_eq!(
            extract_text("Luned&igrave; <b>10</b>&nbsp;&#8211; &#x41;&amp;B"),
            "Lunedì 10 – A&B"
        );
        assert_eq!(extract_text("&amp;lt;"), "&lt;");
    }
}
