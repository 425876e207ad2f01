use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT_LANGUAGE: &str = "it-IT,it;q=0.9,en;q=0.8";

/// Raw page content as seen at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub html: String,
    /// Address relative purchase links are resolved against
    pub base_url: Option<Url>,
}

impl Snapshot {
    pub fn new(html: String, base_url: Option<Url>) -> Self {
        Self { html, base_url }
    }
}

/// Anything that can hand the monitor a fresh snapshot of the session list
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot>;

    /// Short label for logs and the header
    fn describe(&self) -> String;
}

/// Fetches the session page over HTTP
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpSnapshotSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid resource url: {}", url))?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> Result<Snapshot> {
        let response = self
            .client
            .get(self.url.clone())
            .header(reqwest::header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", self.url))?
            .error_for_status()
            .context("Session page returned an error status")?;

        // Redirects may move the page; links are relative to where we landed
        let base = response.url().clone();
        let html = response
            .text()
            .await
            .context("Failed to read session page body")?;

        Ok(Snapshot::new(html, Some(base)))
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

/// Serves the same markup on every fetch
pub struct StaticSnapshotSource {
    snapshot: Snapshot,
    label: String,
}

impl StaticSnapshotSource {
    pub fn new(html: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            snapshot: Snapshot::new(html.into(), None),
            label: label.into(),
        }
    }

    /// The built-in page with one bookable and one sold-out session
    pub fn mock() -> Self {
        Self::new(MOCK_PAGE, "built-in mock page")
    }
}

#[async_trait]
impl SnapshotSource for StaticSnapshotSource {
    async fn fetch(&self) -> Result<Snapshot> {
        Ok(self.snapshot.clone())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Two sessions: the first still bookable with few seats left, the second
/// sold out
pub const MOCK_PAGE: &str = r##"
<div class="riga_tabella Marzo" data-citta="Sessione Remota" data-mese="3">
    <div class="tabelladescrizione">
        <strong>Lunedì 10 ore 10:00</strong>
        - Sessione Remota - <b><font color="#28874A">Versione: Remoto da Casa</font></b>
    </div>
    <div class="tabellaprezzo pubblico">€ 145,00</div>
    <div class="tabellaprezzo studenti">€ 130,00</div>
    <div class="tabellanote">ultimi 2 posti</div>
    <div class="tabellaacquista">
        <a href="https://example.org/index.php?f=carrello.php&amp;id=999">Acquista</a>
    </div>
</div>
<div class="riga_tabella Marzo" data-citta="Sessione Remota" data-mese="3">
    <div class="tabelladescrizione">
        <strong>Lunedì 10 ore 15:00</strong>
        - Sessione Remota
    </div>
    <div class="tabellaprezzo pubblico">€ 145,00</div>
    <div class="tabellaprezzo studenti">€ 130,00</div>
    <div class="tabellanote">Esaurito&nbsp;</div>
    <div class="tabellaacquista"></div>
</div>
"##;
