// src/scraping/people.rs
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::browser::navigator::people_search_url;
use crate::browser::{pause, wait_for, Browser, BrowserError, Locator, Pacing};
use crate::tasks::{CancelToken, Progress};

const CONNECT_BUTTON_XPATH: &str =
    "//button[contains(@aria-label, 'Invite') and contains(@aria-label, 'to connect')]";
const SEND_WITHOUT_NOTE_XPATH: &str =
    "//button[contains(@class, 'artdeco-button') and contains(@class, 'artdeco-button--primary')]";
const SCROLL_STEP: &str = "window.scrollBy(0, 500);";
const SCROLL_STEPS: usize = 3;
const CENTER_SCRIPT: &str = "arguments[0].scrollIntoView({block: 'center'});";

/// Sends connection invitations from people search results.
pub struct PeopleConnector {
    browser: Arc<dyn Browser>,
    pacing: Pacing,
}

impl PeopleConnector {
    pub fn new(browser: Arc<dyn Browser>, pacing: Pacing) -> Self {
        Self { browser, pacing }
    }

    /// Returns the number of invitations sent across all pages.
    pub async fn search_and_connect(
        &self,
        query: &str,
        pages: u32,
        cancel: &CancelToken,
        progress: Progress<'_>,
    ) -> Result<usize, BrowserError> {
        let mut total = 0;

        for page in 1..=pages.max(1) {
            if cancel.is_cancelled() {
                info!("People search cancelled at page {}", page);
                break;
            }
            info!("Fetching people page {}/{}", page, pages);
            self.browser.goto(&people_search_url(query, page)).await?;
            pause(self.pacing.page_load).await;

            for _ in 0..SCROLL_STEPS {
                self.browser.execute(SCROLL_STEP, Vec::new()).await?;
                pause(self.pacing.action_delay).await;
            }

            let sent = self.click_connect_buttons(cancel).await;
            total += sent;
            progress(format!("Page {}/{}: {} invitations sent", page, pages, sent));
        }

        info!("Total 'Connect' buttons clicked across {} pages: {}", pages, total);
        Ok(total)
    }

    async fn click_connect_buttons(&self, cancel: &CancelToken) -> usize {
        let buttons = match wait_for(
            self.browser.as_ref(),
            &Locator::xpath(CONNECT_BUTTON_XPATH),
            &self.pacing,
        )
        .await
        {
            Ok(buttons) => buttons,
            Err(e) => {
                warn!("No 'Connect' buttons found: {}", e);
                return 0;
            }
        };
        info!("Found {} 'Connect' buttons", buttons.len());

        let mut sent = 0;
        for (index, button) in buttons.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let clicked = async {
                self.browser.execute(CENTER_SCRIPT, vec![button.as_arg()]).await?;
                self.browser.click(button).await
            }
            .await;
            if let Err(e) = clicked {
                error!("Failed to click 'Connect' button #{}: {}", index + 1, e);
                continue;
            }
            pause(self.pacing.action_delay).await;
            self.dismiss_note_dialog().await;
            sent += 1;
        }
        sent
    }

    async fn dismiss_note_dialog(&self) {
        let found = self
            .browser
            .find_all(&Locator::xpath(SEND_WITHOUT_NOTE_XPATH))
            .await
            .unwrap_or_default();
        match found.first() {
            Some(send) => match self.browser.click(send).await {
                Ok(()) => info!("Clicked 'Send without a note'"),
                Err(e) => warn!("Could not confirm invitation dialog: {}", e),
            },
            None => info!("No 'Add a note' popup appeared, continuing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakeBrowser;

    #[tokio::test]
    async fn test_connect_counts_successful_clicks_per_page() {
        let fake = Arc::new(FakeBrowser::new());
        fake.set_xpath_hits(CONNECT_BUTTON_XPATH, 3);
        fake.set_xpath_hits(SEND_WITHOUT_NOTE_XPATH, 1);
        fake.fail_click(&format!("{CONNECT_BUTTON_XPATH}#1"));
        let connector = PeopleConnector::new(fake.clone(), Pacing::immediate());

        let sent = connector
            .search_and_connect("rust recruiter", 2, &CancelToken::new(), &|_| {})
            .await
            .unwrap();

        assert_eq!(sent, 4);
        // the failed button is skipped; each invitation is confirmed without a note
        let connect = |i: usize| format!("{CONNECT_BUTTON_XPATH}#{i}");
        let confirm = format!("{SEND_WITHOUT_NOTE_XPATH}#0");
        let first_page = vec![connect(0), confirm.clone(), connect(2), confirm.clone()];
        let clicks = fake.clicks();
        assert_eq!(clicks.len(), 8);
        assert_eq!(clicks[..4], first_page[..]);
        assert_eq!(clicks[4..], first_page[..]);
        assert!(fake
            .visited()
            .contains(&"https://www.linkedin.com/search/results/people/?keywords=rust+recruiter&page=2".to_string()));
    }

    #[tokio::test]
    async fn test_page_without_buttons_sends_nothing() {
        let fake = Arc::new(FakeBrowser::new());
        let connector = PeopleConnector::new(fake, Pacing::immediate());
        let sent = connector
            .search_and_connect("nobody", 1, &CancelToken::new(), &|_| {})
            .await
            .unwrap();
        assert_eq!(sent, 0);
    }
}
