// src/browser/fake.rs
//! Scripted in-memory browser for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;

use super::{Browser, BrowserError, ElementHandle, Locator, ENTER_KEY};

#[derive(Default)]
struct State {
    /// url prefix -> html
    pages: Vec<(String, String)>,
    current: String,
    visited: Vec<String>,
    scroll_heights: VecDeque<i64>,
    last_height: i64,
    xpath_hits: HashMap<String, usize>,
    failing_clicks: Vec<String>,
    clicks: Vec<String>,
    typed: Vec<(String, String)>,
    submit_redirect: Option<String>,
    quit: bool,
}

pub(crate) struct FakeBrowser {
    state: Mutex<State>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Serve `html` for every url starting with `prefix`. Later pages win.
    pub fn add_page(&self, prefix: &str, html: &str) {
        let mut state = self.state.lock().unwrap();
        state.pages.insert(0, (prefix.to_string(), html.to_string()));
    }

    /// Values returned, in order, for `document.body.scrollHeight`.
    pub fn set_scroll_heights(&self, heights: &[i64]) {
        let mut state = self.state.lock().unwrap();
        state.scroll_heights = heights.iter().copied().collect();
    }

    /// How many elements an xpath lookup returns.
    pub fn set_xpath_hits(&self, expr: &str, count: usize) {
        let mut state = self.state.lock().unwrap();
        state.xpath_hits.insert(expr.to_string(), count);
    }

    /// Clicking the element with this id fails.
    pub fn fail_click(&self, element_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_clicks.push(element_id.to_string());
    }

    /// Where the browser lands after Enter is sent to a field.
    pub fn redirect_on_submit(&self, url: &str) {
        let mut state = self.state.lock().unwrap();
        state.submit_redirect = Some(url.to_string());
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.lock().unwrap().visited.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().typed.clone()
    }

    pub fn has_quit(&self) -> bool {
        self.state.lock().unwrap().quit
    }

    fn current_html(state: &State) -> String {
        state
            .pages
            .iter()
            .find(|(prefix, _)| state.current.starts_with(prefix.as_str()))
            .map(|(_, html)| html.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        state.current = url.to_string();
        state.visited.push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.state.lock().unwrap().current.clone())
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        let state = self.state.lock().unwrap();
        Ok(Self::current_html(&state))
    }

    async fn execute(&self, script: &str, _args: Vec<Value>) -> Result<Value, BrowserError> {
        let mut state = self.state.lock().unwrap();
        if script.contains("return document.body.scrollHeight") {
            if let Some(next) = state.scroll_heights.pop_front() {
                state.last_height = next;
            }
            return Ok(Value::from(state.last_height));
        }
        Ok(Value::Null)
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, BrowserError> {
        let state = self.state.lock().unwrap();
        let count = match locator {
            Locator::Css(selector) => {
                let html = Html::parse_document(&Self::current_html(&state));
                let selector = Selector::parse(selector).map_err(|e| BrowserError::Protocol {
                    error: "invalid selector".into(),
                    message: e.to_string(),
                })?;
                html.select(&selector).count()
            }
            Locator::XPath(expr) => state.xpath_hits.get(expr).copied().unwrap_or(0),
        };
        let (_, raw) = locator.strategy();
        Ok((0..count)
            .map(|i| ElementHandle(format!("{raw}#{i}")))
            .collect())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_clicks.iter().any(|id| id == element.id()) {
            return Err(BrowserError::Protocol {
                error: "element click intercepted".into(),
                message: element.id().to_string(),
            });
        }
        state.clicks.push(element.id().to_string());
        Ok(())
    }

    async fn clear(&self, _element: &ElementHandle) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        if text == ENTER_KEY {
            if let Some(url) = state.submit_redirect.clone() {
                state.current = url;
            }
        } else {
            state.typed.push((element.id().to_string(), text.to_string()));
        }
        Ok(())
    }

    async fn quit(&self) -> Result<(), BrowserError> {
        self.state.lock().unwrap().quit = true;
        Ok(())
    }
}
