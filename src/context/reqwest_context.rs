//! Reqwest-based implementation of the `PageContext` trait.
//!
//! Keeps a cookie-storing `reqwest::Client` plus the most recently loaded
//! document. Form interaction is modelled the way a browser would submit it:
//! filled values are recorded against the control's `name`, and submitting
//! collects the enclosing form's fields before replaying it.

use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{ContextFactory, PageContext, PageError};
use crate::markup::{contains, parse_selector};

/// Snapshot of the document currently "displayed" by the context.
#[derive(Debug, Clone)]
struct LoadedPage {
    url: Url,
    html: String,
}

/// HTTP-backed page context.
pub struct ReqwestPageContext {
    client: Client,
    base_url: Url,
    page: Option<LoadedPage>,
    filled: Vec<(String, String)>,
    closed: bool,
}

impl ReqwestPageContext {
    /// Build a context with a fresh cookie jar.
    pub fn new(
        base_url: Url,
        user_agent: &str,
        page_timeout: Duration,
    ) -> Result<Self, PageError> {
        let client = Client::builder()
            .cookie_store(true)
            .gzip(true)
            .user_agent(user_agent)
            .timeout(page_timeout)
            .build()
            .map_err(|err| PageError::Transport(err.to_string()))?;

        Ok(Self::from_client(client, base_url))
    }

    /// Wrap an existing reqwest client. The client should keep cookies,
    /// otherwise the authenticated session is lost after the first redirect.
    pub fn from_client(client: Client, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            page: None,
            filled: Vec::new(),
            closed: false,
        }
    }

    /// URL of the current document, if any.
    pub fn current_url(&self) -> Option<&Url> {
        self.page.as_ref().map(|page| &page.url)
    }

    fn ensure_open(&self) -> Result<(), PageError> {
        if self.closed {
            Err(PageError::Closed)
        } else {
            Ok(())
        }
    }

    fn current(&self) -> Result<&LoadedPage, PageError> {
        self.page.as_ref().ok_or(PageError::NoPage)
    }

    async fn load(&mut self, response: reqwest::Response) -> Result<(), PageError> {
        let url = response.url().clone();
        let status = response.status();
        if !status.is_success() {
            return Err(PageError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let html = response.text().await.map_err(transport)?;
        log::debug!("loaded {} ({} bytes)", url, html.len());
        self.page = Some(LoadedPage { url, html });
        self.filled.clear();
        Ok(())
    }
}

#[async_trait]
impl PageContext for ReqwestPageContext {
    async fn goto(&mut self, url: &Url) -> Result<(), PageError> {
        self.ensure_open()?;
        let response = self.client.get(url.clone()).send().await.map_err(transport)?;
        self.load(response).await
    }

    async fn reload(&mut self) -> Result<(), PageError> {
        self.ensure_open()?;
        let url = self.current()?.url.clone();
        let response = self.client.get(url).send().await.map_err(transport)?;
        self.load(response).await
    }

    fn content(&self) -> &str {
        self.page.as_ref().map(|page| page.html.as_str()).unwrap_or("")
    }

    /// A fetched document never changes until the next navigation, so the
    /// wait resolves against the current markup without sleeping.
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool, PageError> {
        self.ensure_open()?;
        contains(self.content(), selector)
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), PageError> {
        self.ensure_open()?;
        let name = control_name(&self.current()?.html, selector)?;
        match self.filled.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.filled.push((name, value.to_string())),
        }
        Ok(())
    }

    async fn submit_form(&mut self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        self.ensure_open()?;
        let page = self.current()?;
        let plan = plan_form_submission(&page.html, &page.url, selector, &self.filled)?;
        log::debug!("submitting {} {} ({} fields)", plan.method, plan.action, plan.fields.len());

        let request = if plan.method == Method::GET {
            self.client.get(plan.action).query(&plan.fields)
        } else {
            self.client.post(plan.action).form(&plan.fields)
        };

        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| PageError::Timeout(timeout))?
            .map_err(transport)?;
        self.load(response).await
    }

    async fn post_form(
        &mut self,
        path: &str,
        fields: &[(String, String)],
    ) -> Result<String, PageError> {
        self.ensure_open()?;
        let url = self.base_url.join(path)?;
        let response = self
            .client
            .post(url.clone())
            .form(fields)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PageError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response.text().await.map_err(transport)
    }

    async fn close(&mut self) -> Result<(), PageError> {
        if !self.closed {
            log::debug!("closing page context for {}", self.base_url);
        }
        self.closed = true;
        self.page = None;
        self.filled.clear();
        Ok(())
    }
}

/// Builds a new [`ReqwestPageContext`] per login attempt.
#[derive(Debug, Clone)]
pub struct ReqwestContextFactory {
    base_url: Url,
    user_agent: String,
    page_timeout: Duration,
}

impl ReqwestContextFactory {
    pub fn new(base_url: Url, user_agent: impl Into<String>, page_timeout: Duration) -> Self {
        Self {
            base_url,
            user_agent: user_agent.into(),
            page_timeout,
        }
    }
}

#[async_trait]
impl ContextFactory for ReqwestContextFactory {
    async fn create(&self) -> Result<Box<dyn PageContext>, PageError> {
        let context =
            ReqwestPageContext::new(self.base_url.clone(), &self.user_agent, self.page_timeout)?;
        Ok(Box::new(context))
    }
}

/// Request derived from a form in the current document.
#[derive(Debug, Clone, PartialEq)]
struct FormPlan {
    method: Method,
    action: Url,
    fields: Vec<(String, String)>,
}

fn transport(err: reqwest::Error) -> PageError {
    PageError::Transport(err.to_string())
}

fn control_name(html: &str, selector: &str) -> Result<String, PageError> {
    let sel = parse_selector(selector)?;
    let doc = Html::parse_document(html);
    let element = doc
        .select(&sel)
        .next()
        .ok_or_else(|| PageError::ElementNotFound(selector.to_string()))?;

    element
        .value()
        .attr("name")
        .or_else(|| element.value().attr("id"))
        .map(str::to_string)
        .ok_or_else(|| PageError::ElementNotFound(format!("{selector} (unnamed control)")))
}

fn plan_form_submission(
    html: &str,
    page_url: &Url,
    selector: &str,
    filled: &[(String, String)],
) -> Result<FormPlan, PageError> {
    static CONTROLS: once_cell::sync::Lazy<Selector> = once_cell::sync::Lazy::new(|| {
        Selector::parse("input[name], textarea[name]").expect("invalid form control selector")
    });

    let sel = parse_selector(selector)?;
    let doc = Html::parse_document(html);
    let element = doc
        .select(&sel)
        .next()
        .ok_or_else(|| PageError::ElementNotFound(selector.to_string()))?;

    let form = std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .find(|el| el.value().name() == "form")
        .ok_or_else(|| PageError::ElementNotFound(format!("form enclosing {selector}")))?;

    let action = match form.value().attr("action").map(str::trim) {
        Some(action) if !action.is_empty() => page_url.join(action)?,
        _ => page_url.clone(),
    };

    let method = match form.value().attr("method") {
        Some(method) if method.eq_ignore_ascii_case("post") => Method::POST,
        _ => Method::GET,
    };

    let mut fields: Vec<(String, String)> = Vec::new();
    for control in form.select(&CONTROLS) {
        let attrs = control.value();
        let Some(name) = attrs.attr("name") else {
            continue;
        };
        let kind = attrs.attr("type").unwrap_or("text").to_ascii_lowercase();
        match kind.as_str() {
            "submit" | "button" | "image" | "reset" | "file" => continue,
            "checkbox" | "radio" if attrs.attr("checked").is_none() => continue,
            _ => {}
        }
        let value = if attrs.name() == "textarea" {
            control.text().collect::<String>()
        } else {
            attrs.attr("value").unwrap_or_default().to_string()
        };
        fields.push((name.to_string(), value));
    }

    for (name, value) in filled {
        match fields.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => entry.1 = value.clone(),
            None => fields.push((name.clone(), value.clone())),
        }
    }

    Ok(FormPlan {
        method,
        action,
        fields,
    })
}
