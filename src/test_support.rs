//! Scripted stand-ins for the page, solver and factory seams.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::auth::LoginState;
use crate::context::{ContextFactory, PageContext, PageError};
use crate::external_deps::captcha::{CaptchaError, CaptchaSolver};
use crate::markup::contains;
use crate::modules::events::{EventHandler, SessionEvent};

/// Authenticated landing view: carries the token, the subject id and the
/// success marker.
pub(crate) const DASHBOARD: &str = r#"<html><head><meta name="_csrf" content="dash-token"/></head>
<body>
  <div class="card-header primaryBorderTop"><span>CGPA and CREDIT Status</span></div>
  <div class="navbar"><span>21BCE1234 (STUDENT)</span></div>
</body></html>"#;

const ROLE_PAGE: &str = r#"<html><body>
  <form id="stdForm" action="/vtop/prelogin/setup" method="post">
    <input type="hidden" name="flag" value="VTOP"/>
    <button type="submit">Student</button>
  </form>
</body></html>"#;

fn login_page(with_captcha: bool) -> String {
    let captcha = if with_captcha {
        r#"<img class="form-control img-fluid bg-light border-0" src="data:image/jpeg;base64,aGVsbG8="/>"#
    } else {
        ""
    };
    format!(
        r#"<html><head><meta name="_csrf" content="login-token"/></head><body>
  <form id="vtopLoginForm" action="/vtop/login" method="post">
    <input type="hidden" name="_csrf" value="login-token"/>
    <input id="username" name="username"/>
    <input id="password" name="password" type="password"/>
    {captcha}
    <input id="captchaStr" name="captchaStr"/>
    <button type="submit">Submit</button>
  </form>
</body></html>"#
    )
}

type Reply = Result<String, u16>;

struct Route {
    path: String,
    when: Option<(String, String)>,
    reply: Reply,
}

/// Canned replies for `post_form`, matched by path and optionally by one field.
#[derive(Default)]
struct Routes {
    routes: Vec<Route>,
}

impl Routes {
    fn add(&mut self, path: &str, when: Option<(&str, &str)>, reply: Result<&str, u16>) {
        self.routes.push(Route {
            path: path.to_string(),
            when: when.map(|(k, v)| (k.to_string(), v.to_string())),
            reply: reply.map(str::to_string),
        });
    }

    fn answer(&self, path: &str, fields: &[(String, String)]) -> Result<String, PageError> {
        let route = self.routes.iter().find(|route| {
            route.path == path
                && route
                    .when
                    .as_ref()
                    .is_none_or(|(k, v)| fields.iter().any(|(fk, fv)| fk == k && fv == v))
        });
        match route.map(|route| &route.reply) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status)) => Err(PageError::Status {
                status: *status,
                url: path.to_string(),
            }),
            None => Err(PageError::Status {
                status: 404,
                url: path.to_string(),
            }),
        }
    }
}

/// A page that shows fixed markup and answers posts from [`Routes`].
pub(crate) struct FakePage {
    html: String,
    filled: Vec<(String, String)>,
    routes: Routes,
    pub posts: Vec<(String, Vec<(String, String)>)>,
    pub closed: bool,
}

impl FakePage {
    pub fn showing(html: &str) -> Self {
        Self {
            html: html.to_string(),
            filled: Vec::new(),
            routes: Routes::default(),
            posts: Vec::new(),
            closed: false,
        }
    }

    pub fn route(mut self, path: &str, reply: Result<&str, u16>) -> Self {
        self.routes.add(path, None, reply);
        self
    }

    pub fn route_when(mut self, path: &str, field: (&str, &str), reply: Result<&str, u16>) -> Self {
        self.routes.add(path, Some(field), reply);
        self
    }

    pub fn filled_value(&self, selector: &str) -> Option<&str> {
        self.filled
            .iter()
            .find(|(sel, _)| sel == selector)
            .map(|(_, value)| value.as_str())
    }
}

#[async_trait]
impl PageContext for FakePage {
    async fn goto(&mut self, _url: &Url) -> Result<(), PageError> {
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), PageError> {
        self.filled.clear();
        Ok(())
    }

    fn content(&self) -> &str {
        &self.html
    }

    async fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> Result<bool, PageError> {
        contains(&self.html, selector)
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), PageError> {
        if !contains(&self.html, selector)? {
            return Err(PageError::ElementNotFound(selector.to_string()));
        }
        self.filled.push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn submit_form(&mut self, _selector: &str, _timeout: Duration) -> Result<(), PageError> {
        Ok(())
    }

    async fn post_form(&mut self, path: &str, fields: &[(String, String)]) -> Result<String, PageError> {
        if self.closed {
            return Err(PageError::Closed);
        }
        self.posts.push((path.to_string(), fields.to_vec()));
        self.routes.answer(path, fields)
    }

    async fn close(&mut self) -> Result<(), PageError> {
        self.closed = true;
        Ok(())
    }
}

/// Scripted login portal: role chooser, credential form with an image
/// challenge, then either the landing view or the form again.
pub(crate) struct FakePortal {
    html: String,
    captcha_after_reloads: u32,
    accept_after_submits: Option<u32>,
    login_response: Option<String>,
    filled: Vec<(String, String)>,
    routes: Routes,
    close_counter: Option<Arc<AtomicU32>>,
    pub posts: Vec<(String, Vec<(String, String)>)>,
    pub reloads: u32,
    pub credential_submits: u32,
    pub submissions: Vec<Vec<(String, String)>>,
    pub closed: bool,
}

impl FakePortal {
    pub fn new() -> Self {
        Self {
            html: String::new(),
            captcha_after_reloads: 0,
            accept_after_submits: Some(1),
            login_response: None,
            filled: Vec::new(),
            routes: Routes::default(),
            close_counter: None,
            posts: Vec::new(),
            reloads: 0,
            credential_submits: 0,
            submissions: Vec::new(),
            closed: false,
        }
    }

    /// The challenge image only renders once the page was reloaded `n` times.
    pub fn captcha_after_reloads(mut self, n: u32) -> Self {
        self.captcha_after_reloads = n;
        self
    }

    /// Accept the `n`-th credential submission; `None` rejects all of them.
    pub fn accept_after_submits(mut self, n: Option<u32>) -> Self {
        self.accept_after_submits = n;
        self
    }

    pub fn respond_to_login_with(mut self, html: &str) -> Self {
        self.login_response = Some(html.to_string());
        self
    }

    pub fn route(mut self, path: &str, reply: Result<&str, u16>) -> Self {
        self.routes.add(path, None, reply);
        self
    }

    fn captcha_visible(&self) -> bool {
        self.reloads >= self.captcha_after_reloads
    }

    fn ensure_open(&self) -> Result<(), PageError> {
        if self.closed { Err(PageError::Closed) } else { Ok(()) }
    }
}

#[async_trait]
impl PageContext for FakePortal {
    async fn goto(&mut self, _url: &Url) -> Result<(), PageError> {
        self.ensure_open()?;
        self.html = ROLE_PAGE.to_string();
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), PageError> {
        self.ensure_open()?;
        self.reloads += 1;
        self.filled.clear();
        self.html = login_page(self.captcha_visible());
        Ok(())
    }

    fn content(&self) -> &str {
        &self.html
    }

    async fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> Result<bool, PageError> {
        self.ensure_open()?;
        contains(&self.html, selector)
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), PageError> {
        self.ensure_open()?;
        if !contains(&self.html, selector)? {
            return Err(PageError::ElementNotFound(selector.to_string()));
        }
        let name = selector.trim_start_matches('#').to_string();
        self.filled.retain(|(existing, _)| *existing != name);
        self.filled.push((name, value.to_string()));
        Ok(())
    }

    async fn submit_form(&mut self, selector: &str, _timeout: Duration) -> Result<(), PageError> {
        self.ensure_open()?;
        if !contains(&self.html, selector)? {
            return Err(PageError::ElementNotFound(selector.to_string()));
        }

        if selector == "#stdForm" {
            self.submissions.push(vec![("flag".to_string(), "VTOP".to_string())]);
            self.html = login_page(self.captcha_visible());
            return Ok(());
        }

        self.submissions.push(std::mem::take(&mut self.filled));
        self.credential_submits += 1;
        let accepted = self
            .accept_after_submits
            .is_some_and(|n| self.credential_submits >= n);

        self.html = if let Some(response) = &self.login_response {
            response.clone()
        } else if accepted {
            DASHBOARD.to_string()
        } else {
            login_page(self.captcha_visible())
        };
        Ok(())
    }

    async fn post_form(&mut self, path: &str, fields: &[(String, String)]) -> Result<String, PageError> {
        self.ensure_open()?;
        self.posts.push((path.to_string(), fields.to_vec()));
        self.routes.answer(path, fields)
    }

    async fn close(&mut self) -> Result<(), PageError> {
        if !self.closed
            && let Some(counter) = &self.close_counter
        {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        self.closed = true;
        Ok(())
    }
}

/// Factory handing out a fresh scripted portal per login.
pub(crate) struct FakeFactory {
    build: Box<dyn Fn() -> FakePortal + Send + Sync>,
    pub created: AtomicU32,
    pub closed: Arc<AtomicU32>,
}

impl FakeFactory {
    pub fn new(build: impl Fn() -> FakePortal + Send + Sync + 'static) -> Self {
        Self {
            build: Box::new(build),
            created: AtomicU32::new(0),
            closed: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn created(&self) -> u32 {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u32 {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextFactory for FakeFactory {
    async fn create(&self) -> Result<Box<dyn PageContext>, PageError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let mut portal = (self.build)();
        portal.close_counter = Some(self.closed.clone());
        Ok(Box::new(portal))
    }
}

/// Always answers with the same text.
pub(crate) struct FixedSolver {
    answer: String,
    pub calls: AtomicU32,
}

impl FixedSolver {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl CaptchaSolver for FixedSolver {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn solve(&self, image: &Bytes) -> Result<String, CaptchaError> {
        assert!(!image.is_empty());
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

pub(crate) struct FailingSolver;

#[async_trait]
impl CaptchaSolver for FailingSolver {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn solve(&self, _image: &Bytes) -> Result<String, CaptchaError> {
        Err(CaptchaError::Provider("classifier offline".into()))
    }
}

/// Keeps every dispatched event.
#[derive(Default)]
pub(crate) struct RecordingHandler {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingHandler {
    pub fn transitions_to(&self, state: LoginState) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, SessionEvent::Transition(t) if t.to == state))
            .count()
    }

    pub fn count(&self, pred: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl EventHandler for RecordingHandler {
    fn handle(&self, event: &SessionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
