use crate::browser::{Browser, BrowserError};
use crate::filter::{UrlClassifier, UrlKind};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("browser session closed while waiting for login")]
    SessionClosed,

    #[error("login was not completed within {0:?}")]
    TimedOut(Duration),

    #[error("login wait cancelled")]
    Cancelled,

    #[error("navigation failed: {0}")]
    Navigation(BrowserError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unknown,
    AwaitingLogin,
    Authenticated,
}

/// Tracks whether the browser has reached the authenticated job feed.
///
/// Login is a manual step, so by default the wait has no deadline. It ends when
/// the feed is reached, the caller cancels, the optional timeout expires, or the
/// browser session goes away.
pub struct SessionGuard {
    classifier: UrlClassifier,
    state: SessionState,
    transitions: Vec<SessionState>,
    poll_interval: Duration,
    login_timeout: Option<Duration>,
}

impl SessionGuard {
    pub fn new(classifier: UrlClassifier) -> Self {
        Self {
            classifier,
            state: SessionState::Unknown,
            transitions: vec![SessionState::Unknown],
            poll_interval: Duration::from_secs(1),
            login_timeout: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overall deadline for the login wait; `None` waits indefinitely
    pub fn with_login_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state the guard has been in, starting with `Unknown`
    pub fn transitions(&self) -> &[SessionState] {
        &self.transitions
    }

    /// Apply the URL currently shown by the browser to the state machine
    pub fn observe(&mut self, url: &str) -> SessionState {
        let next = match (self.state, self.classifier.classify(url)) {
            (SessionState::Authenticated, _) => SessionState::Authenticated,
            (SessionState::Unknown, UrlKind::Login) => SessionState::AwaitingLogin,
            (_, UrlKind::JobFeed) => SessionState::Authenticated,
            (state, _) => state,
        };

        if next != self.state {
            ::log::info!("Session {:?} -> {:?} at {}", self.state, next, url);
            match next {
                SessionState::AwaitingLogin => {
                    println!("Login required. Complete sign-in in the browser window; waiting...")
                }
                SessionState::Authenticated => println!("Signed in, job feed reached."),
                SessionState::Unknown => {}
            }
            self.state = next;
            self.transitions.push(next);
        }
        self.state
    }

    /// Poll the browser until it shows the job feed. Returns the feed URL.
    pub async fn wait_until_authenticated<B, C>(
        &mut self,
        browser: &B,
        cancel: C,
    ) -> Result<String, SessionError>
    where
        B: Browser,
        C: Future<Output = ()>,
    {
        let login_timeout = self.login_timeout;
        let poll_interval = self.poll_interval;

        let poll = async {
            loop {
                match browser.current_url().await {
                    Ok(url) => {
                        if self.observe(&url) == SessionState::Authenticated {
                            return Ok(url);
                        }
                    }
                    Err(e) if e.is_session_lost() => return Err(SessionError::SessionClosed),
                    // Reads can fail while a redirect is in flight
                    Err(e) => ::log::debug!("Could not read current URL: {}", e),
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        let bounded = async {
            match login_timeout {
                Some(limit) => match tokio::time::timeout(limit, poll).await {
                    Ok(result) => result,
                    Err(_) => Err(SessionError::TimedOut(limit)),
                },
                None => poll.await,
            }
        };

        tokio::select! {
            result = bounded => result,
            _ = cancel => Err(SessionError::Cancelled),
        }
    }

    /// Open `feed_url` and wait until the session is authenticated there
    pub async fn open_feed<B, C>(
        &mut self,
        browser: &B,
        feed_url: &str,
        cancel: C,
    ) -> Result<String, SessionError>
    where
        B: Browser,
        C: Future<Output = ()>,
    {
        browser.goto(feed_url).await.map_err(|e| {
            if e.is_session_lost() {
                SessionError::SessionClosed
            } else {
                SessionError::Navigation(e)
            }
        })?;

        self.wait_until_authenticated(browser, cancel).await
    }
}
