//! Lifecycle events consumed by the cache manager and the values they produce.

use serde::Serialize;

use crate::request::{Request, Response};
use crate::stats::PreloadStats;

/// Message payload that triggers an audio preload.
pub const PRELOAD_AUDIO_MESSAGE: &str = "preloadAudio";

/// Background-sync tag reserved for queued report submissions.
pub const SYNC_REPORTS_TAG: &str = "sync-reports";

/// Notification action that opens the application.
pub const START_ACTION: &str = "start";

/// Notification action that only dismisses the notification.
pub const CLOSE_ACTION: &str = "close";

/// Instructions the foreground page can post to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Warm the audio namespace with every clip in the manifest.
    PreloadAudio,
}

impl Message {
    /// Parses a message payload. Only exact matches are recognised.
    #[must_use]
    pub fn parse(payload: &str) -> Option<Self> {
        (payload == PRELOAD_AUDIO_MESSAGE).then_some(Self::PreloadAudio)
    }
}

/// An event delivered to the manager by its host.
#[derive(Debug, Clone)]
pub enum Event {
    /// A new version was registered.
    Install,
    /// The installed version is taking over.
    Activate,
    /// The controlled scope issued a request.
    Fetch(Request),
    /// The page posted a message.
    Message(String),
    /// A background-sync registration fired.
    Sync(String),
    /// A push message arrived, with its text payload if any.
    Push(Option<String>),
    /// The user clicked a notification, with the chosen action if any.
    NotificationClick(Option<String>),
}

impl Event {
    /// Returns the lifecycle event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Activate => "activate",
            Self::Fetch(_) => "fetch",
            Self::Message(_) => "message",
            Self::Sync(_) => "sync",
            Self::Push(_) => "push",
            Self::NotificationClick(_) => "notificationclick",
        }
    }
}

/// Result of handling an [`Event`].
#[derive(Debug)]
pub enum EventOutcome {
    /// Install finished.
    Installed(InstallOutcome),
    /// Activation finished; carries the deleted namespace names.
    Activated(Vec<String>),
    /// A fetch was answered.
    Response(Response),
    /// A preload message was handled.
    Preloaded(PreloadStats),
    /// A notification should be shown.
    Notify(Notification),
    /// A client window should be opened at the given URL.
    OpenWindow(String),
    /// The event required no action.
    Ignored,
}

/// Outcome of the install step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallOutcome {
    /// Core entries stored.
    pub cached: usize,
    /// Core entries that could not be stored.
    pub failed: usize,
    /// Whether the new version takes over without waiting for old clients.
    pub skip_waiting: bool,
}

/// A notification action button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    /// Identifier reported back on click.
    pub action: String,
    /// Button label.
    pub title: String,
}

/// A notification to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Notification title.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Icon path.
    pub icon: String,
    /// Badge path.
    pub badge: String,
    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u32>,
    /// Action buttons.
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Title used for every push notification.
    pub const TITLE: &'static str = "Fitness Report";

    /// Body used when the push carries no text.
    pub const DEFAULT_BODY: &'static str = "Time for your next training session!";

    /// Builds the fixed push template around an optional body.
    #[must_use]
    pub fn from_push(payload: Option<&str>) -> Self {
        let body = payload
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(Self::DEFAULT_BODY);
        Self {
            title: Self::TITLE.to_string(),
            body: body.to_string(),
            icon: "/static/icons/icon-192.png".to_string(),
            badge: "/static/icons/icon-192.png".to_string(),
            vibrate: vec![100, 50, 100],
            actions: vec![
                NotificationAction {
                    action: START_ACTION.to_string(),
                    title: "Start workout".to_string(),
                },
                NotificationAction {
                    action: CLOSE_ACTION.to_string(),
                    title: "Close".to_string(),
                },
            ],
        }
    }
}
