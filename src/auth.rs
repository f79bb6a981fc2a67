// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Device-code login flow.
//!
//! Buzz authenticates operators through the OAuth device-code pattern: the
//! client requests a session, shows the operator a short user code and a
//! verification URL, then polls the server until the browser-side approval
//! completes. The server proxies the actual GitHub exchange, so the client
//! only ever talks to Buzz endpoints.
//!
//! The poll loop is a plain bounded loop. The attempt budget is fixed up
//! front as `ceil(expires_in / interval)`, polls are strictly sequential with
//! one request in flight at a time, and the delay between polls goes through
//! an injected wait function so every termination path is testable without
//! wall-clock time. A `pending` reply may advertise a larger interval, which
//! governs all subsequent waits.
//!
//! No credential is ever persisted from this module. The caller receives the
//! terminal [`LoginOutcome`] and performs the single atomic save on the
//! authorized path only.

use crate::api::{ApiError, UserInfo};

use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Poll interval used when the server does not advertise one.
pub const DEFAULT_INTERVAL: u64 = 5;

/// Session lifetime used when the server does not advertise one.
pub const DEFAULT_EXPIRES_IN: u64 = 900;

/// Transient device authorization session.
///
/// Created by one request, consumed entirely by the poll loop, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceSession {
    /// Opaque code the client polls with.
    pub device_code: String,

    /// Short code the operator types into the verification page.
    pub user_code: String,

    /// URL the operator completes the approval at.
    pub verification_uri: String,

    /// Seconds to wait between polls.
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Seconds until the device code expires.
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL
}

fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN
}

/// One interpreted poll reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Approval not completed yet, optionally with a new poll interval.
    Pending { interval: Option<u64> },

    /// Approval completed, session token issued.
    Complete { token: String, user: UserInfo },

    /// Approval denied or the device code was rejected.
    Denied(String),
}

/// Terminal state of one login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Operator approved, token ready to persist.
    Authorized { token: String, user: UserInfo },

    /// Operator or server denied the authorization.
    Denied(String),

    /// Attempt budget exhausted without resolution.
    Expired,

    /// A request failed at the transport level, login aborted.
    TransportError(String),
}

/// Remote endpoint pair driving the device flow.
///
/// Seam between the state machine and the HTTP client so the loop can run
/// against a scripted authority in tests.
pub trait DeviceAuthority {
    /// Start a device session.
    fn start_session(&self) -> Result<DeviceSession, ApiError>;

    /// Poll once for completion of `device_code`.
    fn poll(&self, device_code: &str) -> Result<PollStatus, ApiError>;
}

/// Run the whole login flow against `authority`.
///
/// `display` observes the session once so the binary can show the user code
/// and verification URL; it suspends nothing. `wait` is called before every
/// poll with the current interval.
pub fn run_login(
    authority: &impl DeviceAuthority,
    mut display: impl FnMut(&DeviceSession),
    wait: impl FnMut(Duration),
) -> LoginOutcome {
    let session = match authority.start_session() {
        Ok(session) => session,
        Err(err) => return LoginOutcome::TransportError(err.to_string()),
    };

    display(&session);
    poll_until_resolved(authority, &session, wait)
}

/// Poll `authority` until the session resolves or its attempt budget runs
/// out.
pub fn poll_until_resolved(
    authority: &impl DeviceAuthority,
    session: &DeviceSession,
    mut wait: impl FnMut(Duration),
) -> LoginOutcome {
    let interval = if session.interval == 0 {
        DEFAULT_INTERVAL
    } else {
        session.interval
    };

    // INVARIANT: Attempt budget is fixed before the first poll, a later
    // interval change never extends the session lifetime.
    let max_attempts = session.expires_in.div_ceil(interval).max(1);
    debug!("polling for authorization, at most {max_attempts} attempts");

    let mut delay = Duration::from_secs(interval);
    for attempt in 1..=max_attempts {
        wait(delay);
        match authority.poll(&session.device_code) {
            Ok(PollStatus::Pending { interval }) => {
                debug!("authorization pending after attempt {attempt}");
                if let Some(seconds) = interval {
                    delay = Duration::from_secs(seconds);
                }
            }
            Ok(PollStatus::Complete { token, user }) => {
                return LoginOutcome::Authorized { token, user }
            }
            Ok(PollStatus::Denied(message)) => return LoginOutcome::Denied(message),
            Err(err) => return LoginOutcome::TransportError(err.to_string()),
        }
    }

    LoginOutcome::Expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    /// Authority replaying a fixed poll script.
    struct ScriptedAuthority {
        replies: RefCell<Vec<Result<PollStatus, ApiError>>>,
        polls: RefCell<usize>,
    }

    impl ScriptedAuthority {
        fn new(replies: Vec<Result<PollStatus, ApiError>>) -> Self {
            let mut replies = replies;
            replies.reverse();
            Self {
                replies: RefCell::new(replies),
                polls: RefCell::new(0),
            }
        }

        fn poll_count(&self) -> usize {
            *self.polls.borrow()
        }
    }

    impl DeviceAuthority for ScriptedAuthority {
        fn start_session(&self) -> Result<DeviceSession, ApiError> {
            Ok(session(5, 900))
        }

        fn poll(&self, _device_code: &str) -> Result<PollStatus, ApiError> {
            *self.polls.borrow_mut() += 1;
            self.replies
                .borrow_mut()
                .pop()
                .expect("script ran out of poll replies")
        }
    }

    fn session(interval: u64, expires_in: u64) -> DeviceSession {
        DeviceSession {
            device_code: "dev-123".into(),
            user_code: "ABCD-1234".into(),
            verification_uri: "https://github.com/login/device".into(),
            interval,
            expires_in,
        }
    }

    fn pending() -> Result<PollStatus, ApiError> {
        Ok(PollStatus::Pending { interval: None })
    }

    fn complete(token: &str, login: &str) -> Result<PollStatus, ApiError> {
        Ok(PollStatus::Complete {
            token: token.into(),
            user: UserInfo {
                login: login.into(),
                name: None,
            },
        })
    }

    #[test]
    fn authorized_after_pending_replies_stops_polling() {
        let authority =
            ScriptedAuthority::new(vec![pending(), pending(), pending(), complete("T", "u")]);

        let result = poll_until_resolved(&authority, &session(5, 900), |_| {});

        let expect = LoginOutcome::Authorized {
            token: "T".into(),
            user: UserInfo {
                login: "u".into(),
                name: None,
            },
        };
        assert_eq!(result, expect);
        assert_eq!(authority.poll_count(), 4);
    }

    #[test]
    fn expires_after_attempt_budget() {
        let authority = ScriptedAuthority::new(vec![pending(), pending()]);

        let result = poll_until_resolved(&authority, &session(5, 10), |_| {});

        assert_eq!(result, LoginOutcome::Expired);
        assert_eq!(authority.poll_count(), 2);
    }

    #[test]
    fn attempt_budget_rounds_up() {
        let authority = ScriptedAuthority::new(vec![pending(), pending(), pending()]);

        let result = poll_until_resolved(&authority, &session(5, 11), |_| {});

        assert_eq!(result, LoginOutcome::Expired);
        assert_eq!(authority.poll_count(), 3);
    }

    #[test]
    fn denial_ends_the_loop() {
        let authority = ScriptedAuthority::new(vec![
            pending(),
            Ok(PollStatus::Denied("User denied access".into())),
        ]);

        let result = poll_until_resolved(&authority, &session(5, 900), |_| {});

        assert_eq!(result, LoginOutcome::Denied("User denied access".into()));
        assert_eq!(authority.poll_count(), 2);
    }

    #[test]
    fn transport_failure_aborts_immediately() {
        let authority = ScriptedAuthority::new(vec![
            pending(),
            Err(ApiError::Connectivity("connection refused".into())),
        ]);

        let result = poll_until_resolved(&authority, &session(5, 900), |_| {});

        assert!(matches!(result, LoginOutcome::TransportError(_)));
        assert_eq!(authority.poll_count(), 2);
    }

    #[test]
    fn waits_advertised_interval_before_every_poll() {
        let authority = ScriptedAuthority::new(vec![pending(), pending(), complete("T", "u")]);
        let mut waits = Vec::new();

        poll_until_resolved(&authority, &session(7, 900), |delay| waits.push(delay));

        assert_eq!(waits, vec![Duration::from_secs(7); 3]);
    }

    #[test]
    fn pending_reply_can_slow_down_subsequent_waits() {
        let authority = ScriptedAuthority::new(vec![
            Ok(PollStatus::Pending { interval: Some(10) }),
            pending(),
            complete("T", "u"),
        ]);
        let mut waits = Vec::new();

        poll_until_resolved(&authority, &session(5, 900), |delay| waits.push(delay));

        assert_eq!(
            waits,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(10),
            ]
        );
    }

    #[test]
    fn zero_interval_falls_back_to_default() {
        let authority = ScriptedAuthority::new(vec![complete("T", "u")]);
        let mut waits = Vec::new();

        poll_until_resolved(&authority, &session(0, 900), |delay| waits.push(delay));

        assert_eq!(waits, vec![Duration::from_secs(DEFAULT_INTERVAL)]);
    }

    #[test]
    fn failed_session_start_is_a_transport_error() {
        struct BrokenAuthority;

        impl DeviceAuthority for BrokenAuthority {
            fn start_session(&self) -> Result<DeviceSession, ApiError> {
                Err(ApiError::Server {
                    status: 500,
                    message: "GitHub OAuth not configured".into(),
                })
            }

            fn poll(&self, _device_code: &str) -> Result<PollStatus, ApiError> {
                unreachable!("poll must not run when the session never started")
            }
        }

        let result = run_login(&BrokenAuthority, |_| {}, |_| {});

        assert!(matches!(result, LoginOutcome::TransportError(_)));
    }

    #[test]
    fn run_login_displays_session_before_polling() {
        let authority = ScriptedAuthority::new(vec![complete("T", "u")]);
        let mut shown = None;

        run_login(
            &authority,
            |session| shown = Some(session.user_code.clone()),
            |_| {},
        );

        assert_eq!(shown, Some("ABCD-1234".into()));
    }

    #[test]
    fn deserialize_session_defaults_interval_and_expiry() -> anyhow::Result<()> {
        let result: DeviceSession = serde_json::from_str(
            r#"{
                "device_code": "dev-123",
                "user_code": "ABCD-1234",
                "verification_uri": "https://github.com/login/device"
            }"#,
        )?;

        assert_eq!(result.interval, DEFAULT_INTERVAL);
        assert_eq!(result.expires_in, DEFAULT_EXPIRES_IN);

        Ok(())
    }
}
