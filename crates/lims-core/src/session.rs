//! Identification sessions
//!
//! A session binds a device to one employee for a bounded time so scans can be
//! attributed. The token is `<employee id>.<expiry unix seconds>`, unsigned and
//! trusted at face value: anyone can forge one. It records who handled a case;
//! it does not restrict who may.

use crate::directory::{Employee, EmployeeDirectory};
use crate::error::{LimsError, LimsResult};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "emp_id";

/// Identification of one device as one employee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Employee the device speaks for
    pub employee_id: String,
    /// End of validity
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Issue session starting at `now`
    #[must_use]
    pub fn issue(employee_id: impl Into<String>, ttl: Duration, now: DateTime<Utc>) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            employee_id: employee_id.into(),
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Encode as a cookie value
    #[must_use]
    pub fn token(&self) -> String {
        format!("{}.{}", self.employee_id, self.expires_at.timestamp())
    }

    /// Decode a cookie value; `None` if it is not a session token
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let (employee_id, expiry) = token.trim().rsplit_once('.')?;
        if employee_id.is_empty() {
            return None;
        }
        let expires_at = Utc.timestamp_opt(expiry.parse().ok()?, 0).single()?;
        Some(Self {
            employee_id: employee_id.to_string(),
            expires_at,
        })
    }

    /// Check validity at `now`
    #[inline]
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Seconds left at `now`, for the cookie's `Max-Age`
    #[must_use]
    pub fn max_age_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// Issues and resolves sessions against the employee directory
#[derive(Debug, Clone)]
pub struct Identifier {
    directory: Arc<EmployeeDirectory>,
    ttl: Duration,
}

impl Identifier {
    /// Create identifier
    #[inline]
    #[must_use]
    pub fn new(directory: Arc<EmployeeDirectory>, ttl: Duration) -> Self {
        Self { directory, ttl }
    }

    /// Check id and PIN, issuing a session valid from now
    ///
    /// # Errors
    /// - `LimsError::NotFound` if the employee id is unknown
    /// - `LimsError::InvalidCredential` if the PIN does not match
    pub fn identify(&self, employee_id: &str, pin: &str) -> LimsResult<Session> {
        self.identify_at(employee_id, pin, Utc::now())
    }

    /// [`Identifier::identify`] with an explicit clock
    ///
    /// # Errors
    /// See [`Identifier::identify`]
    pub fn identify_at(
        &self,
        employee_id: &str,
        pin: &str,
        now: DateTime<Utc>,
    ) -> LimsResult<Session> {
        let employee = self
            .directory
            .get(employee_id)
            .ok_or_else(|| LimsError::not_found(format!("employee '{employee_id}'")))?;
        if !employee.pin_matches(pin) {
            tracing::warn!(employee = %employee_id, "identification rejected: PIN mismatch");
            return Err(LimsError::InvalidCredential {
                employee_id: employee_id.to_string(),
            });
        }
        tracing::info!(employee = %employee_id, "employee identified");
        Ok(Session::issue(&employee.id, self.ttl, now))
    }

    /// Employee behind a cookie value, if it is a live session
    #[must_use]
    pub fn current_employee(&self, token: Option<&str>) -> Option<&Employee> {
        self.current_employee_at(token, Utc::now())
    }

    /// [`Identifier::current_employee`] with an explicit clock
    ///
    /// Absent, unparsable, expired and unknown-employee tokens all yield `None`.
    #[must_use]
    pub fn current_employee_at(
        &self,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<&Employee> {
        let session = Session::parse(token?)?;
        if !session.is_valid_at(now) {
            tracing::debug!(employee = %session.employee_id, "session expired");
            return None;
        }
        self.directory.get(&session.employee_id)
    }

    /// Session lifetime
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Backing directory
    #[inline]
    #[must_use]
    pub fn directory(&self) -> &EmployeeDirectory {
        &self.directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SESSION_TTL_SECS;

    fn identifier() -> Identifier {
        Identifier::new(
            Arc::new(EmployeeDirectory::builtin()),
            Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    #[test]
    fn identify_with_phone_suffix() {
        let session = identifier().identify_at("carlos", "8249", t0()).unwrap();
        assert_eq!(session.employee_id, "carlos");
        assert_eq!(session.expires_at, t0() + chrono::Duration::hours(8));
    }

    #[test]
    fn wrong_pin_is_invalid_credential() {
        let err = identifier().identify("carlos", "0000").unwrap_err();
        assert!(matches!(err, LimsError::InvalidCredential { .. }));
    }

    #[test]
    fn unknown_employee_is_not_found() {
        let err = identifier().identify("nobody", "1234").unwrap_err();
        assert!(matches!(err, LimsError::NotFound(_)));
    }

    #[test]
    fn token_roundtrip_resolves_employee() {
        let ident = identifier();
        let session = ident.identify_at("jonathan", "2989", t0()).unwrap();
        let token = session.token();

        let employee = ident
            .current_employee_at(Some(&token), t0() + chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(employee.name, "Jonathan Dominguez");
    }

    #[test]
    fn expired_session_resolves_to_none() {
        let ident = identifier();
        let token = ident.identify_at("jonathan", "2989", t0()).unwrap().token();
        let later = t0() + chrono::Duration::hours(8);
        assert!(ident.current_employee_at(Some(&token), later).is_none());
    }

    #[test]
    fn garbage_tokens_resolve_to_none() {
        let ident = identifier();
        for token in ["", "carlos", ".123", "carlos.soon", "ghost.99999999999"] {
            assert!(ident.current_employee_at(Some(token), t0()).is_none(), "{token}");
        }
        assert!(ident.current_employee_at(None, t0()).is_none());
    }

    #[test]
    fn forged_token_is_accepted() {
        // Attribution only: a hand-written token for a known id is trusted.
        let ident = identifier();
        let forged = format!("rajan.{}", (t0() + chrono::Duration::hours(1)).timestamp());
        assert_eq!(
            ident.current_employee_at(Some(&forged), t0()).map(|e| e.id.as_str()),
            Some("rajan")
        );
    }

    #[test]
    fn max_age_counts_down() {
        let session = Session::issue("carlos", Duration::from_secs(3600), t0());
        assert_eq!(session.max_age_secs(t0()), 3600);
        assert_eq!(session.max_age_secs(t0() + chrono::Duration::hours(2)), 0);
    }
}
