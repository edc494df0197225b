//! Employee directory
//!
//! A small, read-only registry built once at startup and shared by reference.
//! PINs are the last four digits of a phone number: a convenience gate for
//! attributing work, not an access control.

use crate::error::{LimsError, LimsResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Digits of the phone number that form the PIN
pub const PIN_LEN: usize = 4;

/// An authorized worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Employee {
    /// Stable key, also used in QR URLs
    pub id: String,
    /// Display name recorded as the event worker
    pub name: String,
    /// Phone number
    pub phone: String,
    pin: String,
}

impl Employee {
    /// Create employee, deriving the PIN from the phone number
    ///
    /// # Errors
    /// `LimsError::Validation` if the id is empty or the phone has fewer than
    /// four digits
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        phone: impl Into<String>,
    ) -> LimsResult<Self> {
        let id = id.into();
        let phone = phone.into();
        if id.trim().is_empty() {
            return Err(LimsError::validation("employee id must not be empty"));
        }
        let pin = derive_pin(&phone).ok_or_else(|| {
            LimsError::validation(format!(
                "employee '{id}': phone must end in {PIN_LEN} digits"
            ))
        })?;
        Ok(Self {
            id,
            name: name.into(),
            phone,
            pin,
        })
    }

    /// PIN derived from the phone number
    #[inline]
    #[must_use]
    pub fn pin(&self) -> &str {
        &self.pin
    }

    /// Check a presented PIN
    #[inline]
    #[must_use]
    pub fn pin_matches(&self, pin: &str) -> bool {
        self.pin == pin.trim()
    }
}

/// Last [`PIN_LEN`] characters of `phone`, if they are all digits
#[must_use]
pub fn derive_pin(phone: &str) -> Option<String> {
    let phone = phone.trim();
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() < PIN_LEN {
        return None;
    }
    let tail = &chars[chars.len() - PIN_LEN..];
    tail.iter()
        .all(char::is_ascii_digit)
        .then(|| tail.iter().collect())
}

#[derive(Debug, Deserialize)]
struct EmployeeRecord {
    id: String,
    name: String,
    phone: String,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    employees: Vec<EmployeeRecord>,
}

/// Read-only employee registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeDirectory {
    employees: Vec<Employee>,
}

impl EmployeeDirectory {
    /// Create directory
    ///
    /// # Errors
    /// `LimsError::Config` on duplicate ids
    pub fn new(employees: Vec<Employee>) -> LimsResult<Self> {
        let mut seen = HashSet::new();
        for employee in &employees {
            if !seen.insert(employee.id.as_str()) {
                return Err(LimsError::Config(format!(
                    "duplicate employee id: {}",
                    employee.id
                )));
            }
        }
        Ok(Self { employees })
    }

    /// The lab's standing roster
    #[must_use]
    pub fn builtin() -> Self {
        let roster = [
            ("rajan", "Dr Rajan Sheth", "6146209111"),
            ("ignacio", "Ignacio Ramirez", "6232310578"),
            ("jonathan", "Jonathan Dominguez", "6025152989"),
            ("carlos", "Carlos Ortiz", "6026218249"),
        ];
        let employees = roster
            .into_iter()
            .filter_map(|(id, name, phone)| Employee::new(id, name, phone).ok())
            .collect();
        Self { employees }
    }

    /// Parse a TOML registry (`[[employees]]` with `id`, `name`, `phone`)
    ///
    /// # Errors
    /// `LimsError::Config` on malformed TOML, bad phones or duplicate ids
    pub fn from_toml_str(text: &str) -> LimsResult<Self> {
        let file: RegistryFile = toml::from_str(text)
            .map_err(|e| LimsError::Config(format!("invalid employees file: {e}")))?;
        let employees = file
            .employees
            .into_iter()
            .map(|r| Employee::new(r.id, r.name, r.phone))
            .collect::<LimsResult<Vec<_>>>()
            .map_err(|e| LimsError::Config(e.to_string()))?;
        Self::new(employees)
    }

    /// Load a TOML registry file
    ///
    /// # Errors
    /// `LimsError::Io` when unreadable, otherwise as [`Self::from_toml_str`]
    pub async fn load(path: impl AsRef<Path>) -> LimsResult<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LimsError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Look up by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Employee> {
        self.employees.iter().find(|e| e.id == id)
    }

    /// All employees in registry order
    pub fn iter(&self) -> impl Iterator<Item = &Employee> {
        self.employees.iter()
    }

    /// Number of employees
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.employees.len()
    }

    /// Check if the registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
    }
}

impl Default for EmployeeDirectory {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn builtin_roster_pins() {
        let dir = EmployeeDirectory::builtin();
        assert_eq!(dir.len(), 4);
        assert_eq!(dir.get("carlos").map(Employee::pin), Some("8249"));
        assert_eq!(dir.get("jonathan").map(Employee::pin), Some("2989"));
        assert_eq!(dir.get("ignacio").map(Employee::pin), Some("0578"));
        assert!(dir.get("nobody").is_none());
    }

    #[test]
    fn short_phone_rejected() {
        assert!(Employee::new("x", "X", "123").is_err());
        assert!(Employee::new("x", "X", "12ab").is_err());
        assert!(Employee::new("", "X", "5551234").is_err());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let a = Employee::new("ana", "Ana", "5550001").unwrap();
        let b = Employee::new("ana", "Ana B", "5550002").unwrap();
        assert!(matches!(
            EmployeeDirectory::new(vec![a, b]),
            Err(LimsError::Config(_))
        ));
    }

    #[test]
    fn registry_from_toml() {
        let dir = EmployeeDirectory::from_toml_str(
            r#"
            [[employees]]
            id = "ana"
            name = "Ana Lopez"
            phone = "+52 555 123 4567"
            "#,
        )
        .unwrap();
        let ana = dir.get("ana").unwrap();
        assert_eq!(ana.pin(), "4567");
        assert!(ana.pin_matches(" 4567 "));
    }

    #[test]
    fn registry_with_bad_phone_is_config_error() {
        let err = EmployeeDirectory::from_toml_str(
            r#"
            [[employees]]
            id = "ana"
            name = "Ana"
            phone = "12"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, LimsError::Config(_)));
    }

    proptest! {
        #[test]
        fn pin_is_last_four_digits(prefix in "[0-9]{0,8}", pin in "[0-9]{4}") {
            let phone = format!("{prefix}{pin}");
            prop_assert_eq!(derive_pin(&phone), Some(pin));
        }
    }
}
