use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps personal data (emails, postal addresses) so it never leaks through
/// `Debug`/`Display` in log macros. Serialization passes the real value through,
/// API responses still need it.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

/// Log-friendly hint of an email address: first character and domain only.
pub fn email_hint(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_hides_value_in_logs() {
        let email = Masked("jane@example.com".to_string());
        assert_eq!(format!("{:?}", email), "********");
        assert_eq!(format!("{}", email), "********");
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"jane@example.com\"");
    }

    #[test]
    fn test_email_hint() {
        assert_eq!(email_hint("jane@example.com"), "j***@example.com");
        assert_eq!(email_hint("not-an-email"), "***");
    }
}
