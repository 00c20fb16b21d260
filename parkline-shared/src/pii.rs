use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A wrapper for contact details (emails, phone numbers) that masks its value
/// in Debug/Display output. Serialization still yields the real value, so API
/// responses are unaffected; the mask only protects log lines.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    fn masked(&self) -> String {
        let raw = self.0.as_ref();
        match raw.split_once('@') {
            // j***@example.com
            Some((local, domain)) => {
                let head: String = local.chars().take(1).collect();
                format!("{}***@{}", head, domain)
            }
            // ******4321
            None => {
                let count = raw.chars().count();
                let tail: String = raw.chars().skip(count.saturating_sub(4)).collect();
                if count <= 4 {
                    "****".to_string()
                } else {
                    format!("{}{}", "*".repeat(count - 4), tail)
                }
            }
        }
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked())
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
