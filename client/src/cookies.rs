//! In-memory cookie jar.
//!
//! The server hands out `set_cookie` strings on authentication and expects
//! them back in the `cookie` field of the next authentication, the way a
//! browser's `document.cookie` would behave.

use tracing::debug;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one `Set-Cookie` style string, e.g. `sid=abc; Path=/`.
    /// A `Max-Age` of zero or less removes the cookie.
    pub fn store(&mut self, set_cookie: &str) {
        let mut parts = set_cookie.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            debug!(set_cookie, "ignoring cookie without a name");
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let expired = parts.any(|attribute| {
            attribute
                .split_once('=')
                .filter(|(key, _)| key.trim().eq_ignore_ascii_case("max-age"))
                .and_then(|(_, age)| age.trim().parse::<i64>().ok())
                .is_some_and(|age| age <= 0)
        });

        self.cookies.retain(|(existing, _)| existing != name);
        if !expired {
            self.cookies.push((name.to_string(), value.trim().to_string()));
        }
    }

    pub fn store_all<'a>(&mut self, set_cookies: impl IntoIterator<Item = &'a String>) {
        for cookie in set_cookies {
            self.store(cookie);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// The `cookie` string sent with authentication.
    pub fn header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_header() {
        let mut jar = CookieJar::new();
        assert_eq!(jar.header(), "");
        jar.store("sid=abc; Path=/; HttpOnly");
        jar.store("lang=en");
        assert_eq!(jar.header(), "sid=abc; lang=en");
        assert_eq!(jar.get("sid"), Some("abc"));
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let mut jar = CookieJar::new();
        jar.store("sid=abc");
        jar.store("sid=def; Path=/");
        assert_eq!(jar.header(), "sid=def");
    }

    #[test]
    fn test_max_age_zero_removes() {
        let mut jar = CookieJar::new();
        jar.store("sid=abc");
        jar.store("sid=; Max-Age=0");
        assert!(jar.is_empty());
    }

    #[test]
    fn test_garbage_is_ignored() {
        let mut jar = CookieJar::new();
        jar.store("no-equals-sign");
        jar.store("=orphan");
        jar.store("");
        assert!(jar.is_empty());
    }
}
