/// Session carrier cookies
///
/// Both tokens travel only in `HttpOnly`, `SameSite=Strict` cookies scoped
/// to `/`. `Secure` is added outside local development.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::HttpResponseBuilder;

use crate::auth::jwt::{TokenPair, ACCESS_TOKEN_TTL_SECONDS, REFRESH_TOKEN_TTL_SECONDS};

pub const ACCESS_COOKIE_NAME: &str = "access_token";
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(Debug, Clone, Copy)]
pub struct CookieFactory {
    secure: bool,
}

impl CookieFactory {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    fn build(&self, name: &'static str, value: String, max_age_seconds: i64) -> Cookie<'static> {
        Cookie::build(name, value)
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(CookieDuration::seconds(max_age_seconds))
            .finish()
    }

    pub fn access(&self, token: &str) -> Cookie<'static> {
        self.build(ACCESS_COOKIE_NAME, token.to_string(), ACCESS_TOKEN_TTL_SECONDS)
    }

    pub fn refresh(&self, token: &str) -> Cookie<'static> {
        self.build(REFRESH_COOKIE_NAME, token.to_string(), REFRESH_TOKEN_TTL_SECONDS)
    }

    /// Attach both carriers for a freshly issued pair
    pub fn set_pair(&self, response: &mut HttpResponseBuilder, pair: &TokenPair) {
        response
            .cookie(self.access(&pair.access_token))
            .cookie(self.refresh(&pair.refresh_token));
    }

    /// Overwrite both carriers with expired, empty cookies
    pub fn clear(&self, response: &mut HttpResponseBuilder) {
        response
            .cookie(self.build(ACCESS_COOKIE_NAME, String::new(), 0))
            .cookie(self.build(REFRESH_COOKIE_NAME, String::new(), 0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_cookie_attributes() {
        let cookie = CookieFactory::new(true).access("abc");

        assert_eq!(cookie.name(), ACCESS_COOKIE_NAME);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(900)));
    }

    #[test]
    fn test_refresh_cookie_max_age() {
        let cookie = CookieFactory::new(false).refresh("xyz");

        assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(604_800)));
        assert_eq!(cookie.secure(), Some(false));
    }
}
