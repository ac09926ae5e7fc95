use cookie::{time::OffsetDateTime, Cookie, SameSite};

/// Options for the SameSite attribute of cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieSameSiteOptions {
    /// Sets the SameSite attribute to Strict.
    Strict,

    /// Sets the SameSite attribute to Lax.
    Lax,

    /// Sets the SameSite attribute to None.
    None,
}

/// Options applied when setting a cookie on the response view.
///
/// Also serves as the reference template for the session cookie: the session
/// manager copies these attributes verbatim onto every `CNET_SID` cookie it
/// schedules.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieOptions {
    /// Sets the HttpOnly attribute.
    pub http_only: bool,

    /// Sets the Secure attribute.
    pub secure: bool,

    /// Sets the SameSite attribute.
    pub same_site: CookieSameSiteOptions,

    /// Sets the Path attribute.
    pub path: Option<String>,

    /// Sets the Domain attribute.
    pub domain: Option<String>,

    /// Sets the Max-Age attribute (in seconds).
    pub max_age: Option<i64>,

    /// Sets the Expires attribute as a UNIX timestamp in seconds.
    pub expires: Option<i64>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: false,
            same_site: CookieSameSiteOptions::Lax,
            path: Some("/".to_string()),
            domain: None,
            max_age: None,
            expires: None,
        }
    }
}

/// One scheduled Set-Cookie entry in the response's cookie buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCookie {
    /// The cookie name.
    pub name: String,
    /// The cookie value.
    pub value: String,
    /// The attributes to serialize alongside the pair.
    pub options: CookieOptions,
}

impl ResponseCookie {
    /// Serializes the entry into a `Set-Cookie` header value.
    pub(crate) fn to_header_value(&self) -> String {
        let mut builder = Cookie::build((self.name.clone(), self.value.clone()))
            .http_only(self.options.http_only)
            .secure(self.options.secure)
            .same_site(match self.options.same_site {
                CookieSameSiteOptions::Strict => SameSite::Strict,
                CookieSameSiteOptions::Lax => SameSite::Lax,
                CookieSameSiteOptions::None => SameSite::None,
            });
        if let Some(path) = &self.options.path {
            builder = builder.path(path.clone());
        }
        if let Some(domain) = &self.options.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(max_age) = self.options.max_age {
            builder = builder.max_age(cookie::time::Duration::seconds(max_age));
        }
        let mut built = builder.build();
        if let Some(expires) = self.options.expires {
            if let Ok(moment) = OffsetDateTime::from_unix_timestamp(expires) {
                built.set_expires(moment);
            }
        }
        built.to_string()
    }

    /// A deletion marker for `name`: empty value, `Max-Age=0` and an epoch
    /// Expires, with the remaining attributes taken from `template`.
    pub(crate) fn removal(name: &str, template: &CookieOptions) -> Self {
        let mut options = template.clone();
        options.max_age = Some(0);
        options.expires = Some(0);
        ResponseCookie {
            name: name.to_string(),
            value: String::new(),
            options,
        }
    }
}
