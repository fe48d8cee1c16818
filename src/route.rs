//! Routes and their compilation into request paths and bucket keys.
//!
//! A route pairs a path template with a bucket template. Both use `{name}`
//! placeholders. Compiling substitutes the same parameter map into each; the
//! compiled bucket template is the key the requester rate-limits under.
//!
//! ```rust
//! use http::Method;
//! use tollgate::Route;
//!
//! let route = Route::with_bucket(
//!     Method::GET,
//!     "/channels/{channel.id}/messages/{message.id}",
//!     "/channels/{channel.id}/messages",
//! );
//! let compiled = route
//!     .compile([("channel.id", "10"), ("message.id", "99")])
//!     .unwrap();
//! assert_eq!(compiled.path(), "/channels/10/messages/99");
//! assert_eq!(compiled.bucket(), "/channels/10/messages");
//! ```

use crate::bucket::GLOBAL_KEY;
use crate::error::RestError;
use http::Method;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// An API endpoint: method, path template, and bucket template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    method: Method,
    path: Cow<'static, str>,
    bucket: Cow<'static, str>,
}

impl Route {
    /// A route whose every placeholder is major: distinct values always land in
    /// distinct buckets.
    pub fn new(method: Method, path: impl Into<Cow<'static, str>>) -> Self {
        let path = path.into();
        Self { method, bucket: path.clone(), path }
    }

    /// A route limited under an explicit bucket template. Placeholders that only
    /// appear in `path` do not split the bucket.
    pub fn with_bucket(
        method: Method,
        path: impl Into<Cow<'static, str>>,
        bucket: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self { method, path: path.into(), bucket: bucket.into() }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path_template(&self) -> &str {
        &self.path
    }

    pub fn bucket_template(&self) -> &str {
        &self.bucket
    }

    /// Substitute `params` into both templates. The bucket may not compile to
    /// the reserved [`GLOBAL_KEY`].
    pub fn compile<I, K, V>(&self, params: I) -> Result<CompiledRoute, RestError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let params: HashMap<String, String> =
            params.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        let bucket = substitute(&self.bucket, &params)?;
        if bucket == GLOBAL_KEY {
            return Err(RestError::ReservedBucket { key: bucket });
        }
        Ok(CompiledRoute { method: self.method.clone(), path: substitute(&self.path, &params)?, bucket })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A route with every placeholder bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompiledRoute {
    method: Method,
    path: String,
    bucket: String,
}

impl CompiledRoute {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Literal path, relative to the API base.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Rate-limit bucket key.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl fmt::Display for CompiledRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

fn substitute(template: &str, params: &HashMap<String, String>) -> Result<String, RestError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| RestError::MalformedTemplate { template: template.to_owned() })?;
        let name = &after[..close];
        let value = params.get(name).ok_or_else(|| RestError::UnboundParameter {
            template: template.to_owned(),
            name: name.to_owned(),
        })?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_PARAMS: [(&str, &str); 0] = [];

    #[test]
    fn literal_route_compiles_to_itself() {
        let route = Route::new(Method::GET, "/gateway/bot");
        let compiled = route.compile(NO_PARAMS).unwrap();
        assert_eq!(compiled.path(), "/gateway/bot");
        assert_eq!(compiled.bucket(), "/gateway/bot");
        assert_eq!(compiled.method(), &Method::GET);
    }

    #[test]
    fn default_bucket_splits_on_every_placeholder() {
        let route = Route::new(Method::POST, "/channels/{channel.id}/messages");
        let a = route.compile([("channel.id", "1")]).unwrap();
        let b = route.compile([("channel.id", "2")]).unwrap();
        assert_ne!(a.bucket(), b.bucket());
        assert_eq!(a.bucket(), "/channels/1/messages");
    }

    #[test]
    fn minor_placeholders_share_a_bucket() {
        let route = Route::with_bucket(
            Method::DELETE,
            "/channels/{channel.id}/messages/{message.id}",
            "DELETE /channels/{channel.id}/messages",
        );
        let a = route.compile([("channel.id", "1"), ("message.id", "7")]).unwrap();
        let b = route.compile([("channel.id", "1"), ("message.id", "8")]).unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(a.bucket(), b.bucket());
    }

    #[test]
    fn unbound_placeholder_fails() {
        let route = Route::new(Method::GET, "/guilds/{guild.id}/members/{user.id}");
        let err = route.compile([("guild.id", "5")]).unwrap_err();
        match err {
            RestError::UnboundParameter { name, template } => {
                assert_eq!(name, "user.id");
                assert_eq!(template, "/guilds/{guild.id}/members/{user.id}");
            }
            other => panic!("expected UnboundParameter, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_placeholder_is_malformed() {
        let route = Route::new(Method::GET, "/guilds/{guild.id");
        let err = route.compile([("guild.id", "5")]).unwrap_err();
        assert!(matches!(err, RestError::MalformedTemplate { .. }));
    }

    #[test]
    fn global_key_is_reserved() {
        let literal = Route::with_bucket(Method::GET, "/gateway", "GLOBAL");
        assert!(matches!(literal.compile(NO_PARAMS), Err(RestError::ReservedBucket { .. })));

        let bound = Route::new(Method::GET, "{scope}");
        let err = bound.compile([("scope", "GLOBAL")]).unwrap_err();
        assert!(err.is_programmer_error());
        assert!(bound.compile([("scope", "/global")]).is_ok());
    }

    #[test]
    fn extra_params_are_ignored() {
        let route = Route::new(Method::GET, "/users/@me");
        let compiled = route.compile([("unused", "x")]).unwrap();
        assert_eq!(compiled.path(), "/users/@me");
    }

    #[test]
    fn display_shows_method_and_path() {
        let route = Route::new(Method::PATCH, "/guilds/{guild.id}");
        assert_eq!(route.to_string(), "PATCH /guilds/{guild.id}");
        assert_eq!(route.compile([("guild.id", "3")]).unwrap().to_string(), "PATCH /guilds/3");
    }
}
