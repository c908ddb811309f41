//! URI templates and percent-encoding helpers.
//!
//! Templates are level 1 [RFC 6570](https://tools.ietf.org/html/rfc6570):
//! only `{var}` substitution. Variables with no value are left in place so a
//! template can be expanded in several passes.
//!
//! Curly braces are not legal URI characters, so [`UriBuilder`] parses a
//! template in two passes: braces are first rewritten to `((` / `))`, the
//! result goes through the regular URI parser, and the components are then
//! rewritten back. Parsing the raw template directly would reject any
//! template that still holds an unresolved variable.

use std::borrow::{Borrow, Cow};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash};

use http::Uri;
use percent_encoding::{percent_decode_str, percent_encode_byte};
use url::Url;

use crate::error::Error;

/// Colon for URNs, semicolon and equals for matrix parameters.
pub const DEFAULT_PATH_SKIPS: [char; 4] = ['/', ':', ';', '='];

/// Source of template variable values.
pub trait TemplateVariables {
    fn lookup(&self, name: &str) -> Option<String>;
}

impl<K, V, S> TemplateVariables for HashMap<K, V, S>
where
    K: Borrow<str> + Hash + Eq,
    V: fmt::Display,
    S: BuildHasher,
{
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).map(ToString::to_string)
    }
}

impl<K, V> TemplateVariables for BTreeMap<K, V>
where
    K: Borrow<str> + Ord,
    V: fmt::Display,
{
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).map(ToString::to_string)
    }
}

impl<K, V> TemplateVariables for [(K, V)]
where
    K: AsRef<str>,
    V: fmt::Display,
{
    fn lookup(&self, name: &str) -> Option<String> {
        self.iter()
            .find(|(key, _)| key.as_ref() == name)
            .map(|(_, value)| value.to_string())
    }
}

impl<K, V, const N: usize> TemplateVariables for [(K, V); N]
where
    K: AsRef<str>,
    V: fmt::Display,
{
    fn lookup(&self, name: &str) -> Option<String> {
        self.as_slice().lookup(name)
    }
}

/// Substitutes `{name}` expressions. Unknown names stay literal.
pub fn expand<V>(template: &str, variables: &V) -> String
where
    V: TemplateVariables + ?Sized,
{
    if template.len() < 3 {
        return template.to_owned();
    }

    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        expanded.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            expanded.push_str(&rest[open..]);
            return expanded;
        };
        let name = &after_open[..close];
        match variables.lookup(name) {
            Some(value) if !name.is_empty() => expanded.push_str(&value),
            _ => {
                expanded.push('{');
                expanded.push_str(name);
                expanded.push('}');
            }
        }
        rest = &after_open[close + 1..];
    }
    expanded.push_str(rest);
    expanded
}

/// RFC 3986 unreserved characters are never escaped.
fn is_unreserved(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '.' | '_' | '~')
}

/// Percent-encodes everything but unreserved characters and `skips`.
pub fn url_encode(input: &str, skips: &[char]) -> String {
    let mut encoded = String::with_capacity(input.len());
    for ch in input.chars() {
        if is_unreserved(ch) || skips.contains(&ch) {
            encoded.push(ch);
            continue;
        }
        let mut buffer = [0_u8; 4];
        for byte in ch.encode_utf8(&mut buffer).bytes() {
            encoded.push_str(percent_encode_byte(byte));
        }
    }
    encoded
}

/// Decodes `%XX` escapes. Invalid escapes are kept verbatim.
pub fn url_decode(input: &str) -> String {
    if !input.contains('%') {
        return input.to_owned();
    }
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// Ordered multimap of decoded query or form parameters. Keys keep the
/// position of their first insertion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams {
    entries: Vec<(String, Vec<String>)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an encoded `a=1&b=2` line, decoding each name and value once.
    pub fn parse(line: &str) -> Self {
        let mut params = Self::new();
        for (name, value) in url::form_urlencoded::parse(line.as_bytes()) {
            params.add(name.into_owned(), value.into_owned());
        }
        params
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, values)| values.as_slice())
            .unwrap_or_default()
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.iter().any(|(key, _)| key == name)
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Replaces every value of `name`; appends the key if it is new.
    pub fn replace<I, S>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((name, values)),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(key, _)| key != name);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(key, values)| {
            values
                .iter()
                .map(move |value| (key.as_str(), value.as_str()))
        })
    }

    /// Encodes the parameters. A key with no values renders bare (`flag`).
    pub fn encode(&self, skips: &[char]) -> String {
        let mut line = String::new();
        for (key, values) in &self.entries {
            if values.is_empty() {
                if !line.is_empty() {
                    line.push('&');
                }
                line.push_str(&url_encode(key, skips));
                continue;
            }
            for value in values {
                if !line.is_empty() {
                    line.push('&');
                }
                line.push_str(&url_encode(key, skips));
                line.push('=');
                line.push_str(&url_encode(value, skips));
            }
        }
        line
    }

    fn to_unencoded(&self) -> String {
        self.iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.add(name, value);
        }
        params
    }
}

fn escape_braces(template: &str) -> Cow<'_, str> {
    if template.len() < 3 || !template.contains(['{', '}']) {
        return Cow::Borrowed(template);
    }
    Cow::Owned(template.replace('{', "((").replace('}', "))"))
}

/// Only templates that had braces are unescaped, so a literal `((` survives.
fn unescape_braces(escaped: &str, braced: bool) -> Cow<'_, str> {
    if !braced || escaped.len() < 5 || !escaped.contains("((") {
        return Cow::Borrowed(escaped);
    }
    Cow::Owned(escaped.replace("((", "{").replace("))", "}"))
}

fn prefix_slash(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

/// Joins with exactly one `/` between the parts.
pub(crate) fn slash(left: &str, right: &str) -> String {
    if left.is_empty() {
        return right.to_owned();
    }
    if right.is_empty() {
        return left.to_owned();
    }
    match (left.ends_with('/'), right.starts_with('/')) {
        (true, true) => format!("{left}{}", &right[1..]),
        (true, false) | (false, true) => format!("{left}{right}"),
        (false, false) => format!("{left}/{right}"),
    }
}

/// Mutable builder over a possibly templated URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UriBuilder {
    skip_path_encoding: Vec<char>,
    scheme: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
    query: QueryParams,
}

impl UriBuilder {
    /// Parses `template`, which may contain `{var}` expressions anywhere but the scheme.
    pub fn new(template: &str) -> crate::Result<Self> {
        let invalid = |message: String| Error::InvalidTemplate {
            template: template.to_owned(),
            message,
        };
        let escaped = escape_braces(template);
        let braced = matches!(escaped, Cow::Owned(_));
        let mut builder = Self::empty();

        if !escaped.contains("://") {
            let (path, query) = match escaped.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (&*escaped, None),
            };
            builder.set_path(&unescape_braces(path, braced));
            if let Some(query) = query {
                builder.query = QueryParams::parse(&unescape_braces(query, braced));
            }
            return Ok(builder);
        }

        let uri: Uri = escaped
            .parse()
            .map_err(|error: http::uri::InvalidUri| invalid(error.to_string()))?;
        builder.scheme = uri.scheme_str().map(ToOwned::to_owned);
        builder.host = uri
            .host()
            .map(|host| unescape_braces(host, braced).into_owned());
        builder.port = uri.port_u16();
        if !uri.path().is_empty() {
            builder.set_path(&unescape_braces(uri.path(), braced));
        }
        if let Some(query) = uri.query() {
            builder.query = QueryParams::parse(&unescape_braces(query, braced));
        }
        Ok(builder)
    }

    pub fn from_url(url: &Url) -> Self {
        let mut builder = Self::empty();
        builder.scheme = Some(url.scheme().to_owned());
        builder.host = url.host_str().map(ToOwned::to_owned);
        builder.port = url.port();
        builder.set_path(url.path());
        if let Some(query) = url.query() {
            builder.query = QueryParams::parse(query);
        }
        builder
    }

    fn empty() -> Self {
        Self {
            skip_path_encoding: DEFAULT_PATH_SKIPS.to_vec(),
            scheme: None,
            host: None,
            port: None,
            path: None,
            query: QueryParams::new(),
        }
    }

    fn set_path(&mut self, path: &str) {
        self.path = if path.is_empty() {
            None
        } else {
            Some(prefix_slash(url_decode(path)))
        };
    }

    /// Overrides the default path skips of `/ : ; =`.
    pub fn skip_path_encoding(mut self, skips: impl IntoIterator<Item = char>) -> Self {
        self.skip_path_encoding = skips.into_iter().collect();
        self
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.set_path(path);
        self
    }

    pub fn append_path(mut self, path: &str) -> Self {
        let path = url_decode(path);
        let joined = match &self.path {
            Some(current) => slash(current, &path),
            None => path,
        };
        self.set_path(&joined);
        self
    }

    /// Replaces the whole query with the parameters of an encoded query line.
    pub fn query(mut self, query_line: &str) -> Self {
        self.query = QueryParams::parse(query_line);
        self
    }

    pub fn clear_query(mut self) -> Self {
        self.query.clear();
        self
    }

    pub fn add_query<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = url_decode(name);
        for value in values {
            self.query.add(name.clone(), url_decode(value.as_ref()));
        }
        self
    }

    pub fn replace_query<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: Vec<String> = values
            .into_iter()
            .map(|value| url_decode(value.as_ref()))
            .collect();
        self.query.replace(url_decode(name), values);
        self
    }

    pub fn query_params(&self) -> &QueryParams {
        &self.query
    }

    pub fn path_str(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Expands variables and percent-encodes, without parsing the result.
    pub fn expand<V>(&self, variables: &V) -> String
    where
        V: TemplateVariables + ?Sized,
    {
        let mut uri = String::new();
        if let Some(scheme) = &self.scheme {
            uri.push_str(scheme);
            uri.push_str("://");
        }
        if let Some(host) = &self.host {
            uri.push_str(&expand(host, variables));
        }
        if let Some(port) = self.port {
            uri.push(':');
            uri.push_str(&port.to_string());
        }
        if let Some(path) = &self.path {
            uri.push_str(&url_encode(
                &expand(path, variables),
                &self.skip_path_encoding,
            ));
        }
        if !self.query.is_empty() {
            let expanded: QueryParams = self
                .query
                .iter()
                .map(|(key, value)| (expand(key, variables), expand(value, variables)))
                .collect();
            uri.push('?');
            uri.push_str(&expanded.encode(&[]));
        }
        uri
    }

    pub fn build(&self) -> crate::Result<Url> {
        self.build_with(&[] as &[(&str, &str)])
    }

    /// Expands, encodes and parses into an absolute URL.
    pub fn build_with<V>(&self, variables: &V) -> crate::Result<Url>
    where
        V: TemplateVariables + ?Sized,
    {
        let expanded = self.expand(variables);
        Url::parse(&expanded).map_err(|_| Error::InvalidUri { uri: expanded })
    }
}

/// Prints the template unencoded.
impl fmt::Display for UriBuilder {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(formatter, "{scheme}://")?;
        }
        if let Some(host) = &self.host {
            formatter.write_str(host)?;
        }
        if let Some(port) = self.port {
            write!(formatter, ":{port}")?;
        }
        if let Some(path) = &self.path {
            formatter.write_str(path)?;
        }
        if !self.query.is_empty() {
            write!(formatter, "?{}", self.query.to_unencoded())?;
        }
        Ok(())
    }
}
