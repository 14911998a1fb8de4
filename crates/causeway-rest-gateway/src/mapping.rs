//! HTTP method and path template mapping for the REST gateway

use crate::error::{ConfigurationError, GatewayResult};
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use std::fmt;

/// HTTP methods supported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Parse HTTP method from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    /// Map an `http::Method`; anything outside the five verbs is `None`
    pub fn from_http(method: &http::Method) -> Option<Self> {
        Self::from_str(method.as_str())
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether requests with this method carry their input in the body
    pub fn accepts_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collapse duplicate slashes and strip leading/trailing ones, then re-root.
///
/// `//users///{id}/` becomes `/users/{id}`.
pub fn normalize_path(path: &str) -> String {
    let joined = path
        .split('/')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{}", joined)
}

/// Compiled path template
/// Example: "/users/{id}" or "/posts/{post_id}/comments/{comment_id}"
#[derive(Debug, Clone)]
pub struct PathTemplate {
    /// Normalized template string
    template: String,
    /// Path segments (literal or parameter)
    segments: Vec<TemplateSegment>,
    /// Parameter names in order of appearance
    param_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplateSegment {
    Literal(String),
    Parameter(String), // Parameter name without braces
}

impl PathTemplate {
    /// Compile a path template
    pub fn compile(template: &str) -> GatewayResult<Self> {
        let normalized = normalize_path(template);
        let mut segments = Vec::new();
        let mut param_names: Vec<String> = Vec::new();

        for part in normalized.split('/') {
            if part.is_empty() {
                continue;
            }

            if part.starts_with('{') && part.ends_with('}') {
                let param_name = &part[1..part.len() - 1];
                if param_name.is_empty() || param_name.contains('{') || param_name.contains('}') {
                    return Err(ConfigurationError::InvalidPathTemplate {
                        template: template.to_string(),
                        reason: format!("invalid parameter segment `{}`", part),
                    });
                }
                if param_names.iter().any(|existing| existing == param_name) {
                    return Err(ConfigurationError::DuplicatePathParameter(param_name.to_string()));
                }
                param_names.push(param_name.to_string());
                segments.push(TemplateSegment::Parameter(param_name.to_string()));
            } else if part.contains('{') || part.contains('}') {
                return Err(ConfigurationError::InvalidPathTemplate {
                    template: template.to_string(),
                    reason: format!("parameters must span a whole segment, got `{}`", part),
                });
            } else {
                segments.push(TemplateSegment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            template: normalized,
            segments,
            param_names,
        })
    }

    /// Match a request path against this template and extract parameters.
    ///
    /// Literal segments compare case-insensitively; parameter values are
    /// percent-decoded.
    pub fn match_path(&self, path: &str) -> Option<IndexMap<String, String>> {
        let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if path_parts.len() != self.segments.len() {
            return None;
        }

        let mut params = IndexMap::new();

        for (segment, part) in self.segments.iter().zip(path_parts.iter()) {
            match segment {
                TemplateSegment::Literal(expected) => {
                    if !expected.eq_ignore_ascii_case(part) {
                        return None;
                    }
                }
                TemplateSegment::Parameter(name) => {
                    let value = percent_decode_str(part).decode_utf8_lossy().into_owned();
                    params.insert(name.clone(), value);
                }
            }
        }

        Some(params)
    }

    /// Get the normalized template string
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Get parameter names from the template
    pub fn parameter_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.param_names.iter().any(|p| p == name)
    }

    /// Number of literal segments, used to rank competing matches
    pub fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, TemplateSegment::Literal(_)))
            .count()
    }

    /// Collision key: lowercased literals with every parameter as `{}`.
    ///
    /// `/Users/{id}` and `/users/{userId}` share the key `/users/{}`.
    pub fn route_key(&self) -> String {
        let parts: Vec<String> = self
            .segments
            .iter()
            .map(|segment| match segment {
                TemplateSegment::Literal(literal) => literal.to_lowercase(),
                TemplateSegment::Parameter(_) => "{}".to_string(),
            })
            .collect();
        format!("/{}", parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_method_from_str() {
        assert_eq!(HttpMethod::from_str("GET"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::from_str("post"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::from_str("PUT"), Some(HttpMethod::Put));
        assert_eq!(HttpMethod::from_str("HEAD"), None);
        assert_eq!(HttpMethod::from_http(&http::Method::DELETE), Some(HttpMethod::Delete));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("say-hello"), "/say-hello");
        assert_eq!(normalize_path("//users///{id}/"), "/users/{id}");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn test_template_static() {
        let template = PathTemplate::compile("/api/v1/users").unwrap();

        let params = template.match_path("/api/v1/users");
        assert!(params.is_some());
        assert_eq!(params.unwrap().len(), 0);

        assert!(template.match_path("/api/v1/posts").is_none());
    }

    #[test]
    fn test_template_case_insensitive() {
        let template = PathTemplate::compile("/UPPER").unwrap();
        assert!(template.match_path("/upper").is_some());
        assert!(template.match_path("/Upper/").is_some());
    }

    #[test]
    fn test_template_with_parameter() {
        let template = PathTemplate::compile("/api/v1/users/{id}").unwrap();

        let params = template.match_path("/api/v1/users/123").unwrap();
        assert_eq!(params.get("id"), Some(&"123".to_string()));

        assert!(template.match_path("/api/v1/posts/123").is_none());
        assert!(template.match_path("/api/v1/users").is_none());
    }

    #[test]
    fn test_parameter_percent_decoded() {
        let template = PathTemplate::compile("/files/{name}").unwrap();
        let params = template.match_path("/files/hello%20world").unwrap();
        assert_eq!(params.get("name"), Some(&"hello world".to_string()));
    }

    #[test]
    fn test_template_multiple_parameters() {
        let template = PathTemplate::compile("/posts/{post_id}/comments/{comment_id}").unwrap();

        let params = template.match_path("/posts/456/comments/789").unwrap();
        assert_eq!(params.get("post_id"), Some(&"456".to_string()));
        assert_eq!(params.get("comment_id"), Some(&"789".to_string()));
        assert_eq!(template.parameter_names(), ["post_id", "comment_id"]);
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let err = PathTemplate::compile("/a/{id}/b/{id}").unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicatePathParameter(name) if name == "id"));
    }

    #[test]
    fn test_partial_segment_parameter_rejected() {
        assert!(PathTemplate::compile("/files/{id}.json").is_err());
        assert!(PathTemplate::compile("/files/{}").is_err());
    }

    #[test]
    fn test_route_key() {
        let a = PathTemplate::compile("/Users/{id}/").unwrap();
        let b = PathTemplate::compile("users/{userId}").unwrap();
        assert_eq!(a.route_key(), "/users/{}");
        assert_eq!(a.route_key(), b.route_key());
        assert_eq!(a.template(), "/Users/{id}");
        assert_eq!(a.literal_count(), 1);
    }
}
