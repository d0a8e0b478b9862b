//! Method name resolution
//!
//! gRPC carries the target of a call as `/package.Service/Method`. Only the
//! last `/` and the last `.` before it are significant; no escaping is done.

use std::fmt;

use crate::error::{RpcError, RpcResult};

/// The `{package, service, method}` a stream resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MethodTriple {
    /// Package, e.g. `echo` or `grpc.health.v1`
    pub package: String,
    /// Service within the package
    pub service: String,
    /// Method within the service
    pub method: String,
}

impl MethodTriple {
    /// Resolve a full method string.
    ///
    /// Accepts `/pkg.Service/Method` and `pkg.Service/Method`. Empty segments
    /// are not rejected.
    ///
    /// # Errors
    ///
    /// - [`RpcError::MalformedMethodName`] when there is no `/` after the
    ///   optional leading one
    /// - [`RpcError::MalformedServiceName`] when the part before the last `/`
    ///   contains no `.`
    ///
    /// Both carry the raw input string.
    pub fn parse(full_method: &str) -> RpcResult<Self> {
        let trimmed = full_method.strip_prefix('/').unwrap_or(full_method);

        let (qualified_service, method) = trimmed
            .rsplit_once('/')
            .ok_or_else(|| RpcError::MalformedMethodName(full_method.to_string()))?;
        let (package, service) = qualified_service
            .rsplit_once('.')
            .ok_or_else(|| RpcError::MalformedServiceName(full_method.to_string()))?;

        Ok(Self {
            package: package.to_string(),
            service: service.to_string(),
            method: method.to_string(),
        })
    }

    /// `package.Service`
    #[must_use]
    pub fn qualified_service(&self) -> String {
        format!("{}.{}", self.package, self.service)
    }
}

impl fmt::Display for MethodTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}.{}/{}", self.package, self.service, self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn triple(package: &str, service: &str, method: &str) -> MethodTriple {
        MethodTriple {
            package: package.into(),
            service: service.into(),
            method: method.into(),
        }
    }

    #[test]
    fn test_parse_with_and_without_leading_slash() {
        let expected = triple("pkg", "Service", "Method");
        assert_eq!(MethodTriple::parse("/pkg.Service/Method").unwrap(), expected);
        assert_eq!(MethodTriple::parse("pkg.Service/Method").unwrap(), expected);
    }

    #[test]
    fn test_nested_package_splits_on_last_dot() {
        assert_eq!(
            MethodTriple::parse("/grpc.health.v1.Health/Check").unwrap(),
            triple("grpc.health.v1", "Health", "Check")
        );
    }

    #[test]
    fn test_missing_separator() {
        assert!(matches!(
            MethodTriple::parse("NoSeparator"),
            Err(RpcError::MalformedMethodName(raw)) if raw == "NoSeparator"
        ));
        assert!(matches!(
            MethodTriple::parse("/"),
            Err(RpcError::MalformedMethodName(_))
        ));
    }

    #[test]
    fn test_missing_package_dot() {
        assert!(matches!(
            MethodTriple::parse("pkg/Method"),
            Err(RpcError::MalformedServiceName(raw)) if raw == "pkg/Method"
        ));
        assert!(matches!(
            MethodTriple::parse("/noservice/Method"),
            Err(RpcError::MalformedServiceName(raw)) if raw == "/noservice/Method"
        ));
    }

    #[test]
    fn test_empty_segments_pass_through() {
        assert_eq!(MethodTriple::parse("./").unwrap(), triple("", "", ""));
        assert_eq!(
            MethodTriple::parse("//a.b/c").unwrap(),
            triple("/a", "b", "c")
        );
    }

    #[test]
    fn test_display() {
        let t = triple("echo", "EchoService", "Echo");
        assert_eq!(t.to_string(), "/echo.EchoService/Echo");
        assert_eq!(t.qualified_service(), "echo.EchoService");
    }

    proptest! {
        #[test]
        fn prop_leading_slash_is_optional(s in "[a-zA-Z0-9./_]{0,24}") {
            let bare = MethodTriple::parse(&s).ok();
            let slashed = MethodTriple::parse(&format!("/{s}")).ok();
            // A bare string starting with '/' loses a different character.
            if !s.starts_with('/') {
                prop_assert_eq!(bare, slashed);
            }
        }

        #[test]
        fn prop_no_slash_is_malformed_method(s in "[a-zA-Z0-9._]{0,24}") {
            let is_malformed_method = matches!(
                MethodTriple::parse(&s),
                Err(RpcError::MalformedMethodName(_))
            );
            prop_assert!(is_malformed_method);
        }

        #[test]
        fn prop_well_formed_names_resolve(
            package in "[a-z][a-z0-9.]{0,12}",
            service in "[A-Z][a-zA-Z0-9]{0,12}",
            method in "[A-Z][a-zA-Z0-9]{0,12}",
        ) {
            let full = format!("/{package}.{service}/{method}");
            let parsed = MethodTriple::parse(&full).unwrap();
            prop_assert_eq!(parsed.package, package);
            prop_assert_eq!(parsed.service, service);
            prop_assert_eq!(parsed.method, method);
        }
    }
}
