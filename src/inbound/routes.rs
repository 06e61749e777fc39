use http::Method;

/// Handler name reported when a request matched no registered route, or
/// matched one served by an anonymous handler.
pub const UNDEFINED_ROUTE: &str = "UndefinedRoute";

/// One registered `(method, path, name)` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub name: String,
}

/// Logical name of the handler that served a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerName {
    /// Everything before the last `::` of the registered name.
    pub package: String,
    pub handler: String,
}

impl HandlerName {
    fn parse(name: &str) -> Self {
        if name.is_empty() || name.contains("{{closure}}") {
            return Self::undefined();
        }
        match name.rsplit_once("::") {
            Some((package, handler)) => Self {
                package: package.to_string(),
                handler: handler.to_string(),
            },
            None => Self {
                package: String::new(),
                handler: name.to_string(),
            },
        }
    }

    pub fn undefined() -> Self {
        Self {
            package: String::new(),
            handler: UNDEFINED_ROUTE.to_string(),
        }
    }
}

/// Ordered routes of the application, as the access log sees them.
///
/// Paths use the router's template syntax (`/users/:id`) so they compare
/// equal to the matched path of a request.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, method: Method, path: impl Into<String>, name: impl Into<String>) -> Self {
        self.routes.push(Route {
            method,
            path: path.into(),
            name: name.into(),
        });
        self
    }

    /// Register `handler` under its Rust item path, e.g. `app::users::get_user`.
    pub fn route_fn<H>(self, method: Method, path: impl Into<String>, _handler: &H) -> Self {
        self.route(method, path, std::any::type_name::<H>())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Resolve the handler for a request that matched `matched_path`.
    ///
    /// Paths compare with every `/` removed; the first entry whose path and
    /// method both match wins.
    pub fn resolve(&self, method: &Method, matched_path: Option<&str>) -> HandlerName {
        let Some(matched_path) = matched_path else {
            return HandlerName::undefined();
        };
        let wanted = normalize(matched_path);

        self.routes
            .iter()
            .find(|r| r.method == *method && normalize(&r.path) == wanted)
            .map(|r| HandlerName::parse(&r.name))
            .unwrap_or_else(HandlerName::undefined)
    }
}

fn normalize(path: &str) -> String {
    path.replace('/', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get_user() {}

    fn table() -> RouteTable {
        RouteTable::new()
            .route(Method::GET, "/users/:id", "users::get_user")
            .route(Method::POST, "/users", "create_user")
            .route(Method::GET, "/health", "app::{{closure}}")
    }

    #[test]
    fn exact_method_and_path_match() {
        let name = table().resolve(&Method::GET, Some("/users/:id"));
        assert_eq!(name.package, "users");
        assert_eq!(name.handler, "get_user");

        let name = table().resolve(&Method::POST, Some("/users/"));
        assert_eq!(name.handler, "create_user");
        assert_eq!(name.package, "");
    }

    #[test]
    fn unmatched_and_anonymous_routes_are_undefined() {
        assert_eq!(table().resolve(&Method::DELETE, Some("/users/:id")).handler, UNDEFINED_ROUTE);
        assert_eq!(table().resolve(&Method::GET, Some("/nope")).handler, UNDEFINED_ROUTE);
        assert_eq!(table().resolve(&Method::GET, None).handler, UNDEFINED_ROUTE);
        assert_eq!(table().resolve(&Method::GET, Some("/health")).handler, UNDEFINED_ROUTE);
    }

    #[test]
    fn function_routes_use_the_item_path() {
        let table = RouteTable::new().route_fn(Method::GET, "/u", &get_user);
        let name = table.resolve(&Method::GET, Some("/u"));
        assert_eq!(name.handler, "get_user");
        assert!(name.package.ends_with("routes::tests"));
    }
}
